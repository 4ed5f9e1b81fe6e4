//! Step recording for the best-effort custody sequences
//!
//! The device offers no transaction across its configuration endpoints,
//! so workflows execute every step regardless of sibling failures and
//! surface the per-step outcome as data. "Did everything succeed" is a
//! pure fold over the recorded list.

use crate::error::{Error, Result};
use serde::Serialize;
use serde_json::Value;

/// Outcome of one workflow step
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub step: usize,
    pub description: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

/// Ordered list of step outcomes for one workflow invocation
#[derive(Debug, Default)]
pub struct StepRecorder {
    steps: Vec<StepOutcome>,
}

impl StepRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_number(&self) -> usize {
        self.steps.len() + 1
    }

    pub fn succeed(&mut self, description: impl Into<String>) {
        let step = self.next_number();
        self.steps.push(StepOutcome {
            step,
            description: description.into(),
            success: true,
            error: None,
            detail: None,
        });
    }

    pub fn succeed_with(&mut self, description: impl Into<String>, detail: Value) {
        let step = self.next_number();
        self.steps.push(StepOutcome {
            step,
            description: description.into(),
            success: true,
            error: None,
            detail: Some(detail),
        });
    }

    pub fn fail(&mut self, description: impl Into<String>, error: &Error) {
        let step = self.next_number();
        self.steps.push(StepOutcome {
            step,
            description: description.into(),
            success: false,
            error: Some(error.to_string()),
            detail: None,
        });
    }

    /// Fold a device call result into the step list, discarding the
    /// device's response body
    pub fn record<T>(&mut self, description: impl Into<String>, result: &Result<T>) {
        match result {
            Ok(_) => self.succeed(description),
            Err(e) => self.fail(description, e),
        }
    }

    /// As `record`, attaching a detail payload on success
    pub fn record_with_detail<T>(
        &mut self,
        description: impl Into<String>,
        result: &Result<T>,
        detail: Value,
    ) {
        match result {
            Ok(_) => self.succeed_with(description, detail),
            Err(e) => self.fail(description, e),
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.steps.iter().all(|s| s.success)
    }

    pub fn into_steps(self) -> Vec<StepOutcome> {
        self.steps
    }
}

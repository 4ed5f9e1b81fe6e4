//! iDFace gateway
//!
//! Main entry point for the device gateway.

use std::sync::Arc;

use idface_gateway::{
    custody::CustodyEngine,
    device::{DeviceApi, DeviceClient, SESSION_CHECK_INTERVAL},
    firmware::FirmwareService,
    intercom::IntercomService,
    state::{AppConfig, AppState},
    web_api::{self, MonitorRelay},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "idface_gateway=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting iDFace gateway v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    tracing::info!(
        device_ip = %config.device_ip,
        host = %config.host,
        port = config.port,
        "Configuration loaded"
    );

    // Initialize components
    let device = Arc::new(DeviceClient::new(&config));
    let device_api: Arc<dyn DeviceApi> = device.clone();
    let session = device.session();

    let firmware = Arc::new(FirmwareService::new(device_api.clone()));
    let custody = Arc::new(CustodyEngine::new(device_api.clone(), firmware.clone()));
    let intercom = Arc::new(IntercomService::new(device_api.clone()));
    let monitor = Arc::new(MonitorRelay::new(config.monitor_listener_url.clone()));
    tracing::info!("Device services initialized");

    // Authenticate eagerly so startup logs show whether the device is
    // reachable. The gateway still serves requests when it is not.
    match session.token().await {
        Ok(_) => match device_api.system_information().await {
            Ok(info) => tracing::info!(info = %info, "Device session established"),
            Err(err) => tracing::warn!(error = %err, "Device login ok but info query failed"),
        },
        Err(err) => {
            tracing::warn!(error = %err, "Device unreachable at startup, continuing offline")
        }
    }

    let state = AppState {
        config: config.clone(),
        device,
        session: session.clone(),
        firmware,
        custody,
        intercom,
        monitor,
    };

    // Periodic session keepalive
    let session_check = session.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_CHECK_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            session_check.background_check().await;
        }
    });

    let app = web_api::create_router(state);

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

mod config;
mod event_hub_api;

use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig, TelemetryProviders};
use config::ServiceConfig;
use event_hub_api::{EventHubApi, EventHubApiConfig};
use event_monitor::domain::SessionManager;
use event_monitor::nats::NatsEventHubConnector;
use eventscope_runner::Runner;
use std::sync::Arc;
use tracing::{debug, info};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let telemetry_providers: Option<TelemetryProviders> = match init_telemetry(&TelemetryConfig {
        service_name: config.otel_service_name.clone(),
        otel_endpoint: config.otel_endpoint.clone(),
        otel_enabled: config.otel_enabled,
        log_level: config.log_level.clone(),
    }) {
        Ok(providers) => providers,
        Err(e) => {
            eprintln!("Failed to initialize telemetry: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        otel_enabled = config.otel_enabled,
        otel_endpoint = %config.otel_endpoint,
        "Starting eventscope proxy"
    );
    debug!("Configuration: {:?}", config);

    let session_manager = Arc::new(SessionManager::new(
        Arc::new(NatsEventHubConnector::new(config.bus_connect_timeout())),
        config.event_monitor_config(),
    ));

    let api = EventHubApi::new(
        EventHubApiConfig {
            host: config.http_host.clone(),
            port: config.http_port,
            allowed_origins: EventHubApiConfig::parse_origins(&config.cors_allowed_origins),
        },
        session_manager.clone(),
    );

    Runner::new()
        .with_named_process("eventscope_api", api.into_runner_process())
        .with_closer(move || async move {
            // Receivers are closed before spans are flushed
            info!("Stopping monitor session");
            session_manager.stop().await;
            info!("Shutting down telemetry");
            shutdown_telemetry(telemetry_providers);
            Ok(())
        })
        .with_closer_timeout(config.shutdown_timeout())
        .run()
        .await;
}

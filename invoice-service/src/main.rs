//! Invoice Service entry point.

use invoice_service::config::InvoiceConfig;
use invoice_service::services::init_metrics;
use invoice_service::startup::Application;

use service_core::observability::init_tracing;
use std::time::Duration;
use tokio::signal;

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Load configuration
    let config = InvoiceConfig::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    // Initialize tracing
    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting invoice-service"
    );

    // Initialize metrics
    init_metrics();

    // Log configuration (mask sensitive values)
    tracing::info!(
        service_name = %config.service_name,
        port = %config.common.port,
        db_max_connections = %config.database.max_connections,
        db_min_connections = %config.database.min_connections,
        registry_base_url = %config.registry.base_url,
        sync_enabled = %config.sync.enabled,
        sync_interval_secs = %config.sync.interval_secs,
        "Configuration loaded"
    );

    // Build and run application
    let app = Application::build(config).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to build application");
        std::io::Error::other(format!("Application build error: {}", e))
    })?;

    let cancel = app.cancellation_token();
    let mut app_task = tokio::spawn(app.run_until_stopped());

    // Run with graceful shutdown: cancellation lets an in-flight run close
    // its checkpoint before the process exits.
    tokio::select! {
        result = &mut app_task => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Application error");
                    return Err(e);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Application task panicked");
                    return Err(std::io::Error::other(format!("Application task error: {}", e)));
                }
            }
        }
        _ = shutdown_signal() => {
            cancel.cancel();
            if tokio::time::timeout(Duration::from_secs(30), app_task)
                .await
                .is_err()
            {
                tracing::warn!("Graceful shutdown timed out");
            }
        }
    }

    tracing::info!("Service shutdown complete");
    Ok(())
}

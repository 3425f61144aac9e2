//! Application startup and lifecycle management.

use crate::config::InvoiceConfig;
use crate::models::ModuleType;
use crate::services::{
    AuditLog, Database, InvoiceLocks, InvoiceService, KsefClient, PaymentSynchronizer,
    PgModuleGateway, RuleEngine, SyncScheduler, Synchronizer, get_metrics, init_metrics,
};
use crate::services::store::ModuleGateway;
use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use serde_json::json;
use service_core::error::AppError;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: InvoiceConfig,
    pub db: Arc<Database>,
    pub invoices: InvoiceService,
    pub payments: PaymentSynchronizer,
    pub audit: AuditLog,
    pub synchronizer: Arc<Synchronizer>,
    /// Exposes the on-demand trigger to the surrounding command handlers.
    pub scheduler: Arc<SyncScheduler>,
}

/// State for health check endpoints.
#[derive(Clone)]
struct HealthState {
    db: Arc<Database>,
}

/// Health check endpoint for Docker/K8s liveness probes.
async fn health_check(State(state): State<HealthState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => {
            tracing::debug!("Health check passed");
            (
                StatusCode::OK,
                Json(json!({
                    "status": "ok",
                    "service": "invoice-service",
                    "version": env!("CARGO_PKG_VERSION")
                })),
            )
        }
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed - database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": "invoice-service",
                    "error": e.to_string()
                })),
            )
        }
    }
}

/// Readiness check endpoint for K8s readiness probes.
async fn readiness_check(State(state): State<HealthState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => {
            tracing::debug!("Readiness check passed");
            StatusCode::OK
        }
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Metrics endpoint for Prometheus scraping.
async fn metrics_handler() -> impl IntoResponse {
    let metrics = get_metrics();
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        metrics,
    )
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
    scheduler: Arc<SyncScheduler>,
    cancel: CancellationToken,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: InvoiceConfig) -> Result<Self, AppError> {
        Self::build_internal(config, true).await
    }

    /// Build the application without running migrations.
    /// Use this in tests when migrations are already applied by the test harness.
    pub async fn build_without_migrations(config: InvoiceConfig) -> Result<Self, AppError> {
        Self::build_internal(config, false).await
    }

    async fn build_internal(
        config: InvoiceConfig,
        run_migrations: bool,
    ) -> Result<Self, AppError> {
        // Initialize metrics
        init_metrics();

        // Connect to database
        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        // Run migrations only if requested
        if run_migrations {
            db.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;
        }

        let db = Arc::new(db);

        // Wire the core services; the Database implements every store trait.
        let locks = Arc::new(InvoiceLocks::new());
        let audit = AuditLog::new(db.clone());
        let engine = RuleEngine::new(db.clone());
        let invoices = InvoiceService::new(db.clone(), engine.clone(), audit.clone(), locks.clone());

        let gateways: Vec<Arc<dyn ModuleGateway>> = vec![
            Arc::new(PgModuleGateway::new(&db, ModuleType::Feed)),
            Arc::new(PgModuleGateway::new(&db, ModuleType::Sale)),
            Arc::new(PgModuleGateway::new(&db, ModuleType::Gas)),
        ];
        let payments =
            PaymentSynchronizer::new(db.clone(), audit.clone(), gateways, locks.clone());

        let registry = Arc::new(KsefClient::new(
            &config.registry.base_url,
            &config.registry.access_token,
            config.registry.request_timeout(),
        )?);
        let synchronizer = Arc::new(Synchronizer::new(
            registry,
            db.clone(),
            db.clone(),
            engine,
            audit.clone(),
            locks,
            config.registry.own_tax_id.clone(),
            config.sync.concurrency,
            config.sync.list_retry_max_elapsed(),
        ));

        let cancel = CancellationToken::new();
        let scheduler = Arc::new(SyncScheduler::new(
            synchronizer.clone(),
            config.sync.interval(),
            cancel.clone(),
        ));

        let state = AppState {
            config: config.clone(),
            db,
            invoices,
            payments,
            audit,
            synchronizer,
            scheduler: scheduler.clone(),
        };

        // Bind HTTP listener for the operational shell
        let addr: SocketAddr = format!("{}:{}", config.common.host, config.common.port)
            .parse()
            .map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("Invalid listen address: {}", e))
            })?;
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Invoice service listener bound");

        Ok(Self {
            port,
            listener,
            state,
            scheduler,
            cancel,
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get a reference to the shared application state.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Token that stops the synchronization scheduler and, between invoices,
    /// any in-flight run.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the application until the scheduler is cancelled.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        // Build minimal HTTP router (health + metrics)
        let health_state = HealthState {
            db: self.state.db.clone(),
        };

        let router = Router::new()
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(health_state);

        let sync_enabled = self.state.config.sync.enabled;
        tracing::info!(
            service = "invoice-service",
            version = env!("CARGO_PKG_VERSION"),
            port = self.port,
            sync_enabled = sync_enabled,
            "Service ready"
        );

        if sync_enabled {
            tokio::select! {
                result = axum::serve(self.listener, router) => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "HTTP server error");
                        return Err(std::io::Error::other(format!("HTTP server error: {}", e)));
                    }
                }
                _ = self.scheduler.run() => {}
            }
        } else {
            tracing::info!("Synchronization scheduler disabled by configuration");
            tokio::select! {
                result = axum::serve(self.listener, router) => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "HTTP server error");
                        return Err(std::io::Error::other(format!("HTTP server error: {}", e)));
                    }
                }
                _ = self.cancel.cancelled() => {}
            }
        }

        Ok(())
    }
}

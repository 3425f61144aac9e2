//! Configuration module for invoice-service.

use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct InvoiceConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub registry: RegistryConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Base URL of the national e-invoice exchange.
    pub base_url: String,
    pub access_token: String,
    /// Per-call timeout for registry requests.
    pub request_timeout_secs: u64,
    /// The farm's own NIP; decides invoice direction during ingestion.
    pub own_tax_id: String,
}

impl RegistryConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Concurrent fetches within one run.
    pub concurrency: usize,
    /// Total retry budget for the reference-listing call.
    pub list_retry_max_elapsed_secs: u64,
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn list_retry_max_elapsed(&self) -> Duration {
        Duration::from_secs(self.list_retry_max_elapsed_secs)
    }
}

impl InvoiceConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "invoice-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2),
            },
            registry: RegistryConfig {
                base_url: env::var("KSEF_BASE_URL")
                    .unwrap_or_else(|_| "https://ksef.mf.gov.pl".to_string()),
                access_token: env::var("KSEF_ACCESS_TOKEN").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("KSEF_ACCESS_TOKEN is required"))
                })?,
                request_timeout_secs: env::var("KSEF_REQUEST_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
                own_tax_id: env::var("OWN_TAX_ID").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("OWN_TAX_ID is required"))
                })?,
            },
            sync: SyncConfig {
                enabled: env::var("SYNC_ENABLED")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(true),
                interval_secs: env::var("SYNC_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(900),
                concurrency: env::var("SYNC_CONCURRENCY")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(4),
                list_retry_max_elapsed_secs: env::var("SYNC_LIST_RETRY_MAX_ELAPSED_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            },
        })
    }
}

//! External e-invoice registry client.
//!
//! The registry is treated as unreliable: every call carries its own timeout
//! and maps transport failures to `RegistryUnavailable` so the caller can
//! decide between per-invoice failure and aborting the run.

use crate::services::metrics::REGISTRY_CALL_DURATION;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use service_core::error::AppError;
use std::time::Duration;

/// Reference to one invoice held by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceReference {
    /// KSeF reference number, unique per invoice.
    pub reference_number: String,
    /// When the registry acquired the invoice.
    pub acquired_utc: DateTime<Utc>,
}

/// Registry access used by the synchronization job.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// References of invoices the registry acquired after `since`.
    async fn list_references_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<InvoiceReference>, AppError>;

    /// Raw invoice document for one reference.
    async fn fetch_document(&self, reference: &InvoiceReference) -> Result<Vec<u8>, AppError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    invoices: Vec<QueryEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryEntry {
    ksef_reference_number: String,
    acquisition_timestamp: DateTime<Utc>,
}

/// HTTP client for the national KSeF exchange.
pub struct KsefClient {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl KsefClient {
    pub fn new(
        base_url: impl Into<String>,
        access_token: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| {
                AppError::InternalError(anyhow::anyhow!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        })
    }

    fn map_transport_error(call: &str, err: reqwest::Error) -> AppError {
        if err.is_timeout() {
            AppError::RegistryUnavailable(format!("{call} timed out"))
        } else {
            AppError::RegistryUnavailable(format!("{call} failed: {err}"))
        }
    }
}

#[async_trait]
impl RegistryClient for KsefClient {
    async fn list_references_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<InvoiceReference>, AppError> {
        let timer = REGISTRY_CALL_DURATION
            .with_label_values(&["list_references"])
            .start_timer();

        let url = format!("{}/api/online/Query/Invoice/Sync", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(&[("acquisitionTimestampThresholdFrom", since.to_rfc3339())])
            .send()
            .await
            .map_err(|e| Self::map_transport_error("reference listing", e))?;

        if !response.status().is_success() {
            return Err(AppError::RegistryUnavailable(format!(
                "reference listing returned {}",
                response.status()
            )));
        }

        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| Self::map_transport_error("reference listing", e))?;

        timer.observe_duration();

        Ok(body
            .invoices
            .into_iter()
            .map(|entry| InvoiceReference {
                reference_number: entry.ksef_reference_number,
                acquired_utc: entry.acquisition_timestamp,
            })
            .collect())
    }

    async fn fetch_document(&self, reference: &InvoiceReference) -> Result<Vec<u8>, AppError> {
        let timer = REGISTRY_CALL_DURATION
            .with_label_values(&["fetch_document"])
            .start_timer();

        let url = format!(
            "{}/api/online/Invoice/Get/{}",
            self.base_url, reference.reference_number
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| Self::map_transport_error("document fetch", e))?;

        if !response.status().is_success() {
            return Err(AppError::RegistryUnavailable(format!(
                "document fetch for {} returned {}",
                reference.reference_number,
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Self::map_transport_error("document fetch", e))?;

        timer.observe_duration();

        Ok(bytes.to_vec())
    }
}

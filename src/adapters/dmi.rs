//! HTTP client for the DMI forecast EDR API.
//!
//! Cubes are requested as NetCDF (`f=NetCDF`, the API is case-sensitive) with
//! the API key in the query string. Lambert conformal collections are
//! requested on their native grid, everything else in CRS84.

use crate::domain::model::{BoundingBox, Collection, Payload};
use crate::utils::error::{IngestError, Result};
use reqwest::Client;
use std::time::Duration;
use url::Url;

const OUTPUT_FORMAT: &str = "NetCDF";
const MAX_ERROR_BODY: usize = 500;

#[derive(Debug, Clone)]
pub struct DmiClient {
    client: Client,
    base_url: String,
    api_key: String,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl DmiClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
        retry_attempts: u32,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("dmi-ingest/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            retry_attempts,
            retry_delay: Duration::from_secs(5),
        })
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn cube_url(
        &self,
        collection: &Collection,
        parameter: &str,
        bbox: &BoundingBox,
    ) -> Result<Url> {
        let invalid = |reason: String| IngestError::InvalidConfigValueError {
            field: "dmi_api_url".to_string(),
            value: self.base_url.clone(),
            reason,
        };

        let mut url = Url::parse(&self.base_url).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| invalid("URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["collections", collection.id(), "cube"]);

        url.query_pairs_mut()
            .append_pair("api-key", &self.api_key)
            .append_pair("crs", collection.request_crs().as_str())
            .append_pair("parameter-name", parameter)
            .append_pair("bbox", &bbox.to_string())
            .append_pair("f", OUTPUT_FORMAT);

        Ok(url)
    }

    /// Downloads one forecast cube, retrying transient failures with a linear back-off.
    pub async fn fetch_cube(
        &self,
        collection: &Collection,
        parameter: &str,
        bbox: &BoundingBox,
    ) -> Result<Payload> {
        let url = self.cube_url(collection, parameter, bbox)?;
        tracing::debug!("Making API request to: {}", redact(&url));

        let mut attempt = 0;
        loop {
            match self.try_fetch(&url).await {
                Ok(payload) => return Ok(payload),
                Err(e) if e.is_retryable() && attempt < self.retry_attempts => {
                    attempt += 1;
                    let delay = self.retry_delay * attempt;
                    tracing::warn!(
                        "⚠️ DMI request failed ({}), retry {}/{} in {:?}",
                        e,
                        attempt,
                        self.retry_attempts,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_fetch(&self, url: &Url) -> Result<Payload> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| IngestError::ApiError(e.without_url()))?;

        let status = response.status();
        tracing::debug!("API response status: {}", status);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::ApiStatusError {
                status: status.as_u16(),
                message: truncate(body.trim(), MAX_ERROR_BODY),
            });
        }

        let payload = response
            .bytes()
            .await
            .map_err(|e| IngestError::ApiError(e.without_url()))?;
        if payload.is_empty() {
            return Err(IngestError::invalid_data("DMI API returned an empty body"));
        }

        tracing::debug!("Received {} bytes", payload.len());
        Ok(payload.to_vec())
    }
}

/// The API key travels in the query string; keep it out of the logs.
pub fn redact(url: &Url) -> String {
    let mut redacted = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let value = if k == "api-key" { "***".into() } else { v };
            (k.into_owned(), value.into_owned())
        })
        .collect();
    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted.to_string()
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

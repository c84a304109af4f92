//! Access token handling for the REST client

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Credentials;
use crate::error::StoreError;

/// Refresh this long before the reported expiry
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Produces `Authorization` header values for store requests
pub struct TokenSource {
    credentials: Credentials,
    metadata_endpoint: String,
    http: Client,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenSource {
    pub fn new(credentials: Credentials, metadata_endpoint: impl Into<String>, http: Client) -> Self {
        Self {
            credentials,
            metadata_endpoint: metadata_endpoint.into(),
            http,
            cached: Mutex::new(None),
        }
    }

    /// Header value for the next request, `None` for anonymous access
    pub async fn authorization(&self) -> Result<Option<String>, StoreError> {
        match &self.credentials {
            Credentials::Anonymous => Ok(None),
            Credentials::AccessToken(token) => Ok(Some(format!("Bearer {}", token))),
            Credentials::MetadataServer => {
                let token = self.metadata_token().await?;
                Ok(Some(format!("Bearer {}", token)))
            }
        }
    }

    /// Drop the cached token so the next request fetches a fresh one
    pub fn invalidate(&self) {
        *self.cached.lock() = None;
    }

    async fn metadata_token(&self) -> Result<String, StoreError> {
        let cached = self.cached.lock().clone();
        if let Some(cached) = cached {
            if Instant::now() < cached.refresh_at {
                return Ok(cached.value);
            }
        }

        // Concurrent refreshes are harmless; the last one wins the cache.
        debug!("Fetching access token from metadata server");
        let response = self
            .http
            .get(&self.metadata_endpoint)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| StoreError::Auth(format!("metadata server unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            warn!("Metadata server refused token request: {}", status);
            return Err(StoreError::Auth(format!(
                "metadata server returned {}",
                status.as_u16()
            )));
        }

        let token: MetadataToken = response
            .json()
            .await
            .map_err(|e| StoreError::Auth(format!("invalid token response: {}", e)))?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(EXPIRY_MARGIN);
        *self.cached.lock() = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });

        Ok(token.access_token)
    }
}

//! HTTP client for the partner profile API.

use super::{DataSource, DataSourceError, PartnerProfile, ProfileResponse};
use crate::domain::WalletAddress;
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

/// Partner data source over `GET {base}/v1/profiles/{wallet}`.
#[derive(Debug, Clone)]
pub struct PartnerDataSource {
    client: Client,
    base_url: String,
    max_elapsed: Duration,
}

impl PartnerDataSource {
    /// Create a new partner data source. `max_elapsed` caps the retry loop.
    pub fn new(base_url: String, max_elapsed: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            max_elapsed,
        }
    }

    fn profile_url(&self, wallet: &WalletAddress) -> String {
        format!("{}/v1/profiles/{}", self.base_url, wallet)
    }
}

#[async_trait]
impl DataSource for PartnerDataSource {
    async fn fetch_profile(
        &self,
        wallet: &WalletAddress,
    ) -> Result<Option<PartnerProfile>, DataSourceError> {
        let url = self.profile_url(wallet);
        debug!(%wallet, "Fetching partner profile");

        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(self.max_elapsed),
            ..Default::default()
        };

        let body = retry(backoff, || async {
            let response = self.client.get(&url).send().await.map_err(|e| {
                backoff::Error::transient(DataSourceError::NetworkError(e.to_string()))
            })?;

            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(backoff::Error::transient(DataSourceError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(DataSourceError::HttpError {
                    status: status.as_u16(),
                    message: "Server error".to_string(),
                }));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(DataSourceError::HttpError {
                    status: status.as_u16(),
                    message: "Client error".to_string(),
                }));
            }

            response
                .json::<ProfileResponse>()
                .await
                .map(Some)
                .map_err(|e| backoff::Error::permanent(DataSourceError::ParseError(e.to_string())))
        })
        .await?;

        body.map(|b| b.into_profile(wallet)).transpose()
    }
}

//! Per-hour snapshot retrieval from the upstream balloon service.

use crate::config::{Config, UpstreamLayout};
use crate::parser::parse_points;
use crate::retry::{with_retry, RetryConfig, RetryError};
use reqwest::StatusCode;
use shared::models::BalloonPoint;
use std::future::Future;
use std::ops::RangeInclusive;
use thiserror::Error;

/// Hours of history published upstream, `0` being the most recent.
pub const HOURS: RangeInclusive<u8> = 0..=23;

#[derive(Debug, Error)]
pub enum HourError {
    #[error("hour {0} is outside 0..=23")]
    OutOfRange(u8),
    #[error("request for hour {hour} failed: {source}")]
    Request {
        hour: u8,
        #[source]
        source: reqwest::Error,
    },
    #[error("hour {hour} returned HTTP {status}")]
    Status { hour: u8, status: StatusCode },
    #[error("hour {hour} body is not JSON: {source}")]
    Body {
        hour: u8,
        #[source]
        source: serde_json::Error,
    },
}

/// Anything able to produce one hour of balloon points.
pub trait HourSource {
    fn fetch_hour(
        &self,
        hour: u8,
    ) -> impl Future<Output = Result<Vec<BalloonPoint>, HourError>> + Send;
}

/// HTTP client for the upstream balloon service.
#[derive(Clone, Debug)]
pub struct HourFetcher {
    client: reqwest::Client,
    base_url: String,
    layout: UpstreamLayout,
    retry: RetryConfig,
}

impl HourFetcher {
    pub fn new(config: &Config) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base.trim_end_matches('/').to_string(),
            layout: config.upstream_layout,
            retry: RetryConfig::with_max_retries(config.max_retries),
        })
    }

    /// Build the URL for a given hour.
    ///
    /// `Api` layout: `{base}/balloons/7`, `Treasure` layout: `{base}/07.json`.
    pub fn hour_url(&self, hour: u8) -> String {
        match self.layout {
            UpstreamLayout::Api => format!("{}/balloons/{}", self.base_url, hour),
            UpstreamLayout::Treasure => format!("{}/{:02}.json", self.base_url, hour),
        }
    }

    async fn try_fetch(&self, hour: u8) -> Result<Vec<BalloonPoint>, RetryError<HourError>> {
        let url = self.hour_url(hour);
        log::debug!("Fetching hour {} from {}", hour, url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| RetryError::Retryable(HourError::Request { hour, source }))?;

        let status = response.status();
        if !status.is_success() {
            let err = HourError::Status { hour, status };
            return Err(if status.is_server_error() {
                RetryError::Retryable(err)
            } else {
                RetryError::NonRetryable(err)
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| RetryError::Retryable(HourError::Request { hour, source }))?;
        let raw: serde_json::Value = serde_json::from_slice(&body)
            .map_err(|source| RetryError::NonRetryable(HourError::Body { hour, source }))?;

        Ok(parse_points(&raw).points)
    }
}

impl HourSource for HourFetcher {
    async fn fetch_hour(&self, hour: u8) -> Result<Vec<BalloonPoint>, HourError> {
        if !HOURS.contains(&hour) {
            return Err(HourError::OutOfRange(hour));
        }

        with_retry(move || self.try_fetch(hour), &self.retry)
            .await
            .inspect_err(|err| log::warn!("No data for hour {}: {}", hour, err))
    }
}

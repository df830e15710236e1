//! Feature Service Client
//!
//! Read-only HTTP calls to the external wallet/PIN feature service.
//! Every request goes through the `feature-service` circuit breaker.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::breaker::{BreakerError, BreakerRegistry, CircuitBreaker, guard_with};
use crate::config::FeatureServiceConfig;
use crate::core_types::{Amount, UserId};

const WALLET_PATH: &str = "/api/v1/wallets/me";
const PIN_STATUS_PATH: &str = "/api/v1/wallets/pin/status";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeatureClientError {
    #[error("Feature service is not configured")]
    NotConfigured,

    #[error("Circuit breaker '{name}' is open")]
    CircuitOpen { name: String },

    #[error("Feature service request failed: {0}")]
    Transport(String),

    #[error("Feature service returned {status}: {message}")]
    Upstream {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Failed to decode feature service response: {0}")]
    Decode(String),
}

impl FeatureClientError {
    pub fn code(&self) -> &'static str {
        match self {
            FeatureClientError::NotConfigured => "NOT_CONFIGURED",
            FeatureClientError::CircuitOpen { .. } => "CIRCUIT_OPEN",
            FeatureClientError::Transport(_) => "UPSTREAM_UNAVAILABLE",
            FeatureClientError::Upstream { .. } => "UPSTREAM_ERROR",
            FeatureClientError::Decode(_) => "UPSTREAM_DECODE_ERROR",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            FeatureClientError::NotConfigured => 500,
            FeatureClientError::CircuitOpen { .. } | FeatureClientError::Transport(_) => 503,
            FeatureClientError::Upstream { status, .. } if *status < 500 => *status,
            FeatureClientError::Upstream { .. } | FeatureClientError::Decode(_) => 502,
        }
    }

    /// Whether this outcome means the dependency itself is unhealthy.
    ///
    /// Client errors (4xx) are answers, not outages.
    pub fn is_dependency_failure(&self) -> bool {
        match self {
            FeatureClientError::Transport(_) => true,
            FeatureClientError::Upstream { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<BreakerError<FeatureClientError>> for FeatureClientError {
    fn from(e: BreakerError<FeatureClientError>) -> Self {
        match e {
            BreakerError::CircuitOpen { name } => FeatureClientError::CircuitOpen { name },
            BreakerError::Inner(inner) => inner,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteWalletBalance {
    pub user_id: UserId,
    pub balance: Amount,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemotePinStatus {
    pub pin_set: bool,
    pub is_locked: bool,
    pub locked_until: Option<DateTime<Utc>>,
    pub failed_attempts: u32,
    pub max_attempts: u32,
}

#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
    error: Option<EnvelopeError>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct EnvelopeError {
    code: String,
    message: String,
}

fn upstream_error(status: u16, body: &[u8]) -> FeatureClientError {
    let parsed = serde_json::from_slice::<Envelope<serde_json::Value>>(body)
        .ok()
        .and_then(|env| env.error)
        .unwrap_or_default();
    let message = if parsed.message.trim().is_empty() {
        format!("request failed with status {}", status)
    } else {
        parsed.message
    };
    FeatureClientError::Upstream {
        status,
        code: parsed.code,
        message,
    }
}

/// Decode a `{success, data, error}` envelope
fn decode_envelope<T: DeserializeOwned>(status: u16, body: &[u8]) -> Result<T, FeatureClientError> {
    if status >= 400 {
        return Err(upstream_error(status, body));
    }
    let env: Envelope<T> =
        serde_json::from_slice(body).map_err(|e| FeatureClientError::Decode(e.to_string()))?;
    if !env.success {
        return Err(upstream_error(status, body));
    }
    env.data
        .ok_or_else(|| FeatureClientError::Decode("missing data".to_string()))
}

/// PIN status comes either wrapped in an envelope or as the raw object
fn decode_pin_status(status: u16, body: &[u8]) -> Result<RemotePinStatus, FeatureClientError> {
    if status >= 400 {
        return Err(upstream_error(status, body));
    }
    if let Ok(Envelope {
        success: true,
        data: Some(data),
        ..
    }) = serde_json::from_slice::<Envelope<RemotePinStatus>>(body)
    {
        return Ok(data);
    }
    serde_json::from_slice(body).map_err(|e| FeatureClientError::Decode(e.to_string()))
}

pub struct FeatureClient {
    base_url: String,
    client: reqwest::Client,
    breaker: Arc<CircuitBreaker>,
}

impl FeatureClient {
    /// Client using the process-wide `feature-service` breaker
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FeatureClientError> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(FeatureClientError::NotConfigured);
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FeatureClientError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            client,
            breaker: BreakerRegistry::global().feature_service(),
        })
    }

    pub fn from_config(config: &FeatureServiceConfig) -> Result<Self, FeatureClientError> {
        Self::new(&config.base_url, Duration::from_millis(config.timeout_ms))
    }

    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub async fn wallet_balance(&self, auth: &str) -> Result<RemoteWalletBalance, FeatureClientError> {
        let (status, body) = self.get(WALLET_PATH, auth).await?;
        decode_envelope(status, &body)
    }

    pub async fn pin_status(&self, auth: &str) -> Result<RemotePinStatus, FeatureClientError> {
        let (status, body) = self.get(PIN_STATUS_PATH, auth).await?;
        decode_pin_status(status, &body)
    }

    /// GET through the breaker. 4xx responses are returned as bodies, not failures.
    async fn get(&self, path: &str, auth: &str) -> Result<(u16, Vec<u8>), FeatureClientError> {
        let url = format!("{}{}", self.base_url, path);
        let call = async {
            let mut req = self
                .client
                .get(&url)
                .header(reqwest::header::ACCEPT, "application/json");
            if !auth.trim().is_empty() {
                req = req.header(reqwest::header::AUTHORIZATION, auth);
            }
            let resp = req
                .send()
                .await
                .map_err(|e| FeatureClientError::Transport(e.to_string()))?;
            let status = resp.status().as_u16();
            let body = resp
                .bytes()
                .await
                .map_err(|e| FeatureClientError::Transport(e.to_string()))?;
            if status >= 500 {
                return Err(upstream_error(status, &body));
            }
            Ok::<_, FeatureClientError>((status, body.to_vec()))
        };

        let result = guard_with(&self.breaker, call, FeatureClientError::is_dependency_failure)
            .await
            .map_err(FeatureClientError::from);
        match &result {
            Ok((status, _)) => debug!(url = %url, status, "Feature service call"),
            Err(e) => warn!(url = %url, error = %e, "Feature service call failed"),
        }
        result
    }
}

//! Prediction client for the external image classification service.
//!
//! Implements the inference service contract:
//! - `POST <prediction_url>` with `{"filePath": "<file id>"}`
//! - `200` response `{"predictions": {"<class>": <confidence>, ...}}`
//! - Any other status is a failure; no retries (the caller drops the file)

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::aggregate::ClassScores;
use crate::version::SHELFSORT_VERSION;

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("prediction request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("prediction service returned status {status}")]
    Status { status: u16 },

    #[error("invalid prediction response: {0}")]
    InvalidResponse(String),
}

/// Classifies one stored file.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn classify(&self, file_id: &str) -> Result<ClassScores, OracleError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictRequest<'a> {
    file_path: &'a str,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    predictions: ClassScores,
}

#[derive(Debug, Clone)]
pub struct HttpOracleConfig {
    pub url: String,
    pub timeout: Duration,
}

impl Default for HttpOracleConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000/predict".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

pub struct HttpOracle {
    url: String,
    client: reqwest::Client,
}

impl HttpOracle {
    pub fn new(config: HttpOracleConfig) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .user_agent(format!("shelfsort/{}", SHELFSORT_VERSION))
            .timeout(config.timeout)
            .build()
            .map_err(OracleError::Client)?;

        Ok(Self {
            url: config.url,
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Oracle for HttpOracle {
    async fn classify(&self, file_id: &str) -> Result<ClassScores, OracleError> {
        let response = self
            .client
            .post(&self.url)
            .json(&PredictRequest { file_path: file_id })
            .send()
            .await
            .map_err(OracleError::Request)?;

        let status = response.status();
        if !status.is_success() {
            return Err(OracleError::Status {
                status: status.as_u16(),
            });
        }

        let body: PredictResponse = response
            .json()
            .await
            .map_err(|e| OracleError::InvalidResponse(e.to_string()))?;

        if let Some((class, confidence)) = body.predictions.iter().find(|(_, c)| !c.is_finite()) {
            return Err(OracleError::InvalidResponse(format!(
                "non-finite confidence {confidence} for class '{class}'"
            )));
        }

        tracing::debug!(file = %file_id, classes = body.predictions.len(), "Prediction received");
        Ok(body.predictions)
    }
}

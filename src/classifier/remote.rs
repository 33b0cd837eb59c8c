// Remote classifier
// JSON request/response classification against a network endpoint

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::audio::AudioWindow;
use crate::classifier::backend::{ClassifierBackend, ClassifierError, SoundClassifier};
use crate::classifier::discovery::BackendProbe;
use crate::classifier::types::{Classification, ClassificationSource, SoundLabel};

#[derive(Debug, Serialize)]
struct ClassifyRequest<'a> {
    sample_rate: u32,
    digest: String,
    samples: &'a [f32],
}

/// Body returned by the endpoint
#[derive(Debug, Deserialize)]
pub struct ClassifyResponse {
    pub label: String,
    pub confidence: f32,
}

/// Classifier that posts each window to `endpoint` and reads back a label
///
/// `POST {endpoint}` with `{sample_rate, digest, samples}` answers
/// `{label, confidence}`; `GET {endpoint}/health` answers 2xx when ready.
pub struct HttpClassifier {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpClassifier {
    pub fn new(endpoint: impl Into<String>, request_timeout: Duration) -> Result<Self, ClassifierError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ClassifierError::Transport(e.to_string()))?;

        Ok(HttpClassifier {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn health_url(&self) -> String {
        format!("{}/health", self.endpoint)
    }
}

/// Validate a decoded response and turn it into a classification
pub fn parse_response(response: ClassifyResponse) -> Result<Classification, ClassifierError> {
    if response.label.trim().is_empty() {
        return Err(ClassifierError::MalformedResponse("empty label".to_string()));
    }
    if !response.confidence.is_finite() || !(0.0..=1.0).contains(&response.confidence) {
        return Err(ClassifierError::MalformedResponse(format!(
            "confidence {} outside [0, 1]",
            response.confidence
        )));
    }

    Ok(Classification::new(
        SoundLabel::parse(&response.label),
        response.confidence,
        ClassificationSource::Remote,
    ))
}

#[async_trait]
impl SoundClassifier for HttpClassifier {
    fn backend(&self) -> ClassifierBackend {
        ClassifierBackend::Remote
    }

    async fn classify(&self, window: &AudioWindow) -> Result<Classification, ClassifierError> {
        if window.is_empty() {
            return Err(ClassifierError::InvalidWindow("empty window".to_string()));
        }

        let request = ClassifyRequest {
            sample_rate: window.sample_rate,
            digest: window.digest(),
            samples: &window.samples,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    ClassifierError::Unavailable(e.to_string())
                } else {
                    ClassifierError::Transport(e.to_string())
                }
            })?
            .error_for_status()
            .map_err(|e| ClassifierError::Transport(e.to_string()))?;

        let body: ClassifyResponse = response
            .json()
            .await
            .map_err(|e| ClassifierError::MalformedResponse(e.to_string()))?;

        parse_response(body)
    }
}

#[async_trait]
impl BackendProbe for HttpClassifier {
    fn kind(&self) -> ClassifierBackend {
        ClassifierBackend::Remote
    }

    async fn probe(&self) -> bool {
        match self.client.get(self.health_url()).send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                log::info!("Remote classifier at {} not reachable: {}", self.endpoint, err);
                false
            }
        }
    }
}

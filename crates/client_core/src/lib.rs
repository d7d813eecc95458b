use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Client, Response,
};
use shared::{
    domain::{FoodSummary, Prediction},
    error::ErrorBody,
    protocol::{
        CorrectionAck, CORRECT_LABEL_FIELD, FOOD_ROUTE, IMAGE_FIELD, UPDATE_LABEL_ROUTE,
        UPLOAD_ROUTE,
    },
};
use thiserror::Error;
use tracing::{info, warn};

pub mod artifact;
pub mod config;
pub mod error;
pub mod media;
pub mod workflow;

pub use artifact::{ArtifactSummary, ImageArtifact, PreviewRef};
pub use config::{load_settings, ClientSettings};
pub use error::{CapabilityGap, WorkflowError};
pub use media::{MediaCapability, MissingMediaCapability};
pub use workflow::{
    CameraStart, SubmitOutcome, WorkflowAction, WorkflowController, WorkflowEvent,
    WorkflowSnapshot, WorkflowState,
};

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("server returned {status}{}", .detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default())]
    Status { status: u16, detail: Option<String> },
    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl ClassifierError {
    /// Message supplied by the server, if it sent one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Status { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }
}

/// Remote classification and correction endpoints.
#[async_trait]
pub trait ClassifierBackend: Send + Sync {
    async fn classify(&self, image: &ImageArtifact) -> Result<Prediction, ClassifierError>;
    async fn submit_correction(
        &self,
        image: &ImageArtifact,
        correct_label: &str,
    ) -> Result<CorrectionAck, ClassifierError>;
}

pub struct MissingClassifier;

#[async_trait]
impl ClassifierBackend for MissingClassifier {
    async fn classify(&self, _image: &ImageArtifact) -> Result<Prediction, ClassifierError> {
        Err(ClassifierError::Transport(
            "classifier endpoint is unavailable".into(),
        ))
    }

    async fn submit_correction(
        &self,
        _image: &ImageArtifact,
        _correct_label: &str,
    ) -> Result<CorrectionAck, ClassifierError> {
        Err(ClassifierError::Transport(
            "correction endpoint is unavailable".into(),
        ))
    }
}

/// HTTP client for the classifier (`/upload`, `/update-label`) and the food API.
pub struct SeeFoodClient {
    http: Client,
    classifier_url: String,
    api_url: String,
}

impl SeeFoodClient {
    pub fn new(classifier_url: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            classifier_url: trim_base(classifier_url.into()),
            api_url: trim_base(api_url.into()),
        }
    }

    pub fn from_settings(settings: &ClientSettings) -> Result<Self> {
        let http = Client::builder()
            .timeout(settings.request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            http,
            classifier_url: config::base_url(&settings.classifier_url),
            api_url: config::base_url(&settings.api_url),
        })
    }

    pub async fn list_foods(&self) -> Result<Vec<FoodSummary>> {
        let foods = self
            .http
            .get(format!("{}{FOOD_ROUTE}", self.api_url))
            .send()
            .await
            .context("failed to reach food api")?
            .error_for_status()?
            .json()
            .await
            .context("invalid food list payload")?;
        Ok(foods)
    }

    fn image_part(image: &ImageArtifact) -> Result<Part, ClassifierError> {
        Part::bytes(image.bytes().to_vec())
            .file_name(image.file_name().to_string())
            .mime_str(image.mime_type())
            .map_err(|e| ClassifierError::Transport(format!("invalid image mime type: {e}")))
    }

    async fn read_body(response: Response) -> Result<Vec<u8>, ClassifierError> {
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ClassifierError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(ClassifierError::Status {
                status: status.as_u16(),
                detail: ErrorBody::parse(&body),
            });
        }
        Ok(body.to_vec())
    }
}

#[async_trait]
impl ClassifierBackend for SeeFoodClient {
    async fn classify(&self, image: &ImageArtifact) -> Result<Prediction, ClassifierError> {
        let form = Form::new().part(IMAGE_FIELD, Self::image_part(image)?);
        let response = self
            .http
            .post(format!("{}{UPLOAD_ROUTE}", self.classifier_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ClassifierError::Transport(e.to_string()))?;
        let body = Self::read_body(response).await.inspect_err(|err| {
            warn!(artifact_id = image.id().0, %err, "classifier: upload rejected");
        })?;
        let prediction: Prediction =
            serde_json::from_slice(&body).map_err(|e| ClassifierError::Decode(e.to_string()))?;
        info!(
            artifact_id = image.id().0,
            predicted_class = %prediction.predicted_class,
            confidence = %prediction.confidence,
            "classifier: prediction received"
        );
        Ok(prediction)
    }

    async fn submit_correction(
        &self,
        image: &ImageArtifact,
        correct_label: &str,
    ) -> Result<CorrectionAck, ClassifierError> {
        let form = Form::new()
            .part(IMAGE_FIELD, Self::image_part(image)?)
            .text(CORRECT_LABEL_FIELD, correct_label.to_string());
        let response = self
            .http
            .post(format!("{}{UPDATE_LABEL_ROUTE}", self.classifier_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ClassifierError::Transport(e.to_string()))?;
        let body = Self::read_body(response).await?;
        // The success body is optional and not always JSON.
        let ack = serde_json::from_slice::<CorrectionAck>(&body).unwrap_or_default();
        info!(
            artifact_id = image.id().0,
            image_hash = %image.digest(),
            correct_label,
            "classifier: correction stored"
        );
        Ok(ack)
    }
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

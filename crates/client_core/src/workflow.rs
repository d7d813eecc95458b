//! Capture/upload workflow controller.
//!
//! One controller drives a single view: acquire an image from the camera or a file,
//! submit it to the classifier, show the prediction, and optionally send a correction.
//! State lives behind one async mutex that is never held across a device or network
//! await. Every reset and every new submission bumps a request token; a response is
//! applied only when the token and the artifact it was issued for are still current.

use std::{
    fmt,
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use shared::domain::{ArtifactId, ImageSource, Prediction};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::{
    artifact::{
        is_image_mime, ArtifactSummary, ImageArtifact, PreviewRef, CAPTURED_FILE_NAME,
        CAPTURED_MIME_TYPE,
    },
    error::{
        CapabilityGap, WorkflowError, GENERIC_CLASSIFICATION_FAILURE, GENERIC_CORRECTION_FAILURE,
    },
    media::{encode_jpeg, MediaCapability, MediaConstraints, StreamGuard, SurfaceDimensions},
    ClassifierBackend,
};

const DEFAULT_CAMERA_START_TIMEOUT: Duration = Duration::from_secs(5);
const SURFACE_POLL_INTERVAL: Duration = Duration::from_millis(20);
const DEFAULT_CORRECTION_ACK: &str = "Correction submitted!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkflowState {
    #[default]
    Idle,
    CameraRequesting,
    CameraActive,
    ImageReady,
    Submitting,
    ResultShown,
    CorrectionPending,
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::CameraRequesting => "camera_requesting",
            Self::CameraActive => "camera_active",
            Self::ImageReady => "image_ready",
            Self::Submitting => "submitting",
            Self::ResultShown => "result_shown",
            Self::CorrectionPending => "correction_pending",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowAction {
    RequestCamera,
    Capture,
    CloseCamera,
    SelectFile,
    Submit,
    OpenCorrection,
    EditCorrection,
    SubmitCorrection,
    CancelCorrection,
}

impl fmt::Display for WorkflowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RequestCamera => "request camera",
            Self::Capture => "capture",
            Self::CloseCamera => "close camera",
            Self::SelectFile => "select file",
            Self::Submit => "submit",
            Self::OpenCorrection => "open correction",
            Self::EditCorrection => "edit correction",
            Self::SubmitCorrection => "submit correction",
            Self::CancelCorrection => "cancel correction",
        };
        f.write_str(name)
    }
}

/// Notifications for a UI layer. Correction outcomes need an explicit acknowledgment;
/// everything else can be rendered inline.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowEvent {
    StateChanged(WorkflowState),
    PredictionReady(Prediction),
    InlineError(String),
    CorrectionAcknowledged(String),
    CorrectionRejected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraStart {
    Active(SurfaceDimensions),
    /// The workflow was reset while the camera was starting; the stream was released.
    Abandoned,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Nothing staged; the submit was ignored.
    Skipped,
    Shown(Prediction),
    /// A reset or newer submission happened first; the response was dropped.
    Superseded,
}

/// Everything a view needs to render the workflow.
#[derive(Debug, Clone, Default)]
pub struct WorkflowSnapshot {
    pub state: WorkflowState,
    pub artifact: Option<ArtifactSummary>,
    pub preview: Option<PreviewRef>,
    pub prediction: Option<Prediction>,
    pub correction_label: String,
    pub error: Option<String>,
    pub stream_active: bool,
    pub surface: Option<SurfaceDimensions>,
    pub correction_in_flight: bool,
}

#[derive(Default)]
struct WorkflowInner {
    state: WorkflowState,
    request_token: u64,
    last_artifact_id: u64,
    artifact: Option<ImageArtifact>,
    preview: Option<PreviewRef>,
    prediction: Option<Prediction>,
    correction_label: String,
    error: Option<String>,
    stream: Option<StreamGuard>,
    surface: Option<SurfaceDimensions>,
    correction_in_flight: bool,
}

impl WorkflowInner {
    fn release_stream(&mut self) {
        if let Some(guard) = self.stream.take() {
            guard.release();
        }
        self.surface = None;
    }

    fn release_preview(&mut self) {
        if let Some(preview) = self.preview.take() {
            debug!(artifact_id = preview.artifact_id().0, "workflow: preview released");
        }
    }

    fn stage_artifact(
        &mut self,
        source: ImageSource,
        file_name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> ArtifactSummary {
        self.last_artifact_id += 1;
        let artifact = ImageArtifact::new(
            ArtifactId(self.last_artifact_id),
            source,
            file_name,
            mime_type,
            bytes,
        );
        self.release_preview();
        self.preview = Some(PreviewRef::for_artifact(&artifact));
        self.prediction = None;
        self.correction_label.clear();
        self.error = None;
        let summary = artifact.summary();
        self.artifact = Some(artifact);
        summary
    }

    fn is_current(&self, token: u64, artifact_id: ArtifactId) -> bool {
        self.request_token == token
            && self.artifact.as_ref().map(ImageArtifact::id) == Some(artifact_id)
    }
}

pub struct WorkflowController {
    media: Arc<dyn MediaCapability>,
    classifier: Arc<dyn ClassifierBackend>,
    constraints: MediaConstraints,
    camera_start_timeout: Duration,
    inner: Mutex<WorkflowInner>,
    events: broadcast::Sender<WorkflowEvent>,
    /// Set while a camera start awaits the device, including one abandoned by a reset.
    acquiring: AtomicBool,
}

/// Frees the camera-start slot when the start finishes or its future is dropped.
struct AcquisitionSlot<'a>(&'a AtomicBool);

impl Drop for AcquisitionSlot<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl WorkflowController {
    pub fn new(media: Arc<dyn MediaCapability>, classifier: Arc<dyn ClassifierBackend>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            media,
            classifier,
            constraints: MediaConstraints::default(),
            camera_start_timeout: DEFAULT_CAMERA_START_TIMEOUT,
            inner: Mutex::new(WorkflowInner::default()),
            events,
            acquiring: AtomicBool::new(false),
        }
    }

    pub fn with_camera_timeout(mut self, timeout: Duration) -> Self {
        self.camera_start_timeout = timeout;
        self
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.events.subscribe()
    }

    pub async fn state(&self) -> WorkflowState {
        self.inner.lock().await.state
    }

    pub async fn snapshot(&self) -> WorkflowSnapshot {
        let inner = self.inner.lock().await;
        WorkflowSnapshot {
            state: inner.state,
            artifact: inner.artifact.as_ref().map(ImageArtifact::summary),
            preview: inner.preview.clone(),
            prediction: inner.prediction.clone(),
            correction_label: inner.correction_label.clone(),
            error: inner.error.clone(),
            stream_active: inner.stream.is_some(),
            surface: inner.surface,
            correction_in_flight: inner.correction_in_flight,
        }
    }

    /// Asks for the rear camera and waits, bounded, until the display surface has
    /// real frame dimensions. A start abandoned by [`reset`](Self::reset) still owns
    /// the device until it finishes; new requests fail with `DeviceInUse` meanwhile.
    pub async fn request_camera(&self) -> Result<CameraStart, WorkflowError> {
        let (token, _slot) = {
            let mut inner = self.inner.lock().await;
            if !matches!(
                inner.state,
                WorkflowState::Idle | WorkflowState::ImageReady | WorkflowState::ResultShown
            ) {
                return Err(invalid(inner.state, WorkflowAction::RequestCamera));
            }
            if !self.media.is_supported() {
                let err = WorkflowError::UnsupportedCapability(CapabilityGap::Unsupported);
                return Err(self.report(&mut inner, err));
            }
            if !self.media.is_secure_context() {
                let err = WorkflowError::UnsupportedCapability(CapabilityGap::InsecureContext);
                return Err(self.report(&mut inner, err));
            }
            if self.acquiring.swap(true, Ordering::AcqRel) {
                debug!("workflow: abandoned camera start still holds the device");
                return Err(self.report(&mut inner, WorkflowError::DeviceInUse));
            }
            inner.error = None;
            inner.prediction = None;
            inner.correction_label.clear();
            self.transition(&mut inner, WorkflowState::CameraRequesting);
            (inner.request_token, AcquisitionSlot(&self.acquiring))
        };

        let acquisition =
            tokio::time::timeout(self.camera_start_timeout, self.acquire_camera()).await;

        let mut inner = self.inner.lock().await;
        if inner.request_token != token {
            // Stop the late stream before the slot frees the device for another request.
            drop(acquisition);
            debug!(request_token = token, "workflow: camera start abandoned after reset");
            return Ok(CameraStart::Abandoned);
        }
        match acquisition {
            Ok(Ok((guard, dimensions))) => {
                info!(
                    stream_id = guard.stream().id.0,
                    width = dimensions.width,
                    height = dimensions.height,
                    "workflow: camera active"
                );
                inner.stream = Some(guard);
                inner.surface = Some(dimensions);
                self.transition(&mut inner, WorkflowState::CameraActive);
                Ok(CameraStart::Active(dimensions))
            }
            Ok(Err(err)) => {
                self.transition(&mut inner, WorkflowState::Idle);
                Err(self.report(&mut inner, err))
            }
            Err(_elapsed) => {
                self.transition(&mut inner, WorkflowState::Idle);
                let err = WorkflowError::CameraTimeout(self.camera_start_timeout);
                Err(self.report(&mut inner, err))
            }
        }
    }

    async fn acquire_camera(&self) -> Result<(StreamGuard, SurfaceDimensions), WorkflowError> {
        if self.media.video_input_count().await? == 0 {
            return Err(WorkflowError::DeviceNotFound);
        }
        let stream = self.media.request_stream(&self.constraints).await?;
        let guard = StreamGuard::new(self.media.clone(), stream);

        let mut dimensions = self.media.bind_surface(guard.stream()).await?;
        while !dimensions.is_usable() {
            tokio::time::sleep(SURFACE_POLL_INTERVAL).await;
            dimensions = self
                .media
                .surface_dimensions(guard.stream())
                .ok_or(WorkflowError::CaptureNotReady)?;
        }
        Ok((guard, dimensions))
    }

    /// Rasterizes the current frame at the negotiated resolution, encodes it as JPEG,
    /// and releases the camera.
    pub async fn capture(&self) -> Result<ArtifactSummary, WorkflowError> {
        let mut inner = self.inner.lock().await;
        if inner.state != WorkflowState::CameraActive {
            return Err(invalid(inner.state, WorkflowAction::Capture));
        }

        let read = inner.stream.as_ref().and_then(|guard| {
            self.media
                .surface_dimensions(guard.stream())
                .filter(SurfaceDimensions::is_usable)
                .map(|dimensions| self.media.read_frame(guard.stream(), dimensions))
        });
        let frame = match read {
            Some(Ok(frame)) => frame,
            Some(Err(err)) => {
                warn!(%err, "workflow: frame read failed");
                return Err(self.report(&mut inner, WorkflowError::CaptureNotReady));
            }
            None => return Err(self.report(&mut inner, WorkflowError::CaptureNotReady)),
        };

        let bytes = match encode_jpeg(&frame) {
            Ok(bytes) => bytes,
            Err(err) => {
                let err = WorkflowError::FrameEncoding(err.to_string());
                return Err(self.report(&mut inner, err));
            }
        };

        inner.release_stream();
        let summary = inner.stage_artifact(
            ImageSource::Camera,
            CAPTURED_FILE_NAME,
            CAPTURED_MIME_TYPE,
            bytes,
        );
        info!(
            artifact_id = summary.artifact_id.0,
            width = frame.width,
            height = frame.height,
            size_bytes = summary.size_bytes,
            "workflow: frame captured"
        );
        self.transition(&mut inner, WorkflowState::ImageReady);
        Ok(summary)
    }

    pub async fn close_camera(&self) -> Result<(), WorkflowError> {
        let mut inner = self.inner.lock().await;
        if inner.state != WorkflowState::CameraActive {
            return Err(invalid(inner.state, WorkflowAction::CloseCamera));
        }
        inner.release_stream();
        let next = if inner.artifact.is_some() {
            WorkflowState::ImageReady
        } else {
            WorkflowState::Idle
        };
        self.transition(&mut inner, next);
        Ok(())
    }

    /// Stages an image picked by the user. `declared_type` is the MIME type the
    /// platform reported for the file.
    pub async fn select_file(
        &self,
        file_name: &str,
        declared_type: &str,
        bytes: Vec<u8>,
    ) -> Result<ArtifactSummary, WorkflowError> {
        let mut inner = self.inner.lock().await;
        self.ensure_file_selectable(&inner)?;
        if !is_image_mime(declared_type) {
            let err = WorkflowError::InvalidFileType {
                declared: declared_type.to_string(),
            };
            return Err(self.report(&mut inner, err));
        }

        let summary =
            inner.stage_artifact(ImageSource::File, file_name, declared_type.trim(), bytes);
        info!(
            artifact_id = summary.artifact_id.0,
            file_name,
            mime_type = %summary.mime_type,
            size_bytes = summary.size_bytes,
            "workflow: file selected"
        );
        self.transition(&mut inner, WorkflowState::ImageReady);
        Ok(summary)
    }

    /// Reads a file from disk, declaring its type from the extension.
    pub async fn select_path(&self, path: &Path) -> Result<ArtifactSummary, WorkflowError> {
        let declared = mime_guess::from_path(path)
            .first_raw()
            .unwrap_or("application/octet-stream");
        if !is_image_mime(declared) {
            let mut inner = self.inner.lock().await;
            self.ensure_file_selectable(&inner)?;
            let err = WorkflowError::InvalidFileType {
                declared: declared.to_string(),
            };
            return Err(self.report(&mut inner, err));
        }

        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                let mut inner = self.inner.lock().await;
                let err = WorkflowError::FileRead {
                    path: path.display().to_string(),
                    reason: err.to_string(),
                };
                return Err(self.report(&mut inner, err));
            }
        };
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        self.select_file(&file_name, declared, bytes).await
    }

    fn ensure_file_selectable(&self, inner: &WorkflowInner) -> Result<(), WorkflowError> {
        if matches!(
            inner.state,
            WorkflowState::Idle | WorkflowState::ImageReady | WorkflowState::ResultShown
        ) {
            Ok(())
        } else {
            Err(invalid(inner.state, WorkflowAction::SelectFile))
        }
    }

    /// Sends the staged image to the classifier. Each call issues a new request; only
    /// the most recent one may update the view.
    pub async fn submit(&self) -> Result<SubmitOutcome, WorkflowError> {
        let (token, artifact) = {
            let mut inner = self.inner.lock().await;
            let Some(artifact) = inner.artifact.clone() else {
                debug!("workflow: submit ignored, no image staged");
                return Ok(SubmitOutcome::Skipped);
            };
            if !matches!(
                inner.state,
                WorkflowState::Idle
                    | WorkflowState::ImageReady
                    | WorkflowState::ResultShown
                    | WorkflowState::Submitting
            ) {
                return Err(invalid(inner.state, WorkflowAction::Submit));
            }
            inner.request_token += 1;
            inner.prediction = None;
            inner.error = None;
            inner.correction_label.clear();
            self.transition(&mut inner, WorkflowState::Submitting);
            (inner.request_token, artifact)
        };

        info!(
            artifact_id = artifact.id().0,
            source = ?artifact.source(),
            request_token = token,
            image_hash = %artifact.digest(),
            "workflow: submitting image"
        );
        let result = self.classifier.classify(&artifact).await;

        let mut inner = self.inner.lock().await;
        if !inner.is_current(token, artifact.id()) {
            debug!(
                artifact_id = artifact.id().0,
                request_token = token,
                current_token = inner.request_token,
                "workflow: discarding superseded classification response"
            );
            return Ok(SubmitOutcome::Superseded);
        }

        match result {
            Ok(prediction) => {
                inner.prediction = Some(prediction.clone());
                self.transition(&mut inner, WorkflowState::ResultShown);
                let _ = self
                    .events
                    .send(WorkflowEvent::PredictionReady(prediction.clone()));
                Ok(SubmitOutcome::Shown(prediction))
            }
            Err(err) => {
                warn!(artifact_id = artifact.id().0, %err, "workflow: classification failed");
                let message = err
                    .detail()
                    .map(str::to_string)
                    .unwrap_or_else(|| GENERIC_CLASSIFICATION_FAILURE.to_string());
                self.transition(&mut inner, WorkflowState::Idle);
                Err(self.report(&mut inner, WorkflowError::ClassificationFailed { message }))
            }
        }
    }

    pub async fn open_correction(&self) -> Result<(), WorkflowError> {
        let mut inner = self.inner.lock().await;
        if inner.state != WorkflowState::ResultShown {
            return Err(invalid(inner.state, WorkflowAction::OpenCorrection));
        }
        inner.correction_label.clear();
        self.transition(&mut inner, WorkflowState::CorrectionPending);
        Ok(())
    }

    pub async fn set_correction_label(&self, label: &str) -> Result<(), WorkflowError> {
        let mut inner = self.inner.lock().await;
        if inner.state != WorkflowState::CorrectionPending || inner.correction_in_flight {
            return Err(invalid(inner.state, WorkflowAction::EditCorrection));
        }
        inner.correction_label = label.to_string();
        Ok(())
    }

    pub async fn cancel_correction(&self) -> Result<(), WorkflowError> {
        let mut inner = self.inner.lock().await;
        if inner.state != WorkflowState::CorrectionPending || inner.correction_in_flight {
            return Err(invalid(inner.state, WorkflowAction::CancelCorrection));
        }
        inner.correction_label.clear();
        self.transition(&mut inner, WorkflowState::ResultShown);
        Ok(())
    }

    /// Sends the trimmed correction label with the staged image bytes. The form is
    /// locked until the call finishes; then the label is cleared, the form closes, and
    /// the outcome is always broadcast as an acknowledgment event.
    pub async fn submit_correction(&self) -> Result<String, WorkflowError> {
        let (token, artifact, label) = {
            let mut inner = self.inner.lock().await;
            if inner.state != WorkflowState::CorrectionPending || inner.correction_in_flight {
                return Err(invalid(inner.state, WorkflowAction::SubmitCorrection));
            }
            let label = inner.correction_label.trim().to_string();
            if label.is_empty() {
                return Err(WorkflowError::EmptyCorrectionLabel);
            }
            let Some(artifact) = inner.artifact.clone() else {
                return Err(invalid(inner.state, WorkflowAction::SubmitCorrection));
            };
            inner.correction_in_flight = true;
            (inner.request_token, artifact, label)
        };

        info!(
            artifact_id = artifact.id().0,
            correct_label = %label,
            "workflow: submitting correction"
        );
        let result = self.classifier.submit_correction(&artifact, &label).await;

        let outcome = match result {
            Ok(ack) => Ok(ack
                .message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CORRECTION_ACK.to_string())),
            Err(err) => {
                warn!(artifact_id = artifact.id().0, %err, "workflow: correction failed");
                Err(WorkflowError::CorrectionFailed {
                    message: err
                        .detail()
                        .map(str::to_string)
                        .unwrap_or_else(|| GENERIC_CORRECTION_FAILURE.to_string()),
                })
            }
        };

        let mut inner = self.inner.lock().await;
        if inner.is_current(token, artifact.id()) {
            inner.correction_in_flight = false;
            inner.correction_label.clear();
            self.transition(&mut inner, WorkflowState::ResultShown);
        } else {
            debug!(
                artifact_id = artifact.id().0,
                "workflow: correction finished after reset"
            );
        }
        let event = match &outcome {
            Ok(message) => WorkflowEvent::CorrectionAcknowledged(message.clone()),
            Err(err) => WorkflowEvent::CorrectionRejected(err.user_message()),
        };
        let _ = self.events.send(event);
        outcome
    }

    /// Returns to `Idle` from anywhere: stops the camera, drops the preview, and clears
    /// the staged image, prediction, and correction label. In-flight requests finish
    /// but their responses are discarded.
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        inner.release_stream();
        inner.release_preview();
        inner.artifact = None;
        inner.prediction = None;
        inner.correction_label.clear();
        inner.correction_in_flight = false;
        inner.error = None;
        inner.request_token += 1;
        info!(request_token = inner.request_token, "workflow: reset");
        self.transition(&mut inner, WorkflowState::Idle);
    }

    fn transition(&self, inner: &mut WorkflowInner, next: WorkflowState) {
        if inner.state == next {
            return;
        }
        debug!(from = %inner.state, to = %next, "workflow: state changed");
        inner.state = next;
        let _ = self.events.send(WorkflowEvent::StateChanged(next));
    }

    /// Records an inline error for the view and hands the error back.
    fn report(&self, inner: &mut WorkflowInner, err: WorkflowError) -> WorkflowError {
        let message = err.user_message();
        warn!(state = %inner.state, %err, "workflow: action failed");
        inner.error = Some(message.clone());
        let _ = self.events.send(WorkflowEvent::InlineError(message));
        err
    }
}

fn invalid(state: WorkflowState, action: WorkflowAction) -> WorkflowError {
    WorkflowError::InvalidTransition { state, action }
}

#[cfg(test)]
#[path = "tests/workflow_tests.rs"]
mod tests;

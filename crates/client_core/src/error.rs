use std::{fmt, time::Duration};

use thiserror::Error;

use crate::{
    media::MediaError,
    workflow::{WorkflowAction, WorkflowState},
};

pub const GENERIC_CLASSIFICATION_FAILURE: &str = "Upload failed.";
pub const GENERIC_CORRECTION_FAILURE: &str = "Unknown error";

/// Why the camera path is unavailable before any device is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityGap {
    Unsupported,
    InsecureContext,
}

impl fmt::Display for CapabilityGap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported => f.write_str("camera api not supported"),
            Self::InsecureContext => f.write_str("not a secure context"),
        }
    }
}

/// Every failure the capture/submit workflow can surface. None are fatal; the
/// controller is back in a stable state whenever one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("camera unavailable: {0}")]
    UnsupportedCapability(CapabilityGap),
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("no camera device found")]
    DeviceNotFound,
    #[error("camera device is in use")]
    DeviceInUse,
    #[error("camera failed to start within {}ms", .0.as_millis())]
    CameraTimeout(Duration),
    #[error("camera failed: {0}")]
    CameraFailed(String),
    #[error("invalid file type '{declared}'")]
    InvalidFileType { declared: String },
    #[error("could not read '{path}': {reason}")]
    FileRead { path: String, reason: String },
    #[error("capture surface not ready")]
    CaptureNotReady,
    #[error("frame encoding failed: {0}")]
    FrameEncoding(String),
    #[error("classification failed: {message}")]
    ClassificationFailed { message: String },
    #[error("correction failed: {message}")]
    CorrectionFailed { message: String },
    #[error("correction label is empty")]
    EmptyCorrectionLabel,
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        state: WorkflowState,
        action: WorkflowAction,
    },
}

impl WorkflowError {
    /// Human-readable text for the UI.
    pub fn user_message(&self) -> String {
        match self {
            Self::UnsupportedCapability(CapabilityGap::Unsupported) => {
                "Camera is not supported on this device.".to_string()
            }
            Self::UnsupportedCapability(CapabilityGap::InsecureContext) => {
                "Camera access requires a secure context (HTTPS).".to_string()
            }
            Self::PermissionDenied => {
                "Camera permission was denied. Allow camera access or choose a photo from the gallery."
                    .to_string()
            }
            Self::DeviceNotFound => "No camera was found on this device.".to_string(),
            Self::DeviceInUse => {
                "The camera is already in use by another application.".to_string()
            }
            Self::CameraTimeout(_) => {
                "Camera failed to start. Please try again or use gallery.".to_string()
            }
            Self::CameraFailed(reason) => format!("Camera access failed: {reason}"),
            Self::InvalidFileType { .. } => {
                "Please upload a valid image file (e.g., JPEG, PNG).".to_string()
            }
            Self::FileRead { reason, .. } => format!("Could not read the selected file: {reason}"),
            Self::CaptureNotReady => "Capture failed: camera not ready.".to_string(),
            Self::FrameEncoding(_) => "Capture failed: the photo could not be encoded.".to_string(),
            Self::ClassificationFailed { message } => message.clone(),
            Self::CorrectionFailed { message } => format!("Correction failed: {message}"),
            Self::EmptyCorrectionLabel => "Enter the correct food label first.".to_string(),
            Self::InvalidTransition { .. } => "That action is not available right now.".to_string(),
        }
    }
}

impl From<MediaError> for WorkflowError {
    fn from(value: MediaError) -> Self {
        match value {
            MediaError::PermissionDenied => Self::PermissionDenied,
            MediaError::NotFound => Self::DeviceNotFound,
            MediaError::InUse => Self::DeviceInUse,
            MediaError::SurfaceUnavailable => Self::CaptureNotReady,
            MediaError::Other(reason) => Self::CameraFailed(reason),
        }
    }
}

//! Image artifacts staged for submission and their preview handles.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};
use shared::domain::{ArtifactId, ImageSource};

pub const CAPTURED_FILE_NAME: &str = "captured.jpg";
pub const CAPTURED_MIME_TYPE: &str = "image/jpeg";

/// Encoded still image held in memory until it is replaced or the workflow resets.
#[derive(Debug, Clone)]
pub struct ImageArtifact {
    id: ArtifactId,
    source: ImageSource,
    file_name: String,
    mime_type: String,
    bytes: Arc<[u8]>,
}

impl ImageArtifact {
    pub fn new(
        id: ArtifactId,
        source: ImageSource,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            id,
            source,
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn id(&self) -> ArtifactId {
        self.id
    }

    pub fn source(&self) -> ImageSource {
        self.source
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Lowercase hex SHA-256 of the encoded bytes. The classifier keys stored
    /// corrections by this value.
    pub fn digest(&self) -> String {
        format!("{:x}", Sha256::digest(&self.bytes))
    }

    pub fn summary(&self) -> ArtifactSummary {
        ArtifactSummary {
            artifact_id: self.id,
            source: self.source,
            file_name: self.file_name.clone(),
            mime_type: self.mime_type.clone(),
            size_bytes: self.bytes.len(),
            digest: self.digest(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSummary {
    pub artifact_id: ArtifactId,
    pub source: ImageSource,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: usize,
    pub digest: String,
}

/// Display-only handle resolving to an artifact's bytes without a network round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewRef {
    artifact_id: ArtifactId,
    url: String,
}

impl PreviewRef {
    pub fn for_artifact(artifact: &ImageArtifact) -> Self {
        Self {
            artifact_id: artifact.id(),
            url: format!(
                "data:{};base64,{}",
                artifact.mime_type(),
                STANDARD.encode(artifact.bytes())
            ),
        }
    }

    pub fn artifact_id(&self) -> ArtifactId {
        self.artifact_id
    }

    pub fn as_str(&self) -> &str {
        &self.url
    }
}

/// Accepts any declared type under the `image/` prefix, case-insensitively.
pub fn is_image_mime(declared: &str) -> bool {
    declared
        .trim()
        .get(..6)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("image/"))
}

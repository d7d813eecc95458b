//! Wire contract shared by the client, the food API, and the remote classifier.

use serde::{Deserialize, Serialize};

/// Classifier route: multipart with a single image field.
pub const UPLOAD_ROUTE: &str = "/upload";
/// Correction route: multipart with the image field plus [`CORRECT_LABEL_FIELD`].
pub const UPDATE_LABEL_ROUTE: &str = "/update-label";
/// Food listing, relative to the API base (`<host>/api`).
pub const FOOD_ROUTE: &str = "/food";

pub const IMAGE_FIELD: &str = "file";
pub const CORRECT_LABEL_FIELD: &str = "correct_label";

/// Successful `/update-label` answer. The body is optional on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorrectionAck {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFoodRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

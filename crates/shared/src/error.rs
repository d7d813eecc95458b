use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    Validation,
    Internal,
}

/// Error body returned by the food API. The message travels under `error` so that
/// clients read it the same way as classifier failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    #[serde(rename = "error")]
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Loose failure body: the classifier answers with `{error}` or `{message}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    /// Best server-supplied description, `error` first.
    pub fn detail(&self) -> Option<&str> {
        self.error
            .as_deref()
            .or(self.message.as_deref())
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }

    pub fn parse(bytes: &[u8]) -> Option<String> {
        serde_json::from_slice::<ErrorBody>(bytes)
            .ok()
            .and_then(|body| body.detail().map(str::to_string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_prefers_error_over_message() {
        let both = ErrorBody::parse(br#"{"error":"model unavailable","message":"later"}"#);
        assert_eq!(both.as_deref(), Some("model unavailable"));

        let message_only = ErrorBody::parse(br#"{"message":"try again"}"#);
        assert_eq!(message_only.as_deref(), Some("try again"));
    }

    #[test]
    fn detail_is_absent_for_blank_or_non_json_bodies() {
        assert_eq!(ErrorBody::parse(br#"{"error":"   "}"#), None);
        assert_eq!(ErrorBody::parse(b"<html>502</html>"), None);
        assert_eq!(ErrorBody::parse(b""), None);
    }

    #[test]
    fn api_error_serializes_message_as_error_field() {
        let value = serde_json::to_value(ApiError::new(ErrorCode::Validation, "name required"))
            .expect("json");
        assert_eq!(value["error"], "name required");
        assert_eq!(value["code"], "validation");
    }
}

use super::*;
use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use shared::domain::{ArtifactId, Confidence, FoodId, ImageSource};
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Debug, Clone)]
struct ReceivedPart {
    name: String,
    file_name: Option<String>,
    content_type: Option<String>,
    data: Vec<u8>,
}

#[derive(Clone)]
struct ServerState {
    requests: Arc<Mutex<Vec<Vec<ReceivedPart>>>>,
    status: StatusCode,
    body: String,
}

impl ServerState {
    async fn only_request(&self) -> Vec<ReceivedPart> {
        let requests = self.requests.lock().await;
        assert_eq!(requests.len(), 1, "expected exactly one request");
        requests[0].clone()
    }
}

async fn handle_multipart(
    State(state): State<ServerState>,
    mut multipart: Multipart,
) -> (StatusCode, String) {
    let mut parts = Vec::new();
    while let Some(field) = multipart.next_field().await.expect("field") {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.expect("field bytes").to_vec();
        parts.push(ReceivedPart {
            name,
            file_name,
            content_type,
            data,
        });
    }
    state.requests.lock().await.push(parts);
    (state.status, state.body.clone())
}

async fn handle_foods() -> Json<Vec<FoodSummary>> {
    Json(vec![FoodSummary {
        food_id: FoodId(1),
        name: "pizza".into(),
        description: Some("flatbread".into()),
        created_at: chrono_epoch(),
    }])
}

fn chrono_epoch() -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::<chrono::Utc>::from_timestamp(0, 0).expect("epoch")
}

async fn spawn_classifier(status: StatusCode, body: &str) -> (String, ServerState) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let state = ServerState {
        requests: Arc::new(Mutex::new(Vec::new())),
        status,
        body: body.to_string(),
    };
    let app = Router::new()
        .route("/upload", post(handle_multipart))
        .route("/update-label", post(handle_multipart))
        .route("/api/food", get(handle_foods))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), state)
}

fn jpeg_artifact() -> ImageArtifact {
    ImageArtifact::new(
        ArtifactId(1),
        ImageSource::Camera,
        "captured.jpg",
        "image/jpeg",
        vec![0xff, 0xd8, 0xff, 0xe0, 1, 2, 3],
    )
}

#[tokio::test]
async fn classify_uploads_image_under_file_field() {
    let (base, state) = spawn_classifier(
        StatusCode::OK,
        r#"{"predicted_class":"pizza","confidence":0.91}"#,
    )
    .await;
    let client = SeeFoodClient::new(format!("{base}/"), format!("{base}/api"));

    let prediction = client.classify(&jpeg_artifact()).await.expect("classify");
    assert_eq!(prediction.predicted_class, "pizza");
    assert_eq!(prediction.confidence, Confidence::Score(0.91));

    let parts = state.only_request().await;
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0].name, IMAGE_FIELD);
    assert_eq!(parts[0].file_name.as_deref(), Some("captured.jpg"));
    assert_eq!(parts[0].content_type.as_deref(), Some("image/jpeg"));
    assert_eq!(parts[0].data, jpeg_artifact().bytes());
}

#[tokio::test]
async fn classify_accepts_percentage_confidence() {
    let (base, _state) = spawn_classifier(
        StatusCode::OK,
        r#"{"predicted_class":"calzone","confidence":"100%"}"#,
    )
    .await;
    let client = SeeFoodClient::new(base.clone(), format!("{base}/api"));

    let prediction = client.classify(&jpeg_artifact()).await.expect("classify");
    assert_eq!(prediction.confidence.to_string(), "100%");
}

#[tokio::test]
async fn classify_surfaces_server_error_text() {
    let (base, _state) = spawn_classifier(
        StatusCode::INTERNAL_SERVER_ERROR,
        r#"{"error":"model unavailable"}"#,
    )
    .await;
    let client = SeeFoodClient::new(base.clone(), format!("{base}/api"));

    let err = client
        .classify(&jpeg_artifact())
        .await
        .expect_err("must fail");
    assert!(matches!(err, ClassifierError::Status { status: 500, .. }));
    assert_eq!(err.detail(), Some("model unavailable"));
}

#[tokio::test]
async fn classify_without_error_body_has_no_detail() {
    let (base, _state) = spawn_classifier(StatusCode::BAD_GATEWAY, "upstream down").await;
    let client = SeeFoodClient::new(base.clone(), format!("{base}/api"));

    let err = client
        .classify(&jpeg_artifact())
        .await
        .expect_err("must fail");
    assert_eq!(err.detail(), None);
    assert!(err.to_string().contains("502"));
}

#[tokio::test]
async fn classify_rejects_success_body_without_prediction() {
    let (base, _state) = spawn_classifier(StatusCode::OK, r#"{"status":"ok"}"#).await;
    let client = SeeFoodClient::new(base.clone(), format!("{base}/api"));

    let err = client
        .classify(&jpeg_artifact())
        .await
        .expect_err("must fail");
    assert!(matches!(err, ClassifierError::Decode(_)));
}

#[tokio::test]
async fn classify_reports_transport_failures() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    let client = SeeFoodClient::new(format!("http://{addr}"), format!("http://{addr}/api"));

    let err = client
        .classify(&jpeg_artifact())
        .await
        .expect_err("must fail");
    assert!(matches!(err, ClassifierError::Transport(_)));
    assert_eq!(err.detail(), None);
}

#[tokio::test]
async fn correction_sends_image_and_label_fields() {
    let (base, state) = spawn_classifier(
        StatusCode::OK,
        r#"{"message":"Correction received, thank you!"}"#,
    )
    .await;
    let client = SeeFoodClient::new(base.clone(), format!("{base}/api"));

    let ack = client
        .submit_correction(&jpeg_artifact(), "calzone")
        .await
        .expect("correction");
    assert_eq!(ack.message.as_deref(), Some("Correction received, thank you!"));

    let parts = state.only_request().await;
    let image = parts
        .iter()
        .find(|p| p.name == IMAGE_FIELD)
        .expect("image part");
    assert_eq!(image.data, jpeg_artifact().bytes());
    let label = parts
        .iter()
        .find(|p| p.name == CORRECT_LABEL_FIELD)
        .expect("label part");
    assert_eq!(label.data, b"calzone");
    assert_eq!(label.file_name, None);
}

#[tokio::test]
async fn correction_tolerates_empty_success_body() {
    let (base, _state) = spawn_classifier(StatusCode::OK, "").await;
    let client = SeeFoodClient::new(base.clone(), format!("{base}/api"));

    let ack = client
        .submit_correction(&jpeg_artifact(), "ramen")
        .await
        .expect("correction");
    assert_eq!(ack.message, None);
}

#[tokio::test]
async fn correction_failure_carries_server_message() {
    let (base, _state) = spawn_classifier(
        StatusCode::BAD_REQUEST,
        r#"{"error":"Missing correct_label or image file"}"#,
    )
    .await;
    let client = SeeFoodClient::new(base.clone(), format!("{base}/api"));

    let err = client
        .submit_correction(&jpeg_artifact(), "ramen")
        .await
        .expect_err("must fail");
    assert_eq!(err.detail(), Some("Missing correct_label or image file"));
}

#[tokio::test]
async fn lists_foods_from_api_base() {
    let (base, _state) = spawn_classifier(StatusCode::OK, "{}").await;
    let client = SeeFoodClient::new(base.clone(), format!("{base}/api/"));

    let foods = client.list_foods().await.expect("foods");
    assert_eq!(foods.len(), 1);
    assert_eq!(foods[0].food_id, FoodId(1));
    assert_eq!(foods[0].name, "pizza");
}

#[tokio::test]
async fn missing_classifier_always_fails_without_detail() {
    let err = MissingClassifier
        .classify(&jpeg_artifact())
        .await
        .expect_err("must fail");
    assert_eq!(err.detail(), None);
}

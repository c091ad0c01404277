use super::*;
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

#[derive(Clone)]
struct CompletionState {
    content: &'static str,
    requests: Arc<Mutex<Vec<(String, Value)>>>,
}

async fn completions(
    State(state): State<CompletionState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    state.requests.lock().expect("lock").push((auth, body));
    if state.content == "fail" {
        return (StatusCode::TOO_MANY_REQUESTS, "slow down").into_response();
    }
    Json(json!({
        "choices": [{ "message": { "role": "assistant", "content": state.content } }]
    }))
    .into_response()
}

async fn spawn_openai(content: &'static str) -> (OpenAiClassifier, CompletionState) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let state = CompletionState {
        content,
        requests: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new()
        .route("/v1/chat/completions", post(completions))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let mut config = OpenAiConfig::new(Secret::new("sk-test".to_string()));
    config.base_url = format!("http://{addr}/v1");
    (OpenAiClassifier::new(Client::new(), config), state)
}

#[test]
fn prose_content_is_not_a_job_application() {
    let parsed = parse_content("Not a job application email").expect("parse");
    assert_eq!(parsed, Classification::not_job_application());
}

#[test]
fn unknown_status_is_dropped_not_fatal() {
    let parsed = parse_content(
        r#"{"is_job_application_email":true,"job_title":"Engineer","company_name":"Acme","status":"ghosted"}"#,
    )
    .expect("parse");
    assert!(parsed.is_job_application_email);
    assert_eq!(parsed.status, None);
}

#[test]
fn truncated_json_is_an_error() {
    let err = parse_content(r#"{"is_job_application_email": tr"#).expect_err("should fail");
    assert!(matches!(err, ClassifierError::MalformedContent(_)));
}

#[tokio::test]
async fn sends_subject_and_body_with_schema_and_parses_reply() {
    let (classifier, state) = spawn_openai(
        r#"{"is_job_application_email":true,"job_title":"Data Analyst","company_name":"Globex","status":"interview"}"#,
    )
    .await;

    let result = classifier
        .classify("Interview invite", "Please pick a slot")
        .await
        .expect("classify");
    assert_eq!(result.status, Some(ApplicationStatus::Interview));
    assert_eq!(result.company_name.as_deref(), Some("Globex"));

    let requests = state.requests.lock().expect("lock").clone();
    let (auth, body) = &requests[0];
    assert_eq!(auth, "Bearer sk-test");
    assert_eq!(body["model"], OPENAI_MODEL);
    assert_eq!(
        body["messages"][1]["content"],
        "Subject: Interview invite\nBody: Please pick a slot"
    );
    assert_eq!(
        body["response_format"]["json_schema"]["schema"]["properties"]["status"]["enum"][4],
        "not interested"
    );
}

#[tokio::test]
async fn error_status_is_reported() {
    let (classifier, _state) = spawn_openai("fail").await;
    let err = classifier
        .classify("subject", "body")
        .await
        .expect_err("should fail");
    assert!(matches!(err, ClassifierError::Status { status: 429, .. }));
}

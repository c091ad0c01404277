use super::*;
use axum::{
    body::{self, Body},
    http::{header, Request},
};
use classifier::HeuristicClassifier;
use tower::ServiceExt;

async fn test_app() -> (Router, AppState) {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let oauth = GoogleOAuthConfig::new(
        "client-id".into(),
        "client-secret".into(),
        "http://localhost:8000/auth/google/callback".into(),
    );
    let api = ApiContext {
        storage,
        http: reqwest::Client::new(),
        google: GoogleConfig::new(oauth),
        classifier: Arc::new(HeuristicClassifier::new().expect("classifier")),
        sync: SyncOptions::default(),
        auth: AuthKeys::from_secret(&Secret::new("test-secret".to_string())),
    };
    let state = AppState {
        api,
        syncs: SyncRegistry::default(),
    };
    (build_router(Arc::new(state.clone())), state)
}

fn post_json(uri: &str, value: serde_json::Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(value.to_string()))
        .expect("request")
}

fn authed_post(uri: &str, token: &str, value: serde_json::Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::from(value.to_string()))
        .expect("request")
}

fn authed_get(uri: &str, token: &str) -> Request<Body> {
    Request::get(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .expect("request")
}

async fn read_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

async fn register(app: &Router) -> (UserId, String) {
    register_as(app, "a@b.com").await
}

async fn register_as(app: &Router, email: &str) -> (UserId, String) {
    let response = app
        .clone()
        .oneshot(post_json(
            "/credentials",
            serde_json::json!({
                "email": email,
                "password": "hunter2",
                "sheet_id": "https://docs.google.com/spreadsheets/d/1AbC/edit"
            }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let dto: SubmitCredentialsResponse = read_json(response).await;
    assert_eq!(dto.sheet_id, "1AbC");
    (dto.user_id, dto.session_token)
}

#[tokio::test]
async fn healthz_reports_ok_when_storage_is_ready() {
    let (app, _state) = test_app().await;
    let request = Request::get("/healthz")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn credentials_with_blank_field_are_rejected() {
    let (app, _state) = test_app().await;
    let response = app
        .oneshot(post_json(
            "/credentials",
            serde_json::json!({ "email": "a@b.com", "password": "", "sheet_id": "1AbC" }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let err: ApiError = read_json(response).await;
    assert_eq!(err.code, ErrorCode::Validation);
    assert_eq!(err.message, "Please fill out all fields.");
}

#[tokio::test]
async fn registered_user_has_profile_and_empty_job_list() {
    let (app, _state) = test_app().await;
    let (user_id, token) = register(&app).await;

    let response = app
        .clone()
        .oneshot(authed_get(&format!("/user/profile?user_id={user_id}"), &token))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let profile: UserProfile = read_json(response).await;
    assert_eq!(profile.email, "a@b.com");
    assert!(!profile.google_linked);

    let response = app
        .oneshot(authed_get(&format!("/jobs?user_id={user_id}"), &token))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let list: JobList = read_json(response).await;
    assert_eq!(list.user_id, user_id);
    assert!(list.jobs.is_empty());
}

#[tokio::test]
async fn unknown_user_maps_to_not_found() {
    let (app, state) = test_app().await;
    let token = state.api.auth.issue_session(UserId(404)).expect("token");
    let response = app
        .oneshot(authed_get("/user/profile?user_id=404", &token))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn per_user_routes_require_a_session() {
    let (app, _state) = test_app().await;
    let (user_id, _token) = register(&app).await;

    for request in [
        Request::get(format!("/user/profile?user_id={user_id}"))
            .body(Body::empty())
            .expect("request"),
        Request::get(format!("/jobs?user_id={user_id}"))
            .body(Body::empty())
            .expect("request"),
        authed_get(&format!("/jobs?user_id={user_id}"), "not-a-jwt"),
        post_json("/sync", serde_json::json!({ "user_id": user_id })),
        post_json(
            "/user/sheet_id",
            serde_json::json!({ "user_id": user_id, "sheet_id": "2XyZ" }),
        ),
        Request::get(format!("/auth/google/login?user_id={user_id}"))
            .body(Body::empty())
            .expect("request"),
    ] {
        let uri = request.uri().to_string();
        let response = app.clone().oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
        let err: ApiError = read_json(response).await;
        assert_eq!(err.code, ErrorCode::Unauthorized);
    }
}

#[tokio::test]
async fn session_cannot_read_another_users_data() {
    let (app, _state) = test_app().await;
    let (_alice, alice_token) = register_as(&app, "alice@example.com").await;
    let (bob, _bob_token) = register_as(&app, "bob@example.com").await;

    let response = app
        .oneshot(authed_get(&format!("/jobs?user_id={bob}"), &alice_token))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn sheet_update_validates_url() {
    let (app, _state) = test_app().await;
    let (user_id, token) = register(&app).await;

    let response = app
        .clone()
        .oneshot(authed_post(
            "/user/sheet_id",
            &token,
            serde_json::json!({ "user_id": user_id, "sheet_id": "https://docs.google.com/nope" }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(authed_post(
            "/user/sheet_id",
            &token,
            serde_json::json!({ "user_id": user_id, "sheet_id": "2XyZ" }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let profile: UserProfile = read_json(response).await;
    assert_eq!(profile.sheet_id.as_deref(), Some("2XyZ"));
}

#[tokio::test]
async fn sync_requires_linked_google_account() {
    let (app, _state) = test_app().await;
    let (user_id, token) = register(&app).await;

    let response = app
        .oneshot(authed_post("/sync", &token, serde_json::json!({ "user_id": user_id })))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn second_sync_while_running_is_not_started() {
    let (app, state) = test_app().await;
    let (user_id, token) = register(&app).await;
    state
        .api
        .storage
        .store_google_tokens(user_id, "access", Some("refresh"))
        .await
        .expect("tokens");
    let _running = state.syncs.try_begin(user_id).expect("claim");

    let response = app
        .oneshot(authed_post("/sync", &token, serde_json::json!({ "user_id": user_id })))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let started: SyncStarted = read_json(response).await;
    assert!(!started.started);
}

#[tokio::test]
async fn google_login_redirects_to_consent_screen() {
    let (app, state) = test_app().await;
    let (user_id, token) = register(&app).await;

    let response = app
        .oneshot(
            Request::get(format!("/auth/google/login?user_id={user_id}&token={token}"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .expect("location");
    assert!(location.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
    let consent = reqwest::Url::parse(location).expect("url");
    let oauth_state = consent
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .expect("state");
    assert_eq!(
        state.api.auth.verify_oauth_state(&oauth_state).expect("signed state"),
        user_id
    );
}

#[tokio::test]
async fn google_callback_with_forged_state_is_rejected() {
    let (app, _state) = test_app().await;
    let (user_id, _token) = register(&app).await;
    let forged = AuthKeys::from_secret(&Secret::new("guessed".to_string()))
        .issue_oauth_state(user_id)
        .expect("forged");

    for oauth_state in [user_id.to_string(), forged] {
        let response = app
            .clone()
            .oneshot(
                Request::get(format!("/auth/google/callback?code=abc&state={oauth_state}"))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn google_callback_without_code_is_rejected() {
    let (app, _state) = test_app().await;
    let response = app
        .clone()
        .oneshot(
            Request::get("/auth/google/callback?state=1")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(
            Request::get("/auth/google/callback?error=access_denied")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

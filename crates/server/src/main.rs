use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect},
    routing::{get, post},
    Json, Router,
};
use classifier::{build_classifier, ClassifierProvider, OpenAiConfig};
use google_integration::GoogleOAuthConfig;
use secrecy::Secret;
use serde::Deserialize;
use server_api::{authorize, ApiContext, AuthKeys, GoogleConfig, SyncOptions, SyncRegistry};
use shared::{
    domain::UserId,
    error::{ApiError, ErrorCode},
    protocol::{
        JobList, SubmitCredentialsRequest, SubmitCredentialsResponse, SyncRequest, SyncStarted,
        UpdateSheetIdRequest, UserProfile,
    },
};
use storage::Storage;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, prepare_database_url, Settings};

#[derive(Clone)]
struct AppState {
    api: ApiContext,
    syncs: SyncRegistry,
}

#[derive(Debug, Deserialize)]
struct UserQuery {
    user_id: i64,
}

/// A browser link can't carry headers, so the session may also come as `token`.
#[derive(Debug, Deserialize)]
struct LoginQuery {
    user_id: i64,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OAuthCallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

type HttpError = (StatusCode, Json<ApiError>);

const MAX_BODY_BYTES: usize = 64 * 1024;
const DEV_JWT_SECRET: &str = "jobtracker-dev-secret";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    let api = build_context(storage, &settings)?;

    let state = AppState {
        api,
        syncs: SyncRegistry::default(),
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_context(storage: Storage, settings: &Settings) -> anyhow::Result<ApiContext> {
    if settings.google_client_id.is_empty() {
        warn!("GOOGLE_API_CLIENT_ID is not set; google linking will fail");
    }
    let oauth = GoogleOAuthConfig::new(
        settings.google_client_id.clone(),
        settings.google_client_secret.clone(),
        settings.redirect_uri(),
    );

    let provider: ClassifierProvider = settings
        .classifier_provider()
        .parse()
        .map_err(anyhow::Error::msg)?;
    let openai = settings.openai_api_key.clone().map(|key| {
        let mut config = OpenAiConfig::new(Secret::new(key));
        if let Some(base_url) = &settings.openai_base_url {
            config.base_url = base_url.clone();
        }
        config
    });
    let classifier = build_classifier(provider, openai)?;
    info!(provider = ?provider, "classifier ready");

    let jwt_secret = settings.jwt_secret.clone().unwrap_or_else(|| {
        warn!("JWT_SECRET is not set; using the development signing key");
        DEV_JWT_SECRET.to_string()
    });

    Ok(ApiContext {
        storage,
        http: reqwest::Client::new(),
        google: GoogleConfig::new(oauth),
        classifier,
        sync: SyncOptions {
            batch_size: settings.fetch_batch_size,
            lookback_days: settings.fetch_lookback_days,
            write_delay: settings.sheet_write_delay(),
        },
        auth: AuthKeys::from_secret(&Secret::new(jwt_secret)),
    })
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/credentials", post(http_submit_credentials))
        .route("/user/profile", get(http_user_profile))
        .route("/user/sheet_id", post(http_update_sheet_id))
        .route("/jobs", get(http_list_jobs))
        .route("/sync", post(http_start_sync))
        .route("/auth/google/login", get(google_login))
        .route("/auth/google/callback", get(google_callback))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn http_error(err: ApiError) -> HttpError {
    let status = match err.code {
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!(message = %err.message, "request failed");
    }
    (status, Json(err))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

fn require_session(
    state: &AppState,
    headers: &HeaderMap,
    user_id: UserId,
) -> Result<(), HttpError> {
    authorize(&state.api.auth, bearer_token(headers), user_id).map_err(http_error)
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, HttpError> {
    state.api.storage.health_check().await.map_err(|e| {
        http_error(ApiError::new(ErrorCode::Internal, e.to_string()))
    })?;
    Ok("ok")
}

async fn http_submit_credentials(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitCredentialsRequest>,
) -> Result<Json<SubmitCredentialsResponse>, HttpError> {
    server_api::submit_credentials(&state.api, req)
        .await
        .map(Json)
        .map_err(http_error)
}

async fn http_user_profile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<UserQuery>,
) -> Result<Json<UserProfile>, HttpError> {
    let user_id = UserId(q.user_id);
    require_session(&state, &headers, user_id)?;
    server_api::user_profile(&state.api, user_id)
        .await
        .map(Json)
        .map_err(http_error)
}

async fn http_update_sheet_id(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<UpdateSheetIdRequest>,
) -> Result<Json<UserProfile>, HttpError> {
    require_session(&state, &headers, req.user_id)?;
    server_api::update_sheet_id(&state.api, req.user_id, &req.sheet_id)
        .await
        .map_err(http_error)?;
    server_api::user_profile(&state.api, req.user_id)
        .await
        .map(Json)
        .map_err(http_error)
}

async fn http_list_jobs(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<UserQuery>,
) -> Result<Json<JobList>, HttpError> {
    let user_id = UserId(q.user_id);
    require_session(&state, &headers, user_id)?;
    let jobs = server_api::list_jobs(&state.api, user_id)
        .await
        .map_err(http_error)?;
    Ok(Json(JobList { user_id, jobs }))
}

async fn http_start_sync(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<SyncRequest>,
) -> Result<(StatusCode, Json<SyncStarted>), HttpError> {
    require_session(&state, &headers, req.user_id)?;
    let profile = server_api::user_profile(&state.api, req.user_id)
        .await
        .map_err(http_error)?;
    if !profile.google_linked {
        return Err(http_error(ApiError::new(
            ErrorCode::Unauthorized,
            "google account is not linked",
        )));
    }

    let Some(guard) = state.syncs.try_begin(req.user_id) else {
        info!(user_id = %req.user_id, "sync already running");
        return Ok((StatusCode::ACCEPTED, Json(SyncStarted { started: false })));
    };

    let api = state.api.clone();
    let user_id = req.user_id;
    tokio::spawn(async move {
        let _guard = guard;
        match server_api::run_sync_for_user(&api, user_id).await {
            Ok(report) => info!(
                %user_id,
                created = report.created,
                updated = report.updated,
                "background sync complete"
            ),
            Err(err) => error!(%user_id, code = ?err.code, message = %err.message, "background sync failed"),
        }
    });

    Ok((StatusCode::ACCEPTED, Json(SyncStarted { started: true })))
}

async fn google_login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<LoginQuery>,
) -> Result<Redirect, HttpError> {
    let user_id = UserId(q.user_id);
    let token = bearer_token(&headers).or(q.token.as_deref());
    authorize(&state.api.auth, token, user_id).map_err(http_error)?;
    server_api::user_profile(&state.api, user_id)
        .await
        .map_err(http_error)?;
    let location = server_api::google_login_url(&state.api, user_id).map_err(http_error)?;
    Ok(Redirect::to(&location))
}

async fn google_callback(
    State(state): State<Arc<AppState>>,
    Query(q): Query<OAuthCallbackQuery>,
) -> Result<impl IntoResponse, HttpError> {
    if let Some(reason) = q.error {
        return Err(http_error(ApiError::new(
            ErrorCode::Unauthorized,
            format!("google consent failed: {reason}"),
        )));
    }
    let (Some(code), Some(oauth_state)) = (q.code, q.state) else {
        return Err(http_error(ApiError::new(
            ErrorCode::Validation,
            "missing code or state",
        )));
    };

    let user_id = server_api::complete_google_link(&state.api, &code, &oauth_state)
        .await
        .map_err(http_error)?;
    Ok(format!(
        "Google account linked for user {user_id}. You can close this window."
    ))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;

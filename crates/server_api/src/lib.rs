use std::{sync::Arc, time::Duration};

use classifier::JobClassifier;
use google_integration::{oauth, GoogleOAuthConfig, GMAIL_API_BASE, SHEETS_API_BASE};
use regex::Regex;
use secrecy::{ExposeSecret, Secret};
use shared::{
    domain::{JobSummary, UserId},
    error::{ApiError, ErrorCode},
    protocol::{
        SubmitCredentialsRequest, SubmitCredentialsResponse, UserProfile, MISSING_FIELDS_MESSAGE,
    },
};
use storage::{Storage, StoredUser};
use tracing::{info, warn};

pub mod auth;
mod sync;

pub use auth::{authorize, AuthKeys};
pub use sync::{run_sync_for_user, sync_job_applications, SyncGuard, SyncRegistry};

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub http: reqwest::Client,
    pub google: GoogleConfig,
    pub classifier: Arc<dyn JobClassifier>,
    pub sync: SyncOptions,
    pub auth: AuthKeys,
}

#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub oauth: GoogleOAuthConfig,
    pub gmail_base_url: String,
    pub sheets_base_url: String,
}

impl GoogleConfig {
    pub fn new(oauth: GoogleOAuthConfig) -> Self {
        Self {
            oauth,
            gmail_base_url: GMAIL_API_BASE.into(),
            sheets_base_url: SHEETS_API_BASE.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub batch_size: u32,
    pub lookback_days: i64,
    /// Pause between sheet writes to stay under the Sheets per-minute quota.
    pub write_delay: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            batch_size: 10,
            lookback_days: 30,
            write_delay: Duration::from_secs(1),
        }
    }
}

/// Accepts a full Sheets URL or a bare id. URLs must carry a `/d/<id>` segment.
pub fn normalize_sheet_id(input: &str) -> Result<String, ApiError> {
    let input = input.trim();
    let looks_like_url = input.contains("://") || input.contains("docs.google.com");
    if !looks_like_url {
        return Ok(input.to_string());
    }

    let pattern = Regex::new(r"/d/([a-zA-Z0-9_-]+)").map_err(|e| internal(e.into()))?;
    pattern
        .captures(input)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| ApiError::new(ErrorCode::Validation, "invalid Google Sheet URL"))
}

/// Server side of the popup submit. The password is only checked for presence and is never stored.
pub async fn submit_credentials(
    ctx: &ApiContext,
    request: SubmitCredentialsRequest,
) -> Result<SubmitCredentialsResponse, ApiError> {
    let SubmitCredentialsRequest {
        email,
        password,
        sheet_id,
    } = request;
    let password = Secret::new(password);

    // Blank sheet ids would normalize to an empty string.
    if email.is_empty() || password.expose_secret().is_empty() || sheet_id.trim().is_empty() {
        return Err(ApiError::new(ErrorCode::Validation, MISSING_FIELDS_MESSAGE));
    }
    drop(password);

    let sheet_id = normalize_sheet_id(&sheet_id)?;
    let user_id = ctx
        .storage
        .upsert_user_by_email(&email, &sheet_id)
        .await
        .map_err(internal)?;
    let user = load_user(ctx, user_id).await?;
    let session_token = ctx.auth.issue_session(user_id)?;
    info!(%user_id, %email, %sheet_id, "credentials accepted");

    Ok(SubmitCredentialsResponse {
        user_id,
        sheet_id,
        google_linked: user.google_linked(),
        session_token,
    })
}

pub async fn user_profile(ctx: &ApiContext, user_id: UserId) -> Result<UserProfile, ApiError> {
    let user = load_user(ctx, user_id).await?;
    let job_count = ctx.storage.count_jobs(user_id).await.map_err(internal)?;
    Ok(UserProfile {
        user_id,
        google_linked: user.google_linked(),
        email: user.email,
        sheet_id: user.sheet_id,
        job_count,
    })
}

pub async fn update_sheet_id(
    ctx: &ApiContext,
    user_id: UserId,
    sheet_input: &str,
) -> Result<String, ApiError> {
    if sheet_input.trim().is_empty() {
        return Err(ApiError::new(ErrorCode::Validation, "sheet id is required"));
    }
    let sheet_id = normalize_sheet_id(sheet_input)?;
    let updated = ctx
        .storage
        .update_sheet_id(user_id, &sheet_id)
        .await
        .map_err(internal)?;
    if !updated {
        return Err(ApiError::new(ErrorCode::NotFound, "user not found"));
    }
    Ok(sheet_id)
}

pub async fn list_jobs(ctx: &ApiContext, user_id: UserId) -> Result<Vec<JobSummary>, ApiError> {
    load_user(ctx, user_id).await?;
    let jobs = ctx.storage.list_jobs(user_id).await.map_err(internal)?;
    Ok(jobs.into_iter().map(JobSummary::from).collect())
}

/// Consent URL for linking a user's Google account. `state` is a short-lived signed token.
pub fn google_login_url(ctx: &ApiContext, user_id: UserId) -> Result<String, ApiError> {
    let state = ctx.auth.issue_oauth_state(user_id)?;
    ctx.google
        .oauth
        .authorization_url(&state)
        .map(String::from)
        .map_err(|e| internal(e.into()))
}

pub async fn complete_google_link(
    ctx: &ApiContext,
    code: &str,
    state: &str,
) -> Result<UserId, ApiError> {
    let user_id = ctx.auth.verify_oauth_state(state)?;
    let user = load_user(ctx, user_id).await?;

    let grant = oauth::exchange_code(&ctx.http, &ctx.google.oauth, code)
        .await
        .map_err(|e| ApiError::new(ErrorCode::Unauthorized, format!("code exchange failed: {e}")))?;

    match oauth::fetch_user_email(&ctx.http, &ctx.google.oauth, &grant.access_token).await {
        Ok(google_email) if !google_email.eq_ignore_ascii_case(&user.email) => {
            warn!(%user_id, %google_email, "linked google account differs from submitted email");
        }
        Ok(_) => {}
        Err(error) => warn!(%user_id, %error, "unable to load google profile"),
    }

    ctx.storage
        .store_google_tokens(user_id, &grant.access_token, grant.refresh_token.as_deref())
        .await
        .map_err(internal)?;
    info!(%user_id, "google account linked");
    Ok(user_id)
}

pub(crate) async fn load_user(ctx: &ApiContext, user_id: UserId) -> Result<StoredUser, ApiError> {
    ctx.storage
        .load_user(user_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "user not found"))
}

pub(crate) fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

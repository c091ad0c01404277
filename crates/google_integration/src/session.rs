use std::sync::atomic::{AtomicBool, Ordering};

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::{
    oauth::{refresh_access_token, GoogleOAuthConfig},
    GoogleApiError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

/// One user's authorized Google account, shared by the Gmail and Sheets clients.
pub struct GoogleSession {
    http: Client,
    oauth: GoogleOAuthConfig,
    tokens: RwLock<GoogleTokens>,
    refreshed: AtomicBool,
}

impl GoogleSession {
    pub fn new(http: Client, oauth: GoogleOAuthConfig, tokens: GoogleTokens) -> Self {
        Self {
            http,
            oauth,
            tokens: RwLock::new(tokens),
            refreshed: AtomicBool::new(false),
        }
    }

    pub async fn tokens(&self) -> GoogleTokens {
        self.tokens.read().await.clone()
    }

    /// True once the access token has been replaced during this session's lifetime.
    pub fn was_refreshed(&self) -> bool {
        self.refreshed.load(Ordering::Relaxed)
    }

    pub(crate) async fn send_json<T, F>(&self, build: F) -> Result<T, GoogleApiError>
    where
        T: DeserializeOwned,
        F: Fn(&Client, &str) -> RequestBuilder,
    {
        let response = self.send_authorized(build).await?;
        Ok(response.json().await?)
    }

    /// Sends with the current access token, refreshing and retrying once on a 401.
    pub(crate) async fn send_authorized<F>(&self, build: F) -> Result<Response, GoogleApiError>
    where
        F: Fn(&Client, &str) -> RequestBuilder,
    {
        let token = self.tokens.read().await.access_token.clone();
        let mut response = build(&self.http, &token).send().await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("google access token rejected, refreshing");
            let token = self.refresh().await?;
            response = build(&self.http, &token).send().await?;
        }

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(GoogleApiError::Unauthorized);
        }
        if !status.is_success() {
            return Err(GoogleApiError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response)
    }

    async fn refresh(&self) -> Result<String, GoogleApiError> {
        let mut tokens = self.tokens.write().await;
        let refresh_token = tokens
            .refresh_token
            .clone()
            .ok_or(GoogleApiError::MissingRefreshToken)?;
        let grant = refresh_access_token(&self.http, &self.oauth, &refresh_token).await?;

        tokens.access_token = grant.access_token;
        if let Some(rotated) = grant.refresh_token {
            tokens.refresh_token = Some(rotated);
        }
        self.refreshed.store(true, Ordering::Relaxed);
        info!("google access token refreshed");
        Ok(tokens.access_token.clone())
    }
}

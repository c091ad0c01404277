use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::GoogleApiError;

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";
pub const GOOGLE_SCOPES: &str = "https://www.googleapis.com/auth/gmail.readonly \
https://www.googleapis.com/auth/spreadsheets email profile";

#[derive(Debug, Clone)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
}

impl GoogleOAuthConfig {
    pub fn new(client_id: String, client_secret: String, redirect_uri: String) -> Self {
        Self {
            client_id,
            client_secret,
            redirect_uri,
            auth_url: GOOGLE_AUTH_URL.into(),
            token_url: GOOGLE_TOKEN_URL.into(),
            userinfo_url: GOOGLE_USERINFO_URL.into(),
        }
    }

    /// Consent screen location. `state` comes back untouched on the callback.
    pub fn authorization_url(&self, state: &str) -> Result<Url, GoogleApiError> {
        let mut location = Url::parse(&self.auth_url)?;
        location
            .query_pairs_mut()
            .clear()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", GOOGLE_SCOPES)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("state", state);
        debug!(%location, "built google consent url");
        Ok(location)
    }
}

/// Token endpoint response for both code exchange and refresh.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct UserInfoPayload {
    email: String,
}

pub async fn exchange_code(
    http: &Client,
    config: &GoogleOAuthConfig,
    code: &str,
) -> Result<TokenGrant, GoogleApiError> {
    let response = http
        .post(&config.token_url)
        .form(&[
            ("code", code),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("redirect_uri", config.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await?;
    parse_token_response(response).await
}

pub async fn refresh_access_token(
    http: &Client,
    config: &GoogleOAuthConfig,
    refresh_token: &str,
) -> Result<TokenGrant, GoogleApiError> {
    let response = http
        .post(&config.token_url)
        .form(&[
            ("refresh_token", refresh_token),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("grant_type", "refresh_token"),
        ])
        .send()
        .await?;
    parse_token_response(response).await
}

pub async fn fetch_user_email(
    http: &Client,
    config: &GoogleOAuthConfig,
    access_token: &str,
) -> Result<String, GoogleApiError> {
    let response = http
        .get(&config.userinfo_url)
        .bearer_auth(access_token)
        .send()
        .await?;
    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(GoogleApiError::Unauthorized);
    }
    if !status.is_success() {
        return Err(GoogleApiError::Status {
            status: status.as_u16(),
            body: response.text().await.unwrap_or_default(),
        });
    }
    let payload: UserInfoPayload = response.json().await?;
    Ok(payload.email)
}

async fn parse_token_response(response: reqwest::Response) -> Result<TokenGrant, GoogleApiError> {
    let status = response.status();
    if !status.is_success() {
        return Err(GoogleApiError::Status {
            status: status.as_u16(),
            body: response.text().await.unwrap_or_default(),
        });
    }
    Ok(response.json().await?)
}

use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, Secret};
use serde::de::DeserializeOwned;
use shared::{
    domain::{JobSummary, UserId},
    error::ApiError,
    protocol::{JobList, SubmitCredentialsResponse, SyncRequest, SyncStarted, UserProfile},
};
use tracing::{debug, info};
use url::Url;

use crate::{error::ClientError, form::Credentials};

/// HTTP client for the tracker server. Holds the session token from the last successful submit.
pub struct TrackerClient {
    http: Client,
    server_url: String,
    session_token: Option<Secret<String>>,
}

impl TrackerClient {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), server_url)
    }

    pub fn with_client(http: Client, server_url: impl Into<String>) -> Self {
        let server_url = server_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            server_url,
            session_token: None,
        }
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub fn set_session_token(&mut self, token: impl Into<String>) {
        self.session_token = Some(Secret::new(token.into()));
    }

    pub fn has_session(&self) -> bool {
        self.session_token.is_some()
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.session_token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    pub async fn submit_credentials(
        &mut self,
        credentials: &Credentials,
    ) -> Result<SubmitCredentialsResponse, ClientError> {
        let res = self
            .http
            .post(format!("{}/credentials", self.server_url))
            .json(&credentials.to_request())
            .send()
            .await?;
        let body: SubmitCredentialsResponse = read_json(res).await?;
        self.set_session_token(body.session_token.clone());
        info!(user_id = %body.user_id, google_linked = body.google_linked, "credentials registered");
        Ok(body)
    }

    pub async fn user_profile(&self, user_id: UserId) -> Result<UserProfile, ClientError> {
        let res = self
            .authorized(self.http.get(format!("{}/user/profile", self.server_url)))
            .query(&[("user_id", user_id.0)])
            .send()
            .await?;
        read_json(res).await
    }

    pub async fn list_jobs(&self, user_id: UserId) -> Result<Vec<JobSummary>, ClientError> {
        let res = self
            .authorized(self.http.get(format!("{}/jobs", self.server_url)))
            .query(&[("user_id", user_id.0)])
            .send()
            .await?;
        let list: JobList = read_json(res).await?;
        Ok(list.jobs)
    }

    /// Asks the server to start a background sync. `started` is false when one is already running.
    pub async fn trigger_sync(&self, user_id: UserId) -> Result<SyncStarted, ClientError> {
        let res = self
            .authorized(self.http.post(format!("{}/sync", self.server_url)))
            .json(&SyncRequest { user_id })
            .send()
            .await?;
        let started: SyncStarted = read_json(res).await?;
        debug!(%user_id, started = started.started, "sync requested");
        Ok(started)
    }

    /// Where the user should go in a browser to link their Google account.
    /// The session rides in the query since a browser link can't carry headers.
    pub fn google_login_url(&self, user_id: UserId) -> Result<Url, ClientError> {
        let mut url = Url::parse(&format!("{}/auth/google/login", self.server_url))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("user_id", &user_id.to_string());
            if let Some(token) = &self.session_token {
                pairs.append_pair("token", token.expose_secret());
            }
        }
        Ok(url)
    }
}

async fn read_json<T: DeserializeOwned>(res: Response) -> Result<T, ClientError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res.json().await?);
    }

    let body = res.text().await.unwrap_or_default();
    match serde_json::from_str::<ApiError>(&body) {
        Ok(error) => Err(ClientError::Api {
            status: status.as_u16(),
            error,
        }),
        Err(_) => Err(ClientError::UnexpectedStatus {
            status: status.as_u16(),
            body,
        }),
    }
}

#[cfg(test)]
#[path = "tests/tracker_client_tests.rs"]
mod tests;

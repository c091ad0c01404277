use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{JobSummary, UserId};

/// Shown when any credentials field is left empty, by the popup and echoed by the server.
pub const MISSING_FIELDS_MESSAGE: &str = "Please fill out all fields.";
pub const SUBMIT_SUCCESS_MESSAGE: &str = "Submitted successfully!";

/// Body of `POST /credentials`, the popup form as sent over the wire.
#[derive(Clone, Serialize, Deserialize)]
pub struct SubmitCredentialsRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub sheet_id: String,
}

impl fmt::Debug for SubmitCredentialsRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmitCredentialsRequest")
            .field("email", &self.email)
            .field("password", &"[redacted]")
            .field("sheet_id", &self.sheet_id)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SubmitCredentialsResponse {
    pub user_id: UserId,
    pub sheet_id: String,
    pub google_linked: bool,
    /// Bearer token for the per-user routes.
    pub session_token: String,
}

impl fmt::Debug for SubmitCredentialsResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmitCredentialsResponse")
            .field("user_id", &self.user_id)
            .field("sheet_id", &self.sheet_id)
            .field("google_linked", &self.google_linked)
            .field("session_token", &"[redacted]")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet_id: Option<String>,
    pub google_linked: bool,
    pub job_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSheetIdRequest {
    pub user_id: UserId,
    pub sheet_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequest {
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStarted {
    pub started: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub fetched: u32,
    pub classified: u32,
    pub created: u32,
    pub updated: u32,
    pub skipped: u32,
    pub rows_written: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobList {
    pub user_id: UserId,
    pub jobs: Vec<JobSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_debug_hides_password() {
        let request = SubmitCredentialsRequest {
            email: "a@b.com".into(),
            password: "hunter2".into(),
            sheet_id: "1AbC".into(),
        };
        let rendered = format!("{request:?}");
        assert!(rendered.contains("a@b.com"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn missing_form_fields_deserialize_as_empty() {
        let request: SubmitCredentialsRequest =
            serde_json::from_str(r#"{"email":"a@b.com"}"#).expect("json");
        assert!(request.password.is_empty());
        assert!(request.sheet_id.is_empty());
    }
}

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use serde_json::{json, Value};
use shared::domain::ApplicationStatus;
use tracing::{debug, warn};

use crate::{Classification, ClassifierError, JobClassifier};

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const OPENAI_MODEL: &str = "gpt-4o-mini";

const SYSTEM_PROMPT: &str = "You are a job applicant checking emails for job application. \
When you receive an email, first, you check if the email is a job application email or not. \
If it is a job application email, you extract the job title, company name and status to JSON. \
The status can be \"applied\", \"interview\", \"offer\", \"rejected\" or \"not interested\". \
If it is not a job application email, you return \"Not a job application email\".";

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: Secret<String>,
    pub base_url: String,
    pub model: String,
}

impl OpenAiConfig {
    pub fn new(api_key: Secret<String>) -> Self {
        Self {
            api_key,
            base_url: OPENAI_API_BASE.into(),
            model: OPENAI_MODEL.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawClassification {
    #[serde(default)]
    is_job_application_email: bool,
    #[serde(default)]
    job_title: Option<String>,
    #[serde(default)]
    company_name: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

pub struct OpenAiClassifier {
    http: Client,
    config: OpenAiConfig,
}

impl OpenAiClassifier {
    pub fn new(http: Client, config: OpenAiConfig) -> Self {
        Self { http, config }
    }

    fn request_body(&self, subject: &str, body: &str) -> Value {
        let statuses: Vec<&str> = ApplicationStatus::ALL.iter().map(|s| s.as_str()).collect();
        json!({
            "model": self.config.model,
            "messages": [
                { "role": "developer", "content": SYSTEM_PROMPT },
                { "role": "user", "content": format!("Subject: {subject}\nBody: {body}") }
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "email_schema",
                    "schema": {
                        "type": "object",
                        "properties": {
                            "is_job_application_email": { "type": "boolean" },
                            "job_title": { "type": "string" },
                            "company_name": { "type": "string" },
                            "status": { "type": "string", "enum": statuses }
                        },
                        "additionalProperties": false
                    }
                }
            }
        })
    }
}

/// Turns the model's message content into a classification. Free-text refusals count as "not a job".
pub(crate) fn parse_content(content: &str) -> Result<Classification, ClassifierError> {
    let trimmed = content.trim();
    if !trimmed.starts_with('{') {
        debug!("classifier answered in prose, treating as non-application");
        return Ok(Classification::not_job_application());
    }

    let raw: RawClassification = serde_json::from_str(trimmed)?;
    let status = match raw.status.as_deref() {
        Some(value) => match value.parse::<ApplicationStatus>() {
            Ok(status) => Some(status),
            Err(error) => {
                warn!(%error, "classifier returned an unknown status");
                None
            }
        },
        None => None,
    };

    Ok(Classification {
        is_job_application_email: raw.is_job_application_email,
        job_title: raw.job_title,
        company_name: raw.company_name,
        status,
    })
}

#[async_trait]
impl JobClassifier for OpenAiClassifier {
    async fn classify(&self, subject: &str, body: &str) -> Result<Classification, ClassifierError> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let response = self
            .http
            .post(url)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&self.request_body(subject, body))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClassifierError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let completion: ChatCompletion = response.json().await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(ClassifierError::EmptyResponse)?;
        parse_content(&content)
    }
}

#[cfg(test)]
#[path = "tests/openai_tests.rs"]
mod tests;

use std::{str::FromStr, sync::Arc};

use async_trait::async_trait;
use shared::domain::ApplicationStatus;
use thiserror::Error;

mod heuristic;
mod openai;

pub use heuristic::HeuristicClassifier;
pub use openai::{OpenAiClassifier, OpenAiConfig, OPENAI_API_BASE, OPENAI_MODEL};

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("classifier response had no content")]
    EmptyResponse,
    #[error("classifier content is not valid json: {0}")]
    MalformedContent(#[from] serde_json::Error),
    #[error("invalid classifier pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("openai classifier selected without an api key")]
    MissingApiKey,
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// What the classifier made of one email.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub is_job_application_email: bool,
    pub job_title: Option<String>,
    pub company_name: Option<String>,
    pub status: Option<ApplicationStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedJob {
    pub job_title: String,
    pub company: String,
    pub status: ApplicationStatus,
}

impl Classification {
    pub fn not_job_application() -> Self {
        Self::default()
    }

    /// A trackable job needs the flag plus a non-blank title and company. Status defaults to applied.
    pub fn into_job(self) -> Option<ClassifiedJob> {
        if !self.is_job_application_email {
            return None;
        }
        let job_title = non_blank(self.job_title)?;
        let company = non_blank(self.company_name)?;
        Some(ClassifiedJob {
            job_title,
            company,
            status: self.status.unwrap_or(ApplicationStatus::Applied),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[async_trait]
pub trait JobClassifier: Send + Sync {
    async fn classify(&self, subject: &str, body: &str) -> Result<Classification, ClassifierError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierProvider {
    OpenAi,
    Heuristic,
}

impl FromStr for ClassifierProvider {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "heuristic" | "dummy" => Ok(Self::Heuristic),
            other => Err(format!("unknown classifier provider '{other}'")),
        }
    }
}

pub fn build_classifier(
    provider: ClassifierProvider,
    openai: Option<OpenAiConfig>,
) -> Result<Arc<dyn JobClassifier>, ClassifierError> {
    match provider {
        ClassifierProvider::OpenAi => {
            let config = openai.ok_or(ClassifierError::MissingApiKey)?;
            Ok(Arc::new(OpenAiClassifier::new(reqwest::Client::new(), config)))
        }
        ClassifierProvider::Heuristic => Ok(Arc::new(HeuristicClassifier::new()?)),
    }
}

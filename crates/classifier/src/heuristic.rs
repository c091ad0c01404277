use async_trait::async_trait;
use regex::Regex;
use shared::domain::ApplicationStatus;

use crate::{Classification, ClassifierError, JobClassifier};

pub const UNKNOWN_POSITION: &str = "Unknown Position";
pub const UNKNOWN_COMPANY: &str = "Unknown Company";

/// A message must mention one of these before it counts as job mail at all.
const JOB_KEYWORDS: &[&str] = &["application", "applied", "interview", "offer", "unfortunately"];

const OFFER_KEYWORDS: &[&str] = &["offer letter", "pleased to offer", "job offer", "offer"];
const INTERVIEW_KEYWORDS: &[&str] = &["interview", "schedule a call", "phone screen"];
const REJECTED_KEYWORDS: &[&str] = &[
    "unfortunately",
    "not moving forward",
    "regret to inform",
    "other candidates",
];
const APPLIED_KEYWORDS: &[&str] = &["application", "applied", "applying"];

/// Offline classifier built from subject/body patterns. Used when no LLM is configured.
pub struct HeuristicClassifier {
    title: Regex,
    company: Regex,
}

impl HeuristicClassifier {
    pub fn new() -> Result<Self, ClassifierError> {
        Ok(Self {
            title: Regex::new(r"(?:(?:Hiring|Opportunity): )?([A-Za-z ]+)")?,
            company: Regex::new(r"\bat ([A-Z][a-z]+(?: [A-Z][a-z]+)*)")?,
        })
    }

    pub fn job_title(&self, subject: &str) -> String {
        self.title
            .captures(subject)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|title| !title.is_empty())
            .unwrap_or_else(|| UNKNOWN_POSITION.to_string())
    }

    pub fn company(&self, body: &str) -> String {
        self.company
            .captures(body)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| UNKNOWN_COMPANY.to_string())
    }

    pub fn is_job_mail(&self, subject: &str, body: &str) -> bool {
        let text = format!("{subject} {body}").to_ascii_lowercase();
        JOB_KEYWORDS.iter().any(|k| text.contains(k))
    }

    pub fn status(&self, subject: &str, body: &str) -> Option<ApplicationStatus> {
        let text = format!("{subject} {body}").to_ascii_lowercase();
        let mentions = |keywords: &[&str]| keywords.iter().any(|k| text.contains(k));

        if mentions(OFFER_KEYWORDS) {
            Some(ApplicationStatus::Offer)
        } else if mentions(INTERVIEW_KEYWORDS) {
            Some(ApplicationStatus::Interview)
        } else if mentions(REJECTED_KEYWORDS) {
            Some(ApplicationStatus::Rejected)
        } else if mentions(APPLIED_KEYWORDS) {
            Some(ApplicationStatus::Applied)
        } else {
            None
        }
    }
}

#[async_trait]
impl JobClassifier for HeuristicClassifier {
    async fn classify(&self, subject: &str, body: &str) -> Result<Classification, ClassifierError> {
        if !self.is_job_mail(subject, body) {
            return Ok(Classification::not_job_application());
        }
        let status = self
            .status(subject, body)
            .unwrap_or(ApplicationStatus::Applied);
        Ok(Classification {
            is_job_application_email: true,
            job_title: Some(self.job_title(subject)),
            company_name: Some(self.company(body)),
            status: Some(status),
        })
    }
}

#[cfg(test)]
#[path = "tests/heuristic_tests.rs"]
mod tests;

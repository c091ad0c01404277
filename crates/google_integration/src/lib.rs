use async_trait::async_trait;
use thiserror::Error;
use url::Url;

pub mod body;
mod gmail;
pub mod oauth;
mod session;
mod sheets;

pub use gmail::GmailClient;
pub use oauth::{GoogleOAuthConfig, TokenGrant};
pub use session::{GoogleSession, GoogleTokens};
pub use sheets::{row_range, SheetsClient};

pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com";
pub const SHEETS_API_BASE: &str = "https://sheets.googleapis.com";

#[derive(Debug, Error)]
pub enum GoogleApiError {
    #[error("google rejected the access token")]
    Unauthorized,
    #[error("no refresh token stored for this account")]
    MissingRefreshToken,
    #[error("google api returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid google api url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePage {
    pub message_ids: Vec<String>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub id: String,
    pub sender: Option<String>,
    pub subject: String,
    pub body: String,
}

/// A mailbox that can be searched page by page.
#[async_trait]
pub trait MailSource: Send + Sync {
    async fn list_messages(
        &self,
        query: &str,
        page_token: Option<&str>,
        max_results: u32,
    ) -> anyhow::Result<MessagePage>;

    /// `None` when the message carries no payload worth classifying.
    async fn fetch_message(&self, message_id: &str) -> anyhow::Result<Option<MailMessage>>;
}

#[async_trait]
pub trait SheetSink: Send + Sync {
    async fn first_sheet_title(&self, spreadsheet_id: &str) -> anyhow::Result<String>;
    async fn write_row(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: &[String],
    ) -> anyhow::Result<()>;
}

pub(crate) fn push_path_segment(url: &mut Url, segment: &str) -> Result<(), GoogleApiError> {
    url.path_segments_mut()
        .map_err(|_| {
            GoogleApiError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase)
        })?
        .push(segment);
    Ok(())
}

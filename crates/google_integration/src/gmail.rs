use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::{
    body::{extract_body, MessagePart},
    push_path_segment, GoogleApiError, GoogleSession, MailMessage, MailSource, MessagePage,
    GMAIL_API_BASE,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListMessagesResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct FullMessage {
    id: String,
    #[serde(default)]
    payload: Option<MessagePart>,
}

/// Read-only view of the authorized user's mailbox (`users/me`).
pub struct GmailClient {
    session: Arc<GoogleSession>,
    base_url: String,
}

impl GmailClient {
    pub fn new(session: Arc<GoogleSession>) -> Self {
        Self::with_base_url(session, GMAIL_API_BASE)
    }

    pub fn with_base_url(session: Arc<GoogleSession>, base_url: impl Into<String>) -> Self {
        Self {
            session,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn messages_url(&self) -> Result<Url, GoogleApiError> {
        Ok(Url::parse(&format!(
            "{}/gmail/v1/users/me/messages",
            self.base_url
        ))?)
    }
}

#[async_trait]
impl MailSource for GmailClient {
    async fn list_messages(
        &self,
        query: &str,
        page_token: Option<&str>,
        max_results: u32,
    ) -> anyhow::Result<MessagePage> {
        let mut url = self.messages_url()?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("q", query)
                .append_pair("maxResults", &max_results.to_string());
            if let Some(token) = page_token {
                pairs.append_pair("pageToken", token);
            }
        }

        let response: ListMessagesResponse = self
            .session
            .send_json(|http, token| http.get(url.clone()).bearer_auth(token))
            .await?;
        debug!(
            count = response.messages.len(),
            has_more = response.next_page_token.is_some(),
            "listed gmail messages"
        );

        Ok(MessagePage {
            message_ids: response.messages.into_iter().map(|m| m.id).collect(),
            next_page_token: response.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    async fn fetch_message(&self, message_id: &str) -> anyhow::Result<Option<MailMessage>> {
        let mut url = self.messages_url()?;
        push_path_segment(&mut url, message_id)?;
        url.query_pairs_mut().append_pair("format", "full");

        let message: FullMessage = self
            .session
            .send_json(|http, token| http.get(url.clone()).bearer_auth(token))
            .await?;

        let Some(payload) = message.payload else {
            debug!(message_id = %message.id, "message has no payload, skipping");
            return Ok(None);
        };

        Ok(Some(MailMessage {
            id: message.id,
            sender: payload.header("From").map(str::to_string),
            subject: payload.subject(),
            body: extract_body(&payload),
        }))
    }
}

#[cfg(test)]
#[path = "tests/gmail_tests.rs"]
mod tests;

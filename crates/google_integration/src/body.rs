//! Plain-text extraction from Gmail `format=full` message payloads.
//!
//! Gmail hands back the MIME tree already split into parts, each with its
//! headers and a base64url `body.data`. Only inline `text/plain` and
//! `text/html` leaves contribute to the extracted body.

use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine as _,
};
use scraper::Html;
use serde::Deserialize;

const GMAIL_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

pub const DEFAULT_SUBJECT: &str = "No Subject";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub headers: Vec<MessageHeader>,
    #[serde(default)]
    pub body: PartBody,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageHeader {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartBody {
    #[serde(default)]
    pub data: Option<String>,
}

impl MessagePart {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|header| header.name.eq_ignore_ascii_case(name))
            .map(|header| header.value.as_str())
    }

    pub fn subject(&self) -> String {
        self.header("Subject")
            .map(str::trim)
            .filter(|subject| !subject.is_empty())
            .unwrap_or(DEFAULT_SUBJECT)
            .to_string()
    }

    fn is_attachment(&self) -> bool {
        !self.filename.is_empty()
            || self
                .header("Content-Disposition")
                .is_some_and(|value| value.to_ascii_lowercase().contains("attachment"))
    }

    fn decoded_text(&self) -> Option<String> {
        let data = self.body.data.as_deref()?;
        let bytes = GMAIL_BASE64.decode(data.trim()).ok()?;
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn text_content(&self) -> Option<String> {
        if self.is_attachment() {
            return None;
        }
        match self.mime_type.to_ascii_lowercase().as_str() {
            "text/plain" => self.decoded_text(),
            "text/html" => self.decoded_text().map(|html| html_to_text(&html)),
            _ => None,
        }
    }
}

/// Walks the part tree depth-first, joins every inline text leaf, then drops
/// line breaks and trims.
pub fn extract_body(payload: &MessagePart) -> String {
    let mut contents = Vec::new();
    collect_text(payload, &mut contents);
    contents
        .join("\n")
        .replace(['\n', '\r'], "")
        .trim()
        .to_string()
}

fn collect_text(part: &MessagePart, contents: &mut Vec<String>) {
    if let Some(text) = part.text_content() {
        contents.push(text);
    }
    for child in &part.parts {
        collect_text(child, contents);
    }
}

/// Keeps text nodes only. Markup, comments, and `<script>`/`<style>` bodies are dropped.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    document
        .root_element()
        .descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let hidden = node.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .is_some_and(|el| matches!(el.name(), "script" | "style"))
            });
            (!hidden).then(|| text.replace('\u{a0}', " "))
        })
        .collect()
}

#[cfg(test)]
#[path = "tests/body_tests.rs"]
mod tests;

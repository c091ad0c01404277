use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::{push_path_segment, GoogleApiError, GoogleSession, SheetSink, SHEETS_API_BASE};

#[derive(Debug, Deserialize)]
struct SpreadsheetMetadata {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValueRange<'a> {
    range: &'a str,
    major_dimension: &'static str,
    values: [&'a [String]; 1],
}

/// A1 range covering columns A to C of a single row, quoting the sheet title when needed.
pub fn row_range(sheet_title: &str, row_number: u32) -> String {
    let plain = !sheet_title.is_empty()
        && sheet_title
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain {
        format!("{sheet_title}!A{row_number}:C{row_number}")
    } else {
        format!(
            "'{}'!A{row_number}:C{row_number}",
            sheet_title.replace('\'', "''")
        )
    }
}

pub struct SheetsClient {
    session: Arc<GoogleSession>,
    base_url: String,
}

impl SheetsClient {
    pub fn new(session: Arc<GoogleSession>) -> Self {
        Self::with_base_url(session, SHEETS_API_BASE)
    }

    pub fn with_base_url(session: Arc<GoogleSession>, base_url: impl Into<String>) -> Self {
        Self {
            session,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn spreadsheet_url(&self, spreadsheet_id: &str) -> Result<Url, GoogleApiError> {
        let mut url = Url::parse(&format!("{}/v4/spreadsheets", self.base_url))?;
        push_path_segment(&mut url, spreadsheet_id)?;
        Ok(url)
    }
}

#[async_trait]
impl SheetSink for SheetsClient {
    async fn first_sheet_title(&self, spreadsheet_id: &str) -> anyhow::Result<String> {
        let mut url = self.spreadsheet_url(spreadsheet_id)?;
        url.query_pairs_mut()
            .append_pair("fields", "sheets.properties.title");

        let metadata: SpreadsheetMetadata = self
            .session
            .send_json(|http, token| http.get(url.clone()).bearer_auth(token))
            .await?;

        metadata
            .sheets
            .into_iter()
            .next()
            .map(|sheet| sheet.properties.title)
            .ok_or_else(|| anyhow!("spreadsheet '{spreadsheet_id}' has no worksheets"))
    }

    async fn write_row(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: &[String],
    ) -> anyhow::Result<()> {
        let mut url = self.spreadsheet_url(spreadsheet_id)?;
        push_path_segment(&mut url, "values")?;
        push_path_segment(&mut url, range)?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");

        let body = ValueRange {
            range,
            major_dimension: "ROWS",
            values: [values],
        };
        self.session
            .send_authorized(|http, token| http.put(url.clone()).bearer_auth(token).json(&body))
            .await?;
        debug!(%range, "wrote sheet row");
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/sheets_tests.rs"]
mod tests;

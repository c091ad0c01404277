use std::{
    collections::{BTreeMap, HashSet},
    sync::{Arc, Mutex},
};

use chrono::{Duration as ChronoDuration, Utc};
use classifier::JobClassifier;
use google_integration::{
    row_range, GmailClient, GoogleSession, GoogleTokens, MailMessage, MailSource, SheetSink,
    SheetsClient,
};
use shared::{
    domain::UserId,
    error::{ApiError, ErrorCode},
    protocol::SyncReport,
};
use storage::JobUpsert;
use tracing::{debug, info, instrument, warn};

use crate::{internal, load_user, ApiContext, SyncOptions};

/// Tracks which users currently have a sync in flight.
#[derive(Debug, Clone, Default)]
pub struct SyncRegistry {
    running: Arc<Mutex<HashSet<UserId>>>,
}

impl SyncRegistry {
    /// Claims the user's slot, or `None` when a run is already going.
    pub fn try_begin(&self, user_id: UserId) -> Option<SyncGuard> {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if !running.insert(user_id) {
            return None;
        }
        Some(SyncGuard {
            registry: self.clone(),
            user_id,
        })
    }

    pub fn is_running(&self, user_id: UserId) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&user_id)
    }
}

/// Releases the user's slot when dropped, including when the task panics.
#[derive(Debug)]
pub struct SyncGuard {
    registry: SyncRegistry,
    user_id: UserId,
}

impl Drop for SyncGuard {
    fn drop(&mut self) {
        self.registry
            .running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.user_id);
    }
}

/// Builds the Gmail and Sheets clients from the user's stored tokens and runs the pipeline.
pub async fn run_sync_for_user(ctx: &ApiContext, user_id: UserId) -> Result<SyncReport, ApiError> {
    let user = load_user(ctx, user_id).await?;
    let Some(access_token) = user.google_access_token.clone() else {
        return Err(ApiError::new(
            ErrorCode::Unauthorized,
            "google account is not linked",
        ));
    };

    let session = Arc::new(GoogleSession::new(
        ctx.http.clone(),
        ctx.google.oauth.clone(),
        GoogleTokens {
            access_token,
            refresh_token: user.google_refresh_token.clone(),
        },
    ));
    let gmail = GmailClient::with_base_url(session.clone(), ctx.google.gmail_base_url.clone());
    let sheets = SheetsClient::with_base_url(session.clone(), ctx.google.sheets_base_url.clone());

    let result = sync_job_applications(
        ctx,
        user_id,
        &gmail,
        &sheets,
        ctx.classifier.as_ref(),
        &ctx.sync,
    )
    .await;

    // Keep a refreshed token even when the run itself failed.
    if session.was_refreshed() {
        let tokens = session.tokens().await;
        if let Err(error) = ctx
            .storage
            .store_google_tokens(user_id, &tokens.access_token, tokens.refresh_token.as_deref())
            .await
        {
            warn!(%user_id, %error, "failed to persist refreshed google token");
        }
    }

    result
}

#[instrument(skip_all, fields(%user_id))]
pub async fn sync_job_applications(
    ctx: &ApiContext,
    user_id: UserId,
    mail: &dyn MailSource,
    sheets: &dyn SheetSink,
    classifier: &dyn JobClassifier,
    options: &SyncOptions,
) -> Result<SyncReport, ApiError> {
    let user = load_user(ctx, user_id).await?;
    let Some(sheet_id) = user.sheet_id.clone().filter(|s| !s.is_empty()) else {
        return Err(ApiError::new(ErrorCode::Validation, "no google sheet configured"));
    };
    if !user.google_linked() {
        return Err(ApiError::new(
            ErrorCode::Unauthorized,
            "google account is not linked",
        ));
    }

    let after = match ctx.storage.latest_fetch_date(user_id).await.map_err(internal)? {
        Some(last) => last,
        None => Utc::now() - ChronoDuration::days(options.lookback_days),
    };
    let query = format!("after:{}", after.format("%Y/%m/%d"));
    info!(%query, "starting mail sync");

    let sheet_title = sheets
        .first_sheet_title(&sheet_id)
        .await
        .map_err(|e| internal(e.context("failed to read spreadsheet metadata")))?;

    let mut next_row = first_free_row(ctx.storage.count_jobs(user_id).await.map_err(internal)?);
    let mut report = SyncReport::default();
    let mut page_token: Option<String> = None;

    loop {
        let page = mail
            .list_messages(&query, page_token.as_deref(), options.batch_size)
            .await
            .map_err(|e| internal(e.context("failed to list messages")))?;

        let mut touched: BTreeMap<u32, [String; 3]> = BTreeMap::new();
        for message_id in &page.message_ids {
            report.fetched += 1;
            let message = match mail.fetch_message(message_id).await {
                Ok(Some(message)) => message,
                Ok(None) => {
                    report.skipped += 1;
                    continue;
                }
                Err(error) => {
                    warn!(%message_id, error = %format!("{error:#}"), "failed to fetch message");
                    report.skipped += 1;
                    continue;
                }
            };

            match record_message(ctx, user_id, &message, classifier, &mut next_row).await? {
                Some((row, values, created)) => {
                    report.classified += 1;
                    if created {
                        report.created += 1;
                    } else {
                        report.updated += 1;
                    }
                    touched.insert(row, values);
                }
                None => report.skipped += 1,
            }
        }

        for (row, values) in &touched {
            if report.rows_written > 0 && !options.write_delay.is_zero() {
                tokio::time::sleep(options.write_delay).await;
            }
            let range = row_range(&sheet_title, *row);
            sheets
                .write_row(&sheet_id, &range, values)
                .await
                .map_err(|e| internal(e.context(format!("failed to write {range}"))))?;
            report.rows_written += 1;
        }

        match page.next_page_token {
            Some(token) if !token.is_empty() => page_token = Some(token),
            _ => break,
        }
    }

    let finished_at = Utc::now();
    ctx.storage
        .insert_fetch_log(user_id, finished_at)
        .await
        .map_err(internal)?;
    report.finished_at = Some(finished_at);
    info!(
        fetched = report.fetched,
        created = report.created,
        updated = report.updated,
        rows_written = report.rows_written,
        "mail sync finished"
    );
    Ok(report)
}

/// Row 1 is the sheet header, so the first job lands on row 2.
fn first_free_row(job_count: u32) -> u32 {
    job_count.saturating_add(2)
}

/// Classifies one message and stores the job. Returns the sheet row and its values when it was a job.
async fn record_message(
    ctx: &ApiContext,
    user_id: UserId,
    message: &MailMessage,
    classifier: &dyn JobClassifier,
    next_row: &mut u32,
) -> Result<Option<(u32, [String; 3], bool)>, ApiError> {
    let classification = match classifier.classify(&message.subject, &message.body).await {
        Ok(classification) => classification,
        Err(error) => {
            warn!(message_id = %message.id, %error, "classification failed");
            return Ok(None);
        }
    };
    let Some(job) = classification.into_job() else {
        debug!(message_id = %message.id, "not a job application");
        return Ok(None);
    };

    let (stored, created) = ctx
        .storage
        .get_or_create_job(&JobUpsert {
            user_id,
            job_title: &job.job_title,
            company: &job.company,
            status: job.status,
            sender_email: message.sender.as_deref(),
            row_number: *next_row,
        })
        .await
        .map_err(internal)?;
    if created {
        *next_row = next_row.saturating_add(1);
    }

    let values = [
        stored.job_title,
        stored.company,
        stored.status.as_str().to_string(),
    ];
    Ok(Some((stored.row_number, values, created)))
}

#[cfg(test)]
#[path = "tests/sync_tests.rs"]
mod tests;

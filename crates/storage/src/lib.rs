use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::domain::{ApplicationStatus, JobId, JobSummary, UserId};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone)]
pub struct StoredUser {
    pub user_id: UserId,
    pub email: String,
    pub sheet_id: Option<String>,
    pub google_access_token: Option<String>,
    pub google_refresh_token: Option<String>,
}

impl StoredUser {
    pub fn google_linked(&self) -> bool {
        self.google_access_token.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct StoredJob {
    pub job_id: JobId,
    pub user_id: UserId,
    pub job_title: String,
    pub company: String,
    pub status: ApplicationStatus,
    pub sender_email: Option<String>,
    pub row_number: u32,
}

impl From<StoredJob> for JobSummary {
    fn from(job: StoredJob) -> Self {
        JobSummary {
            job_id: job.job_id,
            job_title: job.job_title,
            company: job.company,
            status: job.status,
            sender_email: job.sender_email,
            row_number: job.row_number,
        }
    }
}

/// Input for [`Storage::get_or_create_job`]. `row_number` is only used when the job is new.
#[derive(Debug, Clone)]
pub struct JobUpsert<'a> {
    pub user_id: UserId,
    pub job_title: &'a str,
    pub company: &'a str,
    pub status: ApplicationStatus,
    pub sender_email: Option<&'a str>,
    pub row_number: u32,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        // Every connection to an in-memory database sees its own empty schema.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// Creates the user on first sight of `email`; later calls only replace the sheet id.
    pub async fn upsert_user_by_email(&self, email: &str, sheet_id: &str) -> Result<UserId> {
        let rec = sqlx::query(
            "INSERT INTO users (email, google_sheet_id) VALUES (?, ?)
             ON CONFLICT(email) DO UPDATE SET google_sheet_id=excluded.google_sheet_id
             RETURNING id",
        )
        .bind(email)
        .bind(sheet_id)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to upsert user '{email}'"))?;
        Ok(UserId(rec.get::<i64, _>(0)))
    }

    pub async fn load_user(&self, user_id: UserId) -> Result<Option<StoredUser>> {
        let row = sqlx::query(
            "SELECT id, email, google_sheet_id, google_access_token, google_refresh_token
             FROM users WHERE id = ?",
        )
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| StoredUser {
            user_id: UserId(r.get::<i64, _>(0)),
            email: r.get::<String, _>(1),
            sheet_id: r.get::<Option<String>, _>(2),
            google_access_token: r.get::<Option<String>, _>(3),
            google_refresh_token: r.get::<Option<String>, _>(4),
        }))
    }

    pub async fn update_sheet_id(&self, user_id: UserId, sheet_id: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET google_sheet_id = ? WHERE id = ?")
            .bind(sheet_id)
            .bind(user_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Google only returns a refresh token on first consent, so a missing one keeps the stored value.
    pub async fn store_google_tokens(
        &self,
        user_id: UserId,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE users
             SET google_access_token = ?,
                 google_refresh_token = COALESCE(?, google_refresh_token)
             WHERE id = ?",
        )
        .bind(access_token)
        .bind(refresh_token)
        .bind(user_id.0)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count_jobs(&self, user_id: UserId) -> Result<u32> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs_applied WHERE user_id = ?")
            .bind(user_id.0)
            .fetch_one(&self.pool)
            .await?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    /// Returns the job keyed by (user, title, company) and whether this call created it.
    /// An existing job keeps its row number and takes the new status and sender.
    pub async fn get_or_create_job(&self, job: &JobUpsert<'_>) -> Result<(StoredJob, bool)> {
        let inserted = sqlx::query(
            "INSERT INTO jobs_applied (user_id, job_title, company, status, sender_email, row_number)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(user_id, job_title, company) DO NOTHING
             RETURNING id",
        )
        .bind(job.user_id.0)
        .bind(job.job_title)
        .bind(job.company)
        .bind(job.status.as_str())
        .bind(job.sender_email)
        .bind(i64::from(job.row_number))
        .fetch_optional(&self.pool)
        .await
        .context("failed to insert job")?;
        let created = inserted.is_some();

        if !created {
            sqlx::query(
                "UPDATE jobs_applied
                 SET status = ?, sender_email = COALESCE(?, sender_email), updated_at = CURRENT_TIMESTAMP
                 WHERE user_id = ? AND job_title = ? AND company = ?",
            )
            .bind(job.status.as_str())
            .bind(job.sender_email)
            .bind(job.user_id.0)
            .bind(job.job_title)
            .bind(job.company)
            .execute(&self.pool)
            .await
            .context("failed to update existing job")?;
        }

        let row = sqlx::query(
            "SELECT id, user_id, job_title, company, status, sender_email, row_number
             FROM jobs_applied
             WHERE user_id = ? AND job_title = ? AND company = ?",
        )
        .bind(job.user_id.0)
        .bind(job.job_title)
        .bind(job.company)
        .fetch_one(&self.pool)
        .await?;

        Ok((job_from_row(&row)?, created))
    }

    pub async fn list_jobs(&self, user_id: UserId) -> Result<Vec<StoredJob>> {
        let rows = sqlx::query(
            "SELECT id, user_id, job_title, company, status, sender_email, row_number
             FROM jobs_applied
             WHERE user_id = ?
             ORDER BY row_number ASC",
        )
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(job_from_row).collect()
    }

    pub async fn latest_fetch_date(&self, user_id: UserId) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            "SELECT last_fetch_date FROM fetch_logs
             WHERE user_id = ?
             ORDER BY last_fetch_date DESC
             LIMIT 1",
        )
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.get::<DateTime<Utc>, _>(0)))
    }

    pub async fn insert_fetch_log(&self, user_id: UserId, fetched_at: DateTime<Utc>) -> Result<()> {
        sqlx::query("INSERT INTO fetch_logs (user_id, last_fetch_date) VALUES (?, ?)")
            .bind(user_id.0)
            .bind(fetched_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn job_from_row(r: &SqliteRow) -> Result<StoredJob> {
    let status = r
        .get::<String, _>(4)
        .parse::<ApplicationStatus>()
        .context("stored job has an unreadable status")?;
    Ok(StoredJob {
        job_id: JobId(r.get::<i64, _>(0)),
        user_id: UserId(r.get::<i64, _>(1)),
        job_title: r.get::<String, _>(2),
        company: r.get::<String, _>(3),
        status,
        sender_email: r.get::<Option<String>, _>(5),
        row_number: u32::try_from(r.get::<i64, _>(6)).unwrap_or_default(),
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.contains(":memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

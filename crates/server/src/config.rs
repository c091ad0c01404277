use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server_bind: String,
    pub database_url: String,
    pub server_public_url: Option<String>,
    pub google_client_id: String,
    pub google_client_secret: String,
    pub google_redirect_uri: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub classifier_provider: Option<String>,
    pub fetch_batch_size: u32,
    pub fetch_lookback_days: i64,
    pub sheet_write_delay_ms: u64,
    pub jwt_secret: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8000".into(),
            database_url: "sqlite://./data/jobtracker.db".into(),
            server_public_url: None,
            google_client_id: String::new(),
            google_client_secret: String::new(),
            google_redirect_uri: None,
            openai_api_key: None,
            openai_base_url: None,
            classifier_provider: None,
            fetch_batch_size: 10,
            fetch_lookback_days: 30,
            sheet_write_delay_ms: 1000,
            jwt_secret: None,
        }
    }
}

impl Settings {
    /// Explicit provider wins; otherwise OpenAI when a key is configured.
    pub fn classifier_provider(&self) -> &str {
        match (&self.classifier_provider, &self.openai_api_key) {
            (Some(provider), _) => provider.as_str(),
            (None, Some(_)) => "openai",
            (None, None) => "heuristic",
        }
    }

    pub fn redirect_uri(&self) -> String {
        if let Some(uri) = &self.google_redirect_uri {
            return uri.clone();
        }
        let base = self
            .server_public_url
            .clone()
            .unwrap_or_else(|| format!("http://{}", self.server_bind));
        format!("{}/auth/google/callback", base.trim_end_matches('/'))
    }

    pub fn sheet_write_delay(&self) -> Duration {
        Duration::from_millis(self.sheet_write_delay_ms)
    }
}

pub fn load_settings() -> Settings {
    let file = fs::read_to_string("server.toml").ok();
    load_settings_from(file.as_deref(), |key| std::env::var(key).ok())
}

/// Defaults, then `server.toml`, then the environment. `APP__*` names beat the plain ones.
pub fn load_settings_from(
    file: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Settings {
    let mut settings = Settings::default();

    if let Some(raw) = file {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, toml::Value>>(raw) {
            let get = |key: &str| file_cfg.get(key).map(toml_to_string);
            if let Some(v) = get("bind_addr") {
                settings.server_bind = v;
            }
            if let Some(v) = get("database_url") {
                settings.database_url = v;
            }
            if let Some(v) = get("server_public_url") {
                settings.server_public_url = Some(v);
            }
            if let Some(v) = get("google_api_redirect_uri") {
                settings.google_redirect_uri = Some(v);
            }
            if let Some(v) = get("openai_base_url") {
                settings.openai_base_url = Some(v);
            }
            if let Some(v) = get("classifier_provider") {
                settings.classifier_provider = Some(v);
            }
            if let Some(v) = get("fetch_batch_size").and_then(|v| v.parse::<u32>().ok()) {
                settings.fetch_batch_size = v.max(1);
            }
            if let Some(v) = get("fetch_lookback_days").and_then(|v| v.parse().ok()) {
                settings.fetch_lookback_days = v;
            }
            if let Some(v) = get("sheet_write_delay_ms").and_then(|v| v.parse().ok()) {
                settings.sheet_write_delay_ms = v;
            }
        }
    }

    let var = |plain: &str, prefixed: &str| env(prefixed).or_else(|| env(plain));

    if let Some(v) = var("SERVER_BIND", "APP__BIND_ADDR") {
        settings.server_bind = v;
    }
    if let Some(v) = var("DATABASE_URL", "APP__DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = var("SERVER_PUBLIC_URL", "APP__SERVER_PUBLIC_URL") {
        settings.server_public_url = Some(v);
    }

    if let Some(v) = var("GOOGLE_API_CLIENT_ID", "APP__GOOGLE_API_CLIENT_ID") {
        settings.google_client_id = v;
    }
    if let Some(v) = var("GOOGLE_API_CLIENT_SECRET", "APP__GOOGLE_API_CLIENT_SECRET") {
        settings.google_client_secret = v;
    }
    if let Some(v) = var("GOOGLE_API_REDIRECT_URI", "APP__GOOGLE_API_REDIRECT_URI") {
        settings.google_redirect_uri = Some(v);
    }

    if let Some(v) = var("OPENAI_API_KEY", "APP__OPENAI_API_KEY").filter(|v| !v.is_empty()) {
        settings.openai_api_key = Some(v);
    }
    if let Some(v) = var("OPENAI_BASE_URL", "APP__OPENAI_BASE_URL") {
        settings.openai_base_url = Some(v);
    }
    if let Some(v) = var("CLASSIFIER_PROVIDER", "APP__CLASSIFIER_PROVIDER") {
        settings.classifier_provider = Some(v);
    }

    if let Some(v) = var("FETCH_BATCH_SIZE", "APP__FETCH_BATCH_SIZE") {
        if let Ok(parsed) = v.parse::<u32>() {
            settings.fetch_batch_size = parsed.max(1);
        }
    }
    if let Some(v) = var("FETCH_LOOKBACK_DAYS", "APP__FETCH_LOOKBACK_DAYS") {
        if let Ok(parsed) = v.parse::<i64>() {
            settings.fetch_lookback_days = parsed;
        }
    }
    if let Some(v) = var("SHEET_WRITE_DELAY_MS", "APP__SHEET_WRITE_DELAY_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.sheet_write_delay_ms = parsed;
        }
    }

    if let Some(v) = var("JWT_SECRET", "APP__JWT_SECRET").filter(|v| !v.is_empty()) {
        settings.jwt_secret = Some(v);
    }

    settings
}

fn toml_to_string(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn prepare_database_url(raw_database_url: &str) -> anyhow::Result<String> {
    let database_url = normalize_database_url(raw_database_url);
    ensure_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        return format!("sqlite://{}", path.replace('\\', "/"));
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

fn ensure_parent_dir_exists(database_url: &str) -> anyhow::Result<()> {
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
#[path = "tests/config_tests.rs"]
mod tests;

use std::{fs, io, path::Path};

use anyhow::{bail, Context};
use client_core::{ConflictPolicy, DEFAULT_PAGE_COUNT};
use serde::Deserialize;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_url: String,
    pub page_count: u32,
    pub conflict_policy: ConflictPolicy,
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:9700".into(),
            page_count: DEFAULT_PAGE_COUNT,
            conflict_policy: ConflictPolicy::Overwrite,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    server_url: Option<String>,
    page_count: Option<u32>,
    conflict_policy: Option<ConflictPolicy>,
    request_timeout_secs: Option<u64>,
}

/// Defaults, then the optional config file, then environment variables.
pub fn load_settings(config_path: &Path) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    match fs::read_to_string(config_path) {
        Ok(raw) => apply_file(&mut settings, &raw)
            .with_context(|| format!("invalid config file '{}'", config_path.display()))?,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err).with_context(|| {
                format!("failed to read config file '{}'", config_path.display())
            })
        }
    }

    apply_env(&mut settings, |key| std::env::var(key).ok())?;
    Ok(settings)
}

fn apply_file(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let file_cfg: FileSettings = toml::from_str(raw)?;
    if let Some(v) = file_cfg.server_url {
        settings.server_url = v;
    }
    if let Some(v) = file_cfg.page_count {
        settings.page_count = v;
    }
    if let Some(v) = file_cfg.conflict_policy {
        settings.conflict_policy = v;
    }
    if let Some(v) = file_cfg.request_timeout_secs {
        settings.request_timeout_secs = v;
    }
    Ok(())
}

fn apply_env(
    settings: &mut Settings,
    var: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    if let Some(v) = var("ADMIN_SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = var("APP__SERVER_URL") {
        settings.server_url = v;
    }

    if let Some(v) = var("APP__PAGE_COUNT") {
        settings.page_count = v
            .parse()
            .with_context(|| format!("APP__PAGE_COUNT must be a positive integer, got '{v}'"))?;
    }

    if let Some(v) = var("APP__CONFLICT_POLICY") {
        settings.conflict_policy = v.parse().map_err(anyhow::Error::msg)?;
    }

    if let Some(v) = var("APP__REQUEST_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.request_timeout_secs = parsed;
        }
    }

    Ok(())
}

pub fn validate(settings: &Settings) -> anyhow::Result<()> {
    let url = Url::parse(settings.server_url.trim())
        .with_context(|| format!("invalid server url '{}'", settings.server_url))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("server url must use http or https: '{}'", settings.server_url);
    }
    if settings.page_count == 0 {
        bail!("page_count must be greater than zero");
    }
    if settings.request_timeout_secs == 0 {
        bail!("request_timeout_secs must be greater than zero");
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;

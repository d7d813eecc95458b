use std::{fs, path::Path, time::Duration};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use url::Url;

pub const SETTINGS_FILE: &str = "seefood.toml";

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub classifier_url: Url,
    pub api_url: Url,
    pub camera_start_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            classifier_url: Url::parse("http://localhost:5000").expect("static url"),
            api_url: Url::parse("http://localhost:5000/api").expect("static url"),
            camera_start_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    classifier_url: Option<String>,
    api_url: Option<String>,
    camera_start_timeout_ms: Option<u64>,
    request_timeout_secs: Option<u64>,
}

/// Loads `seefood.toml` from the working directory (if present), then applies
/// `SEEFOOD_*` environment overrides.
pub fn load_settings() -> Result<ClientSettings> {
    load_settings_from(Path::new(SETTINGS_FILE), |key| std::env::var(key).ok())
}

pub fn load_settings_from(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ClientSettings> {
    let mut settings = ClientSettings::default();

    let file_cfg = match fs::read_to_string(path) {
        Ok(raw) => toml::from_str::<FileSettings>(&raw)
            .with_context(|| format!("invalid settings file '{}'", path.display()))?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => FileSettings::default(),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read '{}'", path.display()))
        }
    };

    if let Some(v) = file_cfg.classifier_url {
        settings.classifier_url = parse_base_url(&v, "classifier_url")?;
    }
    if let Some(v) = file_cfg.api_url {
        settings.api_url = parse_base_url(&v, "api_url")?;
    }
    if let Some(ms) = file_cfg.camera_start_timeout_ms {
        settings.camera_start_timeout = Duration::from_millis(ms);
    }
    if let Some(secs) = file_cfg.request_timeout_secs {
        settings.request_timeout = Duration::from_secs(secs);
    }

    if let Some(v) = env("SEEFOOD_CLASSIFIER_URL") {
        settings.classifier_url = parse_base_url(&v, "SEEFOOD_CLASSIFIER_URL")?;
    }
    if let Some(v) = env("SEEFOOD_API_URL") {
        settings.api_url = parse_base_url(&v, "SEEFOOD_API_URL")?;
    }
    if let Some(v) = env("SEEFOOD_CAMERA_TIMEOUT_MS") {
        let ms = v
            .trim()
            .parse::<u64>()
            .with_context(|| format!("SEEFOOD_CAMERA_TIMEOUT_MS is not a number: '{v}'"))?;
        settings.camera_start_timeout = Duration::from_millis(ms);
    }
    if let Some(v) = env("SEEFOOD_REQUEST_TIMEOUT_SECS") {
        let secs = v
            .trim()
            .parse::<u64>()
            .with_context(|| format!("SEEFOOD_REQUEST_TIMEOUT_SECS is not a number: '{v}'"))?;
        settings.request_timeout = Duration::from_secs(secs);
    }

    if settings.camera_start_timeout.is_zero() {
        bail!("camera start timeout must be greater than zero");
    }
    if settings.request_timeout.is_zero() {
        bail!("request timeout must be greater than zero");
    }

    Ok(settings)
}

fn parse_base_url(raw: &str, key: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).with_context(|| format!("{key} is not a valid url: '{raw}'"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("{key} must use http or https, got '{}'", url.scheme());
    }
    Ok(url)
}

/// Base url as a string without a trailing slash, ready for `format!("{base}/route")`.
pub fn base_url(url: &Url) -> String {
    url.as_str().trim_end_matches('/').to_string()
}

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MESSAGE_LIMIT: u32 = 20;

/// Fixed-interval polling policy for runs.
#[derive(Debug, Clone, PartialEq)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
    pub cancel_on_timeout: bool,
}

impl PollSettings {
    /// Builds clamped settings: interval 0.2–5s, timeout 5–600s.
    pub fn from_seconds(interval_s: f64, timeout_s: f64, cancel_on_timeout: bool) -> Self {
        Self {
            interval: Duration::from_secs_f64(clamp_or(interval_s, 1.0, 0.2, 5.0)),
            timeout: Duration::from_secs_f64(clamp_or(timeout_s, 60.0, 5.0, 600.0)),
            cancel_on_timeout,
        }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::from_seconds(1.0, 60.0, true)
    }
}

fn clamp_or(value: f64, default: f64, min: f64, max: f64) -> f64 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        default
    }
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub api_key: String,
    pub api_base: String,
    pub assistant_id: String,
    pub poll: PollSettings,
    pub message_limit: u32,
    pub citations: bool,
}

/// Values given explicitly on the command line; they win over everything.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub api_key: Option<String>,
    pub api_base: Option<String>,
    pub assistant_id: Option<String>,
    pub poll_interval_s: Option<f64>,
    pub poll_timeout_s: Option<f64>,
    pub cancel_on_timeout: Option<bool>,
    pub citations: Option<bool>,
    pub secrets_path: Option<PathBuf>,
}

/// Static credential file:
/// `OPENAI_API_KEY = "..."` and `ASSISTANT_ID = "..."`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecretsFile {
    #[serde(rename = "OPENAI_API_KEY")]
    pub openai_api_key: Option<String>,
    #[serde(rename = "ASSISTANT_ID")]
    pub assistant_id: Option<String>,
    #[serde(rename = "OPENAI_API_BASE")]
    pub openai_api_base: Option<String>,
}

impl SecretsFile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed reading secrets file {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("failed parsing secrets file {}", path.display()))
    }
}

impl RelayConfig {
    /// Resolves configuration: flags, then environment, then the secrets
    /// file, then defaults.
    pub fn resolve(overrides: &ConfigOverrides) -> Result<Self> {
        Self::resolve_with(overrides, non_empty_env)
    }

    pub fn resolve_with(
        overrides: &ConfigOverrides,
        lookup_env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let secrets = match overrides.secrets_path.as_deref() {
            Some(path) => SecretsFile::load(path)?,
            None => SecretsFile::default(),
        };

        let api_key = first_non_empty([
            overrides.api_key.clone(),
            lookup_env("OPENAI_API_KEY"),
            secrets.openai_api_key.clone(),
        ]);
        let Some(api_key) = api_key else {
            bail!("OPENAI_API_KEY not set (flag, environment, or secrets file)");
        };
        let Some(assistant_id) = first_non_empty([
            overrides.assistant_id.clone(),
            lookup_env("ASSISTANT_ID"),
            secrets.assistant_id.clone(),
        ]) else {
            bail!("ASSISTANT_ID not set (flag, environment, or secrets file)");
        };
        let api_base = first_non_empty([
            overrides.api_base.clone(),
            lookup_env("OPENAI_API_BASE"),
            secrets.openai_api_base.clone(),
        ])
        .map(|value| value.trim_end_matches('/').to_string())
        .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        let interval_s = overrides
            .poll_interval_s
            .or_else(|| lookup_env("RELAY_POLL_INTERVAL").and_then(|raw| raw.parse().ok()))
            .unwrap_or(1.0);
        let timeout_s = overrides
            .poll_timeout_s
            .or_else(|| lookup_env("RELAY_POLL_TIMEOUT").and_then(|raw| raw.parse().ok()))
            .unwrap_or(60.0);
        let cancel_on_timeout = overrides
            .cancel_on_timeout
            .or_else(|| lookup_env("RELAY_CANCEL_ON_TIMEOUT").and_then(|raw| parse_bool(&raw)))
            .unwrap_or(true);
        let citations = overrides
            .citations
            .or_else(|| lookup_env("RELAY_CITATIONS").and_then(|raw| parse_bool(&raw)))
            .unwrap_or(false);

        Ok(Self {
            api_key,
            api_base,
            assistant_id,
            poll: PollSettings::from_seconds(interval_s, timeout_s, cancel_on_timeout),
            message_limit: DEFAULT_MESSAGE_LIMIT,
            citations,
        })
    }
}

fn first_non_empty<const N: usize>(candidates: [Option<String>; N]) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

pub(crate) fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_bool(raw: &str) -> Option<bool> {
    let lowered = raw.trim().to_ascii_lowercase();
    if matches!(lowered.as_str(), "1" | "true" | "yes" | "on") {
        Some(true)
    } else if matches!(lowered.as_str(), "0" | "false" | "no" | "off") {
        Some(false)
    } else {
        None
    }
}

//! Config loading for the binary: optional TOML file, then environment overrides.

use std::path::Path;

use anyhow::Context;
use jabber_core::app::PipelineConfig;

/// Environment variables that override the file.
const ENV_OVERRIDES: &[&str] = &[
    "MIN_ACTION_DELAY_MS",
    "MAX_ACTION_DELAY_MS",
    "RATE_LIMIT_AMOUNT",
    "RATE_LIMIT_INTERVAL_MS",
    "MAX_CONVERSATION_TOKENS",
    "MIN_TEMPERATURE",
    "MAX_TEMPERATURE",
    "BLOB_TTL_MS",
];

pub async fn load(path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    let mut cfg = match path {
        Some(path) => {
            let contents = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("read config {}", path.display()))?;
            parse(&contents).with_context(|| format!("parse config {}", path.display()))?
        }
        None => PipelineConfig::default(),
    };

    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok())?;
    cfg.validate()?;
    Ok(cfg)
}

pub fn parse(contents: &str) -> anyhow::Result<PipelineConfig> {
    Ok(toml::from_str(contents)?)
}

/// Blank values are ignored. A value that does not parse is an error, not a silent default.
pub fn apply_env_overrides(
    cfg: &mut PipelineConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    for &key in ENV_OVERRIDES {
        let Some(raw) = lookup(key) else {
            continue;
        };
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        match key {
            "MIN_ACTION_DELAY_MS" => cfg.min_action_delay_ms = parse_var(key, raw)?,
            "MAX_ACTION_DELAY_MS" => cfg.max_action_delay_ms = parse_var(key, raw)?,
            "RATE_LIMIT_AMOUNT" => cfg.rate_limit_amount = parse_var(key, raw)?,
            "RATE_LIMIT_INTERVAL_MS" => cfg.rate_limit_interval_ms = parse_var(key, raw)?,
            "MAX_CONVERSATION_TOKENS" => cfg.max_conversation_tokens = parse_var(key, raw)?,
            "MIN_TEMPERATURE" => cfg.min_temperature = parse_var(key, raw)?,
            "MAX_TEMPERATURE" => cfg.max_temperature = parse_var(key, raw)?,
            "BLOB_TTL_MS" => cfg.blob_ttl_ms = parse_var(key, raw)?,
            _ => {}
        }
        tracing::debug!(key, value = raw, "config override from environment");
    }
    Ok(())
}

fn parse_var<T>(key: &str, raw: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| anyhow::anyhow!("invalid {key}={raw:?}: {e}"))
}

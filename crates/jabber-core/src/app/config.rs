//! Pipeline configuration.
//!
//! Every field has a default, so an empty TOML table is a valid config.
//! Loading files and environment variables is the binary's job; the core only
//! defines the shape and validates it.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::queue::DelayWindow;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("min_action_delay_ms ({min}) must not exceed max_action_delay_ms ({max})")]
    DelayWindow { min: u64, max: u64 },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("reserved_response_tokens ({reserved}) must be below max_conversation_tokens ({max})")]
    ReservedTokens { reserved: u32, max: u32 },

    #[error("temperature window must satisfy 0 <= min ({min}) <= max ({max}) <= 2")]
    Temperature { min: f64, max: f64 },

    #[error("token_cost_per_char must be a positive finite number, got {0}")]
    TokenCost(f64),

    #[error(
        "blob_ttl_ms ({ttl}) must be 0 or at least {min} \
         (max_action_delay_ms + rate_limit_amount * provider_timeout_ms)"
    )]
    BlobTtl { ttl: u64, min: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub min_action_delay_ms: u64,
    pub max_action_delay_ms: u64,

    /// Provider calls allowed per `rate_limit_interval_ms`.
    pub rate_limit_amount: u32,
    pub rate_limit_interval_ms: u64,

    pub max_conversation_tokens: u32,
    /// Room left for the structured reply (one maximal post plus JSON framing).
    pub reserved_response_tokens: u32,
    pub token_cost_per_char: f64,

    pub min_temperature: f64,
    pub max_temperature: f64,

    pub provider_timeout_ms: u64,
    pub integration_timeout_ms: u64,

    /// 0 disables expiry.
    pub blob_ttl_ms: u64,
    pub reaper_interval_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_action_delay_ms: 1_000,
            max_action_delay_ms: 300_000,
            rate_limit_amount: 5,
            rate_limit_interval_ms: 600_000,
            max_conversation_tokens: 67_336,
            reserved_response_tokens: 342,
            token_cost_per_char: 0.6,
            min_temperature: 0.01,
            max_temperature: 0.6,
            provider_timeout_ms: 120_000,
            integration_timeout_ms: 30_000,
            blob_ttl_ms: 900_000,
            reaper_interval_ms: 60_000,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_action_delay_ms > self.max_action_delay_ms {
            return Err(ConfigError::DelayWindow {
                min: self.min_action_delay_ms,
                max: self.max_action_delay_ms,
            });
        }
        for (name, value) in [
            ("rate_limit_amount", u64::from(self.rate_limit_amount)),
            ("rate_limit_interval_ms", self.rate_limit_interval_ms),
            ("provider_timeout_ms", self.provider_timeout_ms),
            ("integration_timeout_ms", self.integration_timeout_ms),
            ("reaper_interval_ms", self.reaper_interval_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero(name));
            }
        }
        if self.reserved_response_tokens >= self.max_conversation_tokens {
            return Err(ConfigError::ReservedTokens {
                reserved: self.reserved_response_tokens,
                max: self.max_conversation_tokens,
            });
        }
        let (min, max) = (self.min_temperature, self.max_temperature);
        if !(0.0..=2.0).contains(&min) || !(0.0..=2.0).contains(&max) || min > max {
            return Err(ConfigError::Temperature { min, max });
        }
        if !self.token_cost_per_char.is_finite() || self.token_cost_per_char <= 0.0 {
            return Err(ConfigError::TokenCost(self.token_cost_per_char));
        }
        // blob は遅延に加えて、lane で先行 job の provider 呼び出しを待つ間も残っている必要がある
        let min_ttl = self.min_blob_ttl_ms();
        if self.blob_ttl_ms != 0 && self.blob_ttl_ms < min_ttl {
            return Err(ConfigError::BlobTtl {
                ttl: self.blob_ttl_ms,
                min: min_ttl,
            });
        }
        Ok(())
    }

    /// Longest a job's blobs may wait: the maximum delay, then one rate window of
    /// provider calls queued ahead of it in the actor's lane.
    pub fn min_blob_ttl_ms(&self) -> u64 {
        u64::from(self.rate_limit_amount)
            .saturating_mul(self.provider_timeout_ms)
            .saturating_add(self.max_action_delay_ms)
    }

    pub fn delay_window(&self) -> DelayWindow {
        DelayWindow::from_millis(self.min_action_delay_ms, self.max_action_delay_ms)
    }

    pub fn rate_limit_interval(&self) -> Duration {
        Duration::from_millis(self.rate_limit_interval_ms)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    pub fn integration_timeout(&self) -> Duration {
        Duration::from_millis(self.integration_timeout_ms)
    }

    pub fn blob_ttl(&self) -> Option<Duration> {
        (self.blob_ttl_ms > 0).then(|| Duration::from_millis(self.blob_ttl_ms))
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_millis(self.reaper_interval_ms)
    }
}

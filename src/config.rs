// src/config.rs
use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

/// Poll loop policy for the external picker session.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay before the first poll, giving the external UI time to render.
    pub initial_delay: Duration,
    /// Interval between polls when the server suggests none.
    pub default_interval: Duration,
    /// Hard cap on poll attempts; bounds total wall-clock wait.
    pub max_attempts: u32,
    /// Extra polls allowed after the picker UI reports closed, because
    /// closing can race with the server recording the selection.
    pub grace_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            default_interval: Duration::from_secs(2),
            max_attempts: 150,
            grace_attempts: 3,
        }
    }
}

/// Payload and timeout policy for upstream calls. These are tuned to
/// observed upstream latency, not protocol requirements.
#[derive(Debug, Clone)]
pub struct LimitsConfig {
    pub max_image_bytes: usize,
    pub interactive_fetch_timeout: Duration,
    pub pipeline_fetch_timeout: Duration,
    pub vision_timeout: Duration,
    pub generation_timeout: Duration,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_image_bytes: 20 * 1024 * 1024,
            interactive_fetch_timeout: Duration::from_secs(30),
            pipeline_fetch_timeout: Duration::from_secs(120),
            vision_timeout: Duration::from_secs(90),
            generation_timeout: Duration::from_secs(270),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub redis_url: String,
    pub google_api_key: String,
    pub picker_base_url: String,
    pub vision_base_url: String,
    pub generation_base_url: String,
    pub generation_model: String,
    pub poll: PollConfig,
    pub limits: LimitsConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let poll = PollConfig {
            initial_delay: duration_secs("RESTYLE_POLL_INITIAL_DELAY_SECS", 2)?,
            default_interval: duration_secs("RESTYLE_POLL_INTERVAL_SECS", 2)?,
            max_attempts: parsed("RESTYLE_POLL_MAX_ATTEMPTS", 150)?,
            grace_attempts: parsed("RESTYLE_POLL_GRACE_ATTEMPTS", 3)?,
        };

        let limits = LimitsConfig {
            max_image_bytes: parsed("RESTYLE_MAX_IMAGE_BYTES", 20 * 1024 * 1024)?,
            interactive_fetch_timeout: duration_secs("RESTYLE_INTERACTIVE_FETCH_TIMEOUT_SECS", 30)?,
            pipeline_fetch_timeout: duration_secs("RESTYLE_PIPELINE_FETCH_TIMEOUT_SECS", 120)?,
            vision_timeout: duration_secs("RESTYLE_VISION_TIMEOUT_SECS", 90)?,
            generation_timeout: duration_secs("RESTYLE_GENERATION_TIMEOUT_SECS", 270)?,
        };

        Ok(Self {
            bind_addr: env_or("RESTYLE_BIND_ADDR", "0.0.0.0:8080"),
            redis_url: env_or("REDIS_URL", "redis://127.0.0.1:6379"),
            google_api_key: env::var("GOOGLE_API_KEY")
                .context("GOOGLE_API_KEY must be set")?,
            picker_base_url: env_or(
                "RESTYLE_PICKER_BASE_URL",
                "https://photospicker.googleapis.com/v1",
            ),
            vision_base_url: env_or(
                "RESTYLE_VISION_BASE_URL",
                "https://vision.googleapis.com/v1",
            ),
            generation_base_url: env_or(
                "RESTYLE_GENERATION_BASE_URL",
                "https://generativelanguage.googleapis.com/v1beta",
            ),
            generation_model: env_or("RESTYLE_GENERATION_MODEL", "gemini-2.5-flash-image"),
            poll,
            limits,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parsed<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw.parse().with_context(|| format!("invalid {key}: {raw}")),
        Err(_) => Ok(default),
    }
}

fn duration_secs(key: &str, default: u64) -> Result<Duration> {
    Ok(Duration::from_secs(parsed(key, default)?))
}

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::drift::DriftPolicy;
use crate::gen_client::{RetryPolicy, TokenBucket};

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    pub store: StoreBackend,
    pub image_service_url: String,
    pub image_service_api_key: Option<String>,
    pub image_model_id: String,
    pub anthropic_api_key: String,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreBackend {
    Memory,
    Fs { dir: PathBuf },
    Postgres { database_url: String },
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let store = match lookup("STORE_BACKEND").as_deref().unwrap_or("memory") {
            "memory" => StoreBackend::Memory,
            "fs" => StoreBackend::Fs {
                dir: PathBuf::from(lookup("STORE_DIR").unwrap_or_else(|| "./data".to_string())),
            },
            "postgres" => StoreBackend::Postgres {
                database_url: require(&lookup, "DATABASE_URL")?,
            },
            other => bail!("STORE_BACKEND must be one of memory, fs, postgres (got '{other}')"),
        };

        let config = Config {
            port: parse_or(&lookup, "PORT", 8080)?,
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            store,
            image_service_url: require(&lookup, "IMAGE_SERVICE_URL")?,
            image_service_api_key: lookup("IMAGE_SERVICE_API_KEY"),
            image_model_id: lookup("IMAGE_MODEL_ID").unwrap_or_else(|| "sdxl-1.0".to_string()),
            anthropic_api_key: require(&lookup, "ANTHROPIC_API_KEY")?,
            engine: EngineConfig::from_lookup(&lookup)?,
        };
        config.engine.validate()?;
        Ok(config)
    }
}

fn require(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    lookup(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Engine policy
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct DriftConfig {
    pub ssim_whole_min: f64,
    pub ssim_panel_min: f64,
    pub phash_max_distance: u32,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LimiterConfig {
    pub capacity: u32,
    pub refill_per_sec: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConcurrencyConfig {
    pub batch_size: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionConfig {
    /// Strength multiplier applied on each lock escalation.
    pub strength_decay: f64,
    /// Strength never drops below this.
    pub min_strength: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModifyConfig {
    pub default_strength: f64,
}

/// Policy object passed explicitly into every engine entry point.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub drift: DriftConfig,
    pub retry: RetryPolicy,
    pub limiter: LimiterConfig,
    pub concurrency: ConcurrencyConfig,
    pub correction: CorrectionConfig,
    pub modify: ModifyConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            drift: DriftConfig {
                ssim_whole_min: 0.92,
                ssim_panel_min: 0.95,
                phash_max_distance: 5,
                max_attempts: 3,
            },
            retry: RetryPolicy::default(),
            limiter: LimiterConfig {
                capacity: 4,
                refill_per_sec: 1.0,
            },
            concurrency: ConcurrencyConfig { batch_size: 2 },
            correction: CorrectionConfig {
                strength_decay: 0.7,
                min_strength: 0.15,
            },
            modify: ModifyConfig {
                default_strength: 0.35,
            },
        }
    }
}

impl EngineConfig {
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let d = Self::default();
        let mut retry = d.retry.clone();
        retry.service.max_attempts = parse_or(lookup, "RETRY_MAX_ATTEMPTS", retry.service.max_attempts)?;
        retry.rate_limit.max_attempts =
            parse_or(lookup, "RATE_LIMIT_MAX_ATTEMPTS", retry.rate_limit.max_attempts)?;
        let cap_secs = parse_or(lookup, "RETRY_CAP_SECS", retry.service.cap.as_secs())?;
        retry.service.cap = Duration::from_secs(cap_secs);
        retry.rate_limit.cap = Duration::from_secs(cap_secs);

        Ok(Self {
            drift: DriftConfig {
                ssim_whole_min: parse_or(lookup, "DRIFT_SSIM_WHOLE_MIN", d.drift.ssim_whole_min)?,
                ssim_panel_min: parse_or(lookup, "DRIFT_SSIM_PANEL_MIN", d.drift.ssim_panel_min)?,
                phash_max_distance: parse_or(lookup, "DRIFT_PHASH_MAX", d.drift.phash_max_distance)?,
                max_attempts: parse_or(lookup, "DRIFT_MAX_ATTEMPTS", d.drift.max_attempts)?,
            },
            retry,
            limiter: LimiterConfig {
                capacity: parse_or(lookup, "LIMITER_CAPACITY", d.limiter.capacity)?,
                refill_per_sec: parse_or(lookup, "LIMITER_REFILL_PER_SEC", d.limiter.refill_per_sec)?,
            },
            concurrency: ConcurrencyConfig {
                batch_size: parse_or(lookup, "GEN_BATCH_SIZE", d.concurrency.batch_size)?,
            },
            correction: d.correction,
            modify: d.modify,
        })
    }

    pub fn validate(&self) -> Result<()> {
        let unit = |name: &str, v: f64| -> Result<()> {
            if !(0.0..=1.0).contains(&v) {
                bail!("{name} must lie in [0, 1] (got {v})");
            }
            Ok(())
        };
        unit("drift.ssim_whole_min", self.drift.ssim_whole_min)?;
        unit("drift.ssim_panel_min", self.drift.ssim_panel_min)?;
        unit("correction.strength_decay", self.correction.strength_decay)?;
        unit("correction.min_strength", self.correction.min_strength)?;
        unit("modify.default_strength", self.modify.default_strength)?;
        if self.drift.phash_max_distance > 64 {
            bail!("drift.phash_max_distance cannot exceed 64 bits");
        }
        if self.drift.max_attempts == 0 {
            bail!("drift.max_attempts must be at least 1");
        }
        if self.retry.service.max_attempts == 0 || self.retry.rate_limit.max_attempts == 0 {
            bail!("retry attempts must be at least 1");
        }
        if self.concurrency.batch_size == 0 {
            bail!("concurrency.batch_size must be at least 1");
        }
        if self.limiter.capacity == 0 || self.limiter.refill_per_sec <= 0.0 {
            bail!("limiter needs a positive capacity and refill rate");
        }
        Ok(())
    }

    pub fn drift_policy(&self) -> DriftPolicy {
        DriftPolicy {
            ssim_whole_min: self.drift.ssim_whole_min,
            ssim_panel_min: self.drift.ssim_panel_min,
            phash_max_distance: self.drift.phash_max_distance,
            max_attempts: self.drift.max_attempts,
            strength_decay: self.correction.strength_decay,
        }
    }

    /// A fresh limiter for one orchestrator run.
    pub fn new_limiter(&self) -> TokenBucket {
        TokenBucket::new(self.limiter.capacity, self.limiter.refill_per_sec)
    }
}

use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;

use crate::chunker::DEFAULT_CHUNK_SIZE;
use crate::pipeline::MAX_CONCURRENCY;
use crate::{embed, llm, search};

/// Tunables for a run. Secrets are not part of this; see [`require_env`].
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub chunk_size: usize,
    pub concurrency: usize,
    pub researcher_timeout_secs: u64,
    pub http_timeout_secs: u64,
    pub search_interval_ms: u64,
    pub llm_interval_ms: u64,
    pub min_year: i32,
    pub max_year: i32,
    pub llm_model: String,
    pub llm_base_url: String,
    pub embedding_model: String,
    pub embedding_base_url: String,
    pub embedding_batch_size: usize,
    pub embedding_max_retries: usize,
    pub search_base_url: String,
    pub taxonomy_path: PathBuf,
    pub sqlite_path: PathBuf,
    pub out_dir: PathBuf,
}

impl Settings {
    /// Defaults, then `faculty_scout.toml` if present, then `SCOUT_*` variables.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let settings: Settings = defaults()?
            .add_source(File::with_name("faculty_scout").required(false))
            .add_source(Environment::with_prefix("SCOUT").try_parsing(true))
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        ensure!(self.chunk_size > 0, "chunk_size must be greater than zero");
        ensure!(
            (1..=MAX_CONCURRENCY).contains(&self.concurrency),
            "concurrency must be between 1 and {}",
            MAX_CONCURRENCY
        );
        ensure!(
            self.min_year <= self.max_year,
            "min_year {} is after max_year {}",
            self.min_year,
            self.max_year
        );
        Ok(())
    }

    pub fn year_window(&self) -> RangeInclusive<i32> {
        self.min_year..=self.max_year
    }

    pub fn researcher_timeout(&self) -> Duration {
        Duration::from_secs(self.researcher_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn search_interval(&self) -> Duration {
        Duration::from_millis(self.search_interval_ms)
    }

    pub fn llm_interval(&self) -> Duration {
        Duration::from_millis(self.llm_interval_ms)
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>> {
    let builder = Config::builder()
        .set_default("chunk_size", DEFAULT_CHUNK_SIZE as i64)?
        .set_default("concurrency", 4_i64)?
        .set_default("researcher_timeout_secs", 120_i64)?
        .set_default("http_timeout_secs", 60_i64)?
        .set_default("search_interval_ms", 1000_i64)?
        .set_default("llm_interval_ms", 500_i64)?
        .set_default("min_year", 2023_i64)?
        .set_default("max_year", 2025_i64)?
        .set_default("llm_model", llm::DEFAULT_MODEL)?
        .set_default("llm_base_url", llm::DEFAULT_BASE_URL)?
        .set_default("embedding_model", embed::DEFAULT_MODEL)?
        .set_default("embedding_base_url", embed::DEFAULT_BASE_URL)?
        .set_default("embedding_batch_size", 64_i64)?
        .set_default("embedding_max_retries", 3_i64)?
        .set_default("search_base_url", search::DEFAULT_BASE_URL)?
        .set_default("taxonomy_path", "data/taxonomy.json")?
        .set_default("sqlite_path", "data/faculty_scout.sqlite")?
        .set_default("out_dir", ".")?;
    Ok(builder)
}

pub fn require_env(key: &str) -> Result<String> {
    let value = std::env::var(key)
        .with_context(|| format!("Required environment variable '{key}' is not set"))?;
    ensure!(!value.trim().is_empty(), "Environment variable '{key}' is empty");
    Ok(value)
}

use std::time::Duration;

use anyhow::{anyhow, Context};
use ::config::{Config as CConfig, File, FileFormat};

pub const CONFIG_FILE: &str = "config.toml";

// Every key is optional. When no path is given we look for `config.toml` in the working
// directory and fall back to the hardcoded defaults below if it isn't there, so running either
// binary without any config on disk just works. A path the user asked for explicitly must
// exist though: silently running with defaults after a typo is worse than failing.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    pub stream: StreamConfig,
    pub ingest: IngestConfig,
}

impl Config {
    pub fn new(path: Option<&str>) -> anyhow::Result<Self> {
        let required = path.is_some();
        let path = path.unwrap_or(CONFIG_FILE);
        let config: Self = CConfig::builder()
            .add_source(File::new(path, FileFormat::Toml).required(required))
            .build()
            .with_context(|| format!("Error reading {}", path))?
            .try_deserialize()
            .with_context(|| format!("Error parsing {}", path))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.stream.clients == 0 {
            return Err(anyhow!("stream.clients must be greater than 0"));
        }
        if self.ingest.batch_size == 0 {
            return Err(anyhow!("ingest.batch_size must be greater than 0"));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            stream: StreamConfig::default(),
            ingest: IngestConfig::default(),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub url: String,
    pub clients: usize,
    pub stagger_ms: u64,
    pub run_secs: u64,
}

impl StreamConfig {
    pub fn stagger(&self) -> Duration {
        Duration::from_millis(self.stagger_ms)
    }

    pub fn run_duration(&self) -> Duration {
        Duration::from_secs(self.run_secs)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8085/api/trades/prices/stream".to_string(),
            clients: 10,
            stagger_ms: 100,
            run_secs: 60,
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub es_url: String,
    pub index: String,
    pub batch_size: u64,
    pub default_count: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            es_url: "http://localhost:9200".to_string(),
            index: "trades".to_string(),
            batch_size: 1000,
            default_count: 10_000,
        }
    }
}

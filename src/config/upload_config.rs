use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_CONFIG_NAME, DEFAULT_MAX_CONCURRENT_UPLOADS, MAX_PART_SIZE,
    MAX_UPLOAD_ATTEMPTS, MIN_PART_SIZE, RETRY_BASE_DELAY_MS, RETRY_MAX_DELAY_SECS,
    UPLOAD_PROGRESS_INTERVAL_SECS,
};
use crate::upload::{PipelineConfig, RetryPolicy};

const MIB: usize = 1024 * 1024;

/// Upload tuning, loaded from YAML. Missing fields take their defaults.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct UploadConfig {
    pub part_size_mb: usize,
    pub max_concurrent_uploads: usize,
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_secs: u64,
    pub timeout_secs: Option<u64>,
    pub channel_capacity: usize,
    pub progress_interval_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            part_size_mb: MIN_PART_SIZE / MIB,
            max_concurrent_uploads: DEFAULT_MAX_CONCURRENT_UPLOADS.min(num_cpus::get()).max(1),
            max_attempts: MAX_UPLOAD_ATTEMPTS,
            retry_base_delay_ms: RETRY_BASE_DELAY_MS,
            retry_max_delay_secs: RETRY_MAX_DELAY_SECS,
            timeout_secs: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            progress_interval_secs: UPLOAD_PROGRESS_INTERVAL_SECS,
        }
    }
}

impl UploadConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        let config: UploadConfig =
            serde_yaml::from_str(&content).context("Failed to parse YAML config")?;

        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save_to_yaml_file(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml).context(format!("Failed to write config to {}", path.display()))?;

        info!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Load `path`, or `s3-archiver.yaml` in the working directory when no
    /// path is given, falling back to the defaults. The result is validated.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_NAME);
                if default_path.exists() {
                    Self::from_yaml_file(default_path)?
                } else {
                    debug!("No config file found, using defaults");
                    Self::default()
                }
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Part size in bytes
    pub fn part_size(&self) -> usize {
        self.part_size_mb.saturating_mul(MIB)
    }

    pub fn validate(&self) -> Result<()> {
        let part_size = self.part_size() as u64;
        if part_size < MIN_PART_SIZE as u64 || part_size > MAX_PART_SIZE {
            bail!(
                "part_size_mb must be between {} and {}, got {}",
                MIN_PART_SIZE / MIB,
                MAX_PART_SIZE / MIB as u64,
                self.part_size_mb
            );
        }
        if self.max_concurrent_uploads == 0 {
            bail!("max_concurrent_uploads must be at least 1");
        }
        if self.max_attempts == 0 {
            bail!("max_attempts must be at least 1");
        }
        if self.channel_capacity == 0 {
            bail!("channel_capacity must be at least 1");
        }
        if self.progress_interval_secs == 0 {
            bail!("progress_interval_secs must be at least 1");
        }
        if self.timeout_secs == Some(0) {
            bail!("timeout_secs must be at least 1 when set");
        }
        if Duration::from_millis(self.retry_base_delay_ms)
            > Duration::from_secs(self.retry_max_delay_secs)
        {
            bail!("retry_base_delay_ms must not exceed retry_max_delay_secs");
        }
        Ok(())
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_secs(self.progress_interval_secs)
    }

    pub fn to_pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            part_size: self.part_size(),
            max_concurrent_uploads: self.max_concurrent_uploads,
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                base_delay: Duration::from_millis(self.retry_base_delay_ms),
                max_delay: Duration::from_secs(self.retry_max_delay_secs),
                jitter: true,
            },
            timeout: self.timeout_secs.map(Duration::from_secs),
            channel_capacity: self.channel_capacity,
        }
    }
}

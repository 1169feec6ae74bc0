use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::retry::RetryConfig;
use crate::workflow::WorkflowConfig;
use crate::{zlog_debug, Error, Result};

/// On-disk configuration, stored as `~/.tddflow/tddflow.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    pub fn tddflow_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".tddflow"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::tddflow_dir()?.join("tddflow.toml"))
    }

    pub fn pipeline_state_path() -> Result<PathBuf> {
        Ok(Self::tddflow_dir()?.join("pipelines.json"))
    }

    /// Directory execution reports are written to.
    pub fn reports_dir(&self) -> Result<PathBuf> {
        match &self.workflow.report_dir {
            Some(dir) => Ok(expand_tilde(dir)),
            None => Ok(Self::tddflow_dir()?.join("reports")),
        }
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        zlog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            zlog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        zlog_debug!(
            "Config loaded: max_iterations={}, test_timeout_secs={}, max_retries={}",
            config.workflow.max_iterations,
            config.workflow.test_timeout_secs,
            config.retry.max_retries
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                zlog_debug!("Creating config directory: {}", parent.display());
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        zlog_debug!("Config saved to {}", path.display());
        Ok(())
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

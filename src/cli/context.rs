use std::path::{Path, PathBuf};

use crate::config::ShellConfig;

pub struct CliContext {
    config: ShellConfig,
    config_path: PathBuf,
    metrics_port: u16,
}

impl CliContext {
    pub fn new(config: ShellConfig, config_path: PathBuf, metrics_port: u16) -> Self {
        Self {
            config,
            config_path,
            metrics_port,
        }
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn metrics_port(&self) -> u16 {
        self.metrics_port
    }
}

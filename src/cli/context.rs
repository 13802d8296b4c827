use std::path::Path;

use soulflow::{Config, LoadedConfig};

pub struct CliContext {
    loaded: LoadedConfig,
}

impl CliContext {
    pub fn new(loaded: LoadedConfig) -> Self {
        Self { loaded }
    }

    pub fn config(&self) -> &Config {
        &self.loaded.config
    }

    pub fn config_path(&self) -> &Path {
        &self.loaded.path
    }

    /// Whether the config came from a file rather than defaults.
    pub fn config_from_file(&self) -> bool {
        self.loaded.from_file
    }
}

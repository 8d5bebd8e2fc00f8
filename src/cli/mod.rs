//! Command-line interface

pub mod args;
pub mod commands;

pub use args::{Cli, Commands};

use crate::config::Config;

impl Cli {
    /// Apply global flag/env overrides on top of the loaded config
    pub fn apply_overrides(&self, config: &mut Config) {
        if self.disable_cache {
            config.cache.enabled = false;
        }
        if let Some(ref dir) = self.cache_dir {
            config.cache.dir = Some(dir.clone());
        }
        if let Some(ref url) = self.library {
            config.library.url = url.clone();
        }
    }
}

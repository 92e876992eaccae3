use anyhow::Result;
use clap::ArgMatches;
use config::{Config as ConfigBuilder, Environment};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Command settings merged from CLI args, env vars, and defaults
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GroveConfig {
    pub build: BuildConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BuildConfig {
    /// Project root; source globs resolve against it
    pub root: String,
    /// Descriptor file, relative to the root
    pub config: String,
    /// Output directory, relative to the root
    pub output: String,
    /// Theme directory, relative to the root
    pub theme: String,
    /// Host for dev server
    pub host: String,
    /// Port for dev server
    pub port: u16,
    /// Open browser automatically
    pub open: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            root: ".".to_string(),
            config: grove_core::DESCRIPTOR_FILE.to_string(),
            output: "dist".to_string(),
            theme: "theme".to_string(),
            host: "127.0.0.1".to_string(),
            port: 3000,
            open: false,
        }
    }
}

impl BuildConfig {
    pub fn root(&self) -> PathBuf {
        PathBuf::from(&self.root)
    }

    fn under_root(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root().join(path)
        }
    }

    pub fn descriptor_path(&self) -> PathBuf {
        self.under_root(&self.config)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.under_root(&self.output)
    }

    pub fn theme_dir(&self) -> PathBuf {
        self.under_root(&self.theme)
    }
}

impl GroveConfig {
    /// Load configuration with cascading precedence:
    /// 1. CLI arguments (highest priority)
    /// 2. Environment variables (GROVE_*)
    /// 3. Defaults (lowest priority)
    pub fn load(args: &ArgMatches) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        let defaults = Self::default();
        builder = builder.add_source(ConfigBuilder::try_from(&defaults)?);

        builder = builder.add_source(
            Environment::with_prefix("GROVE")
                .prefix_separator("_")
                .separator("__"),
        );

        let mut cli_overrides = HashMap::new();
        for key in ["root", "config", "output", "theme", "host"] {
            if let Some(value) = args.try_get_one::<String>(key).unwrap_or(None) {
                cli_overrides.insert(format!("build.{key}"), value.clone());
            }
        }
        if let Some(port) = args.try_get_one::<u16>("port").unwrap_or(None) {
            cli_overrides.insert("build.port".to_string(), port.to_string());
        }
        if args.try_get_one::<bool>("open").unwrap_or(None) == Some(&true) {
            cli_overrides.insert("build.open".to_string(), "true".to_string());
        }

        for (key, value) in cli_overrides {
            builder = builder.set_override(key, value)?;
        }

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }
}

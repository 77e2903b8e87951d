//! Configuration Module
//!
//! Handles configuration file parsing and command-line arguments.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::DeviceOptions;
use crate::platform::INFINITE;

/// Runner configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Enable the runtime's debug validation layer
    #[serde(default)]
    pub validate: bool,

    /// Prefer the software adapter
    #[serde(default)]
    pub warp: bool,

    /// Default log filter, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Only run tests whose name contains this string
    #[serde(default)]
    pub filter: Option<String>,

    /// Count a todo check that passes as a failure
    #[serde(default = "default_fail_on_todo_pass")]
    pub fail_on_todo_pass: bool,

    /// Upper bound for every fence wait, in milliseconds (0 = no bound)
    #[serde(default)]
    pub wait_timeout_ms: u32,
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_fail_on_todo_pass() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            validate: false,
            warp: false,
            log_level: default_log_level(),
            filter: None,
            fail_on_todo_pass: default_fail_on_todo_pass(),
            wait_timeout_ms: 0,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply command-line arguments (without the program name).
    ///
    /// `--config <path>` is loaded first so that the other flags override
    /// the file regardless of their position.
    pub fn from_args<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();

        let mut config = match args.iter().position(|a| a == "--config") {
            Some(i) => match args.get(i + 1) {
                Some(path) => Config::load(path)?,
                None => bail!("--config requires a path"),
            },
            None => Config::default(),
        };

        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--validate" => config.validate = true,
                "--warp" => config.warp = true,
                "--config" => {
                    iter.next();
                }
                "--filter" => match iter.next() {
                    Some(filter) => config.filter = Some(filter.clone()),
                    None => bail!("--filter requires a value"),
                },
                other => bail!("unknown argument: {}", other),
            }
        }
        Ok(config)
    }

    /// Adapter selection handed to fixture construction.
    pub fn device_options(&self) -> DeviceOptions {
        DeviceOptions {
            validate: self.validate,
            warp: self.warp,
        }
    }

    /// Fence wait bound in the form the sync helpers take.
    pub fn wait_timeout(&self) -> u32 {
        match self.wait_timeout_ms {
            0 => INFINITE,
            ms => ms,
        }
    }

    pub fn selects(&self, test_name: &str) -> bool {
        self.filter
            .as_deref()
            .map_or(true, |filter| test_name.contains(filter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.wait_timeout(), INFINITE);
        assert!(config.selects("anything"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conformance.toml");
        let config = Config {
            warp: true,
            filter: Some("clear".to_string()),
            wait_timeout_ms: 5000,
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conformance.toml");
        std::fs::write(&path, "validate = false\nfilter = \"fence\"\n").unwrap();

        let config = Config::from_args([
            "--validate",
            "--config",
            path.to_str().unwrap(),
            "--filter",
            "scissor",
        ])
        .unwrap();
        assert!(config.validate);
        assert!(!config.warp);
        assert_eq!(config.filter.as_deref(), Some("scissor"));
        assert!(config.selects("test_scissor"));
        assert!(!config.selects("test_fence_order"));
        assert_eq!(
            config.device_options(),
            DeviceOptions {
                validate: true,
                warp: false
            }
        );
    }

    #[test]
    fn test_bad_arguments() {
        assert!(Config::from_args(["--bogus"]).is_err());
        assert!(Config::from_args(["--filter"]).is_err());
        assert!(Config::from_args(["--config"]).is_err());
    }
}

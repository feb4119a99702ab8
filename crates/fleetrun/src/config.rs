//! Configuration loading and types

use std::path::{Path, PathBuf};

use fleetrun_core::Target;
use fleetrun_exec::LocalOptions;
use serde::{Deserialize, Serialize};

/// Environment variable pointing at a config file
pub const CONFIG_ENV: &str = "FLEETRUN_CONFIG";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Run settings
    #[serde(default)]
    pub settings: Settings,
    /// Target definitions
    #[serde(default, rename = "target")]
    pub targets: Vec<TargetConfig>,
}

/// Run settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit logs as JSON
    #[serde(default)]
    pub json_logs: bool,
    /// Number of targets run at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Per-target timeout in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            concurrency: default_concurrency(),
            timeout_secs: None,
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_concurrency() -> usize {
    10
}

/// One configured target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Unique target name
    pub name: String,
    /// Display host
    #[serde(default)]
    pub host: Option<String>,
    /// Local transport options
    #[serde(default)]
    pub local: LocalOptions,
}

impl TargetConfig {
    #[must_use]
    pub fn target(&self) -> Target {
        let target = Target::new(&self.name);
        match &self.host {
            Some(host) => target.with_host(host),
            None => target,
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Find the config file to use
    ///
    /// Checks the explicit path, then `FLEETRUN_CONFIG`, then
    /// `fleetrun.toml` in the working directory and the user config dir.
    #[must_use]
    pub fn resolve_path(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }

        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }

        let candidates = [
            Some(PathBuf::from("fleetrun.toml")),
            dirs::config_dir().map(|p| p.join("fleetrun/fleetrun.toml")),
        ];
        candidates.into_iter().flatten().find(|p| p.exists())
    }

    /// Targets to run against
    ///
    /// An empty selection means every configured target. With no targets
    /// configured at all, a single `localhost` target is used.
    ///
    /// # Errors
    /// Returns error if a selected name is not configured
    pub fn select_targets(&self, names: &[String]) -> eyre::Result<Vec<TargetConfig>> {
        if self.targets.is_empty() {
            let localhost = TargetConfig {
                name: "localhost".to_string(),
                host: None,
                local: LocalOptions::default(),
            };
            if names.iter().all(|n| n == "localhost") {
                return Ok(vec![localhost]);
            }
        }

        if names.is_empty() {
            return Ok(self.targets.clone());
        }

        names
            .iter()
            .map(|name| {
                self.targets
                    .iter()
                    .find(|t| &t.name == name)
                    .cloned()
                    .ok_or_else(|| eyre::eyre!("unknown target: {name}"))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[settings]
log_level = "debug"
concurrency = 4
timeout_secs = 30

[[target]]
name = "web1"
host = "10.0.0.5"

[target.local]
tmpdir = "/var/tmp"
cleanup = false

[target.local.interpreters]
rb = "/usr/bin/ruby"

[[target]]
name = "web2"
"#;

    #[test]
    fn test_parse_config() {
        let config: Config = toml::from_str(SAMPLE).unwrap();

        assert_eq!(config.settings.log_level, "debug");
        assert_eq!(config.settings.concurrency, 4);
        assert_eq!(config.settings.timeout_secs, Some(30));
        assert_eq!(config.targets.len(), 2);

        let web1 = &config.targets[0];
        assert_eq!(web1.target().host(), "10.0.0.5");
        assert!(!web1.local.cleanup);
        assert_eq!(web1.local.interpreters["rb"], "/usr/bin/ruby");
        assert!(config.targets[1].local.cleanup);
    }

    #[test]
    fn test_defaults() {
        let config: Config = toml::from_str("").unwrap();

        assert_eq!(config.settings.log_level, "warn");
        assert_eq!(config.settings.concurrency, 10);
        assert!(config.targets.is_empty());
    }

    #[test]
    fn test_select_targets() {
        let config: Config = toml::from_str(SAMPLE).unwrap();

        assert_eq!(config.select_targets(&[]).unwrap().len(), 2);

        let picked = config.select_targets(&["web2".to_string()]).unwrap();
        assert_eq!(picked[0].name, "web2");

        assert!(config.select_targets(&["db1".to_string()]).is_err());
    }

    #[test]
    fn test_localhost_fallback() {
        let config = Config::default();
        let picked = config.select_targets(&[]).unwrap();

        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].name, "localhost");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleetrun.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.targets[0].name, "web1");
        assert_eq!(Config::resolve_path(Some(&path)), Some(path.clone()));
    }
}

//! Console host configuration, loaded from TOML.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::cli::CliArgs;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Name of the loaded world; player data is kept per world
    pub world_name: String,
    /// Root directory for plugin documents
    pub data_dir: String,
    /// Players who may run server-control commands
    pub operators: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            world_name: "world".to_string(),
            data_dir: "data".to_string(),
            operators: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Loads the config at `path`. A missing file is created with the
    /// defaults, which are then returned.
    pub async fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let config: AppConfig =
                toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    pub fn apply_overrides(&mut self, args: &CliArgs) {
        if let Some(data_dir) = &args.data_dir {
            self.server.data_dir = data_dir.to_string_lossy().to_string();
        }
        if let Some(world_name) = &args.world_name {
            self.server.world_name = world_name.clone();
        }
        if let Some(log_level) = &args.log_level {
            self.logging.level = log_level.clone();
        }
        if args.json_logs {
            self.logging.json_format = true;
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let world = &self.server.world_name;
        if world.is_empty() {
            return Err("World name cannot be empty".to_string());
        }
        if world.contains(['/', '\\']) || world == "." || world == ".." {
            return Err(format!("Invalid world name: {}", world));
        }

        if self.server.data_dir.is_empty() {
            return Err("Data directory cannot be empty".to_string());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_is_created_with_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("waystone.toml");

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(path.exists());

        // and it reads back the same
        let again = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(again, config);
    }

    #[tokio::test]
    async fn test_load_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("waystone.toml");
        tokio::fs::write(
            &path,
            r#"
[server]
world_name = "nether"
operators = ["Alice"]

[logging]
level = "debug"
"#,
        )
        .await
        .unwrap();

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config.server.world_name, "nether");
        assert_eq!(config.server.data_dir, "data");
        assert_eq!(config.server.operators, vec!["Alice"]);
        assert_eq!(config.logging.level, "debug");
        assert!(!config.logging.json_format);
    }

    #[tokio::test]
    async fn test_bad_toml_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("waystone.toml");
        tokio::fs::write(&path, "[server\nworld_name = 1").await.unwrap();

        assert!(AppConfig::load_from_file(&path).await.is_err());
    }

    #[test]
    fn test_overrides() {
        let mut config = AppConfig::default();
        config.apply_overrides(&CliArgs {
            config_path: PathBuf::from("waystone.toml"),
            data_dir: Some(PathBuf::from("/tmp/ws")),
            world_name: Some("nether".to_string()),
            log_level: Some("warn".to_string()),
            json_logs: true,
        });

        assert_eq!(config.server.data_dir, "/tmp/ws");
        assert_eq!(config.server.world_name, "nether");
        assert_eq!(config.logging.level, "warn");
        assert!(config.logging.json_format);
    }

    #[test]
    fn test_validation() {
        assert!(AppConfig::default().validate().is_ok());

        let mut config = AppConfig::default();
        config.server.world_name = "../escape".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.server.data_dir.clear();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().unwrap_err().contains("Invalid log level"));
    }
}

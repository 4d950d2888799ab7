//! Configuration loading with hierarchy merging.
//!
//! Configuration is loaded from multiple sources and merged in order:
//!
//! 1. Built-in defaults (`:9999` -> `localhost:80`)
//! 2. User config: `~/.config/tcp-proxy/config.toml`
//! 3. Additional config file (via `--config` flag)
//! 4. CLI flags (highest priority)
//!
//! Values are **overridden** by later layers when set.
//! Toggles are **enabled** if any layer enables them.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::error::ConfigError;
use super::schema::{FileConfig, Settings};
use crate::cli::Cli;

/// User configuration directory name.
pub const USER_CONFIG_DIR: &str = "tcp-proxy";

/// User configuration filename.
pub const USER_CONFIG_FILE: &str = "config.toml";

/// Configuration loader with support for hierarchy merging.
pub struct ConfigLoader {
    /// Path to user configuration.
    user_path: PathBuf,
}

impl ConfigLoader {
    /// Create a new ConfigLoader with the default user config path.
    #[must_use]
    pub fn new() -> Self {
        let user_config_dir = dirs::config_dir()
            .map(|p| p.join(USER_CONFIG_DIR))
            .unwrap_or_else(|| PathBuf::from(".config").join(USER_CONFIG_DIR));

        Self {
            user_path: user_config_dir.join(USER_CONFIG_FILE),
        }
    }

    /// Create a ConfigLoader with a custom user config path (for testing).
    #[must_use]
    pub fn with_user_path(user_path: PathBuf) -> Self {
        Self { user_path }
    }

    /// Load and merge configuration from all sources.
    ///
    /// A missing user config is not an error. A missing `--config` file is.
    /// Invalid TOML is an error (fail fast with clear message).
    pub fn load(&self, cli: &Cli) -> Result<Settings, ConfigError> {
        let mut settings = Settings::default();

        // Load and merge user config
        if let Some(user_config) = self.load_file(&self.user_path)? {
            settings.merge(user_config);
            debug!("Loaded user config from {:?}", self.user_path);
        } else {
            debug!("No user config found at {:?}", self.user_path);
        }

        // Load and merge additional config file from CLI
        if let Some(ref cli_config_path) = cli.config {
            match self.load_file(cli_config_path)? {
                Some(cli_config) => {
                    settings.merge(cli_config);
                    debug!("Loaded additional config from {:?}", cli_config_path);
                }
                None => {
                    // Unlike the user config, a missing CLI-specified config is an error
                    return Err(ConfigError::ReadError {
                        path: cli_config_path.clone(),
                        source: std::io::Error::new(
                            std::io::ErrorKind::NotFound,
                            "Specified config file not found",
                        ),
                    });
                }
            }
        }

        // Apply CLI flags (highest priority)
        apply_cli(&mut settings, cli);

        validate(&settings)?;
        Ok(settings)
    }

    /// Load a config file, returning None if it doesn't exist.
    fn load_file(&self, path: &Path) -> Result<Option<FileConfig>, ConfigError> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let config: FileConfig =
                    toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
                        path: path.to_path_buf(),
                        source: e,
                    })?;
                Ok(Some(config))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ConfigError::ReadError {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_cli(settings: &mut Settings, cli: &Cli) {
    if let Some(ref local) = cli.local {
        settings.local = local.clone();
    }
    if let Some(ref remote) = cli.remote {
        settings.remote = remote.clone();
    }

    settings.verbose |= cli.verbose;
    settings.very_verbose |= cli.very_verbose;
    settings.disable_nagle |= cli.nagles;
    settings.output_hex |= cli.hex;
    settings.color |= cli.color;
    settings.unwrap_tls |= cli.unwrap_tls;

    if cli.tls_server_name.is_some() {
        settings.tls_server_name = cli.tls_server_name.clone();
    }
    if cli.tls_ca_file.is_some() {
        settings.tls_ca_file = cli.tls_ca_file.clone();
    }
    if cli.match_pattern.is_some() {
        settings.match_pattern = cli.match_pattern.clone();
    }
    if cli.replace.is_some() {
        settings.replace = cli.replace.clone();
    }
    if cli.log_file.is_some() {
        settings.log_file = cli.log_file.clone();
    }

    if settings.very_verbose {
        settings.verbose = true;
    }
}

fn validate(settings: &Settings) -> Result<(), ConfigError> {
    for (field, value) in [("local", &settings.local), ("remote", &settings.remote)] {
        if value.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: field.to_string(),
                message: "address must not be empty".to_string(),
            });
        }
    }
    Ok(())
}

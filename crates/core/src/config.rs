//! Configuration management for podwire

use crate::endpoint::Endpoint;
use crate::error::{PodwireError, Result};
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Environment variable naming the default endpoint
pub const CONTAINER_HOST_ENV: &str = "CONTAINER_HOST";

/// Environment variable naming the SSH agent socket
pub const SSH_AUTH_SOCK_ENV: &str = "SSH_AUTH_SOCK";

/// Main configuration structure for podwire
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PodwireConfig {
    /// Endpoint used when a caller does not name one
    pub default_host: Option<String>,
    /// SSH transport settings
    pub ssh: SshConfig,
    /// Timeouts
    pub timeouts: TimeoutConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// SSH transport configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SshConfig {
    /// Accepted host key algorithms, in preference order. Empty means the
    /// library defaults, narrowed to the pinned key's type when one is pinned.
    pub host_key_algorithms: Vec<String>,
    /// SSH agent socket used for public key authentication
    pub agent_socket: Option<PathBuf>,
    /// Private key file used when the agent offers nothing usable
    pub key_path: Option<PathBuf>,
}

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Dial and handshake timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect: u64,
    /// Per-request timeout in seconds; unset means no limit
    #[serde(default)]
    pub request: Option<u64>,
}

fn default_connect_timeout() -> u64 {
    30
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: default_connect_timeout(),
            request: None,
        }
    }
}

impl PodwireConfig {
    /// Load configuration from file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading configuration from: {}", path.display());

        let contents = std::fs::read_to_string(path)
            .map_err(|e| PodwireError::config(format!("Failed to read config file: {}", e)))?;

        let config: PodwireConfig = toml::from_str(&contents)
            .map_err(|e| PodwireError::config(format!("Failed to parse config file: {}", e)))?;

        info!("Configuration loaded successfully from: {}", path.display());
        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        debug!("Saving configuration to: {}", path.display());

        let contents = toml::to_string_pretty(self)
            .map_err(|e| PodwireError::config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                PodwireError::config(format!("Failed to create config directory: {}", e))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| PodwireError::config(format!("Failed to write config file: {}", e)))?;

        info!("Configuration saved successfully to: {}", path.display());
        Ok(())
    }

    /// Candidate configuration files, most specific first
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("podwire.toml")];

        if let Some(dir) = std::env::var_os("XDG_CONFIG_HOME").filter(|d| !d.is_empty()) {
            paths.push(PathBuf::from(dir).join("podwire").join("config.toml"));
        }
        if let Some(home) = std::env::var_os("HOME").filter(|d| !d.is_empty()) {
            paths.push(
                PathBuf::from(home)
                    .join(".config")
                    .join("podwire")
                    .join("config.toml"),
            );
        }

        paths
    }

    /// Path written by `config init` when no output is given
    pub fn default_path() -> Option<PathBuf> {
        Self::search_paths().into_iter().nth(1)
    }

    /// Load the first readable configuration file, or the defaults
    pub fn load_or_default() -> Self {
        for config_path in Self::search_paths() {
            if config_path.exists() {
                match Self::load_from_file(&config_path) {
                    Ok(config) => {
                        info!("Using configuration from: {}", config_path.display());
                        return config;
                    }
                    Err(e) => {
                        warn!(
                            "Failed to load config from {}: {}",
                            config_path.display(),
                            e
                        );
                    }
                }
            }
        }

        debug!("No configuration file found, using defaults");
        Self::default()
    }

    /// Merge configuration with environment variables
    pub fn merge_with_env(&mut self) {
        self.apply_env(
            std::env::var(CONTAINER_HOST_ENV).ok(),
            std::env::var_os(SSH_AUTH_SOCK_ENV).map(PathBuf::from),
        );
    }

    /// Fill unset settings from the given environment values.
    ///
    /// A `default_host` from the file wins over `CONTAINER_HOST`.
    pub fn apply_env(&mut self, container_host: Option<String>, agent_socket: Option<PathBuf>) {
        let container_host = container_host.filter(|h| !h.is_empty());
        match (&self.default_host, container_host) {
            (None, Some(env_host)) => {
                debug!("Using {} as default host", CONTAINER_HOST_ENV);
                self.default_host = Some(env_host);
            }
            (Some(file_host), Some(env_host)) if *file_host != env_host => {
                warn!(
                    "{} differs from the configured default_host; using default_host",
                    CONTAINER_HOST_ENV
                );
            }
            _ => {}
        }

        if self.ssh.agent_socket.is_none() {
            self.ssh.agent_socket = agent_socket.filter(|p| !p.as_os_str().is_empty());
        }
    }

    /// Dial and handshake timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.connect)
    }

    /// Per-request timeout, if any
    pub fn request_timeout(&self) -> Option<Duration> {
        self.timeouts.request.map(Duration::from_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.timeouts.connect == 0 {
            return Err(PodwireError::config(
                "Connect timeout must be greater than 0",
            ));
        }

        if self.timeouts.request == Some(0) {
            return Err(PodwireError::config(
                "Request timeout must be greater than 0",
            ));
        }

        if let Some(host) = &self.default_host {
            host.parse::<Endpoint>()?;
        }

        debug!("Configuration validation completed successfully");
        Ok(())
    }
}

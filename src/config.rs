//! Configuration module for hello-host.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::net::{AddrParseError, SocketAddr};
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::Semaphore;

/// Command-line arguments for the service host
#[derive(Parser, Debug)]
#[command(name = "hello-host")]
#[command(author = "hello-host authors")]
#[command(version = "0.1.0")]
#[command(about = "A greeting service with message inspection", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 127.0.0.1:8733); repeat for more listeners
    #[arg(short = 'l', long)]
    pub listen: Vec<String>,

    /// Maximum number of concurrent connections across all listeners
    #[arg(short = 'm', long)]
    pub max_connections: Option<usize>,

    /// Listen backlog for each listener socket
    #[arg(long)]
    pub backlog: Option<u32>,

    /// Behavior extension to enable (e.g., message-logger); repeatable
    #[arg(short = 'b', long = "behavior")]
    pub behaviors: Vec<String>,

    /// Where message dumps are written
    #[arg(long, value_enum)]
    pub message_sink: Option<SinkKind>,

    /// Log level (trace, debug, info, warn, error) [default: info]
    #[arg(long)]
    pub log_level: Option<String>,
}

/// Diagnostic sink selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Raw text on standard error
    #[default]
    Stderr,
    /// DEBUG events through the logging pipeline
    Tracing,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub behaviors: BehaviorsConfig,
    #[serde(default)]
    pub message_log: MessageLogConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Addresses to bind to, one dispatcher each
    #[serde(default = "default_listen")]
    pub listen: Vec<String>,
    /// Connection cap shared by all listeners
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Listen backlog
    #[serde(default = "default_backlog")]
    pub backlog: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            max_connections: default_max_connections(),
            backlog: default_backlog(),
        }
    }
}

/// Behavior extensions applied at startup
#[derive(Debug, Deserialize)]
pub struct BehaviorsConfig {
    #[serde(default = "default_behaviors")]
    pub enabled: Vec<String>,
}

impl Default for BehaviorsConfig {
    fn default() -> Self {
        Self {
            enabled: default_behaviors(),
        }
    }
}

/// Message dump configuration
#[derive(Debug, Deserialize, Default)]
pub struct MessageLogConfig {
    #[serde(default)]
    pub sink: SinkKind,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> Vec<String> {
    vec!["127.0.0.1:8733".to_string()]
}

fn default_max_connections() -> usize {
    1024
}

fn default_backlog() -> u32 {
    1024
}

fn default_behaviors() -> Vec<String> {
    vec!["message-logger".to_string()]
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: Vec<SocketAddr>,
    pub max_connections: usize,
    pub backlog: u32,
    pub behaviors: Vec<String>,
    pub message_sink: SinkKind,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_cli(CliArgs::parse())
    }

    /// Merge parsed CLI args with the TOML file they point at, if any.
    /// CLI arguments take precedence over TOML file values.
    pub fn from_cli(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|source| ConfigError::FileRead {
                    path: config_path.clone(),
                    source,
                })?;
            toml::from_str(&contents)
                .map_err(|source| ConfigError::TomlParse {
                    path: config_path.clone(),
                    source,
                })?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let listen = if cli.listen.is_empty() {
            toml_config.server.listen
        } else {
            cli.listen
        };
        let listen = listen
            .iter()
            .map(|addr| {
                addr.parse::<SocketAddr>()
                    .map_err(|e| ConfigError::InvalidListen(addr.clone(), e))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if listen.is_empty() {
            return Err(ConfigError::NoListeners);
        }

        let max_connections = cli
            .max_connections
            .unwrap_or(toml_config.server.max_connections);
        if max_connections == 0 || max_connections > Semaphore::MAX_PERMITS {
            return Err(ConfigError::InvalidMaxConnections(max_connections));
        }

        Ok(Config {
            listen,
            max_connections,
            backlog: cli.backlog.unwrap_or(toml_config.server.backlog),
            behaviors: if cli.behaviors.is_empty() {
                toml_config.behaviors.enabled
            } else {
                cli.behaviors
            },
            message_sink: cli.message_sink.unwrap_or(toml_config.message_log.sink),
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        })
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", .path.display())]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{}': {source}", .path.display())]
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Invalid listen address '{0}': {1}")]
    InvalidListen(String, AddrParseError),
    #[error("No listen addresses configured")]
    NoListeners,
    #[error("max_connections must be between 1 and {max}, got {0}", max = Semaphore::MAX_PERMITS)]
    InvalidMaxConnections(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(std::iter::once("hello-host").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.listen, vec!["127.0.0.1:8733"]);
        assert_eq!(config.server.max_connections, 1024);
        assert_eq!(config.behaviors.enabled, vec!["message-logger"]);
        assert_eq!(config.message_log.sink, SinkKind::Stderr);
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            listen = ["0.0.0.0:8733", "127.0.0.1:9000"]
            max_connections = 64

            [behaviors]
            enabled = []

            [message_log]
            sink = "tracing"

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen, vec!["0.0.0.0:8733", "127.0.0.1:9000"]);
        assert_eq!(config.server.max_connections, 64);
        assert_eq!(config.server.backlog, 1024);
        assert!(config.behaviors.enabled.is_empty());
        assert_eq!(config.message_log.sink, SinkKind::Tracing);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_unknown_sink_rejected() {
        let result = toml::from_str::<TomlConfig>("[message_log]\nsink = \"syslog\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_takes_precedence() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [server]
            listen = ["127.0.0.1:9000"]
            max_connections = 64

            [message_log]
            sink = "tracing"
        "#,
        )
        .unwrap();

        let config = Config::merge(
            cli(&[
                "--listen",
                "127.0.0.1:7000",
                "--listen",
                "[::1]:7001",
                "--message-sink",
                "stderr",
                "--log-level",
                "trace",
            ]),
            toml_config,
        )
        .unwrap();

        assert_eq!(config.listen.len(), 2);
        assert_eq!(config.listen[0], "127.0.0.1:7000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.max_connections, 64);
        assert_eq!(config.message_sink, SinkKind::Stderr);
        assert_eq!(config.behaviors, vec!["message-logger"]);
        assert_eq!(config.log_level, "trace");
    }

    #[test]
    fn test_invalid_listen_address() {
        let err = Config::merge(cli(&["-l", "not-an-address"]), TomlConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidListen(ref addr, _) if addr == "not-an-address"));
    }

    #[test]
    fn test_empty_listen_rejected() {
        let toml_config: TomlConfig = toml::from_str("[server]\nlisten = []\n").unwrap();
        let err = Config::merge(cli(&[]), toml_config).unwrap_err();
        assert!(matches!(err, ConfigError::NoListeners));
    }

    #[test]
    fn test_zero_max_connections_rejected() {
        let err = Config::merge(cli(&["--max-connections", "0"]), TomlConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMaxConnections(0)));

        let toml_config: TomlConfig = toml::from_str("[server]\nmax_connections = 0\n").unwrap();
        let err = Config::merge(cli(&[]), toml_config).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMaxConnections(0)));
    }

    #[test]
    fn test_max_connections_above_permit_limit_rejected() {
        let err = Config::merge(
            cli(&["--max-connections", "18446744073709551615"]),
            TomlConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMaxConnections(n) if n == usize::MAX));

        let limit = Semaphore::MAX_PERMITS.to_string();
        let config = Config::merge(cli(&["--max-connections", &limit]), TomlConfig::default()).unwrap();
        assert_eq!(config.max_connections, Semaphore::MAX_PERMITS);
    }

    #[test]
    fn test_explicit_info_level_overrides_file() {
        let toml_config: TomlConfig = toml::from_str("[logging]\nlevel = \"debug\"\n").unwrap();
        let config = Config::merge(cli(&["--log-level", "info"]), toml_config).unwrap();
        assert_eq!(config.log_level, "info");

        let toml_config: TomlConfig = toml::from_str("[logging]\nlevel = \"debug\"\n").unwrap();
        let config = Config::merge(cli(&[]), toml_config).unwrap();
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_missing_config_file() {
        let err = Config::from_cli(cli(&["--config", "/nonexistent/hello-host.toml"])).unwrap_err();
        assert!(matches!(err, ConfigError::FileRead { .. }));
    }
}

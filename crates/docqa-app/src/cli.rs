//! CLI argument definitions for the docqa server.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

use docqa_core::config::{DocqaConfig, HistoryBackend};

/// docqa - answers questions over an Elasticsearch document index as a
/// server-sent event stream.
#[derive(Parser, Debug)]
#[command(name = "docqa", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// API server port.
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Chat history store (elasticsearch, sqlite, memory).
    #[arg(long = "history-backend")]
    pub history_backend: Option<HistoryBackend>,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > DOCQA_CONFIG env var > ~/.docqa/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        self.resolve_config_path_with(std::env::var("DOCQA_CONFIG").ok())
    }

    fn resolve_config_path_with(&self, env_path: Option<String>) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Some(p) = env_path.filter(|p| !p.is_empty()) {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Apply flags on top of an already env-overridden config.
    pub fn apply(&self, config: &mut DocqaConfig) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(ref level) = self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(backend) = self.history_backend {
            config.history.backend = backend;
        }
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    home_dir()
        .map(|home| home.join(".docqa").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("config.toml"))
}

fn home_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    let home = std::env::var("USERPROFILE");
    #[cfg(not(target_os = "windows"))]
    let home = std::env::var("HOME");
    home.ok().map(PathBuf::from)
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        Some(rest) => home_dir().unwrap_or_else(|| PathBuf::from(".")).join(rest),
        None => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_flags() {
        let args = CliArgs::try_parse_from([
            "docqa",
            "-c",
            "/etc/docqa.toml",
            "-p",
            "8080",
            "-l",
            "debug",
            "--history-backend",
            "sqlite",
        ])
        .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("/etc/docqa.toml")));
        assert_eq!(args.port, Some(8080));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert_eq!(args.history_backend, Some(HistoryBackend::Sqlite));
    }

    #[test]
    fn test_invalid_backend_rejected() {
        assert!(CliArgs::try_parse_from(["docqa", "--history-backend", "redis"]).is_err());
    }

    #[test]
    fn test_config_path_priority() {
        let flag = CliArgs::try_parse_from(["docqa", "--config", "a.toml"]).unwrap();
        assert_eq!(
            flag.resolve_config_path_with(Some("b.toml".to_string())),
            PathBuf::from("a.toml")
        );

        let none = CliArgs::try_parse_from(["docqa"]).unwrap();
        assert_eq!(
            none.resolve_config_path_with(Some("b.toml".to_string())),
            PathBuf::from("b.toml")
        );
        assert!(none
            .resolve_config_path_with(None)
            .ends_with("config.toml"));
    }

    #[test]
    fn test_apply_overrides_config() {
        let args =
            CliArgs::try_parse_from(["docqa", "-p", "9000", "--history-backend", "memory"]).unwrap();
        let mut config = DocqaConfig::default();
        args.apply(&mut config);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.history.backend, HistoryBackend::Memory);
        assert_eq!(config.general.log_level, "info");
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/var/lib/docqa.db"), PathBuf::from("/var/lib/docqa.db"));
        assert!(expand_home("~/.docqa/history.db").ends_with(".docqa/history.db"));
    }
}

//! TOML configuration, matching the recognised options from §6: a
//! `Config` struct with `#[serde(default)]` fields, loaded once at
//! startup and partially reloadable on `SIGHUP`.

use std::fs;
use std::path::Path;

use emberkv_durability::FsyncPolicy;
use emberkv_engine::{HotReloadConfig, ServerConfig};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: String, source: std::io::Error },

    #[error("failed to parse config file {path}: {source}")]
    Parse { path: String, source: toml::de::Error },

    #[error("invalid appendfsync value '{0}' (expected always, everysec, or no)")]
    InvalidFsync(String),

    #[error("invalid byte size '{0}' (expected a number optionally suffixed with k, m, or g)")]
    InvalidByteSize(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub databases: usize,
    pub requirepass: Option<String>,
    pub appendonly: bool,
    pub appendfilename: String,
    pub appendfsync: String,
    pub auto_aof_rewrite_percentage: u32,
    pub auto_aof_rewrite_min_size: String,
    pub logfile: Option<String>,
    pub loglevel: String,
}

impl Default for Config {
    fn default() -> Self {
        let defaults = ServerConfig::default();
        Config {
            bind: defaults.bind,
            port: defaults.port,
            databases: defaults.databases,
            requirepass: None,
            appendonly: defaults.appendonly,
            appendfilename: defaults.appendfilename.to_string_lossy().into_owned(),
            appendfsync: "everysec".to_string(),
            auto_aof_rewrite_percentage: defaults.auto_aof_rewrite_percentage,
            auto_aof_rewrite_min_size: "64m".to_string(),
            logfile: None,
            loglevel: "info".to_string(),
        }
    }
}

impl Config {
    /// Loads and parses the TOML file at `path`. The default path
    /// (`./config.toml`) is not special-cased if missing: a server
    /// that cannot read its own configuration should fail loudly
    /// rather than silently run on built-in defaults.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn fsync_policy(&self) -> Result<FsyncPolicy, ConfigError> {
        parse_fsync_policy(&self.appendfsync)
    }

    pub fn auto_aof_rewrite_min_size_bytes(&self) -> Result<u64, ConfigError> {
        parse_byte_size(&self.auto_aof_rewrite_min_size)
    }

    /// Builds the [`ServerConfig`] `emberkv-engine` bootstraps from.
    pub fn to_server_config(&self) -> Result<ServerConfig, ConfigError> {
        Ok(ServerConfig {
            bind: self.bind.clone(),
            port: self.port,
            databases: self.databases,
            requirepass: self.requirepass.clone(),
            appendonly: self.appendonly,
            appendfilename: self.appendfilename.clone().into(),
            appendfsync: self.fsync_policy()?,
            auto_aof_rewrite_percentage: self.auto_aof_rewrite_percentage,
            auto_aof_rewrite_min_size: self.auto_aof_rewrite_min_size_bytes()?,
        })
    }

    /// The subset of fields `SIGHUP` is allowed to change on a live
    /// server (§4.12); `bind`/`port`/`appendonly`/`appendfilename`/
    /// `databases` differences are the caller's responsibility to
    /// detect and warn about, since applying them here would require
    /// tearing down live sockets or file handles.
    pub fn to_hot_reload(&self) -> Result<HotReloadConfig, ConfigError> {
        Ok(HotReloadConfig {
            appendfsync: self.fsync_policy()?,
            auto_aof_rewrite_percentage: self.auto_aof_rewrite_percentage,
            auto_aof_rewrite_min_size: self.auto_aof_rewrite_min_size_bytes()?,
        })
    }
}

fn parse_fsync_policy(value: &str) -> Result<FsyncPolicy, ConfigError> {
    match value {
        "always" => Ok(FsyncPolicy::Always),
        "everysec" => Ok(FsyncPolicy::EverySecond),
        "no" => Ok(FsyncPolicy::Never),
        other => Err(ConfigError::InvalidFsync(other.to_string())),
    }
}

fn parse_byte_size(value: &str) -> Result<u64, ConfigError> {
    let trimmed = value.trim();
    let (number, multiplier) = match trimmed.to_ascii_lowercase().chars().last() {
        Some('k') => (&trimmed[..trimmed.len() - 1], 1024u64),
        Some('m') => (&trimmed[..trimmed.len() - 1], 1024 * 1024),
        Some('g') => (&trimmed[..trimmed.len() - 1], 1024 * 1024 * 1024),
        _ => (trimmed, 1),
    };
    number
        .trim()
        .parse::<u64>()
        .map(|n| n * multiplier)
        .map_err(|_| ConfigError::InvalidByteSize(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_into_a_server_config() {
        let config = Config::default();
        let server_config = config.to_server_config().unwrap();
        assert_eq!(server_config.port, 6380);
        assert_eq!(server_config.appendfsync, FsyncPolicy::EverySecond);
    }

    #[test]
    fn byte_size_suffixes_are_parsed() {
        assert_eq!(parse_byte_size("64").unwrap(), 64);
        assert_eq!(parse_byte_size("64k").unwrap(), 64 * 1024);
        assert_eq!(parse_byte_size("1m").unwrap(), 1024 * 1024);
        assert_eq!(parse_byte_size("2g").unwrap(), 2 * 1024 * 1024 * 1024);
    }

    #[test]
    fn unknown_fsync_value_is_rejected() {
        assert!(parse_fsync_policy("sometimes").is_err());
    }

    #[test]
    fn toml_parses_kebab_case_keys() {
        let text = r#"
            bind = "0.0.0.0"
            port = 7000
            auto-aof-rewrite-percentage = 50
            auto-aof-rewrite-min-size = "32m"
        "#;
        let config: Config = toml::from_str(text).unwrap();
        assert_eq!(config.bind, "0.0.0.0");
        assert_eq!(config.port, 7000);
        assert_eq!(config.auto_aof_rewrite_percentage, 50);
        assert_eq!(config.auto_aof_rewrite_min_size_bytes().unwrap(), 32 * 1024 * 1024);
    }
}

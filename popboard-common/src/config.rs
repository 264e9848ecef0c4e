//! Configuration loading
//!
//! Values resolve in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! The binary's `clap` parser covers 1 and 2 and hands the result over as
//! [`ConfigOverrides`]; this module merges in the file and the defaults.

use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use crate::ranking::DEFAULT_LEADERBOARD_SIZE;
use crate::store::LookupPolicy;
use crate::{Error, Result};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_DATA_FILE: &str = "database.json";
pub const DEFAULT_STATIC_DIR: &str = "public";
pub const DEFAULT_FANOUT_CAPACITY: usize = 64;
pub const DEFAULT_OUTBOX_CAPACITY: usize = 32;

/// Contents of `config.toml`. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TomlConfig {
    pub port: Option<u16>,
    pub bind_address: Option<String>,
    pub database_url: Option<String>,
    pub data_file: Option<PathBuf>,
    pub in_memory: Option<bool>,
    pub static_dir: Option<PathBuf>,
    pub lookup_policy: Option<LookupPolicy>,
    pub leaderboard_size: Option<usize>,
    pub fanout_capacity: Option<usize>,
    pub outbox_capacity: Option<usize>,
}

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub bind_address: Option<String>,
    pub database_url: Option<String>,
    pub data_file: Option<PathBuf>,
    pub in_memory: Option<bool>,
    pub static_dir: Option<PathBuf>,
    pub lookup_policy: Option<LookupPolicy>,
}

/// Which durable backend to run against
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    /// SQLite database at a connection URL
    Sqlite { url: String },
    /// Whole-document JSON file
    File { path: PathBuf },
    /// Volatile in-process table, lost on exit
    Memory,
}

/// Fully resolved server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub storage: StorageConfig,
    pub static_dir: PathBuf,
    pub lookup_policy: LookupPolicy,
    pub leaderboard_size: usize,
    pub fanout_capacity: usize,
    pub outbox_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            port: DEFAULT_PORT,
            storage: StorageConfig::File {
                path: PathBuf::from(DEFAULT_DATA_FILE),
            },
            static_dir: PathBuf::from(DEFAULT_STATIC_DIR),
            lookup_policy: LookupPolicy::default(),
            leaderboard_size: DEFAULT_LEADERBOARD_SIZE,
            fanout_capacity: DEFAULT_FANOUT_CAPACITY,
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
        }
    }
}

impl ServerConfig {
    /// Merge overrides over the config file over the defaults
    pub fn resolve(overrides: ConfigOverrides, file: Option<TomlConfig>) -> Result<Self> {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        let database_url = overrides.database_url.or(file.database_url);
        let data_file = overrides.data_file.or(file.data_file);
        let in_memory = overrides.in_memory.or(file.in_memory).unwrap_or(false);

        // Exclusive deployment choices: no silent fallback from one to the other
        let storage = match (database_url, data_file, in_memory) {
            (Some(url), None, false) => StorageConfig::Sqlite { url },
            (None, Some(path), false) => StorageConfig::File { path },
            (None, None, true) => StorageConfig::Memory,
            (None, None, false) => defaults.storage,
            _ => {
                return Err(Error::Config(
                    "database_url, data_file and in_memory are mutually exclusive".to_string(),
                ))
            }
        };

        let leaderboard_size = file.leaderboard_size.unwrap_or(defaults.leaderboard_size);
        if leaderboard_size == 0 {
            return Err(Error::Config("leaderboard_size must be at least 1".to_string()));
        }

        let fanout_capacity = file.fanout_capacity.unwrap_or(defaults.fanout_capacity);
        if fanout_capacity == 0 {
            return Err(Error::Config("fanout_capacity must be at least 1".to_string()));
        }

        let outbox_capacity = file.outbox_capacity.unwrap_or(defaults.outbox_capacity);
        if outbox_capacity == 0 {
            return Err(Error::Config("outbox_capacity must be at least 1".to_string()));
        }

        let config = Self {
            bind_address: overrides
                .bind_address
                .or(file.bind_address)
                .unwrap_or(defaults.bind_address),
            port: overrides.port.or(file.port).unwrap_or(defaults.port),
            storage,
            static_dir: overrides
                .static_dir
                .or(file.static_dir)
                .unwrap_or(defaults.static_dir),
            lookup_policy: overrides
                .lookup_policy
                .or(file.lookup_policy)
                .unwrap_or(defaults.lookup_policy),
            leaderboard_size,
            fanout_capacity,
            outbox_capacity,
        };

        config.socket_addr()?;
        Ok(config)
    }

    /// Address the HTTP listener binds to
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.bind_address.parse().map_err(|_| {
            Error::Config(format!("invalid bind address '{}'", self.bind_address))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
}

/// Platform config file location (`~/.config/popboard/config.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("popboard").join("config.toml"))
}

/// Read the config file
///
/// An explicitly named file must exist. The platform default is optional and
/// silently skipped when absent.
pub fn read_config_file(explicit: Option<&Path>) -> Result<Option<TomlConfig>> {
    if let Some(path) = explicit {
        return load_toml_config(path).map(Some);
    }

    match default_config_path() {
        Some(path) if path.exists() => load_toml_config(&path).map(Some),
        _ => Ok(None),
    }
}

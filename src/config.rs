//! TOML configuration with environment overrides.
//!
//! The file lives in the platform config directory and is versioned; the
//! schema only ever grows, so older files load as-is.

use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;

use crate::keychain::KdfParams;
use crate::server::ServeOptions;

const CONFIG_ENV: &str = "PASSKEEPER_CONFIG";
const DATA_DIR_ENV: &str = "PASSKEEPER_DATA_DIR";
const SERVER_URL_ENV: &str = "PASSKEEPER_SERVER_URL";
const TOKEN_SECRET_ENV: &str = "PASSKEEPER_TOKEN_SECRET";
/// Switches the KDF to small test parameters. Test-suite plumbing only.
pub const TEST_KDF_ENV: &str = "PASSKEEPER_TEST_KDF";

const APP_DIR: &str = "passkeeper";
const CONFIG_FILE_NAME: &str = "config.toml";
const CURRENT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug)]
pub enum ConfigError {
    ConfigDirUnavailable,
    DataDirUnavailable,
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
    UnsupportedSchemaVersion(u32),
    MissingTokenSecret,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ConfigDirUnavailable => {
                write!(f, "unable to determine configuration directory")
            }
            ConfigError::DataDirUnavailable => {
                write!(f, "unable to determine data directory")
            }
            ConfigError::Io(err) => write!(f, "filesystem error: {err}"),
            ConfigError::Parse(err) => write!(f, "failed to parse config: {err}"),
            ConfigError::Serialize(err) => write!(f, "failed to serialize config: {err}"),
            ConfigError::UnsupportedSchemaVersion(version) => {
                write!(f, "config schema version '{version}' is not supported")
            }
            ConfigError::MissingTokenSecret => {
                write!(
                    f,
                    "no token secret configured (set [server].token_secret or {TOKEN_SECRET_ENV})"
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(err) => Some(err),
            ConfigError::Parse(err) => Some(err),
            ConfigError::Serialize(err) => Some(err),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSection {
    pub server_url: String,
    pub timeout_secs: u64,
    pub sync_interval_secs: u64,
    pub data_dir: Option<PathBuf>,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".to_string(),
            timeout_secs: 15,
            sync_interval_secs: 300,
            data_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfSection {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
    pub floor_memory_kib: u32,
    pub floor_iterations: u32,
    pub floor_parallelism: u32,
}

impl Default for KdfSection {
    fn default() -> Self {
        let params = KdfParams::recommended();
        let floor = KdfParams::floor();
        Self {
            memory_kib: params.memory_kib,
            iterations: params.iterations,
            parallelism: params.parallelism,
            floor_memory_kib: floor.memory_kib,
            floor_iterations: floor.iterations,
            floor_parallelism: floor.parallelism,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind_addr: String,
    pub db_path: Option<PathBuf>,
    pub token_secret: Option<String>,
    pub token_ttl_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            db_path: None,
            token_secret: None,
            token_ttl_secs: 86_400,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    schema_version: Option<u32>,
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub kdf: KdfSection,
    #[serde(default)]
    pub server: ServerSection,
}

pub fn config_path(override_path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = override_path {
        return Ok(path.to_path_buf());
    }

    if let Ok(path) = env::var(CONFIG_ENV) {
        return Ok(PathBuf::from(path));
    }

    let mut dir = config_dir().ok_or(ConfigError::ConfigDirUnavailable)?;
    dir.push(APP_DIR);
    dir.push(CONFIG_FILE_NAME);
    Ok(dir)
}

/// Load the config file. On first run the defaults are written out, so
/// there is always a file for the user to edit.
pub fn load(override_path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = config_path(override_path)?;
    let config = match fs::read_to_string(&path) {
        Ok(contents) => toml::from_str::<Config>(&contents).map_err(ConfigError::Parse)?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            let defaults = Config {
                schema_version: Some(CURRENT_SCHEMA_VERSION),
                ..Config::default()
            };
            save(&path, &defaults)?;
            defaults
        }
        Err(err) => return Err(ConfigError::Io(err)),
    };

    // Unversioned files predate the first versioned release; the schema is
    // additive, so they load unchanged.
    let version = config.schema_version.unwrap_or(0);
    if version > CURRENT_SCHEMA_VERSION {
        return Err(ConfigError::UnsupportedSchemaVersion(version));
    }
    Ok(config)
}

/// Atomically replace the config file: write a temp file in the same
/// directory, then rename over the target.
pub fn save(path: &Path, config: &Config) -> Result<(), ConfigError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(ConfigError::Io)?;

    let rendered = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;
    let mut temp = NamedTempFile::new_in(parent).map_err(ConfigError::Io)?;
    temp.write_all(rendered.as_bytes()).map_err(ConfigError::Io)?;
    temp.flush().map_err(ConfigError::Io)?;
    temp.persist(path).map_err(|err| ConfigError::Io(err.error))?;
    Ok(())
}

impl Config {
    pub fn data_dir(&self) -> Result<PathBuf, ConfigError> {
        if let Ok(dir) = env::var(DATA_DIR_ENV) {
            return Ok(PathBuf::from(dir));
        }
        if let Some(dir) = &self.client.data_dir {
            return Ok(dir.clone());
        }
        let mut dir = dirs::data_dir().ok_or(ConfigError::DataDirUnavailable)?;
        dir.push(APP_DIR);
        Ok(dir)
    }

    pub fn db_path(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.data_dir()?.join("client.db"))
    }

    pub fn session_path(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.data_dir()?.join("session.json"))
    }

    pub fn server_url(&self) -> String {
        env::var(SERVER_URL_ENV).unwrap_or_else(|_| self.client.server_url.clone())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.client.timeout_secs)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.client.sync_interval_secs)
    }

    pub fn kdf_params(&self) -> KdfParams {
        if env::var_os(TEST_KDF_ENV).is_some() {
            return KdfParams::for_tests();
        }
        KdfParams {
            memory_kib: self.kdf.memory_kib,
            iterations: self.kdf.iterations,
            parallelism: self.kdf.parallelism,
        }
    }

    pub fn kdf_floor(&self) -> KdfParams {
        KdfParams {
            memory_kib: self.kdf.floor_memory_kib,
            iterations: self.kdf.floor_iterations,
            parallelism: self.kdf.floor_parallelism,
        }
    }

    pub fn serve_options(&self, bind_override: Option<&str>) -> Result<ServeOptions, ConfigError> {
        let token_secret = env::var(TOKEN_SECRET_ENV)
            .ok()
            .or_else(|| self.server.token_secret.clone())
            .ok_or(ConfigError::MissingTokenSecret)?;

        let db_path = match &self.server.db_path {
            Some(path) => path.clone(),
            None => self.data_dir()?.join("server.db"),
        };

        Ok(ServeOptions {
            bind_addr: bind_override
                .map(str::to_string)
                .unwrap_or_else(|| self.server.bind_addr.clone()),
            db_path,
            token_secret,
            token_ttl_secs: self.server.token_ttl_secs,
        })
    }
}

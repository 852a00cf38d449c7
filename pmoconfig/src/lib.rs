//! # PMOPlayer Configuration Module
//!
//! This module provides configuration management for PMOPlayer, including:
//! - Loading configuration from YAML files
//! - Merging with embedded default configuration
//! - Environment variable overrides
//! - Type-safe getters and setters for configuration values
//! - Thread-safe singleton access pattern
//!
//! ## Usage
//!
//! ```no_run
//! use pmoconfig::get_config;
//!
//! let config = get_config();
//!
//! let threshold = config.get_resume_min_seconds()?;
//! config.set_swarm_ready_timeout_secs(45)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{Result, anyhow};
use dirs::home_dir;
use lazy_static::lazy_static;
use serde_yaml::{Mapping, Number, Value};
use std::{
    env, fs,
    path::Path,
    sync::{Arc, Mutex},
};
use tracing::info;

const DEFAULT_CONFIG: &str = include_str!("pmoplayer.yaml");

lazy_static! {
    static ref CONFIG: Arc<Config> =
        Arc::new(Config::load_config("").expect("Failed to load PMOPlayer configuration"));
}

const ENV_CONFIG_DIR: &str = "PMOPLAYER_CONFIG";
const ENV_PREFIX: &str = "PMOPLAYER_CONFIG__";

const DEFAULT_LOG_MIN_LEVEL: &str = "INFO";
const DEFAULT_LOG_ENABLE_CONSOLE: bool = true;
const DEFAULT_VOLUME: f64 = 1.0;
const DEFAULT_AUTOPLAY: bool = true;
const DEFAULT_RESUME_MIN_SECONDS: f64 = 5.0;
const DEFAULT_RESUME_FINISHED_RATIO: f64 = 0.95;
const DEFAULT_RESUME_WRITE_INTERVAL_SECS: f64 = 15.0;
const DEFAULT_RESUME_TTL_DAYS: u64 = 30;
const DEFAULT_SWARM_READY_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LIVE_RETRY_DELAY_MS: u64 = 500;
const DEFAULT_LIVE_EPG_TTL_SECS: u64 = 6 * 3600;
const DEFAULT_DOWNLOADS_DIRECTORY: &str = "downloads";

/// Macro to generate getter/setter for u64 values with default
macro_rules! impl_u64_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<u64> {
            match self.get_value($path) {
                Ok(Value::Number(n)) if n.is_u64() => Ok(n.as_u64().unwrap_or($default)),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, value: u64) -> Result<()> {
            self.set_value($path, Value::Number(Number::from(value)))
        }
    };
}

/// Macro to generate getter/setter for f64 values with default
///
/// Integers are accepted on read so that `min_seconds: 5` works as well as `5.0`.
macro_rules! impl_f64_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<f64> {
            match self.get_value($path) {
                Ok(Value::Number(n)) => Ok(n.as_f64().unwrap_or($default)),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, value: f64) -> Result<()> {
            if !value.is_finite() {
                return Err(anyhow!("{} must be a finite number", $path.join(".")));
            }
            self.set_value($path, Value::Number(Number::from(value)))
        }
    };
}

/// Macro to generate getter/setter for bool values with default
macro_rules! impl_bool_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<bool> {
            match self.get_value($path) {
                Ok(Value::Bool(b)) => Ok(b),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, value: bool) -> Result<()> {
            self.set_value($path, Value::Bool(value))
        }
    };
}

/// Configuration manager for PMOPlayer
///
/// The YAML tree is held in memory behind a mutex and written back to
/// `config.yaml` after every mutation.
#[derive(Debug)]
pub struct Config {
    config_dir: String,
    path: String,
    data: Mutex<Value>,
}

impl Clone for Config {
    fn clone(&self) -> Self {
        let data = self.data.lock().expect("Config mutex poisoned").clone();
        Self {
            config_dir: self.config_dir.clone(),
            path: self.path.clone(),
            data: Mutex::new(data),
        }
    }
}

impl Config {
    /// Finds a config directory by trying different locations in order
    fn find_config_dir(directory: &str) -> String {
        if !directory.is_empty() {
            return directory.to_string();
        }

        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load config from env");
            return env_path;
        }

        if Path::new(".pmoplayer").exists() {
            return ".pmoplayer".to_string();
        }

        if let Some(home) = home_dir() {
            let home_config = home.join(".pmoplayer");
            if home_config.exists() {
                return home_config.to_string_lossy().to_string();
            }
        }

        ".pmoplayer".to_string()
    }

    /// Creates the directory if needed and checks it is readable and writable
    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(anyhow!("{} is not a directory", path.display()));
        }

        let test_file = path.join(".write_test");
        fs::write(&test_file, b"test")?;
        fs::remove_file(&test_file)?;
        fs::read_dir(path)?;

        Ok(())
    }

    /// Determines and validates the configuration directory
    ///
    /// The directory is searched in the following order:
    /// 1. The provided `directory` parameter if not empty
    /// 2. The `PMOPLAYER_CONFIG` environment variable
    /// 3. `.pmoplayer` in the current directory
    /// 4. `.pmoplayer` in the user's home directory
    pub fn config_dir(directory: &str) -> Result<String> {
        let dir_path = Self::find_config_dir(directory);
        Self::validate_config_dir(Path::new(&dir_path))?;
        Ok(dir_path)
    }

    /// Loads the configuration from the specified directory
    ///
    /// The embedded defaults are merged with `config.yaml` when present, then
    /// `PMOPLAYER_CONFIG__SECTION__KEY=value` environment variables are
    /// applied and the merged tree is written back.
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::config_dir(directory)?;
        info!(config_dir = %config_dir, "Using config directory");

        let config_file_path = Path::new(&config_dir).join("config.yaml");
        let path = config_file_path.to_string_lossy().to_string();

        let mut default_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        let yaml_data = if let Ok(data) = fs::read(&path) {
            info!(config_file = %path, "Loaded config file");
            data
        } else {
            info!(config_file = %path, "Config file not found, using default embedded config");
            DEFAULT_CONFIG.as_bytes().to_vec()
        };

        let external_value: Value = serde_yaml::from_slice(&yaml_data)?;
        merge_yaml(&mut default_value, &external_value);
        let mut config_value = Self::lower_keys_value(default_value);

        Self::apply_env_overrides(&mut config_value);

        let config = Config {
            config_dir,
            path,
            data: Mutex::new(config_value),
        };

        config.save()?;
        Ok(config)
    }

    /// Directory holding `config.yaml`
    pub fn directory(&self) -> &str {
        &self.config_dir
    }

    /// Saves the current configuration to the config.yaml file
    pub fn save(&self) -> Result<()> {
        let data = self.data.lock().map_err(|_| anyhow!("Config mutex poisoned"))?;
        let yaml = serde_yaml::to_string(&*data)?;
        fs::write(&self.path, yaml)?;
        Ok(())
    }

    /// Sets a configuration value at the specified path and saves it
    ///
    /// Intermediate mappings are created as needed. Keys are lowercased.
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        {
            let mut data = self.data.lock().map_err(|_| anyhow!("Config mutex poisoned"))?;
            Self::set_value_internal(&mut data, path, value)?;
        }
        self.save()
    }

    fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
        if path.is_empty() {
            *data = value;
            return Ok(());
        }
        if let Value::Mapping(map) = data {
            let key_value = Value::String(path[0].to_lowercase());
            if path.len() == 1 {
                map.insert(key_value, value);
            } else {
                let entry = map
                    .entry(key_value)
                    .or_insert(Value::Mapping(Mapping::new()));
                Self::set_value_internal(entry, &path[1..], value)?;
            }
            Ok(())
        } else {
            Err(anyhow!("Current node is not a map"))
        }
    }

    /// Removes the value at the specified path and saves the configuration
    ///
    /// Returns `true` when something was removed. A missing path is not an
    /// error.
    pub fn remove_value(&self, path: &[&str]) -> Result<bool> {
        let removed = {
            let mut data = self.data.lock().map_err(|_| anyhow!("Config mutex poisoned"))?;
            Self::remove_value_internal(&mut data, path)
        };
        if removed {
            self.save()?;
        }
        Ok(removed)
    }

    fn remove_value_internal(data: &mut Value, path: &[&str]) -> bool {
        let Some((last, parents)) = path.split_last() else {
            return false;
        };
        let mut current = data;
        for key in parents {
            match current {
                Value::Mapping(map) => match map.get_mut(&Value::String(key.to_lowercase())) {
                    Some(next) => current = next,
                    None => return false,
                },
                _ => return false,
            }
        }
        match current {
            Value::Mapping(map) => map.remove(&Value::String(last.to_lowercase())).is_some(),
            _ => false,
        }
    }

    /// Gets a configuration value at the specified path
    ///
    /// Returns an error if the path doesn't exist.
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.data.lock().map_err(|_| anyhow!("Config mutex poisoned"))?;
        Self::get_value_internal(&data, path)
    }

    fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
        let mut current = data;
        for (i, key) in path.iter().enumerate() {
            if let Value::Mapping(map) = current {
                match map.get(&Value::String(key.to_lowercase())) {
                    Some(next) => current = next,
                    None => return Err(anyhow!("Path {} does not exist", path[..=i].join("."))),
                }
            } else {
                return Err(anyhow!("Path {} is not a mapping", path[..i].join(".")));
            }
        }
        Ok(current.clone())
    }

    fn apply_env_overrides(config: &mut Value) {
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                let key_path = stripped.split("__").collect::<Vec<_>>();
                let yaml_value = Self::convert_env_value(&value);
                let _ = Self::set_value_internal(config, &key_path, yaml_value);
            }
        }
    }

    fn convert_env_value(value: &str) -> Value {
        serde_yaml::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()))
    }

    fn lower_keys_value(value: Value) -> Value {
        match value {
            Value::Mapping(map) => {
                let mut new_map = Mapping::new();
                for (k, v) in map {
                    let key = match k {
                        Value::String(s) => Value::String(s.to_lowercase()),
                        other => other,
                    };
                    new_map.insert(key, Self::lower_keys_value(v));
                }
                Value::Mapping(new_map)
            }
            Value::Sequence(seq) => {
                Value::Sequence(seq.into_iter().map(Self::lower_keys_value).collect())
            }
            _ => value,
        }
    }

    /// Resolves a directory relative to the config directory and creates it
    fn resolve_and_create_dir(&self, dir_path: &str) -> Result<String> {
        let path = Path::new(dir_path);
        let absolute_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.config_dir).join(path)
        };

        if !absolute_path.exists() {
            fs::create_dir_all(&absolute_path)?;
            info!(directory = %absolute_path.display(), "Created managed directory");
        }

        Ok(absolute_path.to_string_lossy().to_string())
    }

    /// Returns a directory managed by the configuration
    ///
    /// The configured value may be absolute or relative to the configuration
    /// directory. When the key is missing, `default` is persisted and used.
    /// The directory is created if it does not exist.
    pub fn get_managed_dir(&self, path: &[&str], default: &str) -> Result<String> {
        let dir_path = match self.get_value(path) {
            Ok(Value::String(s)) => s,
            _ => {
                self.set_managed_dir(path, default.to_string())?;
                default.to_string()
            }
        };
        self.resolve_and_create_dir(&dir_path)
    }

    pub fn set_managed_dir(&self, path: &[&str], directory: String) -> Result<()> {
        self.set_value(path, Value::String(directory))
    }

    impl_bool_config!(
        get_log_enable_console,
        set_log_enable_console,
        &["host", "logger", "enable_console"],
        DEFAULT_LOG_ENABLE_CONSOLE
    );

    /// Minimum log level (`TRACE`, `DEBUG`, `INFO`, `WARN`, `ERROR`)
    pub fn get_log_min_level(&self) -> Result<String> {
        match self.get_value(&["host", "logger", "min_level"]) {
            Ok(Value::String(s)) => Ok(s),
            _ => Ok(DEFAULT_LOG_MIN_LEVEL.to_string()),
        }
    }

    pub fn set_log_min_level(&self, level: String) -> Result<()> {
        self.set_value(&["host", "logger", "min_level"], Value::String(level))
    }

    impl_f64_config!(
        get_initial_volume,
        set_initial_volume,
        &["player", "volume"],
        DEFAULT_VOLUME
    );

    impl_bool_config!(
        get_autoplay,
        set_autoplay,
        &["player", "autoplay"],
        DEFAULT_AUTOPLAY
    );

    impl_f64_config!(
        get_resume_min_seconds,
        set_resume_min_seconds,
        &["player", "resume", "min_seconds"],
        DEFAULT_RESUME_MIN_SECONDS
    );

    impl_f64_config!(
        get_resume_finished_ratio,
        set_resume_finished_ratio,
        &["player", "resume", "finished_ratio"],
        DEFAULT_RESUME_FINISHED_RATIO
    );

    impl_f64_config!(
        get_resume_write_interval_secs,
        set_resume_write_interval_secs,
        &["player", "resume", "write_interval_secs"],
        DEFAULT_RESUME_WRITE_INTERVAL_SECS
    );

    impl_u64_config!(
        get_resume_ttl_days,
        set_resume_ttl_days,
        &["player", "resume", "ttl_days"],
        DEFAULT_RESUME_TTL_DAYS
    );

    impl_u64_config!(
        get_swarm_ready_timeout_secs,
        set_swarm_ready_timeout_secs,
        &["player", "swarm", "ready_timeout_secs"],
        DEFAULT_SWARM_READY_TIMEOUT_SECS
    );

    impl_u64_config!(
        get_live_retry_delay_ms,
        set_live_retry_delay_ms,
        &["player", "live", "retry_delay_ms"],
        DEFAULT_LIVE_RETRY_DELAY_MS
    );

    impl_u64_config!(
        get_live_epg_ttl_secs,
        set_live_epg_ttl_secs,
        &["player", "live", "epg_ttl_secs"],
        DEFAULT_LIVE_EPG_TTL_SECS
    );

    /// Proxy URL templates tried, in order, when a live manifest fails to load
    ///
    /// Each template contains a `{url}` placeholder. An empty list disables
    /// the fallback.
    pub fn get_live_proxies(&self) -> Result<Vec<String>> {
        match self.get_value(&["player", "live", "proxies"]) {
            Ok(Value::Sequence(seq)) => Ok(seq
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) if !s.trim().is_empty() => Some(s),
                    _ => None,
                })
                .collect()),
            _ => Ok(Vec::new()),
        }
    }

    pub fn set_live_proxies(&self, proxies: &[String]) -> Result<()> {
        let seq = proxies.iter().cloned().map(Value::String).collect();
        self.set_value(&["player", "live", "proxies"], Value::Sequence(seq))
    }

    /// Directory where materialized swarm files are saved (created on demand)
    pub fn get_downloads_dir(&self) -> Result<String> {
        self.get_managed_dir(
            &["player", "downloads", "directory"],
            DEFAULT_DOWNLOADS_DIRECTORY,
        )
    }
}

/// Returns the global configuration instance
///
/// The configuration is lazily loaded on first access.
pub fn get_config() -> Arc<Config> {
    CONFIG.clone()
}

/// Merges external YAML configuration into default configuration
///
/// Mappings are merged key by key; scalars and sequences from `external`
/// replace the default ones.
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(),
    }
}

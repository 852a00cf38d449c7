//! Initialisation du logging (tracing-subscriber)
//!
//! Le niveau minimal vient de `host.logger.min_level` et peut être modifié à
//! chaud via [`LogHandle::set_level`]. Si `RUST_LOG` est défini, il sert de
//! filtre supplémentaire par cible.

use anyhow::anyhow;
use tracing::Level;
use tracing_subscriber::{
    EnvFilter, Registry, filter::LevelFilter, layer::SubscriberExt, reload,
    util::SubscriberInitExt,
};

use crate::error::{Error, Result};

/// Permet de changer le niveau de log après l'initialisation
#[derive(Clone)]
pub struct LogHandle {
    reload_handle: reload::Handle<LevelFilter, Registry>,
}

impl LogHandle {
    pub fn set_level(&self, level: &str) -> Result<()> {
        let filter = parse_level(level)
            .map(LevelFilter::from_level)
            .ok_or_else(|| Error::Config(anyhow!("unknown log level {level}")))?;
        self.reload_handle
            .modify(|f| *f = filter)
            .map_err(|e| Error::Config(anyhow!("log level reload failed: {e}")))
    }
}

pub fn parse_level(level: &str) -> Option<Level> {
    match level.trim().to_uppercase().as_str() {
        "TRACE" => Some(Level::TRACE),
        "DEBUG" => Some(Level::DEBUG),
        "INFO" => Some(Level::INFO),
        "WARN" | "WARNING" => Some(Level::WARN),
        "ERROR" => Some(Level::ERROR),
        _ => None,
    }
}

/// Initialise le logging à partir de la configuration globale
pub fn init_logging() -> Result<LogHandle> {
    let config = pmoconfig::get_config();
    let level = config.get_log_min_level().unwrap_or_else(|_| "INFO".to_string());
    let console = config.get_log_enable_console().unwrap_or(true);
    init_logging_with(&level, console)
}

/// Initialise le logging avec un niveau explicite
///
/// Échoue si un subscriber global est déjà installé.
pub fn init_logging_with(level: &str, console: bool) -> Result<LogHandle> {
    let filter = parse_level(level)
        .map(LevelFilter::from_level)
        .unwrap_or(LevelFilter::INFO);
    let (filter, reload_handle) = reload::Layer::new(filter);

    let env_filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok());

    let subscriber = Registry::default().with(filter).with(env_filter);
    let installed = if console {
        subscriber
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(true),
            )
            .try_init()
    } else {
        subscriber.try_init()
    };
    installed.map_err(|e| Error::Config(anyhow!("logging already initialised: {e}")))?;

    Ok(LogHandle { reload_handle })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("info"), Some(Level::INFO));
        assert_eq!(parse_level(" Warning "), Some(Level::WARN));
        assert_eq!(parse_level("verbose"), None);
    }

    #[test]
    fn test_second_init_is_a_config_error() {
        let first = init_logging_with("debug", false);
        let second = init_logging_with("info", false);
        assert!(matches!(second, Err(Error::Config(_))));

        if let Ok(handle) = first {
            assert!(matches!(handle.set_level("loud"), Err(Error::Config(_))));
            handle.set_level("warn").unwrap();
        }
    }
}

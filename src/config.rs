//! Process configuration read from the environment.
//!
//! Every setting has a default. Unset variables fall back and are listed in
//! [`Config::defaulted`]; malformed ones are reported as [`AppError::Config`].

use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use tracing::{info, warn};

use crate::error::AppError;

const DEFAULT_BIND: &str = "0.0.0.0";
const DEFAULT_PORT: &str = "5000";
const DEFAULT_DATA_DIR: &str = "./data";

/// Database file name inside the data directory.
pub const DB_FILE_NAME: &str = "ledger.db";

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    /// Variables that were unset, with the default used in their place.
    pub defaulted: Vec<(&'static str, String)>,
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        let mut defaulted = Vec::new();
        let bind: String = try_load("LEDGER_BIND", DEFAULT_BIND, &mut defaulted)?;
        let port: u16 = try_load("LEDGER_PORT", DEFAULT_PORT, &mut defaulted)?;
        let data_dir = PathBuf::from(try_load::<String>(
            "LEDGER_DATA_DIR",
            DEFAULT_DATA_DIR,
            &mut defaulted,
        )?);
        let log_dir = match var("LEDGER_LOG_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => {
                let dir = data_dir.join("logs");
                defaulted.push(("LEDGER_LOG_DIR", dir.display().to_string()));
                dir
            }
        };

        Ok(Self {
            bind,
            port,
            data_dir,
            log_dir,
            defaulted,
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }

    /// Log the resolved settings. `load` runs before the subscriber exists,
    /// so this is called once logging is installed.
    pub fn log_resolved(&self) {
        for (key, default) in &self.defaulted {
            info!("{key} not set, using default: {default}");
        }
        info!(
            address = %self.address(),
            data_dir = %self.data_dir.display(),
            log_dir = %self.log_dir.display(),
            "Configuration loaded"
        );
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn try_load<T: FromStr>(
    key: &'static str,
    default: &str,
    defaulted: &mut Vec<(&'static str, String)>,
) -> Result<T, AppError>
where
    T::Err: Display,
{
    let raw = var(key).unwrap_or_else(|| {
        defaulted.push((key, default.to_string()));
        default.to_string()
    });

    raw.parse().map_err(|e| {
        warn!("Invalid {key} value: {e}");
        AppError::Config(format!("{key}={raw}: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "LEDGER_BIND",
            "LEDGER_PORT",
            "LEDGER_DATA_DIR",
            "LEDGER_LOG_DIR",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_when_unset() {
        clear_env();
        let config = Config::load().expect("defaults load");
        assert_eq!(config.port, 5000);
        assert_eq!(config.bind, "0.0.0.0");
        assert_eq!(config.db_path(), PathBuf::from("./data").join(DB_FILE_NAME));
        assert_eq!(config.log_dir, PathBuf::from("./data").join("logs"));

        let keys: Vec<&str> = config.defaulted.iter().map(|(key, _)| *key).collect();
        assert_eq!(
            keys,
            ["LEDGER_BIND", "LEDGER_PORT", "LEDGER_DATA_DIR", "LEDGER_LOG_DIR"]
        );
        assert!(config
            .defaulted
            .contains(&("LEDGER_PORT", "5000".to_string())));
    }

    #[test]
    #[serial]
    fn test_overrides_are_applied() {
        clear_env();
        env::set_var("LEDGER_PORT", "8080");
        env::set_var("LEDGER_DATA_DIR", "/var/lib/ledger");
        env::set_var("LEDGER_LOG_DIR", "/var/log/ledger");

        let config = Config::load().expect("load");
        assert_eq!(config.port, 8080);
        assert_eq!(config.address(), "0.0.0.0:8080");
        assert_eq!(config.db_path(), PathBuf::from("/var/lib/ledger/ledger.db"));
        assert_eq!(config.log_dir, PathBuf::from("/var/log/ledger"));
        assert_eq!(config.defaulted, vec![("LEDGER_BIND", "0.0.0.0".to_string())]);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_malformed_port_is_an_error() {
        clear_env();
        env::set_var("LEDGER_PORT", "not-a-port");
        let err = Config::load().expect_err("bad port must fail");
        assert!(matches!(err, AppError::Config(_)));
        clear_env();
    }
}

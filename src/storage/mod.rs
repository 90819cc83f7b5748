use std::fs;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::collections::SuiteDocument;
use crate::config::Config;
use crate::error::ConfigError;

pub fn load_suite(path: &Path) -> Result<SuiteDocument, ConfigError> {
    read_json(path)
}

/// Config file values on top of the defaults. Environment overrides are
/// applied by the caller.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    read_json(path)
}

pub fn save_report<T: Serialize>(path: &Path, report: &T) -> Result<(), ConfigError> {
    let write_error = |source| ConfigError::Write {
        path: path.display().to_string(),
        source,
    };

    let raw = serde_json::to_string_pretty(report).map_err(|e| write_error(std::io::Error::other(e)))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_error)?;
    }
    fs::write(path, raw).map_err(write_error)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

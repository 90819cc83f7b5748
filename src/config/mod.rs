//! # Configuration
//!
//! Run settings resolved once at startup and passed explicitly to the
//! runner. Values come from defaults, then an optional JSON file, then the
//! environment:
//!
//! | Variable | Field | Default |
//! |----------|-------|---------|
//! | `GATEWAY_URL` | `gateway_url` | `http://127.0.0.1:8080` |
//! | `SUBDOMAIN_GATEWAY_URL` | `subdomain_gateway_url` | unset |
//! | `TEST_SKIPS` | `skips` (JSON array) | `[]` |
//! | `CONFORMANCE_TIMEOUT_SECS` | `timeout_secs` | `30` |
//! | `CONFORMANCE_PARALLELISM` | `parallelism` | `8` |
//! | `SPECS` | `specs` (see [`crate::specs`]) | mature specs |

use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::specs::{SPECS_VAR, SpecCatalog, SpecFilter};
use crate::testing::skips::SkipFilter;

pub const GATEWAY_URL_VAR: &str = "GATEWAY_URL";
pub const SUBDOMAIN_GATEWAY_URL_VAR: &str = "SUBDOMAIN_GATEWAY_URL";
pub const SKIPS_VAR: &str = "TEST_SKIPS";
pub const TIMEOUT_VAR: &str = "CONFORMANCE_TIMEOUT_SECS";
pub const PARALLELISM_VAR: &str = "CONFORMANCE_PARALLELISM";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub gateway_url: String,
    pub subdomain_gateway_url: Option<String>,
    pub skips: Vec<String>,
    pub timeout_secs: u64,
    pub parallelism: usize,
    /// Spec selection, e.g. `path-gateway,-subdomain-gateway`.
    pub specs: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            gateway_url: "http://127.0.0.1:8080".to_string(),
            subdomain_gateway_url: None,
            skips: Vec::new(),
            timeout_secs: 30,
            parallelism: 8,
            specs: String::new(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env(|key| std::env::var(key).ok())
    }

    /// Override fields from the variables `lookup` knows about.
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(GATEWAY_URL_VAR) {
            self.gateway_url = url;
        }
        if let Some(url) = lookup(SUBDOMAIN_GATEWAY_URL_VAR).filter(|u| !u.is_empty()) {
            self.subdomain_gateway_url = Some(url);
        }
        if let Some(raw) = lookup(SKIPS_VAR).filter(|s| !s.trim().is_empty()) {
            self.skips = serde_json::from_str(&raw).map_err(|err| ConfigError::InvalidValue {
                key: SKIPS_VAR.to_string(),
                value: raw.clone(),
                reason: err.to_string(),
            })?;
        }
        if let Some(raw) = lookup(TIMEOUT_VAR) {
            self.timeout_secs = parse_number(TIMEOUT_VAR, &raw)?;
        }
        if let Some(raw) = lookup(PARALLELISM_VAR) {
            self.parallelism = parse_number(PARALLELISM_VAR, &raw)?;
        }
        if let Some(selection) = lookup(SPECS_VAR) {
            self.specs = selection;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.gateway()?;
        self.subdomain_host()?;
        if self.timeout_secs == 0 {
            return Err(invalid("timeoutSecs", "0", "must be at least 1"));
        }
        if self.parallelism == 0 {
            return Err(invalid("parallelism", "0", "must be at least 1"));
        }
        SkipFilter::new(&self.skips)?;
        self.spec_filter()?;
        Ok(())
    }

    pub fn spec_filter(&self) -> Result<SpecFilter, ConfigError> {
        SpecFilter::new(SpecCatalog::default(), &self.specs)
    }

    pub fn gateway(&self) -> Result<Url, ConfigError> {
        parse_url("gatewayUrl", &self.gateway_url)
    }

    /// Host of the virtual-host gateway, without port.
    pub fn subdomain_host(&self) -> Result<Option<String>, ConfigError> {
        let Some(raw) = self.subdomain_gateway_url.as_deref() else {
            return Ok(None);
        };
        let url = parse_url("subdomainGatewayUrl", raw)?;
        Ok(url.host_str().map(str::to_string))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn parse_url(key: &str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim_end_matches('/'))
        .map_err(|err| invalid(key, raw, &err.to_string()))?;
    if url.host_str().is_none() {
        return Err(invalid(key, raw, "URL has no host"));
    }
    Ok(url)
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|err: T::Err| invalid(key, raw, &err.to_string()))
}

fn invalid(key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

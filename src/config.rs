//! Configuration: TOML file with environment overrides.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::models::AddressLevel;

/// Reference-number lookup endpoint
pub const ESB_URL_ENV: &str = "KEPCO_ESB_SEARCH_URL";
/// Overrides `service.base_url`
pub const BASE_URL_ENV: &str = "KEPCO_BASE_URL";

pub const DEFAULT_BASE_URL: &str = "https://online.kepco.co.kr";
pub const DEFAULT_REFERER: &str = "https://online.kepco.co.kr/EWM092D00";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0";
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub reference_lookup: ReferenceLookupConfig,
    pub cascade: CascadeConfig,
    /// Calls issued once before the first address request
    pub preflight: Vec<PreflightCall>,
}

/// The address service and the fixed request headers it validates.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub base_url: String,
    pub referer: String,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            referer: DEFAULT_REFERER.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ReferenceLookupConfig {
    /// Absolute URL; the feature is disabled when unset
    pub url: Option<String>,
    pub submission_id: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CascadeConfig {
    /// Levels that always offer the "other region" choice
    pub sentinel_levels: Vec<AddressLevel>,
    /// Values preselected when a new cascade starts
    pub defaults: DefaultSelection,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            sentinel_levels: vec![
                AddressLevel::City,
                AddressLevel::District,
                AddressLevel::Town,
                AddressLevel::Village,
            ],
            defaults: DefaultSelection::default(),
        }
    }
}

impl CascadeConfig {
    pub fn injects_sentinel(&self, level: AddressLevel) -> bool {
        self.sentinel_levels.contains(&level)
    }
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct DefaultSelection {
    pub province: Option<String>,
    pub city: Option<String>,
    pub district: Option<String>,
    pub town: Option<String>,
    pub village: Option<String>,
    pub lot: Option<String>,
}

impl DefaultSelection {
    pub fn get(&self, level: AddressLevel) -> Option<&str> {
        match level {
            AddressLevel::Province => self.province.as_deref(),
            AddressLevel::City => self.city.as_deref(),
            AddressLevel::District => self.district.as_deref(),
            AddressLevel::Town => self.town.as_deref(),
            AddressLevel::Village => self.village.as_deref(),
            AddressLevel::Lot => self.lot.as_deref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        AddressLevel::all().iter().all(|l| self.get(*l).is_none())
    }
}

/// A handshake call (environment or SSO check) made before the address sequence.
#[derive(Debug, Deserialize, Clone)]
pub struct PreflightCall {
    /// Path relative to `service.base_url`, or an absolute URL
    pub path: String,
    pub submission_id: Option<String>,
    #[serde(default = "empty_object")]
    pub body: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Load the optional file, apply environment overrides and validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup. Blank values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(url) = non_blank(ESB_URL_ENV) {
            debug!("Reference lookup URL taken from {}", ESB_URL_ENV);
            self.reference_lookup.url = Some(url);
        }
        if let Some(url) = non_blank(BASE_URL_ENV) {
            debug!("Service base URL taken from {}", BASE_URL_ENV);
            self.service.base_url = url;
        }
    }

    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.service.base_url)
            .with_context(|| format!("Invalid service.base_url: {}", self.service.base_url))?;

        if let Some(url) = &self.reference_lookup.url {
            url::Url::parse(url)
                .with_context(|| format!("Invalid reference lookup URL: {}", url))?;
        }

        if self.service.timeout_secs == 0 {
            bail!("service.timeout_secs must be positive");
        }

        for level in &self.cascade.sentinel_levels {
            if matches!(level, AddressLevel::Province | AddressLevel::Lot) {
                bail!("cascade.sentinel_levels cannot include {}", level);
            }
        }
        Ok(())
    }
}

//! Configuration Module
//! Region map settings, valid years and data locations, loaded once from TOML.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Geographic map center in degrees.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub struct MapCenter {
    pub lat: f64,
    pub lon: f64,
}

/// Map placement for one region.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RegionConfig {
    pub center: MapCenter,
    pub zoom: f64,
}

/// Where the pre-processed tables and boundary files live.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_boundary_dir")]
    pub boundary_dir: PathBuf,
    /// Feature property holding the postcode sector name.
    #[serde(default = "default_boundary_key")]
    pub boundary_key: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            boundary_dir: default_boundary_dir(),
            boundary_key: default_boundary_key(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("processed_data")
}

fn default_boundary_dir() -> PathBuf {
    PathBuf::from("GeoJSON/regions")
}

fn default_boundary_key() -> String {
    "name".to_string()
}

fn default_region() -> String {
    "South East".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_region")]
    pub default_region: String,
    pub default_year: Option<i32>,
    pub years: Vec<i32>,
    #[serde(default)]
    pub data: DataConfig,
    pub regions: BTreeMap<String, RegionConfig>,
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&content)?;

        // Relative data locations are relative to the config file, not the cwd
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }

        Ok(config)
    }

    /// Parse and validate a configuration document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: AppConfig = toml::from_str(content)?;
        config.years.sort_unstable();
        config.years.dedup();
        config.validate()?;
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        if self.data.data_dir.is_relative() {
            self.data.data_dir = base.join(&self.data.data_dir);
        }
        if self.data.boundary_dir.is_relative() {
            self.data.boundary_dir = base.join(&self.data.boundary_dir);
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.regions.is_empty() {
            return Err(ConfigError::Invalid("no regions configured".into()));
        }
        if self.years.is_empty() {
            return Err(ConfigError::Invalid("no years configured".into()));
        }
        if self.data.boundary_key.trim().is_empty() {
            return Err(ConfigError::Invalid("boundary_key must not be empty".into()));
        }

        for (name, region) in &self.regions {
            let MapCenter { lat, lon } = region.center;
            if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
                return Err(ConfigError::Invalid(format!(
                    "region '{}' has center out of range: ({}, {})",
                    name, lat, lon
                )));
            }
            if !region.zoom.is_finite() || region.zoom < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "region '{}' has invalid zoom {}",
                    name, region.zoom
                )));
            }
        }

        if !self.regions.contains_key(&self.default_region) {
            return Err(ConfigError::Invalid(format!(
                "default region '{}' is not configured",
                self.default_region
            )));
        }
        if let Some(year) = self.default_year {
            if !self.has_year(year) {
                return Err(ConfigError::Invalid(format!(
                    "default year {} is not in the year list",
                    year
                )));
            }
        }

        Ok(())
    }

    pub fn region(&self, name: &str) -> Option<&RegionConfig> {
        self.regions.get(name)
    }

    pub fn region_names(&self) -> impl Iterator<Item = &str> {
        self.regions.keys().map(String::as_str)
    }

    pub fn has_year(&self, year: i32) -> bool {
        self.years.binary_search(&year).is_ok()
    }

    /// Configured default year, falling back to the most recent one.
    pub fn default_year(&self) -> i32 {
        self.default_year
            .or_else(|| self.years.last().copied())
            .unwrap_or_default()
    }
}

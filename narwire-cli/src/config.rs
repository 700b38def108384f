// SPDX-FileCopyrightText: 2025 Jörg Thalheim
// SPDX-License-Identifier: MIT

use std::fmt::Display;
use std::fs::read_to_string;
use std::path::Path;
use std::str::FromStr;

use narwire_utils_base_encoding::Base;
use narwire_utils_hash::Algorithm;
use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::error::{ConfigError, Result};

pub(crate) const CONFIG_ENV: &str = "NARWIRE_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "narwire.toml";

fn default_hash_algorithms() -> Vec<Algorithm> {
    vec![Algorithm::SHA256]
}

fn default_vcs_type() -> String {
    "git".into()
}

fn default_log_level() -> String {
    "info".into()
}

fn from_str<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    String::deserialize(deserializer)?
        .parse()
        .map_err(serde::de::Error::custom)
}

/// Defaults for the `nar` commands; flags given on the command line win.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub(crate) struct Config {
    #[serde(default = "default_hash_algorithms")]
    pub(crate) hash_algorithms: Vec<Algorithm>,

    #[serde(default)]
    pub(crate) exclude_vcs: bool,

    #[serde(default = "default_vcs_type")]
    pub(crate) vcs_type: String,

    #[serde(default, deserialize_with = "from_str")]
    pub(crate) output_format: Base,

    /// Filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub(crate) log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            hash_algorithms: default_hash_algorithms(),
            exclude_vcs: false,
            vcs_type: default_vcs_type(),
            output_format: Base::default(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    pub(crate) fn load(settings_file: &Path) -> Result<Config> {
        let contents = read_to_string(settings_file).map_err(|e| ConfigError::ReadFile {
            path: settings_file.display().to_string(),
            source: e,
        })?;
        let config = Self::parse(&contents)?;
        debug!(path = %settings_file.display(), "loaded configuration");
        Ok(config)
    }

    fn parse(contents: &str) -> std::result::Result<Config, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        if config.hash_algorithms.is_empty() {
            return Err(ConfigError::Invalid {
                reason: "hash_algorithms must name at least one algorithm".to_owned(),
            });
        }
        Ok(config)
    }
}

pub(crate) fn load() -> Result<Config> {
    match std::env::var(CONFIG_ENV) {
        Err(_) => {
            if Path::new(DEFAULT_CONFIG_FILE).exists() {
                Config::load(Path::new(DEFAULT_CONFIG_FILE))
            } else {
                Ok(Config::default())
            }
        }
        Ok(settings_file) => Config::load(Path::new(&settings_file)),
    }
}

// Copyright (C) 2025 Joseph Sacchini
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU Affero General Public License as published by the Free
// Software Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more
// details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use wgdesk_conf::store::validate_interface_name;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/wgdesk/wgdesk.toml";

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WgdeskToml {
    /// Directory holding `<interface>.conf` files.
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,

    /// Interface used when `--interface` is not given.
    #[serde(default = "default_interface")]
    pub default_interface: String,
}

impl Default for WgdeskToml {
    fn default() -> Self {
        Self {
            config_dir: default_config_dir(),
            default_interface: default_interface(),
        }
    }
}

fn default_config_dir() -> PathBuf {
    PathBuf::from("/etc/wireguard")
}

fn default_interface() -> String {
    "wg0".to_string()
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid default interface: {0:?}")]
    InvalidInterface(String),
}

pub async fn load(path: &Path) -> Result<WgdeskToml, ConfigError> {
    debug!(path = %path.display(), "loading config");

    let config = match tokio::fs::read_to_string(path).await {
        Ok(contents) => {
            let config: WgdeskToml = toml::from_str(&contents)?;
            info!(
                path = %path.display(),
                config_dir = %config.config_dir.display(),
                default_interface = %config.default_interface,
                "loaded config"
            );
            config
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, using defaults");
            WgdeskToml::default()
        }
        Err(e) => return Err(ConfigError::Read(e)),
    };

    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &WgdeskToml) -> Result<(), ConfigError> {
    validate_interface_name(&config.default_interface)
        .map_err(|_| ConfigError::InvalidInterface(config.default_interface.clone()))
}

//! Startup configuration: runtime settings and the gimbal directory.
//!
//! Both are plain JSON files. Settings fall back to defaults field by field;
//! the directory maps a human-readable gimbal name to its protocol address.

use crate::{
    constants::*,
    controller::ControllerOptions,
    error::ConfigError,
    types::{Address, DiagonalMode, Speed},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub port: String,
    pub baud_rate: u32,
    pub timeout_ms: u64,
    pub repeat_interval_ms: u64,
    pub initial_speed: u8,
    pub hold_mode: bool,
    pub diagonal: DiagonalMode,
    pub directory: PathBuf,
    pub default_gimbal: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            port: DEFAULT_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            repeat_interval_ms: REPEAT_INTERVAL_MS,
            initial_speed: DEFAULT_SPEED,
            hold_mode: false,
            diagonal: DiagonalMode::default(),
            directory: PathBuf::from(DEFAULT_DIRECTORY_FILE),
            default_gimbal: None,
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_json(&read(path)?, &path.display().to_string())
    }

    pub fn from_json(text: &str, origin: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            origin: origin.to_string(),
            source,
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn repeat_interval(&self) -> Duration {
        // A zero interval would spin the control loop
        Duration::from_millis(self.repeat_interval_ms.max(1))
    }

    pub fn controller_options(&self, address: Address) -> ControllerOptions {
        ControllerOptions {
            address,
            speed: Speed::new(self.initial_speed),
            hold_mode: self.hold_mode,
            diagonal: self.diagonal,
            repeat_interval: self.repeat_interval(),
        }
    }
}

/// Gimbal name to address table, loaded once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Directory {
    gimbals: BTreeMap<String, Address>,
}

impl Directory {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_json(&read(path)?, &path.display().to_string())
    }

    pub fn from_json(text: &str, origin: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            origin: origin.to_string(),
            source,
        })
    }

    pub fn lookup(&self, name: &str) -> Result<Address, ConfigError> {
        self.gimbals
            .get(name)
            .copied()
            .ok_or_else(|| ConfigError::UnknownGimbal(name.to_string()))
    }

    /// The gimbal selected at startup: `preferred` if given, otherwise the
    /// first name in sorted order.
    pub fn initial(&self, preferred: Option<&str>) -> Result<(String, Address), ConfigError> {
        if let Some(name) = preferred {
            return Ok((name.to_string(), self.lookup(name)?));
        }
        self.gimbals
            .iter()
            .next()
            .map(|(name, address)| (name.clone(), *address))
            .ok_or(ConfigError::EmptyDirectory)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.gimbals.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.gimbals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gimbals.is_empty()
    }
}

impl FromIterator<(String, Address)> for Directory {
    fn from_iter<I: IntoIterator<Item = (String, Address)>>(iter: I) -> Self {
        Directory {
            gimbals: iter.into_iter().collect(),
        }
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

//! Registry configuration, read from `odm.toml`.

use crate::{OdmError, OdmResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Tunables for an [`Odm`](crate::Odm) registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OdmConfig {
    /// Snapshot file the CLI opens when `--snapshot` is not given.
    pub snapshot_path: Option<PathBuf>,
    /// Declare unique indexes to the backend on registration.
    pub backend_unique_indexes: bool,
    /// Clear a single reference field when its target is gone.
    pub heal_dangling_refs: bool,
    /// strftime format for datetimes in `as_jsonable`; RFC 3339 when unset.
    pub datetime_format: Option<String>,
}

impl Default for OdmConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            backend_unique_indexes: true,
            heal_dangling_refs: true,
            datetime_format: None,
        }
    }
}

impl OdmConfig {
    /// Parses a TOML document, failing on unknown shapes.
    pub fn from_toml_str(contents: &str) -> OdmResult<Self> {
        let config: Self = toml::from_str(contents).map_err(|e| OdmError::Config(e.to_string()))?;
        if let Some(format) = &config.datetime_format {
            crate::field::format_datetime(&chrono::DateTime::<chrono::Utc>::UNIX_EPOCH, format)
                .map_err(|e| OdmError::Config(e.to_string()))?;
        }
        Ok(config)
    }

    /// Loads configuration from `path`.
    /// Falls back to defaults when the file is missing, unreadable or malformed.
    pub fn load_from(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            info!("No config file found at {:?}, using defaults", path);
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(contents) => match Self::from_toml_str(&contents) {
                Ok(config) => {
                    info!("Loaded ODM config from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!(
                        "Failed to parse config file {:?}: {}. Falling back to defaults.",
                        path, e
                    );
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read config file {:?}: {}", path, e);
                Self::default()
            }
        }
    }
}

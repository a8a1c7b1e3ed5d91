//! Library location configuration.
//!
//! The process-wide manager ([`LibraryManager::instance`](crate::LibraryManager::instance))
//! finds the engine module in this order:
//! 1. A path set explicitly on the process (see
//!    [`LibraryManager::set_library_path`](crate::LibraryManager::set_library_path)).
//! 2. The `SEVENZIP_LIBRARY_PATH` environment variable.
//! 3. The platform default file name next to the running executable.
//!
//! A configuration file is never read implicitly. Load one with
//! [`load_config`] and build a manager from it with
//! [`LibraryManager::from_config`](crate::LibraryManager::from_config), or
//! pass its path to `set_library_path`.

use crate::error::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the engine location.
pub const LIBRARY_PATH_ENV: &str = "SEVENZIP_LIBRARY_PATH";

/// Where to find the engine module.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Full path to the engine module.
    #[serde(alias = "7zLocation")]
    pub library_path: Option<PathBuf>,
}

impl LibraryConfig {
    /// Configuration with an explicit module path.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            library_path: Some(path.into()),
        }
    }

    /// Replace the configured path with `SEVENZIP_LIBRARY_PATH` when it is set.
    pub fn with_env_override(mut self) -> Self {
        if let Some(value) = std::env::var_os(LIBRARY_PATH_ENV).filter(|v| !v.is_empty()) {
            self.library_path = Some(PathBuf::from(value));
        }
        self
    }

    /// The configured path, or the platform default.
    pub fn resolve(&self) -> PathBuf {
        self.library_path.clone().unwrap_or_else(default_library_path)
    }
}

/// Load configuration from a TOML or JSON file.
///
/// JSON is selected by a `.json` extension, anything else is parsed as TOML.
pub fn load_config(path: &Path) -> BridgeResult<LibraryConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| BridgeError::Config(format!("Failed to read config file {:?}: {e}", path)))?;

    let config: LibraryConfig = if path.extension().map_or(false, |e| e == "json") {
        serde_json::from_str(&content)
            .map_err(|e| BridgeError::Config(format!("Failed to parse config as JSON: {e}")))?
    } else {
        toml::from_str(&content)
            .map_err(|e| BridgeError::Config(format!("Failed to parse config as TOML: {e}")))?
    };

    validate_config(&config)?;

    Ok(config)
}

fn validate_config(config: &LibraryConfig) -> BridgeResult<()> {
    match &config.library_path {
        Some(path) if !path.exists() => Err(BridgeError::LibraryNotFound(path.clone())),
        _ => Ok(()),
    }
}

/// File name of the engine module for this platform.
pub fn default_library_name() -> &'static str {
    if cfg!(windows) {
        if cfg!(target_pointer_width = "64") {
            "7z64.dll"
        } else {
            "7z.dll"
        }
    } else if cfg!(target_os = "macos") {
        "7z.dylib"
    } else {
        "7z.so"
    }
}

/// Default module path: the platform file name in the executable's directory.
///
/// Falls back to the bare file name (left to the loader's search path) when
/// the executable location is unknown.
pub fn default_library_path() -> PathBuf {
    let name = default_library_name();
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(name)))
        .unwrap_or_else(|| PathBuf::from(name))
}

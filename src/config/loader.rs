//! TOML configuration file parsing with unknown-key detection.
use std::io;
use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::{DodotError, Result};
use crate::fs::Fs;

/// Non-fatal configuration warning (an unrecognised key).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    /// File the key appeared in.
    pub file: std::path::PathBuf,
    /// Dotted key path, e.g. `pack.ignroe`.
    pub key: String,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: unknown key '{}'", self.file.display(), self.key)
    }
}

/// Load and deserialize a TOML file, collecting unknown keys as warnings.
///
/// A missing file deserializes from the empty document, so every config type
/// must be constructible from defaults.
///
/// # Errors
///
/// Returns a configuration error if the file exists but cannot be read or
/// parsed.
pub fn load_config<T: DeserializeOwned>(
    fs: &dyn Fs,
    path: &Path,
) -> Result<(T, Vec<ConfigWarning>)> {
    let content = match fs.read(path) {
        Ok(bytes) => String::from_utf8(bytes).map_err(|_| {
            DodotError::config("config file is not valid UTF-8", Some(path.to_path_buf()))
        })?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => {
            return Err(DodotError::config(
                format!("failed to read {}: {e}", path.display()),
                Some(path.to_path_buf()),
            ));
        }
    };
    parse_config(&content, path)
}

/// Parse TOML text; `path` is only used for error and warning messages.
///
/// # Errors
///
/// Returns a configuration error if `content` is not valid for `T`.
pub fn parse_config<T: DeserializeOwned>(
    content: &str,
    path: &Path,
) -> Result<(T, Vec<ConfigWarning>)> {
    let mut unknown = Vec::new();
    let deserializer = toml::Deserializer::new(content);
    let value: T = serde_ignored::deserialize(deserializer, |p| unknown.push(p.to_string()))
        .map_err(|e| {
            DodotError::config(
                format!("failed to parse {}: {}", path.display(), e.message()),
                Some(path.to_path_buf()),
            )
        })?;
    let warnings = unknown
        .into_iter()
        .map(|key| ConfigWarning {
            file: path.to_path_buf(),
            key,
        })
        .collect();
    Ok((value, warnings))
}

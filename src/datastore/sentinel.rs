//! Run-once sentinel records and input checksums.
use std::fmt;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

use crate::error::{DodotError, Result};
use crate::fs::Fs;

/// Suffix appended to an input's basename to name its sentinel.
pub const SENTINEL_SUFFIX: &str = ".sentinel";

/// Sentinel file name for an input path: `<basename>.sentinel`.
#[must_use]
pub fn sentinel_name(source: &Path) -> String {
    let base = source
        .file_name()
        .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
    format!("{base}{SENTINEL_SUFFIX}")
}

/// Record that a provisioning input ran: `<checksum>|<RFC3339 timestamp>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentinel {
    /// Checksum of the input that ran.
    pub checksum: String,
    /// When it ran; absent in records written without one.
    pub timestamp: Option<DateTime<Utc>>,
}

impl Sentinel {
    /// Sentinel stamped with the current time.
    #[must_use]
    pub fn now(checksum: impl Into<String>) -> Self {
        Self {
            checksum: checksum.into(),
            timestamp: Some(Utc::now()),
        }
    }

    /// Parse file contents; a trailing newline is optional and a missing or
    /// unparsable timestamp yields `None`.
    #[must_use]
    pub fn parse(content: &str) -> Self {
        let line = content.lines().next().unwrap_or_default().trim();
        let (checksum, timestamp) = line.split_once('|').unwrap_or((line, ""));
        Self {
            checksum: checksum.to_string(),
            timestamp: DateTime::parse_from_rfc3339(timestamp)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
        }
    }
}

impl fmt::Display for Sentinel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.checksum)?;
        if let Some(ts) = self.timestamp {
            write!(f, "|{}", ts.to_rfc3339_opts(SecondsFormat::Secs, true))?;
        }
        Ok(())
    }
}

/// Compute the SHA-256 hex digest of a file's contents.
///
/// # Errors
///
/// Returns a filesystem error if the file cannot be read.
pub fn file_checksum(fs: &dyn Fs, path: &Path) -> Result<String> {
    let bytes = fs
        .read(path)
        .map_err(|e| DodotError::fs("read", path, e))?;
    let hash = Sha256::digest(&bytes);
    Ok(hash.iter().fold(String::with_capacity(64), |mut acc, b| {
        use std::fmt::Write as _;
        let _ = write!(acc, "{b:02x}");
        acc
    }))
}

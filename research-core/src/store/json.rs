//! Whole-file JSON persistence shared by the project stores

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Outcome of reading a state file.
///
/// A missing file and a corrupt file are both "no usable data", but callers
/// log them differently and some surface `Corrupt` as a transient error.
#[derive(Debug, Clone, PartialEq)]
pub enum Loaded<T> {
    /// The file does not exist
    Missing,
    /// The file parsed successfully
    Parsed(T),
    /// The file exists but could not be read or parsed
    Corrupt(String),
}

impl<T> Loaded<T> {
    /// The parsed value, if any
    pub fn parsed(self) -> Option<T> {
        match self {
            Loaded::Parsed(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_corrupt(&self) -> bool {
        matches!(self, Loaded::Corrupt(_))
    }
}

impl<T: Default> Loaded<T> {
    /// The parsed value, or `T::default()` when missing or corrupt
    pub fn unwrap_or_default(self) -> T {
        self.parsed().unwrap_or_default()
    }
}

/// Read and parse a JSON file.
pub fn load<T: DeserializeOwned>(path: &Path) -> Loaded<T> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Loaded::Missing,
        Err(e) => return Loaded::Corrupt(e.to_string()),
    };

    match serde_json::from_str(&content) {
        Ok(value) => Loaded::Parsed(value),
        Err(e) => Loaded::Corrupt(e.to_string()),
    }
}

/// Serialize `value` as pretty JSON and replace `path` atomically.
///
/// The document is written to a sibling temp file and renamed over the
/// target, so readers never observe a half-written file.
pub fn write_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut content = serde_json::to_vec_pretty(value)?;
    content.push(b'\n');

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "state".to_string());
    let tmp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, std::process::id()));

    let result = (|| -> Result<()> {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(&content)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

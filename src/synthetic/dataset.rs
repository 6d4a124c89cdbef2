//! Dataset files
//!
//! Pre-recorded datasets are JSON arrays of flat documents, each carrying a
//! `timestamp` as epoch millis (number or numeric string) or RFC 3339 text.

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::record::{GenerationResult, TIMESTAMP_FIELD};

#[derive(Debug)]
pub enum DatasetError {
    Io { path: PathBuf, source: io::Error },
    Parse { path: PathBuf, reason: String },
    Encode { path: PathBuf, reason: String },
    NotAnArray { path: PathBuf },
    NotAnObject { index: usize },
    MissingTimestamp,
    InvalidTimestamp(String),
}

impl fmt::Display for DatasetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "failed to access {:?}: {}", path, source),
            Self::Parse { path, reason } => write!(f, "failed to parse {:?}: {}", path, reason),
            Self::Encode { path, reason } => write!(f, "failed to encode {:?}: {}", path, reason),
            Self::NotAnArray { path } => write!(f, "{:?} does not hold a JSON array", path),
            Self::NotAnObject { index } => write!(f, "element {} is not a JSON object", index),
            Self::MissingTimestamp => write!(f, "document has no '{}' field", TIMESTAMP_FIELD),
            Self::InvalidTimestamp(raw) => write!(f, "unparseable timestamp '{}'", raw),
        }
    }
}

impl std::error::Error for DatasetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Read at most `limit` documents from a JSON array file.
pub fn read_json_array_with_limit(
    path: impl AsRef<Path>,
    limit: usize,
) -> Result<Vec<Value>, DatasetError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed: Value = serde_json::from_str(&contents).map_err(|e| DatasetError::Parse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let Value::Array(items) = parsed else {
        return Err(DatasetError::NotAnArray {
            path: path.to_path_buf(),
        });
    };

    items
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(index, item)| {
            if item.is_object() {
                Ok(item)
            } else {
                Err(DatasetError::NotAnObject { index })
            }
        })
        .collect()
}

pub fn can_be_parsed_as_long(raw: &str) -> bool {
    !raw.is_empty() && raw.parse::<i64>().is_ok()
}

/// Timestamp of a dataset document.
pub fn parse_train_time(document: &Value) -> Result<DateTime<Utc>, DatasetError> {
    let raw = document
        .get(TIMESTAMP_FIELD)
        .ok_or(DatasetError::MissingTimestamp)?;

    let millis = match raw {
        Value::Number(n) => n.as_i64(),
        Value::String(s) if can_be_parsed_as_long(s) => s.parse::<i64>().ok(),
        Value::String(s) => {
            return DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| DatasetError::InvalidTimestamp(s.clone()));
        }
        _ => None,
    };

    millis
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .ok_or_else(|| DatasetError::InvalidTimestamp(raw.to_string()))
}

/// Write a generation result (records plus ledgers) as pretty JSON.
pub fn write_generation(
    path: impl AsRef<Path>,
    result: &GenerationResult,
) -> Result<(), DatasetError> {
    write_json(path.as_ref(), result)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), DatasetError> {
    let contents = serde_json::to_string_pretty(value).map_err(|e| DatasetError::Encode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    fs::write(path, contents).map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })
}

//! Validated collection names.
//!
//! A collection is identified by its name, which maps 1:1 onto a storage
//! directory. Names are restricted to `[A-Za-z0-9_-]+`; the charset already
//! excludes separators and dots, so joining a name under the base directory
//! cannot escape it.

use std::fmt;

use serde::Serialize;

use crate::error::{KbError, KbResult};

/// A collection name that has passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CollectionName(String);

impl CollectionName {
    /// Validate `raw` and wrap it.
    ///
    /// Fails with [`KbError::InvalidName`] for empty names or any character
    /// outside ASCII letters, digits, `-`, and `_`.
    pub fn parse(raw: &str) -> KbResult<Self> {
        if is_valid_name(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(KbError::InvalidName(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CollectionName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// True iff `name` is non-empty and matches `[A-Za-z0-9_-]+`.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

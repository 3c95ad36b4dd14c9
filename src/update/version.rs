//! Release version parsing and ordering
//!
//! Versions are `major.minor.patch`, optionally prefixed with `v` as in
//! release tags. Ordering is numeric per segment, so `1.10.0 > 1.2.0`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::KeepsakeError;

/// A `major.minor.patch` version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a version string, accepting a leading `v` or `V`
    pub fn parse(s: &str) -> Result<Self, KeepsakeError> {
        let trimmed = s.trim();
        let bare = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);

        let parts: Vec<&str> = bare.split('.').collect();
        if parts.len() != 3 {
            return Err(KeepsakeError::InvalidVersion(format!(
                "'{}' is not major.minor.patch",
                s
            )));
        }

        let mut numbers = [0u64; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(KeepsakeError::InvalidVersion(format!(
                    "'{}' has a non-numeric segment '{}'",
                    s, part
                )));
            }
            *slot = part
                .parse()
                .map_err(|_| KeepsakeError::InvalidVersion(format!("'{}' is out of range", s)))?;
        }

        Ok(Self::new(numbers[0], numbers[1], numbers[2]))
    }

    /// Version of the running binary
    pub fn current() -> Result<Self, KeepsakeError> {
        Self::parse(env!("CARGO_PKG_VERSION"))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = KeepsakeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = KeepsakeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.to_string()
    }
}

//! Proof types for validated content.
//!
//! These types enforce invariants at construction time. Once you hold a value,
//! you know it satisfies all required constraints.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A stimulus label or title that is never empty (or whitespace-only).
///
/// The stored text is trimmed, so `" A "` and `"A"` name the same stimulus.
///
/// # Serde
///
/// Serializes as a plain JSON string. Deserialization validates non-emptiness.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NonEmptyString(String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("text must not be empty")]
pub struct EmptyStringError;

impl NonEmptyString {
    pub fn new(value: impl Into<String>) -> Result<Self, EmptyStringError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            Err(EmptyStringError)
        } else if trimmed.len() == value.len() {
            Ok(Self(value))
        } else {
            Ok(Self(trimmed.to_string()))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl TryFrom<String> for NonEmptyString {
    type Error = EmptyStringError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for NonEmptyString {
    type Error = EmptyStringError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

impl std::ops::Deref for NonEmptyString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl AsRef<str> for NonEmptyString {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for NonEmptyString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::NonEmptyString;

    #[test]
    fn rejects_whitespace_only() {
        assert!(NonEmptyString::new("   ").is_err());
        assert!(NonEmptyString::new("").is_err());
    }

    #[test]
    fn trims_surrounding_whitespace() {
        let label = NonEmptyString::new("  MONDAY ").unwrap();
        assert_eq!(label.as_str(), "MONDAY");
    }

    #[test]
    fn deserialize_validates() {
        let ok: NonEmptyString = serde_json::from_str("\"A\"").unwrap();
        assert_eq!(ok.as_str(), "A");
        assert!(serde_json::from_str::<NonEmptyString>("\"  \"").is_err());
    }
}

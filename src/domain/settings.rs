//! Setting keys and records.

use std::fmt;

use serde_json::Value;
use time::OffsetDateTime;

use super::error::DomainError;

/// Longest accepted key, matching the classic CMS option-name column width.
pub const MAX_SETTING_KEY_LEN: usize = 191;

/// A validated settings key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SettingKey(String);

impl SettingKey {
    pub fn parse(raw: impl Into<String>) -> Result<Self, DomainError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(DomainError::validation("setting key must not be empty"));
        }
        let length = raw.chars().count();
        if length > MAX_SETTING_KEY_LEN {
            return Err(DomainError::validation(format!(
                "setting key is {length} characters, the limit is {MAX_SETTING_KEY_LEN}"
            )));
        }
        if raw.chars().any(char::is_control) {
            return Err(DomainError::validation(
                "setting key must not contain control characters",
            ));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SettingKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A persisted setting row.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingRecord {
    pub key: String,
    pub value: Value,
    pub updated_at: OffsetDateTime,
}

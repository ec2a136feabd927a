//! Cache policy.

use std::str::FromStr;

use serde::Deserialize;

/// When a read-through miss writes the fetched value into the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PopulateMode {
    /// Write before responding.
    #[default]
    Inline,
    /// Respond first; the write runs as a deferred task.
    Background,
}

impl PopulateMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PopulateMode::Inline => "inline",
            PopulateMode::Background => "background",
        }
    }
}

impl FromStr for PopulateMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "inline" => Ok(PopulateMode::Inline),
            "background" => Ok(PopulateMode::Background),
            other => Err(format!(
                "unknown populate mode `{other}`; expected `inline` or `background`"
            )),
        }
    }
}

/// Immutable policy the consistency engine runs with.
#[derive(Debug, Clone, Default)]
pub struct CacheConfig {
    pub populate: PopulateMode,
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            populate: settings.populate,
        }
    }
}

//! Language tag handling for engine requests

/// Language used when a caller omits one
pub const DEFAULT_REQUEST_LANGUAGE: &str = "en-US";

/// Language applied when a requested tag is unusable
pub const FALLBACK_LANGUAGE: &str = "en";

/// A syntactically valid BCP 47 style tag (`en`, `en-US`, `zh-Hant-TW`).
///
/// Only the shape is checked; whether an engine supports the language is up
/// to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageTag(String);

impl LanguageTag {
    /// Parse a tag, returning `None` if it is not well formed
    pub fn parse(tag: &str) -> Option<Self> {
        let tag = tag.trim().replace('_', "-");
        let mut subtags = tag.split('-');

        let primary = subtags.next()?;
        if !(2..=3).contains(&primary.len()) || !primary.chars().all(|c| c.is_ascii_alphabetic()) {
            return None;
        }

        for subtag in subtags {
            if subtag.is_empty()
                || subtag.len() > 8
                || !subtag.chars().all(|c| c.is_ascii_alphanumeric())
            {
                return None;
            }
        }

        Some(Self(tag))
    }

    /// Parse a tag, falling back to the default language on failure
    pub fn resolve(tag: &str) -> Self {
        Self::parse(tag).unwrap_or_else(Self::fallback)
    }

    pub fn fallback() -> Self {
        Self(FALLBACK_LANGUAGE.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

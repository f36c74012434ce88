//! Topic key validation.

use std::sync::OnceLock;

use regex::Regex;

use super::error::TopicError;

fn key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("key pattern is valid"))
}

/// Returns true if `key` is a legal topic key.
pub fn is_valid_key(key: &str) -> bool {
    key_pattern().is_match(key)
}

/// Validates a key, returning [`TopicError::InvalidKey`] when it is not legal.
pub fn validate_key(key: &str) -> Result<(), TopicError> {
    if is_valid_key(key) {
        Ok(())
    } else {
        Err(TopicError::InvalidKey(key.to_string()))
    }
}

//! Environment variable lookups used by the configuration structs.
//!
//! Empty values are treated as unset so that a blank line in `.env`
//! (`NYC_OPEN_DATA_TOKEN=`) behaves like an absent variable.

use anyhow::{Context, Result};
use std::str::FromStr;

/// Read a variable, returning `None` when it is unset, empty or not unicode.
pub fn optional(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}

/// Read a required variable.
pub fn required(key: &str) -> Result<String> {
    optional(key).with_context(|| format!("environment variable {} is not set", key))
}

/// Parse a variable if present. A present but malformed value is an error
/// rather than silently falling back to a default.
pub fn parse_optional<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("invalid value {:?} for {}: {}", raw, key, e)),
        None => Ok(None),
    }
}

/// Parse a variable, using `default` when it is unset.
pub fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    Ok(parse_optional(key)?.unwrap_or(default))
}

//! Composite entry identity.
//!
//! An entry is identified by `(space, key)`, serialized as `"<space>:<key>"`.
//! The same string is the cache key in the facade and the lookup/delete term
//! in the index engine.
//!
//! Spaces may not contain the separator; keys may. Splitting at the first
//! separator is therefore always unambiguous, so two distinct pairs can never
//! share an identity.

use crate::error::{StoreError, StoreResult};
use std::fmt;

/// Separator between space and key.
pub const SEPARATOR: char = ':';

/// A validated `(space, key)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryId {
    space: String,
    key: String,
}

impl EntryId {
    /// Creates an identity, rejecting spaces that contain the separator.
    pub fn new(space: impl Into<String>, key: impl Into<String>) -> StoreResult<Self> {
        let space = space.into();
        validate_space(&space)?;
        Ok(Self {
            space,
            key: key.into(),
        })
    }

    /// Parses a composite identity back into its parts.
    pub fn parse(composite: &str) -> Option<Self> {
        let (space, key) = split(composite)?;
        Some(Self {
            space: space.to_string(),
            key: key.to_string(),
        })
    }

    pub fn space(&self) -> &str {
        &self.space
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the `"<space>:<key>"` form.
    pub fn composite(&self) -> String {
        format!("{}{}{}", self.space, SEPARATOR, self.key)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.space, SEPARATOR, self.key)
    }
}

/// Rejects spaces containing the separator.
pub fn validate_space(space: &str) -> StoreResult<()> {
    if space.contains(SEPARATOR) {
        return Err(StoreError::InvalidSpace(space.to_string()));
    }
    Ok(())
}

/// Builds the composite identity for `(space, key)`.
pub fn compose(space: &str, key: &str) -> StoreResult<String> {
    validate_space(space)?;
    Ok(format!("{}{}{}", space, SEPARATOR, key))
}

/// Splits a composite identity at the first separator.
pub fn split(composite: &str) -> Option<(&str, &str)> {
    composite.split_once(SEPARATOR)
}

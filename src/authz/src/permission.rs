//! Permission strings and the wildcard matching algorithm
//!
//! A permission is `resource:action`, optionally scoped to one resource
//! instance as `resource:action:resource_id`. The alternate delimiter `.` is
//! rewritten to `:` when a permission is parsed, so every stored or queried
//! permission is in canonical form.
//!
//! # Wildcards
//!
//! - `*` matches every permission (`*:*` canonicalizes to `*`)
//! - `book:*` matches every action on `book`, including instance-scoped ones
//! - `*:read` matches `read` on any resource
//! - `book:read:*` matches `book:read:<id>` for any id, but not `book:read`
//!
//! Wildcards only ever occupy a whole segment.
//!
//! # Example
//!
//! ```rust
//! use rbac_authz::Permission;
//!
//! let granted = Permission::parse("book.*").unwrap();
//! assert_eq!(granted.as_str(), "book:*");
//!
//! assert!(granted.matches(&Permission::parse("book:read").unwrap()));
//! assert!(!granted.matches(&Permission::parse("user:read").unwrap()));
//! ```

use crate::error::{AuthzError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical delimiter between permission segments
pub const DELIMITER: char = ':';

/// Alternate delimiter accepted on input
pub const ALT_DELIMITER: char = '.';

/// Wildcard segment
pub const WILDCARD: &str = "*";

const MAX_SEGMENTS: usize = 3;

/// Validated, delimiter-normalized permission or wildcard pattern
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Permission(String);

impl Permission {
    /// Parse and normalize a permission string
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::InvalidPermission`] when the input is empty,
    /// contains whitespace, has an empty segment, has more than three
    /// segments, mixes `*` with other characters in one segment, or is a
    /// single segment other than `*`.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();

        if trimmed.is_empty() {
            return Err(AuthzError::invalid_permission(input, "permission is empty"));
        }

        if trimmed.chars().any(char::is_whitespace) {
            return Err(AuthzError::invalid_permission(
                input,
                "permission contains whitespace",
            ));
        }

        let canonical = trimmed.replace(ALT_DELIMITER, ":");

        let mut segments = 0;
        let mut all_wildcards = true;
        for segment in canonical.split(DELIMITER) {
            segments += 1;

            if segment.is_empty() {
                return Err(AuthzError::invalid_permission(input, "empty segment"));
            }
            if segment != WILDCARD && segment.contains('*') {
                return Err(AuthzError::invalid_permission(
                    input,
                    "wildcard must occupy a whole segment",
                ));
            }
            all_wildcards &= segment == WILDCARD;
        }

        if segments > MAX_SEGMENTS {
            return Err(AuthzError::invalid_permission(
                input,
                format!("expected at most {} segments, found {}", MAX_SEGMENTS, segments),
            ));
        }

        if all_wildcards {
            return Ok(Self::all());
        }

        if segments == 1 {
            return Err(AuthzError::invalid_permission(
                input,
                "expected 'resource:action'",
            ));
        }

        Ok(Self(canonical))
    }

    /// The universal wildcard `*`
    pub fn all() -> Self {
        Self(WILDCARD.to_string())
    }

    /// Build `resource:action`
    pub fn new(resource: &str, action: &str) -> Result<Self> {
        Self::parse(&format!("{}{}{}", resource, DELIMITER, action))
    }

    /// Canonical string form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resource segment (`*` for the universal wildcard)
    pub fn resource(&self) -> &str {
        self.segments().next().unwrap_or(WILDCARD)
    }

    /// Action segment (`*` for the universal wildcard)
    pub fn action(&self) -> &str {
        self.segments().nth(1).unwrap_or(WILDCARD)
    }

    /// Resource instance segment, if present
    pub fn resource_id(&self) -> Option<&str> {
        self.segments().nth(2)
    }

    /// True for `*`
    pub fn is_universal(&self) -> bool {
        self.0 == WILDCARD
    }

    /// True when any segment is a wildcard
    pub fn is_wildcard(&self) -> bool {
        self.segments().any(|segment| segment == WILDCARD)
    }

    /// Check whether this (granted) permission covers `requested`
    ///
    /// Compares segment by segment over borrowed slices, so a check never
    /// allocates.
    pub fn matches(&self, requested: &Permission) -> bool {
        if self.is_universal() || self.0 == requested.0 {
            return true;
        }

        let mut granted = self.segments().peekable();
        let mut wanted = requested.segments();

        loop {
            match (granted.next(), wanted.next()) {
                (Some(g), Some(_)) if g == WILDCARD && granted.peek().is_none() => return true,
                (Some(g), Some(w)) if g == WILDCARD || g == w => continue,
                (None, None) => return true,
                _ => return false,
            }
        }
    }

    fn segments(&self) -> std::str::Split<'_, char> {
        self.0.split(DELIMITER)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Permission {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Permission {
    type Error = AuthzError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for Permission {
    type Error = AuthzError;

    fn try_from(value: &str) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<Permission> for String {
    fn from(permission: Permission) -> Self {
        permission.0
    }
}

impl AsRef<str> for Permission {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Parse a list of permission strings, failing on the first malformed entry
pub fn parse_all<I, S>(inputs: I) -> Result<Vec<Permission>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    inputs
        .into_iter()
        .map(|input| Permission::parse(input.as_ref()))
        .collect()
}

//! Domain primitive identifiers (semantic newtypes).
//!
//! Every identifier that crosses a component boundary is validated once, at
//! construction, via `parse`. Once built, the type itself is the proof of validity —
//! no downstream code re-checks emptiness or character sets.

use std::fmt;

use thiserror::Error;

/// Error returned when a raw string fails to parse into a domain identifier.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdError {
    /// The input was empty or all whitespace.
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    /// The input exceeded the maximum length for this identifier kind.
    #[error("{field} exceeds maximum length of {max} characters")]
    TooLong { field: &'static str, max: usize },

    /// The input contained a character outside the allowed set.
    #[error("{field} contains invalid character(s): {chars}")]
    InvalidCharacters { field: &'static str, chars: String },
}

const MAX_ID_LENGTH: usize = 253;

/// A workspace identifier: an opaque, hierarchical, colon-separated path.
///
/// Equality of two `WorkspaceName`s defines the tenant boundary (spec.md §3); all
/// other state in the system is partitioned by this value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct WorkspaceName(String);

impl WorkspaceName {
    /// Parses and validates a workspace name.
    ///
    /// Allowed characters: alphanumerics, `-`, `_`, `:` (the hierarchy separator).
    pub fn parse(s: impl Into<String>) -> Result<Self, IdError> {
        let s = s.into();
        validate_segment(&s, "workspace name", |c| {
            c.is_alphanumeric() || c == '-' || c == '_' || c == ':'
        })?;
        Ok(Self(s))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if `other` is this workspace or a descendant of it under `:` nesting.
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        other.0 == self.0 || other.0.starts_with(&format!("{}:", self.0))
    }
}

impl fmt::Display for WorkspaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A cluster's registered name, unique within the cluster registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct ClusterName(String);

impl ClusterName {
    pub fn parse(s: impl Into<String>) -> Result<Self, IdError> {
        let s = s.into();
        validate_segment(&s, "cluster name", |c| c.is_alphanumeric() || c == '-' || c == '_')?;
        Ok(Self(s))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClusterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A placement request's identifier, unique within its workspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct PlacementId(String);

impl PlacementId {
    pub fn parse(s: impl Into<String>) -> Result<Self, IdError> {
        let s = s.into();
        validate_segment(&s, "placement id", |c| c.is_alphanumeric() || c == '-' || c == '_')?;
        Ok(Self(s))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlacementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn validate_segment(s: &str, field: &'static str, allowed: impl Fn(char) -> bool) -> Result<(), IdError> {
    if s.trim().is_empty() {
        return Err(IdError::Empty { field });
    }
    if s.len() > MAX_ID_LENGTH {
        return Err(IdError::TooLong { field, max: MAX_ID_LENGTH });
    }
    let bad: String = s.chars().filter(|c| !allowed(*c)).collect();
    if !bad.is_empty() {
        return Err(IdError::InvalidCharacters { field, chars: bad });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_name_accepts_hierarchy() {
        let ws = WorkspaceName::parse("team:acme:prod").expect("valid");
        assert_eq!(ws.as_str(), "team:acme:prod");
    }

    #[test]
    fn workspace_name_rejects_empty() {
        assert_eq!(
            WorkspaceName::parse(""),
            Err(IdError::Empty { field: "workspace name" })
        );
    }

    #[test]
    fn workspace_name_contains_descendant() {
        let parent = WorkspaceName::parse("team:acme").expect("valid");
        let child = WorkspaceName::parse("team:acme:prod").expect("valid");
        let unrelated = WorkspaceName::parse("team:other").expect("valid");
        assert!(parent.contains(&child));
        assert!(parent.contains(&parent));
        assert!(!parent.contains(&unrelated));
    }

    #[test]
    fn cluster_name_rejects_colon() {
        assert!(matches!(
            ClusterName::parse("east:1"),
            Err(IdError::InvalidCharacters { .. })
        ));
    }
}

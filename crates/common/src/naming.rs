//! Bucket name transformation
//!
//! Maps existing (source) bucket names onto new (target) bucket names by
//! replacing a forbidden separator character, and validates whole batches
//! so that a run never starts with a name it cannot create or with two
//! sources competing for one target.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Shortest bucket name the provider accepts.
pub const MIN_NAME_LEN: usize = 3;
/// Longest bucket name the provider accepts.
pub const MAX_NAME_LEN: usize = 63;

const RESERVED_TARGET_PREFIXES: &[&str] = &["xn--", "sthree-", "amzn-s3-demo-"];
const RESERVED_TARGET_SUFFIXES: &[&str] = &["-s3alias", "--ol-s3"];

/// An existing bucket name, possibly containing the forbidden separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceName(String);

impl SourceName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SourceName {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// A bucket name produced by [`NamingPolicy::transform`].
///
/// Only constructible through the transformer, so every value satisfies the
/// target grammar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TargetName(String);

impl TargetName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An ordered `(source, target)` pairing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NameMapping {
    pub source: SourceName,
    pub target: TargetName,
}

/// Why a single name was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidReason {
    TooShort,
    TooLong,
    IllegalCharacter(char),
    /// The source contains two separators in a row
    AdjacentSeparators,
    /// First or last character is not a letter or digit
    BadBoundary,
    LooksLikeIpAddress,
    ReservedPrefix(&'static str),
    ReservedSuffix(&'static str),
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidReason::TooShort => write!(f, "shorter than {} characters", MIN_NAME_LEN),
            InvalidReason::TooLong => write!(f, "longer than {} characters", MAX_NAME_LEN),
            InvalidReason::IllegalCharacter(c) => write!(f, "illegal character {:?}", c),
            InvalidReason::AdjacentSeparators => write!(f, "adjacent separators"),
            InvalidReason::BadBoundary => {
                write!(f, "must start and end with a lowercase letter or digit")
            }
            InvalidReason::LooksLikeIpAddress => write!(f, "formatted as an IP address"),
            InvalidReason::ReservedPrefix(p) => write!(f, "reserved prefix {:?}", p),
            InvalidReason::ReservedSuffix(s) => write!(f, "reserved suffix {:?}", s),
        }
    }
}

/// A source name whose source or transformed form falls outside the grammar.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid bucket name '{source_name}'{}: {reason}", .target.as_ref().map(|t| format!(" (as '{}')", t)).unwrap_or_default())]
pub struct InvalidName {
    pub source_name: String,
    /// The transformed candidate, when the source itself was acceptable
    pub target: Option<String>,
    pub reason: InvalidReason,
}

/// Several distinct sources that transform to the same target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateTarget {
    pub target: String,
    /// Offending sources, in input order
    pub sources: Vec<String>,
}

impl fmt::Display for DuplicateTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' <- [{}]", self.target, self.sources.join(", "))
    }
}

/// Errors from validating a batch of source names.
///
/// All of these abort a run before any provider call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NamingError {
    #[error("no source bucket names given")]
    EmptyBatch,
    #[error("source bucket '{0}' is listed more than once")]
    RepeatedSource(String),
    #[error("{} invalid bucket name(s): {}", .0.len(), join_display(.0))]
    InvalidNames(Vec<InvalidName>),
    #[error("duplicate target bucket name(s): {}", join_display(.0))]
    DuplicateTarget(Vec<DuplicateTarget>),
    #[error("separator and substitute must differ (both {0:?})")]
    BadPolicy(char),
}

fn join_display<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Which character is forbidden and what replaces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingPolicy {
    #[serde(default = "default_separator")]
    pub separator: char,
    #[serde(default = "default_substitute")]
    pub substitute: char,
}

fn default_separator() -> char {
    '.'
}

fn default_substitute() -> char {
    '-'
}

impl Default for NamingPolicy {
    fn default() -> Self {
        Self {
            separator: default_separator(),
            substitute: default_substitute(),
        }
    }
}

impl NamingPolicy {
    /// Map one source name onto its target name.
    ///
    /// Deterministic, and a no-op on names that contain no separator, so
    /// re-applying it to its own output changes nothing.
    pub fn transform(&self, source: &SourceName) -> Result<TargetName, InvalidName> {
        let raw = source.as_str();
        let invalid = |target: Option<String>, reason| InvalidName {
            source_name: raw.to_string(),
            target,
            reason,
        };

        validate_source(raw, self.separator).map_err(|reason| invalid(None, reason))?;

        let candidate: String = raw
            .chars()
            .map(|c| if c == self.separator { self.substitute } else { c })
            .collect();

        validate_target(&candidate, self.substitute)
            .map_err(|reason| invalid(Some(candidate.clone()), reason))?;

        Ok(TargetName(candidate))
    }

    /// Transform a whole batch.
    ///
    /// Every name is checked before failing: all invalid names are reported
    /// together, then all duplicate-target groups together.
    pub fn map_batch(&self, sources: &[SourceName]) -> Result<Vec<NameMapping>, NamingError> {
        if self.separator == self.substitute {
            return Err(NamingError::BadPolicy(self.separator));
        }
        if sources.is_empty() {
            return Err(NamingError::EmptyBatch);
        }

        let mut seen = HashSet::new();
        for source in sources {
            if !seen.insert(source.as_str()) {
                return Err(NamingError::RepeatedSource(source.to_string()));
            }
        }

        let mut mappings = Vec::with_capacity(sources.len());
        let mut invalid = Vec::new();
        for source in sources {
            match self.transform(source) {
                Ok(target) => mappings.push(NameMapping {
                    source: source.clone(),
                    target,
                }),
                Err(e) => invalid.push(e),
            }
        }
        if !invalid.is_empty() {
            return Err(NamingError::InvalidNames(invalid));
        }

        // target -> (first index, sources) so groups come out in input order
        let mut by_target: BTreeMap<&str, (usize, Vec<String>)> = BTreeMap::new();
        for (index, mapping) in mappings.iter().enumerate() {
            by_target
                .entry(mapping.target.as_str())
                .or_insert_with(|| (index, Vec::new()))
                .1
                .push(mapping.source.to_string());
        }
        let mut duplicates: Vec<(usize, DuplicateTarget)> = by_target
            .into_iter()
            .filter(|(_, (_, sources))| sources.len() > 1)
            .map(|(target, (index, sources))| {
                (
                    index,
                    DuplicateTarget {
                        target: target.to_string(),
                        sources,
                    },
                )
            })
            .collect();
        if !duplicates.is_empty() {
            duplicates.sort_by_key(|(index, _)| *index);
            return Err(NamingError::DuplicateTarget(
                duplicates.into_iter().map(|(_, d)| d).collect(),
            ));
        }

        Ok(mappings)
    }
}

fn check_length(name: &str) -> Result<(), InvalidReason> {
    let len = name.chars().count();
    if len < MIN_NAME_LEN {
        return Err(InvalidReason::TooShort);
    }
    if len > MAX_NAME_LEN {
        return Err(InvalidReason::TooLong);
    }
    Ok(())
}

fn check_boundaries(name: &str) -> Result<(), InvalidReason> {
    let alnum = |c: Option<char>| c.is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    if !alnum(name.chars().next()) || !alnum(name.chars().last()) {
        return Err(InvalidReason::BadBoundary);
    }
    Ok(())
}

fn validate_source(name: &str, separator: char) -> Result<(), InvalidReason> {
    check_length(name)?;
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-' || *c == '.' || *c == separator))
    {
        return Err(InvalidReason::IllegalCharacter(c));
    }
    check_boundaries(name)?;
    let doubled: String = [separator, separator].iter().collect();
    if name.contains(&doubled) || name.contains("..") {
        return Err(InvalidReason::AdjacentSeparators);
    }
    if name.parse::<std::net::Ipv4Addr>().is_ok() {
        return Err(InvalidReason::LooksLikeIpAddress);
    }
    Ok(())
}

fn validate_target(name: &str, substitute: char) -> Result<(), InvalidReason> {
    check_length(name)?;
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-'))
    {
        return Err(InvalidReason::IllegalCharacter(c));
    }
    if name.starts_with(substitute) || name.ends_with(substitute) {
        return Err(InvalidReason::BadBoundary);
    }
    check_boundaries(name)?;
    if let Some(prefix) = RESERVED_TARGET_PREFIXES
        .iter()
        .copied()
        .find(|p| name.starts_with(*p))
    {
        return Err(InvalidReason::ReservedPrefix(prefix));
    }
    if let Some(suffix) = RESERVED_TARGET_SUFFIXES
        .iter()
        .copied()
        .find(|s| name.ends_with(*s))
    {
        return Err(InvalidReason::ReservedSuffix(suffix));
    }
    Ok(())
}

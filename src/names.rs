//! Dotted, case-insensitive hierarchical identifiers.
//!
//! A [`CanonicalName`] is an ordered list of upper-case segments joined by `.`.
//! All algebra (`push`, `pop`, `reduce`) returns new names; nothing mutates in
//! place. [`ObjectName`] and [`EntryName`] are views that read the trailing
//! segments as `object` and `object.entry`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub const SEPARATOR: char = '.';

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid"));

/// True when `text` is a single well-formed identifier segment.
pub fn is_identifier(text: &str) -> bool {
    IDENTIFIER.is_match(text)
}

#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalName {
    full: String,
}

impl CanonicalName {
    /// Parses a dotted string. Segments are trimmed and upper-cased; empty
    /// segments are dropped, so `"a..b"` and `"a.b"` are the same name.
    pub fn new(dotted: &str) -> Self {
        Self::from_segments(dotted.split(SEPARATOR))
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let full = segments
            .into_iter()
            .map(|s| s.as_ref().trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(".");
        Self { full }
    }

    /// The empty name; the global scope carries it.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn full_id(&self) -> &str {
        &self.full
    }

    pub fn is_empty(&self) -> bool {
        self.full.is_empty()
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> + '_ {
        self.full.split(SEPARATOR).filter(|s| !s.is_empty())
    }

    pub fn len(&self) -> usize {
        self.segments().count()
    }

    pub fn first(&self) -> Option<&str> {
        self.segments().next()
    }

    /// The last segment.
    pub fn id(&self) -> &str {
        self.full
            .rsplit_once(SEPARATOR)
            .map_or(self.full.as_str(), |(_, id)| id)
    }

    /// Every segment but the last.
    pub fn module(&self) -> CanonicalName {
        self.pop()
    }

    /// True when every segment is a well-formed identifier.
    pub fn is_well_formed(&self) -> bool {
        !self.is_empty() && self.segments().all(is_identifier)
    }

    pub fn push(&self, id: &str) -> CanonicalName {
        let tail = CanonicalName::new(id);
        self.join(&tail)
    }

    pub fn join(&self, tail: &CanonicalName) -> CanonicalName {
        match (self.is_empty(), tail.is_empty()) {
            (true, _) => tail.clone(),
            (_, true) => self.clone(),
            _ => Self {
                full: format!("{}.{}", self.full, tail.full),
            },
        }
    }

    pub fn pop(&self) -> CanonicalName {
        self.pop_id().0
    }

    /// Splits off the last segment.
    pub fn pop_id(&self) -> (CanonicalName, Option<String>) {
        if self.is_empty() {
            return (Self::root(), None);
        }
        match self.full.rsplit_once(SEPARATOR) {
            Some((module, id)) => (
                Self {
                    full: module.to_string(),
                },
                Some(id.to_string()),
            ),
            None => (Self::root(), Some(self.full.clone())),
        }
    }

    /// True when `prefix` matches this name on segment boundaries.
    pub fn starts_with(&self, prefix: &CanonicalName) -> bool {
        if prefix.is_empty() {
            return true;
        }
        self.full == prefix.full
            || (self.full.starts_with(&prefix.full)
                && self.full[prefix.full.len()..].starts_with(SEPARATOR))
    }

    /// Strips `prefix` when it is a segment prefix of the name. A name
    /// reduced by itself is the root. `None` when `prefix` is not a segment
    /// prefix.
    pub fn reduce(&self, prefix: &CanonicalName) -> Option<CanonicalName> {
        if !self.starts_with(prefix) {
            return None;
        }
        if prefix.is_empty() {
            return Some(self.clone());
        }
        let rest = &self.full[prefix.full.len()..];
        Some(Self {
            full: rest.trim_start_matches(SEPARATOR).to_string(),
        })
    }

    pub fn is_object_name(&self) -> bool {
        self.len() >= 2
    }

    pub fn is_entry_name(&self) -> bool {
        self.len() >= 3
    }
}

impl fmt::Debug for CanonicalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CanonicalName({})", self.full)
    }
}

impl fmt::Display for CanonicalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full)
    }
}

impl FromStr for CanonicalName {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for CanonicalName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl PartialEq<str> for CanonicalName {
    fn eq(&self, other: &str) -> bool {
        self.full.eq_ignore_ascii_case(other)
    }
}

impl PartialEq<&str> for CanonicalName {
    fn eq(&self, other: &&str) -> bool {
        self.full.eq_ignore_ascii_case(other)
    }
}

impl Serialize for CanonicalName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.full)
    }
}

impl<'de> Deserialize<'de> for CanonicalName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(Self::new(&text))
    }
}

/// `[module...].object`
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectName(CanonicalName);

impl ObjectName {
    pub fn new(name: CanonicalName) -> Self {
        Self(name)
    }

    pub fn parse(dotted: &str) -> Self {
        Self(CanonicalName::new(dotted))
    }

    pub fn object(&self) -> &str {
        self.0.id()
    }

    pub fn module(&self) -> CanonicalName {
        self.0.module()
    }

    pub fn is_object_name(&self) -> bool {
        self.0.is_object_name()
    }

    pub fn canonical(&self) -> &CanonicalName {
        &self.0
    }

    pub fn entry(&self, entry: &str) -> EntryName {
        EntryName(self.0.push(entry))
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// `[module...].object.entry`
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryName(CanonicalName);

impl EntryName {
    pub fn new(name: CanonicalName) -> Self {
        Self(name)
    }

    pub fn parse(dotted: &str) -> Self {
        Self(CanonicalName::new(dotted))
    }

    pub fn entry(&self) -> &str {
        self.0.id()
    }

    pub fn object_name(&self) -> ObjectName {
        ObjectName(self.0.pop())
    }

    pub fn is_entry_name(&self) -> bool {
        self.0.is_entry_name()
    }

    pub fn canonical(&self) -> &CanonicalName {
        &self.0
    }
}

impl fmt::Display for EntryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

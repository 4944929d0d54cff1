//! Compound key addressing.
//!
//! A compound key is a dot-delimited path such as `server.db.host`. A literal
//! dot inside a single key is written `\.` and does not split; the segment is
//! kept verbatim, backslash included.

use std::fmt;

/// An ordered sequence of simple keys addressing a value at any depth.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompoundKey(Vec<String>);

impl CompoundKey {
    /// Split a string on every `.` not immediately preceded by `\`.
    ///
    /// An empty string addresses the literal empty key.
    pub fn parse(key: &str) -> Self {
        Self(split_key(key))
    }

    /// A key used as one literal segment, never split.
    pub fn literal(key: impl ToString) -> Self {
        Self(vec![key.to_string()])
    }

    /// Build from segments that were already split.
    ///
    /// An empty sequence addresses the empty key.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            Self(vec![String::new()])
        } else {
            Self(segments)
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn into_segments(self) -> Vec<String> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false: a key has at least one segment.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Collapse to a single segment holding the joined text.
    pub(crate) fn flattened(self) -> Self {
        if self.0.len() == 1 {
            self
        } else {
            Self(vec![self.0.join(".")])
        }
    }
}

impl fmt::Display for CompoundKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl From<&str> for CompoundKey {
    fn from(key: &str) -> Self {
        Self::parse(key)
    }
}

impl From<String> for CompoundKey {
    fn from(key: String) -> Self {
        Self::parse(&key)
    }
}

impl From<&String> for CompoundKey {
    fn from(key: &String) -> Self {
        Self::parse(key)
    }
}

impl From<Vec<String>> for CompoundKey {
    fn from(segments: Vec<String>) -> Self {
        Self::from_segments(segments)
    }
}

impl From<&[String]> for CompoundKey {
    fn from(segments: &[String]) -> Self {
        Self::from_segments(segments.iter().cloned())
    }
}

impl From<&[&str]> for CompoundKey {
    fn from(segments: &[&str]) -> Self {
        Self::from_segments(segments.iter().copied())
    }
}

impl<const N: usize> From<[&str; N]> for CompoundKey {
    fn from(segments: [&str; N]) -> Self {
        Self::from_segments(segments)
    }
}

impl From<i64> for CompoundKey {
    fn from(key: i64) -> Self {
        Self::literal(key)
    }
}

impl From<&CompoundKey> for CompoundKey {
    fn from(key: &CompoundKey) -> Self {
        key.clone()
    }
}

/// Split on unescaped dots, keeping every segment verbatim.
pub fn split_key(key: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut prev = None;

    for c in key.chars() {
        if c == '.' && prev != Some('\\') {
            segments.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
        prev = Some(c);
    }
    segments.push(current);
    segments
}

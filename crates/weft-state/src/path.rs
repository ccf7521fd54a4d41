//! Paths into the state tree.
//!
//! A [`Path`] is a sequence of segments from the tree root down to a scalar or
//! container. Its dot-joined string form is a [`PathKey`], the unit the
//! subscription registry keys on (`"user.profile.name"`, `"users.0"`).
//!
//! Paths are always recomputed by navigating from the root; nothing caches the
//! path of a node across structural moves.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// A single segment of a [`Path`].
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Seg {
    /// Object key.
    Key(String),
    /// Array index.
    Index(usize),
}

impl Seg {
    /// Create a key segment.
    #[inline]
    pub fn key(k: impl Into<String>) -> Self {
        Seg::Key(k.into())
    }

    /// Create an index segment.
    #[inline]
    pub fn index(i: usize) -> Self {
        Seg::Index(i)
    }

    /// Get the key if this is a key segment.
    #[inline]
    pub fn as_key(&self) -> Option<&str> {
        match self {
            Seg::Key(k) => Some(k),
            Seg::Index(_) => None,
        }
    }

    /// Interpret this segment as an array index.
    ///
    /// Key segments in canonical decimal form count as indices, since dotted
    /// paths carry sequence positions as stringified integers.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Seg::Index(i) => Some(*i),
            Seg::Key(k) => parse_array_index(k),
        }
    }
}

/// Parse an RFC 6901 array index: ASCII digits with no leading zero.
pub(crate) fn parse_array_index(token: &str) -> Option<usize> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if token != "0" && token.starts_with('0') {
        return None;
    }
    token.parse().ok()
}

impl fmt::Display for Seg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Seg::Key(k) => f.write_str(k),
            Seg::Index(i) => write!(f, "{i}"),
        }
    }
}

impl From<String> for Seg {
    fn from(s: String) -> Self {
        Seg::Key(s)
    }
}

impl From<&str> for Seg {
    fn from(s: &str) -> Self {
        Seg::Key(s.to_owned())
    }
}

impl From<&String> for Seg {
    fn from(s: &String) -> Self {
        Seg::Key(s.clone())
    }
}

impl From<usize> for Seg {
    fn from(i: usize) -> Self {
        Seg::Index(i)
    }
}

/// A location in the state tree, as a list of segments from the root.
///
/// # Examples
///
/// ```
/// use weft_state::Path;
///
/// let path = Path::root().key("users").index(0).key("name");
/// assert_eq!(path.len(), 3);
/// assert_eq!(path.to_key().as_str(), "users.0.name");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Path(Vec<Seg>);

impl Path {
    /// The empty path (the tree root).
    #[inline]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Build a path from segments.
    #[inline]
    pub fn from_segments(segments: Vec<Seg>) -> Self {
        Self(segments)
    }

    /// Parse a dot-separated path such as `"users.0.name"`.
    ///
    /// Every segment becomes a key; numeric keys still resolve against
    /// arrays (see [`Seg::as_index`]). Empty segments are skipped, so `""`
    /// is the root.
    pub fn parse_dotted(path: &str) -> Self {
        path.split('.')
            .filter(|s| !s.is_empty())
            .map(Seg::key)
            .collect()
    }

    /// Append a key segment (builder).
    #[inline]
    pub fn key(mut self, k: impl Into<String>) -> Self {
        self.0.push(Seg::Key(k.into()));
        self
    }

    /// Append an index segment (builder).
    #[inline]
    pub fn index(mut self, i: usize) -> Self {
        self.0.push(Seg::Index(i));
        self
    }

    /// Push a segment.
    #[inline]
    pub fn push(&mut self, seg: Seg) {
        self.0.push(seg);
    }

    /// Pop the last segment.
    #[inline]
    pub fn pop(&mut self) -> Option<Seg> {
        self.0.pop()
    }

    #[inline]
    pub fn segments(&self) -> &[Seg] {
        &self.0
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn last(&self) -> Option<&Seg> {
        self.0.last()
    }

    /// Join this path with another one.
    pub fn join(&self, other: &Path) -> Path {
        let mut result = self.clone();
        result.0.extend(other.0.iter().cloned());
        result
    }

    /// Return a new path with `seg` appended.
    pub fn child(&self, seg: impl Into<Seg>) -> Path {
        let mut result = self.clone();
        result.0.push(seg.into());
        result
    }

    /// The path without its last segment, or `None` for the root.
    pub fn parent(&self) -> Option<Path> {
        if self.0.is_empty() {
            None
        } else {
            Some(Path(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// Strip `prefix` from the front of this path.
    ///
    /// Segments are compared through their dotted form, so `Key("0")` and
    /// `Index(0)` match.
    pub fn strip_prefix(&self, prefix: &Path) -> Option<Path> {
        if prefix.len() > self.len() {
            return None;
        }
        let matches = prefix
            .0
            .iter()
            .zip(self.0.iter())
            .all(|(a, b)| a == b || a.to_string() == b.to_string());
        matches.then(|| Path(self.0[prefix.len()..].to_vec()))
    }

    /// The dot-joined key of this path.
    pub fn to_key(&self) -> PathKey {
        PathKey(self.to_string())
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Seg> {
        self.0.iter()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}

impl FromIterator<Seg> for Path {
    fn from_iter<I: IntoIterator<Item = Seg>>(iter: I) -> Self {
        Path(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Path {
    type Item = &'a Seg;
    type IntoIter = std::slice::Iter<'a, Seg>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl std::ops::Index<usize> for Path {
    type Output = Seg;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

/// Dot-joined path string, the subscription key.
///
/// The root path has the empty key.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathKey(String);

impl PathKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse back into a [`Path`] of key segments.
    pub fn to_path(&self) -> Path {
        Path::parse_dotted(&self.0)
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for PathKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PathKey {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for PathKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&Path> for PathKey {
    fn from(path: &Path) -> Self {
        path.to_key()
    }
}

impl PartialEq<str> for PathKey {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for PathKey {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Construct a [`Path`] from segments.
///
/// String expressions become key segments, integers become index segments.
///
/// ```
/// use weft_state::path;
///
/// let p = path!("users", 0usize, "name");
/// assert_eq!(p.to_string(), "users.0.name");
/// ```
#[macro_export]
macro_rules! path {
    () => {
        $crate::Path::root()
    };
    ($($seg:expr),+ $(,)?) => {{
        let mut p = $crate::Path::root();
        $(
            p.push($crate::Seg::from($seg));
        )+
        p
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_construction() {
        let path = Path::root().key("users").index(0).key("name");
        assert_eq!(path.len(), 3);
        assert_eq!(path[0], Seg::Key("users".into()));
        assert_eq!(path[1], Seg::Index(0));
        assert_eq!(path[2], Seg::Key("name".into()));
    }

    #[test]
    fn test_path_key_is_dot_joined() {
        let path = path!("user", "profile", "name");
        assert_eq!(path.to_key(), "user.profile.name");
        assert_eq!(Path::root().to_key(), "");
    }

    #[test]
    fn test_indices_stringify() {
        let by_index = Path::root().key("users").index(3);
        let by_key = Path::parse_dotted("users.3");
        assert_eq!(by_index.to_key(), by_key.to_key());
        assert_eq!(by_key[1].as_index(), Some(3));
    }

    #[test]
    fn test_parse_dotted_skips_empty_segments() {
        assert!(Path::parse_dotted("").is_root());
        assert_eq!(Path::parse_dotted("a..b").len(), 2);
    }

    #[test]
    fn test_strip_prefix() {
        let full = path!("app", "users", 0usize);
        let rel = full.strip_prefix(&path!("app")).unwrap();
        assert_eq!(rel.to_key(), "users.0");
        assert!(full.strip_prefix(&path!("other")).is_none());
        assert!(path!("app").strip_prefix(&full).is_none());
    }

    #[test]
    fn test_seg_as_index_rejects_non_digits() {
        assert_eq!(Seg::key("12").as_index(), Some(12));
        assert_eq!(Seg::key("-").as_index(), None);
        assert_eq!(Seg::key("1a").as_index(), None);
        assert_eq!(Seg::key("").as_index(), None);
    }

    #[test]
    fn test_seg_as_index_rejects_leading_zeros() {
        assert_eq!(Seg::key("0").as_index(), Some(0));
        assert_eq!(Seg::key("10").as_index(), Some(10));
        assert_eq!(Seg::key("01").as_index(), None);
        assert_eq!(Seg::key("00").as_index(), None);
    }

    #[test]
    fn test_parent_and_child() {
        let p = path!("a", "b");
        assert_eq!(p.parent().unwrap(), path!("a"));
        assert_eq!(p.child("c"), path!("a", "b", "c"));
        assert!(Path::root().parent().is_none());
    }
}

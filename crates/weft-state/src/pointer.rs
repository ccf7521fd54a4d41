//! JSON pointers as used on the patch wire format.
//!
//! `/` separates reference tokens; `~1` and `~0` escape a literal `/` and `~`.
//! The token `-` on an array means "one past the last element" (append).
//! Tokens stay strings until they are resolved against a concrete container,
//! because `"0"` is a key on an object and an index on an array.

use crate::{Path, Seg, WeftError, WeftResult};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// The append marker token.
pub const APPEND_MARKER: &str = "-";

/// A parsed JSON pointer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Pointer {
    tokens: Vec<String>,
}

impl Pointer {
    /// The empty pointer, referring to the whole document.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse pointer syntax (`""`, `"/a/b"`, `"/a~1b"`).
    pub fn parse(raw: &str) -> WeftResult<Self> {
        if raw.is_empty() {
            return Ok(Self::root());
        }
        let Some(rest) = raw.strip_prefix('/') else {
            return Err(WeftError::invalid_pointer(raw, "must be empty or start with '/'"));
        };
        let tokens = rest
            .split('/')
            .map(|token| unescape(token).ok_or_else(|| WeftError::invalid_pointer(raw, "bad '~' escape")))
            .collect::<WeftResult<Vec<_>>>()?;
        Ok(Self { tokens })
    }

    /// Build a pointer from unescaped tokens.
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn is_root(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Split into parent tokens and the terminal token.
    pub fn split_last(&self) -> Option<(&[String], &str)> {
        self.tokens
            .split_last()
            .map(|(last, parent)| (parent, last.as_str()))
    }

    /// Same pointer with the terminal token replaced.
    pub fn with_last(&self, token: impl Into<String>) -> Self {
        let mut tokens = self.tokens.clone();
        tokens.pop();
        tokens.push(token.into());
        Self { tokens }
    }

    /// Append a token.
    pub fn push(mut self, token: impl Into<String>) -> Self {
        self.tokens.push(token.into());
        self
    }

    /// The tree path this pointer names, with every token as a key.
    pub fn to_path(&self) -> Path {
        self.tokens.iter().map(Seg::key).collect()
    }
}

impl From<&Path> for Pointer {
    fn from(path: &Path) -> Self {
        Self::from_tokens(path.iter().map(|seg| seg.to_string()))
    }
}

fn unescape(token: &str) -> Option<String> {
    if !token.contains('~') {
        return Some(token.to_owned());
    }
    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars();
    while let Some(c) = chars.next() {
        if c == '~' {
            match chars.next() {
                Some('0') => out.push('~'),
                Some('1') => out.push('/'),
                _ => return None,
            }
        } else {
            out.push(c);
        }
    }
    Some(out)
}

fn escape(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for token in &self.tokens {
            write!(f, "/{}", escape(token))?;
        }
        Ok(())
    }
}

impl FromStr for Pointer {
    type Err = WeftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Pointer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Pointer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Pointer::parse(&raw).map_err(de::Error::custom)
    }
}

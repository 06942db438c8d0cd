//! Topic - Cheap-to-clone broker topic name
//!
//! Uses Arc<str> internally; every queued message carries its topic, so
//! cloning must not allocate.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

/// Topic name (or topic filter) on the inbound message source.
///
/// # Examples
/// ```
/// use contracts::Topic;
///
/// let topic: Topic = "sensors/a".into();
/// let copy = topic.clone();
/// assert_eq!(topic, copy);
/// assert!(Topic::from("sensors/+").matches("sensors/a"));
/// ```
#[derive(Clone, Default)]
pub struct Topic(Arc<str>);

impl Topic {
    /// Multi-level wildcard segment
    pub const MULTI_LEVEL: &'static str = "#";
    /// Single-level wildcard segment
    pub const SINGLE_LEVEL: &'static str = "+";

    #[inline]
    pub fn new(s: &str) -> Self {
        Self(Arc::from(s))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this topic contains wildcard segments
    pub fn is_filter(&self) -> bool {
        self.0
            .split('/')
            .any(|seg| seg == Self::MULTI_LEVEL || seg == Self::SINGLE_LEVEL)
    }

    /// Match a concrete topic name against this topic treated as a filter.
    ///
    /// `+` matches exactly one level, `#` matches any remaining levels
    /// (including none) and is only honoured as the last segment.
    pub fn matches(&self, name: &str) -> bool {
        let mut filter = self.0.split('/').peekable();
        let mut levels = name.split('/');

        while let Some(seg) = filter.next() {
            if seg == Self::MULTI_LEVEL && filter.peek().is_none() {
                return true;
            }
            match levels.next() {
                Some(level) if seg == Self::SINGLE_LEVEL || seg == level => {}
                _ => return false,
            }
        }

        levels.next().is_none()
    }
}

impl Serialize for Topic {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Topic {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s))
    }
}

impl Deref for Topic {
    type Target = str;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for Topic {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Topic {
    #[inline]
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Topic {
    #[inline]
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl From<String> for Topic {
    #[inline]
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Topic({:?})", self.0)
    }
}

impl PartialEq for Topic {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for Topic {}

impl PartialEq<str> for Topic {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.0.as_ref() == other
    }
}

impl PartialEq<&str> for Topic {
    #[inline]
    fn eq(&self, other: &&str) -> bool {
        self.0.as_ref() == *other
    }
}

impl PartialEq<String> for Topic {
    #[inline]
    fn eq(&self, other: &String) -> bool {
        self.0.as_ref() == other
    }
}

impl Hash for Topic {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_shares_storage() {
        let t1: Topic = "sensors/a".into();
        let t2 = t1.clone();
        assert_eq!(t1.as_str().as_ptr(), t2.as_str().as_ptr());
    }

    #[test]
    fn test_exact_match() {
        let t = Topic::from("sensors/a");
        assert!(t.matches("sensors/a"));
        assert!(!t.matches("sensors/b"));
        assert!(!t.matches("sensors/a/x"));
        assert!(!t.matches("sensors"));
    }

    #[test]
    fn test_single_level_wildcard() {
        let t = Topic::from("sensors/+/temp");
        assert!(t.is_filter());
        assert!(t.matches("sensors/a/temp"));
        assert!(!t.matches("sensors/a/b/temp"));
        assert!(!t.matches("sensors/temp"));
    }

    #[test]
    fn test_multi_level_wildcard() {
        let t = Topic::from("sensors/#");
        assert!(t.matches("sensors"));
        assert!(t.matches("sensors/a"));
        assert!(t.matches("sensors/a/b/c"));
        assert!(!t.matches("other/a"));
        assert!(Topic::from("#").matches("anything/at/all"));
    }

    #[test]
    fn test_hash_in_middle_is_literal() {
        let t = Topic::from("a/#/b");
        assert!(!t.matches("a/x/b"));
        assert!(t.matches("a/#/b"));
    }

    #[test]
    fn test_serde() {
        let t: Topic = "sensors/a".into();
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(json, "\"sensors/a\"");
        let parsed: Topic = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, t);
    }
}

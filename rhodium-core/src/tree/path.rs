//! Slash-delimited property paths

use std::fmt;

use serde::{Deserialize, Serialize};

const DELIMITER: char = '/';

/// A normalised property tree path.
///
/// Empty components are dropped, so `"/a//b/"` and `"a/b"` name the same
/// node. The stored form has no leading delimiter; `Display` adds one.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct PropertyPath(String);

impl PropertyPath {
    /// The root path (no components)
    pub fn root() -> Self {
        PropertyPath(String::new())
    }

    pub fn new(path: &str) -> Self {
        let normalised = path
            .split(DELIMITER)
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        PropertyPath(normalised)
    }

    /// Append one or more components. Anything `Display` works, so channel
    /// indices join directly: `fe_path.join(chan)`.
    pub fn join(&self, component: impl fmt::Display) -> Self {
        let tail = PropertyPath::new(&component.to_string());
        if self.0.is_empty() {
            tail
        } else if tail.0.is_empty() {
            self.clone()
        } else {
            PropertyPath(format!("{}{}{}", self.0, DELIMITER, tail.0))
        }
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split(DELIMITER).filter(|c| !c.is_empty())
    }

    /// Last component, if any
    pub fn leaf(&self) -> Option<&str> {
        self.components().last()
    }

    /// Strip `prefix` from this path, returning the remainder.
    ///
    /// Matching is per component: `a/bc` does not start with `a/b`.
    pub fn strip_prefix(&self, prefix: &PropertyPath) -> Option<PropertyPath> {
        if prefix.is_root() {
            return Some(self.clone());
        }
        if self.0 == prefix.0 {
            return Some(PropertyPath::root());
        }
        self.0
            .strip_prefix(&prefix.0)
            .and_then(|rest| rest.strip_prefix(DELIMITER))
            .map(PropertyPath::new)
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", DELIMITER, self.0)
    }
}

impl AsRef<str> for PropertyPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PropertyPath {
    fn from(s: &str) -> Self {
        PropertyPath::new(s)
    }
}

impl From<String> for PropertyPath {
    fn from(s: String) -> Self {
        PropertyPath::new(&s)
    }
}

impl From<&PropertyPath> for PropertyPath {
    fn from(p: &PropertyPath) -> Self {
        p.clone()
    }
}

impl From<PropertyPath> for String {
    fn from(p: PropertyPath) -> Self {
        p.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalisation() {
        assert_eq!(PropertyPath::new("/a//b/"), PropertyPath::new("a/b"));
        assert_eq!(PropertyPath::new("a/b").to_string(), "/a/b");
        assert!(PropertyPath::new("///").is_root());
    }

    #[test]
    fn test_join() {
        let fe = PropertyPath::new("dboards/A").join("rx_frontends").join(0);
        assert_eq!(fe.as_str(), "dboards/A/rx_frontends/0");
        assert_eq!(fe.join("freq/value").leaf(), Some("value"));
        assert_eq!(PropertyPath::root().join("x"), PropertyPath::new("x"));
        assert_eq!(fe.join(""), fe);
    }

    #[test]
    fn test_strip_prefix_is_per_component() {
        let p = PropertyPath::new("a/bc/d");
        assert_eq!(p.strip_prefix(&"a".into()), Some(PropertyPath::new("bc/d")));
        assert_eq!(p.strip_prefix(&"a/b".into()), None);
        assert_eq!(p.strip_prefix(&p), Some(PropertyPath::root()));
        assert_eq!(p.strip_prefix(&PropertyPath::root()), Some(p.clone()));
    }
}

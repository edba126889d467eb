//! Hierarchical, slash-delimited addresses for store entries.
//!
//! Paths order segment-wise, so every subtree occupies one contiguous range
//! of an ordered map: `/a/b` < `/a/b/c` < `/a/b!` < `/a/c`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::PathError;

/// Address of one store entry (a "field").
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Path {
    segments: Vec<String>,
}

impl Path {
    /// The root path `/`.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse `/a/b/c` (the leading slash is optional).
    pub fn parse(text: &str) -> Result<Self, PathError> {
        let trimmed = text.strip_prefix('/').unwrap_or(text);
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        let segments = trimmed
            .split('/')
            .map(|segment| {
                if segment.is_empty() {
                    Err(PathError::EmptySegment(text.to_string()))
                } else {
                    Ok(segment.to_string())
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { segments })
    }

    /// Append one segment.
    pub fn child(&self, segment: impl Into<String>) -> Result<Self, PathError> {
        let segment = segment.into();
        validate_segment(&segment)?;
        let mut segments = self.segments.clone();
        segments.push(segment);
        Ok(Self { segments })
    }

    /// Append every segment of `other`.
    pub fn join(&self, other: &Path) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self { segments }
    }

    /// The parent path, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Last segment, or `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(String::as_str)
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// True if `ancestor` is this path or one of its ancestors.
    pub fn starts_with(&self, ancestor: &Path) -> bool {
        self.segments.starts_with(&ancestor.segments)
    }
}

fn validate_segment(segment: &str) -> Result<(), PathError> {
    if segment.is_empty() {
        return Err(PathError::EmptySegment(segment.to_string()));
    }
    if segment.contains('/') {
        return Err(PathError::InvalidSegment(segment.to_string()));
    }
    Ok(())
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "/");
        }
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Path {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Path {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Path::parse(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(text: &str) -> Path {
        Path::parse(text).unwrap()
    }

    #[test]
    fn parse_and_display_round_trip() {
        assert_eq!(p("/Audio/Graph/Volume").to_string(), "/Audio/Graph/Volume");
        assert_eq!(p("Audio/Volume").to_string(), "/Audio/Volume");
        assert_eq!(p("/").to_string(), "/");
        assert!(p("").is_root());
    }

    #[test]
    fn empty_segment_rejected() {
        assert!(matches!(Path::parse("/a//b"), Err(PathError::EmptySegment(_))));
        assert!(matches!(Path::parse("/a/"), Err(PathError::EmptySegment(_))));
    }

    #[test]
    fn child_rejects_slash() {
        let root = Path::root();
        assert!(matches!(root.child("a/b"), Err(PathError::InvalidSegment(_))));
        assert_eq!(root.child("a").unwrap(), p("/a"));
    }

    #[test]
    fn parent_and_name() {
        let path = p("/Style/Colors/Text");
        assert_eq!(path.name(), Some("Text"));
        assert_eq!(path.parent(), Some(p("/Style/Colors")));
        assert_eq!(Path::root().parent(), None);
        assert_eq!(path.depth(), 3);
    }

    #[test]
    fn starts_with_is_segment_wise() {
        let path = p("/Audio/Volume");
        assert!(path.starts_with(&p("/Audio")));
        assert!(path.starts_with(&path));
        assert!(path.starts_with(&Path::root()));
        assert!(!p("/AudioX/Volume").starts_with(&p("/Audio")));
    }

    #[test]
    fn subtree_is_contiguous_in_order() {
        let mut paths = vec![p("/a/c"), p("/a/b!"), p("/a/b/c"), p("/a/b"), p("/a")];
        paths.sort();
        assert_eq!(paths, vec![p("/a"), p("/a/b"), p("/a/b/c"), p("/a/b!"), p("/a/c")]);
    }

    #[test]
    fn join_concatenates() {
        assert_eq!(p("/a").join(&p("/b/c")), p("/a/b/c"));
    }

    #[test]
    fn serde_uses_text_form() {
        let json = serde_json::to_string(&p("/a/b")).unwrap();
        assert_eq!(json, "\"/a/b\"");
        let back: Path = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p("/a/b"));
        assert!(serde_json::from_str::<Path>("\"/a//b\"").is_err());
    }
}

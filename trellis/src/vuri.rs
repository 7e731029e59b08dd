//! Virtual URIs: position identities in a tree window.
use serde::{Deserialize, Serialize};
use std::{borrow::Borrow, fmt};
use trellis_common::Data;

/// Separator between the keys of a `Vuri`.
pub const SEPARATOR: char = '/';

/// Position of a node in a tree: the keys of the node and its ancestors, from the root, joined
/// with `/`.
///
/// Unlike an entity URI, a vuri identifies a *place*: the same relative path (e.g. `Locals/x`)
/// recurs under different contexts with different vuris.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vuri(String);

impl Vuri {
    pub fn new(path: impl Into<String>) -> Vuri {
        Vuri(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterates over the keys of the path, from the root.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEPARATOR)
    }

    /// Number of keys in the path (1 for a root).
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// Key of the node (last segment).
    pub fn key(&self) -> &str {
        self.0.rsplit(SEPARATOR).next().unwrap_or(&self.0)
    }

    /// Returns the vuri of the child with the specified key.
    pub fn child(&self, key: &str) -> Vuri {
        let mut path = String::with_capacity(self.0.len() + 1 + key.len());
        path.push_str(&self.0);
        path.push(SEPARATOR);
        path.push_str(key);
        Vuri(path)
    }

    /// Appends a relative path. An empty relative path returns the same vuri.
    pub fn join(&self, relative: &str) -> Vuri {
        if relative.is_empty() {
            self.clone()
        } else {
            self.child(relative)
        }
    }

    /// Returns the parent position, or `None` for a root.
    pub fn parent(&self) -> Option<Vuri> {
        self.0.rfind(SEPARATOR).map(|pos| Vuri(self.0[..pos].to_owned()))
    }

    /// Iterates over the proper ancestors, nearest first.
    pub fn ancestors(&self) -> impl Iterator<Item = Vuri> {
        std::iter::successors(self.parent(), |v| v.parent())
    }

    /// Path of `self` relative to `base`, if `self` is `base` or one of its descendants.
    ///
    /// Returns the empty string when `self == base`. The test is segment-aware: `a/bc` is not under
    /// `a/b`.
    pub fn relative_to(&self, base: &Vuri) -> Option<&str> {
        let rest = self.0.strip_prefix(base.as_str())?;
        if rest.is_empty() {
            Some(rest)
        } else {
            rest.strip_prefix(SEPARATOR)
        }
    }

    /// Whether `self` is `base` or one of its descendants.
    pub fn is_within(&self, base: &Vuri) -> bool {
        self.relative_to(base).is_some()
    }
}

/// Strips the last segment of a relative path (`"a/b"` -> `"a"`, `"a"` -> `""`).
///
/// Returns `None` for the empty path.
pub fn parent_path(relative: &str) -> Option<&str> {
    if relative.is_empty() {
        return None;
    }
    Some(relative.rfind(SEPARATOR).map_or("", |pos| &relative[..pos]))
}

/// Number of segments in a relative path (0 for the empty path).
pub fn path_depth(relative: &str) -> usize {
    if relative.is_empty() {
        0
    } else {
        relative.split(SEPARATOR).count()
    }
}

impl fmt::Debug for Vuri {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl fmt::Display for Vuri {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Vuri {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Vuri {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Vuri {
    fn from(path: &str) -> Self {
        Vuri::new(path)
    }
}

impl From<String> for Vuri {
    fn from(path: String) -> Self {
        Vuri(path)
    }
}

impl Data for Vuri {
    fn same(&self, other: &Self) -> bool {
        self == other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_are_segment_aware() {
        let frame = Vuri::new("session/thread-1/frame-1");
        let x = Vuri::new("session/thread-1/frame-1/Locals/x");
        assert_eq!(x.relative_to(&frame), Some("Locals/x"));
        assert_eq!(frame.relative_to(&frame), Some(""));
        assert_eq!(Vuri::new("session/thread-1/frame-10").relative_to(&frame), None);
        assert_eq!(frame.relative_to(&x), None);
        assert!(x.is_within(&frame));
        assert!(!Vuri::new("session/thread-2").is_within(&frame));
    }

    #[test]
    fn join_and_parent() {
        let frame = Vuri::new("session/frame-2");
        assert_eq!(frame.join(""), frame);
        assert_eq!(frame.join("Locals/x").as_str(), "session/frame-2/Locals/x");
        assert_eq!(frame.child("Globals").key(), "Globals");
        assert_eq!(frame.parent(), Some(Vuri::new("session")));
        assert_eq!(Vuri::new("session").parent(), None);
        let ancestors: Vec<_> = Vuri::new("a/b/c").ancestors().collect();
        assert_eq!(ancestors, [Vuri::new("a/b"), Vuri::new("a")]);
        assert_eq!(Vuri::new("a/b/c").depth(), 3);
    }

    #[test]
    fn relative_path_helpers() {
        assert_eq!(parent_path("Locals/x"), Some("Locals"));
        assert_eq!(parent_path("Locals"), Some(""));
        assert_eq!(parent_path(""), None);
        assert_eq!(path_depth(""), 0);
        assert_eq!(path_depth("Locals/x/y"), 3);
    }
}

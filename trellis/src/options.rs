//! Configuration of tree windows and lenses.
//!
//! Both option structs deserialize from partial documents: missing fields take their default
//! value, so an application can expose them in its own config file.
use crate::entity::EdgeType;
use serde::{Deserialize, Serialize};

/// Options of a `TreeWindow`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowOptions {
    /// Edge type followed to derive the tree (from child to parent).
    pub edge_type: EdgeType,
    /// Maximum number of visible items materialized before the focused item.
    pub above: usize,
    /// Maximum number of visible items materialized after the focused item.
    pub below: usize,
}

impl Default for WindowOptions {
    fn default() -> Self {
        WindowOptions {
            edge_type: EdgeType::parent(),
            above: 100,
            below: 100,
        }
    }
}

impl WindowOptions {
    #[must_use]
    pub fn edge_type(mut self, edge_type: impl Into<EdgeType>) -> Self {
        self.edge_type = edge_type.into();
        self
    }

    #[must_use]
    pub fn bounds(mut self, above: usize, below: usize) -> Self {
        self.above = above;
        self.below = below;
        self
    }
}

/// Options of an `ExplorationLens`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LensOptions {
    /// Number of refreshes after which an unresolved pending focus path is abandoned.
    ///
    /// `None` retries until the path resolves or the context changes.
    pub max_pending_retries: Option<u32>,
}

impl LensOptions {
    #[must_use]
    pub fn max_pending_retries(mut self, retries: u32) -> Self {
        self.max_pending_retries = Some(retries);
        self
    }
}

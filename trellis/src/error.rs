use thiserror::Error;

/// Structural violations rejected by `EntityStore::try_add`.
///
/// `EntityStore::add` performs none of these checks.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("an entity with URI `{0}` already exists")]
    DuplicateUri(String),
    #[error("invalid key `{key}` for entity `{uri}`: keys must be non-empty and must not contain `/`")]
    InvalidKey { uri: String, key: String },
    #[error("edge `{edge_type}` from `{from}` points to unknown entity `{to}`")]
    UnknownTarget { edge_type: String, from: String, to: String },
    #[error("edge `{edge_type}` of `{uri}` points to itself")]
    SelfEdge { edge_type: String, uri: String },
    #[error("entity `{uri}` declares {count} edges of traversal type `{edge_type}`")]
    MultipleTraversalParents { uri: String, edge_type: String, count: usize },
    #[error("parent `{parent}` already has a child with key `{key}`")]
    DuplicateSiblingKey { parent: String, key: String },
}

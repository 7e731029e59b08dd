//! Arena of typed entities connected by typed edges.
use crate::{
    entity::{Edge, EdgeSpec, EdgeType, Entity, EntityAttrs, EntityData, EntityId, EntityRef},
    error::StoreError,
};
use slotmap::{SecondaryMap, SlotMap};
use smallvec::SmallVec;
use std::{cell::RefCell, collections::HashMap, fmt, rc::Rc};
use tracing::{trace, warn};

////////////////////////////////////////////////////////////////////////////////////////////////////

struct StoreInner {
    entities: SlotMap<EntityId, EntityRef>,
    by_uri: HashMap<String, EntityId>,
    /// Outgoing edges, in declaration order.
    outgoing: SecondaryMap<EntityId, SmallVec<[Edge; 2]>>,
    /// Incoming edges, in insertion order of their source entity.
    incoming: SecondaryMap<EntityId, Vec<Edge>>,
    /// Incremented on every mutation.
    revision: u64,
    disposed: bool,
}

impl StoreInner {
    fn new() -> StoreInner {
        StoreInner {
            entities: SlotMap::with_key(),
            by_uri: HashMap::new(),
            outgoing: SecondaryMap::new(),
            incoming: SecondaryMap::new(),
            revision: 0,
            disposed: false,
        }
    }

    fn lookup(&self, uri: &str) -> Option<EntityId> {
        self.by_uri.get(uri).copied()
    }

    fn children(&self, id: EntityId, edge_type: &EdgeType) -> impl Iterator<Item = EntityId> + '_ {
        let edge_type = edge_type.clone();
        self.incoming
            .get(id)
            .into_iter()
            .flatten()
            .filter(move |edge| edge.edge_type == edge_type)
            .map(|edge| edge.from)
    }

    fn insert_edge(&mut self, edge: Edge) {
        if let Some(incoming) = self.incoming.get_mut(edge.to) {
            incoming.push(edge.clone());
        }
        if let Some(outgoing) = self.outgoing.get_mut(edge.from) {
            outgoing.push(edge);
        }
    }

    fn parent(&self, id: EntityId, edge_type: &EdgeType) -> Option<EntityId> {
        self.outgoing
            .get(id)?
            .iter()
            .find(|edge| &edge.edge_type == edge_type)
            .map(|edge| edge.to)
    }
}

/// The single source of truth for entity data.
///
/// Entities are stored in an arena and refer to each other through `EntityId`s in adjacency lists,
/// never through live references. The store uses interior mutability: it is meant to be shared
/// (`Rc<EntityStore>`) between the collaborator that writes to it and the tree windows that read it.
///
/// The store does not enforce that the traversal edge type forms a tree: `add` trusts the caller.
/// Use `try_add` to have the structural contract checked.
pub struct EntityStore {
    traversal: EdgeType,
    inner: RefCell<StoreInner>,
}

impl fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("EntityStore")
            .field("traversal", &self.traversal)
            .field("entities", &inner.entities.len())
            .field("revision", &inner.revision)
            .finish_non_exhaustive()
    }
}

impl Default for EntityStore {
    fn default() -> Self {
        EntityStore::new()
    }
}

impl EntityStore {
    /// Creates an empty store whose traversal edge type is `"parent"`.
    pub fn new() -> EntityStore {
        EntityStore::with_traversal_type(EdgeType::parent())
    }

    /// Creates an empty store. `traversal` is only used by `try_add` to validate the tree shape.
    pub fn with_traversal_type(traversal: EdgeType) -> EntityStore {
        EntityStore {
            traversal,
            inner: RefCell::new(StoreInner::new()),
        }
    }

    pub fn traversal_type(&self) -> &EdgeType {
        &self.traversal
    }

    /// Adds an entity with outgoing edges to existing entities.
    ///
    /// No structural validation is performed. Edges to unknown entities cannot be represented and
    /// are dropped.
    pub fn add(&self, attrs: EntityAttrs, edges: impl IntoIterator<Item = EdgeSpec>) -> EntityRef {
        let mut inner = self.inner.borrow_mut();
        if inner.disposed {
            warn!("EntityStore::add called on a disposed store");
        }
        let EntityAttrs { uri, key, data } = attrs;
        let entity_type = data.entity_type();

        let id = inner.entities.insert_with_key(|id| Rc::new(Entity { id, uri, key, data }));
        let entity = inner.entities[id].clone();
        inner.by_uri.insert(entity.uri.clone(), id);
        inner.outgoing.insert(id, SmallVec::new());
        inner.incoming.insert(id, Vec::new());

        for spec in edges {
            let Some(to) = inner.lookup(&spec.to) else {
                warn!(
                    "dropping `{}` edge from `{}` to unknown entity `{}`",
                    spec.edge_type, entity.uri, spec.to
                );
                continue;
            };
            inner.insert_edge(Edge {
                edge_type: spec.edge_type,
                from: id,
                to,
            });
        }

        inner.revision += 1;
        trace!("added {} `{}` (key `{}`)", entity_type, entity.uri, entity.key);
        entity
    }

    /// Adds an edge from the existing entity `from`, e.g. to attach an entity whose parent arrived
    /// after it.
    ///
    /// Like `add`, performs no structural validation. Returns `false` (and adds nothing) if either
    /// end is unknown.
    pub fn link(&self, from: &str, edge: EdgeSpec) -> bool {
        let mut inner = self.inner.borrow_mut();
        let (Some(from_id), Some(to)) = (inner.lookup(from), inner.lookup(&edge.to)) else {
            warn!("cannot link `{}` to `{}`: unknown entity", from, edge.to);
            return false;
        };
        trace!("linked `{}` -[{}]-> `{}`", from, edge.edge_type, edge.to);
        inner.insert_edge(Edge {
            edge_type: edge.edge_type,
            from: from_id,
            to,
        });
        inner.revision += 1;
        true
    }

    /// Adds an entity after checking that the write keeps the traversal edges a tree with unique
    /// sibling keys.
    pub fn try_add(
        &self,
        attrs: EntityAttrs,
        edges: impl IntoIterator<Item = EdgeSpec>,
    ) -> Result<EntityRef, StoreError> {
        let edges: Vec<EdgeSpec> = edges.into_iter().collect();
        self.validate(&attrs, &edges)?;
        Ok(self.add(attrs, edges))
    }

    fn validate(&self, attrs: &EntityAttrs, edges: &[EdgeSpec]) -> Result<(), StoreError> {
        let inner = self.inner.borrow();
        if inner.by_uri.contains_key(&attrs.uri) {
            return Err(StoreError::DuplicateUri(attrs.uri.clone()));
        }
        if attrs.key.is_empty() || attrs.key.contains(crate::vuri::SEPARATOR) {
            return Err(StoreError::InvalidKey {
                uri: attrs.uri.clone(),
                key: attrs.key.clone(),
            });
        }

        let mut traversal_count = 0;
        for spec in edges {
            if spec.to == attrs.uri {
                return Err(StoreError::SelfEdge {
                    edge_type: spec.edge_type.to_string(),
                    uri: attrs.uri.clone(),
                });
            }
            let Some(to) = inner.lookup(&spec.to) else {
                return Err(StoreError::UnknownTarget {
                    edge_type: spec.edge_type.to_string(),
                    from: attrs.uri.clone(),
                    to: spec.to.clone(),
                });
            };
            if spec.edge_type == self.traversal {
                traversal_count += 1;
                let collides = inner
                    .children(to, &self.traversal)
                    .any(|child| inner.entities[child].key == attrs.key);
                if collides {
                    return Err(StoreError::DuplicateSiblingKey {
                        parent: spec.to.clone(),
                        key: attrs.key.clone(),
                    });
                }
            }
        }
        if traversal_count > 1 {
            return Err(StoreError::MultipleTraversalParents {
                uri: attrs.uri.clone(),
                edge_type: self.traversal.to_string(),
                count: traversal_count,
            });
        }
        Ok(())
    }

    /// Returns the entity with the specified URI.
    pub fn get(&self, uri: &str) -> Option<EntityRef> {
        let inner = self.inner.borrow();
        inner.lookup(uri).map(|id| inner.entities[id].clone())
    }

    /// Returns the entity with the specified arena index.
    pub fn get_by_id(&self, id: EntityId) -> Option<EntityRef> {
        self.inner.borrow().entities.get(id).cloned()
    }

    /// Updates the attributes of an entity in place.
    ///
    /// The update may not change the entity type. Returns whether the entity was found and updated.
    pub fn update(&self, uri: &str, f: impl FnOnce(&mut EntityData)) -> bool {
        let mut inner = self.inner.borrow_mut();
        let Some(id) = inner.lookup(uri) else {
            return false;
        };
        let Some(slot) = inner.entities.get_mut(id) else {
            return false;
        };
        let entity_type = slot.data.entity_type();
        let mut data = slot.data.clone();
        f(&mut data);
        if data.entity_type() != entity_type {
            warn!(
                "ignoring update of `{}`: entity type cannot change ({} -> {})",
                uri,
                entity_type,
                data.entity_type()
            );
            return false;
        }
        Rc::make_mut(slot).data = data;
        inner.revision += 1;
        true
    }

    /// Children of `uri` along `edge_type`, in insertion order.
    pub fn children(&self, uri: &str, edge_type: &EdgeType) -> Vec<EntityRef> {
        let inner = self.inner.borrow();
        match inner.lookup(uri) {
            Some(id) => inner.children(id, edge_type).map(|c| inner.entities[c].clone()).collect(),
            None => vec![],
        }
    }

    pub(crate) fn children_by_id(&self, id: EntityId, edge_type: &EdgeType) -> SmallVec<[EntityRef; 8]> {
        let inner = self.inner.borrow();
        inner.children(id, edge_type).map(|c| inner.entities[c].clone()).collect()
    }

    pub(crate) fn has_children(&self, id: EntityId, edge_type: &EdgeType) -> bool {
        self.inner.borrow().children(id, edge_type).next().is_some()
    }

    /// Target of the first `edge_type` edge going out of `uri`.
    pub fn parent(&self, uri: &str, edge_type: &EdgeType) -> Option<EntityRef> {
        let inner = self.inner.borrow();
        let id = inner.lookup(uri)?;
        inner.parent(id, edge_type).map(|p| inner.entities[p].clone())
    }

    pub(crate) fn parent_by_id(&self, id: EntityId, edge_type: &EdgeType) -> Option<EntityRef> {
        let inner = self.inner.borrow();
        inner.parent(id, edge_type).map(|p| inner.entities[p].clone())
    }

    /// All edges going out of `uri`, as `(edge type, target)` pairs.
    pub fn edges_from(&self, uri: &str) -> Vec<(EdgeType, EntityRef)> {
        let inner = self.inner.borrow();
        let Some(id) = inner.lookup(uri) else {
            return vec![];
        };
        inner
            .outgoing
            .get(id)
            .into_iter()
            .flatten()
            .map(|edge| (edge.edge_type.clone(), inner.entities[edge.to].clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of mutations applied to the store so far.
    pub fn revision(&self) -> u64 {
        self.inner.borrow().revision
    }

    /// Releases all entities and edges.
    ///
    /// The store should not be used afterwards; lookups return nothing.
    pub fn dispose(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.entities.clear();
        inner.by_uri.clear();
        inner.outgoing.clear();
        inner.incoming.clear();
        inner.revision += 1;
        inner.disposed = true;
    }
}

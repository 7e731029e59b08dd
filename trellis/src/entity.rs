//! Entities and edges stored in the `EntityStore`.
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, rc::Rc};
use string_cache::DefaultAtom;

////////////////////////////////////////////////////////////////////////////////////////////////////

slotmap::new_key_type! {
    /// Arena index of an entity inside an `EntityStore`.
    pub struct EntityId;
}

/// Shared handle to an entity snapshot.
///
/// Attribute updates replace the snapshot in the store; handles obtained before the update keep
/// seeing the old attributes.
pub type EntityRef = Rc<Entity>;

////////////////////////////////////////////////////////////////////////////////////////////////////

/// Type of an edge between two entities.
///
/// Edge types are interned: comparing two edge types is a pointer comparison.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct EdgeType(DefaultAtom);

impl EdgeType {
    pub fn new(name: &str) -> EdgeType {
        EdgeType(DefaultAtom::from(name))
    }

    /// The default traversal edge type, pointing from a child to its parent.
    pub fn parent() -> EdgeType {
        EdgeType::new("parent")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EdgeType {
    fn default() -> Self {
        EdgeType::parent()
    }
}

impl From<&str> for EdgeType {
    fn from(name: &str) -> Self {
        EdgeType::new(name)
    }
}

impl From<String> for EdgeType {
    fn from(name: String) -> Self {
        EdgeType(DefaultAtom::from(name))
    }
}

impl From<EdgeType> for String {
    fn from(edge_type: EdgeType) -> Self {
        edge_type.as_str().to_owned()
    }
}

impl fmt::Debug for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outgoing edge declared when adding an entity: `(edge_type, new entity, to)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EdgeSpec {
    pub edge_type: EdgeType,
    /// URI of an existing entity.
    pub to: String,
}

impl EdgeSpec {
    pub fn new(edge_type: impl Into<EdgeType>, to: impl Into<String>) -> EdgeSpec {
        EdgeSpec {
            edge_type: edge_type.into(),
            to: to.into(),
        }
    }

    /// Edge of the default traversal type to the specified parent.
    pub fn parent(to: impl Into<String>) -> EdgeSpec {
        EdgeSpec::new(EdgeType::parent(), to)
    }
}

/// A stored edge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Edge {
    pub edge_type: EdgeType,
    pub from: EntityId,
    pub to: EntityId,
}

////////////////////////////////////////////////////////////////////////////////////////////////////

/// Discriminator of `EntityData`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Session,
    Thread,
    Frame,
    Scope,
    Variable,
    Generic,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Session => "session",
            EntityType::Thread => "thread",
            EntityType::Frame => "frame",
            EntityType::Scope => "scope",
            EntityType::Variable => "variable",
            EntityType::Generic => "generic",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionAttrs {
    pub name: String,
    pub adapter: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadAttrs {
    pub thread_id: i64,
    pub name: String,
    pub stopped: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameAttrs {
    pub frame_id: i64,
    pub name: String,
    pub source: Option<String>,
    pub line: u32,
    pub column: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeAttrs {
    pub name: String,
    /// Handle used by the data source to fetch the children of this scope (0 if none).
    pub variables_reference: i64,
    pub expensive: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableAttrs {
    pub name: String,
    pub value: String,
    pub type_name: Option<String>,
    pub variables_reference: i64,
}

/// Attributes of an entity, one strongly-typed variant per entity type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntityData {
    Session(SessionAttrs),
    Thread(ThreadAttrs),
    Frame(FrameAttrs),
    Scope(ScopeAttrs),
    Variable(VariableAttrs),
    /// Untyped attributes, for entity kinds the core knows nothing about.
    Generic { attrs: BTreeMap<String, String> },
}

impl EntityData {
    pub fn entity_type(&self) -> EntityType {
        match self {
            EntityData::Session(_) => EntityType::Session,
            EntityData::Thread(_) => EntityType::Thread,
            EntityData::Frame(_) => EntityType::Frame,
            EntityData::Scope(_) => EntityType::Scope,
            EntityData::Variable(_) => EntityType::Variable,
            EntityData::Generic { .. } => EntityType::Generic,
        }
    }

    /// Human-readable name, if the attributes carry one.
    pub fn name(&self) -> Option<&str> {
        match self {
            EntityData::Session(attrs) => Some(&attrs.name),
            EntityData::Thread(attrs) => Some(&attrs.name),
            EntityData::Frame(attrs) => Some(&attrs.name),
            EntityData::Scope(attrs) => Some(&attrs.name),
            EntityData::Variable(attrs) => Some(&attrs.name),
            EntityData::Generic { attrs } => attrs.get("name").map(String::as_str),
        }
    }

    pub fn session(name: impl Into<String>) -> EntityData {
        EntityData::Session(SessionAttrs {
            name: name.into(),
            adapter: None,
        })
    }

    pub fn thread(thread_id: i64, name: impl Into<String>) -> EntityData {
        EntityData::Thread(ThreadAttrs {
            thread_id,
            name: name.into(),
            stopped: true,
        })
    }

    pub fn frame(frame_id: i64, name: impl Into<String>) -> EntityData {
        EntityData::Frame(FrameAttrs {
            frame_id,
            name: name.into(),
            ..Default::default()
        })
    }

    pub fn scope(name: impl Into<String>) -> EntityData {
        EntityData::Scope(ScopeAttrs {
            name: name.into(),
            ..Default::default()
        })
    }

    pub fn variable(name: impl Into<String>, value: impl Into<String>) -> EntityData {
        EntityData::Variable(VariableAttrs {
            name: name.into(),
            value: value.into(),
            ..Default::default()
        })
    }

    pub fn generic(attrs: impl IntoIterator<Item = (String, String)>) -> EntityData {
        EntityData::Generic {
            attrs: attrs.into_iter().collect(),
        }
    }
}

/// Identity and attributes of an entity about to be added to the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityAttrs {
    pub uri: String,
    pub key: String,
    pub data: EntityData,
}

impl EntityAttrs {
    pub fn new(uri: impl Into<String>, key: impl Into<String>, data: EntityData) -> EntityAttrs {
        EntityAttrs {
            uri: uri.into(),
            key: key.into(),
            data,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////

/// A node of the entity graph.
#[derive(Clone, Debug, PartialEq)]
pub struct Entity {
    pub(crate) id: EntityId,
    pub(crate) uri: String,
    pub(crate) key: String,
    pub(crate) data: EntityData,
}

impl Entity {
    /// Arena index of the entity in the store that created it.
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Globally unique identity.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Key among siblings, used to build positional paths.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn entity_type(&self) -> EntityType {
        self.data.entity_type()
    }

    pub fn data(&self) -> &EntityData {
        &self.data
    }

    /// Text to display for the entity: its name if it has one, otherwise its key.
    pub fn label(&self) -> &str {
        self.data.name().unwrap_or(&self.key)
    }
}

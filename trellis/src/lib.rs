//! Tree exploration state for debugger-like entity graphs.
//!
//! * `EntityStore`: a graph of typed entities with typed edges.
//! * `TreeWindow`: a virtualized, expandable tree view derived from the store along one edge type.
//! * `ExplorationLens`: remembers what the user expanded and focused relative to a *context* node,
//!   and replays it when the context moves (e.g. from one stack frame to the next).
//!
//! Everything here is single-threaded: state is shared with `Rc` and mutated through `RefCell`.

// public modules
pub mod vuri;

// internal modules
mod entity;
mod error;
mod lens;
mod options;
mod store;
mod window;

// public exports
pub use entity::{
    Edge, EdgeSpec, EdgeType, Entity, EntityAttrs, EntityData, EntityId, EntityRef, EntityType, FrameAttrs, ScopeAttrs,
    SessionAttrs, ThreadAttrs, VariableAttrs,
};
pub use error::StoreError;
pub use lens::{ContextSignal, ExplorationLens, LensState, Pattern};
pub use options::{LensOptions, WindowOptions};
pub use store::EntityStore;
pub use vuri::Vuri;
pub use window::{ChangeFlags, TreeWindow, WindowChange, WindowItem};

// reexports
pub use trellis_common::Data;
pub use trellis_signal::{Signal, SubscriberId, Subscription};

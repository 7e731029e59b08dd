//! Virtualized tree view over an entity store.
use crate::{
    entity::{EntityId, EntityRef},
    options::WindowOptions,
    store::EntityStore,
    vuri::{self, Vuri},
};
use bitflags::bitflags;
use std::{
    cell::{Cell, RefCell},
    collections::{HashMap, HashSet},
    fmt,
    rc::Rc,
};
use tracing::{trace, warn};
use trellis_signal::Signal;

////////////////////////////////////////////////////////////////////////////////////////////////////

bitflags! {
    /// What changed during a `TreeWindow::refresh`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ChangeFlags: u32 {
        const NONE = 0;
        /// The materialized items differ from the previous refresh.
        const ITEMS = (1 << 0);
        /// Nodes never seen before were reached.
        const DISCOVERED = (1 << 1);
    }
}

/// Notification emitted on `TreeWindow::changes`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WindowChange {
    /// A collapse state entry was created for a node position.
    Discovered(Vuri),
    /// A refresh completed; carries the new window revision.
    Refreshed(u64),
}

/// A materialized row of the window.
#[derive(Clone, Debug)]
pub struct WindowItem {
    pub vuri: Vuri,
    pub entity: EntityRef,
    /// Distance from the root (the root has depth 0).
    pub depth: usize,
    /// Whether the node has children along the traversal edge.
    pub has_children: bool,
    pub expanded: bool,
}

impl WindowItem {
    fn same_row(&self, other: &WindowItem) -> bool {
        self.vuri == other.vuri
            && Rc::ptr_eq(&self.entity, &other.entity)
            && self.depth == other.depth
            && self.has_children == other.has_children
            && self.expanded == other.expanded
    }
}

/// Result of the last walk, including nodes outside of the materialized range.
#[derive(Default)]
struct Walk {
    /// Every position reached by the walk.
    walked: HashSet<Vuri>,
    /// Visible positions in display order.
    visible: Vec<Vuri>,
}

////////////////////////////////////////////////////////////////////////////////////////////////////

/// A virtualized, expandable tree view derived from an `EntityStore`.
///
/// The tree is obtained by following `WindowOptions::edge_type` edges backwards from the root
/// entity (edges point from a child to its parent). Expansion and focus are keyed by `Vuri`
/// (position), not by entity, and are owned by the window.
///
/// The window never observes the store: call `refresh` after mutating the store.
pub struct TreeWindow {
    store: Rc<EntityStore>,
    root_uri: String,
    options: WindowOptions,
    focus: Signal<Option<Vuri>>,
    /// Per-position collapse state. Positions reached for the first time default to collapsed.
    collapsed: RefCell<HashMap<Vuri, Signal<bool>>>,
    items: RefCell<Vec<WindowItem>>,
    walk: RefCell<Walk>,
    changes: Signal<Option<WindowChange>>,
    revision: Cell<u64>,
    disposed: Cell<bool>,
}

impl fmt::Debug for TreeWindow {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TreeWindow")
            .field("root_uri", &self.root_uri)
            .field("options", &self.options)
            .field("focus", &self.focus.get())
            .field("items", &self.items.borrow().len())
            .field("revision", &self.revision.get())
            .finish_non_exhaustive()
    }
}

impl TreeWindow {
    /// Creates a window rooted at the entity `root_uri`.
    ///
    /// The window is empty until the first `refresh`.
    pub fn new(store: Rc<EntityStore>, root_uri: impl Into<String>, options: WindowOptions) -> TreeWindow {
        TreeWindow {
            store,
            root_uri: root_uri.into(),
            options,
            focus: Signal::new(None),
            collapsed: RefCell::new(HashMap::new()),
            items: RefCell::new(vec![]),
            walk: RefCell::new(Walk::default()),
            changes: Signal::new(None),
            revision: Cell::new(0),
            disposed: Cell::new(false),
        }
    }

    pub fn store(&self) -> &Rc<EntityStore> {
        &self.store
    }

    pub fn options(&self) -> &WindowOptions {
        &self.options
    }

    /// Position of the root entity, if it exists in the store.
    pub fn root_vuri(&self) -> Option<Vuri> {
        self.store.get(&self.root_uri).map(|root| Vuri::new(root.key()))
    }

    fn check_disposed(&self, op: &str) -> bool {
        if self.disposed.get() {
            warn!("TreeWindow::{op} called on a disposed window");
        }
        self.disposed.get()
    }

    //----------------------------------------------------------------------------------------------
    // expansion

    /// Expands the node at `vuri`.
    pub fn expand(&self, vuri: &Vuri) {
        self.set_collapsed(vuri, false);
    }

    /// Collapses the node at `vuri`.
    pub fn collapse(&self, vuri: &Vuri) {
        self.set_collapsed(vuri, true);
    }

    /// Flips the collapse state of the node at `vuri`.
    pub fn toggle(&self, vuri: &Vuri) {
        self.set_collapsed(vuri, !self.is_collapsed(vuri));
    }

    /// Sets the collapse state of a position.
    ///
    /// Positions that were never reached get a state entry immediately, recording the intent until
    /// the node shows up. Setting the current state again does not notify.
    pub fn set_collapsed(&self, vuri: &Vuri, collapsed: bool) {
        if self.check_disposed("set_collapsed") {
            return;
        }
        let existing = self.collapsed.borrow().get(vuri).cloned();
        match existing {
            Some(signal) => {
                // no borrow held: subscribers may call back into the window
                signal.update(collapsed);
            }
            None => {
                self.collapsed
                    .borrow_mut()
                    .insert(vuri.clone(), Signal::new(collapsed));
                self.changes.set(Some(WindowChange::Discovered(vuri.clone())));
            }
        }
    }

    /// Whether the node at `vuri` is collapsed. Unknown positions are collapsed.
    pub fn is_collapsed(&self, vuri: &Vuri) -> bool {
        self.collapsed.borrow().get(vuri).map_or(true, |s| s.get())
    }

    /// Expands every proper ancestor of `vuri`, so that it is reached by the next walk.
    pub fn reveal(&self, vuri: &Vuri) {
        for ancestor in vuri.ancestors() {
            self.expand(&ancestor);
        }
    }

    /// The collapse state signal of a position, if the position has one.
    pub fn collapsed_signal(&self, vuri: &Vuri) -> Option<Signal<bool>> {
        self.collapsed.borrow().get(vuri).cloned()
    }

    /// All positions with a collapse state entry, with their signal.
    pub fn collapsed_signals(&self) -> Vec<(Vuri, Signal<bool>)> {
        self.collapsed
            .borrow()
            .iter()
            .map(|(vuri, signal)| (vuri.clone(), signal.clone()))
            .collect()
    }

    //----------------------------------------------------------------------------------------------
    // focus

    /// Moves the focus to `vuri`. The node does not have to be visible.
    pub fn focus_on(&self, vuri: &Vuri) {
        if self.check_disposed("focus_on") {
            return;
        }
        self.focus.update(Some(vuri.clone()));
    }

    /// The focused position.
    pub fn focus(&self) -> Option<Vuri> {
        self.focus.get()
    }

    pub fn focus_signal(&self) -> &Signal<Option<Vuri>> {
        &self.focus
    }

    /// Moves the focus to the next visible node of the last walk.
    ///
    /// Focuses the first node if the focus is unset or hidden. Returns the new focus.
    pub fn focus_next(&self) -> Option<Vuri> {
        self.focus_adjacent(1)
    }

    /// Moves the focus to the previous visible node of the last walk.
    pub fn focus_prev(&self) -> Option<Vuri> {
        self.focus_adjacent(-1)
    }

    fn focus_adjacent(&self, delta: isize) -> Option<Vuri> {
        let target = {
            let walk = self.walk.borrow();
            if walk.visible.is_empty() {
                return None;
            }
            let current = self
                .focus
                .with(|focus| focus.as_ref().and_then(|f| walk.visible.iter().position(|v| v == f)));
            let index = match current {
                Some(index) => index.saturating_add_signed(delta).min(walk.visible.len() - 1),
                None => 0,
            };
            walk.visible[index].clone()
        };
        self.focus_on(&target);
        Some(target)
    }

    //----------------------------------------------------------------------------------------------
    // walk results

    /// The rows materialized by the last refresh, in display order.
    pub fn items(&self) -> Vec<WindowItem> {
        self.items.borrow().clone()
    }

    /// Calls `f` with the rows materialized by the last refresh, without cloning them.
    pub fn with_items<R>(&self, f: impl FnOnce(&[WindowItem]) -> R) -> R {
        f(&self.items.borrow())
    }

    /// Whether a row for `vuri` was materialized by the last refresh.
    pub fn is_materialized(&self, vuri: &Vuri) -> bool {
        self.items.borrow().iter().any(|item| &item.vuri == vuri)
    }

    /// Whether `vuri` was reached by the last refresh (materialized or not).
    pub fn contains(&self, vuri: &Vuri) -> bool {
        self.walk.borrow().walked.contains(vuri)
    }

    /// Number of visible nodes in the last walk, including those outside the materialized range.
    pub fn visible_len(&self) -> usize {
        self.walk.borrow().visible.len()
    }

    /// Number of completed refreshes.
    pub fn revision(&self) -> u64 {
        self.revision.get()
    }

    /// Notifications about discovered positions and completed refreshes.
    pub fn changes(&self) -> &Signal<Option<WindowChange>> {
        &self.changes
    }

    //----------------------------------------------------------------------------------------------
    // structure

    /// Computes the position of an entity by following traversal edges up to the root.
    ///
    /// Returns `None` if the entity is unknown or not (yet) connected to the root.
    pub fn locate(&self, uri: &str) -> Option<Vuri> {
        let edge_type = &self.options.edge_type;
        let mut entity = self.store.get(uri)?;
        let mut keys = vec![entity.key().to_owned()];
        // bounded in case the traversal edges contain a cycle
        for _ in 0..=self.store.len() {
            if entity.uri() == self.root_uri {
                keys.reverse();
                let mut separator = [0; 4];
                return Some(Vuri::new(keys.join(&*vuri::SEPARATOR.encode_utf8(&mut separator))));
            }
            entity = self.store.parent_by_id(entity.id(), edge_type)?;
            keys.push(entity.key().to_owned());
        }
        warn!("cycle in `{}` edges above `{}`", edge_type, uri);
        None
    }

    /// Returns the entity at a position, following keys down from the root.
    pub fn resolve(&self, vuri: &Vuri) -> Option<EntityRef> {
        let mut segments = vuri.segments();
        let root = self.store.get(&self.root_uri)?;
        if segments.next()? != root.key() {
            return None;
        }
        segments.try_fold(root, |entity, key| {
            self.store
                .children_by_id(entity.id(), &self.options.edge_type)
                .into_iter()
                .find(|child| child.key() == key)
        })
    }

    //----------------------------------------------------------------------------------------------
    // refresh

    /// Recomputes the materialized rows from the store, the collapse states and the focus.
    ///
    /// Walks the tree depth-first from the root, descending only into expanded nodes. All visible
    /// nodes are walked, but only those within `above`/`below` rows of the focused node (or of the
    /// first row if the focus is not visible) are materialized.
    pub fn refresh(&self) -> ChangeFlags {
        if self.check_disposed("refresh") {
            return ChangeFlags::NONE;
        }

        let edge_type = &self.options.edge_type;
        let mut flags = ChangeFlags::NONE;
        let mut discovered = vec![];
        let mut walk = Walk::default();
        // (entity, depth, expanded) of each visible node, parallel to `walk.visible`
        let mut rows: Vec<(EntityId, usize, bool)> = vec![];

        if let Some(root) = self.store.get(&self.root_uri) {
            let mut collapsed = self.collapsed.borrow_mut();
            let mut visited: HashSet<EntityId> = HashSet::new();
            let mut stack = vec![(Vuri::new(root.key()), root, 0usize)];

            while let Some((vuri, entity, depth)) = stack.pop() {
                if !visited.insert(entity.id()) {
                    warn!("`{}` reached twice along `{}` edges, skipping", entity.uri(), edge_type);
                    continue;
                }
                let expanded = match collapsed.get(&vuri) {
                    Some(signal) => !signal.get(),
                    None => {
                        collapsed.insert(vuri.clone(), Signal::new(true));
                        discovered.push(vuri.clone());
                        false
                    }
                };
                if expanded {
                    let children = self.store.children_by_id(entity.id(), edge_type);
                    stack.extend(
                        children
                            .into_iter()
                            .rev()
                            .map(|child| (vuri.child(child.key()), child, depth + 1)),
                    );
                }
                walk.walked.insert(vuri.clone());
                walk.visible.push(vuri);
                rows.push((entity.id(), depth, expanded));
            }
        } else {
            trace!("root `{}` not in store yet", self.root_uri);
        }

        // virtualization range around the focus
        let anchor = self
            .focus
            .with(|focus| focus.as_ref().and_then(|f| walk.visible.iter().position(|v| v == f)))
            .unwrap_or(0);
        let start = anchor.saturating_sub(self.options.above);
        let end = anchor.saturating_add(self.options.below).saturating_add(1).min(rows.len());

        let items: Vec<WindowItem> = (start..end)
            .filter_map(|i| {
                let (id, depth, expanded) = rows[i];
                let entity = self.store.get_by_id(id)?;
                Some(WindowItem {
                    vuri: walk.visible[i].clone(),
                    has_children: self.store.has_children(id, edge_type),
                    entity,
                    depth,
                    expanded,
                })
            })
            .collect();

        {
            let mut current = self.items.borrow_mut();
            let same = current.len() == items.len() && current.iter().zip(items.iter()).all(|(a, b)| a.same_row(b));
            if !same {
                flags |= ChangeFlags::ITEMS;
            }
            *current = items;
        }
        trace!(
            "refresh: walked {} nodes, materialized {}..{} ({} discovered)",
            walk.visible.len(),
            start,
            end,
            discovered.len()
        );
        *self.walk.borrow_mut() = walk;
        let revision = self.revision.get() + 1;
        self.revision.set(revision);

        if !discovered.is_empty() {
            flags |= ChangeFlags::DISCOVERED;
        }
        // notify once all borrows are released
        for vuri in discovered {
            self.changes.set(Some(WindowChange::Discovered(vuri)));
        }
        self.changes.set(Some(WindowChange::Refreshed(revision)));
        flags
    }

    /// Releases the subscriptions and the state maps. Subsequent calls are ignored.
    pub fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        let collapsed = std::mem::take(&mut *self.collapsed.borrow_mut());
        for signal in collapsed.values() {
            signal.dispose();
        }
        self.focus.dispose();
        self.changes.dispose();
        self.items.borrow_mut().clear();
        *self.walk.borrow_mut() = Walk::default();
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EdgeSpec, EntityAttrs, EntityData};

    fn vuri(s: &str) -> Vuri {
        Vuri::new(s)
    }

    /// root
    /// ├─ a
    /// │  ├─ a1
    /// │  └─ a2
    /// └─ b
    fn small_tree() -> Rc<EntityStore> {
        let store = Rc::new(EntityStore::new());
        store.add(EntityAttrs::new("root", "root", EntityData::session("s")), []);
        store.add(EntityAttrs::new("a", "a", EntityData::scope("a")), [EdgeSpec::parent("root")]);
        store.add(EntityAttrs::new("a1", "a1", EntityData::variable("a1", "1")), [EdgeSpec::parent("a")]);
        store.add(EntityAttrs::new("a2", "a2", EntityData::variable("a2", "2")), [EdgeSpec::parent("a")]);
        store.add(EntityAttrs::new("b", "b", EntityData::scope("b")), [EdgeSpec::parent("root")]);
        store
    }

    fn visible(window: &TreeWindow) -> Vec<String> {
        window.with_items(|items| items.iter().map(|i| i.vuri.to_string()).collect())
    }

    #[test]
    fn new_nodes_start_collapsed() {
        let window = TreeWindow::new(small_tree(), "root", WindowOptions::default());
        let flags = window.refresh();
        assert!(flags.contains(ChangeFlags::ITEMS | ChangeFlags::DISCOVERED));
        assert_eq!(visible(&window), ["root"]);
        assert!(window.is_collapsed(&vuri("root")));

        window.expand(&vuri("root"));
        window.refresh();
        assert_eq!(visible(&window), ["root", "root/a", "root/b"]);

        window.expand(&vuri("root/a"));
        window.refresh();
        assert_eq!(visible(&window), ["root", "root/a", "root/a/a1", "root/a/a2", "root/b"]);
        let depths: Vec<_> = window.with_items(|items| items.iter().map(|i| i.depth).collect());
        assert_eq!(depths, [0, 1, 2, 2, 1]);

        // nothing changed
        assert_eq!(window.refresh(), ChangeFlags::NONE);
    }

    #[test]
    fn expand_is_idempotent_and_records_intent() {
        let window = TreeWindow::new(small_tree(), "root", WindowOptions::default());
        // expanded before it was ever reached
        window.expand(&vuri("root/a"));
        window.expand(&vuri("root/a"));
        assert!(!window.is_collapsed(&vuri("root/a")));
        window.expand(&vuri("root"));
        window.refresh();
        assert!(window.is_materialized(&vuri("root/a/a1")));

        window.collapse(&vuri("root/a"));
        window.refresh();
        assert!(!window.is_materialized(&vuri("root/a/a1")));
        assert!(!window.contains(&vuri("root/a/a1")));

        window.toggle(&vuri("root/a"));
        assert!(!window.is_collapsed(&vuri("root/a")));
    }

    #[test]
    fn items_are_bounded_around_focus() {
        let window = TreeWindow::new(small_tree(), "root", WindowOptions::default().bounds(1, 1));
        window.expand(&vuri("root"));
        window.expand(&vuri("root/a"));
        window.refresh();
        // no focus: anchored at the first row
        assert_eq!(visible(&window), ["root", "root/a"]);
        assert_eq!(window.visible_len(), 5);

        window.focus_on(&vuri("root/a/a2"));
        window.refresh();
        assert_eq!(visible(&window), ["root/a/a1", "root/a/a2", "root/b"]);
        // walked, but not materialized
        assert!(window.contains(&vuri("root")));
        assert!(!window.is_materialized(&vuri("root")));
    }

    #[test]
    fn focus_moves_between_visible_rows() {
        let window = TreeWindow::new(small_tree(), "root", WindowOptions::default());
        window.expand(&vuri("root"));
        window.refresh();
        assert_eq!(window.focus_next(), Some(vuri("root")));
        assert_eq!(window.focus_next(), Some(vuri("root/a")));
        assert_eq!(window.focus_next(), Some(vuri("root/b")));
        assert_eq!(window.focus_next(), Some(vuri("root/b")));
        assert_eq!(window.focus_prev(), Some(vuri("root/a")));
        assert_eq!(window.focus(), Some(vuri("root/a")));
    }

    #[test]
    fn locate_and_resolve() {
        let window = TreeWindow::new(small_tree(), "root", WindowOptions::default());
        assert_eq!(window.root_vuri(), Some(vuri("root")));
        assert_eq!(window.locate("a2"), Some(vuri("root/a/a2")));
        assert_eq!(window.locate("root"), Some(vuri("root")));
        assert_eq!(window.locate("missing"), None);
        assert_eq!(window.resolve(&vuri("root/a/a1")).unwrap().uri(), "a1");
        assert!(window.resolve(&vuri("root/a/zz")).is_none());
        assert!(window.resolve(&vuri("other/a")).is_none());

        // not connected to the root
        window.store().add(EntityAttrs::new("loose", "loose", EntityData::scope("loose")), []);
        assert_eq!(window.locate("loose"), None);
    }

    #[test]
    fn changes_announce_discovery_and_refresh() {
        let window = TreeWindow::new(small_tree(), "root", WindowOptions::default());
        let log = Rc::new(RefCell::new(vec![]));
        let _sub = window.changes().subscribe({
            let log = log.clone();
            move |change| log.borrow_mut().push(change.clone())
        });
        window.refresh();
        window.expand(&vuri("root/b/unknown"));
        assert_eq!(
            *log.borrow(),
            [
                Some(WindowChange::Discovered(vuri("root"))),
                Some(WindowChange::Refreshed(1)),
                Some(WindowChange::Discovered(vuri("root/b/unknown"))),
            ]
        );
    }

    #[test]
    fn other_edge_types_are_invisible() {
        let store = small_tree();
        store.add(EntityAttrs::new("w", "w", EntityData::generic([])), [EdgeSpec::new("watches", "root")]);
        let window = TreeWindow::new(store, "root", WindowOptions::default());
        window.expand(&vuri("root"));
        window.refresh();
        assert_eq!(visible(&window), ["root", "root/a", "root/b"]);
    }

    #[test]
    fn disposed_window_ignores_calls() {
        let window = TreeWindow::new(small_tree(), "root", WindowOptions::default());
        window.refresh();
        let sub = window.focus_signal().subscribe(|_| {});
        window.dispose();
        assert!(!sub.is_active());
        window.expand(&vuri("root"));
        assert_eq!(window.refresh(), ChangeFlags::NONE);
        assert!(window.items().is_empty());
        assert!(window.is_disposed());
    }
}

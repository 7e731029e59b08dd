//! Context-relative exploration state.
//!
//! An `ExplorationLens` watches the expansion and focus changes a user makes in a `TreeWindow`
//! and records them as a *pattern* relative to the current context node. When the context
//! changes, the pattern is burned into the old context's subtree (which then keeps its state
//! independently) and transposed onto the new context's subtree.
use crate::{
    entity::EntityRef,
    options::LensOptions,
    vuri::{self, Vuri},
    window::{TreeWindow, WindowChange},
};
use serde::Serialize;
use std::{
    cell::{Cell, RefCell},
    collections::{BTreeMap, HashMap},
    fmt,
    rc::{Rc, Weak},
};
use tracing::{debug, trace, warn};
use trellis_signal::{Signal, Subscription};

/// Signal holding the current context entity, owned by the context-providing collaborator.
pub type ContextSignal = Signal<Option<EntityRef>>;

/// Focus and expansion state relative to the context node.
///
/// Keys are paths relative to the context vuri; the empty string is the context node itself.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Pattern {
    pub focus: Option<String>,
    pub expansion: BTreeMap<String, bool>,
}

/// Read-only snapshot of a lens, for diagnostics.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LensState {
    pub focus: Option<String>,
    pub expansion: BTreeMap<String, bool>,
    pub context_vuri: Option<Vuri>,
    pub context_entity_uri: Option<String>,
    pub pending_path: Option<String>,
}

////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Default)]
struct LensData {
    pattern: Pattern,
    context_uri: Option<String>,
    context_vuri: Option<Vuri>,
    /// The context changed to an entity that could not be located yet: the transpose runs once a
    /// refresh makes it locatable.
    awaiting_context: bool,
    pending: Option<String>,
    pending_attempts: u32,
    /// Expansion entries whose target was not walked during the transpose, reapplied on refresh.
    deferred: Vec<(String, bool)>,
}

struct LensInner {
    window: Rc<TreeWindow>,
    context: ContextSignal,
    options: LensOptions,
    data: RefCell<LensData>,
    /// Set while the lens writes window state itself; tracking ignores these writes.
    applying: Cell<bool>,
    /// Focus, context and window change subscriptions.
    subscriptions: RefCell<Vec<Subscription>>,
    /// One subscription per collapse state signal of the window.
    node_subscriptions: RefCell<HashMap<Vuri, Subscription>>,
    disposed: Cell<bool>,
}

impl LensInner {
    /// Runs `f` with tracking suspended.
    fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        let prev = self.applying.replace(true);
        let result = f();
        self.applying.set(prev);
        result
    }

    fn context_vuri(&self) -> Option<Vuri> {
        self.data.borrow().context_vuri.clone()
    }

    //----------------------------------------------------------------------------------------------
    // tracking

    fn on_focus_changed(&self, focus: Option<&Vuri>) {
        if self.disposed.get() || self.applying.get() {
            return;
        }
        let Some(focus) = focus else {
            return;
        };
        let mut data = self.data.borrow_mut();
        // the user moved the focus: a deferred focus target would override their choice
        data.pending = None;
        let Some(relative) = data.context_vuri.as_ref().and_then(|ctx| focus.relative_to(ctx)) else {
            trace!("focus on {} is outside of the context, not tracked", focus);
            return;
        };
        let relative = relative.to_owned();
        trace!("pattern focus = {:?}", relative);
        data.pattern.focus = Some(relative);
    }

    fn on_collapsed_changed(&self, vuri: &Vuri, collapsed: bool) {
        if self.disposed.get() || self.applying.get() {
            return;
        }
        let Some(context_vuri) = self.context_vuri() else {
            return;
        };
        let Some(relative) = vuri.relative_to(&context_vuri) else {
            trace!("expansion of {} is outside of the context, not tracked", vuri);
            return;
        };
        // only nodes the user can see are recorded
        if !self.window.is_materialized(vuri) {
            trace!("expansion of {} is not on screen, not tracked", vuri);
            return;
        }
        let relative = relative.to_owned();
        trace!("pattern expansion[{:?}] = {}", relative, !collapsed);
        self.data.borrow_mut().pattern.expansion.insert(relative, !collapsed);
    }

    fn on_window_change(self: &Rc<Self>, change: Option<&WindowChange>) {
        if self.disposed.get() {
            return;
        }
        match change {
            Some(WindowChange::Discovered(vuri)) => self.watch_node(vuri),
            Some(WindowChange::Refreshed(_)) if !self.applying.get() => self.on_refresh(),
            _ => {}
        }
    }

    fn watch_node(self: &Rc<Self>, vuri: &Vuri) {
        if self.node_subscriptions.borrow().contains_key(vuri) {
            return;
        }
        let Some(signal) = self.window.collapsed_signal(vuri) else {
            return;
        };
        let weak = Rc::downgrade(self);
        let node = vuri.clone();
        let subscription = signal.subscribe(move |collapsed| {
            if let Some(this) = weak.upgrade() {
                this.on_collapsed_changed(&node, *collapsed);
            }
        });
        self.node_subscriptions.borrow_mut().insert(vuri.clone(), subscription);
    }

    //----------------------------------------------------------------------------------------------
    // refresh: deferred context, deferred expansion and pending focus

    fn on_refresh(&self) {
        let (awaiting, context_uri) = {
            let data = self.data.borrow();
            (data.awaiting_context, data.context_uri.clone())
        };
        if awaiting {
            if let Some(uri) = context_uri {
                if let Some(context_vuri) = self.window.locate(&uri) {
                    debug!("context `{}` located at {}", uri, context_vuri);
                    {
                        let mut data = self.data.borrow_mut();
                        data.awaiting_context = false;
                        data.context_vuri = Some(context_vuri);
                    }
                    self.transpose();
                }
            }
            return;
        }
        self.catch_up();
    }

    /// Reapplies what the last transpose could not reach yet.
    fn catch_up(&self) {
        let (context_vuri, deferred) = {
            let mut data = self.data.borrow_mut();
            let Some(context_vuri) = data.context_vuri.clone() else {
                return;
            };
            (context_vuri, std::mem::take(&mut data.deferred))
        };

        if !deferred.is_empty() {
            let count = deferred.len();
            let remaining = self.untracked(|| self.apply_expansion(&context_vuri, deferred));
            if remaining.len() < count {
                debug!("applied {} deferred expansion entries under {}", count - remaining.len(), context_vuri);
            }
            self.data.borrow_mut().deferred = remaining;
        }

        let Some(pending) = self.data.borrow().pending.clone() else {
            return;
        };

        let target = context_vuri.join(&pending);
        if self.window.contains(&target) {
            debug!("pending focus path {:?} resolved to {}", pending, target);
            self.data.borrow_mut().pending = None;
            self.untracked(|| {
                self.window.focus_on(&target);
                self.window.refresh();
            });
            return;
        }

        let mut data = self.data.borrow_mut();
        data.pending_attempts += 1;
        if let Some(max) = self.options.max_pending_retries {
            if data.pending_attempts >= max {
                warn!(
                    "giving up on pending focus path {:?} after {} refreshes",
                    pending, data.pending_attempts
                );
                data.pending = None;
                data.deferred.clear();
            }
        }
    }

    //----------------------------------------------------------------------------------------------
    // context transitions

    fn on_context_changed(&self, context: Option<&EntityRef>) {
        if self.disposed.get() {
            return;
        }
        let new_uri = context.map(|entity| entity.uri().to_owned());
        if self.data.borrow().context_uri == new_uri {
            return;
        }
        self.transition(new_uri);
    }

    fn transition(&self, new_uri: Option<String>) {
        let (old_vuri, pattern) = {
            let data = self.data.borrow();
            (data.context_vuri.clone(), data.pattern.clone())
        };
        debug!(
            "context transition {:?} -> {:?} ({} expansion entries, focus {:?})",
            old_vuri,
            new_uri,
            pattern.expansion.len(),
            pattern.focus
        );

        if let Some(old_vuri) = &old_vuri {
            self.burn(old_vuri, &pattern);
        }

        let located = new_uri.as_deref().and_then(|uri| self.window.locate(uri));
        {
            let mut data = self.data.borrow_mut();
            data.awaiting_context = new_uri.is_some() && located.is_none();
            data.context_uri = new_uri;
            data.context_vuri = located.clone();
            // no carry-over of unresolved targets across contexts
            data.pending = None;
            data.pending_attempts = 0;
            data.deferred.clear();
        }

        if located.is_some() {
            self.transpose();
        } else if self.data.borrow().awaiting_context {
            debug!("new context is not reachable from the window root yet, transpose deferred");
        }
    }

    /// Writes the pattern as absolute state under `old_vuri`.
    fn burn(&self, old_vuri: &Vuri, pattern: &Pattern) {
        self.untracked(|| {
            for (relative, expanded) in &pattern.expansion {
                self.window.set_collapsed(&old_vuri.join(relative), !expanded);
            }
            if let Some(focus) = &pattern.focus {
                self.window.focus_on(&old_vuri.join(focus));
            }
        });
    }

    /// Applies the pattern onto the current context's subtree.
    fn transpose(&self) {
        let (context_vuri, pattern) = {
            let data = self.data.borrow();
            match &data.context_vuri {
                Some(ctx) => (ctx.clone(), data.pattern.clone()),
                None => return,
            }
        };

        let (pending, deferred) = self.untracked(|| {
            self.window.reveal(&context_vuri);
            self.window.refresh();

            let entries = pattern.expansion.iter().map(|(r, e)| (r.clone(), *e)).collect();
            let deferred = self.apply_expansion(&context_vuri, entries);
            for (relative, _) in &deferred {
                trace!("expansion entry {:?} has no counterpart under {} yet", relative, context_vuri);
            }

            let pending = match &pattern.focus {
                Some(relative) => {
                    let (target, exact) = self.deepest_match(&context_vuri, relative);
                    self.window.focus_on(&target);
                    if exact {
                        None
                    } else {
                        debug!("focus path {:?} degraded to {}", relative, target);
                        Some(relative.clone())
                    }
                }
                None => {
                    self.window.focus_on(&context_vuri);
                    None
                }
            };
            self.window.refresh();
            (pending, deferred)
        });

        let mut data = self.data.borrow_mut();
        data.pending = pending;
        data.pending_attempts = 0;
        data.deferred = deferred;
    }

    /// Sets the collapse state of every entry whose target was walked by the last refresh.
    ///
    /// Shallowest entries go first, and the window is refreshed after each round so that targets
    /// under a freshly expanded node can be reached. Returns the entries that were never walked.
    fn apply_expansion(&self, context_vuri: &Vuri, mut entries: Vec<(String, bool)>) -> Vec<(String, bool)> {
        entries.sort_by_key(|(relative, _)| vuri::path_depth(relative));
        while !entries.is_empty() {
            let before = entries.len();
            entries.retain(|(relative, expanded)| {
                let target = context_vuri.join(relative);
                if self.window.contains(&target) {
                    self.window.set_collapsed(&target, !expanded);
                    false
                } else {
                    true
                }
            });
            if entries.len() == before {
                break;
            }
            self.window.refresh();
        }
        entries
    }

    /// Finds the deepest walked position along `relative` under `context_vuri`.
    ///
    /// Returns the position and whether it is the full path. Falls back to the context itself.
    fn deepest_match(&self, context_vuri: &Vuri, relative: &str) -> (Vuri, bool) {
        let mut candidate = relative;
        while !candidate.is_empty() {
            let target = context_vuri.join(candidate);
            if self.window.contains(&target) {
                return (target, candidate.len() == relative.len());
            }
            candidate = vuri::parent_path(candidate).unwrap_or_default();
        }
        (context_vuri.clone(), relative.is_empty())
    }

    //----------------------------------------------------------------------------------------------

    fn state(&self) -> LensState {
        let data = self.data.borrow();
        LensState {
            focus: data.pattern.focus.clone(),
            expansion: data.pattern.expansion.clone(),
            context_vuri: data.context_vuri.clone(),
            context_entity_uri: data.context_uri.clone(),
            pending_path: data.pending.clone(),
        }
    }

    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        let subscriptions = std::mem::take(&mut *self.subscriptions.borrow_mut());
        let node_subscriptions = std::mem::take(&mut *self.node_subscriptions.borrow_mut());
        for mut subscription in subscriptions.into_iter().chain(node_subscriptions.into_values()) {
            subscription.unsubscribe();
        }
        debug!("lens disposed");
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////

/// Tracks the user's exploration of a `TreeWindow` relative to a changing context node.
///
/// # Example
///
/// With frame `A` as context, the user expands `A/Locals` and focuses `A/Locals/x`. The pattern
/// becomes `{ focus: "Locals/x", expansion: { "Locals": true } }`. When the context switches to
/// frame `B`, `B/Locals` is expanded and `B/Locals/x` focused; `A/Locals` stays expanded and can
/// be collapsed without affecting `B`.
///
/// If `B/Locals/x` does not exist, the focus falls back to the deepest existing ancestor
/// (`B/Locals`, or `B` itself) and the full path is kept as the *pending path*, retried on every
/// window refresh until it resolves or the context changes again. Expansion entries without a
/// counterpart under `B` are likewise kept and applied once their node shows up.
///
/// Dropping the lens disposes it.
pub struct ExplorationLens {
    inner: Rc<LensInner>,
}

impl fmt::Debug for ExplorationLens {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ExplorationLens")
            .field("state", &self.inner.state())
            .field("disposed", &self.inner.disposed.get())
            .finish_non_exhaustive()
    }
}

impl ExplorationLens {
    /// Creates a lens observing `window` and `context`.
    pub fn new(window: Rc<TreeWindow>, context: ContextSignal) -> ExplorationLens {
        ExplorationLens::with_options(window, context, LensOptions::default())
    }

    pub fn with_options(window: Rc<TreeWindow>, context: ContextSignal, options: LensOptions) -> ExplorationLens {
        let initial_uri = context.with(|c| c.as_ref().map(|entity| entity.uri().to_owned()));
        let initial_vuri = initial_uri.as_deref().and_then(|uri| window.locate(uri));
        let data = LensData {
            awaiting_context: initial_uri.is_some() && initial_vuri.is_none(),
            context_uri: initial_uri,
            context_vuri: initial_vuri,
            ..Default::default()
        };

        let inner = Rc::new(LensInner {
            window: window.clone(),
            context: context.clone(),
            options,
            data: RefCell::new(data),
            applying: Cell::new(false),
            subscriptions: RefCell::new(vec![]),
            node_subscriptions: RefCell::new(HashMap::new()),
            disposed: Cell::new(false),
        });

        let subscriptions = vec![
            window.focus_signal().subscribe(Self::callback(&inner, |this, focus: &Option<Vuri>| {
                this.on_focus_changed(focus.as_ref())
            })),
            window.changes().subscribe(Self::callback(&inner, |this, change: &Option<WindowChange>| {
                this.on_window_change(change.as_ref())
            })),
            context.subscribe(Self::callback(&inner, |this, entity: &Option<EntityRef>| {
                this.on_context_changed(entity.as_ref())
            })),
        ];
        *inner.subscriptions.borrow_mut() = subscriptions;

        for (vuri, _) in window.collapsed_signals() {
            inner.watch_node(&vuri);
        }

        ExplorationLens { inner }
    }

    /// Wraps a handler so that the subscription does not keep the lens alive.
    fn callback<T: 'static>(inner: &Rc<LensInner>, f: impl Fn(&Rc<LensInner>, &T) + 'static) -> impl Fn(&T) + 'static {
        let weak: Weak<LensInner> = Rc::downgrade(inner);
        move |value| {
            if let Some(this) = weak.upgrade() {
                f(&this, value)
            }
        }
    }

    /// Snapshot of the pattern, context and pending path.
    pub fn get_state(&self) -> LensState {
        self.inner.state()
    }

    /// The current pattern.
    pub fn pattern(&self) -> Pattern {
        self.inner.data.borrow().pattern.clone()
    }

    pub fn context_vuri(&self) -> Option<Vuri> {
        self.inner.context_vuri()
    }

    pub fn context(&self) -> &ContextSignal {
        &self.inner.context
    }

    pub fn window(&self) -> &Rc<TreeWindow> {
        &self.inner.window
    }

    /// Number of live subscriptions held by the lens.
    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.borrow().len() + self.inner.node_subscriptions.borrow().len()
    }

    /// Unsubscribes from the window and the context signal. The lens is inert afterwards.
    ///
    /// Calling this more than once is a no-op.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }
}

impl Drop for ExplorationLens {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

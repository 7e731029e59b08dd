//! Debugger-shaped fixture shared by the integration tests.
#![allow(dead_code)]
use std::rc::Rc;
use trellis::{
    ContextSignal, EdgeSpec, EntityAttrs, EntityData, EntityRef, EntityStore, TreeWindow, Vuri, WindowOptions,
};

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .compact()
        .with_target(false)
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

pub fn vuri(s: &str) -> Vuri {
    Vuri::new(s)
}

/// session
/// └─ thread-1
///    ├─ frame-1
///    │  ├─ Locals { x, y }
///    │  └─ Globals { g }
///    └─ frame-2
///       ├─ Locals { x, y }
///       └─ Globals { g }
pub struct Debugger {
    pub store: Rc<EntityStore>,
    pub window: Rc<TreeWindow>,
    pub context: ContextSignal,
}

pub const FRAME_A: &str = "session/thread-1/frame-1";
pub const FRAME_B: &str = "session/thread-1/frame-2";

impl Debugger {
    pub fn new() -> Debugger {
        Debugger::with_options(WindowOptions::default())
    }

    pub fn with_options(options: WindowOptions) -> Debugger {
        init_logging();
        let store = Rc::new(EntityStore::new());
        store.add(EntityAttrs::new("dap:session", "session", EntityData::session("debuggee")), []);
        store.add(
            EntityAttrs::new("dap:thread/1", "thread-1", EntityData::thread(1, "main")),
            [EdgeSpec::parent("dap:session")],
        );
        let debugger = Debugger {
            window: Rc::new(TreeWindow::new(store.clone(), "dap:session", options)),
            context: ContextSignal::new(None),
            store,
        };
        debugger.add_frame(1);
        debugger.add_frame(2);
        debugger.window.refresh();
        debugger
    }

    /// Adds `frame-{id}` without any scope.
    pub fn add_empty_frame(&self, id: i64) -> EntityRef {
        self.store.add(
            EntityAttrs::new(
                format!("dap:frame/{id}"),
                format!("frame-{id}"),
                EntityData::frame(id, format!("fn_{id}")),
            ),
            [EdgeSpec::parent("dap:thread/1")],
        )
    }

    /// Adds `frame-{id}` with `Locals { x, y }` and `Globals { g }`.
    pub fn add_frame(&self, id: i64) -> EntityRef {
        let frame = self.add_empty_frame(id);
        self.add_scope(id, "Locals", &["x", "y"]);
        self.add_scope(id, "Globals", &["g"]);
        frame
    }

    pub fn add_scope(&self, frame: i64, name: &str, variables: &[&str]) {
        let scope_uri = format!("dap:frame/{frame}/{name}");
        self.store.add(
            EntityAttrs::new(&scope_uri, name, EntityData::scope(name)),
            [EdgeSpec::parent(format!("dap:frame/{frame}"))],
        );
        for var in variables {
            self.add_variable(frame, name, var);
        }
    }

    pub fn add_variable(&self, frame: i64, scope: &str, name: &str) {
        self.store.add(
            EntityAttrs::new(
                format!("dap:frame/{frame}/{scope}/{name}"),
                name,
                EntityData::variable(name, "0"),
            ),
            [EdgeSpec::parent(format!("dap:frame/{frame}/{scope}"))],
        );
    }

    pub fn frame(&self, id: i64) -> EntityRef {
        self.store.get(&format!("dap:frame/{id}")).expect("frame not in store")
    }

    pub fn set_context(&self, frame: i64) {
        self.context.set(Some(self.frame(frame)));
    }

    /// Expands a node and refreshes, like a click on a disclosure triangle.
    pub fn open(&self, path: &str) {
        self.window.expand(&vuri(path));
        self.window.refresh();
    }

    pub fn close(&self, path: &str) {
        self.window.collapse(&vuri(path));
        self.window.refresh();
    }

    /// Opens every node from the root down to `path` (included).
    pub fn open_all(&self, path: &str) {
        let target = vuri(path);
        let mut ancestors: Vec<_> = target.ancestors().collect();
        ancestors.reverse();
        for ancestor in ancestors {
            self.open(ancestor.as_str());
        }
        self.open(path);
    }

    pub fn visible(&self) -> Vec<String> {
        self.window.with_items(|items| items.iter().map(|item| item.vuri.to_string()).collect())
    }

    pub fn is_expanded(&self, path: &str) -> bool {
        !self.window.is_collapsed(&vuri(path))
    }

    pub fn focus(&self) -> Option<String> {
        self.window.focus().map(|v| v.to_string())
    }
}

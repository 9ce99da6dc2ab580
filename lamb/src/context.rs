use std::fmt;

use log::debug;

use crate::{Collection, GcSettings, GcStats, Heap, ObjRef, RootStack};

/// Evaluation strategy for applications.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum EvalMode {
    /// Operands are evaluated before the call.
    #[default]
    Strict,
    /// Operands are passed as memoizing thunks and forced on demand.
    Lazy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextSettings {
    pub mode: EvalMode,
    pub gc: GcSettings,
}

impl ContextSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.gc.validate().map_err(SettingsError::new)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsError {
    pub message: &'static str,
}

impl SettingsError {
    pub fn new(message: &'static str) -> Self {
        Self { message }
    }
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid settings: {}", self.message)
    }
}

impl std::error::Error for SettingsError {}

/// One interpreter session: the heap, the global scope and the root stack.
///
/// Dropping the context runs a collection without roots, which reclaims
/// every object it ever allocated.
#[derive(Debug)]
pub struct Context {
    pub(crate) heap: Heap,
    pub(crate) root: ObjRef,
    pub(crate) stack: ObjRef,
    pub(crate) mode: EvalMode,
}

impl Default for Context {
    fn default() -> Self {
        Self::build(&ContextSettings::default())
    }
}

impl Context {
    pub fn new(settings: ContextSettings) -> Result<Self, SettingsError> {
        settings.validate()?;
        Ok(Self::build(&settings))
    }

    /// Context with default collector settings.
    pub fn with_mode(mode: EvalMode) -> Self {
        Self::build(&ContextSettings {
            mode,
            ..Default::default()
        })
    }

    fn build(settings: &ContextSettings) -> Self {
        let mut heap = Heap::new(&settings.gc);
        let root = heap.alloc_environment(None);
        let stack = heap.alloc_root_stack();
        // the global scope stays rooted for the whole session
        heap.root_stack_mut(stack).pin(root);
        Self {
            heap,
            root,
            stack,
            mode: settings.mode,
        }
    }

    #[inline]
    pub fn mode(&self) -> EvalMode {
        self.mode
    }

    #[inline]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    #[inline]
    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    #[inline]
    pub fn root_env(&self) -> ObjRef {
        self.root
    }

    #[inline]
    pub fn root_stack_ref(&self) -> ObjRef {
        self.stack
    }

    #[inline]
    pub fn root_stack(&self) -> &RootStack {
        self.heap.root_stack(self.stack)
    }

    /// Drops every transient root, keeping the pinned global scope.
    pub fn clear_roots(&mut self) {
        self.heap.root_stack_mut(self.stack).clear();
    }

    /// Keeps `obj` alive while `f` runs.
    ///
    /// The stack is restored to its previous depth once `f` returns, whether
    /// it produced a value or an error, so the protocol stays balanced on
    /// every path.
    pub fn with_rooted<R>(&mut self, obj: ObjRef, f: impl FnOnce(&mut Self) -> R) -> R {
        let stack = self.stack;
        let depth = self.heap.root_stack(stack).len();
        self.heap.root_stack_mut(stack).push(obj);
        let result = f(self);
        self.heap.root_stack_mut(stack).truncate(depth);
        result
    }

    /// Collection point used by the evaluator: `env` and the root stack are
    /// the roots.
    #[inline]
    pub fn collect(&mut self, env: ObjRef) -> Collection {
        self.heap.collect(Some(env), Some(self.stack))
    }

    fn teardown(&mut self) -> usize {
        match self.heap.collect(None, None) {
            Collection::Swept { freed, .. } => freed,
            Collection::Skipped => 0,
        }
    }

    /// Reclaims every object and returns the lifetime collector statistics.
    pub fn destroy(mut self) -> GcStats {
        let freed = self.teardown();
        debug!("context destroyed, {freed} objects reclaimed");
        self.heap.stats()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if self.heap.live_count() > 0 {
            self.teardown();
        }
    }
}

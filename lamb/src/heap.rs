//! Mark-and-sweep heap.
//!
//! Objects live in a slot table and are addressed through generation checked
//! [`ObjRef`]s. Every allocation is recorded in a registry of live objects
//! which the sweep filters in place. Marks are compared against a toggling
//! epoch, so no pass is needed to reset them between collections.
//!
//! Collection is synchronous and only happens when the evaluator asks for it
//! through [`Heap::collect`], passing the current environment and the root
//! stack as roots.

use std::{io, rc::Rc};

use log::{debug, trace};

use crate::{
    Closure, Environment, HeapObject, Node, ObjRef, ObjectKind, RootStack, Thunk, Visitable,
    format::ObjectDisplay,
};

pub const GC_INITIAL_THRESHOLD: usize = 128;

// ── Settings / statistics ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcSettings {
    /// Live object count below which a rooted collection is skipped. Adapts
    /// at runtime: halved while usage stays low, doubled when a collection
    /// cannot get below it.
    pub initial_threshold: usize,
}

impl Default for GcSettings {
    fn default() -> Self {
        Self {
            initial_threshold: GC_INITIAL_THRESHOLD,
        }
    }
}

impl GcSettings {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.initial_threshold == 0 {
            return Err("initial_threshold must be > 0");
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GcStats {
    /// Collections that marked and swept.
    pub collections: usize,
    /// Rooted calls that returned early because usage was below threshold.
    pub skipped: usize,
    /// Objects reclaimed over the lifetime of the heap.
    pub freed: usize,
}

/// Outcome of a single [`Heap::collect`] call.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Collection {
    Skipped,
    Swept { freed: usize, live: usize },
}

// ── Storage ───────────────────────────────────────────────────────────

#[derive(Debug)]
struct Cell {
    object: HeapObject,
    mark: bool,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    cell: Option<Cell>,
}

#[derive(Debug)]
pub struct Heap {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: Vec<ObjRef>,
    epoch: bool,
    threshold: usize,
    stats: GcStats,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new(&GcSettings::default())
    }
}

impl Heap {
    pub fn new(settings: &GcSettings) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: Vec::new(),
            epoch: false,
            threshold: settings.initial_threshold,
            stats: GcStats::default(),
        }
    }

    #[inline]
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    #[inline]
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    #[inline]
    pub fn epoch(&self) -> bool {
        self.epoch
    }

    #[inline]
    pub fn stats(&self) -> GcStats {
        self.stats
    }

    // ── Allocation ────────────────────────────────────────────────────

    fn alloc(&mut self, object: HeapObject) -> ObjRef {
        // stamped with the current epoch, the next collection flips it first
        let cell = Cell {
            object,
            mark: self.epoch,
        };
        let obj = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                debug_assert!(slot.cell.is_none(), "free list holds a live slot");
                slot.cell = Some(cell);
                ObjRef::new(index, slot.generation)
            }
            None => {
                let index: u32 = self
                    .slots
                    .len()
                    .try_into()
                    .expect("heap slot index overflow");
                self.slots.push(Slot {
                    generation: 0,
                    cell: Some(cell),
                });
                ObjRef::new(index, 0)
            }
        };
        self.live.push(obj);
        obj
    }

    pub fn alloc_number(&mut self, value: f64) -> ObjRef {
        self.alloc(HeapObject::Number(value))
    }

    pub fn alloc_closure(&mut self, env: ObjRef, body: Rc<Node>, param: Rc<str>) -> ObjRef {
        self.alloc(HeapObject::Closure(Closure { env, body, param }))
    }

    pub fn alloc_environment(&mut self, prev: Option<ObjRef>) -> ObjRef {
        self.alloc(HeapObject::Environment(Environment::new(prev)))
    }

    pub fn alloc_thunk(&mut self, env: ObjRef, body: Rc<Node>) -> ObjRef {
        self.alloc(HeapObject::Thunk(Thunk::Pending { env, body }))
    }

    pub fn alloc_root_stack(&mut self) -> ObjRef {
        self.alloc(HeapObject::RootStack(RootStack::new()))
    }

    // ── Access ────────────────────────────────────────────────────────

    fn cell(&self, obj: ObjRef) -> Option<&Cell> {
        self.slots
            .get(obj.index())
            .filter(|slot| slot.generation == obj.generation)
            .and_then(|slot| slot.cell.as_ref())
    }

    fn cell_mut(&mut self, obj: ObjRef) -> Option<&mut Cell> {
        self.slots
            .get_mut(obj.index())
            .filter(|slot| slot.generation == obj.generation)
            .and_then(|slot| slot.cell.as_mut())
    }

    /// Whether `obj` still refers to an allocated object.
    #[inline]
    pub fn contains(&self, obj: ObjRef) -> bool {
        self.cell(obj).is_some()
    }

    #[inline]
    pub fn try_get(&self, obj: ObjRef) -> Option<&HeapObject> {
        self.cell(obj).map(|cell| &cell.object)
    }

    /// # Panics
    /// if `obj` was reclaimed, which means a root was missed.
    #[inline]
    pub fn get(&self, obj: ObjRef) -> &HeapObject {
        match self.cell(obj) {
            Some(cell) => &cell.object,
            None => panic!("dangling object reference {obj:?}"),
        }
    }

    #[inline]
    pub fn get_mut(&mut self, obj: ObjRef) -> &mut HeapObject {
        match self.cell_mut(obj) {
            Some(cell) => &mut cell.object,
            None => panic!("dangling object reference {obj:?}"),
        }
    }

    #[inline]
    pub fn kind(&self, obj: ObjRef) -> ObjectKind {
        self.get(obj).kind()
    }

    pub fn number(&self, obj: ObjRef) -> Option<f64> {
        match self.get(obj) {
            HeapObject::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn closure(&self, obj: ObjRef) -> Option<&Closure> {
        match self.get(obj) {
            HeapObject::Closure(closure) => Some(closure),
            _ => None,
        }
    }

    pub fn thunk(&self, obj: ObjRef) -> Option<&Thunk> {
        match self.get(obj) {
            HeapObject::Thunk(thunk) => Some(thunk),
            _ => None,
        }
    }

    pub fn thunk_mut(&mut self, obj: ObjRef) -> Option<&mut Thunk> {
        match self.get_mut(obj) {
            HeapObject::Thunk(thunk) => Some(thunk),
            _ => None,
        }
    }

    // environments and the root stack are only ever handed out by the
    // context and the evaluator, a mismatch here is a bug
    pub fn environment(&self, obj: ObjRef) -> &Environment {
        match self.get(obj) {
            HeapObject::Environment(env) => env,
            other => panic!("expected Environment, got {}", other.kind()),
        }
    }

    pub fn environment_mut(&mut self, obj: ObjRef) -> &mut Environment {
        match self.get_mut(obj) {
            HeapObject::Environment(env) => env,
            other => panic!("expected Environment, got {}", other.kind()),
        }
    }

    pub fn root_stack(&self, obj: ObjRef) -> &RootStack {
        match self.get(obj) {
            HeapObject::RootStack(stack) => stack,
            other => panic!("expected RootStack, got {}", other.kind()),
        }
    }

    pub fn root_stack_mut(&mut self, obj: ObjRef) -> &mut RootStack {
        match self.get_mut(obj) {
            HeapObject::RootStack(stack) => stack,
            other => panic!("expected RootStack, got {}", other.kind()),
        }
    }

    /// Live objects in allocation order.
    pub fn objects(&self) -> impl Iterator<Item = ObjRef> + '_ {
        self.live.iter().copied()
    }

    pub fn dump_objects(&self, out: &mut impl io::Write) -> io::Result<()> {
        for obj in self.objects() {
            writeln!(out, "{}", ObjectDisplay::new(self, obj))?;
        }
        Ok(())
    }

    // ── Collection ────────────────────────────────────────────────────

    /// Collects everything unreachable from `root` and `stack`.
    ///
    /// With at least one root present the call is skipped while the live
    /// count is below the threshold. With no roots at all every object is
    /// reclaimed.
    pub fn collect(&mut self, root: Option<ObjRef>, stack: Option<ObjRef>) -> Collection {
        let count = self.live.len();
        if count < self.threshold && (root.is_some() || stack.is_some()) {
            if count < self.threshold / 2 {
                self.threshold /= 2;
                trace!("gc threshold lowered to {}", self.threshold);
            }
            self.stats.skipped += 1;
            return Collection::Skipped;
        }

        self.epoch = !self.epoch;
        if let Some(root) = root {
            self.mark(root);
        }
        if let Some(stack) = stack {
            self.mark(stack);
        }
        let freed = self.sweep();
        let live = self.live.len();

        if live >= self.threshold {
            self.threshold *= 2;
            trace!("gc threshold raised to {}", self.threshold);
        }
        self.stats.collections += 1;
        self.stats.freed += freed;
        debug!(
            "gc #{}: freed {freed}, live {live}, threshold {}",
            self.stats.collections, self.threshold
        );
        Collection::Swept { freed, live }
    }

    fn mark(&mut self, root: ObjRef) {
        let epoch = self.epoch;
        let mut queue = vec![root];

        while let Some(obj) = queue.pop() {
            let Some(cell) = self.cell_mut(obj) else {
                debug_assert!(false, "dangling reference {obj:?} reached while marking");
                continue;
            };
            if cell.mark == epoch {
                continue;
            }
            cell.mark = epoch;
            cell.object.visit_edges(&mut |edge| queue.push(edge));
        }
    }

    fn sweep(&mut self) -> usize {
        let epoch = self.epoch;
        let Heap {
            slots, free, live, ..
        } = self;

        let before = live.len();
        live.retain(|obj| {
            let slot = &mut slots[obj.index()];
            let marked = slot.cell.as_ref().is_some_and(|cell| cell.mark == epoch);
            if !marked {
                // dropping the cell releases what the object owns: a
                // closure's name and body, a pending thunk's body, an
                // environment's table, the stack storage
                slot.cell = None;
                slot.generation = slot.generation.wrapping_add(1);
                free.push(obj.index);
            }
            marked
        });
        before - live.len()
    }
}

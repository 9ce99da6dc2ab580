//! Tagged heap objects.
//!
//! Every runtime value lives in the [`Heap`](crate::Heap) as a
//! [`HeapObject`] and is referred to through a copyable [`ObjRef`].

use std::{fmt, rc::Rc};

use crate::{Environment, Node, RootStack};

/// Reference to a heap slot.
///
/// The generation is bumped whenever the slot is reclaimed, so a reference
/// that outlived its object is detected instead of aliasing whatever gets
/// allocated into the slot next.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ObjRef {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl ObjRef {
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    #[inline]
    pub fn index(self) -> usize {
        self.index as usize
    }

    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ObjectKind {
    Number,
    Closure,
    Environment,
    Thunk,
    RootStack,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectKind::Number => "Number",
            ObjectKind::Closure => "Closure",
            ObjectKind::Environment => "Environment",
            ObjectKind::Thunk => "Thunk",
            ObjectKind::RootStack => "RootStack",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct Closure {
    pub env: ObjRef,
    pub body: Rc<Node>,
    pub param: Rc<str>,
}

/// Deferred operand of a lazy application.
#[derive(Debug, Clone)]
pub enum Thunk {
    Pending { env: ObjRef, body: Rc<Node> },
    Forced(ObjRef),
}

impl Thunk {
    #[inline]
    pub fn is_forced(&self) -> bool {
        matches!(self, Thunk::Forced(_))
    }

    #[inline]
    pub fn forced_value(&self) -> Option<ObjRef> {
        match self {
            Thunk::Forced(value) => Some(*value),
            Thunk::Pending { .. } => None,
        }
    }

    /// Stores the memoized value, dropping the captured body and environment.
    pub fn force_with(&mut self, value: ObjRef) {
        debug_assert!(!self.is_forced(), "thunk forced twice");
        *self = Thunk::Forced(value);
    }
}

#[derive(Debug)]
pub enum HeapObject {
    Number(f64),
    Closure(Closure),
    Environment(Environment),
    Thunk(Thunk),
    RootStack(RootStack),
}

impl HeapObject {
    pub fn kind(&self) -> ObjectKind {
        match self {
            HeapObject::Number(_) => ObjectKind::Number,
            HeapObject::Closure(_) => ObjectKind::Closure,
            HeapObject::Environment(_) => ObjectKind::Environment,
            HeapObject::Thunk(_) => ObjectKind::Thunk,
            HeapObject::RootStack(_) => ObjectKind::RootStack,
        }
    }
}

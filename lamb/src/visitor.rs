use crate::{Closure, Environment, HeapObject, ObjRef, RootStack, Thunk};

/// Enumerates the outgoing references of a heap object.
///
/// Visiting an object only reports its direct edges; the collector drives the
/// transitive walk with its own worklist.
pub trait Visitable {
    fn visit_edges(&self, visitor: &mut dyn FnMut(ObjRef));
}

// dispatch on the variant, the variants report their own edges
impl Visitable for HeapObject {
    #[inline]
    fn visit_edges(&self, visitor: &mut dyn FnMut(ObjRef)) {
        match self {
            HeapObject::Number(_) => (),
            HeapObject::Closure(closure) => closure.visit_edges(visitor),
            HeapObject::Environment(env) => env.visit_edges(visitor),
            HeapObject::Thunk(thunk) => thunk.visit_edges(visitor),
            HeapObject::RootStack(stack) => stack.visit_edges(visitor),
        }
    }
}

impl Visitable for Closure {
    #[inline]
    fn visit_edges(&self, visitor: &mut dyn FnMut(ObjRef)) {
        visitor(self.env);
    }
}

impl Visitable for Thunk {
    #[inline]
    fn visit_edges(&self, visitor: &mut dyn FnMut(ObjRef)) {
        match self {
            Thunk::Pending { env, .. } => visitor(*env),
            Thunk::Forced(value) => visitor(*value),
        }
    }
}

impl Visitable for Environment {
    #[inline]
    fn visit_edges(&self, visitor: &mut dyn FnMut(ObjRef)) {
        self.for_each(|_, value| visitor(value));
        if let Some(prev) = self.prev() {
            visitor(prev);
        }
    }
}

impl Visitable for RootStack {
    #[inline]
    fn visit_edges(&self, visitor: &mut dyn FnMut(ObjRef)) {
        self.iter().for_each(visitor);
    }
}

use crate::ObjRef;

pub const INITIAL_STACK_CAPACITY: usize = 100;

/// Explicit stack of GC roots.
///
/// Values that are not yet reachable from any environment (an evaluated left
/// operand, a callee waiting for its argument, a thunk being forced) are kept
/// alive by sitting on this stack while a nested evaluation runs.
///
/// Entries below `pinned` survive [`RootStack::clear`].
#[derive(Debug)]
pub struct RootStack {
    entries: Vec<ObjRef>,
    pinned: usize,
}

impl Default for RootStack {
    fn default() -> Self {
        Self::new()
    }
}

impl RootStack {
    pub fn new() -> Self {
        Self {
            entries: Vec::with_capacity(INITIAL_STACK_CAPACITY),
            pinned: 0,
        }
    }

    pub fn push(&mut self, value: ObjRef) {
        self.entries.push(value);
    }

    /// Pops the topmost entry. Pinned entries are never popped.
    pub fn pop(&mut self) -> Option<ObjRef> {
        if self.entries.len() <= self.pinned {
            return None;
        }
        self.entries.pop()
    }

    /// Pushes an entry that stays until the stack is dropped.
    ///
    /// Only valid while no unpinned entries are on the stack.
    pub fn pin(&mut self, value: ObjRef) {
        debug_assert_eq!(
            self.entries.len(),
            self.pinned,
            "pin on top of transient entries"
        );
        self.entries.push(value);
        self.pinned = self.entries.len();
    }

    /// Drops every entry that was not pinned.
    pub fn clear(&mut self) {
        self.entries.truncate(self.pinned);
    }

    /// Restores the stack to a previously observed depth.
    pub fn truncate(&mut self, depth: usize) {
        self.entries.truncate(depth.max(self.pinned));
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn pinned(&self) -> usize {
        self.pinned
    }

    #[inline]
    pub fn top(&self) -> Option<ObjRef> {
        self.entries.last().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = ObjRef> + '_ {
        self.entries.iter().copied()
    }

    pub fn for_each(&self, f: impl FnMut(ObjRef)) {
        self.iter().for_each(f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(index: u32) -> ObjRef {
        ObjRef::new(index, 0)
    }

    #[test]
    fn push_pop_is_lifo() {
        let mut stack = RootStack::new();
        stack.push(obj(1));
        stack.push(obj(2));
        assert_eq!(stack.pop(), Some(obj(2)));
        assert_eq!(stack.pop(), Some(obj(1)));
        assert_eq!(stack.pop(), None);
    }

    #[test]
    fn clear_keeps_pinned_entries() {
        let mut stack = RootStack::new();
        stack.pin(obj(7));
        stack.push(obj(1));
        stack.push(obj(2));

        stack.clear();

        assert_eq!(stack.len(), 1);
        assert_eq!(stack.top(), Some(obj(7)));
        assert_eq!(stack.pop(), None);
    }

    #[test]
    fn truncate_never_drops_below_pinned() {
        let mut stack = RootStack::new();
        stack.pin(obj(0));
        stack.push(obj(1));
        stack.truncate(0);
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn for_each_visits_bottom_to_top() {
        let mut stack = RootStack::new();
        stack.pin(obj(0));
        stack.push(obj(1));
        stack.push(obj(2));
        let mut seen = Vec::new();
        stack.for_each(|value| seen.push(value.index()));
        assert_eq!(seen, vec![0, 1, 2]);
    }
}

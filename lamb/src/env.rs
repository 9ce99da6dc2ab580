use std::{fmt::Write, rc::Rc};

use crate::{Heap, ObjRef, format::ObjectDisplay};

pub const INITIAL_TABLE_SIZE: usize = 8;

#[derive(Debug, Clone)]
struct Binding {
    name: Rc<str>,
    value: ObjRef,
}

/// One lexical scope: a separate-chaining hash table of bindings plus the
/// enclosing scope.
///
/// Bindings are only ever added or overwritten in the local table, an
/// ancestor is never mutated through a child.
#[derive(Debug)]
pub struct Environment {
    buckets: Vec<Vec<Binding>>,
    taken: usize,
    prev: Option<ObjRef>,
}

fn djb2_hash(name: &str) -> u64 {
    name.bytes().fold(5381u64, |hash, byte| {
        (hash << 5).wrapping_add(hash).wrapping_add(byte as u64)
    })
}

impl Environment {
    pub fn new(prev: Option<ObjRef>) -> Self {
        Self {
            buckets: vec![Vec::new(); INITIAL_TABLE_SIZE],
            taken: 0,
            prev,
        }
    }

    #[inline]
    pub fn prev(&self) -> Option<ObjRef> {
        self.prev
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.taken
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.taken == 0
    }

    /// Number of buckets currently allocated.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    fn bucket_of(&self, name: &str) -> usize {
        (djb2_hash(name) % self.buckets.len() as u64) as usize
    }

    /// Looks `name` up in this scope only.
    pub fn get(&self, name: &str) -> Option<ObjRef> {
        self.buckets[self.bucket_of(name)]
            .iter()
            .find(|binding| &*binding.name == name)
            .map(|binding| binding.value)
    }

    /// Inserts or overwrites a local binding.
    pub fn insert(&mut self, name: Rc<str>, value: ObjRef) {
        let index = self.bucket_of(&name);
        let bucket = &mut self.buckets[index];
        match bucket.iter_mut().find(|binding| binding.name == name) {
            Some(binding) => binding.value = value,
            None => {
                bucket.push(Binding { name, value });
                self.taken += 1;
            }
        }
        if self.taken > self.buckets.len() / 2 {
            self.resize(self.buckets.len() * 2);
        }
    }

    fn resize(&mut self, new_size: usize) {
        let old = std::mem::replace(&mut self.buckets, vec![Vec::new(); new_size]);
        for binding in old.into_iter().flatten() {
            let index = self.bucket_of(&binding.name);
            self.buckets[index].push(binding);
        }
    }

    /// Enumerates local bindings in unspecified order.
    pub fn for_each(&self, mut f: impl FnMut(&str, ObjRef)) {
        for binding in self.buckets.iter().flatten() {
            f(&binding.name, binding.value);
        }
    }

    /// Resolves `name` starting at `env` and walking the enclosing chain.
    pub fn lookup(heap: &Heap, env: ObjRef, name: &str) -> Option<ObjRef> {
        let mut current = Some(env);
        while let Some(scope) = current {
            let scope = heap.environment(scope);
            if let Some(value) = scope.get(name) {
                return Some(value);
            }
            current = scope.prev();
        }
        None
    }

    pub fn bind(heap: &mut Heap, env: ObjRef, name: Rc<str>, value: ObjRef) {
        heap.environment_mut(env).insert(name, value);
    }

    /// Renders every scope of the chain starting at `env`, innermost first,
    /// with bindings sorted by name.
    pub fn dump(heap: &Heap, env: ObjRef) -> String {
        let mut out = String::new();
        let mut current = Some(env);
        let mut depth = 0;
        while let Some(scope_ref) = current {
            let scope = heap.environment(scope_ref);
            let mut bindings = Vec::with_capacity(scope.len());
            scope.for_each(|name, value| bindings.push((name.to_string(), value)));
            bindings.sort_by(|a, b| a.0.cmp(&b.0));

            let _ = writeln!(out, "{}<env-{}>", "  ".repeat(depth), scope_ref.index());
            for (name, value) in bindings {
                let _ = writeln!(
                    out,
                    "{}{name} = {}",
                    "  ".repeat(depth + 1),
                    ObjectDisplay::new(heap, value)
                );
            }
            current = scope.prev();
            depth += 1;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> Rc<str> {
        Rc::from(s)
    }

    #[test]
    fn insert_overwrites_existing_binding() {
        let mut heap = Heap::default();
        let one = heap.alloc_number(1.0);
        let two = heap.alloc_number(2.0);
        let mut env = Environment::new(None);

        env.insert(name("x"), one);
        env.insert(name("x"), two);

        assert_eq!(env.len(), 1);
        assert_eq!(env.get("x"), Some(two));
    }

    #[test]
    fn table_doubles_when_more_than_half_full() {
        let mut heap = Heap::default();
        let value = heap.alloc_number(0.0);
        let mut env = Environment::new(None);

        for i in 0..=INITIAL_TABLE_SIZE / 2 {
            env.insert(name(&format!("v{i}")), value);
        }
        assert_eq!(env.capacity(), INITIAL_TABLE_SIZE * 2);

        for i in 0..100 {
            env.insert(name(&format!("w{i}")), value);
        }
        assert!(env.len() <= env.capacity() / 2);
        for i in 0..100 {
            assert_eq!(env.get(&format!("w{i}")), Some(value));
        }
        assert_eq!(env.get("v0"), Some(value));
    }

    #[test]
    fn lookup_walks_enclosing_scopes_and_shadows() {
        let mut heap = Heap::default();
        let outer_x = heap.alloc_number(1.0);
        let inner_x = heap.alloc_number(2.0);
        let y = heap.alloc_number(3.0);

        let e1 = heap.alloc_environment(None);
        let e2 = heap.alloc_environment(Some(e1));
        let e3 = heap.alloc_environment(Some(e1));

        Environment::bind(&mut heap, e1, name("x"), outer_x);
        Environment::bind(&mut heap, e1, name("y"), y);
        Environment::bind(&mut heap, e2, name("x"), inner_x);
        Environment::bind(&mut heap, e2, name("z"), inner_x);

        assert_eq!(Environment::lookup(&heap, e2, "x"), Some(inner_x));
        assert_eq!(Environment::lookup(&heap, e2, "y"), Some(y));
        assert_eq!(Environment::lookup(&heap, e3, "x"), Some(outer_x));
        assert_eq!(Environment::lookup(&heap, e3, "z"), None);
        assert_eq!(Environment::lookup(&heap, e1, "z"), None);
    }

    #[test]
    fn bind_never_touches_the_parent() {
        let mut heap = Heap::default();
        let value = heap.alloc_number(4.0);
        let parent = heap.alloc_environment(None);
        let child = heap.alloc_environment(Some(parent));

        Environment::bind(&mut heap, child, name("a"), value);

        assert!(heap.environment(parent).is_empty());
        assert_eq!(heap.environment(child).len(), 1);
    }

    #[test]
    fn dump_lists_scopes_innermost_first() {
        let mut heap = Heap::default();
        let one = heap.alloc_number(1.0);
        let two = heap.alloc_number(2.0);
        let root = heap.alloc_environment(None);
        let child = heap.alloc_environment(Some(root));
        Environment::bind(&mut heap, root, name("b"), one);
        Environment::bind(&mut heap, child, name("a"), two);

        let dump = Environment::dump(&heap, child);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("<env-"));
        assert_eq!(lines[1], "  a = 2");
        assert!(lines[2].starts_with("  <env-"));
        assert_eq!(lines[3], "    b = 1");
    }
}

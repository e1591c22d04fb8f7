//! Bucket array plus the entry arena its chains point into.

use crate::handle::{Entry, Handle, HandleFactory};
use crate::heap::GcPause;
use slotmap::{DefaultKey, SlotMap};

pub(crate) type Bucket = Vec<Handle>;

#[derive(Debug, Default)]
pub(crate) struct Store {
    /// Replaced wholesale on rehash.
    pub(crate) buckets: Vec<Bucket>,
    pub(crate) entries: SlotMap<DefaultKey, Entry>,
}

impl Store {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            buckets: vec![Vec::new(); capacity],
            entries: SlotMap::new(),
        }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.buckets.len()
    }

    /// Insert `entry` at the head of bucket `index`.
    pub(crate) fn link(&mut self, index: usize, entry: Entry) -> Handle {
        let handle = Handle::new(self.entries.insert(entry));
        self.buckets[index].insert(0, handle);
        handle
    }

    /// Drop an entry that is no longer linked into any chain.
    pub(crate) fn discard(&mut self, handle: Handle, factory: &HandleFactory, pause: &mut GcPause<'_>) -> Option<Entry> {
        let entry = self.entries.remove(handle.raw_handle())?;
        factory.release(&entry, pause);
        Some(entry)
    }

    /// Empty every bucket, releasing all entries; capacity is unchanged.
    pub(crate) fn clear(&mut self, factory: &HandleFactory, pause: &mut GcPause<'_>) {
        for (_, entry) in self.entries.drain() {
            factory.release(&entry, pause);
        }
        for bucket in &mut self.buckets {
            bucket.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::ReferenceKind;
    use crate::heap::Heap;
    use crate::value::{Object, Value};

    #[test]
    fn link_puts_new_handles_at_the_head() {
        let heap = Heap::new();
        let f = HandleFactory::new(ReferenceKind::Strong);
        let mut s = Store::with_capacity(3);
        let mut pause = heap.pause();
        let a = s.link(1, f.build(Value::Int(1), Value::Int(10), &mut pause));
        let b = s.link(1, f.build(Value::Int(2), Value::Int(20), &mut pause));
        assert_eq!(s.buckets[1], vec![b, a]);
        assert_eq!(s.capacity(), 3);
    }

    /// Invariant: clearing releases every root the entries held.
    #[test]
    fn clear_releases_roots() {
        let heap = Heap::new();
        let k = heap.alloc(Object::string("k"));
        let f = HandleFactory::new(ReferenceKind::Strong);
        let mut s = Store::with_capacity(31);
        s.link(0, f.build(k.value(), Value::Nil, &mut heap.pause()));
        assert_eq!(heap.root_count(k.obj()), 2);

        s.clear(&f, &mut heap.pause());
        assert_eq!(heap.root_count(k.obj()), 1);
        assert!(s.entries.is_empty());
        assert!(s.buckets.iter().all(Vec::is_empty));
        assert_eq!(s.capacity(), 31);
    }
}

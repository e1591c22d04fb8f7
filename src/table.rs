//! Table: the generic operation set over a bucket array of handles.
//!
//! Every keyed operation takes a [`Strategy`]; the table itself knows
//! nothing about equality. Lookups always go through the reconciler, so a
//! bucket is purged of dead weak entries before it is searched, and the
//! live-item count absorbs whatever the purge found.

use crate::error::TableError;
use crate::handle::{Entry, Handle, HandleFactory, Pinned, ReferenceKind};
use crate::heap::Heap;
use crate::reconcile::{self, Located};
use crate::rehash;
use crate::sizing::{SizingPolicy, Thresholds, DEFAULT_MIN_CAPACITY, TIERS};
use crate::store::Store;
use crate::strategy::{Cached, HashFn, Strategy};
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// A resizable bucket-chained table whose entries may hold their key, their
/// value, or both weakly.
///
/// One mutator at a time: every operation that can purge or resize takes
/// `&mut self`. The shared [`Heap`] may be collected from other threads
/// between operations.
pub struct Table {
    heap: Arc<Heap>,
    store: Store,
    items: usize,
    sizing: SizingPolicy,
    factory: HandleFactory,
    hash_fn: Option<HashFn>,
}

impl Table {
    pub fn new(heap: Arc<Heap>, kind: ReferenceKind) -> Self {
        Self::with_min_capacity(heap, kind, DEFAULT_MIN_CAPACITY)
    }

    /// Create a table whose capacity never drops below the first tier that
    /// holds `min_capacity` buckets.
    pub fn with_min_capacity(heap: Arc<Heap>, kind: ReferenceKind, min_capacity: usize) -> Self {
        let sizing = SizingPolicy::new(min_capacity);
        Self {
            heap,
            store: Store::with_capacity(sizing.capacity()),
            items: 0,
            sizing,
            factory: HandleFactory::new(kind),
            hash_fn: None,
        }
    }

    /// A table with no buckets: lookups miss and creation fails with
    /// [`TableError::VoidTable`].
    pub fn void(heap: Arc<Heap>, kind: ReferenceKind) -> Self {
        Self {
            heap,
            store: Store::default(),
            items: 0,
            sizing: SizingPolicy::new(DEFAULT_MIN_CAPACITY),
            factory: HandleFactory::new(kind),
            hash_fn: None,
        }
    }

    /// Live-item count as of the last reconciliation.
    pub fn len(&self) -> usize {
        self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items == 0
    }

    /// Current bucket-array length.
    pub fn capacity(&self) -> usize {
        self.store.capacity()
    }

    /// Smallest capacity the table will shrink to; 0 for a void table.
    pub fn min_capacity(&self) -> usize {
        if self.capacity() == 0 {
            0
        } else {
            self.sizing.min_capacity()
        }
    }

    pub fn reference_kind(&self) -> ReferenceKind {
        self.factory.kind()
    }

    /// Resize triggers; both zero for a void table.
    pub fn thresholds(&self) -> Thresholds {
        if self.capacity() == 0 {
            Thresholds { lower: 0, upper: 0 }
        } else {
            self.sizing.thresholds()
        }
    }

    /// Hash function remembered from the last strategy that had a plain one.
    pub fn cached_hash_fn(&self) -> Option<HashFn> {
        self.hash_fn
    }

    pub fn heap(&self) -> &Arc<Heap> {
        &self.heap
    }

    #[inline]
    fn forget(&mut self, purged: usize) {
        self.items = self.items.saturating_sub(purged);
    }

    fn locate<S: Strategy + ?Sized>(&mut self, key: &Value, s: &S) -> Result<Located, TableError> {
        let r = reconcile::locate(&self.heap, &mut self.store, &self.factory, key, s);
        self.forget(r.purged);
        r.result
    }

    /// Rehash until the live count sits inside the thresholds. The tier is
    /// chosen only after dead handles are released, since they still count
    /// in `items` until their bucket is reconciled.
    fn resize_if_needed<S: Strategy + ?Sized>(&mut self, s: &S) -> Result<(), TableError> {
        if self.capacity() == 0 {
            return Ok(());
        }
        while self.sizing.target(self.items).is_some() {
            self.items = rehash::purge_dead(&self.heap, &mut self.store, &self.factory)?;
            let Some(target) = self.sizing.target(self.items) else {
                break;
            };
            let moved = rehash::rehash(&self.heap, &mut self.store, &self.factory, TIERS[target], s)?;
            self.items = moved;
            self.sizing.adopt(target);
            self.hash_fn = s.hash_fn();
        }
        Ok(())
    }

    /// Resize after an operation that has already taken effect. A failed
    /// rehash leaves the array as it was, so the operation still stands.
    fn settle<S: Strategy + ?Sized>(&mut self, s: &S) {
        if let Err(e) = self.resize_if_needed(s) {
            log::warn!("resize skipped at {} buckets: {}", self.capacity(), e);
        }
    }

    fn rehash_after_purge(&mut self) -> Result<(), TableError> {
        match self.hash_fn {
            Some(f) => self.resize_if_needed(&Cached(f)),
            None => Ok(()),
        }
    }

    pub fn get_handle<S: Strategy + ?Sized>(&mut self, key: &Value, s: &S) -> Result<Option<Handle>, TableError> {
        if self.capacity() == 0 {
            return Ok(None);
        }
        let loc = self.locate(key, s)?;
        self.settle(s);
        Ok(loc.found)
    }

    /// The handle for `key`, creating it with value `init` if absent.
    pub fn create_handle<S: Strategy + ?Sized>(&mut self, key: &Value, init: Value, s: &S) -> Result<Handle, TableError> {
        self.entry(key, init, s).map(|(h, _)| h)
    }

    /// `&mut self` keeps the array in place between `locate` and `link`,
    /// so the located index is still valid when the entry is linked.
    fn entry<S: Strategy + ?Sized>(&mut self, key: &Value, init: Value, s: &S) -> Result<(Handle, bool), TableError> {
        if self.capacity() == 0 {
            return Err(TableError::VoidTable);
        }
        let loc = self.locate(key, s)?;
        if let Some(h) = loc.found {
            self.settle(s);
            return Ok((h, false));
        }

        let entry = self.factory.build(*key, init, &mut self.heap.pause());
        let h = self.store.link(loc.index, entry);
        self.items += 1;
        if let Err(e) = self.resize_if_needed(s) {
            self.unlink(h);
            return Err(e);
        }
        self.hash_fn = s.hash_fn();
        Ok((h, true))
    }

    /// Take `h` back out of whichever chain holds it and release its entry.
    fn unlink(&mut self, h: Handle) {
        for bucket in &mut self.store.buckets {
            bucket.retain(|&x| x != h);
        }
        if self.store.discard(h, &self.factory, &mut self.heap.pause()).is_some() {
            self.forget(1);
        }
    }

    pub fn get<S: Strategy + ?Sized>(&mut self, key: &Value, s: &S) -> Result<Option<Value>, TableError> {
        let h = self.get_handle(key, s)?;
        Ok(h.and_then(|h| self.handle_value(h)))
    }

    /// The value for `key`, or `default` when absent.
    pub fn ref_or<S: Strategy + ?Sized>(&mut self, key: &Value, default: Value, s: &S) -> Result<Value, TableError> {
        Ok(self.get(key, s)?.unwrap_or(default))
    }

    pub fn contains_key<S: Strategy + ?Sized>(&mut self, key: &Value, s: &S) -> Result<bool, TableError> {
        Ok(self.get_handle(key, s)?.is_some())
    }

    /// Associate `key` with `value`. Returns the previous value, or `None`
    /// if the key was new.
    pub fn set<S: Strategy + ?Sized>(&mut self, key: &Value, value: Value, s: &S) -> Result<Option<Value>, TableError> {
        let (h, created) = self.entry(key, value, s)?;
        if created {
            return Ok(None);
        }
        self.replace_value(h, value, false).map(Some)
    }

    /// Remove `key`, returning the association it had.
    pub fn remove<S: Strategy + ?Sized>(&mut self, key: &Value, s: &S) -> Result<Option<(Value, Value)>, TableError> {
        if self.capacity() == 0 {
            return Ok(None);
        }
        let loc = self.locate(key, s)?;
        let Some(h) = loc.found else {
            self.settle(s);
            return Ok(None);
        };
        s.delete(h, &mut self.store.buckets[loc.index]);
        let removed = self.store.discard(h, &self.factory, &mut self.heap.pause());
        if removed.is_some() {
            self.forget(1);
        }
        self.settle(s);
        Ok(removed.map(|e| (e.key, e.value)))
    }

    /// Drop every entry. The capacity is left as it is.
    pub fn clear(&mut self) {
        self.store.clear(&self.factory, &mut self.heap.pause());
        self.items = 0;
    }

    fn resolve(&self, h: Handle) -> Option<Entry> {
        let entry = *self.store.entries.get(h.raw_handle())?;
        self.factory
            .is_live(&entry, &self.heap.pause())
            .then_some(entry)
    }

    /// Key of a live handle.
    pub fn handle_key(&self, h: Handle) -> Option<Value> {
        self.resolve(h).map(|e| e.key)
    }

    /// Value of a live handle.
    pub fn handle_value(&self, h: Handle) -> Option<Value> {
        self.resolve(h).map(|e| e.value)
    }

    /// Overwrite the value of a live handle, returning the old one.
    pub fn set_handle_value(&mut self, h: Handle, value: Value) -> Result<Value, TableError> {
        self.replace_value(h, value, true)
    }

    fn replace_value(&mut self, h: Handle, value: Value, require_live: bool) -> Result<Value, TableError> {
        let mut pause = self.heap.pause();
        let entry = self
            .store
            .entries
            .get_mut(h.raw_handle())
            .ok_or(TableError::WrongType)?;
        if require_live && !self.factory.is_live(entry, &pause) {
            return Err(TableError::WrongType);
        }
        Ok(self.factory.rearm_value(entry, value, &mut pause))
    }

    fn reconcile_bucket(&mut self, index: usize) -> Result<(), TableError> {
        let mut pause = self.heap.pause();
        let mut chain = std::mem::take(&mut self.store.buckets[index]);
        let cleaned = reconcile::purge_chain(&mut chain, &mut self.store, &self.factory, &mut pause);
        self.store.buckets[index] = chain;
        drop(pause);
        self.forget(cleaned?);
        Ok(())
    }

    /// Pin `h` for a visit, or purge it if it died since its bucket was
    /// reconciled.
    fn pin(&mut self, index: usize, h: Handle) -> Option<Pinned<'_>> {
        let mut pause = self.heap.pause();
        let entry = *self.store.entries.get(h.raw_handle())?;
        if self.factory.is_live(&entry, &pause) {
            return Some(self.factory.pinned(&self.heap, entry, &mut pause));
        }
        self.store.buckets[index].retain(|&x| x != h);
        self.store.discard(h, &self.factory, &mut pause);
        drop(pause);
        self.forget(1);
        None
    }

    /// One pass in bucket order, then chain order. Each bucket is reconciled
    /// before it is visited; the callback runs outside any pause with the
    /// visited entry pinned.
    fn walk<A>(&mut self, init: A, mut visit: impl FnMut(A, Handle, Value, Value) -> A) -> Result<A, TableError> {
        let mut acc = init;
        for index in 0..self.capacity() {
            self.reconcile_bucket(index)?;
            let snapshot = self.store.buckets[index].clone();
            for h in snapshot {
                let Some(pinned) = self.pin(index, h) else {
                    continue;
                };
                let Entry { key, value } = *pinned.entry();
                acc = visit(acc, h, key, value);
            }
        }
        self.rehash_after_purge()?;
        Ok(acc)
    }

    /// Fold `f` over every live association.
    pub fn fold<A, F>(&mut self, init: A, mut f: F) -> Result<A, TableError>
    where
        F: FnMut(A, Value, Value) -> A,
    {
        self.walk(init, |acc, _, k, v| f(acc, k, v))
    }

    pub fn for_each<F>(&mut self, mut f: F) -> Result<(), TableError>
    where
        F: FnMut(Value, Value),
    {
        self.walk((), |(), _, k, v| f(k, v))
    }

    pub fn for_each_handle<F>(&mut self, mut f: F) -> Result<(), TableError>
    where
        F: FnMut(Handle),
    {
        self.walk((), |(), h, _, _| f(h))
    }

    pub fn map_to_list<T, F>(&mut self, mut f: F) -> Result<Vec<T>, TableError>
    where
        F: FnMut(Value, Value) -> T,
    {
        self.walk(Vec::with_capacity(self.items), |mut out, _, k, v| {
            out.push(f(k, v));
            out
        })
    }

    /// Reconcile every bucket, then shrink with the cached hash function if
    /// the purge left the table under its lower threshold. Without a cached
    /// hash function it only purges. Returns how many handles were purged.
    pub fn maintain(&mut self) -> Result<usize, TableError> {
        let before = self.items;
        for index in 0..self.capacity() {
            self.reconcile_bucket(index)?;
        }
        self.rehash_after_purge()?;
        Ok(before.saturating_sub(self.items))
    }
}

impl Drop for Table {
    fn drop(&mut self) {
        self.store.clear(&self.factory, &mut self.heap.pause());
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("kind", &self.factory.kind())
            .field("items", &self.items)
            .field("capacity", &self.capacity())
            .field("thresholds", &self.thresholds())
            .field("cached_hash_fn", &self.hash_fn.is_some())
            .finish()
    }
}

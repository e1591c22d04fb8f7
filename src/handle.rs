//! Handles, the entries they name, and the factory that roots or watches
//! their endpoints.

use crate::heap::{GcPause, Heap};
use crate::table::Table;
use crate::value::Value;
use slotmap::DefaultKey;

/// Stable identity of one key/value association in a [`Table`].
///
/// A handle survives value updates and rehashes. It stops resolving once the
/// entry is removed or purged after a weak endpoint died.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Handle(DefaultKey);

impl Handle {
    pub(crate) fn new(k: DefaultKey) -> Self {
        Handle(k)
    }
    pub(crate) fn raw_handle(&self) -> DefaultKey {
        self.0
    }

    pub fn key(&self, table: &Table) -> Option<Value> {
        table.handle_key(*self)
    }

    pub fn value(&self, table: &Table) -> Option<Value> {
        table.handle_value(*self)
    }
}

/// Which endpoints of an entry the table holds weakly.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    #[default]
    Strong,
    WeakKey,
    WeakValue,
    WeakBoth,
}

impl ReferenceKind {
    #[inline]
    pub fn weak_key(self) -> bool {
        matches!(self, ReferenceKind::WeakKey | ReferenceKind::WeakBoth)
    }

    #[inline]
    pub fn weak_value(self) -> bool {
        matches!(self, ReferenceKind::WeakValue | ReferenceKind::WeakBoth)
    }

    #[inline]
    pub fn is_weak(self) -> bool {
        self != ReferenceKind::Strong
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Entry {
    pub(crate) key: Value,
    pub(crate) value: Value,
}

/// Builds entries for one reference kind and keeps the heap's root and
/// watch counts in step with them.
#[derive(Copy, Clone, Debug)]
pub(crate) struct HandleFactory {
    kind: ReferenceKind,
}

impl HandleFactory {
    pub(crate) fn new(kind: ReferenceKind) -> Self {
        Self { kind }
    }

    #[inline]
    pub(crate) fn kind(&self) -> ReferenceKind {
        self.kind
    }

    /// An entry is dead as soon as any weakly held endpoint was swept.
    #[inline]
    pub(crate) fn is_live(&self, entry: &Entry, pause: &GcPause<'_>) -> bool {
        (!self.kind.weak_key() || pause.is_live(entry.key))
            && (!self.kind.weak_value() || pause.is_live(entry.value))
    }

    pub(crate) fn build(&self, key: Value, value: Value, pause: &mut GcPause<'_>) -> Entry {
        arm(self.kind.weak_key(), key, pause);
        arm(self.kind.weak_value(), value, pause);
        Entry { key, value }
    }

    /// Swap in a new value, re-arming the watch (or root) on it. Returns the
    /// old value.
    pub(crate) fn rearm_value(&self, entry: &mut Entry, value: Value, pause: &mut GcPause<'_>) -> Value {
        arm(self.kind.weak_value(), value, pause);
        let old = std::mem::replace(&mut entry.value, value);
        disarm(self.kind.weak_value(), old, pause);
        old
    }

    pub(crate) fn release(&self, entry: &Entry, pause: &mut GcPause<'_>) {
        disarm(self.kind.weak_key(), entry.key, pause);
        disarm(self.kind.weak_value(), entry.value, pause);
    }

    /// Temporarily root the weak endpoints so a callback can use them even
    /// if a collection runs meanwhile.
    pub(crate) fn pin(&self, entry: &Entry, pause: &mut GcPause<'_>) {
        if self.kind.weak_key() {
            pause.retain(entry.key);
        }
        if self.kind.weak_value() {
            pause.retain(entry.value);
        }
    }

    /// Pin `entry` until the returned guard is dropped, unwinding included.
    pub(crate) fn pinned<'h>(&self, heap: &'h Heap, entry: Entry, pause: &mut GcPause<'_>) -> Pinned<'h> {
        self.pin(&entry, pause);
        Pinned {
            heap,
            factory: *self,
            entry,
        }
    }

    pub(crate) fn unpin(&self, entry: &Entry, pause: &mut GcPause<'_>) {
        if self.kind.weak_key() {
            pause.release(entry.key);
        }
        if self.kind.weak_value() {
            pause.release(entry.value);
        }
    }
}

/// A pinned entry; unpins on drop.
pub(crate) struct Pinned<'h> {
    heap: &'h Heap,
    factory: HandleFactory,
    entry: Entry,
}

impl Pinned<'_> {
    #[inline]
    pub(crate) fn entry(&self) -> &Entry {
        &self.entry
    }
}

impl Drop for Pinned<'_> {
    fn drop(&mut self) {
        self.factory.unpin(&self.entry, &mut self.heap.pause());
    }
}

fn arm(weak: bool, v: Value, pause: &mut GcPause<'_>) {
    if weak {
        pause.watch(v)
    } else {
        pause.retain(v)
    }
}

fn disarm(weak: bool, v: Value, pause: &mut GcPause<'_>) {
    if weak {
        pause.unwatch(v)
    } else {
        pause.release(v)
    }
}

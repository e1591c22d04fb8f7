//! Heap: the collector service tables consume.
//!
//! Objects live in a generational arena. An object survives a collection
//! while it is reachable from a root; tables root their strong endpoints and
//! only *watch* their weak ones. Sweeping an object removes its slot, so
//! every outstanding [`ObjRef`] to it stops resolving: "nullified" is a
//! generation mismatch, detected lazily by whoever looks next.
//!
//! [`Heap::pause`] is the exclusion window. While a [`GcPause`] is held,
//! [`Heap::collect`] (from any thread) blocks, so a caller can inspect
//! liveness and act on it without the answer changing underneath it.

use crate::reentrancy::{DebugReentrancy, ReentrancyGuard};
use crate::value::{ObjRef, Object, Value};
use hashbrown::HashSet;
use slotmap::SlotMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct Cell {
    object: Object,
    roots: usize,
    watches: usize,
}

#[derive(Debug, Default)]
struct HeapState {
    objects: SlotMap<ObjRef, Cell>,
}

/// Shared, thread-safe object heap with explicit roots and mark/sweep
/// collection.
#[derive(Debug, Default)]
pub struct Heap {
    state: Mutex<HeapState>,
}

/// What a single [`Heap::collect`] did.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CollectStats {
    /// Objects reclaimed.
    pub swept: usize,
    /// Weak watches whose referent was reclaimed.
    pub nullified: usize,
    /// Objects still alive afterwards.
    pub live: usize,
}

impl Heap {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, HeapState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate an object and return the first root to it.
    pub fn alloc(self: &Arc<Self>, object: Object) -> Root {
        let obj = self.lock().objects.insert(Cell {
            object,
            roots: 1,
            watches: 0,
        });
        Root {
            heap: Arc::clone(self),
            obj,
        }
    }

    /// Root `value` again if it is still alive.
    pub fn root(self: &Arc<Self>, value: Value) -> Option<Root> {
        let obj = value.as_obj()?;
        let mut pause = self.pause();
        if !pause.is_live(value) {
            return None;
        }
        pause.retain(value);
        drop(pause);
        Some(Root {
            heap: Arc::clone(self),
            obj,
        })
    }

    /// Enter the exclusion window. Collection cannot run until the returned
    /// guard is dropped. Must not be nested on one thread.
    pub fn pause(&self) -> GcPause<'_> {
        let depth = DebugReentrancy::enter();
        GcPause {
            state: self.lock(),
            _depth: depth,
        }
    }

    /// Mark from every rooted object, then sweep everything unmarked.
    pub fn collect(&self) -> CollectStats {
        let mut pause = self.pause();
        let stats = pause.sweep();
        drop(pause);
        log::debug!(
            "collect: swept {} objects, nullified {} weak watches, {} live",
            stats.swept,
            stats.nullified,
            stats.live
        );
        stats
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().objects.is_empty()
    }

    /// Whether `value` is an immediate or a still-allocated object.
    pub fn is_live(&self, value: Value) -> bool {
        self.pause().is_live(value)
    }

    /// Current root count of `obj`; 0 once it has been swept.
    pub fn root_count(&self, obj: ObjRef) -> usize {
        self.lock().objects.get(obj).map_or(0, |c| c.roots)
    }

    /// Current number of weak watches registered on `obj`.
    pub fn watch_count(&self, obj: ObjRef) -> usize {
        self.lock().objects.get(obj).map_or(0, |c| c.watches)
    }
}

/// The exclusion window: a held heap lock that keeps the collector out.
pub struct GcPause<'h> {
    state: MutexGuard<'h, HeapState>,
    _depth: ReentrancyGuard,
}

impl<'h> GcPause<'h> {
    /// Query-nullified: immediates are always live; objects are live while
    /// their slot generation still matches.
    #[inline]
    pub fn is_live(&self, value: Value) -> bool {
        match value {
            Value::Obj(obj) => self.state.objects.contains_key(obj),
            _ => true,
        }
    }

    pub fn object(&self, obj: ObjRef) -> Option<&Object> {
        self.state.objects.get(obj).map(|c| &c.object)
    }

    /// Payload of `value` when it is a live object.
    pub fn get(&self, value: Value) -> Option<&Object> {
        self.object(value.as_obj()?)
    }

    pub(crate) fn retain(&mut self, value: Value) {
        if let Some(cell) = value.as_obj().and_then(|o| self.state.objects.get_mut(o)) {
            cell.roots += 1;
        }
    }

    pub(crate) fn release(&mut self, value: Value) {
        if let Some(cell) = value.as_obj().and_then(|o| self.state.objects.get_mut(o)) {
            debug_assert!(cell.roots > 0, "root count underflow");
            cell.roots = cell.roots.saturating_sub(1);
        }
    }

    /// Register-weak-reference.
    pub(crate) fn watch(&mut self, value: Value) {
        if let Some(cell) = value.as_obj().and_then(|o| self.state.objects.get_mut(o)) {
            cell.watches += 1;
        }
    }

    pub(crate) fn unwatch(&mut self, value: Value) {
        if let Some(cell) = value.as_obj().and_then(|o| self.state.objects.get_mut(o)) {
            cell.watches = cell.watches.saturating_sub(1);
        }
    }

    fn sweep(&mut self) -> CollectStats {
        let objects = &mut self.state.objects;
        let mut marked: HashSet<ObjRef> = HashSet::with_capacity(objects.len());
        let mut stack: Vec<ObjRef> = objects
            .iter()
            .filter(|(_, cell)| cell.roots > 0)
            .map(|(obj, _)| obj)
            .collect();

        while let Some(obj) = stack.pop() {
            if !marked.insert(obj) {
                continue;
            }
            if let Some(cell) = objects.get(obj) {
                cell.object.for_each_child(|child| {
                    if !marked.contains(&child) {
                        stack.push(child);
                    }
                });
            }
        }

        let before = objects.len();
        let mut nullified = 0;
        objects.retain(|obj, cell| {
            let keep = marked.contains(&obj);
            if !keep {
                nullified += cell.watches;
            }
            keep
        });
        CollectStats {
            swept: before - objects.len(),
            nullified,
            live: objects.len(),
        }
    }
}

impl fmt::Debug for GcPause<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcPause")
            .field("objects", &self.state.objects.len())
            .finish()
    }
}

/// A strong reference held outside any table. Cloning adds a root;
/// dropping removes one.
pub struct Root {
    heap: Arc<Heap>,
    obj: ObjRef,
}

impl Root {
    #[inline]
    pub fn value(&self) -> Value {
        Value::Obj(self.obj)
    }

    #[inline]
    pub fn obj(&self) -> ObjRef {
        self.obj
    }

    pub fn heap(&self) -> &Arc<Heap> {
        &self.heap
    }
}

impl Clone for Root {
    fn clone(&self) -> Self {
        self.heap.pause().retain(self.value());
        Self {
            heap: Arc::clone(&self.heap),
            obj: self.obj,
        }
    }
}

impl Drop for Root {
    fn drop(&mut self) {
        self.heap.pause().release(self.value());
    }
}

impl fmt::Debug for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Root").field(&self.obj).finish()
    }
}

//! Rebuild the bucket array at a new capacity, relocating every live handle.

use crate::error::TableError;
use crate::handle::{Handle, HandleFactory};
use crate::heap::Heap;
use crate::reconcile;
use crate::store::Store;
use crate::strategy::Strategy;

/// Release every dead handle in `store` under one pause and return the live
/// count. A resize picks its tier from this count, not the stale one.
pub(crate) fn purge_dead(heap: &Heap, store: &mut Store, factory: &HandleFactory) -> Result<usize, TableError> {
    if !factory.kind().is_weak() {
        return Ok(store.entries.len());
    }
    let mut pause = heap.pause();
    let mut purged = 0;
    for index in 0..store.capacity() {
        let mut chain = std::mem::take(&mut store.buckets[index]);
        let cleaned = reconcile::purge_chain(&mut chain, store, factory, &mut pause);
        store.buckets[index] = chain;
        purged += cleaned?;
    }
    if purged > 0 {
        log::debug!("purged {} dead handles before resize", purged);
    }
    Ok(store.entries.len())
}

/// Move every live handle of `store` into a fresh array of `new_capacity`
/// buckets and return how many were moved.
///
/// Destinations are computed and validated first, under one pause; handles
/// found dead along the way are released then. An out-of-range hash leaves
/// the table as it was. The new array is installed before the old snapshot
/// is walked, and each handle lands at the head of its new chain, so
/// per-bucket order may reverse.
pub(crate) fn rehash<S: Strategy + ?Sized>(
    heap: &Heap,
    store: &mut Store,
    factory: &HandleFactory,
    new_capacity: usize,
    strategy: &S,
) -> Result<usize, TableError> {
    let old_capacity = store.capacity();
    let mut dest: Vec<usize> = Vec::new();
    let mut dead: Vec<Handle> = Vec::new();
    {
        let mut pause = heap.pause();
        for &h in store.buckets.iter().flatten() {
            let entry = store
                .entries
                .get(h.raw_handle())
                .ok_or(TableError::WrongType)?;
            if !factory.is_live(entry, &pause) {
                dead.push(h);
                continue;
            }
            let index = strategy.hash(&entry.key, new_capacity, &pause);
            if index >= new_capacity {
                return Err(TableError::OutOfRange {
                    index,
                    capacity: new_capacity,
                });
            }
            dest.push(index);
        }
        for &h in &dead {
            store.discard(h, factory, &mut pause);
        }
    }

    let old = std::mem::replace(&mut store.buckets, vec![Vec::new(); new_capacity]);
    let mut targets = dest.into_iter();
    for h in old.into_iter().flatten() {
        if !store.entries.contains_key(h.raw_handle()) {
            continue;
        }
        if let Some(index) = targets.next() {
            store.buckets[index].insert(0, h);
        }
    }

    let moved = store.entries.len();
    log::debug!(
        "rehash: {} -> {} buckets, {} live, {} dropped",
        old_capacity,
        new_capacity,
        moved,
        dead.len()
    );
    Ok(moved)
}

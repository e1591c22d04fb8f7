//! Weak-entry reconciliation: purge nullified handles from a bucket before
//! anything searches it.
//!
//! Clean-then-search is mandatory. An associate function run over a chain
//! that still holds dead handles could compare against a swept key and
//! report a bogus match. Everything here runs inside one [`GcPause`], so
//! the collector cannot nullify anything between the clean and the search.

use crate::error::TableError;
use crate::handle::{Handle, HandleFactory};
use crate::heap::{GcPause, Heap};
use crate::store::{Bucket, Store};
use crate::strategy::{Chain, Strategy};
use crate::value::Value;

/// Where a key hashes to and what the associate function found there.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Located {
    pub(crate) index: usize,
    pub(crate) found: Option<Handle>,
}

/// Outcome of a reconciled lookup. `purged` is meaningful even when
/// `result` is an error, so the caller can keep its item count honest.
#[derive(Debug)]
pub(crate) struct Reconciled {
    pub(crate) purged: usize,
    pub(crate) result: Result<Located, TableError>,
}

/// Splice dead handles out of `chain`, releasing their entries. Returns how
/// many were removed. Fails with `WrongType` if a link does not resolve,
/// leaving the chain untouched.
pub(crate) fn purge_chain(
    chain: &mut Bucket,
    store: &mut Store,
    factory: &HandleFactory,
    pause: &mut GcPause<'_>,
) -> Result<usize, TableError> {
    let mut dead: Vec<Handle> = Vec::new();
    for &h in chain.iter() {
        let entry = store
            .entries
            .get(h.raw_handle())
            .ok_or(TableError::WrongType)?;
        if !factory.is_live(entry, pause) {
            dead.push(h);
        }
    }
    if dead.is_empty() {
        return Ok(0);
    }
    chain.retain(|h| !dead.contains(h));
    for &h in &dead {
        store.discard(h, factory, pause);
    }
    log::trace!("purged {} dead handles from chain", dead.len());
    Ok(dead.len())
}

/// Hash `key`, clean its bucket and run the strategy's associate function
/// over the clean chain, all in one pause.
pub(crate) fn locate<S: Strategy + ?Sized>(
    heap: &Heap,
    store: &mut Store,
    factory: &HandleFactory,
    key: &Value,
    strategy: &S,
) -> Reconciled {
    let mut pause = heap.pause();
    let capacity = store.capacity();
    let index = strategy.hash(key, capacity, &pause);
    if index >= capacity {
        return Reconciled {
            purged: 0,
            result: Err(TableError::OutOfRange { index, capacity }),
        };
    }

    let mut chain = std::mem::take(&mut store.buckets[index]);
    let cleaned = purge_chain(&mut chain, store, factory, &mut pause);
    store.buckets[index] = chain;
    let purged = match cleaned {
        Ok(n) => n,
        Err(e) => {
            return Reconciled {
                purged: 0,
                result: Err(e),
            }
        }
    };

    let bucket = &store.buckets[index];
    let found = strategy.assoc(key, &Chain::new(bucket, &store.entries, &pause));
    let result = match found {
        Some(h) if !bucket.contains(&h) => Err(TableError::WrongHandleShape),
        _ => Ok(Located { index, found }),
    };
    Reconciled { purged, result }
}

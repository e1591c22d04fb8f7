//! weak-hashtab: a bucket-chained hash table for a managed runtime, with
//! strong, weak-key, weak-value and weak-both entries that a collector may
//! nullify at any time.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: keep the table consistent while a collector, possibly on another
//!   thread, sweeps objects the table only watches.
//! - Layers:
//!   - Heap: a small reference collector. Objects live in a generational
//!     arena; roots keep them alive, watches do not. `Heap::pause` is the
//!     exclusion window during which `collect` cannot run.
//!   - HandleFactory: builds entries for one `ReferenceKind`, rooting strong
//!     endpoints and watching weak ones, and undoes that on release.
//!   - Store: the bucket array plus the entry arena its chains point into.
//!   - Reconciler: purges dead handles from a chain and runs the strategy's
//!     associate function over the clean chain, in one pause.
//!   - Rehash + SizingPolicy: tiered capacities and the relocation pass.
//!   - Table: the public operation set, keyed by a caller `Strategy`.
//!
//! Constraints
//! - One mutator per table: every operation that can purge takes `&mut self`.
//! - Pauses are short: one chain, or one index pass of a rehash. Callbacks
//!   of `fold` and friends never run inside a pause.
//! - Dead entries are found lazily, the next time their bucket is touched.
//!
//! Handles
//! - A `Handle` is a generational key into the table's entry arena. It is
//!   stable across `set`, `set_handle_value` and rehashes, and stops
//!   resolving once the entry is removed or purged.
//!
//! Reentrancy policy
//! - Taking a pause twice on one thread would deadlock on the heap mutex.
//!   A debug-only thread-local guard turns that into a panic. Strategy
//!   callbacks receive the pause that is already held and must use it.
//!
//! Sizing
//! - Capacities come from the fixed `TIERS` sequence. The table grows one
//!   tier past 9/10 load and shrinks, possibly several tiers, below 1/4 load,
//!   never under the tier it was created with.
//!
//! Notes and non-goals
//! - No multi-writer concurrency on one table; callers serialize writers.
//! - No ordering guarantee for iteration beyond one visit per live entry.

mod error;
mod handle;
mod heap;
mod reconcile;
mod reentrancy;
mod rehash;
mod sizing;
mod store;
pub mod strategy;
mod table;
mod table_proptest;
mod value;

// Public surface
pub use error::TableError;
pub use handle::{Handle, ReferenceKind};
pub use heap::{CollectStats, GcPause, Heap, Root};
pub use sizing::{Thresholds, DEFAULT_MIN_CAPACITY, TIERS};
pub use strategy::{Chain, Custom, Equal, Eqv, HashFn, Identity, Link, Strategy};
pub use table::Table;
pub use value::{ObjRef, Object, Value};

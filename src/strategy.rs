//! Hash/associate/delete strategies threaded through every table operation.
//!
//! Three built-ins cover the usual equality flavors:
//! - [`Identity`]: same immediate or same object.
//! - [`Eqv`]: identity, plus boxed reals compare by value.
//! - [`Equal`]: structural; strings, pairs and vectors compare by content.
//!
//! [`Custom`] wraps caller closures for anything else.

use crate::handle::{Entry, Handle};
use crate::heap::GcPause;
use crate::value::{Object, Value};
use slotmap::{DefaultKey, SlotMap};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A hash function that carries no state of its own; tables remember it so
/// they can rehash later without the caller's strategy.
pub type HashFn = fn(&Value, usize, &GcPause<'_>) -> usize;

/// How deep structural hashing descends into nested pairs and vectors.
const EQUAL_HASH_DEPTH: usize = 8;

/// Leading vector elements that feed a structural hash.
const EQUAL_HASH_VECTOR_PREFIX: usize = 4;

/// One association in a chain as seen by an associate function.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Link {
    pub handle: Handle,
    pub key: Value,
    pub value: Value,
}

/// A cleaned bucket chain handed to [`Strategy::assoc`]. Every link in it is
/// live for as long as the borrowed pause is held.
pub struct Chain<'a, 'h> {
    links: &'a [Handle],
    entries: &'a SlotMap<DefaultKey, Entry>,
    pause: &'a GcPause<'h>,
}

impl<'a, 'h> Chain<'a, 'h> {
    pub(crate) fn new(
        links: &'a [Handle],
        entries: &'a SlotMap<DefaultKey, Entry>,
        pause: &'a GcPause<'h>,
    ) -> Self {
        Self {
            links,
            entries,
            pause,
        }
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn handles(&self) -> &'a [Handle] {
        self.links
    }

    pub fn pause(&self) -> &'a GcPause<'h> {
        self.pause
    }

    pub fn iter(&self) -> impl Iterator<Item = Link> + 'a {
        let entries = self.entries;
        self.links.iter().filter_map(move |&handle| {
            entries.get(handle.raw_handle()).map(|e| Link {
                handle,
                key: e.key,
                value: e.value,
            })
        })
    }
}

impl fmt::Debug for Chain<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Pluggable hashing and equality for a table.
///
/// `hash` must return an index in `0..modulus` and must agree with `assoc`:
/// keys that associate must hash alike.
pub trait Strategy {
    fn hash(&self, key: &Value, modulus: usize, pause: &GcPause<'_>) -> usize;

    /// The handle in `chain` whose key matches `key`, if any.
    fn assoc(&self, key: &Value, chain: &Chain<'_, '_>) -> Option<Handle>;

    /// Excise `handle` from `chain`.
    fn delete(&self, handle: Handle, chain: &mut Vec<Handle>) {
        chain.retain(|&h| h != handle);
    }

    /// The plain function behind `hash`, when there is one.
    fn hash_fn(&self) -> Option<HashFn> {
        None
    }
}

/// First link whose key satisfies `eq` against `key`.
pub fn assoc_with<F>(key: &Value, chain: &Chain<'_, '_>, mut eq: F) -> Option<Handle>
where
    F: FnMut(&Value, &Value, &GcPause<'_>) -> bool,
{
    let pause = chain.pause();
    chain
        .iter()
        .find(|link| eq(key, &link.key, pause))
        .map(|link| link.handle)
}

fn reduce(hasher: &impl Hasher, modulus: usize) -> usize {
    (hasher.finish() % modulus as u64) as usize
}

pub fn hash_identity(key: &Value, modulus: usize, _pause: &GcPause<'_>) -> usize {
    let mut h = DefaultHasher::new();
    key.hash(&mut h);
    reduce(&h, modulus)
}

pub fn hash_eqv(key: &Value, modulus: usize, pause: &GcPause<'_>) -> usize {
    match pause.get(*key) {
        Some(Object::Real(r)) => {
            let mut h = DefaultHasher::new();
            r.to_bits().hash(&mut h);
            reduce(&h, modulus)
        }
        _ => hash_identity(key, modulus, pause),
    }
}

pub fn hash_equal(key: &Value, modulus: usize, pause: &GcPause<'_>) -> usize {
    let mut h = DefaultHasher::new();
    feed_equal(key, pause, &mut h, EQUAL_HASH_DEPTH);
    reduce(&h, modulus)
}

fn feed_equal(v: &Value, pause: &GcPause<'_>, h: &mut DefaultHasher, depth: usize) {
    match pause.get(*v) {
        None => v.hash(h),
        Some(Object::Str(s)) => {
            0u8.hash(h);
            s.hash(h);
        }
        Some(Object::Real(r)) => {
            1u8.hash(h);
            r.to_bits().hash(h);
        }
        Some(Object::Pair(car, cdr)) => {
            2u8.hash(h);
            if depth > 0 {
                feed_equal(car, pause, h, depth - 1);
                feed_equal(cdr, pause, h, depth - 1);
            }
        }
        Some(Object::Vector(items)) => {
            3u8.hash(h);
            items.len().hash(h);
            if depth > 0 {
                for item in items.iter().take(EQUAL_HASH_VECTOR_PREFIX) {
                    feed_equal(item, pause, h, depth - 1);
                }
            }
        }
    }
}

pub fn identical(a: &Value, b: &Value, _pause: &GcPause<'_>) -> bool {
    a == b
}

pub fn eqv(a: &Value, b: &Value, pause: &GcPause<'_>) -> bool {
    if a == b {
        return true;
    }
    match (pause.get(*a), pause.get(*b)) {
        (Some(Object::Real(x)), Some(Object::Real(y))) => x.to_bits() == y.to_bits(),
        _ => false,
    }
}

pub fn equal(a: &Value, b: &Value, pause: &GcPause<'_>) -> bool {
    if eqv(a, b, pause) {
        return true;
    }
    match (pause.get(*a), pause.get(*b)) {
        (Some(Object::Str(x)), Some(Object::Str(y))) => x == y,
        (Some(Object::Pair(a1, d1)), Some(Object::Pair(a2, d2))) => {
            equal(a1, a2, pause) && equal(d1, d2, pause)
        }
        (Some(Object::Vector(xs)), Some(Object::Vector(ys))) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| equal(x, y, pause))
        }
        _ => false,
    }
}

/// Identity hashing and comparison.
#[derive(Copy, Clone, Debug, Default)]
pub struct Identity;

impl Strategy for Identity {
    fn hash(&self, key: &Value, modulus: usize, pause: &GcPause<'_>) -> usize {
        hash_identity(key, modulus, pause)
    }
    fn assoc(&self, key: &Value, chain: &Chain<'_, '_>) -> Option<Handle> {
        assoc_with(key, chain, identical)
    }
    fn hash_fn(&self) -> Option<HashFn> {
        Some(hash_identity)
    }
}

/// Identity, except boxed reals compare by value.
#[derive(Copy, Clone, Debug, Default)]
pub struct Eqv;

impl Strategy for Eqv {
    fn hash(&self, key: &Value, modulus: usize, pause: &GcPause<'_>) -> usize {
        hash_eqv(key, modulus, pause)
    }
    fn assoc(&self, key: &Value, chain: &Chain<'_, '_>) -> Option<Handle> {
        assoc_with(key, chain, eqv)
    }
    fn hash_fn(&self) -> Option<HashFn> {
        Some(hash_eqv)
    }
}

/// Structural hashing and comparison.
#[derive(Copy, Clone, Debug, Default)]
pub struct Equal;

impl Strategy for Equal {
    fn hash(&self, key: &Value, modulus: usize, pause: &GcPause<'_>) -> usize {
        hash_equal(key, modulus, pause)
    }
    fn assoc(&self, key: &Value, chain: &Chain<'_, '_>) -> Option<Handle> {
        assoc_with(key, chain, equal)
    }
    fn hash_fn(&self) -> Option<HashFn> {
        Some(hash_equal)
    }
}

type DeleteFn = Box<dyn Fn(Handle, &mut Vec<Handle>)>;

/// Strategy built from caller closures. Tables never cache its hash, since
/// the closures may capture state.
pub struct Custom<H, A> {
    hash: H,
    assoc: A,
    delete: Option<DeleteFn>,
}

impl<H, A> Custom<H, A>
where
    H: Fn(&Value, usize, &GcPause<'_>) -> usize,
    A: Fn(&Value, &Chain<'_, '_>) -> Option<Handle>,
{
    pub fn new(hash: H, assoc: A) -> Self {
        Self {
            hash,
            assoc,
            delete: None,
        }
    }

    pub fn with_delete<D>(mut self, delete: D) -> Self
    where
        D: Fn(Handle, &mut Vec<Handle>) + 'static,
    {
        self.delete = Some(Box::new(delete));
        self
    }
}

impl<H, A> Strategy for Custom<H, A>
where
    H: Fn(&Value, usize, &GcPause<'_>) -> usize,
    A: Fn(&Value, &Chain<'_, '_>) -> Option<Handle>,
{
    fn hash(&self, key: &Value, modulus: usize, pause: &GcPause<'_>) -> usize {
        (self.hash)(key, modulus, pause)
    }
    fn assoc(&self, key: &Value, chain: &Chain<'_, '_>) -> Option<Handle> {
        (self.assoc)(key, chain)
    }
    fn delete(&self, handle: Handle, chain: &mut Vec<Handle>) {
        match &self.delete {
            Some(delete) => delete(handle, chain),
            None => chain.retain(|&h| h != handle),
        }
    }
}

impl<H, A> fmt::Debug for Custom<H, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Custom")
            .field("delete", &self.delete.is_some())
            .finish_non_exhaustive()
    }
}

/// Rehash-only strategy around a remembered hash function.
pub(crate) struct Cached(pub(crate) HashFn);

impl Strategy for Cached {
    fn hash(&self, key: &Value, modulus: usize, pause: &GcPause<'_>) -> usize {
        (self.0)(key, modulus, pause)
    }
    fn assoc(&self, _key: &Value, _chain: &Chain<'_, '_>) -> Option<Handle> {
        None
    }
    fn hash_fn(&self) -> Option<HashFn> {
        Some(self.0)
    }
}

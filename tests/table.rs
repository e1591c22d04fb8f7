// Table integration suite over strong tables.
//
// Each test documents what behavior is being verified. The core
// invariants exercised:
// - Round trip: set then ref yields the value; absent keys yield the default.
// - Sizing: capacity is always a tier, grows one tier past 9/10 load and
//   shrinks back to (never below) the creation tier.
// - Handles: stable across set and rehash, dead after remove.
// - Strategies: identity, eqv and structural equality pick different
//   matches; custom closures and delete hooks are honored.
use std::cell::Cell;
use std::collections::BTreeSet;
use std::rc::Rc;
use weak_hashtab::strategy::{assoc_with, hash_identity, identical};
use weak_hashtab::{
    Chain, Custom, Equal, Eqv, GcPause, Heap, Identity, Object, ReferenceKind, Table, TableError,
    Value, TIERS,
};

fn strong(min_capacity: usize) -> Table {
    Table::with_min_capacity(Heap::new(), ReferenceKind::Strong, min_capacity)
}

// Test: the canonical growth/shrink scenario.
// Assumes: minimum capacity 31, keys 1..=50 with sequential values.
// Verifies: exactly one growth to 61; every key reads back; removing 40
// keys shrinks back to 31.
#[test]
fn grow_once_then_shrink_to_minimum() {
    let mut t = strong(31);
    assert_eq!(t.capacity(), 31);

    let mut capacities = vec![t.capacity()];
    for i in 1..=50 {
        t.set(&Value::Int(i), Value::Int(i * 10), &Identity).unwrap();
        if *capacities.last().unwrap() != t.capacity() {
            capacities.push(t.capacity());
        }
    }
    assert_eq!(capacities, vec![31, 61], "exactly one growth rehash");
    assert_eq!(t.len(), 50);

    for i in 1..=50 {
        let h = t.get_handle(&Value::Int(i), &Identity).unwrap().expect("present");
        assert_eq!(h.value(&t), Some(Value::Int(i * 10)));
    }

    for i in 1..=40 {
        assert!(t.remove(&Value::Int(i), &Identity).unwrap().is_some());
    }
    assert_eq!(t.len(), 10);
    assert_eq!(t.capacity(), 31);
    assert_eq!(t.thresholds().lower, 0, "lower bound waived at the minimum tier");
    for i in 41..=50 {
        assert_eq!(t.ref_or(&Value::Int(i), Value::Nil, &Identity).unwrap(), Value::Int(i * 10));
    }
}

// Test: shrink/grow stability at scale.
// Verifies: inserting N and removing all N returns to the minimum tier,
// with capacity a tier and load under the upper threshold throughout.
#[test]
fn insert_then_remove_all_returns_to_minimum() {
    let mut t = strong(100);
    assert_eq!(t.capacity(), 113);
    assert_eq!(t.min_capacity(), 113);
    let n = 5_000;
    for i in 0..n {
        t.set(&Value::Int(i), Value::Bool(true), &Identity).unwrap();
        assert!(TIERS.contains(&t.capacity()));
        assert!(t.len() <= t.thresholds().upper);
    }
    assert!(t.capacity() > 5_000);
    for i in 0..n {
        t.remove(&Value::Int(i), &Identity).unwrap();
        assert!(t.capacity() >= 113);
    }
    assert!(t.is_empty());
    assert_eq!(t.capacity(), 113);
}

// Test: requested minimums round up to a tier and clamp at the last one.
#[test]
fn min_capacity_rounds_up_to_a_tier() {
    assert_eq!(strong(0).capacity(), 31);
    assert_eq!(strong(32).capacity(), 61);
    assert_eq!(strong(883).capacity(), 883);
    assert_eq!(Table::new(Heap::new(), ReferenceKind::Strong).capacity(), 31);
    let huge = strong(usize::MAX);
    assert_eq!(huge.capacity(), *TIERS.last().unwrap());
}

// Test: fold with an accumulating cons.
// Verifies: collecting over {(a,1),(b,2)} yields exactly those pairs.
#[test]
fn fold_collects_exact_pairs() {
    let mut t = strong(31);
    t.set(&Value::Char('a'), Value::Int(1), &Identity).unwrap();
    t.set(&Value::Char('b'), Value::Int(2), &Identity).unwrap();
    let pairs: BTreeSet<(Value, Value)> = t
        .fold(BTreeSet::new(), |mut acc, k, v| {
            acc.insert((k, v));
            acc
        })
        .unwrap();
    let want: BTreeSet<_> = [
        (Value::Char('a'), Value::Int(1)),
        (Value::Char('b'), Value::Int(2)),
    ]
    .into_iter()
    .collect();
    assert_eq!(pairs, want);
}

// Test: handle identity survives set and a rehash.
#[test]
fn handle_is_stable_across_set_and_rehash() {
    let mut t = strong(31);
    let k = Value::Int(-1);
    let h = t.create_handle(&k, Value::Int(0), &Identity).unwrap();
    t.set(&k, Value::Int(1), &Identity).unwrap();
    for i in 0..200 {
        t.set(&Value::Int(i), Value::Nil, &Identity).unwrap();
    }
    assert!(t.capacity() > 31);
    assert_eq!(t.get_handle(&k, &Identity).unwrap(), Some(h));
    assert_eq!(h.value(&t), Some(Value::Int(1)));
    t.set_handle_value(h, Value::Int(2)).unwrap();
    assert_eq!(t.ref_or(&k, Value::Nil, &Identity).unwrap(), Value::Int(2));
}

// Test: equality flavors.
// Verifies: identity distinguishes separately allocated equal objects, eqv
// merges equal reals, equal merges equal strings and pairs.
#[test]
fn strategies_choose_their_equality() {
    let heap = Heap::new();
    let r1 = heap.alloc(Object::Real(1.5));
    let r2 = heap.alloc(Object::Real(1.5));
    let s1 = heap.alloc(Object::string("abc"));
    let s2 = heap.alloc(Object::string("abc"));
    let p1 = heap.alloc(Object::Pair(s1.value(), Value::Int(1)));
    let p2 = heap.alloc(Object::Pair(s2.value(), Value::Int(1)));

    let mut by_identity = Table::new(heap.clone(), ReferenceKind::Strong);
    by_identity.set(&r1.value(), Value::Int(1), &Identity).unwrap();
    assert_eq!(by_identity.get(&r2.value(), &Identity).unwrap(), None);
    assert_eq!(by_identity.get(&r1.value(), &Identity).unwrap(), Some(Value::Int(1)));

    let mut by_eqv = Table::new(heap.clone(), ReferenceKind::Strong);
    by_eqv.set(&r1.value(), Value::Int(1), &Eqv).unwrap();
    assert_eq!(by_eqv.get(&r2.value(), &Eqv).unwrap(), Some(Value::Int(1)));
    by_eqv.set(&s1.value(), Value::Int(2), &Eqv).unwrap();
    assert_eq!(by_eqv.get(&s2.value(), &Eqv).unwrap(), None, "eqv does not look into strings");

    let mut by_equal = Table::new(heap.clone(), ReferenceKind::Strong);
    by_equal.set(&p1.value(), Value::Int(3), &Equal).unwrap();
    assert_eq!(by_equal.get(&p2.value(), &Equal).unwrap(), Some(Value::Int(3)));
    assert_eq!(by_equal.set(&p2.value(), Value::Int(4), &Equal).unwrap(), Some(Value::Int(3)));
    assert_eq!(by_equal.len(), 1);
}

// Test: custom strategies.
// Verifies: caller closures drive hashing and association, the delete hook
// runs on remove, and the hash function is not cached.
#[test]
fn custom_strategy_with_delete_hook() {
    let deletes = Rc::new(Cell::new(0));
    let counter = deletes.clone();
    // Case-insensitive chars.
    let fold_case = |v: &Value| match v {
        Value::Char(c) => Value::Char(c.to_ascii_lowercase()),
        other => *other,
    };
    let s = Custom::new(
        move |k: &Value, n: usize, p: &GcPause<'_>| hash_identity(&fold_case(k), n, p),
        move |k: &Value, c: &Chain<'_, '_>| {
            assoc_with(&fold_case(k), c, |a, b, p| identical(a, &fold_case(b), p))
        },
    )
    .with_delete(move |h, chain| {
        counter.set(counter.get() + 1);
        chain.retain(|&x| x != h);
    });

    let mut t = strong(31);
    t.set(&Value::Char('Q'), Value::Int(1), &s).unwrap();
    assert_eq!(t.ref_or(&Value::Char('q'), Value::Nil, &s).unwrap(), Value::Int(1));
    assert!(t.cached_hash_fn().is_none());

    assert_eq!(
        t.remove(&Value::Char('q'), &s).unwrap(),
        Some((Value::Char('Q'), Value::Int(1)))
    );
    assert_eq!(deletes.get(), 1);
    assert_eq!(t.remove(&Value::Char('q'), &s).unwrap(), None);
    assert_eq!(deletes.get(), 1, "no delete for an absent key");
}

// Test: error kinds reach the caller unchanged.
#[test]
fn errors_are_reported() {
    let heap = Heap::new();
    let mut void = Table::void(heap.clone(), ReferenceKind::WeakBoth);
    assert_eq!(void.capacity(), 0);
    assert_eq!(void.reference_kind(), ReferenceKind::WeakBoth);
    assert_eq!(void.thresholds().upper, 0);
    assert_eq!(void.thresholds().lower, 0);
    assert_eq!(
        void.create_handle(&Value::Int(1), Value::Nil, &Identity),
        Err(TableError::VoidTable)
    );

    let mut other = Table::new(heap.clone(), ReferenceKind::Strong);
    let foreign = other.create_handle(&Value::Int(1), Value::Nil, &Identity).unwrap();
    let liar = Custom::new(
        |k: &Value, n: usize, p: &GcPause<'_>| hash_identity(k, n, p),
        move |_: &Value, _: &Chain<'_, '_>| Some(foreign),
    );
    let mut t = Table::new(heap, ReferenceKind::Strong);
    assert_eq!(t.get_handle(&Value::Int(1), &liar), Err(TableError::WrongHandleShape));
    assert_eq!(t.set_handle_value(foreign, Value::Nil), Err(TableError::WrongType));

    let wide = Custom::new(
        |_: &Value, n: usize, _: &GcPause<'_>| n + 3,
        |_: &Value, _: &Chain<'_, '_>| None,
    );
    let err = t.set(&Value::Int(1), Value::Nil, &wide).unwrap_err();
    assert_eq!(err, TableError::OutOfRange { index: 34, capacity: 31 });
    assert_eq!(err.to_string(), "hash index 34 out of range for 31 buckets");
}

// Test: an insertion whose growth rehash fails.
// Assumes: the hash is in range at 31 buckets and out of range at 61.
// Verifies: the error reaches the caller, the key is not present, and the
// table keeps its earlier entries, count and capacity.
#[test]
fn failed_growth_rolls_back_the_insertion() {
    let heap = Heap::new();
    let mut t = Table::new(heap, ReferenceKind::Strong);
    let narrow = Custom::new(
        |k: &Value, n: usize, p: &GcPause<'_>| if n > 31 { n } else { hash_identity(k, n, p) },
        |k: &Value, c: &Chain<'_, '_>| assoc_with(k, c, identical),
    );
    for i in 0..27 {
        t.set(&Value::Int(i), Value::Int(i * 10), &narrow).unwrap();
    }
    assert_eq!(t.capacity(), 31);

    assert_eq!(
        t.set(&Value::Int(27), Value::Int(270), &narrow),
        Err(TableError::OutOfRange { index: 61, capacity: 61 })
    );
    assert_eq!(t.len(), 27);
    assert_eq!(t.capacity(), 31);
    assert_eq!(t.ref_or(&Value::Int(27), Value::Nil, &narrow).unwrap(), Value::Nil);
    assert_eq!(t.fold(0usize, |n, _, _| n + 1).unwrap(), 27);
    for i in 0..27 {
        assert_eq!(t.ref_or(&Value::Int(i), Value::Nil, &narrow).unwrap(), Value::Int(i * 10));
    }
}

// Test: clear keeps capacity and invalidates handles.
#[test]
fn clear_resets_items_only() {
    let mut t = strong(31);
    let hs: Vec<_> = (0..100)
        .map(|i| t.create_handle(&Value::Int(i), Value::Int(i), &Identity).unwrap())
        .collect();
    let cap = t.capacity();
    t.clear();
    assert!(t.is_empty());
    assert_eq!(t.capacity(), cap);
    assert!(hs.iter().all(|h| h.key(&t).is_none()));
    t.set(&Value::Int(1), Value::Int(2), &Identity).unwrap();
    assert_eq!(t.len(), 1);
}

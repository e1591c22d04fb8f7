#![cfg(test)]

// Property tests for Table kept inside the crate so they can look at the
// sizing policy alongside the public surface.

use crate::handle::{Handle, ReferenceKind};
use crate::heap::{Heap, Root};
use crate::sizing::TIERS;
use crate::strategy::{Equal, Identity};
use crate::table::Table;
use crate::value::{Object, Value};
use proptest::prelude::*;
use std::collections::{BTreeSet, HashMap};

// Pool-indexed operations so shrinking walks towards earlier keys.
#[derive(Clone, Debug)]
enum OpI {
    Set(usize, i64),
    Create(usize, i64),
    Remove(usize),
    Get(usize),
    Clear,
    Fold,
    Maintain,
}

fn arb_scenario() -> impl Strategy<Value = (Vec<i64>, Vec<OpI>)> {
    proptest::collection::btree_set(any::<i64>(), 1..=120).prop_flat_map(|pool| {
        let pool: Vec<i64> = pool.into_iter().collect();
        let idx = 0..pool.len();
        let op = prop_oneof![
            6 => (idx.clone(), any::<i64>()).prop_map(|(i, v)| OpI::Set(i, v)),
            3 => (idx.clone(), any::<i64>()).prop_map(|(i, v)| OpI::Create(i, v)),
            4 => idx.clone().prop_map(OpI::Remove),
            3 => idx.clone().prop_map(OpI::Get),
            1 => Just(OpI::Clear),
            1 => Just(OpI::Fold),
            1 => Just(OpI::Maintain),
        ];
        proptest::collection::vec(op, 1..300).prop_map(move |ops| (pool.clone(), ops))
    })
}

fn assert_sized(t: &Table) -> Result<(), TestCaseError> {
    prop_assert!(TIERS.contains(&t.capacity()), "capacity {} is not a tier", t.capacity());
    let last = *TIERS.last().expect("non-empty tiers");
    if t.capacity() != last {
        prop_assert!(t.len() <= t.thresholds().upper);
    }
    prop_assert!(t.capacity() >= t.min_capacity());
    Ok(())
}

// Property: State-machine equivalence against std::collections::HashMap.
// Invariants exercised across random operation sequences:
// - `set`/`ref_or` round trip; `set` reports the previous value.
// - `create_handle` keeps existing values and returns the same handle.
// - Handles are stable across sets and rehashes; removed handles never resolve.
// - `fold` visits each live entry exactly once.
// - Capacity is always a tier and the load never exceeds the upper threshold.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario()) {
        let mut sut = Table::new(Heap::new(), ReferenceKind::Strong);
        let mut model: HashMap<i64, i64> = HashMap::new();
        let mut live: HashMap<i64, Handle> = HashMap::new();
        let mut stale: Vec<Handle> = Vec::new();

        for op in ops {
            match op {
                OpI::Set(i, v) => {
                    let k = pool[i];
                    let prev = sut.set(&Value::Int(k), Value::Int(v), &Identity).unwrap();
                    prop_assert_eq!(prev, model.insert(k, v).map(Value::Int));
                    let h = sut.get_handle(&Value::Int(k), &Identity).unwrap().expect("just set");
                    if let Some(&old) = live.get(&k) {
                        prop_assert_eq!(h, old, "set must keep the handle");
                    }
                    live.insert(k, h);
                }
                OpI::Create(i, v) => {
                    let k = pool[i];
                    let h = sut.create_handle(&Value::Int(k), Value::Int(v), &Identity).unwrap();
                    let expect = *model.entry(k).or_insert(v);
                    prop_assert_eq!(h.value(&sut), Some(Value::Int(expect)));
                    prop_assert_eq!(*live.entry(k).or_insert(h), h);
                }
                OpI::Remove(i) => {
                    let k = pool[i];
                    let got = sut.remove(&Value::Int(k), &Identity).unwrap();
                    let want = model.remove(&k).map(|v| (Value::Int(k), Value::Int(v)));
                    prop_assert_eq!(got, want);
                    if let Some(h) = live.remove(&k) {
                        stale.push(h);
                    }
                }
                OpI::Get(i) => {
                    let k = pool[i];
                    let got = sut.ref_or(&Value::Int(k), Value::Nil, &Identity).unwrap();
                    prop_assert_eq!(got, model.get(&k).map_or(Value::Nil, |&v| Value::Int(v)));
                }
                OpI::Clear => {
                    let cap = sut.capacity();
                    sut.clear();
                    prop_assert_eq!(sut.capacity(), cap);
                    model.clear();
                    stale.extend(live.drain().map(|(_, h)| h));
                }
                OpI::Fold => {
                    let seen = sut.fold(Vec::new(), |mut acc, k, v| { acc.push((k, v)); acc }).unwrap();
                    prop_assert_eq!(seen.len(), model.len());
                    let keys: BTreeSet<Value> = seen.iter().map(|&(k, _)| k).collect();
                    prop_assert_eq!(keys.len(), seen.len(), "no entry visited twice");
                    for (k, v) in seen {
                        let Value::Int(k) = k else { panic!("non-int key") };
                        prop_assert_eq!(Some(v), model.get(&k).map(|&v| Value::Int(v)));
                    }
                }
                OpI::Maintain => {
                    prop_assert_eq!(sut.maintain().unwrap(), 0, "strong tables never purge");
                }
            }
            prop_assert_eq!(sut.len(), model.len());
            prop_assert_eq!(sut.is_empty(), model.is_empty());
            assert_sized(&sut)?;
            for h in &stale {
                prop_assert!(h.value(&sut).is_none());
            }
        }
    }
}

// Property: weak-key entries disappear exactly when their key dies.
// - After dropping a random subset of key roots and collecting, `fold` sees
//   only the survivors and `len` drops by the number of dead keys.
proptest! {
    #![proptest_config(ProptestConfig { cases: 48, .. ProptestConfig::default() })]
    #[test]
    fn prop_weak_keys_follow_liveness(keep in proptest::collection::vec(any::<bool>(), 1..150)) {
        let heap = Heap::new();
        let mut sut = Table::new(heap.clone(), ReferenceKind::WeakKey);
        let mut roots: Vec<Option<Root>> = Vec::new();
        for (i, _) in keep.iter().enumerate() {
            let r = heap.alloc(Object::string(format!("key-{i}")));
            sut.set(&r.value(), Value::Int(i as i64), &Equal).unwrap();
            roots.push(Some(r));
        }
        prop_assert_eq!(sut.len(), keep.len());

        for (slot, &k) in roots.iter_mut().zip(&keep) {
            if !k {
                *slot = None;
            }
        }
        heap.collect();

        let survivors = keep.iter().filter(|&&k| k).count();
        let seen: BTreeSet<Value> = sut.fold(BTreeSet::new(), |mut acc, _, v| { acc.insert(v); acc }).unwrap();
        let want: BTreeSet<Value> = keep
            .iter()
            .enumerate()
            .filter(|(_, &k)| k)
            .map(|(i, _)| Value::Int(i as i64))
            .collect();
        prop_assert_eq!(seen, want);
        prop_assert_eq!(sut.len(), survivors);
        assert_sized(&sut)?;

        for r in roots.iter().flatten() {
            prop_assert!(sut.contains_key(&r.value(), &Equal).unwrap());
        }
    }
}

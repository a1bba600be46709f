//! Join laws for the client lattices

use dataflow_analysis::prelude::*;
use quickcheck::{Arbitrary, Gen};
use quickcheck_macros::quickcheck;

#[derive(Debug, Clone, Copy)]
struct AnyNullness(Nullness);

impl Arbitrary for AnyNullness {
    fn arbitrary(g: &mut Gen) -> Self {
        let choices = [Nullness::Null, Nullness::NonNull, Nullness::MaybeNull];
        AnyNullness(*g.choose(&choices).unwrap_or(&Nullness::MaybeNull))
    }
}

#[derive(Debug, Clone)]
struct AnyConstant(Constant);

impl Arbitrary for AnyConstant {
    fn arbitrary(g: &mut Gen) -> Self {
        // A small range makes equal constants likely
        let k = i64::from(u8::arbitrary(g) % 4);
        let value = match u8::arbitrary(g) % 4 {
            0 => Flat::Bottom,
            1 => Flat::Top,
            _ => Flat::Value(k),
        };
        AnyConstant(value)
    }
}

#[derive(Debug, Clone)]
struct AnyLiveSet(LiveSet);

impl Arbitrary for AnyLiveSet {
    fn arbitrary(g: &mut Gen) -> Self {
        let names = ["a", "b", "c", "d"];
        let picked = Vec::<bool>::arbitrary(g);
        let set = names
            .iter()
            .zip(picked)
            .filter(|(_, keep)| *keep)
            .map(|(name, _)| LocalVar::new(name))
            .collect();
        AnyLiveSet(set)
    }
}

#[quickcheck]
fn nullness_join_commutes(a: AnyNullness, b: AnyNullness) -> bool {
    a.0.least_upper_bound(&b.0) == b.0.least_upper_bound(&a.0)
}

#[quickcheck]
fn nullness_join_is_idempotent(a: AnyNullness) -> bool {
    a.0.least_upper_bound(&a.0) == a.0
}

#[quickcheck]
fn nullness_join_associates(a: AnyNullness, b: AnyNullness, c: AnyNullness) -> bool {
    a.0.least_upper_bound(&b.0).least_upper_bound(&c.0) == a.0.least_upper_bound(&b.0.least_upper_bound(&c.0))
}

#[quickcheck]
fn maybe_null_absorbs(a: AnyNullness) -> bool {
    a.0.least_upper_bound(&Nullness::MaybeNull) == Nullness::MaybeNull
}

#[quickcheck]
fn constant_join_commutes(a: AnyConstant, b: AnyConstant) -> bool {
    a.0.join(&b.0) == b.0.join(&a.0)
}

#[quickcheck]
fn constant_join_associates(a: AnyConstant, b: AnyConstant, c: AnyConstant) -> bool {
    a.0.join(&b.0).join(&c.0) == a.0.join(&b.0.join(&c.0))
}

#[quickcheck]
fn constant_join_is_an_upper_bound(a: AnyConstant, b: AnyConstant) -> bool {
    let joined = a.0.join(&b.0);
    a.0.is_below(&joined) && b.0.is_below(&joined)
}

#[quickcheck]
fn live_set_join_commutes(a: AnyLiveSet, b: AnyLiveSet) -> bool {
    a.0.least_upper_bound(&b.0) == b.0.least_upper_bound(&a.0)
}

#[quickcheck]
fn live_set_join_is_idempotent(a: AnyLiveSet) -> bool {
    a.0.least_upper_bound(&a.0) == a.0
}

#[quickcheck]
fn live_set_join_contains_both(a: AnyLiveSet, b: AnyLiveSet) -> bool {
    let joined = a.0.least_upper_bound(&b.0);
    a.0.iter().chain(b.0.iter()).all(|var| joined.contains(var))
}

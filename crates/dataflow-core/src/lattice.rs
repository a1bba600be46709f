//! Lattice contracts for abstract values and stores
//!
//! The engine only relies on two operations of a lattice element: the join
//! (least upper bound) and equality. Copying is `Clone`, which must be
//! structural: a clone is equal to its source and independently mutable.
//!
//! Two reusable building blocks are provided:
//! - [`Flat`] - the flat lattice `Bottom < Value(t) < Top`
//! - [`Environment`] - a store mapping keys to abstract values, joined pointwise

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// An element of the value lattice attached to CFG nodes.
///
/// `least_upper_bound` must be associative, commutative and idempotent.
pub trait AbstractValue: Clone + PartialEq + fmt::Debug {
    /// Join operation (least upper bound)
    fn least_upper_bound(&self, other: &Self) -> Self;
}

/// An element of the store lattice attached to program points.
pub trait Store: Clone + PartialEq + fmt::Debug {
    /// Join operation (least upper bound)
    fn least_upper_bound(&self, other: &Self) -> Self;

    /// Upper bound used at loop heads once widening is engaged.
    ///
    /// `self` is the store previously recorded at the loop head, `next` the
    /// joined store about to replace it. Lattices of finite height keep the
    /// default, which is the plain join.
    fn widened_upper_bound(&self, next: &Self) -> Self {
        self.least_upper_bound(next)
    }
}

/// Returns true if `upper` is an upper bound of `lower` under `join`,
/// i.e. `join(upper, lower) == upper`.
pub fn is_upper_bound<T, F>(upper: &T, lower: &T, join: F) -> bool
where
    T: PartialEq,
    F: Fn(&T, &T) -> T,
{
    join(upper, lower) == *upper
}

/// The flat lattice over `T`
///
/// - Bottom (⊥) = no information / unreachable
/// - Value(t) = exactly `t`
/// - Top (⊤) = conflicting values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Flat<T> {
    /// Bottom element
    Bottom,
    /// A single known value
    Value(T),
    /// Top element
    Top,
}

impl<T: Clone + PartialEq> Flat<T> {
    /// Join operation (least upper bound)
    pub fn join(&self, other: &Flat<T>) -> Flat<T> {
        match (self, other) {
            // Bottom is identity for join
            (Flat::Bottom, t) | (t, Flat::Bottom) => t.clone(),
            // Top absorbs everything
            (Flat::Top, _) | (_, Flat::Top) => Flat::Top,
            (Flat::Value(a), Flat::Value(b)) => {
                if a == b {
                    Flat::Value(a.clone())
                } else {
                    Flat::Top
                }
            }
        }
    }

    /// Meet operation (greatest lower bound)
    pub fn meet(&self, other: &Flat<T>) -> Flat<T> {
        match (self, other) {
            (Flat::Top, t) | (t, Flat::Top) => t.clone(),
            (Flat::Bottom, _) | (_, Flat::Bottom) => Flat::Bottom,
            (Flat::Value(a), Flat::Value(b)) => {
                if a == b {
                    Flat::Value(a.clone())
                } else {
                    Flat::Bottom
                }
            }
        }
    }

    /// Check if this element is below or equal to `other`
    pub fn is_below(&self, other: &Flat<T>) -> bool {
        match (self, other) {
            (Flat::Bottom, _) | (_, Flat::Top) => true,
            (Flat::Value(a), Flat::Value(b)) => a == b,
            _ => false,
        }
    }

    /// The known value, if any
    pub fn value(&self) -> Option<&T> {
        match self {
            Flat::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_top(&self) -> bool {
        matches!(self, Flat::Top)
    }

    pub fn is_bottom(&self) -> bool {
        matches!(self, Flat::Bottom)
    }
}

impl<T> From<T> for Flat<T> {
    fn from(value: T) -> Self {
        Flat::Value(value)
    }
}

impl<T: fmt::Display> fmt::Display for Flat<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flat::Bottom => write!(f, "⊥"),
            Flat::Value(v) => write!(f, "{v}"),
            Flat::Top => write!(f, "⊤"),
        }
    }
}

impl<T: Clone + PartialEq + fmt::Debug> AbstractValue for Flat<T> {
    fn least_upper_bound(&self, other: &Self) -> Self {
        self.join(other)
    }
}

/// Store for a single program point (maps keys to abstract values)
///
/// A key missing from the map is bottom: joining keeps every key of either
/// side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment<K: Ord, V> {
    entries: BTreeMap<K, V>,
}

impl<K: Ord + Clone, V: AbstractValue> Environment<K, V> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Get the value bound to a key
    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    /// Bind a key, replacing any previous value
    pub fn set(&mut self, key: K, value: V) {
        self.entries.insert(key, value);
    }

    /// Forget a key (it becomes bottom again)
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter()
    }

    /// Join two environments (combine at merge points)
    pub fn join(&self, other: &Environment<K, V>) -> Environment<K, V> {
        let mut result = self.clone();
        for (key, theirs) in &other.entries {
            let joined = match result.entries.get(key) {
                Some(ours) => ours.least_upper_bound(theirs),
                None => theirs.clone(),
            };
            result.entries.insert(key.clone(), joined);
        }
        result
    }
}

impl<K: Ord + Clone, V: AbstractValue> Default for Environment<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + Clone, V: AbstractValue> FromIterator<(K, V)> for Environment<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<K, V> Store for Environment<K, V>
where
    K: Ord + Clone + fmt::Debug,
    V: AbstractValue,
{
    fn least_upper_bound(&self, other: &Self) -> Self {
        self.join(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_join_bottom() {
        let bottom: Flat<i64> = Flat::Bottom;
        let three = Flat::Value(3);

        assert_eq!(bottom.join(&three), three);
        assert_eq!(three.join(&bottom), three);
    }

    #[test]
    fn test_flat_join_top() {
        let top: Flat<i64> = Flat::Top;
        let three = Flat::Value(3);

        assert_eq!(top.join(&three), Flat::Top);
        assert_eq!(three.join(&top), Flat::Top);
    }

    #[test]
    fn test_flat_join_same_value() {
        assert_eq!(Flat::Value(1).join(&Flat::Value(1)), Flat::Value(1));
    }

    #[test]
    fn test_flat_join_conflicting_values() {
        assert_eq!(Flat::Value(1).join(&Flat::Value(2)), Flat::Top);
    }

    #[test]
    fn test_flat_meet() {
        let top: Flat<i64> = Flat::Top;
        assert_eq!(top.meet(&Flat::Value(4)), Flat::Value(4));
        assert_eq!(Flat::Value(4).meet(&Flat::Value(5)), Flat::Bottom);
    }

    #[test]
    fn test_flat_ordering() {
        assert!(Flat::<i64>::Bottom.is_below(&Flat::Value(1)));
        assert!(Flat::Value(1).is_below(&Flat::Top));
        assert!(!Flat::Value(1).is_below(&Flat::Value(2)));
        assert!(!Flat::<i64>::Top.is_below(&Flat::Value(2)));
    }

    #[test]
    fn test_flat_display() {
        assert_eq!(Flat::Value(7).to_string(), "7");
        assert_eq!(Flat::<i64>::Top.to_string(), "⊤");
    }

    #[test]
    fn test_environment_join() {
        let mut left: Environment<String, Flat<i64>> = Environment::new();
        left.set("x".to_string(), Flat::Value(1));
        left.set("y".to_string(), Flat::Value(2));

        let mut right = Environment::new();
        right.set("x".to_string(), Flat::Value(1));
        right.set("z".to_string(), Flat::Value(3));

        let joined = left.join(&right);

        // x is in both and agrees
        assert_eq!(joined.get(&"x".to_string()), Some(&Flat::Value(1)));
        // y and z are only on one side, the other side is bottom
        assert_eq!(joined.get(&"y".to_string()), Some(&Flat::Value(2)));
        assert_eq!(joined.get(&"z".to_string()), Some(&Flat::Value(3)));
    }

    #[test]
    fn test_environment_conflicting_join() {
        let left: Environment<&str, Flat<i64>> = [("x", Flat::Value(1))].into_iter().collect();
        let right: Environment<&str, Flat<i64>> = [("x", Flat::Value(2))].into_iter().collect();

        assert_eq!(left.join(&right).get(&"x"), Some(&Flat::Top));
    }

    #[test]
    fn test_environment_clone_is_independent() {
        let mut original: Environment<&str, Flat<i64>> = Environment::new();
        original.set("x", Flat::Value(1));
        let mut copy = original.clone();
        copy.set("x", Flat::Value(9));

        assert_eq!(original.get(&"x"), Some(&Flat::Value(1)));
        assert_ne!(original, copy);
    }

    #[test]
    fn test_is_upper_bound() {
        let joined = Flat::Value(1).join(&Flat::Value(2));
        assert!(is_upper_bound(&joined, &Flat::Value(1), Flat::<i64>::join));
        assert!(!is_upper_bound(&Flat::Value(1), &Flat::Value(2), Flat::<i64>::join));
    }
}

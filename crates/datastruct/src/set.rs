//! Unordered string set, built directly on [`Dict`] with a unit value.

use crate::dict::Dict;

/// Set of unique `String` members.
///
/// A thin wrapper over `Dict<String, ()>`: set membership is exactly
/// dict-key membership, so insert/remove/contains are all O(1)
/// amortized and the set gets incremental rehashing for free.
#[derive(Default)]
pub struct Set {
    dict: Dict<String, ()>,
}

impl Set {
    /// Creates an empty set.
    pub fn new() -> Self {
        Set { dict: Dict::new() }
    }

    /// Adds `member`, returning `true` if it was newly inserted.
    pub fn add(&mut self, member: String) -> bool {
        self.dict.set(member, ())
    }

    /// Removes `member`, returning `true` if it was present.
    pub fn remove(&mut self, member: &str) -> bool {
        self.dict.delete(&member.to_string()).is_ok()
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.dict.len()
    }

    /// True if the set has no members.
    pub fn is_empty(&self) -> bool {
        self.dict.is_empty()
    }

    /// True if `member` is present. Steps the dict's incremental
    /// rehash like every other lookup.
    pub fn contains(&mut self, member: &str) -> bool {
        self.dict.contains_key(&member.to_string())
    }

    /// All members, in arbitrary (bucket) order.
    pub fn members(&self) -> Vec<String> {
        self.dict.iter().map(|(k, _)| k.clone()).collect()
    }

    /// A uniformly-chosen member, or `None` if empty.
    pub fn random_member(&mut self) -> Option<String> {
        self.dict.random_entry().map(|(k, _)| k.clone())
    }

    /// New set containing members of `self` or `other`.
    pub fn union(&self, other: &Set) -> Set {
        let mut result = Set::new();
        for m in self.members() {
            result.add(m);
        }
        for m in other.members() {
            result.add(m);
        }
        result
    }

    /// New set containing members present in both `self` and `other`.
    pub fn intersect(&self, other: &Set) -> Set {
        let other_members: std::collections::HashSet<String> = other.members().into_iter().collect();
        let mut result = Set::new();
        for m in self.members() {
            if other_members.contains(&m) {
                result.add(m);
            }
        }
        result
    }

    /// New set containing members of `self` absent from `other`.
    pub fn difference(&self, other: &Set) -> Set {
        let other_members: std::collections::HashSet<String> = other.members().into_iter().collect();
        let mut result = Set::new();
        for m in self.members() {
            if !other_members.contains(&m) {
                result.add(m);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_of(members: &[&str]) -> Set {
        let mut s = Set::new();
        for m in members {
            s.add(m.to_string());
        }
        s
    }

    #[test]
    fn add_is_idempotent() {
        let mut s = Set::new();
        assert!(s.add("a".into()));
        assert!(!s.add("a".into()));
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn remove_reports_presence() {
        let mut s = set_of(&["a", "b"]);
        assert!(s.remove("a"));
        assert!(!s.remove("a"));
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn union_contains_members_of_both_without_duplication() {
        let a = set_of(&["a", "b"]);
        let b = set_of(&["b", "c"]);
        let mut u = a.union(&b).members();
        u.sort();
        assert_eq!(u, vec!["a", "b", "c"]);
    }

    #[test]
    fn intersect_keeps_only_shared_members() {
        let a = set_of(&["a", "b", "c"]);
        let b = set_of(&["b", "c", "d"]);
        let mut i = a.intersect(&b).members();
        i.sort();
        assert_eq!(i, vec!["b", "c"]);
    }

    #[test]
    fn difference_is_not_symmetric() {
        let a = set_of(&["a", "b"]);
        let b = set_of(&["b"]);
        assert_eq!(a.difference(&b).members(), vec!["a".to_string()]);
        assert!(b.difference(&a).is_empty());
    }

    #[test]
    fn random_member_returns_a_present_key() {
        let mut s = set_of(&["a", "b", "c"]);
        let m = s.random_member().unwrap();
        assert!(s.contains(&m));
    }
}

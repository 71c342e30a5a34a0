//! Sorted set: a member→score [`Dict`] kept in lockstep with a
//! [`Skiplist`] that orders members by `(score, member)`.
//!
//! The dict gives O(1) `ZSCORE`; the skiplist gives O(log n) rank and
//! range queries. Every mutation that changes a member's score must
//! update both structures or they drift out of sync — that invariant
//! is the entire reason this type exists instead of a bare `Skiplist`.

use crate::dict::Dict;
use crate::skiplist::{SkipEntry, Skiplist};

/// A single sorted-set member with its current score.
#[derive(Debug, Clone, PartialEq)]
pub struct ZsetElement {
    pub member: String,
    pub score: f64,
}

impl From<SkipEntry> for ZsetElement {
    fn from(e: SkipEntry) -> Self {
        ZsetElement {
            member: e.member,
            score: e.score,
        }
    }
}

/// Sorted set value type backing `ZADD`/`ZRANGE`/`ZSCORE` and friends.
#[derive(Default)]
pub struct Zset {
    dict: Dict<String, f64>,
    skiplist: Skiplist,
}

impl Zset {
    /// Creates an empty sorted set.
    pub fn new() -> Self {
        Zset {
            dict: Dict::new(),
            skiplist: Skiplist::new(),
        }
    }

    /// Sets `member`'s score, inserting it if new. Returns `true` if
    /// the member did not previously exist.
    pub fn add(&mut self, score: f64, member: String) -> bool {
        if let Some(existing) = self.dict.get(&member).copied() {
            if existing != score {
                self.skiplist.delete(existing, &member);
                self.skiplist.insert(score, member.clone());
                self.dict.set(member, score);
            }
            false
        } else {
            self.dict.set(member.clone(), score);
            self.skiplist.insert(score, member);
            true
        }
    }

    /// Current score for `member`, if present. Steps the dict's
    /// incremental rehash like every other lookup.
    pub fn score(&mut self, member: &str) -> Option<f64> {
        self.dict.get(&member.to_string()).copied()
    }

    /// Removes `member`. Returns `true` if it was present.
    pub fn remove(&mut self, member: &str) -> bool {
        match self.dict.get(&member.to_string()).copied() {
            Some(score) => {
                self.dict.delete(&member.to_string()).ok();
                self.skiplist.delete(score, member);
                true
            }
            None => false,
        }
    }

    /// Number of members.
    pub fn len(&self) -> i64 {
        self.skiplist.len()
    }

    /// True if the set has no members.
    pub fn is_empty(&self) -> bool {
        self.skiplist.is_empty()
    }

    /// Number of members with score in `[min, max]`.
    pub fn count(&self, min: f64, max: f64) -> i64 {
        self.skiplist.count(min, max)
    }

    /// 0-based rank of `member`, high-to-low if `reverse`, or `-1` if
    /// the member does not exist.
    pub fn rank(&mut self, member: &str, reverse: bool) -> i64 {
        let score = match self.score(member) {
            Some(s) => s,
            None => return -1,
        };
        let rank = self.skiplist.rank_of(score, member);
        if reverse {
            self.skiplist.len() - rank
        } else {
            rank - 1
        }
    }

    /// Elements with 0-based rank in `[start, end]`. `end == i64::MAX`
    /// is treated as "to the last element", matching `ZRANGE 0 -1`
    /// after index normalization.
    pub fn range_by_rank(&self, start: i64, end: i64, reverse: bool) -> Vec<ZsetElement> {
        let end = if end == i64::MAX {
            self.skiplist.len() - 1
        } else {
            end
        };
        self.skiplist
            .range_by_rank(start + 1, end + 1, reverse)
            .into_iter()
            .map(ZsetElement::from)
            .collect()
    }

    /// Elements with score in `[min, max]`, capped at `limit` results
    /// if given.
    pub fn range_by_score(
        &self,
        min: f64,
        max: f64,
        limit: Option<i64>,
        reverse: bool,
    ) -> Vec<ZsetElement> {
        self.skiplist
            .range_by_score(min, max, limit, reverse)
            .into_iter()
            .map(ZsetElement::from)
            .collect()
    }

    /// Removes and returns every element with 0-based rank in
    /// `[start, end]`.
    pub fn delete_range_by_rank(&mut self, start: i64, end: i64) -> Vec<ZsetElement> {
        let end = if end == i64::MAX {
            self.skiplist.len() - 1
        } else {
            end
        };
        let removed = self.skiplist.delete_range_by_rank(start + 1, end + 1);
        for entry in &removed {
            self.dict.delete(&entry.member).ok();
        }
        removed.into_iter().map(ZsetElement::from).collect()
    }

    /// Removes and returns every element with score in `[min, max]`.
    pub fn delete_range_by_score(&mut self, min: f64, max: f64) -> Vec<ZsetElement> {
        let removed = self.skiplist.delete_range_by_score(min, max);
        for entry in &removed {
            self.dict.delete(&entry.member).ok();
        }
        removed.into_iter().map(ZsetElement::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_new_member_returns_true_update_returns_false() {
        let mut z = Zset::new();
        assert!(z.add(1.0, "a".into()));
        assert!(!z.add(2.0, "a".into()));
        assert_eq!(z.score("a"), Some(2.0));
        assert_eq!(z.len(), 1);
    }

    #[test]
    fn rescoring_keeps_skiplist_and_dict_consistent() {
        let mut z = Zset::new();
        z.add(5.0, "a".into());
        z.add(1.0, "b".into());
        z.add(3.0, "c".into());
        z.add(0.5, "a".into());
        let ranked = z.range_by_rank(0, i64::MAX, false);
        let members: Vec<&str> = ranked.iter().map(|e| e.member.as_str()).collect();
        assert_eq!(members, vec!["a", "b", "c"]);
    }

    #[test]
    fn remove_drops_from_both_structures() {
        let mut z = Zset::new();
        z.add(1.0, "a".into());
        assert!(z.remove("a"));
        assert!(!z.remove("a"));
        assert_eq!(z.score("a"), None);
        assert_eq!(z.len(), 0);
    }

    #[test]
    fn rank_matches_score_order_forward_and_reverse() {
        let mut z = Zset::new();
        for i in 0..5 {
            z.add(i as f64, format!("m{i}"));
        }
        assert_eq!(z.rank("m0", false), 0);
        assert_eq!(z.rank("m4", false), 4);
        assert_eq!(z.rank("m0", true), 4);
        assert_eq!(z.rank("missing", false), -1);
    }

    #[test]
    fn delete_range_by_score_removes_matching_members_only() {
        let mut z = Zset::new();
        for i in 0..10 {
            z.add(i as f64, format!("m{i}"));
        }
        let removed = z.delete_range_by_score(3.0, 6.0);
        assert_eq!(removed.len(), 4);
        assert_eq!(z.len(), 6);
        assert_eq!(z.score("m3"), None);
        assert_eq!(z.score("m7"), Some(7.0));
    }

    #[test]
    fn count_matches_number_of_elements_in_score_window() {
        let mut z = Zset::new();
        for i in 0..20 {
            z.add(i as f64, format!("m{i}"));
        }
        assert_eq!(z.count(5.0, 10.0), 6);
    }
}

//! Rank-augmented skiplist keyed by `(score, member)`.
//!
//! Every forward pointer carries a `span`: the number of level-0 nodes
//! it skips. Summing spans along a level-0 walk to a node gives its
//! 1-based rank in logarithmic time, which is what makes `ZRANK`,
//! `ZRANGE`, and the `ZREMRANGEBY*` family cheap.
//!
//! Nodes live in a flat arena (`Vec<Option<Node>>`) addressed by index
//! rather than as a tree of `Box`es. A node with forward pointers at
//! several levels is referenced from several predecessors at once,
//! which a strict ownership tree can't express; indices sidestep that
//! without reaching for `Rc<RefCell<_>>`.

use rand::Rng;

const MAX_LEVEL: usize = 32;
const PROBABILITY: f64 = 0.25;
const NIL: usize = usize::MAX;
const HEAD: usize = 0;

struct Level {
    forward: usize,
    span: i64,
}

struct Node {
    member: String,
    score: f64,
    levels: Vec<Level>,
}

impl Node {
    fn new(level: usize, score: f64, member: String) -> Self {
        let mut levels = Vec::with_capacity(level);
        levels.resize_with(level, || Level {
            forward: NIL,
            span: 0,
        });
        Node {
            member,
            score,
            levels,
        }
    }
}

/// An owned `(score, member)` pair returned by range and rank queries.
#[derive(Debug, Clone, PartialEq)]
pub struct SkipEntry {
    pub score: f64,
    pub member: String,
}

fn less(a_score: f64, a_member: &str, b_score: f64, b_member: &str) -> bool {
    a_score < b_score || (a_score == b_score && a_member < b_member)
}

/// Probabilistic ordered structure over `(score, member)` pairs.
///
/// Callers guarantee `member` uniqueness on insert; this is enforced by
/// [`crate::zset::Zset`], which is the only intended caller.
pub struct Skiplist {
    nodes: Vec<Option<Node>>,
    free: Vec<usize>,
    length: i64,
    level: usize,
}

impl Default for Skiplist {
    fn default() -> Self {
        Self::new()
    }
}

impl Skiplist {
    /// Creates an empty skiplist with a level-`MAX_LEVEL` sentinel head.
    pub fn new() -> Self {
        let head = Node::new(MAX_LEVEL, f64::MIN, String::new());
        Skiplist {
            nodes: vec![Some(head)],
            free: Vec::new(),
            length: 0,
            level: 1,
        }
    }

    /// Number of elements currently in the list.
    pub fn len(&self) -> i64 {
        self.length
    }

    /// True if the list has no elements.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    fn node(&self, idx: usize) -> &Node {
        self.nodes[idx].as_ref().expect("dangling skiplist index")
    }

    fn node_mut(&mut self, idx: usize) -> &mut Node {
        self.nodes[idx].as_mut().expect("dangling skiplist index")
    }

    fn random_level() -> usize {
        let mut level = 1usize;
        let mut rng = rand::thread_rng();
        while rng.gen::<f64>() < PROBABILITY && level < MAX_LEVEL {
            level += 1;
        }
        level
    }

    fn alloc(&mut self, node: Node) -> usize {
        if let Some(idx) = self.free.pop() {
            self.nodes[idx] = Some(node);
            idx
        } else {
            self.nodes.push(Some(node));
            self.nodes.len() - 1
        }
    }

    /// Inserts `(score, member)`. The caller must ensure `member` is not
    /// already present.
    pub fn insert(&mut self, score: f64, member: String) {
        let mut update = [HEAD; MAX_LEVEL];
        let mut rank = [0i64; MAX_LEVEL];

        let mut x = HEAD;
        for i in (0..self.level).rev() {
            rank[i] = if i == self.level - 1 { 0 } else { rank[i + 1] };
            loop {
                let fwd = self.node(x).levels[i].forward;
                if fwd == NIL {
                    break;
                }
                let fwd_node = self.node(fwd);
                if less(fwd_node.score, &fwd_node.member, score, &member) {
                    rank[i] += self.node(x).levels[i].span;
                    x = fwd;
                } else {
                    break;
                }
            }
            update[i] = x;
        }

        let new_level = Self::random_level();
        if new_level > self.level {
            for item in rank.iter_mut().take(new_level).skip(self.level) {
                *item = 0;
            }
            for slot in update.iter_mut().take(new_level).skip(self.level) {
                *slot = HEAD;
            }
            let length = self.length;
            for i in self.level..new_level {
                self.node_mut(HEAD).levels[i].span = length;
            }
            self.level = new_level;
        }

        let new_idx = self.alloc(Node::new(new_level, score, member));
        for i in 0..new_level {
            let pred = update[i];
            let pred_span = self.node(pred).levels[i].span;
            let pred_fwd = self.node(pred).levels[i].forward;
            self.node_mut(new_idx).levels[i].forward = pred_fwd;
            self.node_mut(new_idx).levels[i].span = pred_span - (rank[0] - rank[i]);
            self.node_mut(pred).levels[i].span = rank[0] - rank[i] + 1;
            self.node_mut(pred).levels[i].forward = new_idx;
        }
        for i in new_level..self.level {
            self.node_mut(update[i]).levels[i].span += 1;
        }

        self.length += 1;
    }

    /// Removes `(score, member)`, returning `true` if it was present.
    pub fn delete(&mut self, score: f64, member: &str) -> bool {
        let mut update = [HEAD; MAX_LEVEL];
        let mut x = HEAD;
        for i in (0..self.level).rev() {
            loop {
                let fwd = self.node(x).levels[i].forward;
                if fwd == NIL {
                    break;
                }
                let fwd_node = self.node(fwd);
                if less(fwd_node.score, &fwd_node.member, score, member) {
                    x = fwd;
                } else {
                    break;
                }
            }
            update[i] = x;
        }

        let candidate = self.node(x).levels[0].forward;
        let matches = candidate != NIL && {
            let n = self.node(candidate);
            n.score == score && n.member == member
        };
        if !matches {
            return false;
        }

        for i in 0..self.level {
            let pred = update[i];
            if self.node(pred).levels[i].forward == candidate {
                let removed_span = if i < self.node(candidate).levels.len() {
                    self.node(candidate).levels[i].span
                } else {
                    0
                };
                let removed_fwd = if i < self.node(candidate).levels.len() {
                    self.node(candidate).levels[i].forward
                } else {
                    NIL
                };
                self.node_mut(pred).levels[i].span += removed_span - 1;
                self.node_mut(pred).levels[i].forward = removed_fwd;
            } else {
                self.node_mut(pred).levels[i].span -= 1;
            }
        }

        self.nodes[candidate] = None;
        self.free.push(candidate);

        while self.level > 1 && self.node(HEAD).levels[self.level - 1].forward == NIL {
            self.level -= 1;
        }

        self.length -= 1;
        true
    }

    /// 1-based rank of `(score, member)`, or `0` if not found.
    pub fn rank_of(&self, score: f64, member: &str) -> i64 {
        let mut rank = 0i64;
        let mut x = HEAD;
        for i in (0..self.level).rev() {
            loop {
                let fwd = self.node(x).levels[i].forward;
                if fwd == NIL {
                    break;
                }
                let fwd_node = self.node(fwd);
                let within =
                    less(fwd_node.score, &fwd_node.member, score, member)
                        || (fwd_node.score == score && fwd_node.member == member);
                if within {
                    rank += self.node(x).levels[i].span;
                    x = fwd;
                } else {
                    break;
                }
            }
            if x != HEAD && self.node(x).member == member && self.node(x).score == score {
                return rank;
            }
        }
        0
    }

    /// Returns the `(score, member)` at 1-based `rank`, if in range.
    pub fn by_rank(&self, rank: i64) -> Option<SkipEntry> {
        if rank < 1 || rank > self.length {
            return None;
        }
        let mut traversed = 0i64;
        let mut x = HEAD;
        for i in (0..self.level).rev() {
            loop {
                let fwd = self.node(x).levels[i].forward;
                if fwd == NIL {
                    break;
                }
                let span = self.node(x).levels[i].span;
                if traversed + span <= rank {
                    traversed += span;
                    x = fwd;
                } else {
                    break;
                }
            }
            if traversed == rank && x != HEAD {
                let n = self.node(x);
                return Some(SkipEntry {
                    score: n.score,
                    member: n.member.clone(),
                });
            }
        }
        None
    }

    /// Forward (or, if `reverse`, backward) walk over 1-based ranks
    /// `[start, end]` inclusive.
    pub fn range_by_rank(&self, start: i64, end: i64, reverse: bool) -> Vec<SkipEntry> {
        if self.length == 0 || start > end || start < 1 {
            return Vec::new();
        }
        let end = end.min(self.length);
        let mut out = Vec::with_capacity((end - start + 1).max(0) as usize);
        let mut cursor = HEAD;
        let mut rank = 0i64;
        loop {
            let fwd = self.node(cursor).levels[0].forward;
            if fwd == NIL {
                break;
            }
            rank += 1;
            if rank > end {
                break;
            }
            if rank >= start {
                let n = self.node(fwd);
                out.push(SkipEntry {
                    score: n.score,
                    member: n.member.clone(),
                });
            }
            cursor = fwd;
        }
        if reverse {
            out.reverse();
        }
        out
    }

    /// Elements with `min <= score <= max`, in ascending score order
    /// unless `reverse` is set. `limit` caps the result length (`None`
    /// meaning unlimited, matching `ZRANGEBYSCORE ... LIMIT`).
    pub fn range_by_score(
        &self,
        min: f64,
        max: f64,
        limit: Option<i64>,
        reverse: bool,
    ) -> Vec<SkipEntry> {
        let mut out = Vec::new();
        let mut cursor = HEAD;
        loop {
            let fwd = self.node(cursor).levels[0].forward;
            if fwd == NIL {
                break;
            }
            let n = self.node(fwd);
            if n.score >= min && n.score <= max {
                out.push(SkipEntry {
                    score: n.score,
                    member: n.member.clone(),
                });
            }
            cursor = fwd;
        }
        if reverse {
            out.reverse();
        }
        if let Some(limit) = limit {
            if limit >= 0 {
                out.truncate(limit as usize);
            }
        }
        out
    }

    /// Removes and returns every element with 1-based rank in
    /// `[start, end]`.
    pub fn delete_range_by_rank(&mut self, start: i64, end: i64) -> Vec<SkipEntry> {
        let victims = self.range_by_rank(start, end, false);
        for v in &victims {
            self.delete(v.score, &v.member);
        }
        victims
    }

    /// Removes and returns every element with `min <= score <= max`.
    pub fn delete_range_by_score(&mut self, min: f64, max: f64) -> Vec<SkipEntry> {
        let victims = self.range_by_score(min, max, None, false);
        for v in &victims {
            self.delete(v.score, &v.member);
        }
        victims
    }

    /// Number of elements with `min <= score <= max`.
    pub fn count(&self, min: f64, max: f64) -> i64 {
        self.range_by_score(min, max, None, false).len() as i64
    }

    /// First element with score in `[min, max]`, if any.
    pub fn first_in_range(&self, min: f64, max: f64) -> Option<SkipEntry> {
        self.range_by_score(min, max, Some(1), false)
            .into_iter()
            .next()
    }

    /// Last element with score in `[min, max]`, if any.
    pub fn last_in_range(&self, min: f64, max: f64) -> Option<SkipEntry> {
        self.range_by_score(min, max, None, false).into_iter().last()
    }
}

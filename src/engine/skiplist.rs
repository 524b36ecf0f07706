//! REVENANT - Ordered-Set Index (Skip List)
//! Probabilistic multi-level list keeping sorted-set members in ascending
//! score order, with positional range extraction and rank lookup.
//!
//! ## Design
//! - Nodes live in a contiguous arena and reference each other by index,
//!   so unlinking can never leave a dangling pointer; freed slots are
//!   recycled through a free list.
//! - Level 0 links every member. Each node additionally links at level
//!   `L+1` with independent 50% probability once linked at `L`, capped at
//!   the height fixed per instance (default 4).
//! - A member -> node index map gives O(1) membership, score and
//!   cardinality queries and drives AOF rewrite serialization.
//!
//! Exactly one node exists per member. A score change is a remove followed
//! by a reinsert: the level walk depends on the score at insertion time,
//! so in-place mutation would corrupt the ordering.

use std::collections::HashMap;

use rand::Rng;

const HEAD: usize = 0;

struct Node {
    member: String,
    score: f64,
    /// Forward links, one slot per level. `None` ends the level.
    next: Vec<Option<usize>>,
}

/// Skip-list backed member -> score index for one sorted-set entry.
pub struct SkipList {
    nodes: Vec<Node>,
    free: Vec<usize>,
    index: HashMap<String, usize>,
    height: usize,
}

impl SkipList {
    /// Create an empty skip list with the given maximum height.
    pub fn new(height: usize) -> Self {
        assert!(height > 0, "height must be positive");
        let head = Node {
            member: String::new(),
            score: f64::NEG_INFINITY,
            next: vec![None; height],
        };
        Self {
            nodes: vec![head],
            free: Vec::new(),
            index: HashMap::new(),
            height,
        }
    }

    /// Number of members in the set.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns true if the set holds no members.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Score of a member, if present.
    pub fn score(&self, member: &str) -> Option<f64> {
        self.index.get(member).map(|&idx| self.nodes[idx].score)
    }

    /// Insert a member or update its score.
    /// Returns false when the member already had exactly this score.
    pub fn insert(&mut self, member: &str, score: f64) -> bool {
        if let Some(old) = self.score(member) {
            if old == score {
                return false; // duplicate add
            }
            self.remove(member);
        }

        // Walk from the top level down, recording the predecessor at each
        // level. Equal scores splice before the existing run, and the
        // relative order of equal-score nodes is the same on every level.
        let mut preds = vec![HEAD; self.height];
        let mut at = HEAD;
        for level in (0..self.height).rev() {
            while let Some(nx) = self.nodes[at].next[level] {
                if self.nodes[nx].score < score {
                    at = nx;
                } else {
                    break;
                }
            }
            preds[level] = at;
        }

        let idx = self.alloc(member, score);
        let mut rng = rand::thread_rng();
        for level in 0..self.height {
            self.nodes[idx].next[level] = self.nodes[preds[level]].next[level];
            self.nodes[preds[level]].next[level] = Some(idx);
            // 50% chance to stop promoting to the next level.
            if level + 1 < self.height && rng.gen_bool(0.5) {
                break;
            }
        }

        self.index.insert(member.to_string(), idx);
        true
    }

    /// Remove a member. Returns false when it was not present.
    pub fn remove(&mut self, member: &str) -> bool {
        let idx = match self.index.get(member) {
            Some(&idx) => idx,
            None => return false,
        };
        let score = self.nodes[idx].score;

        let mut at = HEAD;
        for level in (0..self.height).rev() {
            while let Some(nx) = self.nodes[at].next[level] {
                if self.nodes[nx].score < score {
                    at = nx;
                    continue;
                }
                break;
            }
            // Scan the equal-score run for the target; the node may not be
            // linked at this level at all.
            while let Some(nx) = self.nodes[at].next[level] {
                if nx == idx {
                    self.nodes[at].next[level] = self.nodes[idx].next[level];
                    break;
                }
                if self.nodes[nx].score > score {
                    break;
                }
                at = nx;
            }
        }

        self.index.remove(member);
        self.release(idx);
        true
    }

    /// Members at zero-based positions `start..=end` in ascending score
    /// order. `end == -1` means "through the last element"; a start past
    /// the end yields an empty sequence; an end past the end is clamped.
    pub fn range(&self, start: i64, end: i64) -> Vec<String> {
        let start = start.max(0);
        let end = if end == -1 { i64::MAX } else { end };
        if end < start {
            return Vec::new();
        }

        let mut res = Vec::new();
        let mut at = self.nodes[HEAD].next[0];
        let mut pos: i64 = 0;
        while let Some(idx) = at {
            if pos > end {
                break;
            }
            if pos >= start {
                res.push(self.nodes[idx].member.clone());
            }
            at = self.nodes[idx].next[0];
            pos += 1;
        }
        res
    }

    /// Zero-based ascending rank of a member, if present.
    /// Base-level walk; ties keep their insertion-time order.
    pub fn rank(&self, member: &str) -> Option<usize> {
        let target = *self.index.get(member)?;
        let mut pos = 0;
        let mut at = self.nodes[HEAD].next[0];
        while let Some(idx) = at {
            if idx == target {
                return Some(pos);
            }
            at = self.nodes[idx].next[0];
            pos += 1;
        }
        None
    }

    /// All (member, score) pairs in ascending score order.
    /// Used by AOF rewrite to flatten the set into one bulk-add record.
    pub fn members(&self) -> Vec<(String, f64)> {
        let mut res = Vec::with_capacity(self.len());
        let mut at = self.nodes[HEAD].next[0];
        while let Some(idx) = at {
            res.push((self.nodes[idx].member.clone(), self.nodes[idx].score));
            at = self.nodes[idx].next[0];
        }
        res
    }

    fn alloc(&mut self, member: &str, score: f64) -> usize {
        match self.free.pop() {
            Some(idx) => {
                let node = &mut self.nodes[idx];
                node.member = member.to_string();
                node.score = score;
                node.next.iter_mut().for_each(|n| *n = None);
                idx
            }
            None => {
                self.nodes.push(Node {
                    member: member.to_string(),
                    score,
                    next: vec![None; self.height],
                });
                self.nodes.len() - 1
            }
        }
    }

    fn release(&mut self, idx: usize) {
        self.nodes[idx].member.clear();
        self.free.push(idx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_with(pairs: &[(&str, f64)]) -> SkipList {
        let mut list = SkipList::new(4);
        for (member, score) in pairs {
            list.insert(member, *score);
        }
        list
    }

    #[test]
    fn test_insert_orders_by_score() {
        let list = list_with(&[("c", 3.0), ("a", 1.0), ("b", 2.0)]);
        assert_eq!(list.range(0, -1), vec!["a", "b", "c"]);
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_duplicate_insert_is_noop() {
        let mut list = list_with(&[("a", 1.0)]);
        assert!(!list.insert("a", 1.0));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_score_update_moves_member() {
        let mut list = list_with(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]);
        assert!(list.insert("a", 10.0));
        assert_eq!(list.range(0, -1), vec!["b", "c", "a"]);
        assert_eq!(list.score("a"), Some(10.0));
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_remove_unlinks_everywhere() {
        let mut list = list_with(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]);
        assert!(list.remove("b"));
        assert!(!list.remove("b"));
        assert_eq!(list.range(0, -1), vec!["a", "c"]);
        assert_eq!(list.score("b"), None);
    }

    #[test]
    fn test_remove_within_equal_score_run() {
        let mut list = list_with(&[("a", 5.0), ("b", 5.0), ("c", 5.0), ("d", 5.0)]);
        assert!(list.remove("c"));
        let members = list.range(0, -1);
        assert_eq!(members.len(), 3);
        assert!(!members.contains(&"c".to_string()));
        // Remaining ties keep a single consistent order.
        for (i, m) in members.iter().enumerate() {
            assert_eq!(list.rank(m), Some(i));
        }
    }

    #[test]
    fn test_range_bounds() {
        let list = list_with(&[("a", 1.0), ("b", 2.0), ("c", 3.0), ("d", 4.0)]);
        assert_eq!(list.range(1, 2), vec!["b", "c"]);
        assert_eq!(list.range(2, -1), vec!["c", "d"]);
        assert_eq!(list.range(0, 100), vec!["a", "b", "c", "d"]); // clamped
        assert!(list.range(10, -1).is_empty()); // start past the end
        assert!(list.range(2, 1).is_empty());
    }

    #[test]
    fn test_rank_counts_lower_scores() {
        let list = list_with(&[("low", -2.5), ("mid", 0.0), ("high", 99.0)]);
        assert_eq!(list.rank("low"), Some(0));
        assert_eq!(list.rank("mid"), Some(1));
        assert_eq!(list.rank("high"), Some(2));
        assert_eq!(list.rank("missing"), None);
    }

    #[test]
    fn test_members_ascending() {
        let list = list_with(&[("b", 2.0), ("a", 1.0)]);
        assert_eq!(list.members(), vec![("a".to_string(), 1.0), ("b".to_string(), 2.0)]);
    }

    #[test]
    fn test_arena_slot_reuse() {
        let mut list = SkipList::new(4);
        for i in 0..100 {
            list.insert(&format!("m{i}"), i as f64);
        }
        for i in 0..100 {
            list.remove(&format!("m{i}"));
        }
        let slots = list.nodes.len();
        for i in 0..100 {
            list.insert(&format!("n{i}"), i as f64);
        }
        // Freed slots were recycled instead of growing the arena.
        assert_eq!(list.nodes.len(), slots);
        assert_eq!(list.len(), 100);
    }

    #[test]
    fn test_large_set_stays_sorted() {
        let mut list = SkipList::new(4);
        for i in (0..500).rev() {
            list.insert(&format!("m{i:04}"), i as f64);
        }
        let members = list.range(0, -1);
        assert_eq!(members.len(), 500);
        let mut prev = f64::NEG_INFINITY;
        for m in &members {
            let s = list.score(m).unwrap();
            assert!(s >= prev);
            prev = s;
        }
        // rank(m) equals the count of members with strictly lower score.
        assert_eq!(list.rank("m0250"), Some(250));
    }
}

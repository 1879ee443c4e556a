use std::collections::HashSet;

use crate::models::{PairKey, Rule, StudentId};

/// Hard "never group together" constraints for one class
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    forbidden: HashSet<PairKey>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the set from stored rules. Self-pairs are ignored.
    pub fn from_rules<'a, I>(rules: I) -> Self
    where
        I: IntoIterator<Item = &'a Rule>,
    {
        Self::from_pairs(rules.into_iter().map(|r| (r.student_a, r.student_b)))
    }

    /// Builds the set from raw pairs in any order
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (StudentId, StudentId)>,
    {
        let forbidden = pairs
            .into_iter()
            .filter(|(a, b)| a != b)
            .map(|(a, b)| PairKey::new(a, b))
            .collect();
        Self { forbidden }
    }

    pub fn forbid(&mut self, a: StudentId, b: StudentId) {
        if a != b {
            self.forbidden.insert(PairKey::new(a, b));
        }
    }

    /// True if a rule matches `(a, b)` in either order
    pub fn forbids(&self, a: StudentId, b: StudentId) -> bool {
        self.forbidden.contains(&PairKey::new(a, b))
    }

    /// Forbidden pairs present in the group
    pub fn violations(&self, group: &[StudentId]) -> Vec<PairKey> {
        let mut found = Vec::new();
        for (i, &a) in group.iter().enumerate() {
            for &b in &group[i + 1..] {
                if self.forbids(a, b) {
                    found.push(PairKey::new(a, b));
                }
            }
        }
        found
    }

    /// True iff no forbidden pair sits inside the group
    pub fn is_valid_group(&self, group: &[StudentId]) -> bool {
        if self.forbidden.is_empty() {
            return true;
        }
        group
            .iter()
            .enumerate()
            .all(|(i, &a)| group[i + 1..].iter().all(|&b| !self.forbids(a, b)))
    }

    pub fn is_valid_partition<G>(&self, groups: &[G]) -> bool
    where
        G: AsRef<[StudentId]>,
    {
        groups.iter().all(|g| self.is_valid_group(g.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.forbidden.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forbidden.is_empty()
    }
}

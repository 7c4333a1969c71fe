//! Visited-set and per-level worklist for the graph crawl

use std::collections::HashSet;

/// Every numeric ID ever fetched or scheduled during one crawl
///
/// The set only grows. IDs known to the store before the crawl started are
/// included but do not count against the cap; the cap bounds how many IDs a
/// single crawl may add, independent of any depth bound.
#[derive(Debug, Clone)]
pub struct ProcessedSet {
    ids: HashSet<String>,
    added: usize,
    cap: usize,
}

impl ProcessedSet {
    /// Creates a set pre-filled with IDs the store already knows
    pub fn new(known: HashSet<String>, cap: usize) -> Self {
        Self {
            ids: known,
            added: 0,
            cap,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Adds an ID, returning `false` if it was already present or the cap is reached
    pub fn insert(&mut self, id: &str) -> bool {
        if self.ids.contains(id) || self.is_full() {
            return false;
        }
        self.ids.insert(id.to_string());
        self.added += 1;
        true
    }

    /// Number of IDs added by this crawl
    pub fn added(&self) -> usize {
        self.added
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.added >= self.cap
    }

    pub fn remaining_capacity(&self) -> usize {
        self.cap.saturating_sub(self.added)
    }
}

/// The ordered set of numeric IDs to expand at the current depth
#[derive(Debug, Clone, Default)]
pub struct Frontier {
    ids: Vec<String>,
    depth: u32,
}

impl Frontier {
    /// Creates the depth-0 frontier, dropping duplicate and blank seeds
    pub fn new<I, T>(seeds: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let ids = seeds
            .into_iter()
            .map(|id| id.as_ref().trim().to_string())
            .filter(|id| !id.is_empty() && seen.insert(id.clone()))
            .collect();
        Self { ids, depth: 0 }
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Whether another level may be expanded under `max_depth` (`None` = unbounded)
    pub fn within(&self, max_depth: Option<u32>) -> bool {
        max_depth.map_or(true, |max| self.depth < max)
    }

    /// Replaces the frontier with the next level's IDs
    pub fn advance(&mut self, next: Vec<String>) {
        self.ids = next;
        self.depth += 1;
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }
}

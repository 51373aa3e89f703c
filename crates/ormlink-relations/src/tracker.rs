//! Lazy-load tracking.
//!
//! Accessing a relation lazily on each record of a list costs one query per
//! record. The tracker counts lazy loads per (record type, relation) pair
//! and warns when a pair reaches the threshold, pointing at
//! `RelationResolver::resolve` as the batched alternative.

use std::collections::HashMap;
use std::time::Instant;

/// Where a lazy load was triggered.
#[derive(Debug, Clone)]
pub struct CallSite {
    /// The owner record type
    pub record_type: String,
    /// The relation name
    pub relation: String,
    /// Source file where the load was triggered
    pub file: &'static str,
    /// Line number in the source file
    pub line: u32,
    /// When the load occurred
    pub timestamp: Instant,
}

/// Aggregate lazy-load numbers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LazyLoadStats {
    /// Total lazy loads recorded
    pub total_loads: usize,
    /// Distinct (record type, relation) pairs loaded
    pub relations_loaded: usize,
    /// Pairs at or above the threshold
    pub potential_n1: usize,
}

/// Counts lazy relation loads.
#[derive(Debug)]
pub struct LazyLoadTracker {
    counts: HashMap<(String, String), usize>,
    threshold: usize,
    enabled: bool,
    call_sites: Vec<CallSite>,
}

impl Default for LazyLoadTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl LazyLoadTracker {
    /// Create a tracker with the default threshold (3).
    pub fn new() -> Self {
        Self {
            counts: HashMap::new(),
            threshold: 3,
            enabled: true,
            call_sites: Vec::new(),
        }
    }

    /// Tracker configured from an optional threshold; `None` disables it.
    pub fn from_threshold(threshold: Option<usize>) -> Self {
        match threshold {
            Some(t) => Self::new().with_threshold(t),
            None => {
                let mut tracker = Self::new();
                tracker.disable();
                tracker
            }
        }
    }

    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Record one lazy load.
    ///
    /// Emits a warning when the count for the pair reaches the threshold.
    #[track_caller]
    pub fn record_load(&mut self, record_type: &str, relation: &str) {
        let caller = std::panic::Location::caller();
        self.record_load_at(record_type, relation, caller);
    }

    /// Record one lazy load with an explicit call site.
    pub fn record_load_at(
        &mut self,
        record_type: &str,
        relation: &str,
        caller: &'static std::panic::Location<'static>,
    ) {
        if !self.enabled {
            return;
        }

        let count = {
            let entry = self
                .counts
                .entry((record_type.to_string(), relation.to_string()))
                .or_insert(0);
            *entry += 1;
            *entry
        };

        self.call_sites.push(CallSite {
            record_type: record_type.to_string(),
            relation: relation.to_string(),
            file: caller.file(),
            line: caller.line(),
            timestamp: Instant::now(),
        });

        if count == self.threshold {
            self.emit_warning(record_type, relation, count);
        }
    }

    fn emit_warning(&self, record_type: &str, relation: &str, count: usize) {
        tracing::warn!(
            target: "ormlink::n1",
            record_type = record_type,
            relation = relation,
            loads = count,
            threshold = self.threshold,
            "Repeated lazy loads of one relation; resolve it for the whole batch instead"
        );

        for (i, site) in self
            .call_sites
            .iter()
            .filter(|s| s.record_type == record_type && s.relation == relation)
            .take(5)
            .enumerate()
        {
            tracing::debug!(
                target: "ormlink::n1",
                index = i,
                file = site.file,
                line = site.line,
                "  [{}] {}:{}",
                i,
                site.file,
                site.line
            );
        }
    }

    /// Clear counts and call sites.
    pub fn reset(&mut self) {
        self.counts.clear();
        self.call_sites.clear();
    }

    pub fn count_for(&self, record_type: &str, relation: &str) -> usize {
        self.counts
            .get(&(record_type.to_string(), relation.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn stats(&self) -> LazyLoadStats {
        LazyLoadStats {
            total_loads: self.counts.values().sum(),
            relations_loaded: self.counts.len(),
            potential_n1: self
                .counts
                .values()
                .filter(|&&c| c >= self.threshold)
                .count(),
        }
    }

    pub fn call_sites(&self) -> &[CallSite] {
        &self.call_sites
    }
}

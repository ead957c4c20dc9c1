use std::collections::HashMap;
use vitalmon_common::types::{AlertRule, DedupKey};

/// What an observation did to the consecutive-in-range counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// The rule has auto-resolution disabled (`threshold_count == 0`).
    Disabled,
    /// The reading breached; the counter was reset to zero.
    Breach,
    /// A normal reading; the counter advanced but the threshold is not met.
    Counting(u32),
    /// Enough consecutive normal readings: resolve the active instance.
    ThresholdMet,
}

/// Consecutive in-range counter per dedup key.
///
/// Observes every event on a key, alerting or not. Readings are judged
/// against the active instance's rule band; without an active instance the
/// counter update is the whole observation.
#[derive(Default)]
pub struct AutoResolveTracker {
    streaks: HashMap<DedupKey, u32>,
}

impl AutoResolveTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, key: &DedupKey, rule: &AlertRule, breaching: bool) -> Observation {
        if rule.auto_resolve_threshold_count == 0 {
            return Observation::Disabled;
        }
        if breaching {
            self.streaks.insert(key.clone(), 0);
            return Observation::Breach;
        }
        let streak = self.streaks.entry(key.clone()).or_insert(0);
        *streak += 1;
        if *streak >= rule.auto_resolve_threshold_count {
            *streak = 0;
            Observation::ThresholdMet
        } else {
            Observation::Counting(*streak)
        }
    }

    pub fn streak(&self, key: &DedupKey) -> u32 {
        self.streaks.get(key).copied().unwrap_or(0)
    }

    pub fn reset(&mut self, key: &DedupKey) {
        self.streaks.insert(key.clone(), 0);
    }

    pub fn evict(&mut self, key: &DedupKey) {
        self.streaks.remove(key);
    }

    /// Keep only streaks the predicate approves of (memory bound sweep).
    pub fn retain<F>(&mut self, keep: F)
    where
        F: Fn(&DedupKey) -> bool,
    {
        self.streaks.retain(|key, _| keep(key));
    }
}

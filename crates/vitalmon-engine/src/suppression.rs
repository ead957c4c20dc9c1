use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use vitalmon_common::types::{AlertState, DedupKey};

/// Admission decision for a breaching event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// No live instance and no cool-down: create a new alert instance.
    NewInstance,
    /// A NEW/SCHEDULED instance is live for the key: merge into it.
    Duplicate,
    /// Post-processing suppression (instance processed/escalated, or the
    /// cool-down after it closed) blocks a new instance.
    Suppressed,
}

#[derive(Debug, Clone)]
struct WindowEntry {
    window_started_at: DateTime<Utc>,
    last_event_at: DateTime<Utc>,
    /// Occurrences inside the current window.
    occurrence_count: i64,
    cooldown_until: Option<DateTime<Utc>>,
}

/// Per-dedup-key sliding dedup window plus the longer-lived post-processing
/// cool-down. One map per shard; the shard lock serializes access.
#[derive(Default)]
pub struct SuppressionWindow {
    entries: HashMap<DedupKey, WindowEntry>,
}

impl SuppressionWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide how a breaching event enters the pipeline.
    ///
    /// The window is sliding: each duplicate extends `last_event_at`. When a
    /// gap longer than `window_secs` passed while the instance stayed open,
    /// the window restarts but the event still merges into the live
    /// instance (one live instance per key).
    pub fn admit(
        &mut self,
        key: &DedupKey,
        now: DateTime<Utc>,
        window_secs: u64,
        active_state: Option<AlertState>,
    ) -> Admission {
        match active_state {
            Some(state) if state.is_open() => {
                let entry = self.entries.entry(key.clone()).or_insert(WindowEntry {
                    window_started_at: now,
                    last_event_at: now,
                    occurrence_count: 0,
                    cooldown_until: None,
                });
                let expired = now - entry.last_event_at > Duration::seconds(window_secs as i64);
                if expired {
                    entry.window_started_at = now;
                    entry.occurrence_count = 1;
                } else {
                    entry.occurrence_count += 1;
                }
                entry.last_event_at = now;
                Admission::Duplicate
            }
            Some(_) => Admission::Suppressed,
            None => {
                if let Some(entry) = self.entries.get(key) {
                    if let Some(until) = entry.cooldown_until {
                        if now < until {
                            return Admission::Suppressed;
                        }
                    }
                }
                self.entries.insert(
                    key.clone(),
                    WindowEntry {
                        window_started_at: now,
                        last_event_at: now,
                        occurrence_count: 1,
                        cooldown_until: None,
                    },
                );
                Admission::NewInstance
            }
        }
    }

    /// Rebuild a window entry from a persisted open instance (restart path).
    pub fn seed(
        &mut self,
        key: &DedupKey,
        window_started_at: DateTime<Utc>,
        last_event_at: DateTime<Utc>,
        occurrence_count: i64,
    ) {
        self.entries.insert(
            key.clone(),
            WindowEntry {
                window_started_at,
                last_event_at,
                occurrence_count,
                cooldown_until: None,
            },
        );
    }

    /// Occurrences inside the current window.
    pub fn occurrence(&self, key: &DedupKey) -> i64 {
        self.entries.get(key).map_or(0, |e| e.occurrence_count)
    }

    /// Start of the current window, if one is open for the key.
    pub fn window_started_at(&self, key: &DedupKey) -> Option<DateTime<Utc>> {
        self.entries.get(key).map(|e| e.window_started_at)
    }

    /// Arm the post-processing cool-down: no new instance for this key
    /// until `until`, regardless of the dedup window.
    pub fn start_cooldown(&mut self, key: &DedupKey, until: DateTime<Utc>) {
        let entry = self.entries.entry(key.clone()).or_insert(WindowEntry {
            window_started_at: until,
            last_event_at: until,
            occurrence_count: 0,
            cooldown_until: None,
        });
        entry.cooldown_until = Some(until);
    }

    pub fn cooldown_until(&self, key: &DedupKey) -> Option<DateTime<Utc>> {
        self.entries.get(key).and_then(|e| e.cooldown_until)
    }

    /// Drop window state for a key that closed without a cool-down.
    pub fn clear(&mut self, key: &DedupKey) {
        self.entries.remove(key);
    }

    /// Bound memory: drop entries whose cool-down has passed and whose
    /// window has been idle for longer than `idle_secs`. Entries for which
    /// `keep` returns true (e.g. a live instance) always stay.
    pub fn evict_idle<F>(&mut self, now: DateTime<Utc>, idle_secs: u64, keep: F)
    where
        F: Fn(&DedupKey) -> bool,
    {
        self.entries.retain(|key, e| {
            if keep(key) {
                return true;
            }
            if let Some(until) = e.cooldown_until {
                if now < until {
                    return true;
                }
            }
            now - e.last_event_at <= Duration::seconds(idle_secs as i64)
        });
    }

    pub fn contains(&self, key: &DedupKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

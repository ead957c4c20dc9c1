use std::collections::HashMap;
use std::sync::Arc;
use vitalmon_common::types::{AlertRule, VitalEvent};

use crate::{EngineError, Result};

/// In-memory rule registry, rebuilt from the rule table on startup and
/// after every rule change. Injected into the engine at construction so
/// isolated engine instances can carry isolated rule sets.
pub struct RuleRegistry {
    rules: Vec<Arc<AlertRule>>,
    /// (tenant_id, signal) -> indexes into `rules`
    index: HashMap<(String, String), Vec<usize>>,
}

impl RuleRegistry {
    pub fn new(rules: Vec<AlertRule>) -> Self {
        let rules: Vec<Arc<AlertRule>> = rules.into_iter().map(Arc::new).collect();
        let mut index: HashMap<(String, String), Vec<usize>> = HashMap::new();
        for (i, rule) in rules.iter().enumerate() {
            for signal in [rule.physical_sign.as_deref(), rule.event_type.as_deref()]
                .into_iter()
                .flatten()
            {
                index
                    .entry((rule.tenant_id.clone(), signal.to_string()))
                    .or_default()
                    .push(i);
            }
        }
        Self { rules, index }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<Arc<AlertRule>> {
        self.rules.iter().find(|r| r.id == id).cloned()
    }

    /// All candidate rules for the event, best match first.
    ///
    /// Candidates share the event's tenant and signal and either cover the
    /// whole tenant or the event's org. Ordering: most specific first
    /// (org-scoped beats tenant-wide, banded beats unbanded), then the
    /// severity priority table, then most recent update.
    pub fn match_event(&self, event: &VitalEvent) -> Vec<Arc<AlertRule>> {
        let Some(signal) = event.signal() else {
            return Vec::new();
        };
        let key = (event.tenant_id.clone(), signal.to_string());
        let Some(indexes) = self.index.get(&key) else {
            return Vec::new();
        };

        let mut candidates: Vec<Arc<AlertRule>> = indexes
            .iter()
            .map(|&i| self.rules[i].clone())
            .filter(|r| r.enabled)
            .filter(|r| match &r.org_id {
                Some(org) => org == &event.org_id,
                None => true,
            })
            .collect();

        candidates.sort_by(|a, b| {
            specificity(b)
                .cmp(&specificity(a))
                .then(a.level.priority().cmp(&b.level.priority()))
                .then(b.updated_at.cmp(&a.updated_at))
        });
        candidates
    }

    /// The winning rule for the event, if any.
    pub fn best_match(&self, event: &VitalEvent) -> Option<Arc<AlertRule>> {
        self.match_event(event).into_iter().next()
    }
}

fn specificity(rule: &AlertRule) -> u8 {
    let mut score = 0;
    if rule.org_id.is_some() {
        score += 2;
    }
    if rule.threshold_min.is_some() || rule.threshold_max.is_some() {
        score += 1;
    }
    score
}

/// Save-time validation shared by create and update paths.
pub fn validate_rule(rule: &AlertRule) -> Result<()> {
    match (&rule.physical_sign, &rule.event_type) {
        (None, None) => {
            return Err(EngineError::RuleValidation {
                reason: "exactly one of physical_sign / event_type must be set".to_string(),
            })
        }
        (Some(_), Some(_)) => {
            return Err(EngineError::RuleValidation {
                reason: "a rule governs a physical sign or an event type, not both".to_string(),
            })
        }
        _ => {}
    }
    if let (Some(min), Some(max)) = (rule.threshold_min, rule.threshold_max) {
        if min > max {
            return Err(EngineError::RuleValidation {
                reason: format!("threshold_min ({min}) must not exceed threshold_max ({max})"),
            });
        }
    }
    if rule.name.trim().is_empty() {
        return Err(EngineError::RuleValidation {
            reason: "rule name must not be empty".to_string(),
        });
    }
    if rule.tenant_id.trim().is_empty() {
        return Err(EngineError::RuleValidation {
            reason: "tenant_id must not be empty".to_string(),
        });
    }
    Ok(())
}

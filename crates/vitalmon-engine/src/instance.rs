use vitalmon_common::types::AlertState;

/// States an instance may be resolved from (auto-resolve or manual close).
pub const RESOLVABLE: [AlertState; 4] = [
    AlertState::New,
    AlertState::Scheduled,
    AlertState::Processed,
    AlertState::Escalated,
];

/// Legal state-machine edges.
///
/// `Resolved`, `Expired` and `Suppressed` are terminal; once processed or
/// escalated an instance can still resolve or expire but never returns to
/// `New`/`Scheduled`. `Processed -> Escalated` is the degradation path when
/// the configured action fails after retries.
pub fn can_transition(from: AlertState, to: AlertState) -> bool {
    use AlertState::*;
    matches!(
        (from, to),
        (New, Scheduled)
            | (New, Processed)
            | (New, Escalated)
            | (New, Resolved)
            | (New, Expired)
            | (New, Suppressed)
            | (Scheduled, Processed)
            | (Scheduled, Escalated)
            | (Scheduled, Resolved)
            | (Scheduled, Expired)
            | (Scheduled, Suppressed)
            | (Processed, Escalated)
            | (Processed, Resolved)
            | (Processed, Expired)
            | (Escalated, Resolved)
            | (Escalated, Expired)
    )
}

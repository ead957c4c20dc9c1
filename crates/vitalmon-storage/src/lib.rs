//! Persistence layer for the alert processing engine.
//!
//! A single SQLite database (WAL mode, SeaORM) holds alert rules, alert
//! instances, the append-only processing log, and the durable delayed-action
//! queue ([`store::PendingTimerRow`]). The conditional-update
//! compare-and-set in [`store::ProcessStore::transition_state`] is the
//! arbiter for every state-machine race.

pub mod entities;
pub mod error;
pub mod store;

#[cfg(test)]
mod tests;

pub use error::StorageError;
pub use store::{
    AlertInstanceFilter, AlertInstanceRow, AlertRuleFilter, AlertRuleUpdate, PendingTimerRow,
    ProcessStore, ProcessingLogFilter, ProcessingLogRow,
};

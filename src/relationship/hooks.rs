/// Pre/post-write callbacks at the persistence boundary
///
/// The host framework registers observers to run its own event dispatch
/// around relationship writes. `before_persist` runs before the transaction
/// opens and may veto the write; `after_persist` runs only after commit.
use std::fmt;

use serde::Serialize;
use serde_json::Value;

use super::descriptor::StorageMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteAction {
    Attach,
    Detach,
    /// Edge re-pointed after the host changed a foreign key
    Resync,
}

impl fmt::Display for WriteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteAction::Attach => f.write_str("attach"),
            WriteAction::Detach => f.write_str("detach"),
            WriteAction::Resync => f.write_str("resync"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteEvent {
    pub relationship: String,
    pub mode: StorageMode,
    pub action: WriteAction,
    /// `None` when detaching a child from whatever parent it has
    pub parent_id: Option<Value>,
    pub child_id: Value,
}

#[cfg_attr(test, mockall::automock)]
pub trait WriteObserver: Send + Sync {
    /// Returning `Err(reason)` cancels the write before anything is sent
    fn before_persist(&self, event: &WriteEvent) -> Result<(), String>;

    fn after_persist(&self, event: &WriteEvent, affected: i64);
}

/// Observer that logs every write; handy while wiring up a host framework
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl WriteObserver for LoggingObserver {
    fn before_persist(&self, event: &WriteEvent) -> Result<(), String> {
        log::debug!(
            "{} {} ({}) child={} parent={:?}",
            event.action,
            event.relationship,
            event.mode,
            event.child_id,
            event.parent_id
        );
        Ok(())
    }

    fn after_persist(&self, event: &WriteEvent, affected: i64) {
        log::debug!(
            "{} {} done, {} element(s) affected",
            event.action,
            event.relationship,
            affected
        );
    }
}

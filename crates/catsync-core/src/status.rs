//! # Sync Status
//!
//! The four-valued outcome of every consistency query, and the rule used to
//! fold several of them into one.
//!
//! ## Aggregation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      SyncStatus::combine                                │
//! │                                                                         │
//! │   left \ right   │ OK       NOT_OK   NOT_AVAILABLE  NEEDS_INITIAL      │
//! │   ───────────────┼───────────────────────────────────────────────────  │
//! │   OK             │ OK       NOT_OK   NOT_AVAILABLE  NEEDS_INITIAL      │
//! │   NOT_OK         │ NOT_OK   NOT_OK   NOT_OK         NOT_OK             │
//! │   NOT_AVAILABLE  │ N_A      NOT_OK   N_A            N_A                │
//! │   NEEDS_INITIAL  │ N_I      NOT_OK   N_I            N_I                │
//! │                                                                         │
//! │   NOT_OK dominates, OK is the identity, otherwise the left side wins.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Synchronization status of an item against its replica targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Every evaluated counterpart is up to date.
    Ok,

    /// At least one counterpart is missing or stale.
    NotOk,

    /// No rule applies, or the caller may not use any.
    NotAvailable,

    /// Rules apply but none has completed an initial run.
    NeedsInitialSync,
}

impl SyncStatus {
    /// Folds two statuses (see module docs).
    pub fn combine(self, other: SyncStatus) -> SyncStatus {
        match (self, other) {
            (SyncStatus::NotOk, _) | (_, SyncStatus::NotOk) => SyncStatus::NotOk,
            (SyncStatus::Ok, other) => other,
            (current, _) => current,
        }
    }

    #[inline]
    pub fn is_ok(&self) -> bool {
        matches!(self, SyncStatus::Ok)
    }

    #[inline]
    pub fn is_not_ok(&self) -> bool {
        matches!(self, SyncStatus::NotOk)
    }

    /// Stable integer code used by callers that render legacy indicators.
    pub const fn code(&self) -> i32 {
        match self {
            SyncStatus::Ok => 0,
            SyncStatus::NotOk => 1,
            SyncStatus::NotAvailable => -1,
            SyncStatus::NeedsInitialSync => 2,
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Ok => write!(f, "ok"),
            SyncStatus::NotOk => write!(f, "not_ok"),
            SyncStatus::NotAvailable => write!(f, "not_available"),
            SyncStatus::NeedsInitialSync => write!(f, "needs_initial_sync"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [SyncStatus; 4] = [
        SyncStatus::Ok,
        SyncStatus::NotOk,
        SyncStatus::NotAvailable,
        SyncStatus::NeedsInitialSync,
    ];

    #[test]
    fn test_not_ok_dominates() {
        for status in ALL {
            assert_eq!(status.combine(SyncStatus::NotOk), SyncStatus::NotOk);
            assert_eq!(SyncStatus::NotOk.combine(status), SyncStatus::NotOk);
        }
    }

    #[test]
    fn test_ok_is_identity() {
        for status in ALL {
            assert_eq!(SyncStatus::Ok.combine(status), status);
            assert_eq!(status.combine(SyncStatus::Ok), status);
        }
    }

    #[test]
    fn test_terminal_left_side_wins() {
        assert_eq!(
            SyncStatus::NotAvailable.combine(SyncStatus::NeedsInitialSync),
            SyncStatus::NotAvailable
        );
        assert_eq!(
            SyncStatus::NeedsInitialSync.combine(SyncStatus::NotAvailable),
            SyncStatus::NeedsInitialSync
        );
    }

    #[test]
    fn test_codes_and_display() {
        assert_eq!(SyncStatus::NotAvailable.code(), -1);
        assert_eq!(SyncStatus::NeedsInitialSync.to_string(), "needs_initial_sync");
        let json = serde_json::to_string(&SyncStatus::NotOk).unwrap();
        assert_eq!(json, "\"not_ok\"");
    }
}

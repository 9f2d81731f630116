//! # Memory Ledger
//!
//! In-memory [`TimestampLedger`]. One record per (source, target, rule);
//! recording the same triple again replaces its time.

use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tracing::trace;

use catsync_core::{ItemKey, RuleId, SyncTimestamp, TimestampLedger};

/// Ledger of synchronization timestamps kept in memory.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: RwLock<Vec<SyncTimestamp>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or updates the record for (source, target, rule).
    pub fn record(
        &self,
        source: ItemKey,
        target: ItemKey,
        rule: impl Into<RuleId>,
        at: DateTime<Utc>,
    ) {
        self.insert(SyncTimestamp {
            source_item: source,
            target_item: target,
            rule: rule.into(),
            last_sync_time: at,
        });
    }

    /// Inserts or updates a full record.
    pub fn insert(&self, timestamp: SyncTimestamp) {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        trace!(
            source = %timestamp.source_item,
            target = %timestamp.target_item,
            rule = %timestamp.rule,
            "Recording sync timestamp"
        );
        match records.iter_mut().find(|r| {
            r.source_item == timestamp.source_item
                && r.target_item == timestamp.target_item
                && r.rule == timestamp.rule
        }) {
            Some(existing) => existing.last_sync_time = timestamp.last_sync_time,
            None => records.push(timestamp),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn filtered(&self, predicate: impl Fn(&SyncTimestamp) -> bool) -> Vec<SyncTimestamp> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| predicate(r))
            .cloned()
            .collect()
    }
}

impl TimestampLedger for MemoryLedger {
    fn find(&self, source: ItemKey, target: ItemKey, rule: &RuleId) -> Option<DateTime<Utc>> {
        self.filtered(|r| r.source_item == source && r.target_item == target && &r.rule == rule)
            .first()
            .map(|r| r.last_sync_time)
    }

    fn find_by_target(&self, target: ItemKey) -> Vec<SyncTimestamp> {
        self.filtered(|r| r.target_item == target)
    }

    fn find_by_source(&self, source: ItemKey) -> Vec<SyncTimestamp> {
        self.filtered(|r| r.source_item == source)
    }

    fn has_records_for_rule(&self, rule: &RuleId) -> bool {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|r| &r.rule == rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_record_upserts() {
        let ledger = MemoryLedger::new();
        let (a, b) = (ItemKey::new(1), ItemKey::new(2));
        ledger.record(a, b, "r1", at(100));
        ledger.record(a, b, "r1", at(150));
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.find(a, b, &RuleId::new("r1")), Some(at(150)));
        assert_eq!(ledger.find(a, b, &RuleId::new("r2")), None);
    }

    #[test]
    fn test_lookup_by_direction() {
        let ledger = MemoryLedger::new();
        ledger.record(ItemKey::new(1), ItemKey::new(10), "r1", at(1));
        ledger.record(ItemKey::new(2), ItemKey::new(10), "r1", at(2));
        ledger.record(ItemKey::new(1), ItemKey::new(20), "r2", at(3));

        assert_eq!(ledger.find_by_target(ItemKey::new(10)).len(), 2);
        assert_eq!(ledger.find_by_source(ItemKey::new(1)).len(), 2);
        assert!(ledger.has_records_for_rule(&RuleId::new("r2")));
        assert!(!ledger.has_records_for_rule(&RuleId::new("r3")));
    }
}

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Operations invoked more often than this within one measurement are reported
/// as excessive.
pub const EXCESSIVE_CALL_THRESHOLD: u64 = 10;

/// Per-operation invocation counter. Owned by a client instance, never global.
#[derive(Debug, Default)]
pub struct CallAccountant {
    counts: Mutex<BTreeMap<String, u64>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CallStatistics {
    pub call_counts: BTreeMap<String, u64>,
    pub total_calls: u64,
    pub excessive_operations: Vec<String>,
}

impl CallAccountant {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, operation: &str) {
        let mut counts = self.counts();
        *counts.entry(operation.to_string()).or_insert(0) += 1;
    }

    pub fn count(&self, operation: &str) -> u64 {
        self.counts().get(operation).copied().unwrap_or(0)
    }

    pub fn snapshot(&self) -> CallStatistics {
        let counts = self.counts();
        CallStatistics {
            total_calls: counts.values().sum(),
            excessive_operations: counts
                .iter()
                .filter(|(_, count)| **count > EXCESSIVE_CALL_THRESHOLD)
                .map(|(name, _)| name.clone())
                .collect(),
            call_counts: counts.clone(),
        }
    }

    pub fn reset(&self) {
        self.counts().clear();
    }

    fn counts(&self) -> MutexGuard<'_, BTreeMap<String, u64>> {
        // a panic mid-increment leaves a valid map, keep counting
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_totals_and_excessive() {
        let accountant = CallAccountant::new();
        for _ in 0..EXCESSIVE_CALL_THRESHOLD {
            accountant.record("dex:/tokens");
        }
        for _ in 0..=EXCESSIVE_CALL_THRESHOLD {
            accountant.record("lending:/Market");
        }
        accountant.record("ledger:/network/supply");

        let stats = accountant.snapshot();
        assert_eq!(stats.total_calls, 2 * EXCESSIVE_CALL_THRESHOLD + 2);
        assert_eq!(stats.call_counts["dex:/tokens"], EXCESSIVE_CALL_THRESHOLD);
        // exactly at the threshold is not excessive
        assert_eq!(stats.excessive_operations, vec!["lending:/Market".to_string()]);
    }

    #[test]
    fn test_reset_zeroes_counters() {
        let accountant = CallAccountant::new();
        accountant.record("dex:/pools");
        accountant.record("dex:/pools");
        assert_eq!(accountant.count("dex:/pools"), 2);

        accountant.reset();
        assert_eq!(accountant.count("dex:/pools"), 0);
        assert_eq!(accountant.snapshot(), CallStatistics::default());
    }
}

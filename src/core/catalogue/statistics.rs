//! Per-column value statistics and per-index freshness state.

use crate::core::common::types::Value;
use serde::{Deserialize, Serialize};

/// Running statistics for one column, refreshed by every column write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueStatistics {
    pub count: u64,
    pub null_count: u64,
    pub min: Option<Value>,
    pub max: Option<Value>,
    /// False once a write may have invalidated the min/max estimate without
    /// a full rescan to confirm it; `optimize()` restores it to `true`.
    pub fresh: bool,
}

impl ValueStatistics {
    #[must_use]
    pub fn empty() -> Self {
        Self { count: 0, null_count: 0, min: None, max: None, fresh: true }
    }

    pub fn insert(&mut self, value: &Value) {
        self.count += 1;
        self.observe(value);
    }

    /// A replacement may move the min/max bounds in either direction; the
    /// cheap update folds in the new value but gives up exactness.
    pub fn update(&mut self, _old: &Value, new: &Value) {
        self.observe(new);
        self.fresh = false;
    }

    pub fn delete(&mut self, old: &Value) {
        self.count = self.count.saturating_sub(1);
        if old.is_null() {
            self.null_count = self.null_count.saturating_sub(1);
        }
        self.fresh = false;
    }

    fn observe(&mut self, value: &Value) {
        if value.is_null() {
            self.null_count += 1;
            return;
        }
        if value.compare(value).is_err() {
            return;
        }
        match &self.min {
            None => self.min = Some(value.clone()),
            Some(current) if value.compare(current).is_ok_and(|o| o.is_lt()) => {
                self.min = Some(value.clone());
            }
            _ => {}
        }
        match &self.max {
            None => self.max = Some(value.clone()),
            Some(current) if value.compare(current).is_ok_and(|o| o.is_gt()) => {
                self.max = Some(value.clone());
            }
            _ => {}
        }
    }
}

/// The freshness state of a secondary index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexState {
    Clean,
    Dirty,
    Stale,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_tracks_min_and_max() {
        let mut stats = ValueStatistics::empty();
        stats.insert(&Value::Long(5));
        stats.insert(&Value::Long(1));
        stats.insert(&Value::Long(9));
        assert_eq!(stats.min, Some(Value::Long(1)));
        assert_eq!(stats.max, Some(Value::Long(9)));
        assert_eq!(stats.count, 3);
    }

    #[test]
    fn delete_marks_stale() {
        let mut stats = ValueStatistics::empty();
        stats.insert(&Value::Long(5));
        assert!(stats.fresh);
        stats.delete(&Value::Long(5));
        assert_eq!(stats.count, 0);
        assert!(!stats.fresh);
    }

    #[test]
    fn null_values_do_not_move_bounds() {
        let mut stats = ValueStatistics::empty();
        stats.insert(&Value::Null);
        assert_eq!(stats.null_count, 1);
        assert_eq!(stats.min, None);
    }
}

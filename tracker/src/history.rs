use crate::models::PriceSnapshot;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

pub const DEFAULT_HISTORY_CAPACITY: usize = 20;

/// Rolling window of the most recent snapshots, oldest first.
///
/// Once `capacity` is reached every push evicts the oldest snapshot.
#[derive(Debug, Clone)]
pub struct BoundedHistory {
    snapshots: VecDeque<PriceSnapshot>,
    capacity: usize,
}

impl BoundedHistory {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            snapshots: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, snapshot: PriceSnapshot) {
        self.snapshots.push_back(snapshot);
        while self.snapshots.len() > self.capacity {
            self.snapshots.pop_front();
        }
    }

    /// Price of `symbol` in every retained snapshot, in chronological order.
    ///
    /// The result always has `len()` entries; `None` marks a snapshot that
    /// carries no price for the symbol.
    pub fn to_series(&self, symbol: &str) -> Vec<Option<f64>> {
        self.snapshots
            .iter()
            .map(|snapshot| snapshot.price(symbol))
            .collect()
    }

    /// X-axis for `to_series`.
    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.snapshots.iter().map(|s| s.timestamp).collect()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }

    pub fn latest(&self) -> Option<&PriceSnapshot> {
        self.snapshots.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PriceSnapshot> {
        self.snapshots.iter()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for BoundedHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::collections::BTreeMap;

    fn snapshot(seq: i64, btc: f64, eth: f64) -> PriceSnapshot {
        let base = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let mut prices = BTreeMap::new();
        prices.insert("btc".to_string(), btc);
        prices.insert("eth".to_string(), eth);
        PriceSnapshot::new(base + Duration::seconds(seq * 5), prices)
    }

    #[test]
    fn test_series_in_push_order() {
        let mut history = BoundedHistory::new(5);
        history.push(snapshot(0, 100.0, 10.0));
        history.push(snapshot(1, 110.0, 11.0));

        assert_eq!(history.to_series("btc"), vec![Some(100.0), Some(110.0)]);
        assert_eq!(history.to_series("eth"), vec![Some(10.0), Some(11.0)]);
    }

    #[test]
    fn test_evicts_oldest_when_full() {
        let mut history = BoundedHistory::new(2);
        history.push(snapshot(0, 100.0, 10.0));
        history.push(snapshot(1, 110.0, 11.0));
        history.push(snapshot(2, 120.0, 12.0));

        assert_eq!(history.len(), 2);
        assert_eq!(history.to_series("btc"), vec![Some(110.0), Some(120.0)]);
        assert_eq!(history.latest().unwrap().price("btc"), Some(120.0));
    }

    #[test]
    fn test_length_is_min_of_capacity_and_pushes() {
        for capacity in 1..=6 {
            for pushes in 0..=10i64 {
                let mut history = BoundedHistory::new(capacity);
                for i in 0..pushes {
                    history.push(snapshot(i, i as f64, 0.0));
                }

                let expected = capacity.min(pushes as usize);
                assert_eq!(history.len(), expected);

                // Retained entries are the most recent ones, oldest first
                let first_kept = pushes - expected as i64;
                let want: Vec<Option<f64>> = (first_kept..pushes).map(|i| Some(i as f64)).collect();
                assert_eq!(history.to_series("btc"), want);
            }
        }
    }

    #[test]
    fn test_missing_symbol_is_sentinel() {
        let mut history = BoundedHistory::new(3);
        history.push(snapshot(0, 100.0, 10.0));
        history.push(snapshot(1, 101.0, 10.0));

        assert_eq!(history.to_series("sol"), vec![None, None]);
    }

    #[test]
    fn test_timestamps_chronological() {
        let mut history = BoundedHistory::new(3);
        for i in 0..4 {
            history.push(snapshot(i, 1.0, 1.0));
        }

        let ts = history.timestamps();
        assert_eq!(ts.len(), 3);
        assert!(ts.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_clear_and_zero_capacity() {
        let mut history = BoundedHistory::new(0);
        assert_eq!(history.capacity(), 1);

        history.push(snapshot(0, 1.0, 1.0));
        history.push(snapshot(1, 2.0, 2.0));
        assert_eq!(history.len(), 1);

        history.clear();
        assert!(history.is_empty());
        assert!(history.to_series("btc").is_empty());
    }
}

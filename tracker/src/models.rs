use crate::error::{TrackerError, TrackerResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

pub type Symbol = String;

/// One fetched reading of every tracked asset price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub timestamp: DateTime<Utc>,
    pub prices: BTreeMap<Symbol, f64>,
}

impl PriceSnapshot {
    pub fn new(timestamp: DateTime<Utc>, prices: BTreeMap<Symbol, f64>) -> Self {
        Self { timestamp, prices }
    }

    /// Build a snapshot from a fetcher result.
    ///
    /// Every tracked symbol must be quoted; a partial result is rejected
    /// rather than padded. Quotes for symbols that are not tracked are dropped.
    pub fn from_quotes(
        timestamp: DateTime<Utc>,
        symbols: &[Symbol],
        mut quotes: HashMap<Symbol, f64>,
    ) -> TrackerResult<Self> {
        let missing: Vec<&str> = symbols
            .iter()
            .filter(|symbol| !quotes.contains_key(symbol.as_str()))
            .map(String::as_str)
            .collect();

        if !missing.is_empty() {
            return Err(TrackerError::MalformedResponse(format!(
                "no quote for {}",
                missing.join(", ")
            )));
        }

        let prices = symbols
            .iter()
            .filter_map(|symbol| quotes.remove(symbol).map(|price| (symbol.clone(), price)))
            .collect();

        Ok(Self { timestamp, prices })
    }

    pub fn price(&self, symbol: &str) -> Option<f64> {
        self.prices.get(symbol).copied()
    }

    /// Signed move of `symbol` since `previous`, if both readings exist.
    pub fn change_from(&self, previous: &PriceSnapshot, symbol: &str) -> Option<f64> {
        Some(self.price(symbol)? - previous.price(symbol)?)
    }
}

/// The refresh periods offered by the mobile picker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefreshPreset {
    #[default]
    FiveSeconds,
    TenSeconds,
}

impl RefreshPreset {
    pub const ALL: [RefreshPreset; 2] = [RefreshPreset::FiveSeconds, RefreshPreset::TenSeconds];

    pub fn interval(self) -> Duration {
        match self {
            RefreshPreset::FiveSeconds => Duration::from_millis(5_000),
            RefreshPreset::TenSeconds => Duration::from_millis(10_000),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RefreshPreset::FiveSeconds => "5s",
            RefreshPreset::TenSeconds => "10s",
        }
    }
}

/// What observers see after every completed fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshState {
    /// Last successful snapshot; `None` until the first success.
    pub current: Option<PriceSnapshot>,
    /// The snapshot `current` replaced, for showing price direction.
    pub previous: Option<PriceSnapshot>,
    pub last_error: Option<TrackerError>,
    pub in_flight: bool,
    pub last_attempt: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

impl RefreshState {
    pub fn latest_price(&self, symbol: &str) -> Option<f64> {
        self.current.as_ref().and_then(|snapshot| snapshot.price(symbol))
    }

    pub fn change(&self, symbol: &str) -> Option<f64> {
        let current = self.current.as_ref()?;
        current.change_from(self.previous.as_ref()?, symbol)
    }

    /// Current data is older than the latest attempt because that attempt failed.
    pub fn is_stale(&self) -> bool {
        self.last_error.is_some() && self.current.is_some()
    }

    pub(crate) fn record_success(&mut self, snapshot: PriceSnapshot) {
        self.previous = self.current.replace(snapshot);
        self.last_error = None;
        self.consecutive_failures = 0;
    }

    pub(crate) fn record_failure(&mut self, error: TrackerError) {
        self.last_error = Some(error);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbols() -> Vec<Symbol> {
        vec!["bitcoin".to_string(), "ethereum".to_string()]
    }

    fn snapshot(btc: f64, eth: f64) -> PriceSnapshot {
        let mut prices = BTreeMap::new();
        prices.insert("bitcoin".to_string(), btc);
        prices.insert("ethereum".to_string(), eth);
        PriceSnapshot::new(Utc::now(), prices)
    }

    #[test]
    fn test_from_quotes_keeps_tracked_symbols_only() {
        let quotes = HashMap::from([
            ("bitcoin".to_string(), 100.0),
            ("ethereum".to_string(), 10.0),
            ("dogecoin".to_string(), 0.1),
        ]);
        let snap = PriceSnapshot::from_quotes(Utc::now(), &symbols(), quotes).unwrap();

        assert_eq!(snap.prices.len(), 2);
        assert_eq!(snap.price("bitcoin"), Some(100.0));
        assert_eq!(snap.price("dogecoin"), None);
    }

    #[test]
    fn test_from_quotes_rejects_partial_result() {
        let quotes = HashMap::from([("bitcoin".to_string(), 100.0)]);
        let err = PriceSnapshot::from_quotes(Utc::now(), &symbols(), quotes).unwrap_err();

        assert_eq!(
            err,
            TrackerError::MalformedResponse("no quote for ethereum".to_string())
        );
    }

    #[test]
    fn test_change_from_previous() {
        let prev = snapshot(100.0, 10.0);
        let next = snapshot(110.0, 9.5);

        assert!((next.change_from(&prev, "bitcoin").unwrap() - 10.0).abs() < 0.001);
        assert!((next.change_from(&prev, "ethereum").unwrap() + 0.5).abs() < 0.001);
        assert_eq!(next.change_from(&prev, "solana"), None);
    }

    #[test]
    fn test_state_success_then_failure() {
        let mut state = RefreshState::default();
        state.record_success(snapshot(100.0, 10.0));
        state.record_success(snapshot(105.0, 10.0));

        assert_eq!(state.latest_price("bitcoin"), Some(105.0));
        assert_eq!(state.change("bitcoin"), Some(5.0));
        assert!(!state.is_stale());

        state.record_failure(TrackerError::FetchFailed("offline".to_string()));
        state.record_failure(TrackerError::FetchFailed("offline".to_string()));

        assert_eq!(state.latest_price("bitcoin"), Some(105.0));
        assert_eq!(state.consecutive_failures, 2);
        assert!(state.is_stale());

        state.record_success(snapshot(90.0, 10.0));
        assert_eq!(state.consecutive_failures, 0);
        assert!(state.last_error.is_none());
    }

    #[test]
    fn test_presets() {
        assert_eq!(RefreshPreset::default().interval(), Duration::from_secs(5));
        assert_eq!(RefreshPreset::TenSeconds.interval(), Duration::from_secs(10));
        let labels: Vec<_> = RefreshPreset::ALL.iter().map(|p| p.label()).collect();
        assert_eq!(labels, vec!["5s", "10s"]);
    }
}

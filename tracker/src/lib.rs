//! Polling price tracker core.
//!
//! [`PollingRefresher`] fetches current prices on a timer and on demand,
//! keeps the latest [`PriceSnapshot`] plus a [`BoundedHistory`] for charting,
//! and hands every completed [`RefreshState`] to subscribed observers.

pub mod api_client;
pub mod config;
pub mod error;
pub mod history;
pub mod models;
pub mod observer;
pub mod services;

pub use api_client::{CoinGeckoClient, PriceFetcher};
pub use config::{interval_from_millis, RefreshConfig, Settings};
pub use error::{TrackerError, TrackerResult};
pub use history::BoundedHistory;
pub use models::{PriceSnapshot, RefreshPreset, RefreshState, Symbol};
pub use observer::{RefreshObserver, SubscriptionId};
pub use services::price_service::{ManualRefresh, PollingRefresher};

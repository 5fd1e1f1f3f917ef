use crate::error::{TrackerError, TrackerResult};
use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::models::{RefreshPreset, Symbol};
use std::time::Duration;

pub const DEFAULT_SYMBOLS: [&str; 2] = ["bitcoin", "ethereum"];
pub const DEFAULT_QUOTE_CURRENCY: &str = "usd";

/// What to poll and how often.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshConfig {
    pub interval: Duration,
    pub symbols: Vec<Symbol>,
    pub quote_currency: String,
}

impl RefreshConfig {
    /// Normalizes symbols (trimmed, lower-cased, de-duplicated in order) and
    /// the quote currency, then validates.
    pub fn new<I, S>(interval: Duration, symbols: I, quote_currency: &str) -> TrackerResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let config = Self {
            interval,
            symbols: normalize_symbols(symbols),
            quote_currency: quote_currency.trim().to_lowercase(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> TrackerResult<()> {
        validate_interval(self.interval)?;
        validate_symbols(&self.symbols)?;
        if self.quote_currency.is_empty() {
            return Err(TrackerError::InvalidConfig(
                "quote currency must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: RefreshPreset::default().interval(),
            symbols: DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect(),
            quote_currency: DEFAULT_QUOTE_CURRENCY.to_string(),
        }
    }
}

/// Convert a caller-supplied millisecond count, rejecting zero and negatives.
pub fn interval_from_millis(millis: i64) -> TrackerResult<Duration> {
    if millis <= 0 {
        return Err(TrackerError::InvalidConfig(format!(
            "refresh interval must be positive, got {millis}ms"
        )));
    }
    Ok(Duration::from_millis(millis as u64))
}

pub(crate) fn validate_interval(interval: Duration) -> TrackerResult<()> {
    if interval.is_zero() {
        return Err(TrackerError::InvalidConfig(
            "refresh interval must be positive".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn validate_symbols(symbols: &[Symbol]) -> TrackerResult<()> {
    if symbols.is_empty() {
        return Err(TrackerError::InvalidConfig(
            "at least one symbol must be tracked".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn normalize_symbols<I, S>(symbols: I) -> Vec<Symbol>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<Symbol> = Vec::new();
    for symbol in symbols {
        let symbol = symbol.as_ref().trim().to_lowercase();
        if !symbol.is_empty() && !out.contains(&symbol) {
            out.push(symbol);
        }
    }
    out
}

/// Settings for the terminal binary, read from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub refresh: RefreshConfig,
    pub history_capacity: usize,
    pub api_url: String,
}

impl Settings {
    pub const INTERVAL_VAR: &'static str = "PRICE_TRACKER_INTERVAL_MS";
    pub const SYMBOLS_VAR: &'static str = "PRICE_TRACKER_SYMBOLS";
    pub const QUOTE_VAR: &'static str = "PRICE_TRACKER_QUOTE";
    pub const HISTORY_VAR: &'static str = "PRICE_TRACKER_HISTORY";
    pub const API_URL_VAR: &'static str = "PRICE_TRACKER_API_URL";

    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> TrackerResult<Self> {
        check_dotenv(dotenvy::dotenv())?;
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unset variables fall back to the defaults of the mobile app.
    pub fn from_lookup<F>(lookup: F) -> TrackerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let interval = match lookup(Self::INTERVAL_VAR) {
            Some(raw) => interval_from_millis(parse_var(Self::INTERVAL_VAR, &raw)?)?,
            None => RefreshPreset::default().interval(),
        };

        let symbols: Vec<String> = match lookup(Self::SYMBOLS_VAR) {
            Some(raw) => raw.split(',').map(str::to_string).collect(),
            None => DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect(),
        };

        let quote = lookup(Self::QUOTE_VAR).unwrap_or_else(|| DEFAULT_QUOTE_CURRENCY.to_string());

        let history_capacity = match lookup(Self::HISTORY_VAR) {
            Some(raw) => parse_var::<usize>(Self::HISTORY_VAR, &raw)?,
            None => DEFAULT_HISTORY_CAPACITY,
        };
        if history_capacity == 0 {
            return Err(TrackerError::InvalidConfig(format!(
                "{} must be at least 1",
                Self::HISTORY_VAR
            )));
        }

        let api_url = lookup(Self::API_URL_VAR)
            .unwrap_or_else(|| crate::api_client::COINGECKO_BASE_URL.to_string());

        Ok(Self {
            refresh: RefreshConfig::new(interval, symbols, &quote)?,
            history_capacity,
            api_url,
        })
    }
}

/// A missing `.env` is fine; one that exists but cannot be read or parsed is not.
fn check_dotenv<T>(loaded: dotenvy::Result<T>) -> TrackerResult<()> {
    match loaded {
        Ok(_) => Ok(()),
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(TrackerError::InvalidConfig(format!(".env: {e}"))),
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, raw: &str) -> TrackerResult<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| TrackerError::InvalidConfig(format!("{key}={raw}: {e}")))
}

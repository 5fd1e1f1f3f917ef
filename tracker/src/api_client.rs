use crate::error::{TrackerError, TrackerResult};
use crate::models::Symbol;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

pub const COINGECKO_BASE_URL: &str = "https://api.coingecko.com/api/v3";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Source of current prices.
///
/// Returns one quote per requested symbol in `quote_currency`. Timeouts are
/// the implementation's concern; the refresher waits as long as the call does.
#[async_trait]
pub trait PriceFetcher: Send + Sync {
    async fn fetch_prices(
        &self,
        symbols: &[Symbol],
        quote_currency: &str,
    ) -> TrackerResult<HashMap<Symbol, f64>>;
}

/// `PriceFetcher` backed by the CoinGecko `simple/price` endpoint.
pub struct CoinGeckoClient {
    client: reqwest::Client,
    base_url: String,
}

impl CoinGeckoClient {
    pub fn new() -> TrackerResult<Self> {
        Self::with_base_url(COINGECKO_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> TrackerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("price-tracker/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TrackerError::InvalidConfig(format!("http client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn price_url(&self, symbols: &[Symbol], quote_currency: &str) -> String {
        format!(
            "{}/simple/price?ids={}&vs_currencies={}",
            self.base_url,
            symbols.join(","),
            quote_currency
        )
    }
}

#[async_trait]
impl PriceFetcher for CoinGeckoClient {
    async fn fetch_prices(
        &self,
        symbols: &[Symbol],
        quote_currency: &str,
    ) -> TrackerResult<HashMap<Symbol, f64>> {
        let url = self.price_url(symbols, quote_currency);

        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TrackerError::FetchFailed(format!("{url} returned {status}")));
        }

        // A body that is not JSON surfaces as a decode error
        let value: Value = response.json().await?;
        parse_quotes(&value, quote_currency)
    }
}

/// Parse a `{ "bitcoin": { "usd": 65000.0 }, ... }` body.
///
/// Entries without the quote currency are skipped; whether every tracked
/// symbol came back is decided when the snapshot is built.
pub fn parse_simple_price(body: &str, quote_currency: &str) -> TrackerResult<HashMap<Symbol, f64>> {
    let value: Value = serde_json::from_str(body)?;
    parse_quotes(&value, quote_currency)
}

fn parse_quotes(value: &Value, quote_currency: &str) -> TrackerResult<HashMap<Symbol, f64>> {
    let entries = value.as_object().ok_or_else(|| {
        TrackerError::MalformedResponse(format!("expected a JSON object, got: {value}"))
    })?;

    let mut prices = HashMap::with_capacity(entries.len());
    for (symbol, quotes) in entries {
        let Some(quotes) = quotes.as_object() else {
            return Err(TrackerError::MalformedResponse(format!(
                "quotes for {symbol} are not an object"
            )));
        };

        if let Some(raw) = quotes.get(quote_currency) {
            let price = raw.as_f64().ok_or_else(|| {
                TrackerError::MalformedResponse(format!("{symbol}.{quote_currency} is not a number"))
            })?;
            prices.insert(symbol.clone(), price);
        }
    }

    Ok(prices)
}

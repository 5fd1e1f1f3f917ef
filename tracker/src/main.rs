use price_tracker::{
    CoinGeckoClient, ManualRefresh, PollingRefresher, RefreshPreset, RefreshState, Settings,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, PartialEq)]
enum Command {
    Refresh,
    Interval(RefreshPreset),
    Quit,
    Nothing,
    Unknown(String),
}

impl Command {
    fn parse(line: &str) -> Self {
        match line.trim() {
            "q" => Command::Quit,
            "r" => Command::Refresh,
            "5" => Command::Interval(RefreshPreset::FiveSeconds),
            "10" => Command::Interval(RefreshPreset::TenSeconds),
            "" => Command::Nothing,
            other => Command::Unknown(other.to_string()),
        }
    }
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> price_tracker::TrackerResult<()> {
    let settings = Settings::from_env()?;
    let fetcher = Arc::new(CoinGeckoClient::with_base_url(&settings.api_url)?);

    let mut refresher = PollingRefresher::with_history_capacity(settings.history_capacity);
    let quote = settings.refresh.quote_currency.clone();
    refresher.subscribe(Arc::new(move |state: &RefreshState| print_prices(state, &quote)));

    refresher.start(settings.refresh.clone(), fetcher).await?;
    info!("Commands: r = refresh, 5 / 10 = refresh every 5s / 10s, q = quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => line,
        };
        let Ok(Some(line)) = line else { break };

        match Command::parse(&line) {
            Command::Quit => break,
            Command::Refresh => {
                // The refresh keeps running in the background if ctrl-c wins
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    outcome = refresher.refresh_now() => match outcome {
                        Ok(ManualRefresh::AlreadyInFlight) => info!("Refresh already in progress"),
                        Ok(ManualRefresh::Completed(_)) => {}
                        Err(e) => warn!("Refresh failed: {}", e),
                    },
                }
            }
            Command::Interval(preset) => {
                if let Err(e) = refresher.set_interval(preset.interval()).await {
                    warn!("Could not change interval: {}", e);
                } else {
                    info!("Refreshing every {}", preset.label());
                }
            }
            Command::Nothing => {}
            Command::Unknown(other) => warn!("Unknown command: {}", other),
        }
    }

    refresher.stop();
    Ok(())
}

fn print_prices(state: &RefreshState, quote: &str) {
    if let Some(err) = &state.last_error {
        warn!(
            "Last refresh failed ({} in a row): {}",
            state.consecutive_failures, err
        );
    }

    let Some(current) = &state.current else {
        return;
    };

    for (symbol, price) in &current.prices {
        let arrow = match state.change(symbol) {
            Some(delta) if delta > 0.0 => "▲",
            Some(delta) if delta < 0.0 => "▼",
            _ => " ",
        };
        info!("{:<12} {:>14.2} {} {}", symbol, price, quote.to_uppercase(), arrow);
    }
}

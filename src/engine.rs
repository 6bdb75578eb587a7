//! The decision loop: interval-aligned scheduling, the flat/long position
//! machine, and the buy/sell operations.
//!
//! One cycle is strictly ordered: liquidate any held position, score every
//! instrument, select at most one winner, buy it. Cycles never overlap; the
//! engine is the only owner of the position and ledger, so no locking is
//! involved. A shutdown signal (ctrl-c in the binary) stops the loop between
//! suspension points and writes a final checkpoint.

use chrono::Utc;
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::domain::{Instrument, Position};
use crate::error::{QuarterdeckError, Result};
use crate::exchange::{ExchangeClient, OrderRequest, OrderSide};
use crate::filters::normalize;
use crate::inference::{Predictor, PredictorAggregator};
use crate::ledger::SimLedger;
use crate::schedule;
use crate::state::StateStore;

pub struct TradeEngine {
    schedule: crate::config::ScheduleConfig,
    trading: crate::config::TradingConfig,
    exchange: Arc<dyn ExchangeClient>,
    aggregator: PredictorAggregator,
    instruments: Vec<(Instrument, Arc<dyn Predictor>)>,
    position: Position,
    /// Some only in test mode
    ledger: Option<SimLedger>,
    store: StateStore,
}

impl TradeEngine {
    /// Build the engine: cache trading filters for every configured
    /// instrument and recover any checkpointed position/ledger.
    pub async fn new(
        config: &AppConfig,
        exchange: Arc<dyn ExchangeClient>,
        predictors: Vec<Arc<dyn Predictor>>,
    ) -> Result<Self> {
        if predictors.len() != config.instruments.len() {
            return Err(QuarterdeckError::Validation(format!(
                "{} predictors provided for {} instruments",
                predictors.len(),
                config.instruments.len()
            )));
        }

        let mut instruments = Vec::with_capacity(config.instruments.len());
        for (spec, predictor) in config.instruments.iter().zip(predictors) {
            let filters = retry_transient(
                config.trading.market_data_retries,
                &format!("filters for {}", spec.symbol),
                || exchange.symbol_filters(&spec.symbol),
            )
            .await?;
            info!(
                symbol = %spec.symbol,
                tick_size = %filters.tick_size,
                step_size = %filters.step_size,
                min_notional = %filters.min_notional,
                "cached trading filters"
            );
            instruments.push((Instrument::from_spec(spec, filters), predictor));
        }

        let store = StateStore::new(&config.trading.state_file);
        let snapshot = store.load().await?;
        let (position, ledger) = match snapshot {
            Some(snapshot) => (snapshot.position, snapshot.ledger),
            None => {
                let ledger = if config.trading.test_mode {
                    let starting_cash = config.trading.starting_cash.ok_or_else(|| {
                        QuarterdeckError::Validation("starting_cash missing in test mode".into())
                    })?;
                    Some(SimLedger::new(starting_cash))
                } else {
                    None
                };
                (Position::Flat, ledger)
            }
        };

        if let Some(held) = position.held() {
            info!(symbol = %held.symbol, "resuming with a held position");
        }

        let aggregator = PredictorAggregator::new(exchange.clone(), &config.market_data);

        Ok(Self {
            schedule: config.schedule.clone(),
            trading: config.trading.clone(),
            exchange,
            aggregator,
            instruments,
            position,
            ledger,
            store,
        })
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn ledger(&self) -> Option<&SimLedger> {
        self.ledger.as_ref()
    }

    /// Main loop: sleep to each window boundary, run one cycle, sleep the
    /// configured waiting time, repeat until shutdown.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            instruments = self.instruments.len(),
            test_mode = self.trading.test_mode,
            dry_run = self.exchange.is_dry_run(),
            "decision loop starting"
        );

        loop {
            let wait = schedule::until_next_window(Utc::now(), &self.schedule);
            info!(wait_secs = wait.as_secs(), "sleeping until next window");
            if sleep_or_shutdown(wait, &mut shutdown).await {
                break;
            }

            // Give the upstream candle a moment to close before scoring
            if sleep_or_shutdown(
                Duration::from_secs(self.schedule.grace_delay_secs),
                &mut shutdown,
            )
            .await
            {
                break;
            }

            if let Err(e) = self.run_cycle().await {
                error!(error = %e, "cycle aborted");
            }

            if sleep_or_shutdown(
                Duration::from_secs(self.schedule.waiting_time_secs),
                &mut shutdown,
            )
            .await
            {
                break;
            }
        }

        self.checkpoint().await?;
        info!("decision loop stopped");
        Ok(())
    }

    /// One full decision cycle: sell -> predict -> select -> buy.
    pub async fn run_cycle(&mut self) -> Result<()> {
        info!(at = %Utc::now(), "cycle start");

        if let Some(held) = self.position.held().cloned() {
            self.sell(&held).await?;
        }

        let table = self.aggregator.score_all(&self.instruments).await;
        if table.is_empty() {
            warn!("no instrument produced a score this cycle");
            return Ok(());
        }

        let winner = match table.winner() {
            Some(winner) => winner.clone(),
            None => {
                info!(at = %Utc::now(), "no predictions over the threshold");
                return Ok(());
            }
        };

        let instrument = self
            .instruments
            .iter()
            .map(|(instrument, _)| instrument)
            .find(|i| i.name == winner.name)
            .cloned()
            .ok_or_else(|| {
                QuarterdeckError::Validation(format!("winner {} not configured", winner.name))
            })?;

        info!(
            name = %winner.name,
            score = winner.score,
            threshold = winner.threshold,
            "selected winner"
        );

        match self.buy(&instrument).await {
            Ok(()) => {}
            Err(QuarterdeckError::FilterViolation {
                symbol,
                notional,
                min_notional,
            }) => {
                // Not executable this cycle; stay flat and wait for the next window
                warn!(%symbol, %notional, %min_notional, "buy skipped: below minimum notional");
            }
            Err(e) => return Err(e),
        }

        Ok(())
    }

    /// Open a position with the full available cash balance
    async fn buy(&mut self, instrument: &Instrument) -> Result<()> {
        let cash = match &self.ledger {
            Some(ledger) => ledger.cash,
            None => {
                let asset = self.trading.quote_asset.clone();
                self.market_data_retry(&format!("{asset} balance"), || {
                    self.exchange.get_balance(&asset)
                })
                .await?
            }
        };

        let price = self
            .market_data_retry(&format!("{} ticker", instrument.symbol), || {
                self.exchange.last_price(&instrument.symbol)
            })
            .await?;
        if price <= Decimal::ZERO {
            return Err(QuarterdeckError::InvalidMarketData(format!(
                "non-positive last price {price} for {}",
                instrument.symbol
            )));
        }

        let raw_quantity = cash / price;
        let (price, quantity) = normalize(&instrument.symbol, price, raw_quantity, &instrument.filters)?;

        info!(symbol = %instrument.symbol, %price, %quantity, "buying");

        match &mut self.ledger {
            Some(ledger) => ledger.buy(price, quantity)?,
            None => {
                // The acknowledged quantity is assumed to fill; order status
                // is not polled afterwards.
                let request = OrderRequest::limit_gtc(
                    &instrument.symbol,
                    OrderSide::Buy,
                    quantity,
                    price,
                );
                let ack = self.exchange.place_order(&request).await?;
                info!(symbol = %ack.symbol, order_id = ?ack.order_id, "buy order placed");
            }
        }

        self.position.hold(instrument.clone());
        self.checkpoint().await
    }

    /// Liquidate the full holdings of the held instrument.
    ///
    /// The position always ends flat: holdings too small to clear the
    /// minimum notional are written off as dust rather than held forever.
    async fn sell(&mut self, instrument: &Instrument) -> Result<()> {
        let quantity = match &self.ledger {
            Some(ledger) => ledger.holdings,
            None => {
                let asset = instrument.base_asset();
                self.market_data_retry(&format!("{asset} balance"), || {
                    self.exchange.get_balance(&asset)
                })
                .await?
            }
        };

        let price = self
            .market_data_retry(&format!("{} ticker", instrument.symbol), || {
                self.exchange.last_price(&instrument.symbol)
            })
            .await?;
        if price <= Decimal::ZERO {
            return Err(QuarterdeckError::InvalidMarketData(format!(
                "non-positive last price {price} for {}",
                instrument.symbol
            )));
        }

        match normalize(&instrument.symbol, price, quantity, &instrument.filters) {
            Ok((price, quantity)) => {
                info!(symbol = %instrument.symbol, %price, %quantity, "selling");
                match &mut self.ledger {
                    Some(ledger) => {
                        ledger.sell(price, quantity)?;
                        info!(cash = %ledger.cash, "ledger after sell");
                    }
                    None => {
                        let request = OrderRequest::limit_gtc(
                            &instrument.symbol,
                            OrderSide::Sell,
                            quantity,
                            price,
                        );
                        let ack = self.exchange.place_order(&request).await?;
                        info!(symbol = %ack.symbol, order_id = ?ack.order_id, "sell order placed");
                    }
                }
            }
            Err(QuarterdeckError::FilterViolation {
                symbol,
                notional,
                min_notional,
            }) => {
                warn!(%symbol, %notional, %min_notional, "holdings written off as dust");
                if let Some(ledger) = &mut self.ledger {
                    ledger.holdings = Decimal::ZERO;
                }
            }
            Err(e) => return Err(e),
        }

        self.position = Position::Flat;
        self.checkpoint().await
    }

    async fn checkpoint(&self) -> Result<()> {
        self.store.save(&self.position, self.ledger.as_ref()).await
    }

    async fn market_data_retry<T, F, Fut>(&self, what: &str, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        retry_transient(self.trading.market_data_retries, what, op).await
    }
}

/// Retry a transient-failure-prone call with 1s/2s/4s... backoff
async fn retry_transient<T, F, Fut>(max_retries: u32, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < max_retries => {
                attempt += 1;
                let backoff = Duration::from_secs(1 << (attempt - 1).min(4));
                warn!(
                    %what,
                    attempt,
                    backoff_secs = backoff.as_secs(),
                    error = %e,
                    "transient failure, retrying"
                );
                tokio::time::sleep(backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Returns true when shutdown was signalled during the sleep
async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        result = shutdown.changed() => result.is_err() || *shutdown.borrow(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QuarterdeckError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn retry_transient_retries_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = retry_transient(3, "ticker", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(QuarterdeckError::MarketDataUnavailable("flaky".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_transient_gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<u32> = retry_transient(2, "ticker", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(QuarterdeckError::MarketDataUnavailable("down".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<u32> = retry_transient(5, "order", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(QuarterdeckError::OrderRejected("bad price".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sleep_or_shutdown_reports_signal() {
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();
        assert!(sleep_or_shutdown(Duration::from_secs(3600), &mut rx).await);
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_or_shutdown_completes_quiet_sleep() {
        let (_tx, mut rx) = watch::channel(false);
        assert!(!sleep_or_shutdown(Duration::from_millis(10), &mut rx).await);
    }
}

use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::{OrderExecutor, PriceWindow};
use crate::api::Exchange;
use crate::config::{Settings, TradingMode};
use crate::error::TradingError;
use crate::models::{
    CandleUpdate, InstrumentRules, OrderFill, OrderIntent, OrderSide, Position, PositionSide,
    Signal,
};
use crate::notify::Notifier;
use crate::risk::{self, SizingInputs};
use crate::strategy::{MaCrossover, SignalReading, Strategy};

/// What the state machine wants done for one signal
#[derive(Debug, Clone, PartialEq)]
pub enum TradeAction {
    Hold,
    /// Enter from flat
    Open { side: OrderSide },
    /// Close the current position, then enter the other way
    Flip {
        close_side: OrderSide,
        close_quantity: Decimal,
        open_side: OrderSide,
    },
}

#[derive(Debug, Clone)]
pub struct TradeDecision {
    pub action: TradeAction,
    pub reason: String,
}

/// Result of evaluating one candle
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// Non-final candle while only final candles are evaluated
    Ignored,
    /// Window not full yet
    Warming { have: usize, need: usize },
    /// Signal computed, nothing to do
    Held { signal: Signal, reason: String },
    /// Alert mode reported a signal change
    Alerted { signal: Signal },
    Opened { entry: OrderFill },
    Flipped { closed: OrderFill, entry: OrderFill },
}

/// Decide what a signal means for the current position
///
/// Edge-triggered: nothing happens unless the signal changed, except that
/// `reenter_when_flat` lets an unchanged signal re-open a flat position.
pub fn decide(
    current: Signal,
    previous: Signal,
    position: &Position,
    reenter_when_flat: bool,
) -> TradeDecision {
    let hold = |reason: &str| TradeDecision {
        action: TradeAction::Hold,
        reason: reason.to_string(),
    };

    let entry_side = match current {
        Signal::Long => OrderSide::Buy,
        Signal::Short => OrderSide::Sell,
        Signal::None => return hold("No signal"),
    };

    let changed = current != previous;
    let side = if position.is_flat() {
        PositionSide::Flat
    } else {
        position.side
    };

    match side {
        PositionSide::Flat => {
            if changed || reenter_when_flat {
                TradeDecision {
                    action: TradeAction::Open { side: entry_side },
                    reason: format!("{} signal while flat", current),
                }
            } else {
                hold("Signal unchanged while flat")
            }
        }
        _ if !changed => hold("Signal unchanged"),
        PositionSide::Long if current == Signal::Long => hold("Already long"),
        PositionSide::Short if current == Signal::Short => hold("Already short"),
        PositionSide::Long | PositionSide::Short => TradeDecision {
            action: TradeAction::Flip {
                close_side: entry_side,
                close_quantity: position.quantity,
                open_side: entry_side,
            },
            reason: format!("Crossover to {} against open {:?}", current, position.side),
        },
    }
}

/// Single owner of the price window and last signal
///
/// Evaluations are strictly sequential: `run` drains one candle at a time and
/// each candle's orders complete before the next candle is read.
pub struct Controller {
    settings: Arc<Settings>,
    exchange: Arc<dyn Exchange>,
    executor: OrderExecutor,
    strategy: MaCrossover,
    window: PriceWindow,
    last_signal: Signal,
    rules: InstrumentRules,
    notifier: Notifier,
}

impl Controller {
    pub fn new(
        settings: Arc<Settings>,
        exchange: Arc<dyn Exchange>,
        rules: InstrumentRules,
        notifier: Notifier,
    ) -> Self {
        let executor = OrderExecutor::new(
            exchange.clone(),
            settings.symbol.clone(),
            settings.reconcile_delay(),
            notifier.clone(),
        );

        Self {
            strategy: MaCrossover::new(settings.short_window, settings.long_window),
            window: PriceWindow::new(settings.long_window),
            last_signal: Signal::None,
            settings,
            exchange,
            executor,
            rules,
            notifier,
        }
    }

    pub fn last_signal(&self) -> Signal {
        self.last_signal
    }

    pub fn window(&self) -> &PriceWindow {
        &self.window
    }

    /// Consume candles until the feed channel closes or a fatal error occurs
    pub async fn run(mut self, mut candles: mpsc::Receiver<CandleUpdate>) -> TradingError {
        tracing::info!(
            "💹 Controller running for {} ({} MA {}/{}, mode {:?})",
            self.settings.symbol,
            self.strategy.name(),
            self.strategy.short_window(),
            self.strategy.long_window(),
            self.settings.mode
        );

        while let Some(candle) = candles.recv().await {
            match self.on_candle(&candle).await {
                Ok(evaluation) => tracing::debug!("Evaluation: {:?}", evaluation),
                Err(e) if e.is_fatal() => return e,
                Err(_) => {}
            }
        }

        TradingError::FeedClosed("candle channel closed".to_string())
    }

    /// Evaluate one kline update
    pub async fn on_candle(&mut self, candle: &CandleUpdate) -> Result<Evaluation, TradingError> {
        if !candle.is_final && !self.settings.evaluate_open_candles {
            return Ok(Evaluation::Ignored);
        }
        self.on_close_price(candle.close).await
    }

    /// Push a closing price and act on the resulting signal
    pub async fn on_close_price(&mut self, price: Decimal) -> Result<Evaluation, TradingError> {
        let window = match self.window.push(price) {
            Ok(window) => window,
            Err(e) => {
                tracing::warn!("Dropped candle for {}: {}", self.settings.symbol, e);
                return Err(e);
            }
        };

        let reading = match self.strategy.evaluate(window) {
            Ok(reading) => reading,
            Err(TradingError::InsufficientData { have, need }) => {
                tracing::info!("    → Collecting data... ({}/{} needed)", have, need);
                return Ok(Evaluation::Warming { have, need });
            }
            Err(e) => return Err(e),
        };

        let previous = std::mem::replace(&mut self.last_signal, reading.signal);
        if reading.signal != previous {
            tracing::info!(
                "Signal changed to: {} (short MA {:.4}, long MA {:.4})",
                reading.signal,
                reading.short_ma,
                reading.long_ma
            );
        }

        let result = match self.settings.mode {
            TradingMode::Alert => Ok(self.alert(&reading, previous)),
            TradingMode::Trade => self.trade(reading.signal, previous).await,
        };

        if let Err(e) = &result {
            tracing::error!("  ✗ Evaluation failed for {}: {}", self.settings.symbol, e);
            self.notifier.notify(format!(
                "❌ {} {} signal: {}",
                self.settings.symbol, reading.signal, e
            ));
        }

        result
    }

    /// Close all exposure
    pub async fn flatten(&self) -> Result<Option<OrderFill>, TradingError> {
        self.executor.flatten().await
    }

    fn alert(&self, reading: &SignalReading, previous: Signal) -> Evaluation {
        if reading.signal == previous {
            return Evaluation::Held {
                signal: reading.signal,
                reason: "Signal unchanged".to_string(),
            };
        }

        self.notifier.notify(format!(
            "🔔 Signal changed to: {} ({})\nShort MA: {:.4}\nLong MA: {:.4}",
            reading.signal, self.settings.symbol, reading.short_ma, reading.long_ma
        ));
        Evaluation::Alerted {
            signal: reading.signal,
        }
    }

    async fn trade(&self, current: Signal, previous: Signal) -> Result<Evaluation, TradingError> {
        let position = self.exchange.position(&self.settings.symbol).await?;
        let decision = decide(current, previous, &position, self.settings.reenter_when_flat);

        tracing::info!(
            "  Decision: {:?} - {} (position {:?} {})",
            decision.action,
            decision.reason,
            position.side,
            position.quantity
        );

        match decision.action {
            TradeAction::Hold => Ok(Evaluation::Held {
                signal: current,
                reason: decision.reason,
            }),
            TradeAction::Open { side } => {
                self.clear_resting_orders().await;
                let entry = self.enter(side).await?;
                Ok(Evaluation::Opened { entry })
            }
            TradeAction::Flip {
                close_side,
                close_quantity,
                open_side,
            } => {
                self.clear_resting_orders().await;
                let closed = self
                    .executor
                    .submit(&OrderIntent::close(close_side, close_quantity))
                    .await?;
                let entry = self.enter(open_side).await?;
                Ok(Evaluation::Flipped { closed, entry })
            }
        }
    }

    /// Drop stops left over from a previous position
    async fn clear_resting_orders(&self) {
        if let Err(e) = self.executor.cancel_open_orders().await {
            tracing::warn!("Failed to cancel open orders for {}: {}", self.settings.symbol, e);
        }
    }

    /// Size, open and protect a new position
    async fn enter(&self, side: OrderSide) -> Result<OrderFill, TradingError> {
        let quantity = self.size_order().await?;
        let entry = self.executor.submit(&OrderIntent::open(side, quantity)).await?;

        let stop = risk::stop_loss_for_entry(
            side,
            entry.price,
            entry.quantity,
            risk::decimal_from_f64(self.settings.stop_loss_percent)?,
            self.rules.tick_size,
        )?;
        self.executor.place_stop_loss(&stop).await?;

        Ok(entry)
    }

    async fn size_order(&self) -> Result<Decimal, TradingError> {
        let equity = self.exchange.account_balance().await?;
        let price = self.exchange.last_price(&self.settings.symbol).await?;

        let inputs = SizingInputs {
            equity,
            usage_percent: risk::decimal_from_f64(self.settings.usage_percent)?,
            leverage: self.settings.leverage,
            price,
            lot_step: self.rules.lot_step,
            min_quantity: self.rules.min_quantity,
        };

        let quantity = risk::size(&inputs)?;
        tracing::info!(
            "  Sized {} {} from equity {} at {} ({}x, {}%)",
            quantity,
            self.settings.symbol,
            equity,
            price,
            inputs.leverage,
            inputs.usage_percent
        );
        Ok(quantity)
    }
}

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

use crate::api::Exchange;
use crate::error::TradingError;
use crate::models::{OrderFill, OrderIntent, OrderPurpose, OrderResult, StopLossSpec};
use crate::notify::Notifier;

/// Submits orders for one symbol and resolves ambiguous outcomes
///
/// A timed-out market order is never resubmitted here. The executor waits,
/// re-reads the position and accepts the order only if the position moved by
/// exactly the order's quantity; otherwise the failure is surfaced.
#[derive(Clone)]
pub struct OrderExecutor {
    exchange: Arc<dyn Exchange>,
    symbol: String,
    reconcile_delay: Duration,
    notifier: Notifier,
}

impl OrderExecutor {
    pub fn new(
        exchange: Arc<dyn Exchange>,
        symbol: impl Into<String>,
        reconcile_delay: Duration,
        notifier: Notifier,
    ) -> Self {
        Self {
            exchange,
            symbol: symbol.into(),
            reconcile_delay,
            notifier,
        }
    }

    /// Submit a market order and return its fill
    pub async fn submit(&self, intent: &OrderIntent) -> Result<OrderFill, TradingError> {
        if intent.quantity <= Decimal::ZERO {
            return Err(TradingError::Sizing(format!(
                "refusing to submit {} {} of {}",
                intent.purpose, intent.side, intent.quantity
            )));
        }

        let prior = self.exchange.position(&self.symbol).await?;

        tracing::info!(
            symbol = %self.symbol,
            side = %intent.side,
            quantity = %intent.quantity,
            purpose = %intent.purpose,
            "Submitting market order"
        );

        let result = self
            .exchange
            .submit_market_order(
                &self.symbol,
                intent.side,
                intent.quantity,
                intent.reduce_only(),
            )
            .await;

        let fill = match result {
            Ok(ack) => self.fill_from_ack(intent, &ack).await,
            Err(e) if e.is_timeout() => {
                tracing::warn!(
                    "⏳ {} {} {} timed out ({}), reconciling against position",
                    intent.side,
                    intent.quantity,
                    self.symbol,
                    e
                );
                let expected = intent.side.apply_to(prior.signed_quantity(), intent.quantity);
                self.reconcile(intent, expected).await?
            }
            Err(e) => {
                return Err(TradingError::OrderRejected {
                    symbol: self.symbol.clone(),
                    side: intent.side,
                    quantity: intent.quantity,
                    source: e,
                })
            }
        };

        tracing::info!(
            "✓ {} {} {} {} @ {}{}",
            fill.purpose,
            fill.side,
            fill.quantity,
            self.symbol,
            fill.price,
            if fill.reconciled { " (reconciled)" } else { "" }
        );
        self.notifier.notify(format!(
            "✅ {} {} {} {} @ {}",
            fill.purpose, fill.side, fill.quantity, self.symbol, fill.price
        ));

        Ok(fill)
    }

    /// Place a reduce-only stop-market order
    pub async fn place_stop_loss(&self, stop: &StopLossSpec) -> Result<OrderResult, TradingError> {
        let stop = StopLossSpec {
            reduce_only: true,
            ..stop.clone()
        };

        let ack = self
            .exchange
            .submit_stop_market_order(&self.symbol, &stop)
            .await
            .map_err(|e| TradingError::OrderRejected {
                symbol: self.symbol.clone(),
                side: stop.side,
                quantity: stop.quantity,
                source: e,
            })?;

        tracing::info!(
            "🛡️ Stop-loss {} {} {} @ {} placed (order {})",
            stop.side,
            stop.quantity,
            self.symbol,
            stop.trigger_price,
            ack.order_id
        );
        self.notifier.notify(format!(
            "🛡️ {} {} {} {} trigger {}",
            OrderPurpose::StopLoss,
            stop.side,
            stop.quantity,
            self.symbol,
            stop.trigger_price
        ));

        Ok(ack)
    }

    /// Cancel resting orders (old stop-losses)
    pub async fn cancel_open_orders(&self) -> Result<(), TradingError> {
        self.exchange.cancel_open_orders(&self.symbol).await?;
        tracing::info!("Cancelled open orders for {}", self.symbol);
        Ok(())
    }

    /// Close all exposure for the symbol
    ///
    /// Returns `None` when already flat.
    pub async fn flatten(&self) -> Result<Option<OrderFill>, TradingError> {
        let position = self.exchange.position(&self.symbol).await?;

        let Some(side) = position.closing_side().filter(|_| !position.is_flat()) else {
            tracing::info!("No position to close for {}", self.symbol);
            if let Err(e) = self.cancel_open_orders().await {
                tracing::warn!("Failed to cancel open orders while flat: {}", e);
            }
            return Ok(None);
        };

        if let Err(e) = self.cancel_open_orders().await {
            // The close below is reduce-only, so a surviving stop cannot flip us
            tracing::warn!("Failed to cancel open orders before flatten: {}", e);
        }

        let fill = self
            .submit(&OrderIntent::close(side, position.quantity))
            .await?;
        self.notifier.notify(format!(
            "🏁 Flattened {} {} {}",
            self.symbol, fill.side, fill.quantity
        ));
        Ok(Some(fill))
    }

    async fn fill_from_ack(&self, intent: &OrderIntent, ack: &OrderResult) -> OrderFill {
        let price = if ack.average_price > Decimal::ZERO {
            ack.average_price
        } else {
            self.reference_price().await
        };

        let quantity = if ack.executed_quantity > Decimal::ZERO {
            ack.executed_quantity
        } else {
            intent.quantity
        };

        OrderFill {
            side: intent.side,
            quantity,
            purpose: intent.purpose,
            price,
            reconciled: false,
        }
    }

    async fn reconcile(
        &self,
        intent: &OrderIntent,
        expected: Decimal,
    ) -> Result<OrderFill, TradingError> {
        tokio::time::sleep(self.reconcile_delay).await;

        let observed = self
            .exchange
            .position(&self.symbol)
            .await
            .map_err(|e| {
                tracing::error!(
                    "✗ {} {} {} outcome unknown, position re-query failed: {}",
                    intent.side,
                    intent.quantity,
                    self.symbol,
                    e
                );
                TradingError::OrderOutcomeUnknown {
                    symbol: self.symbol.clone(),
                    side: intent.side,
                    quantity: intent.quantity,
                    source: e,
                }
            })?;

        if observed.signed_quantity() != expected {
            tracing::error!(
                "✗ {} {} {} not confirmed: expected position {}, observed {}",
                intent.side,
                intent.quantity,
                self.symbol,
                expected,
                observed.signed_quantity()
            );
            return Err(TradingError::AmbiguousOrderOutcome {
                symbol: self.symbol.clone(),
                side: intent.side,
                quantity: intent.quantity,
                expected,
                observed: observed.signed_quantity(),
            });
        }

        let price = if observed.entry_price > Decimal::ZERO && !observed.is_flat() {
            observed.entry_price
        } else {
            self.reference_price().await
        };

        Ok(OrderFill {
            side: intent.side,
            quantity: intent.quantity,
            purpose: intent.purpose,
            price,
            reconciled: true,
        })
    }

    /// Last traded price, zero if unavailable
    async fn reference_price(&self) -> Decimal {
        match self.exchange.last_price(&self.symbol).await {
            Ok(price) => price,
            Err(e) => {
                tracing::warn!("Failed to fetch last price for {}: {}", self.symbol, e);
                Decimal::ZERO
            }
        }
    }
}

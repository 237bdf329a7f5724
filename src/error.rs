use rust_decimal::Decimal;
use thiserror::Error;

use crate::api::ExchangeError;
use crate::models::OrderSide;

/// Everything that can go wrong on the trading path
#[derive(Debug, Error)]
pub enum TradingError {
    /// Malformed price or candle; dropped without touching state
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Window not full yet; nothing to evaluate
    #[error("insufficient data: {have}/{need} samples")]
    InsufficientData { have: usize, need: usize },

    /// Bad sizing inputs or nothing tradable; the trade is skipped
    #[error("sizing error: {0}")]
    Sizing(String),

    /// Order timed out and the position did not show its effect
    #[error(
        "{side} {quantity} {symbol} timed out and was not confirmed \
         (expected position {expected}, observed {observed})"
    )]
    AmbiguousOrderOutcome {
        symbol: String,
        side: OrderSide,
        quantity: Decimal,
        expected: Decimal,
        observed: Decimal,
    },

    /// Order timed out and the position could not be read back; it may or may not have filled
    #[error(
        "{side} {quantity} {symbol} timed out with unknown outcome, \
         position re-query failed: {source}"
    )]
    OrderOutcomeUnknown {
        symbol: String,
        side: OrderSide,
        quantity: Decimal,
        #[source]
        source: ExchangeError,
    },

    /// Definitive exchange-side failure for an order
    #[error("{side} {quantity} {symbol} rejected: {source}")]
    OrderRejected {
        symbol: String,
        side: OrderSide,
        quantity: Decimal,
        #[source]
        source: ExchangeError,
    },

    #[error("exchange request failed: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("feed stale: no message for {age_secs}s")]
    FeedStale { age_secs: u64 },

    #[error("feed closed: {0}")]
    FeedClosed(String),

    #[error("fatal: {0}")]
    Fatal(String),
}

impl TradingError {
    /// Unrecoverable errors end the trading session (flatten, then restart)
    pub fn is_fatal(&self) -> bool {
        match self {
            TradingError::Fatal(_) | TradingError::FeedClosed(_) => true,
            TradingError::Exchange(e) => e.is_fatal(),
            TradingError::OrderRejected { source, .. }
            | TradingError::OrderOutcomeUnknown { source, .. } => source.is_fatal(),
            _ => false,
        }
    }
}

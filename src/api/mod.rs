pub mod binance;
pub mod telegram;

pub use binance::BinanceFuturesClient;
pub use telegram::TelegramSink;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{InstrumentRules, OrderResult, OrderSide, Position, StopLossSpec};

// Binance codes that no retry or restart can fix
const SIGNATURE_INVALID: i64 = -1022;
const REJECTED_MBX_KEY: i64 = -2014;
const INVALID_KEY_OR_PERMISSIONS: i64 = -2015;
// Binance: "Unknown error, please check your request or try again later."
const EXECUTION_STATUS_UNKNOWN: i64 = -1007;

/// Failure at the exchange boundary
#[derive(Debug, Clone, Error)]
pub enum ExchangeError {
    /// The request may or may not have been executed
    #[error("timed out: {0}")]
    Timeout(String),

    #[error("API error {code} (HTTP {status}): {message}")]
    Api {
        status: u16,
        code: i64,
        message: String,
    },

    /// The request never reached the exchange
    #[error("network error: {0}")]
    Network(String),

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ExchangeError {
    pub fn is_timeout(&self) -> bool {
        match self {
            ExchangeError::Timeout(_) => true,
            ExchangeError::Api { status, code, .. } => {
                *status == 503 || *status == 504 || *code == EXECUTION_STATUS_UNKNOWN
            }
            _ => false,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ExchangeError::Api { code, .. }
                if *code == SIGNATURE_INVALID
                    || *code == REJECTED_MBX_KEY
                    || *code == INVALID_KEY_OR_PERMISSIONS
        )
    }

    pub fn code(&self) -> Option<i64> {
        match self {
            ExchangeError::Api { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Authenticated futures exchange for a single account
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Wallet balance of the margin asset (USDT)
    async fn account_balance(&self) -> Result<Decimal, ExchangeError>;

    async fn position(&self, symbol: &str) -> Result<Position, ExchangeError>;

    async fn last_price(&self, symbol: &str) -> Result<Decimal, ExchangeError>;

    async fn instrument_rules(&self, symbol: &str) -> Result<InstrumentRules, ExchangeError>;

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), ExchangeError>;

    async fn set_isolated_margin(&self, symbol: &str) -> Result<(), ExchangeError>;

    async fn submit_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        reduce_only: bool,
    ) -> Result<OrderResult, ExchangeError>;

    async fn submit_stop_market_order(
        &self,
        symbol: &str,
        stop: &StopLossSpec,
    ) -> Result<OrderResult, ExchangeError>;

    /// Cancel every resting order for the symbol
    async fn cancel_open_orders(&self, symbol: &str) -> Result<(), ExchangeError>;
}

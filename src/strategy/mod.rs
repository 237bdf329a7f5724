// Trading strategy module
pub mod crossover;

pub use crossover::{MaCrossover, SignalReading};

use rust_decimal::Decimal;

use crate::error::TradingError;

/// Base trait for signal strategies
pub trait Strategy: Send + Sync {
    /// Classify the current direction from a window of closing prices (oldest first)
    ///
    /// Returns `TradingError::InsufficientData` until `min_samples_required` prices exist.
    fn evaluate(&self, prices: &[Decimal]) -> Result<SignalReading, TradingError>;

    /// Get strategy name
    fn name(&self) -> &str;

    /// Minimum prices required before a signal is produced
    fn min_samples_required(&self) -> usize;
}

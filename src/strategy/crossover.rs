use rust_decimal::Decimal;

use super::Strategy;
use crate::error::TradingError;
use crate::indicators::trailing_sum;
use crate::models::Signal;

/// Moving averages behind a signal, kept for logging and alerts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalReading {
    pub signal: Signal,
    pub short_ma: Decimal,
    pub long_ma: Decimal,
}

/// Dual simple-moving-average crossover
///
/// `Long` when the short MA is strictly above the long MA, otherwise `Short`.
/// An exact tie is `Short`: the engine only goes long on a positive spread.
/// The comparison uses cross-multiplied sums, never divided means.
#[derive(Debug, Clone)]
pub struct MaCrossover {
    short_window: usize,
    long_window: usize,
}

impl MaCrossover {
    pub fn new(short_window: usize, long_window: usize) -> Self {
        Self {
            short_window,
            long_window,
        }
    }

    pub fn short_window(&self) -> usize {
        self.short_window
    }

    pub fn long_window(&self) -> usize {
        self.long_window
    }

    /// short_sum / short_window > long_sum / long_window, without dividing
    fn classify(&self, short_sum: Decimal, long_sum: Decimal) -> Result<Signal, TradingError> {
        let overflow =
            || TradingError::InvalidInput("moving average sums overflow".to_string());
        let short_side = short_sum
            .checked_mul(Decimal::from(self.long_window))
            .ok_or_else(overflow)?;
        let long_side = long_sum
            .checked_mul(Decimal::from(self.short_window))
            .ok_or_else(overflow)?;

        if short_side > long_side {
            Ok(Signal::Long)
        } else {
            Ok(Signal::Short)
        }
    }

    fn sum_over(&self, prices: &[Decimal], period: usize) -> Result<Decimal, TradingError> {
        trailing_sum(prices, period).ok_or(TradingError::InsufficientData {
            have: prices.len(),
            need: period,
        })
    }
}

impl Strategy for MaCrossover {
    fn evaluate(&self, prices: &[Decimal]) -> Result<SignalReading, TradingError> {
        if prices.len() < self.min_samples_required() {
            return Err(TradingError::InsufficientData {
                have: prices.len(),
                need: self.min_samples_required(),
            });
        }

        let short_sum = self.sum_over(prices, self.short_window)?;
        let long_sum = self.sum_over(prices, self.long_window)?;

        Ok(SignalReading {
            signal: self.classify(short_sum, long_sum)?,
            short_ma: short_sum / Decimal::from(self.short_window),
            long_ma: long_sum / Decimal::from(self.long_window),
        })
    }

    fn name(&self) -> &str {
        "MaCrossover"
    }

    fn min_samples_required(&self) -> usize {
        self.long_window.max(self.short_window)
    }
}

use rust_decimal::Decimal;
use std::collections::VecDeque;

use crate::error::TradingError;

/// Rolling window of closing prices for one instrument
///
/// Holds at most `capacity` samples, oldest first. Owned by the controller;
/// never shared across tasks.
#[derive(Debug, Clone)]
pub struct PriceWindow {
    prices: VecDeque<Decimal>,
    capacity: usize,
}

impl PriceWindow {
    /// Create an empty window
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of prices to keep (the long MA period)
    pub fn new(capacity: usize) -> Self {
        Self {
            prices: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Append a closing price, evicting the oldest if the window is full
    ///
    /// Non-positive prices are rejected and leave the window untouched.
    pub fn push(&mut self, price: Decimal) -> Result<&[Decimal], TradingError> {
        if price <= Decimal::ZERO {
            return Err(TradingError::InvalidInput(format!(
                "closing price must be positive, got {}",
                price
            )));
        }

        self.prices.push_back(price);

        while self.prices.len() > self.capacity {
            self.prices.pop_front();
        }

        Ok(self.prices.make_contiguous())
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.prices.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<Decimal> {
        self.prices.back().copied()
    }

    /// Copy of the current contents, oldest first
    pub fn snapshot(&self) -> Vec<Decimal> {
        self.prices.iter().copied().collect()
    }
}

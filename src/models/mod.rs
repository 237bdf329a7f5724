use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Directional signal derived from the moving-average crossover
///
/// `None` only exists before the first full window has been evaluated.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum Signal {
    #[default]
    None,
    Long,
    Short,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Signal::None => "NONE",
            Signal::Long => "LONG",
            Signal::Short => "SHORT",
        };
        f.write_str(label)
    }
}

/// Side of the exchange-reported position
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PositionSide {
    Long,
    Short,
    Flat,
}

/// Exchange-reported position for one instrument
///
/// Always fetched fresh from the exchange; never cached between decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub side: PositionSide,
    pub quantity: Decimal, // Always non-negative
    pub entry_price: Decimal,
}

impl Position {
    pub fn flat() -> Self {
        Self {
            side: PositionSide::Flat,
            quantity: Decimal::ZERO,
            entry_price: Decimal::ZERO,
        }
    }

    /// Build from a signed exchange amount (positive = long, negative = short)
    pub fn from_signed(amount: Decimal, entry_price: Decimal) -> Self {
        let side = if amount > Decimal::ZERO {
            PositionSide::Long
        } else if amount < Decimal::ZERO {
            PositionSide::Short
        } else {
            PositionSide::Flat
        };

        Self {
            side,
            quantity: amount.abs(),
            entry_price,
        }
    }

    /// Signed amount: positive long, negative short, zero flat
    pub fn signed_quantity(&self) -> Decimal {
        match self.side {
            PositionSide::Long => self.quantity,
            PositionSide::Short => -self.quantity,
            PositionSide::Flat => Decimal::ZERO,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.side == PositionSide::Flat || self.quantity.is_zero()
    }

    /// Side of the order that would close this position
    pub fn closing_side(&self) -> Option<OrderSide> {
        match self.side {
            PositionSide::Long => Some(OrderSide::Sell),
            PositionSide::Short => Some(OrderSide::Buy),
            PositionSide::Flat => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    /// Effect of a fill of `quantity` on a signed position amount
    pub fn apply_to(self, position: Decimal, quantity: Decimal) -> Decimal {
        match self {
            OrderSide::Buy => position + quantity,
            OrderSide::Sell => position - quantity,
        }
    }

    /// Exchange wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an order is being submitted
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderPurpose {
    Open,
    Close,
    StopLoss,
}

impl fmt::Display for OrderPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OrderPurpose::Open => "open",
            OrderPurpose::Close => "close",
            OrderPurpose::StopLoss => "stop-loss",
        };
        f.write_str(label)
    }
}

/// A market order the controller wants filled within the current evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct OrderIntent {
    pub side: OrderSide,
    pub quantity: Decimal,
    pub purpose: OrderPurpose,
}

impl OrderIntent {
    pub fn open(side: OrderSide, quantity: Decimal) -> Self {
        Self {
            side,
            quantity,
            purpose: OrderPurpose::Open,
        }
    }

    pub fn close(side: OrderSide, quantity: Decimal) -> Self {
        Self {
            side,
            quantity,
            purpose: OrderPurpose::Close,
        }
    }

    /// Closing legs never add exposure
    pub fn reduce_only(&self) -> bool {
        self.purpose != OrderPurpose::Open
    }
}

/// Reduce-only stop-market order protecting a fresh entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopLossSpec {
    pub trigger_price: Decimal,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub reduce_only: bool,
}

/// Acknowledgement returned by the exchange for a submitted order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: String,
    pub client_order_id: String,
    pub status: String,
    pub executed_quantity: Decimal,
    pub average_price: Decimal, // Zero when the exchange did not report a fill price
}

/// Outcome of an order as seen by the controller
#[derive(Debug, Clone, PartialEq)]
pub struct OrderFill {
    pub side: OrderSide,
    pub quantity: Decimal,
    pub purpose: OrderPurpose,
    pub price: Decimal,
    /// True when the fill was confirmed by position reconciliation after a timeout
    pub reconciled: bool,
}

/// Lot and tick constraints for one instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentRules {
    pub lot_step: Decimal,
    pub min_quantity: Decimal,
    pub tick_size: Decimal,
}

/// One update from the kline stream
#[derive(Debug, Clone, PartialEq)]
pub struct CandleUpdate {
    pub open_time: DateTime<Utc>,
    pub close: Decimal,
    pub is_final: bool,
}

// Risk module: order sizing and protective stops
pub mod sizing;
pub mod stop_loss;

pub use sizing::{ceil_to_step, floor_to_step, size, SizingInputs};
pub use stop_loss::stop_loss_for_entry;

use rust_decimal::Decimal;
use std::str::FromStr;

use crate::error::TradingError;

/// Exact decimal for a configured float, via its shortest round-trip text
pub fn decimal_from_f64(value: f64) -> Result<Decimal, TradingError> {
    if !value.is_finite() {
        return Err(TradingError::InvalidInput(format!(
            "expected a finite number, got {}",
            value
        )));
    }
    Decimal::from_str(&value.to_string())
        .map_err(|e| TradingError::InvalidInput(format!("{} is not representable: {}", value, e)))
}

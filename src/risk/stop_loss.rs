use rust_decimal::Decimal;

use super::sizing::{ceil_to_step, floor_to_step};
use crate::error::TradingError;
use crate::models::{OrderSide, StopLossSpec};

/// Reduce-only stop for a position opened by an order on `entry_side`
///
/// Long entries get a sell stop `stop_loss_percent` below the entry price,
/// short entries a buy stop above it. The trigger is rounded away from the
/// entry onto the tick grid.
pub fn stop_loss_for_entry(
    entry_side: OrderSide,
    entry_price: Decimal,
    quantity: Decimal,
    stop_loss_percent: Decimal,
    tick_size: Decimal,
) -> Result<StopLossSpec, TradingError> {
    if entry_price <= Decimal::ZERO {
        return Err(TradingError::InvalidInput(format!(
            "entry price must be positive, got {}",
            entry_price
        )));
    }
    if quantity <= Decimal::ZERO {
        return Err(TradingError::InvalidInput(format!(
            "stop quantity must be positive, got {}",
            quantity
        )));
    }

    let offset = stop_loss_percent / Decimal::ONE_HUNDRED;
    let trigger_price = match entry_side {
        OrderSide::Buy => floor_to_step(entry_price * (Decimal::ONE - offset), tick_size)?,
        OrderSide::Sell => ceil_to_step(entry_price * (Decimal::ONE + offset), tick_size)?,
    };

    Ok(StopLossSpec {
        trigger_price,
        side: entry_side.opposite(),
        quantity,
        reduce_only: true,
    })
}

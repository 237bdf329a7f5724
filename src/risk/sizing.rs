use rust_decimal::Decimal;

use crate::error::TradingError;

/// Inputs for one sizing decision, all fetched fresh per evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct SizingInputs {
    pub equity: Decimal,
    pub usage_percent: Decimal,
    pub leverage: u32,
    pub price: Decimal,
    pub lot_step: Decimal,
    /// Exchange minimum order quantity; zero when unknown
    pub min_quantity: Decimal,
}

/// Round down to a multiple of `step`
pub fn floor_to_step(value: Decimal, step: Decimal) -> Result<Decimal, TradingError> {
    if step <= Decimal::ZERO {
        return Err(TradingError::Sizing(format!(
            "step must be positive, got {}",
            step
        )));
    }
    Ok((value / step).floor() * step)
}

/// Round up to a multiple of `step`
pub fn ceil_to_step(value: Decimal, step: Decimal) -> Result<Decimal, TradingError> {
    if step <= Decimal::ZERO {
        return Err(TradingError::Sizing(format!(
            "step must be positive, got {}",
            step
        )));
    }
    Ok((value / step).ceil() * step)
}

/// Order quantity for the configured share of equity at the given leverage
///
/// `floor_to_step(equity * usage% * leverage / price, lot_step)`. Never rounds up,
/// so the order cannot exceed the margin it was sized against.
pub fn size(inputs: &SizingInputs) -> Result<Decimal, TradingError> {
    if inputs.price <= Decimal::ZERO {
        return Err(TradingError::Sizing(format!(
            "price must be positive, got {}",
            inputs.price
        )));
    }
    if inputs.equity <= Decimal::ZERO {
        return Err(TradingError::Sizing(format!(
            "equity must be positive, got {}",
            inputs.equity
        )));
    }
    if inputs.usage_percent <= Decimal::ZERO || inputs.leverage == 0 {
        return Err(TradingError::Sizing(format!(
            "usage {}% at {}x leaves nothing to trade",
            inputs.usage_percent, inputs.leverage
        )));
    }

    let notional = inputs.equity * inputs.usage_percent / Decimal::ONE_HUNDRED
        * Decimal::from(inputs.leverage);
    let quantity = floor_to_step(notional / inputs.price, inputs.lot_step)?;

    if quantity <= Decimal::ZERO {
        return Err(TradingError::Sizing(format!(
            "quantity rounds to zero at price {} with lot step {}",
            inputs.price, inputs.lot_step
        )));
    }
    if quantity < inputs.min_quantity {
        return Err(TradingError::Sizing(format!(
            "quantity {} below exchange minimum {}",
            quantity, inputs.min_quantity
        )));
    }

    Ok(quantity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn inputs(equity: &str, price: &str) -> SizingInputs {
        SizingInputs {
            equity: dec(equity),
            usage_percent: dec("95"),
            leverage: 10,
            price: dec(price),
            lot_step: dec("0.001"),
            min_quantity: Decimal::ZERO,
        }
    }

    #[test]
    fn test_reference_sizing() {
        // 1000 * 0.95 * 10 / 100 = 95.000
        let quantity = size(&inputs("1000", "100")).unwrap();
        assert_eq!(quantity, dec("95.000"));
    }

    #[test]
    fn test_rounds_toward_zero() {
        // 1000 * 0.95 * 10 / 3 = 3166.6666.. -> 3166.666
        let quantity = size(&inputs("1000", "3")).unwrap();
        assert_eq!(quantity, dec("3166.666"));
    }

    #[test]
    fn test_rejects_bad_inputs() {
        assert!(matches!(size(&inputs("1000", "0")), Err(TradingError::Sizing(_))));
        assert!(matches!(size(&inputs("0", "100")), Err(TradingError::Sizing(_))));
        assert!(matches!(size(&inputs("-5", "100")), Err(TradingError::Sizing(_))));
    }

    #[test]
    fn test_rejects_zero_quantity() {
        // 0.001 * 0.95 * 10 / 100000 rounds to zero at step 0.001
        let result = size(&inputs("0.001", "100000"));
        assert!(matches!(result, Err(TradingError::Sizing(_))));
    }

    #[test]
    fn test_rejects_below_min_quantity() {
        let mut sizing = inputs("1000", "100");
        sizing.min_quantity = dec("100");
        assert!(matches!(size(&sizing), Err(TradingError::Sizing(_))));
    }

    #[test]
    fn test_step_rounding() {
        assert_eq!(floor_to_step(dec("1.2345"), dec("0.01")).unwrap(), dec("1.23"));
        assert_eq!(ceil_to_step(dec("1.2345"), dec("0.01")).unwrap(), dec("1.24"));
        assert_eq!(floor_to_step(dec("5"), dec("0.5")).unwrap(), dec("5"));
        assert!(floor_to_step(dec("1"), Decimal::ZERO).is_err());
    }
}

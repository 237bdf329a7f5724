use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::api::{Exchange, ExchangeError};
use crate::models::{Position, PositionSide};

/// Operator view of the account, computed on demand
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusReport {
    pub symbol: String,
    pub side: PositionSide,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub balance: Decimal,
    pub last_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub as_of: DateTime<Utc>,
}

/// `(last - entry) * signed quantity`; zero when flat
pub fn unrealized_pnl(position: &Position, last_price: Decimal) -> Decimal {
    if position.is_flat() {
        return Decimal::ZERO;
    }
    (last_price - position.entry_price) * position.signed_quantity()
}

/// Read-only snapshot of position, balance and price
pub async fn fetch_status(
    exchange: &dyn Exchange,
    symbol: &str,
) -> Result<StatusReport, ExchangeError> {
    let position = exchange.position(symbol).await?;
    let balance = exchange.account_balance().await?;
    let last_price = exchange.last_price(symbol).await?;

    Ok(StatusReport {
        symbol: symbol.to_string(),
        side: position.side,
        quantity: position.quantity,
        entry_price: position.entry_price,
        balance,
        unrealized_pnl: unrealized_pnl(&position, last_price),
        last_price,
        as_of: Utc::now(),
    })
}

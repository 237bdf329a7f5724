use rust_decimal::Decimal;

/// Exact sum of the most recent `period` prices
///
/// `None` when `period` is zero, fewer than `period` prices exist, or the sum overflows.
pub fn trailing_sum(prices: &[Decimal], period: usize) -> Option<Decimal> {
    if period == 0 || prices.len() < period {
        return None;
    }

    prices[prices.len() - period..]
        .iter()
        .try_fold(Decimal::ZERO, |acc, price| acc.checked_add(*price))
}

/// Calculate Simple Moving Average (SMA) over the most recent `period` prices
pub fn calculate_sma(prices: &[Decimal], period: usize) -> Option<Decimal> {
    let sum = trailing_sum(prices, period)?;
    sum.checked_div(Decimal::from(period))
}

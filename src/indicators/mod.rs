// Technical indicators module
// Simple moving averages over closing prices

pub mod moving_average;

pub use moving_average::{calculate_sma, trailing_sum};

// Trading state machine, order execution and market data feed
pub mod controller;
pub mod order_executor;
pub mod price_feed;
pub mod price_window;
pub mod supervisor;

pub use controller::{decide, Controller, Evaluation, TradeAction, TradeDecision};
pub use order_executor::OrderExecutor;
pub use price_feed::{parse_kline_message, PriceFeed};
pub use price_window::PriceWindow;
pub use supervisor::{ConnectionSupervisor, FeedHealth};

// Core modules
pub mod api;
pub mod config;
pub mod error;
pub mod execution;
pub mod health;
pub mod indicators;
pub mod models;
pub mod notify;
pub mod risk;
pub mod strategy;

// Re-export commonly used types
pub use api::{Exchange, ExchangeError};
pub use config::{Credentials, Settings, TradingMode};
pub use error::TradingError;
pub use models::*;
pub use notify::{NotificationSink, Notifier};
pub use strategy::Strategy;

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

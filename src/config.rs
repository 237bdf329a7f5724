use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const BINANCE_FUTURES_REST: &str = "https://fapi.binance.com";
const BINANCE_FUTURES_WS: &str = "wss://fstream.binance.com/ws";

/// What the bot does on a signal change
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    /// Place orders
    Trade,
    /// Only notify the operator
    Alert,
}

/// Static process configuration, built once at startup
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub symbol: String,
    pub interval: String,
    pub short_window: usize,
    pub long_window: usize,
    pub leverage: u32,
    pub usage_percent: f64,
    pub stop_loss_percent: f64,
    pub feed_stale_threshold_secs: u64,
    pub supervisor_interval_secs: u64,
    pub reconnect_delay_secs: u64,
    pub restart_delay_secs: u64,
    pub order_reconcile_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub notify_queue_capacity: usize,
    pub notify_timeout_secs: u64,
    /// Feed non-final candle updates to the controller as well
    pub evaluate_open_candles: bool,
    /// Open a position on an unchanged signal when the exchange reports flat
    pub reenter_when_flat: bool,
    pub mode: TradingMode,
    /// 0 disables the health server
    pub health_port: u16,
    pub rest_base_url: String,
    pub ws_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            symbol: "LTCUSDT".to_string(),
            interval: "5m".to_string(),
            short_window: 7,
            long_window: 30,
            leverage: 10,
            usage_percent: 95.0,
            stop_loss_percent: 2.0,
            feed_stale_threshold_secs: 60,
            supervisor_interval_secs: 10,
            reconnect_delay_secs: 5,
            restart_delay_secs: 30,
            order_reconcile_delay_ms: 2000,
            request_timeout_secs: 10,
            notify_queue_capacity: 64,
            notify_timeout_secs: 5,
            evaluate_open_candles: false,
            reenter_when_flat: false,
            mode: TradingMode::Trade,
            health_port: 8080,
            rest_base_url: BINANCE_FUTURES_REST.to_string(),
            ws_url: BINANCE_FUTURES_WS.to_string(),
        }
    }
}

impl Settings {
    /// Load settings: defaults, then the optional TOML file, then `CROSSBOT_*` env vars
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = Settings::default();

        let mut builder = config::Config::builder()
            .set_default("symbol", defaults.symbol.clone())?
            .set_default("interval", defaults.interval.clone())?
            .set_default("short_window", defaults.short_window as u64)?
            .set_default("long_window", defaults.long_window as u64)?
            .set_default("leverage", defaults.leverage as u64)?
            .set_default("usage_percent", defaults.usage_percent)?
            .set_default("stop_loss_percent", defaults.stop_loss_percent)?
            .set_default("feed_stale_threshold_secs", defaults.feed_stale_threshold_secs)?
            .set_default("supervisor_interval_secs", defaults.supervisor_interval_secs)?
            .set_default("reconnect_delay_secs", defaults.reconnect_delay_secs)?
            .set_default("restart_delay_secs", defaults.restart_delay_secs)?
            .set_default("order_reconcile_delay_ms", defaults.order_reconcile_delay_ms)?
            .set_default("request_timeout_secs", defaults.request_timeout_secs)?
            .set_default("notify_queue_capacity", defaults.notify_queue_capacity as u64)?
            .set_default("notify_timeout_secs", defaults.notify_timeout_secs)?
            .set_default("evaluate_open_candles", defaults.evaluate_open_candles)?
            .set_default("reenter_when_flat", defaults.reenter_when_flat)?
            .set_default("mode", "trade")?
            .set_default("health_port", defaults.health_port as u64)?
            .set_default("rest_base_url", defaults.rest_base_url.clone())?
            .set_default("ws_url", defaults.ws_url.clone())?;

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let settings: Settings = builder
            .add_source(config::Environment::with_prefix("CROSSBOT").try_parsing(true))
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.symbol.trim().is_empty() {
            bail!("symbol must not be empty");
        }
        if self.short_window == 0 {
            bail!("short_window must be at least 1");
        }
        if self.short_window >= self.long_window {
            bail!(
                "short_window ({}) must be smaller than long_window ({})",
                self.short_window,
                self.long_window
            );
        }
        if !(1..=125).contains(&self.leverage) {
            bail!("leverage must be between 1 and 125, got {}", self.leverage);
        }
        if !(self.usage_percent > 0.0 && self.usage_percent <= 100.0) {
            bail!("usage_percent must be in (0, 100], got {}", self.usage_percent);
        }
        if !(self.stop_loss_percent > 0.0 && self.stop_loss_percent < 100.0) {
            bail!(
                "stop_loss_percent must be in (0, 100), got {}",
                self.stop_loss_percent
            );
        }
        if self.feed_stale_threshold_secs == 0 || self.supervisor_interval_secs == 0 {
            bail!("feed staleness threshold and supervisor interval must be positive");
        }
        if self.notify_queue_capacity == 0 {
            bail!("notify_queue_capacity must be at least 1");
        }
        Ok(())
    }

    /// Stream name for the kline subscription, e.g. `ltcusdt@kline_5m`
    pub fn kline_stream(&self) -> String {
        format!("{}@kline_{}", self.symbol.to_lowercase(), self.interval)
    }

    pub fn reconcile_delay(&self) -> Duration {
        Duration::from_millis(self.order_reconcile_delay_ms)
    }

    pub fn stale_threshold(&self) -> Duration {
        Duration::from_secs(self.feed_stale_threshold_secs)
    }
}

/// Secrets, read from the environment only
#[derive(Clone, Default)]
pub struct Credentials {
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub telegram_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        let read = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            api_key: read("BINANCE_API_KEY"),
            api_secret: read("BINANCE_API_SECRET"),
            telegram_token: read("TELEGRAM_TOKEN"),
            telegram_chat_id: read("TELEGRAM_CHAT_ID"),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("api_secret", &self.api_secret.as_ref().map(|_| "***"))
            .field("telegram_token", &self.telegram_token.as_ref().map(|_| "***"))
            .field("telegram_chat_id", &self.telegram_chat_id)
            .finish()
    }
}

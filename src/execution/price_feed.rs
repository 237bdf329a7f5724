use chrono::{DateTime, TimeZone, Utc};
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

use super::FeedHealth;
use crate::error::TradingError;
use crate::models::CandleUpdate;
use crate::notify::Notifier;

/// Binance kline stream event
#[derive(Debug, Deserialize)]
struct KlineEvent {
    #[serde(rename = "e")]
    event_type: String,
    #[serde(rename = "k")]
    kline: KlinePayload,
}

#[derive(Debug, Deserialize)]
struct KlinePayload {
    #[serde(rename = "t")]
    open_time: i64,
    #[serde(rename = "c")]
    close: String,
    #[serde(rename = "x")]
    is_final: bool,
}

/// Parse one text frame from the kline stream
///
/// Returns `Ok(None)` for frames that are not kline events (subscription acks).
pub fn parse_kline_message(text: &str) -> Result<Option<CandleUpdate>, TradingError> {
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| TradingError::InvalidInput(format!("malformed frame: {}", e)))?;

    if value.get("k").is_none() {
        return Ok(None);
    }

    let event: KlineEvent = serde_json::from_value(value)
        .map_err(|e| TradingError::InvalidInput(format!("malformed kline: {}", e)))?;
    if event.event_type != "kline" {
        return Ok(None);
    }

    let close = Decimal::from_str(&event.kline.close).map_err(|_| {
        TradingError::InvalidInput(format!("unparseable close price {:?}", event.kline.close))
    })?;
    if close <= Decimal::ZERO {
        return Err(TradingError::InvalidInput(format!(
            "close price must be positive, got {}",
            close
        )));
    }

    let open_time: DateTime<Utc> = Utc
        .timestamp_millis_opt(event.kline.open_time)
        .single()
        .ok_or_else(|| {
            TradingError::InvalidInput(format!("bad open time {}", event.kline.open_time))
        })?;

    Ok(Some(CandleUpdate {
        open_time,
        close,
        is_final: event.kline.is_final,
    }))
}

/// Kline WebSocket feed with an unbounded fixed-delay reconnect loop
pub struct PriceFeed {
    ws_url: String,
    stream: String,
    symbol: String,
    interval: String,
    reconnect_delay: Duration,
    health: FeedHealth,
    force_close: Arc<Notify>,
    notifier: Notifier,
}

impl PriceFeed {
    pub fn new(
        ws_url: impl Into<String>,
        symbol: impl Into<String>,
        interval: impl Into<String>,
        reconnect_delay: Duration,
        health: FeedHealth,
        force_close: Arc<Notify>,
        notifier: Notifier,
    ) -> Self {
        let symbol = symbol.into();
        let interval = interval.into();
        Self {
            ws_url: ws_url.into(),
            stream: format!("{}@kline_{}", symbol.to_lowercase(), interval),
            symbol,
            interval,
            reconnect_delay,
            health,
            force_close,
            notifier,
        }
    }

    /// Deliver candles until the receiving controller goes away
    pub async fn run(self, candles: mpsc::Sender<CandleUpdate>) {
        tracing::info!("🔄 Price feed starting for {}", self.stream);

        loop {
            let reason = match self.connect_and_stream(&candles).await {
                Ok(reason) => reason,
                Err(e) => e,
            };

            if candles.is_closed() {
                tracing::info!("Controller gone, price feed stopping");
                return;
            }

            tracing::warn!(
                "WebSocket {}, reconnecting in {:?}...",
                reason,
                self.reconnect_delay
            );
            self.notifier.notify(format!(
                "⚠️ Trading bot disconnected from WebSocket for {} ({}).",
                self.symbol, reason
            ));
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }

    /// One connection lifetime; returns why it ended
    ///
    /// A forced close from the supervisor ends the attempt at any stage,
    /// including a connect or subscribe that never completes.
    async fn connect_and_stream(
        &self,
        candles: &mpsc::Sender<CandleUpdate>,
    ) -> Result<TradingError, TradingError> {
        let closed = self.force_close.notified();
        tokio::pin!(closed);

        let connected = tokio::select! {
            _ = &mut closed => return Ok(self.forced_close()),
            result = connect_async(self.ws_url.as_str()) => result,
        };
        let (ws_stream, _) =
            connected.map_err(|e| TradingError::FeedClosed(format!("connect failed: {}", e)))?;
        let (mut write, mut read) = ws_stream.split();

        let subscribe = serde_json::json!({
            "method": "SUBSCRIBE",
            "params": [self.stream],
            "id": 1
        });
        let subscribed = tokio::select! {
            _ = &mut closed => return Ok(self.forced_close()),
            result = write.send(Message::Text(subscribe.to_string())) => result,
        };
        subscribed.map_err(|e| TradingError::FeedClosed(format!("subscribe failed: {}", e)))?;

        self.health.touch();
        tracing::info!("✅ WebSocket connected, subscribed to {}", self.stream);
        self.notifier.notify(format!(
            "✅ Trading bot connected to WebSocket for {} on {} timeframe.",
            self.symbol, self.interval
        ));

        loop {
            tokio::select! {
                _ = &mut closed => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(self.forced_close());
                }
                frame = read.next() => {
                    let frame = match frame {
                        Some(Ok(frame)) => frame,
                        Some(Err(e)) => return Ok(TradingError::FeedClosed(e.to_string())),
                        None => return Ok(TradingError::FeedClosed("stream ended".to_string())),
                    };
                    self.health.touch();

                    match frame {
                        Message::Text(text) => self.handle_text(&text, candles).await?,
                        Message::Ping(payload) => {
                            if let Err(e) = write.send(Message::Pong(payload)).await {
                                return Ok(TradingError::FeedClosed(format!("pong failed: {}", e)));
                            }
                        }
                        Message::Close(frame) => {
                            return Ok(TradingError::FeedClosed(format!("closed by server: {:?}", frame)));
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    fn forced_close(&self) -> TradingError {
        let age_ms = self.health.age_ms(Utc::now().timestamp_millis());
        TradingError::FeedStale {
            age_secs: (age_ms / 1000) as u64,
        }
    }

    async fn handle_text(
        &self,
        text: &str,
        candles: &mpsc::Sender<CandleUpdate>,
    ) -> Result<(), TradingError> {
        match parse_kline_message(text) {
            Ok(Some(candle)) => candles
                .send(candle)
                .await
                .map_err(|_| TradingError::FeedClosed("controller stopped".to_string())),
            Ok(None) => Ok(()),
            Err(e) => {
                tracing::warn!("Dropped feed message: {}", e);
                Ok(())
            }
        }
    }
}

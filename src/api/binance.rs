use async_trait::async_trait;
use chrono::Utc;
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::{Exchange, ExchangeError};
use crate::models::{InstrumentRules, OrderResult, OrderSide, Position, StopLossSpec};

const RECV_WINDOW_MS: u64 = 5000;
const MARGIN_ASSET: &str = "USDT";
// Binance: "No need to change margin type."
const MARGIN_TYPE_UNCHANGED: i64 = -4046;

// Stays well under the 2400 weight/minute account limit
const REQUESTS_PER_SECOND: NonZeroU32 = match NonZeroU32::new(10) {
    Some(n) => n,
    None => panic!("rate limit must be non-zero"),
};

type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Binance USDⓈ-M futures REST client
///
/// Cloneable; all clones share the same rate limiter.
#[derive(Clone)]
pub struct BinanceFuturesClient {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    rate_limiter: Arc<BinanceRateLimiter>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceEntry {
    asset: String,
    balance: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionRisk {
    symbol: String,
    position_amt: Decimal,
    entry_price: Decimal,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: Decimal,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
struct SymbolInfo {
    symbol: String,
    filters: Vec<SymbolFilter>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "filterType")]
enum SymbolFilter {
    #[serde(rename = "LOT_SIZE", rename_all = "camelCase")]
    LotSize { step_size: Decimal, min_qty: Decimal },
    #[serde(rename = "PRICE_FILTER", rename_all = "camelCase")]
    PriceFilter { tick_size: Decimal },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: i64,
    client_order_id: String,
    status: String,
    #[serde(default)]
    executed_qty: Option<Decimal>,
    #[serde(default)]
    avg_price: Option<Decimal>,
}

impl From<OrderResponse> for OrderResult {
    fn from(response: OrderResponse) -> Self {
        OrderResult {
            order_id: response.order_id.to_string(),
            client_order_id: response.client_order_id,
            status: response.status,
            executed_quantity: response.executed_qty.unwrap_or_default(),
            average_price: response.avg_price.unwrap_or_default(),
        }
    }
}

impl BinanceFuturesClient {
    /// Create a client
    ///
    /// # Arguments
    /// * `base_url` - REST root, e.g. `https://fapi.binance.com`
    /// * `request_timeout` - Per-request timeout; expiry is reported as an ambiguous outcome
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, ExchangeError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ExchangeError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_second(REQUESTS_PER_SECOND))),
        })
    }

    /// HMAC-SHA256 of the query string, hex encoded
    fn sign(&self, query: &str) -> Result<String, ExchangeError> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.api_secret.as_bytes())
            .map_err(|e| ExchangeError::Decode(format!("invalid API secret: {}", e)))?;
        mac.update(query.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    async fn signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ExchangeError> {
        let mut query = build_query(params);
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str(&format!(
            "recvWindow={}&timestamp={}",
            RECV_WINDOW_MS,
            Utc::now().timestamp_millis()
        ));
        let signature = self.sign(&query)?;
        let url = format!("{}{}?{}&signature={}", self.base_url, path, query, signature);

        self.rate_limiter.until_ready().await;
        let response = self
            .client
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(classify_transport_error)?;

        decode_response(response).await
    }

    async fn public<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ExchangeError> {
        let query = build_query(params);
        let url = if query.is_empty() {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}{}?{}", self.base_url, path, query)
        };

        self.rate_limiter.until_ready().await;
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(classify_transport_error)?;

        decode_response(response).await
    }
}

fn build_query(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Connect failures never reached the exchange; anything later may have
fn classify_transport_error(e: reqwest::Error) -> ExchangeError {
    if e.is_connect() {
        ExchangeError::Network(e.to_string())
    } else {
        ExchangeError::Timeout(e.to_string())
    }
}

async fn decode_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ExchangeError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ExchangeError::Timeout(format!("failed to read response body: {}", e)))?;

    if !status.is_success() {
        if status == StatusCode::SERVICE_UNAVAILABLE || status == StatusCode::GATEWAY_TIMEOUT {
            return Err(ExchangeError::Timeout(format!("HTTP {}: {}", status, body)));
        }
        return Err(match serde_json::from_str::<ApiErrorBody>(&body) {
            Ok(err) => ExchangeError::Api {
                status: status.as_u16(),
                code: err.code,
                message: err.msg,
            },
            Err(_) => ExchangeError::Api {
                status: status.as_u16(),
                code: 0,
                message: body,
            },
        });
    }

    serde_json::from_str(&body)
        .map_err(|e| ExchangeError::Decode(format!("{} in response: {}", e, body)))
}

fn format_decimal(value: Decimal) -> String {
    value.normalize().to_string()
}

#[async_trait]
impl Exchange for BinanceFuturesClient {
    async fn account_balance(&self) -> Result<Decimal, ExchangeError> {
        let balances: Vec<BalanceEntry> = self.signed(Method::GET, "/fapi/v2/balance", &[]).await?;

        Ok(balances
            .into_iter()
            .find(|b| b.asset == MARGIN_ASSET)
            .map(|b| b.balance)
            .unwrap_or_default())
    }

    async fn position(&self, symbol: &str) -> Result<Position, ExchangeError> {
        let risks: Vec<PositionRisk> = self
            .signed(
                Method::GET,
                "/fapi/v2/positionRisk",
                &[("symbol", symbol.to_string())],
            )
            .await?;

        Ok(risks
            .into_iter()
            .find(|r| r.symbol == symbol)
            .map(|r| Position::from_signed(r.position_amt, r.entry_price))
            .unwrap_or_else(Position::flat))
    }

    async fn last_price(&self, symbol: &str) -> Result<Decimal, ExchangeError> {
        let ticker: TickerPrice = self
            .public("/fapi/v1/ticker/price", &[("symbol", symbol.to_string())])
            .await?;
        Ok(ticker.price)
    }

    async fn instrument_rules(&self, symbol: &str) -> Result<InstrumentRules, ExchangeError> {
        let info: ExchangeInfo = self.public("/fapi/v1/exchangeInfo", &[]).await?;

        let symbol_info = info
            .symbols
            .into_iter()
            .find(|s| s.symbol == symbol)
            .ok_or_else(|| ExchangeError::Decode(format!("symbol {} not listed", symbol)))?;

        let mut lot = None;
        let mut tick = None;
        for filter in symbol_info.filters {
            match filter {
                SymbolFilter::LotSize { step_size, min_qty } => lot = Some((step_size, min_qty)),
                SymbolFilter::PriceFilter { tick_size } => tick = Some(tick_size),
                SymbolFilter::Other => {}
            }
        }

        let (lot_step, min_quantity) = lot
            .ok_or_else(|| ExchangeError::Decode(format!("{} has no LOT_SIZE filter", symbol)))?;
        let tick_size = tick
            .ok_or_else(|| ExchangeError::Decode(format!("{} has no PRICE_FILTER", symbol)))?;

        Ok(InstrumentRules {
            lot_step,
            min_quantity,
            tick_size,
        })
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), ExchangeError> {
        let _: serde_json::Value = self
            .signed(
                Method::POST,
                "/fapi/v1/leverage",
                &[
                    ("symbol", symbol.to_string()),
                    ("leverage", leverage.to_string()),
                ],
            )
            .await?;
        Ok(())
    }

    async fn set_isolated_margin(&self, symbol: &str) -> Result<(), ExchangeError> {
        let result: Result<serde_json::Value, _> = self
            .signed(
                Method::POST,
                "/fapi/v1/marginType",
                &[
                    ("symbol", symbol.to_string()),
                    ("marginType", "ISOLATED".to_string()),
                ],
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.code() == Some(MARGIN_TYPE_UNCHANGED) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn submit_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        reduce_only: bool,
    ) -> Result<OrderResult, ExchangeError> {
        let mut params = vec![
            ("symbol", symbol.to_string()),
            ("side", side.as_str().to_string()),
            ("type", "MARKET".to_string()),
            ("quantity", format_decimal(quantity)),
            ("newOrderRespType", "RESULT".to_string()),
            ("newClientOrderId", Uuid::new_v4().simple().to_string()),
        ];
        if reduce_only {
            params.push(("reduceOnly", "true".to_string()));
        }

        let response: OrderResponse = self.signed(Method::POST, "/fapi/v1/order", &params).await?;
        Ok(response.into())
    }

    async fn submit_stop_market_order(
        &self,
        symbol: &str,
        stop: &StopLossSpec,
    ) -> Result<OrderResult, ExchangeError> {
        let params = vec![
            ("symbol", symbol.to_string()),
            ("side", stop.side.as_str().to_string()),
            ("type", "STOP_MARKET".to_string()),
            ("stopPrice", format_decimal(stop.trigger_price)),
            ("quantity", format_decimal(stop.quantity)),
            ("reduceOnly", stop.reduce_only.to_string()),
            ("workingType", "MARK_PRICE".to_string()),
            ("newClientOrderId", Uuid::new_v4().simple().to_string()),
        ];

        let response: OrderResponse = self.signed(Method::POST, "/fapi/v1/order", &params).await?;
        Ok(response.into())
    }

    async fn cancel_open_orders(&self, symbol: &str) -> Result<(), ExchangeError> {
        let _: serde_json::Value = self
            .signed(
                Method::DELETE,
                "/fapi/v1/allOpenOrders",
                &[("symbol", symbol.to_string())],
            )
            .await?;
        Ok(())
    }
}

use crossbot::api::{BinanceFuturesClient, Exchange, ExchangeError, TelegramSink};
use crossbot::models::{OrderSide, PositionSide, StopLossSpec};
use crossbot::notify::NotificationSink;
use mockito::{Matcher, Server, ServerGuard};
use rust_decimal_macros::dec;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

const API_KEY: &str = "test-key";

fn client(server: &ServerGuard) -> BinanceFuturesClient {
    BinanceFuturesClient::new(server.url(), API_KEY, "test-secret", Duration::from_secs(5)).unwrap()
}

/// Query of a signed request: caller params plus recvWindow, timestamp and signature
fn signed_query(params: &[(&str, &str)]) -> Matcher {
    let mut matchers: Vec<Matcher> = params
        .iter()
        .map(|(k, v)| Matcher::UrlEncoded(k.to_string(), v.to_string()))
        .collect();
    matchers.push(Matcher::UrlEncoded("recvWindow".into(), "5000".into()));
    matchers.push(Matcher::Regex("timestamp=\\d+".into()));
    matchers.push(Matcher::Regex("signature=[0-9a-f]{64}$".into()));
    Matcher::AllOf(matchers)
}

#[tokio::test]
async fn test_last_price() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/fapi/v1/ticker/price")
        .match_query(Matcher::UrlEncoded("symbol".into(), "LTCUSDT".into()))
        .with_status(200)
        .with_body(r#"{"symbol":"LTCUSDT","price":"71.25","time":1700000000000}"#)
        .create_async()
        .await;

    let price = assert_ok!(client(&server).last_price("LTCUSDT").await);
    assert_eq!(price, dec!(71.25));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_position_is_signed_and_authenticated() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/fapi/v2/positionRisk")
        .match_header("X-MBX-APIKEY", API_KEY)
        .match_query(signed_query(&[("symbol", "LTCUSDT")]))
        .with_status(200)
        .with_body(
            r#"[{"symbol":"LTCUSDT","positionAmt":"-1.250","entryPrice":"70.10",
                 "markPrice":"70.00","unRealizedProfit":"0.125","positionSide":"BOTH"}]"#,
        )
        .create_async()
        .await;

    let position = assert_ok!(client(&server).position("LTCUSDT").await);
    assert_eq!(position.side, PositionSide::Short);
    assert_eq!(position.quantity, dec!(1.25));
    assert_eq!(position.entry_price, dec!(70.10));
    assert_eq!(position.signed_quantity(), dec!(-1.25));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_missing_position_is_flat() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/fapi/v2/positionRisk")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;

    let position = assert_ok!(client(&server).position("LTCUSDT").await);
    assert!(position.is_flat());
}

#[tokio::test]
async fn test_balance_picks_usdt() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/fapi/v2/balance")
        .match_query(signed_query(&[]))
        .with_status(200)
        .with_body(
            r#"[{"asset":"BNB","balance":"0.5"},
                {"asset":"USDT","balance":"1234.56","availableBalance":"1000.00"}]"#,
        )
        .create_async()
        .await;

    let balance = assert_ok!(client(&server).account_balance().await);
    assert_eq!(balance, dec!(1234.56));
}

#[tokio::test]
async fn test_instrument_rules() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/fapi/v1/exchangeInfo")
        .with_status(200)
        .with_body(
            r#"{"timezone":"UTC","symbols":[
                {"symbol":"BTCUSDT","filters":[
                    {"filterType":"LOT_SIZE","stepSize":"0.001","minQty":"0.001","maxQty":"1000"},
                    {"filterType":"PRICE_FILTER","tickSize":"0.10","minPrice":"556.80","maxPrice":"4529764"}]},
                {"symbol":"LTCUSDT","filters":[
                    {"filterType":"PRICE_FILTER","tickSize":"0.01","minPrice":"3.61","maxPrice":"10000"},
                    {"filterType":"MARKET_LOT_SIZE","stepSize":"0.001","minQty":"0.001","maxQty":"5000"},
                    {"filterType":"LOT_SIZE","stepSize":"0.001","minQty":"0.001","maxQty":"10000"},
                    {"filterType":"MIN_NOTIONAL","notional":"20"}]}]}"#,
        )
        .create_async()
        .await;

    let rules = assert_ok!(client(&server).instrument_rules("LTCUSDT").await);
    assert_eq!(rules.lot_step, dec!(0.001));
    assert_eq!(rules.min_quantity, dec!(0.001));
    assert_eq!(rules.tick_size, dec!(0.01));

    let error = assert_err!(client(&server).instrument_rules("DOGEUSDT").await);
    assert!(matches!(error, ExchangeError::Decode(_)));
}

#[tokio::test]
async fn test_market_order_params() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/fapi/v1/order")
        .match_header("X-MBX-APIKEY", API_KEY)
        .match_query(signed_query(&[
            ("symbol", "LTCUSDT"),
            ("side", "SELL"),
            ("type", "MARKET"),
            ("quantity", "1.5"),
            ("reduceOnly", "true"),
        ]))
        .with_status(200)
        .with_body(
            r#"{"orderId":8886774,"symbol":"LTCUSDT","status":"FILLED",
                "clientOrderId":"abc123","executedQty":"1.500","avgPrice":"70.52"}"#,
        )
        .create_async()
        .await;

    let ack = assert_ok!(
        client(&server)
            .submit_market_order("LTCUSDT", OrderSide::Sell, dec!(1.500), true)
            .await
    );
    assert_eq!(ack.order_id, "8886774");
    assert_eq!(ack.executed_quantity, dec!(1.5));
    assert_eq!(ack.average_price, dec!(70.52));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_stop_market_order_params() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/fapi/v1/order")
        .match_query(signed_query(&[
            ("side", "BUY"),
            ("type", "STOP_MARKET"),
            ("stopPrice", "91.8"),
            ("quantity", "2"),
            ("reduceOnly", "true"),
            ("workingType", "MARK_PRICE"),
        ]))
        .with_status(200)
        .with_body(r#"{"orderId":42,"clientOrderId":"def456","status":"NEW"}"#)
        .create_async()
        .await;

    let stop = StopLossSpec {
        trigger_price: dec!(91.80),
        side: OrderSide::Buy,
        quantity: dec!(2),
        reduce_only: true,
    };
    let ack = assert_ok!(client(&server).submit_stop_market_order("LTCUSDT", &stop).await);
    assert_eq!(ack.status, "NEW");
    assert_eq!(ack.average_price, dec!(0));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_unavailable_is_ambiguous() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/fapi/v1/order")
        .match_query(Matcher::Any)
        .with_status(503)
        .with_body("Service Unavailable")
        .create_async()
        .await;

    let error = assert_err!(
        client(&server)
            .submit_market_order("LTCUSDT", OrderSide::Buy, dec!(1), false)
            .await
    );
    assert!(error.is_timeout());
    assert!(!error.is_fatal());
}

#[tokio::test]
async fn test_unknown_execution_status_is_ambiguous() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/fapi/v1/order")
        .match_query(Matcher::Any)
        .with_status(408)
        .with_body(r#"{"code":-1007,"msg":"Timeout waiting for response from backend server."}"#)
        .create_async()
        .await;

    let error = assert_err!(
        client(&server)
            .submit_market_order("LTCUSDT", OrderSide::Buy, dec!(1), false)
            .await
    );
    assert_eq!(error.code(), Some(-1007));
    assert!(error.is_timeout());
}

#[tokio::test]
async fn test_invalid_key_is_fatal() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/fapi/v2/balance")
        .match_query(Matcher::Any)
        .with_status(401)
        .with_body(r#"{"code":-2015,"msg":"Invalid API-key, IP, or permissions for action."}"#)
        .create_async()
        .await;

    let error = assert_err!(client(&server).account_balance().await);
    assert!(error.is_fatal());
    assert!(!error.is_timeout());
}

#[tokio::test]
async fn test_unchanged_margin_type_is_ok() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/fapi/v1/marginType")
        .match_query(signed_query(&[("marginType", "ISOLATED")]))
        .with_status(400)
        .with_body(r#"{"code":-4046,"msg":"No need to change margin type."}"#)
        .create_async()
        .await;

    assert_ok!(client(&server).set_isolated_margin("LTCUSDT").await);
}

#[tokio::test]
async fn test_other_margin_errors_surface() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/fapi/v1/marginType")
        .match_query(Matcher::Any)
        .with_status(400)
        .with_body(r#"{"code":-4048,"msg":"Margin type cannot be changed if there exists position."}"#)
        .create_async()
        .await;

    let error = assert_err!(client(&server).set_isolated_margin("LTCUSDT").await);
    assert_eq!(error.code(), Some(-4048));
}

#[tokio::test]
async fn test_cancel_open_orders() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("DELETE", "/fapi/v1/allOpenOrders")
        .match_query(signed_query(&[("symbol", "LTCUSDT")]))
        .with_status(200)
        .with_body(r#"{"code":200,"msg":"The operation of cancel all open order is done."}"#)
        .create_async()
        .await;

    assert_ok!(client(&server).cancel_open_orders("LTCUSDT").await);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_telegram_sink_posts_message() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/bottoken123/sendMessage")
        .match_body(Matcher::Json(serde_json::json!({
            "chat_id": "42",
            "text": "Signal changed to: LONG (LTCUSDT)"
        })))
        .with_status(200)
        .with_body(r#"{"ok":true}"#)
        .create_async()
        .await;

    let sink = TelegramSink::with_base_url(server.url(), "token123", "42").unwrap();
    assert_ok!(sink.send("Signal changed to: LONG (LTCUSDT)").await);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_telegram_error_status_fails() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/bottoken123/sendMessage")
        .with_status(403)
        .with_body(r#"{"ok":false,"description":"Forbidden: bot was blocked by the user"}"#)
        .create_async()
        .await;

    let sink = TelegramSink::with_base_url(server.url(), "token123", "42").unwrap();
    assert_err!(sink.send("hello").await);
}

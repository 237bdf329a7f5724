//! Liveness check and operator status over HTTP
//!
//! - `/health` - 200 while the controller runs and the feed is fresh, else 503
//! - `/status` - position, balance, last price and unrealized PnL, fetched on demand

pub mod status;

pub use status::{fetch_status, unrealized_pnl, StatusReport};

use chrono::Utc;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::api::Exchange;
use crate::execution::FeedHealth;

/// Shared liveness flags, updated by the session and the feed
#[derive(Clone)]
pub struct Liveness {
    controller_active: Arc<AtomicBool>,
    feed: FeedHealth,
    stale_threshold: Duration,
}

impl Liveness {
    pub fn new(feed: FeedHealth, stale_threshold: Duration) -> Self {
        Self {
            controller_active: Arc::new(AtomicBool::new(false)),
            feed,
            stale_threshold,
        }
    }

    pub fn set_controller_active(&self, active: bool) {
        self.controller_active.store(active, Ordering::Release);
    }

    pub fn is_alive(&self) -> bool {
        self.controller_active.load(Ordering::Acquire)
            && !self
                .feed
                .is_stale(Utc::now().timestamp_millis(), self.stale_threshold)
    }

    pub fn feed(&self) -> &FeedHealth {
        &self.feed
    }
}

#[derive(Clone)]
struct HealthContext {
    liveness: Liveness,
    exchange: Arc<dyn Exchange>,
    symbol: String,
}

/// Serve `/health` and `/status` until the task is aborted
pub async fn serve(
    port: u16,
    liveness: Liveness,
    exchange: Arc<dyn Exchange>,
    symbol: String,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let context = HealthContext {
        liveness,
        exchange,
        symbol,
    };

    let make_svc = make_service_fn(move |_conn| {
        let context = context.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let context = context.clone();
                handle_request(req, context)
            }))
        }
    });

    let server = Server::try_bind(&addr)?.serve(make_svc);
    tracing::info!("Health server listening on http://{} (/health, /status)", addr);

    server.await?;
    Ok(())
}

async fn handle_request(
    req: Request<Body>,
    context: HealthContext,
) -> Result<Response<Body>, Infallible> {
    tracing::debug!("Health request: {} {}", req.method(), req.uri().path());

    if req.method() != Method::GET {
        return Ok(json_response(
            StatusCode::METHOD_NOT_ALLOWED,
            serde_json::json!({ "error": "method not allowed" }),
        ));
    }

    let response = match req.uri().path() {
        "/health" => health_response(&context.liveness),
        "/status" => status_response(&context).await,
        _ => json_response(
            StatusCode::NOT_FOUND,
            serde_json::json!({ "error": "not found" }),
        ),
    };
    Ok(response)
}

fn health_response(liveness: &Liveness) -> Response<Body> {
    if liveness.is_alive() {
        json_response(StatusCode::OK, serde_json::json!({ "status": "OK" }))
    } else {
        json_response(
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "unavailable",
                "last_feed_message_ms": liveness.feed().last_message_ms()
            }),
        )
    }
}

async fn status_response(context: &HealthContext) -> Response<Body> {
    match fetch_status(context.exchange.as_ref(), &context.symbol).await {
        Ok(report) => match serde_json::to_value(&report) {
            Ok(body) => json_response(StatusCode::OK, body),
            Err(e) => json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "error": e.to_string() }),
            ),
        },
        Err(e) => json_response(
            StatusCode::BAD_GATEWAY,
            serde_json::json!({ "error": e.to_string() }),
        ),
    }
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response<Body> {
    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

use clap::{Parser, Subcommand};
use crossbot::api::{BinanceFuturesClient, Exchange, TelegramSink};
use crossbot::config::{Credentials, Settings, TradingMode};
use crossbot::error::TradingError;
use crossbot::execution::{ConnectionSupervisor, Controller, FeedHealth, OrderExecutor, PriceFeed};
use crossbot::health::{self, Liveness};
use crossbot::models::InstrumentRules;
use crossbot::notify::Notifier;
use crossbot::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tokio::time::Duration;

// Candles buffered between the feed and the controller
const CANDLE_QUEUE: usize = 256;

#[derive(Parser)]
#[command(name = "crossbot", about = "Moving-average crossover bot for Binance USDT-M futures")]
struct Cli {
    /// TOML settings file (optional)
    #[arg(long, default_value = "crossbot.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the bot (default)
    Run,
    /// Print position, balance and unrealized PnL as JSON
    Status,
    /// Cancel resting orders and close the position
    Flatten,
}

/// Why a trading session ended
enum SessionEnd {
    Shutdown,
    Failed(TradingError),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let settings = Arc::new(Settings::load(Some(cli.config.as_path()))?);
    let credentials = Credentials::from_env();

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_bot(settings, credentials).await,
        Command::Status => print_status(&settings, &credentials).await,
        Command::Flatten => flatten_once(&settings, &credentials).await,
    }
}

// ============================================================================
// Initialization Functions
// ============================================================================

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("crossbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Binance client; signed endpoints need both keys
fn create_exchange(
    settings: &Settings,
    credentials: &Credentials,
    require_keys: bool,
) -> anyhow::Result<Arc<dyn Exchange>> {
    let (api_key, api_secret) = match (&credentials.api_key, &credentials.api_secret) {
        (Some(key), Some(secret)) => (key.clone(), secret.clone()),
        _ if require_keys => {
            anyhow::bail!("BINANCE_API_KEY and BINANCE_API_SECRET must be set")
        }
        _ => {
            tracing::warn!("Binance API keys not set, only public endpoints will work");
            (String::new(), String::new())
        }
    };

    let client = BinanceFuturesClient::new(
        settings.rest_base_url.clone(),
        api_key,
        api_secret,
        Duration::from_secs(settings.request_timeout_secs),
    )?;
    Ok(Arc::new(client))
}

/// Telegram notifier when configured, log-only otherwise
fn create_notifier(
    settings: &Settings,
    credentials: &Credentials,
) -> anyhow::Result<(Notifier, Option<tokio::task::JoinHandle<()>>)> {
    match (&credentials.telegram_token, &credentials.telegram_chat_id) {
        (Some(token), Some(chat_id)) => {
            let sink = TelegramSink::new(token.clone(), chat_id.clone())?;
            let (notifier, handle) = Notifier::spawn(
                Arc::new(sink),
                settings.notify_queue_capacity,
                Duration::from_secs(settings.notify_timeout_secs),
            );
            tracing::info!("Telegram notifications enabled");
            Ok((notifier, Some(handle)))
        }
        _ => {
            tracing::info!("Telegram not configured, notifications are log-only");
            Ok((Notifier::disabled(), None))
        }
    }
}

fn log_configuration(settings: &Settings) {
    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Symbol: {} ({} candles)", settings.symbol, settings.interval);
    tracing::info!(
        "  Moving averages: {}/{}",
        settings.short_window,
        settings.long_window
    );
    tracing::info!("  Mode: {:?}", settings.mode);
    tracing::info!("  Leverage: {}x, usage {}%", settings.leverage, settings.usage_percent);
    tracing::info!("  Stop-loss: {}%", settings.stop_loss_percent);
    tracing::info!(
        "  Feed stale after {}s, checked every {}s",
        settings.feed_stale_threshold_secs,
        settings.supervisor_interval_secs
    );
}

// ============================================================================
// Commands
// ============================================================================

async fn run_bot(settings: Arc<Settings>, credentials: Credentials) -> Result<()> {
    tracing::info!("🚀 crossbot starting");
    log_configuration(&settings);

    let exchange = create_exchange(
        &settings,
        &credentials,
        settings.mode == TradingMode::Trade,
    )?;
    let (notifier, notifier_task) = create_notifier(&settings, &credentials)?;

    let liveness = Liveness::new(FeedHealth::new(), settings.stale_threshold());
    let health_task = if settings.health_port > 0 {
        let liveness = liveness.clone();
        let exchange = exchange.clone();
        let port = settings.health_port;
        let symbol = settings.symbol.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = health::serve(port, liveness, exchange, symbol).await {
                tracing::error!("Health server exited: {}", e);
            }
        }))
    } else {
        None
    };

    loop {
        match run_session(&settings, &exchange, &notifier, &liveness).await {
            SessionEnd::Shutdown => {
                tracing::info!("\n⚠️  Received Ctrl+C, shutting down...");
                close_out(&settings, &exchange, &notifier).await;
                notifier.notify(format!("🛑 Trading bot stopped for {}.", settings.symbol));
                break;
            }
            SessionEnd::Failed(e) => {
                tracing::error!("💥 Session failed: {}", e);
                notifier.notify(format!(
                    "❌ Trading bot error for {}: {}. Restarting in {}s.",
                    settings.symbol, e, settings.restart_delay_secs
                ));
                close_out(&settings, &exchange, &notifier).await;

                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("\n⚠️  Received Ctrl+C during restart delay, shutting down...");
                        notifier.notify(format!("🛑 Trading bot stopped for {}.", settings.symbol));
                        break;
                    }
                    _ = tokio::time::sleep(Duration::from_secs(settings.restart_delay_secs)) => {
                        tracing::info!("🔄 Restarting session...");
                    }
                }
            }
        }
    }

    if let Some(task) = health_task {
        task.abort();
    }
    drain_notifications(notifier, notifier_task, &settings).await;

    tracing::info!("👋 crossbot stopped");
    Ok(())
}

/// One session: prepare the account, stream candles, trade until failure or Ctrl+C
async fn run_session(
    settings: &Arc<Settings>,
    exchange: &Arc<dyn Exchange>,
    notifier: &Notifier,
    liveness: &Liveness,
) -> SessionEnd {
    let rules = match prepare_account(settings, exchange.as_ref()).await {
        Ok(rules) => rules,
        Err(e) => return SessionEnd::Failed(e),
    };

    let controller = Controller::new(settings.clone(), exchange.clone(), rules, notifier.clone());
    let (candle_tx, candle_rx) = mpsc::channel(CANDLE_QUEUE);
    let force_close = Arc::new(Notify::new());

    let feed = PriceFeed::new(
        settings.ws_url.clone(),
        settings.symbol.clone(),
        settings.interval.clone(),
        Duration::from_secs(settings.reconnect_delay_secs),
        liveness.feed().clone(),
        force_close.clone(),
        notifier.clone(),
    );
    let supervisor = ConnectionSupervisor::new(
        liveness.feed().clone(),
        force_close,
        Duration::from_secs(settings.supervisor_interval_secs),
        settings.stale_threshold(),
    );

    liveness.feed().touch();
    let feed_task = tokio::spawn(feed.run(candle_tx));
    let supervisor_task = tokio::spawn(supervisor.run());
    liveness.set_controller_active(true);

    tracing::info!("✅ Session started for {}", settings.kline_stream());
    tracing::info!("\nPress Ctrl+C to stop...\n");

    let outcome = tokio::select! {
        _ = tokio::signal::ctrl_c() => SessionEnd::Shutdown,
        error = controller.run(candle_rx) => SessionEnd::Failed(error),
    };

    liveness.set_controller_active(false);
    feed_task.abort();
    supervisor_task.abort();

    outcome
}

/// Leverage and margin mode in trade mode, instrument rules always
async fn prepare_account(
    settings: &Settings,
    exchange: &dyn Exchange,
) -> std::result::Result<InstrumentRules, TradingError> {
    if settings.mode == TradingMode::Trade {
        exchange
            .set_leverage(&settings.symbol, settings.leverage)
            .await?;
        tracing::info!("  Leverage set to {}x", settings.leverage);

        if let Err(e) = exchange.set_isolated_margin(&settings.symbol).await {
            tracing::warn!("Failed to set isolated margin for {}: {}", settings.symbol, e);
        }
    }

    let rules = exchange.instrument_rules(&settings.symbol).await?;
    tracing::info!(
        "  Lot step {}, min qty {}, tick {}",
        rules.lot_step,
        rules.min_quantity,
        rules.tick_size
    );
    Ok(rules)
}

/// Flatten on the way out; alert mode never holds positions
async fn close_out(settings: &Settings, exchange: &Arc<dyn Exchange>, notifier: &Notifier) {
    if settings.mode != TradingMode::Trade {
        return;
    }

    let executor = OrderExecutor::new(
        exchange.clone(),
        settings.symbol.clone(),
        settings.reconcile_delay(),
        notifier.clone(),
    );
    match executor.flatten().await {
        Ok(Some(fill)) => tracing::info!("🏁 Closed {} {} {}", fill.side, fill.quantity, settings.symbol),
        Ok(None) => tracing::info!("Already flat on {}", settings.symbol),
        Err(e) => {
            tracing::error!("✗ Failed to flatten {}: {}", settings.symbol, e);
            notifier.notify(format!(
                "❌ Failed to close {} position, check the account: {}",
                settings.symbol, e
            ));
        }
    }
}

/// Give queued notifications a chance to go out before exit
async fn drain_notifications(
    notifier: Notifier,
    task: Option<tokio::task::JoinHandle<()>>,
    settings: &Settings,
) {
    drop(notifier);
    if let Some(task) = task {
        let wait = Duration::from_secs(settings.notify_timeout_secs);
        if tokio::time::timeout(wait, task).await.is_err() {
            tracing::warn!("Pending notifications dropped on exit");
        }
    }
}

async fn print_status(settings: &Settings, credentials: &Credentials) -> Result<()> {
    let exchange = create_exchange(settings, credentials, true)?;
    let report = health::fetch_status(exchange.as_ref(), &settings.symbol).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn flatten_once(settings: &Settings, credentials: &Credentials) -> Result<()> {
    let exchange = create_exchange(settings, credentials, true)?;
    let executor = OrderExecutor::new(
        exchange,
        settings.symbol.clone(),
        settings.reconcile_delay(),
        Notifier::disabled(),
    );

    match executor.flatten().await? {
        Some(fill) => tracing::info!(
            "🏁 Closed {} {} {} @ {}",
            fill.side,
            fill.quantity,
            settings.symbol,
            fill.price
        ),
        None => tracing::info!("No position open on {}", settings.symbol),
    }
    Ok(())
}

// Shared fixtures for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use crossbot::api::{Exchange, ExchangeError};
use crossbot::models::{
    InstrumentRules, OrderResult, OrderSide, Position, StopLossSpec,
};
use crossbot::notify::NotificationSink;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Mutex;

/// Every exchange call the bot made, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Position,
    Balance,
    LastPrice,
    Rules,
    Leverage(u32),
    IsolatedMargin,
    Market {
        side: OrderSide,
        quantity: Decimal,
        reduce_only: bool,
    },
    Stop(StopLossSpec),
    CancelOpenOrders,
}

/// Failure injected into the next market order
#[derive(Debug, Clone)]
pub enum MarketFault {
    /// Times out after the exchange applied the fill
    TimeoutFilled,
    /// Times out and nothing happened
    TimeoutUnfilled,
    /// Times out, nothing happened, and position queries fail from then on
    TimeoutPositionLost,
    Reject(ExchangeError),
}

struct MockState {
    position: Decimal,
    entry_price: Decimal,
    balance: Decimal,
    last_price: Decimal,
    rules: InstrumentRules,
    calls: Vec<Call>,
    market_faults: Vec<MarketFault>,
    fail_position: bool,
    next_order_id: u64,
}

/// In-memory futures account for one symbol
pub struct MockExchange {
    state: Mutex<MockState>,
}

impl MockExchange {
    pub fn new(balance: Decimal, last_price: Decimal) -> Self {
        Self {
            state: Mutex::new(MockState {
                position: Decimal::ZERO,
                entry_price: Decimal::ZERO,
                balance,
                last_price,
                rules: default_rules(),
                calls: Vec::new(),
                market_faults: Vec::new(),
                fail_position: false,
                next_order_id: 1,
            }),
        }
    }

    pub fn with_position(self, amount: Decimal, entry_price: Decimal) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.position = amount;
            state.entry_price = entry_price;
        }
        self
    }

    pub fn set_last_price(&self, price: Decimal) {
        self.state.lock().unwrap().last_price = price;
    }

    pub fn push_market_fault(&self, fault: MarketFault) {
        self.state.lock().unwrap().market_faults.push(fault);
    }

    pub fn fail_position_queries(&self, fail: bool) {
        self.state.lock().unwrap().fail_position = fail;
    }

    pub fn position_amount(&self) -> Decimal {
        self.state.lock().unwrap().position
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn market_orders(&self) -> Vec<(OrderSide, Decimal, bool)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Market {
                    side,
                    quantity,
                    reduce_only,
                } => Some((side, quantity, reduce_only)),
                _ => None,
            })
            .collect()
    }

    pub fn stops(&self) -> Vec<StopLossSpec> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Stop(stop) => Some(stop),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: &Call) -> usize {
        self.calls().iter().filter(|call| *call == wanted).count()
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }
}

fn apply_fill(state: &mut MockState, side: OrderSide, quantity: Decimal) {
    let before = state.position;
    let after = side.apply_to(before, quantity);

    state.entry_price = if after.is_zero() {
        Decimal::ZERO
    } else if before.is_zero() || before.is_sign_negative() != after.is_sign_negative() {
        state.last_price
    } else {
        state.entry_price
    };
    state.position = after;
}

#[async_trait]
impl Exchange for MockExchange {
    async fn account_balance(&self) -> Result<Decimal, ExchangeError> {
        self.record(Call::Balance);
        Ok(self.state.lock().unwrap().balance)
    }

    async fn position(&self, _symbol: &str) -> Result<Position, ExchangeError> {
        self.record(Call::Position);
        let state = self.state.lock().unwrap();
        if state.fail_position {
            return Err(ExchangeError::Network("position unavailable".to_string()));
        }
        Ok(Position::from_signed(state.position, state.entry_price))
    }

    async fn last_price(&self, _symbol: &str) -> Result<Decimal, ExchangeError> {
        self.record(Call::LastPrice);
        Ok(self.state.lock().unwrap().last_price)
    }

    async fn instrument_rules(&self, _symbol: &str) -> Result<InstrumentRules, ExchangeError> {
        self.record(Call::Rules);
        Ok(self.state.lock().unwrap().rules.clone())
    }

    async fn set_leverage(&self, _symbol: &str, leverage: u32) -> Result<(), ExchangeError> {
        self.record(Call::Leverage(leverage));
        Ok(())
    }

    async fn set_isolated_margin(&self, _symbol: &str) -> Result<(), ExchangeError> {
        self.record(Call::IsolatedMargin);
        Ok(())
    }

    async fn submit_market_order(
        &self,
        _symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        reduce_only: bool,
    ) -> Result<OrderResult, ExchangeError> {
        self.record(Call::Market {
            side,
            quantity,
            reduce_only,
        });

        let mut state = self.state.lock().unwrap();
        let fault = if state.market_faults.is_empty() {
            None
        } else {
            Some(state.market_faults.remove(0))
        };

        match fault {
            Some(MarketFault::TimeoutFilled) => {
                apply_fill(&mut state, side, quantity);
                Err(ExchangeError::Timeout("operation timed out".to_string()))
            }
            Some(MarketFault::TimeoutUnfilled) => {
                Err(ExchangeError::Timeout("operation timed out".to_string()))
            }
            Some(MarketFault::TimeoutPositionLost) => {
                state.fail_position = true;
                Err(ExchangeError::Timeout("operation timed out".to_string()))
            }
            Some(MarketFault::Reject(e)) => Err(e),
            None => {
                apply_fill(&mut state, side, quantity);
                let order_id = state.next_order_id;
                state.next_order_id += 1;
                Ok(OrderResult {
                    order_id: order_id.to_string(),
                    client_order_id: format!("mock-{}", order_id),
                    status: "FILLED".to_string(),
                    executed_quantity: quantity,
                    average_price: state.last_price,
                })
            }
        }
    }

    async fn submit_stop_market_order(
        &self,
        _symbol: &str,
        stop: &StopLossSpec,
    ) -> Result<OrderResult, ExchangeError> {
        self.record(Call::Stop(stop.clone()));
        let mut state = self.state.lock().unwrap();
        let order_id = state.next_order_id;
        state.next_order_id += 1;
        Ok(OrderResult {
            order_id: order_id.to_string(),
            client_order_id: format!("mock-{}", order_id),
            status: "NEW".to_string(),
            executed_quantity: Decimal::ZERO,
            average_price: Decimal::ZERO,
        })
    }

    async fn cancel_open_orders(&self, _symbol: &str) -> Result<(), ExchangeError> {
        self.record(Call::CancelOpenOrders);
        Ok(())
    }
}

pub fn default_rules() -> InstrumentRules {
    InstrumentRules {
        lot_step: dec!(0.001),
        min_quantity: dec!(0.001),
        tick_size: dec!(0.01),
    }
}

/// Captures notifications in memory
#[derive(Default)]
pub struct RecordingSink {
    pub messages: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(&self, text: &str) -> anyhow::Result<()> {
        self.messages.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Sink whose every delivery fails
#[derive(Default)]
pub struct FailingSink {
    pub attempts: Mutex<usize>,
}

impl FailingSink {
    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

#[async_trait]
impl NotificationSink for FailingSink {
    async fn send(&self, _text: &str) -> anyhow::Result<()> {
        *self.attempts.lock().unwrap() += 1;
        anyhow::bail!("chat unreachable")
    }
}

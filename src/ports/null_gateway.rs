use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Mutex;
use tokio::time::{sleep, Duration};

use crate::config::PairSpec;
use crate::gateway::{Gateway, GatewayError, GatewayEvents};
use crate::models::{
    Balance, BookLevel, BookSnapshot, ConnectivityState, ProductSpec, Side, TradeTick,
    WalletSnapshot,
};

const BOOK_INTERVAL_MS: u64 = 1000;
const BOOK_DEPTH: usize = 5;
const START_MID: i64 = 1000;
const TRADE_PROBABILITY: f64 = 0.2;

/// Offline exchange: always connected, synthetic random-walk depth.
pub struct NullGateway {
    pair: PairSpec,
    min_tick: Decimal,
    mid: Mutex<Decimal>,
    events: Mutex<Option<GatewayEvents>>,
    running: AtomicBool,
}

impl NullGateway {
    pub fn new(pair: &PairSpec) -> Self {
        Self {
            pair: pair.clone(),
            min_tick: Decimal::new(1, 2),
            mid: Mutex::new(Decimal::new(START_MID, 0)),
            events: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    // Moves the mid by up to two ticks and returns the new book plus an optional print.
    fn next_book(&self) -> (BookSnapshot, Option<TradeTick>) {
        let step = i64::from(rand::random::<u8>() % 5) - 2;
        let mut mid = self.mid.lock().unwrap_or_else(|e| e.into_inner());
        *mid += self.min_tick * Decimal::from(step);
        let mid = *mid;

        let mut book = BookSnapshot::default();
        for level in 1..=BOOK_DEPTH {
            let offset = self.min_tick * Decimal::from(level as i64);
            let bid_size = Decimal::new(i64::from(rand::random::<u8>() % 50) + 1, 2);
            let ask_size = Decimal::new(i64::from(rand::random::<u8>() % 50) + 1, 2);
            book.bids.push(BookLevel::new(mid - offset, bid_size));
            book.asks.push(BookLevel::new(mid + offset, ask_size));
        }

        let trade = if rand::random::<f64>() < TRADE_PROBABILITY {
            let make_side = if rand::random::<bool>() {
                Side::Bid
            } else {
                Side::Ask
            };
            let level = match make_side {
                Side::Bid => &book.bids[0],
                Side::Ask => &book.asks[0],
            };
            Some(TradeTick {
                price: level.price,
                size: level.size,
                make_side,
            })
        } else {
            None
        };
        (book, trade)
    }

    fn events(&self) -> Option<GatewayEvents> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl Gateway for NullGateway {
    fn product(&self) -> ProductSpec {
        ProductSpec {
            base: self.pair.base.clone(),
            quote: self.pair.quote.clone(),
            min_tick: self.min_tick,
        }
    }

    async fn start(&self, events: GatewayEvents) -> Result<(), GatewayError> {
        *self.events.lock().unwrap_or_else(|e| e.into_inner()) = Some(events.clone());
        self.running.store(true, AtomicOrdering::SeqCst);
        events.connect_market_data(ConnectivityState::Connected);
        events.connect_order_entry(ConnectivityState::Connected);
        Ok(())
    }

    async fn stop(&self) -> Result<(), GatewayError> {
        self.running.store(false, AtomicOrdering::SeqCst);
        if let Some(events) = self.events() {
            events.connect_order_entry(ConnectivityState::Disconnected);
            events.connect_market_data(ConnectivityState::Disconnected);
        }
        Ok(())
    }

    async fn book(&self) -> Result<BookSnapshot, GatewayError> {
        sleep(Duration::from_millis(BOOK_INTERVAL_MS)).await;
        if !self.running.load(AtomicOrdering::SeqCst) {
            return Err(GatewayError::Disconnected("null gateway stopped".to_string()));
        }
        let (book, trade) = self.next_book();
        if let (Some(trade), Some(events)) = (trade, self.events()) {
            events.trade(trade);
        }
        Ok(book)
    }

    async fn pos(&self) -> Result<WalletSnapshot, GatewayError> {
        Ok(WalletSnapshot {
            balances: vec![
                Balance {
                    currency: self.pair.base.clone(),
                    amount: Decimal::new(3, 0),
                    held: Decimal::ZERO,
                },
                Balance {
                    currency: self.pair.quote.clone(),
                    amount: Decimal::new(3000, 0),
                    held: Decimal::ZERO,
                },
            ],
        })
    }

    async fn cancel_all(&self) -> Result<(), GatewayError> {
        log::debug!("[GW] null gateway has no resting orders to cancel");
        Ok(())
    }
}

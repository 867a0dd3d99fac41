use rust_decimal::Decimal;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::models::{
    decimal_value, BookLevel, BookSnapshot, OrderUpdate, Topic, TradeTick, WalletSnapshot,
};
use crate::signals::Signals;
use crate::transport::Transport;

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

// zero is how adapters report "not given" for these fields
fn non_zero(value: Option<Decimal>) -> Option<Decimal> {
    value.filter(|v| !v.is_zero())
}

pub fn order_update_event(update: &OrderUpdate) -> Value {
    let mut event = Map::new();
    if let Some(order_id) = non_empty(&update.order_id) {
        event.insert("orderId".to_string(), json!(order_id));
    }
    if let Some(exchange_id) = non_empty(&update.exchange_id) {
        event.insert("exchangeId".to_string(), json!(exchange_id));
    }
    event.insert("orderStatus".to_string(), json!(update.status.as_wire()));
    if let Some(price) = non_zero(update.price) {
        event.insert("price".to_string(), decimal_value(price));
    }
    if let Some(quantity) = non_zero(update.quantity) {
        event.insert("quantity".to_string(), decimal_value(quantity));
    }
    if let Some(last_quantity) = non_zero(update.last_quantity) {
        event.insert("lastQuantity".to_string(), decimal_value(last_quantity));
    }
    Value::Object(event)
}

pub fn trade_event(tick: &TradeTick) -> Value {
    json!({
        "price": decimal_value(tick.price),
        "size": decimal_value(tick.size),
        "make_side": tick.make_side.as_wire(),
    })
}

fn levels(levels: &[BookLevel]) -> Value {
    Value::Array(
        levels
            .iter()
            .map(|level| {
                json!({
                    "price": decimal_value(level.price),
                    "size": decimal_value(level.size),
                })
            })
            .collect(),
    )
}

pub fn book_event(book: &BookSnapshot) -> Value {
    json!({
        "bids": levels(&book.bids),
        "asks": levels(&book.asks),
    })
}

/// Routes translated gateway payloads to the transport and internal listeners.
pub struct EventTranslator {
    transport: Arc<dyn Transport>,
    signals: Arc<Signals>,
}

impl EventTranslator {
    pub fn new(transport: Arc<dyn Transport>, signals: Arc<Signals>) -> Self {
        Self { transport, signals }
    }

    pub fn publish_order_update(&self, update: &OrderUpdate) {
        self.transport
            .publish(Topic::OrderStatusReports, order_update_event(update));
        self.signals.order_update.emit(update);
    }

    pub fn publish_trade(&self, tick: &TradeTick) {
        self.transport
            .publish(Topic::MarketTradeGateway, trade_event(tick));
    }

    pub fn publish_trades(&self, ticks: &[TradeTick]) {
        for tick in ticks {
            self.publish_trade(tick);
        }
    }

    pub fn publish_book(&self, book: &BookSnapshot) {
        self.transport
            .publish(Topic::MarketDataGateway, book_event(book));
        self.signals.market_book.emit(book);
    }

    /// Position data stays internal; nothing goes to the transport.
    pub fn forward_wallet(&self, wallet: &WalletSnapshot) {
        self.signals.position.emit(wallet);
    }
}

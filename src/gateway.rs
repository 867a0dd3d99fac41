use async_trait::async_trait;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use crate::models::{
    BookSnapshot, ConnectivityState, GatewayType, OrderUpdate, ProductSpec, TradeTick,
    WalletSnapshot,
};
use crate::reconciler::Reconciler;
use crate::translator::EventTranslator;

#[derive(Debug)]
pub enum GatewayError {
    Disconnected(String),
    Other(String),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GatewayError::Disconnected(e) => write!(f, "Gateway disconnected: {}", e),
            GatewayError::Other(e) => write!(f, "Gateway error: {}", e),
        }
    }
}

impl Error for GatewayError {}

/// Exchange adapter capability.
///
/// `book` is expected to suspend until fresh depth is available; the caller
/// invokes it back to back without any delay of its own.
#[async_trait]
pub trait Gateway: Send + Sync {
    fn product(&self) -> ProductSpec;

    /// Opens both legs. Connectivity and pushed data flow through `events`.
    async fn start(&self, events: GatewayEvents) -> Result<(), GatewayError>;

    async fn stop(&self) -> Result<(), GatewayError>;

    async fn book(&self) -> Result<BookSnapshot, GatewayError>;

    async fn pos(&self) -> Result<WalletSnapshot, GatewayError>;

    /// Best effort; some orders may survive a successful return.
    async fn cancel_all(&self) -> Result<(), GatewayError>;
}

/// Callback surface handed to adapters.
#[derive(Clone)]
pub struct GatewayEvents {
    reconciler: Arc<Reconciler>,
    translator: Arc<EventTranslator>,
}

impl GatewayEvents {
    pub fn new(reconciler: Arc<Reconciler>, translator: Arc<EventTranslator>) -> Self {
        Self {
            reconciler,
            translator,
        }
    }

    pub fn connect_market_data(&self, state: ConnectivityState) {
        self.reconciler.set_leg(GatewayType::MarketData, state);
        if state == ConnectivityState::Disconnected {
            // depth from a dead feed is stale
            self.translator.publish_book(&BookSnapshot::default());
        }
    }

    pub fn connect_order_entry(&self, state: ConnectivityState) {
        self.reconciler.set_leg(GatewayType::OrderEntry, state);
    }

    pub fn order_update(&self, update: OrderUpdate) {
        self.translator.publish_order_update(&update);
    }

    pub fn trade(&self, tick: TradeTick) {
        self.translator.publish_trade(&tick);
    }

    pub fn trades(&self, ticks: &[TradeTick]) {
        self.translator.publish_trades(ticks);
    }

    pub fn book(&self, book: BookSnapshot) {
        self.translator.publish_book(&book);
    }

    pub fn wallet(&self, wallet: WalletSnapshot) {
        self.translator.forward_wallet(&wallet);
    }
}

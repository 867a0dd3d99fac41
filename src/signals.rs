use std::sync::Mutex;

use crate::models::{BookSnapshot, ConnectivityState, OrderUpdate, WalletSnapshot};

type Listener<T> = Box<dyn Fn(&T) + Send + Sync>;

/// Multi-slot listener registry for one event kind.
///
/// Listeners run synchronously on the emitting thread while the registry lock
/// is held, so a listener must not subscribe to the same registry.
pub struct Listeners<T> {
    slots: Mutex<Vec<Listener<T>>>,
}

impl<T> Default for Listeners<T> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
        }
    }
}

impl<T> Listeners<T> {
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Box::new(listener));
    }

    pub fn emit(&self, value: &T) {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        for listener in slots.iter() {
            listener(value);
        }
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Internal subscription points consumed by the strategy engine.
#[derive(Default)]
pub struct Signals {
    pub quoting_permission: Listeners<ConnectivityState>,
    pub exchange_connectivity: Listeners<ConnectivityState>,
    pub position: Listeners<WalletSnapshot>,
    pub order_update: Listeners<OrderUpdate>,
    pub market_book: Listeners<BookSnapshot>,
}

impl Signals {
    pub fn new() -> Self {
        Self::default()
    }
}

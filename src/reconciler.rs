use serde_json::json;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::models::{ConnectivityState, GatewayType, Topic};
use crate::signals::Signals;
use crate::transport::Transport;

/// The five connectivity values tracked for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectivitySnapshot {
    pub market_data: ConnectivityState,
    pub order_entry: ConnectivityState,
    pub exchange: ConnectivityState,
    pub auto_start: ConnectivityState,
    pub quoting: ConnectivityState,
}

pub fn derive_exchange(
    market_data: ConnectivityState,
    order_entry: ConnectivityState,
) -> ConnectivityState {
    if market_data.is_connected() && order_entry.is_connected() {
        ConnectivityState::Connected
    } else {
        ConnectivityState::Disconnected
    }
}

pub fn derive_quoting(
    exchange: ConnectivityState,
    auto_start: ConnectivityState,
) -> ConnectivityState {
    if exchange.is_connected() {
        auto_start
    } else {
        ConnectivityState::Disconnected
    }
}

/// Fuses both gateway legs and the auto-start toggle into the exchange
/// connectivity and quoting state.
///
/// Every mutation holds the state lock through recomputation and publication,
/// so notifications go out in the order the changes were applied. Listeners
/// registered on [`Signals`] run under that lock and must not call back into
/// the reconciler.
pub struct Reconciler {
    exchange_name: String,
    state: Mutex<ConnectivitySnapshot>,
    transport: Arc<dyn Transport>,
    signals: Arc<Signals>,
}

impl Reconciler {
    pub fn new(
        exchange_name: &str,
        auto_start: ConnectivityState,
        transport: Arc<dyn Transport>,
        signals: Arc<Signals>,
    ) -> Self {
        Self {
            exchange_name: exchange_name.to_string(),
            state: Mutex::new(ConnectivitySnapshot {
                auto_start,
                ..ConnectivitySnapshot::default()
            }),
            transport,
            signals,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ConnectivitySnapshot> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> ConnectivitySnapshot {
        *self.lock()
    }

    pub fn exchange_connectivity(&self) -> ConnectivityState {
        self.lock().exchange
    }

    pub fn quoting_state(&self) -> ConnectivityState {
        self.lock().quoting
    }

    pub fn auto_start(&self) -> ConnectivityState {
        self.lock().auto_start
    }

    pub fn set_leg(&self, gateway: GatewayType, value: ConnectivityState) {
        let mut state = self.lock();
        let leg = match gateway {
            GatewayType::MarketData => &mut state.market_data,
            GatewayType::OrderEntry => &mut state.order_entry,
        };
        if *leg == value {
            return;
        }
        *leg = value;
        log::debug!("[GW] {} {:?} leg is {}", self.exchange_name, gateway, value);

        let exchange = derive_exchange(state.market_data, state.order_entry);
        if exchange == state.exchange {
            return;
        }
        state.exchange = exchange;
        log::info!(
            "[GW] {} Exchange connectivity changed to {}.",
            self.exchange_name,
            exchange
        );
        self.recompute_quoting(&mut state);
        self.transport.publish(
            Topic::ExchangeConnectivity,
            json!({ "status": exchange.as_wire() }),
        );
    }

    pub fn set_auto_start(&self, value: ConnectivityState) {
        let mut state = self.lock();
        if state.auto_start == value {
            return;
        }
        state.auto_start = value;
        log::info!("[GW] {} Auto start set to {}.", self.exchange_name, value);
        self.recompute_quoting(&mut state);
    }

    fn recompute_quoting(&self, state: &mut ConnectivitySnapshot) {
        let quoting = derive_quoting(state.exchange, state.auto_start);
        if quoting != state.quoting {
            state.quoting = quoting;
            log::info!(
                "[GW] {} Quoting state changed to {}.",
                self.exchange_name,
                quoting
            );
            self.transport
                .publish(Topic::ActiveState, json!({ "state": quoting.as_wire() }));
        }
        // both signals fire on every recompute; consumers dedupe edges themselves
        self.signals.quoting_permission.emit(&state.quoting);
        self.signals.exchange_connectivity.emit(&state.exchange);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{drain_messages, LocalBus};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use ConnectivityState::{Connected, Disconnected};

    fn setup(auto_start: ConnectivityState) -> (Arc<LocalBus>, Arc<Signals>, Reconciler) {
        let bus = Arc::new(LocalBus::default());
        let signals = Arc::new(Signals::new());
        let reconciler = Reconciler::new("null", auto_start, bus.clone(), signals.clone());
        (bus, signals, reconciler)
    }

    fn count(messages: &[crate::transport::BusMessage], topic: Topic) -> usize {
        messages.iter().filter(|m| m.topic == topic).count()
    }

    #[test]
    fn exchange_connected_only_when_both_legs_connected() {
        for md in [Disconnected, Connected] {
            for oe in [Disconnected, Connected] {
                let (_, _, reconciler) = setup(Disconnected);
                // flip through the opposite values first so the final set is a real change
                reconciler.set_leg(GatewayType::MarketData, Connected);
                reconciler.set_leg(GatewayType::OrderEntry, Connected);
                reconciler.set_leg(GatewayType::MarketData, md);
                reconciler.set_leg(GatewayType::OrderEntry, oe);

                let expected = if md == Connected && oe == Connected {
                    Connected
                } else {
                    Disconnected
                };
                assert_eq!(
                    reconciler.exchange_connectivity(),
                    expected,
                    "md={:?} oe={:?}",
                    md,
                    oe
                );
            }
        }
    }

    #[test]
    fn quoting_follows_auto_start_only_when_exchange_connected() {
        for exchange in [Disconnected, Connected] {
            for auto_start in [Disconnected, Connected] {
                assert_eq!(
                    derive_quoting(exchange, auto_start),
                    if exchange == Connected {
                        auto_start
                    } else {
                        Disconnected
                    }
                );

                let (_, _, reconciler) = setup(Disconnected);
                reconciler.set_leg(GatewayType::MarketData, exchange);
                reconciler.set_leg(GatewayType::OrderEntry, exchange);
                reconciler.set_auto_start(auto_start);
                let snap = reconciler.snapshot();
                assert_eq!(snap.exchange, exchange);
                assert_eq!(
                    snap.quoting,
                    if exchange == Connected {
                        auto_start
                    } else {
                        Disconnected
                    }
                );
            }
        }
    }

    #[test]
    fn repeated_leg_update_publishes_once() {
        let (bus, _, reconciler) = setup(Connected);
        let mut rx = bus.subscribe();
        reconciler.set_leg(GatewayType::MarketData, Connected);
        reconciler.set_leg(GatewayType::OrderEntry, Connected);
        reconciler.set_leg(GatewayType::OrderEntry, Connected);

        let messages = drain_messages(&mut rx);
        assert_eq!(count(&messages, Topic::ExchangeConnectivity), 1);
        assert_eq!(count(&messages, Topic::ActiveState), 1);
        assert_eq!(messages.last().unwrap().payload, json!({"status": 1}));
    }

    #[test]
    fn quoting_publish_precedes_exchange_publish() {
        let (bus, _, reconciler) = setup(Connected);
        let mut rx = bus.subscribe();
        reconciler.set_leg(GatewayType::MarketData, Connected);
        reconciler.set_leg(GatewayType::OrderEntry, Connected);

        let topics: Vec<Topic> = drain_messages(&mut rx).into_iter().map(|m| m.topic).collect();
        assert_eq!(topics, vec![Topic::ActiveState, Topic::ExchangeConnectivity]);
    }

    #[test]
    fn repeated_auto_start_publishes_once() {
        let (bus, signals, reconciler) = setup(Disconnected);
        reconciler.set_leg(GatewayType::MarketData, Connected);
        reconciler.set_leg(GatewayType::OrderEntry, Connected);
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        signals.quoting_permission.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let mut rx = bus.subscribe();

        reconciler.set_auto_start(Connected);
        reconciler.set_auto_start(Connected);

        let messages = drain_messages(&mut rx);
        assert_eq!(count(&messages, Topic::ActiveState), 1);
        assert_eq!(messages[0].payload, json!({"state": 1}));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(reconciler.quoting_state(), Connected);
    }

    #[test]
    fn signals_fire_on_recompute_even_without_quoting_change() {
        let (bus, signals, reconciler) = setup(Disconnected);
        let exchange_events = Arc::new(Mutex::new(Vec::new()));
        let sink = exchange_events.clone();
        signals.exchange_connectivity.subscribe(move |state| {
            sink.lock().unwrap().push(*state);
        });
        let mut rx = bus.subscribe();

        reconciler.set_leg(GatewayType::MarketData, Connected);
        reconciler.set_leg(GatewayType::OrderEntry, Connected);
        reconciler.set_leg(GatewayType::OrderEntry, Disconnected);

        // quoting never leaves Disconnected because auto start is off
        let messages = drain_messages(&mut rx);
        assert_eq!(count(&messages, Topic::ActiveState), 0);
        assert_eq!(count(&messages, Topic::ExchangeConnectivity), 2);
        assert_eq!(
            *exchange_events.lock().unwrap(),
            vec![Connected, Disconnected]
        );
    }

    #[test]
    fn single_leg_flap_without_exchange_change_is_silent() {
        let (bus, signals, reconciler) = setup(Connected);
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        signals.exchange_connectivity.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let mut rx = bus.subscribe();

        reconciler.set_leg(GatewayType::MarketData, Connected);
        reconciler.set_leg(GatewayType::MarketData, Disconnected);

        assert!(drain_messages(&mut rx).is_empty());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(reconciler.snapshot().market_data, Disconnected);
    }

    #[test]
    fn concurrent_leg_and_toggle_updates_keep_invariants() {
        // each update publishes at most twice; keep every message buffered
        let bus = Arc::new(LocalBus::new(1 << 14));
        let reconciler = Arc::new(Reconciler::new(
            "null",
            Disconnected,
            bus.clone(),
            Arc::new(Signals::new()),
        ));
        let mut rx = bus.subscribe();
        let mut handles = Vec::new();
        for worker in 0..4 {
            let reconciler = reconciler.clone();
            handles.push(thread::spawn(move || {
                for i in 0..500 {
                    let value = if (i + worker) % 2 == 0 {
                        Connected
                    } else {
                        Disconnected
                    };
                    match worker {
                        0 => reconciler.set_leg(GatewayType::MarketData, value),
                        1 => reconciler.set_leg(GatewayType::OrderEntry, value),
                        _ => reconciler.set_auto_start(value),
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let messages = drain_messages(&mut rx);
        let mut exchange = 0;
        let mut quoting = 0;
        for (n, message) in messages.iter().enumerate() {
            match message.topic {
                Topic::ActiveState => {
                    let state = message.payload["state"].as_i64().unwrap();
                    assert_ne!(state, quoting, "repeated ActiveState at {}", n);
                    quoting = state;
                    if state == 1 && exchange == 0 {
                        // quoting may only open together with the exchange
                        let next = &messages[n + 1];
                        assert_eq!(next.topic, Topic::ExchangeConnectivity, "at {}", n);
                        assert_eq!(next.payload["status"], json!(1), "at {}", n);
                    }
                }
                Topic::ExchangeConnectivity => {
                    let status = message.payload["status"].as_i64().unwrap();
                    assert_ne!(status, exchange, "repeated ExchangeConnectivity at {}", n);
                    exchange = status;
                    assert!(
                        !(exchange == 0 && quoting == 1),
                        "quoting left open after exchange drop at {}",
                        n
                    );
                }
                other => panic!("unexpected topic {}", other),
            }
        }

        let snap = reconciler.snapshot();
        assert_eq!(snap.exchange, derive_exchange(snap.market_data, snap.order_entry));
        assert_eq!(snap.quoting, derive_quoting(snap.exchange, snap.auto_start));
        assert_eq!(snap.exchange.as_wire(), exchange);
        assert_eq!(snap.quoting.as_wire(), quoting);
    }
}

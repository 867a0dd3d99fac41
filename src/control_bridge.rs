use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::{GatewayConfig, HOMEPAGE};
use crate::models::{ConnectivityState, PairInfo, ProductInfo, ProductSpec, Topic};
use crate::reconciler::Reconciler;
use crate::transport::Transport;

pub fn product_info(config: &GatewayConfig, product: &ProductSpec) -> ProductInfo {
    ProductInfo {
        exchange: config.exchange.clone(),
        pair: PairInfo {
            base: product.base.clone(),
            quote: product.quote.clone(),
        },
        min_tick: product.min_tick,
        environment: config.environment(),
        matryoshka: config.matryoshka_url.clone(),
        homepage: HOMEPAGE.to_string(),
    }
}

/// Reads the requested auto-start value out of an `ActiveState` command.
pub fn parse_state_command(payload: &Value) -> Option<ConnectivityState> {
    if !payload.is_object() {
        return None;
    }
    let state = payload.get("state")?;
    let raw = match state.as_i64() {
        Some(raw) => raw,
        None => {
            let v = state.as_f64()?;
            if v.fract() != 0.0 {
                return None;
            }
            v as i64
        }
    };
    ConnectivityState::from_wire(raw)
}

/// Wires snapshot providers and the `ActiveState` command into the transport.
pub fn register(
    transport: &dyn Transport,
    reconciler: Arc<Reconciler>,
    config: GatewayConfig,
    product: ProductSpec,
) {
    transport.register_snapshot(
        Topic::ProductAdvertisement,
        Box::new(move || {
            let info = product_info(&config, &product);
            match serde_json::to_value(info) {
                Ok(value) => json!([value]),
                Err(e) => {
                    log::error!("[CONTROL] failed to encode product info: {}", e);
                    json!([])
                }
            }
        }),
    );

    let status_source = reconciler.clone();
    transport.register_snapshot(
        Topic::ExchangeConnectivity,
        Box::new(move || json!([{ "status": status_source.exchange_connectivity().as_wire() }])),
    );

    let state_source = reconciler.clone();
    transport.register_snapshot(
        Topic::ActiveState,
        Box::new(move || json!([{ "state": state_source.quoting_state().as_wire() }])),
    );

    transport.register_handler(
        Topic::ActiveState,
        Box::new(move |payload: &Value| match parse_state_command(payload) {
            Some(state) => reconciler.set_auto_start(state),
            None => log::warn!(
                "[CONTROL] Missing state at ActiveState ignored: {}",
                payload
            ),
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MapConfig, KEY_BOT_IDENTIFIER};
    use crate::models::GatewayType;
    use crate::signals::Signals;
    use crate::transport::{drain_messages, LocalBus};
    use rust_decimal_macros::dec;

    fn setup() -> (Arc<LocalBus>, Arc<Reconciler>) {
        let bus = Arc::new(LocalBus::default());
        let reconciler = Arc::new(Reconciler::new(
            "null",
            ConnectivityState::Disconnected,
            bus.clone(),
            Arc::new(Signals::new()),
        ));
        let store = MapConfig::new().with(KEY_BOT_IDENTIFIER, "auto-lab");
        let config = GatewayConfig::from_store(&store).unwrap();
        let product = ProductSpec {
            base: "BTC".to_string(),
            quote: "EUR".to_string(),
            min_tick: dec!(0.01),
        };
        register(bus.as_ref(), reconciler.clone(), config, product);
        reconciler.set_leg(GatewayType::MarketData, ConnectivityState::Connected);
        reconciler.set_leg(GatewayType::OrderEntry, ConnectivityState::Connected);
        (bus, reconciler)
    }

    #[test]
    fn parse_state_command_accepts_only_known_numbers() {
        assert_eq!(
            parse_state_command(&json!({"state": 1})),
            Some(ConnectivityState::Connected)
        );
        assert_eq!(
            parse_state_command(&json!({"state": 0.0})),
            Some(ConnectivityState::Disconnected)
        );
        assert_eq!(parse_state_command(&json!({})), None);
        assert_eq!(parse_state_command(&json!({"state": "1"})), None);
        assert_eq!(parse_state_command(&json!({"state": 7})), None);
        assert_eq!(
            parse_state_command(&json!({"state": 1.0})),
            Some(ConnectivityState::Connected)
        );
        assert_eq!(parse_state_command(&json!({"state": 1.7})), None);
        assert_eq!(parse_state_command(&json!({"state": 0.5})), None);
        assert_eq!(parse_state_command(&json!({"state": -0.9})), None);
        assert_eq!(parse_state_command(&json!([1])), None);
        assert_eq!(parse_state_command(&Value::Null), None);
    }

    #[test]
    fn malformed_command_changes_nothing() {
        let (bus, reconciler) = setup();
        let mut rx = bus.subscribe();

        assert_eq!(bus.dispatch(Topic::ActiveState, &json!({})), 1);

        assert_eq!(reconciler.auto_start(), ConnectivityState::Disconnected);
        assert!(drain_messages(&mut rx).is_empty());
    }

    #[test]
    fn valid_command_toggles_quoting() {
        let (bus, reconciler) = setup();
        let mut rx = bus.subscribe();

        bus.dispatch(Topic::ActiveState, &json!({"state": 1}));

        assert_eq!(reconciler.quoting_state(), ConnectivityState::Connected);
        let messages = drain_messages(&mut rx);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].topic, Topic::ActiveState);
        assert_eq!(
            bus.snapshot(Topic::ActiveState),
            Some(json!([{"state": 1}]))
        );
    }

    #[test]
    fn snapshots_reflect_current_state() {
        let (bus, reconciler) = setup();
        assert_eq!(
            bus.snapshot(Topic::ExchangeConnectivity),
            Some(json!([{"status": 1}]))
        );
        reconciler.set_leg(GatewayType::OrderEntry, ConnectivityState::Disconnected);
        assert_eq!(
            bus.snapshot(Topic::ExchangeConnectivity),
            Some(json!([{"status": 0}]))
        );

        let product = bus.snapshot(Topic::ProductAdvertisement).unwrap();
        assert_eq!(product[0]["exchange"], json!("null"));
        assert_eq!(product[0]["pair"]["quote"], json!("EUR"));
        assert_eq!(product[0]["environment"], json!("-lab"));
        assert_eq!(product[0]["homepage"], json!(HOMEPAGE));
    }
}

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectivityState {
    #[default]
    Disconnected,
    Connected,
}

impl ConnectivityState {
    pub fn as_wire(self) -> i64 {
        match self {
            ConnectivityState::Disconnected => 0,
            ConnectivityState::Connected => 1,
        }
    }

    pub fn from_wire(value: i64) -> Option<Self> {
        match value {
            0 => Some(ConnectivityState::Disconnected),
            1 => Some(ConnectivityState::Connected),
            _ => None,
        }
    }

    pub fn is_connected(self) -> bool {
        self == ConnectivityState::Connected
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConnectivityState::Disconnected => write!(f, "DISCONNECTED"),
            ConnectivityState::Connected => write!(f, "CONNECTED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayType {
    OrderEntry,
    MarketData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    New,
    Working,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    pub fn as_wire(self) -> i64 {
        match self {
            OrderStatus::New => 0,
            OrderStatus::Working => 1,
            OrderStatus::Filled => 2,
            OrderStatus::Cancelled => 3,
            OrderStatus::Rejected => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Bid,
    Ask,
}

impl Side {
    pub fn as_wire(self) -> i64 {
        match self {
            Side::Bid => 0,
            Side::Ask => 1,
        }
    }
}

/// Order acknowledgement as reported by an adapter. Absent fields stay `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderUpdate {
    pub order_id: Option<String>,
    pub exchange_id: Option<String>,
    pub status: OrderStatus,
    pub price: Option<Decimal>,
    pub quantity: Option<Decimal>,
    pub last_quantity: Option<Decimal>,
}

impl OrderUpdate {
    pub fn new(status: OrderStatus) -> Self {
        Self {
            order_id: None,
            exchange_id: None,
            status,
            price: None,
            quantity: None,
            last_quantity: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeTick {
    pub price: Decimal,
    pub size: Decimal,
    pub make_side: Side,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BookLevel {
    pub price: Decimal,
    pub size: Decimal,
}

impl BookLevel {
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }
}

/// Depth snapshot; both sides ordered best to worst.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BookSnapshot {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Balance {
    pub currency: String,
    pub amount: Decimal,
    pub held: Decimal,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct WalletSnapshot {
    pub balances: Vec<Balance>,
}

/// Static product facts an adapter knows about the traded pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductSpec {
    pub base: String,
    pub quote: String,
    pub min_tick: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairInfo {
    pub base: String,
    pub quote: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductInfo {
    pub exchange: String,
    pub pair: PairInfo,
    #[serde(rename = "minTick", serialize_with = "serialize_decimal")]
    pub min_tick: Decimal,
    pub environment: String,
    pub matryoshka: String,
    pub homepage: String,
}

fn serialize_decimal<S>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_f64(value.to_f64().unwrap_or_default())
}

/// JSON number for a decimal price or size.
pub fn decimal_value(value: Decimal) -> Value {
    value.to_f64().map(Value::from).unwrap_or(Value::Null)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    ProductAdvertisement,
    ExchangeConnectivity,
    ActiveState,
    MarketDataGateway,
    MarketTradeGateway,
    OrderStatusReports,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::ProductAdvertisement => "ProductAdvertisement",
            Topic::ExchangeConnectivity => "ExchangeConnectivity",
            Topic::ActiveState => "ActiveState",
            Topic::MarketDataGateway => "MarketDataGateway",
            Topic::MarketTradeGateway => "MarketTradeGateway",
            Topic::OrderStatusReports => "OrderStatusReports",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Topic {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ProductAdvertisement" => Ok(Topic::ProductAdvertisement),
            "ExchangeConnectivity" => Ok(Topic::ExchangeConnectivity),
            "ActiveState" => Ok(Topic::ActiveState),
            "MarketDataGateway" => Ok(Topic::MarketDataGateway),
            "MarketTradeGateway" => Ok(Topic::MarketTradeGateway),
            "OrderStatusReports" => Ok(Topic::OrderStatusReports),
            other => Err(format!("unknown topic '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn connectivity_wire_values_round_trip_only_for_known_states() {
        assert_eq!(ConnectivityState::Disconnected.as_wire(), 0);
        assert_eq!(ConnectivityState::Connected.as_wire(), 1);
        assert_eq!(
            ConnectivityState::from_wire(1),
            Some(ConnectivityState::Connected)
        );
        assert_eq!(ConnectivityState::from_wire(2), None);
        assert_eq!(ConnectivityState::from_wire(-1), None);
    }

    #[test]
    fn product_info_serializes_with_ui_field_names() {
        let info = ProductInfo {
            exchange: "null".to_string(),
            pair: PairInfo {
                base: "BTC".to_string(),
                quote: "EUR".to_string(),
            },
            min_tick: dec!(0.01),
            environment: "-x".to_string(),
            matryoshka: "https://example.invalid".to_string(),
            homepage: "https://example.invalid/home".to_string(),
        };
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["pair"]["base"], "BTC");
        assert_eq!(value["minTick"].as_f64(), Some(0.01));
        assert_eq!(value["environment"], "-x");
    }

    #[test]
    fn topic_parses_its_own_name() {
        for topic in [
            Topic::ProductAdvertisement,
            Topic::ExchangeConnectivity,
            Topic::ActiveState,
            Topic::MarketDataGateway,
            Topic::MarketTradeGateway,
            Topic::OrderStatusReports,
        ] {
            assert_eq!(topic.as_str().parse::<Topic>(), Ok(topic));
        }
        assert!("Nope".parse::<Topic>().is_err());
    }
}

use async_trait::async_trait;

use crate::config::PairSpec;
use crate::gateway::{Gateway, GatewayError, GatewayEvents};
use crate::models::{BookSnapshot, ProductSpec, WalletSnapshot};
use crate::ports::null_gateway::NullGateway;

/// Adapter selected by exchange name, with failures logged per operation.
pub struct GatewayBox {
    pub inner: Box<dyn Gateway>,
    exchange: String,
}

impl GatewayBox {
    fn report_failure(&self, operation: &str, err: &GatewayError) {
        match err {
            GatewayError::Disconnected(_) => {
                log::debug!("[GW] {} {} while disconnected: {}", self.exchange, operation, err)
            }
            _ => log::warn!("[GW] {} {} failed: {}", self.exchange, operation, err),
        }
    }

    pub fn create(exchange: &str, pair: &PairSpec) -> Result<Self, GatewayError> {
        match exchange {
            "null" => Ok(GatewayBox {
                inner: Box::new(NullGateway::new(pair)),
                exchange: exchange.to_string(),
            }),
            _ => Err(GatewayError::Other(format!(
                "Unsupported exchange: {}",
                exchange
            ))),
        }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }
}

#[async_trait]
impl Gateway for GatewayBox {
    fn product(&self) -> ProductSpec {
        self.inner.product()
    }

    async fn start(&self, events: GatewayEvents) -> Result<(), GatewayError> {
        let result = self.inner.start(events).await;
        if let Err(ref err) = result {
            self.report_failure("start", err);
        }
        result
    }

    async fn stop(&self) -> Result<(), GatewayError> {
        let result = self.inner.stop().await;
        if let Err(ref err) = result {
            self.report_failure("stop", err);
        }
        result
    }

    async fn book(&self) -> Result<BookSnapshot, GatewayError> {
        let result = self.inner.book().await;
        if let Err(ref err) = result {
            self.report_failure("book", err);
        }
        result
    }

    async fn pos(&self) -> Result<WalletSnapshot, GatewayError> {
        let result = self.inner.pos().await;
        if let Err(ref err) = result {
            self.report_failure("pos", err);
        }
        result
    }

    async fn cancel_all(&self) -> Result<(), GatewayError> {
        let result = self.inner.cancel_all().await;
        if let Err(ref err) = result {
            self.report_failure("cancel_all", err);
        }
        result
    }
}

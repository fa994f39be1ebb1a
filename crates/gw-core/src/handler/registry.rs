//! Maps a `ProtocolKind` to the handler instance that serves it.

use super::ProtocolHandler;
use crate::error::GatewayError;
use gw_protocol::ProtocolKind;
use std::collections::HashMap;
use std::sync::Arc;

/// A fixed set of protocol handlers, one per supported wire family.
/// Built once at startup; `Gateway` looks a device's handler up by its
/// `ProtocolKind` on every operation.
pub struct HandlerRegistry {
    handlers: HashMap<ProtocolKind, Arc<dyn ProtocolHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        HandlerRegistry {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, handler: Arc<dyn ProtocolHandler>) {
        self.handlers.insert(handler.protocol_kind(), handler);
    }

    pub fn get(&self, kind: ProtocolKind) -> Result<&Arc<dyn ProtocolHandler>, GatewayError> {
        self.handlers
            .get(&kind)
            .ok_or(GatewayError::UnsupportedProtocol(kind))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ProtocolHandler>> {
        self.handlers.values()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{ObjectAddressedHandler, RegisterAddressedHandler};
    use crate::resilience::RetryPolicy;
    use std::time::Duration;

    fn retry_policy() -> RetryPolicy {
        RetryPolicy::new(1, Duration::from_millis(1), Duration::from_millis(1))
    }

    #[test]
    fn unregistered_protocol_is_an_error() {
        let registry = HandlerRegistry::new();
        assert!(matches!(
            registry.get(ProtocolKind::RegisterAddressed),
            Err(GatewayError::UnsupportedProtocol(_))
        ));
    }

    #[test]
    fn registered_handler_is_found_by_its_own_kind() {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(RegisterAddressedHandler::new(
            10,
            Duration::from_secs(60),
            retry_policy(),
        )));
        registry.register(Arc::new(ObjectAddressedHandler::new(
            10,
            Duration::from_secs(60),
            retry_policy(),
        )));
        assert!(registry.get(ProtocolKind::RegisterAddressed).is_ok());
        assert!(registry.get(ProtocolKind::ObjectAddressed).is_ok());
    }
}

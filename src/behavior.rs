//! Service behaviors: startup-time steps that modify a host's dispatch
//! pipeline, and the registry that builds them from configuration names.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::SinkKind;
use crate::host::{HostError, ServiceHost};
use crate::inspector::{sink_for, DiagnosticSink, MessageInspector, MessageLogger};

/// Extension name of the message logging behavior.
pub const MESSAGE_LOGGER: &str = "message-logger";

/// A one-shot modification of a host, applied before it starts listening.
pub trait ServiceBehavior: Send + Sync {
    fn name(&self) -> &str;

    /// Check that the host can accept this behavior.
    fn validate(&self, _host: &ServiceHost) -> Result<(), HostError> {
        Ok(())
    }

    fn apply_dispatch_behavior(&self, host: &mut ServiceHost);
}

/// Attaches one shared [`MessageLogger`] to every endpoint of every
/// dispatcher.
pub struct MessageLoggingBehavior {
    inspector: Arc<dyn MessageInspector>,
}

impl MessageLoggingBehavior {
    pub fn with_sink(sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            inspector: Arc::new(MessageLogger::new(sink)),
        }
    }
}

impl ServiceBehavior for MessageLoggingBehavior {
    fn name(&self) -> &str {
        MESSAGE_LOGGER
    }

    fn validate(&self, host: &ServiceHost) -> Result<(), HostError> {
        if host.dispatchers().iter().all(|d| d.endpoints().is_empty()) {
            return Err(HostError::InvalidBehavior {
                name: MESSAGE_LOGGER.to_string(),
                reason: "host exposes no endpoints".to_string(),
            });
        }
        Ok(())
    }

    fn apply_dispatch_behavior(&self, host: &mut ServiceHost) {
        for dispatcher in host.dispatchers_mut() {
            for endpoint in dispatcher.endpoints_mut() {
                endpoint
                    .runtime_mut()
                    .add_inspector(Arc::clone(&self.inspector));
            }
        }
    }
}

/// Settings a behavior factory may draw on.
#[derive(Debug, Clone)]
pub struct BehaviorContext {
    pub message_sink: SinkKind,
}

/// Builds a behavior from configuration.
pub type BehaviorFactory = fn(&BehaviorContext) -> Box<dyn ServiceBehavior>;

/// Behavior extensions addressable by name.
pub struct BehaviorRegistry {
    factories: BTreeMap<&'static str, BehaviorFactory>,
}

impl BehaviorRegistry {
    /// A registry with the built-in extensions.
    pub fn with_builtins() -> Self {
        let mut registry = Self {
            factories: BTreeMap::new(),
        };
        registry.register(MESSAGE_LOGGER, message_logger);
        registry
    }

    /// Add or replace the factory for `name`.
    pub fn register(&mut self, name: &'static str, factory: BehaviorFactory) {
        self.factories.insert(name, factory);
    }

    pub fn create(
        &self,
        name: &str,
        context: &BehaviorContext,
    ) -> Result<Box<dyn ServiceBehavior>, HostError> {
        match self.factories.get(name) {
            Some(factory) => Ok(factory(context)),
            None => Err(HostError::UnknownBehavior {
                name: name.to_string(),
                available: self.factories.keys().copied().collect::<Vec<_>>().join(", "),
            }),
        }
    }
}

fn message_logger(context: &BehaviorContext) -> Box<dyn ServiceBehavior> {
    Box::new(MessageLoggingBehavior::with_sink(sink_for(context.message_sink)))
}

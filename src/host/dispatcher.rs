//! Channel dispatchers, their endpoints, and per-endpoint dispatch runtimes.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::trace;

use crate::inspector::MessageInspector;
use crate::message::Message;
use crate::service::{Contract, HelloWorld};

/// Inspector chain wrapped around every operation an endpoint dispatches.
#[derive(Default)]
pub struct DispatchRuntime {
    inspectors: Vec<Arc<dyn MessageInspector>>,
}

impl DispatchRuntime {
    /// Append `inspector` to the chain.
    ///
    /// Returns `false` and leaves the chain untouched when this exact
    /// instance is already attached.
    pub fn add_inspector(&mut self, inspector: Arc<dyn MessageInspector>) -> bool {
        if self.inspectors.iter().any(|i| Arc::ptr_eq(i, &inspector)) {
            return false;
        }
        self.inspectors.push(inspector);
        true
    }

    pub fn inspector_count(&self) -> usize {
        self.inspectors.len()
    }

    /// Run `request` through the inspector chain and the operation.
    pub fn dispatch(&self, request: &Message, service: &dyn HelloWorld) -> Message {
        for inspector in &self.inspectors {
            inspector.after_receive_request(request);
        }

        let reply = Message::reply(request.action(), service.hello(request.body()));

        for inspector in &self.inspectors {
            inspector.before_send_reply(&reply);
        }

        reply
    }
}

/// A contract served on a dispatcher's address.
pub struct Endpoint {
    contract: Contract,
    address: SocketAddr,
    runtime: DispatchRuntime,
}

impl Endpoint {
    pub fn new(contract: Contract, address: SocketAddr) -> Self {
        Self {
            contract,
            address,
            runtime: DispatchRuntime::default(),
        }
    }

    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn runtime(&self) -> &DispatchRuntime {
        &self.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut DispatchRuntime {
        &mut self.runtime
    }
}

/// One listen address and the endpoints reachable through it.
pub struct ChannelDispatcher {
    address: SocketAddr,
    endpoints: Vec<Endpoint>,
}

impl ChannelDispatcher {
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            endpoints: Vec::new(),
        }
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn add_endpoint(&mut self, contract: Contract) {
        self.endpoints.push(Endpoint::new(contract, self.address));
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn endpoints_mut(&mut self) -> impl Iterator<Item = &mut Endpoint> {
        self.endpoints.iter_mut()
    }

    /// Route `request` to the first endpoint whose contract exposes its
    /// action. `None` if no endpoint does.
    pub fn dispatch(&self, request: &Message, service: &dyn HelloWorld) -> Option<Message> {
        let endpoint = self
            .endpoints
            .iter()
            .find(|e| e.contract.handles(request.action()))?;
        trace!(contract = endpoint.contract.name, action = request.action(), "Dispatching");
        Some(endpoint.runtime.dispatch(request, service))
    }
}

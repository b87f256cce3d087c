//! Service host: dispatchers, behavior application, and the accept loops.
//!
//! A host owns one [`ChannelDispatcher`] per listen address. Behaviors are
//! applied while the host is still mutable; once [`ServiceHost::bind`] runs,
//! every dispatch runtime is frozen and shared read-only by the connection
//! tasks.

mod connection;
mod dispatcher;

pub use dispatcher::ChannelDispatcher;

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{watch, AcquireError, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::behavior::{BehaviorContext, BehaviorRegistry, ServiceBehavior};
use crate::config::Config;
use crate::service::{HelloWorld, HELLO_WORLD};

use connection::handle_connection;

/// First pause after a failed accept
const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(10);

/// Longest pause between accept retries
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Host errors
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Unknown behavior extension '{name}' (available: {available})")]
    UnknownBehavior { name: String, available: String },
    #[error("Behavior '{name}' rejected host configuration: {reason}")]
    InvalidBehavior { name: String, reason: String },
    #[error("Failed to bind {address}: {source}")]
    Bind { address: SocketAddr, source: io::Error },
    #[error("Connection limit closed: {0}")]
    ConnectionLimit(#[from] AcquireError),
}

/// A service implementation plus the dispatchers that expose it.
pub struct ServiceHost {
    service: Arc<dyn HelloWorld>,
    dispatchers: Vec<ChannelDispatcher>,
    max_connections: usize,
    backlog: u32,
}

impl ServiceHost {
    /// Create a host with one HelloWorld dispatcher per configured address.
    pub fn new(service: Arc<dyn HelloWorld>, config: &Config) -> Self {
        let dispatchers = config
            .listen
            .iter()
            .map(|&address| {
                let mut dispatcher = ChannelDispatcher::new(address);
                dispatcher.add_endpoint(HELLO_WORLD);
                dispatcher
            })
            .collect();

        Self {
            service,
            dispatchers,
            max_connections: config.max_connections,
            backlog: config.backlog,
        }
    }

    pub fn dispatchers(&self) -> &[ChannelDispatcher] {
        &self.dispatchers
    }

    pub fn dispatchers_mut(&mut self) -> impl Iterator<Item = &mut ChannelDispatcher> {
        self.dispatchers.iter_mut()
    }

    /// Instantiate, validate and apply every named behavior, in order.
    pub fn configure(
        &mut self,
        registry: &BehaviorRegistry,
        names: &[String],
        context: &BehaviorContext,
    ) -> Result<(), HostError> {
        for name in names {
            let behavior = registry.create(name, context)?;
            self.apply_behavior(behavior.as_ref())?;
        }
        Ok(())
    }

    /// Validate `behavior` against this host, then let it modify dispatch.
    pub fn apply_behavior(&mut self, behavior: &dyn ServiceBehavior) -> Result<(), HostError> {
        behavior.validate(self)?;
        behavior.apply_dispatch_behavior(self);

        for dispatcher in &self.dispatchers {
            for endpoint in dispatcher.endpoints() {
                debug!(
                    behavior = behavior.name(),
                    contract = endpoint.contract().name,
                    address = %endpoint.address(),
                    inspectors = endpoint.runtime().inspector_count(),
                    "Behavior applied"
                );
            }
        }
        info!(behavior = behavior.name(), "Enabled behavior");
        Ok(())
    }

    /// Bind a listener for every dispatcher.
    pub fn bind(self) -> Result<BoundHost, HostError> {
        let mut listeners = Vec::with_capacity(self.dispatchers.len());
        for dispatcher in self.dispatchers {
            let address = dispatcher.address();
            let listener = create_listener(address, self.backlog)
                .map_err(|source| HostError::Bind { address, source })?;
            let local = listener
                .local_addr()
                .map_err(|source| HostError::Bind { address, source })?;
            info!(address = %local, "Listening");
            listeners.push((listener, Arc::new(dispatcher)));
        }

        Ok(BoundHost {
            service: self.service,
            listeners,
            connection_limit: Arc::new(Semaphore::new(self.max_connections)),
        })
    }
}

/// A host whose listeners are bound and whose dispatch pipeline is frozen.
pub struct BoundHost {
    service: Arc<dyn HelloWorld>,
    listeners: Vec<(TcpListener, Arc<ChannelDispatcher>)>,
    connection_limit: Arc<Semaphore>,
}

impl BoundHost {
    /// Actual bound addresses, in dispatcher order.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners
            .iter()
            .filter_map(|(listener, _)| listener.local_addr().ok())
            .collect()
    }

    /// Accept connections on every listener until `shutdown` resolves or an
    /// accept loop fails. Open connections are closed before this returns.
    pub async fn serve<F>(self, shutdown: F) -> Result<(), HostError>
    where
        F: Future<Output = ()>,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut accept_loops = JoinSet::new();
        for (listener, dispatcher) in self.listeners {
            accept_loops.spawn(accept_loop(
                listener,
                dispatcher,
                Arc::clone(&self.service),
                Arc::clone(&self.connection_limit),
                stop_rx.clone(),
            ));
        }

        let result = tokio::select! {
            _ = shutdown => {
                info!("Shutting down");
                Ok(())
            }
            Some(joined) = accept_loops.join_next() => match joined {
                Ok(result) => result,
                Err(e) => {
                    error!(error = %e, "Accept loop panicked");
                    Ok(())
                }
            },
        };

        let _ = stop_tx.send(true);
        while let Some(joined) = accept_loops.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Accept loop failed during shutdown"),
                Err(e) => error!(error = %e, "Accept loop panicked"),
            }
        }
        result
    }
}

/// Pause after a failed accept, doubling per consecutive failure.
fn accept_backoff(consecutive_errors: u32) -> Duration {
    ACCEPT_BACKOFF_MIN
        .saturating_mul(2u32.saturating_pow(consecutive_errors.saturating_sub(1)))
        .min(ACCEPT_BACKOFF_MAX)
}

async fn accept_loop(
    listener: TcpListener,
    dispatcher: Arc<ChannelDispatcher>,
    service: Arc<dyn HelloWorld>,
    connection_limit: Arc<Semaphore>,
    mut stop: watch::Receiver<bool>,
) -> Result<(), HostError> {
    let mut connections = JoinSet::new();
    let mut accept_errors = 0u32;

    let result = loop {
        while let Some(done) = connections.try_join_next() {
            if let Err(e) = done {
                error!(error = %e, "Connection task panicked");
            }
        }

        // Wait for a connection slot
        let permit = tokio::select! {
            permit = Arc::clone(&connection_limit).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(e) => break Err(e.into()),
            },
            _ = stop.changed() => break Ok(()),
        };

        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = stop.changed() => break Ok(()),
        };

        match accepted {
            Ok((stream, peer)) => {
                accept_errors = 0;
                debug!(peer = %peer, address = %dispatcher.address(), "New connection");

                let dispatcher = Arc::clone(&dispatcher);
                let service = Arc::clone(&service);

                connections.spawn(async move {
                    if let Err(e) = handle_connection(stream, &dispatcher, service.as_ref()).await
                    {
                        debug!(peer = %peer, error = %e, "Connection error");
                    }
                    drop(permit);
                });
            }
            Err(e) => {
                accept_errors = accept_errors.saturating_add(1);
                let pause = accept_backoff(accept_errors);
                warn!(error = %e, pause_ms = pause.as_millis() as u64, "Failed to accept connection");
                drop(permit);
                tokio::select! {
                    _ = tokio::time::sleep(pause) => {}
                    _ = stop.changed() => break Ok(()),
                }
            }
        }
    };

    if !connections.is_empty() {
        debug!(address = %dispatcher.address(), open = connections.len(), "Closing open connections");
    }
    connections.shutdown().await;
    result
}

/// Create a non-blocking TCP listener with SO_REUSEADDR.
fn create_listener(addr: SocketAddr, backlog: u32) -> io::Result<TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(i32::try_from(backlog).unwrap_or(i32::MAX))?;

    TcpListener::from_std(socket.into())
}

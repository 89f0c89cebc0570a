//! Connection Lifecycle Controller.
//!
//! Owns the transport handle and the Pending Registry, pumps transport
//! events, and fails every pending request when the link drops.
//!
//! ```text
//!   Idle ──connect()──→ Connecting ──ready──→ Online ⇄ Offline
//!     │                     │                   │         │
//!     └─────────────────────┴───── close() ─────┴─────────┴──→ Closed
//! ```
//!
//! On disconnect the order is fixed: `online = false`, then the
//! `rpc-disconnect` notification, then the registry drain. Transport errors
//! are forwarded as notifications and never touch the registry.

use crate::domain::config::{ClientConfig, ConfigError, TraceLevel};
use crate::domain::correlation::{CorrelationId, IdGenerator, UuidV7Generator};
use crate::domain::envelope::{InboundFrame, OutboundFrame};
use crate::domain::error::{RpcError, RpcResult};
use crate::domain::invocation::Reply;
use crate::domain::pending::PendingRegistry;
use crate::ports::transport::{Transport, TransportEvent, TransportEvents};
use crate::sweeper::spawn_sweeper;
use flow_events::{ConnectionEvent, EventBus, EventFilter, EventPublisher, Subscription};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Protocol-specific handling of decoded inbound frames.
///
/// Implemented by each adapter; called on the connection's pump task.
pub trait InboundRouter: Send + Sync {
    fn route(&self, conn: &Connection, frame: InboundFrame);
}

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Online,
    Offline,
    Closed,
}

#[derive(Default)]
struct ConnectionTasks {
    pump: Option<JoinHandle<()>>,
    sweeper: Option<JoinHandle<()>>,
}

/// One client connection: transport, registry and notification bus.
pub struct Connection {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    router: Arc<dyn InboundRouter>,
    pending: Arc<PendingRegistry>,
    events: Arc<EventBus>,
    ids: Arc<dyn IdGenerator>,
    /// Transport reported readiness
    online: AtomicBool,
    /// connect() has been invoked
    connect_requested: AtomicBool,
    /// Incremented on every transport `connect` signal
    generation: AtomicU64,
    state: RwLock<ConnectionState>,
    trace: AtomicU8,
    tasks: Mutex<ConnectionTasks>,
}

impl Connection {
    /// Open the transport and start the inbound pump and the sweeper.
    ///
    /// Only the first call does anything; later calls return `Ok(())`. With
    /// an empty `path` this is a no-op. If the transport cannot be opened a
    /// `rpc-connect-error` notification is published, the error is returned
    /// and a later `connect()` may try again.
    pub async fn connect(self: &Arc<Self>) -> RpcResult<()> {
        if self.config.path.is_empty() {
            debug!(client_id = %self.config.id, "No channel path configured, connect skipped");
            return Ok(());
        }

        if self
            .connect_requested
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(client_id = %self.config.id, "connect() already invoked");
            return Ok(());
        }

        self.transition(ConnectionState::Connecting);
        self.events.publish(ConnectionEvent::Connecting {
            client_id: self.config.id.clone(),
        });

        let endpoint = self.config.endpoint();
        let stream = match self.transport.connect(&endpoint, &self.config.args).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(
                    client_id = %self.config.id,
                    endpoint = %endpoint,
                    error = %e,
                    "Transport connect failed"
                );
                self.transition(ConnectionState::Idle);
                self.connect_requested.store(false, Ordering::Release);
                self.events.publish(ConnectionEvent::ConnectError {
                    client_id: self.config.id.clone(),
                    reason: e.to_string(),
                });
                return Err(RpcError::TransportConnect(e.to_string()));
            }
        };

        info!(client_id = %self.config.id, endpoint = %endpoint, "Transport opened");

        // Hold the lock so a pump that finishes immediately still finds the sweeper.
        let mut tasks = self.tasks.lock();
        tasks.sweeper = Some(spawn_sweeper(
            Arc::clone(&self.pending),
            self.config.sweep_interval(),
            self.config.timeout(),
        ));
        tasks.pump = Some(tokio::spawn(pump(Arc::downgrade(self), stream)));
        Ok(())
    }

    /// Close the transport.
    ///
    /// Pending requests are failed when the transport reports the resulting
    /// disconnect, not here.
    pub async fn close(&self) {
        let previous = std::mem::replace(&mut *self.state.write(), ConnectionState::Closed);
        if previous == ConnectionState::Closed {
            return;
        }

        info!(client_id = %self.config.id, "Closing connection");
        self.transport.close().await;

        if self.tasks.lock().pump.is_none() {
            self.publish_closed();
        }
    }

    /// Send one frame without correlation.
    pub fn transmit(&self, frame: &OutboundFrame) -> RpcResult<()> {
        let payload = frame.to_payload()?;
        self.transport
            .send(frame.kind(), payload)
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        debug!(
            client_id = %self.config.id,
            kind = frame.kind(),
            subject = frame.subject().unwrap_or_default(),
            "Frame sent"
        );
        Ok(())
    }

    /// Allocate an id, register `reply` under it, then send the frame built
    /// for that id.
    ///
    /// Every failure is delivered through `reply`; the id is returned either
    /// way.
    pub fn issue<F>(&self, subject: &str, reply: Reply, build: F) -> CorrelationId
    where
        F: FnOnce(CorrelationId) -> OutboundFrame,
    {
        let id = self.ids.next_id();
        if !self.pending.register(id, subject, reply) {
            return id;
        }

        if let Err(e) = self.transmit(&build(id)) {
            warn!(
                client_id = %self.config.id,
                correlation_id = %id,
                subject = subject,
                error = %e,
                "Transmit failed, failing pending request"
            );
            self.pending.resolve(id, Err(e));
        }
        id
    }

    /// Resolve a pending request from a response frame.
    ///
    /// Responses without an id are ignored; ids that are not pending are
    /// logged and dropped.
    pub fn resolve_response(&self, rid: Option<Value>, error: Option<Value>, data: Value) -> bool {
        let Some(rid) = rid else {
            debug!(client_id = %self.config.id, "Response without rid ignored");
            return false;
        };

        let Some(id) = CorrelationId::from_wire(&rid) else {
            self.pending
                .stats()
                .total_unknown
                .fetch_add(1, Ordering::Relaxed);
            warn!(
                client_id = %self.config.id,
                rid = %rid,
                "Response for unknown correlation id (strange server-side retransmit?)"
            );
            return false;
        };

        let result = match error {
            Some(e) => Err(RpcError::Remote(e)),
            None => Ok(data),
        };
        self.pending.resolve(id, result)
    }

    /// Deliver an uncorrelated message to subject handlers.
    pub fn notify(&self, subject: &str, data: &Value) -> usize {
        match self.trace() {
            TraceLevel::Off => {}
            TraceLevel::Subjects => {
                info!(client_id = %self.config.id, subject = subject, "RPC inbound");
            }
            TraceLevel::Full => {
                info!(client_id = %self.config.id, subject = subject, data = %data, "RPC inbound");
            }
        }
        self.events.emit(subject, data)
    }

    /// Subscribe to lifecycle notifications.
    pub fn lifecycle(&self, filter: EventFilter) -> Subscription {
        self.events.subscribe(filter)
    }

    pub fn set_trace(&self, level: TraceLevel) {
        self.trace.store(level.into(), Ordering::Relaxed);
    }

    pub fn trace(&self) -> TraceLevel {
        TraceLevel::try_from(self.trace.load(Ordering::Relaxed)).unwrap_or_default()
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Whether `connect()` has been invoked (and not failed).
    pub fn is_connect_requested(&self) -> bool {
        self.connect_requested.load(Ordering::Acquire)
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn pending(&self) -> &PendingRegistry {
        &self.pending
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Move to `to` unless already closed.
    fn transition(&self, to: ConnectionState) -> bool {
        let mut state = self.state.write();
        if *state == ConnectionState::Closed {
            return false;
        }
        if *state != to {
            debug!(client_id = %self.config.id, from = ?*state, to = ?to, "State transition");
            *state = to;
        }
        true
    }

    /// Handle one transport event. Returns false when the pump should stop.
    fn on_transport_event(&self, event: TransportEvent) -> bool {
        let client_id = self.config.id.clone();
        match event {
            TransportEvent::Ready => {
                self.online.store(true, Ordering::Release);
                self.transition(ConnectionState::Online);
                info!(client_id = %client_id, "RPC ready");
                self.events.publish(ConnectionEvent::Ready { client_id });
            }
            TransportEvent::Connect => {
                // Replies to the previous generation's requests never arrive.
                if self.generation.load(Ordering::Acquire) > 0 {
                    self.pending.drain_all("transport reconnected");
                }
                let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
                info!(client_id = %client_id, generation = generation, "RPC connected");
                self.events.publish(ConnectionEvent::Connected {
                    client_id,
                    generation,
                });
            }
            TransportEvent::ConnectError(reason) => {
                warn!(client_id = %client_id, reason = %reason, "RPC connect error");
                self.events
                    .publish(ConnectionEvent::ConnectError { client_id, reason });
            }
            TransportEvent::Error(reason) => {
                error!(client_id = %client_id, reason = %reason, "RPC error");
                self.events.publish(ConnectionEvent::Error { client_id, reason });
            }
            TransportEvent::Offline => {
                info!(client_id = %client_id, "RPC offline");
                self.events.publish(ConnectionEvent::Offline { client_id });
            }
            TransportEvent::Disconnect(reason) => {
                self.handle_disconnect(&reason);
                return self.state() != ConnectionState::Closed;
            }
            TransportEvent::Message { kind, payload } => match InboundFrame::decode(&kind, payload) {
                Ok(frame) => self.router.route(self, frame),
                Err(e) => {
                    warn!(client_id = %client_id, kind = %kind, error = %e, "Dropping undecodable frame");
                }
            },
        }
        true
    }

    fn handle_disconnect(&self, reason: &str) {
        self.online.store(false, Ordering::Release);
        self.transition(ConnectionState::Offline);
        info!(client_id = %self.config.id, reason = reason, "RPC disconnected");

        self.events.publish(ConnectionEvent::Disconnected {
            client_id: self.config.id.clone(),
            reason: reason.to_string(),
        });
        self.pending.drain_all(reason);
    }

    /// The event stream ended: the transport is gone for good.
    fn on_stream_end(&self) {
        if self.is_online() || !self.pending.is_empty() {
            self.handle_disconnect("transport stream ended");
        }
        *self.state.write() = ConnectionState::Closed;
    }

    fn finish(&self) {
        if let Some(sweeper) = self.tasks.lock().sweeper.take() {
            sweeper.abort();
        }
        self.publish_closed();
    }

    fn publish_closed(&self) {
        info!(client_id = %self.config.id, "Connection closed");
        self.events.publish(ConnectionEvent::Closed {
            client_id: self.config.id.clone(),
        });
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut();
        for handle in [tasks.pump.take(), tasks.sweeper.take()].into_iter().flatten() {
            handle.abort();
        }
    }
}

/// Inbound pump: applies transport events to the connection until the link
/// is closed for good or the connection is dropped.
async fn pump(conn: Weak<Connection>, mut events: TransportEvents) {
    while let Some(event) = events.recv().await {
        let Some(conn) = conn.upgrade() else {
            return;
        };
        if !conn.on_transport_event(event) {
            conn.finish();
            return;
        }
    }

    if let Some(conn) = conn.upgrade() {
        conn.on_stream_end();
        conn.finish();
    }
}

/// Builds clients sharing one configuration, transport and optional bus.
pub struct ClientBuilder {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    ids: Arc<dyn IdGenerator>,
    events: Option<Arc<EventBus>>,
}

impl ClientBuilder {
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            ids: Arc::new(UuidV7Generator),
            events: None,
        }
    }

    /// Replace the default UUID v7 id generator.
    #[must_use]
    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Share an existing notification bus instead of creating one.
    #[must_use]
    pub fn event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub(crate) fn build_connection(
        self,
        router: Arc<dyn InboundRouter>,
    ) -> Result<Arc<Connection>, ConfigError> {
        self.config.validate()?;

        let events = self
            .events
            .unwrap_or_else(|| Arc::new(EventBus::with_capacity(self.config.event_capacity)));
        let trace = u8::from(self.config.trace);

        Ok(Arc::new(Connection {
            config: self.config,
            transport: self.transport,
            router,
            pending: Arc::new(PendingRegistry::new()),
            events,
            ids: self.ids,
            online: AtomicBool::new(false),
            connect_requested: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            state: RwLock::new(ConnectionState::Idle),
            trace: AtomicU8::new(trace),
            tasks: Mutex::new(ConnectionTasks::default()),
        }))
    }
}

//! In-memory transport connecting client calls to a handler registry.
//!
//! Both directions follow the credit contract the drivers rely on:
//!
//! - Messages queue at the sender and are delivered only against credit the
//!   receiver granted with `request(n)`.
//! - A sender is ready while the receiver holds unused credit, or while
//!   fewer than `window` messages sit queued past the receiver's credit.
//!   With the default window of 0 readiness follows credit exactly.
//!   `on_ready` fires on every transition back to ready.
//! - Listener callbacks for one side run sequentially on a dedicated delivery
//!   task, never while the call's lock is held.
//! - OK closes wait for queued responses to drain; failures and cancellations
//!   discard queued messages and are delivered at once.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use dashmap::DashMap;
use log::debug;
use tokio::sync::mpsc;

use crate::client::CallOptions;
use crate::codec::Payload;
use crate::config::TransportSettings;
use crate::error::Status;
use crate::metadata::Metadata;

use super::{
    Channel, ClientCall, ClientCallListener, HandlerRegistry, MethodInfo, ServerCall,
    ServerCallListener,
};

const LOG_TARGET: &str = "nagare::transport";

/// Server end of the in-process transport.
#[derive(Clone)]
pub struct InProcessServer {
    inner: Arc<ServerInner>,
}

struct ServerInner {
    registry: HandlerRegistry,
    window: usize,
    active: DashMap<u64, Arc<Pipe>>,
    next_id: AtomicU64,
}

impl InProcessServer {
    pub fn new(registry: HandlerRegistry, settings: &TransportSettings) -> Self {
        Self {
            inner: Arc::new(ServerInner {
                registry,
                window: settings.window,
                active: DashMap::new(),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// A channel whose calls are served by this server.
    pub fn channel(&self) -> InProcessChannel {
        InProcessChannel {
            server: Arc::clone(&self.inner),
        }
    }

    /// Number of calls started and not yet closed.
    pub fn active_calls(&self) -> usize {
        self.inner.active.len()
    }

    /// Abort every active call: clients see `UNAVAILABLE`, handlers see a
    /// cancellation.
    pub fn shutdown_now(&self) {
        let pipes: Vec<Arc<Pipe>> = self
            .inner
            .active
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        debug!(
            target: LOG_TARGET,
            "Shutting down in-process server with {} active calls",
            pipes.len()
        );
        for pipe in pipes {
            pipe.abort(Status::unavailable("server shutting down"));
        }
    }
}

/// Client end of the in-process transport.
#[derive(Clone)]
pub struct InProcessChannel {
    server: Arc<ServerInner>,
}

impl Channel for InProcessChannel {
    fn new_call(&self, method: &MethodInfo, options: &CallOptions) -> Arc<dyn ClientCall> {
        let id = self.server.next_id.fetch_add(1, Ordering::Relaxed);
        let pipe = Arc::new(Pipe {
            id,
            method: method.clone(),
            window: self.server.window,
            timeout: options.timeout,
            server: Arc::downgrade(&self.server),
            state: Mutex::new(PipeState::default()),
        });
        Arc::new(InProcessClientCall { pipe })
    }
}

enum ClientEvent {
    Headers(Metadata),
    Message(Payload),
    Ready,
    Close(Status, Metadata),
}

enum ServerEvent {
    Message(Payload),
    HalfClose,
    Ready,
    Cancel,
    Complete,
}

/// Shared state of one call, seen from both ends.
struct Pipe {
    id: u64,
    method: MethodInfo,
    window: usize,
    timeout: Option<Duration>,
    server: Weak<ServerInner>,
    state: Mutex<PipeState>,
}

#[derive(Default)]
struct PipeState {
    client_events: Option<mpsc::UnboundedSender<ClientEvent>>,
    server_events: Option<mpsc::UnboundedSender<ServerEvent>>,
    to_server: VecDeque<Payload>,
    server_credits: usize,
    half_closed: bool,
    half_close_delivered: bool,
    to_client: VecDeque<Payload>,
    client_credits: usize,
    pending_close: Option<(Status, Metadata)>,
    /// Last readiness reported to each sender through `on_ready`.
    client_ready_reported: bool,
    server_ready_reported: bool,
    started: bool,
    closed: bool,
    cancelled: bool,
}

impl Pipe {
    fn lock(&self) -> std::sync::MutexGuard<'_, PipeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether the client may send another request without exceeding the window.
    fn client_can_send(&self, state: &PipeState) -> bool {
        !state.closed
            && !state.half_closed
            && (state.server_credits > 0 || state.to_server.len() < self.window)
    }

    /// Whether the server may send another response without exceeding the window.
    fn server_can_send(&self, state: &PipeState) -> bool {
        !state.closed
            && state.pending_close.is_none()
            && (state.client_credits > 0 || state.to_client.len() < self.window)
    }

    /// Deliver whatever the current credits allow, in order, then report
    /// senders that became ready.
    fn pump(&self, state: &mut PipeState) {
        if let Some(events) = &state.server_events {
            while state.server_credits > 0 {
                let Some(message) = state.to_server.pop_front() else {
                    break;
                };
                state.server_credits -= 1;
                let _ = events.send(ServerEvent::Message(message));
            }
            if state.half_closed && !state.half_close_delivered && state.to_server.is_empty() {
                state.half_close_delivered = true;
                let _ = events.send(ServerEvent::HalfClose);
            }
        }

        if let Some(events) = &state.client_events {
            while state.client_credits > 0 {
                let Some(message) = state.to_client.pop_front() else {
                    break;
                };
                state.client_credits -= 1;
                let _ = events.send(ClientEvent::Message(message));
            }
        }

        let client_ready = self.client_can_send(state);
        if let Some(client) = &state.client_events {
            if client_ready && !state.client_ready_reported {
                let _ = client.send(ClientEvent::Ready);
            }
            state.client_ready_reported = client_ready;
        }
        let server_ready = self.server_can_send(state);
        if let Some(server) = &state.server_events {
            if server_ready && !state.server_ready_reported {
                let _ = server.send(ServerEvent::Ready);
            }
            state.server_ready_reported = server_ready;
        }

        if state.to_client.is_empty() {
            if let Some((status, trailers)) = state.pending_close.take() {
                if let Some(client) = &state.client_events {
                    let _ = client.send(ClientEvent::Close(status, trailers));
                }
                if let Some(server) = &state.server_events {
                    let _ = server.send(ServerEvent::Complete);
                }
                self.finish(state);
            }
        }
    }

    /// Mark the call closed and release both delivery tasks.
    fn finish(&self, state: &mut PipeState) {
        state.closed = true;
        state.to_server.clear();
        state.to_client.clear();
        state.client_events = None;
        state.server_events = None;
        if let Some(server) = self.server.upgrade() {
            server.active.remove(&self.id);
        }
    }

    /// Close the call from outside either endpoint's normal flow.
    fn abort(&self, client_status: Status) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        debug!(
            target: LOG_TARGET,
            "Aborting call {} ({}): {}",
            self.id,
            self.method.full_name(),
            client_status
        );
        if let Some(client) = &state.client_events {
            let _ = client.send(ClientEvent::Close(client_status.for_wire(), Metadata::new()));
        }
        if let Some(server) = &state.server_events {
            let _ = server.send(ServerEvent::Cancel);
        }
        state.cancelled = true;
        self.finish(&mut state);
    }
}

struct InProcessClientCall {
    pipe: Arc<Pipe>,
}

impl ClientCall for InProcessClientCall {
    fn start(&self, listener: Arc<dyn ClientCallListener>, headers: Metadata) {
        let pipe = &self.pipe;
        {
            let mut state = pipe.lock();
            if state.started {
                debug!(target: LOG_TARGET, "Call {} started twice, ignoring", pipe.id);
                return;
            }
            state.started = true;
            state.client_events = Some(spawn_client_delivery(listener));
        }

        let Some(server) = pipe.server.upgrade() else {
            pipe.abort(Status::unavailable("server is gone"));
            return;
        };
        let Some(definition) = server.registry.lookup(pipe.method.full_name()).cloned() else {
            pipe.abort(Status::unimplemented(format!(
                "method not found: {}",
                pipe.method.full_name()
            )));
            return;
        };
        server.active.insert(pipe.id, Arc::clone(pipe));
        debug!(
            target: LOG_TARGET,
            "Starting call {} for {}",
            pipe.id,
            pipe.method.full_name()
        );

        let server_call: Arc<dyn ServerCall> = Arc::new(InProcessServerCall {
            pipe: Arc::clone(pipe),
        });
        let server_listener = definition.handler().start_call(server_call, headers);

        {
            let mut state = pipe.lock();
            if state.closed {
                return;
            }
            state.server_events = Some(spawn_server_delivery(server_listener));
            pipe.pump(&mut state);
        }

        if let Some(timeout) = pipe.timeout {
            let pipe = Arc::downgrade(pipe);
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                if let Some(pipe) = pipe.upgrade() {
                    pipe.abort(Status::deadline_exceeded(format!(
                        "deadline exceeded after {timeout:?}"
                    )));
                }
            });
        }
    }

    fn request(&self, n: usize) {
        let mut state = self.pipe.lock();
        state.client_credits = state.client_credits.saturating_add(n);
        self.pipe.pump(&mut state);
    }

    fn send_message(&self, message: Payload) {
        let mut state = self.pipe.lock();
        if state.closed || state.half_closed {
            debug!(
                target: LOG_TARGET,
                "Dropping request on call {}: call no longer accepts messages",
                self.pipe.id
            );
            return;
        }
        state.to_server.push_back(message);
        self.pipe.pump(&mut state);
    }

    fn half_close(&self) {
        let mut state = self.pipe.lock();
        if state.closed || state.half_closed {
            return;
        }
        state.half_closed = true;
        self.pipe.pump(&mut state);
    }

    fn cancel(&self, status: Status) {
        self.pipe
            .abort(Status::cancelled(format!("call cancelled: {}", status.message())));
    }

    fn is_ready(&self) -> bool {
        let state = self.pipe.lock();
        self.pipe.client_can_send(&state)
    }
}

struct InProcessServerCall {
    pipe: Arc<Pipe>,
}

impl ServerCall for InProcessServerCall {
    fn method(&self) -> &MethodInfo {
        &self.pipe.method
    }

    fn request(&self, n: usize) {
        let mut state = self.pipe.lock();
        state.server_credits = state.server_credits.saturating_add(n);
        self.pipe.pump(&mut state);
    }

    fn send_headers(&self, headers: Metadata) {
        let state = self.pipe.lock();
        if state.closed {
            return;
        }
        if let Some(client) = &state.client_events {
            let _ = client.send(ClientEvent::Headers(headers));
        }
    }

    fn send_message(&self, message: Payload) {
        let mut state = self.pipe.lock();
        if state.closed || state.pending_close.is_some() {
            return;
        }
        state.to_client.push_back(message);
        self.pipe.pump(&mut state);
    }

    fn is_ready(&self) -> bool {
        let state = self.pipe.lock();
        self.pipe.server_can_send(&state)
    }

    fn close(&self, status: Status, trailers: Metadata) {
        let mut state = self.pipe.lock();
        if state.closed || state.pending_close.is_some() {
            return;
        }
        if status.is_ok() {
            state.pending_close = Some((status.for_wire(), trailers));
            self.pipe.pump(&mut state);
            return;
        }
        state.to_client.clear();
        if let Some(client) = &state.client_events {
            let _ = client.send(ClientEvent::Close(status.for_wire(), trailers));
        }
        if let Some(server) = &state.server_events {
            let _ = server.send(ServerEvent::Complete);
        }
        self.pipe.finish(&mut state);
    }

    fn is_cancelled(&self) -> bool {
        self.pipe.lock().cancelled
    }
}

fn spawn_client_delivery(
    listener: Arc<dyn ClientCallListener>,
) -> mpsc::UnboundedSender<ClientEvent> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                ClientEvent::Headers(headers) => listener.on_headers(headers),
                ClientEvent::Message(message) => listener.on_message(message),
                ClientEvent::Ready => listener.on_ready(),
                ClientEvent::Close(status, trailers) => {
                    listener.on_close(status, trailers);
                    break;
                }
            }
        }
    });
    tx
}

fn spawn_server_delivery(
    listener: Arc<dyn ServerCallListener>,
) -> mpsc::UnboundedSender<ServerEvent> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                ServerEvent::Message(message) => listener.on_message(message),
                ServerEvent::HalfClose => listener.on_half_close(),
                ServerEvent::Ready => listener.on_ready(),
                ServerEvent::Cancel => {
                    listener.on_cancel();
                    break;
                }
                ServerEvent::Complete => {
                    listener.on_complete();
                    break;
                }
            }
        }
    });
    tx
}

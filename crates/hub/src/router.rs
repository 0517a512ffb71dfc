// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Routes messages between local protocol stacks and remote connections.
//!
//! ```text
//!   local endpoints              remote endpoints
//!   (protocol stacks)            (peer connections)
//!         │   ▲                        │   ▲
//!         ▼   │                        ▼   │
//!   ┌──────────────────── router task ────────────────────┐
//!   │ routes: RouteId → (endpoint, announcement)           │
//!   │ broadcasts cross sides: local → remote, remote → local│
//!   └──────────────────────────────────────────────────────┘
//! ```
//!
//! All routing state belongs to one task. Endpoints talk to it through a
//! command channel, so registration of an endpoint is always processed
//! before any message that endpoint sends.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use plexus_core::{
    AsyncConnection, DiscardingFailureHandler, Dispatch, Executor, FailureHandler, Message,
    MessagingError, RouteId, Stoppable,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Local,
    Remote,
}

impl Side {
    fn opposite(self) -> Side {
        match self {
            Side::Local => Side::Remote,
            Side::Remote => Side::Local,
        }
    }
}

plexus_core::simple_display! {
    Side {
        Local => "local",
        Remote => "remote",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct EndpointId(u64);

enum RouterCommand {
    Register { id: EndpointId, side: Side, delivery: Arc<Delivery> },
    Message { from: EndpointId, message: Message },
    Stop,
}

/// Delivery side of an endpoint: buffers until a handler is attached.
#[derive(Default)]
struct Delivery {
    state: Mutex<DeliveryState>,
}

#[derive(Default)]
struct DeliveryState {
    pending: VecDeque<Message>,
    handler: Option<Arc<dyn Dispatch<Message>>>,
}

impl Delivery {
    fn deliver(&self, message: Message) -> Result<(), MessagingError> {
        let mut state = self.state.lock();
        match &state.handler {
            Some(handler) => handler.dispatch(message),
            None => {
                state.pending.push_back(message);
                Ok(())
            }
        }
    }
}

/// One side of a routed connection.
///
/// Messages dispatched to an endpoint go to the router. Messages the router
/// delivers to it are buffered until `dispatch_to()` attaches a handler.
pub struct Endpoint {
    id: EndpointId,
    side: Side,
    router: Arc<str>,
    commands: mpsc::UnboundedSender<RouterCommand>,
    delivery: Arc<Delivery>,
    failures: Arc<dyn FailureHandler>,
}

impl Endpoint {
    pub fn side(&self) -> Side {
        self.side
    }
}

impl Dispatch<Message> for Endpoint {
    fn dispatch(&self, message: Message) -> Result<(), MessagingError> {
        self.commands
            .send(RouterCommand::Message { from: self.id, message })
            .map_err(|_| MessagingError::stopped(format!("router {}", self.router)))
    }
}

impl AsyncConnection<Message> for Endpoint {
    fn dispatch_to(&self, handler: Arc<dyn Dispatch<Message>>) {
        let mut state = self.delivery.state.lock();
        for message in state.pending.drain(..) {
            if let Err(e) = handler.dispatch(message) {
                self.failures.on_failure(e);
            }
        }
        state.handler = Some(handler);
    }
}

struct Registered {
    side: Side,
    delivery: Arc<Delivery>,
}

struct Route {
    endpoint: EndpointId,
    /// The announcing message, if the route was announced rather than
    /// learned from a reply
    announcement: Option<Message>,
}

/// Retired routes kept by default. Late replies to anything older are
/// reported as unroutable.
pub const RETIRED_CAPACITY: usize = 4096;

/// Recently removed routes, oldest evicted first.
struct Retired {
    order: VecDeque<RouteId>,
    members: HashSet<RouteId>,
    capacity: usize,
}

impl Retired {
    fn new(capacity: usize) -> Self {
        Self { order: VecDeque::new(), members: HashSet::new(), capacity }
    }

    fn insert(&mut self, id: RouteId) {
        if self.capacity == 0 || !self.members.insert(id.clone()) {
            return;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
    }

    fn remove(&mut self, id: &RouteId) {
        if self.members.remove(id) {
            self.order.retain(|r| r != id);
        }
    }

    fn contains(&self, id: &RouteId) -> bool {
        self.members.contains(id)
    }
}

struct RouterTask {
    name: Arc<str>,
    endpoints: HashMap<EndpointId, Registered>,
    routes: HashMap<RouteId, Route>,
    /// Routes that existed and were removed; late replies to them are expected
    retired: Retired,
    failures: Arc<dyn FailureHandler>,
    failure: Option<MessagingError>,
}

impl RouterTask {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<RouterCommand>) -> Result<(), MessagingError> {
        while let Some(command) = commands.recv().await {
            match command {
                RouterCommand::Register { id, side, delivery } => self.register(id, side, delivery),
                RouterCommand::Message { from, message } => self.route(from, message),
                RouterCommand::Stop => break,
            }
        }
        info!(router = %self.name, routes = self.routes.len(), "router stopped");
        match self.failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn register(&mut self, id: EndpointId, side: Side, delivery: Arc<Delivery>) {
        debug!(router = %self.name, endpoint = id.0, %side, "endpoint registered");
        // Late joiners learn every route already announced on the other side
        for route in self.routes.values() {
            let Some(announcement) = &route.announcement else {
                continue;
            };
            if self.endpoints.get(&route.endpoint).map(|e| e.side) == Some(side.opposite()) {
                if let Err(e) = delivery.deliver(announcement.clone()) {
                    self.failures.on_failure(e);
                }
            }
        }
        self.endpoints.insert(id, Registered { side, delivery });
    }

    fn route(&mut self, from: EndpointId, message: Message) {
        let Some(side) = self.endpoints.get(&from).map(|e| e.side) else {
            debug!(router = %self.name, endpoint = from.0, %message, "ignoring message from removed endpoint");
            return;
        };
        if message.is_end_of_stream() {
            self.disconnect(from, side);
            return;
        }
        let Some(routing) = message.routing().cloned() else {
            self.broadcast(side.opposite(), &message);
            return;
        };

        if let Some(id) = routing.route_available() {
            self.retired.remove(id);
            self.routes.insert(id.clone(), Route { endpoint: from, announcement: Some(message.clone()) });
        } else if let Some(id) = routing.route_unavailable() {
            if self.routes.remove(id).is_some() {
                self.retired.insert(id.clone());
            }
        } else if let Some(source) = routing.reply_source() {
            if !self.routes.contains_key(source) {
                self.routes.insert(source.clone(), Route { endpoint: from, announcement: None });
            }
        }

        match routing.destination() {
            None => self.broadcast(side.opposite(), &message),
            Some(destination) => self.deliver_to(destination, message),
        }
    }

    fn deliver_to(&mut self, destination: &RouteId, message: Message) {
        let Some(delivery) = self
            .routes
            .get(destination)
            .and_then(|route| self.endpoints.get(&route.endpoint))
            .map(|e| Arc::clone(&e.delivery))
        else {
            if self.retired.contains(destination) {
                debug!(router = %self.name, %destination, %message, "dropping message for retired route");
            } else {
                let e = MessagingError::Unroutable { destination: destination.to_string(), message: message.to_string() };
                error!(router = %self.name, "{}", e);
                if self.failure.is_none() {
                    self.failure = Some(e);
                }
            }
            return;
        };
        if let Err(e) = delivery.deliver(message) {
            self.failures.on_failure(e);
        }
    }

    fn broadcast(&self, side: Side, message: &Message) {
        for endpoint in self.endpoints.values().filter(|e| e.side == side) {
            if let Err(e) = endpoint.delivery.deliver(message.clone()) {
                self.failures.on_failure(e);
            }
        }
    }

    /// Retract every route of a departing endpoint, echo its end of stream
    /// and forget it.
    fn disconnect(&mut self, from: EndpointId, side: Side) {
        let gone: Vec<RouteId> =
            self.routes.iter().filter(|(_, route)| route.endpoint == from).map(|(id, _)| id.clone()).collect();
        for id in gone {
            let Some(route) = self.routes.remove(&id) else {
                continue;
            };
            self.retired.insert(id);
            let retraction = route
                .announcement
                .as_ref()
                .and_then(|a| a.routing().and_then(|r| r.unavailable_counterpart()).map(|r| a.with_routing(r)));
            if let Some(retraction) = retraction {
                self.broadcast(side.opposite(), &retraction);
            }
        }
        if let Some(endpoint) = self.endpoints.remove(&from) {
            debug!(router = %self.name, endpoint = from.0, %side, "endpoint disconnected");
            if let Err(e) = endpoint.delivery.deliver(Message::EndOfStream) {
                self.failures.on_failure(e);
            }
        }
    }
}

/// Broker between local protocol stacks and remote peers.
pub struct Router {
    name: Arc<str>,
    commands: mpsc::UnboundedSender<RouterCommand>,
    next_endpoint: AtomicU64,
    stop_requested: AtomicBool,
    failures: Arc<dyn FailureHandler>,
    task: Mutex<Option<JoinHandle<Result<(), MessagingError>>>>,
    outcome: Mutex<Option<MessagingError>>,
}

impl Router {
    pub fn new(executor: &Executor, name: impl Into<Arc<str>>) -> Self {
        Self::with_retired_capacity(executor, name, RETIRED_CAPACITY)
    }

    /// Router remembering at most `capacity` removed routes.
    pub fn with_retired_capacity(executor: &Executor, name: impl Into<Arc<str>>, capacity: usize) -> Self {
        let name: Arc<str> = name.into();
        let failures = DiscardingFailureHandler::shared(format!("router {}", name));
        let (tx, rx) = mpsc::unbounded_channel();
        let task = RouterTask {
            name: Arc::clone(&name),
            endpoints: HashMap::new(),
            routes: HashMap::new(),
            retired: Retired::new(capacity),
            failures: Arc::clone(&failures),
            failure: None,
        };
        let task = executor.spawn(task.run(rx));
        Self {
            name,
            commands: tx,
            next_endpoint: AtomicU64::new(1),
            stop_requested: AtomicBool::new(false),
            failures,
            task: Mutex::new(Some(task)),
            outcome: Mutex::new(None),
        }
    }

    /// Endpoint for a local protocol stack.
    pub fn create_local_connection(&self) -> Result<Endpoint, MessagingError> {
        self.create_connection(Side::Local)
    }

    /// Endpoint for a remote peer connection.
    pub fn create_remote_connection(&self) -> Result<Endpoint, MessagingError> {
        self.create_connection(Side::Remote)
    }

    fn create_connection(&self, side: Side) -> Result<Endpoint, MessagingError> {
        let id = EndpointId(self.next_endpoint.fetch_add(1, Ordering::Relaxed));
        let delivery = Arc::new(Delivery::default());
        self.commands
            .send(RouterCommand::Register { id, side, delivery: Arc::clone(&delivery) })
            .map_err(|_| MessagingError::stopped(format!("router {}", self.name)))?;
        Ok(Endpoint {
            id,
            side,
            router: Arc::clone(&self.name),
            commands: self.commands.clone(),
            delivery,
            failures: Arc::clone(&self.failures),
        })
    }
}

#[async_trait]
impl Stoppable for Router {
    fn request_stop(&self) {
        if !self.stop_requested.swap(true, Ordering::SeqCst) {
            let _ = self.commands.send(RouterCommand::Stop);
        }
    }

    /// Processes everything already sent, then exits. Returns the first
    /// message that could not be routed, if any.
    async fn stop(&self) -> Result<(), MessagingError> {
        self.request_stop();
        let task = self.task.lock().take();
        if let Some(task) = task {
            let result = match task.await {
                Ok(result) => result,
                Err(e) => Err(MessagingError::IllegalState(format!("router task failed: {}", e))),
            };
            if let Err(e) = result {
                *self.outcome.lock() = Some(e);
            }
        }
        match self.outcome.lock().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;

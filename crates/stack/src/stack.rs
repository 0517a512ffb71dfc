// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ordered protocol stages driven by a single task.
//!
//! ```text
//!   StackTop ─── dispatch() ──► [0 Top] ◄── to_top queue ──► handler
//!                                 │ ▲
//!                                 ▼ │
//!                             [1 Protocol]
//!                                 │ ▲
//!                                ...
//!                                 ▼ │
//!                             [n Protocol]
//!                                 │ ▲
//!                                 ▼ │
//!  StackBottom ── dispatch() ──► [n+1 Bottom] ── to_bottom queue ──► sink
//! ```
//!
//! Every protocol callback runs on the stack task. Effects a callback
//! requests are appended to a FIFO work list which the task drains until
//! empty before waiting for the next command or timer.
//!
//! Stop is requested top-down: a stage is asked to stop only once every
//! stage above it has stopped, so anything the upper stages still emit can
//! drain through the stages below.

use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::{BinaryHeap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use plexus_core::{
    AsyncConnection, DiscardingFailureHandler, Dispatch, Executor, FailureHandler, MessagingError,
    Stoppable,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::async_dispatch::AsyncDispatch;
use crate::protocol::{CallbackHandle, Effect, Protocol, ProtocolContext};

enum Command<T> {
    Outgoing(T),
    Incoming(T),
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StageState {
    Running,
    Stopping,
    Stopped,
}

enum Work<T> {
    Outgoing { to: usize, message: T },
    Incoming { to: usize, message: T },
    Stop(usize),
    Callback { stage: usize, handle: CallbackHandle },
}

struct Scheduled {
    deadline: Instant,
    seq: u64,
    stage: usize,
    handle: CallbackHandle,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (self.deadline, self.seq).cmp(&(other.deadline, other.seq))
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Outgoing,
    Incoming,
}

struct StackTask<T> {
    name: Arc<str>,
    protocols: Vec<Box<dyn Protocol<T>>>,
    states: Vec<StageState>,
    work: VecDeque<Work<T>>,
    callbacks: BinaryHeap<Reverse<Scheduled>>,
    next_seq: u64,
    stopping: bool,
    to_top: Arc<AsyncDispatch<T>>,
    to_bottom: Arc<AsyncDispatch<T>>,
    outgoing_failures: Arc<dyn FailureHandler>,
    incoming_failures: Arc<dyn FailureHandler>,
    /// First structural failure, reported by `stop()`
    failure: Option<MessagingError>,
}

impl<T: Send + 'static> StackTask<T> {
    fn depth(&self) -> usize {
        self.protocols.len()
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command<T>>) -> Result<(), MessagingError> {
        for stage in 1..=self.depth() {
            self.invoke(stage, Direction::Outgoing, |protocol, ctx| {
                protocol.start(ctx);
                Ok(())
            });
        }
        self.drain();

        let mut commands_open = true;
        while !self.finished() {
            let deadline = self.callbacks.peek().map(|Reverse(next)| next.deadline);
            tokio::select! {
                command = commands.recv(), if commands_open => match command {
                    Some(Command::Outgoing(message)) => self.work.push_back(Work::Outgoing { to: 1, message }),
                    Some(Command::Incoming(message)) => {
                        let to = self.depth();
                        self.work.push_back(Work::Incoming { to, message });
                    }
                    Some(Command::Stop) => self.begin_stop(),
                    None => {
                        commands_open = false;
                        self.begin_stop();
                    }
                },
                _ = sleep_until(deadline) => self.fire_due_callbacks(),
            }
            self.drain();
        }

        info!(stack = %self.name, "all stages stopped");
        match self.failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn finished(&self) -> bool {
        self.stopping && self.work.is_empty() && self.states.iter().all(|s| *s == StageState::Stopped)
    }

    fn begin_stop(&mut self) {
        if self.stopping {
            return;
        }
        self.stopping = true;
        debug!(stack = %self.name, "stop requested");
        if self.depth() > 0 {
            self.work.push_back(Work::Stop(1));
        }
    }

    fn drain(&mut self) {
        while let Some(work) = self.work.pop_front() {
            match work {
                Work::Outgoing { to, message } => self.deliver_outgoing(to, message),
                Work::Incoming { to, message } => self.deliver_incoming(to, message),
                Work::Stop(stage) => self.stop_stage(stage),
                Work::Callback { stage, handle } => {
                    if handle.is_cancelled() || self.state(stage) == Some(StageState::Stopped) {
                        continue;
                    }
                    self.invoke(stage, Direction::Outgoing, |protocol, ctx| protocol.handle_callback(handle, ctx));
                }
            }
        }
    }

    fn deliver_outgoing(&mut self, to: usize, message: T) {
        if to > self.depth() {
            if let Err(e) = self.to_bottom.dispatch(message) {
                self.fail(e, Direction::Outgoing);
            }
        } else if self.state(to) == Some(StageState::Stopped) {
            debug!(stack = %self.name, stage = to, "dropping outgoing message for stopped stage");
        } else {
            self.invoke(to, Direction::Outgoing, |protocol, ctx| protocol.handle_outgoing(message, ctx));
        }
    }

    fn deliver_incoming(&mut self, to: usize, message: T) {
        if to == 0 {
            if let Err(e) = self.to_top.dispatch(message) {
                self.fail(e, Direction::Incoming);
            }
        } else if self.state(to) == Some(StageState::Stopped) {
            debug!(stack = %self.name, stage = to, "dropping incoming message for stopped stage");
        } else {
            self.invoke(to, Direction::Incoming, |protocol, ctx| protocol.handle_incoming(message, ctx));
        }
    }

    fn stop_stage(&mut self, stage: usize) {
        match self.state(stage) {
            Some(StageState::Running) => {
                self.invoke(stage, Direction::Outgoing, |protocol, ctx| {
                    protocol.stop_requested(ctx);
                    Ok(())
                });
                // Neither stop_later() nor stopped(): done now
                if self.state(stage) == Some(StageState::Running) {
                    self.mark_stopped(stage);
                }
            }
            Some(StageState::Stopping) | None => {}
            Some(StageState::Stopped) => self.cascade_stop(stage),
        }
    }

    fn mark_stopped(&mut self, stage: usize) {
        let Some(state) = self.states.get_mut(stage.wrapping_sub(1)) else {
            return;
        };
        if *state == StageState::Stopped {
            return;
        }
        *state = StageState::Stopped;
        debug!(stack = %self.name, stage, "stage stopped");
        if self.stopping {
            self.cascade_stop(stage);
        }
    }

    fn cascade_stop(&mut self, stage: usize) {
        if stage < self.depth() {
            self.work.push_back(Work::Stop(stage + 1));
        }
    }

    fn state(&self, stage: usize) -> Option<StageState> {
        self.states.get(stage.wrapping_sub(1)).copied()
    }

    fn invoke<F>(&mut self, stage: usize, direction: Direction, f: F)
    where
        F: FnOnce(&mut dyn Protocol<T>, &mut ProtocolContext<T>) -> Result<(), MessagingError>,
    {
        let Some(protocol) = self.protocols.get_mut(stage.wrapping_sub(1)) else {
            return;
        };
        let mut ctx = ProtocolContext::new();
        let result = f(protocol.as_mut(), &mut ctx);
        self.apply(stage, ctx.into_effects());
        if let Err(e) = result {
            self.fail(e, direction);
        }
    }

    fn apply(&mut self, stage: usize, effects: Vec<Effect<T>>) {
        for effect in effects {
            match effect {
                Effect::Incoming(message) => self.work.push_back(Work::Incoming { to: stage - 1, message }),
                Effect::Outgoing(message) => self.work.push_back(Work::Outgoing { to: stage + 1, message }),
                Effect::Callback { handle, delay } => {
                    self.next_seq += 1;
                    self.callbacks.push(Reverse(Scheduled {
                        deadline: Instant::now() + delay,
                        seq: self.next_seq,
                        stage,
                        handle,
                    }));
                }
                Effect::StopLater => {
                    if let Some(state) = self.states.get_mut(stage - 1) {
                        if *state == StageState::Running {
                            *state = StageState::Stopping;
                        }
                    }
                }
                Effect::Stopped => self.mark_stopped(stage),
            }
        }
    }

    fn fire_due_callbacks(&mut self) {
        let now = Instant::now();
        while let Some(Reverse(next)) = self.callbacks.peek() {
            if next.deadline > now {
                break;
            }
            let Some(Reverse(due)) = self.callbacks.pop() else {
                break;
            };
            if due.handle.is_cancelled() || self.state(due.stage) == Some(StageState::Stopped) {
                continue;
            }
            self.work.push_back(Work::Callback { stage: due.stage, handle: due.handle });
        }
    }

    fn fail(&mut self, e: MessagingError, direction: Direction) {
        if e.is_structural() && self.failure.is_none() {
            self.failure = Some(e.clone());
        }
        match direction {
            Direction::Outgoing => self.outgoing_failures.on_failure(e),
            Direction::Incoming => self.incoming_failures.on_failure(e),
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// A stack of protocol stages between a top and a bottom connection.
pub struct ProtocolStack<T> {
    name: Arc<str>,
    commands: mpsc::UnboundedSender<Command<T>>,
    stop_requested: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<Result<(), MessagingError>>>>,
    outcome: Mutex<Option<MessagingError>>,
    to_top: Arc<AsyncDispatch<T>>,
    to_bottom: Arc<AsyncDispatch<T>>,
}

impl<T: Send + 'static> ProtocolStack<T> {
    /// Build and start a stack. `protocols[0]` sits directly below the top.
    pub fn new(executor: &Executor, name: impl Into<Arc<str>>, protocols: Vec<Box<dyn Protocol<T>>>) -> Self {
        let name = name.into();
        let outgoing = DiscardingFailureHandler::shared(format!("{} outgoing", name));
        let incoming = DiscardingFailureHandler::shared(format!("{} incoming", name));
        Self::with_failure_handlers(executor, name, protocols, outgoing, incoming)
    }

    pub fn with_failure_handlers(
        executor: &Executor,
        name: impl Into<Arc<str>>,
        protocols: Vec<Box<dyn Protocol<T>>>,
        outgoing_failures: Arc<dyn FailureHandler>,
        incoming_failures: Arc<dyn FailureHandler>,
    ) -> Self {
        let name = name.into();
        let to_top = Arc::new(AsyncDispatch::with_failure_handler(
            executor,
            format!("{} top", name),
            Arc::clone(&incoming_failures),
        ));
        let to_bottom = Arc::new(AsyncDispatch::with_failure_handler(
            executor,
            format!("{} bottom", name),
            Arc::clone(&outgoing_failures),
        ));
        let (tx, rx) = mpsc::unbounded_channel();
        let task = StackTask {
            name: Arc::clone(&name),
            states: vec![StageState::Running; protocols.len()],
            protocols,
            work: VecDeque::new(),
            callbacks: BinaryHeap::new(),
            next_seq: 0,
            stopping: false,
            to_top: Arc::clone(&to_top),
            to_bottom: Arc::clone(&to_bottom),
            outgoing_failures,
            incoming_failures,
            failure: None,
        };
        let task = executor.spawn(task.run(rx));
        debug!(stack = %name, "stack started");

        Self {
            name,
            commands: tx,
            stop_requested: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(Some(task)),
            outcome: Mutex::new(None),
            to_top,
            to_bottom,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Connection for the layer above: dispatch sends down the stack, the
    /// attached handler receives what comes out of the top.
    pub fn top(&self) -> StackTop<T> {
        StackTop {
            name: Arc::clone(&self.name),
            commands: self.commands.clone(),
            stop_requested: Arc::clone(&self.stop_requested),
            to_top: Arc::clone(&self.to_top),
        }
    }

    /// Connection for the layer below: dispatch sends up the stack, the
    /// attached handler receives what comes out of the bottom.
    pub fn bottom(&self) -> StackBottom<T> {
        StackBottom {
            name: Arc::clone(&self.name),
            commands: self.commands.clone(),
            to_bottom: Arc::clone(&self.to_bottom),
        }
    }
}

#[async_trait]
impl<T: Send + 'static> Stoppable for ProtocolStack<T> {
    fn request_stop(&self) {
        if !self.stop_requested.swap(true, Ordering::SeqCst) {
            let _ = self.commands.send(Command::Stop);
        }
    }

    /// Waits until every protocol stage has stopped, then drains the top and
    /// bottom queues. Returns the first structural failure, if any.
    async fn stop(&self) -> Result<(), MessagingError> {
        self.request_stop();
        let task = self.task.lock().take();
        if let Some(task) = task {
            let result = match task.await {
                Ok(result) => result,
                Err(e) => Err(MessagingError::IllegalState(format!("stack task failed: {}", e))),
            };
            if let Err(e) = result {
                *self.outcome.lock() = Some(e);
            }
            self.to_bottom.stop().await?;
            self.to_top.stop().await?;
            info!(stack = %self.name, "stack stopped");
        }
        match self.outcome.lock().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Upper connection of a [`ProtocolStack`].
pub struct StackTop<T> {
    name: Arc<str>,
    commands: mpsc::UnboundedSender<Command<T>>,
    stop_requested: Arc<AtomicBool>,
    to_top: Arc<AsyncDispatch<T>>,
}

impl<T> Clone for StackTop<T> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            commands: self.commands.clone(),
            stop_requested: Arc::clone(&self.stop_requested),
            to_top: Arc::clone(&self.to_top),
        }
    }
}

impl<T: Send + 'static> Dispatch<T> for StackTop<T> {
    fn dispatch(&self, message: T) -> Result<(), MessagingError> {
        if self.stop_requested.load(Ordering::SeqCst) {
            return Err(MessagingError::stopped(format!("stack {}", self.name)));
        }
        self.commands
            .send(Command::Outgoing(message))
            .map_err(|_| MessagingError::stopped(format!("stack {}", self.name)))
    }
}

impl<T: Send + 'static> AsyncConnection<T> for StackTop<T> {
    fn dispatch_to(&self, handler: Arc<dyn Dispatch<T>>) {
        self.to_top.dispatch_to(handler);
    }
}

/// Lower connection of a [`ProtocolStack`].
pub struct StackBottom<T> {
    name: Arc<str>,
    commands: mpsc::UnboundedSender<Command<T>>,
    to_bottom: Arc<AsyncDispatch<T>>,
}

impl<T> Clone for StackBottom<T> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            commands: self.commands.clone(),
            to_bottom: Arc::clone(&self.to_bottom),
        }
    }
}

impl<T: Send + 'static> Dispatch<T> for StackBottom<T> {
    fn dispatch(&self, message: T) -> Result<(), MessagingError> {
        self.commands
            .send(Command::Incoming(message))
            .map_err(|_| MessagingError::stopped(format!("stack {}", self.name)))
    }
}

impl<T: Send + 'static> AsyncConnection<T> for StackBottom<T> {
    fn dispatch_to(&self, handler: Arc<dyn Dispatch<T>>) {
        self.to_bottom.dispatch_to(handler);
    }
}

#[cfg(test)]
#[path = "stack_tests.rs"]
mod tests;

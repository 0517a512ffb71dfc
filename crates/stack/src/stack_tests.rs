// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use plexus_core::test_support::{RecordingDispatch, RecordingFailures};
use proptest::prelude::*;
use std::time::Duration;

type Log = Arc<Mutex<Vec<String>>>;

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

/// Appends its name to every message in both directions. Stops either
/// immediately or after a delay, as configured.
struct Tagging {
    name: &'static str,
    log: Log,
    stop_after: Option<Duration>,
    drain_on_stop: bool,
}

impl Tagging {
    fn boxed(name: &'static str, log: &Log) -> Box<dyn Protocol<String>> {
        Box::new(Self { name, log: Arc::clone(log), stop_after: None, drain_on_stop: false })
    }

    fn stopping_later(name: &'static str, log: &Log, delay: Duration) -> Box<dyn Protocol<String>> {
        Box::new(Self { name, log: Arc::clone(log), stop_after: Some(delay), drain_on_stop: true })
    }
}

impl Protocol<String> for Tagging {
    fn start(&mut self, _ctx: &mut ProtocolContext<String>) {
        self.log.lock().push(format!("{} started", self.name));
    }

    fn handle_outgoing(&mut self, message: String, ctx: &mut ProtocolContext<String>) -> Result<(), MessagingError> {
        if message == "quit" {
            self.log.lock().push(format!("{} quit", self.name));
            ctx.stopped();
            return Ok(());
        }
        if message == format!("reject:{}", self.name) {
            return Err(MessagingError::Handler(message));
        }
        if message == format!("violate:{}", self.name) {
            return Err(MessagingError::contract(message));
        }
        ctx.dispatch_outgoing(format!("{}:{}", message, self.name));
        Ok(())
    }

    fn handle_incoming(&mut self, message: String, ctx: &mut ProtocolContext<String>) -> Result<(), MessagingError> {
        ctx.dispatch_incoming(format!("{}:{}", message, self.name));
        Ok(())
    }

    fn stop_requested(&mut self, ctx: &mut ProtocolContext<String>) {
        self.log.lock().push(format!("{} stop requested", self.name));
        if self.drain_on_stop {
            ctx.dispatch_outgoing(format!("bye:{}", self.name));
        }
        match self.stop_after {
            Some(delay) => {
                ctx.stop_later();
                ctx.callback_later(delay);
            }
            None => {
                self.log.lock().push(format!("{} stopped", self.name));
                ctx.stopped();
            }
        }
    }

    fn handle_callback(&mut self, _handle: CallbackHandle, ctx: &mut ProtocolContext<String>) -> Result<(), MessagingError> {
        self.log.lock().push(format!("{} stopped", self.name));
        ctx.stopped();
        Ok(())
    }
}

struct Harness {
    stack: ProtocolStack<String>,
    top: Arc<RecordingDispatch<String>>,
    bottom: Arc<RecordingDispatch<String>>,
}

fn harness(protocols: Vec<Box<dyn Protocol<String>>>) -> Harness {
    let stack = ProtocolStack::new(&Executor::current("test"), "test", protocols);
    let top = RecordingDispatch::<String>::new();
    let bottom = RecordingDispatch::<String>::new();
    stack.top().dispatch_to(top.clone());
    stack.bottom().dispatch_to(bottom.clone());
    Harness { stack, top, bottom }
}

#[tokio::test]
async fn empty_stack_connects_top_and_bottom() {
    let h = harness(Vec::new());
    h.stack.top().dispatch("down".into()).unwrap();
    h.stack.bottom().dispatch("up".into()).unwrap();

    assert_eq!(h.bottom.wait_for(1).await, vec!["down"]);
    assert_eq!(h.top.wait_for(1).await, vec!["up"]);
    h.stack.stop().await.unwrap();
}

#[tokio::test]
async fn messages_pass_through_stages_in_order() {
    let log = new_log();
    let h = harness(vec![Tagging::boxed("a", &log), Tagging::boxed("b", &log)]);

    h.stack.top().dispatch("m1".into()).unwrap();
    h.stack.top().dispatch("m2".into()).unwrap();
    h.stack.bottom().dispatch("in".into()).unwrap();

    assert_eq!(h.bottom.wait_for(2).await, vec!["m1:a:b", "m2:a:b"]);
    assert_eq!(h.top.wait_for(1).await, vec!["in:b:a"]);
    h.stack.stop().await.unwrap();
    assert_eq!(log.lock()[..2], ["a started".to_string(), "b started".to_string()]);
}

#[tokio::test]
async fn handler_errors_go_to_failure_handler_and_stack_keeps_running() {
    let log = new_log();
    let outgoing = RecordingFailures::new();
    let stack = ProtocolStack::with_failure_handlers(
        &Executor::current("test"),
        "test",
        vec![Tagging::boxed("a", &log)],
        outgoing.clone(),
        RecordingFailures::new(),
    );
    let bottom = RecordingDispatch::<String>::new();
    stack.bottom().dispatch_to(bottom.clone());

    stack.top().dispatch("reject:a".into()).unwrap();
    stack.top().dispatch("ok".into()).unwrap();

    assert_eq!(bottom.wait_for(1).await, vec!["ok:a"]);
    stack.stop().await.unwrap();
    assert_eq!(outgoing.failures(), vec![MessagingError::Handler("reject:a".into())]);
}

#[tokio::test]
async fn contract_violation_is_reported_by_stop() {
    let log = new_log();
    let h = harness(vec![Tagging::boxed("a", &log)]);
    h.stack.top().dispatch("violate:a".into()).unwrap();
    h.stack.top().dispatch("after".into()).unwrap();

    assert_eq!(h.bottom.wait_for(1).await, vec!["after:a"]);
    let result = h.stack.stop().await;
    assert!(matches!(result, Err(MessagingError::ContractViolation(_))));
    // Reported again on repeated stop
    assert!(h.stack.stop().await.is_err());
}

#[tokio::test]
async fn stop_cascades_top_down_after_each_stage_stops() {
    let log = new_log();
    let h = harness(vec![
        Tagging::stopping_later("a", &log, Duration::from_millis(20)),
        Tagging::boxed("b", &log),
    ]);

    h.stack.stop().await.unwrap();

    let log = log.lock().clone();
    let position = |entry: &str| log.iter().position(|e| e == entry).unwrap();
    assert!(position("a stop requested") < position("a stopped"));
    assert!(position("a stopped") < position("b stop requested"));
    // Emitted by a while stopping, so it passed through b on the way down
    assert_eq!(h.bottom.received(), vec!["bye:a:b"]);
}

#[tokio::test]
async fn stopped_first_stage_drops_later_messages() {
    let log = new_log();
    let h = harness(vec![Tagging::boxed("a", &log), Tagging::boxed("b", &log)]);

    h.stack.top().dispatch("before".into()).unwrap();
    h.stack.top().dispatch("quit".into()).unwrap();
    h.stack.top().dispatch("after".into()).unwrap();
    h.stack.bottom().dispatch("in".into()).unwrap();

    assert_eq!(h.bottom.wait_for(1).await, vec!["before:a:b"]);
    h.stack.stop().await.unwrap();

    assert_eq!(h.bottom.received(), vec!["before:a:b"]);
    // b still forwards incoming, but a has stopped and drops it
    assert!(h.top.is_empty());
    assert!(!log.lock().contains(&"a stop requested".to_string()), "a already stopped");
    assert!(log.lock().contains(&"b stop requested".to_string()));
}

#[tokio::test]
async fn dispatch_after_request_stop_is_rejected() {
    let h = harness(Vec::new());
    let top = h.stack.top();
    h.stack.request_stop();
    assert!(matches!(top.dispatch("late".into()), Err(MessagingError::Stopped(_))));
    h.stack.stop().await.unwrap();
}

/// Schedules two callbacks on start and cancels the first when told to.
struct Timers {
    first: Option<CallbackHandle>,
    fired: Arc<Mutex<Vec<u64>>>,
    ids: Arc<Mutex<Vec<u64>>>,
}

impl Protocol<String> for Timers {
    fn start(&mut self, ctx: &mut ProtocolContext<String>) {
        let first = ctx.callback_later(Duration::from_millis(30));
        let second = ctx.callback_later(Duration::from_millis(40));
        self.ids.lock().extend([first.id(), second.id()]);
        self.first = Some(first);
    }

    fn handle_outgoing(&mut self, message: String, ctx: &mut ProtocolContext<String>) -> Result<(), MessagingError> {
        if message == "cancel" {
            if let Some(first) = &self.first {
                first.cancel();
            }
        }
        ctx.dispatch_outgoing(message);
        Ok(())
    }

    fn handle_incoming(&mut self, message: String, ctx: &mut ProtocolContext<String>) -> Result<(), MessagingError> {
        ctx.dispatch_incoming(message);
        Ok(())
    }

    fn stop_requested(&mut self, ctx: &mut ProtocolContext<String>) {
        ctx.stopped();
    }

    fn handle_callback(&mut self, handle: CallbackHandle, ctx: &mut ProtocolContext<String>) -> Result<(), MessagingError> {
        self.fired.lock().push(handle.id());
        ctx.dispatch_outgoing(format!("fired:{}", handle.id()));
        Ok(())
    }
}

#[tokio::test]
async fn cancelled_callback_never_fires() {
    let fired = Arc::new(Mutex::new(Vec::new()));
    let ids = Arc::new(Mutex::new(Vec::new()));
    let h = harness(vec![Box::new(Timers { first: None, fired: Arc::clone(&fired), ids: Arc::clone(&ids) })]);

    h.stack.top().dispatch("cancel".into()).unwrap();
    h.bottom.wait_for(2).await;
    h.stack.stop().await.unwrap();

    let ids = ids.lock().clone();
    assert_eq!(*fired.lock(), vec![ids[1]]);
}

#[tokio::test]
async fn callbacks_after_stop_are_dropped() {
    let fired = Arc::new(Mutex::new(Vec::new()));
    let h = harness(vec![Box::new(Timers {
        first: None,
        fired: Arc::clone(&fired),
        ids: Arc::new(Mutex::new(Vec::new())),
    })]);

    h.stack.stop().await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(fired.lock().is_empty());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn randomized_stop_now_or_later_drains_and_stops_in_order(
        plan in proptest::collection::vec(proptest::option::of(0u64..15), 1..5),
        messages in 0usize..10,
    ) {
        const NAMES: [&str; 5] = ["p0", "p1", "p2", "p3", "p4"];
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let (log, bottom) = runtime.block_on(async {
            let log = new_log();
            let protocols = plan
                .iter()
                .enumerate()
                .map(|(i, delay)| match delay {
                    Some(ms) => Tagging::stopping_later(NAMES[i], &log, Duration::from_millis(*ms)),
                    None => Tagging::boxed(NAMES[i], &log),
                })
                .collect();
            let h = harness(protocols);
            for i in 0..messages {
                h.stack.top().dispatch(format!("m{}", i)).unwrap();
            }
            h.stack.stop().await.unwrap();
            let log = log.lock().clone();
            (log, h.bottom.received())
        });

        // Every message sent before stop reached the bottom, in order
        let suffix: String = NAMES[..plan.len()].iter().map(|n| format!(":{}", n)).collect();
        let delivered: Vec<&String> = bottom.iter().filter(|m| m.starts_with('m')).collect();
        prop_assert_eq!(delivered.len(), messages);
        for (i, m) in delivered.iter().enumerate() {
            prop_assert_eq!(m.as_str(), format!("m{}{}", i, suffix));
        }

        // Stage k is asked to stop only after stage k-1 stopped
        let position = |entry: String| log.iter().position(|e| *e == entry);
        for k in 0..plan.len() {
            let stopped = position(format!("{} stopped", NAMES[k]));
            prop_assert!(stopped.is_some());
            if k > 0 {
                let requested = position(format!("{} stop requested", NAMES[k]));
                let previous_stopped = position(format!("{} stopped", NAMES[k - 1]));
                prop_assert!(previous_stopped < requested);
            }
        }
    }
}

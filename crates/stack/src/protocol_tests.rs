// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn effects_are_recorded_in_call_order() {
    let mut ctx = ProtocolContext::<u32>::new();
    ctx.dispatch_outgoing(1);
    ctx.dispatch_incoming(2);
    let handle = ctx.callback_later(Duration::from_millis(5));
    ctx.stop_later();
    ctx.stopped();

    let effects = ctx.into_effects();
    assert_eq!(effects.len(), 5);
    assert!(matches!(effects[0], Effect::Outgoing(1)));
    assert!(matches!(effects[1], Effect::Incoming(2)));
    assert!(matches!(&effects[2], Effect::Callback { handle: h, delay } if *h == handle && *delay == Duration::from_millis(5)));
    assert!(matches!(effects[3], Effect::StopLater));
    assert!(matches!(effects[4], Effect::Stopped));
}

#[test]
fn callback_handles_are_unique_and_cancel_is_shared() {
    let mut ctx = ProtocolContext::<u32>::new();
    let a = ctx.callback_later(Duration::ZERO);
    let b = ctx.callback_later(Duration::ZERO);
    assert_ne!(a, b);

    let copy = a.clone();
    assert!(!a.is_cancelled());
    copy.cancel();
    copy.cancel();
    assert!(a.is_cancelled());
    assert!(!b.is_cancelled());
}

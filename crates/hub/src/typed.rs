// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed views of JSON payload channels.

use std::marker::PhantomData;
use std::sync::Arc;

use plexus_core::{dispatch_fn, Dispatch, MessagingError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Serializes `T` into payloads for an untyped dispatcher.
pub struct TypedDispatch<T, D> {
    inner: D,
    _marker: PhantomData<fn(T)>,
}

impl<T, D> TypedDispatch<T, D> {
    pub fn new(inner: D) -> Self {
        Self { inner, _marker: PhantomData }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }
}

impl<T: Serialize, D: Dispatch<Value>> Dispatch<T> for TypedDispatch<T, D> {
    fn dispatch(&self, message: T) -> Result<(), MessagingError> {
        self.inner.dispatch(serde_json::to_value(message)?)
    }
}

/// Payload handler that deserializes into `T` before calling `f`.
/// Payloads that do not deserialize are reported as handler failures.
pub fn typed_handler<T, F>(f: F) -> Arc<dyn Dispatch<Value>>
where
    T: DeserializeOwned + 'static,
    F: Fn(T) -> Result<(), MessagingError> + Send + Sync + 'static,
{
    dispatch_fn(move |payload: Value| f(serde_json::from_value(payload)?))
}

#[cfg(test)]
#[path = "typed_tests.rs"]
mod tests;

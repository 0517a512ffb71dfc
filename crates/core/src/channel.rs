// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Channel naming.
//!
//! A [`ChannelKey`] is the stable name of a logical channel. A [`ChannelId`]
//! is the compact per-connection number a multiplexed connection assigns to
//! a key; it has no meaning outside the connection that carries it.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Stable name of a logical channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelKey(SmolStr);

impl ChannelKey {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self(name.into())
    }

    /// Key derived from a message type, for channels named after what they carry.
    pub fn of<T: ?Sized>() -> Self {
        Self(SmolStr::new(std::any::type_name::<T>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ChannelKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl PartialEq<str> for ChannelKey {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ChannelKey {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Per-connection channel number bound to a key by `ChannelMetaInfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub u32);

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

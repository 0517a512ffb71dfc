// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifiers for routable parties and logical listeners.
//!
//! Both are a 4 character type prefix followed by a 19 character nanoid,
//! 23 characters in total, which a `SmolStr` keeps inline.

/// Define a prefixed, randomly generated identifier.
///
/// ```ignore
/// define_id! {
///     /// Doc comment for the ID type.
///     pub struct RouteId("rte-");
/// }
/// ```
#[macro_export]
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident($prefix:literal);
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub smol_str::SmolStr);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            pub fn new() -> Self {
                Self(smol_str::format_smolstr!("{}{}", Self::PREFIX, nanoid::nanoid!(19)))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.into())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s.into())
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;

            fn deref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id! {
    /// Identifies a routable party (a producer or a consumer) in the router.
    ///
    /// Generated once per protocol stack and announced via
    /// `ConsumerAvailable`/`ProducerAvailable`.
    pub struct RouteId("rte-");
}

define_id! {
    /// Identifies a logical listener sharing a physical acceptor.
    pub struct ListenerId("lsn-");
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;

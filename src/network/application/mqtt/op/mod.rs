//! The eight operation state machines.
//!
//! Every operation type is configured via a plain `*Config` struct handed
//! to the client whole, rather than the "prepare, then configure field by
//! field, then send" sequence the original imperative API exposes: Rust's
//! ownership model makes an upfront, fully-owned configuration value both
//! simpler and harder to misuse (there's no way to call `send` with a
//! half-configured operation). [`crate::network::application::mqtt::client::Client`]
//! still enforces the single-preparation-lock and "at most one CONNECT/
//! DISCONNECT/REAUTH in flight" invariants from the wire-level spec; the
//! simplification only collapses the *local* builder sequence, not the
//! session-level concurrency rules.
//!
//! Publish, Subscribe and Unsubscribe may have several instances live at
//! once, so completions identify themselves by [`OpHandle`] — a stable
//! index into the client's fixed-capacity pool for that operation type.
//! Connect, Disconnect and Reauth are singletons and need no handle.

pub mod connect;
pub mod disconnect;
pub mod keep_alive;
pub mod publish;
pub mod reauth;
pub mod recv;
pub mod subscribe;
pub mod unsubscribe;

/// A stable index into one of the client's fixed-capacity operation
/// pools (publish, subscribe, or unsubscribe).
///
/// Valid only while the operation it names has not yet completed; the
/// client frees (and may reissue) the underlying slot once a completion
/// callback has fired.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct OpHandle(pub(crate) usize);

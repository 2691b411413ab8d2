//! MQTT v5 protocol implementation for embedded and desktop systems.
//!
//! This module provides a complete MQTT v5 client **protocol engine**: it
//! speaks the wire protocol with a broker over an externally supplied
//! byte-stream transport and exposes an asynchronous, callback-driven API
//! for CONNECT, PUBLISH, SUBSCRIBE, UNSUBSCRIBE, DISCONNECT and AUTH /
//! re-authentication.
//!
//! # Architecture
//!
//! ```text
//! transport bytes ─► feed_bytes ─► framer ─► packet ─► engine dispatch
//!                                                          │
//!                                    ┌─────────────────────┼──────────────────────┐
//!                                    ▼                     ▼                      ▼
//!                             keep-alive op        per-operation            session-level
//!                                                  state machine            invariants
//!                                    │                     │
//!                                    └──────── outbound packet ─────────────►
//!                                          codec ──► send_bytes callback
//! ```
//!
//! The engine is single-threaded and cooperative: it never spawns a task
//! and never blocks. Every public call runs to completion on the caller's
//! thread and may synchronously invoke [`EventHandler`] callbacks before
//! returning. Progress resumes only on the next [`Client::feed_bytes`] or
//! [`Client::tick`] call.
//!
//! # Modules
//!
//! - [`varint`] / [`primitives`]: variable-length integer codec and the
//!   primitive wire field readers (strings, binary blobs, UTF-8 pairs).
//! - [`properties`]: the MQTT v5 property list codec, with its uniqueness
//!   rules enforced at decode time.
//! - [`packet`]: the fixed header, the fully bit-exact per-packet-type
//!   codec, and the tagged-union [`packet::Packet`] dispatch type.
//! - [`reason`]: the reason-code and error-code enums.
//! - [`timer`]: the bounded timer pool shared by every operation.
//! - [`packet_id`]: the 16-bit packet-identifier allocator.
//! - [`topic_alias`]: the send- and receive-side topic alias tables.
//! - [`topic_filter`]: topic filter validation and segment-by-segment
//!   matching (including `$share/<group>/` shared subscriptions).
//! - [`session`]: negotiated capability state, client-persistent state,
//!   session-ephemeral state, and caller configuration.
//! - [`op`]: the eight operation state machines.
//! - [`client`]: the engine core — owns every operation, routes inbound
//!   packets, and exposes the public API surface.
//! - [`transport`]: an optional adapter that pumps bytes between a
//!   blocking [`crate::network::Connection`] and the engine, for hosts
//!   that don't want to wire up their own event loop.

pub mod callbacks;
pub mod client;
pub mod config;
pub mod error;
pub mod op;
pub mod packet;
pub mod packet_id;
pub mod primitives;
pub mod properties;
pub mod reason;
pub mod session;
pub mod timer;
pub mod topic_alias;
pub mod topic_filter;
pub mod transport;
pub mod varint;

pub use callbacks::EventHandler;
pub use client::Client;
pub use config::{ClientConfig, PublishOrdering, VerificationFlags};
pub use error::{AsyncOpStatus, ClientError};
pub use op::connect::ConnectConfig;
pub use op::publish::{PublishConfig, TopicAliasPreference};
pub use op::subscribe::{SubscribeConfig, SubscribeTopic};
pub use op::unsubscribe::UnsubscribeConfig;

/// Limits on fixed-capacity buffers throughout the engine.
///
/// The engine never allocates: every buffer below is a `heapless`
/// fixed-capacity container sized at compile time. Hosts that need larger
/// topics, payloads, or concurrency should fork these constants; they are
/// deliberately plain `usize` constants (not const generics) to keep the
/// engine's types simple to name, matching how the rest of this crate
/// favors concrete fixed sizes over generic capacity parameters.
pub mod limits {
    /// Maximum length in bytes of a client identifier.
    pub const MAX_CLIENT_ID: usize = 64;
    /// Maximum length in bytes of a topic name or topic filter.
    pub const MAX_TOPIC: usize = 256;
    /// Maximum length in bytes of a PUBLISH payload.
    pub const MAX_PAYLOAD: usize = 1024;
    /// Maximum length in bytes of a single encoded MQTT control packet.
    pub const MAX_PACKET: usize = 2048;
    /// Maximum length in bytes of a username, password, content type,
    /// response topic, auth method, or correlation/auth data field.
    pub const MAX_FIELD: usize = 256;
    /// Maximum number of user properties carried by a single packet.
    pub const MAX_USER_PROPS: usize = 8;
    /// Maximum number of concurrently prepared operations.
    pub const MAX_OPS: usize = 16;
    /// Maximum number of live packet identifiers (must be `<= MAX_OPS`
    /// unless subscribe/unsubscribe/publish concurrency exceeds it).
    pub const MAX_PACKET_IDS: usize = 16;
    /// Maximum number of entries in the send-side topic alias table.
    pub const MAX_SEND_ALIASES: usize = 16;
    /// Maximum number of entries in the receive-side topic alias table.
    pub const MAX_RECV_ALIASES: usize = 16;
    /// Maximum number of active subscription filters tracked for inbound
    /// authorisation and alias-scope validation.
    pub const MAX_SUB_FILTERS: usize = 16;
    /// Maximum number of topics in a single SUBSCRIBE/UNSUBSCRIBE.
    pub const MAX_TOPICS_PER_REQUEST: usize = 8;
    /// Maximum number of live logical timers (one per op plus keep-alive's
    /// three timers).
    pub const MAX_TIMERS: usize = MAX_OPS + 4;
    /// Capacity of the inbound byte accumulator [`client::Client::feed_bytes`]
    /// buffers partial packets in. Large enough to hold one full
    /// [`MAX_PACKET`]-sized packet plus the header bytes of the next one
    /// arriving in the same `feed_bytes` call.
    pub const MAX_RX_BUFFER: usize = MAX_PACKET * 2;
    /// Capacity of the scratch property list built while encoding an
    /// outbound packet (fixed properties plus up to [`MAX_USER_PROPS`]
    /// user properties).
    pub const MAX_PROPS_OUT: usize = MAX_USER_PROPS + 12;
}

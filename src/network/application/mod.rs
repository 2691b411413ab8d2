//! Application layer (OSI Layer 7) protocol engines.

/// MQTT v5 client protocol engine.
///
/// Implements the session state machine, operation scheduler,
/// packet-identifier allocator, topic-alias tables, QoS 1/2 in-flight
/// tracker, timer manager, and incoming-packet framer/dispatcher described
/// in the crate's top-level documentation.
pub mod mqtt;

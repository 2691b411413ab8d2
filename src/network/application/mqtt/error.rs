//! The engine's error taxonomy.
//!
//! Per the crate's design: caller-side mistakes return synchronously from
//! the offending API call as [`ClientError`] and are never fed to a
//! completion callback; asynchronous outcomes (timeouts, protocol errors,
//! broker-initiated disconnects) are delivered only through
//! [`AsyncOpStatus`] on the affected operation's completion callback, and
//! separately through [`crate::network::application::mqtt::EventHandler::broker_disconnected`].

/// Synchronous error returned directly by a public API call.
///
/// Every fallible entry point returns `Result<T, ClientError>`; `Success`
/// is represented by `Ok(_)`, not a variant, to stay idiomatic.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ClientError {
    /// An internal invariant was violated; please file a bug report.
    InternalError,
    /// The client has not been initialized (no configuration set).
    NotInitialized,
    /// The client is in the middle of a preparation or an exclusive
    /// operation (CONNECT/DISCONNECT/REAUTH) and cannot start another.
    Busy,
    /// The operation requires an established session and the client is
    /// not connected.
    NotConnected,
    /// A CONNECT was requested while already connected.
    AlreadyConnected,
    /// A bad parameter was passed to the function.
    BadParam,
    /// Required configuration for this operation hasn't been performed.
    InsufficientConfig,
    /// A fixed-capacity pool (operations, packet IDs, aliases, timers) is
    /// exhausted.
    OutOfMemory,
    /// The serialised packet would exceed a fixed-capacity output buffer
    /// or the broker's advertised maximum packet size.
    BufferOverflow,
    /// The requested feature isn't supported by the negotiated session
    /// (e.g. a wildcard subscription when the broker disallows it).
    NotSupported,
    /// Transient resource exhaustion; retry on the next event loop
    /// iteration.
    RetryLater,
    /// The client is disconnecting; no new operations may be prepared.
    Disconnecting,
    /// The network is reported disconnected; new operations are rejected
    /// until reconnection.
    NetworkDisconnected,
    /// An operation requiring authentication was attempted before
    /// authentication completed.
    NotAuthenticated,
    /// Another `prepare` call is already in progress (the preparation
    /// lock is held).
    PreparationLocked,
}

#[cfg(feature = "defmt")]
impl defmt::Format for ClientError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            ClientError::InternalError => defmt::write!(f, "InternalError"),
            ClientError::NotInitialized => defmt::write!(f, "NotInitialized"),
            ClientError::Busy => defmt::write!(f, "Busy"),
            ClientError::NotConnected => defmt::write!(f, "NotConnected"),
            ClientError::AlreadyConnected => defmt::write!(f, "AlreadyConnected"),
            ClientError::BadParam => defmt::write!(f, "BadParam"),
            ClientError::InsufficientConfig => defmt::write!(f, "InsufficientConfig"),
            ClientError::OutOfMemory => defmt::write!(f, "OutOfMemory"),
            ClientError::BufferOverflow => defmt::write!(f, "BufferOverflow"),
            ClientError::NotSupported => defmt::write!(f, "NotSupported"),
            ClientError::RetryLater => defmt::write!(f, "RetryLater"),
            ClientError::Disconnecting => defmt::write!(f, "Disconnecting"),
            ClientError::NetworkDisconnected => defmt::write!(f, "NetworkDisconnected"),
            ClientError::NotAuthenticated => defmt::write!(f, "NotAuthenticated"),
            ClientError::PreparationLocked => defmt::write!(f, "PreparationLocked"),
        }
    }
}

/// Asynchronous completion status delivered to an operation's completion
/// callback exactly once.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum AsyncOpStatus {
    /// The operation completed; inspect the accompanying response for
    /// the broker's reason code.
    Complete,
    /// An internal invariant was violated; please file a bug report.
    InternalError,
    /// The broker's response didn't arrive within the operation's
    /// response timeout.
    Timeout,
    /// The broker's packet didn't comply with MQTT v5; the engine has
    /// sent DISCONNECT and torn down the session.
    ProtocolError,
    /// The operation was aborted locally (via `cancel`) before
    /// completion.
    Aborted,
    /// The broker disconnected (or the transport dropped) before the
    /// operation completed.
    BrokerDisconnected,
    /// A fixed-capacity pool was exhausted while processing the
    /// operation's response.
    OutOfMemory,
    /// A host-supplied callback (e.g. the re-authentication callback)
    /// returned a bad value.
    BadParam,
}

#[cfg(feature = "defmt")]
impl defmt::Format for AsyncOpStatus {
    fn format(&self, f: defmt::Formatter) {
        match self {
            AsyncOpStatus::Complete => defmt::write!(f, "Complete"),
            AsyncOpStatus::InternalError => defmt::write!(f, "InternalError"),
            AsyncOpStatus::Timeout => defmt::write!(f, "Timeout"),
            AsyncOpStatus::ProtocolError => defmt::write!(f, "ProtocolError"),
            AsyncOpStatus::Aborted => defmt::write!(f, "Aborted"),
            AsyncOpStatus::BrokerDisconnected => defmt::write!(f, "BrokerDisconnected"),
            AsyncOpStatus::OutOfMemory => defmt::write!(f, "OutOfMemory"),
            AsyncOpStatus::BadParam => defmt::write!(f, "BadParam"),
        }
    }
}

/// Reason the broker (or the transport) disconnected unsolicited, passed
/// to [`crate::network::application::mqtt::EventHandler::broker_disconnected`].
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum DisconnectedReason {
    /// The broker sent a DISCONNECT packet; `info` carries its reason
    /// code and optional reason string.
    DisconnectMsg,
    /// The transport reported the connection closed without a DISCONNECT
    /// packet.
    NetworkError,
    /// No PINGRESP (or any other packet) arrived within the keep-alive
    /// response timeout.
    NoBrokerResponse,
}

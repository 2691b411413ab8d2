//! # Network abstraction layer for embedded systems
//!
//! This module provides the small set of traits a host uses to bridge a
//! concrete byte-stream transport (TCP, TLS, a serial link, ...) into the
//! protocol engines under [`application`]. The engines themselves never
//! touch a socket directly: they consume raw bytes and emit raw bytes
//! through host-supplied callbacks, so these traits exist purely as an
//! optional convenience for hosts that already have a blocking
//! read/write/close style connection and want a thin adapter.
//!
//! ## Design Philosophy
//!
//! - **Protocol Agnostic**: Core traits work with any underlying transport
//! - **Zero-Cost Abstractions**: Traits compile down to direct function calls
//! - **Embedded-First**: Designed for `no_std` environments with limited resources
//!
//! ## Usage Examples
//!
//! ```rust,no_run
//! use mqtt5_client_engine::network::{Connection, Read, Write};
//! # struct MockConnection;
//! # impl Connection for MockConnection {}
//! # impl mqtt5_client_engine::network::Read for MockConnection {
//! #     type Error = ();
//! #     fn read(&mut self, _buf: &mut [u8]) -> Result<usize, Self::Error> { Ok(0) }
//! # }
//! # impl mqtt5_client_engine::network::Write for MockConnection {
//! #     type Error = ();
//! #     fn write(&mut self, _buf: &[u8]) -> Result<usize, Self::Error> { Ok(0) }
//! #     fn flush(&mut self) -> Result<(), Self::Error> { Ok(()) }
//! # }
//! # impl mqtt5_client_engine::network::Close for MockConnection {
//! #     type Error = ();
//! #     fn close(self) -> Result<(), Self::Error> { Ok(()) }
//! # }
//!
//! fn communicate_with_device<C: Connection>(mut conn: C) -> Result<(), C::Error> {
//!     let data = b"Hello, device!";
//!     conn.write(data)?;
//!     conn.flush()?;
//!
//!     let mut response = [0u8; 64];
//!     let bytes_read = conn.read(&mut response)?;
//!     let _ = bytes_read;
//!     Ok(())
//! }
//! ```

#![allow(missing_docs)]
#![deny(unsafe_code)]

/// Common error type for transport-adapter operations.
pub mod error;

/// Application-layer protocol engines (OSI Layer 7).
pub mod application;

/// Re-exports of the core traits for convenient importing.
pub mod prelude {
    pub use super::{Close, Connect, Connection, Read, Write};
}

/// Trait for reading data from a network connection.
///
/// Synchronous interface for reading data from any network connection.
pub trait Read {
    /// Associated error type for read operations.
    type Error: core::fmt::Debug;

    /// Read data from the connection into the provided buffer.
    ///
    /// Returns the number of bytes read. A return value of 0 indicates
    /// that the connection has been closed by the remote end.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

/// Trait for writing data to a network connection.
pub trait Write {
    /// Associated error type for write operations.
    type Error: core::fmt::Debug;

    /// Write data to the connection.
    ///
    /// The implementation may write fewer bytes than requested; callers
    /// must loop until all bytes are written.
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error>;

    /// Flush any buffered write data.
    fn flush(&mut self) -> Result<(), Self::Error>;
}

/// Trait for closing network connections.
pub trait Close {
    /// Associated error type for close operations.
    type Error: core::fmt::Debug;

    /// Close the connection and free any associated resources.
    fn close(self) -> Result<(), Self::Error>;
}

/// A complete synchronous network connection: read, write, and close.
///
/// Any type implementing this trait can be used with
/// [`application::mqtt::transport::BytePump`] to drive the MQTT engine
/// over a blocking transport.
pub trait Connection: Read + Write + Close {}

/// Trait for establishing outbound network connections (client-side).
pub trait Connect {
    /// The type of connection that will be created.
    type Connection: Connection;
    /// Associated error type for connection operations.
    type Error: core::fmt::Debug;

    /// Establish a connection to a remote endpoint.
    fn connect(&mut self, remote: &str) -> Result<Self::Connection, Self::Error>;
}

//! Optional adapter that pumps bytes between a blocking
//! [`crate::network::Connection`] and the engine.
//!
//! [`client::Client`](crate::network::application::mqtt::Client) never
//! touches a socket: it only consumes [`Client::feed_bytes`] and emits
//! through [`EventHandler::send_bytes`]. Most hosts already have an event
//! loop (an async executor, an RTOS task, a `select` loop) driving a
//! transport and are better off calling `feed_bytes`/`tick` directly from
//! it. [`BytePump`] exists for the simpler case: a host with a single
//! blocking [`crate::network::Connection`] and no event loop of its own,
//! who wants something that reads what is available and writes what the
//! engine asks to be written, the way the teacher crate's blocking MQTT
//! 3.1.1 `Client<C: Connection>` reads and writes its own packets
//! directly against `C`.
//!
//! `BytePump` does not implement [`EventHandler`] itself, since
//! `send_bytes` takes `&mut self` with no error return while a transport
//! write can fail; instead, a host's `EventHandler` impl owns a
//! `BytePump` and forwards `send_bytes` into [`BytePump::write_all`],
//! stashing any write error for the next call to [`BytePump::pump`] to
//! surface.

use crate::network::application::mqtt::client::Client;
use crate::network::application::mqtt::error::ClientError;
use crate::network::application::mqtt::EventHandler;
use crate::network::{Connection, Read, Write};

/// Failure surfaced by [`BytePump::pump`].
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PumpError<E: core::fmt::Debug> {
    /// The transport returned an error from `read`.
    Transport(E),
    /// The transport reported a clean close (`read` returned `Ok(0)`).
    /// [`Client::network_disconnected`] has already been called.
    Closed,
    /// The engine rejected the bytes read from the transport.
    Engine(ClientError),
}

/// A fixed-capacity byte shuttle between a blocking [`Connection`] and the
/// engine.
///
/// `N` bounds the single-read scratch buffer size; a host expecting
/// large PUBLISH payloads should size it at least as large as
/// [`crate::network::application::mqtt::limits::MAX_PACKET`].
pub struct BytePump<C: Connection, const N: usize> {
    connection: C,
    scratch: [u8; N],
}

impl<C: Connection, const N: usize> BytePump<C, N> {
    /// Wrap a connection. Does not perform any I/O.
    pub fn new(connection: C) -> Self {
        Self {
            connection,
            scratch: [0u8; N],
        }
    }

    /// Borrow the underlying connection, e.g. to inspect transport-level
    /// state a test double recorded.
    pub fn connection(&mut self) -> &mut C {
        &mut self.connection
    }

    /// Write `buf` to the connection in full and flush it. Intended to be
    /// called from a host's [`EventHandler::send_bytes`] implementation.
    pub fn write_all(&mut self, buf: &[u8]) -> Result<(), C::Error> {
        let mut written = 0;
        while written < buf.len() {
            let n = self.connection.write(&buf[written..])?;
            if n == 0 {
                // A well-behaved blocking `Write` never does this; treat
                // it as a transient retry rather than spinning forever.
                continue;
            }
            written += n;
        }
        self.connection.flush()
    }

    /// Attempt one read from the connection and feed whatever arrived
    /// into `client`. Blocks for exactly as long as the underlying
    /// `Connection::read` call does, which is expected to be a
    /// host-configured short timeout or a non-blocking/poll-style
    /// implementation, not an unbounded wait.
    ///
    /// `Ok(0)` is treated as the peer closing the connection: the client
    /// is notified via [`Client::network_disconnected`] and
    /// [`PumpError::Closed`] is returned so the host knows to stop
    /// polling and re-establish the transport.
    pub fn pump<H: EventHandler>(
        &mut self,
        client: &mut Client<H>,
    ) -> Result<usize, PumpError<C::Error>> {
        match self.connection.read(&mut self.scratch) {
            Ok(0) => {
                client.network_disconnected();
                Err(PumpError::Closed)
            }
            Ok(n) => {
                client
                    .feed_bytes(&self.scratch[..n])
                    .map_err(PumpError::Engine)?;
                Ok(n)
            }
            Err(e) => Err(PumpError::Transport(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::application::mqtt::callbacks::*;
    use crate::network::application::mqtt::error::{AsyncOpStatus, DisconnectedReason};
    use crate::network::application::mqtt::op::connect::AuthStep;
    use crate::network::application::mqtt::op::OpHandle;
    use crate::network::application::mqtt::{ClientConfig, Client as EngineClient};
    use crate::network::{Close, Read as NRead, Write as NWrite};

    struct ScriptedConnection {
        to_read: heapless::Vec<u8, 64>,
        written: heapless::Vec<u8, 64>,
    }

    impl NRead for ScriptedConnection {
        type Error = ();
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
            let n = self.to_read.len().min(buf.len());
            buf[..n].copy_from_slice(&self.to_read[..n]);
            let remaining = self.to_read.len() - n;
            self.to_read.copy_within(n.., 0);
            self.to_read.truncate(remaining);
            Ok(n)
        }
    }
    impl NWrite for ScriptedConnection {
        type Error = ();
        fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            let _ = self.written.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }
    }
    impl Close for ScriptedConnection {
        type Error = ();
        fn close(self) -> Result<(), Self::Error> {
            Ok(())
        }
    }
    impl Connection for ScriptedConnection {}

    #[derive(Default)]
    struct NoopHandler;
    impl EventHandler for NoopHandler {
        fn send_bytes(&mut self, _buf: &[u8]) {}
        fn schedule_tick(&mut self, _ms: u32) {}
        fn cancel_tick(&mut self) -> u32 {
            0
        }
        fn broker_disconnected(
            &mut self,
            _reason: DisconnectedReason,
            _info: Option<DisconnectInfo<'_>>,
        ) {
        }
        fn message_received(&mut self, _msg: MessageInfo<'_>) {}
        fn connect_complete(
            &mut self,
            _status: AsyncOpStatus,
            _response: Option<ConnectResponse<'_>>,
        ) {
        }
        fn publish_complete(
            &mut self,
            _handle: OpHandle,
            _status: AsyncOpStatus,
            _response: Option<PublishResponse<'_>>,
        ) {
        }
        fn subscribe_complete(
            &mut self,
            _handle: OpHandle,
            _status: AsyncOpStatus,
            _response: Option<SubscribeResponse<'_>>,
        ) {
        }
        fn unsubscribe_complete(
            &mut self,
            _handle: OpHandle,
            _status: AsyncOpStatus,
            _response: Option<UnsubscribeResponse<'_>>,
        ) {
        }
        fn authenticate(&mut self, _data: Option<&[u8]>) -> AuthStep {
            AuthStep::Disconnect
        }
    }

    #[test]
    fn pump_feeds_read_bytes_into_client() {
        let conn = ScriptedConnection {
            to_read: heapless::Vec::from_slice(&[0x20, 0x03, 0x00, 0x00, 0x00]).unwrap(),
            written: heapless::Vec::new(),
        };
        let mut pump: BytePump<ScriptedConnection, 256> = BytePump::new(conn);
        let mut client = EngineClient::new(NoopHandler, ClientConfig::default());
        let n = pump.pump(&mut client).unwrap();
        assert_eq!(n, 5);
    }

    #[test]
    fn pump_reports_closed_on_zero_read() {
        let conn = ScriptedConnection {
            to_read: heapless::Vec::new(),
            written: heapless::Vec::new(),
        };
        let mut pump: BytePump<ScriptedConnection, 256> = BytePump::new(conn);
        let mut client = EngineClient::new(NoopHandler, ClientConfig::default());
        let err = pump.pump(&mut client).unwrap_err();
        assert_eq!(err, PumpError::Closed);
    }

    #[test]
    fn write_all_forwards_to_connection() {
        let conn = ScriptedConnection {
            to_read: heapless::Vec::new(),
            written: heapless::Vec::new(),
        };
        let mut pump: BytePump<ScriptedConnection, 256> = BytePump::new(conn);
        pump.write_all(&[1, 2, 3]).unwrap();
        assert_eq!(&pump.connection().written[..], &[1, 2, 3]);
    }
}

//! Host-implemented callback trait driving the engine's I/O and timing.
//!
//! The engine never touches a socket or a clock directly. A host wires it
//! up by implementing [`EventHandler`] and handing the implementor to
//! [`crate::network::application::mqtt::Client::new`].

use crate::network::application::mqtt::error::{AsyncOpStatus, DisconnectedReason};
use crate::network::application::mqtt::limits::MAX_TOPICS_PER_REQUEST;
use crate::network::application::mqtt::op::connect::AuthStep;
use crate::network::application::mqtt::op::OpHandle;
use crate::network::application::mqtt::reason::ReasonCode;
use heapless::Vec;

/// A single inbound PUBLISH, handed to [`EventHandler::message_received`].
///
/// Borrowed from the engine's internal receive buffer; valid only for the
/// duration of the callback.
#[derive(Debug)]
pub struct MessageInfo<'a> {
    /// The resolved topic name (never an alias by the time this is
    /// delivered; the engine resolves aliases before calling back).
    pub topic: &'a str,
    /// The message payload.
    pub payload: &'a [u8],
    /// QoS the message was published at.
    pub qos: crate::network::application::mqtt::packet::QoS,
    /// Whether the broker is delivering this as a retained message.
    pub retain: bool,
    /// Optional MQTT content type string.
    pub content_type: Option<&'a str>,
    /// Optional response topic, for request/response patterns.
    pub response_topic: Option<&'a str>,
    /// Optional opaque correlation data, for request/response patterns.
    pub correlation_data: Option<&'a [u8]>,
    /// `0` for unspecified bytes, `1` for UTF-8 payload.
    pub payload_format_indicator: Option<u8>,
    /// Seconds after which the broker may discard this message if
    /// undelivered.
    pub message_expiry_interval: Option<u32>,
    /// Subscription identifier(s) that caused this message to be
    /// delivered, in the order the broker sent them.
    pub subscription_identifiers: &'a [u32],
}

/// Optional detail accompanying a broker-initiated disconnect, present
/// only when the reason is [`DisconnectedReason::DisconnectMsg`].
#[derive(Debug)]
pub struct DisconnectInfo<'a> {
    /// The reason code the broker gave for the disconnect.
    pub reason_code: ReasonCode,
    /// Optional human-readable reason string, present only when the
    /// session negotiated problem information.
    pub reason_string: Option<&'a str>,
}

/// Outcome of a completed CONNECT, passed to
/// [`EventHandler::connect_complete`] when `status` is `Complete`.
#[derive(Debug)]
pub struct ConnectResponse<'a> {
    /// The broker's CONNACK reason code.
    pub reason_code: ReasonCode,
    /// Whether the broker is resuming a prior session for this client id.
    pub session_present: bool,
    /// The client id the broker assigned, present only when the CONNECT
    /// was sent with an empty client id.
    pub assigned_client_id: Option<&'a str>,
    /// Optional human-readable reason string.
    pub reason_string: Option<&'a str>,
}

/// Outcome of a completed PUBLISH, passed to
/// [`EventHandler::publish_complete`] when `status` is `Complete`.
#[derive(Debug)]
pub struct PublishResponse<'a> {
    /// The broker's PUBACK/PUBCOMP reason code (or a locally synthesised
    /// one for a QoS 0 publish / an encode failure).
    pub reason_code: ReasonCode,
    /// Optional human-readable reason string.
    pub reason_string: Option<&'a str>,
}

/// Outcome of a completed SUBSCRIBE, passed to
/// [`EventHandler::subscribe_complete`] when `status` is `Complete`.
#[derive(Debug)]
pub struct SubscribeResponse<'a> {
    /// One reason code per requested topic, in request order.
    pub reason_codes: Vec<ReasonCode, MAX_TOPICS_PER_REQUEST>,
    /// Optional human-readable reason string.
    pub reason_string: Option<&'a str>,
}

/// Outcome of a completed UNSUBSCRIBE, passed to
/// [`EventHandler::unsubscribe_complete`] when `status` is `Complete`.
#[derive(Debug)]
pub struct UnsubscribeResponse<'a> {
    /// One reason code per requested filter, in request order.
    pub reason_codes: Vec<ReasonCode, MAX_TOPICS_PER_REQUEST>,
    /// Optional human-readable reason string.
    pub reason_string: Option<&'a str>,
}

/// Callbacks the engine invokes synchronously while servicing
/// [`crate::network::application::mqtt::Client::feed_bytes`],
/// [`crate::network::application::mqtt::Client::tick`], and the
/// `prepare_*`/`send` operation API.
///
/// Every method may be called re-entrantly: the engine's API guard
/// tolerates a host callback calling back into the client.
pub trait EventHandler {
    /// Emit a fully serialised packet. Called at most once per API call
    /// with a single contiguous buffer; the host must copy or fully
    /// consume it before returning.
    fn send_bytes(&mut self, buf: &[u8]);

    /// Ask the host to call `tick` again after `ms` milliseconds.
    /// Cancels and replaces any previously scheduled tick.
    fn schedule_tick(&mut self, ms: u32);

    /// Cancel a previously scheduled tick and report how many
    /// milliseconds actually elapsed since it was scheduled.
    fn cancel_tick(&mut self) -> u32;

    /// The broker (or the transport) disconnected without the host
    /// calling `disconnect` itself. `info` is `Some` only when `reason`
    /// is [`DisconnectedReason::DisconnectMsg`].
    fn broker_disconnected(&mut self, reason: DisconnectedReason, info: Option<DisconnectInfo<'_>>);

    /// Deliver an inbound PUBLISH, in arrival order.
    fn message_received(&mut self, msg: MessageInfo<'_>);

    /// The singleton CONNECT operation completed.
    fn connect_complete(&mut self, status: AsyncOpStatus, response: Option<ConnectResponse<'_>>);

    /// A PUBLISH operation completed.
    fn publish_complete(
        &mut self,
        handle: OpHandle,
        status: AsyncOpStatus,
        response: Option<PublishResponse<'_>>,
    );

    /// A SUBSCRIBE operation completed.
    fn subscribe_complete(
        &mut self,
        handle: OpHandle,
        status: AsyncOpStatus,
        response: Option<SubscribeResponse<'_>>,
    );

    /// An UNSUBSCRIBE operation completed.
    fn unsubscribe_complete(
        &mut self,
        handle: OpHandle,
        status: AsyncOpStatus,
        response: Option<UnsubscribeResponse<'_>>,
    );

    /// The singleton re-authentication operation completed. The default
    /// implementation ignores it, since most hosts never use enhanced
    /// auth.
    fn reauth_complete(&mut self, _status: AsyncOpStatus) {}

    /// The broker sent AUTH `Continue Authentication`, during the initial
    /// handshake or an explicit [`crate::network::application::mqtt::Client::reauth`].
    /// `data` is the challenge the broker attached, if any. The default
    /// implementation refuses enhanced authentication outright; hosts that
    /// use SASL-style auth methods must override this.
    fn authenticate(&mut self, _data: Option<&[u8]>) -> AuthStep {
        AuthStep::Disconnect
    }
}

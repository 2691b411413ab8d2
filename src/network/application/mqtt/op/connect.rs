//! The CONNECT / CONNACK / (optional) AUTH handshake.

use crate::network::application::mqtt::limits::{MAX_CLIENT_ID, MAX_FIELD, MAX_PAYLOAD, MAX_TOPIC, MAX_USER_PROPS};
use crate::network::application::mqtt::packet::QoS;
use crate::network::application::mqtt::primitives::StringPair;
use heapless::{String, Vec};

/// The Will message configured on a CONNECT, delivered by the broker if
/// the session ends ungracefully.
#[derive(Debug, Clone)]
pub struct WillConfig {
    /// Topic the will message is published to.
    pub topic: String<MAX_TOPIC>,
    /// Will payload.
    pub payload: Vec<u8, MAX_PAYLOAD>,
    /// QoS the will message is published at.
    pub qos: QoS,
    /// Whether the will message is published as retained.
    pub retain: bool,
    /// Delay, in milliseconds, before the broker publishes the will after
    /// detecting session loss.
    pub delay_interval_ms: Option<u32>,
    /// `0` for unspecified bytes, `1` for UTF-8 payload.
    pub payload_format_indicator: Option<u8>,
    /// Seconds after which the broker may discard the will if
    /// undelivered.
    pub message_expiry_interval: Option<u32>,
    /// Optional MQTT content type string.
    pub content_type: Option<String<MAX_FIELD>>,
    /// Optional response topic, for request/response patterns.
    pub response_topic: Option<String<MAX_TOPIC>>,
    /// Optional opaque correlation data.
    pub correlation_data: Option<Vec<u8, MAX_FIELD>>,
}

/// What the host wants to happen when the broker sends an AUTH
/// `Continue Authentication` challenge, during the initial handshake or
/// during an explicit re-authentication.
#[derive(Debug, Clone)]
pub enum AuthStep {
    /// Reply with another AUTH packet carrying this authentication data.
    Continue(Vec<u8, MAX_FIELD>),
    /// Abandon the exchange with `DISCONNECT{NotAuthorized}`.
    Disconnect,
}

/// Full CONNECT configuration, owned by the caller and handed to
/// [`crate::network::application::mqtt::client::Client::connect`] whole.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Client identifier; may be empty to request a broker-assigned one.
    pub client_id: String<MAX_CLIENT_ID>,
    /// Mandatory `true` on the very first connect attempt or when
    /// `client_id` is empty; the client enforces this regardless of the
    /// value passed here.
    pub clean_start: bool,
    /// Requested keep-alive interval, in milliseconds (the broker may
    /// override it).
    pub keep_alive_ms: u32,
    /// Optional username credential.
    pub username: Option<String<MAX_FIELD>>,
    /// Optional password credential.
    pub password: Option<Vec<u8, MAX_FIELD>>,
    /// Optional will message.
    pub will: Option<WillConfig>,
    /// Enhanced-authentication method name, if any.
    pub authentication_method: Option<String<MAX_FIELD>>,
    /// Initial enhanced-authentication data, if any.
    pub authentication_data: Option<Vec<u8, MAX_FIELD>>,
    /// Our advertised cap on the broker's concurrent outbound QoS>0
    /// publishes to us.
    pub receive_maximum: u16,
    /// Our advertised maximum packet size.
    pub max_packet_size: Option<u32>,
    /// Our advertised cap on the receive-side topic alias table.
    pub topic_alias_maximum: u16,
    /// Whether to ask the broker for response information (used to build
    /// request/response topics).
    pub request_response_information: bool,
    /// Whether the broker may include reason strings / user properties
    /// in its responses.
    pub request_problem_information: bool,
    /// Requested session expiry interval, in milliseconds.
    pub session_expiry_interval_ms: u32,
    /// Extra user properties to attach to the CONNECT.
    pub user_properties: Vec<(String<MAX_FIELD>, String<MAX_FIELD>), MAX_USER_PROPS>,
    /// Response timeout override; `None` uses the client's configured
    /// default.
    pub response_timeout_ms: Option<u32>,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            clean_start: true,
            keep_alive_ms: 60_000,
            username: None,
            password: None,
            will: None,
            authentication_method: None,
            authentication_data: None,
            receive_maximum: 65_535,
            max_packet_size: None,
            topic_alias_maximum: 0,
            request_response_information: false,
            request_problem_information: true,
            session_expiry_interval_ms: 0,
            user_properties: Vec::new(),
            response_timeout_ms: None,
        }
    }
}

/// `as StringPair` view helper used by the encoder over
/// `user_properties`, avoiding a per-call allocation of an intermediate
/// `Vec<StringPair>`.
pub fn user_properties_as_pairs(config: &ConnectConfig) -> Vec<StringPair<'_>, MAX_USER_PROPS> {
    let mut out = Vec::new();
    for (k, v) in config.user_properties.iter() {
        let _ = out.push(StringPair {
            name: k.as_str(),
            value: v.as_str(),
        });
    }
    out
}

/// Where the CONNECT operation currently stands.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ConnectState {
    /// CONNECT sent, awaiting CONNACK.
    WaitConnack,
    /// AUTH challenge/response in progress, awaiting the next AUTH or
    /// CONNACK.
    WaitAuth,
}

/// Live bookkeeping for the singleton in-flight CONNECT.
#[derive(Debug)]
pub struct ConnectOp {
    /// The configuration this CONNECT was issued with.
    pub config: ConnectConfig,
    /// Current handshake state.
    pub state: ConnectState,
    /// The armed response timer, if any.
    pub timer: Option<crate::network::application::mqtt::timer::TimerId>,
}

impl ConnectOp {
    /// Construct a new CONNECT operation, awaiting CONNACK.
    pub fn new(config: ConnectConfig) -> Self {
        Self {
            config,
            state: ConnectState::WaitConnack,
            timer: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_request_clean_start() {
        let config = ConnectConfig::default();
        assert!(config.clean_start);
        assert!(config.will.is_none());
    }
}

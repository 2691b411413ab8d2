//! MQTT v5 property list codec.
//!
//! Every packet body may carry a property list, itself prefixed by a
//! variable-length integer giving its byte length. Each property is
//! `{identifier varint, typed value}`. Every property identifier may
//! appear at most once per list except `User Property` (multi-valued) and
//! `Subscription Identifier` (multi-valued, PUBLISH only); a duplicate of
//! any other identifier is a protocol error.
//!
//! This module mirrors the "single handler sees every property" shape of
//! a classic property-list reader: [`PropertiesView`] has one optional (or
//! bounded-list) field per identifier the engine understands, populated in
//! a single pass over the wire bytes by [`decode`].

use crate::network::application::mqtt::limits::{MAX_SUB_FILTERS, MAX_USER_PROPS};
use crate::network::application::mqtt::primitives::{
    self, ReadError, StringPair,
};
use crate::network::application::mqtt::varint;
use heapless::Vec;

/// Numeric MQTT v5 property identifiers.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u32)]
pub enum PropertyId {
    /// `PUBLISH`: whether the payload is UTF-8 text.
    PayloadFormatIndicator = 1,
    /// `PUBLISH`/will: seconds after which the message may be discarded.
    MessageExpiryInterval = 2,
    /// `PUBLISH`/will: MIME-style content type string.
    ContentType = 3,
    /// `PUBLISH`/will: topic to reply to for request/response patterns.
    ResponseTopic = 8,
    /// `PUBLISH`/will: opaque data correlating a response to a request.
    CorrelationData = 9,
    /// `PUBLISH`/`SUBSCRIBE`: identifier tying delivered messages back to
    /// the subscription that produced them.
    SubscriptionIdentifier = 11,
    /// `CONNECT`/`CONNACK`/`DISCONNECT`: how long the session survives
    /// after disconnect, in seconds.
    SessionExpiryInterval = 17,
    /// `CONNACK`: client identifier assigned by the broker.
    AssignedClientIdentifier = 18,
    /// `CONNACK`: keep-alive the broker requires the client to use
    /// instead of the one requested.
    ServerKeepAlive = 19,
    /// `CONNECT`/`AUTH`: name of the extended authentication method.
    AuthenticationMethod = 21,
    /// `CONNECT`/`AUTH`: method-specific authentication data.
    AuthenticationData = 22,
    /// `CONNECT`: whether the broker may include reason strings/user
    /// properties on failure responses.
    RequestProblemInformation = 23,
    /// Will: seconds to delay publishing the Will after the network
    /// connection is lost.
    WillDelayInterval = 24,
    /// `CONNECT`: whether the client would like response information
    /// back in CONNACK.
    RequestResponseInformation = 25,
    /// `CONNACK`: response information requested via
    /// `RequestResponseInformation`.
    ResponseInformation = 26,
    /// `CONNACK`/`DISCONNECT`: alternate server to use instead.
    ServerReference = 28,
    /// Human-readable diagnostic string accompanying a reason code.
    ReasonString = 31,
    /// `CONNECT`/`CONNACK`: maximum number of unacknowledged QoS 1/2
    /// publishes the sender will accept at once.
    ReceiveMaximum = 33,
    /// `CONNECT`/`CONNACK`: highest topic alias value the sender accepts.
    TopicAliasMaximum = 34,
    /// `PUBLISH`: alias standing in for (or alongside) the topic name.
    TopicAlias = 35,
    /// `CONNACK`: highest QoS the broker supports.
    MaximumQos = 36,
    /// `CONNACK`: whether the broker supports retained messages.
    RetainAvailable = 37,
    /// Name/value pair; the only property besides `SubscriptionIdentifier`
    /// allowed to repeat.
    UserProperty = 38,
    /// `CONNECT`/`CONNACK`: maximum total packet size the sender accepts.
    MaximumPacketSize = 39,
    /// `CONNACK`: whether the broker supports wildcard subscriptions.
    WildcardSubscriptionAvailable = 40,
    /// `CONNACK`: whether the broker supports subscription identifiers.
    SubscriptionIdentifierAvailable = 41,
    /// `CONNACK`: whether the broker supports shared subscriptions.
    SharedSubscriptionAvailable = 42,
}

impl PropertyId {
    fn from_u32(v: u32) -> Option<Self> {
        use PropertyId::*;
        Some(match v {
            1 => PayloadFormatIndicator,
            2 => MessageExpiryInterval,
            3 => ContentType,
            8 => ResponseTopic,
            9 => CorrelationData,
            11 => SubscriptionIdentifier,
            17 => SessionExpiryInterval,
            18 => AssignedClientIdentifier,
            19 => ServerKeepAlive,
            21 => AuthenticationMethod,
            22 => AuthenticationData,
            23 => RequestProblemInformation,
            24 => WillDelayInterval,
            25 => RequestResponseInformation,
            26 => ResponseInformation,
            28 => ServerReference,
            31 => ReasonString,
            33 => ReceiveMaximum,
            34 => TopicAliasMaximum,
            35 => TopicAlias,
            36 => MaximumQos,
            37 => RetainAvailable,
            38 => UserProperty,
            39 => MaximumPacketSize,
            40 => WildcardSubscriptionAvailable,
            41 => SubscriptionIdentifierAvailable,
            42 => SharedSubscriptionAvailable,
            _ => return None,
        })
    }
}

/// Decode-time failure for a property list.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PropertyError {
    /// Fewer bytes are available than the list declares.
    NotEnough,
    /// Unrecognised identifier, bad value encoding, or invalid UTF-8.
    Malformed,
    /// A single-valued identifier appeared more than once.
    Duplicate,
}

impl From<ReadError> for PropertyError {
    fn from(e: ReadError) -> Self {
        match e {
            ReadError::NotEnough => PropertyError::NotEnough,
            ReadError::Malformed => PropertyError::Malformed,
        }
    }
}

impl From<varint::DecodeError> for PropertyError {
    fn from(e: varint::DecodeError) -> Self {
        match e {
            varint::DecodeError::NotEnough => PropertyError::NotEnough,
            varint::DecodeError::Malformed => PropertyError::Malformed,
        }
    }
}

/// Every property the engine recognises, decoded from a single packet's
/// property list.
#[derive(Debug, Default)]
pub struct PropertiesView<'a> {
    /// Whether the payload is UTF-8 text (`1`) or unspecified bytes (`0`).
    pub payload_format_indicator: Option<u8>,
    /// Seconds after which the message may be discarded if undelivered.
    pub message_expiry_interval: Option<u32>,
    /// MIME-style content type of the payload.
    pub content_type: Option<&'a str>,
    /// Topic to reply to for request/response patterns.
    pub response_topic: Option<&'a str>,
    /// Opaque data correlating a response to a request.
    pub correlation_data: Option<&'a [u8]>,
    /// Subscription identifiers tying a delivered message back to the
    /// subscriptions that produced it; may repeat.
    pub subscription_identifiers: Vec<u32, MAX_SUB_FILTERS>,
    /// How long the session survives after disconnect, in seconds.
    pub session_expiry_interval: Option<u32>,
    /// Client identifier assigned by the broker when none was requested.
    pub assigned_client_identifier: Option<&'a str>,
    /// Keep-alive the broker requires in place of the one requested.
    pub server_keep_alive: Option<u16>,
    /// Name of the extended authentication method in use.
    pub authentication_method: Option<&'a str>,
    /// Method-specific authentication data.
    pub authentication_data: Option<&'a [u8]>,
    /// Whether reason strings/user properties may appear on failures.
    pub request_problem_information: Option<u8>,
    /// Seconds to delay publishing a Will after the connection is lost.
    pub will_delay_interval: Option<u32>,
    /// Whether response information was requested in CONNACK.
    pub request_response_information: Option<u8>,
    /// Response information requested via `request_response_information`.
    pub response_information: Option<&'a str>,
    /// Alternate server reference to use instead of this one.
    pub server_reference: Option<&'a str>,
    /// Human-readable diagnostic accompanying the reason code.
    pub reason_string: Option<&'a str>,
    /// Maximum number of unacknowledged QoS 1/2 publishes accepted at once.
    pub receive_maximum: Option<u16>,
    /// Highest topic alias value the sender accepts.
    pub topic_alias_maximum: Option<u16>,
    /// Topic alias attached to a PUBLISH.
    pub topic_alias: Option<u16>,
    /// Highest QoS the broker supports.
    pub maximum_qos: Option<u8>,
    /// Whether the broker supports retained messages.
    pub retain_available: Option<u8>,
    /// Application-defined name/value pairs; the only property besides
    /// subscription identifiers allowed to repeat.
    pub user_properties: Vec<StringPair<'a>, MAX_USER_PROPS>,
    /// Maximum total packet size the sender accepts.
    pub maximum_packet_size: Option<u32>,
    /// Whether the broker supports wildcard subscriptions.
    pub wildcard_subscription_available: Option<u8>,
    /// Whether the broker supports subscription identifiers.
    pub subscription_identifier_available: Option<u8>,
    /// Whether the broker supports shared subscriptions.
    pub shared_subscription_available: Option<u8>,
}

macro_rules! store_once {
    ($slot:expr, $value:expr) => {{
        if $slot.is_some() {
            return Err(PropertyError::Duplicate);
        }
        $slot = Some($value);
    }};
}

/// Decode a length-prefixed property list from the front of `buf`.
///
/// Returns the populated view and the total number of bytes consumed
/// (including the length prefix itself).
pub fn decode(buf: &[u8]) -> Result<(PropertiesView<'_>, usize), PropertyError> {
    let (len, hdr) = varint::decode(buf)?;
    let len = len as usize;
    if buf.len() < hdr + len {
        return Err(PropertyError::NotEnough);
    }
    let mut cursor = &buf[hdr..hdr + len];
    let mut view = PropertiesView::default();

    while !cursor.is_empty() {
        let (id_raw, id_len) = varint::decode(cursor)?;
        cursor = &cursor[id_len..];
        let id = PropertyId::from_u32(id_raw).ok_or(PropertyError::Malformed)?;
        use PropertyId::*;
        let consumed = match id {
            PayloadFormatIndicator => {
                let (v, n) = primitives::read_u8(cursor)?;
                store_once!(view.payload_format_indicator, v);
                n
            }
            MessageExpiryInterval => {
                let (v, n) = primitives::read_u32(cursor)?;
                store_once!(view.message_expiry_interval, v);
                n
            }
            ContentType => {
                let (v, n) = primitives::read_utf8(cursor)?;
                store_once!(view.content_type, v);
                n
            }
            ResponseTopic => {
                let (v, n) = primitives::read_utf8(cursor)?;
                store_once!(view.response_topic, v);
                n
            }
            CorrelationData => {
                let (v, n) = primitives::read_binary(cursor)?;
                store_once!(view.correlation_data, v);
                n
            }
            SubscriptionIdentifier => {
                let (v, n) = varint::decode(cursor)?;
                view.subscription_identifiers
                    .push(v)
                    .map_err(|_| PropertyError::Malformed)?;
                n
            }
            SessionExpiryInterval => {
                let (v, n) = primitives::read_u32(cursor)?;
                store_once!(view.session_expiry_interval, v);
                n
            }
            AssignedClientIdentifier => {
                let (v, n) = primitives::read_utf8(cursor)?;
                store_once!(view.assigned_client_identifier, v);
                n
            }
            ServerKeepAlive => {
                let (v, n) = primitives::read_u16(cursor)?;
                store_once!(view.server_keep_alive, v);
                n
            }
            AuthenticationMethod => {
                let (v, n) = primitives::read_utf8(cursor)?;
                store_once!(view.authentication_method, v);
                n
            }
            AuthenticationData => {
                let (v, n) = primitives::read_binary(cursor)?;
                store_once!(view.authentication_data, v);
                n
            }
            RequestProblemInformation => {
                let (v, n) = primitives::read_u8(cursor)?;
                store_once!(view.request_problem_information, v);
                n
            }
            WillDelayInterval => {
                let (v, n) = primitives::read_u32(cursor)?;
                store_once!(view.will_delay_interval, v);
                n
            }
            RequestResponseInformation => {
                let (v, n) = primitives::read_u8(cursor)?;
                store_once!(view.request_response_information, v);
                n
            }
            ResponseInformation => {
                let (v, n) = primitives::read_utf8(cursor)?;
                store_once!(view.response_information, v);
                n
            }
            ServerReference => {
                let (v, n) = primitives::read_utf8(cursor)?;
                store_once!(view.server_reference, v);
                n
            }
            ReasonString => {
                let (v, n) = primitives::read_utf8(cursor)?;
                store_once!(view.reason_string, v);
                n
            }
            ReceiveMaximum => {
                let (v, n) = primitives::read_u16(cursor)?;
                store_once!(view.receive_maximum, v);
                n
            }
            TopicAliasMaximum => {
                let (v, n) = primitives::read_u16(cursor)?;
                store_once!(view.topic_alias_maximum, v);
                n
            }
            TopicAlias => {
                let (v, n) = primitives::read_u16(cursor)?;
                store_once!(view.topic_alias, v);
                n
            }
            MaximumQos => {
                let (v, n) = primitives::read_u8(cursor)?;
                store_once!(view.maximum_qos, v);
                n
            }
            RetainAvailable => {
                let (v, n) = primitives::read_u8(cursor)?;
                store_once!(view.retain_available, v);
                n
            }
            UserProperty => {
                let (pair, n) = primitives::read_utf8_pair(cursor)?;
                view.user_properties
                    .push(pair)
                    .map_err(|_| PropertyError::Malformed)?;
                n
            }
            MaximumPacketSize => {
                let (v, n) = primitives::read_u32(cursor)?;
                store_once!(view.maximum_packet_size, v);
                n
            }
            WildcardSubscriptionAvailable => {
                let (v, n) = primitives::read_u8(cursor)?;
                store_once!(view.wildcard_subscription_available, v);
                n
            }
            SubscriptionIdentifierAvailable => {
                let (v, n) = primitives::read_u8(cursor)?;
                store_once!(view.subscription_identifier_available, v);
                n
            }
            SharedSubscriptionAvailable => {
                let (v, n) = primitives::read_u8(cursor)?;
                store_once!(view.shared_subscription_available, v);
                n
            }
        };
        cursor = &cursor[consumed..];
    }

    Ok((view, hdr + len))
}

/// A single outgoing property, ready to be length-prefixed and encoded.
#[derive(Debug, Clone, Copy)]
pub enum PropertyOut<'a> {
    /// Whether the payload is UTF-8 text.
    PayloadFormatIndicator(u8),
    /// Seconds after which the message may be discarded if undelivered.
    MessageExpiryInterval(u32),
    /// MIME-style content type of the payload.
    ContentType(&'a str),
    /// Topic to reply to for request/response patterns.
    ResponseTopic(&'a str),
    /// Opaque data correlating a response to a request.
    CorrelationData(&'a [u8]),
    /// Subscription identifier to attach.
    SubscriptionIdentifier(u32),
    /// How long the session should survive after disconnect, in seconds.
    SessionExpiryInterval(u32),
    /// Keep-alive the broker is imposing in place of the one requested.
    ServerKeepAlive(u16),
    /// Name of the extended authentication method in use.
    AuthenticationMethod(&'a str),
    /// Method-specific authentication data.
    AuthenticationData(&'a [u8]),
    /// Whether reason strings/user properties may appear on failures.
    RequestProblemInformation(u8),
    /// Seconds to delay publishing a Will after the connection is lost.
    WillDelayInterval(u32),
    /// Whether response information is requested in CONNACK.
    RequestResponseInformation(u8),
    /// Human-readable diagnostic accompanying the reason code.
    ReasonString(&'a str),
    /// Maximum number of unacknowledged QoS 1/2 publishes accepted at once.
    ReceiveMaximum(u16),
    /// Highest topic alias value accepted.
    TopicAliasMaximum(u16),
    /// Topic alias to attach to a PUBLISH.
    TopicAlias(u16),
    /// Whether retained messages are supported.
    RetainAvailable(u8),
    /// An application-defined name/value pair.
    UserProperty(&'a str, &'a str),
    /// Maximum total packet size accepted.
    MaximumPacketSize(u32),
    /// Whether subscription identifiers are supported.
    SubscriptionIdentifierAvailable(u8),
}

impl PropertyOut<'_> {
    fn id(&self) -> u32 {
        use PropertyOut::*;
        match self {
            PayloadFormatIndicator(_) => PropertyId::PayloadFormatIndicator as u32,
            MessageExpiryInterval(_) => PropertyId::MessageExpiryInterval as u32,
            ContentType(_) => PropertyId::ContentType as u32,
            ResponseTopic(_) => PropertyId::ResponseTopic as u32,
            CorrelationData(_) => PropertyId::CorrelationData as u32,
            SubscriptionIdentifier(_) => PropertyId::SubscriptionIdentifier as u32,
            SessionExpiryInterval(_) => PropertyId::SessionExpiryInterval as u32,
            ServerKeepAlive(_) => PropertyId::ServerKeepAlive as u32,
            AuthenticationMethod(_) => PropertyId::AuthenticationMethod as u32,
            AuthenticationData(_) => PropertyId::AuthenticationData as u32,
            RequestProblemInformation(_) => PropertyId::RequestProblemInformation as u32,
            WillDelayInterval(_) => PropertyId::WillDelayInterval as u32,
            RequestResponseInformation(_) => PropertyId::RequestResponseInformation as u32,
            ReasonString(_) => PropertyId::ReasonString as u32,
            ReceiveMaximum(_) => PropertyId::ReceiveMaximum as u32,
            TopicAliasMaximum(_) => PropertyId::TopicAliasMaximum as u32,
            TopicAlias(_) => PropertyId::TopicAlias as u32,
            RetainAvailable(_) => PropertyId::RetainAvailable as u32,
            UserProperty(_, _) => PropertyId::UserProperty as u32,
            MaximumPacketSize(_) => PropertyId::MaximumPacketSize as u32,
            SubscriptionIdentifierAvailable(_) => PropertyId::SubscriptionIdentifierAvailable as u32,
        }
    }

    fn value_len(&self) -> usize {
        use PropertyOut::*;
        match self {
            PayloadFormatIndicator(_) => 1,
            MessageExpiryInterval(_) => 4,
            ContentType(s) | ResponseTopic(s) | AuthenticationMethod(s) | ReasonString(s) => {
                primitives::binary_encoded_len(s.len())
            }
            CorrelationData(b) | AuthenticationData(b) => primitives::binary_encoded_len(b.len()),
            SubscriptionIdentifier(v) => varint::encoded_len(*v),
            SessionExpiryInterval(_) => 4,
            ServerKeepAlive(_) => 2,
            RequestProblemInformation(_) => 1,
            WillDelayInterval(_) => 4,
            RequestResponseInformation(_) => 1,
            ReceiveMaximum(_) => 2,
            TopicAliasMaximum(_) => 2,
            TopicAlias(_) => 2,
            RetainAvailable(_) => 1,
            UserProperty(k, v) => {
                primitives::binary_encoded_len(k.len()) + primitives::binary_encoded_len(v.len())
            }
            MaximumPacketSize(_) => 4,
            SubscriptionIdentifierAvailable(_) => 1,
        }
    }

    /// Encoded length including the 1-byte identifier varint (every
    /// identifier in use is `< 128`, so it is always exactly one byte).
    pub fn encoded_len(&self) -> usize {
        1 + self.value_len()
    }

    fn write<const N: usize>(&self, out: &mut Vec<u8, N>) -> Result<(), ()> {
        varint::encode(self.id(), out)?;
        use PropertyOut::*;
        match *self {
            PayloadFormatIndicator(v) => primitives::write_u8(v, out),
            MessageExpiryInterval(v) => primitives::write_u32(v, out),
            ContentType(s) | ResponseTopic(s) | AuthenticationMethod(s) | ReasonString(s) => {
                primitives::write_utf8(s, out)
            }
            CorrelationData(b) | AuthenticationData(b) => primitives::write_binary(b, out),
            SubscriptionIdentifier(v) => varint::encode(v, out),
            SessionExpiryInterval(v) => primitives::write_u32(v, out),
            ServerKeepAlive(v) => primitives::write_u16(v, out),
            RequestProblemInformation(v) => primitives::write_u8(v, out),
            WillDelayInterval(v) => primitives::write_u32(v, out),
            RequestResponseInformation(v) => primitives::write_u8(v, out),
            ReceiveMaximum(v) => primitives::write_u16(v, out),
            TopicAliasMaximum(v) => primitives::write_u16(v, out),
            TopicAlias(v) => primitives::write_u16(v, out),
            RetainAvailable(v) => primitives::write_u8(v, out),
            UserProperty(k, v) => primitives::write_utf8_pair(k, v, out),
            MaximumPacketSize(v) => primitives::write_u32(v, out),
            SubscriptionIdentifierAvailable(v) => primitives::write_u8(v, out),
        }
    }
}

/// Encode a length-prefixed property list into `out`.
pub fn encode<const N: usize>(items: &[PropertyOut<'_>], out: &mut Vec<u8, N>) -> Result<(), ()> {
    let body_len: usize = items.iter().map(PropertyOut::encoded_len).sum();
    varint::encode(body_len as u32, out)?;
    for item in items {
        item.write(out)?;
    }
    Ok(())
}

/// Total wire length of a property list (length prefix plus body),
/// useful for preflight size checks before encoding.
pub fn total_encoded_len(items: &[PropertyOut<'_>]) -> usize {
    let body_len: usize = items.iter().map(PropertyOut::encoded_len).sum();
    varint::encoded_len(body_len as u32) + body_len
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_simple_properties() {
        let items = [
            PropertyOut::SessionExpiryInterval(3600),
            PropertyOut::ReceiveMaximum(20),
            PropertyOut::UserProperty("k", "v"),
        ];
        let mut buf: Vec<u8, 128> = Vec::new();
        encode(&items, &mut buf).unwrap();
        let (view, consumed) = decode(&buf).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(view.session_expiry_interval, Some(3600));
        assert_eq!(view.receive_maximum, Some(20));
        assert_eq!(view.user_properties.len(), 1);
        assert_eq!(view.user_properties[0].name, "k");
        assert_eq!(view.user_properties[0].value, "v");
    }

    #[test]
    fn rejects_duplicate_single_valued_property() {
        let mut buf: Vec<u8, 64> = Vec::new();
        // Hand-craft a list with SessionExpiryInterval twice.
        let mut body: Vec<u8, 64> = Vec::new();
        varint::encode(PropertyId::SessionExpiryInterval as u32, &mut body).unwrap();
        primitives::write_u32(1, &mut body).unwrap();
        varint::encode(PropertyId::SessionExpiryInterval as u32, &mut body).unwrap();
        primitives::write_u32(2, &mut body).unwrap();
        varint::encode(body.len() as u32, &mut buf).unwrap();
        buf.extend_from_slice(&body).unwrap();

        assert_eq!(decode(&buf), Err(PropertyError::Duplicate));
    }

    #[test]
    fn allows_repeated_user_properties_and_subscription_identifiers() {
        let items = [
            PropertyOut::UserProperty("a", "1"),
            PropertyOut::UserProperty("b", "2"),
            PropertyOut::SubscriptionIdentifier(5),
            PropertyOut::SubscriptionIdentifier(9),
        ];
        let mut buf: Vec<u8, 128> = Vec::new();
        encode(&items, &mut buf).unwrap();
        let (view, _) = decode(&buf).unwrap();
        assert_eq!(view.user_properties.len(), 2);
        assert_eq!(&view.subscription_identifiers[..], &[5, 9]);
    }

    #[test]
    fn empty_property_list_decodes_to_defaults() {
        let mut buf: Vec<u8, 8> = Vec::new();
        varint::encode(0, &mut buf).unwrap();
        let (view, consumed) = decode(&buf).unwrap();
        assert_eq!(consumed, 1);
        assert!(view.session_expiry_interval.is_none());
    }
}

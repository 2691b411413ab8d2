//! MQTT v5 control packet framing and per-packet-type codec.
//!
//! Every packet on the wire is `{fixed header}{variable header}{payload}`.
//! The fixed header is a one-byte `(packet type << 4) | flags` followed by
//! a variable-length integer "Remaining Length". [`read_fixed_header`]
//! peels that off; everything after it is handed to the per-type decoder
//! named here, which borrows directly from the caller's buffer.
//!
//! Inbound dispatch is modeled as a tagged union: [`decode_body`] returns
//! a [`Packet`] enum tagged by [`PacketType`], and the engine core matches
//! on it once rather than re-deriving the type from flags at every call
//! site.

use crate::network::application::mqtt::limits::MAX_TOPICS_PER_REQUEST;
use crate::network::application::mqtt::primitives::{self, ReadError};
use crate::network::application::mqtt::properties::{self, PropertiesView, PropertyError, PropertyOut};
use crate::network::application::mqtt::reason::ReasonCode;
use crate::network::application::mqtt::varint;
use heapless::Vec;

/// The four-bit packet type nibble occupying the top of the fixed
/// header's first byte.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum PacketType {
    /// Client to broker: open a session.
    Connect = 1,
    /// Broker to client: acknowledge a CONNECT.
    ConnAck = 2,
    /// Either direction: an application message.
    Publish = 3,
    /// Either direction: QoS1 publish acknowledgment.
    PubAck = 4,
    /// Either direction: QoS2 publish received (step 1).
    PubRec = 5,
    /// Either direction: QoS2 publish release (step 2).
    PubRel = 6,
    /// Either direction: QoS2 publish complete (step 3).
    PubComp = 7,
    /// Client to broker: subscribe to one or more topic filters.
    Subscribe = 8,
    /// Broker to client: acknowledge a SUBSCRIBE.
    SubAck = 9,
    /// Client to broker: unsubscribe from one or more topic filters.
    Unsubscribe = 10,
    /// Broker to client: acknowledge an UNSUBSCRIBE.
    UnsubAck = 11,
    /// Client to broker: keep-alive ping.
    PingReq = 12,
    /// Broker to client: keep-alive ping response.
    PingResp = 13,
    /// Either direction: close the connection.
    Disconnect = 14,
    /// Either direction: extended authentication exchange.
    Auth = 15,
}

impl PacketType {
    fn from_u8(v: u8) -> Option<Self> {
        use PacketType::*;
        Some(match v {
            1 => Connect,
            2 => ConnAck,
            3 => Publish,
            4 => PubAck,
            5 => PubRec,
            6 => PubRel,
            7 => PubComp,
            8 => Subscribe,
            9 => SubAck,
            10 => Unsubscribe,
            11 => UnsubAck,
            12 => PingReq,
            13 => PingResp,
            14 => Disconnect,
            15 => Auth,
            _ => return None,
        })
    }
}

/// Quality of service level.
#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Ord)]
#[repr(u8)]
pub enum QoS {
    /// Fire-and-forget: delivered at most once.
    AtMostOnce = 0,
    /// Acknowledged delivery: delivered at least once, possibly duplicated.
    AtLeastOnce = 1,
    /// Four-step handshake: delivered exactly once.
    ExactlyOnce = 2,
}

impl QoS {
    /// Decode a raw 2-bit QoS value.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(QoS::AtMostOnce),
            1 => Some(QoS::AtLeastOnce),
            2 => Some(QoS::ExactlyOnce),
            _ => None,
        }
    }

    /// The raw wire value.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// `Retain Handling` option of a SUBSCRIBE topic entry.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum RetainHandling {
    /// Send retained messages at subscribe time.
    SendAtSubscribe = 0,
    /// Send retained messages only if the subscription didn't already
    /// exist.
    SendAtSubscribeIfNotExists = 1,
    /// Never send retained messages for this subscription.
    DoNotSend = 2,
}

impl RetainHandling {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(RetainHandling::SendAtSubscribe),
            1 => Some(RetainHandling::SendAtSubscribeIfNotExists),
            2 => Some(RetainHandling::DoNotSend),
            _ => None,
        }
    }
}

/// Per-topic subscription options carried in a SUBSCRIBE packet.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct SubscribeOptions {
    /// Maximum QoS the broker may use when forwarding to this subscriber.
    pub qos: QoS,
    /// Suppress delivery of messages published by this client itself.
    pub no_local: bool,
    /// Keep the original RETAIN flag on forwarded messages rather than
    /// clearing it.
    pub retain_as_published: bool,
    /// When the broker should send existing retained messages.
    pub retain_handling: RetainHandling,
}

impl SubscribeOptions {
    fn from_u8(v: u8) -> Option<Self> {
        Some(SubscribeOptions {
            qos: QoS::from_u8(v & 0x03)?,
            no_local: v & 0x04 != 0,
            retain_as_published: v & 0x08 != 0,
            retain_handling: RetainHandling::from_u8((v >> 4) & 0x03)?,
        })
    }

    fn as_u8(self) -> u8 {
        self.qos.as_u8() | (self.no_local as u8) << 2 | (self.retain_as_published as u8) << 3
            | (self.retain_handling as u8) << 4
    }
}

/// Failure reading a fixed header or a packet body.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PacketError {
    /// Fewer bytes are available than the packet declares.
    NotEnough,
    /// The packet violates the wire format.
    Malformed,
}

impl From<ReadError> for PacketError {
    fn from(e: ReadError) -> Self {
        match e {
            ReadError::NotEnough => PacketError::NotEnough,
            ReadError::Malformed => PacketError::Malformed,
        }
    }
}

impl From<varint::DecodeError> for PacketError {
    fn from(e: varint::DecodeError) -> Self {
        match e {
            varint::DecodeError::NotEnough => PacketError::NotEnough,
            varint::DecodeError::Malformed => PacketError::Malformed,
        }
    }
}

impl From<PropertyError> for PacketError {
    fn from(e: PropertyError) -> Self {
        match e {
            PropertyError::NotEnough => PacketError::NotEnough,
            PropertyError::Malformed | PropertyError::Duplicate => PacketError::Malformed,
        }
    }
}

/// A decoded fixed header: packet type, the 4 flag bits, and the
/// "Remaining Length" of the body that follows.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct FixedHeader {
    /// The decoded packet type.
    pub packet_type: PacketType,
    /// The 4 raw flag bits from the first byte's low nibble.
    pub flags: u8,
    /// Length in bytes of the variable header plus payload that follows.
    pub remaining_length: usize,
}

/// Read and validate a fixed header from the front of `buf`.
///
/// Returns the header and the number of bytes it occupied. Does not
/// require the body to be present yet; the caller checks
/// `buf.len() - consumed >= header.remaining_length` itself and waits
/// for more bytes otherwise.
pub fn read_fixed_header(buf: &[u8]) -> Result<(FixedHeader, usize), PacketError> {
    let (first, _) = primitives::read_u8(buf)?;
    let packet_type = PacketType::from_u8(first >> 4).ok_or(PacketError::Malformed)?;
    let flags = first & 0x0F;
    let (len, len_bytes) = varint::decode(&buf[1..]).map_err(|e| match e {
        varint::DecodeError::NotEnough => PacketError::NotEnough,
        varint::DecodeError::Malformed => PacketError::Malformed,
    })?;
    Ok((
        FixedHeader {
            packet_type,
            flags,
            remaining_length: len as usize,
        },
        1 + len_bytes,
    ))
}

/// Write a fixed header: `packet_type` (upper nibble) and `flags` (lower
/// nibble), followed by the variable-length `remaining_length`.
pub fn write_fixed_header<const N: usize>(
    packet_type: PacketType,
    flags: u8,
    remaining_length: u32,
    out: &mut Vec<u8, N>,
) -> Result<(), ()> {
    primitives::write_u8((packet_type as u8) << 4 | (flags & 0x0F), out)?;
    varint::encode(remaining_length, out)
}

/// Decoded CONNECT body, borrowed from the input buffer.
#[derive(Debug)]
pub struct ConnectBody<'a> {
    /// Whether the broker was asked to discard any existing session.
    pub clean_start: bool,
    /// Requested keep-alive interval in seconds.
    pub keep_alive: u16,
    /// Requested client identifier.
    pub client_id: &'a str,
    /// QoS of the Will message, if one was supplied.
    pub will_qos: Option<QoS>,
    /// Whether the Will message should be published retained.
    pub will_retain: bool,
    /// Topic of the Will message, if one was supplied.
    pub will_topic: Option<&'a str>,
    /// Payload of the Will message, if one was supplied.
    pub will_payload: Option<&'a [u8]>,
    /// Properties attached to the Will message.
    pub will_properties: PropertiesView<'a>,
    /// Username, if the username flag was set.
    pub username: Option<&'a str>,
    /// Password, if the password flag was set.
    pub password: Option<&'a [u8]>,
    /// CONNECT-level properties.
    pub properties: PropertiesView<'a>,
}

/// Decode a CONNECT packet body (the bytes after the fixed header).
pub fn decode_connect(body: &[u8]) -> Result<ConnectBody<'_>, PacketError> {
    let (protocol_name, n1) = primitives::read_utf8(body)?;
    if protocol_name != "MQTT" {
        return Err(PacketError::Malformed);
    }
    let mut cursor = &body[n1..];
    let (protocol_level, n2) = primitives::read_u8(cursor)?;
    if protocol_level != 5 {
        return Err(PacketError::Malformed);
    }
    cursor = &cursor[n2..];
    let (connect_flags, n3) = primitives::read_u8(cursor)?;
    cursor = &cursor[n3..];
    let (keep_alive, n4) = primitives::read_u16(cursor)?;
    cursor = &cursor[n4..];

    let (properties, n5) = properties::decode(cursor)?;
    cursor = &cursor[n5..];

    let (client_id, n6) = primitives::read_utf8(cursor)?;
    cursor = &cursor[n6..];

    let will_flag = connect_flags & 0x04 != 0;
    let (will_qos, will_retain, will_topic, will_payload, will_properties) = if will_flag {
        let qos = QoS::from_u8((connect_flags >> 3) & 0x03).ok_or(PacketError::Malformed)?;
        let retain = connect_flags & 0x20 != 0;
        let (wprops, n7) = properties::decode(cursor)?;
        cursor = &cursor[n7..];
        let (topic, n8) = primitives::read_utf8(cursor)?;
        cursor = &cursor[n8..];
        let (payload, n9) = primitives::read_binary(cursor)?;
        cursor = &cursor[n9..];
        (Some(qos), retain, Some(topic), Some(payload), wprops)
    } else {
        (None, false, None, None, PropertiesView::default())
    };

    let username = if connect_flags & 0x80 != 0 {
        let (v, n) = primitives::read_utf8(cursor)?;
        cursor = &cursor[n..];
        Some(v)
    } else {
        None
    };
    let password = if connect_flags & 0x40 != 0 {
        let (v, n) = primitives::read_binary(cursor)?;
        cursor = &cursor[n..];
        Some(v)
    } else {
        None
    };
    let _ = cursor;

    Ok(ConnectBody {
        clean_start: connect_flags & 0x02 != 0,
        keep_alive,
        client_id,
        will_qos,
        will_retain,
        will_topic,
        will_payload,
        will_properties,
        username,
        password,
        properties,
    })
}

/// Parameters needed to encode a CONNECT packet. Will fields and
/// properties are supplied pre-assembled by the caller (the connect
/// operation owns the fixed-capacity storage for them).
#[derive(Debug)]
pub struct ConnectParams<'a> {
    /// Whether to ask the broker to discard any existing session.
    pub clean_start: bool,
    /// Keep-alive interval in seconds.
    pub keep_alive: u16,
    /// Client identifier to present.
    pub client_id: &'a str,
    /// Will message to register with the broker, if any.
    pub will: Option<ConnectWillParams<'a>>,
    /// Username to authenticate with, if any.
    pub username: Option<&'a str>,
    /// Password to authenticate with, if any.
    pub password: Option<&'a [u8]>,
    /// CONNECT-level properties to send.
    pub properties: &'a [PropertyOut<'a>],
}

/// The Will message portion of an outgoing CONNECT.
#[derive(Debug)]
pub struct ConnectWillParams<'a> {
    /// QoS the broker should use when publishing the Will.
    pub qos: QoS,
    /// Whether the Will should be published retained.
    pub retain: bool,
    /// Topic to publish the Will to.
    pub topic: &'a str,
    /// Will message payload.
    pub payload: &'a [u8],
    /// Properties to attach to the Will message.
    pub properties: &'a [PropertyOut<'a>],
}

/// Encode a full CONNECT packet (fixed header included) into `out`.
pub fn encode_connect<const N: usize>(
    params: &ConnectParams<'_>,
    out: &mut Vec<u8, N>,
) -> Result<(), ()> {
    let mut body: Vec<u8, N> = Vec::new();
    primitives::write_utf8("MQTT", &mut body)?;
    primitives::write_u8(5, &mut body)?;

    let mut flags = 0u8;
    if params.clean_start {
        flags |= 0x02;
    }
    if let Some(will) = &params.will {
        flags |= 0x04;
        flags |= (will.qos.as_u8()) << 3;
        if will.retain {
            flags |= 0x20;
        }
    }
    if params.password.is_some() {
        flags |= 0x40;
    }
    if params.username.is_some() {
        flags |= 0x80;
    }
    primitives::write_u8(flags, &mut body)?;
    primitives::write_u16(params.keep_alive, &mut body)?;

    properties::encode(params.properties, &mut body)?;
    primitives::write_utf8(params.client_id, &mut body)?;

    if let Some(will) = &params.will {
        properties::encode(will.properties, &mut body)?;
        primitives::write_utf8(will.topic, &mut body)?;
        primitives::write_binary(will.payload, &mut body)?;
    }
    if let Some(u) = params.username {
        primitives::write_utf8(u, &mut body)?;
    }
    if let Some(p) = params.password {
        primitives::write_binary(p, &mut body)?;
    }

    write_fixed_header(PacketType::Connect, 0, body.len() as u32, out)?;
    out.extend_from_slice(&body).map_err(|_| ())
}

/// Decoded CONNACK body.
#[derive(Debug)]
pub struct ConnAckBody<'a> {
    /// Whether the broker resumed an existing session.
    pub session_present: bool,
    /// Outcome of the connection attempt.
    pub reason_code: ReasonCode,
    /// CONNACK properties, including any negotiated session limits.
    pub properties: PropertiesView<'a>,
}

/// Decode a CONNACK packet body.
pub fn decode_connack(body: &[u8]) -> Result<ConnAckBody<'_>, PacketError> {
    let (flags, n1) = primitives::read_u8(body)?;
    let (reason_raw, n2) = primitives::read_u8(&body[n1..])?;
    let reason_code = ReasonCode::from_u8(reason_raw).ok_or(PacketError::Malformed)?;
    let (properties, _) = properties::decode(&body[n1 + n2..])?;
    Ok(ConnAckBody {
        session_present: flags & 0x01 != 0,
        reason_code,
        properties,
    })
}

/// Decoded PUBLISH body.
#[derive(Debug)]
pub struct PublishBody<'a> {
    /// Whether this is a redelivery of a previously sent PUBLISH.
    pub dup: bool,
    /// QoS the message was sent at.
    pub qos: QoS,
    /// Whether the broker is delivering this as a retained message.
    pub retain: bool,
    /// Topic name, or empty if the topic was sent as an alias only.
    pub topic_name: &'a str,
    /// Packet identifier, present for QoS 1 and 2.
    pub packet_id: Option<u16>,
    /// PUBLISH properties, including any topic alias.
    pub properties: PropertiesView<'a>,
    /// Message payload.
    pub payload: &'a [u8],
}

/// Decode a PUBLISH packet body. `flags` are the 4 fixed-header flag
/// bits (DUP/QoS/RETAIN).
pub fn decode_publish<'a>(flags: u8, body: &'a [u8]) -> Result<PublishBody<'a>, PacketError> {
    let qos = QoS::from_u8((flags >> 1) & 0x03).ok_or(PacketError::Malformed)?;
    let (topic_name, n1) = primitives::read_utf8(body)?;
    let mut cursor = &body[n1..];
    let packet_id = if qos != QoS::AtMostOnce {
        let (id, n2) = primitives::read_u16(cursor)?;
        cursor = &cursor[n2..];
        Some(id)
    } else {
        None
    };
    let (properties, n3) = properties::decode(cursor)?;
    let payload = &cursor[n3..];
    Ok(PublishBody {
        dup: flags & 0x08 != 0,
        qos,
        retain: flags & 0x01 != 0,
        topic_name,
        packet_id,
        properties,
        payload,
    })
}

/// Parameters needed to encode a PUBLISH packet.
#[derive(Debug)]
pub struct PublishParams<'a> {
    /// Whether to set the DUP flag (a resend of a prior attempt).
    pub dup: bool,
    /// QoS to publish at.
    pub qos: QoS,
    /// Whether to set the RETAIN flag.
    pub retain: bool,
    /// Topic name to send; empty when publishing by alias only.
    pub topic_name: &'a str,
    /// Packet identifier; required for QoS 1 and 2.
    pub packet_id: Option<u16>,
    /// PUBLISH properties to send.
    pub properties: &'a [PropertyOut<'a>],
    /// Message payload.
    pub payload: &'a [u8],
}

/// Encode a full PUBLISH packet (fixed header included) into `out`.
pub fn encode_publish<const N: usize>(
    params: &PublishParams<'_>,
    out: &mut Vec<u8, N>,
) -> Result<(), ()> {
    let mut body: Vec<u8, N> = Vec::new();
    primitives::write_utf8(params.topic_name, &mut body)?;
    if params.qos != QoS::AtMostOnce {
        primitives::write_u16(params.packet_id.ok_or(())?, &mut body)?;
    }
    properties::encode(params.properties, &mut body)?;
    body.extend_from_slice(params.payload).map_err(|_| ())?;

    let mut flags = params.qos.as_u8() << 1;
    if params.dup {
        flags |= 0x08;
    }
    if params.retain {
        flags |= 0x01;
    }
    write_fixed_header(PacketType::Publish, flags, body.len() as u32, out)?;
    out.extend_from_slice(&body).map_err(|_| ())
}

/// Body shared by PUBACK, PUBREC, PUBREL and PUBCOMP: a packet
/// identifier plus an optional reason code and property list. Per the
/// wire protocol, the reason code and properties are omitted entirely
/// when the reason is `Success` and there are no properties, to save
/// bytes on the common case.
#[derive(Debug)]
pub struct PubAckLikeBody<'a> {
    /// Packet identifier this response acknowledges.
    pub packet_id: u16,
    /// Outcome reported for the packet identifier.
    pub reason_code: ReasonCode,
    /// Properties attached to the response.
    pub properties: PropertiesView<'a>,
}

/// Decode a PUBACK/PUBREC/PUBREL/PUBCOMP body.
pub fn decode_puback_like(body: &[u8]) -> Result<PubAckLikeBody<'_>, PacketError> {
    let (packet_id, n1) = primitives::read_u16(body)?;
    if body.len() == n1 {
        return Ok(PubAckLikeBody {
            packet_id,
            reason_code: ReasonCode::Success,
            properties: PropertiesView::default(),
        });
    }
    let (reason_raw, n2) = primitives::read_u8(&body[n1..])?;
    let reason_code = ReasonCode::from_u8(reason_raw).ok_or(PacketError::Malformed)?;
    let properties = if body.len() == n1 + n2 {
        PropertiesView::default()
    } else {
        properties::decode(&body[n1 + n2..])?.0
    };
    Ok(PubAckLikeBody {
        packet_id,
        reason_code,
        properties,
    })
}

/// Encode a PUBACK/PUBREC/PUBREL/PUBCOMP packet (fixed header included).
///
/// `packet_type` selects which of the four this is; PUBREL is the only
/// one of the four with fixed-header flags `0x02` (the others use `0`).
pub fn encode_puback_like<const N: usize>(
    packet_type: PacketType,
    packet_id: u16,
    reason_code: ReasonCode,
    properties: &[PropertyOut<'_>],
    out: &mut Vec<u8, N>,
) -> Result<(), ()> {
    let mut body: Vec<u8, N> = Vec::new();
    primitives::write_u16(packet_id, &mut body)?;
    if reason_code != ReasonCode::Success || !properties.is_empty() {
        primitives::write_u8(reason_code.as_u8(), &mut body)?;
        if !properties.is_empty() {
            properties::encode(properties, &mut body)?;
        }
    }
    let flags = if matches!(packet_type, PacketType::PubRel) {
        0x02
    } else {
        0x00
    };
    write_fixed_header(packet_type, flags, body.len() as u32, out)?;
    out.extend_from_slice(&body).map_err(|_| ())
}

/// A single SUBSCRIBE topic filter entry.
#[derive(Debug, Clone, Copy)]
pub struct SubscribeEntry<'a> {
    /// The topic filter.
    pub filter: &'a str,
    /// Options requested for this filter.
    pub options: SubscribeOptions,
}

/// Decoded SUBSCRIBE body.
#[derive(Debug)]
pub struct SubscribeBody<'a> {
    /// Packet identifier.
    pub packet_id: u16,
    /// SUBSCRIBE-level properties.
    pub properties: PropertiesView<'a>,
    /// Requested topic filters, in order.
    pub topics: Vec<SubscribeEntry<'a>, MAX_TOPICS_PER_REQUEST>,
}

/// Decode a SUBSCRIBE packet body.
pub fn decode_subscribe(body: &[u8]) -> Result<SubscribeBody<'_>, PacketError> {
    let (packet_id, n1) = primitives::read_u16(body)?;
    let (properties, n2) = properties::decode(&body[n1..])?;
    let mut cursor = &body[n1 + n2..];
    let mut topics = Vec::new();
    while !cursor.is_empty() {
        let (filter, nf) = primitives::read_utf8(cursor)?;
        cursor = &cursor[nf..];
        let (opts_raw, no) = primitives::read_u8(cursor)?;
        cursor = &cursor[no..];
        let options = SubscribeOptions::from_u8(opts_raw).ok_or(PacketError::Malformed)?;
        topics
            .push(SubscribeEntry { filter, options })
            .map_err(|_| PacketError::Malformed)?;
    }
    if topics.is_empty() {
        return Err(PacketError::Malformed);
    }
    Ok(SubscribeBody {
        packet_id,
        properties,
        topics,
    })
}

/// Encode a full SUBSCRIBE packet (fixed header included) into `out`.
pub fn encode_subscribe<const N: usize>(
    packet_id: u16,
    properties: &[PropertyOut<'_>],
    topics: &[SubscribeEntry<'_>],
    out: &mut Vec<u8, N>,
) -> Result<(), ()> {
    let mut body: Vec<u8, N> = Vec::new();
    primitives::write_u16(packet_id, &mut body)?;
    properties::encode(properties, &mut body)?;
    for t in topics {
        primitives::write_utf8(t.filter, &mut body)?;
        primitives::write_u8(t.options.as_u8(), &mut body)?;
    }
    write_fixed_header(PacketType::Subscribe, 0x02, body.len() as u32, out)?;
    out.extend_from_slice(&body).map_err(|_| ())
}

/// Decoded SUBACK body: one reason code per requested filter, in order.
#[derive(Debug)]
pub struct SubAckBody<'a> {
    /// Packet identifier this SUBACK acknowledges.
    pub packet_id: u16,
    /// SUBACK-level properties.
    pub properties: PropertiesView<'a>,
    /// Per-filter outcomes, in the same order as the SUBSCRIBE request.
    pub reason_codes: Vec<ReasonCode, MAX_TOPICS_PER_REQUEST>,
}

/// Decode a SUBACK packet body.
pub fn decode_suback(body: &[u8]) -> Result<SubAckBody<'_>, PacketError> {
    let (packet_id, n1) = primitives::read_u16(body)?;
    let (properties, n2) = properties::decode(&body[n1..])?;
    let cursor = &body[n1 + n2..];
    let mut reason_codes = Vec::new();
    for &b in cursor {
        let rc = ReasonCode::from_u8(b).ok_or(PacketError::Malformed)?;
        reason_codes.push(rc).map_err(|_| PacketError::Malformed)?;
    }
    if reason_codes.is_empty() {
        return Err(PacketError::Malformed);
    }
    Ok(SubAckBody {
        packet_id,
        properties,
        reason_codes,
    })
}

/// Encode a full SUBACK packet (fixed header included) into `out`.
pub fn encode_suback<const N: usize>(
    packet_id: u16,
    properties: &[PropertyOut<'_>],
    reason_codes: &[ReasonCode],
    out: &mut Vec<u8, N>,
) -> Result<(), ()> {
    let mut body: Vec<u8, N> = Vec::new();
    primitives::write_u16(packet_id, &mut body)?;
    properties::encode(properties, &mut body)?;
    for rc in reason_codes {
        primitives::write_u8(rc.as_u8(), &mut body)?;
    }
    write_fixed_header(PacketType::SubAck, 0, body.len() as u32, out)?;
    out.extend_from_slice(&body).map_err(|_| ())
}

/// Decoded UNSUBSCRIBE body.
#[derive(Debug)]
pub struct UnsubscribeBody<'a> {
    /// Packet identifier.
    pub packet_id: u16,
    /// UNSUBSCRIBE-level properties.
    pub properties: PropertiesView<'a>,
    /// Topic filters to remove, in order.
    pub filters: Vec<&'a str, MAX_TOPICS_PER_REQUEST>,
}

/// Decode an UNSUBSCRIBE packet body.
pub fn decode_unsubscribe(body: &[u8]) -> Result<UnsubscribeBody<'_>, PacketError> {
    let (packet_id, n1) = primitives::read_u16(body)?;
    let (properties, n2) = properties::decode(&body[n1..])?;
    let mut cursor = &body[n1 + n2..];
    let mut filters = Vec::new();
    while !cursor.is_empty() {
        let (filter, nf) = primitives::read_utf8(cursor)?;
        cursor = &cursor[nf..];
        filters.push(filter).map_err(|_| PacketError::Malformed)?;
    }
    if filters.is_empty() {
        return Err(PacketError::Malformed);
    }
    Ok(UnsubscribeBody {
        packet_id,
        properties,
        filters,
    })
}

/// Encode a full UNSUBSCRIBE packet (fixed header included) into `out`.
pub fn encode_unsubscribe<const N: usize>(
    packet_id: u16,
    properties: &[PropertyOut<'_>],
    filters: &[&str],
    out: &mut Vec<u8, N>,
) -> Result<(), ()> {
    let mut body: Vec<u8, N> = Vec::new();
    primitives::write_u16(packet_id, &mut body)?;
    properties::encode(properties, &mut body)?;
    for f in filters {
        primitives::write_utf8(f, &mut body)?;
    }
    write_fixed_header(PacketType::Unsubscribe, 0x02, body.len() as u32, out)?;
    out.extend_from_slice(&body).map_err(|_| ())
}

/// Decoded UNSUBACK body: one reason code per requested filter, in order.
#[derive(Debug)]
pub struct UnsubAckBody<'a> {
    /// Packet identifier this UNSUBACK acknowledges.
    pub packet_id: u16,
    /// UNSUBACK-level properties.
    pub properties: PropertiesView<'a>,
    /// Per-filter outcomes, in the same order as the UNSUBSCRIBE request.
    pub reason_codes: Vec<ReasonCode, MAX_TOPICS_PER_REQUEST>,
}

/// Decode an UNSUBACK packet body.
pub fn decode_unsuback(body: &[u8]) -> Result<UnsubAckBody<'_>, PacketError> {
    let (packet_id, n1) = primitives::read_u16(body)?;
    let (properties, n2) = properties::decode(&body[n1..])?;
    let cursor = &body[n1 + n2..];
    let mut reason_codes = Vec::new();
    for &b in cursor {
        let rc = ReasonCode::from_u8(b).ok_or(PacketError::Malformed)?;
        reason_codes.push(rc).map_err(|_| PacketError::Malformed)?;
    }
    if reason_codes.is_empty() {
        return Err(PacketError::Malformed);
    }
    Ok(UnsubAckBody {
        packet_id,
        properties,
        reason_codes,
    })
}

/// Encode a full UNSUBACK packet (fixed header included) into `out`.
pub fn encode_unsuback<const N: usize>(
    packet_id: u16,
    properties: &[PropertyOut<'_>],
    reason_codes: &[ReasonCode],
    out: &mut Vec<u8, N>,
) -> Result<(), ()> {
    let mut body: Vec<u8, N> = Vec::new();
    primitives::write_u16(packet_id, &mut body)?;
    properties::encode(properties, &mut body)?;
    for rc in reason_codes {
        primitives::write_u8(rc.as_u8(), &mut body)?;
    }
    write_fixed_header(PacketType::UnsubAck, 0, body.len() as u32, out)?;
    out.extend_from_slice(&body).map_err(|_| ())
}

/// Decoded DISCONNECT or AUTH body: both share the same
/// `{reason code, properties}` shape, with the reason code omitted
/// entirely on an empty body (meaning `Success` / `Normal Disconnection`
/// with no properties).
#[derive(Debug)]
pub struct ReasonBody<'a> {
    /// The reason code, defaulting to `Success` when omitted on the wire.
    pub reason_code: ReasonCode,
    /// Properties attached to the packet.
    pub properties: PropertiesView<'a>,
}

/// Decode a DISCONNECT or AUTH packet body.
pub fn decode_reason_body(body: &[u8]) -> Result<ReasonBody<'_>, PacketError> {
    if body.is_empty() {
        return Ok(ReasonBody {
            reason_code: ReasonCode::Success,
            properties: PropertiesView::default(),
        });
    }
    let (reason_raw, n1) = primitives::read_u8(body)?;
    let reason_code = ReasonCode::from_u8(reason_raw).ok_or(PacketError::Malformed)?;
    let properties = if body.len() == n1 {
        PropertiesView::default()
    } else {
        properties::decode(&body[n1..])?.0
    };
    Ok(ReasonBody {
        reason_code,
        properties,
    })
}

/// Encode a DISCONNECT or AUTH packet (fixed header included) into `out`.
pub fn encode_reason_body<const N: usize>(
    packet_type: PacketType,
    reason_code: ReasonCode,
    properties: &[PropertyOut<'_>],
    out: &mut Vec<u8, N>,
) -> Result<(), ()> {
    let mut body: Vec<u8, N> = Vec::new();
    if reason_code != ReasonCode::Success || !properties.is_empty() {
        primitives::write_u8(reason_code.as_u8(), &mut body)?;
        if !properties.is_empty() {
            properties::encode(properties, &mut body)?;
        }
    }
    write_fixed_header(packet_type, 0, body.len() as u32, out)?;
    out.extend_from_slice(&body).map_err(|_| ())
}

/// Encode a zero-body PINGREQ or PINGRESP packet into `out`.
pub fn encode_ping<const N: usize>(packet_type: PacketType, out: &mut Vec<u8, N>) -> Result<(), ()> {
    write_fixed_header(packet_type, 0, 0, out)
}

/// A fully decoded inbound packet, tagged by its [`PacketType`].
///
/// [`decode_body`] produces this from a fixed header plus body bytes;
/// the engine core matches on it once per `feed_bytes` iteration.
#[derive(Debug)]
pub enum Packet<'a> {
    /// A CONNACK.
    ConnAck(ConnAckBody<'a>),
    /// A PUBLISH.
    Publish(PublishBody<'a>),
    /// A PUBACK.
    PubAck(PubAckLikeBody<'a>),
    /// A PUBREC.
    PubRec(PubAckLikeBody<'a>),
    /// A PUBREL.
    PubRel(PubAckLikeBody<'a>),
    /// A PUBCOMP.
    PubComp(PubAckLikeBody<'a>),
    /// A SUBACK.
    SubAck(SubAckBody<'a>),
    /// An UNSUBACK.
    UnsubAck(UnsubAckBody<'a>),
    /// A PINGRESP (zero-length body).
    PingResp,
    /// A DISCONNECT.
    Disconnect(ReasonBody<'a>),
    /// An AUTH.
    Auth(ReasonBody<'a>),
}

/// Decode a packet body given the fixed header already read by
/// [`read_fixed_header`].
///
/// CONNECT/SUBSCRIBE/UNSUBSCRIBE are intentionally absent: a client
/// never receives them from a broker, so the engine core rejects those
/// types before ever calling this function.
pub fn decode_body<'a>(header: &FixedHeader, body: &'a [u8]) -> Result<Packet<'a>, PacketError> {
    Ok(match header.packet_type {
        PacketType::ConnAck => Packet::ConnAck(decode_connack(body)?),
        PacketType::Publish => Packet::Publish(decode_publish(header.flags, body)?),
        PacketType::PubAck => Packet::PubAck(decode_puback_like(body)?),
        PacketType::PubRec => Packet::PubRec(decode_puback_like(body)?),
        PacketType::PubRel => Packet::PubRel(decode_puback_like(body)?),
        PacketType::PubComp => Packet::PubComp(decode_puback_like(body)?),
        PacketType::SubAck => Packet::SubAck(decode_suback(body)?),
        PacketType::UnsubAck => Packet::UnsubAck(decode_unsuback(body)?),
        PacketType::PingResp => Packet::PingResp,
        PacketType::Disconnect => Packet::Disconnect(decode_reason_body(body)?),
        PacketType::Auth => Packet::Auth(decode_reason_body(body)?),
        PacketType::Connect | PacketType::Subscribe | PacketType::Unsubscribe | PacketType::PingReq => {
            return Err(PacketError::Malformed)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_header(packet_type: PacketType, flags: u8, body: &[u8]) -> heapless::Vec<u8, 512> {
        let mut out: heapless::Vec<u8, 512> = heapless::Vec::new();
        write_fixed_header(packet_type, flags, body.len() as u32, &mut out).unwrap();
        out.extend_from_slice(body).unwrap();
        out
    }

    #[test]
    fn round_trips_fixed_header() {
        let buf = encode_header(PacketType::PingReq, 0, &[]);
        let (header, consumed) = read_fixed_header(&buf).unwrap();
        assert_eq!(header.packet_type, PacketType::PingReq);
        assert_eq!(header.remaining_length, 0);
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn round_trips_connect_without_will() {
        let mut out: heapless::Vec<u8, 512> = heapless::Vec::new();
        let params = ConnectParams {
            clean_start: true,
            keep_alive: 60,
            client_id: "device-1",
            will: None,
            username: Some("user"),
            password: Some(b"secret"),
            properties: &[PropertyOut::SessionExpiryInterval(3600)],
        };
        encode_connect(&params, &mut out).unwrap();

        let (header, hn) = read_fixed_header(&out).unwrap();
        assert_eq!(header.packet_type, PacketType::Connect);
        let body = &out[hn..hn + header.remaining_length];
        let decoded = decode_connect(body).unwrap();
        assert!(decoded.clean_start);
        assert_eq!(decoded.keep_alive, 60);
        assert_eq!(decoded.client_id, "device-1");
        assert_eq!(decoded.username, Some("user"));
        assert_eq!(decoded.password.unwrap(), b"secret");
        assert_eq!(decoded.properties.session_expiry_interval, Some(3600));
        assert!(decoded.will_topic.is_none());
    }

    #[test]
    fn round_trips_connect_with_will() {
        let mut out: heapless::Vec<u8, 512> = heapless::Vec::new();
        let will = ConnectWillParams {
            qos: QoS::AtLeastOnce,
            retain: true,
            topic: "status/offline",
            payload: b"gone",
            properties: &[],
        };
        let params = ConnectParams {
            clean_start: false,
            keep_alive: 30,
            client_id: "device-2",
            will: Some(will),
            username: None,
            password: None,
            properties: &[],
        };
        encode_connect(&params, &mut out).unwrap();
        let (header, hn) = read_fixed_header(&out).unwrap();
        let body = &out[hn..hn + header.remaining_length];
        let decoded = decode_connect(body).unwrap();
        assert_eq!(decoded.will_qos, Some(QoS::AtLeastOnce));
        assert!(decoded.will_retain);
        assert_eq!(decoded.will_topic, Some("status/offline"));
        assert_eq!(decoded.will_payload.unwrap(), b"gone");
    }

    #[test]
    fn round_trips_publish_qos1() {
        let mut out: heapless::Vec<u8, 512> = heapless::Vec::new();
        let params = PublishParams {
            dup: false,
            qos: QoS::AtLeastOnce,
            retain: false,
            topic_name: "sensors/temp",
            packet_id: Some(42),
            properties: &[],
            payload: b"21.5",
        };
        encode_publish(&params, &mut out).unwrap();
        let (header, hn) = read_fixed_header(&out).unwrap();
        assert_eq!(header.packet_type, PacketType::Publish);
        let body = &out[hn..hn + header.remaining_length];
        let decoded = decode_publish(header.flags, body).unwrap();
        assert_eq!(decoded.qos, QoS::AtLeastOnce);
        assert_eq!(decoded.topic_name, "sensors/temp");
        assert_eq!(decoded.packet_id, Some(42));
        assert_eq!(decoded.payload, b"21.5");
    }

    #[test]
    fn puback_like_omits_reason_on_plain_success() {
        let mut out: heapless::Vec<u8, 64> = heapless::Vec::new();
        encode_puback_like(PacketType::PubAck, 7, ReasonCode::Success, &[], &mut out).unwrap();
        let (header, hn) = read_fixed_header(&out).unwrap();
        assert_eq!(header.remaining_length, 2);
        let body = &out[hn..hn + header.remaining_length];
        let decoded = decode_puback_like(body).unwrap();
        assert_eq!(decoded.packet_id, 7);
        assert_eq!(decoded.reason_code, ReasonCode::Success);
    }

    #[test]
    fn puback_like_includes_reason_on_failure() {
        let mut out: heapless::Vec<u8, 64> = heapless::Vec::new();
        encode_puback_like(
            PacketType::PubRec,
            9,
            ReasonCode::UnspecifiedError,
            &[],
            &mut out,
        )
        .unwrap();
        let (header, hn) = read_fixed_header(&out).unwrap();
        let body = &out[hn..hn + header.remaining_length];
        let decoded = decode_puback_like(body).unwrap();
        assert_eq!(decoded.reason_code, ReasonCode::UnspecifiedError);
    }

    #[test]
    fn round_trips_subscribe_and_suback() {
        let mut out: heapless::Vec<u8, 256> = heapless::Vec::new();
        let topics = [SubscribeEntry {
            filter: "sensors/+/temp",
            options: SubscribeOptions {
                qos: QoS::ExactlyOnce,
                no_local: true,
                retain_as_published: false,
                retain_handling: RetainHandling::DoNotSend,
            },
        }];
        encode_subscribe(5, &[], &topics, &mut out).unwrap();
        let (header, hn) = read_fixed_header(&out).unwrap();
        assert_eq!(header.packet_type, PacketType::Subscribe);
        let body = &out[hn..hn + header.remaining_length];
        let decoded = decode_subscribe(body).unwrap();
        assert_eq!(decoded.packet_id, 5);
        assert_eq!(decoded.topics[0].filter, "sensors/+/temp");
        assert_eq!(decoded.topics[0].options.qos, QoS::ExactlyOnce);
        assert!(decoded.topics[0].options.no_local);

        let mut suback_out: heapless::Vec<u8, 64> = heapless::Vec::new();
        encode_suback(5, &[], &[ReasonCode::GrantedQos2], &mut suback_out).unwrap();
        let (sheader, shn) = read_fixed_header(&suback_out).unwrap();
        let sbody = &suback_out[shn..shn + sheader.remaining_length];
        let sdecoded = decode_suback(sbody).unwrap();
        assert_eq!(sdecoded.reason_codes[0], ReasonCode::GrantedQos2);
    }

    #[test]
    fn decodes_tagged_union_dispatch() {
        let mut out: heapless::Vec<u8, 64> = heapless::Vec::new();
        encode_ping(PacketType::PingResp, &mut out).unwrap();
        let (header, hn) = read_fixed_header(&out).unwrap();
        let body = &out[hn..hn + header.remaining_length];
        let packet = decode_body(&header, body).unwrap();
        assert!(matches!(packet, Packet::PingResp));
    }

    #[test]
    fn disconnect_round_trips_reason_and_properties() {
        let mut out: heapless::Vec<u8, 64> = heapless::Vec::new();
        encode_reason_body(
            PacketType::Disconnect,
            ReasonCode::SessionTakenOver,
            &[],
            &mut out,
        )
        .unwrap();
        let (header, hn) = read_fixed_header(&out).unwrap();
        let body = &out[hn..hn + header.remaining_length];
        let decoded = decode_reason_body(body).unwrap();
        assert_eq!(decoded.reason_code, ReasonCode::SessionTakenOver);
    }
}

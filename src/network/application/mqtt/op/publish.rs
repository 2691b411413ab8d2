//! The PUBLISH / SendOp operation: outbound message delivery at QoS
//! 0, 1 or 2, with topic-alias bookkeeping, pausing against the
//! broker's send window, and resend on timeout or reconnect.

use crate::network::application::mqtt::limits::{MAX_FIELD, MAX_PAYLOAD, MAX_TOPIC, MAX_USER_PROPS};
use crate::network::application::mqtt::packet::QoS;
use crate::network::application::mqtt::timer::TimerId;
use heapless::{String, Vec};

/// How a publish should use the send-side topic alias table.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TopicAliasPreference {
    /// Use an existing alias if one is registered; otherwise send the
    /// topic as-is without registering one.
    UseAliasIfAvailable,
    /// Require an existing alias and send alias-only; `BadParam` if none
    /// is registered.
    ForceAliasOnly,
    /// Never consult the alias table; always send the full topic name.
    ForceTopicOnly,
    /// Require an existing alias and send both topic and alias; `BadParam`
    /// if none is registered.
    ForceTopicWithAlias,
}

/// Full PUBLISH configuration, owned by the caller.
#[derive(Debug, Clone)]
pub struct PublishConfig {
    /// Topic to publish to.
    pub topic: String<MAX_TOPIC>,
    /// Message payload.
    pub payload: Vec<u8, MAX_PAYLOAD>,
    /// QoS to publish at (capped by the broker's negotiated maximum).
    pub qos: QoS,
    /// Whether to publish as a retained message.
    pub retain: bool,
    /// How to use the send-side topic alias table for this publish.
    pub topic_alias_preference: TopicAliasPreference,
    /// Optional MQTT content type string.
    pub content_type: Option<String<MAX_FIELD>>,
    /// Optional response topic, for request/response patterns.
    pub response_topic: Option<String<MAX_TOPIC>>,
    /// Optional opaque correlation data.
    pub correlation_data: Option<Vec<u8, MAX_FIELD>>,
    /// Seconds after which the broker may discard this message if
    /// undelivered.
    pub message_expiry_interval: Option<u32>,
    /// `0` for unspecified bytes, `1` for UTF-8 payload.
    pub payload_format_indicator: Option<u8>,
    /// Extra user properties to attach to the PUBLISH.
    pub user_properties: Vec<(String<MAX_FIELD>, String<MAX_FIELD>), MAX_USER_PROPS>,
    /// Response timeout override; `None` uses the client's configured
    /// default.
    pub response_timeout_ms: Option<u32>,
    /// Overrides the client's configured default resend attempt limit.
    pub resend_attempts: Option<u8>,
}

impl PublishConfig {
    /// Construct the common case: QoS and topic/payload only, every
    /// other field left at its default (no retain, alias-if-available,
    /// no message properties).
    pub fn new(topic: &str, payload: &[u8], qos: QoS) -> Result<Self, ()> {
        Ok(Self {
            topic: String::try_from(topic).map_err(|_| ())?,
            payload: Vec::from_slice(payload).map_err(|_| ())?,
            qos,
            retain: false,
            topic_alias_preference: TopicAliasPreference::UseAliasIfAvailable,
            content_type: None,
            response_topic: None,
            correlation_data: None,
            message_expiry_interval: None,
            payload_format_indicator: None,
            user_properties: Vec::new(),
            response_timeout_ms: None,
            resend_attempts: None,
        })
    }
}

/// Lifecycle of a single PUBLISH operation.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PublishState {
    /// Not yet sent: waiting for a send-window slot.
    Paused,
    /// QoS1: PUBLISH sent, awaiting PUBACK.
    WaitPuback,
    /// QoS2: PUBLISH sent, awaiting PUBREC.
    WaitPubrec,
    /// QoS2: PUBREL sent, awaiting PUBCOMP.
    WaitPubcomp,
}

/// Live bookkeeping for one in-flight PUBLISH, owned by the client's
/// publish pool.
#[derive(Debug)]
pub struct PublishOp {
    /// The configuration this PUBLISH was issued with.
    pub config: PublishConfig,
    /// Current send/ack state.
    pub state: PublishState,
    /// Assigned once the operation leaves `Paused` (QoS>0 only).
    pub packet_id: Option<u16>,
    /// Whether the next (re)send should set the DUP flag.
    pub dup: bool,
    /// Number of resend attempts made so far.
    pub attempts_made: u8,
    /// The armed response timer, if any.
    pub timer: Option<TimerId>,
    /// The alias used on the most recent send, if any, so a resend can
    /// reuse it without re-consulting the table.
    pub alias_in_use: Option<u16>,
}

impl PublishOp {
    /// Construct a new operation in the `Paused` state. QoS 0 publishes
    /// are never wrapped in a `PublishOp` at all: the client completes
    /// them synchronously without allocating a pool slot.
    pub fn new(config: PublishConfig) -> Self {
        Self {
            config,
            state: PublishState::Paused,
            packet_id: None,
            dup: false,
            attempts_made: 0,
            timer: None,
            alias_in_use: None,
        }
    }
}

//! The SUBSCRIBE operation.

use crate::network::application::mqtt::limits::{MAX_FIELD, MAX_TOPIC, MAX_TOPICS_PER_REQUEST, MAX_USER_PROPS};
use crate::network::application::mqtt::packet::{QoS, RetainHandling};
use crate::network::application::mqtt::timer::TimerId;
use heapless::{String, Vec};

/// One requested topic within a SUBSCRIBE.
#[derive(Debug, Clone)]
pub struct SubscribeTopic {
    /// The topic filter to subscribe to.
    pub filter: String<MAX_TOPIC>,
    /// Highest QoS the broker may deliver messages on this subscription
    /// at.
    pub max_qos: QoS,
    /// Whether to suppress delivery of our own publishes on this filter.
    pub no_local: bool,
    /// Whether the broker should preserve the retain flag on forwarded
    /// messages.
    pub retain_as_published: bool,
    /// When the broker should send retained messages on this filter.
    pub retain_handling: RetainHandling,
}

impl SubscribeTopic {
    /// Construct an entry with the common defaults: no local echo
    /// suppression, retain-as-published off, send retained messages at
    /// subscribe time.
    pub fn new(filter: &str, max_qos: QoS) -> Result<Self, ()> {
        Ok(Self {
            filter: String::try_from(filter).map_err(|_| ())?,
            max_qos,
            no_local: false,
            retain_as_published: false,
            retain_handling: RetainHandling::SendAtSubscribe,
        })
    }
}

/// Full SUBSCRIBE configuration.
#[derive(Debug, Clone)]
pub struct SubscribeConfig {
    /// Topics to subscribe to in a single SUBSCRIBE packet.
    pub topics: Vec<SubscribeTopic, MAX_TOPICS_PER_REQUEST>,
    /// Optional subscription identifier attached to every topic in this
    /// request.
    pub subscription_identifier: Option<u32>,
    /// Extra user properties to attach to the SUBSCRIBE.
    pub user_properties: Vec<(String<MAX_FIELD>, String<MAX_FIELD>), MAX_USER_PROPS>,
    /// Response timeout override; `None` uses the client's configured
    /// default.
    pub response_timeout_ms: Option<u32>,
}

impl SubscribeConfig {
    /// Subscribe to a single filter, no subscription identifier.
    pub fn single(topic: SubscribeTopic) -> Self {
        let mut topics = Vec::new();
        let _ = topics.push(topic);
        Self {
            topics,
            subscription_identifier: None,
            user_properties: Vec::new(),
            response_timeout_ms: None,
        }
    }
}

/// Live bookkeeping for one in-flight SUBSCRIBE.
#[derive(Debug)]
pub struct SubscribeOp {
    /// The configuration this SUBSCRIBE was issued with.
    pub config: SubscribeConfig,
    /// Packet ID this SUBSCRIBE was sent with.
    pub packet_id: u16,
    /// The armed response timer, if any.
    pub timer: Option<TimerId>,
}

impl SubscribeOp {
    /// Construct a new SUBSCRIBE operation, awaiting SUBACK.
    pub fn new(config: SubscribeConfig, packet_id: u16) -> Self {
        Self {
            config,
            packet_id,
            timer: None,
        }
    }
}

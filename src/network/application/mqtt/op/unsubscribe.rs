//! The UNSUBSCRIBE operation.

use crate::network::application::mqtt::limits::{MAX_FIELD, MAX_TOPIC, MAX_TOPICS_PER_REQUEST, MAX_USER_PROPS};
use crate::network::application::mqtt::timer::TimerId;
use heapless::{String, Vec};

/// Full UNSUBSCRIBE configuration.
#[derive(Debug, Clone)]
pub struct UnsubscribeConfig {
    /// Topic filters to unsubscribe from in a single UNSUBSCRIBE packet.
    pub filters: Vec<String<MAX_TOPIC>, MAX_TOPICS_PER_REQUEST>,
    /// Extra user properties to attach to the UNSUBSCRIBE.
    pub user_properties: Vec<(String<MAX_FIELD>, String<MAX_FIELD>), MAX_USER_PROPS>,
    /// Response timeout override; `None` uses the client's configured
    /// default.
    pub response_timeout_ms: Option<u32>,
}

impl UnsubscribeConfig {
    /// Unsubscribe from a single filter.
    pub fn single(filter: &str) -> Result<Self, ()> {
        let mut filters = Vec::new();
        filters.push(String::try_from(filter).map_err(|_| ())?).map_err(|_| ())?;
        Ok(Self {
            filters,
            user_properties: Vec::new(),
            response_timeout_ms: None,
        })
    }
}

/// Live bookkeeping for one in-flight UNSUBSCRIBE.
#[derive(Debug)]
pub struct UnsubscribeOp {
    /// The configuration this UNSUBSCRIBE was issued with.
    pub config: UnsubscribeConfig,
    /// Packet ID this UNSUBSCRIBE was sent with.
    pub packet_id: u16,
    /// The armed response timer, if any.
    pub timer: Option<TimerId>,
}

impl UnsubscribeOp {
    /// Construct a new UNSUBSCRIBE operation, awaiting UNSUBACK.
    pub fn new(config: UnsubscribeConfig, packet_id: u16) -> Self {
        Self {
            config,
            packet_id,
            timer: None,
        }
    }
}

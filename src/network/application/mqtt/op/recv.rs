//! The Recv operation: tracks an inbound PUBLISH through its QoS2
//! PUBREC/PUBREL/PUBCOMP handshake and detects duplicate redelivery.

use crate::network::application::mqtt::timer::TimerId;

/// Lifecycle of a QoS2 inbound PUBLISH. QoS0 and QoS1 never need a
/// tracked `RecvOp`: QoS0 delivers and is forgotten; QoS1 delivers, the
/// client emits PUBACK, and it is also immediately forgotten.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RecvState {
    /// PUBREC sent, waiting for the broker's PUBREL.
    WaitPubrel,
}

/// Live bookkeeping for one in-flight QoS2 receive, keyed by packet ID
/// in the client's recv pool.
#[derive(Debug)]
pub struct RecvOp {
    /// Packet ID of the inbound PUBLISH being tracked.
    pub packet_id: u16,
    /// Current handshake state.
    pub state: RecvState,
    /// The armed response timer, if any.
    pub timer: Option<TimerId>,
}

impl RecvOp {
    /// Begin tracking a newly seen QoS2 inbound PUBLISH.
    pub fn new(packet_id: u16) -> Self {
        Self {
            packet_id,
            state: RecvState::WaitPubrel,
            timer: None,
        }
    }
}

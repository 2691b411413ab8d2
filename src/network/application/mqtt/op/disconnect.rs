//! The DISCONNECT operation: fire-and-forget, no acknowledgement.

use crate::network::application::mqtt::limits::MAX_FIELD;
use crate::network::application::mqtt::reason::ReasonCode;
use heapless::String;

/// Configuration for an outbound DISCONNECT.
#[derive(Debug, Clone)]
pub struct DisconnectConfig {
    /// Reason code sent to the broker.
    pub reason_code: ReasonCode,
    /// Optional human-readable reason string.
    pub reason_string: Option<String<MAX_FIELD>>,
    /// May only be non-zero if the CONNECT that established this
    /// session negotiated a non-zero session expiry interval.
    pub session_expiry_interval_ms: Option<u32>,
}

impl Default for DisconnectConfig {
    fn default() -> Self {
        Self {
            reason_code: ReasonCode::Success,
            reason_string: None,
            session_expiry_interval_ms: None,
        }
    }
}

//! The Reauth operation: mirrors CONNECT's AUTH challenge/response loop
//! on an already-connected session. Only valid if CONNECT itself
//! negotiated an authentication method.

use crate::network::application::mqtt::limits::MAX_FIELD;
use crate::network::application::mqtt::timer::TimerId;
use heapless::Vec;

/// Full REAUTH configuration: the initial outbound AUTH data.
#[derive(Debug, Clone)]
pub struct ReauthConfig {
    /// Initial outbound authentication data sent with the AUTH packet.
    pub authentication_data: Vec<u8, MAX_FIELD>,
    /// Response timeout override; `None` uses the client's configured
    /// default.
    pub response_timeout_ms: Option<u32>,
}

/// Lifecycle of a re-authentication exchange.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ReauthState {
    /// AUTH sent, awaiting the broker's reply.
    WaitAuth,
}

/// Live bookkeeping for the singleton in-flight REAUTH.
#[derive(Debug)]
pub struct ReauthOp {
    /// The configuration this REAUTH was issued with.
    pub config: ReauthConfig,
    /// Current handshake state.
    pub state: ReauthState,
    /// The armed response timer, if any.
    pub timer: Option<TimerId>,
}

impl ReauthOp {
    /// Construct a new REAUTH operation, awaiting the broker's AUTH
    /// reply.
    pub fn new(config: ReauthConfig) -> Self {
        Self {
            config,
            state: ReauthState::WaitAuth,
            timer: None,
        }
    }
}

//! MQTT v5 reason codes.
//!
//! A single numeric space is shared across CONNACK, PUBACK/PUBREC/PUBREL/
//! PUBCOMP, SUBACK/UNSUBACK, DISCONNECT and AUTH, exactly as the wire
//! protocol defines it; which subset of values is legal in which packet is
//! enforced by the caller, not by the type.

/// A single MQTT v5 reason code, shared across every packet type that
/// carries one.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum ReasonCode {
    /// `0x00`: also `Normal Disconnection` / `Granted QoS 0`.
    Success = 0,
    /// `0x01`: SUBACK, granted QoS 1 on a filter that requested more.
    GrantedQos1 = 1,
    /// `0x02`: SUBACK, granted QoS 2.
    GrantedQos2 = 2,
    /// `0x04`: DISCONNECT, the sender is disconnecting but wants its Will
    /// message published anyway.
    DisconnectWithWillMessage = 4,
    /// `0x10`: PUBACK/PUBREC, the message was accepted but no subscriber
    /// currently matches the topic.
    NoMatchingSubscribers = 16,
    /// `0x11`: UNSUBACK, the filter being removed was not subscribed.
    NoSubscriptionExisted = 17,
    /// `0x18`: AUTH, the authentication exchange is not yet complete.
    ContinueAuthentication = 24,
    /// `0x19`: AUTH, initiating a re-authentication.
    ReAuthenticate = 25,
    /// `0x80`: generic failure with no more specific code available.
    UnspecifiedError = 128,
    /// `0x81`: the packet could not be parsed according to the protocol.
    MalformedPacket = 129,
    /// `0x82`: the packet violated protocol semantics.
    ProtocolError = 130,
    /// `0x83`: the request is valid but this implementation will not
    /// process it.
    ImplementationSpecificError = 131,
    /// `0x84`: the requested MQTT protocol version is not supported.
    UnsupportedProtocolVersion = 132,
    /// `0x85`: the client identifier is valid but not allowed.
    ClientIdentifierNotValid = 133,
    /// `0x86`: the username or password is malformed or not accepted.
    BadUserNameOrPassword = 134,
    /// `0x87`: the client is not authorized to perform the operation.
    NotAuthorized = 135,
    /// `0x88`: the broker is not available right now.
    ServerUnavailable = 136,
    /// `0x89`: the broker is too busy to process the request.
    ServerBusy = 137,
    /// `0x8A`: this client has been banned.
    Banned = 138,
    /// `0x8B`: DISCONNECT, the broker is shutting down.
    ServerShuttingDown = 139,
    /// `0x8C`: the authentication method is not supported or does not
    /// match the one currently in use.
    BadAuthenticationMethod = 140,
    /// `0x8D`: the connection was closed for not communicating within
    /// the keep-alive interval.
    KeepAliveTimeout = 141,
    /// `0x8E`: another connection using the same client identifier has
    /// taken over, closing this one.
    SessionTakenOver = 142,
    /// `0x8F`: the topic filter is malformed for this server.
    TopicFilterInvalid = 143,
    /// `0x90`: the topic name is malformed for this server.
    TopicNameInvalid = 144,
    /// `0x91`: the packet identifier is already in use.
    PacketIdentifierInUse = 145,
    /// `0x92`: the packet identifier is not known to the sender.
    PacketIdentifierNotFound = 146,
    /// `0x93`: the number of unacknowledged publishes exceeded the
    /// negotiated Receive Maximum.
    ReceiveMaximumExceeded = 147,
    /// `0x94`: the topic alias is invalid or out of range.
    TopicAliasInvalid = 148,
    /// `0x95`: the packet exceeded the maximum permitted size.
    PacketTooLarge = 149,
    /// `0x96`: the sender is publishing too fast for the receiver.
    MessageRateTooHigh = 150,
    /// `0x97`: an implementation- or administratively-imposed limit was
    /// exceeded.
    QuotaExceeded = 151,
    /// `0x98`: DISCONNECT, closed due to an administrative action.
    AdministrativeAction = 152,
    /// `0x99`: the payload does not match the declared payload format
    /// indicator.
    PayloadFormatInvalid = 153,
    /// `0x9A`: the server does not support retained messages.
    RetainNotSupported = 154,
    /// `0x9B`: the requested QoS is not supported.
    QosNotSupported = 155,
    /// `0x9C`: the client should temporarily use another server.
    UseAnotherServer = 156,
    /// `0x9D`: the client should permanently use another server.
    ServerMoved = 157,
    /// `0x9E`: the server does not support shared subscriptions.
    SharedSubscriptionsNotSupported = 158,
    /// `0x9F`: this connection is closed because the connection rate
    /// limit has been exceeded.
    ConnectionRateExceeded = 159,
    /// `0xA0`: the maximum connection time authorized has been exceeded.
    MaximumConnectTime = 160,
    /// `0xA1`: the server does not support subscription identifiers.
    SubscriptionIdentifiersNotSupported = 161,
    /// `0xA2`: the server does not support wildcard subscriptions.
    WildcardSubscriptionsNotSupported = 162,
}

impl ReasonCode {
    /// Decode a raw wire byte into a known reason code.
    pub fn from_u8(v: u8) -> Option<Self> {
        use ReasonCode::*;
        Some(match v {
            0 => Success,
            1 => GrantedQos1,
            2 => GrantedQos2,
            4 => DisconnectWithWillMessage,
            16 => NoMatchingSubscribers,
            17 => NoSubscriptionExisted,
            24 => ContinueAuthentication,
            25 => ReAuthenticate,
            128 => UnspecifiedError,
            129 => MalformedPacket,
            130 => ProtocolError,
            131 => ImplementationSpecificError,
            132 => UnsupportedProtocolVersion,
            133 => ClientIdentifierNotValid,
            134 => BadUserNameOrPassword,
            135 => NotAuthorized,
            136 => ServerUnavailable,
            137 => ServerBusy,
            138 => Banned,
            139 => ServerShuttingDown,
            140 => BadAuthenticationMethod,
            141 => KeepAliveTimeout,
            142 => SessionTakenOver,
            143 => TopicFilterInvalid,
            144 => TopicNameInvalid,
            145 => PacketIdentifierInUse,
            146 => PacketIdentifierNotFound,
            147 => ReceiveMaximumExceeded,
            148 => TopicAliasInvalid,
            149 => PacketTooLarge,
            150 => MessageRateTooHigh,
            151 => QuotaExceeded,
            152 => AdministrativeAction,
            153 => PayloadFormatInvalid,
            154 => RetainNotSupported,
            155 => QosNotSupported,
            156 => UseAnotherServer,
            157 => ServerMoved,
            158 => SharedSubscriptionsNotSupported,
            159 => ConnectionRateExceeded,
            160 => MaximumConnectTime,
            161 => SubscriptionIdentifiersNotSupported,
            162 => WildcardSubscriptionsNotSupported,
            _ => return None,
        })
    }

    /// The raw wire byte for this reason code.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether this code indicates success (`< 0x80`), per the wire
    /// protocol's convention that failures start at `0x80`.
    pub fn is_success(self) -> bool {
        (self as u8) < 0x80
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_known_codes() {
        for &v in &[0u8, 1, 2, 128, 135, 141, 148, 162] {
            let code = ReasonCode::from_u8(v).expect("known reason code");
            assert_eq!(code.as_u8(), v);
        }
    }

    #[test]
    fn unknown_code_is_none() {
        assert!(ReasonCode::from_u8(200).is_none());
    }

    #[test]
    fn success_threshold_matches_protocol_convention() {
        assert!(ReasonCode::GrantedQos2.is_success());
        assert!(!ReasonCode::UnspecifiedError.is_success());
    }
}

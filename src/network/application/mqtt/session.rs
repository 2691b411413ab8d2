//! Session-scoped state: negotiated capabilities, state that survives a
//! reconnect, and state that is discarded whenever the broker reports
//! `session_present=false`.
//!
//! These are kept as three distinct types, rather than one flat struct,
//! because their reset rules differ: [`SessionState`] is fully
//! overwritten by every successful CONNACK; [`ClientPersistentState`]
//! survives across reconnects as long as the broker preserves the
//! session; [`SessionEphemeralState`] is wiped whenever it doesn't.

use crate::network::application::mqtt::limits::{MAX_FIELD, MAX_SUB_FILTERS, MAX_TOPIC};
use crate::network::application::mqtt::packet::QoS;
use crate::network::application::mqtt::packet_id::PacketIdAllocator;
use crate::network::application::mqtt::topic_alias::{RecvAliasTable, SendAliasTable};
use heapless::{String, Vec};

/// Capabilities negotiated at CONNECT time; read-only until the next
/// successful CONNECT overwrites it wholesale.
#[derive(Debug, Clone)]
pub struct SessionState {
    /// Highest QoS the broker accepts on PUBLISH.
    pub max_qos: QoS,
    /// Whether the broker accepts retained messages.
    pub retain_available: bool,
    /// Whether the broker accepts `+`/`#` wildcard subscriptions.
    pub wildcard_subscription_available: bool,
    /// Whether the broker accepts a `Subscription Identifier` property.
    pub subscription_identifier_available: bool,
    /// Whether the broker accepts `$share/<group>/` subscriptions.
    pub shared_subscription_available: bool,
    /// The broker's `Receive Maximum`: cap on our concurrent outbound
    /// QoS>0 publishes.
    pub send_maximum: u16,
    /// Our own advertised `Receive Maximum`, sent to the broker in
    /// CONNECT.
    pub recv_maximum: u16,
    /// The broker's advertised maximum packet size we may send it.
    pub max_send_packet_size: Option<u32>,
    /// Our own advertised maximum packet size, sent to the broker.
    pub max_recv_packet_size: Option<u32>,
    /// The broker's advertised `Topic Alias Maximum` (our cap on the
    /// send-side alias table).
    pub send_topic_alias_maximum: u16,
    /// Our own advertised `Topic Alias Maximum` (cap on the receive-side
    /// alias table).
    pub recv_topic_alias_maximum: u16,
    /// Negotiated keep-alive interval, in milliseconds.
    pub keep_alive_ms: u32,
    /// Negotiated session expiry interval, in milliseconds.
    pub session_expiry_interval_ms: u32,
    /// Authentication method in use, if enhanced auth was negotiated.
    pub authentication_method: Option<String<MAX_FIELD>>,
    /// Whether the broker allows reason strings / user properties to be
    /// echoed back (`Request Problem Information`).
    pub problem_information_allowed: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            max_qos: QoS::ExactlyOnce,
            retain_available: true,
            wildcard_subscription_available: true,
            subscription_identifier_available: true,
            shared_subscription_available: true,
            send_maximum: 65_535,
            recv_maximum: 65_535,
            max_send_packet_size: None,
            max_recv_packet_size: None,
            send_topic_alias_maximum: 0,
            recv_topic_alias_maximum: 0,
            keep_alive_ms: 60_000,
            session_expiry_interval_ms: 0,
            authentication_method: None,
            problem_information_allowed: true,
        }
    }
}

/// State that outlives a reconnect as long as the broker reports
/// `session_present=true`.
#[derive(Debug)]
pub struct ClientPersistentState {
    /// Topic → alias mappings for outbound publishes.
    pub send_aliases: SendAliasTable,
    /// Allocator for 16-bit packet identifiers.
    pub packet_ids: PacketIdAllocator,
    /// Count of outstanding QoS>0 publishes awaiting PUBACK/PUBCOMP.
    pub in_flight_outbound: usize,
    /// Forces `clean_start=true` on the very first CONNECT issued by
    /// this engine instance, regardless of caller configuration.
    pub first_connect: bool,
    /// Set by the transport-layer disconnect notification; cleared on
    /// the next successful CONNECT.
    pub network_disconnected: bool,
}

impl Default for ClientPersistentState {
    fn default() -> Self {
        Self {
            send_aliases: SendAliasTable::new(0),
            packet_ids: PacketIdAllocator::new(),
            in_flight_outbound: 0,
            first_connect: true,
            network_disconnected: false,
        }
    }
}

impl ClientPersistentState {
    /// Discard everything: used when the broker reports
    /// `session_present=false`, i.e. the previous session (if any) was
    /// not resumed.
    pub fn reset_for_new_session(&mut self, recv_topic_alias_maximum_remote: u16) {
        self.send_aliases = SendAliasTable::new(recv_topic_alias_maximum_remote);
        self.packet_ids.clear();
        self.in_flight_outbound = 0;
    }
}

/// State cleared whenever the broker reports `session_present=false`.
#[derive(Debug, Default)]
pub struct SessionEphemeralState {
    /// Alias → topic mappings for inbound publishes.
    pub recv_aliases: RecvAliasTable,
    /// Active subscription filters, used for inbound authorisation and
    /// alias-scope validation.
    pub subscription_filters: Vec<String<MAX_TOPIC>, MAX_SUB_FILTERS>,
}

impl SessionEphemeralState {
    /// Discard all receive-side alias mappings and subscription state.
    pub fn clear(&mut self) {
        self.recv_aliases.clear();
        self.subscription_filters.clear();
    }

    /// Record a newly accepted subscription filter.
    ///
    /// Returns `false` if the filter pool is exhausted or the filter is
    /// already present.
    pub fn add_filter(&mut self, filter: &str) -> bool {
        if self.subscription_filters.iter().any(|f| f.as_str() == filter) {
            return true;
        }
        let Ok(owned) = String::try_from(filter) else {
            return false;
        };
        self.subscription_filters.push(owned).is_ok()
    }

    /// Remove a filter after a successful UNSUBSCRIBE.
    pub fn remove_filter(&mut self, filter: &str) {
        if let Some(idx) = self
            .subscription_filters
            .iter()
            .position(|f| f.as_str() == filter)
        {
            self.subscription_filters.remove(idx);
        }
    }

    /// Whether `filter` is currently an active subscription.
    pub fn has_filter(&self, filter: &str) -> bool {
        self.subscription_filters.iter().any(|f| f.as_str() == filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_session_state_matches_protocol_defaults() {
        let state = SessionState::default();
        assert_eq!(state.max_qos, QoS::ExactlyOnce);
        assert_eq!(state.send_maximum, 65_535);
    }

    #[test]
    fn first_connect_flag_starts_true() {
        let persistent = ClientPersistentState::default();
        assert!(persistent.first_connect);
    }

    #[test]
    fn ephemeral_state_tracks_filters() {
        let mut ephemeral = SessionEphemeralState::default();
        assert!(ephemeral.add_filter("sensors/+"));
        assert!(ephemeral.has_filter("sensors/+"));
        ephemeral.remove_filter("sensors/+");
        assert!(!ephemeral.has_filter("sensors/+"));
    }

    #[test]
    fn clear_wipes_aliases_and_filters() {
        let mut ephemeral = SessionEphemeralState::default();
        ephemeral.add_filter("a/#");
        ephemeral.recv_aliases.register(1, "a/b");
        ephemeral.clear();
        assert!(!ephemeral.has_filter("a/#"));
        assert_eq!(ephemeral.recv_aliases.resolve(1), None);
    }
}

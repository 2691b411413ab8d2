//! Topic alias tables, send-side and receive-side.
//!
//! The send-side table tracks which topic strings the broker has already
//! been told map to which alias, so repeat publishes can send the alias
//! alone once the full `(topic, alias)` registration has been
//! acknowledged enough times to be considered durable (see
//! [`SendAliasTable::confirm_registration`]). The receive-side table is a
//! flat array indexed directly by alias, since the broker assigns aliases
//! in `1..=topic_alias_maximum` and the client just needs O(1) lookup.

use crate::network::application::mqtt::limits::{MAX_RECV_ALIASES, MAX_SEND_ALIASES, MAX_TOPIC};
use heapless::{String, Vec};

/// One entry in the send-side alias table.
#[derive(Debug, Clone)]
struct SendEntry {
    topic: String<MAX_TOPIC>,
    alias: u16,
    /// Number of additional low-QoS (QoS 0) publishes using this alias
    /// that must complete before the registration is considered
    /// confirmed durable on the broker. QoS 1/2 publishes confirm
    /// immediately on PUBACK/PUBCOMP, which the caller signals directly
    /// via [`SendAliasTable::confirm_registration`].
    pending_low_qos_confirmations: u8,
}

/// Send-side topic-to-alias table, sorted by alias for a free-list LIFO
/// reuse order (the most recently freed alias is reissued first, which
/// keeps the active set small and broker-side memory pressure low).
#[derive(Debug, Default)]
pub struct SendAliasTable {
    entries: Vec<SendEntry, MAX_SEND_ALIASES>,
    free_aliases: Vec<u16, MAX_SEND_ALIASES>,
    max_alias: u16,
}

impl SendAliasTable {
    /// Create an empty table. `max_alias` is the broker's advertised
    /// `Topic Alias Maximum` (0 disables sending aliases entirely).
    pub fn new(max_alias: u16) -> Self {
        let mut free_aliases = Vec::new();
        for a in (1..=max_alias).rev() {
            if free_aliases.push(a).is_err() {
                break;
            }
        }
        Self {
            entries: Vec::new(),
            free_aliases,
            max_alias,
        }
    }

    /// The broker's advertised alias maximum (0 if aliasing is disabled).
    pub fn max_alias(&self) -> u16 {
        self.max_alias
    }

    /// Look up an existing, already-registered alias for `topic`.
    pub fn find(&self, topic: &str) -> Option<u16> {
        self.entries
            .iter()
            .find(|e| e.topic.as_str() == topic)
            .map(|e| e.alias)
    }

    /// Register a new alias for `topic`, taking one from the free list.
    ///
    /// `low_qos_confirmations_required` is how many QoS 0 round-trips
    /// must elapse (via [`Self::confirm_registration`]) before the
    /// mapping is considered durable; pass 0 if the first publish is
    /// QoS 1/2, since a PUBACK/PUBCOMP confirms immediately.
    pub fn register(
        &mut self,
        topic: &str,
        low_qos_confirmations_required: u8,
    ) -> Option<u16> {
        if self.entries.is_full() {
            return None;
        }
        let alias = self.free_aliases.pop()?;
        let topic = String::try_from(topic).ok()?;
        self.entries
            .push(SendEntry {
                topic,
                alias,
                pending_low_qos_confirmations: low_qos_confirmations_required,
            })
            .ok()?;
        Some(alias)
    }

    /// Record that one more publish using an already-registered alias
    /// has round-tripped successfully, decrementing its pending-count.
    /// A mapping with a zero count is considered confirmed and safe for
    /// the caller to rely on indefinitely.
    pub fn confirm_registration(&mut self, alias: u16) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.alias == alias) {
            entry.pending_low_qos_confirmations =
                entry.pending_low_qos_confirmations.saturating_sub(1);
        }
    }

    /// Whether `alias`'s mapping is still awaiting confirmation.
    pub fn is_pending(&self, alias: u16) -> bool {
        self.entries
            .iter()
            .any(|e| e.alias == alias && e.pending_low_qos_confirmations > 0)
    }

    /// Release `topic`'s alias back to the free list, for example after
    /// the broker rejects a publish with `Topic Alias Invalid`.
    pub fn release(&mut self, topic: &str) {
        if let Some(idx) = self.entries.iter().position(|e| e.topic.as_str() == topic) {
            let entry = self.entries.remove(idx);
            let _ = self.free_aliases.push(entry.alias);
        }
    }

    /// Drop every registration, for session reset.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.free_aliases.clear();
        for a in (1..=self.max_alias).rev() {
            if self.free_aliases.push(a).is_err() {
                break;
            }
        }
    }
}

/// Receive-side alias table: a flat array indexed by alias, populated
/// whenever an incoming PUBLISH carries both a topic name and an alias,
/// and consulted whenever one carries only an alias.
#[derive(Debug)]
pub struct RecvAliasTable {
    slots: Vec<Option<String<MAX_TOPIC>>, MAX_RECV_ALIASES>,
}

impl Default for RecvAliasTable {
    fn default() -> Self {
        let mut slots = Vec::new();
        for _ in 0..MAX_RECV_ALIASES {
            let _ = slots.push(None);
        }
        Self { slots }
    }
}

impl RecvAliasTable {
    /// Create an empty receive-side table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The maximum alias this client will ever advertise accepting, i.e.
    /// the capacity of this table.
    pub fn max_alias(&self) -> u16 {
        self.slots.len() as u16
    }

    /// Record that `alias` now maps to `topic`, as sent by the broker
    /// alongside a full topic name.
    ///
    /// Returns `false` if `alias` is out of range (0 or beyond the
    /// advertised maximum).
    pub fn register(&mut self, alias: u16, topic: &str) -> bool {
        if alias == 0 {
            return false;
        }
        let idx = (alias - 1) as usize;
        let Some(slot) = self.slots.get_mut(idx) else {
            return false;
        };
        let Ok(owned) = String::try_from(topic) else {
            return false;
        };
        *slot = Some(owned);
        true
    }

    /// Resolve `alias` to its most recently registered topic name.
    pub fn resolve(&self, alias: u16) -> Option<&str> {
        if alias == 0 {
            return None;
        }
        self.slots
            .get((alias - 1) as usize)
            .and_then(|s| s.as_deref())
    }

    /// Drop every registration, for session reset.
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_and_finds_send_alias() {
        let mut table = SendAliasTable::new(4);
        let alias = table.register("sensors/temp", 0).unwrap();
        assert_eq!(table.find("sensors/temp"), Some(alias));
        assert!(!table.is_pending(alias));
    }

    #[test]
    fn pending_confirmation_counts_down() {
        let mut table = SendAliasTable::new(4);
        let alias = table.register("sensors/temp", 2).unwrap();
        assert!(table.is_pending(alias));
        table.confirm_registration(alias);
        assert!(table.is_pending(alias));
        table.confirm_registration(alias);
        assert!(!table.is_pending(alias));
    }

    #[test]
    fn release_returns_alias_to_free_list_lifo() {
        let mut table = SendAliasTable::new(2);
        let a = table.register("topic/a", 0).unwrap();
        let _b = table.register("topic/b", 0).unwrap();
        table.release("topic/a");
        let reissued = table.register("topic/c", 0).unwrap();
        assert_eq!(reissued, a);
    }

    #[test]
    fn zero_max_alias_disables_registration() {
        let mut table = SendAliasTable::new(0);
        assert!(table.register("topic/a", 0).is_none());
    }

    #[test]
    fn recv_table_round_trips_alias_to_topic() {
        let mut table = RecvAliasTable::new();
        assert!(table.register(3, "status/online"));
        assert_eq!(table.resolve(3), Some("status/online"));
        assert_eq!(table.resolve(4), None);
    }

    #[test]
    fn recv_table_rejects_alias_zero() {
        let mut table = RecvAliasTable::new();
        assert!(!table.register(0, "x"));
    }
}

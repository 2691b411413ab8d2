//! Logical timer manager over a single external tick source.
//!
//! The engine never reads a wall clock. The host calls [`TimerManager::tick`]
//! with elapsed milliseconds; timers that cross zero are cancelled *before*
//! firing is reported, so a caller inspecting [`TimerManager::take_expired`]
//! may safely re-arm the same purpose from the same slot. [`TimerManager::min_remaining`]
//! tells the host how soon to call `tick` again.

use crate::network::application::mqtt::limits::MAX_TIMERS;
use heapless::Vec;

/// What a timer, once fired, means to the engine.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TimerPurpose {
    /// An operation's response-timeout deadline.
    OpResponse,
    /// Keep-alive: no message sent in `keep_alive_ms`.
    KeepAlivePing,
    /// Keep-alive: no message received in `keep_alive_ms`.
    KeepAliveRecv,
    /// Keep-alive: no response to an outstanding PINGREQ.
    KeepAliveResponse,
    /// Session-expiry countdown, suspended while disconnected.
    SessionExpiry,
}

/// Opaque handle to a timer slot. Stable across `tick` calls; invalidated
/// once the timer is cancelled.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct TimerId(usize);

#[derive(Debug, Clone, Copy)]
struct Slot {
    purpose: TimerPurpose,
    remaining_ms: u32,
    suspended: bool,
}

/// A bounded pool of logical timers driven by an external tick source.
#[derive(Debug)]
pub struct TimerManager {
    slots: Vec<Option<Slot>, MAX_TIMERS>,
    expired: Vec<(TimerId, TimerPurpose), MAX_TIMERS>,
}

impl Default for TimerManager {
    fn default() -> Self {
        let mut slots = Vec::new();
        for _ in 0..MAX_TIMERS {
            let _ = slots.push(None);
        }
        Self {
            slots,
            expired: Vec::new(),
        }
    }
}

impl TimerManager {
    /// Create an empty timer manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a new timer for `purpose`, firing after `ms` milliseconds.
    ///
    /// Returns `None` if the pool is exhausted.
    pub fn arm(&mut self, purpose: TimerPurpose, ms: u32) -> Option<TimerId> {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(Slot {
                    purpose,
                    remaining_ms: ms,
                    suspended: false,
                });
                return Some(TimerId(i));
            }
        }
        None
    }

    /// Re-arm an existing timer, replacing its purpose and deadline.
    pub fn rearm(&mut self, id: TimerId, purpose: TimerPurpose, ms: u32) {
        if let Some(slot) = self.slots.get_mut(id.0).and_then(Option::as_mut) {
            slot.purpose = purpose;
            slot.remaining_ms = ms;
            slot.suspended = false;
        }
    }

    /// Cancel a timer, returning its remaining milliseconds if it was
    /// still live.
    pub fn cancel(&mut self, id: TimerId) -> Option<u32> {
        self.slots
            .get_mut(id.0)
            .and_then(Option::take)
            .map(|s| s.remaining_ms)
    }

    /// Suspend a timer: it keeps its remaining time but does not count
    /// down until [`Self::resume`] is called. Used for session-expiry
    /// timers while the network is disconnected.
    pub fn suspend(&mut self, id: TimerId) {
        if let Some(slot) = self.slots.get_mut(id.0).and_then(Option::as_mut) {
            slot.suspended = true;
        }
    }

    /// Resume a previously suspended timer.
    pub fn resume(&mut self, id: TimerId) {
        if let Some(slot) = self.slots.get_mut(id.0).and_then(Option::as_mut) {
            slot.suspended = false;
        }
    }

    /// Advance every live, non-suspended timer by `ms` milliseconds.
    ///
    /// Any timer that reaches zero is cancelled (its slot freed) before
    /// being recorded as expired, so a caller draining
    /// [`Self::take_expired`] may re-arm the same purpose immediately.
    pub fn tick(&mut self, ms: u32) {
        for i in 0..self.slots.len() {
            let should_fire = if let Some(slot) = self.slots[i].as_mut() {
                if slot.suspended {
                    false
                } else if ms >= slot.remaining_ms {
                    true
                } else {
                    slot.remaining_ms -= ms;
                    false
                }
            } else {
                false
            };
            if should_fire {
                if let Some(slot) = self.slots[i].take() {
                    // Best-effort: a saturated `expired` buffer silently
                    // drops the firing. This can only happen if more
                    // than `MAX_TIMERS` timers fire in a single `tick`
                    // call, which cannot happen since the pool itself is
                    // bounded by `MAX_TIMERS`.
                    let _ = self.expired.push((TimerId(i), slot.purpose));
                }
            }
        }
    }

    /// Drain and return every timer that expired during the most recent
    /// [`Self::tick`] call.
    pub fn take_expired(&mut self) -> Vec<(TimerId, TimerPurpose), MAX_TIMERS> {
        core::mem::take(&mut self.expired)
    }

    /// The smallest remaining deadline among live, non-suspended timers,
    /// used to program the next external tick via `schedule_tick`.
    pub fn min_remaining(&self) -> Option<u32> {
        self.slots
            .iter()
            .flatten()
            .filter(|s| !s.suspended)
            .map(|s| s.remaining_ms)
            .min()
    }

    /// Whether any timer is currently live (suspended or not).
    pub fn has_live_timers(&self) -> bool {
        self.slots.iter().any(Option::is_some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_exactly_at_deadline() {
        let mut mgr = TimerManager::new();
        let id = mgr.arm(TimerPurpose::OpResponse, 100).unwrap();
        mgr.tick(99);
        assert!(mgr.take_expired().is_empty());
        mgr.tick(1);
        let expired = mgr.take_expired();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].0, id);
        assert_eq!(expired[0].1, TimerPurpose::OpResponse);
    }

    #[test]
    fn cancel_releases_slot_and_reports_remaining() {
        let mut mgr = TimerManager::new();
        let id = mgr.arm(TimerPurpose::KeepAlivePing, 1000).unwrap();
        mgr.tick(400);
        let remaining = mgr.cancel(id).unwrap();
        assert_eq!(remaining, 600);
        mgr.tick(10_000);
        assert!(mgr.take_expired().is_empty());
    }

    #[test]
    fn suspended_timer_does_not_count_down() {
        let mut mgr = TimerManager::new();
        let id = mgr.arm(TimerPurpose::SessionExpiry, 500).unwrap();
        mgr.suspend(id);
        mgr.tick(10_000);
        assert!(mgr.take_expired().is_empty());
        mgr.resume(id);
        mgr.tick(500);
        assert_eq!(mgr.take_expired().len(), 1);
    }

    #[test]
    fn min_remaining_ignores_suspended_timers() {
        let mut mgr = TimerManager::new();
        let a = mgr.arm(TimerPurpose::OpResponse, 50).unwrap();
        mgr.arm(TimerPurpose::KeepAlivePing, 10).unwrap();
        mgr.suspend(a);
        // Only the non-suspended 10ms timer should count.
        let id_b_remaining = mgr.min_remaining().unwrap();
        assert_eq!(id_b_remaining, 10);
        mgr.tick(10);
        assert_eq!(mgr.take_expired().len(), 1);
    }
}

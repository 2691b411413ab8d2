//! Caller-settable engine configuration, independent of any single
//! operation or connection attempt.

/// Publish ordering policy across concurrently queued publishes.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PublishOrdering {
    /// Preserve order only within a single QoS level; a QoS 0 publish
    /// may overtake a paused QoS>0 publish.
    SameQos,
    /// Strict queue order across every QoS level: nothing may be sent
    /// past an earlier publish that is still paused.
    Full,
}

/// Independently toggled verification steps. All default to enabled;
/// hosts that trust their own topic construction or a broker that never
/// sends unauthorised messages may disable the corresponding check to
/// save cycles.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct VerificationFlags {
    /// Validate topic names passed to `publish` before encoding them.
    pub outgoing_topic_format: bool,
    /// Validate topic names carried by inbound PUBLISH packets.
    pub incoming_topic_format: bool,
    /// Check every inbound PUBLISH's resolved topic against the active
    /// subscription filter set before delivering it.
    pub incoming_subscription_membership: bool,
}

impl Default for VerificationFlags {
    fn default() -> Self {
        Self {
            outgoing_topic_format: true,
            incoming_topic_format: true,
            incoming_subscription_membership: true,
        }
    }
}

/// Engine-wide configuration, set once before use and readable (but not
/// mutated) by operations while in flight.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Default response timeout, in milliseconds, applied to a new
    /// operation unless it overrides it explicitly.
    pub default_response_timeout_ms: u32,
    /// Default number of resend attempts for a QoS>0 publish before it
    /// gives up and completes with `Timeout`.
    pub default_publish_resend_attempts: u8,
    /// Ordering policy applied to concurrently queued publishes.
    pub publish_ordering: PublishOrdering,
    /// Independently toggled verification steps.
    pub verification: VerificationFlags,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_response_timeout_ms: 10_000,
            default_publish_resend_attempts: 2,
            publish_ordering: PublishOrdering::SameQos,
            verification: VerificationFlags::default(),
        }
    }
}

impl ClientConfig {
    /// Start from defaults, overriding the response timeout.
    pub fn with_response_timeout_ms(mut self, ms: u32) -> Self {
        self.default_response_timeout_ms = ms;
        self
    }

    /// Start from defaults, overriding the publish resend attempt limit.
    pub fn with_publish_resend_attempts(mut self, attempts: u8) -> Self {
        self.default_publish_resend_attempts = attempts;
        self
    }

    /// Start from defaults, overriding the publish ordering policy.
    pub fn with_publish_ordering(mut self, ordering: PublishOrdering) -> Self {
        self.publish_ordering = ordering;
        self
    }

    /// Start from defaults, overriding the verification toggles.
    pub fn with_verification(mut self, verification: VerificationFlags) -> Self {
        self.verification = verification;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_every_verification() {
        let config = ClientConfig::default();
        assert!(config.verification.outgoing_topic_format);
        assert!(config.verification.incoming_topic_format);
        assert!(config.verification.incoming_subscription_membership);
        assert_eq!(config.publish_ordering, PublishOrdering::SameQos);
    }

    #[test]
    fn builder_methods_override_defaults() {
        let config = ClientConfig::default()
            .with_response_timeout_ms(5_000)
            .with_publish_resend_attempts(5)
            .with_publish_ordering(PublishOrdering::Full);
        assert_eq!(config.default_response_timeout_ms, 5_000);
        assert_eq!(config.default_publish_resend_attempts, 5);
        assert_eq!(config.publish_ordering, PublishOrdering::Full);
    }
}

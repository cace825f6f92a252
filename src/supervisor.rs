use std::time::Duration;

/// Lifecycle of the push-stream connection.
///
/// `Error` is reached on any transport failure; it is terminal only once the
/// reconnect ceiling is hit, after which an explicit reset is required.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionPhase {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
    Reconnecting,
}

impl ConnectionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
            Self::Reconnecting => "reconnecting",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Reconnection tunables. These are the only externally configurable
/// constants of the supervision loop.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Ceiling for the exponential backoff.
    pub max_delay: Duration,
    /// Retry budget before the connection parks in the error phase.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// Backoff delay for a 1-based attempt number:
    /// `min(base × 2^(attempt-1), max)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(30);
        self.base_delay
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_delay)
    }
}

/// Attempt accounting for the reconnect loop.
///
/// The counter grows each time a retry is scheduled and resets only on a
/// confirmed connected transition, never on a mere re-open attempt.
#[derive(Debug)]
pub struct ReconnectSupervisor {
    policy: ReconnectPolicy,
    attempts: u32,
}

impl ReconnectSupervisor {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    /// Claim the next retry slot. `None` means the ceiling is reached and no
    /// further automatic attempts may be made.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.policy.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(self.policy.delay_for(self.attempts))
    }

    pub fn confirm_connected(&mut self) {
        self.attempts = 0;
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{ReconnectPolicy, ReconnectSupervisor};

    #[test]
    fn delay_doubles_from_base_and_caps() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(4000));
        assert_eq!(policy.delay_for(6), Duration::from_millis(30_000));
        assert_eq!(policy.delay_for(10), Duration::from_millis(30_000));
    }

    #[test]
    fn large_attempt_numbers_do_not_overflow() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_millis(30_000));
    }

    #[test]
    fn supervisor_counts_to_ceiling_then_refuses() {
        let mut supervisor = ReconnectSupervisor::new(ReconnectPolicy {
            max_attempts: 3,
            ..ReconnectPolicy::default()
        });

        assert!(supervisor.next_delay().is_some());
        assert!(supervisor.next_delay().is_some());
        assert!(supervisor.next_delay().is_some());
        assert_eq!(supervisor.attempts(), 3);
        assert!(supervisor.next_delay().is_none());
        assert!(supervisor.next_delay().is_none());
    }

    #[test]
    fn confirmed_connection_resets_the_counter() {
        let mut supervisor = ReconnectSupervisor::new(ReconnectPolicy::default());
        supervisor.next_delay();
        supervisor.next_delay();
        assert_eq!(supervisor.attempts(), 2);

        supervisor.confirm_connected();
        assert_eq!(supervisor.attempts(), 0);
        assert_eq!(
            supervisor.next_delay(),
            Some(Duration::from_millis(1000))
        );
    }
}

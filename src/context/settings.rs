use std::time::Duration;

/// Intervals of the background loops of a [`FirebaseContext`](super::FirebaseContext).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextSettings {
    /// Delay between forced ID-token refreshes while a user is signed in.
    pub token_refresh_interval: Duration,
    /// Delay before retrying a failed token refresh.
    pub token_retry_delay: Duration,
    /// Minimum fetch interval of Remote Config, also the delay between fetches.
    pub remote_config_refresh_interval: Duration,
    /// Delay before retrying a failed installation id lookup. Zero only yields.
    pub installation_retry_delay: Duration,
}

impl ContextSettings {
    pub fn debug() -> Self {
        Self {
            token_refresh_interval: Duration::from_secs(5 * 60),
            token_retry_delay: Duration::from_secs(1),
            remote_config_refresh_interval: Duration::from_secs(60),
            installation_retry_delay: Duration::ZERO,
        }
    }

    pub fn production() -> Self {
        Self {
            token_refresh_interval: Duration::from_secs(30 * 60),
            token_retry_delay: Duration::from_secs(1),
            remote_config_refresh_interval: Duration::from_secs(55 * 60),
            installation_retry_delay: Duration::from_secs(1),
        }
    }

    pub fn with_remote_config_refresh_interval(mut self, interval: Duration) -> Self {
        self.remote_config_refresh_interval = interval;
        self
    }

    pub fn with_installation_retry_delay(mut self, delay: Duration) -> Self {
        self.installation_retry_delay = delay;
        self
    }
}

impl Default for ContextSettings {
    /// [`ContextSettings::debug`] in debug builds, [`ContextSettings::production`] otherwise.
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::debug()
        } else {
            Self::production()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_waits_between_installation_attempts() {
        assert!(ContextSettings::debug().installation_retry_delay.is_zero());
        assert_eq!(
            ContextSettings::production().installation_retry_delay,
            Duration::from_secs(1)
        );
    }
}

use std::time::Duration;

use crate::{key_filter::KeyPolicy, watchdog::WatchdogSettings};

/// Configuration for a lockout event loop.
///
/// Settings are not persisted; build one at startup. The defaults are a two-second
/// pointer grace window, a five-minute session budget, and blocking of escape keys only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub watchdog: WatchdogSettings,
    /// Delay between deactivation and [`Notification::HideOverlay`](crate::lockout::Notification::HideOverlay),
    /// leaving room for the overlay's hide animation.
    pub hide_delay: Duration,
    pub key_policy: KeyPolicy,
}

impl Config {
    pub fn set_grace_window(mut self, grace_window: Duration) -> Self {
        self.watchdog.grace_window = grace_window;
        self
    }

    /// Sets the maximum session length, rounded down to whole seconds.
    pub fn set_session_budget(mut self, budget: Duration) -> Self {
        self.watchdog.session_budget_seconds = budget.as_secs().try_into().unwrap_or(u32::MAX);
        self
    }

    pub fn set_arm_delay(mut self, arm_delay: Duration) -> Self {
        self.watchdog.arm_delay = arm_delay;
        self
    }

    /// Sets how long the pointer has to keep moving to end the session. `None` disables it.
    pub fn set_exit_gesture(mut self, exit_gesture: Option<Duration>) -> Self {
        self.watchdog.exit_gesture = exit_gesture;
        self
    }

    /// Sets the longest pause between movements that keeps an exit gesture going.
    pub fn set_streak_timeout(mut self, streak_timeout: Duration) -> Self {
        self.watchdog.streak_timeout = streak_timeout;
        self
    }

    pub fn set_hide_delay(mut self, hide_delay: Duration) -> Self {
        self.hide_delay = hide_delay;
        self
    }

    pub fn set_key_policy(mut self, key_policy: KeyPolicy) -> Self {
        self.key_policy = key_policy;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            watchdog: WatchdogSettings::default(),
            hide_delay: Duration::from_millis(100),
            key_policy: KeyPolicy::default(),
        }
    }
}

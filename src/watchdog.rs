//! Pointer-activity and session-length timeouts for an active lockout session.
//!
//! Two independent policies are composed here:
//!
//! - a short **grace window**, re-armed on every pointer movement, after which the pointer
//!   is reported as [`WatchdogEvent::Inactive`]. The overlay uses this to fade its movement
//!   indicator; it never ends the session by itself.
//! - a fixed **session budget**, counted down by [`InactivityWatchdog::tick`] once per
//!   second regardless of pointer activity. When it runs out the session is deactivated.
//!
//! Separately, moving the pointer for the exit-gesture duration ends the session early, so
//! the user can leave cleaning mode without a key. Any gap between movements longer than
//! the streak timeout starts the gesture over.

use std::time::{Duration, Instant};

/// Something the owner of the watchdog needs to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogEvent {
    /// The pointer started moving after a pause.
    PointerActive,
    /// The grace window elapsed without movement.
    Inactive,
    /// The pointer kept moving for the whole exit-gesture duration.
    ExitGesture,
    /// The session budget reached zero.
    BudgetExpired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogSettings {
    pub grace_window: Duration,
    pub session_budget_seconds: u32,
    /// Movement is ignored for this long after [`InactivityWatchdog::reset`].
    pub arm_delay: Duration,
    /// `None` disables the exit gesture.
    pub exit_gesture: Option<Duration>,
    /// Longest pause between movements that still counts toward the exit gesture.
    pub streak_timeout: Duration,
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        Self {
            grace_window: Duration::from_secs(2),
            session_budget_seconds: 300,
            arm_delay: Duration::from_secs(1),
            exit_gesture: Some(Duration::from_secs(2)),
            streak_timeout: Duration::from_millis(500),
        }
    }
}

#[derive(Debug)]
pub struct InactivityWatchdog {
    settings: WatchdogSettings,
    armed_at: Instant,
    last_activity_at: Option<Instant>,
    grace_deadline: Option<Instant>,
    streak_started_at: Option<Instant>,
    remaining_seconds: u32,
    budget_expired: bool,
}

impl InactivityWatchdog {
    pub fn new(settings: WatchdogSettings, now: Instant) -> Self {
        Self {
            settings,
            armed_at: now + settings.arm_delay,
            last_activity_at: None,
            grace_deadline: None,
            streak_started_at: None,
            remaining_seconds: settings.session_budget_seconds,
            budget_expired: false,
        }
    }

    /// Reinitializes both timers. Called when a session starts or ends.
    pub fn reset(&mut self, now: Instant) {
        *self = Self::new(self.settings, now);
    }

    /// Records pointer movement at `now`.
    pub fn on_activity(&mut self, now: Instant) -> Option<WatchdogEvent> {
        if now < self.armed_at {
            return None;
        }

        let streak_timeout = self.settings.streak_timeout;
        if self
            .last_activity_at
            .is_some_and(|last| now.saturating_duration_since(last) > streak_timeout)
        {
            self.streak_started_at = None;
        }

        self.last_activity_at = Some(now);
        self.grace_deadline = Some(now + self.settings.grace_window);

        let Some(started) = self.streak_started_at else {
            self.streak_started_at = Some(now);
            return Some(WatchdogEvent::PointerActive);
        };

        match self.settings.exit_gesture {
            Some(gesture) if now.duration_since(started) >= gesture => {
                self.streak_started_at = None;
                self.grace_deadline = None;
                Some(WatchdogEvent::ExitGesture)
            }
            _ => None,
        }
    }

    /// Fires the grace timer if its deadline has passed.
    pub fn poll(&mut self, now: Instant) -> Option<WatchdogEvent> {
        match self.grace_deadline {
            Some(deadline) if now >= deadline => {
                self.grace_deadline = None;
                self.streak_started_at = None;
                Some(WatchdogEvent::Inactive)
            }
            _ => None,
        }
    }

    /// Counts one second off the session budget.
    pub fn tick(&mut self) -> Option<WatchdogEvent> {
        if self.budget_expired {
            return None;
        }

        self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        if self.remaining_seconds == 0 {
            self.budget_expired = true;
            return Some(WatchdogEvent::BudgetExpired);
        }
        None
    }

    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    pub fn grace_deadline(&self) -> Option<Instant> {
        self.grace_deadline
    }

    pub fn last_activity_at(&self) -> Option<Instant> {
        self.last_activity_at
    }

    pub fn settings(&self) -> &WatchdogSettings {
        &self.settings
    }
}

/// Formats a countdown as `m:ss`, or `h:mm:ss` from one hour up.
pub fn format_countdown(seconds: u32) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

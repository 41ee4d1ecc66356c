//! The lockout state machine.
//!
//! [`LockoutStateMachine`] owns the single lockout session of the process. It is the only
//! writer of the session: every transition runs on the thread that owns the machine, so no
//! locking is needed. It decides when the keyboard hook and the taskbar pin are acquired
//! and released, but never touches OS handles itself; those stay behind
//! [`InputInterceptor`] and [`TaskbarBackend`].
//!
//! Resource failures never block a transition. A hook that cannot be installed leaves the
//! session active with reduced protection, and a failed release still returns the machine
//! to [`LockoutState::Idle`]; both are reported through [`Notification::Degraded`].

use std::{
    sync::mpsc::{self, Receiver, Sender},
    time::Instant,
};

use crate::{
    error::HookUninstallError,
    keyboard_hook::{HookHandle, HookStats, InputInterceptor},
    taskbar::{TaskbarBackend, TaskbarController},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockoutState {
    Idle,
    Active,
}

/// Conditions under which protection is only partially available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Degraded {
    /// The keyboard hook could not be installed; keys are not blocked this session.
    InputSuppressionUnavailable,
    /// Removing the keyboard hook failed unexpectedly. Restarting the app releases it.
    HookMayBeLeaked,
}

/// Messages produced for the UI layer.
///
/// Duplicate `StateChanged` messages of the same state may be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    StateChanged(LockoutState),
    Degraded(Degraded),
    /// Seconds left in the session budget.
    Countdown(u32),
    PointerActive,
    Inactive,
    /// The overlay may now be hidden.
    HideOverlay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeactivationReason {
    User,
    BudgetExpired,
    ExitGesture,
    Shutdown,
}

/// Resources held by an active session.
#[derive(Debug)]
pub struct ActiveSession {
    /// `None` only when hook installation failed for this session.
    pub hook: Option<HookHandle>,
    /// Whether the taskbar was switched from auto-hide and is restored on deactivation.
    pub taskbar_was_auto_hide: bool,
    pub started_at: Instant,
}

#[derive(Debug, Default)]
pub enum LockoutSession {
    #[default]
    Idle,
    Active(ActiveSession),
}

impl LockoutSession {
    pub fn state(&self) -> LockoutState {
        match self {
            LockoutSession::Idle => LockoutState::Idle,
            LockoutSession::Active(_) => LockoutState::Active,
        }
    }

    pub fn active(&self) -> Option<&ActiveSession> {
        match self {
            LockoutSession::Idle => None,
            LockoutSession::Active(session) => Some(session),
        }
    }
}

pub struct LockoutStateMachine<T: TaskbarBackend, I: InputInterceptor> {
    taskbar: TaskbarController<T>,
    interceptor: I,
    session: LockoutSession,
    subscribers: Vec<Sender<Notification>>,
}

impl<T: TaskbarBackend, I: InputInterceptor> LockoutStateMachine<T, I> {
    pub fn new(taskbar: T, interceptor: I) -> Self {
        Self {
            taskbar: TaskbarController::new(taskbar),
            interceptor,
            session: LockoutSession::Idle,
            subscribers: Vec::new(),
        }
    }

    /// Registers a new receiver of notifications.
    pub fn subscribe(&mut self) -> Receiver<Notification> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn state(&self) -> LockoutState {
        self.session.state()
    }

    pub fn session(&self) -> &LockoutSession {
        &self.session
    }

    /// `true` while a session runs without the keyboard hook.
    pub fn is_degraded(&self) -> bool {
        matches!(
            self.session,
            LockoutSession::Active(ActiveSession { hook: None, .. })
        )
    }

    pub fn taskbar(&self) -> &TaskbarController<T> {
        &self.taskbar
    }

    pub fn interceptor(&self) -> &I {
        &self.interceptor
    }

    pub fn hook_stats(&self) -> HookStats {
        self.interceptor.stats()
    }

    /// Handler for the activation channel.
    pub fn set_active(&mut self, active: bool) {
        if active {
            self.activate();
        } else {
            self.deactivate();
        }
    }

    pub fn activate(&mut self) {
        if let LockoutSession::Active(_) = self.session {
            log::debug!("lockout already active");
            self.notify(Notification::StateChanged(LockoutState::Active));
            return;
        }

        let hook = match self.interceptor.install() {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::warn!("{}, keyboard input will not be blocked", e);
                None
            }
        };
        let degraded = hook.is_none();

        let taskbar_was_auto_hide = self.taskbar.lock_with_restore();

        self.session = LockoutSession::Active(ActiveSession {
            hook,
            taskbar_was_auto_hide,
            started_at: Instant::now(),
        });
        log::info!("lockout activated");

        if degraded {
            self.notify(Notification::Degraded(Degraded::InputSuppressionUnavailable));
        }
        self.notify(Notification::StateChanged(LockoutState::Active));
    }

    pub fn deactivate(&mut self) {
        self.deactivate_with(DeactivationReason::User);
    }

    /// Same effect as [`deactivate`](Self::deactivate), triggered by the watchdog.
    pub fn auto_deactivate(&mut self, reason: DeactivationReason) {
        self.deactivate_with(reason);
    }

    fn deactivate_with(&mut self, reason: DeactivationReason) {
        let LockoutSession::Active(session) = std::mem::take(&mut self.session) else {
            log::debug!("lockout already idle");
            self.notify(Notification::StateChanged(LockoutState::Idle));
            return;
        };

        let restored = self.taskbar.unlock_if_owed();
        debug_assert_eq!(restored, session.taskbar_was_auto_hide);

        let mut leaked = false;
        if let Some(handle) = session.hook {
            let stats = self.interceptor.stats();
            match self.interceptor.uninstall(handle) {
                Ok(()) => {}
                Err(HookUninstallError::NotInstalled) => {
                    log::debug!("keyboard hook was already removed");
                }
                Err(e) => {
                    log::error!("{}, the keyboard hook may still be active", e);
                    leaked = true;
                }
            }
            log::debug!(
                "hook swallowed {} keys, synthesized {} substitutes",
                stats.swallowed,
                stats.synthesized
            );
        }

        log::info!(
            "lockout deactivated after {:?} ({:?})",
            session.started_at.elapsed(),
            reason
        );

        if leaked {
            self.notify(Notification::Degraded(Degraded::HookMayBeLeaked));
        }
        self.notify(Notification::StateChanged(LockoutState::Idle));
    }

    pub(crate) fn notify(&mut self, notification: Notification) {
        self.subscribers.retain(|tx| tx.send(notification).is_ok());
    }
}

impl<T: TaskbarBackend, I: InputInterceptor> Drop for LockoutStateMachine<T, I> {
    fn drop(&mut self) {
        if self.state() == LockoutState::Active {
            self.deactivate_with(DeactivationReason::Shutdown);
        }
    }
}

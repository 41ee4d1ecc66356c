//! Locks the keyboard's escape keys and the taskbar while you clean your keyboard or screen.
//!
//! A lockout session installs a system-wide low-level keyboard hook that swallows keys
//! which would switch away from the cleaning overlay, and pins an auto-hiding taskbar so it
//! does not pop up under the cleaning cloth. Both are released when the session ends:
//! on request, when the session budget runs out, or when the user wiggles the pointer.
//!
//! The UI layer talks to a running [`Lockout`] through [`Command`]s and renders the
//! [`Notification`]s it receives.

#[cfg(windows)]
pub mod console;
pub mod config;
pub mod error;
pub mod key_filter;
pub mod keyboard_hook;
pub mod lockout;
pub mod runtime;
pub mod taskbar;
pub mod watchdog;

pub use config::Config;
pub use lockout::{Degraded, LockoutState, Notification};
pub use runtime::{Command, Lockout};

#[cfg(windows)]
use error::Result;

/// Starts a lockout event loop driving the real taskbar and keyboard hook.
///
/// The loop starts idle; send [`Command::SetActive`] to begin a session.
#[cfg(windows)]
pub fn start(config: Config) -> Result<Lockout> {
    runtime::spawn(
        config,
        taskbar::ShellTaskbar,
        keyboard_hook::KeyboardHook::new(config.key_policy),
    )
}

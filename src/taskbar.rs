//! Taskbar auto-hide control with restore-on-exit bookkeeping.

use crate::error::{OsCommandError, OsQueryError};

/// The two taskbar modes the lockout cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskbarState {
    AutoHide,
    AlwaysOnTop,
}

/// Reads and writes the OS taskbar mode.
pub trait TaskbarBackend {
    fn query(&self) -> Result<TaskbarState, OsQueryError>;

    fn set(&self, target: TaskbarState) -> Result<(), OsCommandError>;
}

/// Pins an auto-hiding taskbar for the duration of a session and puts it back afterwards.
///
/// The controller only ever restores a mode it changed itself. If the taskbar was not
/// auto-hiding when the session started, nothing is owed and nothing is restored, so a
/// mode the user picked in the meantime is left alone.
#[derive(Debug)]
pub struct TaskbarController<B> {
    backend: B,
    restore_owed: bool,
}

impl<B: TaskbarBackend> TaskbarController<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            restore_owed: false,
        }
    }

    pub fn query_state(&self) -> Result<TaskbarState, OsQueryError> {
        self.backend.query()
    }

    /// Switches the taskbar mode. Issued even if `target` is already in effect.
    pub fn set_state(&self, target: TaskbarState) -> Result<(), OsCommandError> {
        self.backend.set(target)
    }

    /// Pins an auto-hiding taskbar. Returns `true` if a restore is now owed.
    pub fn lock_with_restore(&mut self) -> bool {
        match self.query_state() {
            Ok(TaskbarState::AutoHide) => {}
            Ok(TaskbarState::AlwaysOnTop) => {
                log::debug!("taskbar is not auto-hiding, leaving it alone");
                return false;
            }
            Err(e) => {
                log::warn!("{}, assuming it is always on top", e);
                return false;
            }
        }

        match self.set_state(TaskbarState::AlwaysOnTop) {
            Ok(()) => {
                self.restore_owed = true;
                log::info!("disabled taskbar auto-hide");
                true
            }
            Err(e) => {
                log::warn!("{}, taskbar stays in auto-hide mode", e);
                false
            }
        }
    }

    /// Restores auto-hide if [`lock_with_restore`](Self::lock_with_restore) disabled it.
    ///
    /// Returns `true` if a restore was attempted. The debt is cleared either way.
    pub fn unlock_if_owed(&mut self) -> bool {
        if !std::mem::take(&mut self.restore_owed) {
            return false;
        }

        match self.set_state(TaskbarState::AutoHide) {
            Ok(()) => log::info!("restored taskbar auto-hide"),
            Err(e) => log::warn!("{}, auto-hide was not restored", e),
        }
        true
    }

    pub fn restore_owed(&self) -> bool {
        self.restore_owed
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

#[cfg(windows)]
pub use self::windows_impl::ShellTaskbar;

#[cfg(windows)]
mod windows_impl {
    use windows::{
        Win32::{
            Foundation::{HWND, LPARAM},
            UI::{
                Shell::{ABM_GETSTATE, ABM_SETSTATE, ABS_ALWAYSONTOP, ABS_AUTOHIDE, APPBARDATA, SHAppBarMessage},
                WindowsAndMessaging::FindWindowW,
            },
        },
        core::{PCWSTR, w},
    };

    use super::{TaskbarBackend, TaskbarState};
    use crate::error::{OsCommandError, OsQueryError};

    /// The primary taskbar, driven through `SHAppBarMessage`.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct ShellTaskbar;

    impl ShellTaskbar {
        fn window() -> Result<HWND, OsQueryError> {
            unsafe { FindWindowW(w!("Shell_TrayWnd"), PCWSTR::null()) }
                .map_err(|e| OsQueryError(e.into()))
        }

        fn app_bar_data(hwnd: HWND, state: u32) -> APPBARDATA {
            APPBARDATA {
                cbSize: std::mem::size_of::<APPBARDATA>() as u32,
                hWnd: hwnd,
                lParam: LPARAM(state as isize),
                ..Default::default()
            }
        }
    }

    impl TaskbarBackend for ShellTaskbar {
        fn query(&self) -> Result<TaskbarState, OsQueryError> {
            let mut data = Self::app_bar_data(Self::window()?, 0);
            let state = unsafe { SHAppBarMessage(ABM_GETSTATE, &mut data) } as u32;

            if state & ABS_AUTOHIDE != 0 {
                Ok(TaskbarState::AutoHide)
            } else {
                Ok(TaskbarState::AlwaysOnTop)
            }
        }

        fn set(&self, target: TaskbarState) -> Result<(), OsCommandError> {
            let hwnd = Self::window().map_err(|e| OsCommandError(e.0))?;
            let state = match target {
                TaskbarState::AutoHide => ABS_AUTOHIDE,
                TaskbarState::AlwaysOnTop => ABS_ALWAYSONTOP,
            };

            let mut data = Self::app_bar_data(hwnd, state);
            unsafe { SHAppBarMessage(ABM_SETSTATE, &mut data) };
            Ok(())
        }
    }
}

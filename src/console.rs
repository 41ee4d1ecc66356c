//! Releases the lockout when the console is closed or the user logs off.
//!
//! Without this, a process killed through its console window would leave the taskbar
//! pinned until the next session changes it.

use std::{
    sync::{OnceLock, mpsc::Sender},
    thread,
    time::Duration,
};

use windows::Win32::System::Console::{
    CTRL_BREAK_EVENT, CTRL_C_EVENT, CTRL_CLOSE_EVENT, CTRL_LOGOFF_EVENT, CTRL_SHUTDOWN_EVENT,
    SetConsoleCtrlHandler,
};

use crate::runtime::Command;

/// How long the handler waits for the event loop before the OS terminates the process.
const CLEANUP_GRACE: Duration = Duration::from_millis(500);

/// Written once by `shutdown_on_console_close`, read by the handler.
static SENDER: OnceLock<Sender<Command>> = OnceLock::new();

/// Sends [`Command::Shutdown`] on Ctrl+C, Ctrl+Break, console close, logoff and shutdown.
pub fn shutdown_on_console_close(commands: Sender<Command>) -> std::io::Result<()> {
    SENDER.set(commands).map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            "console handler already registered",
        )
    })?;

    unsafe { SetConsoleCtrlHandler(Some(handler), true) }?;
    log::debug!("registered console control handler");
    Ok(())
}

unsafe extern "system" fn handler(ctrl_type: u32) -> windows::core::BOOL {
    let Some(tx) = SENDER.get() else {
        return windows::core::BOOL(0);
    };

    match ctrl_type {
        CTRL_C_EVENT | CTRL_BREAK_EVENT => {
            let _ = tx.send(Command::Shutdown);
            windows::core::BOOL(1)
        }
        CTRL_CLOSE_EVENT | CTRL_LOGOFF_EVENT | CTRL_SHUTDOWN_EVENT => {
            // The process is terminated as soon as this returns.
            let _ = tx.send(Command::Shutdown);
            thread::sleep(CLEANUP_GRACE);
            windows::core::BOOL(1)
        }
        _ => windows::core::BOOL(0),
    }
}

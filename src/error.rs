use thiserror::Error;

/// The taskbar window could not be resolved, typically because the shell is not running.
#[derive(Debug, Error)]
#[error("failed to locate the taskbar window")]
pub struct OsQueryError(#[source] pub std::io::Error);

/// The shell rejected a taskbar mode change.
#[derive(Debug, Error)]
#[error("failed to change the taskbar state")]
pub struct OsCommandError(#[source] pub std::io::Error);

#[derive(Debug, Error)]
pub enum HookInstallError {
    #[error("failed to register the keyboard hook")]
    Registration(#[source] std::io::Error),
    #[error("failed to spawn the hook thread")]
    Spawn(#[source] std::io::Error),
    #[error("the hook thread terminated unexpectedly")]
    ThreadCrashed,
}

#[derive(Debug, Error)]
pub enum HookUninstallError {
    #[error("the keyboard hook is not installed")]
    NotInstalled,
    #[error("failed to stop the hook thread")]
    Os(#[source] std::io::Error),
    #[error("the hook thread panicked while unhooking")]
    ThreadPanicked,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to spawn the lockout event loop")]
    Spawn(#[source] std::io::Error),
    #[error("the lockout event loop terminated unexpectedly")]
    LoopThreadCrashed,
}

pub type Result<T> = std::result::Result<T, Error>;

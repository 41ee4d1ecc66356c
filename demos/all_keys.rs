#[cfg(windows)]
fn main() {
    use std::time::Duration;

    use cleaning_mode::{
        Config, LockoutState, Notification, console,
        key_filter::{KeyPolicy, LockdownScope},
    };

    colog::init();

    let config = Config::default()
        .set_session_budget(Duration::from_secs(30))
        .set_exit_gesture(None)
        .set_key_policy(KeyPolicy::default().set_scope(LockdownScope::AllKeys));

    let lockout = cleaning_mode::start(config).unwrap();
    console::shutdown_on_console_close(lockout.sender()).unwrap();
    lockout.set_active(true).unwrap();

    for notification in lockout.notifications().iter() {
        if notification == Notification::StateChanged(LockoutState::Idle) {
            break;
        }
    }

    lockout.shutdown().unwrap();
}

#[cfg(not(windows))]
fn main() {
    eprintln!("this demo only runs on Windows");
}

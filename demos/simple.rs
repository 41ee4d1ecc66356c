#[cfg(windows)]
fn main() {
    use std::{thread, time::Duration};

    use cleaning_mode::{Command, Config, Notification, console, watchdog::format_countdown};

    colog::init();

    let lockout = cleaning_mode::start(Config::default()).unwrap();
    console::shutdown_on_console_close(lockout.sender()).unwrap();

    // Stand-in for the overlay: report pointer movement for a while.
    let pointer = lockout.sender();
    thread::spawn(move || {
        thread::sleep(Duration::from_secs(5));
        for _ in 0..30 {
            if pointer.send(Command::PointerMoved).is_err() {
                break;
            }
            thread::sleep(Duration::from_millis(100));
        }
    });

    lockout.set_active(true).unwrap();

    for notification in lockout.notifications().iter() {
        match notification {
            Notification::Countdown(seconds) => println!("{} left", format_countdown(seconds)),
            Notification::HideOverlay => break,
            other => println!("{:?}", other),
        }
    }

    lockout.shutdown().unwrap();
}

#[cfg(not(windows))]
fn main() {
    eprintln!("this demo only runs on Windows");
}

//! The single-threaded loop that drives a [`LockoutStateMachine`].
//!
//! Commands from the UI, the one-second session tick, the watchdog's grace timer and the
//! delayed overlay hide are all serialized here, so the state machine never sees two
//! transitions at once. Timers are plain deadlines: cancelling one means clearing it, and
//! the loop sleeps in `recv_timeout` until the earliest deadline or the next command.

use std::{
    ops::ControlFlow,
    sync::mpsc::{self, Receiver, RecvTimeoutError, Sender},
    thread,
    time::{Duration, Instant},
};

use crate::{
    config::Config,
    error::{Error, Result},
    keyboard_hook::InputInterceptor,
    lockout::{DeactivationReason, LockoutState, LockoutStateMachine, Notification},
    taskbar::TaskbarBackend,
    watchdog::{InactivityWatchdog, WatchdogEvent},
};

const TICK: Duration = Duration::from_secs(1);

/// Input accepted by the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// The activation button was toggled.
    SetActive(bool),
    /// The overlay saw the pointer move.
    PointerMoved,
    /// Release everything and stop the loop.
    Shutdown,
}

pub struct EventLoop<T: TaskbarBackend, I: InputInterceptor> {
    machine: LockoutStateMachine<T, I>,
    watchdog: InactivityWatchdog,
    hide_delay: Duration,
    next_tick: Option<Instant>,
    hide_at: Option<Instant>,
}

impl<T: TaskbarBackend, I: InputInterceptor> EventLoop<T, I> {
    pub fn new(config: &Config, taskbar: T, interceptor: I) -> Self {
        Self {
            machine: LockoutStateMachine::new(taskbar, interceptor),
            watchdog: InactivityWatchdog::new(config.watchdog, Instant::now()),
            hide_delay: config.hide_delay,
            next_tick: None,
            hide_at: None,
        }
    }

    pub fn subscribe(&mut self) -> Receiver<Notification> {
        self.machine.subscribe()
    }

    pub fn machine(&self) -> &LockoutStateMachine<T, I> {
        &self.machine
    }

    pub fn watchdog(&self) -> &InactivityWatchdog {
        &self.watchdog
    }

    /// Applies one command received at `now`.
    pub fn dispatch(&mut self, command: Command, now: Instant) -> ControlFlow<()> {
        match command {
            Command::SetActive(true) => self.activate(now),
            Command::SetActive(false) => self.deactivate(DeactivationReason::User, now),
            Command::PointerMoved => self.pointer_moved(now),
            Command::Shutdown => {
                self.deactivate(DeactivationReason::Shutdown, now);
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Fires every timer whose deadline is at or before `now`.
    pub fn advance(&mut self, now: Instant) {
        while let Some(at) = self.next_tick.filter(|at| *at <= now) {
            self.next_tick = Some(at + TICK);
            self.tick(at);
        }

        if self.machine.state() == LockoutState::Active
            && let Some(WatchdogEvent::Inactive) = self.watchdog.poll(now)
        {
            self.machine.notify(Notification::Inactive);
        }

        if self.hide_at.is_some_and(|at| at <= now) {
            self.hide_at = None;
            self.machine.notify(Notification::HideOverlay);
        }
    }

    /// The earliest pending timer, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        let grace = match self.machine.state() {
            LockoutState::Active => self.watchdog.grace_deadline(),
            LockoutState::Idle => None,
        };

        [self.next_tick, self.hide_at, grace].into_iter().flatten().min()
    }

    /// Runs until [`Command::Shutdown`] arrives or every sender is dropped.
    pub fn run(mut self, commands: Receiver<Command>) {
        log::debug!("started lockout event loop");

        loop {
            let received = match self.next_deadline() {
                Some(deadline) => {
                    commands.recv_timeout(deadline.saturating_duration_since(Instant::now()))
                }
                None => commands.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match received {
                Ok(command) => {
                    if self.dispatch(command, Instant::now()).is_break() {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    self.deactivate(DeactivationReason::Shutdown, Instant::now());
                    break;
                }
            }

            self.advance(Instant::now());
        }

        log::debug!("stopped lockout event loop");
    }

    fn activate(&mut self, now: Instant) {
        // A new session supersedes a pending hide from the previous one.
        self.hide_at = None;

        if self.machine.state() == LockoutState::Active {
            self.machine.activate();
            return;
        }

        self.machine.activate();
        self.watchdog.reset(now);
        self.next_tick = Some(now + TICK);
        self.machine
            .notify(Notification::Countdown(self.watchdog.remaining_seconds()));
    }

    fn deactivate(&mut self, reason: DeactivationReason, now: Instant) {
        let was_active = self.machine.state() == LockoutState::Active;
        self.machine.auto_deactivate(reason);

        if was_active {
            self.next_tick = None;
            self.watchdog.reset(now);
            self.hide_at = Some(now + self.hide_delay);
        }
    }

    fn pointer_moved(&mut self, now: Instant) {
        if self.machine.state() != LockoutState::Active {
            return;
        }

        match self.watchdog.on_activity(now) {
            Some(WatchdogEvent::PointerActive) => self.machine.notify(Notification::PointerActive),
            Some(WatchdogEvent::ExitGesture) => {
                log::info!("exit gesture detected");
                self.deactivate(DeactivationReason::ExitGesture, now);
            }
            _ => {}
        }
    }

    fn tick(&mut self, at: Instant) {
        match self.watchdog.tick() {
            Some(WatchdogEvent::BudgetExpired) => {
                self.machine.notify(Notification::Countdown(0));
                log::info!("session budget expired");
                self.deactivate(DeactivationReason::BudgetExpired, at);
            }
            _ => self
                .machine
                .notify(Notification::Countdown(self.watchdog.remaining_seconds())),
        }
    }
}

/// A lockout event loop running on its own thread.
pub struct Lockout {
    commands: Sender<Command>,
    notifications: Receiver<Notification>,
    join_handle: thread::JoinHandle<()>,
}

impl Lockout {
    /// A sender for the UI layer, e.g. for the overlay's pointer events.
    pub fn sender(&self) -> Sender<Command> {
        self.commands.clone()
    }

    pub fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::LoopThreadCrashed)
    }

    pub fn set_active(&self, active: bool) -> Result<()> {
        self.send(Command::SetActive(active))
    }

    pub fn notifications(&self) -> &Receiver<Notification> {
        &self.notifications
    }

    /// Deactivates any session and waits for the loop to finish.
    pub fn shutdown(self) -> Result<()> {
        // A dead loop is reported by `join`.
        let _ = self.commands.send(Command::Shutdown);
        self.join()
    }

    pub fn join(self) -> Result<()> {
        self.join_handle
            .join()
            .map_err(|_| Error::LoopThreadCrashed)
    }
}

/// Starts an event loop over the given backends on a new thread.
pub fn spawn<T, I>(config: Config, taskbar: T, interceptor: I) -> Result<Lockout>
where
    T: TaskbarBackend + Send + 'static,
    I: InputInterceptor + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let mut event_loop = EventLoop::new(&config, taskbar, interceptor);
    let notifications = event_loop.subscribe();

    let join_handle = thread::Builder::new()
        .name("lockout".into())
        .spawn(move || event_loop.run(rx))
        .map_err(Error::Spawn)?;

    Ok(Lockout {
        commands: tx,
        notifications,
        join_handle,
    })
}

use std::{
    num::NonZeroU64,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use cleaning_mode::{
    Command, Config, Degraded, LockoutState, Notification,
    error::{HookInstallError, HookUninstallError, OsCommandError, OsQueryError},
    keyboard_hook::{HookHandle, InputInterceptor},
    lockout::{LockoutSession, LockoutStateMachine},
    runtime::EventLoop,
    taskbar::{TaskbarBackend, TaskbarState},
};

#[derive(Debug, Default)]
struct Os {
    taskbar: Option<TaskbarState>,
    taskbar_sets: Vec<TaskbarState>,
    hook: Option<u64>,
    installs: u64,
    uninstalls: usize,
    fail_install: bool,
    fail_uninstall: bool,
}

type SharedOs = Arc<Mutex<Os>>;

struct FakeTaskbar(SharedOs);

impl TaskbarBackend for FakeTaskbar {
    fn query(&self) -> Result<TaskbarState, OsQueryError> {
        self.0
            .lock()
            .unwrap()
            .taskbar
            .ok_or_else(|| OsQueryError(std::io::Error::other("Shell_TrayWnd not found")))
    }

    fn set(&self, target: TaskbarState) -> Result<(), OsCommandError> {
        let mut os = self.0.lock().unwrap();
        os.taskbar_sets.push(target);
        os.taskbar = Some(target);
        Ok(())
    }
}

struct FakeHook(SharedOs);

impl InputInterceptor for FakeHook {
    fn install(&mut self) -> Result<HookHandle, HookInstallError> {
        let mut os = self.0.lock().unwrap();
        if os.fail_install {
            return Err(HookInstallError::Registration(std::io::Error::other(
                "access denied",
            )));
        }
        if let Some(id) = os.hook {
            return Ok(HookHandle::new(NonZeroU64::new(id).unwrap()));
        }
        os.installs += 1;
        os.hook = Some(os.installs);
        Ok(HookHandle::new(NonZeroU64::new(os.installs).unwrap()))
    }

    fn uninstall(&mut self, handle: HookHandle) -> Result<(), HookUninstallError> {
        let mut os = self.0.lock().unwrap();
        os.uninstalls += 1;
        if os.fail_uninstall {
            return Err(HookUninstallError::Os(std::io::Error::other(
                "PostThreadMessageW failed",
            )));
        }
        match os.hook {
            Some(id) if id == handle.id().get() => {
                os.hook = None;
                Ok(())
            }
            _ => Err(HookUninstallError::NotInstalled),
        }
    }
}

fn os(taskbar: TaskbarState) -> SharedOs {
    Arc::new(Mutex::new(Os {
        taskbar: Some(taskbar),
        ..Default::default()
    }))
}

fn machine(os: &SharedOs) -> LockoutStateMachine<FakeTaskbar, FakeHook> {
    LockoutStateMachine::new(FakeTaskbar(Arc::clone(os)), FakeHook(Arc::clone(os)))
}

fn event_loop(os: &SharedOs, config: Config) -> EventLoop<FakeTaskbar, FakeHook> {
    EventLoop::new(&config, FakeTaskbar(Arc::clone(os)), FakeHook(Arc::clone(os)))
}

fn hook_held_iff_active(machine: &LockoutStateMachine<FakeTaskbar, FakeHook>) -> bool {
    match machine.session() {
        LockoutSession::Idle => true,
        LockoutSession::Active(session) => session.hook.is_some(),
    }
}

#[test]
fn auto_hide_taskbar_round_trip() {
    let os = os(TaskbarState::AutoHide);
    let mut machine = machine(&os);
    let rx = machine.subscribe();

    machine.activate();
    assert_eq!(machine.state(), LockoutState::Active);
    assert_eq!(os.lock().unwrap().taskbar, Some(TaskbarState::AlwaysOnTop));
    assert!(machine.session().active().unwrap().taskbar_was_auto_hide);
    assert!(os.lock().unwrap().hook.is_some());

    machine.deactivate();
    assert_eq!(machine.state(), LockoutState::Idle);
    assert_eq!(os.lock().unwrap().taskbar, Some(TaskbarState::AutoHide));
    assert_eq!(os.lock().unwrap().hook, None);

    assert_eq!(
        rx.try_iter().collect::<Vec<_>>(),
        [
            Notification::StateChanged(LockoutState::Active),
            Notification::StateChanged(LockoutState::Idle),
        ]
    );
}

#[test]
fn always_on_top_taskbar_is_not_touched() {
    let os = os(TaskbarState::AlwaysOnTop);
    let mut machine = machine(&os);

    machine.activate();
    assert!(!machine.session().active().unwrap().taskbar_was_auto_hide);
    machine.deactivate();

    let os = os.lock().unwrap();
    assert_eq!(os.taskbar, Some(TaskbarState::AlwaysOnTop));
    assert!(os.taskbar_sets.is_empty());
}

#[test]
fn user_change_during_session_is_not_clobbered_when_nothing_owed() {
    let os = os(TaskbarState::AlwaysOnTop);
    let mut machine = machine(&os);

    machine.activate();
    os.lock().unwrap().taskbar = Some(TaskbarState::AutoHide);
    machine.deactivate();

    assert_eq!(os.lock().unwrap().taskbar, Some(TaskbarState::AutoHide));
    assert!(os.lock().unwrap().taskbar_sets.is_empty());
}

#[test]
fn double_deactivate_releases_once() {
    let os = os(TaskbarState::AutoHide);
    let mut machine = machine(&os);

    machine.activate();
    machine.deactivate();
    machine.deactivate();

    let os = os.lock().unwrap();
    assert_eq!(machine.state(), LockoutState::Idle);
    assert_eq!(
        os.taskbar_sets
            .iter()
            .filter(|s| **s == TaskbarState::AutoHide)
            .count(),
        1
    );
    assert_eq!(os.uninstalls, 1);
}

#[test]
fn state_and_hook_stay_consistent_over_any_sequence() {
    let os = os(TaskbarState::AutoHide);
    let mut machine = machine(&os);

    // xorshift, so the sequence is varied but reproducible
    let mut seed: u32 = 0x9E37_79B9;
    for _ in 0..500 {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        machine.set_active(seed & 1 == 1);

        assert!(hook_held_iff_active(&machine));
        let hook_installed = os.lock().unwrap().hook.is_some();
        assert_eq!(hook_installed, machine.state() == LockoutState::Active);
        let taskbar = os.lock().unwrap().taskbar;
        let expected = match machine.state() {
            LockoutState::Active => TaskbarState::AlwaysOnTop,
            LockoutState::Idle => TaskbarState::AutoHide,
        };
        assert_eq!(taskbar, Some(expected));
    }
}

#[test]
fn hook_install_failure_degrades_but_activates() {
    let os = os(TaskbarState::AutoHide);
    os.lock().unwrap().fail_install = true;
    let mut machine = machine(&os);
    let rx = machine.subscribe();

    machine.activate();
    machine.activate();

    assert_eq!(machine.state(), LockoutState::Active);
    assert!(machine.session().active().unwrap().hook.is_none());
    assert!(machine.is_degraded());
    assert_eq!(os.lock().unwrap().taskbar, Some(TaskbarState::AlwaysOnTop));

    let degraded = rx
        .try_iter()
        .filter(|n| matches!(n, Notification::Degraded(_)))
        .collect::<Vec<_>>();
    assert_eq!(
        degraded,
        [Notification::Degraded(Degraded::InputSuppressionUnavailable)]
    );

    machine.deactivate();
    assert!(!machine.is_degraded());
    assert_eq!(os.lock().unwrap().uninstalls, 0);
    assert_eq!(os.lock().unwrap().taskbar, Some(TaskbarState::AutoHide));
}

#[test]
fn failed_uninstall_still_returns_to_idle() {
    let os = os(TaskbarState::AutoHide);
    let mut machine = machine(&os);
    let rx = machine.subscribe();

    machine.activate();
    os.lock().unwrap().fail_uninstall = true;
    machine.deactivate();

    assert_eq!(machine.state(), LockoutState::Idle);
    assert_eq!(os.lock().unwrap().taskbar, Some(TaskbarState::AutoHide));
    assert_eq!(
        rx.try_iter().skip(1).collect::<Vec<_>>(),
        [
            Notification::Degraded(Degraded::HookMayBeLeaked),
            Notification::StateChanged(LockoutState::Idle),
        ]
    );
}

#[test]
fn stale_hook_is_a_silent_no_op() {
    let os = os(TaskbarState::AlwaysOnTop);
    let mut machine = machine(&os);
    let rx = machine.subscribe();

    machine.activate();
    os.lock().unwrap().hook = None;
    machine.deactivate();

    assert_eq!(machine.state(), LockoutState::Idle);
    assert!(!rx.try_iter().any(|n| matches!(n, Notification::Degraded(_))));
}

#[test]
fn missing_taskbar_does_not_block_activation() {
    let os = Arc::new(Mutex::new(Os::default()));
    let mut machine = machine(&os);

    machine.activate();
    assert_eq!(machine.state(), LockoutState::Active);
    machine.deactivate();

    assert_eq!(machine.state(), LockoutState::Idle);
    assert!(os.lock().unwrap().taskbar_sets.is_empty());
}

#[test]
fn budget_expiry_deactivates_exactly_once() {
    let os = os(TaskbarState::AutoHide);
    let mut event_loop = event_loop(&os, Config::default());
    let rx = event_loop.subscribe();
    let t0 = Instant::now();

    let _ = event_loop.dispatch(Command::SetActive(true), t0);
    for n in 1..=300 {
        event_loop.advance(t0 + Duration::from_secs(n));
    }
    for n in 301..=310 {
        event_loop.advance(t0 + Duration::from_secs(n));
    }

    let notifications = rx.try_iter().collect::<Vec<_>>();
    let idle_transitions = notifications
        .iter()
        .filter(|n| **n == Notification::StateChanged(LockoutState::Idle))
        .count();
    assert_eq!(idle_transitions, 1);
    assert_eq!(event_loop.machine().state(), LockoutState::Idle);
    assert!(notifications.contains(&Notification::Countdown(0)));
    assert_eq!(os.lock().unwrap().taskbar, Some(TaskbarState::AutoHide));
    assert_eq!(os.lock().unwrap().hook, None);
}

#[test]
fn budget_is_not_extended_by_pointer_activity() {
    let os = os(TaskbarState::AlwaysOnTop);
    let config = Config::default()
        .set_session_budget(Duration::from_secs(10))
        .set_exit_gesture(None);
    let mut event_loop = event_loop(&os, config);
    let t0 = Instant::now();

    let _ = event_loop.dispatch(Command::SetActive(true), t0);
    for n in 1..=10 {
        let now = t0 + Duration::from_secs(n);
        let _ = event_loop.dispatch(Command::PointerMoved, now);
        event_loop.advance(now);
    }

    assert_eq!(event_loop.machine().state(), LockoutState::Idle);
}

#[test]
fn grace_window_reports_inactivity() {
    let os = os(TaskbarState::AlwaysOnTop);
    let config = Config::default()
        .set_grace_window(Duration::from_secs(2))
        .set_arm_delay(Duration::ZERO)
        .set_exit_gesture(None);
    let mut event_loop = event_loop(&os, config);
    let rx = event_loop.subscribe();
    let t0 = Instant::now();

    let _ = event_loop.dispatch(Command::SetActive(true), t0);
    let _ = event_loop.dispatch(Command::PointerMoved, t0);
    assert!(rx.try_iter().any(|n| n == Notification::PointerActive));

    event_loop.advance(t0 + Duration::from_secs(1));
    assert!(!rx.try_iter().any(|n| n == Notification::Inactive));

    event_loop.advance(t0 + Duration::from_secs(3));
    assert!(rx.try_iter().any(|n| n == Notification::Inactive));
    assert_eq!(event_loop.machine().state(), LockoutState::Active);
}

#[test]
fn wiggling_the_pointer_ends_the_session() {
    let os = os(TaskbarState::AutoHide);
    let mut event_loop = event_loop(&os, Config::default());
    let rx = event_loop.subscribe();
    let t0 = Instant::now();

    let _ = event_loop.dispatch(Command::SetActive(true), t0);

    // Movement during the first second is ignored.
    let _ = event_loop.dispatch(Command::PointerMoved, t0 + Duration::from_millis(500));
    assert_eq!(event_loop.machine().state(), LockoutState::Active);

    let start = t0 + Duration::from_secs(1);
    for step in 0..=20 {
        let _ = event_loop.dispatch(
            Command::PointerMoved,
            start + Duration::from_millis(step * 100),
        );
    }

    assert_eq!(event_loop.machine().state(), LockoutState::Idle);
    assert_eq!(os.lock().unwrap().taskbar, Some(TaskbarState::AutoHide));
    assert_eq!(
        rx.try_iter()
            .filter(|n| *n == Notification::StateChanged(LockoutState::Idle))
            .count(),
        1
    );
}

#[test]
fn dropping_the_loop_releases_resources() {
    let os = os(TaskbarState::AutoHide);
    let mut event_loop = event_loop(&os, Config::default());

    let _ = event_loop.dispatch(Command::SetActive(true), Instant::now());
    drop(event_loop);

    assert_eq!(os.lock().unwrap().taskbar, Some(TaskbarState::AutoHide));
    assert_eq!(os.lock().unwrap().hook, None);
}

#[test]
fn spawned_loop_releases_on_shutdown() {
    let os = os(TaskbarState::AutoHide);
    let lockout = cleaning_mode::runtime::spawn(
        Config::default(),
        FakeTaskbar(Arc::clone(&os)),
        FakeHook(Arc::clone(&os)),
    )
    .unwrap();

    lockout.set_active(true).unwrap();
    assert_eq!(
        lockout.notifications().recv().unwrap(),
        Notification::StateChanged(LockoutState::Active)
    );

    lockout.shutdown().unwrap();
    assert_eq!(os.lock().unwrap().taskbar, Some(TaskbarState::AutoHide));
    assert_eq!(os.lock().unwrap().hook, None);
}

//! System-wide keyboard interception.
//!
//! [`InputInterceptor`] is the seam the lockout state machine talks to. On Windows it is
//! implemented by [`KeyboardHook`], which runs a `WH_KEYBOARD_LL` hook on a dedicated
//! message-pumping thread and filters events with [`crate::key_filter::decide`].

use std::{
    num::NonZeroU64,
    sync::atomic::{AtomicU64, Ordering},
};

use crate::error::{HookInstallError, HookUninstallError};

/// Identifies one installation of a keyboard hook.
///
/// A handle is consumed by [`InputInterceptor::uninstall`]. Handles can be built from any
/// id, so interceptors check them at runtime: a stale or foreign handle is rejected with
/// [`HookUninstallError::NotInstalled`] and leaves the current installation alone.
#[derive(Debug, PartialEq, Eq)]
pub struct HookHandle(NonZeroU64);

impl HookHandle {
    pub fn new(id: NonZeroU64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> NonZeroU64 {
        self.0
    }

    /// Another handle referring to the same installation.
    pub fn duplicate(&self) -> Self {
        Self(self.0)
    }
}

/// Snapshot of what the hook callback has done since installation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HookStats {
    pub swallowed: u64,
    pub synthesized: u64,
    pub synthesis_failures: u64,
}

/// Counters written by the hook callback and read by the main loop without locking.
#[derive(Debug, Default)]
pub struct HookCounters {
    swallowed: AtomicU64,
    synthesized: AtomicU64,
    synthesis_failures: AtomicU64,
}

impl HookCounters {
    pub fn record_swallowed(&self) {
        self.swallowed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_synthesized(&self) {
        self.synthesized.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_synthesis_failure(&self) {
        self.synthesis_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HookStats {
        HookStats {
            swallowed: self.swallowed.load(Ordering::Relaxed),
            synthesized: self.synthesized.load(Ordering::Relaxed),
            synthesis_failures: self.synthesis_failures.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.swallowed.store(0, Ordering::Relaxed);
        self.synthesized.store(0, Ordering::Relaxed);
        self.synthesis_failures.store(0, Ordering::Relaxed);
    }
}

/// Tracks at most one installation and the handle ids issued for it.
///
/// Ids are never reused while the slot lives, so a handle kept from an earlier
/// installation cannot release a later one.
#[derive(Debug)]
#[cfg_attr(not(windows), allow(dead_code))]
pub(crate) struct HookSlot<T> {
    active: Option<(NonZeroU64, T)>,
    next_id: NonZeroU64,
}

#[cfg_attr(not(windows), allow(dead_code))]
impl<T> HookSlot<T> {
    pub(crate) fn new() -> Self {
        Self {
            active: None,
            next_id: NonZeroU64::MIN,
        }
    }

    pub(crate) fn is_occupied(&self) -> bool {
        self.active.is_some()
    }

    /// Another handle to the current installation, if there is one.
    pub(crate) fn existing(&self) -> Option<HookHandle> {
        self.active.as_ref().map(|(id, _)| HookHandle::new(*id))
    }

    /// Stores a new installation and issues its handle.
    pub(crate) fn occupy(&mut self, value: T) -> HookHandle {
        let id = self.next_id;
        self.next_id = id.checked_add(1).unwrap_or(NonZeroU64::MIN);
        self.active = Some((id, value));
        HookHandle::new(id)
    }

    /// The installation `handle` refers to, or `None` if it is stale or foreign.
    pub(crate) fn get(&self, handle: &HookHandle) -> Option<&T> {
        match &self.active {
            Some((id, value)) if *id == handle.id() => Some(value),
            _ => None,
        }
    }

    pub(crate) fn take(&mut self) -> Option<T> {
        self.active.take().map(|(_, value)| value)
    }
}

/// Installs and removes a system-wide keyboard hook.
pub trait InputInterceptor {
    /// Registers the hook with the OS.
    ///
    /// Returns a handle to the existing installation if the hook is already active.
    fn install(&mut self) -> Result<HookHandle, HookInstallError>;

    /// Removes the hook identified by `handle`.
    ///
    /// Fails with [`HookUninstallError::NotInstalled`] if `handle` does not refer to the
    /// current installation.
    fn uninstall(&mut self, handle: HookHandle) -> Result<(), HookUninstallError>;

    /// Counters of the current (or last) installation.
    fn stats(&self) -> HookStats {
        HookStats::default()
    }
}

#[cfg(windows)]
pub use self::windows_impl::KeyboardHook;

#[cfg(windows)]
mod windows_impl {
    use std::{cell::OnceCell, sync::Arc, thread};

    use windows::{
        Win32::{
            Foundation::{LPARAM, LRESULT, WPARAM},
            System::{LibraryLoader::GetModuleHandleW, Threading::GetCurrentThreadId},
            UI::WindowsAndMessaging::{
                CallNextHookEx, DispatchMessageW, GetMessageW, HC_ACTION, HHOOK, HOOKPROC, MSG,
                PM_NOREMOVE, PeekMessageW, PostThreadMessageW, SetWindowsHookExW,
                TranslateMessage, WH_KEYBOARD_LL, WM_QUIT, WM_USER,
            },
        },
        core::Owned,
    };

    use super::{HookCounters, HookHandle, HookSlot, HookStats, InputInterceptor};
    use crate::{
        error::{HookInstallError, HookUninstallError},
        key_filter::{self, HookDecision, KeyPolicy},
    };

    struct HookContext {
        policy: KeyPolicy,
        counters: Arc<HookCounters>,
    }

    thread_local! {
        static HOOK_CONTEXT: OnceCell<HookContext> = const { OnceCell::new() };
    }

    struct ActiveHook {
        thread_id: u32,
        join_handle: thread::JoinHandle<()>,
    }

    /// A `WH_KEYBOARD_LL` hook running on its own thread.
    pub struct KeyboardHook {
        policy: KeyPolicy,
        counters: Arc<HookCounters>,
        slot: HookSlot<ActiveHook>,
    }

    impl KeyboardHook {
        pub fn new(policy: KeyPolicy) -> Self {
            Self {
                policy,
                counters: Default::default(),
                slot: HookSlot::new(),
            }
        }

        pub fn is_installed(&self) -> bool {
            self.slot.is_occupied()
        }

        fn stop(active: &ActiveHook) -> Result<(), HookUninstallError> {
            unsafe { PostThreadMessageW(active.thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) }
                .map_err(|e| HookUninstallError::Os(e.into()))
        }
    }

    impl InputInterceptor for KeyboardHook {
        fn install(&mut self) -> Result<HookHandle, HookInstallError> {
            if let Some(handle) = self.slot.existing() {
                log::debug!("keyboard hook already installed");
                return Ok(handle);
            }

            self.counters.reset();
            let (thread_id, join_handle) = start_hook_thread(self.policy, Arc::clone(&self.counters))?;

            log::info!("registered keyboard hook on thread {}", thread_id);
            Ok(self.slot.occupy(ActiveHook {
                thread_id,
                join_handle,
            }))
        }

        fn uninstall(&mut self, handle: HookHandle) -> Result<(), HookUninstallError> {
            let active = self
                .slot
                .get(&handle)
                .ok_or(HookUninstallError::NotInstalled)?;
            // On failure the thread is still running and stays in the slot for Drop.
            Self::stop(active)?;

            if let Some(active) = self.slot.take() {
                active
                    .join_handle
                    .join()
                    .map_err(|_| HookUninstallError::ThreadPanicked)?;
            }

            log::info!("unregistered keyboard hook");
            Ok(())
        }

        fn stats(&self) -> HookStats {
            self.counters.snapshot()
        }
    }

    impl Drop for KeyboardHook {
        fn drop(&mut self) {
            if let Some(active) = self.slot.take() {
                match Self::stop(&active) {
                    Ok(()) => {
                        let _ = active.join_handle.join();
                    }
                    Err(e) => log::error!("failed to stop the keyboard hook thread: {}", e),
                }
            }
        }
    }

    fn start_hook_thread(
        policy: KeyPolicy,
        counters: Arc<HookCounters>,
    ) -> Result<(u32, thread::JoinHandle<()>), HookInstallError> {
        let (result_tx, result_rx) = oneshot::channel::<Result<u32, HookInstallError>>();

        let join_handle = thread::Builder::new()
            .name("keyboard-hook".into())
            .spawn(move || {
                HOOK_CONTEXT.with(|c| {
                    let _ = c.set(HookContext { policy, counters });
                });

                let mut msg = MSG::default();
                // Force creation of the message queue so WM_QUIT can be posted to us.
                unsafe {
                    let _ = PeekMessageW(&mut msg, None, WM_USER, WM_USER, PM_NOREMOVE);
                }

                let hook_result = unsafe { register_keyboard_hook(Some(low_level_keyboard_proc)) };

                let _hook_handle = match hook_result {
                    Err(e) => {
                        let _ = result_tx.send(Err(HookInstallError::Registration(e)));
                        return;
                    }
                    Ok(handle) => {
                        let _ = result_tx.send(Ok(unsafe { GetCurrentThreadId() }));
                        handle
                    }
                };

                unsafe {
                    while GetMessageW(&mut msg, None, 0, 0).0 > 0 {
                        let _ = TranslateMessage(&msg);
                        DispatchMessageW(&msg);
                    }
                }
            })
            .map_err(HookInstallError::Spawn)?;

        match result_rx.recv() {
            Ok(Ok(thread_id)) => Ok((thread_id, join_handle)),
            Ok(Err(e)) => {
                let _ = join_handle.join();
                Err(e)
            }
            Err(_) => Err(HookInstallError::ThreadCrashed),
        }
    }

    unsafe extern "system" fn low_level_keyboard_proc(
        n_code: i32,
        w_param: WPARAM,
        l_param: LPARAM,
    ) -> LRESULT {
        if n_code == HC_ACTION as i32 {
            let event = unsafe { key_filter::from_hook_params(n_code, w_param, l_param) };

            let swallow = HOOK_CONTEXT.with(|c| {
                let Some(context) = c.get() else {
                    return false;
                };

                match key_filter::decide(&context.policy, &event) {
                    HookDecision::Forward => false,
                    HookDecision::Swallow => {
                        context.counters.record_swallowed();
                        true
                    }
                    HookDecision::Synthesize(substitute) => {
                        // SendInput only queues the event, but it still runs inside the
                        // hook timeout after which the OS silently removes the hook.
                        match key_filter::send_keyup(substitute.virtual_key) {
                            Ok(()) => context.counters.record_synthesized(),
                            Err(_) => context.counters.record_synthesis_failure(),
                        }
                        context.counters.record_swallowed();
                        true
                    }
                }
            });

            if swallow {
                return LRESULT(1);
            }
        }

        unsafe { CallNextHookEx(None, n_code, w_param, l_param) }
    }

    unsafe fn register_keyboard_hook(f: HOOKPROC) -> std::io::Result<Owned<HHOOK>> {
        let module = unsafe { GetModuleHandleW(None) }?;
        let keyboard_hook =
            unsafe { SetWindowsHookExW(WH_KEYBOARD_LL, f, Some(module.into()), 0) }?;

        Ok(unsafe { Owned::new(keyboard_hook) })
    }
}

//! Classify keyboard events observed by the low-level hook and decide what happens to them.
//!
//! While a lockout session is active, every key event reaches [`decide`] before any other
//! application sees it. Keys that would let the user escape the overlay (the Windows key,
//! Alt+Tab, Alt+F4, Ctrl+Esc, ...) are swallowed. For key-downs of that class a harmless
//! key-up of an unassigned virtual key is synthesized in their place, so that the system
//! does not open the Start menu or the menu bar when a modifier is released.
//!
//! [`decide`] runs inside the hook callback. It is a pure function over immutable
//! [`KeyPolicy`] data: it allocates nothing, blocks on nothing and logs nothing.

/// Virtual key codes used by the filter.
///
/// See also: [Virtual-Key Codes](https://learn.microsoft.com/en-us/windows/win32/inputdev/virtual-key-codes)
pub mod vk {
    pub const TAB: u16 = 0x09;
    pub const CONTROL: u16 = 0x11;
    pub const MENU: u16 = 0x12;
    pub const ESCAPE: u16 = 0x1B;
    pub const LWIN: u16 = 0x5B;
    pub const RWIN: u16 = 0x5C;
    pub const APPS: u16 = 0x5D;
    pub const F4: u16 = 0x73;
    pub const LCONTROL: u16 = 0xA2;
    pub const RCONTROL: u16 = 0xA3;
    pub const LMENU: u16 = 0xA4;
    pub const RMENU: u16 = 0xA5;
    /// Unassigned key (`VK__none_`). Sending it has no visible effect.
    pub const NONE: u16 = 0xFF;
}

/// Represents the state of a key: pressed or released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Down,
    Up,
}

/// Modifier keys held while the event was generated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub alt: bool,
    pub ctrl: bool,
}

/// A single keyboard event as seen by the hook.
///
/// Transient: built inside the hook callback and consumed before it returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub virtual_key: u16,
    pub scan_code: u32,
    pub is_key_up: bool,
    /// The `nCode` the OS passed to the hook procedure.
    pub hook_code: i32,
    /// Set for events produced by `SendInput`, including our own substitutes.
    pub injected: bool,
    pub modifiers: Modifiers,
}

impl KeyEvent {
    /// A physical key-down with no modifiers held.
    pub fn key_down(virtual_key: u16) -> Self {
        Self {
            virtual_key,
            scan_code: 0,
            is_key_up: false,
            hook_code: 0,
            injected: false,
            modifiers: Modifiers::default(),
        }
    }

    /// A physical key-up with no modifiers held.
    pub fn key_up(virtual_key: u16) -> Self {
        Self {
            is_key_up: true,
            ..Self::key_down(virtual_key)
        }
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn injected(mut self) -> Self {
        self.injected = true;
        self
    }

    pub fn key_state(&self) -> KeyState {
        if self.is_key_up {
            KeyState::Up
        } else {
            KeyState::Down
        }
    }

    /// Returns `true` if this key would let the user leave the overlay.
    pub fn is_escape_key(&self) -> bool {
        match self.virtual_key {
            vk::LWIN | vk::RWIN | vk::APPS => true,
            vk::MENU | vk::LMENU | vk::RMENU => true,
            vk::TAB | vk::F4 => self.modifiers.alt,
            vk::ESCAPE => self.modifiers.alt || self.modifiers.ctrl,
            _ => false,
        }
    }
}

/// Which keys are blocked while a session is active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LockdownScope {
    /// Block only keys and combinations that switch away from the overlay.
    #[default]
    EscapeKeys,
    /// Block every physical key.
    AllKeys,
}

/// Immutable filter configuration handed to the hook thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPolicy {
    pub scope: LockdownScope,
    /// The key whose key-up is synthesized in place of a swallowed escape key.
    pub substitute_key: u16,
}

impl KeyPolicy {
    pub fn set_scope(mut self, scope: LockdownScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn set_substitute_key(mut self, virtual_key: u16) -> Self {
        self.substitute_key = virtual_key;
        self
    }
}

impl Default for KeyPolicy {
    fn default() -> Self {
        Self {
            scope: LockdownScope::EscapeKeys,
            substitute_key: vk::NONE,
        }
    }
}

/// What the hook callback does with an observed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookDecision {
    /// Drop the event; no other application sees it.
    Swallow,
    /// Pass the event to the next hook unchanged.
    Forward,
    /// Drop the event and inject the contained one instead.
    Synthesize(KeyEvent),
}

/// Decides the fate of a single key event.
pub fn decide(policy: &KeyPolicy, event: &KeyEvent) -> HookDecision {
    if event.injected {
        return HookDecision::Forward;
    }

    if event.is_escape_key() {
        return match event.key_state() {
            KeyState::Down => HookDecision::Synthesize(KeyEvent {
                virtual_key: policy.substitute_key,
                scan_code: 0,
                is_key_up: true,
                hook_code: event.hook_code,
                injected: true,
                modifiers: event.modifiers,
            }),
            KeyState::Up => HookDecision::Swallow,
        };
    }

    match policy.scope {
        LockdownScope::EscapeKeys => HookDecision::Forward,
        LockdownScope::AllKeys => HookDecision::Swallow,
    }
}

#[cfg(windows)]
pub(crate) use self::windows_impl::{from_hook_params, send_keyup};

#[cfg(windows)]
mod windows_impl {
    use windows::Win32::{
        Foundation::{LPARAM, WPARAM},
        UI::{
            Input::KeyboardAndMouse::{
                GetAsyncKeyState, INPUT, INPUT_0, INPUT_KEYBOARD, KEYBDINPUT, KEYEVENTF_KEYUP,
                SendInput, VIRTUAL_KEY, VK_CONTROL,
            },
            WindowsAndMessaging::{
                KBDLLHOOKSTRUCT, LLKHF_ALTDOWN, LLKHF_INJECTED, LLKHF_UP, WM_KEYDOWN, WM_KEYUP,
                WM_SYSKEYDOWN, WM_SYSKEYUP,
            },
        },
    };

    use super::{KeyEvent, Modifiers};

    /// Builds a [`KeyEvent`] from the parameters of a low-level keyboard hook procedure.
    ///
    /// # Safety
    /// `l_param` must be a valid pointer to a `KBDLLHOOKSTRUCT`.
    pub(crate) unsafe fn from_hook_params(n_code: i32, w_param: WPARAM, l_param: LPARAM) -> KeyEvent {
        let kbd = unsafe { *(l_param.0 as *const KBDLLHOOKSTRUCT) };
        let is_key_up = match w_param.0 as u32 {
            WM_KEYUP | WM_SYSKEYUP => true,
            WM_KEYDOWN | WM_SYSKEYDOWN => false,
            _ => kbd.flags.0 & LLKHF_UP.0 != 0,
        };
        let ctrl = unsafe { GetAsyncKeyState(VK_CONTROL.0 as i32) } < 0;

        KeyEvent {
            virtual_key: kbd.vkCode as u16,
            scan_code: kbd.scanCode,
            is_key_up,
            hook_code: n_code,
            injected: kbd.flags.0 & LLKHF_INJECTED.0 != 0,
            modifiers: Modifiers {
                alt: kbd.flags.0 & LLKHF_ALTDOWN.0 != 0,
                ctrl,
            },
        }
    }

    /// Sends a key-up event for the specified virtual key code through `SendInput`.
    pub(crate) fn send_keyup(virtual_key: u16) -> std::io::Result<()> {
        let inputs = [INPUT {
            r#type: INPUT_KEYBOARD,
            Anonymous: INPUT_0 {
                ki: KEYBDINPUT {
                    wVk: VIRTUAL_KEY(virtual_key),
                    dwFlags: KEYEVENTF_KEYUP,
                    ..Default::default()
                },
            },
        }];

        let sent = unsafe { SendInput(&inputs, std::mem::size_of::<INPUT>() as i32) };
        if sent as usize != inputs.len() {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

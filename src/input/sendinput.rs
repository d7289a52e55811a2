//! Hardware-level input simulation through SendInput.
//!
//! The game reads input through RawInput, so window messages are ignored;
//! SendInput with scan codes is what it reacts to. Mouse events move the real
//! cursor, and the window must be in the foreground.

use anyhow::{Result, anyhow};
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use windows::Win32::Foundation::POINT;
use windows::Win32::Graphics::Gdi::ClientToScreen;
use windows::Win32::UI::Input::KeyboardAndMouse::{
    INPUT, INPUT_0, INPUT_KEYBOARD, INPUT_MOUSE, KEYBD_EVENT_FLAGS, KEYBDINPUT,
    KEYEVENTF_KEYUP, KEYEVENTF_SCANCODE, MAPVK_VK_TO_VSC, MOUSE_EVENT_FLAGS,
    MOUSEEVENTF_ABSOLUTE, MOUSEEVENTF_LEFTDOWN, MOUSEEVENTF_LEFTUP, MOUSEEVENTF_MOVE, MOUSEINPUT,
    MapVirtualKeyW, SendInput, VIRTUAL_KEY, VK_ESCAPE, VK_MENU, VkKeyScanW,
};
use windows::Win32::UI::WindowsAndMessaging::{
    GetSystemMetrics, SM_CXSCREEN, SM_CYSCREEN, SetForegroundWindow,
};

use super::{ClickOptions, InputDevice, Key};
use crate::capture::WindowHandle;

pub struct SendInputDevice {
    window: WindowHandle,
    held: Mutex<HashSet<Key>>,
    /// Serialises multi-step sequences against each other.
    operation: Mutex<()>,
}

impl SendInputDevice {
    pub fn new(window: WindowHandle) -> Self {
        Self {
            window,
            held: Mutex::new(HashSet::new()),
            operation: Mutex::new(()),
        }
    }

    /// Brings the game window to the foreground so it receives input.
    pub fn focus(&self) {
        unsafe {
            let _ = SetForegroundWindow(self.window.hwnd());
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    fn held(&self) -> Result<std::sync::MutexGuard<'_, HashSet<Key>>> {
        self.held
            .lock()
            .map_err(|_| anyhow!("held key set poisoned"))
    }
}

fn virtual_key(key: Key) -> Result<VIRTUAL_KEY> {
    match key {
        Key::Alt => Ok(VK_MENU),
        Key::Escape => Ok(VK_ESCAPE),
        Key::Char(c) => {
            let scan = unsafe { VkKeyScanW(c as u16) };
            if scan == -1 {
                return Err(anyhow!("no virtual key for {:?}", c));
            }
            Ok(VIRTUAL_KEY((scan as u16) & 0xff))
        }
    }
}

fn send(inputs: &[INPUT]) -> Result<()> {
    let sent = unsafe { SendInput(inputs, std::mem::size_of::<INPUT>() as i32) };
    if sent as usize != inputs.len() {
        return Err(anyhow!(
            "SendInput sent {} of {} events",
            sent,
            inputs.len()
        ));
    }
    Ok(())
}

fn key_event(key: Key, up: bool) -> Result<()> {
    let vk = virtual_key(key)?;
    let scan = unsafe { MapVirtualKeyW(vk.0 as u32, MAPVK_VK_TO_VSC) } as u16;
    let mut flags: KEYBD_EVENT_FLAGS = KEYEVENTF_SCANCODE;
    if up {
        flags |= KEYEVENTF_KEYUP;
    }
    let input = INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: vk,
                wScan: scan,
                dwFlags: flags,
                ..Default::default()
            },
        },
    };
    send(&[input])
}

fn mouse_event(norm_x: i32, norm_y: i32, flags: MOUSE_EVENT_FLAGS) -> Result<()> {
    let input = INPUT {
        r#type: INPUT_MOUSE,
        Anonymous: INPUT_0 {
            mi: MOUSEINPUT {
                dx: norm_x,
                dy: norm_y,
                dwFlags: flags | MOUSEEVENTF_ABSOLUTE | MOUSEEVENTF_MOVE,
                ..Default::default()
            },
        },
    };
    send(&[input])
}

impl InputDevice for SendInputDevice {
    fn key_down(&self, key: Key) -> Result<()> {
        key_event(key, false)?;
        self.held()?.insert(key);
        tracing::trace!(%key, "key down");
        Ok(())
    }

    fn key_up(&self, key: Key) -> Result<()> {
        if !self.held()?.remove(&key) {
            return Ok(());
        }
        tracing::trace!(%key, "key up");
        key_event(key, true)
    }

    fn click(&self, x: i32, y: i32, opts: ClickOptions) -> Result<()> {
        let mut screen_point = POINT { x, y };
        unsafe {
            if !ClientToScreen(self.window.hwnd(), &mut screen_point).as_bool() {
                return Err(anyhow!("ClientToScreen failed"));
            }
        }

        let screen_width = unsafe { GetSystemMetrics(SM_CXSCREEN) };
        let screen_height = unsafe { GetSystemMetrics(SM_CYSCREEN) };
        if screen_width <= 0 || screen_height <= 0 {
            return Err(anyhow!("invalid screen metrics"));
        }

        // Normalize to 0-65535 range (required by MOUSEEVENTF_ABSOLUTE)
        let norm_x = ((screen_point.x as i64 * 65535) / screen_width as i64) as i32;
        let norm_y = ((screen_point.y as i64 * 65535) / screen_height as i64) as i32;

        tracing::debug!(x, y, screen_x = screen_point.x, screen_y = screen_point.y, "click");

        mouse_event(norm_x, norm_y, MOUSE_EVENT_FLAGS(0))?;
        std::thread::sleep(Duration::from_millis(50));
        mouse_event(norm_x, norm_y, MOUSEEVENTF_LEFTDOWN)?;
        std::thread::sleep(opts.down_time);
        mouse_event(norm_x, norm_y, MOUSEEVENTF_LEFTUP)
    }

    fn exclusive_operate(&self, action: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        let _lock = self
            .operation
            .lock()
            .map_err(|_| anyhow!("input operation lock poisoned"))?;
        action()
    }

    fn release_all(&self) -> Result<()> {
        let keys: Vec<Key> = self.held()?.drain().collect();
        let mut first_err = None;
        for key in keys {
            if let Err(e) = key_event(key, true) {
                tracing::warn!(%key, error = %e, "failed to release key");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

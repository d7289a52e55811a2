//! Keyboard and mouse actuation.
//!
//! The control loop drives an `InputDevice`. Held keys are wrapped in
//! `HeldKey` guards so they are released on every exit path, including
//! cancellation and panics unwinding through a phase.

#[cfg(windows)]
pub mod sendinput;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::control::cancel::CancelToken;

/// A key the engine presses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Key {
    /// Printable key, stored lowercase.
    Char(char),
    Alt,
    Escape,
}

impl FromStr for Key {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_lowercase();
        match lower.as_str() {
            "alt" => return Ok(Key::Alt),
            "esc" | "escape" => return Ok(Key::Escape),
            _ => {}
        }
        let mut chars = lower.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if !c.is_whitespace() => Ok(Key::Char(c)),
            _ => bail!("unknown key {:?}", s),
        }
    }
}

impl TryFrom<String> for Key {
    type Error = anyhow::Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.to_string()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Char(c) => write!(f, "{}", c),
            Key::Alt => write!(f, "alt"),
            Key::Escape => write!(f, "esc"),
        }
    }
}

/// Movement direction relative to the camera.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Back,
    Left,
    Right,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    Horizontal,
    Vertical,
}

impl Direction {
    pub fn axis(self) -> Axis {
        match self {
            Direction::Forward | Direction::Back => Axis::Vertical,
            Direction::Left | Direction::Right => Axis::Horizontal,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyBindings {
    pub forward: Key,
    pub back: Key,
    pub left: Key,
    pub right: Key,
    pub interact: Key,
    pub map: Key,
    /// Skill triggered right after entering the arena.
    pub source: Key,
    /// Held to free the cursor for UI clicks.
    pub mouse_mode: Key,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            forward: Key::Char('w'),
            back: Key::Char('s'),
            left: Key::Char('a'),
            right: Key::Char('d'),
            interact: Key::Char('f'),
            map: Key::Char('m'),
            source: Key::Char('x'),
            mouse_mode: Key::Alt,
        }
    }
}

impl KeyBindings {
    pub fn direction(&self, direction: Direction) -> Key {
        match direction {
            Direction::Forward => self.forward,
            Direction::Back => self.back,
            Direction::Left => self.left,
            Direction::Right => self.right,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClickOptions {
    /// Time between button down and up.
    pub down_time: Duration,
}

impl Default for ClickOptions {
    fn default() -> Self {
        Self {
            down_time: Duration::from_millis(50),
        }
    }
}

/// What the control loop needs from the input layer.
///
/// Coordinates are client-area pixels of the game window.
pub trait InputDevice: Send + Sync {
    fn key_down(&self, key: Key) -> Result<()>;

    /// Releasing a key that is not held is a no-op.
    fn key_up(&self, key: Key) -> Result<()>;

    fn click(&self, x: i32, y: i32, opts: ClickOptions) -> Result<()>;

    /// Runs `action` with exclusive use of the device.
    fn exclusive_operate(&self, action: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        action()
    }

    /// Releases every key this device still holds.
    fn release_all(&self) -> Result<()>;
}

/// A pressed key, released when dropped.
pub struct HeldKey<'a> {
    device: &'a dyn InputDevice,
    key: Key,
    held: bool,
}

impl<'a> HeldKey<'a> {
    pub fn press(device: &'a dyn InputDevice, key: Key) -> Result<Self> {
        device.key_down(key)?;
        Ok(Self {
            device,
            key,
            held: true,
        })
    }

    /// Releases now and reports the result.
    pub fn release(mut self) -> Result<()> {
        self.held = false;
        self.device.key_up(self.key)
    }
}

impl Drop for HeldKey<'_> {
    fn drop(&mut self) {
        if self.held {
            if let Err(e) = self.device.key_up(self.key) {
                tracing::warn!(key = %self.key, error = %e, "failed to release key");
            }
        }
    }
}

/// Holds `keys` together for `duration`, then releases them in reverse order.
pub fn hold_keys(
    device: &dyn InputDevice,
    cancel: &CancelToken,
    keys: &[Key],
    duration: Duration,
) -> Result<()> {
    let mut guards = Vec::with_capacity(keys.len());
    for key in keys {
        guards.push(HeldKey::press(device, *key)?);
    }
    cancel.sleep(duration)?;
    while let Some(guard) = guards.pop() {
        guard.release()?;
    }
    Ok(())
}

/// Holds a single key for `duration`.
pub fn tap(
    device: &dyn InputDevice,
    cancel: &CancelToken,
    key: Key,
    duration: Duration,
) -> Result<()> {
    hold_keys(device, cancel, &[key], duration)
}

/// Holds movement keys, at most one per axis.
pub fn hold_directions(
    device: &dyn InputDevice,
    cancel: &CancelToken,
    bindings: &KeyBindings,
    directions: &[Direction],
    duration: Duration,
) -> Result<()> {
    for (i, a) in directions.iter().enumerate() {
        if directions[i + 1..].iter().any(|b| b.axis() == a.axis()) {
            bail!("conflicting movement directions {:?}", directions);
        }
    }
    let keys: Vec<Key> = directions.iter().map(|d| bindings.direction(*d)).collect();
    hold_keys(device, cancel, &keys, duration)
}

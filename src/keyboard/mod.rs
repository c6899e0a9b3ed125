// Lava GVM - An emulator for LAV bytecode programs of monochrome handhelds
// Copyright (C) 2026  Marcel Joachim Kloubert <marcel@kloubert.dev>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Keyboard model.
//!
//! The handheld reports keys as small integers below 128. The model keeps a
//! pressed flag per key plus a *last key* latch that a program consumes with
//! `getchar`/`Inkey`. Key events come from a host thread while the
//! interpreter reads on its own thread, so every method takes `&self`.

use parking_lot::{Condvar, Mutex};

/// Number of distinct key codes.
pub const KEY_COUNT: usize = 128;

/// Key codes of the non-character keys.
pub mod keys {
    pub const PAGE_DOWN: i32 = 14;
    pub const CAPS: i32 = 18;
    pub const PAGE_UP: i32 = 19;
    pub const UP: i32 = 20;
    pub const DOWN: i32 = 21;
    pub const RIGHT: i32 = 22;
    pub const LEFT: i32 = 23;
    pub const HELP: i32 = 25;
    pub const SHIFT: i32 = 26;
    pub const ENTER: i32 = 13;
    pub const ESCAPE: i32 = 27;
    pub const F1: i32 = 28;
    pub const F2: i32 = 29;
    pub const F3: i32 = 30;
    pub const F4: i32 = 31;
}

/// Key state as seen by the interpreter.
pub trait KeyboardModel: Send + Sync {
    /// Take the latched key, `0` if none.
    ///
    /// With `wait` the call blocks until a key arrives. A key that stays
    /// pressed is reported once.
    fn get_last_key(&self, wait: bool) -> i32;

    fn is_key_pressed(&self, key: i32) -> bool;

    /// Lowest pressed key, `0` if none.
    fn get_pressed_key(&self) -> i32;

    /// Latch `key` again if it is still held, so the next read repeats it.
    fn revalidate_key(&self, key: i32);

    /// Latch the lowest held key, if any.
    fn revalidate_all_keys(&self);

    /// Forget every pressed key and the latch.
    fn reset(&self) {}
}

#[derive(Debug)]
struct KeyState {
    pressed: [bool; KEY_COUNT],
    last: i32,
}

/// Keyboard fed by [`DefaultKeyboardModel::key_pressed`] and
/// [`DefaultKeyboardModel::key_released`] from the host.
#[derive(Debug)]
pub struct DefaultKeyboardModel {
    state: Mutex<KeyState>,
    key_arrived: Condvar,
}

fn key_index(key: i32) -> Option<usize> {
    usize::try_from(key).ok().filter(|&k| k < KEY_COUNT)
}

impl DefaultKeyboardModel {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(KeyState {
                pressed: [false; KEY_COUNT],
                last: 0,
            }),
            key_arrived: Condvar::new(),
        }
    }

    /// Record a key press and wake a blocked reader.
    pub fn key_pressed(&self, key: i32) {
        let Some(index) = key_index(key) else {
            return;
        };
        let mut state = self.state.lock();
        state.last = key;
        state.pressed[index] = true;
        self.key_arrived.notify_all();
    }

    /// Record a key release. Clears the latch if it still holds this key.
    pub fn key_released(&self, key: i32) {
        let Some(index) = key_index(key) else {
            return;
        };
        let mut state = self.state.lock();
        if state.last == key {
            state.last = 0;
        }
        state.pressed[index] = false;
    }
}

impl Default for DefaultKeyboardModel {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyboardModel for DefaultKeyboardModel {
    fn get_last_key(&self, wait: bool) -> i32 {
        let mut state = self.state.lock();
        if wait {
            while state.last == 0 {
                self.key_arrived.wait(&mut state);
            }
        }
        std::mem::take(&mut state.last)
    }

    fn is_key_pressed(&self, key: i32) -> bool {
        key_index(key).is_some_and(|i| self.state.lock().pressed[i])
    }

    fn get_pressed_key(&self) -> i32 {
        let state = self.state.lock();
        (1..KEY_COUNT)
            .find(|&i| state.pressed[i])
            .map_or(0, |i| i as i32)
    }

    fn revalidate_key(&self, key: i32) {
        let Some(index) = key_index(key) else {
            return;
        };
        let mut state = self.state.lock();
        if state.pressed[index] {
            state.last = key;
        }
    }

    fn revalidate_all_keys(&self) {
        let mut state = self.state.lock();
        // key 0 would read as "no key"
        if let Some(i) = (1..KEY_COUNT).find(|&i| state.pressed[i]) {
            state.last = i as i32;
        }
    }

    fn reset(&self) {
        let mut state = self.state.lock();
        state.pressed = [false; KEY_COUNT];
        state.last = 0;
    }
}

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

//! Models that record every call as a line of text.
//!
//! Used by tests to check what the interpreter asked the screen, text grid
//! and keyboard to do, and by the command line host to feed scripted keys.

use crate::keyboard::KeyboardModel;
use crate::memory::{ReadableMemory, WritableMemory};
use crate::screen::{
    BlitMode, MirrorDirection, ScreenModel, ScrollDirection, ShapeDrawMode, Target, HEIGHT, WIDTH,
};
use crate::text::{TextMode, TextModel};
use encoding_rs::GBK;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Shared, append-only list of recorded calls.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    /// Copy of everything recorded so far.
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

fn gb_text(bytes: &[u8]) -> String {
    GBK.decode_without_bom_handling(bytes).0.into_owned()
}

fn fill_str(fill: bool) -> &'static str {
    if fill {
        "fill"
    } else {
        "no-fill"
    }
}

fn blit_str(blit: BlitMode) -> String {
    format!(
        "{}, {}, {}",
        blit.mode.name(),
        if blit.horizontal_mirror { "mirror" } else { "no-mirror" },
        if blit.inverse { "invert" } else { "no-invert" },
    )
}

/// Screen that draws nothing and logs every operation.
#[derive(Debug)]
pub struct RecordingScreenModel {
    log: CallLog,
    target: Target,
}

impl RecordingScreenModel {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            target: Target::Graphics,
        }
    }
}

impl ScreenModel for RecordingScreenModel {
    fn target(&self) -> Target {
        self.target
    }

    fn set_target(&mut self, target: Target) {
        self.target = target;
    }

    fn clear(&mut self) {
        self.log.push(format!("[clear {}]", self.target.name()));
    }

    fn draw_data(
        &mut self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        _mem: &dyn ReadableMemory,
        addr: usize,
        blit: BlitMode,
    ) {
        self.log.push(format!(
            "[write block {x}, {y}, {width}, {height}, 0x{addr:x}, {}, {}]",
            self.target.name(),
            blit_str(blit)
        ));
    }

    fn save_data(
        &mut self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        _mem: &dyn WritableMemory,
        addr: usize,
    ) {
        self.log.push(format!(
            "[get block {x}, {y}, {width}, {height}, {}, 0x{addr:x}]",
            self.target.name()
        ));
    }

    fn draw_string(
        &mut self,
        x: i32,
        y: i32,
        mem: &dyn ReadableMemory,
        addr: usize,
        len: usize,
        font: TextMode,
        blit: BlitMode,
    ) {
        let bytes: Vec<u8> = (addr..addr + len).map(|a| mem.get_byte(a)).collect();
        let font = match font {
            TextMode::Large => "large",
            TextMode::Small => "small",
        };
        self.log.push(format!(
            "[text out {x}, {y}, {}, {font}, {}, {}]",
            gb_text(&bytes),
            self.target.name(),
            blit_str(blit)
        ));
    }

    fn draw_rect(&mut self, x1: i32, y1: i32, x2: i32, y2: i32, fill: bool, mode: ShapeDrawMode) {
        self.log.push(format!(
            "[draw rect {x1}, {y1}, {x2}, {y2}, {}, {}, {}]",
            fill_str(fill),
            self.target.name(),
            mode.name()
        ));
    }

    fn draw_line(&mut self, x1: i32, y1: i32, x2: i32, y2: i32, mode: ShapeDrawMode) {
        self.log.push(format!(
            "[draw line {x1}, {y1}, {x2}, {y2}, {}, {}]",
            self.target.name(),
            mode.name()
        ));
    }

    fn draw_oval(&mut self, cx: i32, cy: i32, a: i32, b: i32, fill: bool, mode: ShapeDrawMode) {
        self.log.push(format!(
            "[draw oval {cx}, {cy}, {a}, {b}, {}, {}, {}]",
            fill_str(fill),
            self.target.name(),
            mode.name()
        ));
    }

    fn draw_point(&mut self, x: i32, y: i32, mode: ShapeDrawMode) {
        self.log.push(format!(
            "[draw point {x}, {y}, {}, {}]",
            self.target.name(),
            mode.name()
        ));
    }

    fn scroll(&mut self, dir: ScrollDirection) {
        let dir = match dir {
            ScrollDirection::Left => "left",
            ScrollDirection::Right => "right",
        };
        self.log
            .push(format!("[scroll {dir}, {}]", self.target.name()));
    }

    fn mirror(&mut self, dir: MirrorDirection) {
        let dir = match dir {
            MirrorDirection::Horizontal => "horizontal",
            MirrorDirection::Vertical => "vertical",
        };
        self.log
            .push(format!("[mirror {dir}, {}]", self.target.name()));
    }

    /// `0` for points on screen, `1` otherwise.
    fn test_point(&mut self, x: i32, y: i32) -> i32 {
        self.log
            .push(format!("[test point {x}, {y}, {}]", self.target.name()));
        let on_screen = (0..WIDTH).contains(&x) && (0..HEIGHT).contains(&y);
        i32::from(!on_screen)
    }

    fn render_buffer_to_graphics(&mut self) {
        self.log.push("[refresh]");
    }
}

/// Text grid that keeps only the font mode and logs every call.
#[derive(Debug)]
pub struct RecordingTextModel {
    log: CallLog,
    mode: TextMode,
}

impl RecordingTextModel {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            mode: TextMode::Large,
        }
    }
}

impl TextModel for RecordingTextModel {
    fn text_mode(&self) -> TextMode {
        self.log.push("[get text mode]");
        self.mode
    }

    fn set_text_mode(&mut self, mode: TextMode) {
        self.log.push(format!("[set text mode to {mode:?}]"));
        self.mode = mode;
    }

    fn reset(&mut self) {}

    fn add_byte(&mut self, byte: u8) {
        self.log.push(format!("[add byte {}]", byte as char));
    }

    fn add_bytes(&mut self, bytes: &[u8]) {
        self.log.push(format!("[add bytes ({})]", gb_text(bytes)));
    }

    fn set_location(&mut self, row: i32, column: i32) {
        self.log
            .push(format!("[locate to (x: {column}, y: {row})]"));
    }

    fn render_to_screen(&mut self, _screen: &mut dyn ScreenModel, row_mask: i32) {
        self.log
            .push(format!("[render text to screen: 0b{row_mask:b}]"));
    }
}

/// Keyboard replaying a fixed list of keys.
///
/// Blocking reads take the next key of the script, or `0` once it is used
/// up. Nothing is ever held down.
#[derive(Debug)]
pub struct ScriptedKeyboardModel {
    keys: Mutex<VecDeque<i32>>,
    log: CallLog,
}

impl ScriptedKeyboardModel {
    pub fn new(keys: impl IntoIterator<Item = i32>, log: CallLog) -> Self {
        Self {
            keys: Mutex::new(keys.into_iter().collect()),
            log,
        }
    }

    /// Keys not read yet.
    pub fn remaining(&self) -> usize {
        self.keys.lock().len()
    }
}

impl KeyboardModel for ScriptedKeyboardModel {
    fn get_last_key(&self, wait: bool) -> i32 {
        if !wait {
            return 0;
        }
        let key = self.keys.lock().pop_front().unwrap_or(0);
        self.log.push(format!("[get key true: {key}]"));
        key
    }

    fn is_key_pressed(&self, _key: i32) -> bool {
        self.log.push("[is key pressed]");
        false
    }

    fn get_pressed_key(&self) -> i32 {
        self.log.push("[get pressed key]");
        0
    }

    fn revalidate_key(&self, key: i32) {
        self.log.push(format!("[revalidate key {key}]"));
    }

    fn revalidate_all_keys(&self) {
        self.log.push("[revalidate all keys]");
    }
}

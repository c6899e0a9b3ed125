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

//! The RAM backed text grid.

use super::{TextMode, TextModel, SMALL_FONT_HEIGHT, SMALL_FONT_ROW_HEIGHT};
use crate::memory::{RamModel, RamSegment, WritableMemory};
use crate::screen::{BlitMode, DataDrawMode, ScreenModel, ShapeDrawMode, Target, HEIGHT, WIDTH};

/// Text model storing its cells in a RAM segment.
pub struct DefaultTextModel {
    grid: RamSegment,
    mode: TextMode,
    row: usize,
    column: usize,
}

impl DefaultTextModel {
    pub fn new(grid: RamSegment) -> Self {
        Self {
            grid,
            mode: TextMode::Large,
            row: 0,
            column: 0,
        }
    }

    /// Cursor as `(row, column)`.
    pub fn cursor(&self) -> (usize, usize) {
        (self.row, self.column)
    }

    fn rows(&self) -> usize {
        self.mode.rows()
    }

    fn columns(&self) -> usize {
        self.mode.columns()
    }

    fn scroll_up(&mut self) {
        let (rows, columns) = (self.rows(), self.columns());
        self.grid.copy(0, columns, (rows - 1) * columns);
        self.grid.fill((rows - 1) * columns, columns, b' ');
        self.row = rows - 1;
        self.column = 0;
    }

    fn clear_small_font_margins(screen: &mut dyn ScreenModel) {
        let (right, bottom) = (WIDTH - 1, HEIGHT - 1);
        screen.draw_line(0, 0, right, 0, ShapeDrawMode::Clear);
        screen.draw_line(0, bottom, right, bottom, ShapeDrawMode::Clear);
        screen.draw_rect(0, 0, 1, bottom, true, ShapeDrawMode::Clear);
        screen.draw_rect(WIDTH - 2, 0, right, bottom, true, ShapeDrawMode::Clear);

        let gaps = (SMALL_FONT_HEIGHT as i32 + 1..HEIGHT).step_by(SMALL_FONT_ROW_HEIGHT);
        for y in gaps {
            screen.draw_line(0, y, right, y, ShapeDrawMode::Clear);
        }
    }
}

impl TextModel for DefaultTextModel {
    fn text_mode(&self) -> TextMode {
        self.mode
    }

    fn set_text_mode(&mut self, mode: TextMode) {
        self.mode = mode;
        self.row = 0;
        self.column = 0;
    }

    fn reset(&mut self) {
        self.row = 0;
        self.column = 0;
        self.grid.zero();
    }

    fn add_byte(&mut self, byte: u8) {
        if self.row >= self.rows() {
            self.scroll_up();
        }
        let cell = match byte {
            b'\r' => return,
            b'\n' => {
                self.column = 0;
                self.row += 1;
                if self.row >= self.rows() {
                    self.scroll_up();
                }
                return;
            }
            b'\t' => b' ',
            other => other,
        };
        self.grid
            .set_byte(self.row * self.columns() + self.column, cell);
        self.column += 1;
        if self.column >= self.columns() {
            self.column = 0;
            self.row += 1;
        }
    }

    fn add_bytes(&mut self, bytes: &[u8]) {
        let mut iter = bytes.iter().copied();
        while let Some(b) = iter.next() {
            if b < 0x80 {
                self.add_byte(b);
                continue;
            }
            if self.column == self.columns() - 1 {
                self.add_byte(b' ');
            }
            self.add_byte(b);
            match iter.next() {
                Some(trail) => self.add_byte(trail),
                None => break,
            }
        }
    }

    fn set_location(&mut self, row: i32, column: i32) {
        self.row = row.clamp(0, self.rows() as i32 - 1) as usize;
        self.column = column.clamp(0, self.columns() as i32 - 1) as usize;
    }

    fn render_to_screen(&mut self, screen: &mut dyn ScreenModel, row_mask: i32) {
        screen.set_target(Target::Graphics);

        let (x0, y0) = match self.mode {
            TextMode::Large => (0, 0),
            TextMode::Small => {
                Self::clear_small_font_margins(screen);
                (2, 1)
            }
        };

        let columns = self.columns();
        let row_height = self.mode.row_height() as i32;
        let mut mask = 0x100;
        for i in 0..self.rows() {
            mask >>= 1;
            if mask & row_mask != 0 {
                continue;
            }
            screen.draw_string(
                x0,
                y0 + i as i32 * row_height,
                &self.grid,
                i * columns,
                columns,
                self.mode,
                BlitMode::plain(DataDrawMode::Copy),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Ram, ReadableMemory};
    use crate::recording::{CallLog, RecordingScreenModel};
    use crate::text::TEXT_GRID_SIZE;
    use std::rc::Rc;

    fn grid() -> (Rc<Ram>, DefaultTextModel) {
        let ram = Ram::shared();
        let text = DefaultTextModel::new(ram.segment(0, TEXT_GRID_SIZE));
        (ram, text)
    }

    fn line(ram: &Ram, row: usize, columns: usize) -> Vec<u8> {
        ram.read_range(row * columns, columns)
    }

    #[test]
    fn test_add_byte_advances_and_wraps() {
        let (ram, mut text) = grid();
        for _ in 0..20 {
            text.add_byte(b'x');
        }
        assert_eq!(text.cursor(), (1, 0));
        assert_eq!(line(&ram, 0, 20), vec![b'x'; 20]);
    }

    #[test]
    fn test_control_bytes() {
        let (ram, mut text) = grid();
        text.add_bytes(b"a\tb\r\nc");
        assert_eq!(ram.read_range(0, 3), b"a b".to_vec());
        assert_eq!(ram.get_byte(20), b'c');
        assert_eq!(text.cursor(), (1, 1));
    }

    #[test]
    fn test_sixth_line_scrolls_up() {
        let (ram, mut text) = grid();
        for row in 0..5u8 {
            text.add_byte(b'0' + row);
            text.add_byte(b'\n');
        }
        // the newline after row 4 scrolled once already
        assert_eq!(text.cursor(), (4, 0));
        assert_eq!(ram.get_byte(0), b'1');
        text.add_bytes(b"Z");
        assert_eq!(ram.get_byte(0), b'1');
        assert_eq!(ram.get_byte(60), b'4');
        assert_eq!(ram.get_byte(80), b'Z');
        assert_eq!(ram.get_byte(81), b' ');
    }

    #[test]
    fn test_full_grid_scrolls_on_next_byte() {
        let (ram, mut text) = grid();
        for i in 0..100u8 {
            text.add_byte(b'a' + i / 20);
        }
        assert_eq!(text.cursor(), (5, 0));
        text.add_byte(b'!');
        assert_eq!(line(&ram, 0, 20), vec![b'b'; 20]);
        assert_eq!(ram.get_byte(80), b'!');
        assert_eq!(text.cursor(), (4, 1));
    }

    #[test]
    fn test_gb_pair_never_splits_at_right_edge() {
        let (ram, mut text) = grid();
        text.set_location(0, 19);
        text.add_bytes(&[0xb0, 0xa1]);
        assert_eq!(ram.get_byte(19), b' ');
        assert_eq!(ram.read_range(20, 2), vec![0xb0, 0xa1]);
        assert_eq!(text.cursor(), (1, 2));
    }

    #[test]
    fn test_set_location_clamps() {
        let (_, mut text) = grid();
        text.set_location(-3, 99);
        assert_eq!(text.cursor(), (0, 19));
        text.set_text_mode(TextMode::Small);
        assert_eq!(text.cursor(), (0, 0));
        text.set_location(9, 25);
        assert_eq!(text.cursor(), (5, 25));
    }

    #[test]
    fn test_reset_blanks_grid() {
        let (ram, mut text) = grid();
        text.add_bytes(b"hello");
        text.reset();
        assert_eq!(text.cursor(), (0, 0));
        assert_eq!(ram.read_range(0, TEXT_GRID_SIZE), vec![0; TEXT_GRID_SIZE]);
    }

    #[test]
    fn test_render_skips_masked_rows() {
        let (_, mut text) = grid();
        let log = CallLog::new();
        let mut screen = RecordingScreenModel::new(log.clone());
        text.render_to_screen(&mut screen, 0b1010_0000);
        let draws: Vec<String> = log
            .entries()
            .into_iter()
            .filter(|e| e.starts_with("[text out"))
            .collect();
        assert_eq!(draws.len(), 3);
        assert!(draws[0].starts_with("[text out 0, 16,"));
        assert!(draws[1].starts_with("[text out 0, 48,"));
        assert!(draws[2].starts_with("[text out 0, 64,"));
    }

    #[test]
    fn test_render_small_font_clears_margins() {
        let (_, mut text) = grid();
        text.set_text_mode(TextMode::Small);
        let log = CallLog::new();
        let mut screen = RecordingScreenModel::new(log.clone());
        text.render_to_screen(&mut screen, 0);
        let entries = log.entries();
        let lines = entries.iter().filter(|e| e.starts_with("[draw line")).count();
        let rects = entries.iter().filter(|e| e.starts_with("[draw rect")).count();
        let texts = entries.iter().filter(|e| e.starts_with("[text out")).count();
        // top, bottom and the gaps at 13, 26, 39, 52, 65, 78
        assert_eq!(lines, 8);
        assert_eq!(rects, 2);
        assert_eq!(texts, 6);
        assert!(entries.iter().any(|e| e.starts_with("[text out 2, 66,")));
    }
}

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

//! Text rendering engine.
//!
//! Text output goes to a character grid kept in RAM at the text buffer
//! address. Rendering composites the grid onto the graphics bitmap with the
//! glyphs of a [`FontTable`].

mod font;
mod grid;

pub use font::{FontTable, FONT_FILES};
pub use grid::DefaultTextModel;

use crate::screen::{ScreenModel, HEIGHT, WIDTH};

pub const LARGE_FONT_WIDTH: usize = 8;
pub const LARGE_FONT_HEIGHT: usize = 16;
pub const LARGE_FONT_ROW_HEIGHT: usize = 16;
pub const LARGE_FONT_COLUMNS: usize = WIDTH as usize / LARGE_FONT_WIDTH;
pub const LARGE_FONT_ROWS: usize = HEIGHT as usize / LARGE_FONT_ROW_HEIGHT;

pub const SMALL_FONT_WIDTH: usize = 6;
pub const SMALL_FONT_HEIGHT: usize = 12;
pub const SMALL_FONT_ROW_HEIGHT: usize = 13;
pub const SMALL_FONT_COLUMNS: usize = WIDTH as usize / SMALL_FONT_WIDTH;
pub const SMALL_FONT_ROWS: usize = HEIGHT as usize / SMALL_FONT_ROW_HEIGHT;

/// Bytes of RAM the grid may occupy, enough for either font.
pub const TEXT_GRID_SIZE: usize = SMALL_FONT_ROWS * SMALL_FONT_COLUMNS;

/// Font size of the text grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextMode {
    /// 8x16 glyphs, 20x5 cells.
    #[default]
    Large,
    /// 6x12 glyphs, 26x6 cells.
    Small,
}

impl TextMode {
    /// Width of a half width glyph in pixels.
    pub fn glyph_width(self) -> i32 {
        match self {
            TextMode::Large => LARGE_FONT_WIDTH as i32,
            TextMode::Small => SMALL_FONT_WIDTH as i32,
        }
    }

    pub fn glyph_height(self) -> i32 {
        match self {
            TextMode::Large => LARGE_FONT_HEIGHT as i32,
            TextMode::Small => SMALL_FONT_HEIGHT as i32,
        }
    }

    pub fn row_height(self) -> usize {
        match self {
            TextMode::Large => LARGE_FONT_ROW_HEIGHT,
            TextMode::Small => SMALL_FONT_ROW_HEIGHT,
        }
    }

    pub fn columns(self) -> usize {
        match self {
            TextMode::Large => LARGE_FONT_COLUMNS,
            TextMode::Small => SMALL_FONT_COLUMNS,
        }
    }

    pub fn rows(self) -> usize {
        match self {
            TextMode::Large => LARGE_FONT_ROWS,
            TextMode::Small => SMALL_FONT_ROWS,
        }
    }
}

/// The text grid and its cursor.
pub trait TextModel {
    fn text_mode(&self) -> TextMode;

    /// Switch fonts. Moves the cursor home.
    fn set_text_mode(&mut self, mode: TextMode);

    /// Move the cursor home and blank the grid.
    fn reset(&mut self);

    /// Append one byte at the cursor without rendering.
    ///
    /// `\r` is ignored, `\n` starts a new line and `\t` is written as a
    /// space. Writing past the last row scrolls the grid up.
    fn add_byte(&mut self, byte: u8);

    /// Append bytes without rendering. A two byte GB2312 character never
    /// straddles the right edge.
    fn add_bytes(&mut self, bytes: &[u8]);

    /// Move the cursor, clamping into the grid.
    fn set_location(&mut self, row: i32, column: i32);

    /// Draw the grid onto the graphics bitmap.
    ///
    /// Bit 7 of `row_mask` stands for row 0, bit 6 for row 1 and so on; rows
    /// whose bit is set are skipped.
    fn render_to_screen(&mut self, screen: &mut dyn ScreenModel, row_mask: i32);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_dimensions() {
        assert_eq!((LARGE_FONT_COLUMNS, LARGE_FONT_ROWS), (20, 5));
        assert_eq!((SMALL_FONT_COLUMNS, SMALL_FONT_ROWS), (26, 6));
        assert_eq!(TEXT_GRID_SIZE, 156);
    }

    #[test]
    fn test_text_mode_metrics() {
        assert_eq!(TextMode::default(), TextMode::Large);
        assert_eq!(TextMode::Small.glyph_width(), 6);
        assert_eq!(TextMode::Small.row_height(), 13);
        assert_eq!(TextMode::Large.glyph_height(), 16);
    }
}

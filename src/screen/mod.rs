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

//! Screen and graphics engine.
//!
//! The screen is a 160x80 monochrome bitmap, 20 bytes per row, bit 7 of a
//! byte being the leftmost pixel. There are two such bitmaps in RAM: the
//! visible *graphics* bitmap and an off-screen *buffer*. Drawing goes to
//! whichever one is the current [`Target`].

mod bitmap;

pub use bitmap::DefaultScreenModel;

use crate::error::{Result, VmError};
use crate::memory::{ReadableMemory, WritableMemory};
use crate::text::TextMode;

/// Screen width in pixels.
pub const WIDTH: i32 = 160;
/// Screen height in pixels.
pub const HEIGHT: i32 = 80;
/// Bytes per bitmap row.
pub const BYTE_WIDTH: usize = WIDTH as usize / 8;
/// Bytes per bitmap.
pub const BITMAP_SIZE: usize = BYTE_WIDTH * HEIGHT as usize;

/// Bit of a mode argument selecting the graphics bitmap for blits and
/// the buffer for shapes.
pub const TARGET_FLAG: i32 = 0x40;

/// Which bitmap drawing operations write to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Graphics,
    Buffer,
}

impl Target {
    /// Target of `WriteBlock`, `TextOut`, `Block`, `Rectangle` and `GetBlock`.
    pub fn for_blit(mode: i32) -> Self {
        if mode & TARGET_FLAG != 0 {
            Target::Graphics
        } else {
            Target::Buffer
        }
    }

    /// Target of `Point`, `Line`, `Box`, `Circle` and `Ellipse`.
    pub fn for_shape(mode: i32) -> Self {
        if mode & TARGET_FLAG != 0 {
            Target::Buffer
        } else {
            Target::Graphics
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Target::Graphics => "screen",
            Target::Buffer => "buffer",
        }
    }
}

/// How blitted source bits combine with the bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataDrawMode {
    Copy,
    Not,
    Or,
    And,
    Xor,
}

impl DataDrawMode {
    /// Decode the low three bits of a mode argument. Unknown values copy.
    pub fn from_bits(mode: i32) -> Self {
        match mode & 7 {
            2 => DataDrawMode::Not,
            3 => DataDrawMode::Or,
            4 => DataDrawMode::And,
            5 => DataDrawMode::Xor,
            _ => DataDrawMode::Copy,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DataDrawMode::Copy => "copy",
            DataDrawMode::Not => "not",
            DataDrawMode::Or => "or",
            DataDrawMode::And => "and",
            DataDrawMode::Xor => "xor",
        }
    }
}

/// Full blit mode: combination, mirroring and inversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlitMode {
    pub mode: DataDrawMode,
    /// Accepted for compatibility. Blits are never mirrored.
    pub horizontal_mirror: bool,
    pub inverse: bool,
}

impl BlitMode {
    pub const HORIZONTAL_MIRROR_FLAG: i32 = 0x20;
    pub const INVERSE_FLAG: i32 = 0x08;

    /// Plain combination without flags.
    pub fn plain(mode: DataDrawMode) -> Self {
        Self {
            mode,
            horizontal_mirror: false,
            inverse: false,
        }
    }

    /// Decode a `WriteBlock`/`TextOut` mode argument.
    pub fn from_bits(mode: i32) -> Self {
        Self {
            mode: DataDrawMode::from_bits(mode),
            horizontal_mirror: mode & Self::HORIZONTAL_MIRROR_FLAG != 0,
            inverse: mode & Self::INVERSE_FLAG != 0,
        }
    }
}

/// How shapes change the pixels they cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeDrawMode {
    Clear,
    Normal,
    Invert,
}

impl ShapeDrawMode {
    /// Decode the low two bits of a mode argument. `3` is a fatal error.
    pub fn from_bits(mode: i32) -> Result<Self> {
        match mode & 3 {
            0 => Ok(ShapeDrawMode::Clear),
            1 => Ok(ShapeDrawMode::Normal),
            2 => Ok(ShapeDrawMode::Invert),
            _ => Err(VmError::InvalidShapeMode(mode)),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ShapeDrawMode::Clear => "clear",
            ShapeDrawMode::Normal => "normal",
            ShapeDrawMode::Invert => "invert",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorDirection {
    Horizontal,
    Vertical,
}

/// Drawing operations on the screen bitmaps.
///
/// Coordinates are pixels and may lie partly or fully off screen; every
/// operation clips.
pub trait ScreenModel {
    fn target(&self) -> Target;

    fn set_target(&mut self, target: Target);

    /// Zero the target bitmap.
    fn clear(&mut self);

    /// Blit a `width`x`height` 1-bpp image stored at `addr` in `mem`.
    ///
    /// Image rows are `(width + 7) / 8` bytes long.
    #[allow(clippy::too_many_arguments)]
    fn draw_data(
        &mut self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        mem: &dyn ReadableMemory,
        addr: usize,
        blit: BlitMode,
    );

    /// Copy a byte aligned region of the target bitmap into `mem` at `addr`.
    ///
    /// `width` is rounded down to whole bytes. Parts outside the bitmap read
    /// as zero.
    #[allow(clippy::too_many_arguments)]
    fn save_data(
        &mut self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        mem: &dyn WritableMemory,
        addr: usize,
    );

    /// Draw `len` bytes of text stored at `addr` in `mem`.
    #[allow(clippy::too_many_arguments)]
    fn draw_string(
        &mut self,
        x: i32,
        y: i32,
        mem: &dyn ReadableMemory,
        addr: usize,
        len: usize,
        font: TextMode,
        blit: BlitMode,
    );

    fn draw_rect(&mut self, x1: i32, y1: i32, x2: i32, y2: i32, fill: bool, mode: ShapeDrawMode);

    fn draw_line(&mut self, x1: i32, y1: i32, x2: i32, y2: i32, mode: ShapeDrawMode);

    /// Ellipse centered at `(cx, cy)` with radii `a` and `b`.
    fn draw_oval(&mut self, cx: i32, cy: i32, a: i32, b: i32, fill: bool, mode: ShapeDrawMode);

    fn draw_point(&mut self, x: i32, y: i32, mode: ShapeDrawMode);

    /// Move every row of the target bitmap by one pixel.
    fn scroll(&mut self, dir: ScrollDirection);

    fn mirror(&mut self, dir: MirrorDirection);

    /// Nonzero if the pixel is set in the graphics bitmap.
    fn test_point(&mut self, x: i32, y: i32) -> i32;

    /// Copy the buffer bitmap onto the graphics bitmap.
    fn render_buffer_to_graphics(&mut self);
}

/// Render a bitmap as text, `#` for set pixels and `.` for clear ones.
pub fn bitmap_to_ascii(bitmap: &[u8]) -> String {
    let mut out = String::with_capacity((WIDTH as usize + 1) * HEIGHT as usize);
    for row in bitmap.chunks(BYTE_WIDTH) {
        for byte in row {
            for bit in (0..8).rev() {
                out.push(if byte & (1 << bit) != 0 { '#' } else { '.' });
            }
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0x00, Target::Buffer, Target::Graphics; "flag clear")]
    #[test_case(0x41, Target::Graphics, Target::Buffer; "flag set")]
    fn test_targets_from_mode(mode: i32, blit: Target, shape: Target) {
        assert_eq!(Target::for_blit(mode), blit);
        assert_eq!(Target::for_shape(mode), shape);
    }

    #[test_case(0, DataDrawMode::Copy; "zero copies")]
    #[test_case(1, DataDrawMode::Copy; "copy")]
    #[test_case(2, DataDrawMode::Not; "not")]
    #[test_case(3, DataDrawMode::Or; "or")]
    #[test_case(4, DataDrawMode::And; "and")]
    #[test_case(5, DataDrawMode::Xor; "xor")]
    #[test_case(7, DataDrawMode::Copy; "unknown copies")]
    #[test_case(0x4b, DataDrawMode::Or; "flags ignored")]
    fn test_data_draw_mode(bits: i32, expected: DataDrawMode) {
        assert_eq!(DataDrawMode::from_bits(bits), expected);
    }

    #[test]
    fn test_blit_mode_flags() {
        let blit = BlitMode::from_bits(0x2d);
        assert_eq!(blit.mode, DataDrawMode::Xor);
        assert!(blit.horizontal_mirror);
        assert!(blit.inverse);
    }

    #[test]
    fn test_shape_draw_mode() {
        assert_eq!(ShapeDrawMode::from_bits(0x40), Ok(ShapeDrawMode::Clear));
        assert_eq!(ShapeDrawMode::from_bits(1), Ok(ShapeDrawMode::Normal));
        assert_eq!(ShapeDrawMode::from_bits(6), Ok(ShapeDrawMode::Invert));
        assert_eq!(
            ShapeDrawMode::from_bits(3),
            Err(VmError::InvalidShapeMode(3))
        );
    }

    #[test]
    fn test_bitmap_to_ascii() {
        let mut bitmap = vec![0u8; BITMAP_SIZE];
        bitmap[0] = 0x81;
        let ascii = bitmap_to_ascii(&bitmap);
        let first = ascii.lines().next().unwrap();
        assert!(first.starts_with("#......#."));
        assert_eq!(ascii.lines().count(), HEIGHT as usize);
    }
}

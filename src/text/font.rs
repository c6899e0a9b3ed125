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

//! Bitmap fonts for text output.
//!
//! All four fonts live in one byte table so a glyph is addressed by a single
//! offset, the same way the screen blits from RAM. The table starts with an
//! all-zero glyph that unknown GB2312 codes resolve to.

use std::fs;
use std::io;
use std::path::Path;

use super::{TextMode, LARGE_FONT_HEIGHT, LARGE_FONT_WIDTH, SMALL_FONT_HEIGHT, SMALL_FONT_WIDTH};
use crate::memory::ReadableMemory;

const LARGE_ASCII_BYTES: usize = (LARGE_FONT_WIDTH + 7) / 8 * LARGE_FONT_HEIGHT;
const LARGE_GB_BYTES: usize = (LARGE_FONT_WIDTH * 2 + 7) / 8 * LARGE_FONT_HEIGHT;
const SMALL_ASCII_BYTES: usize = (SMALL_FONT_WIDTH + 7) / 8 * SMALL_FONT_HEIGHT;
const SMALL_GB_BYTES: usize = (SMALL_FONT_WIDTH * 2 + 7) / 8 * SMALL_FONT_HEIGHT;

/// File names looked up by [`FontTable::load_dir`], in table order.
pub const FONT_FILES: [&str; 4] = ["ascii8.bin", "ascii6.bin", "gbfont16.bin", "gbfont12.bin"];

/// Concatenated glyph data of the 8x16, 6x12, GB 16x16 and GB 12x12 fonts.
#[derive(Debug, Clone)]
pub struct FontTable {
    data: Vec<u8>,
    ascii8: usize,
    ascii6: usize,
    gb16: usize,
    gb12: usize,
}

impl FontTable {
    /// Build the table from the four raw font images.
    pub fn from_blobs(ascii8: &[u8], ascii6: &[u8], gb16: &[u8], gb12: &[u8]) -> Self {
        let mut data = vec![0; LARGE_GB_BYTES];
        let ascii8_offset = data.len();
        data.extend_from_slice(ascii8);
        let ascii6_offset = data.len();
        data.extend_from_slice(ascii6);
        let gb16_offset = data.len();
        data.extend_from_slice(gb16);
        let gb12_offset = data.len();
        data.extend_from_slice(gb12);

        Self {
            data,
            ascii8: ascii8_offset,
            ascii6: ascii6_offset,
            gb16: gb16_offset,
            gb12: gb12_offset,
        }
    }

    /// A table without glyphs. Every character renders blank.
    pub fn blank() -> Self {
        Self::from_blobs(&[], &[], &[], &[])
    }

    /// Load the fonts from `dir`.
    pub fn load_dir(dir: &Path) -> io::Result<Self> {
        let [ascii8, ascii6, gb16, gb12] = FONT_FILES;
        Ok(Self::from_blobs(
            &fs::read(dir.join(ascii8))?,
            &fs::read(dir.join(ascii6))?,
            &fs::read(dir.join(gb16))?,
            &fs::read(dir.join(gb12))?,
        ))
    }

    /// Load the fonts from `dir` if given, falling back to [`FontTable::blank`].
    pub fn load_or_blank(dir: Option<&Path>) -> Self {
        let Some(dir) = dir else {
            tracing::warn!("no font directory configured, text renders blank");
            return Self::blank();
        };
        match Self::load_dir(dir) {
            Ok(table) => {
                tracing::info!(dir = %dir.display(), "fonts loaded");
                table
            }
            Err(err) => {
                tracing::warn!(dir = %dir.display(), %err, "cannot load fonts, text renders blank");
                Self::blank()
            }
        }
    }

    /// Offset of the glyph for `ch` in this table.
    ///
    /// Codes up to `0xff` are half width. Larger codes are GB2312 pairs with
    /// the lead byte in bits 0..8 and the trail byte in bits 8..16. Codes
    /// without a glyph resolve to the blank glyph at offset 0.
    pub fn glyph_offset(&self, ch: u16, mode: TextMode) -> usize {
        match mode {
            TextMode::Large => self.offset_in(
                ch,
                self.ascii8,
                LARGE_ASCII_BYTES,
                self.gb16,
                self.gb12 - self.gb16,
                LARGE_GB_BYTES,
            ),
            TextMode::Small => self.offset_in(
                ch,
                self.ascii6,
                SMALL_ASCII_BYTES,
                self.gb12,
                self.data.len() - self.gb12,
                SMALL_GB_BYTES,
            ),
        }
    }

    fn offset_in(
        &self,
        ch: u16,
        ascii_offset: usize,
        ascii_bytes: usize,
        gb_offset: usize,
        gb_size: usize,
        gb_bytes: usize,
    ) -> usize {
        if ch <= 0xff {
            return ascii_offset + ch as usize * ascii_bytes;
        }
        let mut lead = (ch & 0xff) as i32 - 0xa1;
        if lead > 8 {
            lead -= 6;
        }
        let trail = (ch >> 8) as i32 - 0xa1;
        let offset = (lead * 94 + trail) * gb_bytes as i32;
        if offset >= 0 && (offset as usize) < gb_size {
            gb_offset + offset as usize
        } else {
            0
        }
    }
}

impl Default for FontTable {
    fn default() -> Self {
        Self::blank()
    }
}

impl ReadableMemory for FontTable {
    fn get_byte(&self, offset: usize) -> u8 {
        self.data.get(offset).copied().unwrap_or(0)
    }

    fn size(&self) -> usize {
        self.data.len()
    }
}

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

//! The bitmap backed screen model.

use std::rc::Rc;

use super::{
    BlitMode, DataDrawMode, MirrorDirection, ScreenModel, ScrollDirection, ShapeDrawMode, Target,
    BITMAP_SIZE, BYTE_WIDTH, HEIGHT, WIDTH,
};
use crate::memory::{RamSegment, ReadableMemory, WritableMemory};
use crate::text::{FontTable, TextMode};

const HIGHER_BITS: [u8; 8] = [0x00, 0x80, 0xc0, 0xe0, 0xf0, 0xf8, 0xfc, 0xfe];
const LOWER_BITS: [u8; 8] = [0x00, 0x01, 0x03, 0x07, 0x0f, 0x1f, 0x3f, 0x7f];

fn bit_mask(x: i32) -> u8 {
    0x80 >> (x & 7)
}

/// Shift `buf` as one big-endian bit string: left for positive `n_bits`,
/// right for negative ones. `n_bits` is in `-7..=7`.
fn shift_bits(buf: &mut [u8], n_bits: i32) {
    if n_bits > 0 {
        let n = n_bits as u32;
        let mut carry = 0;
        for b in buf.iter_mut().rev() {
            let old = *b;
            *b = (old << n) | carry;
            carry = (old & HIGHER_BITS[n as usize]) >> (8 - n);
        }
    } else if n_bits < 0 {
        let n = n_bits.unsigned_abs();
        let mut carry = 0;
        for b in buf.iter_mut() {
            let old = *b;
            *b = (old >> n) | carry;
            carry = (old & LOWER_BITS[n as usize]) << (8 - n);
        }
    }
}

fn combine(src: u8, dest: u8, blit: BlitMode) -> u8 {
    let (src, mode) = if blit.inverse {
        let mode = match blit.mode {
            DataDrawMode::Not => DataDrawMode::Copy,
            other => other,
        };
        (!src, mode)
    } else {
        (src, blit.mode)
    };
    match mode {
        DataDrawMode::Copy => src,
        DataDrawMode::Not => !src,
        DataDrawMode::Or => src | dest,
        DataDrawMode::And => src & dest,
        DataDrawMode::Xor => src ^ dest,
    }
}

/// Screen model drawing into the graphics and buffer segments of RAM.
pub struct DefaultScreenModel {
    graphics: RamSegment,
    buffer: RamSegment,
    target: Target,
    font: Rc<FontTable>,
}

impl DefaultScreenModel {
    pub fn new(graphics: RamSegment, buffer: RamSegment, font: Rc<FontTable>) -> Self {
        Self {
            graphics,
            buffer,
            target: Target::Graphics,
            font,
        }
    }

    fn active(&self) -> &RamSegment {
        match self.target {
            Target::Graphics => &self.graphics,
            Target::Buffer => &self.buffer,
        }
    }

    /// Unchecked: `(x, y)` must lie on the screen.
    fn point(&self, x: i32, y: i32, mode: ShapeDrawMode) {
        let offset = y as usize * BYTE_WIDTH + (x as usize >> 3);
        let active = self.active();
        let b = active.get_byte(offset);
        let m = bit_mask(x);
        active.set_byte(
            offset,
            match mode {
                ShapeDrawMode::Clear => b & !m,
                ShapeDrawMode::Normal => b | m,
                ShapeDrawMode::Invert => b ^ m,
            },
        );
    }

    fn checked_point(&self, x: i64, y: i64, mode: ShapeDrawMode) {
        if (0..WIDTH as i64).contains(&x) && (0..HEIGHT as i64).contains(&y) {
            self.point(x as i32, y as i32, mode);
        }
    }

    fn h_line(&self, x1: i32, x2: i32, y: i32, mode: ShapeDrawMode) {
        for x in x1..=x2 {
            self.point(x, y, mode);
        }
    }

    fn v_line(&self, x: i32, y1: i32, y2: i32, mode: ShapeDrawMode) {
        for y in y1..=y2 {
            self.point(x, y, mode);
        }
    }

    /// Horizontal span that may extend past the screen.
    fn oval_h_line(&self, x1: i64, x2: i64, y: i64, mode: ShapeDrawMode) {
        if (0..HEIGHT as i64).contains(&y) && x2 >= 0 && x1 < WIDTH as i64 {
            let x1 = x1.max(0) as i32;
            let x2 = x2.min(WIDTH as i64 - 1) as i32;
            self.h_line(x1, x2, y as i32, mode);
        }
    }

    fn oval_points(&self, cx: i64, cy: i64, x: i64, y: i64, mode: ShapeDrawMode) {
        self.checked_point(cx - x, cy - y, mode);
        self.checked_point(cx - x, cy + y, mode);
        self.checked_point(cx + x, cy - y, mode);
        self.checked_point(cx + x, cy + y, mode);
    }

    /// Bresenham along the major axis. Requires `x1 <= x2`; `dot` receives
    /// major/minor coordinates.
    fn line_along(x1: i64, y1: i64, x2: i64, y2: i64, mut dot: impl FnMut(i64, i64)) {
        let dx = x2 - x1;
        let mut dy = y2 - y1;
        let mut step = 1;
        if dy < 0 {
            dy = -dy;
            step = -1;
        }
        let acc1 = 2 * dy;
        let acc2 = 2 * (dy - dx);
        let mut d = 2 * dy - dx;
        let mut y = y1;
        for x in x1..=x2 {
            dot(x, y);
            if d < 0 {
                d += acc1;
            } else {
                y += step;
                d += acc2;
            }
        }
    }
}

impl ScreenModel for DefaultScreenModel {
    fn target(&self) -> Target {
        self.target
    }

    fn set_target(&mut self, target: Target) {
        self.target = target;
    }

    fn clear(&mut self) {
        self.active().zero();
    }

    fn draw_data(
        &mut self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        mem: &dyn ReadableMemory,
        addr: usize,
        blit: BlitMode,
    ) {
        let (mut x, mut y) = (x as i64, y as i64);
        let (mut width, mut height) = (width as i64, height as i64);
        let (screen_w, screen_h) = (WIDTH as i64, HEIGHT as i64);
        let mut addr = addr;

        if width <= 0 || height <= 0 {
            return;
        }
        if x >= screen_w || y >= screen_h || x + width < 0 || y + height < 0 {
            return;
        }

        let bytes_per_line = (width + 7) >> 3;
        // source bits to skip at the start of every image row
        let mut unused_data_bits = 0;
        if x < 0 {
            addr = addr.wrapping_add((-x / 8) as usize);
            unused_data_bits = -x % 8;
            width += x;
            x = 0;
        }
        if y < 0 {
            addr = addr.wrapping_add((bytes_per_line * -y) as usize);
            height += y;
            y = 0;
        }
        width = width.min(screen_w - x);
        height = height.min(screen_h - y);

        // bitmap bits left of the blit in its first byte
        let unused_screen_bits = x % 8;
        let mut offset = BYTE_WIDTH * y as usize + (x / 8) as usize;
        let count = ((unused_data_bits + width + 7) / 8) as usize;
        let size = ((unused_screen_bits + width + 7) / 8) as usize;
        let remain = (size as i64 * 8 - unused_screen_bits - width) as usize;
        let shift = (unused_data_bits - unused_screen_bits) as i32;

        let active = self.active();
        let mut row = vec![0u8; count + 1];
        for _ in 0..height {
            row.fill(0);
            for (i, b) in row.iter_mut().take(count).enumerate() {
                *b = mem.get_byte(addr.wrapping_add(i));
            }
            addr = addr.wrapping_add(bytes_per_line as usize);
            shift_bits(&mut row, shift);

            for (index, &src) in row.iter().take(size).enumerate() {
                let mut keep = 0;
                if index == 0 {
                    keep |= HIGHER_BITS[unused_screen_bits as usize];
                }
                if index == size - 1 {
                    keep |= LOWER_BITS[remain];
                }
                let dest = active.get_byte(offset + index);
                let value = combine(src, dest, blit);
                active.set_byte(offset + index, (dest & keep) | (value & !keep));
            }
            offset += BYTE_WIDTH;
        }
    }

    fn save_data(
        &mut self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        mem: &dyn WritableMemory,
        addr: usize,
    ) {
        if width < 8 || height <= 0 {
            return;
        }
        let byte_width = (width >> 3) as i64;
        let bx = (x >> 3) as i64;
        let active = self.active();
        let mut dest = addr;
        for row in y as i64..y as i64 + height as i64 {
            for col in bx..bx + byte_width {
                let on_screen = (0..HEIGHT as i64).contains(&row) && (0..BYTE_WIDTH as i64).contains(&col);
                let b = if on_screen {
                    active.get_byte(row as usize * BYTE_WIDTH + col as usize)
                } else {
                    0
                };
                mem.set_byte(dest, b);
                dest = dest.wrapping_add(1);
            }
        }
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
        let table = Rc::clone(&self.font);
        let (char_w, char_h) = (font.glyph_width(), font.glyph_height());
        let mut x = x;
        let mut i = 0;
        while i < len {
            let b = mem.get_byte(addr + i);
            i += 1;
            if b & 0x80 != 0 && i < len {
                let ch = b as u16 | (mem.get_byte(addr + i) as u16) << 8;
                i += 1;
                let glyph = table.glyph_offset(ch, font);
                self.draw_data(x, y, char_w * 2, char_h, &*table, glyph, blit);
                x = x.saturating_add(char_w * 2);
            } else {
                let glyph = table.glyph_offset(b as u16, font);
                self.draw_data(x, y, char_w, char_h, &*table, glyph, blit);
                x = x.saturating_add(char_w);
            }
        }
    }

    fn draw_rect(&mut self, x1: i32, y1: i32, x2: i32, y2: i32, fill: bool, mode: ShapeDrawMode) {
        let (x1, x2) = (x1.min(x2), x1.max(x2));
        let (y1, y2) = (y1.min(y2), y1.max(y2));
        if x2 < 0 || x1 >= WIDTH || y2 < 0 || y1 >= HEIGHT {
            return;
        }
        let (x1, x2) = (x1.max(0), x2.min(WIDTH - 1));
        let (y1, y2) = (y1.max(0), y2.min(HEIGHT - 1));

        if fill {
            for y in y1..=y2 {
                self.h_line(x1, x2, y, mode);
            }
            return;
        }
        self.h_line(x1, x2, y1, mode);
        if y2 > y1 {
            self.h_line(x1, x2, y2, mode);
            self.v_line(x1, y1 + 1, y2 - 1, mode);
            if x2 > x1 {
                self.v_line(x2, y1 + 1, y2 - 1, mode);
            }
        }
    }

    fn draw_line(&mut self, x1: i32, y1: i32, x2: i32, y2: i32, mode: ShapeDrawMode) {
        let (x1, y1, x2, y2) = (x1 as i64, y1 as i64, x2 as i64, y2 as i64);
        if (y2 - y1).abs() <= (x2 - x1).abs() {
            let dot = |x, y| self.checked_point(x, y, mode);
            if x1 <= x2 {
                Self::line_along(x1, y1, x2, y2, dot);
            } else {
                Self::line_along(x2, y2, x1, y1, dot);
            }
        } else {
            let dot = |y, x| self.checked_point(x, y, mode);
            if y1 <= y2 {
                Self::line_along(y1, x1, y2, x2, dot);
            } else {
                Self::line_along(y2, x2, y1, x1, dot);
            }
        }
    }

    fn draw_oval(&mut self, cx: i32, cy: i32, a: i32, b: i32, fill: bool, mode: ShapeDrawMode) {
        let (cx, cy, a, b) = (cx as i64, cy as i64, a as i64, b as i64);
        if cx - a >= WIDTH as i64 || cx + a < 0 || cy - b >= HEIGHT as i64 || cy + b < 0 {
            return;
        }

        let aa = a * a;
        let bb = b * b;
        let two_aa = aa * 2;
        let two_bb = bb * 2;
        let mut x = 0;
        let mut y = b;
        let mut px = 0;
        let mut py = two_aa * y;

        // region 1: slope above -1
        let mut p = bb - aa * b + ((aa + 2) >> 2);
        while px < py {
            x += 1;
            px += two_bb;
            if p < 0 {
                p += bb + px;
            } else {
                if fill {
                    self.oval_h_line(cx - x + 1, cx + x - 1, cy + y, mode);
                    self.oval_h_line(cx - x + 1, cx + x - 1, cy - y, mode);
                }
                y -= 1;
                py -= two_aa;
                p += bb + px - py;
            }
            if !fill {
                self.oval_points(cx, cy, x, y, mode);
            }
        }
        if fill {
            self.oval_h_line(cx - x, cx + x, cy + y, mode);
            self.oval_h_line(cx - x, cx + x, cy - y, mode);
        }

        // region 2
        p = bb * x * x + bb * x + aa * (y - 1) * (y - 1) - aa * bb + ((bb + 2) >> 2);
        loop {
            y -= 1;
            if y <= 0 {
                break;
            }
            py -= two_aa;
            if p > 0 {
                p += aa - py;
            } else {
                x += 1;
                px += two_bb;
                p += aa - py + px;
            }
            if fill {
                self.oval_h_line(cx - x, cx + x, cy + y, mode);
                self.oval_h_line(cx - x, cx + x, cy - y, mode);
            } else {
                self.oval_points(cx, cy, x, y, mode);
            }
        }

        if fill {
            self.oval_h_line(cx - a, cx + a, cy, mode);
        } else {
            self.checked_point(cx, cy + b, mode);
            self.checked_point(cx, cy - b, mode);
            self.checked_point(cx + a, cy, mode);
            self.checked_point(cx - a, cy, mode);
        }
    }

    fn draw_point(&mut self, x: i32, y: i32, mode: ShapeDrawMode) {
        self.checked_point(x as i64, y as i64, mode);
    }

    fn scroll(&mut self, dir: ScrollDirection) {
        let active = self.active();
        for offset in (0..BITMAP_SIZE).step_by(BYTE_WIDTH) {
            let mut carry = 0;
            match dir {
                ScrollDirection::Left => {
                    for i in (0..BYTE_WIDTH).rev() {
                        let b = active.get_byte(offset + i);
                        active.set_byte(offset + i, (b << 1) | carry);
                        carry = b >> 7;
                    }
                }
                ScrollDirection::Right => {
                    for i in 0..BYTE_WIDTH {
                        let b = active.get_byte(offset + i);
                        active.set_byte(offset + i, (b >> 1) | carry);
                        carry = (b & 1) << 7;
                    }
                }
            }
        }
    }

    /// Bytes are flipped with `u8::reverse_bits`, which gives the same
    /// result as a 256-entry bit reversal table.
    fn mirror(&mut self, dir: MirrorDirection) {
        let active = self.active();
        match dir {
            MirrorDirection::Horizontal => {
                for offset in (0..BITMAP_SIZE).step_by(BYTE_WIDTH) {
                    for i in 0..BYTE_WIDTH / 2 {
                        let left = offset + i;
                        let right = offset + BYTE_WIDTH - 1 - i;
                        let tmp = active.get_byte(left);
                        active.set_byte(left, active.get_byte(right).reverse_bits());
                        active.set_byte(right, tmp.reverse_bits());
                    }
                }
            }
            MirrorDirection::Vertical => {
                for y in 0..HEIGHT as usize / 2 {
                    let top = y * BYTE_WIDTH;
                    let bottom = (HEIGHT as usize - 1 - y) * BYTE_WIDTH;
                    for i in 0..BYTE_WIDTH {
                        let tmp = active.get_byte(top + i);
                        active.set_byte(top + i, active.get_byte(bottom + i));
                        active.set_byte(bottom + i, tmp);
                    }
                }
            }
        }
    }

    fn test_point(&mut self, x: i32, y: i32) -> i32 {
        if (0..WIDTH).contains(&x) && (0..HEIGHT).contains(&y) {
            let offset = y as usize * BYTE_WIDTH + (x as usize >> 3);
            (self.graphics.get_byte(offset) & bit_mask(x)) as i32
        } else {
            0
        }
    }

    fn render_buffer_to_graphics(&mut self) {
        for i in 0..BITMAP_SIZE {
            self.graphics.set_byte(i, self.buffer.get_byte(i));
        }
    }
}

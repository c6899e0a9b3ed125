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

//! Built-in functions `0x80..=0xCA`.
//!
//! Arguments are read from the data stack. Functions with several
//! arguments take them all at once, deepest first, so `x y w h` below is
//! the order a program pushes them in.

use super::opcodes::builtins as bi;
use super::{Runtime, MAX_PATH};
use crate::error::{FileError, Result, VmError};
use crate::file::{decode_path, encode_name};
use crate::keyboard::keys;
use crate::memory::{check_range, RamModel, ReadableMemory, WritableMemory, RAM_SIZE};
use crate::screen::{
    BlitMode, MirrorDirection, ScreenModel, ScrollDirection, ShapeDrawMode, Target, WIDTH,
};
use crate::text::{TextMode, LARGE_FONT_ROWS, LARGE_FONT_ROW_HEIGHT};
use crate::util::{cos, crc16, sin, xor_encrypt};
use std::iter;
use std::rc::Rc;
use std::thread;
use std::time::Duration;
use tracing::debug;

const ADDRESS_MASK: i32 = 0xffff;
/// Handles are a single byte on the stack.
const HANDLE_MASK: i32 = 0xff;

/// Unwrap a file operation, logging the failure and substituting `fallback`.
fn or_sentinel<T>(result: std::result::Result<T, FileError>, fallback: T) -> T {
    result.unwrap_or_else(|err| {
        debug!(error = %err, "File operation failed");
        fallback
    })
}

fn bool_value(b: bool) -> i32 {
    if b {
        -1
    } else {
        0
    }
}

impl Runtime {
    fn pop_address(&mut self) -> Result<usize> {
        Ok((self.pop()? & ADDRESS_MASK) as usize)
    }

    fn pop_count(&mut self) -> Result<usize> {
        usize::try_from(self.pop()?).map_err(|_| VmError::StackUnderflow)
    }

    fn push_bool(&mut self, value: bool) -> Result<()> {
        self.stack.push_bool(value)
    }

    /// The NUL-terminated string at `address`, without the NUL.
    fn string_at(&self, address: usize) -> Result<Vec<u8>> {
        self.ram
            .get_string(address)
            .ok_or(VmError::UnterminatedString(address))
    }

    fn path_at(&self, address: usize) -> Result<String> {
        Ok(decode_path(&self.string_at(address)?))
    }

    fn render_text(&mut self, row_mask: i32) {
        self.text.render_to_screen(self.screen.as_mut(), row_mask);
    }

    fn test_char(&mut self, predicate: impl Fn(u8) -> bool) -> Result<()> {
        let c = self.pop()? as u8;
        self.push_bool(predicate(c))
    }

    pub(super) fn exec_builtin(&mut self, function: u8) -> Result<()> {
        let ram = Rc::clone(&self.ram);
        match function {
            bi::PUTCHAR => {
                let c = self.pop()? as u8;
                self.text.add_byte(c);
                self.render_text(0);
            }
            bi::GETCHAR | bi::GET_WORD => {
                if function == bi::GET_WORD {
                    // input method mode, no effect here
                    self.pop()?;
                }
                let key = self.keyboard.get_last_key(true);
                self.push(key)?;
            }
            bi::PRINTF => {
                let argc = self.pop_count()?;
                let values = self.stack.shrink(argc)?;
                let bytes = self.format_string(&values)?;
                self.text.add_bytes(&bytes);
                self.render_text(0);
            }
            bi::SPRINTF => {
                let argc = self.pop_count()?.saturating_sub(1);
                let values = self.stack.shrink(argc)?;
                let bytes = self.format_string(&values)?;
                let dest = self.pop_address()?;
                check_range(dest, bytes.len() + 1)?;
                ram.write_range(dest, &bytes);
                ram.set_byte(dest + bytes.len(), 0);
            }

            // ================================================================
            // Strings
            // ================================================================
            bi::STRCPY => {
                let src = self.pop_address()?;
                let dest = self.pop_address()?;
                let bytes = self.string_at(src)?;
                check_range(dest, bytes.len() + 1)?;
                ram.write_range(dest, &bytes);
                ram.set_byte(dest + bytes.len(), 0);
            }
            bi::STRLEN => {
                let address = self.pop_address()?;
                let len = self.string_at(address)?.len();
                self.push(len as i32)?;
            }
            bi::STRCAT => {
                let src = self.pop_address()?;
                let dest = self.pop_address()?;
                let end = dest + self.string_at(dest)?.len();
                let bytes = self.string_at(src)?;
                check_range(end, bytes.len() + 1)?;
                ram.write_range(end, &bytes);
                ram.set_byte(end + bytes.len(), 0);
            }
            bi::STRCHR => {
                let c = self.pop()? as u8;
                let address = self.pop_address()?;
                let found = (address..RAM_SIZE)
                    .map(|a| (a, ram.get_byte(a)))
                    .find(|&(_, b)| b == c || b == 0)
                    .ok_or(VmError::UnterminatedString(address))?;
                let result = if found.1 == c { found.0 as i32 } else { 0 };
                self.push(result)?;
            }
            bi::STRCMP => {
                let rhs = self.pop_address()?;
                let lhs = self.pop_address()?;
                let a = self.string_at(lhs)?;
                let b = self.string_at(rhs)?;
                let diff = a
                    .iter()
                    .chain(iter::once(&0))
                    .zip(b.iter().chain(iter::once(&0)))
                    .map(|(&x, &y)| x as i32 - y as i32)
                    .find(|&d| d != 0)
                    .unwrap_or(0);
                self.push(diff)?;
            }
            bi::STRSTR => {
                let needle_address = self.pop_address()?;
                let address = self.pop_address()?;
                let haystack = self.string_at(address)?;
                let needle = self.string_at(needle_address)?;
                let result = if needle.is_empty() {
                    address as i32
                } else {
                    haystack
                        .windows(needle.len())
                        .position(|w| w == needle.as_slice())
                        .map_or(0, |pos| (address + pos) as i32)
                };
                self.push(result)?;
            }
            bi::TOLOWER => {
                let c = self.pop()? & 0xff;
                self.push(if (b'A'..=b'Z').contains(&(c as u8)) { c + 32 } else { c })?;
            }
            bi::TOUPPER => {
                let c = self.pop()? & 0xff;
                self.push(if (b'a'..=b'z').contains(&(c as u8)) { c - 32 } else { c })?;
            }

            bi::ISALNUM => self.test_char(|c| c.is_ascii_alphanumeric())?,
            bi::ISALPHA => self.test_char(|c| c.is_ascii_alphabetic())?,
            bi::ISCNTRL => self.test_char(|c| c.is_ascii_control())?,
            bi::ISDIGIT => self.test_char(|c| c.is_ascii_digit())?,
            bi::ISGRAPH => self.test_char(|c| c.is_ascii_graphic())?,
            bi::ISLOWER => self.test_char(|c| c.is_ascii_lowercase())?,
            bi::ISPRINT => self.test_char(|c| (0x20..=0x7e).contains(&c))?,
            bi::ISPUNCT => self.test_char(|c| c.is_ascii_punctuation())?,
            // includes vertical tab, unlike is_ascii_whitespace
            bi::ISSPACE => self.test_char(|c| (9..=13).contains(&c) || c == b' ')?,
            bi::ISUPPER => self.test_char(|c| c.is_ascii_uppercase())?,
            bi::ISXDIGIT => self.test_char(|c| c.is_ascii_hexdigit())?,

            // ================================================================
            // Memory blocks
            // ================================================================
            bi::MEMSET => {
                let [address, value, count] = self.stack.take::<3>()?;
                let (address, count) = ((address & ADDRESS_MASK) as usize, (count & ADDRESS_MASK) as usize);
                check_range(address, count)?;
                ram.fill(address, count, value as u8);
            }
            bi::MEMCPY => {
                let [dest, src, count] = self.stack.take::<3>()?;
                let (dest, src) = ((dest & ADDRESS_MASK) as usize, (src & ADDRESS_MASK) as usize);
                let count = (count & ADDRESS_MASK) as usize;
                check_range(dest, count)?;
                check_range(src, count)?;
                for i in 0..count {
                    ram.set_byte(dest + i, ram.get_byte(src + i));
                }
            }
            bi::MEMMOVE => {
                let [dest, src, count] = self.stack.take::<3>()?;
                let (dest, src) = ((dest & ADDRESS_MASK) as usize, (src & ADDRESS_MASK) as usize);
                let count = (count & ADDRESS_MASK) as usize;
                check_range(dest, count)?;
                check_range(src, count)?;
                ram.copy(dest, src, count);
            }
            bi::CRC16 => {
                let count = self.pop_address()?;
                let address = self.pop_address()?;
                check_range(address, count)?;
                self.push(crc16(&*ram, address, count))?;
            }
            bi::SECRET => {
                let [address, count, password] = self.stack.take::<3>()?;
                let address = (address & ADDRESS_MASK) as usize;
                let count = (count & ADDRESS_MASK) as usize;
                let password = self.string_at((password & ADDRESS_MASK) as usize)?;
                check_range(address, count)?;
                xor_encrypt(&*ram, address, count, &password);
            }

            // ================================================================
            // Screen
            // ================================================================
            bi::SET_SCREEN => {
                let mode = if self.pop()? & 0xff == 0 {
                    TextMode::Large
                } else {
                    TextMode::Small
                };
                self.text.set_text_mode(mode);
                self.text.reset();
            }
            bi::UPDATE_LCD => {
                let mask = self.pop()? & 0xff;
                self.render_text(mask);
            }
            bi::WRITE_BLOCK => {
                let [x, y, width, height, mode, address] = self.stack.take::<6>()?;
                self.screen.set_target(Target::for_blit(mode));
                self.screen.draw_data(
                    x,
                    y,
                    width,
                    height,
                    &*ram,
                    (address & ADDRESS_MASK) as usize,
                    BlitMode::from_bits(mode),
                );
            }
            bi::REFRESH => self.screen.render_buffer_to_graphics(),
            bi::TEXT_OUT => {
                let [x, y, address, mode] = self.stack.take::<4>()?;
                let address = (address & ADDRESS_MASK) as usize;
                let len = self.string_at(address)?.len();
                let font = if mode & 0x80 != 0 {
                    TextMode::Large
                } else {
                    TextMode::Small
                };
                self.screen.set_target(Target::for_blit(mode));
                self.screen
                    .draw_string(x, y, &*ram, address, len, font, BlitMode::from_bits(mode));
            }
            bi::BLOCK | bi::RECTANGLE => {
                let [x, y, x1, y1, mode] = self.stack.take::<5>()?;
                self.screen.set_target(Target::for_blit(mode));
                let shape = ShapeDrawMode::from_bits(mode)?;
                self.screen
                    .draw_rect(x, y, x1, y1, function == bi::BLOCK, shape);
            }
            bi::CLEAR_SCREEN => {
                self.screen.set_target(Target::Buffer);
                self.screen.clear();
            }
            bi::POINT => {
                let [x, y, mode] = self.stack.take::<3>()?;
                self.screen.set_target(Target::for_shape(mode));
                let shape = ShapeDrawMode::from_bits(mode)?;
                self.screen.draw_point(x, y, shape);
            }
            bi::GET_POINT => {
                let [x, y] = self.stack.take::<2>()?;
                self.screen.set_target(Target::Graphics);
                let set = self.screen.test_point(x, y);
                self.push(set)?;
            }
            bi::LINE => {
                let [x, y, x1, y1, mode] = self.stack.take::<5>()?;
                self.screen.set_target(Target::for_shape(mode));
                let shape = ShapeDrawMode::from_bits(mode)?;
                self.screen.draw_line(x, y, x1, y1, shape);
            }
            bi::BOX => {
                let [x, y, x1, y1, fill, mode] = self.stack.take::<6>()?;
                self.screen.set_target(Target::for_shape(mode));
                let shape = ShapeDrawMode::from_bits(mode)?;
                self.screen.draw_rect(x, y, x1, y1, fill != 0, shape);
            }
            bi::CIRCLE => {
                let [x, y, r, fill, mode] = self.stack.take::<5>()?;
                self.screen.set_target(Target::for_shape(mode));
                let shape = ShapeDrawMode::from_bits(mode)?;
                self.screen.draw_oval(x, y, r, r, fill != 0, shape);
            }
            bi::ELLIPSE => {
                let [x, y, rx, ry, fill, mode] = self.stack.take::<6>()?;
                self.screen.set_target(Target::for_shape(mode));
                let shape = ShapeDrawMode::from_bits(mode)?;
                self.screen.draw_oval(x, y, rx, ry, fill != 0, shape);
            }
            bi::XDRAW => {
                self.screen.set_target(Target::Buffer);
                match self.pop()? {
                    0 => self.screen.scroll(ScrollDirection::Left),
                    1 => self.screen.scroll(ScrollDirection::Right),
                    4 => self.screen.mirror(MirrorDirection::Horizontal),
                    5 => self.screen.mirror(MirrorDirection::Vertical),
                    _ => {}
                }
            }
            bi::GET_BLOCK => {
                let [x, y, width, height, mode, address] = self.stack.take::<6>()?;
                self.screen.set_target(Target::for_blit(mode));
                self.screen.save_data(
                    x & ADDRESS_MASK,
                    y & ADDRESS_MASK,
                    width & ADDRESS_MASK,
                    height & ADDRESS_MASK,
                    &*ram,
                    (address & ADDRESS_MASK) as usize,
                );
            }
            bi::FILL_AREA => {
                self.stack.take::<3>()?;
            }

            // ================================================================
            // Text grid, keys and misc
            // ================================================================
            bi::LOCATE => {
                let [row, column] = self.stack.take::<2>()?;
                self.text.set_location(row, column);
            }
            bi::INKEY => {
                let key = self.keyboard.get_last_key(false);
                self.push(key)?;
            }
            bi::CHECK_KEY => {
                let key = self.pop()?;
                if key & !0x7f != 0 {
                    let pressed = self.keyboard.get_pressed_key();
                    self.push(pressed)?;
                } else {
                    let pressed = self.keyboard.is_key_pressed(key);
                    self.push_bool(pressed)?;
                }
            }
            bi::RELEASE_KEY => {
                let key = self.pop()?;
                if key & !0x7f != 0 {
                    self.keyboard.revalidate_all_keys();
                } else {
                    self.keyboard.revalidate_key(key);
                }
            }
            bi::DELAY => {
                let ms = self.pop()? & 0x7fff;
                thread::sleep(Duration::from_millis(ms as u64));
            }
            bi::EXIT => self.over = true,
            bi::ABS => {
                let v = self.pop()?;
                self.push(v.wrapping_abs())?;
            }
            bi::RAND => {
                let v = self.rng.next_value();
                self.push(v)?;
            }
            bi::SRAND => {
                let seed = self.pop()?;
                self.rng.set_seed(seed);
            }
            bi::BEEP => {}
            bi::SIN => {
                let degrees = self.pop()?;
                self.push(sin(degrees))?;
            }
            bi::COS => {
                let degrees = self.pop()?;
                self.push(cos(degrees))?;
            }
            bi::GETMS => {
                let ms = self.clock.now_millis().rem_euclid(1000) * 256 / 1000;
                self.push(ms as i32)?;
            }
            bi::GET_TIME => {
                let address = self.pop_address()?;
                let now = self.clock.now();
                ram.set_i16(address, now.year());
                ram.set_u8(address + 2, u8::from(now.month()) as i32 - 1);
                ram.set_u8(address + 3, now.day() as i32);
                ram.set_u8(address + 4, now.hour() as i32);
                ram.set_u8(address + 5, now.minute() as i32);
                ram.set_u8(address + 6, now.second() as i32);
                ram.set_u8(address + 7, now.weekday().number_from_sunday() as i32);
            }
            bi::SET_TIME => {
                self.pop()?;
            }

            // ================================================================
            // Files
            // ================================================================
            bi::FOPEN => {
                let mode_address = self.pop_address()?;
                let path_address = self.pop_address()?;
                let path = self.path_at(path_address)?;
                let mode = self.path_at(mode_address)?;
                let handle = or_sentinel(self.files.open_file(&path, &mode), 0);
                self.push(handle)?;
            }
            bi::FCLOSE => {
                let handle = self.pop()? & HANDLE_MASK;
                or_sentinel(self.files.close_file(handle), ());
            }
            bi::FREAD => {
                let [address, _, count, handle] = self.stack.take::<4>()?;
                let address = (address & ADDRESS_MASK) as usize;
                let count = (count & ADDRESS_MASK) as usize;
                check_range(address, count)?;
                let data = or_sentinel(self.files.read(handle & HANDLE_MASK, count), Vec::new());
                ram.write_range(address, &data);
                self.push(data.len() as i32)?;
            }
            bi::FWRITE => {
                let [address, _, count, handle] = self.stack.take::<4>()?;
                let address = (address & ADDRESS_MASK) as usize;
                let count = (count & ADDRESS_MASK) as usize;
                check_range(address, count)?;
                let data = ram.read_range(address, count);
                let written = or_sentinel(self.files.write(handle & HANDLE_MASK, &data), 0);
                self.push(written as i32)?;
            }
            bi::FSEEK => {
                let [handle, offset, base] = self.stack.take::<3>()?;
                let position = self.seek(handle & HANDLE_MASK, offset.into(), base & 0xff);
                self.push(position)?;
            }
            bi::FTELL => {
                let handle = self.pop()? & HANDLE_MASK;
                let offset = or_sentinel(self.files.offset(handle).map(|o| o as i32), -1);
                self.push(offset)?;
            }
            bi::FEOF => {
                let handle = self.pop()? & HANDLE_MASK;
                let eof = or_sentinel(self.files.is_eof(handle), true);
                self.push_bool(eof)?;
            }
            bi::REWIND => {
                let handle = self.pop()? & HANDLE_MASK;
                or_sentinel(self.files.set_offset(handle, 0), ());
            }
            bi::GETC => {
                let handle = self.pop()? & HANDLE_MASK;
                let bytes = or_sentinel(self.files.read(handle, 1), Vec::new());
                self.push(bytes.first().map_or(-1, |&b| b as i32))?;
            }
            bi::PUTC => {
                let handle = self.pop()? & HANDLE_MASK;
                let c = self.pop()? & 0xff;
                let written = or_sentinel(self.files.write(handle, &[c as u8]), 0);
                self.push(if written == 1 { c } else { -1 })?;
            }
            bi::MAKE_DIR => {
                let address = self.pop_address()?;
                let path = self.path_at(address)?;
                let created = or_sentinel(self.files.create_directory(&path), false);
                self.push_bool(created)?;
            }
            bi::DELETE_FILE => {
                let address = self.pop_address()?;
                let path = self.path_at(address)?;
                let deleted = or_sentinel(self.files.delete_file(&path), false);
                self.push_bool(deleted)?;
            }
            bi::CHDIR => {
                let address = self.pop_address()?;
                let path = self.path_at(address)?;
                let changed = or_sentinel(self.files.set_working_dir(&path).map(|_| true), false);
                self.push_bool(changed)?;
            }
            bi::FILE_LIST => {
                let address = self.pop_address()?;
                let chosen = self.choose_file(address)?;
                self.push_bool(chosen)?;
            }

            _ => {
                return Err(VmError::IllegalOpcode {
                    opcode: function,
                    pc: self.op_pc,
                })
            }
        }
        Ok(())
    }

    /// Move a file offset like C `fseek` and return the new offset, `-1` on
    /// failure or an unknown base.
    fn seek(&mut self, handle: i32, offset: i64, base: i32) -> i32 {
        let files = &mut self.files;
        let origin = match base {
            0 => Ok(0),
            1 => files.offset(handle).map(|o| o as i64),
            2 => files.size(handle).map(|s| s as i64),
            _ => return -1,
        };
        let result = origin
            .and_then(|origin| files.set_offset(handle, origin + offset))
            .and_then(|_| files.offset(handle));
        or_sentinel(result.map(|o| o as i32), -1)
    }

    /// Expand `%d %c %s` in the format string at `values[0]` with the
    /// following values. Missing arguments read as zero.
    pub(super) fn format_string(&self, values: &[i32]) -> Result<Vec<u8>> {
        let (&format, args) = values.split_first().ok_or(VmError::StackUnderflow)?;
        let format = self.string_at((format & ADDRESS_MASK) as usize)?;
        let mut args = args.iter().copied().chain(iter::repeat(0));
        let mut out = Vec::with_capacity(format.len());

        let mut chars = format.iter().copied();
        while let Some(c) = chars.next() {
            if c != b'%' {
                out.push(c);
                continue;
            }
            match chars.next() {
                None => break,
                Some(b'd') => {
                    let v = args.next().unwrap_or_default();
                    out.extend_from_slice(v.to_string().as_bytes());
                }
                Some(b'c') => out.push(args.next().unwrap_or_default() as u8),
                Some(b's') => {
                    let address = args.next().unwrap_or_default() & ADDRESS_MASK;
                    out.extend(self.string_at(address as usize)?);
                }
                Some(other) => out.push(other),
            }
        }
        Ok(out)
    }

    /// Let the user pick an entry of the working directory and store its
    /// name at `dest`. Returns whether one was chosen.
    fn choose_file(&mut self, dest: usize) -> Result<bool> {
        let mut names: Vec<Vec<u8>> = match self.files.list_files() {
            Ok(mut names) => {
                names.sort();
                names
                    .iter()
                    .map(|name| encode_name(name))
                    .filter(|name| name.len() <= MAX_PATH)
                    .collect()
            }
            Err(err) => {
                debug!(error = %err, "Cannot list working directory");
                return Ok(false);
            }
        };
        if self.files.working_dir() != "/" {
            names.insert(0, b"..".to_vec());
        }
        if names.is_empty() {
            return Ok(false);
        }

        let rows = LARGE_FONT_ROWS;
        let row_height = LARGE_FONT_ROW_HEIGHT as i32;
        let last = names.len() - 1;
        let mut index = 0;
        let mut offset = 0;
        loop {
            self.text.set_text_mode(TextMode::Large);
            self.text.reset();
            for (row, name) in names.iter().enumerate().skip(offset).take(rows) {
                self.text.set_location((row - offset) as i32, 0);
                self.text.add_bytes(name);
            }
            self.render_text(0);
            self.screen.set_target(Target::Graphics);
            let y = index as i32 * row_height;
            self.screen
                .draw_rect(0, y, WIDTH - 1, y + row_height - 1, true, ShapeDrawMode::Invert);

            loop {
                match self.keyboard.get_last_key(true) {
                    keys::ENTER => {
                        let name = &names[offset + index];
                        check_range(dest, name.len() + 1)?;
                        self.ram.write_range(dest, name);
                        self.ram.set_byte(dest + name.len(), 0);
                        return Ok(true);
                    }
                    // 0 means the key source is exhausted
                    keys::ESCAPE | 0 => return Ok(false),
                    keys::UP | keys::LEFT => {
                        if index == 0 {
                            offset = offset.saturating_sub(1);
                        } else {
                            index -= 1;
                        }
                        break;
                    }
                    keys::DOWN | keys::RIGHT => {
                        if offset + index < last {
                            if index == rows - 1 {
                                offset += 1;
                            } else {
                                index += 1;
                            }
                            break;
                        }
                    }
                    keys::PAGE_UP => {
                        if offset < rows {
                            offset = 0;
                            index = 0;
                        } else {
                            offset -= rows;
                        }
                        break;
                    }
                    keys::PAGE_DOWN => {
                        if offset + rows <= last {
                            offset += rows;
                            index = index.min(last - offset);
                        } else {
                            index = last - offset;
                        }
                        break;
                    }
                    _ => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::assembler::ImageBuilder;
    use super::super::opcodes::opcodes as op;
    use super::super::{Models, Runtime};
    use super::*;
    use crate::config::Config;
    use crate::file::DefaultFileSystem;
    use crate::memory::Ram;
    use crate::recording::{CallLog, RecordingScreenModel, RecordingTextModel, ScriptedKeyboardModel};
    use crate::util::FixedClock;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tempfile::TempDir;
    use test_case::test_case;
    use time::macros::datetime;

    struct Harness {
        dir: TempDir,
        log: CallLog,
        runtime: Runtime,
    }

    fn harness_with_keys(asm: &ImageBuilder, keys: Vec<i32>) -> Harness {
        let dir = TempDir::new().unwrap();
        let log = CallLog::new();
        let models = Models {
            screen: Box::new(RecordingScreenModel::new(log.clone())),
            text: Box::new(RecordingTextModel::new(log.clone())),
            keyboard: Arc::new(ScriptedKeyboardModel::new(keys, log.clone())),
            file_system: Box::new(DefaultFileSystem::new(dir.path()).unwrap()),
        };
        let mut runtime = Runtime::new(Ram::shared(), models, &Config::default())
            .with_clock(FixedClock(datetime!(2024-02-29 13:45:30.750 UTC)));
        runtime.load_code(&asm.build().unwrap()[..]).unwrap();
        runtime.prepare().unwrap();
        Harness { dir, log, runtime }
    }

    fn harness(asm: &ImageBuilder) -> Harness {
        harness_with_keys(asm, Vec::new())
    }

    fn run(asm: &ImageBuilder) -> Harness {
        let mut h = harness(asm);
        h.runtime.run(Some(100_000)).unwrap();
        assert!(h.runtime.is_over());
        h
    }

    fn top(h: &Harness) -> i32 {
        h.runtime.stack().peek(0).unwrap()
    }

    // ========================================================================
    // Formatting
    // ========================================================================

    #[test]
    fn test_sprintf() {
        let mut asm = ImageBuilder::new();
        asm.push_i16(0x3000)
            .push_string(b"%d|%c|%s|%%|%q")
            .push(-42)
            .push(b'Z' as i32)
            .push_string(b"lava")
            .push(5)
            .builtin(bi::SPRINTF)
            .halt();
        let h = run(&asm);
        assert_eq!(
            h.runtime.ram().get_string(0x3000),
            Some(b"-42|Z|lava|%|q".to_vec())
        );
        assert!(h.runtime.stack().is_empty());
    }

    #[test]
    fn test_printf_missing_args_read_zero() {
        let mut asm = ImageBuilder::new();
        asm.push_string(b"a%db%c").push(1).builtin(bi::PRINTF).halt();
        let h = run(&asm);
        let entries = h.log.entries();
        assert!(entries.iter().any(|e| e.starts_with("[add bytes (a0b")), "{entries:?}");
        assert!(entries.iter().any(|e| e.starts_with("[render text to screen")));
    }

    #[test]
    fn test_trailing_percent_ends_format() {
        let mut asm = ImageBuilder::new();
        asm.push_i16(0x3000)
            .push_string(b"50%")
            .push(2)
            .builtin(bi::SPRINTF)
            .halt();
        let h = run(&asm);
        assert_eq!(h.runtime.ram().get_string(0x3000), Some(b"50".to_vec()));
    }

    // ========================================================================
    // Strings
    // ========================================================================

    #[test]
    fn test_string_functions() {
        let mut asm = ImageBuilder::new();
        asm.push_i16(0x3000)
            .push_string(b"gray")
            .builtin(bi::STRCPY)
            .push_i16(0x3000)
            .push_string(b"hound")
            .builtin(bi::STRCAT)
            .push_i16(0x3000)
            .builtin(bi::STRLEN)
            .push_i16(0x3000)
            .push(b'h' as i32)
            .builtin(bi::STRCHR)
            .push_i16(0x3000)
            .push_string(b"und")
            .builtin(bi::STRSTR)
            .push_i16(0x3000)
            .push_string(b"dog")
            .builtin(bi::STRSTR)
            .halt();
        let h = run(&asm);
        assert_eq!(h.runtime.ram().get_string(0x3000), Some(b"grayhound".to_vec()));
        let mut stack = h.runtime.stack().clone();
        assert_eq!(stack.shrink(4).unwrap(), vec![9, 0x3004, 0x3006, 0]);
    }

    #[test_case(b"abc", b"abc", 0; "equal")]
    #[test_case(b"abc", b"abd", -1; "last byte differs")]
    #[test_case(b"ab", b"abc", -(b'c' as i32); "prefix")]
    #[test_case(b"\xb0", b"a", 0xb0 - 0x61; "bytes compare unsigned")]
    fn test_strcmp(a: &[u8], b: &[u8], expected: i32) {
        let mut asm = ImageBuilder::new();
        asm.push_string(a).push_string(b).builtin(bi::STRCMP).halt();
        assert_eq!(top(&run(&asm)), expected);
    }

    #[test]
    fn test_unterminated_string_is_fatal() {
        let mut asm = ImageBuilder::new();
        asm.push_i32(0xfffe).push(0x41).push(2).builtin(bi::MEMSET);
        asm.push_i32(0xfffe).builtin(bi::STRLEN).halt();
        let mut h = harness(&asm);
        assert_eq!(
            h.runtime.run(None),
            Err(VmError::UnterminatedString(0xfffe))
        );
    }

    #[test_case(bi::ISALNUM, b'7', true; "isalnum digit")]
    #[test_case(bi::ISALPHA, b'7', false; "isalpha digit")]
    #[test_case(bi::ISCNTRL, 0x7f, true; "iscntrl del")]
    #[test_case(bi::ISGRAPH, b' ', false; "isgraph space")]
    #[test_case(bi::ISPRINT, b' ', true; "isprint space")]
    #[test_case(bi::ISPUNCT, b'~', true; "ispunct tilde")]
    #[test_case(bi::ISSPACE, 0x0b, true; "isspace vertical tab")]
    #[test_case(bi::ISXDIGIT, b'g', false; "isxdigit g")]
    #[test_case(bi::ISUPPER, b'Q', true; "isupper")]
    fn test_ctype(function: u8, c: u8, expected: bool) {
        let mut asm = ImageBuilder::new();
        // high bits are ignored
        asm.push_i32(0x100 | c as i32).builtin(function).halt();
        assert_eq!(top(&run(&asm)), bool_value(expected));
    }

    #[test]
    fn test_case_conversion() {
        let mut asm = ImageBuilder::new();
        asm.push(b'q' as i32)
            .builtin(bi::TOUPPER)
            .push(b'Q' as i32)
            .builtin(bi::TOLOWER)
            .push(b'1' as i32)
            .builtin(bi::TOUPPER)
            .halt();
        let h = run(&asm);
        let mut stack = h.runtime.stack().clone();
        assert_eq!(stack.shrink(3).unwrap(), vec![b'Q' as i32, b'q' as i32, b'1' as i32]);
    }

    // ========================================================================
    // Memory blocks
    // ========================================================================

    #[test]
    fn test_memmove_overlapping() {
        let mut asm = ImageBuilder::new();
        asm.init_data(0x3000, b"abcdef")
            .push_i16(0x3002)
            .push_i16(0x3000)
            .push(4)
            .builtin(bi::MEMMOVE)
            .halt();
        let h = run(&asm);
        assert_eq!(h.runtime.ram().get_string(0x3000), Some(b"ababcd".to_vec()));
    }

    #[test]
    fn test_memcpy_copies_forward() {
        let mut asm = ImageBuilder::new();
        asm.init_data(0x3000, b"abcdef")
            .push_i16(0x3001)
            .push_i16(0x3000)
            .push(4)
            .builtin(bi::MEMCPY)
            .halt();
        let h = run(&asm);
        assert_eq!(h.runtime.ram().get_string(0x3000), Some(b"aaaaaf".to_vec()));
    }

    #[test]
    fn test_memset_past_end_is_fatal() {
        let mut asm = ImageBuilder::new();
        asm.push_i32(0xfff0).push(0).push(0x20).builtin(bi::MEMSET).halt();
        let mut h = harness(&asm);
        assert_eq!(
            h.runtime.run(None),
            Err(VmError::MemoryRange {
                address: 0xfff0,
                len: 0x20
            })
        );
    }

    #[test]
    fn test_crc16_golden_vector() {
        let mut asm = ImageBuilder::new();
        asm.init_data(0x3000, b"123456789")
            .push_i16(0x3000)
            .push(9)
            .builtin(bi::CRC16)
            .halt();
        assert_eq!(top(&run(&asm)), 0x31c3);
    }

    #[test]
    fn test_secret_twice_restores() {
        let mut asm = ImageBuilder::new();
        asm.init_data(0x3000, b"payload");
        for _ in 0..2 {
            asm.push_i16(0x3000).push(7).push_string(b"key").builtin(bi::SECRET);
        }
        asm.halt();
        let h = run(&asm);
        assert_eq!(h.runtime.ram().get_string(0x3000), Some(b"payload".to_vec()));
    }

    // ========================================================================
    // Screen
    // ========================================================================

    #[test]
    fn test_draw_targets() {
        let mut asm = ImageBuilder::new();
        asm.init_data(0x3000, &[0xff, 0x81]);
        // WriteBlock with graphics flag, mirror and inverse
        asm.push(3).push(4).push(8).push(2).push(0x40 | 0x20 | 0x08 | 5).push_i16(0x3000);
        asm.builtin(bi::WRITE_BLOCK);
        // Line with buffer flag
        asm.push(0).push(0).push(4).push(0).push(0x41).builtin(bi::LINE);
        asm.push(1).push(2).push(1).builtin(bi::POINT);
        asm.push(1).push(2).builtin(bi::GET_POINT);
        asm.push(1).builtin(bi::XDRAW);
        asm.builtin(bi::CLEAR_SCREEN).halt();
        let h = run(&asm);
        assert_eq!(
            h.log.entries(),
            vec![
                "[write block 3, 4, 8, 2, 0x3000, screen, xor, mirror, invert]",
                "[draw line 0, 0, 4, 0, buffer, normal]",
                "[draw point 1, 2, screen, normal]",
                "[test point 1, 2, screen]",
                "[scroll right, buffer]",
                "[clear buffer]",
            ]
        );
        assert_eq!(top(&h), 0);
    }

    #[test]
    fn test_text_out_font_and_length() {
        let mut asm = ImageBuilder::new();
        asm.push(10).push(20).push_string(b"Hi").push(0x80 | 1).builtin(bi::TEXT_OUT);
        asm.push(10).push(20).push_string(b"").push(0x40).builtin(bi::TEXT_OUT);
        asm.halt();
        let h = run(&asm);
        assert_eq!(
            h.log.entries(),
            vec![
                "[text out 10, 20, Hi, large, buffer, copy, no-mirror, no-invert]",
                "[text out 10, 20, , small, screen, copy, no-mirror, no-invert]",
            ]
        );
    }

    #[test]
    fn test_shapes() {
        let mut asm = ImageBuilder::new();
        asm.push(0).push(0).push(9).push(9).push(0x42).builtin(bi::BLOCK);
        asm.push(1).push(1).push(8).push(8).push(1).builtin(bi::RECTANGLE);
        asm.push(1).push(1).push(8).push(8).push(0).push(1).builtin(bi::BOX);
        asm.push(50).push(40).push(10).push(1).push(1).builtin(bi::CIRCLE);
        asm.push(50).push(40).push(10).push(5).push(0).push(0x40).builtin(bi::ELLIPSE);
        asm.halt();
        let h = run(&asm);
        assert_eq!(
            h.log.entries(),
            vec![
                "[draw rect 0, 0, 9, 9, fill, screen, invert]",
                "[draw rect 1, 1, 8, 8, no-fill, buffer, normal]",
                "[draw rect 1, 1, 8, 8, no-fill, screen, normal]",
                "[draw oval 50, 40, 10, 10, fill, screen, normal]",
                "[draw oval 50, 40, 10, 5, no-fill, buffer, clear]",
            ]
        );
    }

    #[test]
    fn test_invalid_shape_mode_is_fatal() {
        let mut asm = ImageBuilder::new();
        asm.push(0).push(0).push(3).builtin(bi::POINT).halt();
        let mut h = harness(&asm);
        assert_eq!(h.runtime.run(None), Err(VmError::InvalidShapeMode(3)));
    }

    #[test]
    fn test_get_block_masks_arguments() {
        let mut asm = ImageBuilder::new();
        asm.push(-8).push(0).push(16).push(2).push(0).push_i16(0x3000);
        asm.builtin(bi::GET_BLOCK).halt();
        let h = run(&asm);
        assert_eq!(
            h.log.entries(),
            vec!["[get block 65528, 0, 16, 2, buffer, 0x3000]"]
        );
    }

    #[test]
    fn test_set_screen_and_locate() {
        let mut asm = ImageBuilder::new();
        asm.push(1).builtin(bi::SET_SCREEN);
        asm.push(2).push(3).builtin(bi::LOCATE);
        asm.push(b'x' as i32).builtin(bi::PUTCHAR);
        asm.push(0x80).builtin(bi::UPDATE_LCD).halt();
        let h = run(&asm);
        let entries = h.log.entries();
        assert_eq!(entries[0], "[set text mode to Small]");
        assert!(entries.contains(&"[locate to (x: 3, y: 2)]".to_string()));
        assert!(entries.contains(&"[add byte x]".to_string()));
        assert_eq!(
            entries.last().map(String::as_str),
            Some("[render text to screen: 0b10000000]")
        );
    }

    // ========================================================================
    // Keys, time and misc
    // ========================================================================

    #[test]
    fn test_keys() {
        let mut asm = ImageBuilder::new();
        asm.builtin(bi::GETCHAR);
        asm.push(1).builtin(bi::GET_WORD);
        asm.push(0x80).builtin(bi::CHECK_KEY);
        asm.push(65).builtin(bi::CHECK_KEY);
        asm.push(65).builtin(bi::RELEASE_KEY);
        asm.push(-1).builtin(bi::RELEASE_KEY);
        asm.halt();
        let mut h = harness_with_keys(&asm, vec![keys::ENTER, b'a' as i32]);
        h.runtime.run(None).unwrap();
        let mut stack = h.runtime.stack().clone();
        assert_eq!(stack.shrink(4).unwrap(), vec![13, 97, 0, 0]);
        let entries = h.log.entries();
        assert!(entries.contains(&"[revalidate key 65]".to_string()));
        assert!(entries.contains(&"[revalidate all keys]".to_string()));
    }

    #[test]
    fn test_get_time_layout() {
        let mut asm = ImageBuilder::new();
        asm.push_i16(0x3000).builtin(bi::GET_TIME).builtin(bi::GETMS).halt();
        let h = run(&asm);
        // 2024-02-29 was a Thursday
        assert_eq!(
            h.runtime.ram().read_range(0x3000, 8),
            vec![0xe8, 0x07, 1, 29, 13, 45, 30, 5]
        );
        assert_eq!(top(&h), 192);
    }

    #[test]
    fn test_rand_is_seeded() {
        let mut asm = ImageBuilder::new();
        asm.push(0).builtin(bi::SRAND).builtin(bi::RAND).builtin(bi::RAND).halt();
        let h = run(&asm);
        let mut stack = h.runtime.stack().clone();
        assert_eq!(stack.shrink(2).unwrap(), vec![0, 346]);
    }

    #[test]
    fn test_trig_and_abs() {
        let mut asm = ImageBuilder::new();
        asm.push(90).builtin(bi::SIN);
        asm.push(180).builtin(bi::COS);
        asm.push_i32(i32::MIN).builtin(bi::ABS);
        asm.halt();
        let h = run(&asm);
        let mut stack = h.runtime.stack().clone();
        assert_eq!(stack.shrink(3).unwrap(), vec![1024, -1024, i32::MIN]);
    }

    #[test]
    fn test_exit_and_fill_area() {
        let mut asm = ImageBuilder::new();
        asm.push(1).push(2).push(3).builtin(bi::FILL_AREA);
        asm.builtin(bi::EXIT).op(op::NOP);
        let h = run(&asm);
        assert!(h.runtime.stack().is_empty());
    }

    // ========================================================================
    // Files
    // ========================================================================

    #[test]
    fn test_file_round_trip() {
        let mut asm = ImageBuilder::new();
        // fp = fopen("data.bin", "w"), stored at 0x2f00
        asm.push_i16(0x2f00)
            .op(op::PTR_U8)
            .push_string(b"data.bin")
            .push_string(b"w")
            .builtin(bi::FOPEN)
            .op(op::STORE)
            .op(op::POP);
        asm.push(b'L' as i32).op_u16(op::PUSH_U8_ABS, 0x2f00).builtin(bi::PUTC);
        asm.init_data(0x3000, b"ava");
        asm.push_i16(0x3000).push(1).push(3).op_u16(op::PUSH_U8_ABS, 0x2f00);
        asm.builtin(bi::FWRITE);
        asm.op_u16(op::PUSH_U8_ABS, 0x2f00).builtin(bi::FTELL);
        // reading a write-only file fails
        asm.op_u16(op::PUSH_U8_ABS, 0x2f00).builtin(bi::GETC);
        asm.op_u16(op::PUSH_U8_ABS, 0x2f00).builtin(bi::FCLOSE);
        asm.halt();
        let h = run(&asm);
        let mut stack = h.runtime.stack().clone();
        assert_eq!(stack.shrink(4).unwrap(), vec![b'L' as i32, 3, 4, -1]);
        assert_eq!(std::fs::read(h.dir.path().join("data.bin")).unwrap(), b"Lava");
    }

    #[test]
    fn test_fseek_and_eof() {
        let dir_asm = |asm: &mut ImageBuilder| {
            asm.push_i16(0x2f00)
                .op(op::PTR_U8)
                .push_string(b"/seek.txt")
                .push_string(b"r")
                .builtin(bi::FOPEN)
                .op(op::STORE)
                .op(op::POP);
        };
        let mut asm = ImageBuilder::new();
        dir_asm(&mut asm);
        asm.op_u16(op::PUSH_U8_ABS, 0x2f00).push(-2).push(2).builtin(bi::FSEEK);
        asm.op_u16(op::PUSH_U8_ABS, 0x2f00).builtin(bi::GETC);
        asm.op_u16(op::PUSH_U8_ABS, 0x2f00).push(99).push(0).builtin(bi::FSEEK);
        asm.op_u16(op::PUSH_U8_ABS, 0x2f00).push(0).push(7).builtin(bi::FSEEK);
        asm.op_u16(op::PUSH_U8_ABS, 0x2f00).push(1).push(1).builtin(bi::FSEEK);
        asm.op_u16(op::PUSH_U8_ABS, 0x2f00).builtin(bi::FEOF);
        asm.push(0x90).builtin(bi::FEOF);
        asm.halt();

        let mut h = harness(&asm);
        std::fs::write(h.dir.path().join("seek.txt"), b"abcdef").unwrap();
        h.runtime.run(None).unwrap();
        let mut stack = h.runtime.stack().clone();
        assert_eq!(
            stack.shrink(7).unwrap(),
            vec![4, b'e' as i32, -1, -1, 6, -1, -1]
        );
    }

    #[test]
    fn test_fopen_failures_return_zero() {
        let mut asm = ImageBuilder::new();
        asm.push_string(b"missing.txt").push_string(b"r").builtin(bi::FOPEN);
        asm.push_string(b"../escape.txt").push_string(b"w").builtin(bi::FOPEN);
        asm.push_string(b"x.txt").push_string(b"rw").builtin(bi::FOPEN);
        asm.halt();
        let h = run(&asm);
        let mut stack = h.runtime.stack().clone();
        assert_eq!(stack.shrink(3).unwrap(), vec![0, 0, 0]);
    }

    #[test]
    fn test_directories() {
        let mut asm = ImageBuilder::new();
        asm.push_string(b"saves").builtin(bi::MAKE_DIR);
        asm.push_string(b"saves").builtin(bi::CHDIR);
        asm.push_string(b"nowhere").builtin(bi::CHDIR);
        asm.halt();
        let h = run(&asm);
        let mut stack = h.runtime.stack().clone();
        assert_eq!(stack.shrink(3).unwrap(), vec![-1, -1, 0]);
        assert_eq!(h.runtime.files().working_dir(), "/saves/");
        assert!(h.dir.path().join("saves").is_dir());
    }

    #[test]
    fn test_delete_file() {
        let mut asm = ImageBuilder::new();
        asm.push_string(b"old.sav").builtin(bi::DELETE_FILE);
        asm.push_string(b"old.sav").builtin(bi::DELETE_FILE);
        asm.halt();
        let mut h = harness(&asm);
        std::fs::write(h.dir.path().join("old.sav"), b"x").unwrap();
        h.runtime.run(None).unwrap();
        let mut stack = h.runtime.stack().clone();
        assert_eq!(stack.shrink(2).unwrap(), vec![-1, 0]);
    }

    #[test]
    fn test_choose_file_navigation() {
        let mut asm = ImageBuilder::new();
        asm.push_i16(0x3000).builtin(bi::FILE_LIST).halt();
        let keys = vec![keys::DOWN, keys::DOWN, keys::UP, keys::PAGE_DOWN, keys::ENTER];
        let mut h = harness_with_keys(&asm, keys);
        for name in ["c.lav", "a.lav", "b.lav"] {
            std::fs::write(h.dir.path().join(name), b"").unwrap();
        }
        h.runtime.run(None).unwrap();
        assert_eq!(top(&h), -1);
        assert_eq!(h.runtime.ram().get_string(0x3000), Some(b"c.lav".to_vec()));
        let highlights = h
            .log
            .entries()
            .into_iter()
            .filter(|e| e.starts_with("[draw rect"))
            .count();
        assert_eq!(highlights, 5);
    }

    #[test]
    fn test_choose_file_cancel() {
        let mut asm = ImageBuilder::new();
        asm.push_i16(0x3000).builtin(bi::FILE_LIST).halt();
        let mut h = harness_with_keys(&asm, vec![keys::ESCAPE]);
        std::fs::write(h.dir.path().join("a.lav"), b"").unwrap();
        h.runtime.run(None).unwrap();
        assert_eq!(top(&h), 0);
    }
}

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

//! Memory model of the virtual machine.
//!
//! The machine has a flat 64 KiB address space. Screen bitmaps and the text
//! grid are [`RamSegment`]s of the same [`Ram`], so writes through a segment
//! are visible to the interpreter and the other way round. For that reason
//! the byte cells use interior mutability and every accessor takes `&self`.
//!
//! Typed accessors are little-endian. Byte addresses wrap modulo 65536.

mod segment;

pub use segment::RamSegment;

use std::cell::Cell;
use std::rc::Rc;

use crate::error::{Result, VmError};

/// Size of the address space in bytes.
pub const RAM_SIZE: usize = 0x10000;

const ADDRESS_MASK: usize = RAM_SIZE - 1;

/// Memory that bytes can be read from.
pub trait ReadableMemory {
    /// Read the byte at `offset`.
    fn get_byte(&self, offset: usize) -> u8;

    /// Number of addressable bytes.
    fn size(&self) -> usize;

    /// Read a NUL-terminated string starting at `offset`, without the NUL.
    ///
    /// Returns `None` when no NUL occurs before the end of the memory.
    fn get_string(&self, offset: usize) -> Option<Vec<u8>> {
        let mut bytes = Vec::new();
        for address in offset..self.size() {
            match self.get_byte(address) {
                0 => return Some(bytes),
                b => bytes.push(b),
            }
        }
        None
    }
}

/// Memory that bytes can be written to.
pub trait WritableMemory {
    /// Write the byte at `offset`.
    fn set_byte(&self, offset: usize, value: u8);

    /// Set `count` bytes starting at `offset` to `value`.
    fn fill(&self, offset: usize, count: usize, value: u8) {
        for address in offset..offset + count {
            self.set_byte(address, value);
        }
    }
}

/// Typed little-endian view over readable and writable memory.
///
/// Values travel as `i32`, the machine's only arithmetic type. Setters
/// truncate to the accessor width.
pub trait RamModel: ReadableMemory + WritableMemory {
    fn get_u8(&self, address: usize) -> i32 {
        self.get_byte(address) as i32
    }

    fn get_u16(&self, address: usize) -> i32 {
        self.get_u8(address) | (self.get_u8(address + 1) << 8)
    }

    fn get_i16(&self, address: usize) -> i32 {
        self.get_u16(address) as u16 as i16 as i32
    }

    fn get_u24(&self, address: usize) -> i32 {
        self.get_u16(address) | (self.get_u8(address + 2) << 16)
    }

    fn get_i32(&self, address: usize) -> i32 {
        self.get_u24(address) | (self.get_u8(address + 3) << 24)
    }

    fn set_u8(&self, address: usize, value: i32) {
        self.set_byte(address, value as u8);
    }

    fn set_u16(&self, address: usize, value: i32) {
        self.set_i16(address, value);
    }

    fn set_i16(&self, address: usize, value: i32) {
        self.set_u8(address, value);
        self.set_u8(address + 1, value >> 8);
    }

    fn set_u24(&self, address: usize, value: i32) {
        self.set_i16(address, value);
        self.set_u8(address + 2, value >> 16);
    }

    fn set_i32(&self, address: usize, value: i32) {
        self.set_u24(address, value);
        self.set_u8(address + 3, value >> 24);
    }

    /// Copy `count` bytes from `src` to `dest`. The regions may overlap.
    fn copy(&self, dest: usize, src: usize, count: usize) {
        if src >= dest {
            for i in 0..count {
                self.set_byte(dest + i, self.get_byte(src + i));
            }
        } else {
            for i in (0..count).rev() {
                self.set_byte(dest + i, self.get_byte(src + i));
            }
        }
    }
}

/// The 64 KiB main memory.
pub struct Ram {
    cells: Box<[Cell<u8>]>,
}

impl Ram {
    /// Create zeroed memory.
    pub fn new() -> Self {
        Self {
            cells: (0..RAM_SIZE).map(|_| Cell::new(0)).collect(),
        }
    }

    /// Create zeroed memory ready to be shared with segments.
    pub fn shared() -> Rc<Self> {
        Rc::new(Self::new())
    }

    /// Create a segment aliasing `size` bytes from `start`.
    pub fn segment(self: &Rc<Self>, start: usize, size: usize) -> RamSegment {
        RamSegment::new(Rc::clone(self), start, size)
    }

    /// Copy `len` bytes starting at `start` out of memory.
    pub fn read_range(&self, start: usize, len: usize) -> Vec<u8> {
        (start..start + len).map(|a| self.get_byte(a)).collect()
    }

    /// Copy `bytes` into memory starting at `start`.
    pub fn write_range(&self, start: usize, bytes: &[u8]) {
        for (i, &b) in bytes.iter().enumerate() {
            self.set_byte(start + i, b);
        }
    }

    /// Zero the whole address space.
    pub fn clear(&self) {
        self.fill(0, RAM_SIZE, 0);
    }
}

impl Default for Ram {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadableMemory for Ram {
    fn get_byte(&self, offset: usize) -> u8 {
        self.cells[offset & ADDRESS_MASK].get()
    }

    fn size(&self) -> usize {
        RAM_SIZE
    }
}

impl WritableMemory for Ram {
    fn set_byte(&self, offset: usize, value: u8) {
        self.cells[offset & ADDRESS_MASK].set(value);
    }
}

impl RamModel for Ram {}

/// Check that `len` bytes from `address` lie inside the address space.
pub fn check_range(address: usize, len: usize) -> Result<()> {
    if address + len > RAM_SIZE {
        return Err(VmError::MemoryRange { address, len });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ram_is_zeroed() {
        let ram = Ram::new();
        assert_eq!(ram.get_byte(0), 0);
        assert_eq!(ram.get_byte(0xffff), 0);
        assert_eq!(ram.size(), RAM_SIZE);
    }

    #[test]
    fn test_typed_accessors_little_endian() {
        let ram = Ram::new();
        ram.set_i32(0x10, 0x1234_5678);
        assert_eq!(ram.get_u8(0x10), 0x78);
        assert_eq!(ram.get_u8(0x13), 0x12);
        assert_eq!(ram.get_u16(0x10), 0x5678);
        assert_eq!(ram.get_u24(0x10), 0x34_5678);
        assert_eq!(ram.get_i32(0x10), 0x1234_5678);
    }

    #[test]
    fn test_i16_sign_extension() {
        let ram = Ram::new();
        ram.set_i16(0, -2);
        assert_eq!(ram.get_i16(0), -2);
        assert_eq!(ram.get_u16(0), 0xfffe);
    }

    #[test]
    fn test_address_wraps() {
        let ram = Ram::new();
        ram.set_u16(0xffff, 0xabcd);
        assert_eq!(ram.get_byte(0xffff), 0xcd);
        assert_eq!(ram.get_byte(0), 0xab);
        assert_eq!(ram.get_u16(0xffff), 0xabcd);
    }

    #[test]
    fn test_copy_overlapping_forward_and_backward() {
        let ram = Ram::new();
        ram.write_range(0, &[1, 2, 3, 4, 5]);
        ram.copy(1, 0, 4);
        assert_eq!(ram.read_range(0, 5), vec![1, 1, 2, 3, 4]);

        ram.write_range(0, &[1, 2, 3, 4, 5]);
        ram.copy(0, 1, 4);
        assert_eq!(ram.read_range(0, 5), vec![2, 3, 4, 5, 5]);
    }

    #[test]
    fn test_get_string() {
        let ram = Ram::new();
        ram.write_range(0x100, b"hello\0");
        assert_eq!(ram.get_string(0x100), Some(b"hello".to_vec()));
        assert_eq!(ram.get_string(0x105), Some(Vec::new()));
    }

    #[test]
    fn test_get_string_unterminated_at_end_of_ram() {
        let ram = Ram::new();
        ram.fill(0xfff0, 16, b'x');
        assert_eq!(ram.get_string(0xfff0), None);
    }

    #[test]
    fn test_check_range() {
        assert!(check_range(0xff00, 0x100).is_ok());
        assert_eq!(
            check_range(0xff00, 0x101),
            Err(VmError::MemoryRange {
                address: 0xff00,
                len: 0x101
            })
        );
    }
}

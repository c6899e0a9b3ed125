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

//! Tagged pointers.
//!
//! A pointer value on the data stack packs an address and the width of the
//! value it points to:
//!
//! ```text
//!  bit 23   22..16   15..0
//! +------+--------+--------+
//! | local|  width | offset |
//! +------+--------+--------+
//! ```
//!
//! When the local flag is set, the offset is relative to the current frame
//! base.

use crate::error::{Result, VmError};
use crate::memory::RamModel;

/// Flag marking a frame relative pointer.
///
/// Bit 23 rather than bit 19: widths take bits 16..22, so a width of 4
/// already sets bit 18 and a flag at bit 19 would collide with the field.
pub const LOCAL_FLAG: i32 = 0x0080_0000;

const WIDTH_SHIFT: u32 = 16;
const WIDTH_MASK: i32 = 0x7f;

/// Operand width of a tagged pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    /// Unsigned byte.
    U8 = 1,
    /// Signed 16 bit.
    I16 = 2,
    I32 = 4,
}

impl Width {
    pub fn from_bytes(bytes: i32) -> Option<Self> {
        match bytes {
            1 => Some(Width::U8),
            2 => Some(Width::I16),
            4 => Some(Width::I32),
            _ => None,
        }
    }

    /// Width bits of a pointer value.
    pub fn tag(self) -> i32 {
        (self as i32) << WIDTH_SHIFT
    }

    pub fn load<M: RamModel + ?Sized>(self, ram: &M, address: usize) -> i32 {
        match self {
            Width::U8 => ram.get_u8(address),
            Width::I16 => ram.get_i16(address),
            Width::I32 => ram.get_i32(address),
        }
    }

    pub fn store<M: RamModel + ?Sized>(self, ram: &M, address: usize, value: i32) {
        match self {
            Width::U8 => ram.set_u8(address, value),
            Width::I16 => ram.set_i16(address, value),
            Width::I32 => ram.set_i32(address, value),
        }
    }
}

/// Decoded pointer value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaggedPointer {
    pub offset: u16,
    pub width: Width,
    pub local: bool,
}

impl TaggedPointer {
    pub fn global(offset: u16, width: Width) -> Self {
        Self {
            offset,
            width,
            local: false,
        }
    }

    pub fn local(offset: u16, width: Width) -> Self {
        Self {
            offset,
            width,
            local: true,
        }
    }

    /// Decode a pointer value. Unknown widths are an error.
    pub fn decode(raw: i32) -> Result<Self> {
        let width = Width::from_bytes((raw >> WIDTH_SHIFT) & WIDTH_MASK)
            .ok_or(VmError::InvalidPointer(raw))?;
        Ok(Self {
            offset: raw as u16,
            width,
            local: raw & LOCAL_FLAG != 0,
        })
    }

    pub fn encode(self) -> i32 {
        let local = if self.local { LOCAL_FLAG } else { 0 };
        i32::from(self.offset) | self.width.tag() | local
    }

    /// Absolute address, given the frame base for local pointers.
    pub fn resolve(self, frame_base: Option<usize>) -> Result<usize> {
        let offset = usize::from(self.offset);
        if self.local {
            Ok(offset + frame_base.ok_or(VmError::NoFrame)?)
        } else {
            Ok(offset)
        }
    }
}

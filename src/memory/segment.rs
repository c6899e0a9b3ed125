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

//! Aliasing windows into main memory.

use std::rc::Rc;

use super::{Ram, RamModel, ReadableMemory, WritableMemory};

/// A window of `size` bytes of [`Ram`] starting at `start`.
///
/// Offsets are relative to `start`. A segment never copies: it reads and
/// writes the backing memory directly. Offsets are not bounds checked
/// against `size`, they simply land in the backing memory.
#[derive(Clone)]
pub struct RamSegment {
    ram: Rc<Ram>,
    start: usize,
    size: usize,
}

impl RamSegment {
    pub fn new(ram: Rc<Ram>, start: usize, size: usize) -> Self {
        Self { ram, start, size }
    }

    /// Address of the first byte in the backing memory.
    pub fn start(&self) -> usize {
        self.start
    }

    /// The backing memory.
    pub fn ram(&self) -> &Rc<Ram> {
        &self.ram
    }

    /// Zero the whole segment.
    pub fn zero(&self) {
        self.fill(0, self.size, 0);
    }

    /// Copy the segment's bytes out.
    pub fn to_vec(&self) -> Vec<u8> {
        self.ram.read_range(self.start, self.size)
    }
}

impl ReadableMemory for RamSegment {
    fn get_byte(&self, offset: usize) -> u8 {
        self.ram.get_byte(self.start + offset)
    }

    fn size(&self) -> usize {
        self.size
    }
}

impl WritableMemory for RamSegment {
    fn set_byte(&self, offset: usize, value: u8) {
        self.ram.set_byte(self.start + offset, value);
    }

    fn fill(&self, offset: usize, count: usize, value: u8) {
        self.ram.fill(self.start + offset, count, value);
    }
}

impl RamModel for RamSegment {
    fn copy(&self, dest: usize, src: usize, count: usize) {
        self.ram.copy(self.start + dest, self.start + src, count);
    }
}

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

//! CRC-16 and the XOR "Secret" cipher, both over machine memory.

use crate::memory::{ReadableMemory, WritableMemory};

const CRC16_TABLE: [u32; 16] = [
    0x0000, 0x1021, 0x2042, 0x3063, 0x4084, 0x50a5, 0x60c6, 0x70e7, 0x8108, 0x9129, 0xa14a,
    0xb16b, 0xc18c, 0xd1ad, 0xe1ce, 0xf1ef,
];

/// CRC-16 (polynomial 0x1021, initial value 0) of `len` bytes at `address`.
///
/// Processes each byte as two nibbles, high nibble first.
pub fn crc16<M: ReadableMemory + ?Sized>(mem: &M, address: usize, len: usize) -> i32 {
    let mut crc: u32 = 0;
    for addr in address..address + len {
        let b = mem.get_byte(addr) as u32;
        for nibble in [b >> 4, b & 0x0f] {
            let tmp = (crc >> 8) & 0xff;
            crc <<= 4;
            crc ^= CRC16_TABLE[((tmp >> 4) ^ nibble) as usize];
        }
    }
    (crc & 0xffff) as i32
}

/// XOR `count` bytes at `address` with `password`, cycling through it.
///
/// An empty password leaves memory untouched.
pub fn xor_encrypt<M>(mem: &M, address: usize, count: usize, password: &[u8])
where
    M: ReadableMemory + WritableMemory + ?Sized,
{
    if password.is_empty() {
        return;
    }
    for (addr, key) in (address..address + count).zip(password.iter().cycle()) {
        mem.set_byte(addr, mem.get_byte(addr) ^ key);
    }
}

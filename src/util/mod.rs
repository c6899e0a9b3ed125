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

//! Arithmetic helpers behind the built-in functions.
//!
//! - [`random`] - the 15 bit linear congruential generator
//! - [`checksum`] - CRC-16 and the XOR stream cipher
//! - [`trig`] - table driven integer sine and cosine
//! - [`clock`] - wall clock for the time built-ins

pub mod checksum;
pub mod clock;
pub mod random;
pub mod trig;

pub use checksum::{crc16, xor_encrypt};
pub use clock::{Clock, FixedClock, SystemClock};
pub use random::RandomGen;
pub use trig::{cos, sin};

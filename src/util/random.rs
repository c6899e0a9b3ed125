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

//! Pseudo random numbers for `rand`/`srand`.

/// Linear congruential generator producing 15 bit values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomGen {
    seed: i32,
}

impl RandomGen {
    pub fn new(seed: i32) -> Self {
        Self { seed }
    }

    /// Replace the seed.
    pub fn set_seed(&mut self, seed: i32) {
        self.seed = seed;
    }

    pub fn seed(&self) -> i32 {
        self.seed
    }

    /// Advance the generator and return a value in `0..=0x7fff`.
    pub fn next_value(&mut self) -> i32 {
        self.seed = self.seed.wrapping_mul(22_695_477).wrapping_add(1);
        ((self.seed as u32) >> 16) as i32 & 0x7fff
    }
}

impl Default for RandomGen {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_sequence() {
        let mut rng = RandomGen::new(0);
        assert_eq!(rng.next_value(), 0);
        assert_eq!(rng.next_value(), 346);
        assert_eq!(rng.next_value(), 130);
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = RandomGen::new(1234);
        let mut b = RandomGen::new(0);
        b.set_seed(1234);
        for _ in 0..100 {
            assert_eq!(a.next_value(), b.next_value());
        }
    }

    #[test]
    fn test_values_are_15_bit() {
        let mut rng = RandomGen::new(-7);
        for _ in 0..10_000 {
            let v = rng.next_value();
            assert!((0..=0x7fff).contains(&v));
        }
    }
}

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

//! Integer trigonometry scaled by 1024.

const SINE_90: [i32; 91] = [
    0, 18, 36, 54, 71, 89, 107, 125, 143, 160, 178, 195, 213, 230, 248, 265, 282, 299, 316, 333,
    350, 367, 384, 400, 416, 433, 449, 465, 481, 496, 512, 527, 543, 558, 573, 587, 602, 616, 630,
    644, 658, 672, 685, 698, 711, 724, 737, 749, 761, 773, 784, 796, 807, 818, 828, 839, 849, 859,
    868, 878, 887, 896, 904, 912, 920, 928, 935, 943, 949, 956, 962, 968, 974, 979, 984, 989, 994,
    998, 1002, 1005, 1008, 1011, 1014, 1016, 1018, 1020, 1022, 1023, 1023, 1024, 1024,
];

fn normalize(degrees: i32) -> usize {
    ((degrees & 0x7fff) % 360) as usize
}

/// Sine of `degrees` (low 15 bits used) in `-1024..=1024`.
pub fn sin(degrees: i32) -> i32 {
    let deg = normalize(degrees);
    match deg / 90 {
        0 => SINE_90[deg],
        1 => SINE_90[180 - deg],
        2 => -SINE_90[deg - 180],
        _ => -SINE_90[360 - deg],
    }
}

/// Cosine of `degrees` (low 15 bits used) in `-1024..=1024`.
pub fn cos(degrees: i32) -> i32 {
    let deg = normalize(degrees) as i32;
    if deg >= 270 {
        sin(deg - 270)
    } else {
        sin(deg + 90)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0, 0; "zero")]
    #[test_case(30, 512; "thirty")]
    #[test_case(90, 1024; "right angle")]
    #[test_case(150, 512; "second quadrant")]
    #[test_case(180, 0; "half turn")]
    #[test_case(210, -512; "third quadrant")]
    #[test_case(270, -1024; "three quarters")]
    #[test_case(330, -512; "fourth quadrant")]
    #[test_case(390, 512; "wraps at 360")]
    fn test_sin(degrees: i32, expected: i32) {
        assert_eq!(sin(degrees), expected);
    }

    #[test_case(0, 1024; "zero")]
    #[test_case(60, 512; "sixty")]
    #[test_case(90, 0; "right angle")]
    #[test_case(180, -1024; "half turn")]
    #[test_case(300, 512; "fourth quadrant")]
    fn test_cos(degrees: i32, expected: i32) {
        assert_eq!(cos(degrees), expected);
    }

    #[test]
    fn test_only_low_15_bits_count() {
        assert_eq!(sin(0x8000 + 90), sin(90));
        assert_eq!(sin(-1), sin(0x7fff));
    }
}

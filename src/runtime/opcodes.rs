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

//! Instruction encoding of LAV programs.
//!
//! Two disjoint ranges: general instructions `0x00..=0x51` and built-in
//! function calls `0x80..=0xCA`. Every other byte is illegal.

/// General instructions.
///
/// Naming: `PUSH_<width>_<source>` where source is
/// - IMM: immediate operand
/// - ABS: RAM at a u16 immediate address
/// - IDX: RAM at popped index + u16 immediate
/// - LOC: RAM at u16 immediate + frame base
/// - LIDX: RAM at popped index + u16 immediate + frame base
///
/// Binary operators pop the right operand first. `*_IMM` operators take
/// their right operand as an i16 immediate.
#[allow(dead_code)]
pub mod opcodes {
    pub const NOP: u8 = 0x00;

    pub const PUSH_U8_IMM: u8 = 0x01;
    pub const PUSH_I16_IMM: u8 = 0x02;
    pub const PUSH_I32_IMM: u8 = 0x03;

    pub const PUSH_U8_ABS: u8 = 0x04;
    pub const PUSH_I16_ABS: u8 = 0x05;
    pub const PUSH_I32_ABS: u8 = 0x06;

    pub const PUSH_U8_IDX: u8 = 0x07;
    pub const PUSH_I16_IDX: u8 = 0x08;
    pub const PUSH_I32_IDX: u8 = 0x09;

    // Tagged pointers to globals
    pub const PTR_U8_IDX: u8 = 0x0a;
    pub const PTR_I16_IDX: u8 = 0x0b;
    pub const PTR_I32_IDX: u8 = 0x0c;

    pub const PUSH_STRING: u8 = 0x0d;

    pub const PUSH_U8_LOC: u8 = 0x0e;
    pub const PUSH_I16_LOC: u8 = 0x0f;
    pub const PUSH_I32_LOC: u8 = 0x10;

    pub const PUSH_U8_LIDX: u8 = 0x11;
    pub const PUSH_I16_LIDX: u8 = 0x12;
    pub const PUSH_I32_LIDX: u8 = 0x13;

    // Tagged pointers to locals, already resolved to absolute addresses
    pub const PTR_U8_LIDX: u8 = 0x14;
    pub const PTR_I16_LIDX: u8 = 0x15;
    pub const PTR_I32_LIDX: u8 = 0x16;

    pub const ADDR_IDX: u8 = 0x17;
    pub const ADDR_LIDX: u8 = 0x18;
    pub const ADDR_LOC: u8 = 0x19;

    pub const PUSH_TEXT_ADDR: u8 = 0x1a;
    pub const PUSH_GRAPHICS_ADDR: u8 = 0x1b;

    pub const NEG: u8 = 0x1c;

    pub const PRE_INC: u8 = 0x1d;
    pub const PRE_DEC: u8 = 0x1e;
    pub const POST_INC: u8 = 0x1f;
    pub const POST_DEC: u8 = 0x20;

    pub const ADD: u8 = 0x21;
    pub const SUB: u8 = 0x22;
    pub const AND: u8 = 0x23;
    pub const OR: u8 = 0x24;
    pub const NOT: u8 = 0x25;
    pub const XOR: u8 = 0x26;
    pub const LOGICAL_AND: u8 = 0x27;
    pub const LOGICAL_OR: u8 = 0x28;
    pub const LOGICAL_NOT: u8 = 0x29;
    pub const MUL: u8 = 0x2a;
    pub const DIV: u8 = 0x2b;
    pub const REM: u8 = 0x2c;
    pub const SHL: u8 = 0x2d;
    pub const SHR: u8 = 0x2e;
    pub const EQ: u8 = 0x2f;
    pub const NE: u8 = 0x30;
    pub const LE: u8 = 0x31;
    pub const GE: u8 = 0x32;
    pub const GT: u8 = 0x33;
    pub const LT: u8 = 0x34;

    pub const STORE: u8 = 0x35;
    pub const LOAD_U8: u8 = 0x36;
    pub const PTR_U8: u8 = 0x37;
    pub const POP: u8 = 0x38;

    // Control flow
    pub const JZ: u8 = 0x39;
    pub const JNZ: u8 = 0x3a;
    pub const JMP: u8 = 0x3b;
    pub const SET_FRAME_BASE: u8 = 0x3c;
    pub const CALL: u8 = 0x3d;
    pub const ENTER: u8 = 0x3e;
    pub const RET: u8 = 0x3f;
    pub const HALT: u8 = 0x40;

    pub const INIT_DATA: u8 = 0x41;
    pub const PUSH_BUFFER_ADDR: u8 = 0x42;
    pub const SET_XOR_FACTOR: u8 = 0x43;
    pub const LOAD_ALL: u8 = 0x44;

    pub const ADD_IMM: u8 = 0x45;
    pub const SUB_IMM: u8 = 0x46;
    pub const MUL_IMM: u8 = 0x47;
    pub const DIV_IMM: u8 = 0x48;
    pub const REM_IMM: u8 = 0x49;
    pub const SHL_IMM: u8 = 0x4a;
    pub const SHR_IMM: u8 = 0x4b;
    pub const EQ_IMM: u8 = 0x4c;
    pub const NE_IMM: u8 = 0x4d;
    pub const GT_IMM: u8 = 0x4e;
    pub const LT_IMM: u8 = 0x4f;
    pub const GE_IMM: u8 = 0x50;
    pub const LE_IMM: u8 = 0x51;

    pub const LAST: u8 = LE_IMM;
}

/// Built-in functions.
#[allow(dead_code)]
pub mod builtins {
    pub const PUTCHAR: u8 = 0x80;
    pub const GETCHAR: u8 = 0x81;
    pub const PRINTF: u8 = 0x82;
    pub const STRCPY: u8 = 0x83;
    pub const STRLEN: u8 = 0x84;
    pub const SET_SCREEN: u8 = 0x85;
    pub const UPDATE_LCD: u8 = 0x86;
    pub const DELAY: u8 = 0x87;
    pub const WRITE_BLOCK: u8 = 0x88;
    pub const REFRESH: u8 = 0x89;
    pub const TEXT_OUT: u8 = 0x8a;
    pub const BLOCK: u8 = 0x8b;
    pub const RECTANGLE: u8 = 0x8c;
    pub const EXIT: u8 = 0x8d;
    pub const CLEAR_SCREEN: u8 = 0x8e;
    pub const ABS: u8 = 0x8f;
    pub const RAND: u8 = 0x90;
    pub const SRAND: u8 = 0x91;
    pub const LOCATE: u8 = 0x92;
    pub const INKEY: u8 = 0x93;
    pub const POINT: u8 = 0x94;
    pub const GET_POINT: u8 = 0x95;
    pub const LINE: u8 = 0x96;
    pub const BOX: u8 = 0x97;
    pub const CIRCLE: u8 = 0x98;
    pub const ELLIPSE: u8 = 0x99;
    pub const BEEP: u8 = 0x9a;

    // ctype
    pub const ISALNUM: u8 = 0x9b;
    pub const ISALPHA: u8 = 0x9c;
    pub const ISCNTRL: u8 = 0x9d;
    pub const ISDIGIT: u8 = 0x9e;
    pub const ISGRAPH: u8 = 0x9f;
    pub const ISLOWER: u8 = 0xa0;
    pub const ISPRINT: u8 = 0xa1;
    pub const ISPUNCT: u8 = 0xa2;
    pub const ISSPACE: u8 = 0xa3;
    pub const ISUPPER: u8 = 0xa4;
    pub const ISXDIGIT: u8 = 0xa5;

    pub const STRCAT: u8 = 0xa6;
    pub const STRCHR: u8 = 0xa7;
    pub const STRCMP: u8 = 0xa8;
    pub const STRSTR: u8 = 0xa9;
    pub const TOLOWER: u8 = 0xaa;
    pub const TOUPPER: u8 = 0xab;
    pub const MEMSET: u8 = 0xac;
    pub const MEMCPY: u8 = 0xad;

    // Files
    pub const FOPEN: u8 = 0xae;
    pub const FCLOSE: u8 = 0xaf;
    pub const FREAD: u8 = 0xb0;
    pub const FWRITE: u8 = 0xb1;
    pub const FSEEK: u8 = 0xb2;
    pub const FTELL: u8 = 0xb3;
    pub const FEOF: u8 = 0xb4;
    pub const REWIND: u8 = 0xb5;
    pub const GETC: u8 = 0xb6;
    pub const PUTC: u8 = 0xb7;
    pub const SPRINTF: u8 = 0xb8;
    pub const MAKE_DIR: u8 = 0xb9;
    pub const DELETE_FILE: u8 = 0xba;

    pub const GETMS: u8 = 0xbb;
    pub const CHECK_KEY: u8 = 0xbc;
    pub const MEMMOVE: u8 = 0xbd;
    pub const CRC16: u8 = 0xbe;
    pub const SECRET: u8 = 0xbf;
    pub const CHDIR: u8 = 0xc0;
    pub const FILE_LIST: u8 = 0xc1;
    pub const GET_TIME: u8 = 0xc2;
    pub const SET_TIME: u8 = 0xc3;
    pub const GET_WORD: u8 = 0xc4;
    pub const XDRAW: u8 = 0xc5;
    pub const RELEASE_KEY: u8 = 0xc6;
    pub const GET_BLOCK: u8 = 0xc7;
    pub const SIN: u8 = 0xc8;
    pub const COS: u8 = 0xc9;
    pub const FILL_AREA: u8 = 0xca;

    pub const FIRST: u8 = PUTCHAR;
    pub const LAST: u8 = FILL_AREA;
}

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

//! Error types for the Lava GVM emulator.
//!
//! Errors come in three tiers:
//!
//! - [`FormatError`] - the code image could not be loaded
//! - [`VmError`] - a fatal condition that stops the running program
//! - [`FileError`] - a recoverable file store failure; built-ins turn these
//!   into sentinel values (0, -1 or false) for the program

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for interpreter operations.
pub type Result<T> = std::result::Result<T, VmError>;

/// Errors raised while loading a LAV code image.
#[derive(Debug, Error)]
pub enum FormatError {
    /// The image source could not be read.
    #[error("Cannot read code image: {0}")]
    Io(#[from] io::Error),

    /// The image is not larger than its 16 byte header.
    #[error("Code image too short: {0} bytes")]
    TooShort(usize),

    /// The image does not start with `LAV`.
    #[error("Not a LAV image: bad magic bytes")]
    BadMagic,

    /// The version byte is not supported.
    #[error("Unsupported LAV version 0x{0:02x}")]
    UnsupportedVersion(u8),

    /// A jump or call names a label that was never defined.
    #[error("Undefined label '{0}'")]
    UndefinedLabel(String),
}

/// Fatal errors of the interpreter.
///
/// Once one of these is returned the current run is over.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    /// The byte at the program counter is not an opcode.
    #[error("Illegal opcode 0x{opcode:02x} at 0x{pc:06x}")]
    IllegalOpcode { opcode: u8, pc: usize },

    /// Push onto a full data stack.
    #[error("Data stack overflow")]
    StackOverflow,

    /// Pop or peek past the bottom of the data stack.
    #[error("Data stack underflow")]
    StackUnderflow,

    /// A call frame grew past the frame stack region.
    #[error("Frame stack overflow at frame base 0x{base:04x}")]
    FrameOverflow { base: usize },

    /// Frame relative access before a frame base was set.
    #[error("No active call frame")]
    NoFrame,

    /// A tagged pointer carries an unknown operand width.
    #[error("Invalid pointer 0x{0:08x}")]
    InvalidPointer(i32),

    /// A memory range could not be resolved inside the 64 KiB address space.
    #[error("Memory range 0x{address:04x}+{len} is outside the address space")]
    MemoryRange { address: usize, len: usize },

    /// A string scan reached the end of RAM without meeting a NUL.
    #[error("Unterminated string at 0x{0:04x}")]
    UnterminatedString(usize),

    /// Integer division or remainder by zero.
    #[error("Division by zero")]
    DivisionByZero,

    /// A shape was drawn with draw mode 3.
    #[error("Invalid shape draw mode {0}")]
    InvalidShapeMode(i32),

    /// An instruction or immediate was fetched past the end of the image.
    #[error("Code fetch out of bounds at 0x{0:06x}")]
    CodeOutOfBounds(usize),

    /// `prepare` was called without a loaded image.
    #[error("No code image loaded")]
    NoCode,
}

/// Recoverable errors of the sandboxed file store.
#[derive(Debug, Error)]
pub enum FileError {
    /// An underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The path resolves outside the sandbox root.
    #[error("Path escapes the file store root: {0}")]
    OutsideRoot(PathBuf),

    /// The path is not absolute inside the store.
    #[error("Path must be absolute: {0}")]
    RelativePath(String),

    /// All handles are in use.
    #[error("Too many open files")]
    NoFreeHandle,

    /// The file is already open under another handle.
    #[error("File is already open: {0}")]
    AlreadyOpen(String),

    /// The `fopen` mode string is not recognized.
    #[error("Invalid open mode: {0:?}")]
    InvalidMode(String),

    /// The handle does not name an open file.
    #[error("Invalid file handle 0x{0:02x}")]
    InvalidHandle(i32),

    /// The handle was not opened for this kind of access.
    #[error("File handle 0x{0:02x} does not permit this access")]
    AccessDenied(i32),

    /// The path does not name a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(String),

    /// A seek target outside `0..=size`.
    #[error("Offset {offset} outside file of {size} bytes")]
    OffsetOutOfBounds { offset: i64, size: usize },
}

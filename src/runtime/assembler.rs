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

//! Builder for LAV code images.
//!
//! Used by tests, benchmarks and fuzzing to write small programs by hand:
//!
//! ```
//! use lava_gvm::runtime::assembler::ImageBuilder;
//! use lava_gvm::runtime::opcodes::builtins;
//!
//! let mut asm = ImageBuilder::new();
//! asm.push_string(b"hi");
//! asm.push_u8(1);
//! asm.builtin(builtins::PRINTF);
//! asm.halt();
//! let image = asm.build().unwrap();
//! assert_eq!(&image[..3], b"LAV");
//! ```

use super::opcodes::opcodes;
use super::{CODE_START, LAV_MAGIC, LAV_VERSION};
use crate::error::FormatError;
use std::collections::HashMap;

/// A code address to patch once its label is defined.
#[derive(Debug, Clone)]
struct PendingJump {
    code_offset: usize,
    target_label: String,
}

/// Emits instructions into a LAV image.
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    code: Vec<u8>,
    labels: HashMap<String, usize>,
    pending: Vec<PendingJump>,
    xor_factor: u8,
}

impl ImageBuilder {
    /// Start an image with a valid header.
    pub fn new() -> Self {
        let mut code = Vec::with_capacity(256);
        code.extend_from_slice(LAV_MAGIC);
        code.push(LAV_VERSION);
        code.resize(CODE_START, 0);
        Self {
            code,
            labels: HashMap::new(),
            pending: Vec::new(),
            xor_factor: 0,
        }
    }

    /// Code address of the next emitted byte.
    pub fn position(&self) -> usize {
        self.code.len()
    }

    pub fn emit_byte(&mut self, byte: u8) -> &mut Self {
        self.code.push(byte);
        self
    }

    pub fn emit_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.code.extend_from_slice(bytes);
        self
    }

    pub fn emit_u16(&mut self, value: u16) -> &mut Self {
        self.emit_bytes(&value.to_le_bytes())
    }

    pub fn emit_u24(&mut self, value: u32) -> &mut Self {
        self.emit_bytes(&value.to_le_bytes()[..3])
    }

    pub fn emit_i32(&mut self, value: i32) -> &mut Self {
        self.emit_bytes(&value.to_le_bytes())
    }

    /// Emit an opcode without operands.
    pub fn op(&mut self, opcode: u8) -> &mut Self {
        self.emit_byte(opcode)
    }

    /// Emit an opcode with a u16 operand.
    pub fn op_u16(&mut self, opcode: u8, operand: u16) -> &mut Self {
        self.emit_byte(opcode).emit_u16(operand)
    }

    /// Emit an opcode with an i16 operand.
    pub fn op_i16(&mut self, opcode: u8, operand: i16) -> &mut Self {
        self.emit_byte(opcode).emit_u16(operand as u16)
    }

    pub fn builtin(&mut self, function: u8) -> &mut Self {
        self.emit_byte(function)
    }

    pub fn push_u8(&mut self, value: u8) -> &mut Self {
        self.emit_byte(opcodes::PUSH_U8_IMM).emit_byte(value)
    }

    pub fn push_i16(&mut self, value: i16) -> &mut Self {
        self.op_i16(opcodes::PUSH_I16_IMM, value)
    }

    pub fn push_i32(&mut self, value: i32) -> &mut Self {
        self.emit_byte(opcodes::PUSH_I32_IMM).emit_i32(value)
    }

    /// Push `value` with the shortest immediate form.
    pub fn push(&mut self, value: i32) -> &mut Self {
        if let Ok(v) = u8::try_from(value) {
            self.push_u8(v)
        } else if let Ok(v) = i16::try_from(value) {
            self.push_i16(v)
        } else {
            self.push_i32(value)
        }
    }

    /// Push a string literal. `text` must not contain NUL.
    pub fn push_string(&mut self, text: &[u8]) -> &mut Self {
        self.emit_byte(opcodes::PUSH_STRING);
        let factor = self.xor_factor;
        for &b in text.iter().chain(std::iter::once(&0)) {
            self.code.push(b ^ factor);
        }
        self
    }

    /// Set the factor later string literals are XOR-ed with.
    pub fn set_xor_factor(&mut self, factor: u8) -> &mut Self {
        self.xor_factor = factor;
        self.emit_byte(opcodes::SET_XOR_FACTOR).emit_byte(factor)
    }

    /// Copy `bytes` into RAM at `address` when executed.
    pub fn init_data(&mut self, address: u16, bytes: &[u8]) -> &mut Self {
        let len = u16::try_from(bytes.len()).unwrap_or(u16::MAX);
        self.op_u16(opcodes::INIT_DATA, address)
            .emit_u16(len)
            .emit_bytes(&bytes[..len as usize])
    }

    pub fn set_frame_base(&mut self, base: u16) -> &mut Self {
        self.op_u16(opcodes::SET_FRAME_BASE, base)
    }

    /// Function prologue reserving `frame_size` bytes and taking `argc`
    /// arguments from the data stack.
    pub fn enter(&mut self, frame_size: u16, argc: u8) -> &mut Self {
        self.op_u16(opcodes::ENTER, frame_size).emit_byte(argc)
    }

    pub fn ret(&mut self) -> &mut Self {
        self.op(opcodes::RET)
    }

    pub fn halt(&mut self) -> &mut Self {
        self.op(opcodes::HALT)
    }

    /// Define `name` at the current position.
    pub fn label(&mut self, name: &str) -> &mut Self {
        self.labels.insert(name.to_string(), self.position());
        self
    }

    fn op_label(&mut self, opcode: u8, label: &str) -> &mut Self {
        self.emit_byte(opcode);
        self.pending.push(PendingJump {
            code_offset: self.position(),
            target_label: label.to_string(),
        });
        self.emit_u24(0)
    }

    pub fn jmp(&mut self, label: &str) -> &mut Self {
        self.op_label(opcodes::JMP, label)
    }

    /// Jump if the last popped value is zero.
    pub fn jz(&mut self, label: &str) -> &mut Self {
        self.op_label(opcodes::JZ, label)
    }

    /// Jump if the last popped value is nonzero.
    pub fn jnz(&mut self, label: &str) -> &mut Self {
        self.op_label(opcodes::JNZ, label)
    }

    pub fn call(&mut self, label: &str) -> &mut Self {
        self.op_label(opcodes::CALL, label)
    }

    /// Resolve labels and return the image.
    pub fn build(&self) -> Result<Vec<u8>, FormatError> {
        let mut code = self.code.clone();
        for jump in &self.pending {
            let target = self
                .labels
                .get(&jump.target_label)
                .ok_or_else(|| FormatError::UndefinedLabel(jump.target_label.clone()))?;
            code[jump.code_offset..jump.code_offset + 3]
                .copy_from_slice(&(*target as u32).to_le_bytes()[..3]);
        }
        Ok(code)
    }
}

impl Default for ImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_header() {
        let image = ImageBuilder::new().build().unwrap();
        assert_eq!(image.len(), CODE_START);
        assert_eq!(&image[..4], b"LAV\x12");
    }

    #[test]
    fn test_push_picks_shortest_form() {
        let mut asm = ImageBuilder::new();
        asm.push(7).push(-2).push(0x12345);
        let image = asm.build().unwrap();
        assert_eq!(
            &image[CODE_START..],
            &[0x01, 7, 0x02, 0xfe, 0xff, 0x03, 0x45, 0x23, 0x01, 0x00]
        );
    }

    #[test]
    fn test_forward_label() {
        let mut asm = ImageBuilder::new();
        asm.jmp("end").op(opcodes::NOP).label("end").halt();
        let image = asm.build().unwrap();
        assert_eq!(&image[16..20], &[opcodes::JMP, 21, 0, 0]);
    }

    #[test]
    fn test_undefined_label() {
        let mut asm = ImageBuilder::new();
        asm.call("missing");
        assert!(matches!(
            asm.build(),
            Err(FormatError::UndefinedLabel(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_string_literal_is_xored() {
        let mut asm = ImageBuilder::new();
        asm.set_xor_factor(0x20).push_string(b"AB");
        let image = asm.build().unwrap();
        assert_eq!(&image[18..], &[opcodes::PUSH_STRING, b'a', b'b', 0x20]);
    }
}

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

//! The LAV interpreter.
//!
//! [`Runtime`] owns the program counter, the data stack and the call frame
//! pointers, and drives the passive models (RAM, screen, text, keyboard,
//! files) through its instructions and built-in functions. A host loads an
//! image, calls [`Runtime::prepare`] and then [`Runtime::run_one_step`]
//! until it reports that the program is over.

pub mod assembler;
mod builtins;
pub mod opcodes;
mod pointer;
mod stack;

pub use pointer::{TaggedPointer, Width, LOCAL_FLAG};
pub use stack::{DataStack, DATA_STACK_CAPACITY};

use crate::config::{Config, RamPolicy};
use crate::error::{FileError, FormatError, Result, VmError};
use crate::file::{DefaultFileSystem, FileManager, FileSystem};
use crate::keyboard::KeyboardModel;
use crate::memory::{Ram, RamModel, WritableMemory};
use crate::screen::{DefaultScreenModel, ScreenModel, BITMAP_SIZE};
use crate::text::{DefaultTextModel, FontTable, TextModel, TEXT_GRID_SIZE};
use crate::util::{Clock, RandomGen, SystemClock};
use opcodes::{builtins as bi, opcodes as op};
use std::io::Read;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{error, info};

/// Magic bytes opening every image.
pub const LAV_MAGIC: &[u8; 3] = b"LAV";
/// The only supported image version.
pub const LAV_VERSION: u8 = 0x12;
/// Offset of the first instruction.
pub const CODE_START: usize = 16;

pub const TEXT_BUFFER_ADDRESS: usize = 0x0000;
pub const GRAPHICS_ADDRESS: usize = 0x0100;
pub const GRAPHICS_BUFFER_ADDRESS: usize = 0x0900;

pub const STRING_STACK_ADDRESS: usize = 0x1000;
pub const STRING_STACK_CAPACITY: usize = 1024;

/// Start of globals and of the frame stack region.
pub const GLOBAL_BASE: usize = 0x2000;
pub const FRAME_STACK_CAPACITY: usize = 20 * 1024;

/// Longest file name, in GB2312 bytes, the file chooser lists.
pub const MAX_PATH: usize = 18;

const RETURN_ADDRESS_BYTES: usize = 3;
/// Return address plus saved frame base.
const FRAME_HEADER_BYTES: usize = RETURN_ADDRESS_BYTES + 2;

/// Frame pointers, set by the first `SET_FRAME_BASE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePointers {
    pub base: usize,
    /// Start of the next frame.
    pub end: usize,
    pub initial: usize,
}

/// The collaborators a [`Runtime`] drives.
pub struct Models {
    pub screen: Box<dyn ScreenModel>,
    pub text: Box<dyn TextModel>,
    pub keyboard: Arc<dyn KeyboardModel>,
    pub file_system: Box<dyn FileSystem>,
}

impl Models {
    /// The default models over `ram`, rooted at `config.fs_root`.
    pub fn standard(
        ram: &Rc<Ram>,
        config: &Config,
        keyboard: Arc<dyn KeyboardModel>,
    ) -> std::result::Result<Self, FileError> {
        let font = Rc::new(FontTable::load_or_blank(config.font_dir.as_deref()));
        let screen = DefaultScreenModel::new(
            ram.segment(GRAPHICS_ADDRESS, BITMAP_SIZE),
            ram.segment(GRAPHICS_BUFFER_ADDRESS, BITMAP_SIZE),
            font,
        );
        let text = DefaultTextModel::new(ram.segment(TEXT_BUFFER_ADDRESS, TEXT_GRID_SIZE));
        let file_system = DefaultFileSystem::create(&config.fs_root)?;
        Ok(Self {
            screen: Box::new(screen),
            text: Box::new(text),
            keyboard,
            file_system: Box::new(file_system),
        })
    }
}

/// The virtual machine.
pub struct Runtime {
    ram: Rc<Ram>,
    screen: Box<dyn ScreenModel>,
    text: Box<dyn TextModel>,
    keyboard: Arc<dyn KeyboardModel>,
    files: FileManager,
    clock: Box<dyn Clock>,

    code: Vec<u8>,
    pc: usize,
    /// Address of the instruction being executed.
    op_pc: usize,
    stack: DataStack,
    frames: Option<FramePointers>,
    string_ptr: usize,
    xor_factor: u8,
    rng: RandomGen,
    over: bool,
    ram_policy: RamPolicy,
}

impl Runtime {
    pub fn new(ram: Rc<Ram>, models: Models, config: &Config) -> Self {
        Self {
            ram,
            screen: models.screen,
            text: models.text,
            keyboard: models.keyboard,
            files: FileManager::new(models.file_system),
            clock: Box::new(SystemClock),
            code: Vec::new(),
            pc: CODE_START,
            op_pc: CODE_START,
            stack: DataStack::default(),
            frames: None,
            string_ptr: STRING_STACK_ADDRESS,
            xor_factor: 0,
            rng: RandomGen::default(),
            over: true,
            ram_policy: config.ram_policy,
        }
    }

    /// A runtime with the default models.
    pub fn create(
        config: &Config,
        keyboard: Arc<dyn KeyboardModel>,
    ) -> std::result::Result<Self, FileError> {
        let ram = Ram::shared();
        let models = Models::standard(&ram, config, keyboard)?;
        Ok(Self::new(ram, models, config))
    }

    /// Replace the wall clock used by `GetTime` and `Getms`.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn ram(&self) -> &Rc<Ram> {
        &self.ram
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn stack(&self) -> &DataStack {
        &self.stack
    }

    pub fn frames(&self) -> Option<FramePointers> {
        self.frames
    }

    pub fn is_over(&self) -> bool {
        self.over
    }

    pub fn files(&self) -> &FileManager {
        &self.files
    }

    pub fn text_model(&self) -> &dyn TextModel {
        self.text.as_ref()
    }

    /// Read a whole image and check its header.
    pub fn load_code(&mut self, mut input: impl Read) -> std::result::Result<(), FormatError> {
        let mut code = Vec::new();
        input.read_to_end(&mut code)?;
        verify_header(&code)?;
        info!(bytes = code.len(), "Loaded code image");
        self.code = code;
        self.over = true;
        Ok(())
    }

    /// Reset machine state for a fresh run of the loaded image.
    pub fn prepare(&mut self) -> Result<()> {
        if self.code.is_empty() {
            return Err(VmError::NoCode);
        }

        self.over = false;
        self.pc = CODE_START;
        self.op_pc = CODE_START;
        self.stack.clear();
        self.frames = None;

        if self.ram_policy == RamPolicy::ClearOnPrepare {
            self.ram.clear();
        }
        self.text.reset();
        self.ram.fill(GLOBAL_BASE, FRAME_STACK_CAPACITY, 0);

        self.string_ptr = STRING_STACK_ADDRESS;
        self.xor_factor = 0;
        self.keyboard.reset();
        self.files.reset();

        info!(policy = ?self.ram_policy, "Prepared run");
        Ok(())
    }

    /// Close files left open by the program.
    pub fn clean_up(&mut self) {
        self.files.close_all_files();
    }

    /// Copy of the visible bitmap.
    pub fn graphics_snapshot(&self) -> Vec<u8> {
        self.ram.read_range(GRAPHICS_ADDRESS, BITMAP_SIZE)
    }

    /// Execute one instruction and return whether the program is over.
    ///
    /// A fatal error ends the run; later calls return `Ok(true)`.
    pub fn run_one_step(&mut self) -> Result<bool> {
        if self.over {
            return Ok(true);
        }

        self.op_pc = self.pc;
        if let Err(err) = self.step() {
            self.over = true;
            error!(pc = self.op_pc, %err, "Fatal VM error");
            return Err(err);
        }
        if self.over {
            info!(pc = self.op_pc, "Program terminated");
        }
        Ok(self.over)
    }

    /// Run until the program ends or `max_steps` instructions have run.
    /// Returns the number of executed instructions.
    pub fn run(&mut self, max_steps: Option<u64>) -> Result<u64> {
        let mut steps = 0;
        while !self.over && max_steps.map_or(true, |max| steps < max) {
            self.run_one_step()?;
            steps += 1;
        }
        Ok(steps)
    }

    fn step(&mut self) -> Result<()> {
        let opcode = self.fetch_u8()? as u8;
        match opcode {
            0..=op::LAST => self.exec_opcode(opcode),
            bi::FIRST..=bi::LAST => self.exec_builtin(opcode),
            _ => Err(VmError::IllegalOpcode {
                opcode,
                pc: self.op_pc,
            }),
        }
    }

    // ========================================================================
    // Fetch helpers
    // ========================================================================

    fn fetch(&mut self, len: usize) -> Result<&[u8]> {
        let start = self.pc;
        let bytes = self
            .code
            .get(start..start + len)
            .ok_or(VmError::CodeOutOfBounds(start))?;
        self.pc += len;
        Ok(bytes)
    }

    fn fetch_u8(&mut self) -> Result<i32> {
        Ok(self.fetch(1)?[0] as i32)
    }

    fn fetch_u16(&mut self) -> Result<i32> {
        let b = self.fetch(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]) as i32)
    }

    fn fetch_i16(&mut self) -> Result<i32> {
        let b = self.fetch(2)?;
        Ok(i16::from_le_bytes([b[0], b[1]]) as i32)
    }

    fn fetch_u24(&mut self) -> Result<usize> {
        let b = self.fetch(3)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], 0]) as usize)
    }

    fn fetch_i32(&mut self) -> Result<i32> {
        let b = self.fetch(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    // ========================================================================
    // Frames
    // ========================================================================

    fn frame_base(&self) -> Result<usize> {
        self.frames.map(|f| f.base).ok_or(VmError::NoFrame)
    }

    fn frames_mut(&mut self) -> Result<&mut FramePointers> {
        self.frames.as_mut().ok_or(VmError::NoFrame)
    }

    fn enter(&mut self, frame_size: usize, argc: usize) -> Result<()> {
        let ram = Rc::clone(&self.ram);
        let frames = self.frames_mut()?;
        ram.set_u16(frames.end + RETURN_ADDRESS_BYTES, frames.base as i32);
        frames.base = frames.end;
        frames.end += frame_size;
        if frames.end > GLOBAL_BASE + FRAME_STACK_CAPACITY {
            return Err(VmError::FrameOverflow { base: frames.base });
        }

        let base = frames.base;
        let args = self.stack.shrink(argc)?;
        for (i, arg) in args.into_iter().enumerate() {
            ram.set_i32(base + FRAME_HEADER_BYTES + 4 * i, arg);
        }
        Ok(())
    }

    fn leave(&mut self) -> Result<()> {
        let ram = Rc::clone(&self.ram);
        let frames = self.frames_mut()?;
        let base = frames.base;
        frames.end = base;
        frames.base = ram.get_u16(base + RETURN_ADDRESS_BYTES) as usize;
        self.pc = ram.get_u24(base) as usize;
        Ok(())
    }

    // ========================================================================
    // General instructions
    // ========================================================================

    fn pop(&mut self) -> Result<i32> {
        self.stack.pop()
    }

    fn push(&mut self, value: i32) -> Result<()> {
        self.stack.push(value)
    }

    /// Pop the right operand, then the left one.
    fn pop_pair(&mut self) -> Result<(i32, i32)> {
        let rhs = self.pop()?;
        let lhs = self.pop()?;
        Ok((lhs, rhs))
    }

    fn push_string_literal(&mut self) -> Result<()> {
        let start = self.string_ptr as i32;
        self.push(start)?;
        loop {
            let c = self.fetch_u8()? as u8 ^ self.xor_factor;
            self.ram.set_byte(self.string_ptr, c);
            self.string_ptr += 1;
            if c == 0 {
                break;
            }
        }
        if self.string_ptr >= STRING_STACK_ADDRESS + STRING_STACK_CAPACITY * 3 / 4 {
            self.string_ptr = STRING_STACK_ADDRESS;
        }
        Ok(())
    }

    fn step_through_pointer(&mut self, opcode: u8) -> Result<()> {
        let ptr = TaggedPointer::decode(self.pop()?)?;
        let address = ptr.resolve(self.frames.map(|f| f.base))?;
        let value = ptr.width.load(&*self.ram, address);
        let (result, stored) = match opcode {
            op::PRE_INC => (value.wrapping_add(1), value.wrapping_add(1)),
            op::PRE_DEC => (value.wrapping_sub(1), value.wrapping_sub(1)),
            op::POST_INC => (value, value.wrapping_add(1)),
            _ => (value, value.wrapping_sub(1)),
        };
        self.push(result)?;
        ptr.width.store(&*self.ram, address, stored);
        Ok(())
    }

    fn exec_opcode(&mut self, opcode: u8) -> Result<()> {
        let ram = Rc::clone(&self.ram);
        match opcode {
            op::NOP | op::LOAD_ALL => {}

            op::PUSH_U8_IMM => {
                let v = self.fetch_u8()?;
                self.push(v)?;
            }
            op::PUSH_I16_IMM => {
                let v = self.fetch_i16()?;
                self.push(v)?;
            }
            op::PUSH_I32_IMM => {
                let v = self.fetch_i32()?;
                self.push(v)?;
            }

            op::PUSH_U8_ABS | op::PUSH_I16_ABS | op::PUSH_I32_ABS => {
                let address = self.fetch_u16()? as usize;
                let width = load_width(opcode - op::PUSH_U8_ABS);
                self.push(width.load(&*ram, address))?;
            }

            op::PUSH_U8_IDX | op::PUSH_I16_IDX | op::PUSH_I32_IDX => {
                let index = self.pop()?;
                let address = wrap_address(index, self.fetch_u16()?);
                let width = load_width(opcode - op::PUSH_U8_IDX);
                self.push(width.load(&*ram, address))?;
            }

            op::PTR_U8_IDX | op::PTR_I16_IDX | op::PTR_I32_IDX => {
                let index = self.pop()?;
                let address = wrap_address(index, self.fetch_u16()?);
                let width = load_width(opcode - op::PTR_U8_IDX);
                self.push(address as i32 | width.tag())?;
            }

            op::PUSH_STRING => self.push_string_literal()?,

            op::PUSH_U8_LOC | op::PUSH_I16_LOC | op::PUSH_I32_LOC => {
                let offset = self.fetch_u16()? as usize;
                let address = offset + self.frame_base()?;
                let width = load_width(opcode - op::PUSH_U8_LOC);
                self.push(width.load(&*ram, address))?;
            }

            op::PUSH_U8_LIDX | op::PUSH_I16_LIDX | op::PUSH_I32_LIDX => {
                let offset = self.fetch_u16()?;
                let index = self.pop()?;
                let address = wrap_address(index, offset + self.frame_base()? as i32);
                let width = load_width(opcode - op::PUSH_U8_LIDX);
                self.push(width.load(&*ram, address))?;
            }

            op::PTR_U8_LIDX | op::PTR_I16_LIDX | op::PTR_I32_LIDX => {
                let offset = self.fetch_u16()?;
                let index = self.pop()?;
                let address = wrap_address(index, offset + self.frame_base()? as i32);
                let width = load_width(opcode - op::PTR_U8_LIDX);
                self.push(address as i32 | width.tag())?;
            }

            op::ADDR_IDX => {
                let offset = self.fetch_u16()?;
                let index = self.pop()?;
                self.push(wrap_address(index, offset) as i32)?;
            }
            op::ADDR_LIDX => {
                let offset = self.fetch_u16()?;
                let index = self.pop()?;
                let address = wrap_address(index, offset + self.frame_base()? as i32);
                self.push(address as i32)?;
            }
            op::ADDR_LOC => {
                let offset = self.fetch_u16()?;
                let address = wrap_address(offset, self.frame_base()? as i32);
                self.push(address as i32)?;
            }

            op::PUSH_TEXT_ADDR => self.push(TEXT_BUFFER_ADDRESS as i32)?,
            op::PUSH_GRAPHICS_ADDR => self.push(GRAPHICS_ADDRESS as i32)?,
            op::PUSH_BUFFER_ADDR => self.push(GRAPHICS_BUFFER_ADDRESS as i32)?,

            op::NEG => {
                let v = self.pop()?;
                self.push(v.wrapping_neg())?;
            }
            op::NOT => {
                let v = self.pop()?;
                self.push(!v)?;
            }
            op::LOGICAL_NOT => {
                let v = self.pop()?;
                self.stack.push_bool(v == 0)?;
            }

            op::PRE_INC | op::PRE_DEC | op::POST_INC | op::POST_DEC => {
                self.step_through_pointer(opcode)?
            }

            op::ADD..=op::LT => {
                let (lhs, rhs) = self.pop_pair()?;
                let result = binary(opcode, lhs, rhs)?;
                self.push(result)?;
            }

            op::STORE => {
                let value = self.pop()?;
                let ptr = TaggedPointer::decode(self.pop()?)?;
                let address = ptr.resolve(self.frames.map(|f| f.base))?;
                ptr.width.store(&*ram, address, value);
                self.push(value)?;
            }
            op::LOAD_U8 => {
                let address = self.pop()? as usize & 0xffff;
                self.push(ram.get_u8(address))?;
            }
            op::PTR_U8 => {
                let address = self.pop()? & 0xffff;
                self.push(address | Width::U8.tag())?;
            }
            op::POP => {
                self.pop()?;
            }

            op::JZ => {
                let target = self.fetch_u24()?;
                if self.stack.last_popped()? == 0 {
                    self.pc = target;
                }
            }
            op::JNZ => {
                let target = self.fetch_u24()?;
                if self.stack.last_popped()? != 0 {
                    self.pc = target;
                }
            }
            op::JMP => self.pc = self.fetch_u24()?,

            op::SET_FRAME_BASE => {
                let base = self.fetch_u16()? as usize;
                self.frames = Some(FramePointers {
                    base,
                    end: base,
                    initial: base,
                });
            }
            op::CALL => {
                let target = self.fetch_u24()?;
                let end = self.frames.map(|f| f.end).ok_or(VmError::NoFrame)?;
                ram.set_u24(end, self.pc as i32);
                self.pc = target;
            }
            op::ENTER => {
                let size = self.fetch_u16()? as usize;
                let argc = self.fetch_u8()? as usize;
                self.enter(size, argc)?;
            }
            op::RET => self.leave()?,
            op::HALT => self.over = true,

            op::INIT_DATA => {
                let address = self.fetch_u16()? as usize;
                let len = self.fetch_u16()? as usize;
                let bytes = self.fetch(len)?.to_vec();
                ram.write_range(address, &bytes);
            }
            op::SET_XOR_FACTOR => self.xor_factor = self.fetch_u8()? as u8,

            op::ADD_IMM..=op::LE_IMM => {
                let rhs = self.fetch_i16()?;
                let lhs = self.pop()?;
                let result = binary_imm(opcode, lhs, rhs)?;
                self.push(result)?;
            }

            _ => {
                return Err(VmError::IllegalOpcode {
                    opcode,
                    pc: self.op_pc,
                })
            }
        }
        Ok(())
    }
}

fn verify_header(code: &[u8]) -> std::result::Result<(), FormatError> {
    if code.len() <= CODE_START {
        return Err(FormatError::TooShort(code.len()));
    }
    if &code[..3] != LAV_MAGIC {
        return Err(FormatError::BadMagic);
    }
    if code[3] != LAV_VERSION {
        return Err(FormatError::UnsupportedVersion(code[3]));
    }
    Ok(())
}

/// Width of the n-th member of a u8/i16/i32 opcode triple.
fn load_width(n: u8) -> Width {
    match n {
        0 => Width::U8,
        1 => Width::I16,
        _ => Width::I32,
    }
}

fn wrap_address(a: i32, b: i32) -> usize {
    (a.wrapping_add(b) & 0xffff) as usize
}

fn bool_value(b: bool) -> i32 {
    if b {
        -1
    } else {
        0
    }
}

fn binary(opcode: u8, lhs: i32, rhs: i32) -> Result<i32> {
    Ok(match opcode {
        op::ADD => lhs.wrapping_add(rhs),
        op::SUB => lhs.wrapping_sub(rhs),
        op::AND => lhs & rhs,
        op::OR => lhs | rhs,
        op::XOR => lhs ^ rhs,
        op::LOGICAL_AND => bool_value(lhs != 0 && rhs != 0),
        op::LOGICAL_OR => bool_value(lhs != 0 || rhs != 0),
        op::MUL => lhs.wrapping_mul(rhs),
        op::DIV => checked_div(lhs, rhs)?,
        op::REM => checked_rem(lhs, rhs)?,
        // negative counts shift by nothing
        op::SHL => lhs.wrapping_shl(rhs.max(0) as u32),
        op::SHR => (lhs as u32).wrapping_shr(rhs.max(0) as u32) as i32,
        op::EQ => bool_value(lhs == rhs),
        op::NE => bool_value(lhs != rhs),
        op::LE => bool_value(lhs <= rhs),
        op::GE => bool_value(lhs >= rhs),
        op::GT => bool_value(lhs > rhs),
        op::LT => bool_value(lhs < rhs),
        _ => unreachable!("not a binary opcode: 0x{opcode:02x}"),
    })
}

fn binary_imm(opcode: u8, lhs: i32, rhs: i32) -> Result<i32> {
    Ok(match opcode {
        op::ADD_IMM => lhs.wrapping_add(rhs),
        op::SUB_IMM => lhs.wrapping_sub(rhs),
        op::MUL_IMM => lhs.wrapping_mul(rhs),
        op::DIV_IMM => checked_div(lhs, rhs)?,
        op::REM_IMM => checked_rem(lhs, rhs)?,
        op::SHL_IMM => lhs.wrapping_shl(rhs as u32),
        op::SHR_IMM => (lhs as u32).wrapping_shr(rhs as u32) as i32,
        op::EQ_IMM => bool_value(lhs == rhs),
        op::NE_IMM => bool_value(lhs != rhs),
        op::GT_IMM => bool_value(lhs > rhs),
        op::LT_IMM => bool_value(lhs < rhs),
        op::GE_IMM => bool_value(lhs >= rhs),
        op::LE_IMM => bool_value(lhs <= rhs),
        _ => unreachable!("not an immediate opcode: 0x{opcode:02x}"),
    })
}

fn checked_div(lhs: i32, rhs: i32) -> Result<i32> {
    if rhs == 0 {
        return Err(VmError::DivisionByZero);
    }
    Ok(lhs.wrapping_div(rhs))
}

fn checked_rem(lhs: i32, rhs: i32) -> Result<i32> {
    if rhs == 0 {
        return Err(VmError::DivisionByZero);
    }
    Ok(lhs.wrapping_rem(rhs))
}

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

//! The interpreter's data stack.

use crate::error::{Result, VmError};

/// Number of slots of the data stack.
pub const DATA_STACK_CAPACITY: usize = 1024;

/// Fixed capacity LIFO of `i32` values.
///
/// Popping only moves the top index, so the slot right above the top keeps
/// the most recently popped value until it is overwritten. The conditional
/// jumps test that slot.
#[derive(Debug, Clone)]
pub struct DataStack {
    data: Box<[i32]>,
    top: usize,
}

impl DataStack {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity].into_boxed_slice(),
            top: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn len(&self) -> usize {
        self.top
    }

    pub fn is_empty(&self) -> bool {
        self.top == 0
    }

    pub fn clear(&mut self) {
        self.top = 0;
    }

    pub fn push(&mut self, value: i32) -> Result<()> {
        let slot = self.data.get_mut(self.top).ok_or(VmError::StackOverflow)?;
        *slot = value;
        self.top += 1;
        Ok(())
    }

    /// Push `-1` for true and `0` for false.
    pub fn push_bool(&mut self, value: bool) -> Result<()> {
        self.push(if value { -1 } else { 0 })
    }

    pub fn pop(&mut self) -> Result<i32> {
        if self.top == 0 {
            return Err(VmError::StackUnderflow);
        }
        self.top -= 1;
        Ok(self.data[self.top])
    }

    /// Value `depth` slots below the top; `peek(0)` is the top.
    pub fn peek(&self, depth: usize) -> Result<i32> {
        if depth >= self.top {
            return Err(VmError::StackUnderflow);
        }
        Ok(self.data[self.top - 1 - depth])
    }

    /// The slot right above the top, holding the last popped value.
    pub fn last_popped(&self) -> Result<i32> {
        self.data.get(self.top).copied().ok_or(VmError::StackOverflow)
    }

    /// Remove the top `count` values and return them deepest first.
    pub fn shrink(&mut self, count: usize) -> Result<Vec<i32>> {
        if count > self.top {
            return Err(VmError::StackUnderflow);
        }
        self.top -= count;
        Ok(self.data[self.top..self.top + count].to_vec())
    }

    /// Fixed arity form of [`DataStack::shrink`].
    pub fn take<const N: usize>(&mut self) -> Result<[i32; N]> {
        if N > self.top {
            return Err(VmError::StackUnderflow);
        }
        self.top -= N;
        let mut values = [0; N];
        values.copy_from_slice(&self.data[self.top..self.top + N]);
        Ok(values)
    }
}

impl Default for DataStack {
    fn default() -> Self {
        Self::new(DATA_STACK_CAPACITY)
    }
}

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

//! Fuzz target for the Lava GVM interpreter.
//!
//! Random bytes become the code after a valid header. The interpreter
//! must stop with an error or finish, never panic.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_runtime
//!
//! Run for a specific duration:
//!   cargo +nightly fuzz run fuzz_runtime -- -max_total_time=60

#![no_main]

use lava_gvm::recording::{CallLog, ScriptedKeyboardModel};
use lava_gvm::runtime::assembler::ImageBuilder;
use lava_gvm::runtime::opcodes::builtins;
use lava_gvm::runtime::opcodes::opcodes::NOP;
use lava_gvm::{Config, Runtime};
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;

const MAX_STEPS: u64 = 10_000;

fuzz_target!(|data: &[u8]| {
    let Ok(dir) = tempfile::TempDir::new() else {
        return;
    };
    let config = Config {
        fs_root: dir.path().to_path_buf(),
        ..Config::default()
    };
    let keyboard = Arc::new(ScriptedKeyboardModel::new(
        data.iter().map(|&b| b as i32),
        CallLog::new(),
    ));
    let Ok(mut runtime) = Runtime::create(&config, keyboard) else {
        return;
    };

    // Delay would only make the fuzzer sleep
    let code: Vec<u8> = data
        .iter()
        .map(|&b| if b == builtins::DELAY { NOP } else { b })
        .collect();
    let mut asm = ImageBuilder::new();
    asm.emit_bytes(&code);
    let Ok(image) = asm.build() else {
        return;
    };

    if runtime.load_code(&image[..]).is_err() || runtime.prepare().is_err() {
        return;
    }
    let _ = runtime.run(Some(MAX_STEPS));
    runtime.clean_up();
});

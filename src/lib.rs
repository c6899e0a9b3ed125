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

//! Lava GVM Library
//!
//! An emulator for LAV bytecode programs, written for 160x80 monochrome
//! handhelds. A program runs against 64 KiB of RAM, a screen with a
//! back buffer, a text grid, a keyboard and a sandboxed file store.
//!
//! # Modules
//!
//! - [`error`] - Error types for loading, running and file access
//! - [`memory`] - RAM and views onto parts of it
//! - [`screen`] - Bitmap drawing
//! - [`text`] - Text grid and fonts
//! - [`keyboard`] - Key state
//! - [`file`] - Sandboxed file store and handle table
//! - [`runtime`] - The interpreter
//! - [`recording`] - Models that log calls instead of drawing
//! - [`config`] - Settings chosen by the host
//! - [`logging`] - Log output of the command line host
//! - [`util`] - RNG, checksums, trigonometry tables and the clock
//!
//! # Example
//!
//! ```no_run
//! use lava_gvm::recording::{CallLog, ScriptedKeyboardModel};
//! use lava_gvm::{Config, Runtime};
//! use std::sync::Arc;
//!
//! fn run(path: &str) -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let keyboard = Arc::new(ScriptedKeyboardModel::new(Vec::new(), CallLog::new()));
//!     let mut runtime = Runtime::create(&config, keyboard)?;
//!
//!     runtime.load_code(std::fs::File::open(path)?)?;
//!     runtime.prepare()?;
//!     while !runtime.run_one_step()? {}
//!     runtime.clean_up();
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod file;
pub mod keyboard;
pub mod logging;
pub mod memory;
pub mod recording;
pub mod runtime;
pub mod screen;
pub mod text;
pub mod util;

// Re-export commonly used types
pub use config::{Config, RamPolicy};
pub use error::{FileError, FormatError, Result, VmError};
pub use runtime::{Models, Runtime};

/// The version of the emulator.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The name of the emulator.
pub const NAME: &str = "Lava GVM";

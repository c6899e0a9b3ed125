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

//! Lava GVM CLI
//!
//! Runs a LAV program headless, with keys taken from a script.

use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

use lava_gvm::logging::setup_logging;
use lava_gvm::recording::{CallLog, ScriptedKeyboardModel};
use lava_gvm::screen::bitmap_to_ascii;
use lava_gvm::{Config, RamPolicy, Runtime};
use tracing::{info, warn};

/// Lava GVM - An emulator for LAV bytecode programs
#[derive(Parser, Debug)]
#[command(name = "lava-gvm")]
#[command(version)]
#[command(about = "An emulator for LAV bytecode programs of monochrome handhelds")]
#[command(long_about = r#"
Lava GVM runs LAV bytecode programs written for 160x80 monochrome
handhelds. Files the program opens live below the sandbox root.

Keys come from a script file holding one key code per line (13 is
Enter, 27 is Esc, 20/21 are up/down). Once the script is used up,
every blocking key read returns 0.

Example usage:
  lava-gvm game.lav
  lava-gvm game.lav --keys keys.txt --dump-screen
  lava-gvm game.lav --root saves --fonts fonts --max-steps 1000000
"#)]
struct Cli {
    /// Program to run (.lav)
    program: PathBuf,

    /// Sandbox directory mapped to `/` of the program's file store
    #[arg(long, default_value = lava_gvm::config::DEFAULT_FS_ROOT)]
    root: PathBuf,

    /// Directory holding ascii8.bin, ascii6.bin, gbfont16.bin and gbfont12.bin
    #[arg(long)]
    fonts: Option<PathBuf>,

    /// Key script, one decimal key code per line
    #[arg(short, long)]
    keys: Option<PathBuf>,

    /// What happens to RAM outside the frame stack before the run
    #[arg(long, value_enum, default_value_t = RamPolicyArg::Keep)]
    ram_policy: RamPolicyArg,

    /// Stop after this many instructions
    #[arg(long)]
    max_steps: Option<u64>,

    /// Pause briefly every 1000 instructions
    #[arg(long)]
    throttle: bool,

    /// Print the screen as text when the program ends
    #[arg(short, long)]
    dump_screen: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RamPolicyArg {
    Keep,
    Clear,
}

impl From<RamPolicyArg> for RamPolicy {
    fn from(arg: RamPolicyArg) -> Self {
        match arg {
            RamPolicyArg::Keep => RamPolicy::KeepBetweenRuns,
            RamPolicyArg::Clear => RamPolicy::ClearOnPrepare,
        }
    }
}

/// Parse a key script. Blank lines are skipped.
fn parse_keys(script: &str) -> Result<Vec<i32>, String> {
    script
        .lines()
        .map(str::trim)
        .enumerate()
        .filter(|(_, line)| !line.is_empty())
        .map(|(n, line)| {
            line.parse::<i32>()
                .map_err(|e| format!("line {}: '{}': {}", n + 1, line, e))
        })
        .collect()
}

fn read_keys(path: &Path) -> Result<Vec<i32>, ExitCode> {
    let script = std::fs::read_to_string(path).map_err(|e| {
        eprintln!("Error: Cannot read {}: {}", path.display(), e);
        ExitCode::from(3)
    })?;
    parse_keys(&script).map_err(|e| {
        eprintln!("Error: Invalid key script {}: {}", path.display(), e);
        ExitCode::from(2)
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_logging(cli.verbose) {
        eprintln!("Warning: Cannot set up logging: {}", e);
    }

    let config = Config {
        fs_root: cli.root.clone(),
        font_dir: cli.fonts.clone(),
        delay_enabled: cli.throttle,
        ram_policy: cli.ram_policy.into(),
        ..Config::default()
    };

    let keys = match &cli.keys {
        Some(path) => match read_keys(path) {
            Ok(keys) => keys,
            Err(code) => return code,
        },
        None => Vec::new(),
    };
    let keyboard = Arc::new(ScriptedKeyboardModel::new(keys, CallLog::new()));

    let mut runtime = match Runtime::create(&config, keyboard) {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!(
                "Error: Cannot use sandbox root {}: {}",
                config.fs_root.display(),
                e
            );
            return ExitCode::from(3);
        }
    };

    let image = match std::fs::File::open(&cli.program) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Error: Cannot read {}: {}", cli.program.display(), e);
            return ExitCode::from(3);
        }
    };
    if let Err(e) = runtime.load_code(image) {
        eprintln!("Error: Cannot load {}: {}", cli.program.display(), e);
        return ExitCode::from(1);
    }
    if let Err(e) = runtime.prepare() {
        eprintln!("Error: {}", e);
        return ExitCode::from(4);
    }

    let mut steps: u64 = 0;
    let result = loop {
        match runtime.run_one_step() {
            Ok(true) => break Ok(()),
            Ok(false) => {}
            Err(e) => break Err(e),
        }
        steps += 1;
        if let Some(pause) = config.throttle(steps) {
            thread::sleep(pause);
        }
        if cli.max_steps.is_some_and(|max| steps >= max) {
            warn!(steps, "Step limit reached, stopping");
            break Ok(());
        }
    };
    runtime.clean_up();
    info!(steps, "Run finished");

    if cli.dump_screen {
        print!("{}", bitmap_to_ascii(&runtime.graphics_snapshot()));
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(4)
        }
    }
}

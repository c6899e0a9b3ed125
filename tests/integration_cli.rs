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

//! End-to-end CLI integration tests.

use lava_gvm::runtime::assembler::ImageBuilder;
use lava_gvm::runtime::opcodes::{builtins as bi, opcodes as op};
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

fn cargo_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_lava-gvm"))
}

/// Write the assembled image to `dir/name`.
fn write_image(dir: &TempDir, name: &str, asm: &ImageBuilder) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, asm.build().unwrap()).unwrap();
    path
}

/// Run the emulator on `program` with a sandbox below `dir`.
fn run(dir: &TempDir, program: &PathBuf, extra: &[&str]) -> Output {
    cargo_bin()
        .arg(program)
        .arg("--root")
        .arg(dir.path().join("root"))
        .args(extra)
        .output()
        .expect("Failed to execute command")
}

/// Program setting the top left pixel.
fn dot_program() -> ImageBuilder {
    let mut asm = ImageBuilder::new();
    asm.push(0).push(0).push(1).builtin(bi::POINT).halt();
    asm
}

/// Test --help flag.
#[test]
fn test_help_flag() {
    let output = cargo_bin()
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("lava-gvm"));
    assert!(stdout.contains("--keys"));
    assert!(stdout.contains("--dump-screen"));
}

/// Test --version flag.
#[test]
fn test_version_flag() {
    let output = cargo_bin()
        .arg("--version")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("lava-gvm"));
    assert!(stdout.contains("0.1.0"));
}

/// Test running a program and dumping the screen.
#[test]
fn test_run_and_dump_screen() {
    let dir = TempDir::new().unwrap();
    let program = write_image(&dir, "dot.lav", &dot_program());

    let output = run(&dir, &program, &["--dump-screen"]);

    assert!(
        output.status.success(),
        "Run failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 80);
    assert!(lines[0].starts_with("#."));
    assert_eq!(lines[0].len(), 160);
    // the sandbox root is created on demand
    assert!(dir.path().join("root").is_dir());
}

/// Test feeding keys from a script.
#[test]
fn test_key_script() {
    let dir = TempDir::new().unwrap();
    let mut asm = ImageBuilder::new();
    asm.builtin(bi::GETCHAR)
        .op_i16(op::EQ_IMM, 13)
        .op(op::POP)
        .jnz("draw")
        .halt()
        .label("draw")
        .push(0)
        .push(0)
        .push(1)
        .builtin(bi::POINT)
        .halt();
    let program = write_image(&dir, "keys.lav", &asm);

    let keys = dir.path().join("keys.txt");
    std::fs::write(&keys, "13\n").unwrap();
    let keys = keys.to_string_lossy().into_owned();
    let output = run(&dir, &program, &["--keys", &keys, "-d"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).starts_with('#'));

    // without a script the blocking read yields 0
    let output = run(&dir, &program, &["-d"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).starts_with('.'));
}

/// Test an endless loop stops at the step limit.
#[test]
fn test_max_steps() {
    let dir = TempDir::new().unwrap();
    let mut asm = ImageBuilder::new();
    asm.label("spin").jmp("spin");
    let program = write_image(&dir, "spin.lav", &asm);

    let output = run(&dir, &program, &["--max-steps", "1000"]);

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Step limit"));
}

// ============================================================================
// Exit Codes
// ============================================================================

/// Test error on a file that is not a LAV image.
#[test]
fn test_bad_image_exit_code() {
    let dir = TempDir::new().unwrap();
    let program = dir.path().join("bad.lav");
    std::fs::write(&program, b"PRG\x12 this is not a lav image").unwrap();

    let output = run(&dir, &program, &[]);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Cannot load"));
}

/// Test error on a missing program file.
#[test]
fn test_missing_file_exit_code() {
    let dir = TempDir::new().unwrap();
    let program = dir.path().join("nonexistent.lav");

    let output = run(&dir, &program, &[]);

    assert_eq!(output.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Cannot read"));
}

/// Test error on a malformed key script.
#[test]
fn test_bad_key_script_exit_code() {
    let dir = TempDir::new().unwrap();
    let program = write_image(&dir, "dot.lav", &dot_program());
    let keys = dir.path().join("keys.txt");
    std::fs::write(&keys, "13\nenter\n").unwrap();
    let keys = keys.to_string_lossy().into_owned();

    let output = run(&dir, &program, &["--keys", &keys]);

    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("line 2"));
}

/// Test a fatal VM error.
#[test]
fn test_vm_error_exit_code() {
    let dir = TempDir::new().unwrap();
    let mut asm = ImageBuilder::new();
    asm.push(1).push(0).op(op::DIV).halt();
    let program = write_image(&dir, "div.lav", &asm);

    let output = run(&dir, &program, &[]);

    assert_eq!(output.status.code(), Some(4));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Error:"));
}

/// Test an unknown RAM policy is a usage error.
#[test]
fn test_unknown_ram_policy() {
    let dir = TempDir::new().unwrap();
    let program = write_image(&dir, "dot.lav", &dot_program());

    let output = run(&dir, &program, &["--ram-policy", "sometimes"]);

    assert_eq!(output.status.code(), Some(2));
}

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

//! File manager.
//!
//! Programs see a small sandboxed file store: a working directory, at most
//! [`MAX_OPEN_FILES`] open files addressed by handles `0x80..=0x82`, and
//! directory operations. Paths coming from a program are GB2312 bytes;
//! [`decode_path`] and [`encode_name`] convert at that boundary.

mod fs;

pub use fs::{access, DefaultFileSystem, FileSystem, OpenFile};

use crate::error::FileError;
use encoding_rs::GBK;
use tracing::debug;

pub const MAX_OPEN_FILES: usize = 3;

const HANDLE_MARKER: i32 = 0x80;
const HANDLE_MASK: i32 = 0x7f;

/// How `fopen` treats an existing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenMode {
    pub access: u8,
    pub truncate: bool,
    pub append: bool,
}

impl OpenMode {
    /// Parse a C style mode string.
    pub fn parse(mode: &str) -> Result<Self, FileError> {
        use access::{CREATE, READ, WRITE};

        let (access, truncate, append) = match mode {
            "r" | "rb" => (READ, false, false),
            "r+" | "rb+" => (READ | WRITE, false, false),
            "w" | "wb" => (WRITE | CREATE, true, false),
            "w+" | "wb+" => (READ | WRITE | CREATE, true, false),
            "a" | "ab" => (WRITE | CREATE, false, true),
            "a+" | "ab+" => (READ | WRITE | CREATE, false, true),
            _ => return Err(FileError::InvalidMode(mode.to_string())),
        };
        Ok(Self {
            access,
            truncate,
            append,
        })
    }
}

/// Collapse `.`, `..` and empty components. The result starts and ends
/// with `/`; `..` at the root stays at the root.
pub fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            name => parts.push(name),
        }
    }
    let mut out = String::from("/");
    for part in parts {
        out.push_str(part);
        out.push('/');
    }
    out
}

/// Decode a GB2312 path from program memory.
pub fn decode_path(bytes: &[u8]) -> String {
    GBK.decode_without_bom_handling(bytes).0.into_owned()
}

/// Encode a host file name for program memory.
pub fn encode_name(name: &str) -> Vec<u8> {
    GBK.encode(name).0.into_owned()
}

/// Handle table and working directory on top of a [`FileSystem`].
pub struct FileManager {
    fs: Box<dyn FileSystem>,
    working_dir: String,
    open: [Option<OpenFile>; MAX_OPEN_FILES],
}

impl FileManager {
    pub fn new(fs: Box<dyn FileSystem>) -> Self {
        Self {
            fs,
            working_dir: "/".to_string(),
            open: Default::default(),
        }
    }

    /// Current directory. Always ends with `/`.
    pub fn working_dir(&self) -> &str {
        &self.working_dir
    }

    /// Change directory, relative to the current one unless `path` starts
    /// with `/`.
    pub fn set_working_dir(&mut self, path: &str) -> Result<(), FileError> {
        let dir = normalize_path(&self.absolute_path(path));
        if !self.fs.is_valid_directory(&dir) {
            return Err(FileError::NotADirectory(path.to_string()));
        }
        self.working_dir = dir;
        Ok(())
    }

    /// Store path of `path`, which may be relative to the working directory.
    pub fn absolute_path(&self, path: &str) -> String {
        if path.starts_with('/') {
            path.to_string()
        } else {
            format!("{}{}", self.working_dir, path)
        }
    }

    /// Open a file and return its handle.
    pub fn open_file(&mut self, path: &str, mode: &str) -> Result<i32, FileError> {
        let slot = self
            .open
            .iter()
            .position(Option::is_none)
            .ok_or(FileError::NoFreeHandle)?;
        let mode = OpenMode::parse(mode)?;

        let path = self.absolute_path(path);
        let mut file = self.fs.open_file(&path, mode.access)?;
        if mode.truncate {
            file.truncate();
        }
        if mode.append {
            file.set_offset(file.size() as i64)?;
        }

        self.open[slot] = Some(file);
        Ok(slot as i32 | HANDLE_MARKER)
    }

    pub fn close_file(&mut self, handle: i32) -> Result<(), FileError> {
        let slot = Self::slot_of(handle)?;
        let file = self.open[slot]
            .take()
            .ok_or(FileError::InvalidHandle(handle))?;
        self.fs.close_file(file)
    }

    /// Close every open file. Write back failures are logged and skipped.
    pub fn close_all_files(&mut self) {
        for slot in &mut self.open {
            if let Some(file) = slot.take() {
                if let Err(err) = self.fs.close_file(file) {
                    debug!(error = %err, "Failed to write back file");
                }
            }
        }
    }

    /// Close all files and return to `/`.
    pub fn reset(&mut self) {
        self.close_all_files();
        self.working_dir = "/".to_string();
    }

    fn slot_of(handle: i32) -> Result<usize, FileError> {
        let index = handle & HANDLE_MASK;
        if handle & HANDLE_MARKER == 0 || index as usize >= MAX_OPEN_FILES {
            return Err(FileError::InvalidHandle(handle));
        }
        Ok(index as usize)
    }

    fn file(&mut self, handle: i32) -> Result<&mut OpenFile, FileError> {
        let slot = Self::slot_of(handle)?;
        self.open[slot]
            .as_mut()
            .ok_or(FileError::InvalidHandle(handle))
    }

    pub fn set_offset(&mut self, handle: i32, offset: i64) -> Result<(), FileError> {
        self.file(handle)?.set_offset(offset)
    }

    pub fn offset(&mut self, handle: i32) -> Result<usize, FileError> {
        Ok(self.file(handle)?.offset())
    }

    pub fn size(&mut self, handle: i32) -> Result<usize, FileError> {
        Ok(self.file(handle)?.size())
    }

    pub fn is_eof(&mut self, handle: i32) -> Result<bool, FileError> {
        let file = self.file(handle)?;
        Ok(file.offset() >= file.size())
    }

    /// Read up to `count` bytes.
    pub fn read(&mut self, handle: i32, count: usize) -> Result<Vec<u8>, FileError> {
        let file = self.file(handle)?;
        if !file.can_read() {
            return Err(FileError::AccessDenied(handle));
        }
        Ok(file.read(count))
    }

    /// Write `bytes` and return how many were written.
    pub fn write(&mut self, handle: i32, bytes: &[u8]) -> Result<usize, FileError> {
        let file = self.file(handle)?;
        if !file.can_write() {
            return Err(FileError::AccessDenied(handle));
        }
        Ok(file.write(bytes))
    }

    pub fn create_directory(&mut self, path: &str) -> Result<bool, FileError> {
        let path = self.absolute_path(path);
        self.fs.create_directory(&path)
    }

    pub fn delete_file(&mut self, path: &str) -> Result<bool, FileError> {
        let path = self.absolute_path(path);
        self.fs.delete_file(&path)
    }

    /// Entries of the working directory.
    pub fn list_files(&self) -> Result<Vec<String>, FileError> {
        self.fs.list_files(&self.working_dir)
    }

    /// Whether `name` in the working directory is a directory.
    pub fn is_directory(&self, name: &str) -> bool {
        self.fs.is_directory(&self.absolute_path(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;
    use tempfile::TempDir;

    fn manager() -> (TempDir, FileManager) {
        let dir = TempDir::new().unwrap();
        let fs = DefaultFileSystem::new(dir.path()).unwrap();
        (dir, FileManager::new(Box::new(fs)))
    }

    #[test_case("/", "/"; "root")]
    #[test_case("/./", "/"; "dot")]
    #[test_case("/../", "/"; "dotdot at root")]
    #[test_case("/Lava", "/Lava/"; "adds slash")]
    #[test_case("/Lava/.", "/Lava/"; "trailing dot")]
    #[test_case("/Lava/..", "/"; "trailing dotdot")]
    #[test_case("/Lava/More/../", "/Lava/"; "inner dotdot")]
    #[test_case("/Lava/More/../..", "/"; "two up")]
    #[test_case("/Lava//More/Less/../", "/Lava/More/"; "empty part")]
    fn test_normalize_path(path: &str, expected: &str) {
        assert_eq!(normalize_path(path), expected);
    }

    #[test_case("r", access::READ, false, false; "read")]
    #[test_case("rb+", access::READ | access::WRITE, false, false; "read update")]
    #[test_case("w", access::WRITE | access::CREATE, true, false; "write")]
    #[test_case("wb+", access::READ | access::WRITE | access::CREATE, true, false; "write update")]
    #[test_case("ab", access::WRITE | access::CREATE, false, true; "append")]
    #[test_case("a+", access::READ | access::WRITE | access::CREATE, false, true; "append update")]
    fn test_open_mode(mode: &str, access: u8, truncate: bool, append: bool) {
        assert_eq!(
            OpenMode::parse(mode).unwrap(),
            OpenMode {
                access,
                truncate,
                append
            }
        );
    }

    #[test]
    fn test_invalid_mode() {
        assert!(matches!(OpenMode::parse("rw"), Err(FileError::InvalidMode(_))));
    }

    #[test]
    fn test_handles_are_marked_and_limited() {
        let (_dir, mut files) = manager();
        let handles: Vec<i32> = ["/a", "/b", "/c"]
            .iter()
            .map(|p| files.open_file(p, "w").unwrap())
            .collect();
        assert_eq!(handles, vec![0x80, 0x81, 0x82]);
        assert!(matches!(
            files.open_file("/d", "w"),
            Err(FileError::NoFreeHandle)
        ));

        files.close_file(0x81).unwrap();
        assert_eq!(files.open_file("/d", "w").unwrap(), 0x81);
    }

    #[test_case(0x00; "missing marker")]
    #[test_case(0x83; "index too large")]
    #[test_case(0x80; "closed")]
    fn test_bad_handles(handle: i32) {
        let (_dir, mut files) = manager();
        assert!(matches!(
            files.offset(handle),
            Err(FileError::InvalidHandle(_))
        ));
    }

    #[test]
    fn test_write_then_read_back() {
        let (dir, mut files) = manager();
        let fp = files.open_file("note.txt", "w").unwrap();
        assert_eq!(files.write(fp, b"lava").unwrap(), 4);
        assert!(matches!(files.read(fp, 1), Err(FileError::AccessDenied(_))));
        files.close_file(fp).unwrap();
        assert_eq!(std::fs::read(dir.path().join("note.txt")).unwrap(), b"lava");

        let fp = files.open_file("/note.txt", "a+").unwrap();
        assert_eq!(files.offset(fp).unwrap(), 4);
        assert!(files.is_eof(fp).unwrap());
        files.write(fp, b"!").unwrap();
        files.set_offset(fp, 0).unwrap();
        assert_eq!(files.read(fp, 10).unwrap(), b"lava!");
        files.close_file(fp).unwrap();

        let fp = files.open_file("/note.txt", "w+").unwrap();
        assert_eq!(files.size(fp).unwrap(), 0);
    }

    #[test]
    fn test_working_directory() {
        let (dir, mut files) = manager();
        std::fs::create_dir(dir.path().join("games")).unwrap();

        files.set_working_dir("games").unwrap();
        assert_eq!(files.working_dir(), "/games/");
        assert_eq!(files.absolute_path("save.dat"), "/games/save.dat");

        assert!(files.set_working_dir("missing").is_err());
        assert_eq!(files.working_dir(), "/games/");

        files.set_working_dir("..").unwrap();
        assert_eq!(files.working_dir(), "/");
        files.set_working_dir("..").unwrap();
        assert_eq!(files.working_dir(), "/");
    }

    #[test]
    fn test_directory_operations() {
        let (_dir, mut files) = manager();
        assert!(files.create_directory("sub").unwrap());
        assert!(files.is_directory("sub"));
        let fp = files.open_file("/sub/f", "w").unwrap();
        assert!(!files.delete_file("/sub/f").unwrap());
        files.reset();
        assert!(files.delete_file("/sub/f").unwrap());
        let mut names = files.list_files().unwrap();
        names.sort();
        assert_eq!(names, vec!["sub".to_string()]);
        assert!(matches!(files.offset(fp), Err(FileError::InvalidHandle(_))));
    }

    #[test]
    fn test_gb2312_names_round_trip() {
        let bytes = [0xc4, 0xe3, 0xba, 0xc3, b'.', b't', b'x', b't'];
        let name = decode_path(&bytes);
        assert_eq!(name, "你好.txt");
        assert_eq!(encode_name(&name), bytes.to_vec());
    }
}

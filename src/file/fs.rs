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

//! The file store behind the file manager.
//!
//! Paths handed to a [`FileSystem`] are absolute paths inside the store,
//! `/` being its root. [`DefaultFileSystem`] maps them onto a directory of
//! the host and refuses anything that would leave it.

use crate::error::FileError;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Access flags of [`FileSystem::open_file`].
pub mod access {
    pub const READ: u8 = 1;
    pub const WRITE: u8 = 2;
    /// Create the file if it does not exist.
    pub const CREATE: u8 = 4;
}

/// A file opened from a [`FileSystem`].
///
/// The whole content is held in memory and written back by
/// [`FileSystem::close_file`] if it was changed.
#[derive(Debug)]
pub struct OpenFile {
    native: PathBuf,
    data: Vec<u8>,
    offset: usize,
    can_read: bool,
    can_write: bool,
    dirty: bool,
}

impl OpenFile {
    fn new(native: PathBuf, data: Vec<u8>, can_read: bool, can_write: bool) -> Self {
        Self {
            native,
            data,
            offset: 0,
            can_read,
            can_write,
            dirty: false,
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn can_read(&self) -> bool {
        self.can_read
    }

    pub fn can_write(&self) -> bool {
        self.can_write
    }

    /// Move the file pointer. Valid offsets are `0..=size`.
    pub fn set_offset(&mut self, offset: i64) -> Result<(), FileError> {
        match usize::try_from(offset) {
            Ok(o) if o <= self.size() => {
                self.offset = o;
                Ok(())
            }
            _ => Err(FileError::OffsetOutOfBounds {
                offset,
                size: self.size(),
            }),
        }
    }

    /// Read up to `count` bytes at the file pointer.
    pub fn read(&mut self, count: usize) -> Vec<u8> {
        let end = self.offset.saturating_add(count).min(self.size());
        let bytes = self.data[self.offset..end].to_vec();
        self.offset = end;
        bytes
    }

    /// Write at the file pointer, growing the file as needed.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        if bytes.is_empty() {
            return 0;
        }
        self.dirty = true;
        let end = self.offset + bytes.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[self.offset..end].copy_from_slice(bytes);
        self.offset = end;
        bytes.len()
    }

    pub fn truncate(&mut self) {
        self.data.clear();
        self.offset = 0;
        self.dirty = true;
    }
}

/// Directory tree the file manager works on.
pub trait FileSystem {
    /// Open a file with a combination of [`access`] flags.
    fn open_file(&mut self, path: &str, access: u8) -> Result<OpenFile, FileError>;

    /// Write back a changed file and release it.
    fn close_file(&mut self, file: OpenFile) -> Result<(), FileError>;

    /// Whether `path` names an existing directory inside the store.
    fn is_valid_directory(&self, path: &str) -> bool;

    fn create_directory(&mut self, path: &str) -> Result<bool, FileError>;

    /// Delete a file. Open files are never deleted.
    fn delete_file(&mut self, path: &str) -> Result<bool, FileError>;

    /// Names of the entries of directory `path`, in no particular order.
    fn list_files(&self, path: &str) -> Result<Vec<String>, FileError>;

    /// Whether `path` names a directory. Used to tell entries apart when
    /// listing.
    fn is_directory(&self, path: &str) -> bool {
        self.is_valid_directory(path)
    }
}

/// File store rooted at a host directory.
#[derive(Debug)]
pub struct DefaultFileSystem {
    root: PathBuf,
    open: HashSet<PathBuf>,
}

impl DefaultFileSystem {
    /// Use `root` as the store root. It must be an existing directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, FileError> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(FileError::NotADirectory(root.display().to_string()));
        }
        Ok(Self {
            root: root.canonicalize()?,
            open: HashSet::new(),
        })
    }

    /// Like [`DefaultFileSystem::new`], creating the root first if needed.
    pub fn create(root: impl AsRef<Path>) -> Result<Self, FileError> {
        fs::create_dir_all(root.as_ref())?;
        Self::new(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Host path of a store path.
    fn native_path(&self, path: &str) -> Result<PathBuf, FileError> {
        if !path.starts_with('/') {
            return Err(FileError::RelativePath(path.to_string()));
        }

        let mut native = self.root.clone();
        let mut depth = 0usize;
        for part in path.split('/') {
            match part {
                "" | "." => {}
                ".." => {
                    if depth == 0 {
                        return Err(FileError::OutsideRoot(self.root.join(&path[1..])));
                    }
                    native.pop();
                    depth -= 1;
                }
                name => {
                    native.push(name);
                    depth += 1;
                }
            }
        }

        // symlinks may still point elsewhere
        match native.canonicalize() {
            Ok(canonical) if !canonical.starts_with(&self.root) => {
                Err(FileError::OutsideRoot(canonical))
            }
            Ok(canonical) => Ok(canonical),
            Err(_) => Ok(native),
        }
    }
}

impl FileSystem for DefaultFileSystem {
    fn open_file(&mut self, path: &str, mode: u8) -> Result<OpenFile, FileError> {
        let can_read = mode & access::READ != 0;
        let can_write = mode & access::WRITE != 0;
        if !can_read && !can_write {
            return Err(FileError::InvalidMode(format!("access {mode}")));
        }

        let mut native = self.native_path(path)?;
        if mode & access::CREATE != 0 && !native.exists() {
            fs::File::create(&native)?;
            native = self.native_path(path)?;
        }
        if self.open.contains(&native) {
            return Err(FileError::AlreadyOpen(path.to_string()));
        }

        let data = fs::read(&native)?;
        debug!(path, size = data.len(), "Opened file");
        self.open.insert(native.clone());
        Ok(OpenFile::new(native, data, can_read, can_write))
    }

    fn close_file(&mut self, file: OpenFile) -> Result<(), FileError> {
        self.open.remove(&file.native);
        if file.dirty {
            fs::write(&file.native, &file.data)?;
        }
        debug!(path = %file.native.display(), dirty = file.dirty, "Closed file");
        Ok(())
    }

    fn is_valid_directory(&self, path: &str) -> bool {
        self.native_path(path).is_ok_and(|p| p.is_dir())
    }

    fn create_directory(&mut self, path: &str) -> Result<bool, FileError> {
        let native = self.native_path(path)?;
        Ok(fs::create_dir(native).is_ok())
    }

    fn delete_file(&mut self, path: &str) -> Result<bool, FileError> {
        let native = self.native_path(path)?;
        if self.open.contains(&native) {
            return Ok(false);
        }
        let deleted = if native.is_dir() {
            fs::remove_dir(&native)
        } else {
            fs::remove_file(&native)
        };
        Ok(deleted.is_ok())
    }

    fn list_files(&self, path: &str) -> Result<Vec<String>, FileError> {
        let native = self.native_path(path)?;
        if !native.is_dir() {
            return Err(FileError::NotADirectory(path.to_string()));
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(native)? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }
}

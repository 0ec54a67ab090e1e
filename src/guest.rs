/*
 * fakeid: ownership and permission emulation for ptrace-based fake root
 * Copyright (C) 2024 The fakeid Authors
 *
 * This program is free software: you can redistribute it and/or modify it
 * under the terms of the GNU Lesser General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or (at your
 * option) any later version.
 *
 * This program is distributed in the hope that it will be useful, but
 * WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
 * or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License
 * for more details.
 *
 * You should have received a copy of the GNU Lesser General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

#![forbid(unsafe_code)]

use crate::{
    error::{Error, ErrorImpl},
    utils,
};

use std::{
    fmt,
    os::unix::ffi::OsStrExt,
    path::{Path, PathBuf},
};

/// The longest guest path (in bytes, excluding the terminating NUL byte that
/// the kernel would need) that fakeid accepts.
pub const GUEST_PATH_MAX: usize = libc::PATH_MAX as usize - 1;

/// A path inside the virtualized root filesystem, as seen by the traced
/// program.
///
/// A [`GuestPath`] is always absolute (relative to the guestfs root), never
/// contains a NUL byte, never has trailing separators (other than the root
/// itself) and is at most [`GUEST_PATH_MAX`] bytes long. These invariants are
/// enforced when the path is constructed, so there is no way to end up with a
/// silently truncated path further down the line.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GuestPath(PathBuf);

impl GuestPath {
    /// Construct a new [`GuestPath`], validating it in the process.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let bytes = path.as_os_str().as_bytes();

        if bytes.first() != Some(&b'/') {
            Err(ErrorImpl::InvalidArgument {
                name: "guest path".into(),
                description: format!("{path:?} is not absolute").into(),
            })?
        }
        if bytes.contains(&b'\0') {
            Err(ErrorImpl::InvalidArgument {
                name: "guest path".into(),
                description: "path contains a nul byte".into(),
            })?
        }

        let (path, _) = utils::path_strip_trailing_slash(path);
        let len = path.as_os_str().len();
        if len > GUEST_PATH_MAX {
            Err(ErrorImpl::NameTooLong {
                path: path.into(),
                len,
                limit: GUEST_PATH_MAX + 1,
            })?
        }

        Ok(Self(path.to_path_buf()))
    }

    /// The root of the guestfs.
    pub fn root() -> Self {
        Self(PathBuf::from("/"))
    }

    pub fn is_root(&self) -> bool {
        self.0.as_os_str() == "/"
    }

    /// Get the directory containing this path (the path without its final
    /// component). The root is its own directory.
    pub fn dir_path(&self) -> Self {
        Self(utils::dir_path(&self.0).to_path_buf())
    }

    /// Is `self` equal to `ancestor` or somewhere below it?
    ///
    /// This is a component-wise check, so `/foobar` is not beneath `/foo`.
    pub fn is_beneath(&self, ancestor: &GuestPath) -> bool {
        self.0.starts_with(&ancestor.0)
    }

    /// Length of the path in bytes.
    pub fn len(&self) -> usize {
        self.0.as_os_str().len()
    }

    /// A [`GuestPath`] always holds at least `/`.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// The path relative to the guestfs root (that is, without the leading
    /// `/`). The root itself yields an empty path.
    pub fn relative(&self) -> &Path {
        self.0.strip_prefix("/").unwrap_or(&self.0)
    }
}

impl AsRef<Path> for GuestPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl fmt::Debug for GuestPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl fmt::Display for GuestPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

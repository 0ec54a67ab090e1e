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

use crate::{
    error::{Error, ErrorImpl},
    utils, GuestPath, PathTranslator, Resolved, Tracee,
};

use std::{
    collections::{HashMap, HashSet},
    os::unix::io::RawFd,
    path::Path,
};

/// A [`PathTranslator`] whose file descriptors are a fixed table and whose
/// paths are already guest paths.
///
/// The working directory (`AT_FDCWD`) starts out as the guestfs root. Only
/// paths registered with [`MockTranslator::with_existing`] exist on the host.
#[derive(Debug, Clone)]
pub(crate) struct MockTranslator {
    fds: HashMap<RawFd, Resolved>,
    outside: Vec<GuestPath>,
    existing: HashSet<GuestPath>,
}

impl MockTranslator {
    pub(crate) fn new() -> Self {
        Self {
            fds: [(libc::AT_FDCWD, Resolved::Guest(GuestPath::root()))].into(),
            outside: Vec::new(),
            existing: HashSet::new(),
        }
    }

    pub(crate) fn with_fd(mut self, fd: RawFd, resolved: Resolved) -> Self {
        self.fds.insert(fd, resolved);
        self
    }

    pub(crate) fn with_cwd(self, cwd: GuestPath) -> Self {
        self.with_fd(libc::AT_FDCWD, Resolved::Guest(cwd))
    }

    /// Paths at or below `path` are not managed by the guestfs.
    pub(crate) fn with_outside(mut self, path: GuestPath) -> Self {
        self.outside.push(path);
        self
    }

    pub(crate) fn with_existing(mut self, path: GuestPath) -> Self {
        self.existing.insert(path);
        self
    }

    fn classify(&self, guest: GuestPath) -> Resolved {
        if self.within_guestfs(&guest) {
            Resolved::Guest(guest)
        } else {
            Resolved::OutsideGuestfs
        }
    }
}

impl PathTranslator for MockTranslator {
    fn resolve_path(
        &self,
        tracee: &dyn Tracee,
        path: &Path,
        dirfd: RawFd,
    ) -> Result<Resolved, Error> {
        if path.as_os_str().is_empty() {
            Err(ErrorImpl::OsError {
                operation: "resolve empty path".into(),
                source: std::io::Error::from_raw_os_error(libc::ENOENT),
            })?
        }
        let full = if path.is_absolute() {
            path.to_path_buf()
        } else {
            match self.resolve_fd(tracee, dirfd)? {
                Resolved::Guest(base) => base.as_path().join(path),
                Resolved::OutsideGuestfs => return Ok(Resolved::OutsideGuestfs),
            }
        };
        let guest = GuestPath::new(utils::normalize_lexically(&full))?;
        Ok(self.classify(guest))
    }

    fn resolve_fd(&self, _tracee: &dyn Tracee, fd: RawFd) -> Result<Resolved, Error> {
        match self.fds.get(&fd) {
            Some(resolved) => Ok(resolved.clone()),
            None => Err(ErrorImpl::OsError {
                operation: format!("resolve fd {fd}").into(),
                source: std::io::Error::from_raw_os_error(libc::EBADF),
            })?,
        }
    }

    fn within_guestfs(&self, guest: &GuestPath) -> bool {
        !self.outside.iter().any(|outside| guest.is_beneath(outside))
    }

    fn exists(&self, guest: &GuestPath) -> bool {
        self.existing.contains(guest)
    }
}

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

//! Mapping of syscall path arguments and file descriptors to guest paths.

use crate::{
    error::{Error, ErrorExt, ErrorImpl},
    utils, GuestPath, Tracee,
};

use std::{
    fs,
    os::unix::io::RawFd,
    path::{Path, PathBuf},
};

/// Result of translating a syscall argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// The argument names this path inside the guestfs.
    Guest(GuestPath),
    /// The argument names something the guestfs does not manage (a host path
    /// outside the rootfs, a bind-mounted host directory, a socket, ...). The
    /// real kernel is in charge of it.
    OutsideGuestfs,
}

/// Translation of syscall arguments into [`GuestPath`]s.
pub trait PathTranslator: Send + Sync {
    /// Resolve a path argument of a trapped syscall. Relative paths are
    /// resolved against `dirfd` (`AT_FDCWD` being the tracee's working
    /// directory).
    fn resolve_path(&self, tracee: &dyn Tracee, path: &Path, dirfd: RawFd)
        -> Result<Resolved, Error>;

    /// Resolve the file a tracee's file descriptor refers to. `AT_FDCWD`
    /// resolves to the tracee's working directory.
    fn resolve_fd(&self, tracee: &dyn Tracee, fd: RawFd) -> Result<Resolved, Error>;

    /// Is `guest` still managed by the guestfs?
    fn within_guestfs(&self, guest: &GuestPath) -> bool;

    /// Does `guest` already exist on the host? Dangling symlinks count as
    /// existing.
    fn exists(&self, guest: &GuestPath) -> bool;
}

/// A host directory mounted into the guestfs.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Binding {
    host: PathBuf,
    guest: GuestPath,
}

/// [`PathTranslator`] for a guestfs rooted at a host directory.
///
/// The tracer's own path translation runs before fakeid sees a syscall, so the
/// path arguments of the trapped syscall already hold host paths. This
/// translator maps them (and the host paths behind file descriptors, read
/// through `/proc/$pid/fd`) back to guest paths. Anything outside the rootfs,
/// or inside one of the configured bindings, is [`Resolved::OutsideGuestfs`].
#[derive(Debug, Clone)]
pub struct RootTranslator {
    root: PathBuf,
    proc_root: PathBuf,
    bindings: Vec<Binding>,
}

impl RootTranslator {
    /// Create a translator for the guestfs rooted at `root`, which must be an
    /// absolute host path.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, Error> {
        Ok(Self {
            root: Self::absolute("root", root.as_ref())?,
            proc_root: PathBuf::from("/proc"),
            bindings: Vec::new(),
        })
    }

    /// Declare that the host directory `host` is visible at `guest` inside
    /// the guestfs. Paths within a binding are real host paths and are never
    /// emulated.
    pub fn with_binding<P: AsRef<Path>>(mut self, host: P, guest: GuestPath) -> Result<Self, Error> {
        let host = Self::absolute("binding", host.as_ref())?;
        self.bindings.push(Binding { host, guest });
        Ok(self)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn absolute(name: &'static str, path: &Path) -> Result<PathBuf, Error> {
        if !path.is_absolute() {
            Err(ErrorImpl::InvalidArgument {
                name: name.into(),
                description: format!("{path:?} is not an absolute path").into(),
            })?
        }
        Ok(utils::normalize_lexically(path))
    }

    /// Map a host path (absolute, not yet normalized) to the guestfs.
    fn host_to_guest(&self, host: &Path) -> Result<Resolved, Error> {
        // Things like "socket:[1234]" or "anon_inode:[eventfd]".
        if !host.is_absolute() {
            return Ok(Resolved::OutsideGuestfs);
        }
        let host = utils::normalize_lexically(host);

        if self.bindings.iter().any(|b| host.starts_with(&b.host)) {
            return Ok(Resolved::OutsideGuestfs);
        }
        match host.strip_prefix(&self.root) {
            Ok(rest) => GuestPath::new(Path::new("/").join(rest)).map(Resolved::Guest),
            Err(_) => Ok(Resolved::OutsideGuestfs),
        }
    }

    fn fd_host_path(&self, tracee: &dyn Tracee, fd: RawFd) -> Result<PathBuf, Error> {
        utils::tracee_fd_path(&self.proc_root, tracee.pid(), fd)
            .with_wrap(|| format!("get host path of fd {fd} of tracee {}", tracee.pid()))
    }
}

impl PathTranslator for RootTranslator {
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
        let host = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.fd_host_path(tracee, dirfd)?.join(path)
        };
        self.host_to_guest(&host)
    }

    fn resolve_fd(&self, tracee: &dyn Tracee, fd: RawFd) -> Result<Resolved, Error> {
        let host = self.fd_host_path(tracee, fd)?;
        self.host_to_guest(&host)
    }

    fn within_guestfs(&self, guest: &GuestPath) -> bool {
        !self.bindings.iter().any(|b| guest.is_beneath(&b.guest))
    }

    fn exists(&self, guest: &GuestPath) -> bool {
        fs::symlink_metadata(self.root.join(guest.relative())).is_ok()
    }
}

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

use crate::error::{Error, ErrorImpl};

use std::{
    fs,
    os::unix::io::RawFd,
    path::{Path, PathBuf},
};

use libc::pid_t;

/// Get the right subpath in `/proc/$pid` for the given file descriptor
/// (including those with "special" values, like `AT_FDCWD`).
fn proc_subpath(fd: RawFd) -> Result<String, Error> {
    if fd == libc::AT_FDCWD {
        Ok("cwd".to_string())
    } else if fd >= 0 {
        Ok(format!("fd/{fd}"))
    } else {
        Err(ErrorImpl::InvalidArgument {
            name: "fd".into(),
            description: "must be non-negative or AT_FDCWD".into(),
        })?
    }
}

/// Get the path a tracee's file descriptor (or its cwd, for `AT_FDCWD`) is
/// referencing, through the `/proc/$pid/fd/$fd` magic-link.
///
/// This is naturally racy, but the tracee is stopped at the syscall-entry trap
/// while we look, so the only thing that can move the file out from under us
/// is another thread sharing the file table. The result only provides the
/// guarantee that "at some point during the trap this was the path the fd
/// pointed to" and no more.
pub(crate) fn tracee_fd_path(proc_root: &Path, pid: pid_t, fd: RawFd) -> Result<PathBuf, Error> {
    let fd_path = proc_root.join(pid.to_string()).join(proc_subpath(fd)?);
    fs::read_link(&fd_path).map_err(|err| {
        // A closed descriptor looks like a missing magic-link.
        let source = match err.raw_os_error() {
            Some(libc::ENOENT) => std::io::Error::from_raw_os_error(libc::EBADF),
            _ => err,
        };
        ErrorImpl::OsError {
            operation: format!("readlink fd magic-link {fd_path:?}").into(),
            source,
        }
        .into()
    })
}

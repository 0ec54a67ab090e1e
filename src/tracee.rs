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

use crate::error::{Error, ErrorImpl};

use std::{fmt, os::unix::io::RawFd, path::PathBuf};

use libc::{c_long, pid_t};

/// One of the (up to six) argument registers of a trapped syscall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SysArg {
    Arg1,
    Arg2,
    Arg3,
    Arg4,
    Arg5,
    Arg6,
}

impl SysArg {
    /// Zero-based index of the argument.
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for SysArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "arg{}", self.index() + 1)
    }
}

/// The tracer's view of a traced process stopped at a syscall-entry trap.
///
/// This is the boundary between fakeid and the ptrace machinery: fakeid never
/// attaches to or resumes a process, it only reads the trapped syscall's
/// arguments and (through [`Outcome::apply`]) rewrites them.
///
/// [`Outcome::apply`]: crate::Outcome::apply
pub trait Tracee {
    /// The thread id of the traced thread.
    fn pid(&self) -> pid_t;

    /// Read the raw value of a syscall argument register, as it was when the
    /// syscall was trapped.
    fn peek_arg(&self, arg: SysArg) -> Result<u64, Error>;

    /// Read the NUL-terminated path pointed to by a syscall argument, from the
    /// traced process's memory.
    fn peek_path(&self, arg: SysArg) -> Result<PathBuf, Error>;

    /// Overwrite a syscall argument register.
    fn poke_arg(&mut self, arg: SysArg, value: u64) -> Result<(), Error>;

    /// Replace the number of the trapped syscall before the kernel runs it.
    fn set_sysnum(&mut self, sysnum: c_long) -> Result<(), Error>;

    /// Read a syscall argument which holds a file descriptor (or `AT_FDCWD`).
    fn peek_fd(&self, arg: SysArg) -> Result<RawFd, Error> {
        let raw = self.peek_arg(arg)?;
        // File descriptors are ints, so only the low 32 bits matter (AT_FDCWD
        // may or may not have been sign-extended by the caller).
        let fd = raw as u32 as i32;
        if fd < 0 && fd != libc::AT_FDCWD {
            Err(ErrorImpl::OsError {
                operation: format!("decode fd argument {arg} ({raw:#x})").into(),
                source: std::io::Error::from_raw_os_error(libc::EBADF),
            })?
        }
        Ok(fd)
    }
}

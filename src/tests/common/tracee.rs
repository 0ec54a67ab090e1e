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
    SysArg, Tracee,
};

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use libc::{c_long, pid_t};

/// A tracee stopped at a syscall-entry trap, with made-up registers.
#[derive(Debug, Clone)]
pub(crate) struct MockTracee {
    pid: pid_t,
    args: [u64; 6],
    paths: HashMap<SysArg, PathBuf>,
    pokes: Vec<(SysArg, u64)>,
    sysnum: Option<c_long>,
}

impl MockTracee {
    /// A tracee with a pid that does not exist, for tests which never look at
    /// `/proc`.
    pub(crate) fn new() -> Self {
        Self::with_pid(pid_t::MAX)
    }

    /// A tracee backed by the test process itself, so that `/proc/$pid/fd`
    /// and `/proc/$pid/cwd` lookups see real file descriptors.
    pub(crate) fn current_process() -> Self {
        Self::with_pid(std::process::id() as pid_t)
    }

    fn with_pid(pid: pid_t) -> Self {
        Self {
            pid,
            args: [0; 6],
            paths: HashMap::new(),
            pokes: Vec::new(),
            sysnum: None,
        }
    }

    pub(crate) fn set_arg(&mut self, arg: SysArg, value: u64) {
        self.args[arg.index()] = value;
    }

    /// Make `arg` point to `path` in the tracee's memory.
    pub(crate) fn set_path<P: AsRef<Path>>(&mut self, arg: SysArg, path: P) {
        self.paths.insert(arg, path.as_ref().into());
    }

    pub(crate) fn arg(&self, arg: SysArg) -> u64 {
        self.args[arg.index()]
    }

    /// All register writes, in order.
    pub(crate) fn pokes(&self) -> &[(SysArg, u64)] {
        &self.pokes
    }

    /// The replacement syscall number, if the syscall was changed.
    pub(crate) fn sysnum(&self) -> Option<c_long> {
        self.sysnum
    }
}

impl Tracee for MockTracee {
    fn pid(&self) -> pid_t {
        self.pid
    }

    fn peek_arg(&self, arg: SysArg) -> Result<u64, Error> {
        Ok(self.args[arg.index()])
    }

    fn peek_path(&self, arg: SysArg) -> Result<PathBuf, Error> {
        match self.paths.get(&arg) {
            Some(path) => Ok(path.clone()),
            None => Err(ErrorImpl::OsError {
                operation: format!("read path from {arg}").into(),
                source: std::io::Error::from_raw_os_error(libc::EFAULT),
            })?,
        }
    }

    fn poke_arg(&mut self, arg: SysArg, value: u64) -> Result<(), Error> {
        self.args[arg.index()] = value;
        self.pokes.push((arg, value));
        Ok(())
    }

    fn set_sysnum(&mut self, sysnum: c_long) -> Result<(), Error> {
        self.sysnum = Some(sysnum);
        Ok(())
    }
}

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

use crate::error::{Error, ErrorExt, ErrorImpl};

use std::{
    fs::File,
    io::{BufRead, BufReader, Read},
};

use lazy_static::lazy_static;
use libc::{gid_t, mode_t, uid_t};
use regex::Regex;

/// Umask assumed when the kernel does not expose one in `/proc/$pid/status`.
const DEFAULT_UMASK: mode_t = 0o022;

/// The emulated identity of a traced session.
///
/// A [`Config`] is fixed for the lifetime of a session and is handed by
/// reference to every operation, so it can be shared freely between threads
/// handling different tracees.
///
/// ```
/// # use fakeid::Config;
/// // A session pretending to be root, with a restrictive umask.
/// let config = Config::root().with_umask(0o077);
/// assert_eq!(config.euid, 0);
///
/// // A session pretending to be an ordinary user.
/// let config = Config::new(1000, 1000);
/// assert_eq!((config.ruid, config.euid), (1000, 1000));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Real uid presented to the traced program.
    pub ruid: uid_t,
    /// Effective uid presented to the traced program. Used for all ownership
    /// authorization decisions.
    pub euid: uid_t,
    /// Real gid presented to the traced program.
    pub rgid: gid_t,
    /// Effective gid presented to the traced program.
    pub egid: gid_t,
    /// Umask applied to the mode of newly created records.
    pub umask: mode_t,
}

impl Default for Config {
    fn default() -> Self {
        Self::root()
    }
}

impl Config {
    /// A session where every id is `uid`/`gid`.
    pub fn new(uid: uid_t, gid: gid_t) -> Self {
        Self {
            ruid: uid,
            euid: uid,
            rgid: gid,
            egid: gid,
            umask: DEFAULT_UMASK,
        }
    }

    /// A fake-root session (all ids are 0).
    pub fn root() -> Self {
        Self::new(0, 0)
    }

    pub fn with_ruid(mut self, ruid: uid_t) -> Self {
        self.ruid = ruid;
        self
    }

    pub fn with_euid(mut self, euid: uid_t) -> Self {
        self.euid = euid;
        self
    }

    pub fn with_rgid(mut self, rgid: gid_t) -> Self {
        self.rgid = rgid;
        self
    }

    pub fn with_egid(mut self, egid: gid_t) -> Self {
        self.egid = egid;
        self
    }

    pub fn with_umask(mut self, umask: mode_t) -> Self {
        self.umask = umask & 0o777;
        self
    }

    /// Is the emulated effective identity root?
    pub fn is_root(&self) -> bool {
        self.euid == 0
    }

    /// Build a [`Config`] from the contents of a `/proc/$pid/status` file.
    ///
    /// The real and effective ids are taken from the `Uid:` and `Gid:` lines,
    /// and the umask from the `Umask:` line. There has been a `Umask:` field in
    /// `/proc/$pid/status` since Linux 4.7 (see commit 3e42979e65da
    /// ("procfs: expose umask in /proc/<PID>/status")), on older kernels we
    /// fall back to `0o022`.
    pub fn from_status<R: Read>(status: R) -> Result<Self, Error> {
        // MSRV(1.70): Use OnceLock.
        // MSRV(1.80): Use LazyLock.
        lazy_static! {
            static ref UID_RE: Regex = Regex::new(r"^Uid:\s+(\d+)\s+(\d+)").unwrap();
            static ref GID_RE: Regex = Regex::new(r"^Gid:\s+(\d+)\s+(\d+)").unwrap();
            static ref UMASK_RE: Regex = Regex::new(r"^Umask:\s*(0[0-7]+)$").unwrap();
        }

        let (mut uids, mut gids, mut umask) = (None, None, None);
        for line in BufReader::new(status).lines() {
            let line = line.map_err(|err| ErrorImpl::OsError {
                operation: "read lines from status file".into(),
                source: err,
            })?;
            if let Some((_, [real, effective])) = UID_RE.captures(&line).map(|caps| caps.extract())
            {
                uids = Some((real.parse::<uid_t>()?, effective.parse::<uid_t>()?));
            } else if let Some((_, [real, effective])) =
                GID_RE.captures(&line).map(|caps| caps.extract())
            {
                gids = Some((real.parse::<gid_t>()?, effective.parse::<gid_t>()?));
            } else if let Some((_, [mask])) = UMASK_RE.captures(&line).map(|caps| caps.extract())
            {
                umask = Some(mode_t::from_str_radix(mask, 8)?);
            }
        }

        let (ruid, euid) = uids.ok_or_else(|| ErrorImpl::InvalidArgument {
            name: "status".into(),
            description: "missing Uid: line".into(),
        })?;
        let (rgid, egid) = gids.ok_or_else(|| ErrorImpl::InvalidArgument {
            name: "status".into(),
            description: "missing Gid: line".into(),
        })?;

        Ok(Self {
            ruid,
            euid,
            rgid,
            egid,
            umask: umask.unwrap_or(DEFAULT_UMASK),
        })
    }

    /// Build a [`Config`] mirroring the ids and umask of the calling thread.
    //NOTE: While the umask is shared between threads, it unshared with
    //      `CLONE_FS` so a single thread could have a different umask to other
    //      threads.
    pub fn current() -> Result<Self, Error> {
        let status = File::open("/proc/thread-self/status").map_err(|err| ErrorImpl::OsError {
            operation: "open /proc/thread-self/status".into(),
            source: err,
        })?;
        Self::from_status(status).wrap("parse /proc/thread-self/status")
    }
}

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

//! Trapped syscalls and what to do with them.

use crate::{error::Error, SysArg, Tracee};

use libc::c_long;

/// The syscall a neutralized syscall is replaced with. `getuid(2)` has no
/// side effects and cannot fail.
pub const NEUTRAL_SYSNUM: c_long = libc::SYS_getuid;

/// The syscalls fakeid knows how to emulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Syscall {
    Chown,
    Lchown,
    Fchown,
    Fchownat,
    Chmod,
    Fchmod,
    Fchmodat,
    Access,
    Faccessat,
    Faccessat2,
    Mkdir,
    Mkdirat,
    Mknod,
    Mknodat,
}

impl Syscall {
    /// Map a native syscall number to a [`Syscall`].
    ///
    /// The legacy non-`at` forms only exist on some architectures (aarch64
    /// for instance only has the `*at` forms).
    pub fn from_raw(sysnum: c_long) -> Option<Self> {
        let syscall = match sysnum {
            #[cfg(target_arch = "x86_64")]
            libc::SYS_chown => Self::Chown,
            #[cfg(target_arch = "x86_64")]
            libc::SYS_lchown => Self::Lchown,
            libc::SYS_fchown => Self::Fchown,
            libc::SYS_fchownat => Self::Fchownat,
            #[cfg(target_arch = "x86_64")]
            libc::SYS_chmod => Self::Chmod,
            libc::SYS_fchmod => Self::Fchmod,
            libc::SYS_fchmodat => Self::Fchmodat,
            #[cfg(target_arch = "x86_64")]
            libc::SYS_access => Self::Access,
            libc::SYS_faccessat => Self::Faccessat,
            libc::SYS_faccessat2 => Self::Faccessat2,
            #[cfg(target_arch = "x86_64")]
            libc::SYS_mkdir => Self::Mkdir,
            libc::SYS_mkdirat => Self::Mkdirat,
            #[cfg(target_arch = "x86_64")]
            libc::SYS_mknod => Self::Mknod,
            libc::SYS_mknodat => Self::Mknodat,
            _ => return None,
        };
        Some(syscall)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Chown => "chown",
            Self::Lchown => "lchown",
            Self::Fchown => "fchown",
            Self::Fchownat => "fchownat",
            Self::Chmod => "chmod",
            Self::Fchmod => "fchmod",
            Self::Fchmodat => "fchmodat",
            Self::Access => "access",
            Self::Faccessat => "faccessat",
            Self::Faccessat2 => "faccessat2",
            Self::Mkdir => "mkdir",
            Self::Mkdirat => "mkdirat",
            Self::Mknod => "mknod",
            Self::Mknodat => "mknodat",
        }
    }
}

/// Decode a uid or gid argument. `(uid_t)-1` means "leave unchanged".
///
/// Only the low 32 bits of the register are significant, so both a
/// sign-extended and a zero-extended `-1` decode to [`None`].
pub fn decode_id(raw: u64) -> Option<u32> {
    match raw as u32 {
        u32::MAX => None,
        id => Some(id),
    }
}

/// A register rewrite requested by a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterWrite {
    pub arg: SysArg,
    pub value: u64,
}

/// The decision a handler made about a trapped syscall.
///
/// Handlers never touch the tracee themselves; the dispatcher applies the
/// outcome (see [`Outcome::apply`]). Denials are reported as errors instead.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Outcome {
    /// The target is not emulated. The syscall must run unmodified.
    Deferred,
    /// The change targets something outside the guestfs. The syscall is
    /// neutralized and reported as successful.
    Dropped,
    /// A record was created for the target, and the syscall must still run
    /// so the real inode exists.
    Tracked,
    /// The metadata store is authoritative and has been updated. The
    /// syscall is neutralized after applying `rewrites`.
    Applied { rewrites: Vec<RegisterWrite> },
}

impl Outcome {
    pub(crate) fn applied() -> Self {
        Self::Applied {
            rewrites: Vec::new(),
        }
    }

    /// Will the real syscall be replaced by [`NEUTRAL_SYSNUM`]?
    ///
    /// If so, the tracer must set the tracee's result register to `0` at
    /// syscall exit. Otherwise the tracee sees the return value of
    /// `getuid(2)` instead of a successful `chown(2)` or `access(2)`.
    pub fn is_neutralized(&self) -> bool {
        matches!(self, Self::Dropped | Self::Applied { .. })
    }

    /// Apply the outcome to the stopped tracee at syscall entry: perform the
    /// requested register rewrites, then neutralize the syscall if needed.
    ///
    /// Only the entry half is handled here. For a neutralized syscall the
    /// result still has to be forced to `0` at syscall exit (see
    /// [`Outcome::is_neutralized`]).
    pub fn apply(&self, tracee: &mut dyn Tracee) -> Result<(), Error> {
        if let Self::Applied { rewrites } = self {
            for write in rewrites {
                tracee.poke_arg(write.arg, write.value)?;
            }
        }
        if self.is_neutralized() {
            tracee.set_sysnum(NEUTRAL_SYSNUM)?;
        }
        Ok(())
    }
}

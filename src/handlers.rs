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

//! Syscall handlers and their argument layouts.
//!
//! Every handler follows the same decision shape: resolve the target, bail
//! out for targets outside the guestfs, bail out for targets without a
//! record, check traversal permissions, and then authorize and apply the
//! change while holding the record's lock.

use crate::{
    error::{Error, ErrorExt},
    meta::MetadataStore,
    translate::{PathTranslator, Resolved},
    Emulator, GuestPath, SysArg, Tracee,
};

use std::os::unix::io::RawFd;

use libc::c_int;

mod access;
mod chmod;
mod chown;
mod create;

/// How a syscall names the file it operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetArgs {
    /// A path, relative paths being resolved against the working directory.
    Path { path: SysArg },
    /// A path relative to a directory descriptor, with optional `AT_*` flags.
    PathAt {
        dirfd: SysArg,
        path: SysArg,
        flags: Option<SysArg>,
    },
    /// An open file descriptor.
    Fd { fd: SysArg },
}

impl TargetArgs {
    /// The directory descriptor of the call (`AT_FDCWD` for non-`at` forms).
    fn dirfd(&self, tracee: &dyn Tracee) -> Result<RawFd, Error> {
        match self {
            Self::PathAt { dirfd, .. } => tracee.peek_fd(*dirfd),
            _ => Ok(libc::AT_FDCWD),
        }
    }

    /// The `AT_*` flags of the call (zero if it has none).
    fn flags(&self, tracee: &dyn Tracee) -> Result<c_int, Error> {
        match self {
            Self::PathAt {
                flags: Some(flags), ..
            } => Ok(tracee.peek_arg(*flags)? as c_int),
            _ => Ok(0),
        }
    }
}

/// Argument layout of the chown family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChownArgs {
    pub target: TargetArgs,
    pub owner: SysArg,
    pub group: SysArg,
}

impl ChownArgs {
    pub const fn chown() -> Self {
        Self {
            target: TargetArgs::Path { path: SysArg::Arg1 },
            owner: SysArg::Arg2,
            group: SysArg::Arg3,
        }
    }

    pub const fn lchown() -> Self {
        Self::chown()
    }

    pub const fn fchown() -> Self {
        Self {
            target: TargetArgs::Fd { fd: SysArg::Arg1 },
            owner: SysArg::Arg2,
            group: SysArg::Arg3,
        }
    }

    pub const fn fchownat() -> Self {
        Self {
            target: TargetArgs::PathAt {
                dirfd: SysArg::Arg1,
                path: SysArg::Arg2,
                flags: Some(SysArg::Arg5),
            },
            owner: SysArg::Arg3,
            group: SysArg::Arg4,
        }
    }
}

/// Argument layout of the chmod family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChmodArgs {
    pub target: TargetArgs,
    pub mode: SysArg,
}

impl ChmodArgs {
    pub const fn chmod() -> Self {
        Self {
            target: TargetArgs::Path { path: SysArg::Arg1 },
            mode: SysArg::Arg2,
        }
    }

    pub const fn fchmod() -> Self {
        Self {
            target: TargetArgs::Fd { fd: SysArg::Arg1 },
            mode: SysArg::Arg2,
        }
    }

    /// The raw `fchmodat` syscall has no flags argument (the libc wrapper's
    /// flags are emulated in userspace).
    pub const fn fchmodat() -> Self {
        Self {
            target: TargetArgs::PathAt {
                dirfd: SysArg::Arg1,
                path: SysArg::Arg2,
                flags: None,
            },
            mode: SysArg::Arg3,
        }
    }
}

/// Argument layout of the access family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessArgs {
    pub target: TargetArgs,
    pub mode: SysArg,
}

impl AccessArgs {
    pub const fn access() -> Self {
        Self {
            target: TargetArgs::Path { path: SysArg::Arg1 },
            mode: SysArg::Arg2,
        }
    }

    /// Like `fchmodat`, the raw `faccessat` syscall takes no flags.
    pub const fn faccessat() -> Self {
        Self {
            target: TargetArgs::PathAt {
                dirfd: SysArg::Arg1,
                path: SysArg::Arg2,
                flags: None,
            },
            mode: SysArg::Arg3,
        }
    }

    pub const fn faccessat2() -> Self {
        Self {
            target: TargetArgs::PathAt {
                dirfd: SysArg::Arg1,
                path: SysArg::Arg2,
                flags: Some(SysArg::Arg4),
            },
            mode: SysArg::Arg3,
        }
    }
}

/// Argument layout of the syscalls creating inodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateArgs {
    pub target: TargetArgs,
    pub mode: SysArg,
    /// Does the syscall create a directory (as opposed to `mknod`, whose mode
    /// argument carries the file type)?
    pub directory: bool,
}

impl CreateArgs {
    pub const fn mkdir() -> Self {
        Self {
            target: TargetArgs::Path { path: SysArg::Arg1 },
            mode: SysArg::Arg2,
            directory: true,
        }
    }

    pub const fn mkdirat() -> Self {
        Self {
            target: TargetArgs::PathAt {
                dirfd: SysArg::Arg1,
                path: SysArg::Arg2,
                flags: None,
            },
            mode: SysArg::Arg3,
            directory: true,
        }
    }

    pub const fn mknod() -> Self {
        Self {
            target: TargetArgs::Path { path: SysArg::Arg1 },
            mode: SysArg::Arg2,
            directory: false,
        }
    }

    pub const fn mknodat() -> Self {
        Self {
            target: TargetArgs::PathAt {
                dirfd: SysArg::Arg1,
                path: SysArg::Arg2,
                flags: None,
            },
            mode: SysArg::Arg3,
            directory: false,
        }
    }
}

impl<S: MetadataStore, T: PathTranslator> Emulator<S, T> {
    /// Resolve the file a syscall operates on.
    pub(crate) fn resolve_target(
        &self,
        tracee: &dyn Tracee,
        target: &TargetArgs,
    ) -> Result<Resolved, Error> {
        let resolved = match target {
            TargetArgs::Fd { fd } => {
                let fd = tracee.peek_fd(*fd)?;
                self.translator.resolve_fd(tracee, fd)
            }
            TargetArgs::Path { path } | TargetArgs::PathAt { path, .. } => {
                let dirfd = target.dirfd(tracee)?;
                let path = tracee.peek_path(*path)?;
                if path.as_os_str().is_empty()
                    && target.flags(tracee)? & libc::AT_EMPTY_PATH != 0
                {
                    self.translator.resolve_fd(tracee, dirfd)
                } else {
                    self.translator.resolve_path(tracee, &path, dirfd)
                }
            }
        };
        resolved.wrap("resolve syscall target")
    }

    /// Resolve the directory a syscall's path is relative to. A directory
    /// outside the guestfs gives no guarantees about the guestfs, so the
    /// guestfs root is used instead.
    pub(crate) fn resolve_reference(
        &self,
        tracee: &dyn Tracee,
        target: &TargetArgs,
    ) -> Result<GuestPath, Error> {
        let dirfd = target.dirfd(tracee)?;
        let reference = self
            .translator
            .resolve_fd(tracee, dirfd)
            .wrap("resolve reference directory")?;
        Ok(match reference {
            Resolved::Guest(path) => path,
            Resolved::OutsideGuestfs => GuestPath::root(),
        })
    }
}

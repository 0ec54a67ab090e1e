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

//! Side-channel storage of emulated `(mode, owner, group)` records.
//!
//! The real kernel never learns about emulated ownership. Instead every
//! managed guest path has a [`Record`] in a [`MetadataStore`], keyed by a
//! [`MetaPath`] which the store derives from the guest path. The *absence* of
//! a record is meaningful: it means the path is not emulated at all and real
//! filesystem semantics apply.

use crate::{
    error::Error,
    flags::{PermissionFlags, Permissions, RecordFlags},
    Config, GuestPath,
};

use std::{
    fmt,
    path::{Path, PathBuf},
};

use libc::{gid_t, mode_t, uid_t};

mod lock;
pub use lock::*;

mod file;
pub use file::*;

mod memory;
pub use memory::*;

/// The store-side location of a guest path's [`Record`].
///
/// For [`MetaFileStore`] this is the host path of the record file, other
/// stores are free to use it as an opaque key.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetaPath(PathBuf);

impl MetaPath {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self(path.into())
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Debug for MetaPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// Emulated metadata of one guest inode.
///
/// A record always carries all three fields; there is no such thing as a
/// partial record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    /// Permission and file-type bits (as in `st_mode`).
    pub mode: mode_t,
    pub owner: uid_t,
    pub group: gid_t,
}

impl Record {
    pub fn new(mode: mode_t, owner: uid_t, group: gid_t) -> Self {
        Self { mode, owner, group }
    }

    /// The record assumed for a path that has none: `0755` owned by the
    /// emulated effective identity.
    ///
    /// This is deliberately permissive, so that ancestors which were never
    /// emulated (for instance, directories that came with the rootfs image)
    /// never block traversal.
    pub fn fallback(config: &Config) -> Self {
        Self::new(0o755, config.euid, config.egid)
    }

    /// The permission class of this record that applies to `uid`/`gid`.
    ///
    /// Root and the owner get the owner class, members of the record's group
    /// get the group class, everyone else gets the other class.
    pub fn permissions_for(&self, uid: uid_t, gid: gid_t) -> Permissions {
        let shift = if uid == 0 || uid == self.owner {
            6
        } else if gid == self.group {
            3
        } else {
            0
        };
        Permissions::from_mode_class(self.mode >> shift)
    }
}

/// Storage backend for emulated metadata records.
///
/// Implementations must be safe to share between threads handling different
/// tracees. Read-modify-write sequences on a single record are serialized by
/// callers through [`MetadataStore::lock`].
pub trait MetadataStore: Send + Sync {
    /// Derive the [`MetaPath`] for a guest path.
    ///
    /// Errors (such as the resulting location being too long) must be
    /// reported rather than silently falling back to some other location.
    fn meta_path(&self, guest: &GuestPath) -> Result<MetaPath, Error>;

    /// Does a record exist at `meta_path`?
    fn record_exists(&self, meta_path: &MetaPath) -> bool;

    /// Read the record at `meta_path`.
    ///
    /// If there is no record, [`Record::fallback`] is returned.
    fn read_record(&self, meta_path: &MetaPath, config: &Config) -> Result<Record, Error>;

    /// Create or replace the record at `meta_path`.
    ///
    /// With [`RecordFlags::CREATE`] the session's umask is applied to the
    /// permission bits of `record.mode`.
    fn write_record(
        &self,
        meta_path: &MetaPath,
        record: Record,
        flags: RecordFlags,
        config: &Config,
    ) -> Result<(), Error>;

    /// Take the lock protecting `meta_path`'s record. The guard must be held
    /// across any read-authorize-write sequence on that record.
    fn lock(&self, meta_path: &MetaPath) -> RecordGuard<'_>;

    /// Get the permission class of `meta_path`'s record that applies to the
    /// emulated identity (the effective ids, or the real ids with
    /// [`PermissionFlags::REAL_IDS`]).
    fn permission_bits(
        &self,
        meta_path: &MetaPath,
        config: &Config,
        flags: PermissionFlags,
    ) -> Result<Permissions, Error> {
        let record = self.read_record(meta_path, config)?;
        let (uid, gid) = if flags.contains(PermissionFlags::REAL_IDS) {
            (config.ruid, config.rgid)
        } else {
            (config.euid, config.egid)
        };
        Ok(record.permissions_for(uid, gid))
    }
}

/// Apply the [`RecordFlags`] of a write to a record.
pub(crate) fn prepare_record(record: Record, flags: RecordFlags, config: &Config) -> Record {
    let mut record = record;
    if flags.contains(RecordFlags::CREATE) {
        record.mode &= !config.umask;
    }
    record
}

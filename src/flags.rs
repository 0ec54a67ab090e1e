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

//! Bit-flag types used by the metadata store and the permission checker.

use bitflags::bitflags;

bitflags! {
    /// One permission class (owner, group or other) of an emulated mode.
    ///
    /// The bit assignment is identical to the `access(2)` `*_OK` constants, so
    /// a mode class extracted with `(mode >> shift) & 7` can be used directly.
    ///
    /// ```
    /// # use fakeid::flags::Permissions;
    /// let perms = Permissions::from_mode_class(0o750 >> 3);
    /// assert!(perms.contains(Permissions::READ | Permissions::EXECUTE));
    /// assert!(!perms.contains(Permissions::WRITE));
    /// ```
    #[derive(Default, PartialEq, Eq, Debug, Clone, Copy)]
    pub struct Permissions: u32 {
        /// Search permission on directories, execute on everything else.
        const EXECUTE = libc::X_OK as u32;
        const WRITE = libc::W_OK as u32;
        const READ = libc::R_OK as u32;
    }
}

impl Permissions {
    /// Extract the permission bits from a single (already shifted) mode class.
    #[inline]
    pub fn from_mode_class(class: u32) -> Self {
        Self::from_bits_truncate(class & 0o7)
    }
}

bitflags! {
    /// Flags for [`MetadataStore::write_record`].
    ///
    /// [`MetadataStore::write_record`]: crate::MetadataStore::write_record
    #[derive(Default, PartialEq, Eq, Debug, Clone, Copy)]
    pub struct RecordFlags: u32 {
        /// The record describes a freshly created inode, so the session's
        /// umask applies to the mode (just like `open(O_CREAT)` and `mkdir`).
        const CREATE = 0x01;
    }
}

bitflags! {
    /// Flags for [`MetadataStore::permission_bits`].
    ///
    /// [`MetadataStore::permission_bits`]: crate::MetadataStore::permission_bits
    #[derive(Default, PartialEq, Eq, Debug, Clone, Copy)]
    pub struct PermissionFlags: u32 {
        /// Pick the permission class using the real uid and gid rather than
        /// the effective ones (`access(2)` semantics).
        const REAL_IDS = 0x01;
    }
}

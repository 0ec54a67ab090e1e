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

//! Emulated directory traversal checks.
//!
//! The kernel requires search permission on every directory leading up to a
//! path, and write permission on the parent directory when an entry is
//! created or removed. fakeid has to make the same decisions, but against the
//! emulated permission bits in the [`MetadataStore`] rather than the real
//! ones.

use crate::{
    error::{Error, ErrorImpl},
    flags::{PermissionFlags, Permissions},
    meta::MetadataStore,
    translate::PathTranslator,
    Config, GuestPath,
};

/// Which discipline [`check_traversal`] applies to the parent directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalMode {
    /// The final component is only looked up: every ancestor (including the
    /// immediate parent) needs search permission.
    Read,
    /// The final component is created or modified: the immediate parent needs
    /// write permission, every further ancestor needs search permission.
    Write,
}

impl TraversalMode {
    fn parent_permission(self) -> Permissions {
        match self {
            Self::Read => Permissions::EXECUTE,
            Self::Write => Permissions::WRITE,
        }
    }
}

fn check_dir<S>(store: &S, dir: &GuestPath, want: Permissions, config: &Config) -> Result<(), Error>
where
    S: MetadataStore + ?Sized,
{
    let meta_path = store.meta_path(dir)?;
    let perms = store.permission_bits(&meta_path, config, PermissionFlags::empty())?;
    tracing::trace!(dir = %dir, ?perms, ?want, "checking emulated directory permissions");
    if !perms.contains(want) {
        Err(ErrorImpl::PermissionDenied {
            path: dir.as_path().into(),
            description: format!("missing {want:?} permission").into(),
        })?
    }
    Ok(())
}

/// Check that `path` may be accessed, given that `reference` (usually the
/// directory a relative path was resolved against) has already been
/// validated.
///
/// The immediate parent of `path` is always checked (for write permission in
/// [`TraversalMode::Write`], search permission otherwise). The walk then
/// continues upwards requiring search permission, and stops without checking
/// as soon as it reaches `reference`, gets shorter than `reference`, or
/// leaves the guestfs.
///
/// Failing to locate a directory's record is reported as that error, not as a
/// permission denial.
pub fn check_traversal<S, T>(
    store: &S,
    translator: &T,
    mode: TraversalMode,
    path: &GuestPath,
    reference: &GuestPath,
    config: &Config,
) -> Result<(), Error>
where
    S: MetadataStore + ?Sized,
    T: PathTranslator + ?Sized,
{
    // The root has no ancestors to check.
    if path.is_root() {
        return Ok(());
    }

    let mut current = path.dir_path();
    check_dir(store, &current, mode.parent_permission(), config)?;

    while current != *reference && current.len() > reference.len() {
        current = current.dir_path();
        if current == *reference || current.len() < reference.len() {
            break;
        }
        if !translator.within_guestfs(&current) {
            break;
        }
        check_dir(store, &current, Permissions::EXECUTE, config)?;
    }

    Ok(())
}

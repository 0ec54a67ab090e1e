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

use crate::{
    error::{Error, ErrorImpl},
    flags::{PermissionFlags, Permissions},
    meta::MetadataStore,
    perms::TraversalMode,
    syscall::Outcome,
    translate::{PathTranslator, Resolved},
    AccessArgs, Emulator, Tracee,
};

use libc::c_int;

impl<S: MetadataStore, T: PathTranslator> Emulator<S, T> {
    /// Emulate a syscall of the access family against the emulated mode.
    ///
    /// As with the real syscalls, the check is done with the real ids unless
    /// `AT_EACCESS` is passed.
    pub fn handle_access(&self, tracee: &dyn Tracee, args: &AccessArgs) -> Result<Outcome, Error> {
        let mode = tracee.peek_arg(args.mode)? as c_int;
        let want = match Permissions::from_bits(mode as u32) {
            Some(want) => want,
            None => Err(ErrorImpl::InvalidArgument {
                name: "mode".into(),
                description: format!("unknown access mode {mode:#o}").into(),
            })?,
        };
        let flags = if args.target.flags(tracee)? & libc::AT_EACCESS != 0 {
            PermissionFlags::empty()
        } else {
            PermissionFlags::REAL_IDS
        };

        let path = match self.resolve_target(tracee, &args.target)? {
            Resolved::Guest(path) => path,
            Resolved::OutsideGuestfs => return Ok(Outcome::Deferred),
        };

        let meta_path = self.store.meta_path(&path)?;
        if !self.store.record_exists(&meta_path) {
            tracing::debug!(path = %path, "access target has no record, deferring to kernel");
            return Ok(Outcome::Deferred);
        }

        let reference = self.resolve_reference(tracee, &args.target)?;
        self.check_traversal(TraversalMode::Read, &path, &reference)?;

        // F_OK only asks whether the path can be reached.
        if !want.is_empty() {
            let perms = self.store.permission_bits(&meta_path, &self.config, flags)?;
            if !perms.contains(want) {
                tracing::debug!(path = %path, ?want, ?perms, "emulated access denied");
                Err(ErrorImpl::PermissionDenied {
                    path: path.as_path().into(),
                    description: format!("missing {:?} permission", want - perms).into(),
                })?
            }
        }
        Ok(Outcome::applied())
    }
}

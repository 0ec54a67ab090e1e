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
    flags::RecordFlags,
    meta::{MetadataStore, Record},
    perms::TraversalMode,
    syscall::Outcome,
    translate::{PathTranslator, Resolved},
    ChmodArgs, Emulator, Tracee,
};

use libc::mode_t;

impl<S: MetadataStore, T: PathTranslator> Emulator<S, T> {
    /// Emulate a syscall of the chmod family.
    ///
    /// Only the fake root and the record's owner may change the mode. The
    /// file-type bits of the record are kept.
    pub fn handle_mode_change(
        &self,
        tracee: &dyn Tracee,
        args: &ChmodArgs,
    ) -> Result<Outcome, Error> {
        let path = match self.resolve_target(tracee, &args.target)? {
            Resolved::Guest(path) => path,
            Resolved::OutsideGuestfs => {
                tracing::debug!("chmod target outside of guestfs, dropping syscall");
                return Ok(Outcome::Dropped);
            }
        };

        let meta_path = self.store.meta_path(&path)?;
        if !self.store.record_exists(&meta_path) {
            tracing::debug!(path = %path, "chmod target has no record, deferring to kernel");
            return Ok(Outcome::Deferred);
        }

        let reference = self.resolve_reference(tracee, &args.target)?;
        self.check_traversal(TraversalMode::Read, &path, &reference)?;

        let _guard = self.store.lock(&meta_path);
        let current = self.store.read_record(&meta_path, &self.config)?;
        let euid = self.config.euid;
        if !self.config.is_root() && euid != current.owner {
            tracing::debug!(path = %path, euid, owner = current.owner, "chmod not permitted");
            Err(ErrorImpl::NotPermitted {
                description: format!(
                    "uid {euid} cannot change the mode of {path} (owned by uid {})",
                    current.owner
                )
                .into(),
            })?
        }

        let requested = tracee.peek_arg(args.mode)? as mode_t & 0o7777;
        let mode = (current.mode & libc::S_IFMT) | requested;
        self.store.write_record(
            &meta_path,
            Record::new(mode, current.owner, current.group),
            RecordFlags::empty(),
            &self.config,
        )?;
        tracing::debug!(path = %path, mode = format_args!("{mode:o}"), "emulated chmod applied");
        Ok(Outcome::applied())
    }
}

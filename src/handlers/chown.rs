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
    syscall::{decode_id, Outcome, RegisterWrite},
    translate::{PathTranslator, Resolved},
    ChownArgs, Emulator, Tracee,
};

impl<S: MetadataStore, T: PathTranslator> Emulator<S, T> {
    /// Emulate a syscall of the chown family.
    ///
    /// * A target outside the guestfs is [`Outcome::Dropped`].
    /// * A target without a record is [`Outcome::Deferred`], and the store is
    ///   left untouched.
    /// * Otherwise the parent directories must be searchable, and:
    ///   - the fake root may set any owner and group;
    ///   - the owner may only change the group (the owner argument is
    ///     rewritten to the current owner);
    ///   - anybody else gets `EPERM`.
    ///
    /// The owner may currently move the file to *any* group, not only to a
    /// group it is a member of.
    pub fn handle_chown(&self, tracee: &dyn Tracee, args: &ChownArgs) -> Result<Outcome, Error> {
        let path = match self.resolve_target(tracee, &args.target)? {
            Resolved::Guest(path) => path,
            Resolved::OutsideGuestfs => {
                tracing::debug!("chown target outside of guestfs, dropping syscall");
                return Ok(Outcome::Dropped);
            }
        };

        let meta_path = self.store.meta_path(&path)?;
        if !self.store.record_exists(&meta_path) {
            tracing::debug!(path = %path, "chown target has no record, deferring to kernel");
            return Ok(Outcome::Deferred);
        }

        let reference = self.resolve_reference(tracee, &args.target)?;
        self.check_traversal(TraversalMode::Read, &path, &reference)?;

        let _guard = self.store.lock(&meta_path);
        let current = self.store.read_record(&meta_path, &self.config)?;
        let owner = decode_id(tracee.peek_arg(args.owner)?).unwrap_or(current.owner);
        let group = decode_id(tracee.peek_arg(args.group)?).unwrap_or(current.group);

        let euid = self.config.euid;
        let (record, rewrites) = if self.config.is_root() {
            (Record::new(current.mode, owner, group), Vec::new())
        } else if euid == current.owner {
            (
                Record::new(current.mode, current.owner, group),
                vec![RegisterWrite {
                    arg: args.owner,
                    value: current.owner.into(),
                }],
            )
        } else {
            tracing::debug!(path = %path, euid, owner = current.owner, "chown not permitted");
            Err(ErrorImpl::NotPermitted {
                description: format!(
                    "uid {euid} cannot change ownership of {path} (owned by uid {})",
                    current.owner
                )
                .into(),
            })?
        };

        self.store
            .write_record(&meta_path, record, RecordFlags::empty(), &self.config)?;
        tracing::debug!(
            path = %path,
            owner = record.owner,
            group = record.group,
            "emulated chown applied"
        );
        Ok(Outcome::Applied { rewrites })
    }
}

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
    error::Error,
    flags::RecordFlags,
    meta::{MetadataStore, Record},
    perms::TraversalMode,
    syscall::Outcome,
    translate::{PathTranslator, Resolved},
    CreateArgs, Emulator, Tracee,
};

use libc::mode_t;

impl<S: MetadataStore, T: PathTranslator> Emulator<S, T> {
    /// Emulate the creation of an inode, by creating its record. The parent
    /// directory must be writable.
    ///
    /// If the target already exists on the host, or already has a record, the
    /// kernel is left to report `EEXIST` and no record is written.
    pub fn handle_create(&self, tracee: &dyn Tracee, args: &CreateArgs) -> Result<Outcome, Error> {
        let path = match self.resolve_target(tracee, &args.target)? {
            Resolved::Guest(path) => path,
            Resolved::OutsideGuestfs => return Ok(Outcome::Deferred),
        };

        let meta_path = self.store.meta_path(&path)?;
        let _guard = self.store.lock(&meta_path);
        if self.store.record_exists(&meta_path) {
            tracing::debug!(path = %path, "create target already has a record");
            return Ok(Outcome::Deferred);
        }
        if self.translator.exists(&path) {
            tracing::debug!(path = %path, "create target already exists on the host");
            return Ok(Outcome::Deferred);
        }

        let reference = self.resolve_reference(tracee, &args.target)?;
        self.check_traversal(TraversalMode::Write, &path, &reference)?;

        let mode = tracee.peek_arg(args.mode)? as mode_t;
        let mode = if args.directory {
            libc::S_IFDIR | (mode & 0o7777)
        } else if mode & libc::S_IFMT == 0 {
            // mknod(2) treats a zero file type as a regular file.
            libc::S_IFREG | mode
        } else {
            mode
        };

        let record = Record::new(mode, self.config.euid, self.config.egid);
        self.store
            .write_record(&meta_path, record, RecordFlags::CREATE, &self.config)?;
        tracing::debug!(path = %path, mode = format_args!("{mode:o}"), "created record");
        Ok(Outcome::Tracked)
    }
}

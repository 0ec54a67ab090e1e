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
    error::{Error, ErrorExt},
    meta::MetadataStore,
    perms::{self, TraversalMode},
    syscall::{Outcome, Syscall},
    translate::PathTranslator,
    AccessArgs, ChmodArgs, ChownArgs, Config, CreateArgs, GuestPath, Tracee,
};

/// The emulation state of one traced session.
///
/// An [`Emulator`] bundles the session's emulated identity with the
/// [`MetadataStore`] and [`PathTranslator`] it operates on. All handlers take
/// `&self`, so a single [`Emulator`] can be shared by the threads handling
/// different tracees.
///
/// ```
/// # fn main() -> Result<(), fakeid::error::Error> {
/// use fakeid::{Config, Emulator, MemoryStore, RootTranslator};
///
/// let emulator = Emulator::new(
///     Config::new(1000, 1000),
///     MemoryStore::new(),
///     RootTranslator::new("/srv/rootfs")?,
/// );
/// assert_eq!(emulator.config().euid, 1000);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Emulator<S, T> {
    pub(crate) config: Config,
    pub(crate) store: S,
    pub(crate) translator: T,
}

impl<S: MetadataStore, T: PathTranslator> Emulator<S, T> {
    pub fn new(config: Config, store: S, translator: T) -> Self {
        Self {
            config,
            store,
            translator,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn translator(&self) -> &T {
        &self.translator
    }

    /// Check the emulated permissions of the directories leading to `path`.
    /// See [`perms::check_traversal`] for details.
    pub fn check_traversal(
        &self,
        mode: TraversalMode,
        path: &GuestPath,
        reference: &GuestPath,
    ) -> Result<(), Error> {
        perms::check_traversal(
            &self.store,
            &self.translator,
            mode,
            path,
            reference,
            &self.config,
        )
    }

    /// Emulate a trapped syscall with its native argument layout.
    pub fn handle(&self, tracee: &dyn Tracee, syscall: Syscall) -> Result<Outcome, Error> {
        let outcome = match syscall {
            Syscall::Chown => self.handle_chown(tracee, &ChownArgs::chown()),
            Syscall::Lchown => self.handle_chown(tracee, &ChownArgs::lchown()),
            Syscall::Fchown => self.handle_chown(tracee, &ChownArgs::fchown()),
            Syscall::Fchownat => self.handle_chown(tracee, &ChownArgs::fchownat()),
            Syscall::Chmod => self.handle_mode_change(tracee, &ChmodArgs::chmod()),
            Syscall::Fchmod => self.handle_mode_change(tracee, &ChmodArgs::fchmod()),
            Syscall::Fchmodat => self.handle_mode_change(tracee, &ChmodArgs::fchmodat()),
            Syscall::Access => self.handle_access(tracee, &AccessArgs::access()),
            Syscall::Faccessat => self.handle_access(tracee, &AccessArgs::faccessat()),
            Syscall::Faccessat2 => self.handle_access(tracee, &AccessArgs::faccessat2()),
            Syscall::Mkdir => self.handle_create(tracee, &CreateArgs::mkdir()),
            Syscall::Mkdirat => self.handle_create(tracee, &CreateArgs::mkdirat()),
            Syscall::Mknod => self.handle_create(tracee, &CreateArgs::mknod()),
            Syscall::Mknodat => self.handle_create(tracee, &CreateArgs::mknodat()),
        };
        outcome.with_wrap(|| format!("emulate {}", syscall.name()))
    }
}

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

//! fakeid emulates file ownership and permissions for programs running under
//! a ptrace-based syscall tracer, so that an unprivileged process can appear
//! to operate as root inside a virtual root filesystem (the "guestfs").
//!
//! Real privileges are never granted. Instead, the `(mode, owner, group)` of
//! guest paths is kept in a side-channel [`MetadataStore`], and syscalls that
//! would change ownership or permissions are decided against that store. The
//! tracer is told what to do with the trapped syscall through an [`Outcome`]:
//! let it run, or neutralize it (after rewriting some of its registers)
//! because the store now holds the authoritative answer.
//!
//! fakeid does not attach to processes or touch registers on its own. A
//! tracer provides access to a stopped tracee through the [`Tracee`] trait,
//! and a [`PathTranslator`] to map syscall arguments to guest paths.
//!
//! # Assumptions
//!
//! * A working `/proc` mount, which [`RootTranslator`] uses to find out what a
//!   tracee's file descriptors and working directory point to.
//! * Records for paths that were never emulated are simply absent. Absence
//!   means "not emulated", and the real kernel's semantics apply.
//!
//! # Examples
//!
//! A dispatcher handling a trapped syscall looks something like this. A
//! neutralized syscall actually runs [`NEUTRAL_SYSNUM`] (`getuid(2)`), so the
//! tracer has to overwrite its result with `0` when the tracee stops at
//! syscall exit:
//!
//! ```
//! # use fakeid::{error::Error, Emulator, MetadataStore, PathTranslator, Syscall, Tracee};
//! /// Returns whether the result register must be set to `0` at syscall exit.
//! fn on_syscall_entry<S, T>(
//!     emulator: &Emulator<S, T>,
//!     tracee: &mut dyn Tracee,
//!     sysnum: libc::c_long,
//! ) -> Result<bool, i32>
//! where
//!     S: MetadataStore,
//!     T: PathTranslator,
//! {
//!     let Some(syscall) = Syscall::from_raw(sysnum) else {
//!         return Ok(false);
//!     };
//!     let outcome = emulator
//!         .handle(tracee, syscall)
//!         .map_err(|err: Error| err.errno())?;
//!     outcome.apply(tracee).map_err(|err| err.errno())?;
//!     Ok(outcome.is_neutralized())
//! }
//! ```

// fakeid only supports Linux.
#![cfg(target_os = "linux")]

// `Config` of a traced session.
mod config;
#[doc(inline)]
pub use config::*;

// `Emulator` and the syscall handlers.
mod emulator;
#[doc(inline)]
pub use emulator::*;
mod handlers;
#[doc(inline)]
pub use handlers::*;

// `Error` definitions.
pub mod error;

pub mod flags;

mod guest;
#[doc(inline)]
pub use guest::*;

// Metadata stores.
pub mod meta;
#[doc(inline)]
pub use meta::{MemoryStore, MetaFileStore, MetaPath, MetadataStore, Record};

mod perms;
#[doc(inline)]
pub use perms::{check_traversal, TraversalMode};

mod syscall;
#[doc(inline)]
pub use syscall::*;

mod tracee;
#[doc(inline)]
pub use tracee::*;

mod translate;
#[doc(inline)]
pub use translate::*;

// Internally used helpers.
mod utils;

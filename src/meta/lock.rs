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

use crate::meta::MetaPath;

use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    sync::{Mutex, MutexGuard, PoisonError},
};

const LOCK_STRIPES: usize = 64;

/// Guard returned by [`MetadataStore::lock`]. The record stays locked until
/// the guard is dropped.
///
/// [`MetadataStore::lock`]: crate::MetadataStore::lock
#[must_use = "the record is unlocked as soon as the guard is dropped"]
#[derive(Debug)]
pub struct RecordGuard<'a>(#[allow(dead_code)] MutexGuard<'a, ()>);

/// A table of striped mutexes keyed by [`MetaPath`].
///
/// Two different paths may share a stripe (which only costs some contention),
/// but a given path always maps to the same stripe, so two read-modify-write
/// sequences on the same record can never interleave.
#[derive(Debug)]
pub struct LockTable {
    stripes: Vec<Mutex<()>>,
}

impl Default for LockTable {
    fn default() -> Self {
        Self::new()
    }
}

impl LockTable {
    pub fn new() -> Self {
        Self {
            stripes: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    fn stripe(&self, meta_path: &MetaPath) -> usize {
        let mut hasher = DefaultHasher::new();
        meta_path.hash(&mut hasher);
        (hasher.finish() as usize) % self.stripes.len()
    }

    /// Lock the stripe protecting `meta_path`.
    pub fn lock(&self, meta_path: &MetaPath) -> RecordGuard<'_> {
        // The mutex protects no data of its own, so a panic while it was held
        // cannot have left anything inconsistent.
        let guard = self.stripes[self.stripe(meta_path)]
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        RecordGuard(guard)
    }
}

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

use crate::{
    error::Error,
    flags::RecordFlags,
    meta::{prepare_record, LockTable, MetaPath, MetadataStore, Record, RecordGuard},
    Config, GuestPath,
};

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex, MutexGuard, PoisonError,
    },
};

/// A [`MetadataStore`] kept entirely in memory.
///
/// The [`MetaPath`] of a guest path is the guest path itself. Besides being
/// handy for embedding, the store counts every mutation it receives, which
/// makes it easy to check that an operation left the store untouched.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<MetaPath, Record>>,
    writes: AtomicUsize,
    locks: LockTable,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> MutexGuard<'_, HashMap<MetaPath, Record>> {
        // Every update is a single insert, so a poisoned map is still
        // consistent.
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed a record for `guest` without counting it as a mutation.
    pub fn insert(&self, guest: &GuestPath, record: Record) -> Result<(), Error> {
        let meta_path = self.meta_path(guest)?;
        self.records().insert(meta_path, record);
        Ok(())
    }

    /// The record stored for `guest`, if any.
    pub fn get(&self, guest: &GuestPath) -> Option<Record> {
        let meta_path = self.meta_path(guest).ok()?;
        self.records().get(&meta_path).copied()
    }

    /// Number of [`MetadataStore::write_record`] calls this store has served.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl MetadataStore for MemoryStore {
    fn meta_path(&self, guest: &GuestPath) -> Result<MetaPath, Error> {
        // GuestPath already enforces the length limit.
        Ok(MetaPath::new(guest.as_path()))
    }

    fn record_exists(&self, meta_path: &MetaPath) -> bool {
        self.records().contains_key(meta_path)
    }

    fn read_record(&self, meta_path: &MetaPath, config: &Config) -> Result<Record, Error> {
        Ok(self
            .records()
            .get(meta_path)
            .copied()
            .unwrap_or_else(|| Record::fallback(config)))
    }

    fn write_record(
        &self,
        meta_path: &MetaPath,
        record: Record,
        flags: RecordFlags,
        config: &Config,
    ) -> Result<(), Error> {
        let record = prepare_record(record, flags, config);
        self.records().insert(meta_path.clone(), record);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn lock(&self, meta_path: &MetaPath) -> RecordGuard<'_> {
        self.locks.lock(meta_path)
    }
}

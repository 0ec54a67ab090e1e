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
    error::{Error, ErrorExt, ErrorImpl},
    flags::RecordFlags,
    meta::{prepare_record, LockTable, MetaPath, MetadataStore, Record, RecordGuard},
    Config, GuestPath,
};

use std::{
    ffi::{OsStr, OsString},
    fs::{self, OpenOptions},
    io::{ErrorKind as IOErrorKind, Read, Write},
    os::unix::{ffi::OsStrExt, fs::OpenOptionsExt},
    path::{Path, PathBuf},
};

use libc::{gid_t, mode_t, uid_t};
use rand::{self, Rng};

/// Prefix of the record file stored next to each managed host file.
pub const META_FILE_PREFIX: &str = ".fakeid-meta.";

/// Name of the record file describing the guestfs root itself.
pub const ROOT_META_FILE: &str = ".fakeid-meta-root";

/// A [`MetadataStore`] which keeps each record in a small text file next to
/// the host file it describes.
///
/// The record of `<rootfs>/dir/name` lives in `<rootfs>/dir/.fakeid-meta.name`
/// and contains three lines: the mode (in octal), the owner and the group.
/// Records are replaced atomically, so a concurrent reader either sees the old
/// or the new record but never a torn one.
#[derive(Debug)]
pub struct MetaFileStore {
    root: PathBuf,
    locks: LockTable,
}

impl MetaFileStore {
    /// Create a store for the guestfs rooted at the host directory `root`.
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            locks: LockTable::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn encode(record: &Record) -> String {
        format!("{:o}\n{}\n{}\n", record.mode, record.owner, record.group)
    }

    fn decode(meta_path: &MetaPath, contents: &str) -> Result<Record, Error> {
        let corrupt = |description: String| ErrorImpl::CorruptRecord {
            meta_path: meta_path.as_path().into(),
            description: description.into(),
        };

        let mut lines = contents.lines().map(str::trim);
        let mut next_field = |field: &'static str| {
            lines
                .next()
                .filter(|line| !line.is_empty())
                .ok_or_else(|| corrupt(format!("missing {field} field")))
        };
        let (mode, owner, group) = (next_field("mode")?, next_field("owner")?, next_field("group")?);

        Ok(Record {
            mode: mode_t::from_str_radix(mode, 8)
                .map_err(|err| corrupt(format!("bad mode {mode:?}: {err}")))?,
            owner: owner
                .parse::<uid_t>()
                .map_err(|err| corrupt(format!("bad owner {owner:?}: {err}")))?,
            group: group
                .parse::<gid_t>()
                .map_err(|err| corrupt(format!("bad group {group:?}: {err}")))?,
        })
    }

    fn write_atomic(&self, meta_path: &MetaPath, contents: &str) -> Result<(), Error> {
        let target = meta_path.as_path();
        let dir = target.parent().unwrap_or_else(|| Path::new("/"));

        let mut g = rand::thread_rng();
        let tmp_path = dir.join(format!("{META_FILE_PREFIX}tmp.{:016x}", g.gen::<u64>()));

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .custom_flags(libc::O_NOFOLLOW | libc::O_CLOEXEC)
            .open(&tmp_path)
            .map_err(|err| ErrorImpl::OsError {
                operation: format!("create temporary record {tmp_path:?}").into(),
                source: err,
            })?;

        let result = file
            .write_all(contents.as_bytes())
            .and_then(|_| fs::rename(&tmp_path, target));
        if let Err(err) = result {
            let _ = fs::remove_file(&tmp_path);
            Err(ErrorImpl::OsError {
                operation: format!("replace record {target:?}").into(),
                source: err,
            })?
        }
        Ok(())
    }
}

impl MetadataStore for MetaFileStore {
    fn meta_path(&self, guest: &GuestPath) -> Result<MetaPath, Error> {
        let host = if guest.is_root() {
            self.root.join(ROOT_META_FILE)
        } else {
            let bytes = guest.as_path().as_os_str().as_bytes();
            // GuestPath is absolute and has no trailing slashes, so there is
            // always a non-empty final component after the last '/'.
            let idx = memchr::memrchr(b'/', bytes).unwrap_or(0);
            let base = OsStr::from_bytes(&bytes[idx + 1..]);
            if base == "." || base == ".." {
                Err(ErrorImpl::InvalidArgument {
                    name: "guest path".into(),
                    description: format!("{guest:?} does not name a directory entry").into(),
                })?
            }

            let mut name = OsString::from(META_FILE_PREFIX);
            name.push(base);
            self.root.join(guest.dir_path().relative()).join(name)
        };

        let len = host.as_os_str().len();
        if len >= libc::PATH_MAX as usize {
            return Err(ErrorImpl::NameTooLong {
                path: host,
                len,
                limit: libc::PATH_MAX as usize,
            }
            .into());
        }
        Ok(MetaPath::new(host))
    }

    fn record_exists(&self, meta_path: &MetaPath) -> bool {
        fs::symlink_metadata(meta_path.as_path())
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    }

    fn read_record(&self, meta_path: &MetaPath, config: &Config) -> Result<Record, Error> {
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NOFOLLOW | libc::O_CLOEXEC)
            .open(meta_path.as_path());
        let mut file = match file {
            Ok(file) => file,
            Err(err) if err.kind() == IOErrorKind::NotFound => return Ok(Record::fallback(config)),
            Err(err) => Err(ErrorImpl::OsError {
                operation: format!("open record {meta_path:?}").into(),
                source: err,
            })?,
        };

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|err| ErrorImpl::OsError {
                operation: format!("read record {meta_path:?}").into(),
                source: err,
            })?;
        Self::decode(meta_path, &contents)
    }

    fn write_record(
        &self,
        meta_path: &MetaPath,
        record: Record,
        flags: RecordFlags,
        config: &Config,
    ) -> Result<(), Error> {
        let record = prepare_record(record, flags, config);
        self.write_atomic(meta_path, &Self::encode(&record))
            .with_wrap(|| format!("write record {record:?}"))
    }

    fn lock(&self, meta_path: &MetaPath) -> RecordGuard<'_> {
        self.locks.lock(meta_path)
    }
}

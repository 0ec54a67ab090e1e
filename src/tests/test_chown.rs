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
    error::ErrorKind,
    flags::RecordFlags,
    tests::common::{emulator, memory_store, MockTracee, MockTranslator},
    ChownArgs, Config, GuestPath, MemoryStore, MetaFileStore, MetadataStore, Outcome, Record,
    RegisterWrite, Resolved, RootTranslator, SysArg, NEUTRAL_SYSNUM,
};

use std::{fs, thread};

use anyhow::Error;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

/// `(uid_t) -1`, as passed by chown(1) for "leave unchanged".
const SENTINEL: u64 = u32::MAX as u64;

fn chown_tracee(path: &str, owner: u64, group: u64) -> MockTracee {
    let mut tracee = MockTracee::new();
    tracee.set_path(SysArg::Arg1, path);
    tracee.set_arg(SysArg::Arg2, owner);
    tracee.set_arg(SysArg::Arg3, group);
    tracee
}

fn file(mode: u32, owner: u32, group: u32) -> Record {
    Record::new(libc::S_IFREG | mode, owner, group)
}

#[test]
fn chown_unmanaged_path_deferred() -> Result<(), Error> {
    let store = memory_store! {
        "/etc" => dir (0o755, 0:0),
    };
    let emulator = emulator!(Config::new(1000, 1000), store);
    let mut tracee = chown_tracee("/etc/passwd", 0, 0);

    let outcome = emulator.handle_chown(&tracee, &ChownArgs::chown())?;
    assert_eq!(outcome, Outcome::Deferred);
    assert!(!outcome.is_neutralized());
    assert_eq!(emulator.store().write_count(), 0, "no store mutation");
    assert_eq!(emulator.store().get(&GuestPath::new("/etc/passwd")?), None);

    outcome.apply(&mut tracee)?;
    assert_eq!(tracee.sysnum(), None, "syscall must run unmodified");
    assert!(tracee.pokes().is_empty());
    Ok(())
}

macro_rules! chown_as_root_tests {
    ($($test_name:ident ($owner:expr, $group:expr) => ($want_owner:literal : $want_group:literal));* $(;)?) => {
        paste::paste! {
            $(
                #[test]
                fn [<chown_as_root_ $test_name>]() -> Result<(), Error> {
                    let store = memory_store! {
                        "/etc/passwd" => file (0o644, 1000:1000),
                    };
                    let emulator = emulator!(Config::root(), store);
                    let mut tracee = chown_tracee("/etc/passwd", $owner, $group);

                    let outcome = emulator.handle_chown(&tracee, &ChownArgs::chown())?;
                    assert_eq!(outcome, Outcome::Applied { rewrites: vec![] });
                    assert_eq!(
                        emulator.store().get(&GuestPath::new("/etc/passwd")?),
                        Some(file(0o644, $want_owner, $want_group)),
                        "fake root writes the requested ids verbatim"
                    );

                    outcome.apply(&mut tracee)?;
                    assert_eq!(tracee.sysnum(), Some(NEUTRAL_SYSNUM));
                    Ok(())
                }
            )*
        }
    };
}

chown_as_root_tests! {
    to_root(0, 0) => (0:0);
    to_user(1234, 100) => (1234:100);
    owner_only(1234, SENTINEL) => (1234:1000);
    group_only(SENTINEL, 50) => (1000:50);
    neither(SENTINEL, SENTINEL) => (1000:1000);
    sign_extended_sentinel(u64::MAX, 7) => (1000:7);
}

macro_rules! chown_as_owner_tests {
    ($($test_name:ident ($owner:expr, $group:expr) => ($want_owner:literal : $want_group:literal));* $(;)?) => {
        paste::paste! {
            $(
                #[test]
                fn [<chown_as_owner_ $test_name>]() -> Result<(), Error> {
                    let store = memory_store! {
                        "/home/user/notes" => file (0o600, 1000:1000),
                    };
                    let emulator = emulator!(Config::new(1000, 1000), store);
                    let mut tracee = chown_tracee("/home/user/notes", $owner, $group);

                    let outcome = emulator.handle_chown(&tracee, &ChownArgs::chown())?;
                    assert_eq!(
                        outcome,
                        Outcome::Applied {
                            rewrites: vec![RegisterWrite {
                                arg: SysArg::Arg2,
                                value: 1000,
                            }],
                        },
                        "the owner argument is rewritten to the current owner"
                    );
                    assert_eq!(
                        emulator.store().get(&GuestPath::new("/home/user/notes")?),
                        Some(file(0o600, $want_owner, $want_group)),
                        "the owner may only change the group"
                    );

                    outcome.apply(&mut tracee)?;
                    assert_eq!(tracee.arg(SysArg::Arg2), 1000);
                    assert_eq!(tracee.sysnum(), Some(NEUTRAL_SYSNUM));
                    Ok(())
                }
            )*
        }
    };
}

chown_as_owner_tests! {
    give_away_to_root(0, 0) => (1000:0);
    give_away_to_other(1001, 1001) => (1000:1001);
    group_only(SENTINEL, 2000) => (1000:2000);
    same_owner(1000, 5) => (1000:5);
    nothing(SENTINEL, SENTINEL) => (1000:1000);
}

#[test]
fn chown_group_change_scenario() -> Result<(), Error> {
    let store = MemoryStore::new();
    store.insert(&GuestPath::new("/data/file")?, Record::new(0o644, 1000, 1000))?;
    let emulator = emulator!(Config::new(1000, 1000), store);
    let mut tracee = chown_tracee("/data/file", SENTINEL, 2000);

    let outcome = emulator.handle_chown(&tracee, &ChownArgs::chown())?;
    outcome.apply(&mut tracee)?;

    assert_eq!(
        emulator.store().get(&GuestPath::new("/data/file")?),
        Some(Record::new(0o644, 1000, 2000))
    );
    assert_eq!(tracee.sysnum(), Some(NEUTRAL_SYSNUM), "syscall neutralized");
    Ok(())
}

macro_rules! chown_not_permitted_tests {
    ($($test_name:ident ($euid:literal : $egid:literal, $owner:expr, $group:expr));* $(;)?) => {
        paste::paste! {
            $(
                #[test]
                fn [<chown_not_permitted_ $test_name>]() -> Result<(), Error> {
                    let store = memory_store! {
                        "/data/file" => file (0o644, 1000:1000),
                    };
                    let emulator = emulator!(Config::new($euid, $egid), store);
                    let tracee = chown_tracee("/data/file", $owner, $group);

                    let err = emulator
                        .handle_chown(&tracee, &ChownArgs::chown())
                        .expect_err("chown by a non-owner must fail");
                    assert_eq!(err.kind(), ErrorKind::NotPermitted);
                    assert_eq!(err.errno(), libc::EPERM);

                    assert_eq!(
                        emulator.store().get(&GuestPath::new("/data/file")?),
                        Some(file(0o644, 1000, 1000)),
                        "record must be unchanged"
                    );
                    assert_eq!(emulator.store().write_count(), 0);
                    assert!(tracee.pokes().is_empty());
                    assert_eq!(tracee.sysnum(), None);
                    Ok(())
                }
            )*
        }
    };
}

chown_not_permitted_tests! {
    any_ids(1001:1001, 0, 0);
    take_ownership(1001:1001, 1001, 1001);
    group_only(1001:1001, SENTINEL, 2000);
    same_group_member(1001:1000, SENTINEL, 1000);
    noop_request(1001:1001, SENTINEL, SENTINEL);
}

#[test]
fn chown_idempotent_as_owner() -> Result<(), Error> {
    let store = memory_store! {
        "/data/file" => file (0o640, 1000:1000),
    };
    let emulator = emulator!(Config::new(1000, 1000), store);
    let guest = GuestPath::new("/data/file")?;

    let mut first = chown_tracee("/data/file", 0, 2000);
    emulator
        .handle_chown(&first, &ChownArgs::chown())?
        .apply(&mut first)?;
    let after_first = emulator.store().get(&guest);

    let mut second = chown_tracee("/data/file", 0, 2000);
    let outcome = emulator.handle_chown(&second, &ChownArgs::chown())?;
    outcome.apply(&mut second)?;

    assert_eq!(after_first, Some(file(0o640, 1000, 2000)));
    assert_eq!(emulator.store().get(&guest), after_first);
    assert_eq!(second.arg(SysArg::Arg2), 1000);
    Ok(())
}

#[test]
fn chown_outside_guestfs_dropped() -> Result<(), Error> {
    let store = memory_store! {
        "/mnt/host/file" => file (0o644, 1000:1000),
    };
    let translator = MockTranslator::new().with_outside(GuestPath::new("/mnt/host")?);
    let emulator = emulator!(Config::new(1000, 1000), store, translator);
    let mut tracee = chown_tracee("/mnt/host/file", 0, 0);

    let outcome = emulator.handle_chown(&tracee, &ChownArgs::chown())?;
    assert_eq!(outcome, Outcome::Dropped);
    outcome.apply(&mut tracee)?;
    assert_eq!(tracee.sysnum(), Some(NEUTRAL_SYSNUM));
    assert_eq!(emulator.store().write_count(), 0);
    Ok(())
}

#[test]
fn chown_parent_not_searchable() -> Result<(), Error> {
    let store = memory_store! {
        "/secret" => dir (0o700, 0:0),
        "/secret/file" => file (0o644, 1000:1000),
    };
    let emulator = emulator!(Config::new(1000, 1000), store);
    let tracee = chown_tracee("/secret/file", SENTINEL, 2000);

    let err = emulator
        .handle_chown(&tracee, &ChownArgs::chown())
        .expect_err("parent directory is not searchable");
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    assert_eq!(err.errno(), libc::EACCES);
    assert_eq!(
        emulator.store().get(&GuestPath::new("/secret/file")?),
        Some(file(0o644, 1000, 1000))
    );
    Ok(())
}

#[test]
fn chown_reference_skips_validated_ancestors() -> Result<(), Error> {
    let store = memory_store! {
        "/locked" => dir (0o700, 0:0),
        "/locked/dir" => dir (0o755, 1000:1000),
        "/locked/dir/file" => file (0o644, 1000:1000),
    };
    let translator = MockTranslator::new()
        .with_cwd(GuestPath::new("/locked/dir")?)
        .with_fd(3, Resolved::Guest(GuestPath::root()));
    let emulator = emulator!(Config::new(1000, 1000), store, translator);

    // Relative to a working directory which was already validated.
    let tracee = chown_tracee("file", SENTINEL, 2000);
    emulator.handle_chown(&tracee, &ChownArgs::chown())?;
    assert_eq!(
        emulator.store().get(&GuestPath::new("/locked/dir/file")?),
        Some(file(0o644, 1000, 2000))
    );

    // Relative to the root, every ancestor has to be searchable.
    let mut tracee = MockTracee::new();
    tracee.set_arg(SysArg::Arg1, 3);
    tracee.set_path(SysArg::Arg2, "locked/dir/file");
    tracee.set_arg(SysArg::Arg3, SENTINEL);
    tracee.set_arg(SysArg::Arg4, 3000);
    let err = emulator
        .handle_chown(&tracee, &ChownArgs::fchownat())
        .expect_err("/locked is not searchable");
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    assert_eq!(
        emulator.store().get(&GuestPath::new("/locked/dir/file")?),
        Some(file(0o644, 1000, 2000))
    );
    Ok(())
}

#[test]
fn fchown_by_fd() -> Result<(), Error> {
    let store = memory_store! {
        "/etc/shadow" => file (0o640, 0:0),
    };
    let translator = MockTranslator::new()
        .with_fd(7, Resolved::Guest(GuestPath::new("/etc/shadow")?))
        .with_fd(8, Resolved::OutsideGuestfs);
    let emulator = emulator!(Config::root(), store, translator);

    let mut tracee = MockTracee::new();
    tracee.set_arg(SysArg::Arg1, 7);
    tracee.set_arg(SysArg::Arg2, 0);
    tracee.set_arg(SysArg::Arg3, 42);
    let outcome = emulator.handle_chown(&tracee, &ChownArgs::fchown())?;
    assert_eq!(outcome, Outcome::applied());
    assert_eq!(
        emulator.store().get(&GuestPath::new("/etc/shadow")?),
        Some(file(0o640, 0, 42))
    );

    tracee.set_arg(SysArg::Arg1, 8);
    assert_eq!(
        emulator.handle_chown(&tracee, &ChownArgs::fchown())?,
        Outcome::Dropped
    );

    tracee.set_arg(SysArg::Arg1, 9);
    let err = emulator
        .handle_chown(&tracee, &ChownArgs::fchown())
        .expect_err("fd 9 is not open");
    assert_eq!(err.kind(), ErrorKind::OsError(Some(libc::EBADF)));
    Ok(())
}

#[test]
fn fchownat_relative_to_dirfd() -> Result<(), Error> {
    let store = memory_store! {
        "/home/user/notes.txt" => file (0o644, 1000:1000),
    };
    let translator =
        MockTranslator::new().with_fd(5, Resolved::Guest(GuestPath::new("/home/user")?));
    let emulator = emulator!(Config::new(1000, 1000), store, translator);

    let mut tracee = MockTracee::new();
    tracee.set_arg(SysArg::Arg1, 5);
    tracee.set_path(SysArg::Arg2, "notes.txt");
    tracee.set_arg(SysArg::Arg3, 0);
    tracee.set_arg(SysArg::Arg4, 100);
    tracee.set_arg(SysArg::Arg5, libc::AT_SYMLINK_NOFOLLOW as u64);

    let outcome = emulator.handle_chown(&tracee, &ChownArgs::fchownat())?;
    assert_eq!(
        outcome,
        Outcome::Applied {
            rewrites: vec![RegisterWrite {
                arg: SysArg::Arg3,
                value: 1000,
            }],
        },
        "fchownat carries the owner in its third argument"
    );
    assert_eq!(
        emulator.store().get(&GuestPath::new("/home/user/notes.txt")?),
        Some(file(0o644, 1000, 100))
    );
    Ok(())
}

#[test]
fn fchownat_empty_path() -> Result<(), Error> {
    let store = memory_store! {
        "/home/user/notes.txt" => file (0o644, 1000:1000),
    };
    let translator = MockTranslator::new()
        .with_fd(5, Resolved::Guest(GuestPath::new("/home/user/notes.txt")?));
    let emulator = emulator!(Config::root(), store, translator);

    let mut tracee = MockTracee::new();
    tracee.set_arg(SysArg::Arg1, 5);
    tracee.set_path(SysArg::Arg2, "");
    tracee.set_arg(SysArg::Arg3, 0);
    tracee.set_arg(SysArg::Arg4, 0);

    // Without AT_EMPTY_PATH an empty path does not exist.
    let err = emulator
        .handle_chown(&tracee, &ChownArgs::fchownat())
        .expect_err("empty path without AT_EMPTY_PATH");
    assert_eq!(err.kind(), ErrorKind::OsError(Some(libc::ENOENT)));

    tracee.set_arg(SysArg::Arg5, libc::AT_EMPTY_PATH as u64);
    emulator.handle_chown(&tracee, &ChownArgs::fchownat())?;
    assert_eq!(
        emulator.store().get(&GuestPath::new("/home/user/notes.txt")?),
        Some(file(0o644, 0, 0))
    );
    Ok(())
}

#[test]
fn chown_meta_path_error_propagates() -> Result<(), Error> {
    let long = "/x".repeat(2040);
    let emulator = emulator!(Config::root(), MetaFileStore::new("/srv/rootfs"));
    let tracee = chown_tracee(&long, 0, 0);

    let err = emulator
        .handle_chown(&tracee, &ChownArgs::chown())
        .expect_err("record location is too long");
    assert_eq!(err.kind(), ErrorKind::NameTooLong);
    assert_eq!(err.errno(), libc::ENAMETOOLONG);
    Ok(())
}

#[test]
fn chown_concurrent_group_changes() -> Result<(), Error> {
    let store = memory_store! {
        "/shared" => file (0o664, 1000:1000),
    };
    let emulator = emulator!(Config::new(1000, 1000), store);

    thread::scope(|s| {
        for group in 0..16u64 {
            let emulator = &emulator;
            s.spawn(move || {
                let tracee = chown_tracee("/shared", SENTINEL, 2000 + group);
                emulator
                    .handle_chown(&tracee, &ChownArgs::chown())
                    .expect("concurrent chown should succeed");
            });
        }
    });

    let record = emulator
        .store()
        .get(&GuestPath::new("/shared")?)
        .expect("record still exists");
    assert_eq!(record.owner, 1000, "owner never changes");
    assert_eq!(record.mode, libc::S_IFREG | 0o664);
    assert!((2000..2016).contains(&record.group), "group {}", record.group);
    assert_eq!(emulator.store().write_count(), 16);
    Ok(())
}

#[test]
fn chown_with_file_store() -> Result<(), Error> {
    let root = TempDir::new()?;
    let root_path = root.path().canonicalize()?;
    fs::create_dir_all(root_path.join("etc"))?;
    fs::write(root_path.join("etc/passwd"), "root:x:0:0::/root:/bin/sh\n")?;

    let config = Config::new(1000, 1000);
    let store = MetaFileStore::new(&root_path);
    let meta_path = store.meta_path(&GuestPath::new("/etc/passwd")?)?;
    store.write_record(
        &meta_path,
        file(0o644, 1000, 1000),
        RecordFlags::empty(),
        &config,
    )?;

    let emulator = emulator!(config, store, RootTranslator::new(&root_path)?);
    // The tracer has already translated the path argument to a host path.
    let mut tracee = MockTracee::current_process();
    tracee.set_path(SysArg::Arg1, root_path.join("etc/passwd"));
    tracee.set_arg(SysArg::Arg2, SENTINEL);
    tracee.set_arg(SysArg::Arg3, 2000);

    emulator
        .handle_chown(&tracee, &ChownArgs::chown())?
        .apply(&mut tracee)?;

    assert_eq!(
        emulator.store().read_record(&meta_path, &config)?,
        file(0o644, 1000, 2000)
    );
    assert_eq!(
        fs::read_to_string(meta_path.as_path())?,
        "100644\n1000\n2000\n"
    );
    assert_eq!(tracee.sysnum(), Some(NEUTRAL_SYSNUM));
    Ok(())
}

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

use std::{
    ffi::OsStr,
    os::unix::ffi::OsStrExt,
    path::{Component, Path, PathBuf},
};

/// Helper to strip trailing / components from a path.
pub(crate) fn path_strip_trailing_slash(path: &Path) -> (&Path, bool) {
    let path_bytes = path.as_os_str().as_bytes();
    let idx = match path_bytes.iter().rposition(|c| *c != b'/') {
        Some(idx) => idx,
        None => {
            if path_bytes.len() > 1 {
                // Nothing but b'/' components -- return a single /.
                return (Path::new("/"), true);
            } else {
                // Either "/" or "".
                return (path, false);
            }
        }
    };
    if idx == path_bytes.len() - 1 {
        // No slashes to strip.
        (path, false)
    } else {
        // Strip trailing slashes.
        (Path::new(OsStr::from_bytes(&path_bytes[..=idx])), true)
    }
}

/// Get a path without its final component.
///
/// A trailing separator is treated as naming the directory itself, so
/// `"/a/b/"` yields `"/a/b"`. Paths with nothing above them (`"/"`, or a
/// single relative component) are returned unchanged rather than shrinking
/// past their first byte.
pub(crate) fn dir_path(path: &Path) -> &Path {
    let path_bytes = path.as_os_str().as_bytes();
    if path_bytes.len() <= 1 {
        return path;
    }
    match memchr::memrchr(b'/', path_bytes) {
        // Single relative component -- there is no parent to cut back to.
        None => path,
        Some(idx) if idx == path_bytes.len() - 1 => path_strip_trailing_slash(path).0,
        Some(0) => Path::new("/"),
        Some(idx) => {
            let (dir, _) = path_strip_trailing_slash(Path::new(OsStr::from_bytes(
                &path_bytes[..idx],
            )));
            if dir.as_os_str().is_empty() {
                Path::new("/")
            } else {
                dir
            }
        }
    }
}

/// Lexically clean up an absolute path: "." and empty components are dropped
/// and ".." removes the previous component. Like the kernel, ".." at the root
/// stays at the root.
///
/// This does not touch the filesystem, so symlinks are not taken into
/// account. Callers only use it on paths which have already been resolved by
/// the tracer's own path translation.
pub(crate) fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normal = PathBuf::from("/");
    for component in path.components() {
        match component {
            Component::RootDir | Component::CurDir | Component::Prefix(_) => (),
            Component::ParentDir => {
                normal.pop();
            }
            Component::Normal(name) => normal.push(name),
        }
    }
    normal
}

#[cfg(test)]
mod tests {
    use crate::utils::{dir_path, normalize_lexically, path_strip_trailing_slash};

    use std::path::PathBuf;

    use pretty_assertions::assert_eq;

    macro_rules! path_strip_slash_tests {
        // path_strip_slash_tests! {
        //      abc("a/b" => "a/b");
        //      xyz("/foo/bar///" => "/foo/bar");
        //      xyz("//" => "/");
        // }
        ($($test_name:ident ($path:expr => $stripped:expr, $trailing:expr));* $(;)? ) => {
            paste::paste! {
                $(
                    #[test]
                    fn [<path_strip_slash_ $test_name>]() {
                        let path: PathBuf = $path.into();
                        let (got_path, got_trailing) = path_strip_trailing_slash(&path);

                        let want_path: PathBuf = $stripped.into();
                        let want_trailing = $trailing;

                        assert_eq!(
                            got_path.as_os_str(), want_path.as_os_str(),
                            "stripping {path:?} produced wrong result -- got {got_path:?}",
                        );
                        assert_eq!(
                            got_trailing, want_trailing,
                            "expected {path:?} to have trailing_slash={want_trailing}",
                        );
                    }
                )*
            }
        };
    }

    path_strip_slash_tests! {
        empty("" => "", false);
        root("/" => "/", false);

        regular_notrailing1("/foo/bar/baz" => "/foo/bar/baz", false);
        regular_notrailing2("/a" => "/a", false);

        regular_trailing1("/foo/bar/baz/" => "/foo/bar/baz", true);
        regular_trailing2("/a/" => "/a", true);

        root_multi1("////////" => "/", true);
        root_multi2("//" => "/", true);
    }

    macro_rules! dir_path_tests {
        // dir_path_tests! {
        //      abc("/a/b/c" => "/a/b");
        // }
        ($($test_name:ident ($path:expr => $dir:expr));* $(;)? ) => {
            paste::paste! {
                $(
                    #[test]
                    fn [<dir_path_ $test_name>]() {
                        let path: PathBuf = $path.into();
                        let got = dir_path(&path);
                        let want: PathBuf = $dir.into();

                        assert_eq!(
                            got.as_os_str(), want.as_os_str(),
                            "dir_path({path:?}) produced wrong result -- got {got:?}",
                        );
                        assert!(
                            got.as_os_str().len() <= path.as_os_str().len(),
                            "dir_path({path:?}) must never grow the path",
                        );
                    }
                )*
            }
        };
    }

    dir_path_tests! {
        empty("" => "");
        root("/" => "/");
        single_char("a" => "a");
        single_relative("abc" => "abc");

        top_level("/a" => "/");
        top_level_long("/usr" => "/");
        nested("/a/b/c" => "/a/b");
        nested_long("/usr/lib/x86_64" => "/usr/lib");
        relative("a/b" => "a");

        trailing("/a/b/" => "/a/b");
        trailing_multi("/a/b///" => "/a/b");
        trailing_top_level("/a/" => "/a");

        double_slash("/a//b" => "/a");
        leading_double_slash("//a" => "/");
        root_multi("///" => "/");
    }

    #[test]
    fn dir_path_reaches_root() {
        let mut path = PathBuf::from("/a/b/c/d");
        let mut seen = vec![];
        while path.as_os_str() != "/" {
            path = dir_path(&path).to_path_buf();
            seen.push(path.clone());
        }
        assert_eq!(
            seen,
            vec![
                PathBuf::from("/a/b/c"),
                PathBuf::from("/a/b"),
                PathBuf::from("/a"),
                PathBuf::from("/"),
            ]
        );
    }

    macro_rules! normalize_tests {
        ($($test_name:ident ($path:expr => $normal:expr));* $(;)? ) => {
            paste::paste! {
                $(
                    #[test]
                    fn [<normalize_lexically_ $test_name>]() {
                        let path: PathBuf = $path.into();
                        let want: PathBuf = $normal.into();
                        assert_eq!(normalize_lexically(&path), want);
                    }
                )*
            }
        };
    }

    normalize_tests! {
        root("/" => "/");
        plain("/a/b" => "/a/b");
        dots("/a/./b/." => "/a/b");
        dotdot("/a/b/../c" => "/a/c");
        dotdot_past_root("/../../a" => "/a");
        slashes("//a///b//" => "/a/b");
    }
}

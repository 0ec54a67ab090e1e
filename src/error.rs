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

//! Error types for fakeid.
//!
//! Every error is scoped to the single syscall being emulated. Dispatchers
//! turn an [`Error`] into the errno reported to the traced program with
//! [`Error::errno`], which gives the same codes a real kernel would use for
//! the equivalent condition (`EACCES` for traversal failures, `EPERM` for a
//! rejected ownership change, and so on).

use std::{borrow::Cow, io::Error as IOError, path::PathBuf};

/// Opaque error type for fakeid.
///
/// If you wish to do non-trivial error handling with fakeid errors, use
/// [`Error::kind`] to get an [`ErrorKind`] you can handle programmatically.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct Error(#[from] Box<ErrorImpl>);

impl<E: Into<ErrorImpl>> From<E> for Error {
    #[doc(hidden)]
    fn from(err: E) -> Self {
        Self(Box::new(err.into()))
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        self.0.kind()
    }

    /// The errno to report to the traced program for this error.
    ///
    /// Errors without a natural errno mapping are reported as `EIO`.
    pub fn errno(&self) -> i32 {
        self.kind().errno().unwrap_or(libc::EIO)
    }
}

#[derive(thiserror::Error, Debug)]
pub(crate) enum ErrorImpl {
    #[error("invalid {name} argument: {description}")]
    InvalidArgument {
        name: Cow<'static, str>,
        description: Cow<'static, str>,
    },

    #[error("path {path:?} is too long ({len} >= {limit} bytes)")]
    NameTooLong {
        path: PathBuf,
        len: usize,
        limit: usize,
    },

    #[error("permission denied on {path:?}: {description}")]
    PermissionDenied {
        path: PathBuf,
        description: Cow<'static, str>,
    },

    #[error("operation not permitted: {description}")]
    NotPermitted { description: Cow<'static, str> },

    #[error("corrupt metadata record {meta_path:?}: {description}")]
    CorruptRecord {
        meta_path: PathBuf,
        description: Cow<'static, str>,
    },

    #[error("{operation} failed")]
    OsError {
        operation: Cow<'static, str>,
        source: IOError,
    },

    #[error("integer parsing failed")]
    ParseIntError(#[from] std::num::ParseIntError),

    #[error("{context}")]
    Wrapped {
        context: Cow<'static, str>,
        source: Box<ErrorImpl>,
    },
}

/// Underlying error class for fakeid errors.
///
/// This is similar in concept to [`std::io::ErrorKind`]. Each kind (aside from
/// [`ErrorKind::InternalError`]) maps to the errno the real kernel would have
/// returned for the equivalent condition.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A syscall argument or path handed to fakeid was malformed.
    InvalidArgument,
    /// A guest path or its metadata location exceeded `PATH_MAX`.
    NameTooLong,
    /// A directory on the way to the target lacked the emulated search (or
    /// write) permission.
    PermissionDenied,
    /// The emulated identity is not allowed to make the requested change.
    NotPermitted,
    /// A metadata record exists but could not be decoded.
    CorruptRecord,
    /// Some internal error occurred. For more information, see the string
    /// description of the original [`Error`].
    InternalError,
    /// The underlying error came from a host I/O operation. The provided value
    /// is the numerical value of the `errno` number, if available.
    OsError(Option<i32>),
}

impl ErrorImpl {
    pub(crate) fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::NameTooLong { .. } => ErrorKind::NameTooLong,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::NotPermitted { .. } => ErrorKind::NotPermitted,
            Self::CorruptRecord { .. } => ErrorKind::CorruptRecord,
            Self::OsError { source, .. } => ErrorKind::OsError(source.raw_os_error()),
            Self::ParseIntError(_) => ErrorKind::InternalError,
            Self::Wrapped { source, .. } => source.kind(),
        }
    }
}

impl ErrorKind {
    /// Return a C-like errno for the [`ErrorKind`].
    pub fn errno(&self) -> Option<i32> {
        match self {
            ErrorKind::InvalidArgument => Some(libc::EINVAL),
            ErrorKind::NameTooLong => Some(libc::ENAMETOOLONG),
            ErrorKind::PermissionDenied => Some(libc::EACCES),
            ErrorKind::NotPermitted => Some(libc::EPERM),
            ErrorKind::CorruptRecord => Some(libc::EIO),
            ErrorKind::OsError(errno) => *errno,
            ErrorKind::InternalError => None,
        }
    }
}

// Private trait necessary to work around the "orphan trait" restriction.
pub(crate) trait ErrorExt: Sized {
    /// Wrap a `Result<..., Error>` with an additional context string.
    fn wrap<S: Into<String>>(self, context: S) -> Self {
        self.with_wrap(|| context.into())
    }

    /// Wrap a `Result<..., Error>` with an additional context string created by
    /// a closure.
    fn with_wrap<F>(self, context_fn: F) -> Self
    where
        F: FnOnce() -> String;
}

impl ErrorExt for ErrorImpl {
    fn with_wrap<F>(self, context_fn: F) -> Self
    where
        F: FnOnce() -> String,
    {
        Self::Wrapped {
            context: context_fn().into(),
            source: self.into(),
        }
    }
}

impl ErrorExt for Error {
    fn with_wrap<F>(self, context_fn: F) -> Self
    where
        F: FnOnce() -> String,
    {
        (*self.0).with_wrap(context_fn).into()
    }
}

impl<T, E: ErrorExt> ErrorExt for Result<T, E> {
    fn with_wrap<F>(self, context_fn: F) -> Self
    where
        F: FnOnce() -> String,
    {
        self.map_err(|err| err.with_wrap(context_fn))
    }
}

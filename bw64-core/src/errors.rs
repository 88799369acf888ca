// BW64
// Copyright (c) 2024 The Project BW64 Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `errors` module defines the common error type.

use std::error;
use std::fmt;
use std::io;
use std::result;

/// `SeekErrorKind` is a list of generic reasons why a seek may fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekErrorKind {
    /// The stream is not seekable at all.
    Unseekable,
    /// The stream can only be seeked forward.
    ForwardOnly,
    /// The position to seek to is out of range.
    OutOfRange,
}

impl SeekErrorKind {
    fn as_str(&self) -> &'static str {
        match *self {
            SeekErrorKind::Unseekable => "stream is not seekable",
            SeekErrorKind::ForwardOnly => "stream can only be seeked forward",
            SeekErrorKind::OutOfRange => "requested seek position is out-of-range for stream",
        }
    }
}

/// `Error` provides an enumeration of all possible errors reported by the BW64 engine.
///
/// Every error is fatal for the chunk or container operation that produced it. No variant
/// represents a recoverable or partially successful outcome.
#[derive(Debug)]
pub enum Error {
    /// An IO error occured while reading, writing, or seeking the stream.
    IoError(io::Error),
    /// A chunk or container identifier was not the one required at that position.
    StructuralMismatch(String),
    /// A declared size is inconsistent with the layout it describes, or with counts derived from
    /// the chunk body.
    SizeMismatch(String),
    /// A decoded or constructed field violates a documented invariant.
    InvariantViolation(String),
    /// The stream ended before the number of bytes promised by a header could be read.
    TruncatedStream(String),
    /// The stream could not be seeked.
    SeekError(SeekErrorKind),
    /// A default or user-defined limit was reached while reading the stream. Limits are used to
    /// prevent denial-of-service attacks from malicious streams.
    LimitError(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::IoError(ref err) => err.fmt(f),
            Error::StructuralMismatch(ref msg) => {
                write!(f, "structural mismatch: {}", msg)
            }
            Error::SizeMismatch(ref msg) => {
                write!(f, "size mismatch: {}", msg)
            }
            Error::InvariantViolation(ref msg) => {
                write!(f, "invalid field: {}", msg)
            }
            Error::TruncatedStream(ref msg) => {
                write!(f, "truncated stream: {}", msg)
            }
            Error::SeekError(ref kind) => {
                write!(f, "seek error: {}", kind.as_str())
            }
            Error::LimitError(constraint) => {
                write!(f, "limit reached: {}", constraint)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::IoError(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        // A short read always means a header promised more bytes than the stream holds.
        match err.kind() {
            io::ErrorKind::UnexpectedEof => Error::TruncatedStream(err.to_string()),
            _ => Error::IoError(err),
        }
    }
}

pub type Result<T> = result::Result<T, Error>;

/// Convenience function to create a structural mismatch error.
pub fn structural_error<T>(desc: impl Into<String>) -> Result<T> {
    Err(Error::StructuralMismatch(desc.into()))
}

/// Convenience function to create a size mismatch error.
pub fn size_error<T>(desc: impl Into<String>) -> Result<T> {
    Err(Error::SizeMismatch(desc.into()))
}

/// Convenience function to create a field invariant violation error.
pub fn invariant_error<T>(desc: impl Into<String>) -> Result<T> {
    Err(Error::InvariantViolation(desc.into()))
}

/// Convenience function to create a truncated stream error.
pub fn truncated_error<T>(desc: impl Into<String>) -> Result<T> {
    Err(Error::TruncatedStream(desc.into()))
}

/// Convenience function to create a seek error.
pub fn seek_error<T>(kind: SeekErrorKind) -> Result<T> {
    Err(Error::SeekError(kind))
}

/// Convenience function to create a limit error.
pub fn limit_error<T>(constraint: &'static str) -> Result<T> {
    Err(Error::LimitError(constraint))
}

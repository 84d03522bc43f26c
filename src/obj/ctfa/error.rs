// Archive errors
//
//  Copyright (C) 2014-2023 Ryan Specialty Group, LLC.
//
//  This file is part of ctfld.
//
//  This program is free software: you can redistribute it and/or modify
//  it under the terms of the GNU General Public License as published by
//  the Free Software Foundation, either version 3 of the License, or
//  (at your option) any later version.
//
//  This program is distributed in the hope that it will be useful,
//  but WITHOUT ANY WARRANTY; without even the implied warranty of
//  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
//  GNU General Public License for more details.
//
//  You should have received a copy of the GNU General Public License
//  along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Errors while reading or writing archives.

use crate::dict::DictError;
use std::fmt::Display;
use std::io::Error as IoError;

pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Error during archive processing.
#[derive(Debug)]
pub enum ArchiveError {
    /// Propagated I/O error.
    ///
    /// The destination of a failed write is left in an unspecified state
    ///   and must be discarded.
    Io(IoError),
    /// A member could not be encoded or decoded.
    Dict(DictError),
    /// There is no member of the requested name.
    ///
    /// This is an ordinary outcome of probing for an optional member;
    ///   see [`ArchiveError::is_not_found`].
    NotFound(String),
    /// Data is neither an archive nor a dictionary.
    Unrecognized,
    /// Archive framing is internally inconsistent.
    Corrupt(&'static str),
    /// A member name cannot be stored or is already taken.
    BadName(String),
}

impl ArchiveError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// OS error code of an underlying I/O failure,
    ///   if any.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Io(e) => e.raw_os_error(),
            _ => None,
        }
    }
}

impl Display for ArchiveError {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Io(inner) => inner.fmt(fmt),
            Self::Dict(inner) => inner.fmt(fmt),
            Self::NotFound(name) => write!(fmt, "no archive member `{name}`"),
            Self::Unrecognized => {
                write!(fmt, "not a type archive or dictionary")
            }
            Self::Corrupt(what) => write!(fmt, "corrupt archive: {what}"),
            Self::BadName(name) => {
                write!(fmt, "invalid or duplicate archive member name {name:?}")
            }
        }
    }
}

impl std::error::Error for ArchiveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Dict(e) => Some(e),
            _ => None,
        }
    }
}

impl From<IoError> for ArchiveError {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl From<DictError> for ArchiveError {
    fn from(err: DictError) -> Self {
        Self::Dict(err)
    }
}

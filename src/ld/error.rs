// Linker errors
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

//! Linker errors.

use super::ShareMode;
use crate::dict::DictError;
use crate::obj::ctfa::ArchiveError;
use std::fmt::Display;
use std::io::Error as IoError;

pub type LinkResult<T> = Result<T, LinkError>;

/// Error aborting a linker operation.
///
/// Problems with individual inputs,
///   types,
///   or variables are not errors;
///     see [`Skipped`](super::Skipped).
#[derive(Debug)]
pub enum LinkError {
    /// Inputs cannot be added after linking.
    Frozen,
    /// The requested [`ShareMode`] is not implemented.
    UnsupportedShareMode(ShareMode),
    /// A dictionary could not be created or encoded.
    Dict(DictError),
    /// The output archive could not be written.
    Archive(ArchiveError),
    /// Propagated I/O error.
    Io(IoError),
}

impl Display for LinkError {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Frozen => write!(fmt, "inputs cannot be added after linking"),
            Self::UnsupportedShareMode(mode) => {
                write!(fmt, "share mode `{mode}` is not supported")
            }
            Self::Dict(inner) => inner.fmt(fmt),
            Self::Archive(inner) => inner.fmt(fmt),
            Self::Io(inner) => inner.fmt(fmt),
        }
    }
}

impl std::error::Error for LinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Dict(e) => Some(e),
            Self::Archive(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DictError> for LinkError {
    fn from(err: DictError) -> Self {
        Self::Dict(err)
    }
}

impl From<ArchiveError> for LinkError {
    fn from(err: ArchiveError) -> Self {
        Self::Archive(err)
    }
}

impl From<IoError> for LinkError {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

// Dictionary errors
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

//! Errors while building, merging, or decoding dictionaries.

use super::{DataModel, TypeId};
use std::fmt::Display;
use std::io::Error as IoError;

/// Error during a dictionary operation.
///
/// [`Conflict`](DictError::Conflict) and
///   [`NotRepresentable`](DictError::NotRepresentable) are routine while
///   linking and are expected to be recovered from by the caller;
///     see [`crate::ld`].
#[derive(Debug)]
pub enum DictError {
    /// A type of the same name but incompatible shape already exists in
    ///   the destination.
    Conflict { name: String, kind: &'static str },
    /// The type cannot be expressed in the destination dictionary.
    NotRepresentable(TypeId),
    /// A type id does not identify any type.
    BadId(TypeId),
    /// The dictionary has no room for another type.
    Full,
    /// A named type was defined twice within one dictionary.
    DuplicateType { name: String },
    /// A variable already exists under this name with a different type.
    DuplicateVariable {
        name: String,
        existing: TypeId,
        rejected: TypeId,
    },
    /// A dictionary cannot import a parent of a different data model.
    ModelMismatch { child: DataModel, parent: DataModel },
    /// A dictionary already holding its own types cannot become a child.
    NotEmpty,
    /// Serialized data does not begin with the dictionary magic number.
    BadMagic,
    /// Serialized data is of an unsupported format version.
    BadVersion(u8),
    /// Serialized data ended prematurely.
    Truncated,
    /// Serialized data is internally inconsistent.
    Corrupt(&'static str),
    /// Compression or decompression failed.
    Compression(IoError),
}

impl DictError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn is_not_representable(&self) -> bool {
        matches!(self, Self::NotRepresentable(_) | Self::Full)
    }
}

impl Display for DictError {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        use DictError::*;

        match self {
            Conflict { name, kind } => {
                write!(fmt, "conflicting definition of {kind} `{name}`")
            }
            NotRepresentable(ty) => {
                write!(fmt, "type {ty} is not representable")
            }
            BadId(ty) => write!(fmt, "invalid type id {ty}"),
            Full => write!(fmt, "dictionary type table is full"),
            DuplicateType { name } => {
                write!(fmt, "duplicate definition of type `{name}`")
            }
            DuplicateVariable {
                name,
                existing,
                rejected,
            } => write!(
                fmt,
                "variable `{name}` already has type {existing} \
                   (rejected type {rejected})"
            ),
            ModelMismatch { child, parent } => write!(
                fmt,
                "data model {child} does not match parent data model {parent}"
            ),
            NotEmpty => write!(fmt, "dictionary already contains types"),
            BadMagic => write!(fmt, "not a type dictionary"),
            BadVersion(v) => write!(fmt, "unsupported dictionary version {v}"),
            Truncated => write!(fmt, "dictionary data is truncated"),
            Corrupt(what) => write!(fmt, "corrupt dictionary: {what}"),
            Compression(e) => write!(fmt, "compression failure: {e}"),
        }
    }
}

impl std::error::Error for DictError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Compression(e) => Some(e),
            _ => None,
        }
    }
}

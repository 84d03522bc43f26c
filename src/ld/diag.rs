// Linker diagnostics
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

//! Items skipped while linking.
//!
//! Nothing that goes wrong with an individual input,
//!   type,
//!   or variable fails a link.
//! Each such item is instead dropped and described by a [`Skipped`],
//!   so that a caller can learn exactly what was lost.

use crate::dict::TypeId;
use std::fmt::Display;

/// What was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkippedItem {
    /// An entire input.
    Input,
    /// An entire member of an input archive.
    Member,
    /// A type,
    ///   by its id within the member that defined it.
    Type(TypeId),
    /// A variable by name.
    Variable(String),
}

/// Why it was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The item conflicts with another even within a CU output.
    Conflict,
    /// The type cannot be represented in any output.
    NotRepresentable,
    /// The type of a variable was not linked.
    UnresolvedType,
    /// Any other failure.
    Error,
}

impl Display for SkipReason {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Conflict => write!(fmt, "conflict"),
            Self::NotRepresentable => write!(fmt, "not representable"),
            Self::UnresolvedType => write!(fmt, "unresolved type"),
            Self::Error => write!(fmt, "error"),
        }
    }
}

/// An item dropped by the linker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    /// Name of the input.
    pub input: String,
    /// Name of the archive member,
    ///   if not the default.
    pub member: Option<String>,
    pub item: SkippedItem,
    pub reason: SkipReason,
    /// Description of the underlying failure.
    pub message: String,
}

impl Display for Skipped {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "{}", self.input)?;

        if let Some(member) = &self.member {
            write!(fmt, "({member})")?;
        }

        match &self.item {
            SkippedItem::Input => write!(fmt, ": skipped input")?,
            SkippedItem::Member => write!(fmt, ": skipped member")?,
            SkippedItem::Type(id) => write!(fmt, ": skipped type {id}")?,
            SkippedItem::Variable(name) => {
                write!(fmt, ": skipped variable `{name}`")?
            }
        }

        write!(fmt, " ({}): {}", self.reason, self.message)
    }
}

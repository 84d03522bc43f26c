// Type dictionary archives
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

//! Type dictionary archives.
//!
//! An archive bundles any number of named [dictionaries](crate::dict::Dict)
//!   ("members") into a single file.
//! By convention,
//!   the member named [`DEFAULT_MEMBER`](crate::global::DEFAULT_MEMBER)
//!   holds the types shared by every compilation unit,
//!     and every other member is a child of it holding the types of one
//!     compilation unit that could not be shared.
//!
//! All integers are little-endian.
//!
//! ```text
//!   +-----------------------------+  0
//!   | header                      |
//!   |   magic          u64        |
//!   |   nfiles         u64        |
//!   |   model          u64        |
//!   |   members_offset u64        |
//!   |   names_offset   u64        |
//!   +-----------------------------+  40
//!   | index (nfiles entries,      |
//!   |        sorted by name)      |
//!   |   name_offset    u64        |
//!   |   member_offset  u64        |
//!   +-----------------------------+  members_offset
//!   | members                     |
//!   |   size           u64        |
//!   |   payload        [u8; size] |
//!   |   (padding to 8 bytes)      |
//!   +-----------------------------+  names_offset
//!   | names (NUL-terminated)      |
//!   +-----------------------------+
//! ```
//!
//! Member offsets are relative to `members_offset`
//!   and name offsets to `names_offset`.
//! The `model` field holds the [data model tag](crate::dict::DataModel::tag)
//!   of every member,
//!     and is meaningless if `nfiles` is `0`.
//!
//! A file holding a single dictionary without any archive framing is
//!   also accepted by the [reader](Archive),
//!     which presents it as an archive of one default member.
//!
//! ```
//! use ctfld::dict::{Dict, TypeKind};
//! use ctfld::obj::ctfa::{write_to, Archive};
//! use std::io::Cursor;
//!
//! let mut a = Dict::new();
//! a.define(Some("int"), TypeKind::Integer { bits: 32, signed: true })
//!     .unwrap();
//! let b = Dict::new();
//!
//! let mut out = Cursor::new(Vec::new());
//! write_to(&mut out, &[(".ctf", &a), ("b.c", &b)], 4096).unwrap();
//!
//! let bytes = out.into_inner();
//! let archive = Archive::open_buffer(&bytes).unwrap();
//!
//! assert_eq!(2, archive.len());
//! assert_eq!(1, archive.open(None).unwrap().type_count());
//! assert!(archive.open(Some("c.c")).unwrap_err().is_not_found());
//! ```

mod error;
mod header;
mod reader;
mod region;
mod writer;

pub use error::{ArchiveError, ArchiveResult};
pub use header::CTFA_MAGIC;
pub use reader::{Archive, ArchiveCursor, ArchiveMember, Members};
pub use region::{BufferedHeader, HeaderRegion, MappedHeader};
pub use writer::{write_file, write_to};

#[cfg(test)]
mod test;

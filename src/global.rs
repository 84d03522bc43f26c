// Global constants
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

//! System-wide static configuration.
//!
//! This module provides a system-wide configuration.
//! Subsystems should reference these values rather than defining their own
//!   and risk incompatibilities or maintenance issues as requirements
//!   change.
//!
//! By convention,
//!   import this entire module rather than individual members and reference
//!   them as `global::foo` to emphasize their nature and risk.

/// A size capable of representing the index of every type within a single
///   dictionary.
///
/// The most significant bit of a type id is reserved to distinguish
///   child types from parent types,
///     so only [`MAX_TYPE_INDEX`] indexes are usable.
pub type TypeIndexSize = u32;

/// Largest type index representable in a dictionary.
pub const MAX_TYPE_INDEX: TypeIndexSize = 0x7fff_ffff;

/// Name of the default member of an archive.
///
/// This is the member holding the shared dictionary that every
///   per-CU dictionary in the same archive names as its parent.
pub const DEFAULT_MEMBER: &str = ".ctf";

/// Parent name recorded in every per-CU output dictionary at creation.
///
/// Readers use this name to locate the parent member within an archive.
/// If the default member is renamed at write time,
///   the recorded parent name is renamed along with it.
pub const DEFAULT_PARENT_NAME: &str = DEFAULT_MEMBER;

/// Prefix stripped from archive member names to derive a CU name.
pub const MEMBER_CU_PREFIX: &str = ".ctf.";

/// Serialized dictionaries larger than this many bytes are compressed
///   unless the caller provides another threshold.
pub const DEFAULT_COMPRESS_THRESHOLD: usize = 4096;

/// Compression level passed to `zstd` for large dictionaries.
pub const COMPRESS_LEVEL: i32 = 3;

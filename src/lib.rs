// Type information linker library
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

//! Linking and archiving of compact type information.
//!
//! Compilers emit a [dictionary](dict) of the C types used by each
//!   compilation unit.
//! The [linker](ld) merges those dictionaries,
//!   deduplicating types that agree and setting aside those that conflict,
//!   and the result is stored as an [archive](obj::ctfa).
//!
//!   - [`dict`] holds types and variables and knows how to copy a type
//!       between dictionaries;
//!   - [`mapping`] remembers what has already been copied;
//!   - [`ld`] drives a link; and
//!   - [`obj::ctfa`] reads and writes archives.

// We build docs for private items.
#![allow(rustdoc::private_intra_doc_links)]

pub mod global;

#[macro_use]
extern crate static_assertions;

pub mod dict;
pub mod fs;
pub mod ld;
pub mod mapping;
pub mod obj;

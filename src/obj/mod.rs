// Object files
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

//! Object file construction and processing.
//!
//! Type information is stored alongside the compiled code of an
//!   _[object file][]_.
//! A single compilation unit carries a single [dictionary](crate::dict),
//!   but the [linker](super::ld) may produce many when the types of
//!   several compilation units cannot be merged without loss;
//!     those are bundled into a [`ctfa`] archive.
//!
//! [object file]: https://en.wikipedia.org/wiki/Object_file

pub mod ctfa;

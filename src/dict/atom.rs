// Dictionary atom tables
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

//! Atom (string) tables.
//!
//! Every name within a dictionary is an [`Atom`]:
//!   the offset of a NUL-terminated string within that dictionary's
//!   [`AtomTable`].
//! Offset `0` is always the empty string,
//!   which is used for anonymous types.
//!
//! Atoms are deduplicated,
//!   so two atoms of the same table compare equal if and only if their
//!   strings do.
//! Atoms of _different_ tables must never be compared;
//!   resolve them to strings first.
//!
//! External Strings
//! ================
//! A linker may know that a string is already present at some offset of
//!   an external string table
//!     (for example,
//!        the string table of the object file that will eventually
//!        contain the dictionary).
//! Such strings are recorded using [`AtomTable::add_external`] so that
//!   consumers can correlate the two tables.

use super::DictError;
use fxhash::FxHashMap;
use memchr::{memchr, memchr_iter};

/// Offset of a string within an [`AtomTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Atom(u32);

impl Atom {
    /// The empty string.
    pub const EMPTY: Atom = Atom(0);

    pub fn offset(self) -> u32 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub(super) fn from_offset(offset: u32) -> Self {
        Self(offset)
    }
}

/// Deduplicated table of NUL-terminated strings.
#[derive(Debug, Clone)]
pub struct AtomTable {
    buf: Vec<u8>,
    index: FxHashMap<Box<str>, Atom>,
    external: FxHashMap<Atom, u32>,
}

impl Default for AtomTable {
    fn default() -> Self {
        Self {
            buf: vec![0],
            index: Default::default(),
            external: Default::default(),
        }
    }
}

impl AtomTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `value` or return its existing [`Atom`].
    ///
    /// Names cannot contain NUL;
    ///   `value` is truncated at its first NUL byte,
    ///     if any.
    pub fn intern(&mut self, value: &str) -> Atom {
        let value = match memchr(0, value.as_bytes()) {
            Some(nul) => &value[..nul],
            None => value,
        };

        if value.is_empty() {
            return Atom::EMPTY;
        }

        if let Some(atom) = self.index.get(value) {
            return *atom;
        }

        let atom = Atom(self.buf.len() as u32);
        self.buf.extend_from_slice(value.as_bytes());
        self.buf.push(0);
        self.index.insert(value.into(), atom);

        atom
    }

    /// Retrieve the existing [`Atom`] for `value` without interning it.
    pub fn get(&self, value: &str) -> Option<Atom> {
        if value.is_empty() {
            return Some(Atom::EMPTY);
        }

        self.index.get(value).copied()
    }

    /// Look up the string of an atom.
    ///
    /// Yields [`None`] if `atom` is not the offset of a string in this
    ///   table.
    pub fn resolve(&self, atom: Atom) -> Option<&str> {
        let start = atom.0 as usize;

        if atom.is_empty() {
            return Some("");
        }

        // Atoms must point at the start of a string,
        //   not into the middle of one.
        if start >= self.buf.len() || self.buf[start - 1] != 0 {
            return None;
        }

        let len = memchr(0, &self.buf[start..])?;

        // The table only ever contains UTF-8 (see `from_bytes`).
        std::str::from_utf8(&self.buf[start..start + len]).ok()
    }

    /// Number of non-empty strings in this table.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Intern `value` and note that it is also present at `offset` of an
    ///   external string table.
    ///
    /// A later call for the same string replaces the offset.
    pub fn add_external(&mut self, value: &str, offset: u32) -> Atom {
        let atom = self.intern(value);

        if !atom.is_empty() {
            self.external.insert(atom, offset);
        }

        atom
    }

    /// Offset of `value` within the external string table,
    ///   if known.
    pub fn external_offset(&self, value: &str) -> Option<u32> {
        self.get(value).and_then(|atom| self.external.get(&atom).copied())
    }

    /// External string references ordered by atom.
    pub fn externals(&self) -> Vec<(Atom, u32)> {
        let mut refs: Vec<_> =
            self.external.iter().map(|(a, off)| (*a, *off)).collect();

        refs.sort_unstable();
        refs
    }

    pub(super) fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Reconstruct a table from its serialized form.
    pub(super) fn from_bytes(buf: Vec<u8>) -> Result<Self, DictError> {
        if buf.first() != Some(&0) || buf.last() != Some(&0) {
            return Err(DictError::Corrupt("atom table is not NUL-delimited"));
        }

        let mut index = FxHashMap::default();
        let mut start = 1;

        for nul in memchr_iter(0, &buf[1..]).map(|i| i + 1) {
            let value = std::str::from_utf8(&buf[start..nul])
                .map_err(|_| DictError::Corrupt("atom is not UTF-8"))?;

            if !value.is_empty() {
                index
                    .entry(value.into())
                    .or_insert(Atom(start as u32));
            }

            start = nul + 1;
        }

        Ok(Self {
            buf,
            index,
            external: Default::default(),
        })
    }

    pub(super) fn set_external(&mut self, atom: Atom, offset: u32) {
        self.external.insert(atom, offset);
    }
}

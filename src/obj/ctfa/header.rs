// Archive header layout
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

//! Archive header and index layout.
//!
//! _This is a private module.
//!  See [`super`] for available exports._

use super::{ArchiveError, ArchiveResult};

/// Magic number identifying an archive.
pub const CTFA_MAGIC: u64 = 0x8b47f2a4d7623eeb;

/// Number of `u64` fields in the header.
const HEADER_FIELDS: usize = 5;

/// Length of the fixed portion of the header.
pub const HEADER_LEN: usize = 40;

/// Length of a single index entry.
pub const MODENT_LEN: usize = 16;

assert_eq_size!([u64; HEADER_FIELDS], [u8; HEADER_LEN]);
assert_eq_size!([u64; 2], [u8; MODENT_LEN]);

/// Length of the header region of an archive of `nfiles` members,
///   including its index.
pub fn region_len(nfiles: usize) -> usize {
    HEADER_LEN + nfiles * MODENT_LEN
}

/// Round `offset` up to the next multiple of 8.
pub fn align8(offset: u64) -> u64 {
    (offset + 7) & !7
}

fn get_u64(buf: &[u8], at: usize) -> Option<u64> {
    let bytes = buf.get(at..at.checked_add(8)?)?;
    <[u8; 8]>::try_from(bytes).ok().map(u64::from_le_bytes)
}

fn put_u64(buf: &mut [u8], at: usize, value: u64) {
    buf[at..at + 8].copy_from_slice(&value.to_le_bytes());
}

/// Whether `buf` begins with the archive magic number.
pub fn has_magic(buf: &[u8]) -> bool {
    get_u64(buf, 0) == Some(CTFA_MAGIC)
}

/// Fixed archive header.
///
/// The magic number is implied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub nfiles: u64,
    pub model: u64,
    pub members_offset: u64,
    pub names_offset: u64,
}

impl Header {
    /// Header for `nfiles` members,
    ///   whose name table offset is not yet known.
    pub fn new(nfiles: usize, model: u64) -> Self {
        Self {
            nfiles: nfiles as u64,
            model,
            members_offset: region_len(nfiles) as u64,
            names_offset: 0,
        }
    }

    /// Write the header into the start of `buf`,
    ///   which must be at least [`HEADER_LEN`] bytes.
    pub fn write(&self, buf: &mut [u8]) {
        put_u64(buf, 0, CTFA_MAGIC);
        put_u64(buf, 8, self.nfiles);
        put_u64(buf, 16, self.model);
        put_u64(buf, 24, self.members_offset);
        put_u64(buf, 32, self.names_offset);
    }

    /// Read and validate the header of an archive occupying all of `buf`.
    pub fn read(buf: &[u8]) -> ArchiveResult<Self> {
        if !has_magic(buf) {
            return Err(ArchiveError::Unrecognized);
        }

        let field = |at| get_u64(buf, at).ok_or(ArchiveError::Unrecognized);

        let header = Self {
            nfiles: field(8)?,
            model: field(16)?,
            members_offset: field(24)?,
            names_offset: field(32)?,
        };

        let index_end = usize::try_from(header.nfiles)
            .ok()
            .and_then(|n| n.checked_mul(MODENT_LEN))
            .and_then(|n| n.checked_add(HEADER_LEN));

        match index_end {
            Some(end) if end <= buf.len() => (),
            _ => return Err(ArchiveError::Corrupt("index exceeds archive")),
        }

        if header.members_offset > buf.len() as u64
            || header.names_offset > buf.len() as u64
        {
            return Err(ArchiveError::Corrupt("offset exceeds archive"));
        }

        Ok(header)
    }
}

/// Index entry locating the name and data of a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModEnt {
    /// Offset of the member's name relative to the name table.
    pub name_offset: u64,
    /// Offset of the member relative to the members region.
    pub member_offset: u64,
}

impl ModEnt {
    fn at(index: usize) -> usize {
        HEADER_LEN + index * MODENT_LEN
    }

    /// Write this entry into slot `index` of the header region `buf`.
    pub fn write(&self, buf: &mut [u8], index: usize) {
        let at = Self::at(index);

        put_u64(buf, at, self.name_offset);
        put_u64(buf, at + 8, self.member_offset);
    }

    /// Read slot `index` of the header region `buf`.
    pub fn read(buf: &[u8], index: usize) -> Option<Self> {
        let at = Self::at(index);

        Some(Self {
            name_offset: get_u64(buf, at)?,
            member_offset: get_u64(buf, at + 8)?,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn header_write_read() {
        let mut header = Header::new(3, 2);
        header.names_offset = 200;

        let mut buf = vec![0; 256];
        header.write(&mut buf);

        assert_eq!(88, header.members_offset);
        assert!(has_magic(&buf));
        assert_eq!(Ok(header), Header::read(&buf).map_err(|e| e.to_string()));
    }

    #[test]
    fn header_rejects_oversized_index() {
        let mut buf = vec![0; 64];
        Header::new(1000, 2).write(&mut buf);

        assert!(matches!(
            Header::read(&buf),
            Err(ArchiveError::Corrupt(_))
        ));
    }

    #[test]
    fn header_rejects_bad_magic() {
        assert!(matches!(
            Header::read(&[0; HEADER_LEN]),
            Err(ArchiveError::Unrecognized)
        ));
        assert!(!has_magic(&[0xeb, 0x3e]));
    }

    #[test]
    fn modent_slots() {
        let mut buf = vec![0; region_len(2)];
        let a = ModEnt {
            name_offset: 1,
            member_offset: 2,
        };
        let b = ModEnt {
            name_offset: 3,
            member_offset: 4,
        };

        a.write(&mut buf, 0);
        b.write(&mut buf, 1);

        assert_eq!(Some(a), ModEnt::read(&buf, 0));
        assert_eq!(Some(b), ModEnt::read(&buf, 1));
        assert_eq!(None, ModEnt::read(&buf, 2));
    }

    #[test]
    fn align() {
        assert_eq!(0, align8(0));
        assert_eq!(8, align8(1));
        assert_eq!(8, align8(8));
        assert_eq!(16, align8(9));
    }
}

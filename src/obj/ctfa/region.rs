// Archive header regions
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

//! Header region backends.
//!
//! The header of an archive is the first thing reserved by the
//!   [writer](super::writer) but the last thing persisted,
//!     since it cannot be completed until the name table has been
//!     placed.
//! A [`HeaderRegion`] provides write access to that reserved prefix of the
//!   output:
//!
//!   - [`MappedHeader`] maps the prefix of a file into memory; and
//!   - [`BufferedHeader`] holds the prefix in memory and writes it back
//!       over the reserved bytes when persisted.
//!
//! The two are interchangeable;
//!   the output is identical either way.

use memmap2::{MmapMut, MmapOptions};
use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};

/// Writable reserved prefix of an archive.
pub trait HeaderRegion {
    /// Bytes of the region.
    fn bytes_mut(&mut self) -> &mut [u8];

    /// Durably write the region to the start of `out`,
    ///   leaving the stream position of `out` unchanged.
    ///
    /// Everything else must have already been written to `out`.
    fn persist<W: Write + Seek>(self, out: &mut W) -> io::Result<()>;
}

/// Header region mapped directly into the prefix of a file.
#[derive(Debug)]
pub struct MappedHeader {
    map: MmapMut,
}

impl MappedHeader {
    /// Resize `file` to `len` bytes and map them.
    pub fn map(file: &File, len: usize) -> io::Result<Self> {
        file.set_len(len as u64)?;

        // SAFETY: The file was just sized to cover the mapping,
        //   and the archive writer holds the only handle through which it
        //   is written;
        //     the caller must not truncate it while the region is alive.
        let map = unsafe { MmapOptions::new().len(len).map_mut(file)? };

        Ok(Self { map })
    }
}

impl HeaderRegion for MappedHeader {
    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.map
    }

    fn persist<W: Write + Seek>(self, _out: &mut W) -> io::Result<()> {
        self.map.flush()
    }
}

/// Header region held in memory.
#[derive(Debug)]
pub struct BufferedHeader {
    buf: Vec<u8>,
}

impl BufferedHeader {
    /// Reserve the first `len` bytes of `out`,
    ///   leaving its stream position just past them.
    pub fn reserve<W: Write + Seek>(out: &mut W, len: usize) -> io::Result<Self> {
        let buf = vec![0; len];

        out.seek(SeekFrom::Start(0))?;
        out.write_all(&buf)?;

        Ok(Self { buf })
    }
}

impl HeaderRegion for BufferedHeader {
    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    fn persist<W: Write + Seek>(self, out: &mut W) -> io::Result<()> {
        let end = out.stream_position()?;

        out.seek(SeekFrom::Start(0))?;
        out.write_all(&self.buf)?;
        out.seek(SeekFrom::Start(end))?;
        out.flush()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::{Cursor, Read};

    #[test]
    fn buffered_persists_over_reservation() {
        let mut out = Cursor::new(Vec::new());
        let mut sut = BufferedHeader::reserve(&mut out, 4).unwrap();

        out.write_all(b"body").unwrap();
        sut.bytes_mut().copy_from_slice(b"head");
        sut.persist(&mut out).unwrap();

        assert_eq!(8, out.position());
        assert_eq!(b"headbody", out.get_ref().as_slice());
    }

    #[test]
    fn mapped_persists_over_reservation() {
        let mut file = tempfile::tempfile().unwrap();
        let mut sut = MappedHeader::map(&file, 4).unwrap();

        file.seek(SeekFrom::Start(4)).unwrap();
        file.write_all(b"body").unwrap();
        sut.bytes_mut().copy_from_slice(b"head");
        sut.persist(&mut file).unwrap();

        let mut got = Vec::new();
        file.seek(SeekFrom::Start(0)).unwrap();
        file.read_to_end(&mut got).unwrap();

        assert_eq!(b"headbody", got.as_slice());
    }
}

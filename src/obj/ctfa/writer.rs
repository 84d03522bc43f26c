// Archive writer
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

//! Archive writer.
//!
//! _This is a private module.
//!  See [`super`] for available exports._

use super::header::{align8, region_len, Header, ModEnt};
use super::region::{BufferedHeader, HeaderRegion, MappedHeader};
use super::{ArchiveError, ArchiveResult};
use crate::dict::Dict;
use fxhash::FxHashSet;
use memchr::memchr;
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};

const PADDING: [u8; 8] = [0; 8];

/// Write `members` as an archive to `file`,
///   replacing its contents.
///
/// The header region is mapped into memory if possible and written
///   otherwise;
///     the result is the same either way.
/// Each member whose encoding exceeds `threshold` bytes is compressed.
///
/// On failure,
///   the contents of `file` are unspecified and it should be discarded.
pub fn write_file(
    file: &mut File,
    members: &[(&str, &Dict)],
    threshold: usize,
) -> ArchiveResult<()> {
    check_names(members)?;

    match MappedHeader::map(file, region_len(members.len())) {
        Ok(region) => {
            write_with(&mut BufWriter::new(file), region, members, threshold)
        }
        Err(e) => {
            tracing::debug!(
                error = %e,
                "archive header cannot be mapped; writing it instead",
            );

            file.set_len(0)?;
            write_to(file, members, threshold)
        }
    }
}

/// Write `members` as an archive to the start of `out`.
///
/// See [`write_file`].
pub fn write_to<W: Write + Seek>(
    out: &mut W,
    members: &[(&str, &Dict)],
    threshold: usize,
) -> ArchiveResult<()> {
    check_names(members)?;

    let region = BufferedHeader::reserve(out, region_len(members.len()))?;
    write_with(out, region, members, threshold)
}

/// Names are stored NUL-terminated and so cannot contain NUL;
///   readers search the index by name and so each must be unique.
fn check_names(members: &[(&str, &Dict)]) -> ArchiveResult<()> {
    let mut seen = FxHashSet::default();

    match members.iter().find(|(name, _)| {
        memchr(0, name.as_bytes()).is_some() || !seen.insert(*name)
    }) {
        Some((name, _)) => Err(ArchiveError::BadName((*name).into())),
        None => Ok(()),
    }
}

fn write_with<W: Write + Seek, R: HeaderRegion>(
    out: &mut W,
    mut region: R,
    members: &[(&str, &Dict)],
    threshold: usize,
) -> ArchiveResult<()> {
    let model = members.first().map_or(0, |(_, dict)| dict.model().tag());
    let mut header = Header::new(members.len(), model);

    let mut pos = header.members_offset;
    out.seek(SeekFrom::Start(pos))?;

    let mut index = Vec::with_capacity(members.len());
    let mut name_offset = 0;

    for (name, dict) in members {
        let payload = dict.to_bytes(threshold)?;
        let end = pos + 8 + payload.len() as u64;
        let pad = (align8(end) - end) as usize;

        out.write_all(&(payload.len() as u64).to_le_bytes())?;
        out.write_all(&payload)?;
        out.write_all(&PADDING[..pad])?;

        index.push((
            *name,
            ModEnt {
                name_offset,
                member_offset: pos - header.members_offset,
            },
        ));

        name_offset += name.len() as u64 + 1;
        pos = align8(end);
    }

    // Readers binary search the index by name.
    index.sort_by(|(a, _), (b, _)| a.as_bytes().cmp(b.as_bytes()));

    for (i, (_, ent)) in index.iter().enumerate() {
        ent.write(region.bytes_mut(), i);
    }

    header.names_offset = pos;

    for (name, _) in members {
        out.write_all(name.as_bytes())?;
        out.write_all(&[0])?;
    }

    header.write(region.bytes_mut());

    tracing::trace!(
        nfiles = header.nfiles,
        names_offset = header.names_offset,
        "persisting archive header",
    );

    out.flush()?;
    region.persist(out)?;

    Ok(())
}

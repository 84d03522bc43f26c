// Archive reader
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

//! Archive reader.
//!
//! _This is a private module.
//!  See [`super`] for available exports._

use super::header::{has_magic, Header, ModEnt, HEADER_LEN};
use super::{ArchiveError, ArchiveResult};
use crate::dict::{Chain, DataModel, Dict};
use crate::fs::{File, MappedFile};
use crate::global;
use fxhash::FxHashMap;
use memchr::memchr;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::ops::{ControlFlow, Deref};
use std::path::Path;
use std::rc::Rc;

/// Bytes of an archive.
#[derive(Debug)]
enum Backing<'a> {
    /// Caller-owned buffer.
    Borrowed(&'a [u8]),
    /// File owned by the archive.
    File(MappedFile),
}

impl<'a> Backing<'a> {
    fn bytes(&self) -> &[u8] {
        match self {
            Self::Borrowed(bytes) => bytes,
            Self::File(file) => file,
        }
    }
}

#[derive(Debug)]
enum Repr<'a> {
    /// A true archive.
    Multi { backing: Backing<'a>, header: Header },
    /// A plain dictionary presented as an archive of one default member.
    Single(Rc<Dict>),
}

/// Read-only handle to an archive.
///
/// Members are decoded on demand,
///   each time they are opened.
/// Opened members are reference-counted and so may be retained
///   independently of one another,
///     but the [`ArchiveMember`] wrapper borrows the archive so that
///     child members can locate their parent.
///
/// See the [module-level documentation](super) for more information.
#[derive(Debug)]
pub struct Archive<'a> {
    repr: Repr<'a>,
    /// Parent dictionaries by member name,
    ///   or [`None`] if there is no such member.
    parents: RefCell<FxHashMap<Box<str>, Option<Rc<Dict>>>>,
}

impl<'a> Archive<'a> {
    fn with_repr(repr: Repr<'a>) -> Self {
        Self {
            repr,
            parents: Default::default(),
        }
    }

    /// View `bytes` as an archive without copying it,
    ///   or decode it as a single dictionary if it is not one.
    pub fn open_buffer(bytes: &'a [u8]) -> ArchiveResult<Self> {
        Self::open_backing(Backing::Borrowed(bytes))
    }

    /// Present `dict` as an archive holding only a default member.
    pub fn from_dict(dict: Dict) -> Self {
        Self::with_repr(Repr::Single(Rc::new(dict)))
    }

    fn open_backing(backing: Backing<'a>) -> ArchiveResult<Self> {
        let bytes = backing.bytes();

        if bytes.len() >= HEADER_LEN && has_magic(bytes) {
            let header = Header::read(bytes)?;
            return Ok(Self::with_repr(Repr::Multi { backing, header }));
        }

        match Dict::from_bytes(bytes) {
            Ok(dict) => Ok(Self::from_dict(dict)),
            Err(e) => {
                tracing::trace!(error = %e, "not a dictionary");
                Err(ArchiveError::Unrecognized)
            }
        }
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        match &self.repr {
            Repr::Multi { header, .. } => header.nfiles as usize,
            Repr::Single(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this is a true archive rather than a single dictionary.
    pub fn is_archive(&self) -> bool {
        matches!(self.repr, Repr::Multi { .. })
    }

    /// Data model of every member,
    ///   if known.
    pub fn model(&self) -> Option<DataModel> {
        match &self.repr {
            Repr::Multi { header, .. } if header.nfiles > 0 => {
                DataModel::from_tag(header.model)
            }
            Repr::Multi { .. } => None,
            Repr::Single(dict) => Some(dict.model()),
        }
    }

    /// Open the member `name`,
    ///   or the default member if [`None`].
    ///
    /// If there is no such member,
    ///   [`ArchiveError::NotFound`] is returned;
    ///     this should not be considered a failure if the member is
    ///     optional.
    pub fn open(&self, name: Option<&str>) -> ArchiveResult<ArchiveMember<'_>> {
        let name = name.unwrap_or(global::DEFAULT_MEMBER);

        match &self.repr {
            Repr::Single(dict) if name == global::DEFAULT_MEMBER => {
                Ok(self.single_member(dict))
            }
            Repr::Single(_) => Err(ArchiveError::NotFound(name.into())),
            Repr::Multi { .. } => match self.find(name)? {
                Some(i) => self.load(i),
                None => Err(ArchiveError::NotFound(name.into())),
            },
        }
    }

    /// Invoke `visit` with each member in index order until it breaks,
    ///   returning the value it broke with,
    ///     if any.
    pub fn iter<B>(
        &self,
        mut visit: impl FnMut(ArchiveMember<'_>) -> ControlFlow<B>,
    ) -> ArchiveResult<Option<B>> {
        let mut cursor = ArchiveCursor::default();

        while let Some(member) = self.next(&mut cursor, false)? {
            if let ControlFlow::Break(value) = visit(member) {
                return Ok(Some(value));
            }
        }

        Ok(None)
    }

    /// Open the member following `cursor`,
    ///   or [`None`] if there are no more.
    ///
    /// If `skip_default` is set,
    ///   the default member is skipped;
    ///     a single dictionary therefore yields nothing at all.
    pub fn next(
        &self,
        cursor: &mut ArchiveCursor,
        skip_default: bool,
    ) -> ArchiveResult<Option<ArchiveMember<'_>>> {
        match &self.repr {
            Repr::Single(_) if skip_default => Ok(None),
            Repr::Single(_) if cursor.next > 0 => Ok(None),
            Repr::Single(dict) => {
                cursor.next = 1;
                Ok(Some(self.single_member(dict)))
            }

            Repr::Multi { .. } => {
                while cursor.next < self.len() {
                    let i = cursor.next;
                    cursor.next += 1;

                    if skip_default && self.name(i)? == global::DEFAULT_MEMBER {
                        continue;
                    }

                    return self.load(i).map(Some);
                }

                Ok(None)
            }
        }
    }

    /// Iterator over members in index order.
    ///
    /// See [`Archive::next`].
    pub fn members(&self, skip_default: bool) -> Members<'_> {
        Members {
            archive: self,
            cursor: ArchiveCursor::default(),
            skip_default,
        }
    }

    /// Member names in index order.
    pub fn names(&self) -> ArchiveResult<Vec<&str>> {
        match &self.repr {
            Repr::Single(_) => Ok(vec![global::DEFAULT_MEMBER]),
            Repr::Multi { .. } => (0..self.len()).map(|i| self.name(i)).collect(),
        }
    }

    fn single_member(&self, dict: &Rc<Dict>) -> ArchiveMember<'_> {
        ArchiveMember {
            name: global::DEFAULT_MEMBER,
            dict: Rc::clone(dict),
            parent: None,
            archive: self,
        }
    }

    /// Bytes and header of a true archive.
    fn multi(&self) -> ArchiveResult<(&[u8], &Header)> {
        match &self.repr {
            Repr::Multi { backing, header } => Ok((backing.bytes(), header)),
            Repr::Single(_) => Err(ArchiveError::Corrupt("not an archive")),
        }
    }

    fn entry(&self, i: usize) -> ArchiveResult<ModEnt> {
        let (bytes, _) = self.multi()?;
        ModEnt::read(bytes, i).ok_or(ArchiveError::Corrupt("truncated index"))
    }

    /// Name of the member at index slot `i`.
    fn name(&self, i: usize) -> ArchiveResult<&str> {
        let (bytes, header) = self.multi()?;
        let ent = self.entry(i)?;

        let start = header
            .names_offset
            .checked_add(ent.name_offset)
            .and_then(|start| usize::try_from(start).ok())
            .filter(|start| *start < bytes.len())
            .ok_or(ArchiveError::Corrupt("name offset exceeds archive"))?;

        let tail = &bytes[start..];
        let len = memchr(0, tail)
            .ok_or(ArchiveError::Corrupt("unterminated member name"))?;

        std::str::from_utf8(&tail[..len])
            .map_err(|_| ArchiveError::Corrupt("member name is not UTF-8"))
    }

    /// Binary search the sorted index for `name`.
    fn find(&self, name: &str) -> ArchiveResult<Option<usize>> {
        let (mut lo, mut hi) = (0, self.len());

        while lo < hi {
            let mid = lo + (hi - lo) / 2;

            match self.name(mid)?.as_bytes().cmp(name.as_bytes()) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return Ok(Some(mid)),
            }
        }

        Ok(None)
    }

    /// Decode the dictionary at index slot `i`.
    fn decode(&self, i: usize) -> ArchiveResult<Dict> {
        let (bytes, header) = self.multi()?;
        let ent = self.entry(i)?;

        let start = header
            .members_offset
            .checked_add(ent.member_offset)
            .and_then(|start| usize::try_from(start).ok())
            .ok_or(ArchiveError::Corrupt("member offset exceeds archive"))?;

        let size = bytes
            .get(start..start.saturating_add(8))
            .and_then(|b| <[u8; 8]>::try_from(b).ok())
            .map(u64::from_le_bytes)
            .ok_or(ArchiveError::Corrupt("member offset exceeds archive"))?;

        let payload = usize::try_from(size)
            .ok()
            .and_then(|size| bytes.get(start + 8..(start + 8).checked_add(size)?))
            .ok_or(ArchiveError::Corrupt("member size exceeds archive"))?;

        let mut dict = Dict::from_bytes(payload)?;

        if let Some(model) = self.model() {
            dict.set_model(model);
        }

        Ok(dict)
    }

    fn load(&self, i: usize) -> ArchiveResult<ArchiveMember<'_>> {
        let dict = self.decode(i)?;
        let parent = self.parent_of(&dict);

        Ok(ArchiveMember {
            name: self.name(i)?,
            dict: Rc::new(dict),
            parent,
            archive: self,
        })
    }

    /// Parent of `dict` within this archive,
    ///   if it is a child and its parent is present.
    fn parent_of(&self, dict: &Dict) -> Option<Rc<Dict>> {
        if !dict.is_child() {
            return None;
        }

        let name = dict.parent_name().unwrap_or(global::DEFAULT_PARENT_NAME);

        if let Some(cached) = self.parents.borrow().get(name) {
            return cached.clone();
        }

        let parent = match &self.repr {
            Repr::Multi { .. } => self
                .find(name)
                .and_then(|found| {
                    found
                        .map(|i| self.decode(i))
                        .transpose()
                })
                .unwrap_or_else(|e| {
                    tracing::debug!(
                        parent = name,
                        error = %e,
                        "unable to open parent member",
                    );
                    None
                }),
            Repr::Single(_) => None,
        };

        let parent = parent.map(Rc::new);

        self.parents
            .borrow_mut()
            .insert(name.into(), parent.clone());

        parent
    }
}

impl Archive<'static> {
    /// Open an archive or dictionary file.
    ///
    /// The file is mapped copy-on-write where possible,
    ///   and read into memory otherwise;
    ///     see [`MappedFile`].
    pub fn open_file<P: AsRef<Path>>(path: P) -> ArchiveResult<Self> {
        Self::from_file(MappedFile::open(path)?)
    }

    /// Open an archive or dictionary from an already-opened file.
    pub fn from_file(file: MappedFile) -> ArchiveResult<Self> {
        Self::open_backing(Backing::File(file))
    }
}

/// Position of an [`Archive::next`] iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveCursor {
    next: usize,
}

/// Iterator produced by [`Archive::members`].
#[derive(Debug)]
pub struct Members<'ar> {
    archive: &'ar Archive<'ar>,
    cursor: ArchiveCursor,
    skip_default: bool,
}

impl<'ar> Iterator for Members<'ar> {
    type Item = ArchiveResult<ArchiveMember<'ar>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.archive
            .next(&mut self.cursor, self.skip_default)
            .transpose()
    }
}

/// A dictionary opened from an [`Archive`].
///
/// This dereferences to the member's [`Dict`].
#[derive(Debug, Clone)]
pub struct ArchiveMember<'ar> {
    name: &'ar str,
    dict: Rc<Dict>,
    parent: Option<Rc<Dict>>,
    archive: &'ar Archive<'ar>,
}

impl<'ar> ArchiveMember<'ar> {
    pub fn name(&self) -> &'ar str {
        self.name
    }

    /// The member's dictionary,
    ///   which may outlive this member.
    pub fn dict(&self) -> &Rc<Dict> {
        &self.dict
    }

    /// Parent of this member,
    ///   if it is a child whose parent is present in the archive.
    pub fn parent(&self) -> Option<&Dict> {
        self.parent.as_deref()
    }

    /// This member paired with its parent.
    pub fn chain(&self) -> Chain<'_> {
        Chain::new(&self.dict, self.parent())
    }

    /// Use `parent` as the parent of this member.
    pub fn with_parent(mut self, parent: Rc<Dict>) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn archive(&self) -> &'ar Archive<'ar> {
        self.archive
    }
}

impl<'ar> Deref for ArchiveMember<'ar> {
    type Target = Dict;

    fn deref(&self) -> &Dict {
        &self.dict
    }
}

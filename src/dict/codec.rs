// Dictionary binary encoding
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

//! Binary encoding of dictionaries.
//!
//! All integers are little-endian.
//! An encoded dictionary begins with a fixed header:
//!
//! ```text
//!   magic:u16  version:u8  flags:u8  reserved:u32
//! ```
//!
//! If [`FLAG_COMPRESSED`] is set,
//!   the header is followed by the length of the uncompressed body
//!   (`u64`) and the body compressed with zstd;
//!     otherwise the body follows directly.
//! The body holds,
//!   in order:
//!
//!   1. the CU name and parent name,
//!        each as a `u32` length (`u32::MAX` if absent) followed by its
//!        bytes;
//!   2. the atom table as a `u32` length followed by its bytes;
//!   3. the type table as a `u32` count followed by each type
//!        (name atom, kind code, and kind-specific fields);
//!   4. the variables as a `u32` count of (name atom, type id) pairs;
//!        and
//!   5. the external string references as a `u32` count of
//!        (atom, offset) pairs.
//!
//! The data model is not encoded;
//!   it is recorded by the containing [archive](crate::obj::ctfa).

use super::{
    Atom, AtomTable, Dict, DictError, DictResult, Enumerator, Member,
    Namespace, TypeDef, TypeId, TypeKind,
};
use crate::global;

/// Magic number identifying an encoded dictionary.
pub const DICT_MAGIC: u16 = 0xdff2;

/// Current encoding version.
pub const DICT_VERSION: u8 = 4;

/// Body is zstd-compressed.
pub const FLAG_COMPRESSED: u8 = 0x01;

/// Dictionary is the child of some parent.
pub const FLAG_CHILD: u8 = 0x02;

const HEADER_LEN: usize = 8;
const ABSENT: u32 = u32::MAX;

// Kind codes.
const K_UNKNOWN: u8 = 0;
const K_INTEGER: u8 = 1;
const K_FLOAT: u8 = 2;
const K_POINTER: u8 = 3;
const K_ARRAY: u8 = 4;
const K_FUNCTION: u8 = 5;
const K_STRUCT: u8 = 6;
const K_UNION: u8 = 7;
const K_ENUM: u8 = 8;
const K_FORWARD: u8 = 9;
const K_TYPEDEF: u8 = 10;
const K_VOLATILE: u8 = 11;
const K_CONST: u8 = 12;
const K_RESTRICT: u8 = 13;

impl Dict {
    /// Encode this dictionary,
    ///   compressing it if its body is larger than `threshold` bytes.
    pub fn to_bytes(&self, threshold: usize) -> DictResult<Vec<u8>> {
        let body = self.encode_body();
        let compress = body.len() > threshold;

        let mut flags = 0;
        if compress {
            flags |= FLAG_COMPRESSED;
        }
        if self.child {
            flags |= FLAG_CHILD;
        }

        let mut out = Vec::with_capacity(HEADER_LEN + body.len());
        out.extend_from_slice(&DICT_MAGIC.to_le_bytes());
        out.push(DICT_VERSION);
        out.push(flags);
        out.extend_from_slice(&[0; 4]);

        if compress {
            let packed =
                zstd::encode_all(body.as_slice(), global::COMPRESS_LEVEL)
                    .map_err(DictError::Compression)?;

            out.extend_from_slice(&(body.len() as u64).to_le_bytes());
            out.extend_from_slice(&packed);
        } else {
            out.extend_from_slice(&body);
        }

        Ok(out)
    }

    /// Decode a dictionary produced by [`Dict::to_bytes`].
    ///
    /// The decoded dictionary receives a new [`DictId`](super::DictId)
    ///   and the host data model;
    ///     callers that know better should use [`Dict::set_model`].
    pub fn from_bytes(bytes: &[u8]) -> DictResult<Dict> {
        let mut header = Reader::new(bytes);

        if header.u16()? != DICT_MAGIC {
            return Err(DictError::BadMagic);
        }

        match header.u8()? {
            DICT_VERSION => (),
            v => return Err(DictError::BadVersion(v)),
        }

        let flags = header.u8()?;
        header.take(4)?;

        let rest = header.rest();

        if flags & FLAG_COMPRESSED != 0 {
            let mut packed = Reader::new(rest);
            let raw_len = packed.u64()?;
            let body = zstd::decode_all(packed.rest())
                .map_err(DictError::Compression)?;

            if body.len() as u64 != raw_len {
                return Err(DictError::Corrupt("decompressed length mismatch"));
            }

            Self::decode_body(&body, flags & FLAG_CHILD != 0)
        } else {
            Self::decode_body(rest, flags & FLAG_CHILD != 0)
        }
    }

    fn encode_body(&self) -> Vec<u8> {
        let mut out = Vec::new();

        put_opt_str(&mut out, self.cu_name.as_deref());
        put_opt_str(&mut out, self.parent_name.as_deref());

        let atoms = self.atoms.as_bytes();
        put_u32(&mut out, atoms.len() as u32);
        out.extend_from_slice(atoms);

        put_u32(&mut out, self.types.len() as u32);
        for def in &self.types {
            put_u32(&mut out, def.name.offset());
            encode_kind(&mut out, &def.kind);
        }

        put_u32(&mut out, self.vars.len() as u32);
        for (name, ty) in &self.vars {
            let atom = self.atoms.get(name).unwrap_or(Atom::EMPTY);
            put_u32(&mut out, atom.offset());
            put_u32(&mut out, ty.as_raw());
        }

        let externals = self.atoms.externals();
        put_u32(&mut out, externals.len() as u32);
        for (atom, offset) in externals {
            put_u32(&mut out, atom.offset());
            put_u32(&mut out, offset);
        }

        out
    }

    fn decode_body(body: &[u8], child: bool) -> DictResult<Dict> {
        let mut r = Reader::new(body);
        let mut dict = Dict::new();
        dict.child = child;

        dict.cu_name = r.opt_str()?.map(Into::into);
        dict.parent_name = r.opt_str()?.map(Into::into);

        let atoms_len = r.u32()? as usize;
        dict.atoms = AtomTable::from_bytes(r.take(atoms_len)?.to_vec())?;

        let ntypes = r.count()?;
        if ntypes > global::MAX_TYPE_INDEX as usize {
            return Err(DictError::Corrupt("too many types"));
        }

        for _ in 0..ntypes {
            let name = dict.atom(r.u32()?)?;
            let code = r.u8()?;
            let kind = decode_kind(&mut r, code, &dict)?;

            dict.push(TypeDef::new(name, kind))?;
        }

        // References are verified only once every type is known,
        //   since aggregates may refer to types defined after them.
        for (_, def) in dict.types() {
            let mut bad = None;
            def.kind.each_ref(|id| {
                if !id.is_none()
                    && id.is_child() == child
                    && id.index() as usize > ntypes
                {
                    bad.get_or_insert(id);
                }
            });

            if bad.is_some() {
                return Err(DictError::Corrupt("dangling type reference"));
            }
        }

        for _ in 0..r.count()? {
            let name = dict.atom(r.u32()?)?;
            let ty = TypeId::from_raw(r.u32()?);

            let name = dict
                .atoms
                .resolve(name)
                .filter(|n| !n.is_empty())
                .ok_or(DictError::Corrupt("unnamed variable"))?;

            dict.vars.insert(name.into(), ty);
        }

        for _ in 0..r.count()? {
            let atom = dict.atom(r.u32()?)?;
            let offset = r.u32()?;

            dict.atoms.set_external(atom, offset);
        }

        Ok(dict)
    }

    /// Validate an encoded atom against this dictionary's atom table.
    fn atom(&self, offset: u32) -> DictResult<Atom> {
        let atom = Atom::from_offset(offset);

        match self.atoms.resolve(atom) {
            Some(_) => Ok(atom),
            None => Err(DictError::Corrupt("invalid atom")),
        }
    }
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_opt_str(out: &mut Vec<u8>, value: Option<&str>) {
    match value {
        Some(s) => {
            put_u32(out, s.len() as u32);
            out.extend_from_slice(s.as_bytes());
        }
        None => put_u32(out, ABSENT),
    }
}

fn put_members(out: &mut Vec<u8>, size: u64, members: &[Member]) {
    out.extend_from_slice(&size.to_le_bytes());
    put_u32(out, members.len() as u32);

    for m in members {
        put_u32(out, m.name.offset());
        put_u32(out, m.ty.as_raw());
        out.extend_from_slice(&m.offset.to_le_bytes());
    }
}

fn encode_kind(out: &mut Vec<u8>, kind: &TypeKind) {
    match kind {
        TypeKind::Unknown => out.push(K_UNKNOWN),

        TypeKind::Integer { bits, signed } => {
            out.push(K_INTEGER);
            put_u32(out, *bits);
            out.push(*signed as u8);
        }

        TypeKind::Float { bits } => {
            out.push(K_FLOAT);
            put_u32(out, *bits);
        }

        TypeKind::Array {
            contents,
            index,
            nelems,
        } => {
            out.push(K_ARRAY);
            put_u32(out, contents.as_raw());
            put_u32(out, index.as_raw());
            put_u32(out, *nelems);
        }

        TypeKind::Function {
            ret,
            args,
            variadic,
        } => {
            out.push(K_FUNCTION);
            put_u32(out, ret.as_raw());
            out.push(*variadic as u8);
            put_u32(out, args.len() as u32);
            args.iter().for_each(|arg| put_u32(out, arg.as_raw()));
        }

        TypeKind::Struct { size, members } => {
            out.push(K_STRUCT);
            put_members(out, *size, members);
        }

        TypeKind::Union { size, members } => {
            out.push(K_UNION);
            put_members(out, *size, members);
        }

        TypeKind::Enum(enumerators) => {
            out.push(K_ENUM);
            put_u32(out, enumerators.len() as u32);

            for e in enumerators {
                put_u32(out, e.name.offset());
                out.extend_from_slice(&e.value.to_le_bytes());
            }
        }

        TypeKind::Forward(ns) => {
            out.push(K_FORWARD);
            out.push(ns.code());
        }

        TypeKind::Pointer(ty)
        | TypeKind::Typedef(ty)
        | TypeKind::Volatile(ty)
        | TypeKind::Const(ty)
        | TypeKind::Restrict(ty) => {
            out.push(match kind {
                TypeKind::Pointer(_) => K_POINTER,
                TypeKind::Typedef(_) => K_TYPEDEF,
                TypeKind::Volatile(_) => K_VOLATILE,
                TypeKind::Const(_) => K_CONST,
                _ => K_RESTRICT,
            });
            put_u32(out, ty.as_raw());
        }
    }
}

fn decode_members(r: &mut Reader, dict: &Dict) -> DictResult<(u64, Vec<Member>)> {
    let size = r.u64()?;
    let n = r.count()?;

    let members = (0..n)
        .map(|_| {
            Ok(Member {
                name: dict.atom(r.u32()?)?,
                ty: TypeId::from_raw(r.u32()?),
                offset: r.u64()?,
            })
        })
        .collect::<DictResult<_>>()?;

    Ok((size, members))
}

fn decode_kind(r: &mut Reader, code: u8, dict: &Dict) -> DictResult<TypeKind> {
    let id = |r: &mut Reader| r.u32().map(TypeId::from_raw);

    Ok(match code {
        K_UNKNOWN => TypeKind::Unknown,

        K_INTEGER => TypeKind::Integer {
            bits: r.u32()?,
            signed: r.u8()? != 0,
        },

        K_FLOAT => TypeKind::Float { bits: r.u32()? },

        K_POINTER => TypeKind::Pointer(id(r)?),
        K_TYPEDEF => TypeKind::Typedef(id(r)?),
        K_VOLATILE => TypeKind::Volatile(id(r)?),
        K_CONST => TypeKind::Const(id(r)?),
        K_RESTRICT => TypeKind::Restrict(id(r)?),

        K_ARRAY => TypeKind::Array {
            contents: id(r)?,
            index: id(r)?,
            nelems: r.u32()?,
        },

        K_FUNCTION => {
            let ret = id(r)?;
            let variadic = r.u8()? != 0;
            let n = r.count()?;
            let args = (0..n).map(|_| id(r)).collect::<DictResult<_>>()?;

            TypeKind::Function {
                ret,
                args,
                variadic,
            }
        }

        K_STRUCT => {
            let (size, members) = decode_members(r, dict)?;
            TypeKind::Struct { size, members }
        }

        K_UNION => {
            let (size, members) = decode_members(r, dict)?;
            TypeKind::Union { size, members }
        }

        K_ENUM => {
            let n = r.count()?;
            let enumerators = (0..n)
                .map(|_| {
                    Ok(Enumerator {
                        name: dict.atom(r.u32()?)?,
                        value: r.i64()?,
                    })
                })
                .collect::<DictResult<_>>()?;

            TypeKind::Enum(enumerators)
        }

        K_FORWARD => TypeKind::Forward(
            Namespace::from_code(r.u8()?)
                .ok_or(DictError::Corrupt("invalid forward namespace"))?,
        ),

        _ => return Err(DictError::Corrupt("invalid type kind")),
    })
}

/// Cursor over encoded bytes.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> DictResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or(DictError::Truncated)?;

        let bytes = &self.buf[self.pos..end];
        self.pos = end;

        Ok(bytes)
    }

    fn rest(&mut self) -> &'a [u8] {
        let bytes = &self.buf[self.pos..];
        self.pos = self.buf.len();

        bytes
    }

    fn array<const N: usize>(&mut self) -> DictResult<[u8; N]> {
        let mut bytes = [0; N];
        bytes.copy_from_slice(self.take(N)?);

        Ok(bytes)
    }

    fn u8(&mut self) -> DictResult<u8> {
        self.array::<1>().map(|[b]| b)
    }

    fn u16(&mut self) -> DictResult<u16> {
        self.array().map(u16::from_le_bytes)
    }

    fn u32(&mut self) -> DictResult<u32> {
        self.array().map(u32::from_le_bytes)
    }

    fn u64(&mut self) -> DictResult<u64> {
        self.array().map(u64::from_le_bytes)
    }

    fn i64(&mut self) -> DictResult<i64> {
        self.array().map(i64::from_le_bytes)
    }

    /// Read an element count.
    ///
    /// Every element occupies at least one byte,
    ///   so a count exceeding the remaining input is certainly corrupt;
    ///     rejecting it up front avoids absurd allocations.
    fn count(&mut self) -> DictResult<usize> {
        let n = self.u32()? as usize;

        if n > self.buf.len() - self.pos {
            return Err(DictError::Truncated);
        }

        Ok(n)
    }

    fn opt_str(&mut self) -> DictResult<Option<&'a str>> {
        match self.u32()? {
            ABSENT => Ok(None),
            len => std::str::from_utf8(self.take(len as usize)?)
                .map(Some)
                .map_err(|_| DictError::Corrupt("name is not UTF-8")),
        }
    }
}

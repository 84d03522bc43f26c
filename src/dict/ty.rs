// Dictionary type definitions
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

//! Type definitions stored within a [`Dict`](super::Dict).
//!
//! _This is a private module.
//!  See [`super`] for available exports._

use super::{Atom, TypeId};

/// Namespace in which a named type is declared.
///
/// As in C,
///   `struct foo`, `union foo`, and `enum foo` may coexist with an
///   ordinary type (e.g. a typedef) also named `foo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Namespace {
    /// Integers, floats, and typedefs.
    Ordinary,
    Struct,
    Union,
    Enum,
}

impl Namespace {
    pub(super) fn code(self) -> u8 {
        match self {
            Self::Ordinary => 0,
            Self::Struct => 1,
            Self::Union => 2,
            Self::Enum => 3,
        }
    }

    pub(super) fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Ordinary),
            1 => Some(Self::Struct),
            2 => Some(Self::Union),
            3 => Some(Self::Enum),
            _ => None,
        }
    }
}

/// A member of a struct or union.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Member {
    pub name: Atom,
    pub ty: TypeId,
    /// Offset of this member from the start of the aggregate,
    ///   in bits.
    pub offset: u64,
}

/// A named constant of an enum.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Enumerator {
    pub name: Atom,
    pub value: i64,
}

/// Kind of a type along with its kind-specific data.
///
/// Every [`TypeId`] held by a kind is relative to the dictionary holding
///   the kind
///     (and that dictionary's parent,
///        if it is a child).
/// Kinds hash structurally,
///   which is used to deduplicate unnamed types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Integer {
        bits: u32,
        signed: bool,
    },
    Float {
        bits: u32,
    },
    Pointer(TypeId),
    Array {
        contents: TypeId,
        index: TypeId,
        nelems: u32,
    },
    Function {
        ret: TypeId,
        args: Vec<TypeId>,
        variadic: bool,
    },
    /// Struct of `size` bytes.
    Struct {
        size: u64,
        members: Vec<Member>,
    },
    /// Union of `size` bytes.
    Union {
        size: u64,
        members: Vec<Member>,
    },
    Enum(Vec<Enumerator>),
    /// Declaration of an aggregate whose definition is not available.
    Forward(Namespace),
    Typedef(TypeId),
    Volatile(TypeId),
    Const(TypeId),
    Restrict(TypeId),
    /// A type that the producer of a dictionary was unable to encode.
    ///
    /// Such types can be read,
    ///   but can never be added to another dictionary.
    Unknown,
}

impl TypeKind {
    /// Namespace of a type of this kind when it is named.
    pub fn namespace(&self) -> Namespace {
        match self {
            Self::Struct { .. } => Namespace::Struct,
            Self::Union { .. } => Namespace::Union,
            Self::Enum(_) => Namespace::Enum,
            Self::Forward(ns) => *ns,
            _ => Namespace::Ordinary,
        }
    }

    /// Whether a name given to a type of this kind is visible in its
    ///   [`Namespace`].
    ///
    /// Names of other kinds
    ///   (pointers, arrays, functions, and qualifiers)
    ///   are retained but cannot be looked up.
    pub fn is_nameable(&self) -> bool {
        matches!(
            self,
            Self::Integer { .. }
                | Self::Float { .. }
                | Self::Struct { .. }
                | Self::Union { .. }
                | Self::Enum(_)
                | Self::Forward(_)
                | Self::Typedef(_)
        )
    }

    /// Whether this kind embeds atoms of its dictionary,
    ///   making its hash meaningful only within that dictionary.
    pub(super) fn has_atoms(&self) -> bool {
        match self {
            Self::Struct { members, .. } | Self::Union { members, .. } => {
                !members.is_empty()
            }
            Self::Enum(enumerators) => !enumerators.is_empty(),
            _ => false,
        }
    }

    /// Invoke `f` with each type referenced by this kind.
    pub fn each_ref(&self, mut f: impl FnMut(TypeId)) {
        match self {
            Self::Pointer(ty)
            | Self::Typedef(ty)
            | Self::Volatile(ty)
            | Self::Const(ty)
            | Self::Restrict(ty) => f(*ty),

            Self::Array {
                contents, index, ..
            } => {
                f(*contents);
                f(*index);
            }

            Self::Function { ret, args, .. } => {
                f(*ret);
                args.iter().copied().for_each(f);
            }

            Self::Struct { members, .. } | Self::Union { members, .. } => {
                members.iter().for_each(|m| f(m.ty))
            }

            Self::Integer { .. }
            | Self::Float { .. }
            | Self::Enum(_)
            | Self::Forward(_)
            | Self::Unknown => (),
        }
    }

    /// Human-readable name of this kind.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Integer { .. } => "integer",
            Self::Float { .. } => "float",
            Self::Pointer(_) => "pointer",
            Self::Array { .. } => "array",
            Self::Function { .. } => "function",
            Self::Struct { .. } => "struct",
            Self::Union { .. } => "union",
            Self::Enum(_) => "enum",
            Self::Forward(_) => "forward",
            Self::Typedef(_) => "typedef",
            Self::Volatile(_) => "volatile",
            Self::Const(_) => "const",
            Self::Restrict(_) => "restrict",
            Self::Unknown => "unknown",
        }
    }
}

/// A type and its name.
///
/// Anonymous types have the name [`Atom::EMPTY`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDef {
    pub name: Atom,
    pub kind: TypeKind,
}

impl TypeDef {
    pub fn new(name: Atom, kind: TypeKind) -> Self {
        Self { name, kind }
    }

    pub fn anonymous(kind: TypeKind) -> Self {
        Self::new(Atom::EMPTY, kind)
    }

    pub fn is_named(&self) -> bool {
        !self.name.is_empty()
    }
}

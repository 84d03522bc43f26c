// Type information dictionaries
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

//! Type information dictionaries.
//!
//! A [`Dict`] holds the types, variables, and strings ([atoms](atom))
//!   describing one compilation unit,
//!     or the merged result of many.
//! Dictionaries are produced independently by each compiler invocation;
//!   the [linker](crate::ld) merges them and the [archive](crate::obj)
//!   format stores the result.
//!
//!
//! Type Ids
//! ========
//! Types are identified by a [`TypeId`],
//!   which is a 1-based index into the type table of a dictionary.
//! The id `0` ([`TypeId::NONE`]) identifies no type
//!   (e.g. `void`).
//!
//! A dictionary may be the _child_ of a _parent_ dictionary,
//!   from which it inherits every type.
//! The types owned by a child have the most significant bit
//!   ([`TypeId::CHILD_BIT`]) set;
//!     a child may freely reference parent types by their parent ids,
//!       which do not have the bit set.
//! Consequently,
//!   one must always know which dictionary a [`TypeId`] is relative to.
//!
//! Dictionaries do not own their parents.
//! Whoever needs to look through a child into its parent pairs the two
//!   using a [`Chain`].
//!
//! ```
//! use ctfld::dict::{Chain, Dict, TypeKind};
//!
//! let mut parent = Dict::new();
//! let int = parent
//!     .define(Some("int"), TypeKind::Integer { bits: 32, signed: true })
//!     .unwrap();
//!
//! let mut child = Dict::new();
//! child.import(&parent).unwrap();
//! let ptr = child.define(None, TypeKind::Pointer(int)).unwrap();
//!
//! assert!(ptr.is_child());
//! assert!(!int.is_child());
//!
//! let chain = Chain::new(&child, Some(&parent));
//! assert_eq!(Some("int"), chain.name(int));
//! assert_eq!(Some(4), chain.size(int));
//! assert_eq!(Some(child.model().pointer_size()), chain.size(ptr));
//! ```

mod add;
pub mod atom;
mod codec;
mod error;
mod ty;

pub use atom::{Atom, AtomTable};
pub use error::DictError;
pub use ty::{Enumerator, Member, Namespace, TypeDef, TypeKind};

use crate::global;
use crate::mapping::TypeMap;
use fxhash::FxHashMap;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};

/// A [`Result`] with a hard-coded [`DictError`] error type.
pub type DictResult<T> = Result<T, DictError>;

/// Identity of a [`Dict`] instance.
///
/// Every dictionary receives a unique id upon creation,
///   including dictionaries decoded from bytes.
/// This is used to key the [type mapping tables](crate::mapping).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DictId(u64);

impl DictId {
    fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Identifier of a type relative to some dictionary.
///
/// See the [module-level documentation](self) for more information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TypeId(u32);

impl TypeId {
    /// No type.
    pub const NONE: TypeId = TypeId(0);

    /// Bit distinguishing the types of a child from those of its parent.
    pub const CHILD_BIT: u32 = 0x8000_0000;

    pub fn from_index(index: global::TypeIndexSize, child: bool) -> Self {
        debug_assert!(index <= global::MAX_TYPE_INDEX);

        if child {
            Self(index | Self::CHILD_BIT)
        } else {
            Self(index)
        }
    }

    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn as_raw(self) -> u32 {
        self.0
    }

    /// Index of this type within the type table of the dictionary that
    ///   owns it.
    pub fn index(self) -> global::TypeIndexSize {
        self.0 & !Self::CHILD_BIT
    }

    pub fn is_child(self) -> bool {
        self.0 & Self::CHILD_BIT != 0
    }

    pub fn is_none(self) -> bool {
        self.index() == 0
    }
}

impl Display for TypeId {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "{:#x}", self.0)
    }
}

/// Data model of the target described by a dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataModel {
    Ilp32,
    Lp64,
}

impl DataModel {
    /// Data model of the host.
    pub fn native() -> Self {
        if cfg!(target_pointer_width = "64") {
            Self::Lp64
        } else {
            Self::Ilp32
        }
    }

    pub fn pointer_size(self) -> u64 {
        match self {
            Self::Ilp32 => 4,
            Self::Lp64 => 8,
        }
    }

    /// Numeric tag of this model as stored in archives.
    pub fn tag(self) -> u64 {
        match self {
            Self::Ilp32 => 1,
            Self::Lp64 => 2,
        }
    }

    pub fn from_tag(tag: u64) -> Option<Self> {
        match tag {
            1 => Some(Self::Ilp32),
            2 => Some(Self::Lp64),
            _ => None,
        }
    }
}

impl Default for DataModel {
    fn default() -> Self {
        Self::native()
    }
}

impl Display for DataModel {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Ilp32 => write!(fmt, "ILP32"),
            Self::Lp64 => write!(fmt, "LP64"),
        }
    }
}

/// Key of the named type index.
type NameKey = (Namespace, Atom);

/// Key of the structural index of unnamed types.
type ShapeKey = (Atom, TypeKind);

/// A container of types, variables, and atoms.
///
/// See the [module-level documentation](self) for more information.
#[derive(Debug)]
pub struct Dict {
    id: DictId,
    model: DataModel,
    child: bool,
    cu_name: Option<Box<str>>,
    parent_name: Option<Box<str>>,
    atoms: AtomTable,
    types: Vec<TypeDef>,
    named: FxHashMap<NameKey, TypeId>,
    shapes: FxHashMap<ShapeKey, TypeId>,
    vars: BTreeMap<Box<str>, TypeId>,
    type_map: RefCell<Option<TypeMap>>,
}

impl Default for Dict {
    fn default() -> Self {
        Self::with_model(DataModel::native())
    }
}

impl Dict {
    /// Create an empty dictionary for the host data model.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(model: DataModel) -> Self {
        Self {
            id: DictId::fresh(),
            model,
            child: false,
            cu_name: None,
            parent_name: None,
            atoms: AtomTable::new(),
            types: Vec::new(),
            named: Default::default(),
            shapes: Default::default(),
            vars: BTreeMap::new(),
            type_map: RefCell::new(None),
        }
    }

    pub fn id(&self) -> DictId {
        self.id
    }

    pub fn model(&self) -> DataModel {
        self.model
    }

    pub fn set_model(&mut self, model: DataModel) {
        self.model = model;
    }

    /// Whether this dictionary is the child of some parent.
    pub fn is_child(&self) -> bool {
        self.child
    }

    /// Make this dictionary a child of `parent`.
    ///
    /// This records only the relationship;
    ///   the parent must still be provided via a [`Chain`] wherever
    ///   parent types are to be resolved.
    /// If no parent name has yet been recorded,
    ///   [`global::DEFAULT_PARENT_NAME`] is assumed.
    pub fn import(&mut self, parent: &Dict) -> DictResult<()> {
        if !self.child && !self.types.is_empty() {
            return Err(DictError::NotEmpty);
        }

        if self.model != parent.model {
            return Err(DictError::ModelMismatch {
                child: self.model,
                parent: parent.model,
            });
        }

        self.child = true;
        self.parent_name
            .get_or_insert_with(|| global::DEFAULT_PARENT_NAME.into());

        Ok(())
    }

    /// Name of the compilation unit described by this dictionary.
    pub fn cu_name(&self) -> Option<&str> {
        self.cu_name.as_deref()
    }

    pub fn set_cu_name(&mut self, name: &str) {
        self.cu_name = Some(name.into());
    }

    /// Name of the archive member holding this dictionary's parent.
    pub fn parent_name(&self) -> Option<&str> {
        self.parent_name.as_deref()
    }

    pub fn set_parent_name(&mut self, name: &str) {
        self.parent_name = Some(name.into());
    }

    pub fn atoms(&self) -> &AtomTable {
        &self.atoms
    }

    pub fn atoms_mut(&mut self) -> &mut AtomTable {
        &mut self.atoms
    }

    /// Intern a string into this dictionary's [`AtomTable`].
    pub fn intern(&mut self, value: &str) -> Atom {
        self.atoms.intern(value)
    }

    /// Construct a struct or union [`Member`],
    ///   interning its name.
    pub fn member(&mut self, name: &str, ty: TypeId, offset: u64) -> Member {
        Member {
            name: self.intern(name),
            ty,
            offset,
        }
    }

    /// Construct an [`Enumerator`],
    ///   interning its name.
    pub fn enumerator(&mut self, name: &str, value: i64) -> Enumerator {
        Enumerator {
            name: self.intern(name),
            value,
        }
    }

    /// Number of types owned by this dictionary.
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Types owned by this dictionary in definition order.
    pub fn types(&self) -> impl Iterator<Item = (TypeId, &TypeDef)> {
        let child = self.child;

        self.types.iter().enumerate().map(move |(i, def)| {
            (TypeId::from_index(i as u32 + 1, child), def)
        })
    }

    /// Look up a type owned by this dictionary.
    ///
    /// Parent types are never found;
    ///   use a [`Chain`] for that.
    pub fn get(&self, id: TypeId) -> Option<&TypeDef> {
        if id.is_none() || id.is_child() != self.child {
            return None;
        }

        self.types.get(id.index() as usize - 1)
    }

    /// Name of a type owned by this dictionary,
    ///   if it has one.
    pub fn name(&self, id: TypeId) -> Option<&str> {
        self.get(id)
            .filter(|def| def.is_named())
            .and_then(|def| self.atoms.resolve(def.name))
    }

    /// Look up a named type owned by this dictionary.
    pub fn lookup(&self, ns: Namespace, name: &str) -> Option<TypeId> {
        let atom = self.atoms.get(name).filter(|a| !a.is_empty())?;
        self.named.get(&(ns, atom)).copied()
    }

    /// Define a new type owned by this dictionary.
    ///
    /// References to this dictionary's own types must exist;
    ///   references into a parent are not verified.
    /// Atoms held by `kind` must have been interned into this dictionary.
    ///
    /// A named type may replace a [forward](TypeKind::Forward) of the
    ///   same name and namespace,
    ///     but otherwise names must be unique within a namespace.
    pub fn define(
        &mut self,
        name: Option<&str>,
        kind: TypeKind,
    ) -> DictResult<TypeId> {
        let mut bad = None;
        kind.each_ref(|r| {
            if r.is_child() == self.child && !r.is_none() && self.get(r).is_none()
            {
                bad.get_or_insert(r);
            }
        });

        if let Some(r) = bad {
            return Err(DictError::BadId(r));
        }

        let name = name.map(|n| self.intern(n)).unwrap_or(Atom::EMPTY);
        let key = (kind.namespace(), name);

        if !name.is_empty() && kind.is_nameable() {
            if let Some(existing) = self.named.get(&key).copied() {
                if matches!(kind, TypeKind::Forward(_)) {
                    return Ok(existing);
                }

                let replaceable = matches!(
                    self.get(existing).map(|def| &def.kind),
                    Some(TypeKind::Forward(_))
                );

                if !replaceable {
                    return Err(DictError::DuplicateType {
                        name: self.atoms.resolve(name).unwrap_or("").into(),
                    });
                }
            }
        }

        self.push(TypeDef::new(name, kind))
    }

    /// Append a type and index it by name or shape.
    ///
    /// Named types displace any existing entry for the same name;
    ///   unnamed types never displace an existing shape.
    fn push(&mut self, def: TypeDef) -> DictResult<TypeId> {
        let index = self.types.len() + 1;

        if index > global::MAX_TYPE_INDEX as usize {
            return Err(DictError::Full);
        }

        let id = TypeId::from_index(index as u32, self.child);

        if def.is_named() && def.kind.is_nameable() {
            self.named.insert((def.kind.namespace(), def.name), id);
        } else {
            self.shapes
                .entry((def.name, def.kind.clone()))
                .or_insert(id);
        }

        self.types.push(def);

        Ok(id)
    }

    /// Look up an existing unnamed type by its shape.
    fn lookup_shape(&self, key: &ShapeKey) -> Option<TypeId> {
        self.shapes.get(key).copied()
    }

    /// Add a variable `name` of type `ty`.
    ///
    /// Adding a variable that already exists with the same type does
    ///   nothing;
    ///     adding one with a different type fails and leaves the
    ///     original definition intact.
    pub fn add_variable(&mut self, name: &str, ty: TypeId) -> DictResult<()> {
        if ty.is_none() {
            return Err(DictError::BadId(ty));
        }

        if ty.is_child() == self.child && self.get(ty).is_none() {
            return Err(DictError::BadId(ty));
        }

        match self.vars.get(name) {
            Some(existing) if *existing == ty => Ok(()),
            Some(existing) => Err(DictError::DuplicateVariable {
                name: name.into(),
                existing: *existing,
                rejected: ty,
            }),
            None => {
                self.intern(name);
                self.vars.insert(name.into(), ty);
                Ok(())
            }
        }
    }

    /// Type of variable `name`,
    ///   if defined.
    pub fn variable(&self, name: &str) -> Option<TypeId> {
        self.vars.get(name).copied()
    }

    /// Variables ordered by name.
    pub fn variables(&self) -> impl Iterator<Item = (&str, TypeId)> {
        self.vars.iter().map(|(name, ty)| (name.as_ref(), *ty))
    }

    pub fn variable_count(&self) -> usize {
        self.vars.len()
    }

    /// Mapping table of types linked into this dictionary.
    ///
    /// See [`crate::mapping`].
    pub(crate) fn type_map(&self) -> &RefCell<Option<TypeMap>> {
        &self.type_map
    }

    /// Mark the current size of the type table so that types added
    ///   afterward can be discarded by [`Dict::rollback`].
    fn snapshot(&self) -> Snapshot {
        Snapshot {
            len: self.types.len(),
        }
    }

    /// Discard every type added since `snapshot`,
    ///   restoring name index entries that were displaced in the
    ///   meantime.
    fn rollback(&mut self, snapshot: Snapshot, displaced: Vec<(NameKey, TypeId)>) {
        let limit = snapshot.len as u32;

        if self.types.len() > snapshot.len {
            self.types.truncate(snapshot.len);
            self.named.retain(|_, id| id.index() <= limit);
            self.shapes.retain(|_, id| id.index() <= limit);

            if let Some(map) = self.type_map.borrow_mut().as_mut() {
                map.forget_after(limit);
            }
        }

        for (key, id) in displaced.into_iter().rev() {
            if id.index() <= limit {
                self.named.insert(key, id);
            }
        }
    }
}

/// Size of a type table at some point in time.
///
/// See [`Dict::snapshot`].
#[derive(Debug, Clone, Copy)]
struct Snapshot {
    len: usize,
}

/// A dictionary paired with its parent,
///   if any.
///
/// This is used to resolve type ids wherever a child may reference the
///   types of its parent.
/// The parent is ignored unless the dictionary is a
///   [child](Dict::is_child).
#[derive(Debug, Clone, Copy)]
pub struct Chain<'d> {
    dict: &'d Dict,
    parent: Option<&'d Dict>,
}

impl<'d> Chain<'d> {
    pub fn new(dict: &'d Dict, parent: Option<&'d Dict>) -> Self {
        Self { dict, parent }
    }

    /// A chain for a dictionary that has no parent available.
    pub fn standalone(dict: &'d Dict) -> Self {
        Self::new(dict, None)
    }

    pub fn dict(&self) -> &'d Dict {
        self.dict
    }

    /// Parent of the dictionary,
    ///   if it is a child and its parent is available.
    pub fn parent(&self) -> Option<&'d Dict> {
        self.parent.filter(|_| self.dict.child)
    }

    /// Dictionary owning the type `id`.
    pub fn owner(&self, id: TypeId) -> Option<&'d Dict> {
        if id.is_none() {
            return None;
        }

        match (self.dict.child, id.is_child()) {
            (true, true) | (false, false) => Some(self.dict),
            (true, false) => self.parent(),
            (false, true) => None,
        }
    }

    pub fn get(&self, id: TypeId) -> Option<&'d TypeDef> {
        self.owner(id)?.get(id)
    }

    /// Name of the type `id`,
    ///   if it is named.
    pub fn name(&self, id: TypeId) -> Option<&'d str> {
        self.owner(id)?.name(id)
    }

    /// Resolve an atom of the type `id` to a string.
    pub fn resolve(&self, id: TypeId, atom: Atom) -> Option<&'d str> {
        self.owner(id)?.atoms.resolve(atom)
    }

    /// Look up a named type in the dictionary,
    ///   then in its parent.
    pub fn lookup(&self, ns: Namespace, name: &str) -> Option<TypeId> {
        self.dict
            .lookup(ns, name)
            .or_else(|| self.parent().and_then(|p| p.lookup(ns, name)))
    }

    /// Size of a type in bytes.
    ///
    /// Yields [`None`] if the type or any type it depends on cannot be
    ///   resolved,
    ///     if the type has no size
    ///       (e.g. functions and forwards),
    ///     or if its size does not fit in a [`u64`].
    pub fn size(&self, id: TypeId) -> Option<u64> {
        self.size_bounded(id, 64)
    }

    fn size_bounded(&self, id: TypeId, depth: u8) -> Option<u64> {
        let depth = depth.checked_sub(1)?;

        match &self.get(id)?.kind {
            TypeKind::Integer { bits, .. } | TypeKind::Float { bits } => {
                Some((*bits as u64 + 7) / 8)
            }
            TypeKind::Pointer(_) => Some(self.dict.model.pointer_size()),
            TypeKind::Array {
                contents, nelems, ..
            } => self
                .size_bounded(*contents, depth)
                .and_then(|size| size.checked_mul(*nelems as u64)),
            TypeKind::Struct { size, .. } | TypeKind::Union { size, .. } => {
                Some(*size)
            }
            TypeKind::Enum(_) => Some(4),
            TypeKind::Typedef(ty)
            | TypeKind::Volatile(ty)
            | TypeKind::Const(ty)
            | TypeKind::Restrict(ty) => self.size_bounded(*ty, depth),
            TypeKind::Function { .. }
            | TypeKind::Forward(_)
            | TypeKind::Unknown => None,
        }
    }
}

// Type addition across dictionaries
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

//! Adding types by reference from one dictionary to another.
//!
//! _This is a private module.
//!  See [`Dict::add_type`] for more information._

use super::{
    Atom, Chain, Dict, DictError, DictResult, Enumerator, Member, NameKey,
    TypeDef, TypeId, TypeKind,
};
use crate::mapping;
use fixedbitset::FixedBitSet;

impl Dict {
    /// Copy the type `src_id` of `src` into this dictionary along with
    ///   every type it references,
    ///     returning its id relative to this dictionary.
    ///
    /// If this dictionary is a child,
    ///   `parent` must be its parent;
    ///     compatible parent types are then reused rather than
    ///     duplicated.
    ///
    /// Types already copied from `src` are found via the
    ///   [type mapping table](crate::mapping).
    /// Otherwise,
    ///   named types are matched by name:
    ///
    ///   - integers and floats must have the same encoding;
    ///   - enums must have the same enumerators;
    ///   - structs and unions must have the same size and the same member
    ///       names at the same offsets;
    ///   - typedefs must refer to the same type; and
    ///   - forwards match any aggregate of their namespace,
    ///       and are replaced by a later complete definition.
    ///
    /// A named type that does not match yields [`DictError::Conflict`].
    /// Unnamed types are matched structurally.
    ///
    /// On failure,
    ///   this dictionary is restored to its state prior to the call.
    pub fn add_type(
        &mut self,
        parent: Option<&Dict>,
        src: Chain<'_>,
        src_id: TypeId,
    ) -> DictResult<TypeId> {
        debug_assert!(
            parent.map_or(true, |p| p.id() != self.id()),
            "a dictionary cannot be its own parent"
        );

        let snapshot = self.snapshot();
        let mut adder = Adder::new(parent, src);

        let result = adder.add(self, src_id);

        if result.is_err() {
            self.rollback(snapshot, adder.displaced);
        }

        result
    }
}

/// Result of comparing a source type against an existing destination type
///   of the same name.
enum Reconciled {
    /// The existing type is equivalent.
    Same,
    /// The existing type is a forward that the source type completes.
    Upgrade,
}

/// Source types currently being added.
///
/// Re-entering a type that is still in progress means that the type is
///   defined in terms of itself without going through a named aggregate,
///     which cannot be represented.
struct Busy {
    own: FixedBitSet,
    parent: FixedBitSet,
}

impl Busy {
    fn new(src: &Chain) -> Self {
        Self {
            own: FixedBitSet::with_capacity(src.dict().type_count() + 1),
            parent: FixedBitSet::with_capacity(
                src.parent().map_or(0, |p| p.type_count() + 1),
            ),
        }
    }

    fn bits(&mut self, src: &Chain, id: TypeId) -> &mut FixedBitSet {
        if src.dict().is_child() && !id.is_child() {
            &mut self.parent
        } else {
            &mut self.own
        }
    }

    /// Mark `id` as in progress,
    ///   returning `false` if it already was.
    fn enter(&mut self, src: &Chain, id: TypeId) -> bool {
        let i = id.index() as usize;
        let bits = self.bits(src, id);

        if i >= bits.len() {
            bits.grow(i + 1);
        }

        !bits.put(i)
    }

    fn leave(&mut self, src: &Chain, id: TypeId) {
        let i = id.index() as usize;
        self.bits(src, id).set(i, false);
    }
}

/// State of a single [`Dict::add_type`] operation.
struct Adder<'p, 's> {
    parent: Option<&'p Dict>,
    src: Chain<'s>,
    busy: Busy,
    /// Name index entries replaced while adding,
    ///   to be restored on rollback.
    displaced: Vec<(NameKey, TypeId)>,
}

impl<'p, 's> Adder<'p, 's> {
    fn new(parent: Option<&'p Dict>, src: Chain<'s>) -> Self {
        Self {
            parent,
            busy: Busy::new(&src),
            src,
            displaced: Vec::new(),
        }
    }

    fn dst_chain<'d>(&self, dst: &'d Dict) -> Chain<'d>
    where
        'p: 'd,
    {
        Chain::new(dst, self.parent)
    }

    fn add(&mut self, dst: &mut Dict, src_id: TypeId) -> DictResult<TypeId> {
        if src_id.is_none() {
            return Ok(TypeId::NONE);
        }

        if let Some((id, _)) =
            mapping::lookup(self.src, src_id, self.dst_chain(dst))
        {
            return Ok(id);
        }

        let def = self.src.get(src_id).ok_or(DictError::BadId(src_id))?;

        if !self.busy.enter(&self.src, src_id) {
            return Err(DictError::NotRepresentable(src_id));
        }

        let result = self.add_def(dst, src_id, def);
        self.busy.leave(&self.src, src_id);

        let id = result?;
        self.record(dst, src_id, id);

        Ok(id)
    }

    fn record(&self, dst: &Dict, src_id: TypeId, dst_id: TypeId) {
        if let Err(e) =
            mapping::record(self.src, src_id, self.dst_chain(dst), dst_id)
        {
            tracing::debug!(
                src = %src_id,
                dst = %dst_id,
                error = %e,
                "type mapping not recorded",
            );
        }
    }

    fn add_def(
        &mut self,
        dst: &mut Dict,
        src_id: TypeId,
        def: &'s TypeDef,
    ) -> DictResult<TypeId> {
        if let TypeKind::Unknown = def.kind {
            return Err(DictError::NotRepresentable(src_id));
        }

        match self.src.name(src_id) {
            Some(name) if def.kind.is_nameable() => {
                self.add_named(dst, src_id, name, def)
            }
            name => self.add_unnamed(dst, src_id, name, def),
        }
    }

    fn add_named(
        &mut self,
        dst: &mut Dict,
        src_id: TypeId,
        name: &'s str,
        def: &'s TypeDef,
    ) -> DictResult<TypeId> {
        let ns = def.kind.namespace();

        if let Some(existing) = dst.lookup(ns, name) {
            match self.reconcile(dst, src_id, name, existing, def)? {
                Reconciled::Same => return Ok(existing),
                Reconciled::Upgrade => (),
            }
        } else if let Some(existing) = self
            .parent
            .filter(|_| dst.is_child())
            .and_then(|p| p.lookup(ns, name))
        {
            match self.reconcile(dst, src_id, name, existing, def) {
                Ok(Reconciled::Same) => return Ok(existing),
                // A child may shadow an incompatible parent type.
                Ok(Reconciled::Upgrade) | Err(DictError::Conflict { .. }) => {
                }
                Err(e) => return Err(e),
            }
        }

        self.define_named(dst, src_id, name, def)
    }

    fn reconcile(
        &mut self,
        dst: &mut Dict,
        src_id: TypeId,
        name: &str,
        existing: TypeId,
        def: &'s TypeDef,
    ) -> DictResult<Reconciled> {
        let conflict = || DictError::Conflict {
            name: name.into(),
            kind: def.kind.kind_name(),
        };

        // The referent of a typedef must be brought in before it can be
        //   compared.
        if let TypeKind::Typedef(src_ref) = def.kind {
            let dst_ref = match self.dst_chain(dst).get(existing) {
                Some(TypeDef {
                    kind: TypeKind::Typedef(r),
                    ..
                }) => *r,
                _ => return Err(conflict()),
            };

            return match self.add(dst, src_ref)? {
                r if r == dst_ref => Ok(Reconciled::Same),
                _ => Err(conflict()),
            };
        }

        let chain = self.dst_chain(dst);
        let ex = chain.get(existing).ok_or(DictError::BadId(existing))?;

        let same = match (&def.kind, &ex.kind) {
            (TypeKind::Forward(_), _) => true,
            (_, TypeKind::Forward(_)) => return Ok(Reconciled::Upgrade),

            (TypeKind::Integer { .. }, TypeKind::Integer { .. })
            | (TypeKind::Float { .. }, TypeKind::Float { .. }) => {
                def.kind == ex.kind
            }

            (TypeKind::Enum(a), TypeKind::Enum(b)) => {
                a.len() == b.len()
                    && a.iter().zip(b).all(|(ea, eb)| {
                        ea.value == eb.value
                            && self.src.resolve(src_id, ea.name)
                                == chain.resolve(existing, eb.name)
                    })
            }

            (
                TypeKind::Struct {
                    size: sa,
                    members: ma,
                },
                TypeKind::Struct {
                    size: sb,
                    members: mb,
                },
            )
            | (
                TypeKind::Union {
                    size: sa,
                    members: ma,
                },
                TypeKind::Union {
                    size: sb,
                    members: mb,
                },
            ) => {
                sa == sb
                    && ma.len() == mb.len()
                    && ma.iter().zip(mb).all(|(a, b)| {
                        a.offset == b.offset
                            && self.src.resolve(src_id, a.name)
                                == chain.resolve(existing, b.name)
                    })
            }

            _ => false,
        };

        if same {
            Ok(Reconciled::Same)
        } else {
            Err(conflict())
        }
    }

    fn define_named(
        &mut self,
        dst: &mut Dict,
        src_id: TypeId,
        name: &str,
        def: &'s TypeDef,
    ) -> DictResult<TypeId> {
        let atom = dst.intern(name);
        let key = (def.kind.namespace(), atom);

        if let Some(old) = dst.named.get(&key) {
            self.displaced.push((key, *old));
        }

        match &def.kind {
            TypeKind::Struct { size, members }
            | TypeKind::Union { size, members } => {
                // Reserve the aggregate before its members so that
                //   references back to it resolve to the reservation.
                let id = dst.push(TypeDef::new(atom, TypeKind::Forward(key.0)))?;
                self.record(dst, src_id, id);

                let members = self.add_members(dst, src_id, members)?;
                let kind = match def.kind {
                    TypeKind::Struct { .. } => TypeKind::Struct {
                        size: *size,
                        members,
                    },
                    _ => TypeKind::Union {
                        size: *size,
                        members,
                    },
                };

                dst.types[id.index() as usize - 1].kind = kind;

                Ok(id)
            }

            TypeKind::Typedef(r) => {
                let r = self.add(dst, *r)?;
                dst.push(TypeDef::new(atom, TypeKind::Typedef(r)))
            }

            TypeKind::Enum(enumerators) => {
                let enumerators =
                    self.add_enumerators(dst, src_id, enumerators)?;
                dst.push(TypeDef::new(atom, TypeKind::Enum(enumerators)))
            }

            kind => dst.push(TypeDef::new(atom, kind.clone())),
        }
    }

    fn add_unnamed(
        &mut self,
        dst: &mut Dict,
        src_id: TypeId,
        name: Option<&str>,
        def: &'s TypeDef,
    ) -> DictResult<TypeId> {
        let kind = match &def.kind {
            TypeKind::Pointer(r) => TypeKind::Pointer(self.add(dst, *r)?),
            TypeKind::Typedef(r) => TypeKind::Typedef(self.add(dst, *r)?),
            TypeKind::Volatile(r) => TypeKind::Volatile(self.add(dst, *r)?),
            TypeKind::Const(r) => TypeKind::Const(self.add(dst, *r)?),
            TypeKind::Restrict(r) => TypeKind::Restrict(self.add(dst, *r)?),

            TypeKind::Array {
                contents,
                index,
                nelems,
            } => TypeKind::Array {
                contents: self.add(dst, *contents)?,
                index: self.add(dst, *index)?,
                nelems: *nelems,
            },

            TypeKind::Function {
                ret,
                args,
                variadic,
            } => TypeKind::Function {
                ret: self.add(dst, *ret)?,
                args: args
                    .iter()
                    .map(|arg| self.add(dst, *arg))
                    .collect::<DictResult<_>>()?,
                variadic: *variadic,
            },

            TypeKind::Struct { size, members } => TypeKind::Struct {
                size: *size,
                members: self.add_members(dst, src_id, members)?,
            },

            TypeKind::Union { size, members } => TypeKind::Union {
                size: *size,
                members: self.add_members(dst, src_id, members)?,
            },

            TypeKind::Enum(enumerators) => {
                TypeKind::Enum(self.add_enumerators(dst, src_id, enumerators)?)
            }

            kind @ (TypeKind::Integer { .. }
            | TypeKind::Float { .. }
            | TypeKind::Forward(_)) => kind.clone(),

            TypeKind::Unknown => {
                return Err(DictError::NotRepresentable(src_id))
            }
        };

        let key = (name.map(|n| dst.intern(n)).unwrap_or(Atom::EMPTY), kind);

        if let Some(id) = dst.lookup_shape(&key) {
            return Ok(id);
        }

        // Shapes referencing only parent types may already exist in the
        //   parent,
        //     unless they hold atoms,
        //       which are meaningful only within their own dictionary.
        if let Some(parent) = self.parent.filter(|_| dst.is_child()) {
            let mut own_refs = false;
            key.1.each_ref(|r| own_refs |= r.is_child());

            if key.0.is_empty() && !key.1.has_atoms() && !own_refs {
                if let Some(id) = parent.lookup_shape(&key) {
                    return Ok(id);
                }
            }
        }

        dst.push(TypeDef::new(key.0, key.1))
    }

    fn add_members(
        &mut self,
        dst: &mut Dict,
        src_id: TypeId,
        members: &'s [Member],
    ) -> DictResult<Vec<Member>> {
        members
            .iter()
            .map(|m| {
                let ty = self.add(dst, m.ty)?;
                let name = self
                    .src
                    .resolve(src_id, m.name)
                    .ok_or(DictError::Corrupt("dangling member name"))?;

                Ok(Member {
                    name: dst.intern(name),
                    ty,
                    offset: m.offset,
                })
            })
            .collect()
    }

    fn add_enumerators(
        &mut self,
        dst: &mut Dict,
        src_id: TypeId,
        enumerators: &'s [Enumerator],
    ) -> DictResult<Vec<Enumerator>> {
        enumerators
            .iter()
            .map(|e| {
                let name = self
                    .src
                    .resolve(src_id, e.name)
                    .ok_or(DictError::Corrupt("dangling enumerator name"))?;

                Ok(Enumerator {
                    name: dst.intern(name),
                    value: e.value,
                })
            })
            .collect()
    }
}

// Type mapping tables
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

//! Type mapping tables.
//!
//! While linking,
//!   every source type that has been added to an output dictionary is
//!   remembered so that later references to it need not be resolved
//!   again.
//! Each destination dictionary holds its own table,
//!   created lazily on first use and keyed by
//!   ([`DictId`] of the source, source type index).
//!
//! Source ids are normalized before they are used as keys:
//!   a parent type referenced through a child is keyed by the _parent_,
//!     so that the many children of one parent share its entries.
//! Similarly,
//!   a mapping to a parent type of the destination is stored in the
//!   destination parent's table,
//!     and lookups retry in the destination's parent before giving up.
//!
//! Tables are emptied between linker inputs using [`clear`];
//!   their allocations are retained for the next input.

use crate::dict::{Chain, Dict, DictId, TypeId};
use fxhash::FxHashMap;
use std::collections::TryReserveError;

/// Key identifying a source type independently of any child through which
///   it may have been reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MappingKey {
    pub dict: DictId,
    pub index: u32,
}

/// Mapping of source types to indexes of types owned by a destination.
#[derive(Debug, Default)]
pub struct TypeMap {
    map: FxHashMap<MappingKey, u32>,
    /// Fail every insertion as if memory were exhausted.
    #[cfg(test)]
    exhausted: bool,
}

impl TypeMap {
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear()
    }

    /// Forget every mapping to a type with an index greater than `limit`.
    ///
    /// This is used when types are rolled back after a failed addition.
    pub fn forget_after(&mut self, limit: u32) {
        self.map.retain(|_, index| *index <= limit)
    }

    fn get(&self, key: &MappingKey) -> Option<u32> {
        self.map.get(key).copied()
    }

    fn insert(
        &mut self,
        key: MappingKey,
        index: u32,
    ) -> Result<(), TryReserveError> {
        #[cfg(test)]
        if self.exhausted {
            return Err(test::reserve_error());
        }

        self.map.try_reserve(1)?;
        self.map.insert(key, index);

        Ok(())
    }
}

#[cfg(test)]
impl TypeMap {
    /// A table that can never grow.
    pub(crate) fn exhausted() -> Self {
        Self {
            exhausted: true,
            ..Default::default()
        }
    }
}

/// Where a mapping was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// The table of the destination itself.
    Target,
    /// The table of the destination's parent.
    Parent,
}

/// Normalize `id` of `chain` into a key that is independent of the child
///   through which it was reached.
///
/// If the owner of `id` is not available,
///   the key is formed against the dictionary of `chain`.
pub fn normalize(chain: Chain<'_>, id: TypeId) -> MappingKey {
    let owner = chain.owner(id).unwrap_or(chain.dict());

    MappingKey {
        dict: owner.id(),
        index: id.index(),
    }
}

/// Remember that `src_id` of `src` was added to `dst` as `dst_id`.
///
/// The mapping is stored in the table of whichever dictionary of `dst`
///   owns `dst_id`.
/// Failure to grow the table is not fatal;
///   the type will merely be resolved again if it is encountered later.
pub fn record(
    src: Chain<'_>,
    src_id: TypeId,
    dst: Chain<'_>,
    dst_id: TypeId,
) -> Result<(), TryReserveError> {
    if src_id.is_none() || dst_id.is_none() {
        return Ok(());
    }

    let owner = dst.owner(dst_id).unwrap_or(dst.dict());
    let key = normalize(src, src_id);

    owner
        .type_map()
        .borrow_mut()
        .get_or_insert_with(TypeMap::default)
        .insert(key, dst_id.index())
}

/// Look up the type of `dst` previously recorded for `src_id` of `src`.
///
/// The table of `dst` is consulted first,
///   followed by that of its parent.
pub fn lookup(
    src: Chain<'_>,
    src_id: TypeId,
    dst: Chain<'_>,
) -> Option<(TypeId, Origin)> {
    if src_id.is_none() {
        return None;
    }

    let key = normalize(src, src_id);

    let found = |dict: &Dict| {
        dict.type_map()
            .borrow()
            .as_ref()
            .and_then(|map| map.get(&key))
            .map(|index| TypeId::from_index(index, dict.is_child()))
    };

    found(dst.dict())
        .map(|id| (id, Origin::Target))
        .or_else(|| dst.parent().and_then(found).map(|id| (id, Origin::Parent)))
}

/// Empty the mapping table of `dict`,
///   if it has one.
pub fn clear(dict: &Dict) {
    if let Some(map) = dict.type_map().borrow_mut().as_mut() {
        map.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dict::TypeKind;

    /// A genuine reservation failure.
    pub(super) fn reserve_error() -> TryReserveError {
        match Vec::<u8>::new().try_reserve(usize::MAX) {
            Err(e) => e,
            Ok(()) => unreachable!("reserved usize::MAX bytes"),
        }
    }

    fn int(dict: &mut Dict) -> TypeId {
        dict.define(Some("int"), TypeKind::Integer { bits: 32, signed: true })
            .unwrap()
    }

    #[test]
    fn record_then_lookup() {
        let mut src = Dict::new();
        let mut dst = Dict::new();

        let s = int(&mut src);
        let d = int(&mut dst);

        let src_chain = Chain::standalone(&src);
        let dst_chain = Chain::standalone(&dst);

        assert_eq!(None, lookup(src_chain, s, dst_chain));

        record(src_chain, s, dst_chain, d).unwrap();

        assert_eq!(Some((d, Origin::Target)), lookup(src_chain, s, dst_chain));
    }

    #[test]
    fn exhausted_table_records_nothing() {
        let mut src = Dict::new();
        let mut dst = Dict::new();

        let s = int(&mut src);
        let d = int(&mut dst);
        *dst.type_map().borrow_mut() = Some(TypeMap::exhausted());

        let src_chain = Chain::standalone(&src);
        let dst_chain = Chain::standalone(&dst);

        assert!(record(src_chain, s, dst_chain, d).is_err());
        assert_eq!(None, lookup(src_chain, s, dst_chain));
    }

    #[test]
    fn parent_mappings_are_shared_by_children() {
        let mut src = Dict::new();
        let s = int(&mut src);

        let mut parent = Dict::new();
        let p = int(&mut parent);

        let mut a = Dict::new();
        a.import(&parent).unwrap();
        let mut b = Dict::new();
        b.import(&parent).unwrap();

        let src_chain = Chain::standalone(&src);

        // Recorded through one child into the parent...
        record(src_chain, s, Chain::new(&a, Some(&parent)), p).unwrap();

        // ...and visible through another.
        assert_eq!(
            Some((p, Origin::Parent)),
            lookup(src_chain, s, Chain::new(&b, Some(&parent)))
        );
        assert!(a.type_map().borrow().is_none());
    }

    #[test]
    fn source_parent_types_normalize_to_parent() {
        let mut parent = Dict::new();
        let p = int(&mut parent);

        let mut a = Dict::new();
        a.import(&parent).unwrap();
        let mut b = Dict::new();
        b.import(&parent).unwrap();

        let key_a = normalize(Chain::new(&a, Some(&parent)), p);
        let key_b = normalize(Chain::new(&b, Some(&parent)), p);

        assert_eq!(key_a, key_b);
        assert_eq!(parent.id(), key_a.dict);
    }

    #[test]
    fn clear_retains_table() {
        let mut src = Dict::new();
        let mut dst = Dict::new();
        let s = int(&mut src);
        let d = int(&mut dst);

        record(Chain::standalone(&src), s, Chain::standalone(&dst), d)
            .unwrap();
        clear(&dst);

        assert_eq!(
            None,
            lookup(Chain::standalone(&src), s, Chain::standalone(&dst))
        );
        assert!(dst.type_map().borrow().as_ref().unwrap().is_empty());
    }

    #[test]
    fn forget_after_drops_later_indexes() {
        let mut map = TypeMap::default();
        let dict = Dict::new().id();

        map.insert(MappingKey { dict, index: 1 }, 1).unwrap();
        map.insert(MappingKey { dict, index: 2 }, 5).unwrap();

        map.forget_after(3);

        assert_eq!(1, map.len());
        assert_eq!(Some(1), map.get(&MappingKey { dict, index: 1 }));
    }
}

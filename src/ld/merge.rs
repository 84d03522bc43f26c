// Input merging
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

//! Merging of inputs.
//!
//! _This is a private module.
//!  See [`super`] for more information._

use super::{CuOutputs, SkipReason, Skipped, SkippedItem};
use crate::dict::{Chain, Dict, DictError, TypeId};
use crate::global;
use crate::mapping;
use crate::obj::ctfa::{Archive, ArchiveMember};
use std::rc::Rc;

/// Source of the items being merged.
#[derive(Clone, Copy)]
struct Source<'s> {
    input: &'s str,
    /// Archive member name,
    ///   or [`None`] for the default member.
    member: Option<&'s str>,
    /// Compilation unit name.
    cu: &'s str,
    chain: Chain<'s>,
}

/// Link state borrowed from the [`Linker`](super::Linker).
pub(super) struct Merge<'l> {
    pub shared: &'l mut Dict,
    pub outputs: &'l mut CuOutputs,
    pub diagnostics: &'l mut Vec<Skipped>,
}

impl<'l> Merge<'l> {
    /// Merge every member of the input `name`.
    ///
    /// The default member is merged first;
    ///   every other member is merged as a child of it.
    /// Mapping tables are emptied afterward.
    pub fn link_input(&mut self, name: &str, archive: &Archive) {
        let default = match archive.open(None) {
            Ok(member) => Some(member),
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                tracing::warn!(input = name, error = %e, "skipping input");
                self.skip(name, None, SkippedItem::Input, SkipReason::Error, &e);
                return;
            }
        };

        if let Some(member) = &default {
            self.link_member(Source {
                input: name,
                member: None,
                cu: name,
                chain: member.chain(),
            });
        }

        for member in archive.members(true) {
            let member = match member {
                Ok(member) => with_default_parent(member, default.as_ref()),
                Err(e) => {
                    tracing::warn!(input = name, error = %e, "skipping member");
                    self.skip(
                        name,
                        None,
                        SkippedItem::Member,
                        SkipReason::Error,
                        &e,
                    );
                    continue;
                }
            };

            let cu = member
                .name()
                .strip_prefix(global::MEMBER_CU_PREFIX)
                .unwrap_or(member.name());

            self.link_member(Source {
                input: name,
                member: Some(member.name()),
                cu,
                chain: member.chain(),
            });
        }

        mapping::clear(self.shared);
        self.outputs.iter().for_each(|(_, dict)| mapping::clear(dict));
    }

    fn link_member(&mut self, src: Source) {
        for (id, _) in src.chain.dict().types() {
            self.link_type(src, id);
        }

        for (name, ty) in src.chain.dict().variables() {
            self.link_variable(src, name, ty);
        }
    }

    /// Add a type to the shared dictionary,
    ///   or to the CU output of its source if it conflicts.
    fn link_type(&mut self, src: Source, id: TypeId) {
        let err = match self.shared.add_type(None, src.chain, id) {
            Ok(_) => return,
            Err(e) if e.is_conflict() => e,
            Err(e) => return self.skip_type(src, id, e),
        };

        tracing::trace!(
            input = src.input,
            ty = %id,
            error = %err,
            "type conflicts with shared type",
        );

        let shared = &*self.shared;
        let out = match self.outputs.get_or_create(src.input, src.cu, shared) {
            Ok(out) => out,
            Err(e) => return self.skip_type(src, id, e),
        };

        if let Err(e) = out.add_type(Some(shared), src.chain, id) {
            self.skip_type(src, id, e);
        }
    }

    fn skip_type(&mut self, src: Source, id: TypeId, err: DictError) {
        let reason = if err.is_conflict() {
            SkipReason::Conflict
        } else if err.is_not_representable() {
            SkipReason::NotRepresentable
        } else {
            SkipReason::Error
        };

        self.skip(src.input, src.member, SkippedItem::Type(id), reason, &err);
    }

    /// Add a variable to the shared dictionary if its type was shared and
    ///   its name is free,
    ///     or to the CU output of its source otherwise.
    fn link_variable(&mut self, src: Source, name: &str, ty: TypeId) {
        let shared_chain = Chain::standalone(self.shared);

        if let Some((dst_ty, _)) = mapping::lookup(src.chain, ty, shared_chain) {
            match self.shared.variable(name) {
                Some(existing) if existing == dst_ty => return,
                Some(_) => (),
                None => match self.shared.add_variable(name, dst_ty) {
                    Ok(()) => return,
                    Err(e) => tracing::debug!(
                        input = src.input,
                        variable = name,
                        error = %e,
                        "unable to share variable",
                    ),
                },
            }
        }

        let shared = &*self.shared;
        let out = match self.outputs.get_or_create(src.input, src.cu, shared) {
            Ok(out) => out,
            Err(e) => {
                return self.skip(
                    src.input,
                    src.member,
                    SkippedItem::Variable(name.into()),
                    SkipReason::Error,
                    &e,
                )
            }
        };

        // The type may exist only in the CU output.
        let found = mapping::lookup(src.chain, ty, Chain::new(out, Some(shared)));

        let (reason, err) = match found {
            Some((dst_ty, _)) => match out.add_variable(name, dst_ty) {
                Ok(()) => return,
                Err(e) => (SkipReason::Conflict, e),
            },
            None => (SkipReason::UnresolvedType, DictError::BadId(ty)),
        };

        self.skip(
            src.input,
            src.member,
            SkippedItem::Variable(name.into()),
            reason,
            &err,
        );
    }

    fn skip(
        &mut self,
        input: &str,
        member: Option<&str>,
        item: SkippedItem,
        reason: SkipReason,
        err: &dyn std::error::Error,
    ) {
        let skipped = Skipped {
            input: input.into(),
            member: member.map(Into::into),
            item,
            reason,
            message: err.to_string(),
        };

        tracing::debug!("{skipped}");
        self.diagnostics.push(skipped);
    }
}

/// Resolve the parent references of a child member against the very
///   default member that was just merged,
///     so that mappings recorded for it are found.
fn with_default_parent<'ar>(
    member: ArchiveMember<'ar>,
    default: Option<&ArchiveMember>,
) -> ArchiveMember<'ar> {
    let wants_default = member.is_child()
        && member.parent_name().unwrap_or(global::DEFAULT_PARENT_NAME)
            == global::DEFAULT_PARENT_NAME;

    match default {
        Some(default) if wants_default => {
            member.with_parent(Rc::clone(default.dict()))
        }
        _ => member,
    }
}

// Type information linker library
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

//! The [linker][] is responsible for combining the type information of
//!   individually compiled [object files][] into a single deduplicated
//!   [dictionary](crate::dict).
//!
//! Its user-facing binary is [`ctfld`][ctfld].
//!
//! [linker]: https://en.wikipedia.org/wiki/Linker_(computing)
//! [object files]: https://en.wikipedia.org/wiki/Object_file
//! [ctfld]: ../../ctfld
//!
//! Every input is an [`Archive`] registered under a name
//!   (usually its path)
//!   using [`Linker::add_input`].
//! [`Linker::link`] then merges every type and variable of every input,
//!   in the order in which the inputs were added,
//!   into the _shared_ dictionary.
//!
//! Conflicts
//! ---------
//! Compilation units may disagree:
//!   two of them may define `struct foo` differently.
//! The linker must not lose either definition,
//!   and must not give up on the whole link because of it.
//! The first definition encountered is placed into the shared dictionary;
//!   conflicting definitions are placed into a _CU output_,
//!     a child of the shared dictionary named after the input that
//!     provided it
//!       (see [`Linker::add_cu_mapping`] to name it otherwise).
//! Types that cannot be represented at all are dropped,
//!   as are types that conflict even within their CU output.
//! Neither case is an error;
//!   each dropped item is recorded as a [`Skipped`] item,
//!     available from [`Linker::diagnostics`].
//!
//! Output
//! ------
//! If every type was shared,
//!   [`Linker::write`] produces the shared dictionary alone.
//! Otherwise it produces an [archive](crate::obj::ctfa) holding the shared
//!   dictionary as its [default member](crate::global::DEFAULT_MEMBER)
//!   followed by each CU output.
//!
//! ```
//! use ctfld::dict::{Dict, TypeKind};
//! use ctfld::ld::{Linker, ShareMode};
//! use ctfld::obj::ctfa::Archive;
//!
//! let mut a = Dict::new();
//! let int = a
//!     .define(Some("int"), TypeKind::Integer { bits: 32, signed: true })
//!     .unwrap();
//! a.add_variable("counter", int).unwrap();
//!
//! let mut b = Dict::new();
//! b.define(Some("int"), TypeKind::Integer { bits: 16, signed: true })
//!     .unwrap();
//!
//! let mut linker = Linker::new();
//! linker.add_input("a.o", Archive::from_dict(a)).unwrap();
//! linker.add_input("b.o", Archive::from_dict(b)).unwrap();
//! linker.link(ShareMode::Unconflicted).unwrap();
//!
//! // The conflicting `int` of `b.o` was given its own output.
//! assert_eq!(1, linker.shared().type_count());
//! assert_eq!(1, linker.output("b.o").unwrap().type_count());
//! assert!(linker.diagnostics().is_empty());
//!
//! let bytes = linker.write(4096).unwrap();
//! let archive = Archive::open_buffer(&bytes).unwrap();
//! assert_eq!(2, archive.len());
//! ```

mod diag;
mod error;
mod merge;
mod outputs;

pub use diag::{SkipReason, Skipped, SkippedItem};
pub use error::{LinkError, LinkResult};
pub use outputs::CuOutputs;

use crate::dict::Dict;
use crate::global;
use crate::obj::ctfa::{self, Archive};
use fxhash::FxBuildHasher;
use indexmap::IndexMap;
use merge::Merge;
use std::fmt::Display;
use std::io::{Read, Seek, SeekFrom};

/// Policy for distributing conflicting types among outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareMode {
    /// Share every type that does not conflict;
    ///   conflicting types go to CU outputs.
    Unconflicted,
    /// Share only types used by more than one compilation unit.
    ///
    /// This is not supported,
    ///   and [`Linker::link`] will fail if it is requested.
    Duplicated,
}

impl Display for ShareMode {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Unconflicted => write!(fmt, "unconflicted"),
            Self::Duplicated => write!(fmt, "duplicated"),
        }
    }
}

/// Transformation of archive member names applied by [`Linker::write`].
///
/// Returning [`None`] leaves the name unchanged.
pub type NameChanger<'a> = Box<dyn FnMut(&str) -> Option<String> + 'a>;

/// Link target.
///
/// See the [module-level documentation](self) for more information.
pub struct Linker<'a> {
    shared: Dict,
    inputs: IndexMap<String, Archive<'a>, FxBuildHasher>,
    outputs: CuOutputs,
    frozen: bool,
    name_changer: Option<NameChanger<'a>>,
    diagnostics: Vec<Skipped>,
}

impl<'a> Default for Linker<'a> {
    fn default() -> Self {
        Self::with_target(Dict::new())
    }
}

impl<'a> Linker<'a> {
    /// Link into a new shared dictionary of the host data model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Link into `target`,
    ///   which becomes the shared dictionary.
    pub fn with_target(target: Dict) -> Self {
        Self {
            shared: target,
            inputs: Default::default(),
            outputs: Default::default(),
            frozen: false,
            name_changer: None,
            diagnostics: Vec::new(),
        }
    }

    /// Register an input under `name`.
    ///
    /// Inputs are linked in the order in which they are added.
    /// An input added under an existing name replaces the earlier one.
    ///
    /// This fails once [`Linker::link`] has been called.
    pub fn add_input<S: Into<String>>(
        &mut self,
        name: S,
        archive: Archive<'a>,
    ) -> LinkResult<()> {
        if self.frozen {
            return Err(LinkError::Frozen);
        }

        let name = name.into();

        if self.inputs.insert(name.clone(), archive).is_some() {
            tracing::debug!(input = name.as_str(), "replaced input");
        }

        Ok(())
    }

    /// Place the conflicting types of compilation unit `from` into the CU
    ///   output `to` rather than one named after it.
    ///
    /// Many compilation units may share a single output.
    /// The output `to` is created immediately,
    ///   and will be written even if no type is ever placed into it.
    pub fn add_cu_mapping(&mut self, from: &str, to: &str) -> LinkResult<()> {
        self.outputs.add_mapping(from, to, &self.shared)?;
        Ok(())
    }

    /// Rename archive members as they are written.
    ///
    /// See [`NameChanger`].
    pub fn set_member_name_changer<F>(&mut self, changer: F)
    where
        F: FnMut(&str) -> Option<String> + 'a,
    {
        self.name_changer = Some(Box::new(changer));
    }

    /// Merge every input.
    ///
    /// Conflicting and unrepresentable types never cause failure;
    ///   see the [module-level documentation](self).
    /// The only error is an unsupported `mode`,
    ///   in which case nothing is changed.
    ///
    /// Inputs can no longer be added after this is called.
    pub fn link(&mut self, mode: ShareMode) -> LinkResult<()> {
        if mode != ShareMode::Unconflicted {
            return Err(LinkError::UnsupportedShareMode(mode));
        }

        self.frozen = true;

        let Self {
            shared,
            inputs,
            outputs,
            diagnostics,
            ..
        } = self;

        let mut merge = Merge {
            shared,
            outputs,
            diagnostics,
        };

        for (name, archive) in inputs.iter() {
            tracing::debug!(input = name.as_str(), "linking input");
            merge.link_input(name, archive);
        }

        Ok(())
    }

    /// Record strings present in an external string table.
    ///
    /// Each `(string, offset)` pair is added to the shared dictionary and
    ///   every CU output;
    ///     see [`AtomTable::add_external`](crate::dict::AtomTable::add_external).
    pub fn add_strtab<I, S>(&mut self, strings: I) -> LinkResult<()>
    where
        I: IntoIterator<Item = (S, u32)>,
        S: AsRef<str>,
    {
        for (string, offset) in strings {
            let string = string.as_ref();

            self.shared.atoms_mut().add_external(string, offset);

            for (_, dict) in self.outputs.iter_mut() {
                dict.atoms_mut().add_external(string, offset);
            }
        }

        Ok(())
    }

    /// Reserved for ordering symbol-indexed sections by `symbols`.
    ///
    /// This currently does nothing.
    pub fn shuffle_syms<I, S>(&mut self, _symbols: I) -> LinkResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(())
    }

    /// Serialize the result of the link.
    ///
    /// If there are no CU outputs,
    ///   this is the encoded shared dictionary alone.
    /// Otherwise it is an archive of the shared dictionary followed by
    ///   every CU output,
    ///     each named by the [member name changer](Self::set_member_name_changer),
    ///     if any.
    /// If the shared dictionary is renamed,
    ///   the parent name of every CU output is updated to match.
    pub fn write(&mut self, threshold: usize) -> LinkResult<Vec<u8>> {
        if self.outputs.is_empty() {
            return Ok(self.shared.to_bytes(threshold)?);
        }

        let changer = &mut self.name_changer;
        let mut rename = |name: &str| {
            changer
                .as_mut()
                .and_then(|f| f(name))
                .unwrap_or_else(|| name.to_string())
        };

        let default_name = rename(global::DEFAULT_MEMBER);

        if default_name != global::DEFAULT_MEMBER {
            for (_, dict) in self.outputs.iter_mut() {
                dict.set_parent_name(&default_name);
            }
        }

        let mut names = vec![default_name];
        names.extend(self.outputs.iter().map(|(name, _)| rename(name)));

        let dicts = std::iter::once(&self.shared)
            .chain(self.outputs.iter().map(|(_, dict)| dict));

        let members: Vec<(&str, &Dict)> =
            names.iter().map(String::as_str).zip(dicts).collect();

        let mut file = tempfile::tempfile()?;
        ctfa::write_file(&mut file, &members, threshold)?;

        let mut buf = Vec::new();
        file.seek(SeekFrom::Start(0))?;
        file.read_to_end(&mut buf)?;

        Ok(buf)
    }

    /// The shared dictionary.
    pub fn shared(&self) -> &Dict {
        &self.shared
    }

    pub fn outputs(&self) -> &CuOutputs {
        &self.outputs
    }

    /// The CU output named `name`,
    ///   if it exists.
    pub fn output(&self, name: &str) -> Option<&Dict> {
        self.outputs.get(name)
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Whether [`Linker::link`] has been called.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Items skipped while linking.
    pub fn diagnostics(&self) -> &[Skipped] {
        &self.diagnostics
    }
}

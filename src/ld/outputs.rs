// CU output registry
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

//! CU output registry.
//!
//! A _CU output_ is a child of the shared dictionary that receives the
//!   types of one or more compilation units that conflict with those
//!   already shared.
//! Outputs are named after the input that provided their types unless a
//!   [mapping](CuOutputs::add_mapping) says otherwise,
//!     and are kept in order of creation,
//!       which is the order in which they are written.

use crate::dict::{Dict, DictResult};
use crate::global;
use fxhash::{FxBuildHasher, FxHashMap};
use indexmap::map::Entry;
use indexmap::IndexMap;

/// CU outputs by name.
#[derive(Debug, Default)]
pub struct CuOutputs {
    mapping: FxHashMap<String, String>,
    outputs: IndexMap<String, Dict, FxBuildHasher>,
}

impl CuOutputs {
    /// Name of the output for compilation unit `cu_name` of input
    ///   `filename`.
    ///
    /// A mapping of `filename` takes precedence over a mapping of
    ///   `cu_name`;
    ///     absent either,
    ///       the output is named `filename`.
    pub fn translate<'n>(&'n self, filename: &'n str, cu_name: &'n str) -> &'n str {
        self.mapping
            .get(filename)
            .or_else(|| self.mapping.get(cu_name))
            .map(String::as_str)
            .unwrap_or(filename)
    }

    /// Retrieve the output for compilation unit `cu_name` of input
    ///   `filename`,
    ///     creating it as a child of `shared` if it does not yet exist.
    pub fn get_or_create(
        &mut self,
        filename: &str,
        cu_name: &str,
        shared: &Dict,
    ) -> DictResult<&mut Dict> {
        let name = self.translate(filename, cu_name).to_string();

        match self.outputs.entry(name) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let mut dict = Dict::with_model(shared.model());
                dict.import(shared)?;
                dict.set_cu_name(cu_name);
                dict.set_parent_name(global::DEFAULT_PARENT_NAME);

                tracing::debug!(
                    output = entry.key().as_str(),
                    cu = cu_name,
                    "created CU output",
                );

                Ok(entry.insert(dict))
            }
        }
    }

    /// Direct the types of compilation unit `from` to the output `to`,
    ///   creating that output immediately.
    pub fn add_mapping(
        &mut self,
        from: &str,
        to: &str,
        shared: &Dict,
    ) -> DictResult<()> {
        self.mapping.insert(from.into(), to.into());
        self.get_or_create(to, to, shared).map(|_| ())
    }

    pub fn get(&self, name: &str) -> Option<&Dict> {
        self.outputs.get(name)
    }

    /// Outputs in order of creation.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Dict)> {
        self.outputs.iter().map(|(name, dict)| (name.as_str(), dict))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Dict)> {
        self.outputs
            .iter_mut()
            .map(|(name, dict)| (name.as_str(), dict))
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn translate_precedence() {
        let shared = Dict::new();
        let mut sut = CuOutputs::default();

        assert_eq!("a.o", sut.translate("a.o", "a.c"));

        sut.add_mapping("a.c", "CU", &shared).unwrap();
        assert_eq!("CU", sut.translate("a.o", "a.c"));

        sut.add_mapping("a.o", "FILE", &shared).unwrap();
        assert_eq!("FILE", sut.translate("a.o", "a.c"));
    }

    #[test]
    fn mapping_creates_output_eagerly() {
        let shared = Dict::new();
        let mut sut = CuOutputs::default();

        sut.add_mapping("a.c", "GROUP", &shared).unwrap();

        let out = sut.get("GROUP").unwrap();
        assert!(out.is_child());
        assert_eq!(0, out.type_count());
        assert_eq!(Some("GROUP"), out.cu_name());
        assert_eq!(Some(global::DEFAULT_PARENT_NAME), out.parent_name());
    }

    #[test]
    fn get_or_create_reuses() {
        let shared = Dict::new();
        let mut sut = CuOutputs::default();

        let id = sut.get_or_create("a.o", "a.c", &shared).unwrap().id();
        let again = sut.get_or_create("a.o", "b.c", &shared).unwrap().id();

        assert_eq!(id, again);
        assert_eq!(1, sut.len());
        assert_eq!(Some("a.c"), sut.get("a.o").unwrap().cu_name());
    }

    #[test]
    fn iteration_follows_creation() {
        let shared = Dict::new();
        let mut sut = CuOutputs::default();

        for name in ["z.o", "a.o", "m.o"] {
            sut.get_or_create(name, name, &shared).unwrap();
        }

        let names: Vec<_> = sut.iter().map(|(name, _)| name).collect();
        assert_eq!(vec!["z.o", "a.o", "m.o"], names);
    }
}

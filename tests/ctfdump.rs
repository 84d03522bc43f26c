// Archive dumper binary tests
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

use assert_cmd::prelude::*;
use ctfld::dict::{Dict, TypeKind};
use ctfld::obj::ctfa::write_file;
use predicates::prelude::*;
use std::process::Command;

type TestResult = Result<(), Box<dyn std::error::Error>>;

#[test]
fn dump_missing_input() -> TestResult {
    let mut cmd = Command::cargo_bin("ctfdump")?;
    cmd.assert()
        .failure()
        .code(exitcode::USAGE)
        .stderr(predicate::str::contains("FILE"));

    Ok(())
}

#[test]
fn dump_archive() -> TestResult {
    let mut parent = Dict::new();
    let int = parent
        .define(Some("int"), TypeKind::Integer { bits: 32, signed: true })?;
    parent.add_variable("g", int)?;

    let mut child = Dict::with_model(parent.model());
    child.import(&parent)?;
    child.set_parent_name(".ctf");
    child.define(None, TypeKind::Pointer(int))?;

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("out.ctfa");
    let mut file = std::fs::File::create(&path)?;
    write_file(&mut file, &[(".ctf", &parent), ("a.c", &child)], 4096)?;
    drop(file);

    let mut cmd = Command::cargo_bin("ctfdump")?;
    cmd.arg(&path);
    cmd.assert().success().stdout(predicate::str::diff(
        ".ctf: 1 types, 1 variables\na.c: 1 types, 0 variables (parent .ctf)\n",
    ));

    let mut cmd = Command::cargo_bin("ctfdump")?;
    cmd.arg("-t").arg("-m").arg("a.c").arg(&path);
    cmd.assert()
        .success()
        .stdout(predicate::str::starts_with("a.c: 1 types"))
        .stdout(predicate::str::contains("pointer"));

    let mut cmd = Command::cargo_bin("ctfdump")?;
    cmd.arg("-m").arg("missing.c").arg(&path);
    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("missing.c"));

    Ok(())
}

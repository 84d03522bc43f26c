// Linker binary tests
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
use ctfld::dict::{Dict, Namespace, TypeKind};
use ctfld::obj::ctfa::Archive;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use std::process::Command;

type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Write a dictionary holding `struct Foo` of the given `size` along with
///   an `int` variable `g`.
fn write_unit(dir: &Path, name: &str, size: u64) -> PathBuf {
    let mut dict = Dict::new();
    let int = dict
        .define(Some("int"), TypeKind::Integer { bits: 32, signed: true })
        .unwrap();
    let members = vec![dict.member("x", int, 0)];
    dict.define(Some("Foo"), TypeKind::Struct { size, members })
        .unwrap();
    dict.add_variable("g", int).unwrap();

    let path = dir.join(name);
    std::fs::write(&path, dict.to_bytes(4096).unwrap()).unwrap();
    path
}

#[test]
fn link_invalid_argument() -> TestResult {
    let mut cmd = Command::cargo_bin("ctfld")?;
    cmd.arg("-q");
    cmd.assert()
        .failure()
        .code(exitcode::USAGE)
        .stderr(predicate::str::contains("Unrecognized option:"));

    Ok(())
}

#[test]
fn link_missing_input_file() -> TestResult {
    let mut cmd = Command::cargo_bin("ctfld")?;
    cmd.assert()
        .failure()
        .code(exitcode::USAGE)
        .stderr(predicate::str::contains("FILE"));

    Ok(())
}

#[test]
fn link_missing_output_file() -> TestResult {
    let mut cmd = Command::cargo_bin("ctfld")?;
    cmd.arg("foobar");
    cmd.assert()
        .failure()
        .code(exitcode::USAGE)
        .stderr(predicate::str::contains("-o OUTPUT"));

    Ok(())
}

#[test]
fn link_input_file_does_not_exist() -> TestResult {
    let dir = tempfile::tempdir()?;

    let mut cmd = Command::cargo_bin("ctfld")?;
    cmd.arg(dir.path().join("foobar"));
    cmd.arg("-o").arg(dir.path().join("out.ctfa"));
    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("No such file or directory"));

    Ok(())
}

#[test]
fn link_skips_unrecognized_input_file() -> TestResult {
    let dir = tempfile::tempdir()?;
    let good = write_unit(dir.path(), "good.o", 4);
    let bad = dir.path().join("garbage.o");
    std::fs::write(&bad, b"this is not type information")?;
    let output = dir.path().join("out.ctf");

    let mut cmd = Command::cargo_bin("ctfld")?;
    cmd.arg(&good).arg(&bad).arg("-o").arg(&output);
    cmd.assert()
        .success()
        .stderr(predicate::str::contains("garbage.o"))
        .stderr(predicate::str::contains("will be discarded"));

    let archive = Archive::open_file(&output)?;
    assert!(!archive.is_archive());
    assert_eq!(2, archive.open(None)?.type_count());

    Ok(())
}

#[test]
fn link_only_unrecognized_input_writes_empty_dict() -> TestResult {
    let dir = tempfile::tempdir()?;
    let bad = dir.path().join("garbage.o");
    std::fs::write(&bad, b"garbage")?;
    let output = dir.path().join("out.ctf");

    let mut cmd = Command::cargo_bin("ctfld")?;
    cmd.arg(&bad).arg("-o").arg(&output);
    cmd.assert().success();

    let archive = Archive::open_file(&output)?;
    assert_eq!(0, archive.open(None)?.type_count());

    Ok(())
}

#[test]
fn link_agreeing_inputs_to_dict() -> TestResult {
    let dir = tempfile::tempdir()?;
    let a = write_unit(dir.path(), "a.o", 4);
    let b = write_unit(dir.path(), "b.o", 4);
    let output = dir.path().join("out.ctf");

    let mut cmd = Command::cargo_bin("ctfld")?;
    cmd.arg(&a).arg(&b).arg("-o").arg(&output);
    cmd.assert().success();

    let archive = Archive::open_file(&output)?;
    assert!(!archive.is_archive());
    assert_eq!(2, archive.open(None)?.type_count());

    Ok(())
}

#[test]
fn link_conflicting_inputs_to_archive() -> TestResult {
    let dir = tempfile::tempdir()?;
    let a = write_unit(dir.path(), "a.o", 4);
    let b = write_unit(dir.path(), "b.o", 8);
    let output = dir.path().join("out.ctfa");

    let mut cmd = Command::cargo_bin("ctfld")?;
    cmd.arg(&a).arg(&b).arg("-o").arg(&output);
    cmd.assert().success();

    let archive = Archive::open_file(&output)?;
    assert!(archive.is_archive());
    assert_eq!(2, archive.len());

    let b_name = b.to_string_lossy();
    let member = archive.open(Some(b_name.as_ref()))?;
    assert_eq!(1, member.type_count());
    assert!(member.lookup(Namespace::Struct, "Foo").is_some());
    assert!(member.parent().is_some());

    Ok(())
}

#[test]
fn link_repeated_input_once() -> TestResult {
    let dir = tempfile::tempdir()?;
    let a = write_unit(dir.path(), "a.o", 4);
    let output = dir.path().join("out.ctf");

    let mut cmd = Command::cargo_bin("ctfld")?;
    cmd.arg(&a).arg(&a).arg("-o").arg(&output).arg("-vv");
    cmd.assert()
        .success()
        .stderr(predicate::str::contains("skipping repeated input"));

    Ok(())
}

#[test]
fn link_cu_map_and_default_name() -> TestResult {
    let dir = tempfile::tempdir()?;
    let a = write_unit(dir.path(), "a.o", 4);
    let b = write_unit(dir.path(), "b.o", 8);
    let output = dir.path().join("out.ctfa");

    let mut cmd = Command::cargo_bin("ctfld")?;
    cmd.arg(&a).arg(&b).arg("-o").arg(&output);
    cmd.arg("--cu-map").arg(format!("{}=GROUP", b.display()));
    cmd.arg("--default-name").arg("shared");
    cmd.arg("--compress-threshold").arg("0");
    cmd.assert().success();

    let archive = Archive::open_file(&output)?;
    assert_eq!(vec!["GROUP", "shared"], archive.names()?);

    let group = archive.open(Some("GROUP"))?;
    assert_eq!(Some("shared"), group.parent_name());
    assert_eq!(1, group.type_count());

    Ok(())
}

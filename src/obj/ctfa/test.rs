// Archive tests
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

use super::*;
use crate::dict::{Chain, DataModel, Dict, Namespace, TypeId, TypeKind};
use crate::global::{DEFAULT_COMPRESS_THRESHOLD, DEFAULT_MEMBER};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::ops::ControlFlow;

fn int(dict: &mut Dict) -> TypeId {
    dict.define(Some("int"), TypeKind::Integer { bits: 32, signed: true })
        .unwrap()
}

/// Dictionary holding `n` distinct named integers.
fn dict_of(n: u32) -> Dict {
    let mut dict = Dict::new();

    for bits in 1..=n {
        dict.define(
            Some(&format!("i{bits}")),
            TypeKind::Integer { bits, signed: false },
        )
        .unwrap();
    }

    dict
}

fn write(members: &[(&str, &Dict)]) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    write_to(&mut out, members, DEFAULT_COMPRESS_THRESHOLD).unwrap();
    out.into_inner()
}

#[test]
fn members_round_trip() {
    let (a, b, c) = (dict_of(1), dict_of(2), dict_of(3));
    let bytes = write(&[(DEFAULT_MEMBER, &a), ("b.c", &b), ("a.c", &c)]);

    let sut = Archive::open_buffer(&bytes).unwrap();

    assert!(sut.is_archive());
    assert_eq!(3, sut.len());
    assert_eq!(vec![DEFAULT_MEMBER, "a.c", "b.c"], sut.names().unwrap());

    assert_eq!(1, sut.open(None).unwrap().type_count());
    assert_eq!(2, sut.open(Some("b.c")).unwrap().type_count());
    assert_eq!(3, sut.open(Some("a.c")).unwrap().type_count());

    let member = sut.open(Some("a.c")).unwrap();
    assert_eq!("a.c", member.name());
    assert!(std::ptr::eq(&sut, member.archive()));
}

#[test]
fn empty_archive() {
    let bytes = write(&[]);
    let sut = Archive::open_buffer(&bytes).unwrap();

    assert!(sut.is_archive());
    assert!(sut.is_empty());
    assert_eq!(None, sut.model());
    assert!(sut.open(None).unwrap_err().is_not_found());
    assert_eq!(0, sut.members(false).count());
}

#[test]
fn open_missing_member() {
    let a = dict_of(1);
    let bytes = write(&[(DEFAULT_MEMBER, &a), ("m.c", &a)]);
    let sut = Archive::open_buffer(&bytes).unwrap();

    for name in ["", "a.c", "m", "m.cc", "z.c"] {
        match sut.open(Some(name)) {
            Err(ArchiveError::NotFound(missing)) => assert_eq!(name, missing),
            other => panic!("expected NotFound for {name:?}, got {other:?}"),
        }
    }
}

#[test]
fn binary_search_many_members() {
    let dict = dict_of(1);
    let names: Vec<String> = (0..50).map(|i| format!("cu{i:03}.c")).collect();
    let members: Vec<(&str, &Dict)> =
        names.iter().rev().map(|name| (name.as_str(), &dict)).collect();

    let bytes = write(&members);
    let sut = Archive::open_buffer(&bytes).unwrap();

    for name in &names {
        assert_eq!(name, sut.open(Some(name)).unwrap().name());
    }
}

#[test]
fn single_dict_as_archive() {
    let bytes = dict_of(2).to_bytes(DEFAULT_COMPRESS_THRESHOLD).unwrap();
    let sut = Archive::open_buffer(&bytes).unwrap();

    assert!(!sut.is_archive());
    assert_eq!(1, sut.len());
    assert_eq!(vec![DEFAULT_MEMBER], sut.names().unwrap());
    assert_eq!(2, sut.open(None).unwrap().type_count());
    assert_eq!(2, sut.open(Some(DEFAULT_MEMBER)).unwrap().type_count());
    assert!(sut.open(Some("a.c")).unwrap_err().is_not_found());
}

#[test]
fn skip_default_member() {
    let a = dict_of(1);
    let bytes = write(&[(DEFAULT_MEMBER, &a), ("x.c", &a), ("y.c", &a)]);
    let sut = Archive::open_buffer(&bytes).unwrap();

    let names = |skip| {
        sut.members(skip)
            .map(|member| member.unwrap().name())
            .collect::<Vec<_>>()
    };

    assert_eq!(vec![DEFAULT_MEMBER, "x.c", "y.c"], names(false));
    assert_eq!(vec!["x.c", "y.c"], names(true));
}

#[test]
fn skip_default_single_dict() {
    let sut = Archive::from_dict(dict_of(1));

    assert_eq!(1, sut.members(false).count());
    assert_eq!(0, sut.members(true).count());
}

#[test]
fn cursor_resumes() {
    let a = dict_of(1);
    let bytes = write(&[(DEFAULT_MEMBER, &a), ("x.c", &a)]);
    let sut = Archive::open_buffer(&bytes).unwrap();

    let mut cursor = ArchiveCursor::default();

    let first = sut.next(&mut cursor, false).unwrap().unwrap();
    assert_eq!(DEFAULT_MEMBER, first.name());

    let saved = cursor;

    let second = sut.next(&mut cursor, false).unwrap().unwrap();
    assert_eq!("x.c", second.name());
    assert!(sut.next(&mut cursor, false).unwrap().is_none());
    assert!(sut.next(&mut cursor, false).unwrap().is_none());

    let mut cursor = saved;
    let again = sut.next(&mut cursor, false).unwrap().unwrap();
    assert_eq!("x.c", again.name());
}

#[test]
fn iter_stops_on_break() {
    let bytes = write(&[
        (DEFAULT_MEMBER, &dict_of(1)),
        ("a.c", &dict_of(2)),
        ("b.c", &dict_of(3)),
    ]);
    let sut = Archive::open_buffer(&bytes).unwrap();

    let mut seen = Vec::new();
    let found = sut
        .iter(|member| {
            seen.push(member.name().to_string());

            match member.name() {
                "a.c" => ControlFlow::Break(member.type_count()),
                _ => ControlFlow::Continue(()),
            }
        })
        .unwrap();

    assert_eq!(Some(2), found);
    assert_eq!(vec![DEFAULT_MEMBER, "a.c"], seen);

    let all = sut.iter(|_| ControlFlow::<()>::Continue(())).unwrap();
    assert_eq!(None, all);
}

#[test]
fn child_member_has_parent() {
    let mut parent = Dict::new();
    let int = int(&mut parent);

    let mut child = Dict::with_model(parent.model());
    child.import(&parent).unwrap();
    let members = vec![child.member("x", int, 0)];
    let s = child
        .define(Some("s"), TypeKind::Struct { size: 4, members })
        .unwrap();

    let bytes = write(&[(DEFAULT_MEMBER, &parent), ("x.c", &child)]);
    let sut = Archive::open_buffer(&bytes).unwrap();

    let member = sut.open(Some("x.c")).unwrap();
    assert!(member.is_child());
    assert_eq!(1, member.parent().unwrap().type_count());

    let chain = member.chain();
    assert_eq!(Some("int"), chain.name(int));
    assert_eq!(Some(4), chain.size(s));

    // The parent is decoded once and shared.
    let again = sut.open(Some("x.c")).unwrap();
    assert!(std::ptr::eq(member.parent().unwrap(), again.parent().unwrap()));
}

#[test]
fn child_without_parent_member() {
    let mut parent = Dict::new();
    int(&mut parent);

    let mut child = Dict::with_model(parent.model());
    child.import(&parent).unwrap();
    child.set_parent_name("elsewhere");

    let bytes = write(&[("x.c", &child)]);
    let sut = Archive::open_buffer(&bytes).unwrap();

    let member = sut.open(Some("x.c")).unwrap();
    assert!(member.is_child());
    assert!(member.parent().is_none());
}

#[test]
fn with_parent_overrides() {
    let mut parent = Dict::new();
    let int = int(&mut parent);

    let mut child = Dict::with_model(parent.model());
    child.import(&parent).unwrap();

    let sut = Archive::from_dict(child);
    let member = sut
        .open(None)
        .unwrap()
        .with_parent(std::rc::Rc::new(parent));

    assert_eq!(Some("int"), member.chain().name(int));
    assert_eq!(
        Some(int),
        Chain::new(&member, member.parent()).lookup(Namespace::Ordinary, "int")
    );
}

#[test]
fn model_recorded_in_header() {
    let a = Dict::with_model(DataModel::Ilp32);
    let bytes = write(&[(DEFAULT_MEMBER, &a)]);
    let sut = Archive::open_buffer(&bytes).unwrap();

    assert_eq!(Some(DataModel::Ilp32), sut.model());
    assert_eq!(DataModel::Ilp32, sut.open(None).unwrap().model());
}

#[test]
fn compressed_members_round_trip() {
    let big = dict_of(200);
    let mut out = Cursor::new(Vec::new());
    write_to(&mut out, &[(DEFAULT_MEMBER, &big)], 16).unwrap();

    let bytes = out.into_inner();
    let sut = Archive::open_buffer(&bytes).unwrap();

    assert_eq!(200, sut.open(None).unwrap().type_count());
}

#[test]
fn members_aligned() {
    let (a, b) = (dict_of(1), dict_of(5));
    let bytes = write(&[("a", &a), ("b", &b)]);

    let header = header::Header::read(&bytes).unwrap();
    assert_eq!(0, header.members_offset % 8);
    assert_eq!(0, header.names_offset % 8);

    for i in 0..2 {
        let ent = header::ModEnt::read(&bytes, i).unwrap();
        assert_eq!(0, ent.member_offset % 8);
    }

    // Names follow the members in the order given.
    let names = &bytes[header.names_offset as usize..];
    assert_eq!(b"a\0b\0", names);
}

#[test]
fn unrecognized_data() {
    let cases: [&[u8]; 3] = [b"", b"garbage", &[0; 64]];

    for bytes in cases {
        assert!(matches!(
            Archive::open_buffer(bytes),
            Err(ArchiveError::Unrecognized)
        ));
    }
}

#[test]
fn truncated_index() {
    let a = dict_of(1);
    let bytes = write(&[(DEFAULT_MEMBER, &a), ("b.c", &a)]);

    assert!(matches!(
        Archive::open_buffer(&bytes[..header::HEADER_LEN]),
        Err(ArchiveError::Corrupt(_))
    ));
}

#[test]
fn corrupt_member_reported_on_open() {
    let a = dict_of(1);
    let mut bytes = write(&[(DEFAULT_MEMBER, &a)]);

    // First byte of the member's payload,
    //   following its size.
    let at = header::region_len(1) + 8;
    bytes[at] ^= 0xff;

    let sut = Archive::open_buffer(&bytes).unwrap();
    assert!(matches!(sut.open(None), Err(ArchiveError::Dict(_))));
}

#[test]
fn nul_in_name_rejected() {
    let a = dict_of(1);
    let mut out = Cursor::new(Vec::new());

    match write_to(&mut out, &[("a\0b", &a)], DEFAULT_COMPRESS_THRESHOLD) {
        Err(ArchiveError::BadName(name)) => assert_eq!("a\0b", name),
        other => panic!("expected BadName, got {other:?}"),
    }

    assert!(out.into_inner().is_empty());
}

#[test]
fn duplicate_name_rejected() {
    let (a, b) = (dict_of(1), dict_of(2));
    let mut out = Cursor::new(Vec::new());

    match write_to(
        &mut out,
        &[(DEFAULT_MEMBER, &a), ("b.c", &b), (DEFAULT_MEMBER, &b)],
        DEFAULT_COMPRESS_THRESHOLD,
    ) {
        Err(ArchiveError::BadName(name)) => assert_eq!(DEFAULT_MEMBER, name),
        other => panic!("expected BadName, got {other:?}"),
    }

    assert!(out.into_inner().is_empty());
}

#[test]
fn write_file_matches_write_to() {
    let (a, b) = (dict_of(3), dict_of(4));
    let members = [(DEFAULT_MEMBER, &a), ("b.c", &b)];
    let expected = write(&members);

    let mut file = tempfile::tempfile().unwrap();

    // Stale contents must not survive.
    file.write_all(&[0xaa; 4096]).unwrap();

    write_file(&mut file, &members, DEFAULT_COMPRESS_THRESHOLD).unwrap();

    let mut given = Vec::new();
    file.seek(SeekFrom::Start(0)).unwrap();
    file.read_to_end(&mut given).unwrap();

    assert_eq!(expected, given);
}

#[test]
fn open_file_archive_and_dict() {
    let a = dict_of(2);
    let dir = tempfile::tempdir().unwrap();

    let archive_path = dir.path().join("out.ctfa");
    std::fs::write(&archive_path, write(&[(DEFAULT_MEMBER, &a)])).unwrap();

    let dict_path = dir.path().join("out.ctf");
    std::fs::write(&dict_path, a.to_bytes(DEFAULT_COMPRESS_THRESHOLD).unwrap())
        .unwrap();

    let sut = Archive::open_file(&archive_path).unwrap();
    assert!(sut.is_archive());
    assert_eq!(2, sut.open(None).unwrap().type_count());

    let sut = Archive::open_file(&dict_path).unwrap();
    assert!(!sut.is_archive());
    assert_eq!(2, sut.open(None).unwrap().type_count());

    let missing = Archive::open_file(dir.path().join("missing")).unwrap_err();
    assert!(matches!(missing, ArchiveError::Io(_)));
    assert!(missing.raw_os_error().is_some());
}

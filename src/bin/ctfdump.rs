// Type information archive dumper
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

//! Summarize the members of a type archive or dictionary.
//!
//! Each member is printed on its own line along with the number of types
//!   and variables it holds and the name of its parent,
//!     if it is a child.
//! This is primarily intended to inspect the output of
//!   [`ctfld`](../ctfld).

extern crate ctfld;

use ctfld::obj::ctfa::{Archive, ArchiveError, ArchiveMember};
use getopts::{Fail, Options};
use std::{
    env,
    io::{self, BufWriter, Write},
};

/// Types of commands
#[derive(Debug, PartialEq)]
enum Command {
    Dump {
        input: String,
        member: Option<String>,
        types: bool,
    },
    Usage,
}

fn dump_member<W: Write>(
    out: &mut W,
    member: &ArchiveMember,
    types: bool,
) -> io::Result<()> {
    write!(
        out,
        "{}: {} types, {} variables",
        member.name(),
        member.type_count(),
        member.variable_count(),
    )?;

    match member.parent_name() {
        Some(parent) if member.is_child() => writeln!(out, " (parent {parent})")?,
        _ => writeln!(out)?,
    }

    if !types {
        return Ok(());
    }

    let chain = member.chain();

    for (id, def) in member.types() {
        let name = chain.name(id).unwrap_or("");
        writeln!(out, "  {id} {} {name}", def.kind.kind_name())?;
    }

    for (name, ty) in member.variables() {
        writeln!(out, "  var {name}: {ty}")?;
    }

    Ok(())
}

fn dump<W: Write>(
    out: &mut W,
    archive: &Archive,
    member: Option<&str>,
    types: bool,
) -> Result<(), ArchiveError> {
    match member {
        Some(name) => dump_member(out, &archive.open(Some(name))?, types)?,
        None => {
            for member in archive.members(false) {
                dump_member(out, &member?, types)?;
            }
        }
    }

    out.flush()?;
    Ok(())
}

pub fn main() {
    let args: Vec<String> = env::args().collect();
    let program = &args[0];
    let opts = get_opts();
    let usage = opts.usage(&format!("Usage: {} [OPTIONS] FILE", program));

    match parse_options(opts, args) {
        Ok(Command::Dump {
            input,
            member,
            types,
        }) => {
            let result = Archive::open_file(&input).and_then(|archive| {
                let stdout = io::stdout();
                let mut out = BufWriter::new(stdout.lock());

                dump(&mut out, &archive, member.as_deref(), types)
            });

            if let Err(e) = result {
                eprintln!("fatal: {input}: {e}");
                std::process::exit(1);
            }
        }
        Ok(Command::Usage) => {
            println!("{}", usage);
            std::process::exit(exitcode::OK);
        }
        Err(e) => {
            eprintln!("{}", e);
            println!("{}", usage);
            std::process::exit(exitcode::USAGE);
        }
    }
}

/// Get 'Options'
fn get_opts() -> Options {
    let mut opts = Options::new();
    opts.optopt("m", "member", "dump only member NAME", "NAME");
    opts.optflag("t", "types", "list types and variables");
    opts.optflag("h", "help", "print this help menu");

    opts
}

/// Option parser
fn parse_options(opts: Options, args: Vec<String>) -> Result<Command, Fail> {
    let matches = opts.parse(&args[1..])?;

    if matches.opt_present("h") {
        return Ok(Command::Usage);
    }

    let input = match matches.free.len() {
        0 => return Err(Fail::OptionMissing(String::from("FILE"))),
        1 => matches.free[0].clone(),
        _ => return Err(Fail::UnrecognizedOption(matches.free[1].clone())),
    };

    Ok(Command::Dump {
        input,
        member: matches.opt_str("m"),
        types: matches.opt_present("t"),
    })
}

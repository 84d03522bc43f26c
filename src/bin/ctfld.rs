// Type information linker
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

//! This is the type information linker,
//!   so named after the traditional `ld` Unix utility.
//! Its job is to combine the type dictionaries of each compiled object
//!   file into a single deduplicated dictionary or archive.
//!
//! For more information about the linker,
//!   see the [`ctfld::ld`] module.

extern crate ctfld;

use ctfld::{
    fs::{
        Filesystem, FsCanonicalizer, MappedFile, PathFile, VisitOnceFile,
        VisitOnceFilesystem,
    },
    global,
    ld::{LinkError, Linker, ShareMode},
    obj::ctfa::Archive,
};
use fxhash::FxBuildHasher;
use getopts::{Fail, Options};
use std::{env, error::Error, fmt::Display, fs, io};
use tracing::Level;

/// Types of commands
#[derive(Debug)]
enum Command {
    Link(LinkOptions),
    Usage,
}

/// Options of a link.
#[derive(Debug, Default, PartialEq)]
struct LinkOptions {
    inputs: Vec<String>,
    output: String,
    cu_map: Vec<(String, String)>,
    default_name: Option<String>,
    threshold: usize,
    verbosity: usize,
}

/// Link each input into `opts.output`,
///   returning the number of skipped items.
///
/// An input that is neither an archive nor a dictionary is skipped with a
///   warning rather than failing the link.
fn link(opts: &LinkOptions) -> Result<usize, CtfldError> {
    let mut fs: VisitOnceFilesystem<FsCanonicalizer, FxBuildHasher> =
        VisitOnceFilesystem::new();
    let mut linker = Linker::new();

    for (from, to) in &opts.cu_map {
        linker.add_cu_mapping(from, to)?;
    }

    let mut rejected = 0;

    for input in &opts.inputs {
        let file: VisitOnceFile<PathFile<MappedFile>> = fs.open(input)?;

        match file {
            VisitOnceFile::FirstVisit(PathFile(_, file)) => {
                match Archive::from_file(file) {
                    Ok(archive) => {
                        linker.add_input(input.as_str(), archive)?;
                    }
                    Err(e) => {
                        tracing::warn!(
                            "{input}: {e}; its types will be discarded"
                        );
                        rejected += 1;
                    }
                }
            }
            VisitOnceFile::Visited => {
                tracing::debug!(input = input.as_str(), "skipping repeated input");
            }
        }
    }

    if let Some(name) = opts.default_name.clone() {
        linker.set_member_name_changer(move |member| {
            (member == global::DEFAULT_MEMBER).then(|| name.clone())
        });
    }

    linker.link(ShareMode::Unconflicted)?;

    for skipped in linker.diagnostics() {
        tracing::warn!("{skipped}");
    }

    let bytes = linker.write(opts.threshold)?;
    fs::write(&opts.output, bytes)?;

    tracing::info!(
        output = opts.output.as_str(),
        shared = linker.shared().type_count(),
        outputs = linker.outputs().len(),
        "link complete",
    );

    Ok(linker.diagnostics().len() + rejected)
}

/// Log to standard error at a level determined by the number of `-v`
///   flags.
fn init_tracing(verbosity: usize) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

/// Entrypoint for the linker
pub fn main() {
    let args: Vec<String> = env::args().collect();
    let program = &args[0];
    let opts = get_opts();
    let usage =
        opts.usage(&format!("Usage: {} [OPTIONS] -o OUTPUT FILE...", program));

    match parse_options(opts, args) {
        Ok(Command::Link(opts)) => {
            init_tracing(opts.verbosity);

            match link(&opts) {
                Ok(_) => std::process::exit(exitcode::OK),
                Err(e) => {
                    eprintln!("fatal: {e}");
                    std::process::exit(1);
                }
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
    opts.optopt("o", "output", "set output file name", "OUTPUT");
    opts.optmulti(
        "",
        "cu-map",
        "place conflicting types of CU FROM into output TO",
        "FROM=TO",
    );
    opts.optopt(
        "",
        "default-name",
        "name the shared archive member NAME",
        "NAME",
    );
    opts.optopt(
        "",
        "compress-threshold",
        "compress dictionaries larger than BYTES",
        "BYTES",
    );
    opts.optflagmulti("v", "verbose", "increase log verbosity");
    opts.optflag("h", "help", "print this help menu");

    opts
}

/// Option parser
fn parse_options(opts: Options, args: Vec<String>) -> Result<Command, Fail> {
    let matches = opts.parse(&args[1..])?;

    if matches.opt_present("h") {
        return Ok(Command::Usage);
    }

    if matches.free.is_empty() {
        return Err(Fail::OptionMissing(String::from("FILE")));
    }

    let output = match matches.opt_str("o") {
        Some(m) => m,
        None => return Err(Fail::OptionMissing(String::from("-o OUTPUT"))),
    };

    let cu_map = matches
        .opt_strs("cu-map")
        .into_iter()
        .map(|map| match map.split_once('=') {
            Some((from, to)) if !from.is_empty() && !to.is_empty() => {
                Ok((from.to_string(), to.to_string()))
            }
            _ => Err(Fail::UnrecognizedOption(format!("--cu-map {map}"))),
        })
        .collect::<Result<_, _>>()?;

    let threshold = match matches.opt_str("compress-threshold") {
        Some(bytes) => bytes.parse().map_err(|_| {
            Fail::ArgumentMissing(String::from("--compress-threshold BYTES"))
        })?,
        None => global::DEFAULT_COMPRESS_THRESHOLD,
    };

    Ok(Command::Link(LinkOptions {
        inputs: matches.free.clone(),
        output,
        cu_map,
        default_name: matches.opt_str("default-name"),
        threshold,
        verbosity: matches.opt_count("v"),
    }))
}

/// Linker (`ctfld`) error.
///
/// Items dropped while linking are not errors;
///   they are reported as warnings.
#[derive(Debug)]
pub enum CtfldError {
    Io(io::Error),
    Link(LinkError),
}

impl From<io::Error> for CtfldError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<LinkError> for CtfldError {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

impl Display for CtfldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => Display::fmt(e, f),
            Self::Link(e) => Display::fmt(e, f),
        }
    }
}

impl Error for CtfldError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Link(e) => Some(e),
        }
    }
}

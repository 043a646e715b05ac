// Copyright 2025 Bsearch Project
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::io::BufRead;
use std::path::PathBuf;
use std::process::exit;

use bsearch::{Error, Searcher, SearcherOptions};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "bsearch",
    about = "Binary search a sorted dataset for lines whose first field matches a key"
)]
struct Args {
    /// Ignore the first line (header) of the dataset when doing lookups
    #[arg(short = 'H', long = "hdr")]
    header: bool,
    /// Reverse the key for the search and reverse output lines when printing
    #[arg(short = 'r', long = "rev")]
    rev: bool,
    /// Treat the key as a bare prefix that must end on a word boundary
    #[arg(short = 'b', long = "boundary")]
    boundary: bool,
    /// Read keys from stdin, one per line; emit a blank-line-delimited
    /// result block per key
    #[arg(long = "stdin")]
    stdin: bool,
    /// Search key (omitted in --stdin mode)
    key: Option<String>,
    /// Dataset path
    file: Option<PathBuf>,
}

const COMPRESSED_EXTS: &[&str] = &[".gz", ".bz2", ".zst", ".br"];

fn usage(msg: &str) -> ! {
    eprintln!("{}", msg);
    eprintln!("usage: bsearch [-H] [-r] [-b] [--stdin] <key> <file>");
    exit(2);
}

fn reverse(s: &str) -> String {
    s.chars().rev().collect()
}

fn search(searcher: &Searcher, key: &str, args: &Args) -> bsearch::Result<Vec<Vec<u8>>> {
    let probe = if args.rev { reverse(key) } else { key.to_string() };
    if args.boundary {
        searcher.lines_prefix(probe.as_bytes())
    } else {
        searcher.lines(probe.as_bytes())
    }
}

fn print_lines(lines: &[Vec<u8>], rev: bool) {
    for line in lines {
        let text = String::from_utf8_lossy(line);
        if rev {
            println!("{}", reverse(&text));
        } else {
            println!("{}", text);
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    let (key, file) = if args.stdin {
        match (&args.key, &args.file) {
            (Some(k), None) => (None, PathBuf::from(k)),
            (_, Some(f)) => (None, f.clone()),
            (None, None) => usage("missing dataset path"),
        }
    } else {
        match (&args.key, &args.file) {
            (Some(k), Some(f)) => (Some(k.clone()), f.clone()),
            _ => usage("missing search key or dataset path"),
        }
    };

    let name = file.to_string_lossy();
    if COMPRESSED_EXTS.iter().any(|ext| name.ends_with(ext)) {
        eprintln!("{:?} appears to be compressed - cannot binary search", name);
        exit(2);
    }

    let opts = SearcherOptions {
        header: args.header,
        boundary: args.boundary,
        ..SearcherOptions::default()
    };
    let searcher = match Searcher::open_with_options(&file, opts) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{}", e);
            exit(1);
        }
    };

    if let Some(key) = key {
        match search(&searcher, &key, &args) {
            Ok(lines) => print_lines(&lines, args.rev),
            Err(Error::NotFound) => exit(1),
            Err(e) => {
                eprintln!("{}", e);
                exit(1);
            }
        }
        return;
    }

    // --stdin: one query per input line, one result block per query.
    let stdin = std::io::stdin();
    for input in stdin.lock().lines() {
        let input = match input {
            Ok(l) => l,
            Err(e) => {
                eprintln!("{}", e);
                exit(1);
            }
        };
        match search(&searcher, &input, &args) {
            Ok(lines) => print_lines(&lines, args.rev),
            Err(Error::NotFound) => {}
            Err(e) => {
                eprintln!("{}", e);
                exit(1);
            }
        }
        println!();
    }
}

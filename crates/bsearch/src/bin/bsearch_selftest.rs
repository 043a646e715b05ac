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

//! Load a sorted dataset, pick random lines, and verify a key lookup
//! returns each one. Assumes keys are unique (one line per key).

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::exit;

use anyhow::{Context, Result};
use bsearch::{Searcher, SearcherOptions};
use clap::Parser;
use rand::seq::SliceRandom;

#[derive(Parser, Debug)]
#[command(
    name = "bsearch_selftest",
    about = "Verify random key lookups against a sorted dataset"
)]
struct Args {
    /// Separator/delimiter character
    #[arg(short = 't', long = "sep", default_value = ",")]
    sep: String,
    /// First line of the dataset is a header and should be skipped
    #[arg(short = 'H', long = "hdr")]
    header: bool,
    /// Number of checks to run
    #[arg(short = 'c', long = "count", default_value_t = 100)]
    count: usize,
    /// Die on the first failing lookup
    #[arg(short = 'f', long = "fatal")]
    fatal: bool,
    /// Dataset path
    file: PathBuf,
}

fn run(args: &Args) -> Result<usize> {
    let reader = BufReader::new(
        File::open(&args.file).with_context(|| format!("open {:?}", args.file))?,
    );
    let mut lines: Vec<String> = reader.lines().collect::<std::io::Result<_>>()?;
    if args.header && !lines.is_empty() {
        lines.remove(0);
    }

    let sample: Vec<&String> = lines
        .choose_multiple(&mut rand::thread_rng(), args.count.min(lines.len()))
        .collect();

    let opts = SearcherOptions {
        header: args.header,
        delimiter: args.sep.clone().into_bytes(),
        ..SearcherOptions::default()
    };
    let searcher = Searcher::open_with_options(&args.file, opts)?;

    let mut failures = 0usize;
    for expect in sample {
        let key = match expect.split_once(&args.sep) {
            Some((k, _)) => k,
            None => expect.as_str(),
        };
        let got = match searcher.line(key.as_bytes()) {
            Ok(line) => String::from_utf8_lossy(&line).into_owned(),
            Err(e) => {
                eprintln!("{:?}: lookup failed: {}", key, e);
                failures += 1;
                if args.fatal {
                    anyhow::bail!("lookup for {:?} failed: {}", key, e);
                }
                continue;
            }
        };
        if got != *expect {
            eprintln!("{:?}: got {:?}, expected {:?}", key, got, expect);
            failures += 1;
            if args.fatal {
                anyhow::bail!("mismatch for {:?}", key);
            }
        }
    }
    Ok(failures)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    match run(&args) {
        Ok(0) => println!("ok"),
        Ok(n) => {
            eprintln!("{} of {} lookups failed", n, args.count);
            exit(1);
        }
        Err(e) => {
            eprintln!("{}", e);
            exit(1);
        }
    }
}

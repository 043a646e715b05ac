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

use std::path::PathBuf;
use std::process::exit;

use bsearch::{Index, IndexOptions};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "bsearch_index",
    about = "Create or refresh the sidecar index for a sorted dataset"
)]
struct Args {
    /// Separator/delimiter character
    #[arg(short = 't', long = "sep", default_value = ",")]
    sep: String,
    /// First line of the dataset is a header and should be skipped
    #[arg(short = 'H', long = "hdr")]
    header: bool,
    /// Regenerate the index even if an up-to-date one exists
    #[arg(short = 'f', long = "force")]
    force: bool,
    /// Write the serialized index to stdout instead of to a file
    #[arg(short = 'c', long = "cat")]
    cat: bool,
    /// Blocksize in kB
    #[arg(short = 'b', long = "bs")]
    bs: Option<u64>,
    /// Dataset path
    file: PathBuf,
}

const COMPRESSED_EXTS: &[&str] = &[".gz", ".bz2", ".zst", ".br"];

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    let name = args.file.to_string_lossy();
    if COMPRESSED_EXTS.iter().any(|ext| name.ends_with(ext)) {
        eprintln!(
            "{:?} appears to be compressed - cannot binary search",
            name
        );
        exit(2);
    }

    // Noop when a valid index already exists, unless forced.
    if !args.force && !args.cat && Index::load(&args.file).is_ok() {
        return;
    }

    let opts = IndexOptions {
        blocksize: args.bs.map(|kb| kb * 1024),
        delimiter: args.sep.clone().into_bytes(),
        header: args.header,
    };
    let index = match Index::build_with_options(&args.file, opts) {
        Ok(idx) => idx,
        Err(e) => {
            eprintln!("{}", e);
            exit(1);
        }
    };

    let result = if args.cat {
        let mut stdout = std::io::stdout().lock();
        index.write_to(&mut stdout)
    } else {
        index.write()
    };
    if let Err(e) = result {
        eprintln!("{}", e);
        exit(1);
    }
}

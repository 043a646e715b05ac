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

//! Binary search on line-ordered byte datasets (e.g. `LC_ALL=C` sorted
//! CSV/TSV/PSV files), keyed on the leading field of each line.
//!
//! The library has two halves: an indexer that scans a dataset once and
//! records one `(key, offset)` entry per fixed-size block in a `.bsy`
//! sidecar file, and a searcher that memory-maps the dataset, binary
//! searches the in-memory entry list, and scans forward from the selected
//! offset collecting matching lines.
//!
//! ```no_run
//! use bsearch::Searcher;
//!
//! let s = Searcher::open("dataset.csv")?;
//! let line = s.line(b"some-key")?;
//! # Ok::<(), bsearch::Error>(())
//! ```

pub mod compare;
pub mod db;
pub mod error;
pub mod index;
pub mod searcher;

pub use crate::db::DB;
pub use crate::error::{Error, Result};
pub use crate::index::{Index, IndexEntry, IndexOptions, DEFAULT_BLOCKSIZE};
pub use crate::searcher::{Searcher, SearcherOptions};

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

use std::fmt::{self, Display};
use std::io;

pub type Result<T> = std::result::Result<T, Error>;

/// Typed errors returned by index and search operations.
///
/// `NotFound` is an ordinary query outcome rather than a failure; callers
/// are expected to match on it.
#[derive(Debug)]
pub enum Error {
    /// Dataset path does not exist.
    FileNotFound(String),
    /// Dataset path exists but is a directory.
    NotFile(String),
    /// No sidecar index file exists for the dataset.
    IndexNotFound,
    /// The dataset has been modified since the sidecar was written.
    IndexExpired,
    /// The sidecar is bound to a different dataset basename.
    IndexPathMismatch { bound: String, dataset: String },
    /// The indexer produced no entries.
    IndexEmpty,
    /// The sidecar could not be parsed.
    IndexMalformed(String),
    /// No delimiter supplied and none derivable from the file extension.
    UnknownDelimiter(String),
    /// The dataset is not bytewise-sorted on its key field.
    KeySortViolation { prev: String, key: String },
    /// No line matches the query.
    NotFound,
    /// Probe key is larger than the index blocksize (block-bounded
    /// search paths only; never returned by index-driven queries).
    KeyExceedsBlocksize,
    /// Underlying read/write/mmap failure.
    Io(io::Error),
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::FileNotFound(p) => write!(f, "file not found: {}", p),
            Error::NotFile(p) => write!(f, "path exists but is not a file: {}", p),
            Error::IndexNotFound => write!(f, "index file not found"),
            Error::IndexExpired => write!(f, "index file out of date"),
            Error::IndexPathMismatch { bound, dataset } => write!(
                f,
                "index file path mismatch: index is for {:?}, dataset is {:?}",
                bound, dataset
            ),
            Error::IndexEmpty => write!(f, "index contains no entries"),
            Error::IndexMalformed(msg) => write!(f, "index malformed: {}", msg),
            Error::UnknownDelimiter(p) => {
                write!(f, "cannot guess delimiter from filename: {}", p)
            }
            Error::KeySortViolation { prev, key } => {
                write!(f, "key sort violation: {:?} > {:?}", prev, key)
            }
            Error::NotFound => write!(f, "not found"),
            Error::KeyExceedsBlocksize => write!(f, "key length exceeds blocksize"),
            Error::Io(e) => write!(f, "io error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::IndexMalformed(e.to_string())
    }
}

impl Error {
    /// True for load failures that an open-with-rebuild recovers from.
    pub fn is_recoverable_load(&self) -> bool {
        matches!(
            self,
            Error::IndexNotFound | Error::IndexExpired | Error::IndexPathMismatch { .. }
        )
    }
}

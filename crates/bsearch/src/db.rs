//! Key-value-store-like façade over [`Searcher`]: lookups return only the
//! value portion of the first matching line.

use std::path::Path;

use crate::error::Result;
use crate::searcher::{Searcher, SearcherOptions};

/// Read-only key→value view of a delimited dataset. The delimiter comes
/// from the underlying index.
pub struct DB {
    searcher: Searcher,
}

impl DB {
    /// Open a DB over the dataset at `path`. Dropping the DB closes the
    /// underlying searcher.
    pub fn open(path: impl AsRef<Path>) -> Result<DB> {
        Ok(DB {
            searcher: Searcher::open(path)?,
        })
    }

    /// Open a DB with explicit searcher options.
    pub fn open_with_options(path: impl AsRef<Path>, opts: SearcherOptions) -> Result<DB> {
        Ok(DB {
            searcher: Searcher::open_with_options(path, opts)?,
        })
    }

    /// Value bytes of the first line whose key equals `key`.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let line = self.searcher.line(key)?;
        let delim = &self.searcher.index().delimiter;

        if line.starts_with(key) && line[key.len()..].starts_with(delim) {
            return Ok(line[key.len() + delim.len()..].to_vec());
        }
        // A line that is exactly the key carries no value fields.
        if line == key {
            return Ok(Vec::new());
        }
        // The searcher contract guarantees returned lines start with
        // key + delimiter; anything else is an internal invariant break.
        panic!(
            "line returned for key {:?} does not begin with key+delimiter: {:?}",
            String::from_utf8_lossy(key),
            String::from_utf8_lossy(&line)
        );
    }

    /// String form of [`DB::get`].
    pub fn get_string(&self, key: &str) -> Result<String> {
        let val = self.get(key.as_bytes())?;
        Ok(String::from_utf8_lossy(&val).into_owned())
    }

    /// Value fields of the first matching line, split on the delimiter.
    pub fn get_slice(&self, key: &[u8]) -> Result<Vec<String>> {
        let val = self.get(key)?;
        let delim = self.searcher.index().delimiter.clone();
        let mut fields = Vec::new();
        let mut rest = val.as_slice();
        loop {
            match crate::compare::find_delim(rest, &delim) {
                Some(d) => {
                    fields.push(String::from_utf8_lossy(&rest[..d]).into_owned());
                    rest = &rest[d + delim.len()..];
                }
                None => {
                    fields.push(String::from_utf8_lossy(rest).into_owned());
                    return Ok(fields);
                }
            }
        }
    }
}

//! Sidecar block index: one `(key, offset)` entry per blocksize-sized
//! window of the dataset, pointing at the first complete line of the
//! block (or at the first occurrence of its key, when a key repeats
//! across blocks).

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};

use crate::compare::prefix_compare;
use crate::error::{Error, Result};

mod builder;
mod reader;
mod writer;

pub use builder::IndexOptions;

/// Sidecar format version emitted by writes.
pub const INDEX_VERSION: u32 = 4;
pub const INDEX_SUFFIX: &str = "bsy";
pub const DEFAULT_BLOCKSIZE: u64 = 2048;

/// One index record: the file offset of the first byte of a line, labeled
/// with that line's key field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub key: String,
    pub offset: u64,
}

/// Index metadata plus the ordered entry list for one dataset.
///
/// Immutable once built or loaded; the searcher shares it read-only.
#[derive(Debug, Clone)]
pub struct Index {
    pub blocksize: u64,
    pub delimiter: Vec<u8>,
    /// Dataset modification time (unix seconds) captured at build.
    pub epoch: i64,
    /// Dataset basename the index is bound to.
    pub filename: String,
    pub header: bool,
    pub header_fields: Vec<String>,
    pub keys_index_first: bool,
    pub keys_unique: bool,
    pub list: Vec<IndexEntry>,
    pub version: u32,
    /// Directory containing the dataset (and the sidecar). Not serialized.
    pub(crate) dir: PathBuf,
}

/// The JSON header record on line 1 of the sidecar file. `List` is kept
/// out of the header; entries follow one per line.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct IndexHeader {
    #[serde(default = "default_blocksize")]
    pub blocksize: u64,
    #[serde(with = "delim_repr")]
    pub delimiter: Vec<u8>,
    pub epoch: i64,
    #[serde(default)]
    pub filename: Option<String>,
    /// Full dataset path written by sidecar versions <= 3.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filepath: Option<String>,
    #[serde(default)]
    pub header: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_fields: Option<Vec<String>>,
    #[serde(default)]
    pub keys_index_first: bool,
    #[serde(default)]
    pub keys_unique: bool,
    #[serde(default)]
    pub length: Option<usize>,
    #[serde(default)]
    pub version: Option<u32>,
}

fn default_blocksize() -> u64 {
    DEFAULT_BLOCKSIZE
}

/// Delimiters are written as a JSON string; byte-array form is accepted on
/// load for sidecars written by older tooling.
mod delim_repr {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &[u8], s: S) -> Result<S::Ok, S::Error> {
        match std::str::from_utf8(d) {
            Ok(text) => s.serialize_str(text),
            Err(_) => s.collect_seq(d.iter()),
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Bytes(Vec<u8>),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        Ok(match Repr::deserialize(d)? {
            Repr::Text(t) => t.into_bytes(),
            Repr::Bytes(b) => b,
        })
    }
}

/// Modification time of `path` in unix seconds.
pub(crate) fn epoch(path: &Path) -> Result<i64> {
    let mtime = std::fs::metadata(path)?.modified()?;
    match mtime.duration_since(UNIX_EPOCH) {
        Ok(d) => Ok(d.as_secs() as i64),
        Err(_) => Ok(0),
    }
}

/// Sidecar filename for a dataset basename: every `.` becomes `_`, with
/// the index suffix appended (`foo.csv` -> `foo_csv.bsy`).
fn index_file(basename: &str) -> String {
    format!("{}.{}", basename.replace('.', "_"), INDEX_SUFFIX)
}

/// Derive a delimiter from the dataset file extension.
pub(crate) fn derive_delimiter(path: &Path) -> Result<Vec<u8>> {
    let name = path.to_string_lossy();
    if name.ends_with(".csv") {
        Ok(vec![b','])
    } else if name.ends_with(".psv") {
        Ok(vec![b'|'])
    } else if name.ends_with(".tsv") {
        Ok(vec![b'\t'])
    } else {
        Err(Error::UnknownDelimiter(name.into_owned()))
    }
}

impl Index {
    /// Absolute path of the sidecar index associated with `path`.
    pub fn path_for(path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = std::path::absolute(path.as_ref())?;
        let base = path
            .file_name()
            .ok_or_else(|| Error::FileNotFound(path.to_string_lossy().into_owned()))?
            .to_string_lossy()
            .into_owned();
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(dir.join(index_file(&base)))
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Last entry with `key <= probe`, and its position.
    ///
    /// Valid when `keys_index_first` holds: the block containing the first
    /// occurrence of the probe key starts at or after the returned offset.
    /// Returns `NotFound` when the first entry key is already greater.
    pub(crate) fn block_entry_le(&self, probe: &[u8]) -> Result<(usize, &IndexEntry)> {
        let list = &self.list;
        if list[0].key.as_bytes() > probe {
            return Err(Error::NotFound);
        }

        let mut begin = 0usize;
        let mut end = list.len() - 1;
        while end - begin > 0 {
            let mut mid = (end - begin) / 2 + begin;
            if mid == begin {
                mid += 1;
            }
            if list[mid].key.as_bytes() <= probe {
                begin = mid;
            } else {
                if end == mid {
                    break;
                }
                end = mid;
            }
        }
        Ok((begin, &list[begin]))
    }

    /// Last entry with `key < probe` under prefix-compare semantics, or
    /// the first entry when no such entry exists. The conservative first
    /// entry keeps legacy indices whose block 0 may hold a header usable.
    pub(crate) fn block_entry_lt(&self, probe: &[u8]) -> (usize, &IndexEntry) {
        let list = &self.list;
        let mut begin = 0usize;
        let mut end = list.len() - 1;
        while end - begin > 0 {
            let mut mid = (end - begin) / 2 + begin;
            if mid == begin {
                mid += 1;
            }
            if prefix_compare(list[mid].key.as_bytes(), probe) == Ordering::Less {
                begin = mid;
            } else {
                if end == mid {
                    break;
                }
                end = mid;
            }
        }
        (begin, &list[begin])
    }

    pub(crate) fn header_record(&self) -> IndexHeader {
        IndexHeader {
            blocksize: self.blocksize,
            delimiter: self.delimiter.clone(),
            epoch: self.epoch,
            filename: Some(self.filename.clone()),
            filepath: None,
            header: self.header,
            header_fields: if self.header_fields.is_empty() {
                None
            } else {
                Some(self.header_fields.clone())
            },
            keys_index_first: self.keys_index_first,
            keys_unique: self.keys_unique,
            length: Some(self.list.len()),
            version: Some(self.version),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with_keys(keys: &[(&str, u64)]) -> Index {
        Index {
            blocksize: DEFAULT_BLOCKSIZE,
            delimiter: vec![b','],
            epoch: 1,
            filename: "test.csv".to_string(),
            header: false,
            header_fields: Vec::new(),
            keys_index_first: true,
            keys_unique: true,
            list: keys
                .iter()
                .map(|(k, o)| IndexEntry {
                    key: (*k).to_string(),
                    offset: *o,
                })
                .collect(),
            version: INDEX_VERSION,
            dir: PathBuf::new(),
        }
    }

    #[test]
    fn index_file_transforms_dots() {
        assert_eq!(index_file("bar.csv"), "bar_csv.bsy");
        assert_eq!(index_file("a.b.tsv"), "a_b_tsv.bsy");
        assert_eq!(index_file("plain"), "plain.bsy");
    }

    #[test]
    fn path_for_is_absolute_and_adjacent() {
        let p = Index::path_for("testdata/bar.csv").unwrap();
        assert!(p.is_absolute());
        assert!(p.to_string_lossy().ends_with("testdata/bar_csv.bsy"));
    }

    #[test]
    fn derive_delimiter_by_extension() {
        assert_eq!(derive_delimiter(Path::new("x.csv")).unwrap(), b",");
        assert_eq!(derive_delimiter(Path::new("x.psv")).unwrap(), b"|");
        assert_eq!(derive_delimiter(Path::new("x.tsv")).unwrap(), b"\t");
        assert!(matches!(
            derive_delimiter(Path::new("x.txt")),
            Err(Error::UnknownDelimiter(_))
        ));
    }

    #[test]
    fn block_entry_le_picks_last_le() {
        let idx = index_with_keys(&[("b", 0), ("d", 10), ("f", 20), ("h", 30)]);
        let (i, e) = idx.block_entry_le(b"d").unwrap();
        assert_eq!((i, e.key.as_str()), (1, "d"));
        let (i, e) = idx.block_entry_le(b"e").unwrap();
        assert_eq!((i, e.key.as_str()), (1, "d"));
        let (i, e) = idx.block_entry_le(b"zzz").unwrap();
        assert_eq!((i, e.key.as_str()), (3, "h"));
        assert!(matches!(idx.block_entry_le(b"a"), Err(Error::NotFound)));
    }

    #[test]
    fn block_entry_le_single_entry() {
        let idx = index_with_keys(&[("m", 0)]);
        let (i, e) = idx.block_entry_le(b"z").unwrap();
        assert_eq!((i, e.offset), (0, 0));
        assert!(matches!(idx.block_entry_le(b"a"), Err(Error::NotFound)));
    }

    #[test]
    fn block_entry_lt_conservative_first() {
        let idx = index_with_keys(&[("b", 0), ("d", 10), ("f", 20)]);
        let (i, _) = idx.block_entry_lt(b"a");
        assert_eq!(i, 0);
        let (i, e) = idx.block_entry_lt(b"e");
        assert_eq!((i, e.key.as_str()), (1, "d"));
        let (i, e) = idx.block_entry_lt(b"z");
        assert_eq!((i, e.key.as_str()), (2, "f"));
    }
}

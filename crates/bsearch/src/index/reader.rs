//! Sidecar loading, with freshness and path-binding validation.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};
use crate::index::{epoch, Index, IndexEntry, IndexHeader};

/// Parse a double-quoted key literal written by the index writer.
pub(crate) fn unescape_key(quoted: &str) -> Result<String> {
    let inner = quoted
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .ok_or_else(|| Error::IndexMalformed(format!("unquoted key: {:?}", quoted)))?;

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('x') => {
                let hi = chars.next();
                let lo = chars.next();
                let byte = match (hi, lo) {
                    (Some(h), Some(l)) => u8::from_str_radix(&format!("{h}{l}"), 16).ok(),
                    _ => None,
                };
                match byte {
                    Some(b) if b < 0x80 => out.push(b as char),
                    _ => {
                        return Err(Error::IndexMalformed(format!(
                            "bad \\x escape in key: {:?}",
                            quoted
                        )))
                    }
                }
            }
            other => {
                return Err(Error::IndexMalformed(format!(
                    "bad escape {:?} in key: {:?}",
                    other, quoted
                )))
            }
        }
    }
    Ok(out)
}

fn parse_entry(line: &str) -> Result<IndexEntry> {
    let (offset, key) = line
        .split_once('\t')
        .ok_or_else(|| Error::IndexMalformed(format!("entry without separator: {:?}", line)))?;
    let offset: u64 = offset
        .parse()
        .map_err(|_| Error::IndexMalformed(format!("bad entry offset: {:?}", offset)))?;
    Ok(IndexEntry {
        key: unescape_key(key)?,
        offset,
    })
}

impl Index {
    /// Load the sidecar index associated with the dataset at `path`.
    ///
    /// Returns `IndexNotFound` when no sidecar exists, `IndexExpired` when
    /// the dataset is newer than the recorded epoch, and
    /// `IndexPathMismatch` when the sidecar was built for a different
    /// dataset basename.
    pub fn load(path: impl AsRef<Path>) -> Result<Index> {
        let path = std::path::absolute(path.as_ref())?;
        let idxpath = Index::path_for(&path)?;

        let file = File::open(&idxpath).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::IndexNotFound,
            _ => Error::Io(e),
        })?;
        let mut reader = BufReader::new(file);

        let mut header_line = String::new();
        if reader.read_line(&mut header_line)? == 0 {
            return Err(Error::IndexMalformed("empty index file".to_string()));
        }
        let header: IndexHeader = serde_json::from_str(header_line.trim_end())?;

        // Sidecar versions <= 3 bound the full dataset path; reduce either
        // form to a basename for the binding check.
        let bound = match (&header.filename, &header.filepath) {
            (Some(name), _) => name.clone(),
            (None, Some(fp)) => Path::new(fp)
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_default(),
            (None, None) => {
                return Err(Error::IndexMalformed(
                    "index header has no Filename or Filepath".to_string(),
                ))
            }
        };
        let dataset = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        if bound != dataset {
            return Err(Error::IndexPathMismatch { bound, dataset });
        }

        if epoch(&path)? > header.epoch {
            return Err(Error::IndexExpired);
        }

        let mut list: Vec<IndexEntry> = match header.length {
            Some(n) => Vec::with_capacity(n),
            None => Vec::new(),
        };
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            let trimmed = line.trim_end_matches('\n');
            if trimmed.is_empty() {
                continue;
            }
            let entry = parse_entry(trimmed)?;
            if let Some(prev) = list.last() {
                if entry.offset <= prev.offset {
                    return Err(Error::IndexMalformed(format!(
                        "entry offsets out of order: {} after {}",
                        entry.offset, prev.offset
                    )));
                }
            }
            list.push(entry);
        }
        if let Some(n) = header.length {
            if list.len() != n {
                return Err(Error::IndexMalformed(format!(
                    "expected {} entries, found {}",
                    n,
                    list.len()
                )));
            }
        }
        if list.is_empty() {
            return Err(Error::IndexEmpty);
        }

        debug!("loaded index {:?} ({} entries)", idxpath, list.len());
        Ok(Index {
            blocksize: header.blocksize,
            delimiter: header.delimiter,
            epoch: header.epoch,
            filename: dataset,
            header: header.header,
            header_fields: header.header_fields.unwrap_or_default(),
            keys_index_first: header.keys_index_first,
            keys_unique: header.keys_unique,
            list,
            version: header.version.unwrap_or(1),
            dir: path.parent().map(Path::to_path_buf).unwrap_or_default(),
        })
    }
}

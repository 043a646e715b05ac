//! Binary search over a memory-mapped dataset, driven by the sidecar
//! block index.

use std::cmp::Ordering;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use tracing::debug;

use crate::compare::{is_word_byte, key_prefix_of, prefix_compare};
use crate::error::{Error, Result};
use crate::index::{Index, IndexEntry, IndexOptions};

/// Per-searcher configuration. `delimiter` and `header` are passed through
/// to the index build when the sidecar has to be (re)created.
#[derive(Debug, Clone, Default)]
pub struct SearcherOptions {
    /// When no equal key exists, return the greatest line whose key is
    /// strictly less than the probe instead of `NotFound`.
    pub match_le: bool,
    /// Require a word/non-word transition after a prefix match.
    pub boundary: bool,
    pub delimiter: Vec<u8>,
    pub header: bool,
}

/// Binary search on a byte-ordered, delimited text file.
///
/// The dataset is memory-mapped read-only and the index is immutable, so
/// one `Searcher` may serve concurrent queries without locking; results
/// are freshly allocated per call. Dropping the searcher releases the
/// mapping.
pub struct Searcher {
    mmap: Mmap,
    index: Index,
    path: PathBuf,
    match_le: bool,
    boundary: bool,
}

#[derive(Clone, Copy, PartialEq)]
enum MatchMode {
    /// Probe must match a whole key field (delimiter or end-of-line after
    /// the matched bytes).
    Key,
    /// Probe is a bare prefix; the boundary option applies.
    Prefix,
}

/// Outcome of one forward scan: collected lines, the offset of the first
/// match, and the offset of the last line observed below the probe.
struct Scan {
    lines: Vec<Vec<u8>>,
    first: Option<usize>,
    trailing: Option<usize>,
}

impl Searcher {
    /// Open a searcher for the dataset at `path` with default options.
    pub fn open(path: impl AsRef<Path>) -> Result<Searcher> {
        Self::open_with_options(path, SearcherOptions::default())
    }

    /// Open a searcher for the dataset at `path`.
    ///
    /// The sidecar index is loaded if present and fresh; a missing,
    /// expired, or mismatched sidecar is rebuilt and rewritten when the
    /// dataset directory is writable. An index that disagrees with an
    /// explicitly requested delimiter or header flag is also rebuilt.
    pub fn open_with_options(path: impl AsRef<Path>, opts: SearcherOptions) -> Result<Searcher> {
        let path = std::path::absolute(path.as_ref())?;
        let meta = std::fs::metadata(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::FileNotFound(path.to_string_lossy().into_owned()),
            _ => Error::Io(e),
        })?;
        if meta.is_dir() {
            return Err(Error::NotFile(path.to_string_lossy().into_owned()));
        }

        let index = Self::resolve_index(&path, &opts)?;

        let file = File::open(&path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        Ok(Searcher {
            mmap,
            index,
            path,
            match_le: opts.match_le,
            boundary: opts.boundary,
        })
    }

    fn resolve_index(path: &Path, opts: &SearcherOptions) -> Result<Index> {
        let build_opts = || IndexOptions {
            blocksize: None,
            delimiter: opts.delimiter.clone(),
            header: opts.header,
        };
        match Index::load(path) {
            Ok(index) => {
                let delim_ok = opts.delimiter.is_empty() || opts.delimiter == index.delimiter;
                let header_ok = !opts.header || opts.header == index.header;
                if delim_ok && header_ok {
                    return Ok(index);
                }
                debug!("index options disagree for {:?}, rebuilding", path);
                let index = Index::build_with_options(path, build_opts())?;
                index.write()?;
                Ok(index)
            }
            Err(load_err) if load_err.is_recoverable_load() => {
                debug!("index unusable for {:?} ({}), rebuilding", path, load_err);
                let index = Index::build_with_options(path, build_opts())?;
                match index.write() {
                    Ok(()) => Ok(index),
                    // Read-only index directory: the rebuild cannot be
                    // persisted, so surface the original load failure.
                    Err(Error::Io(e))
                        if matches!(
                            e.kind(),
                            ErrorKind::PermissionDenied | ErrorKind::ReadOnlyFilesystem
                        ) =>
                    {
                        Err(load_err)
                    }
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// The loaded index.
    pub fn index(&self) -> &Index {
        &self.index
    }

    /// The absolute dataset path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// First line whose key field equals `key`.
    pub fn line(&self, key: &[u8]) -> Result<Vec<u8>> {
        let mut lines = self.lines_n(key, 1)?;
        match lines.pop() {
            Some(line) => Ok(line),
            None => Err(Error::NotFound),
        }
    }

    /// All lines whose key field equals `key`, in file order.
    pub fn lines(&self, key: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.lines_n(key, 0)
    }

    /// First `n` lines whose key field equals `key` (`n = 0` means all).
    pub fn lines_n(&self, key: &[u8], n: usize) -> Result<Vec<Vec<u8>>> {
        // With unique keys there is at most one match to find.
        let n = if n == 0 && self.index.keys_unique { 1 } else { n };
        let entry = self.start_entry(key)?;
        let scan = self.scan_from(entry.offset as usize, key, n, MatchMode::Key);
        if scan.lines.is_empty() {
            if self.match_le {
                if let Some(t) = scan.trailing {
                    return Ok(vec![self.line_at(t)]);
                }
            }
            return Err(Error::NotFound);
        }
        Ok(scan.lines)
    }

    /// Byte offset of the first line whose key equals `key` (or of the
    /// greatest lesser line under the match-LE option).
    pub fn line_position(&self, key: &[u8]) -> Result<u64> {
        let entry = self.start_entry(key)?;
        let scan = self.scan_from(entry.offset as usize, key, 1, MatchMode::Key);
        if let Some(first) = scan.first {
            return Ok(first as u64);
        }
        if self.match_le {
            if let Some(t) = scan.trailing {
                return Ok(t as u64);
            }
        }
        Err(Error::NotFound)
    }

    /// All lines beginning with the bare byte prefix `prefix`, without the
    /// key/delimiter check. Honors the boundary option.
    pub fn lines_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        let entry = self.start_entry(prefix)?;
        let scan = self.scan_from(entry.offset as usize, prefix, 0, MatchMode::Prefix);
        if scan.lines.is_empty() {
            return Err(Error::NotFound);
        }
        Ok(scan.lines)
    }

    fn start_entry(&self, probe: &[u8]) -> Result<&IndexEntry> {
        if self.index.keys_index_first {
            // Entries point at first key occurrences, so the block holding
            // the first match is the last entry at or below the probe.
            let (_, entry) = self.index.block_entry_le(probe)?;
            Ok(entry)
        } else {
            let (_, entry) = self.index.block_entry_lt(probe);
            Ok(entry)
        }
    }

    /// Walk lines from `start`, skipping keys below the probe, collecting
    /// matches, and stopping at the first key above it. Lines never span
    /// entry boundaries backwards, so a single forward walk from the
    /// resolved entry sees every match contiguously.
    fn scan_from(&self, start: usize, probe: &[u8], n: usize, mode: MatchMode) -> Scan {
        let buf = &self.mmap[start.min(self.mmap.len())..];
        let delim = self.index.delimiter.as_slice();
        let mut scan = Scan {
            lines: Vec::new(),
            first: None,
            trailing: None,
        };

        let mut offset = 0usize;
        while offset < buf.len() {
            if n > 0 && scan.lines.len() >= n {
                break;
            }
            let rest = &buf[offset..];
            let nl = rest.iter().position(|&b| b == b'\n');
            let line_end = offset + nl.unwrap_or(rest.len());
            let prefix = key_prefix_of(rest, probe.len(), delim);
            match prefix_compare(prefix, probe) {
                Ordering::Less => {
                    scan.trailing = Some(start + offset);
                }
                Ordering::Equal => {
                    let after = offset + prefix.len();
                    let matched = match mode {
                        MatchMode::Key => after == line_end || buf[after..].starts_with(delim),
                        MatchMode::Prefix => {
                            !self.boundary || boundary_ok(probe, &buf[..line_end], after)
                        }
                    };
                    if matched {
                        if scan.first.is_none() {
                            scan.first = Some(start + offset);
                        }
                        scan.lines.push(buf[offset..line_end].to_vec());
                    } else if mode == MatchMode::Key {
                        // Equal prefix without a key boundary: the candidate
                        // key is longer and sorts above the probe.
                        break;
                    }
                }
                Ordering::Greater => break,
            }
            match nl {
                Some(i) => offset += i + 1,
                None => break,
            }
        }
        scan
    }

    fn line_at(&self, offset: usize) -> Vec<u8> {
        let rest = &self.mmap[offset..];
        let end = rest.iter().position(|&b| b == b'\n').unwrap_or(rest.len());
        rest[..end].to_vec()
    }
}

/// Word-boundary test for prefix matches: satisfied at end of line, or
/// when the byte after the match changes word class relative to the last
/// probe byte.
fn boundary_ok(probe: &[u8], line: &[u8], after: usize) -> bool {
    let Some(&last) = probe.last() else {
        return true;
    };
    if after >= line.len() {
        return true;
    }
    is_word_byte(last) != is_word_byte(line[after])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_transitions() {
        // word -> non-word is a boundary; word -> word is not.
        assert!(boundary_ok(b"alstom", b"alstom.com,x", 6));
        assert!(!boundary_ok(b"alstom", b"alstomco,x", 6));
        // non-word -> word is a boundary.
        assert!(boundary_ok(b"moc.", b"moc.retinom,x", 4));
        // End of line always qualifies.
        assert!(boundary_ok(b"alstom", b"alstom", 6));
    }
}

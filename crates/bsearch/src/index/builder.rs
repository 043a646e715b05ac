//! Index construction: a single streaming pass over the dataset emitting
//! one entry per block boundary.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::debug;

use crate::compare::find_delim;
use crate::error::{Error, Result};
use crate::index::{derive_delimiter, epoch, Index, IndexEntry, DEFAULT_BLOCKSIZE, INDEX_VERSION};

/// Build-time options. A zero-value struct asks for the defaults: 2048-byte
/// blocks, delimiter derived from the file extension, no declared header.
#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    pub blocksize: Option<u64>,
    /// Empty means derive from the dataset extension.
    pub delimiter: Vec<u8>,
    /// First line is a header and is excluded from indexing.
    pub header: bool,
}

impl Index {
    /// Build an index for `path` with default options.
    pub fn build(path: impl AsRef<Path>) -> Result<Index> {
        Self::build_with_options(path, IndexOptions::default())
    }

    /// Build an index for `path`, scanning the dataset once.
    pub fn build_with_options(path: impl AsRef<Path>, opts: IndexOptions) -> Result<Index> {
        let path = std::path::absolute(path.as_ref())?;
        let file = File::open(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                Error::FileNotFound(path.to_string_lossy().into_owned())
            }
            _ => Error::Io(e),
        })?;
        let epoch = epoch(&path)?;

        let delimiter = if opts.delimiter.is_empty() {
            derive_delimiter(&path)?
        } else {
            opts.delimiter
        };
        let filename = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

        let mut index = Index {
            blocksize: opts.blocksize.filter(|&b| b > 0).unwrap_or(DEFAULT_BLOCKSIZE),
            delimiter,
            epoch,
            filename,
            header: opts.header,
            header_fields: Vec::new(),
            keys_index_first: false,
            keys_unique: true,
            list: Vec::new(),
            version: INDEX_VERSION,
            dir,
        };
        generate_line_index(&mut index, BufReader::new(file))?;
        Ok(index)
    }
}

/// Key field of a line: the bytes before the first delimiter, or the whole
/// line when it carries no value fields.
fn key_of<'a>(line: &'a [u8], delim: &[u8]) -> &'a [u8] {
    match find_delim(line, delim) {
        Some(d) => &line[..d],
        None => line,
    }
}

/// Split a line into fields on the delimiter.
fn split_fields(line: &[u8], delim: &[u8]) -> Vec<String> {
    let mut fields = Vec::new();
    let mut rest = line;
    loop {
        match find_delim(rest, delim) {
            Some(d) => {
                fields.push(String::from_utf8_lossy(&rest[..d]).into_owned());
                rest = &rest[d + delim.len()..];
            }
            None => {
                fields.push(String::from_utf8_lossy(rest).into_owned());
                return fields;
            }
        }
    }
}

/// Scan the dataset line by line, emitting an entry for the first complete
/// line of each new block. A key that spans blocks is anchored at its first
/// occurrence, so each key appears in at most one entry.
fn generate_line_index<R: BufRead>(index: &mut Index, mut reader: R) -> Result<()> {
    let mut list: Vec<IndexEntry> = Vec::new();
    let mut line: Vec<u8> = Vec::new();
    let mut first_line: Vec<u8> = Vec::new();
    let mut block_position: u64 = 0;
    let mut block_number: i64 = -1;
    let mut prev_key: Vec<u8> = Vec::new();
    let mut first_offset: u64 = 0;
    let mut records: u64 = 0;
    let mut skip_header = index.header;
    index.keys_unique = true;

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        if line.last() == Some(&b'\n') {
            line.pop();
        }
        let advance = line.len() as u64 + 1;

        if skip_header {
            skip_header = false;
            index.header_fields = split_fields(&line, &index.delimiter);
            block_position += advance;
            continue;
        }

        let key = key_of(&line, &index.delimiter);

        let mut dup_key_block = false;
        match prev_key.as_slice().cmp(key) {
            std::cmp::Ordering::Greater => {
                // A second record sorting below the first means the first
                // line was an undeclared header: restart indexing from here.
                if records == 1 && !index.header {
                    debug!(
                        "implicit header detected in {:?}: {:?} > {:?}",
                        index.filename,
                        String::from_utf8_lossy(&prev_key),
                        String::from_utf8_lossy(key)
                    );
                    index.header = true;
                    index.header_fields = split_fields(&first_line, &index.delimiter);
                    list.clear();
                    block_number = -1;
                } else {
                    return Err(Error::KeySortViolation {
                        prev: String::from_utf8_lossy(&prev_key).into_owned(),
                        key: String::from_utf8_lossy(key).into_owned(),
                    });
                }
            }
            std::cmp::Ordering::Equal => {
                index.keys_unique = false;
                dup_key_block = true;
            }
            std::cmp::Ordering::Less => {}
        }

        let current_block_number = (block_position / index.blocksize) as i64;
        if current_block_number > block_number {
            let offset = if dup_key_block {
                first_offset
            } else {
                block_position
            };
            // A key spanning an exact block boundary would otherwise emit
            // the same offset twice.
            if list.last().map(|e| e.offset) != Some(offset) {
                list.push(IndexEntry {
                    key: String::from_utf8_lossy(key).into_owned(),
                    offset,
                });
            }
            block_number = current_block_number;
        }

        if !dup_key_block {
            first_offset = block_position;
            prev_key.clear();
            prev_key.extend_from_slice(key);
        }
        if records == 0 {
            first_line = line.clone();
        }
        records += 1;
        block_position += advance;
    }

    if list.is_empty() {
        return Err(Error::IndexEmpty);
    }

    debug!(
        "indexed {:?}: {} entries over {} records (keys_unique={})",
        index.filename,
        list.len(),
        records,
        index.keys_unique
    );
    index.keys_index_first = true;
    index.list = list;
    Ok(())
}

//! Sidecar serialization: a JSON header line followed by one
//! `<offset>\t<quoted-key>` record per entry.

use std::io::{BufWriter, Write};

use tracing::debug;

use crate::error::Result;
use crate::index::Index;

/// Render a key as a double-quoted literal. Quotes, backslashes and
/// control bytes are escaped so arbitrary key bytes round-trip through
/// the text format.
pub(crate) fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 2);
    out.push('"');
    for c in key.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\x00'..='\x1f' | '\x7f' => out.push_str(&format!("\\x{:02x}", c as u32)),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

impl Index {
    /// Serialize the index to `w`: header line, then entries.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        let header = serde_json::to_string(&self.header_record())?;
        w.write_all(header.as_bytes())?;
        w.write_all(b"\n")?;
        for entry in &self.list {
            write!(w, "{}\t{}\n", entry.offset, escape_key(&entry.key))?;
        }
        Ok(())
    }

    /// Write the sidecar file next to the dataset, via a temporary file
    /// renamed into place so readers never observe a partial index.
    pub fn write(&self) -> Result<()> {
        let idxpath = self.dir.join(super::index_file(&self.filename));
        let tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        let mut w = BufWriter::new(tmp);
        self.write_to(&mut w)?;
        let tmp = w
            .into_inner()
            .map_err(|e| crate::error::Error::Io(e.into_error()))?;
        tmp.persist(&idxpath).map_err(|e| e.error)?;
        debug!("wrote index {:?} ({} entries)", idxpath, self.list.len());
        Ok(())
    }
}

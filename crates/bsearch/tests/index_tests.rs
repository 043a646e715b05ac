use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use bsearch::{Error, Index, IndexOptions};

fn write_dataset(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn build_sets_metadata() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_dataset(dir.path(), "indexme.csv", "aa,1\nbb,2\ncc,3\n");

    let idx = Index::build(&path)?;
    assert_eq!(idx.filename, "indexme.csv");
    assert_eq!(idx.delimiter, b",");
    assert!(!idx.header);
    assert!(idx.epoch > 0);
    assert_eq!(idx.list.len(), 1);
    assert_eq!(idx.list[0].key, "aa");
    assert!(idx.keys_unique);
    assert!(idx.keys_index_first);
    Ok(())
}

#[test]
fn build_with_header_captures_fields() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_dataset(
        dir.path(),
        "foo2.csv",
        "label1,\"label2, with comma\",lineno\naa,1\nbb,2\n",
    );

    let opts = IndexOptions {
        delimiter: b",".to_vec(),
        header: true,
        ..IndexOptions::default()
    };
    let idx = Index::build_with_options(&path, opts)?;
    assert!(idx.header);
    // Field splitting is raw byte splitting on the delimiter; quoting is
    // not interpreted.
    assert_eq!(
        idx.header_fields,
        vec!["label1", "\"label2", " with comma\"", "lineno"]
    );
    assert_eq!(idx.list[0].key, "aa");
    Ok(())
}

#[test]
fn unknown_extension_requires_delimiter() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_dataset(dir.path(), "data.txt", "aa,1\n");

    assert!(matches!(
        Index::build(&path),
        Err(Error::UnknownDelimiter(_))
    ));
    let idx = Index::build_with_options(
        &path,
        IndexOptions {
            delimiter: b",".to_vec(),
            ..IndexOptions::default()
        },
    )?;
    assert_eq!(idx.list.len(), 1);
    Ok(())
}

#[test]
fn write_then_load_round_trips() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut content = String::new();
    for i in 0..500 {
        content.push_str(&format!("key{:04},value{}\n", i, i));
    }
    let path = write_dataset(dir.path(), "roundtrip.csv", &content);

    let built = Index::build_with_options(
        &path,
        IndexOptions {
            blocksize: Some(256),
            ..IndexOptions::default()
        },
    )?;
    built.write()?;

    let loaded = Index::load(&path)?;
    assert_eq!(loaded.blocksize, built.blocksize);
    assert_eq!(loaded.delimiter, built.delimiter);
    assert_eq!(loaded.epoch, built.epoch);
    assert_eq!(loaded.filename, built.filename);
    assert_eq!(loaded.header, built.header);
    assert_eq!(loaded.header_fields, built.header_fields);
    assert_eq!(loaded.keys_index_first, built.keys_index_first);
    assert_eq!(loaded.keys_unique, built.keys_unique);
    assert_eq!(loaded.version, built.version);
    assert_eq!(loaded.list, built.list);
    Ok(())
}

#[test]
fn keys_with_special_bytes_round_trip() -> Result<()> {
    let dir = tempfile::tempdir()?;
    // Tab-delimited so keys may contain quotes, backslashes and commas.
    let path = write_dataset(
        dir.path(),
        "quoted.tsv",
        "\"quoted\"\tone\n\\slash\\\ttwo\ncomma,key\tthree\n",
    );

    let built = Index::build(&path)?;
    built.write()?;
    let loaded = Index::load(&path)?;
    assert_eq!(loaded.list, built.list);
    assert_eq!(loaded.list[0].key, "\"quoted\"");
    Ok(())
}

#[test]
fn build_is_idempotent() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut content = String::new();
    for i in 0..200 {
        content.push_str(&format!("k{:03},{}\n", i, i));
    }
    let path = write_dataset(dir.path(), "idem.csv", &content);

    let opts = IndexOptions {
        blocksize: Some(128),
        ..IndexOptions::default()
    };
    let first = Index::build_with_options(&path, opts.clone())?;
    let second = Index::build_with_options(&path, opts)?;
    assert_eq!(first.list, second.list);
    Ok(())
}

#[test]
fn load_without_sidecar_is_not_found() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_dataset(dir.path(), "fresh.csv", "aa,1\n");
    assert!(matches!(Index::load(&path), Err(Error::IndexNotFound)));
    Ok(())
}

#[test]
fn stale_sidecar_is_expired() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_dataset(dir.path(), "stale.csv", "aa,1\nbb,2\n");

    let mut idx = Index::build(&path)?;
    // Backdate the recorded epoch instead of waiting for mtime to move.
    idx.epoch -= 10;
    idx.write()?;

    assert!(matches!(Index::load(&path), Err(Error::IndexExpired)));
    Ok(())
}

#[test]
fn sidecar_for_other_dataset_is_mismatched() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_dataset(dir.path(), "orig.csv", "aa,1\nbb,2\n");
    let idx = Index::build(&path)?;
    idx.write()?;

    // Rename the dataset and move its sidecar alongside; the recorded
    // Filename no longer matches.
    let moved = dir.path().join("moved.csv");
    fs::rename(&path, &moved)?;
    fs::rename(
        dir.path().join("orig_csv.bsy"),
        dir.path().join("moved_csv.bsy"),
    )?;

    assert!(matches!(
        Index::load(&moved),
        Err(Error::IndexPathMismatch { .. })
    ));
    Ok(())
}

#[test]
fn legacy_header_fields_are_mapped() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_dataset(dir.path(), "legacy.csv", "aa,1\nbb,2\n");

    // A version-3 style sidecar: Filepath instead of Filename, no Version.
    let epoch = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)?
        .as_secs()
        + 60;
    let header = format!(
        "{{\"Blocksize\":4096,\"Delimiter\":\",\",\"Epoch\":{},\"Filepath\":\"{}\",\"Header\":false,\"KeysIndexFirst\":true,\"KeysUnique\":true}}",
        epoch,
        path.display()
    );
    fs::write(
        dir.path().join("legacy_csv.bsy"),
        format!("{}\n0\t\"aa\"\n", header),
    )?;

    let idx = Index::load(&path)?;
    assert_eq!(idx.filename, "legacy.csv");
    assert_eq!(idx.version, 1);
    assert_eq!(idx.list.len(), 1);
    assert_eq!(idx.delimiter, b",");
    Ok(())
}

#[test]
fn truncated_sidecar_is_malformed() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_dataset(dir.path(), "trunc.csv", "aa,1\nbb,2\n");
    let idx = Index::build(&path)?;
    idx.write()?;

    // Claim more entries than are present.
    let sidecar = dir.path().join("trunc_csv.bsy");
    let contents = fs::read_to_string(&sidecar)?;
    let bumped = contents.replacen("\"Length\":1", "\"Length\":7", 1);
    assert_ne!(contents, bumped);
    fs::write(&sidecar, bumped)?;

    assert!(matches!(Index::load(&path), Err(Error::IndexMalformed(_))));
    Ok(())
}

#[test]
fn serialized_form_is_header_line_plus_entries() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut content = String::new();
    for i in 0..100 {
        content.push_str(&format!("key{:03},{}\n", i, i));
    }
    let path = write_dataset(dir.path(), "form.csv", &content);
    let idx = Index::build_with_options(
        &path,
        IndexOptions {
            blocksize: Some(256),
            ..IndexOptions::default()
        },
    )?;

    let mut out = Vec::new();
    idx.write_to(&mut out)?;
    let text = String::from_utf8(out)?;
    let mut lines = text.lines();

    let header = lines.next().unwrap();
    assert!(header.starts_with('{') && header.ends_with('}'));
    assert!(header.contains("\"Version\":4"));
    assert!(header.contains("\"Filename\":\"form.csv\""));
    assert!(header.contains(&format!("\"Length\":{}", idx.list.len())));

    let entry_lines: Vec<&str> = lines.collect();
    assert_eq!(entry_lines.len(), idx.list.len());
    assert_eq!(entry_lines[0], "0\t\"key000\"");
    for line in entry_lines {
        let (off, key) = line.split_once('\t').unwrap();
        off.parse::<u64>()?;
        assert!(key.starts_with('"') && key.ends_with('"'));
    }
    Ok(())
}

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::*;

use hrot::*;

/// A bare-bones packer: header, then file data, then the table of contents.
fn pack(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut data = Vec::new();
    let mut toc = Vec::new();
    for (name, contents) in files {
        let offset = (HEADER_SIZE + data.len()) as u32;
        data.extend_from_slice(contents);
        toc.extend_from_slice(&record(name.as_bytes(), offset, contents.len() as u32));
    }
    let mut bytes = header((HEADER_SIZE + data.len()) as u32, toc.len() as u32);
    bytes.extend_from_slice(&data);
    bytes.extend_from_slice(&toc);
    bytes
}

fn header(toc_offset: u32, toc_size: u32) -> Vec<u8> {
    let mut bytes = MAGIC.to_vec();
    bytes.extend_from_slice(&toc_offset.to_le_bytes());
    bytes.extend_from_slice(&toc_size.to_le_bytes());
    bytes
}

fn record(name: &[u8], offset: u32, size: u32) -> Vec<u8> {
    let mut bytes = vec![0; RECORD_SIZE];
    bytes[..name.len()].copy_from_slice(name);
    bytes[NAME_SIZE..NAME_SIZE + 4].copy_from_slice(&offset.to_le_bytes());
    bytes[NAME_SIZE + 4..].copy_from_slice(&size.to_le_bytes());
    bytes
}

/// Writes the archive to disk, then maps it and extracts it into `out`.
fn extract_file(bytes: &[u8], scratch: &Path, out: &Path, jobs: usize) -> Result<ExtractReport> {
    let pack_path = scratch.join("test.pak");
    fs::write(&pack_path, bytes)?;

    info!("Extracting {} into {}", pack_path.display(), out.display());
    let source = ArchiveSource::open(&pack_path).context("Couldn't open pack")?;
    let archive = HrotArchive::new(&source).context("Couldn't load archive")?;
    let sink = DirectorySink::new(out)?;
    let options = ExtractOptions { jobs, cancel: None };
    Ok(extract(&archive, &sink, &options)?)
}

/// Reads back every file under `root`, keyed by `/`-separated relative path.
fn read_tree(root: &Path) -> Result<BTreeMap<String, Vec<u8>>> {
    fn walk(root: &Path, dir: &Path, files: &mut BTreeMap<String, Vec<u8>>) -> Result<()> {
        for dir_entry in fs::read_dir(dir)? {
            let path = dir_entry?.path();
            if path.is_dir() {
                walk(root, &path, files)?;
            } else {
                let relative = path.strip_prefix(root)?;
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                files.insert(key, fs::read(&path)?);
            }
        }
        Ok(())
    }

    let mut files = BTreeMap::new();
    if root.exists() {
        walk(root, root, &mut files)?;
    }
    Ok(files)
}

#[test]
fn single_entry() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    // Header, 12 bytes of payload at offset 12, then one record at offset 24.
    let mut bytes = header(24, 128);
    bytes.extend_from_slice(b"twelve bytes");
    bytes.extend_from_slice(&record(b"a/b.txt", 12, 12));
    assert_eq!(bytes.len(), 152);

    let tempdir = tempfile::tempdir()?;
    let out = tempdir.path().join("out");
    let report = extract_file(&bytes, tempdir.path(), &out, 1)?;
    assert!(report.is_complete());
    assert_eq!(report.extracted, 1);

    let files = read_tree(&out)?;
    assert_eq!(files.len(), 1);
    assert_eq!(files["a/b.txt"], b"twelve bytes");
    Ok(())
}

#[test]
fn round_trip() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let big: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
    let files: &[(&str, &[u8])] = &[
        ("readme.txt", b"Read me!"),
        ("textures\\walls\\brick.dds", &big),
        ("textures\\walls\\empty.dds", b""),
        ("sounds/step.wav", b"RIFF...."),
        ("./levels/e1m1.map", b"{ }"),
    ];
    let expected: &[(&str, &[u8])] = &[
        ("readme.txt", b"Read me!"),
        ("textures/walls/brick.dds", &big),
        ("textures/walls/empty.dds", b""),
        ("sounds/step.wav", b"RIFF...."),
        ("levels/e1m1.map", b"{ }"),
    ];
    let expected: BTreeMap<String, Vec<u8>> = expected
        .iter()
        .map(|(name, contents)| (name.to_string(), contents.to_vec()))
        .collect();
    let bytes = pack(files);

    let tempdir = tempfile::tempdir()?;
    for jobs in [1, 4] {
        let out = tempdir.path().join(format!("out-{}", jobs));
        let report = extract_file(&bytes, tempdir.path(), &out, jobs)?;
        assert!(report.is_complete(), "{:?}", report);
        assert_eq!(report.extracted, files.len());
        assert_eq!(read_tree(&out)?, expected);
    }
    Ok(())
}

#[test]
fn bad_magic_writes_nothing() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    for magic in [b"hrot", b"PK\x03\x04", b"\0\0\0\0", b"TORH"] {
        let mut bytes = pack(&[("a.txt", b"a")]);
        bytes[..4].copy_from_slice(magic);

        let tempdir = tempfile::tempdir()?;
        let out = tempdir.path().join("out");
        match extract_file(&bytes, tempdir.path(), &out, 1) {
            Err(e) => match e.downcast_ref::<HrotError>() {
                Some(HrotError::InvalidMagic(m)) => assert_eq!(m, magic),
                other => panic!("Expected bad magic, got {:?}", other),
            },
            Ok(report) => panic!("Extracted an archive with bad magic: {:?}", report),
        }
        assert!(read_tree(&out)?.is_empty());
    }
    Ok(())
}

#[test]
fn out_of_range_entry_is_skipped() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut bytes = header(12 + 3, 3 * RECORD_SIZE as u32);
    bytes.extend_from_slice(b"abc");
    bytes.extend_from_slice(&record(b"ok.txt", 12, 3));
    bytes.extend_from_slice(&record(b"too-big.txt", 12, 1 << 20));
    bytes.extend_from_slice(&record(b"wraps.txt", u32::MAX, 2));

    let tempdir = tempfile::tempdir()?;
    let out = tempdir.path().join("out");
    let report = extract_file(&bytes, tempdir.path(), &out, 1)?;

    assert_eq!(report.extracted, 1);
    assert_eq!(report.skipped.len(), 2);
    for skipped in &report.skipped {
        assert!(matches!(skipped.error, HrotError::InvalidEntryRange { .. }));
    }
    assert_eq!(report.skipped[0].name, "too-big.txt");
    assert_eq!(report.skipped[1].index, 2);

    let files = read_tree(&out)?;
    assert_eq!(files.keys().collect::<Vec<_>>(), vec!["ok.txt"]);
    Ok(())
}

#[test]
fn traversal_is_refused() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let bytes = pack(&[
        ("../escaped.txt", b"nope"),
        ("a/../../escaped.txt", b"nope"),
        ("..\\escaped.txt", b"nope"),
        ("/tmp/escaped.txt", b"nope"),
        ("inside.txt", b"fine"),
    ]);

    let tempdir = tempfile::tempdir()?;
    let out = tempdir.path().join("nested").join("out");
    let report = extract_file(&bytes, tempdir.path(), &out, 2)?;

    assert_eq!(report.extracted, 1);
    assert_eq!(report.skipped.len(), 4);
    for skipped in &report.skipped {
        assert!(matches!(skipped.error, HrotError::UnsafeEntryPath { .. }));
    }
    assert!(!tempdir.path().join("escaped.txt").exists());
    assert!(!tempdir.path().join("nested").join("escaped.txt").exists());
    assert_eq!(
        read_tree(tempdir.path().join("nested").as_path())?
            .keys()
            .collect::<Vec<_>>(),
        vec!["out/inside.txt"]
    );
    Ok(())
}

#[test]
fn extraction_is_idempotent() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let bytes = pack(&[("x/y/z.bin", &[7; 300]), ("x/w.txt", b"w")]);
    let tempdir = tempfile::tempdir()?;
    let out = tempdir.path().join("out");

    extract_file(&bytes, tempdir.path(), &out, 1)?;
    let first = read_tree(&out)?;
    extract_file(&bytes, tempdir.path(), &out, 4)?;
    let second = read_tree(&out)?;

    assert_eq!(first.len(), 2);
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn toc_remainder_is_ignored() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    // A 200-byte TOC holds one whole record and 72 leftover bytes.
    let mut bytes = header(24, 200);
    bytes.extend_from_slice(b"twelve bytes");
    bytes.extend_from_slice(&record(b"a/b.txt", 12, 12));
    bytes.extend_from_slice(&[0xaa; 72]);

    let tempdir = tempfile::tempdir()?;
    let out = tempdir.path().join("out");
    let report = extract_file(&bytes, tempdir.path(), &out, 1)?;
    assert!(report.is_complete());
    assert_eq!(report.total(), 1);
    assert_eq!(read_tree(&out)?["a/b.txt"], b"twelve bytes");

    // ...unless we ask for strictness.
    assert!(matches!(
        HrotArchive::strict(&bytes),
        Err(HrotError::CorruptToc(_))
    ));
    Ok(())
}

#[test]
fn duplicate_names_extract_the_same_way_every_time() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    // 64 records all named dup.bin, each with its own contents,
    // plus a record that wants dup.bin to be a directory.
    let contents: Vec<Vec<u8>> = (0..64u8).map(|i| vec![i; 1000 + i as usize]).collect();
    let mut files: Vec<(&str, &[u8])> = contents.iter().map(|c| ("dup.bin", &c[..])).collect();
    files.push(("dup.bin/inner.txt", &b"nope"[..]));
    let bytes = pack(&files);

    let tempdir = tempfile::tempdir()?;
    for run in 0..8 {
        let out = tempdir.path().join(format!("out-{}", run));
        let report = extract_file(&bytes, tempdir.path(), &out, 8)?;

        assert_eq!(report.extracted, 1);
        assert_eq!(report.skipped.len(), 64);
        let skipped: Vec<usize> = report.skipped.iter().map(|s| s.index).collect();
        assert_eq!(skipped, (1..65).collect::<Vec<_>>());
        for s in &report.skipped {
            assert!(
                matches!(s.error, HrotError::DuplicateEntry { first: 0, .. }),
                "{:?}",
                s.error
            );
        }

        let tree = read_tree(&out)?;
        assert_eq!(tree.len(), 1);
        assert_eq!(tree["dup.bin"], contents[0]);
    }
    Ok(())
}

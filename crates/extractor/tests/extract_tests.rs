use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};
use zipstage::{extract, ErrorKind, ExtractError, ExtractOptions, Extraction, NoPassword, Password};

/// Helper to build a ZIP archive in memory
fn create_zip(files: &[(&str, &[u8])], options: SimpleFileOptions) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    for (name, content) in files {
        if name.ends_with('/') {
            zip.add_directory(*name, options).unwrap();
        } else {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content).unwrap();
        }
    }

    zip.finish().unwrap().into_inner()
}

fn deflated() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

fn binary_blob() -> Vec<u8> {
    (0..4096u32).map(|i| (i * 31 % 251) as u8).collect()
}

fn extract_plain(data: Vec<u8>, cache: &Path) -> Result<Extraction, ExtractError> {
    let progress_cb = |_file: &str, _bytes: u64, _total: Option<u64>| true;
    extract(
        Cursor::new(data),
        cache,
        NoPassword,
        &ExtractOptions::default(),
        &progress_cb,
        Arc::new(AtomicBool::new(false)),
    )
}

fn extract_with_password(
    data: Vec<u8>,
    cache: &Path,
    password: Option<&str>,
    asked: &AtomicUsize,
) -> Result<Extraction, ExtractError> {
    let progress_cb = |_file: &str, _bytes: u64, _total: Option<u64>| true;
    let oracle = || {
        asked.fetch_add(1, Ordering::SeqCst);
        password.map(Password::from)
    };
    extract(
        Cursor::new(data),
        cache,
        oracle,
        &ExtractOptions::default(),
        &progress_cb,
        Arc::new(AtomicBool::new(false)),
    )
}

/// Hand-built local file header, for entries the zip writer refuses to produce
fn local_entry(name: &str, flags: u16, method: u16, crc: u32, sizes: (u32, u32), payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&0x0403_4B50u32.to_le_bytes());
    buf.extend_from_slice(&20u16.to_le_bytes());
    buf.extend_from_slice(&flags.to_le_bytes());
    buf.extend_from_slice(&method.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes());
    buf.extend_from_slice(&crc.to_le_bytes());
    buf.extend_from_slice(&sizes.0.to_le_bytes());
    buf.extend_from_slice(&sizes.1.to_le_bytes());
    buf.extend_from_slice(&(name.len() as u16).to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes());
    buf.extend_from_slice(name.as_bytes());
    buf.extend_from_slice(payload);
    buf
}

const END_OF_CENTRAL_DIR: [u8; 4] = 0x0605_4B50u32.to_le_bytes();

#[test]
fn test_extract_scenario_tree() {
    let temp_dir = TempDir::new().unwrap();
    let png = binary_blob();
    let data = create_zip(&[("a.txt", b"hi"), ("sub/", b""), ("sub/b.png", png.as_slice())], deflated());

    let extraction = extract_plain(data, temp_dir.path()).unwrap();
    let root = extraction.root.path();

    assert_eq!(root.parent().unwrap(), temp_dir.path());
    assert_eq!(fs::read(root.join("a.txt")).unwrap(), b"hi");
    assert_eq!(fs::read(root.join("sub/b.png")).unwrap(), png);

    let mut top: Vec<_> = fs::read_dir(root)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    top.sort();
    assert_eq!(top, vec!["a.txt", "sub"]);

    assert_eq!(extraction.stats.files_extracted, 2);
    assert_eq!(extraction.stats.bytes_written, 2 + png.len() as u64);
}

#[test]
fn test_extract_stored_and_bzip2() {
    let temp_dir = TempDir::new().unwrap();
    let content = b"The quick brown fox jumps over the lazy dog. ".repeat(50);

    for method in [CompressionMethod::Stored, CompressionMethod::Bzip2] {
        let options = SimpleFileOptions::default().compression_method(method);
        let data = create_zip(&[("fox.txt", content.as_slice())], options);

        let extraction = extract_plain(data, temp_dir.path()).unwrap();
        assert_eq!(
            fs::read(extraction.root.path().join("fox.txt")).unwrap(),
            content,
            "{:?}",
            method
        );
    }
}

#[test]
fn test_directory_markers_do_not_create_files() {
    let temp_dir = TempDir::new().unwrap();
    let data = create_zip(&[("empty/", b""), ("docs/", b""), ("docs/a.txt", b"a")], deflated());

    let extraction = extract_plain(data, temp_dir.path()).unwrap();
    let root = extraction.root.path();

    // Directories only appear as parents of files
    assert!(!root.join("empty").exists());
    assert!(root.join("docs").is_dir());
    assert!(root.join("docs/a.txt").is_file());
    assert_eq!(extraction.stats.files_extracted, 1);
}

#[test]
fn test_two_extractions_use_different_roots() {
    let temp_dir = TempDir::new().unwrap();
    let data = create_zip(&[("a.txt", b"hi")], deflated());

    let first = extract_plain(data.clone(), temp_dir.path()).unwrap();
    let second = extract_plain(data, temp_dir.path()).unwrap();

    assert_ne!(first.root.path(), second.root.path());
    assert_ne!(first.root.id(), second.root.id());
    assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 2);
}

/// Archives written by Info-ZIP `zip` (`-P s3cret`), to a file and to a pipe
const ENCRYPTED_FIXTURES: [&str; 2] = ["encrypted.zip", "encrypted-piped.zip"];

fn fixture(name: &str) -> Vec<u8> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name);
    fs::read(&path).unwrap_or_else(|e| panic!("{}: {}", path.display(), e))
}

fn notes_txt() -> Vec<u8> {
    b"Streaming extraction keeps the archive order. ".repeat(20)
}

fn assert_fixture_tree(extraction: &Extraction) {
    let root = extraction.root.path();
    assert_eq!(fs::read(root.join("notes.txt")).unwrap(), notes_txt());
    assert_eq!(fs::read(root.join("sub/b.txt")).unwrap(), b"hi");
    assert_eq!(fs::read(root.join("empty.txt")).unwrap(), b"");
    assert_eq!(extraction.stats.files_extracted, 3);
    assert_eq!(extraction.stats.bytes_written, 922);
}

#[test]
fn test_encrypted_archive_with_correct_password() {
    for name in ENCRYPTED_FIXTURES {
        let temp_dir = TempDir::new().unwrap();
        let asked = AtomicUsize::new(0);

        let extraction = extract_with_password(fixture(name), temp_dir.path(), Some("s3cret"), &asked)
            .unwrap_or_else(|e| panic!("{}: {:?}", name, e));

        assert_fixture_tree(&extraction);
        // One prompt for the whole archive
        assert_eq!(asked.load(Ordering::SeqCst), 1, "{}", name);
    }
}

#[test]
fn test_encrypted_archive_with_wrong_password() {
    for name in ENCRYPTED_FIXTURES {
        let temp_dir = TempDir::new().unwrap();
        let asked = AtomicUsize::new(0);

        let err = extract_with_password(fixture(name), temp_dir.path(), Some("wrong"), &asked)
            .unwrap_err();

        assert!(
            matches!(&err, ExtractError::InvalidPassword(entry) if entry == "notes.txt"),
            "{}: {:?}",
            name,
            err
        );
        assert_eq!(err.kind(), ErrorKind::ExtractionFailed);
        assert_eq!(asked.load(Ordering::SeqCst), 1);
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }
}

#[test]
fn test_encrypted_archive_prompt_cancelled() {
    let temp_dir = TempDir::new().unwrap();
    let asked = AtomicUsize::new(0);

    let result = extract_with_password(fixture("encrypted.zip"), temp_dir.path(), None, &asked);

    assert!(matches!(result, Err(ExtractError::PasswordRequired)));
    assert_eq!(asked.load(Ordering::SeqCst), 1);
    assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
}

#[test]
fn test_mixed_archive_asks_only_at_first_encrypted_entry() {
    // plain.txt added without a password, hidden.txt with `zip -P pw`
    let temp_dir = TempDir::new().unwrap();
    let asked = AtomicUsize::new(0);

    let extraction = extract_with_password(fixture("mixed.zip"), temp_dir.path(), Some("pw"), &asked).unwrap();

    assert_eq!(fs::read(extraction.root.path().join("plain.txt")).unwrap(), b"visible");
    assert_eq!(
        fs::read(extraction.root.path().join("hidden.txt")).unwrap(),
        b"hidden hidden hidden"
    );
    assert_eq!(asked.load(Ordering::SeqCst), 1);
}

#[test]
fn test_piped_zip_output() {
    // `zip -r - . | cat`: every entry, the empty stored one included, ends in a descriptor
    let temp_dir = TempDir::new().unwrap();

    let extraction = extract_plain(fixture("piped.zip"), temp_dir.path()).unwrap();

    assert_fixture_tree(&extraction);
}

#[test]
fn test_streamed_stored_entries() {
    // Written by Python's zipfile to a non-seekable stream; a.txt holds a descriptor signature
    let temp_dir = TempDir::new().unwrap();

    let extraction = extract_plain(fixture("streamed-stored.zip"), temp_dir.path()).unwrap();
    let root = extraction.root.path();

    assert_eq!(
        fs::read(root.join("dd/a.txt")).unwrap(),
        b"PK\x07\x08 looks like a descriptor but is data"
    );
    assert_eq!(fs::read(root.join("dd/empty.txt")).unwrap(), b"");
    assert_eq!(extraction.stats.files_extracted, 2);
}

#[test]
fn test_directory_marker_with_descriptor() {
    let temp_dir = TempDir::new().unwrap();
    let mut data = local_entry("docs/", 0x0008, 0, 0, (0, 0), b"");
    data.extend_from_slice(&0x0807_4B50u32.to_le_bytes());
    data.extend_from_slice(&[0u8; 12]);
    data.extend(local_entry("docs/a.txt", 0, 0, crc32fast::hash(b"a"), (1, 1), b"a"));
    data.extend_from_slice(&END_OF_CENTRAL_DIR);

    let extraction = extract_plain(data, temp_dir.path()).unwrap();

    assert_eq!(fs::read(extraction.root.path().join("docs/a.txt")).unwrap(), b"a");
    assert_eq!(extraction.stats.files_extracted, 1);
}

#[test]
fn test_path_traversal_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let cache = temp_dir.path().join("cache");
    let payload = b"pwned";
    let mut data = local_entry("ok.txt", 0, 0, crc32fast::hash(b"ok"), (2, 2), b"ok");
    data.extend(local_entry(
        "../../../etc/evil",
        0,
        0,
        crc32fast::hash(payload),
        (payload.len() as u32, payload.len() as u32),
        payload,
    ));
    data.extend_from_slice(&END_OF_CENTRAL_DIR);

    let err = extract_plain(data, &cache).unwrap_err();

    assert!(matches!(err, ExtractError::Security(_)));
    assert_eq!(err.kind(), ErrorKind::ExtractionFailed);
    // Nothing outside the cache, and the partial root is gone
    assert_eq!(fs::read_dir(&cache).unwrap().count(), 0);
    assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 1);
}

#[test]
fn test_truncated_archive() {
    let temp_dir = TempDir::new().unwrap();
    let big = binary_blob();
    let data = create_zip(&[("a.txt", b"hi"), ("big.bin", big.as_slice())], deflated());

    for cut in [10, 60, data.len() / 2] {
        let err = extract_plain(data[..cut].to_vec(), temp_dir.path()).unwrap_err();
        assert!(
            matches!(err.kind(), ErrorKind::Truncated | ErrorKind::IoError),
            "cut at {}: {:?}",
            cut,
            err
        );
    }
    assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
}

#[test]
fn test_not_a_zip() {
    let temp_dir = TempDir::new().unwrap();
    let err = extract_plain(b"%PDF-1.4\n...".to_vec(), temp_dir.path()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedHeader);
}

#[test]
fn test_empty_archive() {
    let temp_dir = TempDir::new().unwrap();
    let data = create_zip(&[], deflated());

    let extraction = extract_plain(data, temp_dir.path()).unwrap();
    assert!(extraction.root.path().is_dir());
    assert_eq!(fs::read_dir(extraction.root.path()).unwrap().count(), 0);
}

#[test]
fn test_data_descriptor_entry() {
    use flate2::write::DeflateEncoder;
    use flate2::Compression;

    let temp_dir = TempDir::new().unwrap();
    let content = b"written by a streaming zipper ".repeat(20);
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&content).unwrap();
    let compressed = encoder.finish().unwrap();

    let mut data = local_entry("streamed.txt", 0x0008, 8, 0, (0, 0), &compressed);
    data.extend_from_slice(&0x0807_4B50u32.to_le_bytes());
    data.extend_from_slice(&crc32fast::hash(&content).to_le_bytes());
    data.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
    data.extend_from_slice(&(content.len() as u32).to_le_bytes());
    data.extend(local_entry("after.txt", 0, 0, crc32fast::hash(b"next"), (4, 4), b"next"));
    data.extend_from_slice(&END_OF_CENTRAL_DIR);

    let extraction = extract_plain(data, temp_dir.path()).unwrap();
    assert_eq!(
        fs::read(extraction.root.path().join("streamed.txt")).unwrap(),
        content
    );
    assert_eq!(fs::read(extraction.root.path().join("after.txt")).unwrap(), b"next");
}

#[test]
fn test_unsupported_method() {
    let temp_dir = TempDir::new().unwrap();
    let mut data = local_entry("a.lzma", 0, 14, 0, (1, 1), b"x");
    data.extend_from_slice(&END_OF_CENTRAL_DIR);

    let err = extract_plain(data, temp_dir.path()).unwrap_err();
    assert!(matches!(err, ExtractError::UnsupportedEntry { .. }));
    assert_eq!(err.kind(), ErrorKind::ExtractionFailed);
}

#[test]
fn test_size_limit_exceeded() {
    let temp_dir = TempDir::new().unwrap();
    let data = create_zip(&[("big.bin", binary_blob().as_slice())], deflated());
    let options = ExtractOptions {
        size_limit_bytes: Some(1024),
        ..Default::default()
    };
    let progress_cb = |_file: &str, _bytes: u64, _total: Option<u64>| true;

    let result = extract(
        Cursor::new(data),
        temp_dir.path(),
        NoPassword,
        &options,
        &progress_cb,
        Arc::new(AtomicBool::new(false)),
    );

    assert!(matches!(
        result,
        Err(ExtractError::SizeLimitExceeded { limit: 1024, .. })
    ));
}

#[test]
fn test_extract_from_file() {
    let temp_dir = TempDir::new().unwrap();
    let archive_path = temp_dir.path().join("test.zip");
    fs::write(&archive_path, create_zip(&[("test.txt", b"Hello, World!")], deflated())).unwrap();

    let progress_cb = |_file: &str, _bytes: u64, _total: Option<u64>| true;
    let extraction = extract(
        fs::File::open(&archive_path).unwrap(),
        &temp_dir.path().join("cache"),
        NoPassword,
        &ExtractOptions::default(),
        &progress_cb,
        Arc::new(AtomicBool::new(false)),
    )
    .unwrap();

    let content = fs::read_to_string(extraction.root.path().join("test.txt")).unwrap();
    assert_eq!(content, "Hello, World!");

    extraction.root.remove().unwrap();
    assert_eq!(fs::read_dir(temp_dir.path().join("cache")).unwrap().count(), 0);
}

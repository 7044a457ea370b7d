//! Integration tests for PDF stream patching

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use pdf_stream_patch::pdf::codec::{self, DEFAULT_ZLIB_HEADER, FINAL_STORED_BLOCK};
use pdf_stream_patch::pdf::patch::assemble;
use pdf_stream_patch::pdf::{find_streams, replace_in_pdf, ReplaceOptions};
use pdf_stream_patch::Error;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

const PAGE_ONE: &[u8] = b"BT /F1 24 Tf 72 720 Td (Hello World) Tj ET";
const PAGE_TWO: &[u8] = b"BT /F1 24 Tf 72 700 Td (Second page text) Tj ET";

/// FlateDecode data for `content` with room for `expected` plus four padding blocks
///
/// Producers normally leave no slack at all, so fixtures are built the way a
/// patch-friendly producer would write them.
fn slack_stream(content: &[u8], expected: &[u8]) -> Vec<u8> {
    let raw = codec::compress_raw(content).unwrap();
    let expected_raw = codec::compress_raw(expected).unwrap();

    let base = 2 + raw.len() + FINAL_STORED_BLOCK.len() + 4;
    let target = 2 + expected_raw.len() + FINAL_STORED_BLOCK.len() + 4 + 20;

    let checksum = codec::adler32(content);
    let mut stream = assemble(DEFAULT_ZLIB_HEADER, &raw, (target - base) / 5, checksum);
    stream.resize(target, 0);
    stream
}

/// Build a PDF with one page per content stream, returning its bytes and the stream ids
fn build_pdf(contents: &[Vec<u8>]) -> (Vec<u8>, Vec<ObjectId>) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids = Vec::new();
    let mut stream_ids = Vec::new();
    for data in contents {
        let content_id = doc.add_object(Stream::new(
            dictionary! { "Filter" => "FlateDecode" },
            data.clone(),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(Object::Reference(page_id));
        stream_ids.push(content_id);
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => contents.len() as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("Failed to save fixture PDF");
    (bytes, stream_ids)
}

fn write_fixture(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, bytes).expect("Failed to write fixture");
    path
}

fn sha256(path: &Path) -> Vec<u8> {
    Sha256::digest(fs::read(path).unwrap()).to_vec()
}

fn stream_content(bytes: &[u8], id: ObjectId) -> Vec<u8> {
    let doc = Document::load_mem(bytes).expect("Patched PDF should still load");
    let stream = doc.get_object(id).unwrap().as_stream().unwrap();
    stream.decompressed_content().expect("Patched stream should decode")
}

fn options(path: &Path, old: &[u8], new: &[u8]) -> ReplaceOptions {
    ReplaceOptions {
        path: path.to_path_buf(),
        old: old.to_vec(),
        new: new.to_vec(),
        dry_run: false,
    }
}

#[test]
fn test_hello_world_becomes_hello_earth() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let (pdf, ids) = build_pdf(&[slack_stream(b"Hello World", b"Hello Earth")]);
    let path = write_fixture(&dir, "hello.pdf", &pdf);

    let report = replace_in_pdf(&options(&path, b"World", b"Earth")).expect("Failed to patch");
    assert!(report.written);
    assert_eq!(report.patched.len(), 1);

    let patched = fs::read(&path).unwrap();
    assert_eq!(patched.len(), pdf.len());
    assert_eq!(stream_content(&patched, ids[0]), b"Hello Earth");
}

#[test]
fn test_bytes_outside_stream_untouched() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let expected = b"BT /F1 24 Tf 72 720 Td (Hello Earth) Tj ET";
    let (pdf, _) = build_pdf(&[slack_stream(PAGE_ONE, expected)]);
    let path = write_fixture(&dir, "page.pdf", &pdf);

    let report = replace_in_pdf(&options(&path, b"World", b"Earth")).unwrap();
    let range = report.patched[0].clone();

    let patched = fs::read(&path).unwrap();
    assert_eq!(patched[..range.start], pdf[..range.start]);
    assert_eq!(patched[range.end..], pdf[range.end..]);
    assert_ne!(patched[range.clone()], pdf[range]);
}

#[test]
fn test_absent_text_leaves_file_untouched() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let (pdf, _) = build_pdf(&[slack_stream(b"Hello World", b"Hello World")]);
    let path = write_fixture(&dir, "hello.pdf", &pdf);
    let before = sha256(&path);

    let err = replace_in_pdf(&options(&path, b"Planet", b"Earth")).unwrap_err();
    assert!(matches!(err, Error::NotFound));
    assert_eq!(err.exit_code(), 1);
    assert_eq!(sha256(&path), before);
}

#[test]
fn test_oversized_replacement_leaves_file_untouched() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let (pdf, _) = build_pdf(&[slack_stream(b"Hello World", b"Hello Earth")]);
    let path = write_fixture(&dir, "hello.pdf", &pdf);
    let before = sha256(&path);

    let long: Vec<u8> = (0..400u32).map(|i| (i * 131 % 256) as u8).collect();
    let err = replace_in_pdf(&options(&path, b"World", &long)).unwrap_err();

    assert!(matches!(err, Error::SizeExceeded { .. }));
    assert_eq!(err.exit_code(), 2);
    assert_eq!(sha256(&path), before);
}

#[test]
fn test_uneven_slack_leaves_file_untouched() {
    let dir = TempDir::new().expect("Failed to create temp directory");

    // Three extra trailing bytes leave 23 spare bytes, not a whole number of blocks
    let mut stream = slack_stream(b"Hello World", b"Hello Earth");
    stream.extend_from_slice(&[0; 3]);
    let (pdf, _) = build_pdf(&[stream]);
    let path = write_fixture(&dir, "uneven.pdf", &pdf);
    let before = sha256(&path);

    let err = replace_in_pdf(&options(&path, b"World", b"Earth")).unwrap_err();
    assert!(matches!(err, Error::PaddingMismatch { shortfall: 23, .. }));
    assert_eq!(err.exit_code(), 2);
    assert_eq!(sha256(&path), before);

    let bin = env!("CARGO_BIN_EXE_pdf-stream-patch");
    let status = Command::new(bin).arg(&path).args(["World", "Earth"]).status().unwrap();
    assert_eq!(status.code(), Some(2));
    assert_eq!(sha256(&path), before);
}

#[test]
fn test_empty_pattern_inserts_at_stream_start() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let (pdf, ids) = build_pdf(&[slack_stream(b"Hello World", b"XHello World")]);
    let path = write_fixture(&dir, "hello.pdf", &pdf);

    let report = replace_in_pdf(&options(&path, b"", b"X")).expect("Failed to patch");
    assert_eq!(report.patched.len(), 1);

    let patched = fs::read(&path).unwrap();
    assert_eq!(patched.len(), pdf.len());
    assert_eq!(stream_content(&patched, ids[0]), b"XHello World");
}

#[test]
fn test_target_only_in_second_stream() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let first = slack_stream(PAGE_TWO, PAGE_TWO);
    let second = slack_stream(b"Hello World", b"Hello Earth");
    let (pdf, ids) = build_pdf(&[first.clone(), second.clone()]);
    let path = write_fixture(&dir, "two.pdf", &pdf);

    let report = replace_in_pdf(&options(&path, b"World", b"Earth")).unwrap();
    assert_eq!(report.patched.len(), 1);

    let patched = fs::read(&path).unwrap();
    assert_eq!(patched.len(), pdf.len());

    let doc = Document::load_mem(&patched).unwrap();
    let first_after = &doc.get_object(ids[0]).unwrap().as_stream().unwrap().content;
    let second_after = &doc.get_object(ids[1]).unwrap().as_stream().unwrap().content;

    assert_eq!(first_after, &first);
    assert_ne!(second_after, &second);
    assert_eq!(second_after.len(), second.len());
    assert_eq!(stream_content(&patched, ids[1]), b"Hello Earth");
}

#[test]
fn test_each_stream_gets_first_occurrence_replaced() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let twice = b"(Hello World) Tj (Hello World) Tj".to_vec();
    let once = b"(Hello Earth) Tj (Hello World) Tj".to_vec();
    let (pdf, ids) = build_pdf(&[slack_stream(&twice, &once), slack_stream(&twice, &once)]);
    let path = write_fixture(&dir, "twice.pdf", &pdf);

    let report = replace_in_pdf(&options(&path, b"World", b"Earth")).unwrap();
    assert_eq!(report.patched.len(), 2);

    let patched = fs::read(&path).unwrap();
    assert_eq!(stream_content(&patched, ids[0]), once);
    assert_eq!(stream_content(&patched, ids[1]), once);
}

#[test]
fn test_fatal_stream_blocks_earlier_patches() {
    let dir = TempDir::new().expect("Failed to create temp directory");

    // The first stream fits, the second is a plain zlib stream with no slack
    let fits = slack_stream(b"Hello World", b"Hello Earth");
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(b"Hello World").unwrap();
    let plain = encoder.finish().unwrap();

    let (pdf, _) = build_pdf(&[fits, plain]);
    let path = write_fixture(&dir, "mixed.pdf", &pdf);
    let before = sha256(&path);

    let err = replace_in_pdf(&options(&path, b"World", b"Earth")).unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(sha256(&path), before);
}

#[test]
fn test_fixture_streams_are_located() {
    let (pdf, _) = build_pdf(&[
        slack_stream(PAGE_ONE, PAGE_ONE),
        slack_stream(PAGE_TWO, PAGE_TWO),
    ]);
    let streams = find_streams(&pdf);

    assert!(streams.len() >= 2);
    for pair in streams.windows(2) {
        assert!(pair[0].resume_offset() <= pair[1].dict_start);
    }
}

#[test]
fn test_dry_run_reports_without_writing() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let (pdf, _) = build_pdf(&[slack_stream(b"Hello World", b"Hello Earth")]);
    let path = write_fixture(&dir, "hello.pdf", &pdf);
    let before = sha256(&path);

    let mut opts = options(&path, b"World", b"Earth");
    opts.dry_run = true;
    let report = replace_in_pdf(&opts).unwrap();

    assert!(!report.written);
    assert_eq!(report.patched.len(), 1);
    assert_eq!(sha256(&path), before);
}

#[test]
fn test_cli_exit_codes() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let (pdf, _) = build_pdf(&[slack_stream(b"Hello World", b"Hello Earth")]);
    let path = write_fixture(&dir, "hello.pdf", &pdf);
    let bin = env!("CARGO_BIN_EXE_pdf-stream-patch");

    let status = Command::new(bin).arg(&path).args(["Planet", "Earth"]).status().unwrap();
    assert_eq!(status.code(), Some(1));

    let long: String = (0..400u32)
        .map(|i| char::from(b'!' + ((i * i * 7 + i * 13) % 90) as u8))
        .collect();
    let status = Command::new(bin).arg(&path).args(["World", long.as_str()]).status().unwrap();
    assert_eq!(status.code(), Some(2));

    let status = Command::new(bin).arg(&path).args(["World", "Earth"]).status().unwrap();
    assert_eq!(status.code(), Some(0));

    let patched = fs::read(&path).unwrap();
    assert_eq!(patched.len(), pdf.len());
}

#[test]
fn test_cli_usage_error_exits_one() {
    let bin = env!("CARGO_BIN_EXE_pdf-stream-patch");
    let status = Command::new(bin).arg("only-one-arg.pdf").status().unwrap();
    assert_eq!(status.code(), Some(1));
}

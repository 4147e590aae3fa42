//! Integration tests for the three supported document formats.
//!
//! Builds real PPTX (zip), PDF, and HTML files on disk, indexes them with the
//! offline hash embedder, and checks extracted text and locators.

use std::fs;
use std::io::Write;
use std::path::Path;

use lectern::config::Config;
use lectern::extract::{extract_file, ExtractError};
use lectern::indexer::index_root;
use lectern::store::open_store;
use lectern_core::embedding::HashEmbedder;
use lectern_core::models::{FileType, Locator, MetadataFilter};
use lectern_core::search::search;
use tempfile::TempDir;

const NS: &str = r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships""#;

/// PPTX with one slide per entry of `slides`, listed in presentation order.
fn pptx_with_slides(slides: &[&str]) -> Vec<u8> {
    let ids: String = (0..slides.len())
        .map(|i| format!(r#"<p:sldId id="{}" r:id="rId{}"/>"#, 256 + i, i + 1))
        .collect();
    let rels: String = (0..slides.len())
        .map(|i| {
            format!(
                r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide" Target="slides/slide{}.xml"/>"#,
                i + 1,
                i + 1
            )
        })
        .collect();

    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        let opts = zip::write::SimpleFileOptions::default();

        zip.start_file("ppt/presentation.xml", opts).unwrap();
        write!(
            zip,
            r#"<?xml version="1.0"?><p:presentation {NS}><p:sldIdLst>{ids}</p:sldIdLst></p:presentation>"#
        )
        .unwrap();

        zip.start_file("ppt/_rels/presentation.xml.rels", opts).unwrap();
        write!(
            zip,
            r#"<?xml version="1.0"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{rels}</Relationships>"#
        )
        .unwrap();

        for (i, text) in slides.iter().enumerate() {
            zip.start_file(format!("ppt/slides/slide{}.xml", i + 1), opts)
                .unwrap();
            write!(
                zip,
                r#"<?xml version="1.0"?><p:sld {NS}><p:cSld><p:spTree><p:sp><p:txBody><a:p><a:r><a:t>{text}</a:t></a:r></a:p></p:txBody></p:sp></p:spTree></p:cSld></p:sld>"#
            )
            .unwrap();
        }
        zip.finish().unwrap();
    }
    buf
}

/// Minimal PDF with one page per entry of `pages`.
/// Builds body then xref with correct byte offsets.
fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    let n = pages.len();
    let page_id = |i: usize| 4 + 2 * i;
    let kids: Vec<String> = (0..n).map(|i| format!("{} 0 R", page_id(i))).collect();

    let mut objects: Vec<Vec<u8>> = vec![
        b"<< /Type /Catalog /Pages 2 0 R >>".to_vec(),
        format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids.join(" "), n).into_bytes(),
        b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_vec(),
    ];
    for (i, text) in pages.iter().enumerate() {
        objects.push(
            format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents {} 0 R /Resources << /Font << /F1 3 0 R >> >> >>",
                page_id(i) + 1
            )
            .into_bytes(),
        );
        let content = format!("BT /F1 12 Tf 72 720 Td ({}) Tj ET", text);
        let mut stream = format!("<< /Length {} >>\nstream\n", content.len()).into_bytes();
        stream.extend_from_slice(content.as_bytes());
        stream.extend_from_slice(b"\nendstream");
        objects.push(stream);
    }

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n", i + 1).as_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(b"\nendobj\n");
    }
    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer << /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_start
        )
        .as_bytes(),
    );
    out
}

fn write(root: &Path, rel: &str, bytes: &[u8]) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, bytes).unwrap();
}

fn hash_config() -> Config {
    let mut config = Config::minimal();
    config.embedding.provider = "hash".to_string();
    config
}

#[test]
fn pptx_slides_are_numbered_in_presentation_order() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("deck.pptx");
    fs::write(
        &path,
        pptx_with_slides(&["Welcome", "Overbooking policy", "Questions"]),
    )
    .unwrap();

    let units = extract_file(FileType::Pptx, &path, u64::MAX).unwrap();
    let got: Vec<(&str, Locator)> = units.iter().map(|u| (u.text.as_str(), u.locator)).collect();
    assert_eq!(
        got,
        vec![
            ("Welcome", Locator::Slide(1)),
            ("Overbooking policy", Locator::Slide(2)),
            ("Questions", Locator::Slide(3)),
        ]
    );
}

#[test]
fn pdf_pages_are_numbered_from_one() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("notes.pdf");
    fs::write(&path, pdf_with_pages(&["first page text", "second page text"])).unwrap();

    let units = extract_file(FileType::Pdf, &path, u64::MAX).unwrap();
    assert_eq!(units.len(), 2);
    assert!(units[0].text.contains("first page text"));
    assert_eq!(units[0].locator, Locator::Page(1));
    assert!(units[1].text.contains("second page text"));
    assert_eq!(units[1].locator, Locator::Page(2));
}

#[test]
fn corrupt_pdf_is_an_extraction_error() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("broken.pdf");
    fs::write(&path, b"%PDF-1.4\ngarbage").unwrap();
    assert!(matches!(
        extract_file(FileType::Pdf, &path, u64::MAX),
        Err(ExtractError::Pdf(_))
    ));
}

#[tokio::test]
async fn three_slide_deck_ranks_matching_slide_first() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "HMG6228/Week 4/Revenue.pptx",
        &pptx_with_slides(&[
            "Welcome to the course",
            "Overbooking policy and no-show forecasting",
            "Questions and logistics",
        ]),
    );

    let config = hash_config();
    let embedder = HashEmbedder::default();
    let report = index_root(&config, &embedder, tmp.path()).await.unwrap();
    assert_eq!(report.added, 3);

    let store = open_store(&config, tmp.path()).await.unwrap();
    let hits = search(
        &*store,
        &embedder,
        "overbooking policy",
        1,
        &MetadataFilter::new(),
    )
    .await
    .unwrap();
    assert_eq!(hits.len(), 1);
    let meta = &hits[0].metadata;
    assert_eq!(meta.slide_number, Some(2));
    assert_eq!(meta.filename, "Revenue.pptx");
    assert_eq!(meta.filetype, FileType::Pptx);
    assert_eq!(meta.course, "HMG6228");
    assert_eq!(meta.directory, "HMG6228/Week 4");
}

#[tokio::test]
async fn mixed_corpus_indexes_every_type_with_locators() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "C1/deck.pptx", &pptx_with_slides(&["slide text"]));
    write(
        tmp.path(),
        "C1/reading/notes.pdf",
        &pdf_with_pages(&["alpha", "beta"]),
    );
    write(
        tmp.path(),
        "C2/page.html",
        b"<html><head><title>Syllabus</title></head><body><p>Grading policy</p></body></html>",
    );
    write(tmp.path(), "C2/broken.pptx", b"definitely not a zip");

    let config = hash_config();
    let report = index_root(&config, &HashEmbedder::default(), tmp.path())
        .await
        .unwrap();
    assert_eq!(report.files_indexed, 3);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].path.ends_with("C2/broken.pptx"));

    let store = open_store(&config, tmp.path()).await.unwrap();

    let pdf = store
        .scan(&MetadataFilter::new().with("filetype", ".pdf"))
        .await
        .unwrap();
    let pages: Vec<Option<u32>> = pdf.iter().map(|c| c.metadata.page_number).collect();
    assert_eq!(pages, vec![Some(1), Some(2)]);
    assert!(pdf.iter().all(|c| c.metadata.directory == "C1/reading"));

    let html = store
        .scan(&MetadataFilter::new().with("course", "C2"))
        .await
        .unwrap();
    assert_eq!(html.len(), 1);
    assert_eq!(html[0].metadata.title.as_deref(), Some("Syllabus"));
    assert_eq!(html[0].metadata.slide_number, None);
    assert_eq!(html[0].metadata.page_number, None);
}

//! Per-filetype text extraction.
//!
//! Turns a slide deck, PDF, or HTML page into an ordered list of
//! [`ContentUnit`]s, each with normalized (whitespace-collapsed) text and a
//! locator. Dispatch is a closed `match` over [`FileType`].
//!
//! | Type | Unit | Locator |
//! |------|------|---------|
//! | `.pptx` | one slide: shape text plus presenter notes | 1-based slide position |
//! | `.pdf` | one page | page number from the PDF page tree (1-based) |
//! | `.html` | the whole document body | none |
//!
//! Errors are per file; the indexer records them and moves on. Units whose
//! text is empty after normalization are dropped, and a file with no units
//! is not an error.

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::LazyLock;

use lectern_core::models::{ContentUnit, FileType, Locator};
use quick_xml::events::{BytesStart, Event};
use scraper::{Html, Selector};
use thiserror::Error;
use tracing::warn;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

const NOTES_SLIDE_REL: &str = "/notesSlide";

/// Extraction failure for one file. The file is skipped, the run continues.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("file is {size} bytes, limit is {limit}")]
    TooLarge { size: u64, limit: u64 },
    #[error("invalid PPTX archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("ZIP entry {0} exceeds size limit")]
    EntryTooLarge(String),
    #[error("invalid XML in {entry}: {source}")]
    Xml {
        entry: String,
        #[source]
        source: quick_xml::Error,
    },
    #[error("PDF extraction failed: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("extractor panicked: {0}")]
    Panicked(String),
}

/// Read `path` (refusing files larger than `max_bytes`) and extract it.
pub fn extract_file(
    filetype: FileType,
    path: &Path,
    max_bytes: u64,
) -> Result<Vec<ContentUnit>, ExtractError> {
    let size = std::fs::metadata(path)?.len();
    if size > max_bytes {
        return Err(ExtractError::TooLarge {
            size,
            limit: max_bytes,
        });
    }
    let bytes = std::fs::read(path)?;
    extract(filetype, &bytes)
}

/// Extract content units from an in-memory file.
pub fn extract(filetype: FileType, bytes: &[u8]) -> Result<Vec<ContentUnit>, ExtractError> {
    match filetype {
        FileType::Pptx => extract_pptx(bytes),
        FileType::Pdf => extract_pdf(bytes),
        FileType::Html => Ok(extract_html(bytes)),
    }
}

/// Collapse every whitespace run to a single space and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ============ PPTX ============

type Archive<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

fn read_zip_entry_bounded(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>, ExtractError> {
    let entry = archive.by_name(name)?;
    let mut out = Vec::new();
    entry.take(MAX_XML_ENTRY_BYTES).read_to_end(&mut out)?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::EntryTooLarge(name.to_string()));
    }
    Ok(out)
}

fn read_optional_entry(
    archive: &mut Archive<'_>,
    name: &str,
) -> Result<Option<Vec<u8>>, ExtractError> {
    match read_zip_entry_bounded(archive, name) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(ExtractError::Zip(zip::result::ZipError::FileNotFound)) => Ok(None),
        Err(e) => Err(e),
    }
}

fn extract_pptx(bytes: &[u8]) -> Result<Vec<ContentUnit>, ExtractError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let slides = slide_order(&mut archive)?;

    let mut units = Vec::new();
    for (n, slide_path) in slides.iter().enumerate() {
        let xml = read_zip_entry_bounded(&mut archive, slide_path)?;
        let mut parts: Vec<String> = parse_shapes(&xml, slide_path)?
            .into_iter()
            .map(|s| collapse_whitespace(&s.text))
            .filter(|t| !t.is_empty())
            .collect();

        if let Some(notes) = read_notes(&mut archive, slide_path)? {
            parts.push(notes);
        }

        let text = parts.join(" ");
        if !text.is_empty() {
            units.push(ContentUnit::new(text, Locator::Slide(n as u32 + 1)));
        }
    }
    Ok(units)
}

/// Slide part names in presentation order.
///
/// Follows `<p:sldIdLst>` through the presentation relationships; falls
/// back to the numeric order of `ppt/slides/slideN.xml` when either part is
/// missing.
fn slide_order(archive: &mut Archive<'_>) -> Result<Vec<String>, ExtractError> {
    let presentation = read_optional_entry(archive, "ppt/presentation.xml")?;
    let rels = read_optional_entry(archive, "ppt/_rels/presentation.xml.rels")?;

    if let (Some(presentation), Some(rels)) = (presentation, rels) {
        let targets: HashMap<String, String> =
            parse_relationships(&rels, "ppt/_rels/presentation.xml.rels")?
                .into_iter()
                .map(|r| (r.id, resolve_part("ppt", &r.target)))
                .collect();
        let ordered: Vec<String> = parse_slide_ids(&presentation)?
            .into_iter()
            .filter_map(|rid| targets.get(&rid).cloned())
            .filter(|part| archive.file_names().any(|n| n == part.as_str()))
            .collect();
        if !ordered.is_empty() {
            return Ok(ordered);
        }
    }

    let mut slide_names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    slide_names.sort_by_key(|name| {
        name.trim_start_matches("ppt/slides/slide")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    Ok(slide_names)
}

/// Presenter notes for a slide: the body placeholder of its notes slide.
fn read_notes(archive: &mut Archive<'_>, slide_path: &str) -> Result<Option<String>, ExtractError> {
    let (dir, file) = slide_path.rsplit_once('/').unwrap_or(("", slide_path));
    let rels_path = format!("{}/_rels/{}.rels", dir, file);
    let Some(rels) = read_optional_entry(archive, &rels_path)? else {
        return Ok(None);
    };

    let Some(notes_rel) = parse_relationships(&rels, &rels_path)?
        .into_iter()
        .find(|r| r.rel_type.ends_with(NOTES_SLIDE_REL))
    else {
        return Ok(None);
    };

    let notes_path = resolve_part(dir, &notes_rel.target);
    let Some(xml) = read_optional_entry(archive, &notes_path)? else {
        return Ok(None);
    };

    let text = parse_shapes(&xml, &notes_path)?
        .into_iter()
        .filter(|s| s.placeholder.as_deref() == Some("body"))
        .map(|s| collapse_whitespace(&s.text))
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    Ok((!text.is_empty()).then_some(text))
}

/// Resolve a relationship target against the directory of its source part.
fn resolve_part(base_dir: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

#[derive(Debug, Default)]
struct ShapeText {
    /// `type` of the shape's `<p:ph>` placeholder, if it has one.
    placeholder: Option<String>,
    text: String,
}

struct Relationship {
    id: String,
    rel_type: String,
    target: String,
}

fn attr(e: &BytesStart<'_>, local: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == local)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn xml_error(entry: &str, source: quick_xml::Error) -> ExtractError {
    ExtractError::Xml {
        entry: entry.to_string(),
        source,
    }
}

/// Collect the text of every `<p:sp>` shape. Paragraphs and line breaks
/// inside a shape become newlines; runs within a paragraph are concatenated.
fn parse_shapes(xml: &[u8], entry: &str) -> Result<Vec<ShapeText>, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut shapes = Vec::new();
    let mut current: Option<ShapeText> = None;
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"sp" => current = Some(ShapeText::default()),
                b"t" => in_text = current.is_some(),
                b"ph" => {
                    if let Some(shape) = current.as_mut() {
                        shape.placeholder = attr(&e, b"type");
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"br" => {
                    if let Some(shape) = current.as_mut() {
                        shape.text.push('\n');
                    }
                }
                b"ph" => {
                    if let Some(shape) = current.as_mut() {
                        shape.placeholder = attr(&e, b"type");
                    }
                }
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => {
                if let Some(shape) = current.as_mut() {
                    let text = t.unescape().map_err(|e| xml_error(entry, e))?;
                    shape.text.push_str(&text);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if let Some(shape) = current.as_mut() {
                        shape.text.push('\n');
                    }
                }
                b"sp" => {
                    if let Some(shape) = current.take() {
                        shapes.push(shape);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(entry, e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(shapes)
}

/// Relationship ids of `<p:sldId>` entries, in presentation order.
fn parse_slide_ids(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut ids = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"sldId" => {
                // `id` is the numeric slide id; the relationship id is the prefixed `r:id`.
                let rid = e
                    .attributes()
                    .flatten()
                    .find(|a| a.key.prefix().is_some() && a.key.local_name().as_ref() == b"id")
                    .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()));
                if let Some(rid) = rid {
                    ids.push(rid);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error("ppt/presentation.xml", e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(ids)
}

fn parse_relationships(xml: &[u8], entry: &str) -> Result<Vec<Relationship>, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut rels = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                if let (Some(id), Some(target)) = (attr(&e, b"Id"), attr(&e, b"Target")) {
                    rels.push(Relationship {
                        id,
                        rel_type: attr(&e, b"Type").unwrap_or_default(),
                        target,
                    });
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(entry, e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(rels)
}

// ============ PDF ============

fn extract_pdf(bytes: &[u8]) -> Result<Vec<ContentUnit>, ExtractError> {
    let doc = lopdf::Document::load_mem(bytes)?;

    let mut units = Vec::new();
    for page_number in doc.get_pages().into_keys() {
        match doc.extract_text(&[page_number]) {
            Ok(raw) => {
                let text = collapse_whitespace(&raw);
                if !text.is_empty() {
                    units.push(ContentUnit::new(text, Locator::Page(page_number)));
                }
            }
            Err(e) => warn!(page = page_number, error = %e, "skipping undecodable PDF page"),
        }
    }
    Ok(units)
}

// ============ HTML ============

static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").unwrap());

/// Elements whose text is never shown to a reader.
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "head"];

/// Elements that start a new line of text when rendered.
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "figcaption",
    "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav", "ol", "p",
    "pre", "section", "table", "td", "th", "tr", "ul",
];

fn extract_html(bytes: &[u8]) -> Vec<ContentUnit> {
    let source = String::from_utf8_lossy(bytes);
    let document = Html::parse_document(&source);

    let title = document
        .select(&TITLE)
        .next()
        .map(|t| collapse_whitespace(&t.text().collect::<String>()))
        .filter(|t| !t.is_empty());

    let root = document
        .select(&BODY)
        .next()
        .unwrap_or_else(|| document.root_element());

    let mut raw = String::new();
    for node in root.descendants() {
        if let Some(element) = node.value().as_element() {
            if BLOCK_ELEMENTS.contains(&element.name()) {
                raw.push(' ');
            }
        } else if let Some(text) = node.value().as_text() {
            let hidden = node.ancestors().any(|a| {
                a.value()
                    .as_element()
                    .is_some_and(|e| HIDDEN_ELEMENTS.contains(&e.name()))
            });
            if !hidden {
                raw.push_str(text);
            }
        }
    }

    let text = collapse_whitespace(&raw);
    if text.is_empty() {
        return Vec::new();
    }
    let mut unit = ContentUnit::new(text, Locator::None);
    unit.title = title;
    vec![unit]
}

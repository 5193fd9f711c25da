//! Format readers: file bytes in, plain UTF-8 text out.
//!
//! OOXML documents (docx, pptx) are read straight from their ZIP parts with
//! `quick-xml`; spreadsheets go through `calamine` so numeric, date and
//! formula-result cells come back as text. Readers return
//! [`ExtractError`]; the dispatcher turns that into an inline marker via
//! [`failure_marker`] so one bad file never stops a batch.

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::Path;

use calamine::Reader as _;
use quick_xml::events::Event;

use crate::dispatch::DocumentFormat;

/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb guard).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Pdf(String),
    #[error("{0}")]
    Ooxml(String),
    #[error("{0}")]
    Spreadsheet(String),
}

/// Inline marker substituted for a file whose extraction failed. Bracketed
/// and padded with newlines so it stands out inside the corpus.
pub fn failure_marker(format: DocumentFormat, name: &str, err: &ExtractError) -> String {
    format!("\n[{} error {}: {}]\n", format.label(), name, err)
}

/// Read `path` from disk and run the reader for `format`.
pub fn extract_file(format: DocumentFormat, path: &Path) -> Result<String, ExtractError> {
    let bytes = std::fs::read(path)?;
    (format.reader())(&bytes)
}

// ============ PDF ============

/// Text of every page, concatenated. Pages without a text layer add nothing.
pub fn read_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    let pages = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
        .map_err(|panic| ExtractError::Pdf(panic_message(panic.as_ref())))?
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;
    Ok(pages.concat())
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("PDF parser panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("PDF parser panicked: {}", s)
    } else {
        "PDF parser panicked".to_string()
    }
}

// ============ Plain text ============

/// Verbatim text. Invalid UTF-8 sequences are dropped, line endings are
/// normalised to `\n`.
pub fn read_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        out.push_str(chunk.valid());
    }
    if out.contains('\r') {
        out = out.replace("\r\n", "\n").replace('\r', "\n");
    }
    Ok(out)
}

// ============ ZIP helpers ============

type Archive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>, ExtractError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| ExtractError::Ooxml(e.to_string()))
}

fn read_zip_entry_bounded(
    archive: &mut Archive<'_>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

/// Part names under `prefix` ending in `.xml`, ordered by their numeric
/// suffix (`slide2.xml` before `slide10.xml`).
fn numbered_parts(archive: &Archive<'_>, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(prefix) && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches(prefix)
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

fn parent_is(stack: &[Vec<u8>], name: &[u8]) -> bool {
    stack.last().is_some_and(|p| p.as_slice() == name)
}

// ============ DOCX ============

/// Body paragraphs in document order, one per line. Paragraphs inside
/// tables, text boxes and headers/footers are not visited.
pub fn read_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml", MAX_XML_ENTRY_BYTES)?;
    let paragraphs = docx_body_paragraphs(&xml)?;
    Ok(paragraphs.join("\n"))
}

/// Containers whose text belongs to an embedded object rather than to the
/// paragraph holding it (text boxes, drawings, VML shapes, OLE objects).
const DOCX_EMBEDDED: [&[u8]; 5] = [
    b"AlternateContent",
    b"drawing",
    b"pict",
    b"object",
    b"txbxContent",
];

fn docx_body_paragraphs(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut paragraphs = Vec::new();
    // Depth of the body-level <w:p> currently open, if any.
    let mut para_depth: Option<usize> = None;
    // Depth of the embedded object being skipped, if any.
    let mut skip_depth: Option<usize> = None;
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = e.local_name().as_ref().to_vec();
                if skip_depth.is_none() {
                    if name == b"p" && para_depth.is_none() && parent_is(&stack, b"body") {
                        para_depth = Some(stack.len());
                        current.clear();
                    } else if DOCX_EMBEDDED.contains(&name.as_slice()) {
                        skip_depth = Some(stack.len());
                    } else if name == b"t" && para_depth.is_some() {
                        in_text = true;
                    }
                }
                stack.push(name);
            }
            Ok(Event::Empty(_)) if skip_depth.is_some() => {}
            Ok(Event::Empty(e)) => {
                let name = e.local_name();
                if para_depth.is_some() {
                    match name.as_ref() {
                        b"tab" => current.push('\t'),
                        b"br" | b"cr" => current.push('\n'),
                        _ => {}
                    }
                } else if name.as_ref() == b"p" && parent_is(&stack, b"body") {
                    paragraphs.push(String::new());
                }
            }
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::CData(cd)) if in_text => {
                current.push_str(&String::from_utf8_lossy(&cd));
            }
            Ok(Event::End(_)) => {
                stack.pop();
                if skip_depth == Some(stack.len()) {
                    skip_depth = None;
                } else if para_depth == Some(stack.len()) {
                    paragraphs.push(std::mem::take(&mut current));
                    para_depth = None;
                }
                in_text = false;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(paragraphs)
}

// ============ PPTX ============

/// Text of every top-level shape, slide by slide, one shape per line.
/// Pictures, tables, connectors and grouped shapes carry no text here.
pub fn read_pptx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let slide_names = slide_order(&mut archive)?;
    if slide_names.is_empty() && archive.by_name("ppt/presentation.xml").is_err() {
        return Err(ExtractError::Ooxml(
            "ppt/presentation.xml not found".to_string(),
        ));
    }

    let mut shapes = Vec::new();
    for name in slide_names {
        let xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
        shapes.extend(pptx_shape_texts(&xml)?);
    }
    Ok(shapes.join("\n"))
}

/// Slide parts in the order of `p:sldIdLst`. Decks without a usable
/// presentation part or relationships fall back to part-number order.
fn slide_order(archive: &mut Archive<'_>) -> Result<Vec<String>, ExtractError> {
    let fallback = numbered_parts(archive, "ppt/slides/slide");
    let names: HashSet<String> = archive.file_names().map(str::to_string).collect();
    let has_parts = names.contains("ppt/presentation.xml")
        && names.contains("ppt/_rels/presentation.xml.rels");
    if !has_parts {
        return Ok(fallback);
    }

    let presentation =
        read_zip_entry_bounded(archive, "ppt/presentation.xml", MAX_XML_ENTRY_BYTES)?;
    let rels = read_zip_entry_bounded(archive, "ppt/_rels/presentation.xml.rels", MAX_XML_ENTRY_BYTES)?;
    let targets = relationship_targets(&rels)?;

    let ordered: Vec<String> = slide_rel_ids(&presentation)?
        .iter()
        .filter_map(|id| targets.get(id))
        .map(|target| resolve_part("ppt", target))
        .filter(|part| names.contains(part))
        .collect();
    if ordered.is_empty() {
        Ok(fallback)
    } else {
        Ok(ordered)
    }
}

/// `r:id` of every `p:sldId`, in document order.
fn slide_rel_ids(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut ids = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"sldId" => {
                let rel = e.attributes().flatten().find(|a| {
                    a.key.prefix().is_some() && a.key.local_name().as_ref() == b"id"
                });
                if let Some(attr) = rel {
                    ids.push(String::from_utf8_lossy(&attr.value).into_owned());
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(ids)
}

/// `Id` → `Target` of a `.rels` part.
fn relationship_targets(xml: &[u8]) -> Result<HashMap<String, String>, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut targets = HashMap::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                let mut id = None;
                let mut target = None;
                for attr in e.attributes().flatten() {
                    let value = String::from_utf8_lossy(&attr.value).into_owned();
                    match attr.key.as_ref() {
                        b"Id" => id = Some(value),
                        b"Target" => target = Some(value),
                        _ => {}
                    }
                }
                if let (Some(id), Some(target)) = (id, target) {
                    targets.insert(id, target);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(targets)
}

/// Resolve a relationship target against the directory of its source part.
fn resolve_part(base_dir: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut parts: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

fn pptx_shape_texts(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut shapes = Vec::new();

    let mut shape_depth: Option<usize> = None;
    let mut paragraphs: Vec<String> = Vec::new();
    let mut para_depth: Option<usize> = None;
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = e.local_name().as_ref().to_vec();
                if name == b"sp" && shape_depth.is_none() && parent_is(&stack, b"spTree") {
                    shape_depth = Some(stack.len());
                    paragraphs.clear();
                } else if shape_depth.is_some() && name == b"p" && parent_is(&stack, b"txBody") {
                    para_depth = Some(stack.len());
                    current.clear();
                } else if para_depth.is_some() && name == b"t" {
                    in_text = true;
                }
                stack.push(name);
            }
            Ok(Event::Empty(e)) => {
                let name = e.local_name();
                if para_depth.is_some() && name.as_ref() == b"br" {
                    current.push('\n');
                } else if shape_depth.is_some() && name.as_ref() == b"p" && parent_is(&stack, b"txBody") {
                    paragraphs.push(String::new());
                } else if shape_depth.is_none() && name.as_ref() == b"sp" && parent_is(&stack, b"spTree") {
                    shapes.push(String::new());
                }
            }
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::End(_)) => {
                stack.pop();
                let depth = stack.len();
                if para_depth == Some(depth) {
                    paragraphs.push(std::mem::take(&mut current));
                    para_depth = None;
                } else if shape_depth == Some(depth) {
                    shapes.push(paragraphs.join("\n"));
                    paragraphs.clear();
                    shape_depth = None;
                }
                in_text = false;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(shapes)
}

// ============ XLSX ============

/// Every sheet, every row: non-empty cells joined by `" | "`, one row per
/// line. Rows with no values are left out.
pub fn read_xlsx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut workbook = calamine::open_workbook_auto_from_rs(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Spreadsheet(e.to_string()))?;

    let mut rows_out = Vec::new();
    for sheet_name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| ExtractError::Spreadsheet(format!("sheet '{}': {}", sheet_name, e)))?;
        for row in range.rows() {
            let cells: Vec<String> = row.iter().filter_map(cell_text).collect();
            if !cells.is_empty() {
                rows_out.push(cells.join(" | "));
            }
        }
    }
    Ok(rows_out.join("\n"))
}

/// Textual form of a cell, or `None` for an absent value.
fn cell_text(cell: &calamine::Data) -> Option<String> {
    use calamine::Data;
    match cell {
        Data::Empty => None,
        Data::String(s) => Some(s.clone()),
        Data::Float(f) => Some(f.to_string()),
        Data::Int(i) => Some(i.to_string()),
        Data::Bool(b) => Some(if *b { "True" } else { "False" }.to_string()),
        Data::DateTime(dt) => Some(
            dt.as_datetime()
                .map(|d| d.to_string())
                .unwrap_or_else(|| dt.as_f64().to_string()),
        ),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Some(s.clone()),
        Data::Error(e) => Some(e.to_string()),
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

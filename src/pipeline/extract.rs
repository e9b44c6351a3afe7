//! Slide extraction: `.pptx` archive → [`SlideDeck`].
//!
//! A `.pptx` file is a ZIP archive of XML parts. Slide order is defined by
//! the `sldIdLst` of `ppt/presentation.xml`, whose relationship ids resolve
//! to slide parts through `ppt/_rels/presentation.xml.rels`; the numeric
//! suffix of `slideN.xml` is not reliable once slides have been reordered.
//!
//! Within a slide the shape tree is walked in document order. The first
//! shape carrying a title placeholder (`title`, `ctrTitle`, `vertTitle`)
//! becomes the slide title; every other shape or table with text becomes one
//! body entry. Formatting, images and speaker notes are ignored.
//!
//! Archive parsing is synchronous and runs inside `spawn_blocking`.

use crate::deck::{Slide, SlideDeck};
use crate::error::FileError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{Read, Seek};
use std::path::Path;
use tracing::debug;
use zip::ZipArchive;

const PRESENTATION_PART: &str = "ppt/presentation.xml";
const PRESENTATION_RELS: &str = "ppt/_rels/presentation.xml.rels";
const SLIDE_REL_SUFFIX: &str = "/relationships/slide";

/// Extract the textual content of a deck on disk.
pub async fn extract_deck(path: &Path) -> Result<SlideDeck, FileError> {
    let path = path.to_path_buf();
    let file = file_name(&path);

    tokio::task::spawn_blocking(move || extract_deck_blocking(&path))
        .await
        .map_err(|e| FileError::UnreadableDeck {
            file,
            detail: format!("extraction task panicked: {e}"),
        })?
}

/// Blocking implementation of [`extract_deck`].
pub fn extract_deck_blocking(path: &Path) -> Result<SlideDeck, FileError> {
    let name = file_name(path);
    let unreadable = |detail: String| FileError::UnreadableDeck {
        file: name.clone(),
        detail,
    };

    let file = std::fs::File::open(path).map_err(|e| unreadable(e.to_string()))?;
    let deck = parse_deck(std::io::BufReader::new(file), &name).map_err(unreadable)?;

    debug!("{}: extracted {} slides", name, deck.slide_count());
    Ok(deck)
}

/// Parse a deck from any seekable reader.
///
/// Errors are returned as a human-readable detail string; callers attach the
/// file name.
pub fn parse_deck<R: Read + Seek>(reader: R, file_name: &str) -> Result<SlideDeck, String> {
    let mut archive =
        ZipArchive::new(reader).map_err(|e| format!("not a valid .pptx archive: {e}"))?;

    let mut deck = SlideDeck::new(file_name);
    for (idx, slide_path) in slide_order(&mut archive)?.iter().enumerate() {
        let xml = read_entry(&mut archive, slide_path)?;
        deck.slides.push(parse_slide_xml(&xml, idx + 1)?);
    }

    Ok(deck)
}

/// Resolve the ordered list of slide part paths.
fn slide_order<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Vec<String>, String> {
    let rels = read_entry(archive, PRESENTATION_RELS)?;
    let targets = parse_slide_relationships(&rels)?;

    let presentation = read_entry(archive, PRESENTATION_PART)?;
    let ids = parse_slide_id_list(&presentation)?;

    Ok(ids
        .into_iter()
        .filter_map(|id| targets.get(&id).cloned())
        .collect())
}

/// Map relationship id → archive path, for slide relationships only.
fn parse_slide_relationships(xml: &str) -> Result<HashMap<String, String>, String> {
    let mut reader = Reader::from_str(xml);
    let mut targets = HashMap::new();

    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if local_name(e.name().as_ref()) == b"Relationship" =>
            {
                let id = attribute(e, b"Id");
                let rel_type = attribute(e, b"Type");
                let target = attribute(e, b"Target");

                if let (Some(id), Some(rel_type), Some(target)) = (id, rel_type, target) {
                    if rel_type.ends_with(SLIDE_REL_SUFFIX) {
                        targets.insert(id, resolve_target(&target));
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("bad presentation relationships: {e}")),
            _ => {}
        }
    }

    Ok(targets)
}

/// Relationship ids of `p:sldId` entries, in presentation order.
fn parse_slide_id_list(xml: &str) -> Result<Vec<String>, String> {
    let mut reader = Reader::from_str(xml);
    let mut ids = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if local_name(e.name().as_ref()) == b"sldId" =>
            {
                // The relationship id is the namespaced `r:id`; the bare `id`
                // is a numeric slide id.
                let rel_id = e.attributes().flatten().find_map(|attr| {
                    let key = attr.key.as_ref();
                    (key != b"id" && local_name(key) == b"id")
                        .then(|| String::from_utf8_lossy(&attr.value).into_owned())
                });
                if let Some(id) = rel_id {
                    ids.push(id);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("bad presentation part: {e}")),
            _ => {}
        }
    }

    Ok(ids)
}

/// Text collected for one shape or table while walking a slide.
#[derive(Debug, Default)]
struct ShapeFrame {
    is_title: bool,
    paragraphs: Vec<String>,
    row: Option<Vec<String>>,
    cell: Option<String>,
}

impl ShapeFrame {
    fn finish_paragraph(&mut self, paragraph: String) {
        if let Some(cell) = self.cell.as_mut() {
            if !paragraph.trim().is_empty() {
                if !cell.is_empty() {
                    cell.push(' ');
                }
                cell.push_str(paragraph.trim());
            }
        } else {
            self.paragraphs.push(paragraph);
        }
    }

    fn text(&self) -> String {
        self.paragraphs.join("\n").trim().to_string()
    }
}

/// Parse one slide part into a [`Slide`].
fn parse_slide_xml(xml: &str, number: usize) -> Result<Slide, String> {
    let mut reader = Reader::from_str(xml);
    let mut slide = Slide::new(number);

    let mut frames: Vec<ShapeFrame> = Vec::new();
    let mut paragraph: Option<String> = None;
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match local_name(e.name().as_ref()) {
                b"sp" | b"graphicFrame" => frames.push(ShapeFrame::default()),
                b"ph" => mark_title(&mut frames, e),
                b"tr" => {
                    if let Some(frame) = frames.last_mut() {
                        frame.row = Some(Vec::new());
                    }
                }
                b"tc" => {
                    if let Some(frame) = frames.last_mut() {
                        frame.cell = Some(String::new());
                    }
                }
                b"p" if !frames.is_empty() => paragraph = Some(String::new()),
                b"t" if paragraph.is_some() => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match local_name(e.name().as_ref()) {
                b"ph" => mark_title(&mut frames, e),
                b"br" => {
                    if let Some(p) = paragraph.as_mut() {
                        p.push('\n');
                    }
                }
                _ => {}
            },
            Ok(Event::Text(ref e)) if in_text => {
                let text = e
                    .unescape()
                    .map_err(|err| format!("slide {number}: bad text: {err}"))?;
                if let Some(p) = paragraph.as_mut() {
                    p.push_str(&text);
                }
            }
            Ok(Event::End(ref e)) => match local_name(e.name().as_ref()) {
                b"t" => in_text = false,
                b"p" => {
                    if let (Some(p), Some(frame)) = (paragraph.take(), frames.last_mut()) {
                        frame.finish_paragraph(p);
                    }
                }
                b"tc" => {
                    if let Some(frame) = frames.last_mut() {
                        if let (Some(cell), Some(row)) = (frame.cell.take(), frame.row.as_mut()) {
                            row.push(cell);
                        }
                    }
                }
                b"tr" => {
                    if let Some(frame) = frames.last_mut() {
                        if let Some(row) = frame.row.take() {
                            if row.iter().any(|c| !c.is_empty()) {
                                frame.paragraphs.push(row.join(" | "));
                            }
                        }
                    }
                }
                b"sp" | b"graphicFrame" => {
                    if let Some(frame) = frames.pop() {
                        push_shape(&mut slide, frame);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("slide {number}: malformed XML: {e}")),
            _ => {}
        }
    }

    Ok(slide)
}

fn mark_title(frames: &mut [ShapeFrame], e: &BytesStart<'_>) {
    if let Some(frame) = frames.last_mut() {
        if let Some(kind) = attribute(e, b"type") {
            if matches!(kind.as_str(), "title" | "ctrTitle" | "vertTitle") {
                frame.is_title = true;
            }
        }
    }
}

fn push_shape(slide: &mut Slide, frame: ShapeFrame) {
    let text = frame.text();
    if text.is_empty() {
        return;
    }
    if frame.is_title && slide.title.is_none() {
        slide.title = Some(text);
    } else {
        slide.body.push(text);
    }
}

/// Read a UTF-8 part from the archive.
fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, path: &str) -> Result<String, String> {
    let mut file = archive
        .by_name(path)
        .map_err(|e| format!("missing '{path}' in archive: {e}"))?;

    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| format!("failed to read '{path}': {e}"))?;
    Ok(content)
}

/// Turn a relationship target (relative to `ppt/`) into an archive path.
fn resolve_target(target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        absolute.to_string()
    } else if let Some(up) = target.strip_prefix("../") {
        up.to_string()
    } else {
        format!("ppt/{target}")
    }
}

fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == name)
        .map(|attr| String::from_utf8_lossy(&attr.value).into_owned())
}

/// Extract the local name from a potentially namespaced XML element name.
fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().position(|&b| b == b':') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

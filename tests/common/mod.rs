//! Shared fixtures: in-memory `.pptx` decks, a `.docx` SOP template and a
//! scripted completion provider.

#![allow(dead_code)]

use async_trait::async_trait;
use pptx2sop::{CompletionProvider, ModelReply, ModelRequest, Usage};
use std::collections::VecDeque;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

const NS_A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const NS_P: &str = "http://schemas.openxmlformats.org/presentationml/2006/main";
const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_W: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

/// One slide: optional title plus body bullets.
pub struct SlideSpec<'a> {
    pub title: Option<&'a str>,
    pub bullets: &'a [&'a str],
}

fn text_shape(id: usize, placeholder: &str, paragraphs: &[&str]) -> String {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<a:p><a:r><a:rPr lang=\"en-US\"/><a:t>{p}</a:t></a:r></a:p>"))
        .collect();
    format!(
        "<p:sp><p:nvSpPr><p:cNvPr id=\"{id}\" name=\"Shape {id}\"/><p:cNvSpPr/><p:nvPr>{placeholder}</p:nvPr></p:nvSpPr>\
         <p:spPr/><p:txBody><a:bodyPr/><a:lstStyle/>{body}</p:txBody></p:sp>"
    )
}

/// Build a `.pptx` archive from slide specs.
pub fn pptx_bytes(slides: &[SlideSpec<'_>]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let opts = FileOptions::default();

    zip.start_file("[Content_Types].xml", opts).unwrap();
    zip.write_all(b"<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\"/>")
        .unwrap();

    let rels: String = (1..=slides.len())
        .map(|n| {
            format!(
                "<Relationship Id=\"rId{}\" Type=\"{NS_R}/slide\" Target=\"slides/slide{n}.xml\"/>",
                n + 1
            )
        })
        .collect();
    zip.start_file("ppt/_rels/presentation.xml.rels", opts).unwrap();
    write!(
        zip,
        "<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">{rels}</Relationships>"
    )
    .unwrap();

    let ids: String = (1..=slides.len())
        .map(|n| format!("<p:sldId id=\"{}\" r:id=\"rId{}\"/>", 255 + n, n + 1))
        .collect();
    zip.start_file("ppt/presentation.xml", opts).unwrap();
    write!(
        zip,
        "<p:presentation xmlns:p=\"{NS_P}\" xmlns:r=\"{NS_R}\"><p:sldIdLst>{ids}</p:sldIdLst></p:presentation>"
    )
    .unwrap();

    for (i, slide) in slides.iter().enumerate() {
        let mut shapes = String::new();
        if let Some(title) = slide.title {
            shapes.push_str(&text_shape(2, r#"<p:ph type="title"/>"#, &[title]));
        }
        if !slide.bullets.is_empty() {
            shapes.push_str(&text_shape(3, r#"<p:ph idx="1"/>"#, slide.bullets));
        }
        zip.start_file(format!("ppt/slides/slide{}.xml", i + 1), opts)
            .unwrap();
        write!(
            zip,
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
             <p:sld xmlns:a=\"{NS_A}\" xmlns:p=\"{NS_P}\" xmlns:r=\"{NS_R}\">\
             <p:cSld><p:spTree>{shapes}</p:spTree></p:cSld></p:sld>"
        )
        .unwrap();
    }

    zip.finish().unwrap().into_inner()
}

/// The three-slide cassette work instruction.
pub fn cassette_deck() -> Vec<u8> {
    pptx_bytes(&[
        SlideSpec {
            title: Some("Cassette Assembly Procedure"),
            bullets: &["Assemble the filter cassette per drawing 1042"],
        },
        SlideSpec {
            title: Some("Responsibilities"),
            bullets: &[
                "Operators assemble cassettes",
                "QA inspects each lot",
                "Supervisors maintain training records",
            ],
        },
        SlideSpec {
            title: Some("Definitions"),
            bullets: &[
                "DFF: Direct Filter Flow",
                "WI: Work Instruction",
                "SOP: Standard Operating Procedure",
            ],
        },
    ])
}

pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

fn para(text: &str) -> String {
    format!("<w:p><w:r><w:t xml:space=\"preserve\">{text}</w:t></w:r></w:p>")
}

fn row(cells: &[&str]) -> String {
    let cells: String = cells
        .iter()
        .map(|c| format!("<w:tc><w:tcPr><w:tcW w:w=\"2000\" w:type=\"dxa\"/></w:tcPr>{}</w:tc>", para(c)))
        .collect();
    format!("<w:tr>{cells}</w:tr>")
}

/// An SOP template using every context field, a revision-table row loop and
/// a footer with the generation stamp.
pub fn sop_template_bytes() -> Vec<u8> {
    sop_template_with(&[])
}

/// [`sop_template_bytes`] with extra body paragraphs appended.
pub fn sop_template_with(extra_paragraphs: &[&str]) -> Vec<u8> {
    let extra: String = extra_paragraphs.iter().map(|p| para(p)).collect();
    let body = [
        para("{{ pptx_title }}"),
        para("Document: {{ mango_pptx_id }}"),
        para("Author: {{ user_name }}  Date: {{ date }}"),
        para("1. OBJECTIVE"),
        para("{{ objective }}"),
        para("2. SCOPE"),
        para("{{ scope }}"),
        para("3. RESPONSIBILITIES"),
        para("{{ responsibilities }}"),
        para("4. DEFINITIONS"),
        para("{{ definitions }}"),
        para("5. PROCEDURE"),
        para("{{ procedure_text }}"),
        format!(
            "<w:tbl>{}{}{}{}</w:tbl>",
            row(&["Date", "Version", "Nature of Changes", "Changed By"]),
            row(&["{%tr for revision in revisions %}"]),
            row(&[
                "{{ revision.date }}",
                "{{ revision.version }}",
                "{{ revision.nature_of_changes }}",
                "{{ revision.changed_by }}",
            ]),
            row(&["{%tr endfor %}"]),
        ),
        extra,
    ]
    .concat();

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let opts = FileOptions::default();
    zip.start_file("[Content_Types].xml", opts).unwrap();
    zip.write_all(b"<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\"/>")
        .unwrap();
    zip.start_file("word/document.xml", opts).unwrap();
    write!(
        zip,
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <w:document xmlns:w=\"{NS_W}\"><w:body>{body}</w:body></w:document>"
    )
    .unwrap();
    zip.start_file("word/footer1.xml", opts).unwrap();
    write!(
        zip,
        "<w:ftr xmlns:w=\"{NS_W}\">{}</w:ftr>",
        para("Generated {{ generated_date }} (v{{ generator_version }})")
    )
    .unwrap();
    zip.start_file("word/styles.xml", opts).unwrap();
    write!(zip, "<w:styles xmlns:w=\"{NS_W}\"/>").unwrap();
    zip.finish().unwrap().into_inner()
}

/// Text of `word/document.xml` in a rendered document.
pub fn document_xml(path: &Path) -> String {
    let bytes = std::fs::read(path).unwrap();
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .unwrap()
        .read_to_string(&mut xml)
        .unwrap();
    xml
}

/// Replies with queued answers in call order and records every prompt.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<ModelReply>>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<ModelReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// A provider answering every call with `text`.
    pub fn always(text: &str, calls: usize) -> Self {
        Self::new((0..calls).map(|_| success(text)).collect())
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

pub fn success(text: &str) -> ModelReply {
    ModelReply::Success {
        text: text.to_string(),
        usage: Usage {
            input_tokens: 900,
            output_tokens: 120,
        },
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &ModelRequest) -> ModelReply {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected model call"))
    }
}

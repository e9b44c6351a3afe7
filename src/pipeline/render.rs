//! Document rendering: merge a [`DocumentContext`] into a `.docx` template.
//!
//! A `.docx` is a zip of XML parts. The body, headers and footers are
//! rendered; every other entry (styles, media, relationships) is copied
//! through untouched with its original timestamp, so rendering the same
//! values into the same template gives the same bytes.
//!
//! ## Template syntax
//!
//! - `{{ name }}` / `{{ item.field }}` inside document text.
//! - A table row containing `{%tr for item in list %}` starts a row loop and
//!   a row containing `{%tr endfor %}` ends it. The rows in between repeat
//!   once per element of `list`; the two marker rows are dropped.
//!
//! Word often splits typed text over several runs (`{{ obj` / `ective }}`),
//! so each paragraph whose tags are split is first collapsed into its first
//! text element.
//!
//! [`DocumentContext`]: crate::context::DocumentContext

use crate::error::SopError;
use chrono::{DateTime, Local, NaiveDate};
use once_cell::sync::Lazy;
use quick_xml::escape::escape;
use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// The main document part every `.docx` carries.
const DOCUMENT_PART: &str = "word/document.xml";

/// Format of the `generated_date` value added at render time.
pub const GENERATED_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Value of `generator_version`.
pub const GENERATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

static RE_PARAGRAPH: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<w:p[ >].*?</w:p>").unwrap());
static RE_ROW: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<w:tr[ >].*?</w:tr>").unwrap());
static RE_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<w:t(?:\s[^>]*)?>(.*?)</w:t>").unwrap());
static RE_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)\s*\}\}").unwrap()
});
static RE_FOR_ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{%\s*tr\s+for\s+([A-Za-z_][A-Za-z0-9_]*)\s+in\s+([A-Za-z_][A-Za-z0-9_.]*)\s*%\}")
        .unwrap()
});
static RE_ENDFOR_ROW: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{%\s*tr\s+endfor\s*%\}").unwrap());

const TAG_MARKERS: [&str; 4] = ["{{", "}}", "{%", "%}"];

/// A loaded `.docx` template. The template file itself is never modified.
#[derive(Debug, Clone)]
pub struct DocxTemplate {
    path: PathBuf,
    bytes: Vec<u8>,
}

impl DocxTemplate {
    /// Read and validate the template at `path`.
    pub fn load(path: &Path) -> Result<Self, SopError> {
        if !path.is_file() {
            return Err(SopError::TemplateNotFound {
                path: path.to_path_buf(),
            });
        }
        let bytes = std::fs::read(path).map_err(|e| SopError::InvalidTemplate {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        Self::from_bytes(path, bytes)
    }

    /// Validate an in-memory template; `path` is used for messages only.
    pub fn from_bytes(path: impl Into<PathBuf>, bytes: Vec<u8>) -> Result<Self, SopError> {
        let path = path.into();
        let archive =
            ZipArchive::new(Cursor::new(bytes.as_slice())).map_err(|e| SopError::InvalidTemplate {
                path: path.clone(),
                detail: e.to_string(),
            })?;
        if !archive.file_names().any(|n| n == DOCUMENT_PART) {
            return Err(SopError::InvalidTemplate {
                path,
                detail: format!("missing {DOCUMENT_PART}"),
            });
        }
        Ok(Self { path, bytes })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Render `values` (a JSON object) into a new document.
    ///
    /// `generated_date` and `generator_version` are added to the values
    /// before rendering; everything else must already be present.
    pub fn render(&self, values: &Value, generated: DateTime<Local>) -> Result<Vec<u8>, String> {
        render_docx(&self.bytes, &with_generated(values, generated))
    }

    /// List the placeholders and row loops the template uses, checked
    /// against `values` (plus the render-time fields).
    pub fn analyze(&self, values: &Value) -> Result<TemplateReport, SopError> {
        let invalid = |detail: String| SopError::InvalidTemplate {
            path: self.path.clone(),
            detail,
        };
        let values = with_generated(values, Local::now());
        let mut archive =
            ZipArchive::new(Cursor::new(self.bytes.as_slice())).map_err(|e| invalid(e.to_string()))?;

        let mut report = TemplateReport {
            path: self.path.clone(),
            ..TemplateReport::default()
        };
        let mut placeholders = BTreeSet::new();
        let mut unsupported = BTreeSet::new();

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(|e| invalid(e.to_string()))?;
            let name = entry.name().to_string();
            if !is_rendered_part(&name) {
                continue;
            }
            let mut xml = String::new();
            entry
                .read_to_string(&mut xml)
                .map_err(|e| invalid(format!("{name}: {e}")))?;
            report.parts.push(name);

            let healed = heal_part(&xml);
            for caps in RE_TEXT.captures_iter(&healed) {
                let text = &caps[1];
                if let Some(open) = RE_FOR_ROW.captures(text) {
                    let row_loop = RowLoop {
                        variable: open[1].to_string(),
                        list: open[2].to_string(),
                    };
                    if !report.row_loops.contains(&row_loop) {
                        report.row_loops.push(row_loop);
                    }
                    continue;
                }
                if RE_ENDFOR_ROW.is_match(text) {
                    continue;
                }
                placeholders.extend(RE_PLACEHOLDER.captures_iter(text).map(|p| p[1].to_string()));
                unsupported.extend(unsupported_tag(text));
            }
        }

        let root = Scope {
            root: &values,
            local: None,
        };
        let mut unknown = BTreeSet::new();
        for row_loop in &report.row_loops {
            if root.lookup(&row_loop.list).and_then(Value::as_array).is_none() {
                unknown.insert(row_loop.list.clone());
            }
        }
        for name in &placeholders {
            let head = name.split('.').next().unwrap_or_default();
            let found = match report.row_loops.iter().find(|l| l.variable == head) {
                Some(row_loop) => root
                    .lookup(&row_loop.list)
                    .and_then(Value::as_array)
                    .and_then(|items| items.first())
                    .and_then(|item| {
                        Scope {
                            root: &values,
                            local: Some((row_loop.variable.as_str(), item)),
                        }
                        .lookup(name)
                    })
                    .is_some(),
                None => root.lookup(name).is_some(),
            };
            if !found {
                unknown.insert(name.clone());
            }
        }

        report.placeholders = placeholders.into_iter().collect();
        report.unknown = unknown.into_iter().collect();
        report.unsupported = unsupported.into_iter().collect();
        Ok(report)
    }
}

fn with_generated(values: &Value, generated: DateTime<Local>) -> Value {
    let mut values = values.clone();
    if let Value::Object(ref mut map) = values {
        map.insert(
            "generated_date".into(),
            Value::String(generated.format(GENERATED_DATE_FORMAT).to_string()),
        );
        map.insert(
            "generator_version".into(),
            Value::String(GENERATOR_VERSION.to_string()),
        );
    }
    values
}

/// A `{%tr for variable in list %}` row loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowLoop {
    pub variable: String,
    pub list: String,
}

/// What a template asks of the values rendered into it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TemplateReport {
    pub path: PathBuf,
    /// Rendered parts found in the archive.
    pub parts: Vec<String>,
    /// Every `{{ }}` placeholder, sorted.
    pub placeholders: Vec<String>,
    pub row_loops: Vec<RowLoop>,
    /// Placeholders and loop lists the values cannot supply.
    pub unknown: Vec<String>,
    /// Tags the renderer does not understand.
    pub unsupported: Vec<String>,
}

impl TemplateReport {
    pub fn is_renderable(&self) -> bool {
        self.unknown.is_empty() && self.unsupported.is_empty()
    }
}

/// `{stem}_SOP_{YYYYMMDD}.docx` for a source deck.
pub fn output_file_name(source: &Path, date: NaiveDate) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    format!("{stem}_SOP_{}.docx", date.format("%Y%m%d"))
}

/// Write `bytes` to `dest` through a temporary file in the same directory,
/// so a reader never sees a partial document.
pub fn write_document(dest: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}

/// Render every text part of the template archive in `template`.
pub fn render_docx(template: &[u8], values: &Value) -> Result<Vec<u8>, String> {
    let mut archive =
        ZipArchive::new(Cursor::new(template)).map_err(|e| format!("template archive: {e}"))?;
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    for i in 0..archive.len() {
        let name = archive
            .by_index_raw(i)
            .map_err(|e| format!("template entry {i}: {e}"))?
            .name()
            .to_string();

        if is_rendered_part(&name) {
            let mut entry = archive.by_index(i).map_err(|e| format!("{name}: {e}"))?;
            let modified = entry.last_modified();
            let mut xml = String::new();
            entry
                .read_to_string(&mut xml)
                .map_err(|e| format!("{name}: {e}"))?;
            drop(entry);

            let rendered = render_part(&xml, values).map_err(|e| format!("{name}: {e}"))?;
            let options = FileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .last_modified_time(modified);
            writer
                .start_file(name.as_str(), options)
                .map_err(|e| format!("{name}: {e}"))?;
            writer
                .write_all(rendered.as_bytes())
                .map_err(|e| format!("{name}: {e}"))?;
        } else {
            let entry = archive
                .by_index_raw(i)
                .map_err(|e| format!("{name}: {e}"))?;
            writer
                .raw_copy_file(entry)
                .map_err(|e| format!("{name}: {e}"))?;
        }
    }

    let cursor = writer.finish().map_err(|e| format!("finish archive: {e}"))?;
    Ok(cursor.into_inner())
}

fn is_rendered_part(name: &str) -> bool {
    name == DOCUMENT_PART
        || ((name.starts_with("word/header") || name.starts_with("word/footer"))
            && name.ends_with(".xml"))
}

/// Render one XML part: heal split tags, expand row loops, substitute.
fn render_part(xml: &str, values: &Value) -> Result<String, String> {
    expand(&heal_part(xml), values)
}

fn heal_part(xml: &str) -> Cow<'_, str> {
    RE_PARAGRAPH.replace_all(xml, |caps: &Captures| {
        heal_paragraph(&caps[0]).unwrap_or_else(|| caps[0].to_string())
    })
}

/// Collapse a paragraph's text into its first `<w:t>` when a tag spans runs.
fn heal_paragraph(paragraph: &str) -> Option<String> {
    let segments: Vec<&str> = RE_TEXT
        .captures_iter(paragraph)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    let joined: String = segments.concat();
    if !TAG_MARKERS.iter().any(|m| joined.contains(m)) {
        return None;
    }
    // A marker that only appears once runs are joined (`{` + `{ x }}`) is
    // split, as is any run holding half a tag.
    let split = TAG_MARKERS.iter().any(|m| {
        joined.matches(m).count() != segments.iter().map(|s| s.matches(m).count()).sum::<usize>()
    });
    if !split && segments.iter().all(|s| tags_balanced(s)) {
        return None;
    }

    let mut first = true;
    let healed = RE_TEXT.replace_all(paragraph, |_: &Captures| {
        if std::mem::take(&mut first) {
            format!(r#"<w:t xml:space="preserve">{joined}</w:t>"#)
        } else {
            "<w:t></w:t>".to_string()
        }
    });
    Some(healed.into_owned())
}

fn tags_balanced(text: &str) -> bool {
    text.matches("{{").count() == text.matches("}}").count()
        && text.matches("{%").count() == text.matches("%}").count()
}

/// Template syntax left in run text once every placeholder the engine
/// understands is taken out, e.g. `{{ name|upper }}` or a stray `}}`.
fn unsupported_tag(text: &str) -> Option<String> {
    let rest = RE_PLACEHOLDER.replace_all(text, "");
    let start = TAG_MARKERS.iter().filter_map(|m| rest.find(m)).min()?;
    Some(rest[start..].chars().take(60).collect())
}

/// Expand row loops and substitute placeholders in one pass, so values
/// containing template syntax are never re-interpreted.
fn expand(xml: &str, root: &Value) -> Result<String, String> {
    let root_scope = Scope { root, local: None };
    let rows: Vec<(usize, usize)> = RE_ROW.find_iter(xml).map(|m| (m.start(), m.end())).collect();

    let mut out = String::with_capacity(xml.len());
    let mut cursor = 0;
    let mut i = 0;
    while i < rows.len() {
        let (start, _) = rows[i];
        let Some(open) = RE_FOR_ROW.captures(&xml[rows[i].0..rows[i].1]) else {
            i += 1;
            continue;
        };
        let var = open[1].to_string();
        let list = open[2].to_string();

        let close = (i + 1..rows.len())
            .find(|&j| RE_ENDFOR_ROW.is_match(&xml[rows[j].0..rows[j].1]))
            .ok_or_else(|| format!("row loop over `{list}` has no `{{%tr endfor %}}` row"))?;
        let items = root_scope
            .lookup(&list)
            .ok_or_else(|| format!("template references unknown field `{list}`"))?
            .as_array()
            .ok_or_else(|| format!("`{list}` is not a list"))?;

        out.push_str(&substitute(&xml[cursor..start], &root_scope)?);
        for item in items {
            let scope = Scope {
                root,
                local: Some((var.as_str(), item)),
            };
            for &(s, e) in &rows[i + 1..close] {
                out.push_str(&substitute(&xml[s..e], &scope)?);
            }
        }

        cursor = rows[close].1;
        i = close + 1;
    }
    out.push_str(&substitute(&xml[cursor..], &root_scope)?);
    Ok(out)
}

/// Name resolution: the loop variable shadows top-level keys.
struct Scope<'a> {
    root: &'a Value,
    local: Option<(&'a str, &'a Value)>,
}

impl<'a> Scope<'a> {
    fn lookup(&self, path: &str) -> Option<&'a Value> {
        let mut parts = path.split('.');
        let head = parts.next()?;
        let mut current = match self.local {
            Some((name, value)) if name == head => value,
            _ => self.root.get(head)?,
        };
        for part in parts {
            current = current.get(part)?;
        }
        Some(current)
    }
}

fn substitute(xml: &str, scope: &Scope<'_>) -> Result<String, String> {
    let mut failure: Option<String> = None;
    let out = RE_TEXT.replace_all(xml, |caps: &Captures| {
        let text = &caps[1];
        if !TAG_MARKERS.iter().any(|m| text.contains(m)) {
            return caps[0].to_string();
        }
        if let Some(tag) = unsupported_tag(text) {
            failure.get_or_insert_with(|| format!("unsupported template tag `{tag}`"));
            return caps[0].to_string();
        }
        let replaced = RE_PLACEHOLDER.replace_all(text, |p: &Captures| match scope.lookup(&p[1]) {
            Some(value) => encode_value(value),
            None => {
                failure.get_or_insert_with(|| format!("template references unknown field `{}`", &p[1]));
                String::new()
            }
        });
        format!(r#"<w:t xml:space="preserve">{replaced}</w:t>"#)
    });

    match failure {
        Some(message) => Err(message),
        None => Ok(out.into_owned()),
    }
}

/// A value as run text: XML-escaped, newlines as line breaks.
fn encode_value(value: &Value) -> String {
    let text = match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    };
    escape(&text)
        .replace("\r\n", "\n")
        .replace('\n', r#"</w:t><w:br/><w:t xml:space="preserve">"#)
}

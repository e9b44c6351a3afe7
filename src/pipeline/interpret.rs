//! Response interpretation: model reply text → [`DocumentContext`].
//!
//! Interpretation never fails. A reply that is not a JSON object yields a
//! [`Interpretation::Degraded`] context (title from the first line, objective
//! set to the manual-review sentence) which still renders.
//!
//! [`finalize`] runs afterwards regardless of outcome and fills in the
//! per-file fields: source name, slide count, a synthesized identifier when
//! a prefix is configured, and a title derived from the file name when none
//! was obtained.

use crate::context::DocumentContext;
use crate::prompts::{DEFAULT_DEFINITIONS, DEFAULT_SCOPE, MANUAL_REVIEW_MESSAGE};
use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Bytes of the file-name digest used in synthesized identifiers.
const ID_HASH_BYTES: usize = 4;

/// Timestamp layout used in synthesized identifiers.
const ID_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Result of interpreting one reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interpretation {
    Parsed(DocumentContext),
    /// The reply was not a JSON object; `reason` says why.
    Degraded {
        context: DocumentContext,
        reason: String,
    },
}

impl Interpretation {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Interpretation::Degraded { .. })
    }

    pub fn context(&self) -> &DocumentContext {
        match self {
            Interpretation::Parsed(ctx) => ctx,
            Interpretation::Degraded { context, .. } => context,
        }
    }

    pub fn into_context(self) -> DocumentContext {
        match self {
            Interpretation::Parsed(ctx) => ctx,
            Interpretation::Degraded { context, .. } => context,
        }
    }
}

static RE_OPEN_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^```(?:json)?").unwrap());
static RE_CLOSE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```$").unwrap());

/// Remove one leading and one trailing triple-backtick fence (the opening one
/// optionally tagged `json`) and trim. Text without fences is only trimmed.
pub fn strip_code_fences(raw: &str) -> String {
    let s = raw.trim();
    let s = RE_OPEN_FENCE.replace(s, "");
    let s = RE_CLOSE_FENCE.replace(&s, "");
    s.trim().to_string()
}

/// Interpret `raw` on top of `base`, a context holding the per-run defaults.
pub fn interpret(raw: &str, base: DocumentContext) -> Interpretation {
    let mut context = base;
    context.full_response = raw.to_string();

    let cleaned = strip_code_fences(raw);
    let object = match serde_json::from_str::<Value>(&cleaned) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            return degrade(context, raw, format!("reply is JSON {} rather than an object", json_kind(&other)));
        }
        Err(e) => return degrade(context, raw, format!("reply is not JSON: {e}")),
    };

    apply_fields(&mut context, &object);
    Interpretation::Parsed(context)
}

fn apply_fields(context: &mut DocumentContext, object: &Map<String, Value>) {
    if let Some(objective) = text_field(object, "objective") {
        context.objective = objective;
    }
    context.scope = non_blank(text_field(object, "scope")).unwrap_or_else(|| DEFAULT_SCOPE.to_string());
    if let Some(responsibilities) = text_field(object, "responsibilities") {
        context.responsibilities = responsibilities;
    }
    context.definitions =
        non_blank(text_field(object, "definitions")).unwrap_or_else(|| DEFAULT_DEFINITIONS.to_string());

    if let Some(title) = non_blank(text_field(object, "pptx_title"))
        .or_else(|| non_blank(text_field(object, "title")))
    {
        context.title = title;
    }

    if let Some(id) = non_blank(text_field(object, "mango_id"))
        .or_else(|| non_blank(text_field(object, "mango_pptx_id")))
    {
        context.document_id = id;
    }
}

fn degrade(mut context: DocumentContext, raw: &str, reason: String) -> Interpretation {
    if let Some(first) = raw.lines().map(str::trim).find(|l| !l.is_empty()) {
        context.title = first.to_string();
    }
    context.objective = MANUAL_REVIEW_MESSAGE.to_string();
    Interpretation::Degraded { context, reason }
}

/// A field as display text: strings as-is, arrays one item per line,
/// numbers and booleans via their JSON form. `null` counts as absent.
fn text_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|item| match item {
                    Value::Null => None,
                    Value::String(s) => Some(s.clone()),
                    other => Some(other.to_string()),
                })
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        other => Some(other.to_string()),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Fill in the per-file fields that do not come from the reply.
pub fn finalize(
    mut context: DocumentContext,
    source: &Path,
    slide_count: usize,
    id_prefix: Option<&str>,
    now: DateTime<Local>,
) -> DocumentContext {
    let file_name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if context.document_id.trim().is_empty() {
        if let Some(prefix) = id_prefix.filter(|p| !p.is_empty()) {
            context.document_id = synthesize_id(prefix, &file_name, now);
        }
    }

    if context.title.trim().is_empty() {
        context.title = title_from_path(source);
    }

    context.source_file = file_name;
    context.slide_count = slide_count;
    context
}

/// `{prefix}{YYYYMMDDHHMMSS}-{hash}` where `hash` is the leading bytes of the
/// SHA-256 of the file name, hex-encoded.
pub fn synthesize_id(prefix: &str, file_name: &str, now: DateTime<Local>) -> String {
    let digest = Sha256::digest(file_name.as_bytes());
    format!(
        "{prefix}{}-{}",
        now.format(ID_TIMESTAMP_FORMAT),
        hex::encode(&digest[..ID_HASH_BYTES])
    )
}

/// `assembly_work_instruction.pptx` → `Assembly Work Instruction`.
pub fn title_from_path(source: &Path) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    stem.replace('_', " ")
        .split_whitespace()
        .map(title_case_word)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Upper-case each letter that follows a non-letter, lower-case the rest:
/// `line-setup` → `Line-Setup`, `v2x` → `V2X`.
fn title_case_word(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    let mut after_letter = false;
    for c in word.chars() {
        if after_letter {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        after_letter = c.is_alphabetic();
    }
    out
}

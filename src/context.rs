//! The canonical document context merged into the Word template.
//!
//! Every field has a deterministic default so a context is always renderable,
//! even when the model reply could not be parsed. The renderer sees the
//! context as JSON via [`DocumentContext::template_values`]; the serialized
//! key names are the template placeholder names.

use crate::prompts::{procedure_reference, DEFAULT_DEFINITIONS, DEFAULT_SCOPE};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// US date format used throughout the SOP template.
pub const DATE_FORMAT: &str = "%m/%d/%Y";

/// Version assigned to a freshly generated document.
pub const INITIAL_VERSION: &str = "1.0";

/// Change description of the seeded revision entry.
pub const INITIAL_RELEASE: &str = "Initial Release";

/// One row of the revision sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionEntry {
    pub date: String,
    pub version: String,
    pub nature_of_changes: String,
    pub changed_by: String,
}

/// Field values for one output document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentContext {
    /// Document-management identifier referenced by the procedure sentence.
    #[serde(rename = "mango_pptx_id")]
    pub document_id: String,
    /// Procedure title.
    #[serde(rename = "pptx_title")]
    pub title: String,
    pub date: String,
    pub user_name: String,
    pub objective: String,
    pub scope: String,
    pub responsibilities: String,
    pub definitions: String,
    pub revisions: Vec<RevisionEntry>,
    /// File name of the deck this context was built from.
    pub source_file: String,
    pub slide_count: usize,
    /// The raw model reply, kept for diagnostics.
    pub full_response: String,
}

impl DocumentContext {
    /// A context with every field at its default and one "initial release"
    /// revision entry dated `today` and attributed to `user_name`.
    pub fn new(user_name: impl Into<String>, today: NaiveDate) -> Self {
        let user_name = user_name.into();
        let date = today.format(DATE_FORMAT).to_string();
        Self {
            document_id: String::new(),
            title: String::new(),
            date: date.clone(),
            user_name: user_name.clone(),
            objective: String::new(),
            scope: DEFAULT_SCOPE.to_string(),
            responsibilities: String::new(),
            definitions: DEFAULT_DEFINITIONS.to_string(),
            revisions: vec![RevisionEntry {
                date,
                version: INITIAL_VERSION.to_string(),
                nature_of_changes: INITIAL_RELEASE.to_string(),
                changed_by: user_name,
            }],
            source_file: String::new(),
            slide_count: 0,
            full_response: String::new(),
        }
    }

    /// The procedure-reference sentence for this document.
    pub fn procedure_text(&self) -> String {
        procedure_reference(&self.document_id, &self.title)
    }

    /// The context as a JSON object keyed by template placeholder name,
    /// including the derived `procedure_text`.
    pub fn template_values(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Value::Object(ref mut map) = value {
            map.insert("procedure_text".into(), Value::String(self.procedure_text()));
        }
        value
    }
}

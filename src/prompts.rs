//! Prompts and fixed sentences for work-instruction → SOP conversion.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — changing the extraction rules or the
//!    default scope sentence requires editing exactly one place.
//!
//! 2. **Testability** — unit tests can import and inspect prompts directly
//!    without calling a real model.
//!
//! Callers can override the instruction prompt via
//! [`crate::config::ConversionConfig::prompt`]; the constant here is used only
//! when no override is provided.

use crate::error::SopError;
use std::path::Path;

/// Scope sentence used when the model does not supply one.
pub const DEFAULT_SCOPE: &str =
    "This SOP applies to all Cassette Manufacturing operations at the US Stoneham facility";

/// Definitions value used when the model does not supply any.
pub const DEFAULT_DEFINITIONS: &str = "N/A";

/// Objective written into the document when the model reply is not JSON.
pub const MANUAL_REVIEW_MESSAGE: &str = "Failed to parse response. Please review manually.";

/// Separator between the instruction prompt and the rendered deck.
pub const DECK_SEPARATOR: &str = "\n\nPowerPoint Content:\n";

/// Default instruction prompt for converting a work-instruction deck to SOP fields.
///
/// This prompt is used when `ConversionConfig::prompt` is `None`.
pub const DEFAULT_SOP_PROMPT: &str = r#"# PowerPoint Work Instruction to SOP Conversion Prompt

You are an AI agent specialized in converting PowerPoint work instructions into Standard Operating Procedure (SOP) documents. Your task is to extract content from PowerPoint slides and format it according to the LS SOP template structure.

## Critical Instructions
- Extract ALL content from the PowerPoint being converted
- The PROCEDURE section should simply state: "See Mango File {{mango_pptx_id}} -- {{pptx_title}}."
- DO NOT generate or infer the Mango ID - this will be provided externally
- Focus on extracting the OBJECTIVE, RESPONSIBILITIES, and DEFINITIONS from the PowerPoint content

## Required Output Format

You MUST respond with a valid JSON object containing these exact fields:

```json
{
    "title": "[Extract the main title/subject from the PowerPoint]",
    "objective": "[Extract or infer the main objective/purpose of this procedure from the PowerPoint content]",
    "scope": "This SOP applies to all Cassette Manufacturing operations at the US Stoneham facility",
    "responsibilities": "[Extract specific roles mentioned: Technician, Senior Technician, Engineer, etc. - BE SPECIFIC to what's in the PowerPoint]",
    "definitions": "[Extract any defined terms, abbreviations, or acronyms WITH their definitions (e.g., 'DFF: Direct Filter Flow'). If none found, use 'N/A']",
    "mango_id": "",
    "pptx_title": "[Use the PowerPoint filename or main title]"
}
```

## Content Extraction Guidelines

### OBJECTIVE
- Look for slides mentioning purpose, goals, or objectives
- If not explicitly stated, infer from the overall content what this procedure accomplishes
- Keep it concise (2-3 sentences maximum)
- Focus on WHAT is being done and WHY

### RESPONSIBILITIES
- Extract ACTUAL roles mentioned in the PowerPoint (not generic roles)
- Common roles include: Technician, Senior Technician, Engineer, Quality Assurance
- Include what each role does if specified
- If multiple roles are mentioned, list them all
- Format as: "Role: Specific responsibilities" if details are provided

### DEFINITIONS
- Look for slides with terminology, abbreviations, or glossary sections
- Extract ONLY terms that are explicitly defined in the PowerPoint
- Format as: "TERM: Definition" or "ABBREVIATION: Full meaning"
- Include multiple definitions separated by semicolons
- If no definitions are found, use "N/A"

### Important Notes
- The SCOPE is always hard-coded as shown above - do not modify
- The PROCEDURE section will always reference the Mango file - do not extract procedure steps
- Extract the document title from the PowerPoint title slide or filename
- All content must come from the PowerPoint - do not add generic information

Remember: Your ENTIRE response must be a single valid JSON object with no additional text or formatting."#;

/// Build the procedure-reference sentence for the given identifier and title.
pub fn procedure_reference(document_id: &str, title: &str) -> String {
    format!("See Mango File {document_id} -- {title}.")
}

/// Resolve a user-supplied prompt: the contents of the file at `value` when
/// one exists, otherwise `value` itself.
pub async fn load_prompt(value: &str) -> Result<String, SopError> {
    let path = Path::new(value);
    if !path.is_file() {
        return Ok(value.to_string());
    }
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SopError::PromptReadFailed {
            path: path.to_path_buf(),
            source,
        })
}

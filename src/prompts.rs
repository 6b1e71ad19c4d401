//! Prompt templates for structured field extraction.
//!
//! Every prompt the crate sends lives here so that tests can inspect them
//! without a model, and so that wording changes touch exactly one file.
//!
//! The extraction prompt is a single instruction block (no system/role
//! split): the OCR text, the field schema, and the demand for a bare JSON
//! array.

use crate::schema::FieldSchema;

/// Instruction template. `{content}` and `{data_elements}` are substituted
/// by [`extraction_prompt`].
pub const EXTRACTION_TEMPLATE: &str = r#"You are an expert data entry person who can extract useful information from documents.

{content}

From the content provided above, please try to extract all available data points from this list: {data_elements}

Convert the extracted data points in a JSON array format and return only the JSON array."#;

/// Build the extraction prompt for one document.
pub fn extraction_prompt(content: &str, schema: &FieldSchema) -> String {
    // Substitute the schema first so braces inside the OCR text are never
    // mistaken for placeholders.
    EXTRACTION_TEMPLATE
        .replacen("{data_elements}", &schema.describe(), 1)
        .replacen("{content}", content, 1)
}

/// Follow-up prompt used once when the first answer was not valid JSON.
///
/// Restates the original request, quotes the rejected output and the parser
/// error, and asks again for a bare JSON array.
pub fn corrective_prompt(original_prompt: &str, previous_output: &str, parse_error: &str) -> String {
    format!(
        "{original_prompt}\n\n\
Your previous output was not valid JSON, please retry.\n\
Parser error: {parse_error}\n\
Previous output:\n\"\"\"{previous_output}\"\"\"\n\n\
Return only the JSON array, with no commentary and no code fences."
    )
}

//! Prompt template for bill field extraction.
//!
//! Centralising the prompt here serves two purposes:
//!
//! 1. **Single source of truth**: the field names in the template, the keys
//!    the reply parser requires, and the table columns must all agree.
//!    [`crate::record::BillFields::FIELD_NAMES`] and this template are the two
//!    places where that schema is spelled out.
//!
//! 2. **Testability**: unit tests can inspect the built prompt directly
//!    without calling a real model, making template regressions easy to catch.

use crate::record::BillFields;

/// Template for the field-extraction request sent to the model.
///
/// `{extracted_text}` is replaced with the parsed bill text verbatim, with
/// no escaping or sanitisation. The model is told to reply with a fenced
/// `json` block so the reply parser has a stable anchor to search for.
pub const EXTRACTION_PROMPT_TEMPLATE: &str = r#"I have the following extracted markdown text from an invoice. Your task is to analyze the text and return the details in the following JSON format, inside a fenced ```json code block:

```json
{
    "company_name": "(name of the company)",
    "address": "(company address)",
    "subtotal": "(total cost without tax)",
    "total_amount": "(total cost including tax)"
}
```

Please use the extracted markdown below:

{extracted_text}"#;

/// Build the extraction prompt for a parsed bill's text.
///
/// The text is interpolated verbatim; bills containing braces, fences, or
/// JSON of their own are passed through untouched and the reply parser's
/// non-greedy search copes with whatever comes back.
pub fn extraction_prompt(extracted_text: &str) -> String {
    EXTRACTION_PROMPT_TEMPLATE.replace("{extracted_text}", extracted_text)
}

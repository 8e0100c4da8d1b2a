//! Reply parsing: raw model text → validated [`BillFields`].
//!
//! ## Why is parsing its own stage?
//!
//! Even with an explicit "respond with a fenced `json` code block"
//! instruction, models pad their reply with prose: greetings before the
//! block, caveats after it, sometimes a second block restating the first.
//! The contract this module enforces is deliberately narrow:
//!
//! - exactly the *first* fenced `json` block is considered, everything
//!   around it is ignored
//! - the block must contain a braced object; an empty or brace-less block is
//!   treated the same as no block at all
//! - all four bill fields must be present as JSON strings or numbers;
//!   numbers are rendered through their JSON source text, so `100.5` stays
//!   `"100.5"` and no float formatting is applied
//!
//! Anything short of that is a typed error so the caller can distinguish
//! "model ignored the format" ([`ScanError::NoJsonBlockFound`]) from "model
//! produced broken JSON" ([`ScanError::MalformedJson`]) from "model left
//! fields out" ([`ScanError::IncompleteRecord`]).

use crate::error::ScanError;
use crate::record::BillFields;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

// Braces are part of the pattern: a fence with no object inside must fall
// through to NoJsonBlockFound, not to a JSON syntax error.
static RE_JSON_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json\s*(\{.*?\})\s*```").unwrap());

/// Extract and validate the bill fields from a raw model reply.
///
/// Scans `reply` for the first fenced `json` block containing a braced
/// object, parses it, and requires every key in [`BillFields::FIELD_NAMES`]
/// to carry a string or number value. Missing, `null`, or structurally-typed
/// fields are collected and reported together in one
/// [`ScanError::IncompleteRecord`].
pub fn parse_fields(reply: &str) -> Result<BillFields, ScanError> {
    let caps = RE_JSON_BLOCK
        .captures(reply)
        .ok_or(ScanError::NoJsonBlockFound)?;
    let payload = &caps[1];

    let value: Value = serde_json::from_str(payload).map_err(|e| ScanError::MalformedJson {
        detail: e.to_string(),
    })?;
    let obj = value.as_object().ok_or_else(|| ScanError::MalformedJson {
        detail: "top-level JSON value is not an object".to_string(),
    })?;

    let mut missing = Vec::new();
    let fields = BillFields {
        company_name: field_text(obj, "company_name", &mut missing),
        address: field_text(obj, "address", &mut missing),
        subtotal: field_text(obj, "subtotal", &mut missing),
        total_amount: field_text(obj, "total_amount", &mut missing),
    };

    if !missing.is_empty() {
        return Err(ScanError::IncompleteRecord { missing });
    }
    Ok(fields)
}

/// Render one field as text, recording its key in `missing` when the value
/// is absent or not a string/number.
fn field_text(obj: &Map<String, Value>, key: &str, missing: &mut Vec<String>) -> String {
    match obj.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => {
            missing.push(key.to_string());
            String::new()
        }
    }
}

//! Validation of externally supplied names.
//!
//! Collection names, document types, document ids and category ids all
//! share the same character restrictions: no ASCII control characters and
//! none of `: / \ . , [ ] { }`.

use crate::core::error::{Error, Result};

/// Escape backslashes and non-printable bytes, for error messages and
/// document dumps.
pub fn hexesc_bytes(input: &[u8]) -> String {
    let mut result = String::with_capacity(input.len() * 2);
    for &ch in input {
        if ch == b'\\' {
            result.push('\\');
            result.push('\\');
        } else if (32..=127).contains(&ch) {
            result.push(ch as char);
        } else {
            result.push_str(&format!("\\x{:02x}", ch));
        }
    }
    result
}

pub fn hexesc(input: &str) -> String {
    hexesc_bytes(input.as_bytes())
}

fn forbidden(ch: char) -> bool {
    matches!(ch,
        '\u{0}'..='\u{1f}' | ':' | '/' | '\\' | '.' | ',' | '[' | ']' | '{' | '}')
}

fn check_name(value: &str, what: &str) -> Option<String> {
    if value.is_empty() {
        return Some(format!("Invalid empty {}", what));
    }
    for ch in value.chars() {
        if forbidden(ch) {
            return Some(format!(
                "Invalid character ({}) in {}",
                hexesc(&ch.to_string()),
                what
            ));
        }
    }
    None
}

pub fn validate_collname(value: &str) -> Option<String> {
    check_name(value, "collection name")
}

pub fn validate_collname_throw(value: &str) -> Result<()> {
    match validate_collname(value) {
        Some(msg) => Err(Error::invalid_value(msg)),
        None => Ok(()),
    }
}

pub fn validate_doc_type(value: &str) -> Option<String> {
    check_name(value, "document type")
}

pub fn validate_doc_id(value: &str) -> Option<String> {
    check_name(value, "document ID")
}

pub fn validate_catid(value: &str) -> Option<String> {
    check_name(value, "category identifier")
}

pub fn validate_catid_throw(value: &str) -> Result<()> {
    match validate_catid(value) {
        Some(msg) => Err(Error::invalid_value(msg)),
        None => Ok(()),
    }
}

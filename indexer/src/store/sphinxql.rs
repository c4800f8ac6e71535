//! Rendering of SphinxQL statements.
//!
//! SphinxQL has no server-side prepared statements, so values are rendered as escaped literals
//! and statements are sent through the text protocol.

use std::fmt::Write;

use crate::bail;
use crate::error::{ErrorKind, IndexerResult};
use crate::types::{ReleaseId, ReleaseRecord};

/// Quotes `value` as a SphinxQL string literal.
///
/// Escapes the same characters as the MySQL client library.
pub fn quote_str(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        match c {
            '\0' => quoted.push_str("\\0"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\x1a' => quoted.push_str("\\Z"),
            '\\' => quoted.push_str("\\\\"),
            '\'' => quoted.push_str("\\'"),
            '"' => quoted.push_str("\\\""),
            c => quoted.push(c),
        }
    }
    quoted.push('\'');
    quoted
}

/// Renders a float attribute, rejecting values SphinxQL cannot parse.
pub fn float_literal(value: f64) -> IndexerResult<String> {
    if !value.is_finite() {
        bail!(
            ErrorKind::ConversionError,
            "Float attribute is not finite",
            format!("value {value} cannot be stored in the index")
        );
    }

    Ok(value.to_string())
}

/// Validates an index name before it is written into a statement.
pub fn index_identifier(name: &str) -> IndexerResult<&str> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        bail!(
            ErrorKind::ConfigError,
            "Invalid index name",
            format!("`{name}` must only contain ASCII letters, digits and underscores")
        );
    }

    Ok(name)
}

/// Renders the replace statement for `record`.
///
/// The name is written twice: once for the full-text field and once for the string attribute.
pub fn replace_statement(index: &str, record: &ReleaseRecord) -> IndexerResult<String> {
    let name = quote_str(&record.name);
    let size = float_literal(record.size)?;

    let mut statement = String::with_capacity(96 + 2 * name.len());
    // Writing into a `String` cannot fail.
    let _ = write!(
        statement,
        "REPLACE INTO {index} VALUES ({}, {name}, {name}, {}, {}, {}, {}, {size}, {})",
        record.id,
        record.group_id,
        record.section_id,
        record.status,
        record.pre_time,
        record.file_count,
    );

    Ok(statement)
}

pub fn delete_statement(index: &str, id: ReleaseId) -> String {
    format!("DELETE FROM {index} WHERE id = {id}")
}

pub fn count_statement(index: &str) -> String {
    format!("SELECT COUNT(*) FROM {index}")
}

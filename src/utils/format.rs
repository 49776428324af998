use mongodb::bson::{Bson, Document};

use crate::error::FormatError;
use crate::utils::json::document_to_json;

pub const SEPARATOR: &str = "|";

/// Look up a dot-notation column in a result document.
///
/// A missing segment (or a null one) yields `Ok(None)`. Walking into a
/// scalar is an error, since the column cannot mean anything for that row.
pub fn lookup<'a>(doc: &'a Document, path: &str) -> Result<Option<&'a Bson>, FormatError> {
    let mut current = doc;
    let mut segments = path.split('.').peekable();

    while let Some(segment) = segments.next() {
        let last = segments.peek().is_none();
        match current.get(segment) {
            None => return Ok(None),
            Some(value) if last => return Ok(Some(value)),
            Some(Bson::Null) => return Ok(None),
            Some(Bson::Document(inner)) => current = inner,
            Some(_) => {
                return Err(FormatError::NotADocument {
                    path: path.to_string(),
                    segment: segment.to_string(),
                })
            }
        }
    }
    Ok(None)
}

/// Doubles always show a fractional part so `12.0` stays distinguishable
/// from the integer `12`.
pub fn format_double(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "inf" } else { "-inf" }.to_string()
    } else if value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

pub fn format_value(value: &Bson) -> String {
    match value {
        Bson::Null | Bson::Undefined => String::new(),
        Bson::String(s) => s.clone(),
        Bson::Int32(n) => n.to_string(),
        Bson::Int64(n) => n.to_string(),
        Bson::Double(f) => format_double(*f),
        Bson::Boolean(b) => b.to_string(),
        Bson::Document(doc) => document_to_json(doc.clone()).to_string(),
        other => other.clone().into_relaxed_extjson().to_string(),
    }
}

/// Render one result row: the requested columns joined by `|`, with
/// missing fields as empty strings.
pub fn format_row(doc: &Document, columns: &[&str]) -> Result<String, FormatError> {
    let cells = columns
        .iter()
        .map(|column| Ok(lookup(doc, column)?.map(format_value).unwrap_or_default()))
        .collect::<Result<Vec<_>, FormatError>>()?;
    Ok(cells.join(SEPARATOR))
}

//! `$match` filter evaluation.

use std::cmp::Ordering;

use mongodb::bson::{Bson, Document};

use super::ordering::{compare, compare_same_bracket, get_path};
use crate::error::{Error, Result};

/// True if `doc` satisfies `filter`. Top-level fields are ANDed.
pub fn matches(filter: &Document, doc: &Document) -> Result<bool> {
    for (key, condition) in filter {
        let ok = match key.as_str() {
            "$and" => all_of(condition, doc)?,
            op if op.starts_with('$') => {
                return Err(Error::Evaluation(format!(
                    "unsupported query operator: {}",
                    op
                )))
            }
            field => field_matches(get_path(doc, field), condition)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn sub_filters(condition: &Bson) -> Result<Vec<&Document>> {
    let items = condition
        .as_array()
        .ok_or_else(|| Error::Evaluation("$and needs an array".to_string()))?;
    items
        .iter()
        .map(|item| {
            item.as_document()
                .ok_or_else(|| Error::Evaluation("$and entries must be documents".to_string()))
        })
        .collect()
}

fn all_of(condition: &Bson, doc: &Document) -> Result<bool> {
    for filter in sub_filters(condition)? {
        if !matches(filter, doc)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn is_operator_document(condition: &Bson) -> Option<&Document> {
    match condition {
        Bson::Document(d) if !d.is_empty() && d.keys().all(|k| k.starts_with('$')) => Some(d),
        _ => None,
    }
}

/// Equality with the server's null semantics: `null` matches a missing field.
fn equals(value: Option<&Bson>, expected: &Bson) -> bool {
    match value {
        None => matches!(expected, Bson::Null),
        Some(Bson::Array(items)) if !matches!(expected, Bson::Array(_)) => {
            items.iter().any(|item| compare(item, expected) == Ordering::Equal)
        }
        Some(v) => compare(v, expected) == Ordering::Equal,
    }
}

fn field_matches(value: Option<&Bson>, condition: &Bson) -> Result<bool> {
    let operators = match is_operator_document(condition) {
        Some(ops) => ops,
        None => return Ok(equals(value, condition)),
    };

    for (op, operand) in operators {
        let ok = match op.as_str() {
            "$gt" => greater_than(value, operand),
            "$in" => {
                let options = operand
                    .as_array()
                    .ok_or_else(|| Error::Evaluation("$in needs an array".to_string()))?;
                options.iter().any(|option| equals(value, option))
            }
            other => {
                return Err(Error::Evaluation(format!(
                    "unsupported query operator: {}",
                    other
                )))
            }
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn greater_than(value: Option<&Bson>, operand: &Bson) -> bool {
    value.and_then(|v| compare_same_bracket(v, operand)) == Some(Ordering::Greater)
}

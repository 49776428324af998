//! BSON comparison order and dotted-path access shared by the evaluator.

use std::cmp::Ordering;

use mongodb::bson::{Bson, Document};

/// Get a value by dot-notation path ("dest.code"). Stops at the first
/// segment that is not a document.
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut value = doc.get(segments.next()?)?;
    for segment in segments {
        match value {
            Bson::Document(inner) => value = inner.get(segment)?,
            _ => return None,
        }
    }
    Some(value)
}

/// Get a value by path starting from an arbitrary BSON value.
pub fn get_value_path<'a>(value: &'a Bson, path: &str) -> Option<&'a Bson> {
    if path.is_empty() {
        return Some(value);
    }
    match value {
        Bson::Document(doc) => get_path(doc, path),
        _ => None,
    }
}

/// Set a value by dot-notation path, creating intermediate documents.
pub fn set_path(doc: &mut Document, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            doc.insert(path, value);
        }
        Some((head, rest)) => {
            if !matches!(doc.get(head), Some(Bson::Document(_))) {
                doc.insert(head, Document::new());
            }
            if let Some(Bson::Document(inner)) = doc.get_mut(head) {
                set_path(inner, rest, value);
            }
        }
    }
}

pub fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(*n as f64),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

pub fn as_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(n) => Some(*n as i64),
        Bson::Int64(n) => Some(*n),
        _ => None,
    }
}

pub fn is_number(value: &Bson) -> bool {
    matches!(value, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_))
}

/// Position of a value's type in the server's cross-type sort order.
fn type_rank(value: &Bson) -> u8 {
    match value {
        Bson::MinKey => 0,
        Bson::Undefined => 1,
        Bson::Null => 2,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 3,
        Bson::String(_) | Bson::Symbol(_) => 4,
        Bson::Document(_) => 5,
        Bson::Array(_) => 6,
        Bson::Binary(_) => 7,
        Bson::ObjectId(_) => 8,
        Bson::Boolean(_) => 9,
        Bson::DateTime(_) => 10,
        Bson::Timestamp(_) => 11,
        Bson::RegularExpression(_) => 12,
        Bson::MaxKey => 14,
        _ => 13,
    }
}

fn compare_numbers(a: &Bson, b: &Bson) -> Ordering {
    if let (Some(x), Some(y)) = (as_i64(a), as_i64(b)) {
        return x.cmp(&y);
    }
    match (as_f64(a), as_f64(b)) {
        // NaN sorts below every other number
        (Some(x), Some(y)) => match (x.is_nan(), y.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        },
        _ => Ordering::Equal,
    }
}

fn compare_documents(a: &Document, b: &Document) -> Ordering {
    for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
        let ord = compare(va, vb).then_with(|| ka.cmp(kb));
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

/// Total order over BSON values following the server's comparison rules.
pub fn compare(a: &Bson, b: &Bson) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }

    match (a, b) {
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::Symbol(x), Bson::Symbol(y)) => x.cmp(y),
        (Bson::String(x), Bson::Symbol(y)) | (Bson::Symbol(x), Bson::String(y)) => x.cmp(y),
        (Bson::Document(x), Bson::Document(y)) => compare_documents(x, y),
        (Bson::Array(x), Bson::Array(y)) => x
            .iter()
            .zip(y.iter())
            .map(|(l, r)| compare(l, r))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::DateTime(x), Bson::DateTime(y)) => x.cmp(y),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        (Bson::Timestamp(x), Bson::Timestamp(y)) => {
            (x.time, x.increment).cmp(&(y.time, y.increment))
        }
        _ if is_number(a) && is_number(b) => compare_numbers(a, b),
        _ => Ordering::Equal,
    }
}

/// Hashable form of a value: two values get the same key exactly when
/// [`compare`] finds them equal, so `1`, `1_i64` and `1.0` share one.
pub fn canonical_key(value: &Bson) -> String {
    let mut key = String::new();
    write_key(value, &mut key);
    key
}

fn write_key(value: &Bson, out: &mut String) {
    match value {
        Bson::Int32(_) | Bson::Int64(_) => {
            out.push_str(&format!("n{}", as_i64(value).unwrap_or_default()))
        }
        Bson::Double(f) if f.is_nan() => out.push_str("nNaN"),
        // integral doubles share the integer's key
        Bson::Double(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
            out.push_str(&format!("n{}", *f as i64))
        }
        Bson::Double(f) => out.push_str(&format!("n{:?}", f)),
        Bson::String(s) | Bson::Symbol(s) => out.push_str(&format!("s{}:{}", s.len(), s)),
        Bson::Document(doc) => {
            out.push('{');
            for (field, item) in doc {
                out.push_str(&format!("{}:{}", field.len(), field));
                write_key(item, out);
            }
            out.push('}');
        }
        Bson::Array(items) => {
            out.push('[');
            for item in items {
                write_key(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&format!("t{}:{:?}", type_rank(other), other)),
    }
}

/// Like [`compare`], with a missing value sorting before everything.
pub fn compare_missing(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => compare(x, y),
    }
}

/// Query-language comparison: only values of the same type bracket are
/// comparable (`{"$gt": 0}` never matches a string).
pub fn compare_same_bracket(a: &Bson, b: &Bson) -> Option<Ordering> {
    if type_rank(a) == type_rank(b) {
        Some(compare(a, b))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{bson, doc};

    #[test]
    fn dotted_path_lookup() {
        let d = doc! {"dest": {"code": "SFO"}, "year": 2020};
        assert_eq!(get_path(&d, "dest.code"), Some(&Bson::String("SFO".into())));
        assert_eq!(get_path(&d, "year.x"), None);
        assert_eq!(get_path(&d, "missing"), None);
    }

    #[test]
    fn set_path_creates_parents() {
        let mut d = doc! {"a": 1};
        set_path(&mut d, "b.c", Bson::Int32(2));
        assert_eq!(d, doc! {"a": 1, "b": {"c": 2}});
    }

    #[test]
    fn numbers_compare_across_types() {
        assert_eq!(compare(&bson!(1), &bson!(1.0)), Ordering::Equal);
        assert_eq!(compare(&bson!(2_i64), &bson!(1.5)), Ordering::Greater);
    }

    #[test]
    fn cross_type_order() {
        assert_eq!(compare(&Bson::Null, &bson!(0)), Ordering::Less);
        assert_eq!(compare(&bson!(100), &bson!("a")), Ordering::Less);
        assert_eq!(compare(&bson!("z"), &bson!({"a": 1})), Ordering::Less);
        assert_eq!(compare(&bson!([1]), &bson!(false)), Ordering::Less);
        assert_eq!(compare_missing(None, Some(&Bson::Null)), Ordering::Less);
    }

    #[test]
    fn canonical_keys_follow_equality() {
        assert_eq!(canonical_key(&bson!(1)), canonical_key(&bson!(1.0)));
        assert_eq!(canonical_key(&bson!(7_i64)), canonical_key(&bson!(7)));
        assert_eq!(
            canonical_key(&bson!({"airline": "UA", "n": 2})),
            canonical_key(&bson!({"airline": "UA", "n": 2.0}))
        );
        assert_ne!(canonical_key(&bson!(1)), canonical_key(&bson!(1.5)));
        assert_ne!(canonical_key(&bson!(1)), canonical_key(&bson!("1")));
        assert_ne!(canonical_key(&Bson::Null), canonical_key(&bson!(0)));
        assert_ne!(
            canonical_key(&bson!({"a": "b"})),
            canonical_key(&bson!({"b": "a"}))
        );
    }

    #[test]
    fn query_comparison_needs_same_bracket() {
        assert_eq!(compare_same_bracket(&bson!("5"), &bson!(0)), None);
        assert_eq!(
            compare_same_bracket(&bson!(5), &bson!(0)),
            Some(Ordering::Greater)
        );
    }
}

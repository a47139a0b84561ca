//! Value coercion and comparison helpers.

use std::cmp::Ordering;

use bson::{Bson, Document};
use serde::Serialize;

use crate::error::{QueryError, QueryResult};

/// Parse a key spec into a field name and direction.
///
/// A leading `-` means descending (`-1`), otherwise ascending (`1`).
/// Empty keys produce nothing.
///
/// ```rust
/// use quarry_query::coerce::index_key;
///
/// assert_eq!(index_key("-age"), Some(("age".to_string(), -1)));
/// assert_eq!(index_key("name"), Some(("name".to_string(), 1)));
/// assert_eq!(index_key(""), None);
/// ```
pub fn index_key(key: &str) -> Option<(String, i32)> {
    let (field, direction) = match key.strip_prefix('-') {
        Some(field) => (field, -1),
        None => (key, 1),
    };
    if field.is_empty() {
        None
    } else {
        Some((field.to_string(), direction))
    }
}

/// Build an ordered key document from key specs.
pub fn key_document<I, S>(keys: I) -> Document
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut doc = Document::new();
    for key in keys {
        if let Some((field, direction)) = index_key(key.as_ref()) {
            doc.insert(field, direction);
        }
    }
    doc
}

/// Whether a value is the zero value of its kind.
pub fn is_zero(value: &Bson) -> bool {
    match value {
        Bson::Null | Bson::Undefined => true,
        Bson::Document(doc) => doc.is_empty(),
        Bson::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Whether a decoded document can be written into this value.
pub fn is_unpackable(target: &Bson) -> bool {
    matches!(target, Bson::Document(_) | Bson::Array(_))
}

/// Whether a document is made only of update operators such as `$set`.
pub fn is_update_document(doc: &Document) -> bool {
    !doc.is_empty() && doc.keys().all(|key| key.starts_with('$'))
}

/// Whether any top-level key of a document is an update operator.
pub fn has_update_operator(doc: &Document) -> bool {
    doc.keys().any(|key| key.starts_with('$'))
}

/// Serialize a single value into a document.
pub fn to_document<T: Serialize + ?Sized>(value: &T) -> QueryResult<Document> {
    match bson::to_bson(value)? {
        Bson::Document(doc) => Ok(doc),
        other => Err(QueryError::wrong_type("document", &other)),
    }
}

/// Convert a sequence of values into documents in one pass.
pub fn to_documents<I, T>(items: I) -> QueryResult<Vec<Document>>
where
    I: IntoIterator<Item = T>,
    T: Serialize,
{
    items.into_iter().map(|item| to_document(&item)).collect()
}

/// Canonical rank of a BSON type for cross-type comparison.
fn type_rank(value: &Bson) -> u8 {
    match value {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::DbPointer(_) => 12,
        Bson::JavaScriptCode(_) | Bson::JavaScriptCodeWithScope(_) => 13,
        Bson::MaxKey => 14,
    }
}

/// Whether two values belong to the same comparison bracket.
pub fn same_kind(a: &Bson, b: &Bson) -> bool {
    type_rank(a) == type_rank(b)
}

/// Numeric view of a value, if it has one.
pub fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

fn as_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(v) => Some(i64::from(*v)),
        Bson::Int64(v) => Some(*v),
        _ => None,
    }
}

fn str_value(value: &Bson) -> Option<&str> {
    match value {
        Bson::String(s) | Bson::Symbol(s) => Some(s),
        _ => None,
    }
}

/// Compare two values in canonical BSON order.
///
/// Values of different kinds order by type rank; numbers compare by value
/// regardless of their width.
pub fn compare_bson(a: &Bson, b: &Bson) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }

    match (a, b) {
        _ if as_i64(a).is_some() && as_i64(b).is_some() => {
            as_i64(a).cmp(&as_i64(b))
        }
        _ if as_f64(a).is_some() && as_f64(b).is_some() => {
            let (x, y) = (as_f64(a).unwrap_or_default(), as_f64(b).unwrap_or_default());
            x.total_cmp(&y)
        }
        _ if str_value(a).is_some() => str_value(a).cmp(&str_value(b)),
        (Bson::Document(x), Bson::Document(y)) => compare_documents(x, y),
        (Bson::Array(x), Bson::Array(y)) => compare_sequences(x, y),
        (Bson::Binary(x), Bson::Binary(y)) => x
            .bytes
            .len()
            .cmp(&y.bytes.len())
            .then_with(|| x.bytes.cmp(&y.bytes)),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::DateTime(x), Bson::DateTime(y)) => {
            x.timestamp_millis().cmp(&y.timestamp_millis())
        }
        (Bson::Timestamp(x), Bson::Timestamp(y)) => {
            (x.time, x.increment).cmp(&(y.time, y.increment))
        }
        (Bson::RegularExpression(x), Bson::RegularExpression(y)) => x
            .pattern
            .cmp(&y.pattern)
            .then_with(|| x.options.cmp(&y.options)),
        _ => Ordering::Equal,
    }
}

/// Whether two values are equal under [`compare_bson`].
pub fn bson_eq(a: &Bson, b: &Bson) -> bool {
    compare_bson(a, b) == Ordering::Equal
}

fn compare_documents(a: &Document, b: &Document) -> Ordering {
    for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
        let ordering = ka.cmp(kb).then_with(|| compare_bson(va, vb));
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    a.len().cmp(&b.len())
}

fn compare_sequences(a: &[Bson], b: &[Bson]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        let ordering = compare_bson(x, y);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    a.len().cmp(&b.len())
}

/// Sort values canonically and drop duplicates.
pub fn sort_dedup(values: &mut Vec<Bson>) {
    values.sort_by(compare_bson);
    values.dedup_by(|a, b| bson_eq(a, b));
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, oid::ObjectId};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_key_document_preserves_order() {
        let keys = key_document(["-name", "", "age"]);
        assert_eq!(keys, doc! { "name": -1, "age": 1 });
    }

    #[test]
    fn test_lone_dash_is_ignored() {
        assert_eq!(index_key("-"), None);
    }

    #[test]
    fn test_is_zero() {
        assert!(is_zero(&Bson::Null));
        assert!(is_zero(&Bson::Array(vec![])));
        assert!(is_zero(&Bson::Document(Document::new())));
        assert!(!is_zero(&Bson::Int32(0)));
        assert!(!is_zero(&Bson::String(String::new())));
    }

    #[test]
    fn test_is_unpackable() {
        assert!(is_unpackable(&Bson::Document(Document::new())));
        assert!(is_unpackable(&Bson::Array(vec![])));
        assert!(!is_unpackable(&Bson::Int64(3)));
        assert!(!is_unpackable(&Bson::Null));
    }

    #[test]
    fn test_numbers_compare_across_widths() {
        assert_eq!(compare_bson(&Bson::Int32(2), &Bson::Int64(10)), Ordering::Less);
        assert_eq!(compare_bson(&Bson::Double(2.5), &Bson::Int32(2)), Ordering::Greater);
        assert!(bson_eq(&Bson::Int32(4), &Bson::Double(4.0)));
    }

    #[test]
    fn test_cross_type_order() {
        let mut values = vec![
            Bson::Boolean(true),
            Bson::String("joker".into()),
            Bson::ObjectId(ObjectId::new()),
            Bson::Null,
            Bson::Int32(1),
        ];
        values.sort_by(compare_bson);
        assert_eq!(values[0], Bson::Null);
        assert_eq!(values[1], Bson::Int32(1));
        assert_eq!(values[2], Bson::String("joker".into()));
        assert_eq!(values[4], Bson::Boolean(true));
    }

    #[test]
    fn test_sort_dedup() {
        let mut values = vec![Bson::Int32(3), Bson::Int64(1), Bson::Int32(3), Bson::Double(1.0)];
        sort_dedup(&mut values);
        assert_eq!(values, vec![Bson::Int64(1), Bson::Int32(3)]);
    }

    #[test]
    fn test_to_documents_rejects_scalars() {
        let err = to_documents(vec![1, 2]).unwrap_err();
        assert!(err.is_wrong_type());

        let docs = to_documents(vec![doc! { "name": "Bane" }]).unwrap();
        assert_eq!(docs.len(), 1);
    }
}

//! Aggregation stages, sorting and projection for the in-memory store.

use std::cmp::Ordering;

use bson::{Bson, Document};

use super::matcher::{lookup, matches};
use super::update::set_path;
use crate::coerce::{as_f64, bson_eq, compare_bson};
use crate::error::{StoreError, StoreResult};

/// Run a pipeline over a snapshot of documents.
pub(crate) fn run_pipeline(mut documents: Vec<Document>, pipeline: &[Document]) -> StoreResult<Vec<Document>> {
    for stage in pipeline {
        let mut entries = stage.iter();
        let (Some((name, spec)), None) = (entries.next(), entries.next()) else {
            return Err(StoreError::backend("a pipeline stage must have exactly one field"));
        };
        documents = match (name.as_str(), spec) {
            ("$match", Bson::Document(filter)) => {
                let mut kept = Vec::with_capacity(documents.len());
                for doc in documents {
                    if matches(&doc, filter)? {
                        kept.push(doc);
                    }
                }
                kept
            }
            ("$sort", Bson::Document(order)) => {
                sort_documents(&mut documents, order);
                documents
            }
            ("$skip", count) => {
                let count = non_negative(name, count)?;
                documents.into_iter().skip(count).collect()
            }
            ("$limit", count) => {
                let count = non_negative(name, count)?;
                if count == 0 {
                    return Err(StoreError::backend("the limit must be positive"));
                }
                documents.into_iter().take(count).collect()
            }
            ("$count", Bson::String(field)) => {
                if documents.is_empty() {
                    Vec::new()
                } else {
                    let count = documents.len();
                    let mut out = Document::new();
                    match i32::try_from(count) {
                        Ok(n) => out.insert(field.clone(), n),
                        Err(_) => out.insert(field.clone(), count as i64),
                    };
                    vec![out]
                }
            }
            ("$project", Bson::Document(spec)) => documents
                .iter()
                .map(|doc| project(doc, spec))
                .collect::<StoreResult<_>>()?,
            ("$unwind", Bson::String(path)) => unwind(documents, path),
            ("$group", Bson::Document(spec)) => group(&documents, spec)?,
            (other, _) => {
                return Err(StoreError::backend(format!("unsupported pipeline stage: {other}")));
            }
        };
    }
    Ok(documents)
}

fn non_negative(stage: &str, value: &Bson) -> StoreResult<usize> {
    as_f64(value)
        .filter(|n| *n >= 0.0)
        .map(|n| n as usize)
        .ok_or_else(|| StoreError::backend(format!("{stage} needs a non-negative number")))
}

/// Compare two documents by an ordered key document.
pub(crate) fn compare_by(order: &Document, a: &Document, b: &Document) -> Ordering {
    for (field, direction) in order {
        let left = lookup(a, field).unwrap_or(&Bson::Null);
        let right = lookup(b, field).unwrap_or(&Bson::Null);
        let ordering = compare_bson(left, right);
        let ordering = if as_f64(direction).is_some_and(|d| d < 0.0) {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Sort documents in place by an ordered key document.
pub(crate) fn sort_documents(documents: &mut [Document], order: &Document) {
    documents.sort_by(|a, b| compare_by(order, a, b));
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(flag) => *flag,
        other => as_f64(other).is_none_or(|n| n != 0.0),
    }
}

/// Apply an inclusion or exclusion projection.
pub(crate) fn project(doc: &Document, spec: &Document) -> StoreResult<Document> {
    let inclusive = spec
        .iter()
        .any(|(field, value)| field != "_id" && truthy(value));
    let keep_id = spec.get("_id").is_none_or(truthy);

    if inclusive {
        let mut out = Document::new();
        if keep_id {
            if let Some(id) = doc.get("_id") {
                out.insert("_id", id.clone());
            }
        }
        for (field, value) in spec {
            if field == "_id" {
                continue;
            }
            match value {
                Bson::String(expr) if expr.starts_with('$') => {
                    if let Some(found) = evaluate(doc, value) {
                        set_path(&mut out, field, found)?;
                    }
                }
                flag if truthy(flag) => {
                    if let Some(found) = lookup(doc, field) {
                        set_path(&mut out, field, found.clone())?;
                    }
                }
                _ => {}
            }
        }
        Ok(out)
    } else {
        let mut out = doc.clone();
        for (field, _) in spec {
            if field == "_id" && keep_id {
                continue;
            }
            match field.rsplit_once('.') {
                None => {
                    out.remove(field);
                }
                Some((parent, last)) => {
                    if let Ok(inner) = out.get_document_mut(parent) {
                        inner.remove(last);
                    }
                }
            }
        }
        Ok(out)
    }
}

/// Evaluate a field path (`"$name"`) or literal expression.
///
/// Returns `None` when a referenced field is missing.
pub(crate) fn evaluate(doc: &Document, expr: &Bson) -> Option<Bson> {
    match expr {
        Bson::String(path) if path.starts_with('$') => lookup(doc, &path[1..]).cloned(),
        Bson::Document(fields) => {
            let mut out = Document::new();
            for (key, value) in fields {
                out.insert(key.clone(), evaluate(doc, value).unwrap_or(Bson::Null));
            }
            Some(Bson::Document(out))
        }
        literal => Some(literal.clone()),
    }
}

fn unwind(documents: Vec<Document>, path: &str) -> Vec<Document> {
    let field = path.trim_start_matches('$');
    let mut out = Vec::new();
    for doc in documents {
        match lookup(&doc, field) {
            Some(Bson::Array(items)) => {
                for item in items.clone() {
                    let mut copy = doc.clone();
                    // Only top-level fields are unwound.
                    copy.insert(field, item);
                    out.push(copy);
                }
            }
            Some(Bson::Null) | None => {}
            Some(_) => out.push(doc),
        }
    }
    out
}

enum Accumulator {
    AddToSet(Vec<Bson>),
    Push(Vec<Bson>),
    Sum { int: i64, float: f64, fractional: bool },
    First(Option<Bson>),
    Last(Option<Bson>),
    Min(Option<Bson>),
    Max(Option<Bson>),
}

impl Accumulator {
    fn new(op: &str) -> StoreResult<Self> {
        Ok(match op {
            "$addToSet" => Self::AddToSet(Vec::new()),
            "$push" => Self::Push(Vec::new()),
            "$sum" => Self::Sum { int: 0, float: 0.0, fractional: false },
            "$first" => Self::First(None),
            "$last" => Self::Last(None),
            "$min" => Self::Min(None),
            "$max" => Self::Max(None),
            other => return Err(StoreError::backend(format!("unknown group operator: {other}"))),
        })
    }

    fn feed(&mut self, value: Option<Bson>) {
        match self {
            Self::AddToSet(values) => {
                if let Some(value) = value {
                    if !values.iter().any(|existing| bson_eq(existing, &value)) {
                        values.push(value);
                    }
                }
            }
            Self::Push(values) => values.extend(value),
            Self::Sum { int, float, fractional } => match value {
                Some(Bson::Int32(n)) => *int += i64::from(n),
                Some(Bson::Int64(n)) => *int += n,
                Some(Bson::Double(n)) => {
                    *float += n;
                    *fractional = true;
                }
                _ => {}
            },
            Self::First(slot) => {
                if slot.is_none() {
                    *slot = Some(value.unwrap_or(Bson::Null));
                }
            }
            Self::Last(slot) => *slot = Some(value.unwrap_or(Bson::Null)),
            Self::Min(slot) => {
                if let Some(value) = value {
                    if slot.as_ref().is_none_or(|current| compare_bson(&value, current).is_lt()) {
                        *slot = Some(value);
                    }
                }
            }
            Self::Max(slot) => {
                if let Some(value) = value {
                    if slot.as_ref().is_none_or(|current| compare_bson(&value, current).is_gt()) {
                        *slot = Some(value);
                    }
                }
            }
        }
    }

    fn finish(self) -> Bson {
        match self {
            Self::AddToSet(values) | Self::Push(values) => Bson::Array(values),
            Self::Sum { int, float, fractional } => {
                if fractional {
                    Bson::Double(float + int as f64)
                } else if let Ok(small) = i32::try_from(int) {
                    Bson::Int32(small)
                } else {
                    Bson::Int64(int)
                }
            }
            Self::First(slot) | Self::Last(slot) | Self::Min(slot) | Self::Max(slot) => {
                slot.unwrap_or(Bson::Null)
            }
        }
    }
}

fn group(documents: &[Document], spec: &Document) -> StoreResult<Vec<Document>> {
    let id_expr = spec
        .get("_id")
        .ok_or_else(|| StoreError::backend("a group specification must include an _id"))?;

    let mut fields = Vec::new();
    for (name, accumulator) in spec {
        if name == "_id" {
            continue;
        }
        let Bson::Document(accumulator) = accumulator else {
            return Err(StoreError::backend(format!("group field '{name}' must be an object")));
        };
        let Some((op, expr)) = accumulator.iter().next() else {
            return Err(StoreError::backend(format!("group field '{name}' is empty")));
        };
        Accumulator::new(op)?;
        fields.push((name.clone(), op.clone(), expr.clone()));
    }

    let mut groups: Vec<(Bson, Vec<Accumulator>)> = Vec::new();
    for doc in documents {
        let key = evaluate(doc, id_expr).unwrap_or(Bson::Null);
        let position = match groups.iter().position(|(existing, _)| bson_eq(existing, &key)) {
            Some(position) => position,
            None => {
                let accumulators = fields
                    .iter()
                    .map(|(_, op, _)| Accumulator::new(op))
                    .collect::<StoreResult<_>>()?;
                groups.push((key, accumulators));
                groups.len() - 1
            }
        };
        for ((_, _, expr), accumulator) in fields.iter().zip(groups[position].1.iter_mut()) {
            accumulator.feed(evaluate(doc, expr));
        }
    }

    Ok(groups
        .into_iter()
        .map(|(key, accumulators)| {
            let mut out = Document::new();
            out.insert("_id", key);
            for ((name, _, _), accumulator) in fields.iter().zip(accumulators) {
                out.insert(name.clone(), accumulator.finish());
            }
            out
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use pretty_assertions::assert_eq;

    fn rogues() -> Vec<Document> {
        vec![
            doc! { "_id": 1, "name": "Joker", "year": 1940, "tags": ["clown"] },
            doc! { "_id": 2, "name": "Catwoman", "year": 1940, "tags": ["thief", "cat"] },
            doc! { "_id": 3, "name": "Riddler", "year": 1948 },
            doc! { "_id": 4, "name": "Bane", "year": 1993 },
        ]
    }

    #[test]
    fn test_match_sort_skip_limit() {
        let pipeline = vec![
            doc! { "$match": { "year": { "$lt": 1990 } } },
            doc! { "$sort": { "name": -1 } },
            doc! { "$skip": 1 },
            doc! { "$limit": 1 },
        ];
        let out = run_pipeline(rogues(), &pipeline).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get_str("name").unwrap(), "Joker");
    }

    #[test]
    fn test_group_add_to_set() {
        let pipeline = vec![doc! {
            "$group": { "_id": null, "years": { "$addToSet": "$year" }, "total": { "$sum": 1 } }
        }];
        let out = run_pipeline(rogues(), &pipeline).unwrap();
        assert_eq!(out, vec![doc! { "_id": null, "years": [1940, 1948, 1993], "total": 4 }]);
    }

    #[test]
    fn test_group_by_field() {
        let pipeline = vec![
            doc! { "$group": { "_id": "$year", "names": { "$push": "$name" } } },
            doc! { "$sort": { "_id": 1 } },
        ];
        let out = run_pipeline(rogues(), &pipeline).unwrap();
        assert_eq!(out[0], doc! { "_id": 1940, "names": ["Joker", "Catwoman"] });
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_count_and_unwind() {
        let out = run_pipeline(rogues(), &[doc! { "$unwind": "$tags" }, doc! { "$count": "n" }]).unwrap();
        assert_eq!(out, vec![doc! { "n": 3 }]);
    }

    #[test]
    fn test_projection_modes() {
        let doc = doc! { "_id": 1, "name": "Joker", "year": 1940 };
        assert_eq!(project(&doc, &doc! { "name": 1 }).unwrap(), doc! { "_id": 1, "name": "Joker" });
        assert_eq!(project(&doc, &doc! { "name": 1, "_id": 0 }).unwrap(), doc! { "name": "Joker" });
        assert_eq!(project(&doc, &doc! { "year": 0 }).unwrap(), doc! { "_id": 1, "name": "Joker" });
    }

    #[test]
    fn test_unknown_stage() {
        assert!(run_pipeline(rogues(), &[doc! { "$lookup": {} }]).is_err());
        assert!(run_pipeline(rogues(), &[doc! { "$limit": 0 }]).is_err());
    }
}

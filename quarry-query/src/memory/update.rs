//! Update operator application for the in-memory store.

use bson::{Bson, Document};

use super::matcher::{is_operator_document, matches, value_matches};
use crate::coerce::bson_eq;
use crate::error::{StoreError, StoreResult};

/// Most null elements a `$set` past the end of an array may pad with.
const MAX_ARRAY_BACKFILL: usize = 1_500_000;

/// Reject update documents that are not made of `$` operators.
pub(crate) fn validate_update(update: &Document) -> StoreResult<()> {
    if update.is_empty() {
        return Err(StoreError::backend("update document must not be empty"));
    }
    match update.keys().find(|key| !key.starts_with('$')) {
        Some(key) => Err(StoreError::backend(format!(
            "update document requires atomic operators, found '{key}'"
        ))),
        None => Ok(()),
    }
}

/// Reject replacement documents that contain `$` operators.
pub(crate) fn validate_replacement(replacement: &Document) -> StoreResult<()> {
    match replacement.keys().find(|key| key.starts_with('$')) {
        Some(key) => Err(StoreError::backend(format!(
            "replacement document must not contain operators, found '{key}'"
        ))),
        None => Ok(()),
    }
}

/// Apply an update to a document, returning whether it changed.
pub(crate) fn apply_update(doc: &mut Document, update: &Document, inserting: bool) -> StoreResult<bool> {
    let before = doc.clone();
    for (op, fields) in update {
        let Bson::Document(fields) = fields else {
            return Err(StoreError::backend(format!("{op} needs an object")));
        };
        for (path, operand) in fields {
            match op.as_str() {
                "$set" => set_path(doc, path, operand.clone())?,
                "$setOnInsert" => {
                    if inserting {
                        set_path(doc, path, operand.clone())?;
                    }
                }
                "$unset" => remove_path(doc, path),
                "$inc" => increment(doc, path, operand)?,
                "$push" => push(doc, path, operand, false)?,
                "$addToSet" => push(doc, path, operand, true)?,
                "$pull" => pull(doc, path, |item| pull_matches(item, operand))?,
                "$pullAll" => {
                    let Bson::Array(values) = operand else {
                        return Err(StoreError::backend("$pullAll needs an array"));
                    };
                    pull(doc, path, |item| {
                        Ok(values.iter().any(|value| bson_eq(item, value)))
                    })?;
                }
                "$pop" => pop(doc, path, operand)?,
                other => {
                    return Err(StoreError::backend(format!("unknown update operator: {other}")));
                }
            }
        }
    }
    Ok(*doc != before)
}

/// Seed an upserted document from the equality clauses of a filter.
pub(crate) fn seed_from_filter(filter: &Document) -> StoreResult<Document> {
    let mut doc = Document::new();
    for (key, value) in filter {
        if key.starts_with('$') {
            continue;
        }
        match value {
            Bson::Document(inner) if is_operator_document(inner) => {
                if let Some(eq) = inner.get("$eq") {
                    set_path(&mut doc, key, eq.clone())?;
                }
            }
            other => set_path(&mut doc, key, other.clone())?,
        }
    }
    Ok(doc)
}

pub(crate) fn set_path(doc: &mut Document, path: &str, value: Bson) -> StoreResult<()> {
    match path.split_once('.') {
        None => {
            doc.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            let child = doc
                .entry(head.to_string())
                .or_insert_with(|| Bson::Document(Document::new()));
            set_in(child, rest, value)
        }
    }
}

fn set_in(target: &mut Bson, path: &str, value: Bson) -> StoreResult<()> {
    match target {
        Bson::Document(inner) => set_path(inner, path, value),
        Bson::Array(items) => {
            let (head, rest) = match path.split_once('.') {
                Some((head, rest)) => (head, Some(rest)),
                None => (path, None),
            };
            let index: usize = head
                .parse()
                .map_err(|_| StoreError::backend(format!("cannot index array with '{head}'")))?;
            if index.saturating_sub(items.len()) > MAX_ARRAY_BACKFILL {
                return Err(StoreError::backend(format!(
                    "cannot backfill array to index {index}, limit is {MAX_ARRAY_BACKFILL} elements"
                )));
            }
            while items.len() <= index {
                items.push(Bson::Null);
            }
            match rest {
                None => {
                    items[index] = value;
                    Ok(())
                }
                Some(rest) => {
                    if matches!(items[index], Bson::Null) {
                        items[index] = Bson::Document(Document::new());
                    }
                    set_in(&mut items[index], rest, value)
                }
            }
        }
        other => Err(StoreError::backend(format!(
            "cannot create field '{path}' in element of type {:?}",
            other.element_type()
        ))),
    }
}

fn get_path_mut<'a>(doc: &'a mut Document, path: &str) -> Option<&'a mut Bson> {
    let mut parts = path.split('.');
    let mut current = doc.get_mut(parts.next()?)?;
    for part in parts {
        current = match current {
            Bson::Document(inner) => inner.get_mut(part)?,
            Bson::Array(items) => items.get_mut(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn remove_path(doc: &mut Document, path: &str) {
    match path.rsplit_once('.') {
        None => {
            doc.remove(path);
        }
        Some((parent, last)) => {
            if let Some(Bson::Document(inner)) = get_path_mut(doc, parent) {
                inner.remove(last);
            }
        }
    }
}

fn increment(doc: &mut Document, path: &str, operand: &Bson) -> StoreResult<()> {
    let current = get_path_mut(doc, path).map(|value| value.clone());
    let next = match current {
        None => operand.clone(),
        Some(existing) => add_numbers(&existing, operand).ok_or_else(|| {
            StoreError::backend(format!("cannot apply $inc to non-numeric field '{path}'"))
        })?,
    };
    set_path(doc, path, next)
}

fn add_numbers(a: &Bson, b: &Bson) -> Option<Bson> {
    Some(match (a, b) {
        (Bson::Int32(x), Bson::Int32(y)) => match x.checked_add(*y) {
            Some(sum) => Bson::Int32(sum),
            None => Bson::Int64(i64::from(*x) + i64::from(*y)),
        },
        (Bson::Int32(x), Bson::Int64(y)) => Bson::Int64(i64::from(*x).checked_add(*y)?),
        (Bson::Int64(x), Bson::Int32(y)) => Bson::Int64(x.checked_add(i64::from(*y))?),
        (Bson::Int64(x), Bson::Int64(y)) => Bson::Int64(x.checked_add(*y)?),
        (Bson::Double(x), other) | (other, Bson::Double(x)) => {
            Bson::Double(x + crate::coerce::as_f64(other)?)
        }
        _ => return None,
    })
}

fn array_at<'a>(doc: &'a mut Document, path: &str) -> StoreResult<&'a mut Vec<Bson>> {
    if get_path_mut(doc, path).is_none() {
        set_path(doc, path, Bson::Array(Vec::new()))?;
    }
    match get_path_mut(doc, path) {
        Some(Bson::Array(items)) => Ok(items),
        _ => Err(StoreError::backend(format!("field '{path}' is not an array"))),
    }
}

fn push(doc: &mut Document, path: &str, operand: &Bson, unique: bool) -> StoreResult<()> {
    let values = match operand {
        Bson::Document(modifiers) if modifiers.contains_key("$each") => match modifiers.get("$each") {
            Some(Bson::Array(each)) => each.clone(),
            _ => return Err(StoreError::backend("$each needs an array")),
        },
        single => vec![single.clone()],
    };
    let items = array_at(doc, path)?;
    for value in values {
        if unique && items.iter().any(|item| bson_eq(item, &value)) {
            continue;
        }
        items.push(value);
    }
    Ok(())
}

fn pull_matches(item: &Bson, condition: &Bson) -> StoreResult<bool> {
    match (item, condition) {
        (_, Bson::Document(ops)) if is_operator_document(ops) => value_matches(Some(item), condition),
        (Bson::Document(inner), Bson::Document(sub)) => matches(inner, sub),
        _ => Ok(bson_eq(item, condition)),
    }
}

fn pull<F>(doc: &mut Document, path: &str, mut remove: F) -> StoreResult<()>
where
    F: FnMut(&Bson) -> StoreResult<bool>,
{
    let Some(target) = get_path_mut(doc, path) else {
        return Ok(());
    };
    let Bson::Array(items) = target else {
        return Err(StoreError::backend(format!("cannot pull from non-array field '{path}'")));
    };
    let mut kept = Vec::with_capacity(items.len());
    for item in items.drain(..) {
        if !remove(&item)? {
            kept.push(item);
        }
    }
    *items = kept;
    Ok(())
}

fn pop(doc: &mut Document, path: &str, operand: &Bson) -> StoreResult<()> {
    let Some(target) = get_path_mut(doc, path) else {
        return Ok(());
    };
    let Bson::Array(items) = target else {
        return Err(StoreError::backend(format!("cannot pop from non-array field '{path}'")));
    };
    if items.is_empty() {
        return Ok(());
    }
    match operand {
        Bson::Int32(-1) | Bson::Int64(-1) => {
            items.remove(0);
        }
        Bson::Int32(1) | Bson::Int64(1) => {
            items.pop();
        }
        _ => return Err(StoreError::backend("$pop needs 1 or -1")),
    }
    Ok(())
}

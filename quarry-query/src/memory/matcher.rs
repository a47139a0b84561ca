//! Filter evaluation against in-memory documents.

use bson::{Bson, Document};

use crate::coerce::{as_f64, bson_eq, compare_bson, same_kind};
use crate::error::{StoreError, StoreResult};

/// Resolve a dotted path inside a document.
///
/// Numeric path segments index into arrays.
pub(crate) fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Bson::Document(inner) => inner.get(part)?,
            Bson::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Whether a document satisfies a filter.
pub(crate) fn matches(doc: &Document, filter: &Document) -> StoreResult<bool> {
    for (key, condition) in filter {
        let satisfied = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(key, condition)? {
                    if !matches(doc, clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for clause in clauses(key, condition)? {
                    if matches(doc, clause)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$nor" => {
                let mut none = true;
                for clause in clauses(key, condition)? {
                    if matches(doc, clause)? {
                        none = false;
                        break;
                    }
                }
                none
            }
            op if op.starts_with('$') => {
                return Err(StoreError::backend(format!("unknown top level operator: {op}")));
            }
            field => value_matches(lookup(doc, field), condition)?,
        };
        if !satisfied {
            return Ok(false);
        }
    }
    Ok(true)
}

fn clauses<'a>(operator: &str, condition: &'a Bson) -> StoreResult<Vec<&'a Document>> {
    let Bson::Array(items) = condition else {
        return Err(StoreError::backend(format!("{operator} must be an array")));
    };
    items
        .iter()
        .map(|item| match item {
            Bson::Document(clause) => Ok(clause),
            _ => Err(StoreError::backend(format!("{operator} entries must be documents"))),
        })
        .collect()
}

/// Whether a document is made of query operators (`{"$gt": 1}`).
pub(crate) fn is_operator_document(doc: &Document) -> bool {
    doc.keys().next().is_some_and(|key| key.starts_with('$'))
}

/// Whether a field value satisfies a condition.
pub(crate) fn value_matches(value: Option<&Bson>, condition: &Bson) -> StoreResult<bool> {
    match condition {
        Bson::Document(ops) if is_operator_document(ops) => {
            for (op, operand) in ops {
                if !operator_matches(value, op, operand)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        expected => Ok(equals(value, expected)),
    }
}

fn any_candidate(value: Option<&Bson>, predicate: impl Fn(&Bson) -> bool) -> bool {
    match value {
        None => false,
        Some(whole @ Bson::Array(items)) => predicate(whole) || items.iter().any(&predicate),
        Some(single) => predicate(single),
    }
}

fn equals(value: Option<&Bson>, expected: &Bson) -> bool {
    match value {
        None => matches!(expected, Bson::Null),
        found => any_candidate(found, |candidate| bson_eq(candidate, expected)),
    }
}

fn ordered(value: Option<&Bson>, operand: &Bson, accept: fn(std::cmp::Ordering) -> bool) -> bool {
    any_candidate(value, |candidate| {
        same_kind(candidate, operand) && accept(compare_bson(candidate, operand))
    })
}

fn operator_matches(value: Option<&Bson>, op: &str, operand: &Bson) -> StoreResult<bool> {
    let result = match op {
        "$eq" => equals(value, operand),
        "$ne" => !equals(value, operand),
        "$gt" => ordered(value, operand, |o| o.is_gt()),
        "$gte" => ordered(value, operand, |o| o.is_ge()),
        "$lt" => ordered(value, operand, |o| o.is_lt()),
        "$lte" => ordered(value, operand, |o| o.is_le()),
        "$in" => in_list(value, op, operand)?,
        "$nin" => !in_list(value, op, operand)?,
        "$exists" => {
            let wanted = match operand {
                Bson::Boolean(flag) => *flag,
                other => as_f64(other).is_some_and(|n| n != 0.0),
            };
            value.is_some() == wanted
        }
        "$not" => !value_matches(value, operand)?,
        "$size" => {
            let wanted = as_f64(operand)
                .ok_or_else(|| StoreError::backend("$size needs a number"))?;
            matches!(value, Some(Bson::Array(items)) if items.len() as f64 == wanted)
        }
        "$all" => {
            let Bson::Array(required) = operand else {
                return Err(StoreError::backend("$all needs an array"));
            };
            required.iter().all(|item| equals(value, item))
        }
        "$elemMatch" => {
            let Bson::Document(sub) = operand else {
                return Err(StoreError::backend("$elemMatch needs an object"));
            };
            let Some(Bson::Array(items)) = value else {
                return Ok(false);
            };
            let mut found = false;
            for item in items {
                let hit = match item {
                    Bson::Document(inner) if !is_operator_document(sub) => matches(inner, sub)?,
                    other => value_matches(Some(other), operand)?,
                };
                if hit {
                    found = true;
                    break;
                }
            }
            found
        }
        other => return Err(StoreError::backend(format!("unknown operator: {other}"))),
    };
    Ok(result)
}

fn in_list(value: Option<&Bson>, op: &str, operand: &Bson) -> StoreResult<bool> {
    let Bson::Array(options) = operand else {
        return Err(StoreError::backend(format!("{op} needs an array")));
    };
    Ok(options.iter().any(|option| equals(value, option)))
}

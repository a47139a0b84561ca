//! Store-native option structures assembled by the query builders.
//!
//! Builders collect settings and translate them into one of these structures
//! at terminal-call time. A [`Store`](crate::Store) implementation maps them
//! onto whatever its backend understands.

use std::time::Duration;

use bson::Document;
use serde::{Deserialize, Serialize};

/// Locale-aware string comparison rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collation {
    /// ICU locale, e.g. `"en"`.
    pub locale: String,
    /// Comparison strength, 1 through 5.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strength: Option<i32>,
    /// Whether to include case comparison at strength 1 or 2.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_level: Option<bool>,
    /// `"upper"`, `"lower"` or `"off"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_first: Option<String>,
    /// Compare numeric strings as numbers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric_ordering: Option<bool>,
    /// `"non-ignorable"` or `"shifted"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternate: Option<String>,
    /// `"punct"` or `"space"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_variable: Option<String>,
    /// Sort diacritics from the back of the string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backwards: Option<bool>,
}

impl Collation {
    /// Create a collation for a locale.
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            ..Default::default()
        }
    }

    /// Set the comparison strength.
    pub fn strength(mut self, strength: i32) -> Self {
        self.strength = Some(strength);
        self
    }

    /// Compare numeric substrings by value.
    pub fn numeric_ordering(mut self, enabled: bool) -> Self {
        self.numeric_ordering = Some(enabled);
        self
    }

    /// Include case in comparisons at lower strengths.
    pub fn case_level(mut self, enabled: bool) -> Self {
        self.case_level = Some(enabled);
        self
    }
}

/// Which version of a document a find-and-modify returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReturnDocument {
    /// The document as it was before the modification.
    #[default]
    Before,
    /// The document as it is after the modification.
    After,
}

/// Options for `find` and `find_one`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub sort: Option<Document>,
    pub hint: Option<Document>,
    pub skip: Option<u64>,
    pub limit: Option<i64>,
    pub batch_size: Option<u32>,
    pub projection: Option<Document>,
    pub allow_disk_use: Option<bool>,
    pub allow_partial_results: Option<bool>,
    pub comment: Option<String>,
    pub collation: Option<Collation>,
    pub max_time: Option<Duration>,
}

/// Options for `count_documents`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountOptions {
    pub hint: Option<Document>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
    pub collation: Option<Collation>,
    pub max_time: Option<Duration>,
}

/// Options for the native `distinct` command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DistinctOptions {
    pub collation: Option<Collation>,
    pub max_time: Option<Duration>,
}

/// Options for `aggregate`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateOptions {
    pub allow_disk_use: Option<bool>,
    pub batch_size: Option<u32>,
    pub bypass_document_validation: Option<bool>,
    pub collation: Option<Collation>,
    pub comment: Option<String>,
    pub hint: Option<Document>,
    pub max_time: Option<Duration>,
}

/// Options for `insert_one` and `insert_many`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertOptions {
    pub bypass_document_validation: Option<bool>,
    pub ordered: Option<bool>,
    pub comment: Option<String>,
}

/// Options for `update_one` and `update_many`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOptions {
    pub upsert: Option<bool>,
    pub array_filters: Option<Vec<Document>>,
    pub bypass_document_validation: Option<bool>,
    pub collation: Option<Collation>,
    pub hint: Option<Document>,
    pub comment: Option<String>,
}

/// Options for `replace_one`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplaceOptions {
    pub upsert: Option<bool>,
    pub bypass_document_validation: Option<bool>,
    pub collation: Option<Collation>,
    pub hint: Option<Document>,
    pub comment: Option<String>,
}

/// Options for `delete_one` and `delete_many`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteOptions {
    pub collation: Option<Collation>,
    pub hint: Option<Document>,
    pub comment: Option<String>,
}

/// Options shared by the three find-and-modify calls.
///
/// `find_one_and_delete` ignores the update-only fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindAndModifyOptions {
    pub sort: Option<Document>,
    pub hint: Option<Document>,
    pub projection: Option<Document>,
    pub upsert: Option<bool>,
    pub array_filters: Option<Vec<Document>>,
    pub bypass_document_validation: Option<bool>,
    pub return_document: Option<ReturnDocument>,
    pub collation: Option<Collation>,
    pub comment: Option<String>,
    pub max_time: Option<Duration>,
}

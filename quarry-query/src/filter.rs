//! Filter document construction.

use bson::{Bson, Document, doc};

/// Builder for filter documents.
///
/// Operator conditions on the same field are merged, so a range reads the
/// way it is written.
///
/// # Example
///
/// ```rust
/// use bson::doc;
/// use quarry_query::FilterBuilder;
///
/// let filter = FilterBuilder::new()
///     .eq("captured", false)
///     .gte("year", 1940)
///     .lt("year", 1950)
///     .build();
///
/// assert_eq!(filter, doc! { "captured": false, "year": { "$gte": 1940, "$lt": 1950 } });
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterBuilder {
    doc: Document,
}

impl FilterBuilder {
    /// Create an empty filter, matching everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing document.
    pub fn from_doc(doc: Document) -> Self {
        Self { doc }
    }

    fn condition(mut self, field: &str, operator: &str, value: Bson) -> Self {
        if let Some(Bson::Document(existing)) = self.doc.get_mut(field) {
            if existing.keys().all(|key| key.starts_with('$')) {
                existing.insert(operator, value);
                return self;
            }
        }
        let mut condition = Document::new();
        condition.insert(operator, value);
        self.doc.insert(field, condition);
        self
    }

    /// Field equals value.
    pub fn eq(mut self, field: &str, value: impl Into<Bson>) -> Self {
        self.doc.insert(field, value.into());
        self
    }

    /// Field differs from value.
    pub fn ne(self, field: &str, value: impl Into<Bson>) -> Self {
        self.condition(field, "$ne", value.into())
    }

    /// Field greater than value.
    pub fn gt(self, field: &str, value: impl Into<Bson>) -> Self {
        self.condition(field, "$gt", value.into())
    }

    /// Field greater than or equal to value.
    pub fn gte(self, field: &str, value: impl Into<Bson>) -> Self {
        self.condition(field, "$gte", value.into())
    }

    /// Field less than value.
    pub fn lt(self, field: &str, value: impl Into<Bson>) -> Self {
        self.condition(field, "$lt", value.into())
    }

    /// Field less than or equal to value.
    pub fn lte(self, field: &str, value: impl Into<Bson>) -> Self {
        self.condition(field, "$lte", value.into())
    }

    /// Field is one of the values.
    pub fn in_array<I, V>(self, field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        let values: Vec<Bson> = values.into_iter().map(Into::into).collect();
        self.condition(field, "$in", values.into())
    }

    /// Field is none of the values.
    pub fn not_in<I, V>(self, field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        let values: Vec<Bson> = values.into_iter().map(Into::into).collect();
        self.condition(field, "$nin", values.into())
    }

    /// Field is present (or absent).
    pub fn exists(self, field: &str, exists: bool) -> Self {
        self.condition(field, "$exists", exists.into())
    }

    /// Field matches a regular expression.
    pub fn regex(self, field: &str, pattern: &str) -> Self {
        self.condition(field, "$regex", pattern.into())
    }

    /// Array field has exactly `size` elements.
    pub fn size(self, field: &str, size: i32) -> Self {
        self.condition(field, "$size", size.into())
    }

    /// Array field contains every value.
    pub fn all<I, V>(self, field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        let values: Vec<Bson> = values.into_iter().map(Into::into).collect();
        self.condition(field, "$all", values.into())
    }

    /// Some array element matches `query`.
    pub fn elem_match(self, field: &str, query: Document) -> Self {
        self.condition(field, "$elemMatch", query.into())
    }

    /// Negate an operator condition on a field.
    pub fn not(self, field: &str, condition: Document) -> Self {
        self.condition(field, "$not", condition.into())
    }

    /// Match `_id`.
    pub fn by_id(mut self, id: impl Into<Bson>) -> Self {
        self.doc.insert("_id", id.into());
        self
    }

    /// Every condition holds.
    pub fn and<I>(mut self, conditions: I) -> Self
    where
        I: IntoIterator<Item = Document>,
    {
        self.doc
            .insert("$and", conditions.into_iter().collect::<Vec<_>>());
        self
    }

    /// At least one condition holds.
    pub fn or<I>(mut self, conditions: I) -> Self
    where
        I: IntoIterator<Item = Document>,
    {
        self.doc
            .insert("$or", conditions.into_iter().collect::<Vec<_>>());
        self
    }

    /// No condition holds.
    pub fn nor<I>(mut self, conditions: I) -> Self
    where
        I: IntoIterator<Item = Document>,
    {
        self.doc
            .insert("$nor", conditions.into_iter().collect::<Vec<_>>());
        self
    }

    /// Copy every top-level entry of `other` into this filter.
    pub fn merge(mut self, other: Document) -> Self {
        for (key, value) in other {
            self.doc.insert(key, value);
        }
        self
    }

    /// Whether the filter is empty.
    pub fn is_empty(&self) -> bool {
        self.doc.is_empty()
    }

    /// Build the filter document.
    pub fn build(self) -> Document {
        self.doc
    }
}

impl From<FilterBuilder> for Document {
    fn from(builder: FilterBuilder) -> Self {
        builder.doc
    }
}

/// A filter matching every document.
pub fn all() -> Document {
    doc! {}
}

/// A filter matching one `_id`.
pub fn by_id(id: impl Into<Bson>) -> Document {
    doc! { "_id": id.into() }
}

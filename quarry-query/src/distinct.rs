//! Distinct values of a field across the matches of a find.
//!
//! Without sort, skip or limit the store's native `distinct` is used. When
//! any of them is set the values are collected by a pipeline instead:
//!
//! ```text
//! $match(filter) -> $sort? -> $skip? -> $limit? -> $group(_id: null, $addToSet)
//! ```
//!
//! Sort, skip and limit there pick which documents contribute; grouping
//! does not keep any order. When the find is sorted on the distinct field
//! itself the values are sorted again client side, since grouped output
//! comes back in no particular order.

use std::cmp::Ordering;

use bson::{Bson, Document, doc};

use crate::coerce::{compare_bson, sort_dedup};
use crate::error::{QueryError, QueryResult};
use crate::operations::{AggregateOperation, FindOperation};
use crate::options::DistinctOptions;

const DISTINCT_VALUES: &str = "distinctValues";

impl<'a> FindOperation<'a> {
    fn build_distinct_options(&self) -> DistinctOptions {
        DistinctOptions {
            collation: self.query.collation().cloned(),
            max_time: self.query.timeout(),
        }
    }

    /// The aggregation used when sort, skip or limit must be honored.
    pub fn distinct_pipeline(&self, field: &str) -> Vec<Document> {
        let mut pipeline = vec![doc! { "$match": self.query.filter().clone() }];
        if let Some(sort) = self.query.sort() {
            pipeline.push(doc! { "$sort": sort.clone() });
        }
        let skip = self.skip_value();
        if skip > 0 {
            pipeline.push(doc! { "$skip": i64::try_from(skip).unwrap_or(i64::MAX) });
        }
        let limit = self.limit_value();
        if limit > 0 {
            pipeline.push(doc! { "$limit": limit });
        }
        pipeline.push(doc! {
            "$group": {
                "_id": Bson::Null,
                "distinctValues": { "$addToSet": format!("${field}") },
            }
        });
        pipeline
    }

    async fn native_distinct(&self, field: &str) -> QueryResult<Vec<Bson>> {
        self.query
            .execute(
                "distinct",
                self.query.store().distinct(
                    self.query.collection_name(),
                    field,
                    self.query.filter().clone(),
                    self.build_distinct_options(),
                ),
            )
            .await
    }

    async fn grouped_distinct(&self, field: &str) -> QueryResult<Vec<Bson>> {
        let aggregate = AggregateOperation::new(self.query.clone(), self.distinct_pipeline(field));
        let grouped = match aggregate.one::<Document>().await {
            Ok(grouped) => grouped,
            Err(QueryError::NoDocuments) => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        match grouped.get(DISTINCT_VALUES) {
            Some(Bson::Array(values)) => Ok(values.clone()),
            Some(other) => Err(QueryError::wrong_type("array", other)),
            None => Ok(Vec::new()),
        }
    }

    fn descending_on(&self, field: &str) -> bool {
        self.query.sort_direction(field).is_some_and(|direction| direction < 0)
    }

    /// Distinct values of `field` among the matches.
    ///
    /// When the find is sorted on `field` the values come back in that order;
    /// otherwise their order is unspecified.
    pub async fn distinct(&self, field: &str) -> QueryResult<Vec<Bson>> {
        let windowed =
            self.query.sort().is_some() || self.skip_value() > 0 || self.limit_value() > 0;
        if !windowed {
            return self.native_distinct(field).await;
        }

        let mut values = self.grouped_distinct(field).await?;
        if let Some(direction) = self.query.sort_direction(field) {
            values.sort_by(compare_bson);
            if direction < 0 {
                values.reverse();
            }
        }
        Ok(values)
    }

    /// Distinct integer values, ascending unless sorted descending on `field`.
    ///
    /// 32 and 64 bit integers are both accepted and compared as `i64`; any
    /// other type fails with [`QueryError::WrongType`].
    pub async fn distinct_ints(&self, field: &str) -> QueryResult<Vec<i64>> {
        let values = self.distinct(field).await?;
        let mut ints = values
            .iter()
            .map(|value| match value {
                Bson::Int32(n) => Ok(i64::from(*n)),
                Bson::Int64(n) => Ok(*n),
                other => Err(QueryError::wrong_type("int32 or int64", other)),
            })
            .collect::<QueryResult<Vec<_>>>()?;
        ints.sort_unstable();
        ints.dedup();
        if self.descending_on(field) {
            ints.reverse();
        }
        Ok(ints)
    }

    /// Distinct floating point values, ascending unless sorted descending on `field`.
    ///
    /// Only doubles are accepted; integers fail with [`QueryError::WrongType`].
    pub async fn distinct_f64s(&self, field: &str) -> QueryResult<Vec<f64>> {
        let values = self.distinct(field).await?;
        let mut floats = values
            .iter()
            .map(|value| match value {
                Bson::Double(n) => Ok(*n),
                other => Err(QueryError::wrong_type("double", other)),
            })
            .collect::<QueryResult<Vec<_>>>()?;
        floats.sort_by(f64::total_cmp);
        floats.dedup_by(|a, b| a.total_cmp(b) == Ordering::Equal);
        if self.descending_on(field) {
            floats.reverse();
        }
        Ok(floats)
    }

    /// Distinct string values.
    ///
    /// Uses the native distinct and applies sort, skip and limit to the
    /// values themselves, client side.
    pub async fn distinct_strings(&self, field: &str) -> QueryResult<Vec<String>> {
        let mut values = self.native_distinct(field).await?;
        sort_dedup(&mut values);
        let mut strings = values
            .into_iter()
            .map(|value| match value {
                Bson::String(s) => Ok(s),
                other => Err(QueryError::wrong_type("string", &other)),
            })
            .collect::<QueryResult<Vec<_>>>()?;

        if let Some(direction) = self.query.sort_direction(field) {
            strings.sort();
            if direction < 0 {
                strings.reverse();
            }
        }

        let skip = usize::try_from(self.skip_value()).unwrap_or(usize::MAX);
        let limit = match usize::try_from(self.limit_value()) {
            Ok(0) | Err(_) => usize::MAX,
            Ok(limit) => limit,
        };
        Ok(strings.into_iter().skip(skip).take(limit).collect())
    }
}

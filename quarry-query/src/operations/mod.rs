//! Operation builders for the fluent API.
//!
//! Each verb gets its own builder, created from a [`Collection`](crate::Collection):
//! - `FindOperation` - Read documents, count them, or collect distinct values
//! - `FindAndModifyOperation` - Atomically update, replace or delete one document
//! - `InsertOperation` - Insert one or many documents
//! - `UpdateOperation` - Apply update operators to matching documents
//! - `DeleteOperation` - Delete matching documents
//! - `ReplaceOperation` - Replace a whole document
//! - `AggregateOperation` - Run an aggregation pipeline

mod aggregate;
mod delete;
mod find;
mod find_and;
mod insert;
mod replace;
mod update;

pub use aggregate::AggregateOperation;
pub use delete::DeleteOperation;
pub use find::FindOperation;
pub use find_and::FindAndModifyOperation;
pub use insert::InsertOperation;
pub use replace::ReplaceOperation;
pub use update::{UpdateCounts, UpdateOperation};

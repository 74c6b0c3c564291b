//! Module: model
//! Responsibility: in-memory bucket tree consumed and produced by pipeline stages.
//! Does not own: base metric computation or wire serialization of responses.
//! Boundary: the parent aggregation owns buckets; pipeline stages read and
//! augment them, never delete or reorder them.

mod bucket;
mod result;


pub use bucket::{Aggregations, Bucket, BucketKey, LookupError};
pub use result::{AggregationResult, MultiBucket, ResultKind, SingleValue};

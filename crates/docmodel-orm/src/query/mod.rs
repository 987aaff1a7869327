//! Query building types for the ORM.
//!
//! This module provides the aggregation pipeline stages a
//! [`QuerySet`](crate::QuerySet) accumulates.

mod operations;

pub use operations::{Filter, Group, Lookup, Operation, ACCUMULATORS};

//! Analysis modules.
//!
//! The aggregator fans one request out to every provider; comparison and
//! synthesis work on the collected results.

pub mod aggregator;
pub mod comparison;
pub mod synthesis;

#[cfg(test)]
pub(crate) mod testing;

pub use aggregator::{analyze, AnalyzeError, Aggregator, AggregatorOptions, RetryPolicy};
pub use comparison::compare;

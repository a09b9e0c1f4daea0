//! Paged, concurrent bulk relabeling of tagged records.
//!
//! A full scan of a [`store::RecordStore`] is split into fixed-size pages by
//! [`scan::PagedScanner`]. Each page is relabeled in its own transaction by
//! [`mutate::PageMutator`]: the first tag `T` of every record is replaced by `T_{username}`.
//! Pages are spread over workers by one of two pipelines, entered through
//! [`procedures::run_loop`] and [`procedures::run_loop_improved`].

pub mod concurrency;
pub mod error;
#[cfg(feature = "failpoints")]
pub mod failpoints;
mod macros;
pub mod mutate;
pub mod pipeline;
pub mod procedures;
pub mod scan;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;

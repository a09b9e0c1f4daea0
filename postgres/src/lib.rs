//! Postgres plumbing for the relabeling record store.

pub mod db;
pub mod records;
#[cfg(feature = "test-utils")]
pub mod test_utils;

/// Schema holding the records table and the migrations bookkeeping table.
pub const RELABEL_SCHEMA: &str = "relabel";

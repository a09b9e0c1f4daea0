//! Helpers for testing relabeling runs.
//!
//! - [`seed`] fills stores with the `Person` records used across tests.
//! - [`fault`] wraps a store to inject errors and panics into scans and transactions.
//! - [`database`] creates throwaway Postgres databases holding the records table.
//! - [`failpoints`] configures failpoints for the duration of a test.

pub mod database;
pub mod fault;
#[cfg(feature = "failpoints")]
pub mod failpoints;
pub mod seed;

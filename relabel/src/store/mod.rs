//! Record stores the pipelines scan and mutate.

pub mod base;
pub mod memory;
pub mod postgres;

pub use base::{RecordCursor, RecordStore, StoreTransaction};

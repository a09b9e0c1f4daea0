//! Data types flowing through the relabeling pipelines.

mod page;
mod record;

pub use page::*;
pub use record::*;

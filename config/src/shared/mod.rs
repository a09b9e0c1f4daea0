mod base;
mod connection;
mod page;
mod pipeline;
mod relabeler;
mod store;

pub use base::*;
pub use connection::*;
pub use page::*;
pub use pipeline::*;
pub use relabeler::*;
pub use store::*;

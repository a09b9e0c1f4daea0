//! Coordination primitives shared by the pipelines.

pub mod shutdown;

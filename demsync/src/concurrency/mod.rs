//! Coordination primitives shared by the listener, scheduler and pipeline.

pub mod locks;
pub mod shutdown;

//! Individual tool implementations.

pub mod remote;
pub mod weather;

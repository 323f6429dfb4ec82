//! Queue module - Admission control and serialized access to the engine

pub mod executor;

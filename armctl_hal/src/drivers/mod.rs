//! Robot model implementations.

pub mod simulation;

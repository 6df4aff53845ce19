//! Motion module root.
//!
//! Turns the active motion into one joint command per tick.

pub mod differential;
pub mod resolver;
pub mod trajectory;

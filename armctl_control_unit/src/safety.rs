//! Safety module root.
//!
//! Safety state machine, joint limit clamping and flag evaluation.

pub mod limits;
pub mod state;

//! Safety state machine.
//!
//! READY ⇄ MOVING, PAUSED on Stop, and three fault states left only through
//! a successful Recover:
//!
//! ```text
//!            MotionAdmitted             Stop
//!   READY ─────────────────► MOVING ──────────► PAUSED
//!     ▲  ◄─────────────────    │                  │
//!     │       MotionEnded      │ Fault            │ MotionAdmitted → MOVING
//!     │                        ▼
//!     └──── Recovered ─── COLLISION | LIMIT_VIOLATION | ERROR
//! ```

use armctl_common::error::FaultFlags;
use armctl_common::state::SafetyState;

/// Result of a safety state transition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafetyTransition {
    /// Transition succeeded: new state.
    Ok(SafetyState),
    /// Transition rejected: reason.
    Rejected(&'static str),
}

/// Events driving the safety state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyEvent {
    /// A motion request was admitted.
    MotionAdmitted,
    /// The active motion ended (done, failed, cancelled or watchdog).
    MotionEnded,
    /// Stop request.
    Stop,
    /// Robot reported a fault.
    Fault(FaultFlags),
    /// Recover admitted after the fault cleared.
    Recovered,
}

#[derive(Debug, Clone, Default)]
pub struct SafetyStateMachine {
    state: SafetyState,
}

impl SafetyStateMachine {
    pub const fn new() -> Self {
        Self {
            state: SafetyState::Ready,
        }
    }

    #[inline]
    pub const fn state(&self) -> SafetyState {
        self.state
    }

    #[inline]
    pub const fn allows_motion(&self) -> bool {
        !self.state.is_fault()
    }

    pub fn handle_event(&mut self, event: SafetyEvent) -> SafetyTransition {
        use SafetyEvent::*;
        use SafetyState::*;

        let next = match (self.state, event) {
            // First fault wins; later faults do not change the fault state.
            (s, Fault(_)) if s.is_fault() => {
                return SafetyTransition::Rejected("already in a fault state");
            }
            (_, Fault(flags)) => match flags.fault_state() {
                Some(fault) => fault,
                None => return SafetyTransition::Rejected("empty fault set"),
            },

            (Ready | Moving | Paused, MotionAdmitted) => Moving,
            (Moving, MotionEnded) => Ready,
            (Ready | Moving | Paused, Stop) => Paused,
            (Collision | LimitViolation | Error, Recovered) => Ready,

            _ => return SafetyTransition::Rejected(invalid_transition_reason(self.state, event)),
        };

        self.state = next;
        SafetyTransition::Ok(next)
    }
}

fn invalid_transition_reason(state: SafetyState, event: SafetyEvent) -> &'static str {
    use SafetyEvent::*;
    use SafetyState::*;
    match (state, event) {
        (Collision | LimitViolation | Error, Stop) => "Stop does not leave a fault state",
        (Collision | LimitViolation | Error, _) => "fault state: only Recover allowed",
        (_, Recovered) => "not in a fault state",
        (_, MotionEnded) => "no motion to end",
        _ => "invalid event for current state",
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

//! Goal handles: cancellation, progress feedback and final result.
//!
//! A goal is a pair of endpoints created by [`goal_channel`]. The client
//! keeps the [`GoalHandle`]; the [`GoalLink`] travels with the request into
//! the control loop and lives inside the active motion until the goal ends.
//! Cancellation is cooperative: the handle raises a flag, the loop polls it
//! once per tick.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use armctl_common::command::GuardFlags;
use armctl_common::error::DriverError;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};

/// Feedback messages buffered per goal before new ones are dropped.
const FEEDBACK_QUEUE_DEPTH: usize = 16;

/// Why a goal ended without running to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// Another goal or streaming command replaced it.
    Preempted,
    /// The client cancelled it.
    Requested,
    /// A Stop request cleared it.
    Stopped,
}

/// Terminal state of a goal.
#[derive(Debug, Clone)]
pub enum GoalOutcome {
    Succeeded,
    Cancelled(CancelReason),
    Failed(DriverError),
}

/// Periodic progress report.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GoalFeedback {
    /// Time since the goal was admitted.
    pub elapsed: Duration,
    /// End-effector position error [m].
    pub position_error: f64,
    /// End-effector orientation error [rad].
    pub orientation_error: f64,
    /// Max absolute joint error [rad].
    pub joint_error: f64,
    /// Trajectory progress in `[0, 1]` (joint goals only).
    pub progress: f64,
    /// Servo goals: pose error below the arrival threshold.
    pub arrived: bool,
    /// Guarded velocity goals: guards that ended the move.
    pub triggered: GuardFlags,
}

/// Final result delivered exactly once per goal.
#[derive(Debug, Clone)]
pub struct GoalResult {
    pub outcome: GoalOutcome,
    pub position_error: f64,
    pub orientation_error: f64,
    pub joint_error: f64,
    pub elapsed: Duration,
    pub triggered: GuardFlags,
}

impl GoalResult {
    pub fn new(outcome: GoalOutcome, last: &GoalFeedback) -> Self {
        Self {
            outcome,
            position_error: last.position_error,
            orientation_error: last.orientation_error,
            joint_error: last.joint_error,
            elapsed: last.elapsed,
            triggered: last.triggered,
        }
    }

    #[inline]
    pub fn success(&self) -> bool {
        matches!(self.outcome, GoalOutcome::Succeeded)
    }

    pub fn is_preempted(&self) -> bool {
        matches!(self.outcome, GoalOutcome::Cancelled(CancelReason::Preempted))
    }
}

/// Create the two endpoints of a goal.
pub fn goal_channel(id: u64) -> (GoalHandle, GoalLink) {
    let cancel = Arc::new(AtomicBool::new(false));
    let (feedback_tx, feedback_rx) = crossbeam_channel::bounded(FEEDBACK_QUEUE_DEPTH);
    let stale = feedback_rx.clone();
    let (result_tx, result_rx) = crossbeam_channel::bounded(1);
    (
        GoalHandle {
            id,
            cancel: Arc::clone(&cancel),
            feedback: feedback_rx,
            result: result_rx,
        },
        GoalLink {
            id,
            cancel,
            feedback: feedback_tx,
            stale,
            result: result_tx,
        },
    )
}

// ─── Client side ────────────────────────────────────────────────────

/// Client endpoint of a running goal.
#[derive(Debug)]
pub struct GoalHandle {
    id: u64,
    cancel: Arc<AtomicBool>,
    feedback: Receiver<GoalFeedback>,
    result: Receiver<GoalResult>,
}

impl GoalHandle {
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Request cancellation. Takes effect on the next control tick.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    /// Most recent feedback, discarding older queued messages.
    pub fn latest_feedback(&self) -> Option<GoalFeedback> {
        self.feedback.try_iter().last()
    }

    /// Result if the goal has already ended.
    pub fn try_result(&self) -> Option<GoalResult> {
        match self.result.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Block until the goal ends.
    ///
    /// # Errors
    /// - `DriverError::Timeout` if no result arrives within `timeout`
    /// - `DriverError::Disconnected` if the control loop dropped the goal
    pub fn wait(&self, timeout: Duration) -> Result<GoalResult, DriverError> {
        self.result.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => DriverError::Timeout,
            RecvTimeoutError::Disconnected => DriverError::Disconnected,
        })
    }
}

// ─── Loop side ──────────────────────────────────────────────────────

/// Control-loop endpoint of a running goal.
#[derive(Debug)]
pub struct GoalLink {
    id: u64,
    cancel: Arc<AtomicBool>,
    feedback: Sender<GoalFeedback>,
    /// Second receiver used to evict the oldest message when full.
    stale: Receiver<GoalFeedback>,
    result: Sender<GoalResult>,
}

impl GoalLink {
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// Publish progress. When the client is not keeping up the oldest
    /// queued message is dropped.
    pub fn publish(&self, feedback: GoalFeedback) {
        if let Err(TrySendError::Full(feedback)) = self.feedback.try_send(feedback) {
            let _ = self.stale.try_recv();
            let _ = self.feedback.try_send(feedback);
        }
    }

    /// Deliver the final result, consuming the link.
    pub fn finish(self, result: GoalResult) {
        // The client may have dropped its handle; nothing to report to then.
        let _ = self.result.send(result);
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

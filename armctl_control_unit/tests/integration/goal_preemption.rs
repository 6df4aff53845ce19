//! Integration test: goal arbitration.
//!
//! Preemption, cancellation, Stop, deadlines and concurrent submission.

use std::thread;
use std::time::Duration;

use armctl_common::command::{Command, CommandKind, GoalOptions, Twist};
use armctl_common::error::DriverError;
use armctl_common::state::SafetyState;
use armctl_control_unit::command::goal::{CancelReason, GoalOutcome};

use super::{Rig, joints_of};

fn offset_goal(rig: &Rig, joint: usize, delta: f64) -> Command {
    let mut joints = joints_of(&rig.handle.latest_state());
    joints[joint] += delta;
    Command::JointPoseGoal {
        joints,
        options: GoalOptions::default(),
    }
}

#[test]
fn second_goal_preempts_first() {
    let mut rig = Rig::new();
    rig.tick();
    let cmd = offset_goal(&rig, 0, 1.0);
    let first = rig.goal(cmd).unwrap();
    rig.tick();

    let cmd = offset_goal(&rig, 1, 0.3);
    let second = rig.goal(cmd).unwrap();
    let result = first.try_result().unwrap();
    assert!(result.is_preempted());
    assert!(!result.success());
    assert_eq!(rig.control.safety_state(), SafetyState::Moving);

    let result = rig.finish(&second, 500);
    assert!(result.success(), "{:?}", result.outcome);
    assert_eq!(rig.tick().safety_state, SafetyState::Ready);
}

#[test]
fn goal_preempts_stream() {
    let mut rig = Rig::new();
    rig.handle.publish_twist(Twist::linear(0.05, 0.0, 0.0)).unwrap();
    rig.tick();
    assert_eq!(rig.control.active_kind(), Some(CommandKind::CartesianVelocity));

    let cmd = offset_goal(&rig, 2, 0.2);
    let goal = rig.goal(cmd).unwrap();
    assert_eq!(rig.control.active_kind(), Some(CommandKind::JointPoseGoal));
    assert!(rig.finish(&goal, 500).success());
}

#[test]
fn client_cancel_ends_goal() {
    let mut rig = Rig::new();
    rig.tick();
    let cmd = offset_goal(&rig, 0, 1.0);
    let goal = rig.goal(cmd).unwrap();
    rig.tick();
    goal.cancel();
    let snap = rig.tick();
    assert_eq!(snap.safety_state, SafetyState::Ready);
    assert!(snap.is_at_rest());
    assert!(matches!(
        goal.try_result().unwrap().outcome,
        GoalOutcome::Cancelled(CancelReason::Requested)
    ));
}

#[test]
fn stop_pauses_and_new_goal_resumes() {
    let mut rig = Rig::new();
    rig.tick();
    let cmd = offset_goal(&rig, 0, 1.0);
    let goal = rig.goal(cmd).unwrap();
    rig.tick();

    rig.submit(Command::Stop).unwrap();
    assert!(matches!(
        goal.try_result().unwrap().outcome,
        GoalOutcome::Cancelled(CancelReason::Stopped)
    ));
    let snap = rig.tick();
    assert_eq!(snap.safety_state, SafetyState::Paused);
    assert!(snap.is_at_rest());

    let cmd = offset_goal(&rig, 0, -0.2);
    let resumed = rig.goal(cmd).unwrap();
    assert_eq!(rig.control.safety_state(), SafetyState::Moving);
    assert!(rig.finish(&resumed, 500).success());
}

#[test]
fn goal_times_out_after_max_duration() {
    let mut rig = Rig::new();
    rig.tick();
    let mut joints = joints_of(&rig.handle.latest_state());
    joints[0] += 3.0;
    let goal = rig
        .goal(Command::JointPoseGoal {
            joints,
            options: GoalOptions::default().with_max_duration(Duration::from_millis(300)),
        })
        .unwrap();
    let result = rig.finish(&goal, 100);
    assert!(matches!(result.outcome, GoalOutcome::Failed(DriverError::Timeout)));
    assert!(result.elapsed >= Duration::from_millis(300));
    let snap = rig.tick();
    assert_eq!(snap.safety_state, SafetyState::Ready);
    assert!(snap.is_at_rest());
}

#[test]
fn goal_feedback_reports_progress() {
    let mut rig = Rig::new();
    rig.tick();
    let cmd = offset_goal(&rig, 0, 0.8);
    let goal = rig.goal(cmd).unwrap();
    for _ in 0..20 {
        rig.tick();
    }
    let feedback = goal.latest_feedback().unwrap();
    assert!(feedback.progress > 0.0 && feedback.progress < 1.0);
    assert!(feedback.joint_error > 0.0);

    let result = rig.finish(&goal, 500);
    assert!(result.success());
    assert!(result.joint_error < 1e-3);
}

#[test]
fn invalid_goal_leaves_active_motion() {
    let mut rig = Rig::new();
    rig.tick();
    let cmd = offset_goal(&rig, 0, 0.5);
    let goal = rig.goal(cmd).unwrap();

    let err = rig
        .goal(Command::JointPoseGoal {
            joints: vec![0.0; 4],
            options: GoalOptions::default(),
        })
        .unwrap_err();
    assert!(matches!(err, DriverError::Validation(_)));
    assert!(goal.try_result().is_none());
    assert_eq!(rig.control.active_kind(), Some(CommandKind::JointPoseGoal));
}

#[test]
fn oversized_durations_rejected_and_loop_keeps_running() {
    let mut rig = Rig::new();
    rig.tick();
    let cmd = offset_goal(&rig, 0, 0.5);
    let goal = rig.goal(cmd).unwrap();

    let mut joints = joints_of(&rig.handle.latest_state());
    joints[1] += 0.2;
    for options in [
        GoalOptions::default().with_duration(Duration::from_secs(u64::MAX)),
        GoalOptions::default().with_duration(Duration::from_secs(1_000_000)),
        GoalOptions::default().with_max_duration(Duration::from_secs(u64::MAX)),
    ] {
        let err = rig
            .goal(Command::JointPoseGoal {
                joints: joints.clone(),
                options,
            })
            .unwrap_err();
        assert!(matches!(err, DriverError::Validation(_)), "{err:?}");
        assert!(matches!(
            rig.goal(Command::Home { options }),
            Err(DriverError::Validation(_))
        ));
    }

    assert!(goal.try_result().is_none());
    assert_eq!(rig.control.active_kind(), Some(CommandKind::JointPoseGoal));
    let result = rig.finish(&goal, 500);
    assert!(result.success(), "{:?}", result.outcome);
}

#[test]
fn concurrent_goals_leave_exactly_one_active() {
    let mut rig = Rig::new();
    rig.tick();
    let base = joints_of(&rig.handle.latest_state());

    let workers: Vec<_> = (0..8)
        .map(|i| {
            let client = rig.handle.new_client();
            let mut joints = base.clone();
            joints[0] += 0.05 * (i + 1) as f64;
            thread::spawn(move || {
                client
                    .send_goal_async(Command::JointPoseGoal {
                        joints,
                        options: GoalOptions::default(),
                    })
                    .unwrap()
            })
        })
        .collect();
    let submitted: Vec<_> = workers.into_iter().map(|w| w.join().unwrap()).collect();

    rig.tick();
    let mut running = 0;
    for (pending, goal) in &submitted {
        assert!(pending.try_recv().unwrap().is_ok());
        match goal.try_result() {
            None => running += 1,
            Some(result) => assert!(result.is_preempted()),
        }
    }
    assert_eq!(running, 1);
    assert_eq!(rig.control.active_kind(), Some(CommandKind::JointPoseGoal));
}

#[test]
fn home_goal_reaches_configured_home() {
    let mut config = armctl_control_unit::config::ControlUnitConfig::default();
    config.robot.home[3] = -1.2;
    let home = config.robot.home.clone();
    let mut rig = Rig::with_config(config);
    let goal = rig
        .goal(Command::Home {
            options: GoalOptions::default(),
        })
        .unwrap();
    assert!(rig.finish(&goal, 500).success());
    let q = joints_of(&rig.tick());
    for (a, b) in q.iter().zip(&home) {
        assert!((a - b).abs() < 1e-3);
    }
}

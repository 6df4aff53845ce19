//! Integration test: guarded velocity and step goals.

use std::time::Duration;

use armctl_common::command::{Command, GoalOptions, GuardFlags, MotionGuards, Twist};
use armctl_common::error::DriverError;
use armctl_common::state::SafetyState;
use armctl_control_unit::command::goal::GoalOutcome;
use armctl_control_unit::config::{ControlUnitConfig, WorkspaceBounds};
use nalgebra::{Vector3, Vector6};

use super::Rig;

fn guarded(twist: Twist, guards: MotionGuards) -> Command {
    Command::GuardedVelocity {
        twist,
        guards,
        options: GoalOptions::default(),
    }
}

#[test]
fn duration_guard_stops_move() {
    let mut rig = Rig::new();
    let start = rig.tick().ee_pose.translation.vector;
    let goal = rig
        .goal(guarded(
            Twist::linear(0.05, 0.0, 0.0),
            MotionGuards::duration(Duration::from_millis(400)),
        ))
        .unwrap();
    assert_eq!(rig.tick().safety_state, SafetyState::Moving);

    let result = rig.finish(&goal, 100);
    assert!(result.success(), "{:?}", result.outcome);
    assert_eq!(result.triggered, GuardFlags::DURATION);
    assert!(result.elapsed >= Duration::from_millis(400));

    let snap = rig.tick();
    assert_eq!(snap.safety_state, SafetyState::Ready);
    assert!(snap.is_at_rest());
    let moved = snap.ee_pose.translation.vector - start;
    assert!((moved.x - 0.02).abs() < 2e-3, "moved {moved:?}");
    assert!(moved.y.abs() < 1e-3 && moved.z.abs() < 1e-3);
}

#[test]
fn effort_guard_stops_on_contact() {
    let mut rig = Rig::new();
    rig.tick();
    let goal = rig
        .goal(guarded(
            Twist::linear(0.0, 0.0, -0.03),
            MotionGuards::duration(Duration::from_secs(10))
                .with_effort(Vector6::new(10.0, 10.0, 10.0, 2.0, 2.0, 2.0)),
        ))
        .unwrap();
    for _ in 0..10 {
        assert_eq!(rig.tick().safety_state, SafetyState::Moving);
    }
    assert!(goal.try_result().is_none());

    rig.injector.set_wrench(Vector6::new(0.0, 0.0, 15.0, 0.0, 0.0, 0.0));
    let result = rig.finish(&goal, 5);
    assert!(result.success());
    assert_eq!(result.triggered, GuardFlags::EFFORT);
    assert_eq!(rig.tick().safety_state, SafetyState::Ready);
}

#[test]
fn guarded_move_cancelled_by_client() {
    let mut rig = Rig::new();
    rig.tick();
    let goal = rig
        .goal(guarded(
            Twist::linear(0.02, 0.0, 0.0),
            MotionGuards::duration(Duration::from_secs(5)),
        ))
        .unwrap();
    rig.tick();
    goal.cancel();
    rig.tick();
    let result = goal.try_result().unwrap();
    assert!(matches!(result.outcome, GoalOutcome::Cancelled(_)));
    assert!(result.triggered.is_empty());
}

#[test]
fn guarded_move_without_guard_rejected() {
    let mut rig = Rig::new();
    assert!(matches!(
        rig.goal(guarded(Twist::linear(0.02, 0.0, 0.0), MotionGuards::default())),
        Err(DriverError::Validation(_))
    ));
}

#[test]
fn step_moves_relative_to_current_pose() {
    let mut rig = Rig::new();
    let start = rig.tick().ee_pose;
    let offset = Vector3::new(0.03, 0.0, -0.02);
    let goal = rig
        .goal(Command::StepPoseGoal {
            offset,
            options: GoalOptions::default(),
        })
        .unwrap();
    let result = rig.finish(&goal, 500);
    assert!(result.success(), "{:?}", result.outcome);

    let end = rig.tick().ee_pose;
    let moved = end.translation.vector - start.translation.vector;
    assert!((moved - offset).norm() < 2e-3, "moved {moved:?}");
    assert!(end.rotation.angle_to(&start.rotation) < 1e-2);

    // A second step starts from where the first one ended.
    let goal = rig
        .goal(Command::StepPoseGoal {
            offset,
            options: GoalOptions::default(),
        })
        .unwrap();
    assert!(rig.finish(&goal, 500).success());
    let moved = rig.tick().ee_pose.translation.vector - start.translation.vector;
    assert!((moved - offset * 2.0).norm() < 4e-3, "moved {moved:?}");
}

#[test]
fn step_leaving_workspace_rejected() {
    let here = Rig::new().tick().ee_pose.translation.vector;
    let mut config = ControlUnitConfig::default();
    config.robot.workspace = Some(WorkspaceBounds {
        min: [here.x - 0.2, here.y - 0.2, here.z - 0.05],
        max: [here.x + 0.2, here.y + 0.2, here.z + 0.2],
    });
    let mut rig = Rig::with_config(config);
    rig.tick();
    assert!(matches!(
        rig.goal(Command::StepPoseGoal {
            offset: Vector3::new(0.0, 0.0, -0.1),
            options: GoalOptions::default(),
        }),
        Err(DriverError::Validation(_))
    ));
}

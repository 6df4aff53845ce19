//! Integration test: Cartesian pose and servo goals.

use std::time::Duration;

use armctl_common::command::{Command, GoalOptions, ServoOptions};
use armctl_common::error::{DriverError, SafetyFlags};
use armctl_common::state::SafetyState;
use armctl_control_unit::command::goal::GoalOutcome;
use armctl_control_unit::config::{ControlUnitConfig, WorkspaceBounds};
use nalgebra::{Isometry3, Vector3};

use super::Rig;

fn shifted(rig: &mut Rig, offset: Vector3<f64>) -> Isometry3<f64> {
    let pose = rig.tick().ee_pose;
    Isometry3::from_parts((pose.translation.vector + offset).into(), pose.rotation)
}

#[test]
fn cartesian_goal_reaches_pose() {
    let mut rig = Rig::new();
    let target = shifted(&mut rig, Vector3::new(0.05, 0.05, -0.05));
    let goal = rig
        .goal(Command::CartesianPoseGoal {
            target,
            options: GoalOptions::default(),
        })
        .unwrap();
    let result = rig.finish(&goal, 500);
    assert!(result.success(), "{:?}", result.outcome);
    assert!(result.position_error < 1e-3);
    assert!(result.orientation_error < 1e-2);

    let snap = rig.tick();
    assert_eq!(snap.safety_state, SafetyState::Ready);
    assert!((snap.ee_pose.translation.vector - target.translation.vector).norm() < 2e-3);
}

#[test]
fn unreachable_pose_fails_without_fault() {
    let mut rig = Rig::new();
    rig.tick();
    let goal = rig
        .goal(Command::CartesianPoseGoal {
            target: Isometry3::translation(0.0, 0.0, 3.0),
            options: GoalOptions::default(),
        })
        .unwrap();
    let result = rig.finish(&goal, 5);
    assert!(matches!(result.outcome, GoalOutcome::Failed(DriverError::Kinematic(_))));
    let snap = rig.tick();
    assert_eq!(snap.safety_state, SafetyState::Ready);
    assert!(!snap.flags.has_critical());
}

#[test]
fn pose_outside_workspace_rejected_at_admission() {
    let mut config = ControlUnitConfig::default();
    config.robot.workspace = Some(WorkspaceBounds {
        min: [-1.0, -1.0, -0.2],
        max: [1.0, 1.0, 1.0],
    });
    let mut rig = Rig::with_config(config);
    assert!(matches!(
        rig.goal(Command::CartesianPoseGoal {
            target: Isometry3::translation(0.3, 0.3, -0.5),
            options: GoalOptions::default(),
        }),
        Err(DriverError::Validation(_))
    ));
}

#[test]
fn servo_tracks_target_until_cancelled() {
    let mut rig = Rig::new();
    let target = shifted(&mut rig, Vector3::new(0.0, 0.03, 0.0));
    let goal = rig
        .goal(Command::ServoPoseGoal {
            target,
            servo: ServoOptions {
                gain: Some(4.0),
                threshold: Some(0.002),
            },
            options: GoalOptions::default(),
        })
        .unwrap();

    for _ in 0..300 {
        assert_eq!(rig.tick().safety_state, SafetyState::Moving);
    }
    assert!(goal.try_result().is_none());
    assert!(goal.latest_feedback().unwrap().arrived);

    goal.cancel();
    rig.tick();
    assert!(matches!(goal.try_result().unwrap().outcome, GoalOutcome::Cancelled(_)));
}

#[test]
fn servo_holds_off_obstacle() {
    let mut rig = Rig::new();
    let start = rig.tick().ee_pose.translation.vector;
    let target = shifted(&mut rig, Vector3::new(0.1, 0.0, 0.0));
    rig.injector.set_obstacle(0.04, Vector3::x());

    let _goal = rig
        .goal(Command::ServoPoseGoal {
            target,
            servo: ServoOptions {
                gain: Some(2.0),
                threshold: None,
            },
            options: GoalOptions::default(),
        })
        .unwrap();
    let mut snap = rig.tick();
    for _ in 0..50 {
        snap = rig.tick();
    }
    assert!(snap.flags.contains(SafetyFlags::OBSTACLE_NEAR));
    assert!(snap.ee_pose.translation.x - start.x < 2e-3);

    rig.injector.clear_obstacle();
    for _ in 0..50 {
        snap = rig.tick();
    }
    assert!(!snap.flags.contains(SafetyFlags::OBSTACLE_NEAR));
    assert!(snap.ee_pose.translation.x - start.x > 0.02);
}

#[test]
fn servo_fails_when_robot_reports_unreachable() {
    let mut rig = Rig::new();
    let target = shifted(&mut rig, Vector3::new(0.0, 0.0, 0.02));
    let goal = rig
        .goal(Command::ServoPoseGoal {
            target,
            servo: ServoOptions::default(),
            options: GoalOptions::default(),
        })
        .unwrap();
    rig.tick();
    rig.injector.set_unreachable(true);
    let result = rig.finish(&goal, 5);
    assert!(matches!(result.outcome, GoalOutcome::Failed(DriverError::Kinematic(_))));
    assert_eq!(rig.tick().safety_state, SafetyState::Ready);
}

#[test]
fn servo_times_out_at_max_duration() {
    let mut rig = Rig::new();
    let target = shifted(&mut rig, Vector3::new(0.0, 0.0, 0.01));
    let goal = rig
        .goal(Command::ServoPoseGoal {
            target,
            servo: ServoOptions::default(),
            options: GoalOptions::default().with_max_duration(Duration::from_millis(200)),
        })
        .unwrap();
    let result = rig.finish(&goal, 50);
    assert!(matches!(result.outcome, GoalOutcome::Failed(DriverError::Timeout)));
}

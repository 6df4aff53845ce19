//! Integration test: named poses.
//!
//! Config files loaded at startup and at runtime, named-pose goals and the
//! joint limits their trajectories must respect.

use std::fs;
use std::path::PathBuf;

use armctl_common::command::{Command, GoalOptions};
use armctl_common::error::DriverError;
use armctl_common::state::SafetyState;
use armctl_control_unit::config::{ControlUnitConfig, TrajectoryProfile};
use tempfile::TempDir;

use super::{Rig, joints_of};

const READY: [f64; 6] = [0.4, -1.2, 1.2, -1.6, -1.4, 0.3];

fn pose_file(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, body).unwrap();
    path
}

fn ready_file(dir: &TempDir) -> PathBuf {
    pose_file(
        dir,
        "poses.toml",
        &format!(
            "[named_poses]\nready = {:?}\nside = [1.0, -1.5708, 1.5708, -1.5708, -1.5708, 0.0]\n",
            READY
        ),
    )
}

fn rig_with_poses(dir: &TempDir, profile: TrajectoryProfile) -> Rig {
    let mut config = ControlUnitConfig::default();
    config.robot.named_pose_configs = vec![ready_file(dir)];
    config.resolver.profile = profile;
    Rig::with_config(config)
}

fn move_to_ready_within_limits(profile: TrajectoryProfile) {
    let dir = TempDir::new().unwrap();
    let mut rig = rig_with_poses(&dir, profile);
    let limits = rig.control.robot().joint_limits().clone();
    let dt = rig.control.period().as_secs_f64();

    let goal = rig
        .goal(Command::NamedPoseGoal {
            name: "ready".to_string(),
            options: GoalOptions::default(),
        })
        .unwrap();

    let mut previous = rig.handle.latest_state().joint_velocities;
    let mut result = None;
    for _ in 0..1000 {
        let snap = rig.tick();
        let v = &snap.joint_velocities;
        for i in 0..6 {
            assert!(v[i].abs() <= limits.velocity_max[i] + 1e-9, "joint {i} velocity {}", v[i]);
            let accel = (v[i] - previous[i]).abs() / dt;
            assert!(
                accel <= limits.acceleration_max[i] * 1.01 + 1e-6,
                "joint {i} acceleration {accel}"
            );
        }
        previous = v.clone();
        if let Some(r) = goal.try_result() {
            result = Some(r);
            break;
        }
    }

    let result = result.unwrap();
    assert!(result.success(), "{:?}", result.outcome);
    assert!(result.joint_error < 1e-3);
    let q = joints_of(&rig.tick());
    for (a, b) in q.iter().zip(READY.iter()) {
        assert!((a - b).abs() < 1e-3);
    }
    assert_eq!(rig.tick().safety_state, SafetyState::Ready);
}

#[test]
fn trapezoidal_move_to_named_pose_respects_limits() {
    move_to_ready_within_limits(TrajectoryProfile::Trapezoidal);
}

#[test]
fn minimum_jerk_move_to_named_pose_respects_limits() {
    move_to_ready_within_limits(TrajectoryProfile::MinimumJerk);
}

#[test]
fn unknown_name_is_not_found() {
    let dir = TempDir::new().unwrap();
    let mut rig = rig_with_poses(&dir, TrajectoryProfile::Trapezoidal);
    assert!(matches!(
        rig.goal(Command::NamedPoseGoal {
            name: "READY".to_string(),
            options: GoalOptions::default(),
        }),
        Err(DriverError::NotFound(_))
    ));
    assert_eq!(rig.tick().safety_state, SafetyState::Ready);
}

#[test]
fn startup_configs_are_listed() {
    let dir = TempDir::new().unwrap();
    let rig = rig_with_poses(&dir, TrajectoryProfile::Trapezoidal);
    let poses = rig.handle.named_poses();
    assert_eq!(poses.len(), 2);
    assert_eq!(poses["ready"].joints, READY.to_vec());
    assert_eq!(rig.handle.named_pose_configs(), vec![ready_file(&dir)]);
}

#[test]
fn add_existing_name_needs_overwrite() {
    let dir = TempDir::new().unwrap();
    let rig = rig_with_poses(&dir, TrajectoryProfile::Trapezoidal);
    assert!(matches!(
        rig.handle.add_named_pose("ready", Some(vec![0.0; 6]), false),
        Err(DriverError::NameExists(_))
    ));
    rig.handle
        .add_named_pose("ready", Some(vec![0.0; 6]), true)
        .unwrap();
    assert_eq!(rig.handle.named_pose("ready").unwrap().joints, vec![0.0; 6]);
}

#[test]
fn runtime_config_add_and_remove() {
    let dir = TempDir::new().unwrap();
    let rig = rig_with_poses(&dir, TrajectoryProfile::Trapezoidal);
    let extra = pose_file(&dir, "extra.toml", "[named_poses]\nstowed = [0.0, -3.0, 2.6, -1.2, -1.5708, 0.0]\n");

    assert_eq!(rig.handle.add_named_pose_config(&extra).unwrap(), 1);
    assert!(rig.handle.named_pose_configs().contains(&extra));
    assert!(matches!(
        rig.handle.add_named_pose_config(&extra),
        Err(DriverError::ConfigAlreadyLoaded(_))
    ));

    assert_eq!(rig.handle.remove_named_pose_config(&extra).unwrap(), 1);
    assert!(!rig.handle.named_pose_configs().contains(&extra));
    assert!(
        rig.handle
            .named_poses()
            .values()
            .all(|p| p.source.as_ref() != Some(&extra))
    );
}

#[test]
fn duplicate_name_across_configs_rejected_atomically() {
    let dir = TempDir::new().unwrap();
    let rig = rig_with_poses(&dir, TrajectoryProfile::Trapezoidal);
    let clash = pose_file(
        &dir,
        "clash.toml",
        "[named_poses]\nfresh = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0]\nside = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0]\n",
    );
    assert!(matches!(
        rig.handle.add_named_pose_config(&clash),
        Err(DriverError::DuplicateName(name)) if name == "side"
    ));
    assert!(rig.handle.named_pose("fresh").is_none());
}

#[test]
fn running_goal_unaffected_by_pose_removal() {
    let dir = TempDir::new().unwrap();
    let mut rig = rig_with_poses(&dir, TrajectoryProfile::Trapezoidal);
    let goal = rig
        .goal(Command::NamedPoseGoal {
            name: "side".to_string(),
            options: GoalOptions::default(),
        })
        .unwrap();
    rig.handle.remove_named_pose("side").unwrap();
    let result = rig.finish(&goal, 500);
    assert!(result.success());
    assert!((joints_of(&rig.tick())[0] - 1.0).abs() < 1e-3);
}

#[test]
fn missing_startup_config_fails_construction() {
    let mut config = ControlUnitConfig::default();
    config.robot.named_pose_configs = vec![PathBuf::from("/nonexistent/poses.toml")];
    let arm = armctl_hal::drivers::simulation::SimulatedArm::new(&config.simulation).unwrap();
    assert!(matches!(
        armctl_control_unit::cycle::ControlLoop::new(config, Box::new(arm)),
        Err(DriverError::Config(_))
    ));
}

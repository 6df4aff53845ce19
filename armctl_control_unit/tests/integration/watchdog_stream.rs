//! Integration test: streaming input and the watchdog.
//!
//! 1. Twist stream → MOVING with non-zero joint velocities
//! 2. Stream stops → READY and zero command one tick after the timeout
//! 3. Goals are not watched

use std::time::Duration;

use armctl_common::command::{Command, GoalOptions, Twist};
use armctl_common::error::{DriverError, SafetyFlags};
use armctl_common::state::SafetyState;

use super::Rig;

#[test]
fn twist_stream_moves_then_watchdog_stops() {
    let mut rig = Rig::new();
    let twist = Twist::linear(0.1, 0.0, 0.0);
    let start_x = rig.tick().ee_pose.translation.x;

    // Publish every 20 ms for 50 ms at a 10 ms tick.
    let mut last_publish = rig.elapsed;
    let mut snap = None;
    for i in 0..5 {
        if i % 2 == 0 {
            rig.handle.publish_twist(twist).unwrap();
            last_publish = rig.elapsed;
        }
        snap = Some(rig.tick());
    }
    let snap = snap.unwrap();
    assert_eq!(snap.safety_state, SafetyState::Moving);
    assert!(!snap.is_at_rest());
    assert!(snap.ee_pose.translation.x > start_x);
    assert!(snap.ee_velocity[0] > 0.05, "{:?}", snap.ee_velocity);

    let timeout = Duration::from_millis(200);
    let stopped = rig
        .tick_until(100, |s| s.safety_state == SafetyState::Ready)
        .unwrap();
    let stopped_at = rig.elapsed - rig.control.period();
    assert!(stopped_at > last_publish + timeout);
    assert!(stopped_at <= last_publish + timeout + rig.control.period());
    assert!(stopped.is_at_rest());
    assert!(rig.control.last_command().is_zero());
    assert!(stopped.flags.contains(SafetyFlags::WATCHDOG_EXPIRED));
    assert!(!stopped.flags.contains(SafetyFlags::MOTION_ACTIVE));
}

#[test]
fn refreshed_stream_stays_alive() {
    let mut rig = Rig::new();
    for _ in 0..50 {
        rig.handle.publish_twist(Twist::linear(0.0, 0.0, 0.05)).unwrap();
        let snap = rig.tick();
        assert_eq!(snap.safety_state, SafetyState::Moving);
    }
}

#[test]
fn joint_velocity_stream_and_last_writer_wins() {
    let mut rig = Rig::new();
    let other = rig.handle.new_client();
    rig.handle
        .publish_joint_velocity(vec![0.1, 0.0, 0.0, 0.0, 0.0, 0.0])
        .unwrap();
    other
        .publish_joint_velocity(vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.2])
        .unwrap();
    let snap = rig.tick();
    assert_eq!(snap.joint_velocities[0], 0.0);
    assert_eq!(snap.joint_velocities[5], 0.2);
}

#[test]
fn quiet_stream_from_other_source_does_not_keep_motion_alive() {
    let mut rig = Rig::new();
    let other = rig.handle.new_client();
    rig.handle.publish_twist(Twist::linear(0.05, 0.0, 0.0)).unwrap();
    rig.tick();
    // The second client takes over, then goes quiet.
    other.publish_twist(Twist::linear(0.0, 0.05, 0.0)).unwrap();
    rig.tick();
    let snap = rig
        .tick_until(30, |s| s.safety_state == SafetyState::Ready)
        .unwrap();
    assert!(snap.is_at_rest());
}

#[test]
fn goal_is_not_watched() {
    let mut rig = Rig::new();
    let mut joints = super::joints_of(&rig.tick());
    joints[0] += 1.5;
    let goal = rig
        .goal(Command::JointPoseGoal {
            joints,
            options: GoalOptions::default(),
        })
        .unwrap();

    // Well past the watchdog timeout the goal is still running.
    for _ in 0..40 {
        assert_eq!(rig.tick().safety_state, SafetyState::Moving);
    }
    assert!(goal.try_result().is_none());
    assert!(!rig.tick().flags.contains(SafetyFlags::WATCHDOG_EXPIRED));
}

#[test]
fn stream_rejected_while_goal_active() {
    let mut rig = Rig::new();
    let mut joints = super::joints_of(&rig.tick());
    joints[1] += 0.5;
    let _goal = rig
        .goal(Command::JointPoseGoal {
            joints,
            options: GoalOptions::default(),
        })
        .unwrap();
    assert!(matches!(
        rig.submit(Command::CartesianVelocity(Twist::linear(0.1, 0.0, 0.0))),
        Err(DriverError::Busy)
    ));
    assert_eq!(
        rig.control.active_kind(),
        Some(armctl_common::command::CommandKind::JointPoseGoal)
    );
}

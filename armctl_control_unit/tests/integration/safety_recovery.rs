//! Integration test: robot faults and recovery.
//!
//! 1. Fault feedback → fault state, motion aborted, zero command
//! 2. Every motion request rejected while faulted; Stop still admitted
//! 3. Recover fails while the fault persists, succeeds once cleared

use armctl_common::command::{Command, GoalOptions, Twist};
use armctl_common::error::{DriverError, FaultFlags, SafetyFlags};
use armctl_common::state::SafetyState;
use armctl_control_unit::command::goal::GoalOutcome;

use super::{Rig, joints_of};

fn moving_goal(rig: &mut Rig) -> armctl_control_unit::command::goal::GoalHandle {
    let mut joints = joints_of(&rig.tick());
    joints[0] += 1.0;
    let goal = rig
        .goal(Command::JointPoseGoal {
            joints,
            options: GoalOptions::default(),
        })
        .unwrap();
    rig.tick();
    goal
}

#[test]
fn collision_aborts_goal_and_blocks_motion() {
    let mut rig = Rig::new();
    let goal = moving_goal(&mut rig);

    rig.injector.raise(FaultFlags::COLLISION);
    let snap = rig.tick();
    assert_eq!(snap.safety_state, SafetyState::Collision);
    assert!(snap.flags.contains(SafetyFlags::COLLISION));
    assert!(snap.is_at_rest());
    assert_eq!(snap.active, None);
    assert!(matches!(
        goal.try_result().unwrap().outcome,
        GoalOutcome::Failed(DriverError::Hardware(f)) if f.contains(FaultFlags::COLLISION)
    ));

    assert!(matches!(
        rig.submit(Command::CartesianVelocity(Twist::linear(0.1, 0.0, 0.0))),
        Err(DriverError::Faulted(SafetyState::Collision))
    ));
    assert!(matches!(
        rig.goal(Command::Home {
            options: GoalOptions::default()
        }),
        Err(DriverError::Faulted(_))
    ));
    rig.submit(Command::Stop).unwrap();
    assert_eq!(rig.tick().safety_state, SafetyState::Collision);
}

#[test]
fn recover_only_after_fault_clears() {
    let mut rig = Rig::new();
    rig.tick();
    rig.injector.raise(FaultFlags::COLLISION);
    assert_eq!(rig.tick().safety_state, SafetyState::Collision);

    assert!(matches!(
        rig.submit(Command::Recover),
        Err(DriverError::FaultStillPresent(f)) if f == FaultFlags::COLLISION
    ));
    assert_eq!(rig.tick().safety_state, SafetyState::Collision);

    rig.injector.clear_faults();
    rig.submit(Command::Recover).unwrap();
    let snap = rig.tick();
    assert_eq!(snap.safety_state, SafetyState::Ready);
    assert!(!snap.flags.has_critical());

    // Motion is accepted again.
    rig.handle.publish_twist(Twist::linear(0.0, 0.05, 0.0)).unwrap();
    assert_eq!(rig.tick().safety_state, SafetyState::Moving);
}

#[test]
fn recover_without_fault_is_rejected() {
    let mut rig = Rig::new();
    rig.tick();
    assert!(matches!(
        rig.submit(Command::Recover),
        Err(DriverError::NothingToRecover(SafetyState::Ready))
    ));
}

#[test]
fn limit_and_hardware_faults_map_to_states() {
    let mut rig = Rig::new();
    rig.tick();
    rig.injector.raise(FaultFlags::JOINT_LIMIT);
    let snap = rig.tick();
    assert_eq!(snap.safety_state, SafetyState::LimitViolation);
    assert!(snap.flags.contains(SafetyFlags::JOINT_LIMIT));

    rig.injector.clear_faults();
    rig.submit(Command::Recover).unwrap();

    rig.injector.raise(FaultFlags::HARDWARE);
    let snap = rig.tick();
    assert_eq!(snap.safety_state, SafetyState::Error);
    assert!(snap.flags.contains(SafetyFlags::HARDWARE_FAULT));
}

#[test]
fn first_fault_wins_until_recovered() {
    let mut rig = Rig::new();
    rig.tick();
    rig.injector.raise(FaultFlags::JOINT_LIMIT);
    rig.tick();
    rig.injector.raise(FaultFlags::COLLISION);
    assert_eq!(rig.tick().safety_state, SafetyState::LimitViolation);
}

#[test]
fn fault_while_paused() {
    let mut rig = Rig::new();
    rig.tick();
    rig.submit(Command::Stop).unwrap();
    assert_eq!(rig.tick().safety_state, SafetyState::Paused);
    rig.injector.raise(FaultFlags::HARDWARE);
    assert_eq!(rig.tick().safety_state, SafetyState::Error);
}

#[test]
fn streaming_motion_stopped_by_fault() {
    let mut rig = Rig::new();
    rig.handle.publish_twist(Twist::linear(0.1, 0.0, 0.0)).unwrap();
    rig.tick();
    let q_before = joints_of(&rig.tick());

    rig.injector.raise(FaultFlags::COLLISION);
    rig.handle.publish_twist(Twist::linear(0.1, 0.0, 0.0)).unwrap();

    // The tick that first sees the fault already commands zero.
    let snap = rig.tick();
    assert_eq!(snap.safety_state, SafetyState::Collision);
    assert!(rig.control.last_command().is_zero());
    assert_eq!(snap.active, None);
    assert_eq!(joints_of(&snap), q_before);

    let snap = rig.tick();
    assert!(rig.control.last_command().is_zero());
    assert_eq!(joints_of(&snap), q_before);
}

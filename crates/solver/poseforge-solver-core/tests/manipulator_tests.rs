use approx::assert_relative_eq;
use nalgebra::{UnitQuaternion, Vector3};
use poseforge_animation_core::{Scheduler, SchedulerConfig};
use poseforge_api_core::{pose_from, AnimProperty, NodeId, Pose, SceneGraph};
use poseforge_solver_core::{CurveManipulator, SolveError};
use poseforge_test_fixtures::{
    arm_scene, free_node_scene, keyed_channel_set, keyed_pose_set, RecordingCommandSink,
};

fn pointer_at(x: f32, y: f32, z: f32) -> Pose {
    pose_from(Vector3::new(x, y, z), UnitQuaternion::identity())
}

fn free_setup() -> (SceneGraph, NodeId, Scheduler) {
    let (scene, node) = free_node_scene();
    let mut scheduler = Scheduler::new(SchedulerConfig::default());
    scheduler.replace_animation(
        node,
        Some(keyed_channel_set(
            node,
            AnimProperty::PosY,
            &[(1, 0.0), (10, 0.0)],
        )),
    );
    (scene, node, scheduler)
}

#[test]
fn cancel_restores_the_pre_grab_state_exactly() {
    let (mut scene, node, mut scheduler) = free_setup();
    scene.node_mut(node).local.position = Vector3::new(0.3, 0.0, 0.0);
    scheduler.set_frame(5, &mut scene);
    let before_animation = scheduler.animation(node).cloned();
    let before_local = scene.node(node).local;

    let mut manipulator = CurveManipulator::new();
    manipulator
        .grab(&scene, &scheduler, node, &pointer_at(0.0, 0.0, 0.0), None)
        .unwrap();
    for step in 1..=4 {
        manipulator
            .drag(
                &mut scene,
                &mut scheduler,
                &pointer_at(0.0, step as f32 * 0.25, 0.0),
            )
            .unwrap();
    }
    assert_eq!(manipulator.drag_steps(), 4);
    manipulator.cancel(&mut scene, &mut scheduler).unwrap();

    assert!(!manipulator.is_active());
    assert_eq!(scheduler.animation(node).cloned(), before_animation);
    assert_eq!(scene.node(node).local, before_local);
}

#[test]
fn release_commits_one_grouped_edit() {
    let (mut scene, node, mut scheduler) = free_setup();
    scheduler.set_frame(5, &mut scene);
    let before_animation = scheduler.animation(node).cloned();

    let mut manipulator = CurveManipulator::new();
    let mut commands = RecordingCommandSink::default();
    manipulator
        .grab(&scene, &scheduler, node, &pointer_at(0.0, 0.0, 0.0), None)
        .unwrap();
    manipulator
        .drag(&mut scene, &mut scheduler, &pointer_at(0.0, 1.0, 0.0))
        .unwrap();
    manipulator
        .release(&mut scene, &mut scheduler, &mut commands)
        .unwrap();

    assert_eq!(commands.submissions.len(), 1);
    let (label, edits) = &commands.submissions[0];
    assert_eq!(label, "manipulate animation");
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].node, node);
    assert_eq!(edits[0].before, before_animation);
    assert_ne!(edits[0].after, before_animation);
    // The live state is the edited one.
    assert_eq!(scheduler.animation(node).cloned(), edits[0].after);
    // The drag landed in the curve.
    let value = scheduler
        .animation(node)
        .unwrap()
        .curve(AnimProperty::PosY)
        .unwrap()
        .evaluate(5)
        .unwrap();
    assert_relative_eq!(value, 1.0, epsilon = 1e-2);
}

#[test]
fn sessions_are_exclusive() {
    let (scene, node, scheduler) = free_setup();
    let mut manipulator = CurveManipulator::new();
    manipulator
        .grab(&scene, &scheduler, node, &pointer_at(0.0, 0.0, 0.0), None)
        .unwrap();
    assert!(matches!(
        manipulator.grab(&scene, &scheduler, node, &pointer_at(0.0, 0.0, 0.0), None),
        Err(SolveError::SessionActive)
    ));
}

#[test]
fn drag_without_session_fails() {
    let (mut scene, _node, mut scheduler) = free_setup();
    let mut manipulator = CurveManipulator::new();
    assert!(matches!(
        manipulator.drag(&mut scene, &mut scheduler, &pointer_at(0.0, 0.0, 0.0)),
        Err(SolveError::NoSession)
    ));
}

#[test]
fn grab_rejects_a_zone_that_excludes_the_current_frame() {
    let (mut scene, node, mut scheduler) = free_setup();
    scheduler.set_frame(5, &mut scene);
    let mut manipulator = CurveManipulator::new();
    assert!(matches!(
        manipulator.grab(
            &scene,
            &scheduler,
            node,
            &pointer_at(0.0, 0.0, 0.0),
            Some((20, 30))
        ),
        Err(SolveError::FrameOutsideZone { .. })
    ));
    assert!(!manipulator.is_active());
}

#[test]
fn failed_drags_leave_everything_untouched_on_release() {
    // No animation data at all: every drag step fails.
    let (mut scene, node) = free_node_scene();
    let mut scheduler = Scheduler::new(SchedulerConfig::default());
    scheduler.set_frame(5, &mut scene);

    let mut manipulator = CurveManipulator::new();
    let mut commands = RecordingCommandSink::default();
    manipulator
        .grab(&scene, &scheduler, node, &pointer_at(0.0, 0.0, 0.0), None)
        .unwrap();
    let result = manipulator.drag(&mut scene, &mut scheduler, &pointer_at(0.0, 1.0, 0.0));
    assert!(matches!(result, Err(SolveError::NoBracketingKeys { .. })));
    // The session survives a failed step.
    assert!(manipulator.is_active());

    manipulator
        .release(&mut scene, &mut scheduler, &mut commands)
        .unwrap();
    assert!(commands.submissions.is_empty());
    assert!(scheduler.animation(node).is_none());
}

#[test]
fn rig_point_drag_moves_the_joint_chain() {
    let (mut scene, rig) = arm_scene();
    let mut scheduler = Scheduler::new(SchedulerConfig::default());
    scheduler.set_frame(5, &mut scene);

    let wrist_before = scene.world_pose(rig.wrist).translation.vector;
    let mut manipulator = CurveManipulator::new();
    manipulator
        .grab(&scene, &scheduler, rig.wrist, &pointer_at(0.0, 0.0, 0.0), None)
        .unwrap();
    for _ in 0..20 {
        manipulator
            .drag(&mut scene, &mut scheduler, &pointer_at(0.5, -0.2, 0.0))
            .unwrap();
    }
    let wrist_after = scene.world_pose(rig.wrist).translation.vector;
    let target = wrist_before + Vector3::new(0.5, -0.2, 0.0);
    assert!(
        (wrist_after - target).norm() < (wrist_before - target).norm(),
        "drag did not pull the wrist toward the pointer target"
    );
}

#[test]
fn rig_zone_drag_edits_tangents_across_the_chain() {
    let (mut scene, rig) = arm_scene();
    let mut scheduler = Scheduler::new(SchedulerConfig::default());
    for joint in [rig.shoulder, rig.elbow, rig.wrist] {
        let local = scene.node(joint).local;
        scheduler.replace_animation(joint, Some(keyed_pose_set(joint, &local, &[1, 10])));
    }
    scheduler.set_frame(5, &mut scene);

    let mut manipulator = CurveManipulator::new();
    manipulator
        .grab(
            &scene,
            &scheduler,
            rig.wrist,
            &pointer_at(0.0, 0.0, 0.0),
            Some((1, 10)),
        )
        .unwrap();
    manipulator
        .drag(&mut scene, &mut scheduler, &pointer_at(0.2, 0.0, 0.0))
        .unwrap();

    // The zone edit reshapes curves; joints themselves are not re-posed, so
    // the evaluated scene follows the curves.
    let wrist_world = scene.world_pose(rig.wrist).translation.vector;
    assert_relative_eq!(wrist_world.x, 0.2, epsilon = 2e-2);

    // Keys stay put; only tangents moved.
    let set = scheduler.animation(rig.wrist).unwrap();
    let curve = set.curve(AnimProperty::PosX).unwrap();
    assert_eq!(curve.len(), 2);
    assert_relative_eq!(curve.keys()[0].value, 0.0, epsilon = 1e-5);
}

use approx::assert_relative_eq;
use nalgebra::Vector3;
use poseforge_animation_core::{
    AnimationSet, CollectingObserver, CommandSink, Interpolation, NullCommandSink,
    ReplaceAnimationEdit, Scheduler, SchedulerConfig, SchedulerEvent, SchedulerState, TimeHook,
};
use poseforge_api_core::{AnimProperty, LightParams, NodeId, SceneGraph};

#[derive(Default)]
struct RecordingSink {
    submissions: Vec<(String, Vec<ReplaceAnimationEdit>)>,
}

impl CommandSink for RecordingSink {
    fn submit(&mut self, label: &str, edits: Vec<ReplaceAnimationEdit>) {
        self.submissions.push((label.to_string(), edits));
    }
}

fn scene_with_node() -> (SceneGraph, NodeId) {
    let mut scene = SceneGraph::new();
    let node = scene.add_node("ball", None);
    (scene, node)
}

fn bouncing_set(node: NodeId) -> AnimationSet {
    let mut set = AnimationSet::new(node);
    let curve = set.ensure_curve(AnimProperty::PosY);
    curve.add_key(1, 0.0, Interpolation::Linear);
    curve.add_key(48, 47.0, Interpolation::Linear);
    set
}

fn config(start: i32, end: i32) -> SchedulerConfig {
    SchedulerConfig {
        fps: 24.0,
        start_frame: start,
        end_frame: end,
        looping: true,
        preroll_seconds: 0.0,
        ..Default::default()
    }
}

#[test]
fn playing_wraps_at_timeline_end() {
    // fps = 24, loop, range [1, 48], starting at frame 1: two seconds of
    // wall clock advance exactly one loop, so the cursor is back at 1.
    let (mut scene, node) = scene_with_node();
    let mut scheduler = Scheduler::new(config(1, 48));
    scheduler.replace_animation(node, Some(bouncing_set(node)));
    scheduler.play().unwrap();

    let mut sink = NullCommandSink;
    scheduler.tick(2.0, &mut scene, &mut sink);
    assert_eq!(scheduler.current_frame(), 1);
    assert_eq!(scheduler.state(), SchedulerState::Playing);

    // Half a loop later the cursor sits mid-range.
    scheduler.tick(1.0, &mut scene, &mut sink);
    assert_eq!(scheduler.current_frame(), 25);
}

#[test]
fn playing_without_loop_stops_at_end() {
    let (mut scene, node) = scene_with_node();
    let mut cfg = config(1, 48);
    cfg.looping = false;
    let mut scheduler = Scheduler::new(cfg);
    scheduler.replace_animation(node, Some(bouncing_set(node)));
    scheduler.play().unwrap();

    let mut sink = NullCommandSink;
    scheduler.tick(10.0, &mut scene, &mut sink);
    assert_eq!(scheduler.current_frame(), 48);
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
}

#[test]
fn set_frame_evaluates_and_notifies() {
    let (mut scene, node) = scene_with_node();
    let mut scheduler = Scheduler::new(config(1, 48));
    scheduler.replace_animation(node, Some(bouncing_set(node)));
    let (observer, seen) = CollectingObserver::new();
    scheduler.add_observer(Box::new(observer));

    scheduler.set_frame(25, &mut scene);
    assert_relative_eq!(scene.node(node).local.position.y, 24.0, epsilon = 1e-4);

    // Events are queued until the next tick.
    let mut sink = NullCommandSink;
    scheduler.tick(0.0, &mut scene, &mut sink);
    assert!(seen
        .borrow()
        .contains(&SchedulerEvent::FrameChanged { frame: 25 }));
}

#[test]
fn set_frame_clamps_to_timeline() {
    let (mut scene, _node) = scene_with_node();
    let mut scheduler = Scheduler::new(config(1, 48));
    scheduler.set_frame(500, &mut scene);
    assert_eq!(scheduler.current_frame(), 48);
    scheduler.set_frame(-3, &mut scene);
    assert_eq!(scheduler.current_frame(), 1);
}

#[test]
fn evaluation_is_idempotent() {
    let (mut scene, node) = scene_with_node();
    let mut scheduler = Scheduler::new(config(1, 48));
    scheduler.replace_animation(node, Some(bouncing_set(node)));

    scheduler.set_frame(10, &mut scene);
    let first = scene.node(node).local;
    scheduler.evaluate_all(&mut scene);
    let second = scene.node(node).local;
    assert_eq!(first, second);
}

#[test]
fn video_output_advances_one_frame_per_tick() {
    let (mut scene, node) = scene_with_node();
    let mut scheduler = Scheduler::new(config(1, 4));
    scheduler.replace_animation(node, Some(bouncing_set(node)));
    scheduler.start_video_output().unwrap();

    let mut sink = NullCommandSink;
    // Wall-clock time is irrelevant in export mode.
    scheduler.tick(100.0, &mut scene, &mut sink);
    assert_eq!(scheduler.current_frame(), 2);
    scheduler.tick(0.0, &mut scene, &mut sink);
    assert_eq!(scheduler.current_frame(), 3);
    scheduler.tick(0.0, &mut scene, &mut sink);
    assert_eq!(scheduler.current_frame(), 4);
    scheduler.tick(0.0, &mut scene, &mut sink);
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
}

struct ShotBoundaryHook {
    boundary: i32,
}

impl TimeHook for ShotBoundaryHook {
    fn remap(&mut self, frame: i32) -> i32 {
        frame.min(self.boundary)
    }
}

struct RunawayHook;

impl TimeHook for RunawayHook {
    fn remap(&mut self, _frame: i32) -> i32 {
        10_000
    }
}

#[test]
fn time_hook_remaps_and_rebases() {
    let (mut scene, _node) = scene_with_node();
    let mut scheduler = Scheduler::new(config(1, 48));
    scheduler.add_time_hook(Box::new(ShotBoundaryHook { boundary: 10 }));
    scheduler.play().unwrap();

    let mut sink = NullCommandSink;
    scheduler.tick(1.0, &mut scene, &mut sink);
    assert_eq!(scheduler.current_frame(), 10);
    // The clock anchor was reset at the remap target, so playback does not
    // leap ahead on the next tick.
    scheduler.tick(1.0 / 24.0, &mut scene, &mut sink);
    assert_eq!(scheduler.current_frame(), 10);
}

#[test]
fn out_of_range_hook_is_clamped() {
    let (mut scene, _node) = scene_with_node();
    let mut scheduler = Scheduler::new(config(1, 48));
    scheduler.add_time_hook(Box::new(RunawayHook));
    scheduler.play().unwrap();

    let mut sink = NullCommandSink;
    scheduler.tick(0.5, &mut scene, &mut sink);
    assert_eq!(scheduler.current_frame(), 48);
}

#[test]
fn transition_errors_are_reported() {
    let (mut scene, _node) = scene_with_node();
    let mut scheduler = Scheduler::new(config(1, 48));
    let mut sink = NullCommandSink;

    assert!(scheduler.stop(&mut scene, &mut sink).is_err());
    scheduler.play().unwrap();
    assert!(scheduler.play().is_err());
    assert!(scheduler.record(vec![]).is_err());
    scheduler.stop(&mut scene, &mut sink).unwrap();
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
}

#[test]
fn recording_captures_and_submits_one_edit_per_node() {
    let mut scene = SceneGraph::new();
    let puppet = scene.add_node("puppet", None);
    let lamp = scene.add_node("lamp", None);
    scene.node_mut(lamp).light = Some(LightParams { intensity: 2.5 });
    scene.node_mut(puppet).local.position = Vector3::new(0.0, 1.0, 0.0);

    let mut scheduler = Scheduler::new(config(1, 48));
    let mut sink = RecordingSink::default();

    scheduler.record(vec![puppet, lamp]).unwrap();
    assert_eq!(scheduler.state(), SchedulerState::Preroll);

    // Zero preroll: the first tick flips into Recording, subsequent ticks
    // sample the scene while the operator moves the node.
    scheduler.tick(0.01, &mut scene, &mut sink);
    assert_eq!(scheduler.state(), SchedulerState::Recording);
    assert_eq!(scheduler.default_interpolation(), Interpolation::Linear);

    for step in 0..10 {
        scene.node_mut(puppet).local.position.y = 1.0 + step as f32 * 0.1;
        scheduler.tick(1.0 / 24.0, &mut scene, &mut sink);
    }
    scheduler.stop(&mut scene, &mut sink).unwrap();

    assert_eq!(scheduler.state(), SchedulerState::Stopped);
    // Forced-linear interpolation is restored after recording.
    assert_eq!(scheduler.default_interpolation(), Interpolation::Bezier);

    assert_eq!(sink.submissions.len(), 1);
    let (label, edits) = &sink.submissions[0];
    assert_eq!(label, "record animation");
    assert_eq!(edits.len(), 2);
    for edit in edits {
        assert!(edit.before.is_none());
        assert!(edit.after.is_some());
    }

    // Transform channels always; the light channel only on the lamp.
    let puppet_set = scheduler.animation(puppet).unwrap();
    assert!(puppet_set.curve(AnimProperty::PosY).is_some());
    assert!(puppet_set.curve(AnimProperty::LightIntensity).is_none());
    let lamp_set = scheduler.animation(lamp).unwrap();
    assert!(lamp_set.curve(AnimProperty::LightIntensity).is_some());

    // Recorded keys carry the forced linear interpolation.
    for key in puppet_set.curve(AnimProperty::PosY).unwrap().keys() {
        assert_eq!(key.interpolation, Interpolation::Linear);
    }
}

#[test]
fn recording_auto_stops_at_timeline_end() {
    let (mut scene, node) = scene_with_node();
    let mut scheduler = Scheduler::new(config(1, 4));
    let mut sink = RecordingSink::default();

    scheduler.record(vec![node]).unwrap();
    scheduler.tick(0.01, &mut scene, &mut sink);
    assert_eq!(scheduler.state(), SchedulerState::Recording);

    // Enough wall clock to run past the last frame.
    scheduler.tick(10.0, &mut scene, &mut sink);
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
    assert_eq!(sink.submissions.len(), 1);
}

#[test]
fn replace_animation_prunes_empty_sets() {
    let (_scene, node) = scene_with_node();
    let mut scheduler = Scheduler::new(config(1, 48));
    scheduler.replace_animation(node, Some(bouncing_set(node)));
    assert!(scheduler.animation(node).is_some());

    scheduler.replace_animation(node, Some(AnimationSet::new(node)));
    assert!(scheduler.animation(node).is_none());

    scheduler.replace_animation(node, None);
    assert!(scheduler.animation(node).is_none());
}

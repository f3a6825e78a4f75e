//! Frame-stepping state machine driving playback, recording, and evaluation
//! of every registered animation set. The host constructs one scheduler and
//! calls [`Scheduler::tick`] once per frame; there is no hidden engine
//! lifecycle and no singleton access.

use hashbrown::HashMap;
use log::{debug, warn};
use poseforge_api_core::{quat_to_euler_deg, AnimProperty, NodeId, SceneGraph};
use serde::{Deserialize, Serialize};

use crate::command::{CommandSink, ReplaceAnimationEdit};
use crate::error::AnimError;
use crate::events::{EventDispatcher, SchedulerEvent, SchedulerObserver};
use crate::key::Interpolation;
use crate::set::AnimationSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerState {
    Stopped,
    /// Countdown before recording starts.
    Preroll,
    Recording,
    Playing,
    /// Deterministic one-frame-per-tick export mode.
    VideoOutput,
}

impl SchedulerState {
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Preroll => "preroll",
            Self::Recording => "recording",
            Self::Playing => "playing",
            Self::VideoOutput => "video-output",
        }
    }

    /// Whether the transport is advancing frames on its own.
    #[inline]
    pub fn is_running(&self) -> bool {
        !matches!(self, Self::Stopped)
    }
}

/// Pluggable frame remapper applied after playback advance (e.g. to respect
/// external shot boundaries).
pub trait TimeHook {
    fn remap(&mut self, frame: i32) -> i32;
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub fps: f32,
    pub start_frame: i32,
    pub end_frame: i32,
    pub looping: bool,
    /// Playback-rate multiplier; 1.0 is real time.
    pub speed: f32,
    /// Countdown before recording begins.
    pub preroll_seconds: f32,
    /// Interpolation assigned to newly created keys; forced to `Linear`
    /// while recording.
    pub default_interpolation: Interpolation,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            fps: 24.0,
            start_frame: 1,
            end_frame: 240,
            looping: true,
            speed: 1.0,
            preroll_seconds: 3.0,
            default_interpolation: Interpolation::Bezier,
        }
    }
}

struct RecordingSession {
    targets: Vec<NodeId>,
    before: HashMap<NodeId, Option<AnimationSet>>,
}

pub struct Scheduler {
    config: SchedulerConfig,
    state: SchedulerState,
    current_frame: i32,
    /// Seconds elapsed since the clock anchor.
    clock: f64,
    anchor_frame: i32,
    animations: HashMap<NodeId, AnimationSet>,
    hooks: Vec<Box<dyn TimeHook>>,
    events: EventDispatcher,
    recording: Option<RecordingSession>,
    saved_interpolation: Option<Interpolation>,
    preroll_remaining: f32,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            current_frame: config.start_frame,
            anchor_frame: config.start_frame,
            config,
            state: SchedulerState::Stopped,
            clock: 0.0,
            animations: HashMap::new(),
            hooks: Vec::new(),
            events: EventDispatcher::new(),
            recording: None,
            saved_interpolation: None,
            preroll_remaining: 0.0,
        }
    }

    #[inline]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    #[inline]
    pub fn config_mut(&mut self) -> &mut SchedulerConfig {
        &mut self.config
    }

    #[inline]
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    #[inline]
    pub fn current_frame(&self) -> i32 {
        self.current_frame
    }

    #[inline]
    pub fn default_interpolation(&self) -> Interpolation {
        self.config.default_interpolation
    }

    // ---- animation registry ------------------------------------------------

    #[inline]
    pub fn animation(&self, node: NodeId) -> Option<&AnimationSet> {
        self.animations.get(&node)
    }

    #[inline]
    pub fn animation_mut(&mut self, node: NodeId) -> Option<&mut AnimationSet> {
        self.animations.get_mut(&node)
    }

    /// Full mutable access to the registry; the manipulation solvers edit
    /// curves in place through this.
    #[inline]
    pub fn animations_mut(&mut self) -> &mut HashMap<NodeId, AnimationSet> {
        &mut self.animations
    }

    /// Animation set for `node`, created on first use (first keyframe).
    pub fn ensure_animation(&mut self, node: NodeId) -> &mut AnimationSet {
        if !self.animations.contains_key(&node) {
            self.events.dispatch(SchedulerEvent::AnimationAdded { node });
        }
        self.animations
            .entry(node)
            .or_insert_with(|| AnimationSet::new(node))
    }

    /// Replace (or remove) a node's animation data. This is the entry point
    /// the command collaborator and the manipulator use for commit, undo,
    /// and cancel. Empty sets are pruned.
    pub fn replace_animation(&mut self, node: NodeId, set: Option<AnimationSet>) {
        match set {
            Some(set) if !set.is_empty() => {
                let existed = self.animations.insert(node, set).is_some();
                if existed {
                    self.events.dispatch(SchedulerEvent::CurveChanged { node });
                } else {
                    self.events.dispatch(SchedulerEvent::AnimationAdded { node });
                }
            }
            _ => {
                if self.animations.remove(&node).is_some() {
                    self.events
                        .dispatch(SchedulerEvent::AnimationRemoved { node });
                }
            }
        }
    }

    pub fn animated_nodes(&self) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self.animations.keys().copied().collect();
        nodes.sort_unstable();
        nodes
    }

    // ---- observers and hooks ----------------------------------------------

    pub fn add_observer(&mut self, observer: Box<dyn SchedulerObserver>) {
        self.events.add_listener(observer);
    }

    pub fn add_time_hook(&mut self, hook: Box<dyn TimeHook>) {
        self.hooks.push(hook);
    }

    /// Queue an event on behalf of a collaborator (the manipulator uses this
    /// for curve-change notifications). Delivered at the end of the tick.
    pub fn notify(&mut self, event: SchedulerEvent) {
        self.events.dispatch(event);
    }

    // ---- transport ---------------------------------------------------------

    pub fn play(&mut self) -> Result<(), AnimError> {
        if self.state != SchedulerState::Stopped {
            return Err(self.invalid_transition("play"));
        }
        self.set_state(SchedulerState::Playing);
        self.rebase_clock();
        Ok(())
    }

    /// Begin the preroll countdown toward recording the given nodes.
    pub fn record(&mut self, targets: Vec<NodeId>) -> Result<(), AnimError> {
        if self.state != SchedulerState::Stopped {
            return Err(self.invalid_transition("record"));
        }
        self.recording = Some(RecordingSession {
            targets,
            before: HashMap::new(),
        });
        self.preroll_remaining = self.config.preroll_seconds;
        self.set_state(SchedulerState::Preroll);
        Ok(())
    }

    pub fn start_video_output(&mut self) -> Result<(), AnimError> {
        if self.state != SchedulerState::Stopped {
            return Err(self.invalid_transition("video-output"));
        }
        self.set_state(SchedulerState::VideoOutput);
        Ok(())
    }

    /// Stop whatever the transport is doing. Stopping a recording finalizes
    /// it: the before/after diff goes to the command collaborator as one
    /// undoable edit per node.
    pub fn stop(
        &mut self,
        scene: &mut SceneGraph,
        commands: &mut dyn CommandSink,
    ) -> Result<(), AnimError> {
        match self.state {
            SchedulerState::Stopped => Err(self.invalid_transition("stop")),
            SchedulerState::Playing | SchedulerState::VideoOutput => {
                self.set_state(SchedulerState::Stopped);
                Ok(())
            }
            SchedulerState::Preroll => {
                self.recording = None;
                self.set_state(SchedulerState::Stopped);
                Ok(())
            }
            SchedulerState::Recording => {
                self.finish_recording(scene, commands);
                Ok(())
            }
        }
    }

    /// Move the play cursor. Outside playback/recording this re-evaluates
    /// every animation set onto the scene and notifies observers.
    pub fn set_frame(&mut self, frame: i32, scene: &mut SceneGraph) {
        let clamped = frame.clamp(self.config.start_frame, self.config.end_frame);
        if clamped == self.current_frame {
            return;
        }
        self.current_frame = clamped;
        self.rebase_clock();
        if !matches!(
            self.state,
            SchedulerState::Playing | SchedulerState::Recording
        ) {
            self.evaluate_all(scene);
        }
        self.events.dispatch(SchedulerEvent::FrameChanged { frame: clamped });
    }

    /// Advance the state machine by `dt` seconds of host time. Queued events
    /// are delivered at the end of the call.
    pub fn tick(&mut self, dt: f32, scene: &mut SceneGraph, commands: &mut dyn CommandSink) {
        match self.state {
            SchedulerState::Stopped => {}
            SchedulerState::Preroll => {
                self.preroll_remaining -= dt;
                if self.preroll_remaining <= 0.0 {
                    self.begin_recording();
                }
            }
            SchedulerState::Playing => self.tick_playing(dt, scene),
            SchedulerState::Recording => self.tick_recording(dt, scene, commands),
            SchedulerState::VideoOutput => self.tick_video_output(scene),
        }
        self.events.process_queue();
    }

    /// Evaluate every registered set at the current frame and write the
    /// results onto the scene. Pure with respect to curve state and frame:
    /// evaluating twice without intervening edits is a no-op the second
    /// time.
    pub fn evaluate_all(&self, scene: &mut SceneGraph) {
        for (node_id, set) in &self.animations {
            let node = scene.node_mut(*node_id);
            node.local = set.sample_local(self.current_frame, &node.local);
            let extras = set.sample_extras(self.current_frame);
            if let (Some(light), Some(intensity)) = (node.light.as_mut(), extras.light_intensity) {
                light.intensity = intensity;
            }
            if let (Some(camera), Some(fov)) = (node.camera.as_mut(), extras.camera_fov) {
                camera.fov_deg = fov;
            }
        }
    }

    // ---- internals ---------------------------------------------------------

    fn invalid_transition(&self, requested: &str) -> AnimError {
        AnimError::InvalidState {
            current: self.state.name().to_string(),
            requested: requested.to_string(),
        }
    }

    fn set_state(&mut self, state: SchedulerState) {
        if self.state != state {
            debug!("scheduler: {} -> {}", self.state.name(), state.name());
            self.state = state;
            self.events.dispatch(SchedulerEvent::StateChanged { state });
        }
    }

    fn rebase_clock(&mut self) {
        self.anchor_frame = self.current_frame;
        self.clock = 0.0;
    }

    fn frames_elapsed(&self) -> i32 {
        (self.clock * (self.config.fps * self.config.speed) as f64) as i32
    }

    fn tick_playing(&mut self, dt: f32, scene: &mut SceneGraph) {
        self.clock += dt as f64;
        let mut frame = self.anchor_frame + self.frames_elapsed();
        if frame > self.config.end_frame {
            if self.config.looping {
                let span = self.config.end_frame - self.config.start_frame + 1;
                frame = self.config.start_frame + (frame - self.config.start_frame).rem_euclid(span);
            } else {
                frame = self.config.end_frame;
                self.apply_frame(frame, scene);
                self.set_state(SchedulerState::Stopped);
                return;
            }
        }
        let frame = self.post_process_frame(frame);
        self.apply_frame(frame, scene);
    }

    /// Run the registered time hooks over a candidate frame, clamp the
    /// result to the timeline, and reset the clock anchor when a hook moved
    /// the cursor (so playback does not drift against the remap).
    fn post_process_frame(&mut self, frame: i32) -> i32 {
        let mut remapped = frame;
        for hook in &mut self.hooks {
            remapped = hook.remap(remapped);
        }
        let clamped = remapped.clamp(self.config.start_frame, self.config.end_frame);
        if clamped != remapped {
            warn!(
                "time hook returned out-of-range frame {remapped}; clamped to {clamped}"
            );
        }
        if clamped != frame {
            self.anchor_frame = clamped;
            self.clock = 0.0;
        }
        clamped
    }

    fn apply_frame(&mut self, frame: i32, scene: &mut SceneGraph) {
        if frame == self.current_frame {
            return;
        }
        self.current_frame = frame;
        self.evaluate_all(scene);
        self.events.dispatch(SchedulerEvent::FrameChanged { frame });
    }

    fn begin_recording(&mut self) {
        let Some(session) = self.recording.as_mut() else {
            self.set_state(SchedulerState::Stopped);
            return;
        };
        session.before = session
            .targets
            .iter()
            .map(|node| (*node, self.animations.get(node).cloned()))
            .collect();
        self.saved_interpolation = Some(self.config.default_interpolation);
        self.config.default_interpolation = Interpolation::Linear;
        self.rebase_clock();
        self.set_state(SchedulerState::Recording);
    }

    fn tick_recording(&mut self, dt: f32, scene: &mut SceneGraph, commands: &mut dyn CommandSink) {
        self.clock += dt as f64;
        let raw = self.anchor_frame + self.frames_elapsed();
        let frame = raw.min(self.config.end_frame);
        if frame != self.current_frame {
            self.current_frame = frame;
            self.events.dispatch(SchedulerEvent::FrameChanged { frame });
        }
        self.capture_samples(scene);
        if raw >= self.config.end_frame {
            self.finish_recording(scene, commands);
        }
    }

    /// One sample per tick per target node: transform channels always,
    /// light/camera channels when the node carries the controller. Rotation
    /// samples go through the curve's angle filtering.
    fn capture_samples(&mut self, scene: &SceneGraph) {
        let Some(session) = self.recording.as_ref() else {
            return;
        };
        let frame = self.current_frame;
        let interpolation = self.config.default_interpolation;
        let targets = session.targets.clone();
        for node_id in targets {
            if !self.animations.contains_key(&node_id) {
                self.events
                    .dispatch(SchedulerEvent::AnimationAdded { node: node_id });
            }
            let node = scene.node(node_id);
            let euler = quat_to_euler_deg(&node.local.rotation);
            let set = self
                .animations
                .entry(node_id)
                .or_insert_with(|| AnimationSet::new(node_id));
            let samples = [
                (AnimProperty::PosX, node.local.position.x),
                (AnimProperty::PosY, node.local.position.y),
                (AnimProperty::PosZ, node.local.position.z),
                (AnimProperty::RotX, euler.x),
                (AnimProperty::RotY, euler.y),
                (AnimProperty::RotZ, euler.z),
                (AnimProperty::ScaleX, node.local.scale.x),
                (AnimProperty::ScaleY, node.local.scale.y),
                (AnimProperty::ScaleZ, node.local.scale.z),
            ];
            for (property, value) in samples {
                set.ensure_curve(property)
                    .append_key(frame, value, interpolation);
            }
            if let Some(light) = &node.light {
                set.ensure_curve(AnimProperty::LightIntensity).append_key(
                    frame,
                    light.intensity,
                    interpolation,
                );
            }
            if let Some(camera) = &node.camera {
                set.ensure_curve(AnimProperty::CameraFov).append_key(
                    frame,
                    camera.fov_deg,
                    interpolation,
                );
            }
        }
    }

    fn finish_recording(&mut self, scene: &mut SceneGraph, commands: &mut dyn CommandSink) {
        if let Some(saved) = self.saved_interpolation.take() {
            self.config.default_interpolation = saved;
        }
        if let Some(session) = self.recording.take() {
            let mut edits = Vec::new();
            for node in &session.targets {
                let before = session.before.get(node).cloned().flatten();
                let after = self.animations.get(node).cloned();
                if before != after {
                    edits.push(ReplaceAnimationEdit {
                        node: *node,
                        before,
                        after,
                    });
                }
            }
            if !edits.is_empty() {
                commands.submit("record animation", edits);
            }
        }
        self.set_state(SchedulerState::Stopped);
        self.evaluate_all(scene);
    }

    fn tick_video_output(&mut self, scene: &mut SceneGraph) {
        let next = self.current_frame + 1;
        if next > self.config.end_frame {
            self.set_state(SchedulerState::Stopped);
            return;
        }
        let frame = self.post_process_frame(next);
        self.apply_frame(frame, scene);
    }
}

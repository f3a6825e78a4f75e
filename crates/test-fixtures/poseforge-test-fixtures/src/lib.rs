//! Procedural fixtures shared by the solver tests and benches: a small rig
//! scene, keyed animation sets, and a command sink that records what it is
//! given.

use nalgebra::Vector3;
use poseforge_animation_core::{
    AnimationSet, CommandSink, Interpolation, ReplaceAnimationEdit,
};
use poseforge_api_core::{
    quat_to_euler_deg, AnimProperty, JointConfig, NodeId, SceneGraph, Transform,
};

/// Command sink that keeps every submission for inspection.
#[derive(Debug, Default)]
pub struct RecordingCommandSink {
    pub submissions: Vec<(String, Vec<ReplaceAnimationEdit>)>,
}

impl CommandSink for RecordingCommandSink {
    fn submit(&mut self, label: &str, edits: Vec<ReplaceAnimationEdit>) {
        self.submissions.push((label.to_string(), edits));
    }
}

/// Three-joint arm under a rig root. Each bone is one unit long along +y.
pub struct ArmRig {
    pub root: NodeId,
    pub shoulder: NodeId,
    pub elbow: NodeId,
    pub wrist: NodeId,
}

/// Build the arm with default (wide-open) joint limits and a stiffness of
/// 1.0 on every joint.
pub fn arm_scene() -> (SceneGraph, ArmRig) {
    let mut scene = SceneGraph::new();
    let root = scene.add_node("rig", None);
    scene.node_mut(root).rig_root = true;

    let shoulder = scene.add_node("shoulder", Some(root));
    scene.node_mut(shoulder).joint = Some(JointConfig::default());

    let elbow = scene.add_node("elbow", Some(shoulder));
    scene.node_mut(elbow).joint = Some(JointConfig::default());
    scene.node_mut(elbow).local.position = Vector3::new(0.0, 1.0, 0.0);

    let wrist = scene.add_node("wrist", Some(elbow));
    scene.node_mut(wrist).joint = Some(JointConfig::default());
    scene.node_mut(wrist).local.position = Vector3::new(0.0, 1.0, 0.0);

    (scene, ArmRig { root, shoulder, elbow, wrist })
}

/// Scene with a single free (non-rig) node at the root.
pub fn free_node_scene() -> (SceneGraph, NodeId) {
    let mut scene = SceneGraph::new();
    let node = scene.add_node("prop", None);
    (scene, node)
}

/// Animation set holding constant-value keys for all six pose channels of
/// `transform` at each of `frames`.
pub fn keyed_pose_set(node: NodeId, transform: &Transform, frames: &[i32]) -> AnimationSet {
    let mut set = AnimationSet::new(node);
    let euler = quat_to_euler_deg(&transform.rotation);
    let channels = [
        (AnimProperty::PosX, transform.position.x),
        (AnimProperty::PosY, transform.position.y),
        (AnimProperty::PosZ, transform.position.z),
        (AnimProperty::RotX, euler.x),
        (AnimProperty::RotY, euler.y),
        (AnimProperty::RotZ, euler.z),
    ];
    for (property, value) in channels {
        let curve = set.ensure_curve(property);
        for frame in frames {
            curve.add_key(*frame, value, Interpolation::Bezier);
        }
    }
    set
}

/// Animation set with a single keyed channel.
pub fn keyed_channel_set(
    node: NodeId,
    property: AnimProperty,
    keys: &[(i32, f32)],
) -> AnimationSet {
    let mut set = AnimationSet::new(node);
    let curve = set.ensure_curve(property);
    for (frame, value) in keys {
        curve.add_key(*frame, *value, Interpolation::Bezier);
    }
    set
}

//! One scalar degree of freedom of a rig joint and its numerically
//! differentiated effect on an end effector's root-relative pose.

use nalgebra::UnitQuaternion;
use poseforge_api_core::{
    pose_diff, quat_to_euler_deg, AnimProperty, NodeId, Pose, SceneGraph, Transform, POSE_DIM,
};

/// Finite-difference step: 1 degree for rotation channels, 1 native unit
/// for position channels. Deliberately coarse; the solver weights are tuned
/// against this step size.
pub const DEFAULT_DTHETA: f32 = 1.0;

/// Stateless descriptor of one solvable channel, rebuilt per manipulation
/// session and never persisted.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PoseProperty {
    pub owner: NodeId,
    pub end_effector: NodeId,
    pub channel: AnimProperty,
    pub dtheta: f32,
    /// 0 for the end effector's own channels, the configured per-joint value
    /// for ancestors.
    pub stiffness: f32,
    /// Delta-space bounds, zero-centered: a channel already outside its
    /// configured range can only move back toward it, and the null solve is
    /// always feasible.
    pub lower: f32,
    pub upper: f32,
}

impl PoseProperty {
    /// Build the degrees of freedom for the chain ending at `end_effector`:
    /// rotation channels for every joint, position channels for joints
    /// configured as translatable.
    pub fn collect(scene: &SceneGraph, end_effector: NodeId) -> Vec<PoseProperty> {
        let chain = scene.chain_to_rig_root(end_effector);
        let mut properties = Vec::new();
        for node in &chain {
            let Some(joint) = scene.node(*node).joint else {
                continue;
            };
            let stiffness = if *node == end_effector {
                0.0
            } else {
                joint.stiffness
            };
            let local = scene.node(*node).local;
            let euler = quat_to_euler_deg(&local.rotation);
            let rot_channels = [AnimProperty::RotX, AnimProperty::RotY, AnimProperty::RotZ];
            for (k, channel) in rot_channels.into_iter().enumerate() {
                properties.push(PoseProperty {
                    owner: *node,
                    end_effector,
                    channel,
                    dtheta: DEFAULT_DTHETA,
                    stiffness,
                    lower: (joint.rot_min[k] - euler[k]).min(0.0),
                    upper: (joint.rot_max[k] - euler[k]).max(0.0),
                });
            }
            if joint.translatable {
                let pos_channels = [AnimProperty::PosX, AnimProperty::PosY, AnimProperty::PosZ];
                for (k, channel) in pos_channels.into_iter().enumerate() {
                    properties.push(PoseProperty {
                        owner: *node,
                        end_effector,
                        channel,
                        dtheta: DEFAULT_DTHETA,
                        stiffness,
                        lower: (joint.pos_min[k] - local.position[k]).min(0.0),
                        upper: (joint.pos_max[k] - local.position[k]).max(0.0),
                    });
                }
            }
        }
        properties
    }

    /// Derivative of the end effector's root-relative pose with respect to a
    /// unit step of this channel: perturb, recompose the ancestor chain,
    /// sign-align the perturbed quaternion, difference, divide by the step.
    pub fn jacobian(&self, scene: &SceneGraph, chain: &[NodeId]) -> [f32; POSE_DIM] {
        let current = scene.pose_along(chain);
        let perturbed = chain.iter().fold(Pose::identity(), |acc, node| {
            let mut local = scene.node(*node).local;
            if *node == self.owner {
                apply_channel_delta(&mut local, self.channel, self.dtheta);
            }
            acc * local.pose()
        });
        let mut column = pose_diff(&current, &perturbed);
        for component in &mut column {
            *component /= self.dtheta;
        }
        column
    }
}

/// Apply a scalar delta to one pose channel of a local transform: rotation
/// channels compose via quaternion multiply about the channel axis,
/// position channels via vector add.
pub fn apply_channel_delta(transform: &mut Transform, channel: AnimProperty, delta: f32) {
    let Some(axis) = channel.axis() else {
        return;
    };
    if channel.is_rotation() {
        transform.rotation =
            transform.rotation * UnitQuaternion::from_axis_angle(&axis, delta.to_radians());
    } else if channel.is_position() {
        transform.position += axis.into_inner() * delta;
    }
}

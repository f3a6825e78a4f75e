//! Explicit scene graph: nodes own their children, parents are non-owning
//! back references used for traversal only. Rig chains stop below the first
//! ancestor flagged as a rig root.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::math::Pose;
use crate::transform::Transform;

/// Dense scene-node identifier; indices are allocated by the graph and stay
/// stable for its lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Externally configured per-joint limits and stiffness. Rotation limits are
/// Euler degrees, position limits native units. Defaults are wide open.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct JointConfig {
    pub rot_min: Vector3<f32>,
    pub rot_max: Vector3<f32>,
    pub pos_min: Vector3<f32>,
    pub pos_max: Vector3<f32>,
    /// Penalty on moving this joint when it is an ancestor of the grabbed
    /// end effector; 0 means free. Scaled against per-degree Jacobian
    /// magnitudes, so useful values sit around 1e-4..1e-2.
    pub stiffness: f32,
    /// Whether the pose solver may translate this joint.
    pub translatable: bool,
}

impl Default for JointConfig {
    fn default() -> Self {
        const WIDE: f32 = 1.0e6;
        Self {
            rot_min: Vector3::repeat(-WIDE),
            rot_max: Vector3::repeat(WIDE),
            pos_min: Vector3::repeat(-WIDE),
            pos_max: Vector3::repeat(WIDE),
            stiffness: 1e-3,
            translatable: false,
        }
    }
}

/// Light controller parameters; presence enables the light channels during
/// recording.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LightParams {
    pub intensity: f32,
}

/// Camera controller parameters; presence enables the camera channels during
/// recording.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraParams {
    pub fov_deg: f32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub local: Transform,
    pub joint: Option<JointConfig>,
    pub light: Option<LightParams>,
    pub camera: Option<CameraParams>,
    /// Chains built by `chain_to_rig_root` stop below this node.
    pub rig_root: bool,
    /// Operator-set pin; the pose solver keeps pinned joints in place.
    pub pinned: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SceneGraph {
    nodes: Vec<Node>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node under `parent` (or at the scene root) and return its id.
    pub fn add_node(&mut self, name: impl Into<String>, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            name: name.into(),
            parent,
            children: Vec::new(),
            local: Transform::identity(),
            joint: None,
            light: None,
            camera: None,
            rig_root: false,
            pinned: false,
        });
        if let Some(parent) = parent {
            self.nodes[parent.0 as usize].children.push(id);
        }
        id
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    #[inline]
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    /// Ancestor chain from just below the nearest rig root down to `id`
    /// (inclusive). Rebuilt on demand, so topology edits are picked up the
    /// next time a chain is requested.
    pub fn chain_to_rig_root(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = vec![id];
        let mut current = id;
        while let Some(parent) = self.node(current).parent {
            if self.node(parent).rig_root {
                break;
            }
            chain.push(parent);
            current = parent;
        }
        chain.reverse();
        chain
    }

    /// Nearest ancestor flagged as a rig root, if any.
    pub fn rig_root_of(&self, id: NodeId) -> Option<NodeId> {
        let mut current = id;
        while let Some(parent) = self.node(current).parent {
            if self.node(parent).rig_root {
                return Some(parent);
            }
            current = parent;
        }
        None
    }

    /// Pose of `id` composed through every ancestor.
    pub fn world_pose(&self, id: NodeId) -> Pose {
        let mut lineage = vec![id];
        let mut current = id;
        while let Some(parent) = self.node(current).parent {
            lineage.push(parent);
            current = parent;
        }
        lineage
            .iter()
            .rev()
            .fold(Pose::identity(), |acc, node| acc * self.node(*node).local.pose())
    }

    /// World pose of the nearest rig root ancestor, or identity when `id`
    /// does not belong to a rig.
    pub fn rig_root_pose(&self, id: NodeId) -> Pose {
        self.rig_root_of(id)
            .map(|root| self.world_pose(root))
            .unwrap_or_else(Pose::identity)
    }

    /// Compose the local poses along an ordered chain (root-most first).
    pub fn pose_along(&self, chain: &[NodeId]) -> Pose {
        chain
            .iter()
            .fold(Pose::identity(), |acc, node| acc * self.node(*node).local.pose())
    }
}

//! Shared surface for the poseforge crates: pose math, the TRS transform,
//! the animatable-property enum, and the scene graph the solvers walk.

pub mod math;
pub mod property;
pub mod scene;
pub mod transform;

pub use math::{
    align_quat, euler_deg_to_quat, pose_diff, pose_from, quat_to_euler_deg, shortest_delta_deg,
    Pose, POSE_DIM,
};
pub use property::AnimProperty;
pub use scene::{CameraParams, JointConfig, LightParams, Node, NodeId, SceneGraph};
pub use transform::Transform;

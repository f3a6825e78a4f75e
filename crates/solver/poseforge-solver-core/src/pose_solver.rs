//! Single-frame pose solve over a rig chain: turn a dragged end-effector
//! target into bounded joint deltas, apply them to the joint transforms,
//! and capture the result back into each joint's keyframes tangent-only.

use hashbrown::HashMap;
use log::{debug, warn};
use nalgebra::{DMatrix, DVector};
use poseforge_animation_core::AnimationSet;
use poseforge_api_core::{pose_diff, NodeId, Pose, SceneGraph, POSE_DIM};

use crate::error::SolveError;
use crate::pose_property::{apply_channel_delta, PoseProperty};
use crate::qp::{ActiveSetQp, QpProblem, QpSolver};
use crate::tangent_solver::TangentSolver;
use crate::weights::SolverWeights;

pub struct PoseSolver<S: QpSolver = ActiveSetQp> {
    pub weights: SolverWeights,
    qp: S,
}

impl Default for PoseSolver {
    fn default() -> Self {
        Self {
            weights: SolverWeights::default(),
            qp: ActiveSetQp::default(),
        }
    }
}

impl<S: QpSolver> PoseSolver<S> {
    pub fn with_solver(qp: S, weights: SolverWeights) -> Self {
        Self { weights, qp }
    }

    /// Drive `end_effector` toward `target` (root-relative) at `frame`.
    ///
    /// On success every solved channel delta is applied to its owner
    /// joint's local transform and the new per-joint poses are captured
    /// into keyframe tangents at the bracketing pair (no new keys). Joints
    /// without animation data or bracketing keys are tolerated and skipped
    /// by the capture. Any failure before application leaves scene and
    /// curves untouched.
    #[allow(clippy::too_many_arguments)]
    pub fn solve(
        &self,
        scene: &mut SceneGraph,
        animations: &mut HashMap<NodeId, AnimationSet>,
        end_effector: NodeId,
        target: &Pose,
        frame: i32,
        zone: (i32, i32),
        tangent: &TangentSolver,
    ) -> Result<(), SolveError> {
        let (start, end) = zone;
        if start > end || frame < start || frame > end {
            return Err(SolveError::FrameOutsideZone { frame, start, end });
        }

        let chain = scene.chain_to_rig_root(end_effector);
        let properties = PoseProperty::collect(scene, end_effector);
        if properties.is_empty() {
            return Err(SolveError::NoDegreesOfFreedom);
        }

        let dim = properties.len();
        let mut jacobian = DMatrix::<f32>::zeros(POSE_DIM, dim);
        for (i, property) in properties.iter().enumerate() {
            let column = property.jacobian(scene, &chain);
            for (row, component) in column.iter().enumerate() {
                jacobian[(row, i)] = *component;
            }
        }

        let current = scene.pose_along(&chain);
        let residual = DVector::from_row_slice(&pose_diff(&current, target));

        let mut q = jacobian.transpose() * &jacobian * self.weights.motion;
        for (i, property) in properties.iter().enumerate() {
            q[(i, i)] += property.stiffness + self.weights.regularization;
        }
        let b = jacobian.transpose() * residual * -self.weights.motion;

        let lower = DVector::from_iterator(dim, properties.iter().map(|p| p.lower));
        let upper = DVector::from_iterator(dim, properties.iter().map(|p| p.upper));
        let equality = locked_constraints(scene, end_effector, &properties);

        let problem = QpProblem {
            q,
            b,
            lower,
            upper,
            equality,
        };
        let solution = self.qp.solve(&problem)?;

        debug!(
            "pose solve: {dim} degrees of freedom, frame {frame}, chain of {}",
            chain.len()
        );

        // Apply incrementally per channel, then capture the new local poses
        // into the curves.
        for (i, property) in properties.iter().enumerate() {
            apply_channel_delta(
                &mut scene.node_mut(property.owner).local,
                property.channel,
                solution[i],
            );
        }

        let mut owners: Vec<NodeId> = properties.iter().map(|p| p.owner).collect();
        owners.dedup();
        for owner in owners {
            if !animations.contains_key(&owner) {
                continue;
            }
            let target_local = scene.node(owner).local.pose();
            let single = [owner];
            match tangent.solve(
                scene,
                animations,
                owner,
                &single,
                &single,
                &target_local,
                frame,
                zone,
            ) {
                Ok(()) => {}
                Err(SolveError::NoBracketingKeys { .. }) => {
                    debug!("pose capture skipped for joint {owner:?}: no bracketing keys");
                }
                Err(err) => {
                    warn!("pose capture failed for joint {owner:?}: {err}");
                }
            }
        }
        Ok(())
    }
}

/// Equality blocks for pinned joints in the same rig: each contributes its
/// own 7-row Jacobian so the solve holds it in place. A terminal (leaf)
/// pinned joint is a rotation-only lock; its translational rows are zeroed.
fn locked_constraints(
    scene: &SceneGraph,
    end_effector: NodeId,
    properties: &[PoseProperty],
) -> Option<DMatrix<f32>> {
    let rig_root = scene.rig_root_of(end_effector)?;
    let locked: Vec<NodeId> = scene
        .iter_ids()
        .filter(|id| {
            *id != end_effector
                && scene.node(*id).pinned
                && scene.rig_root_of(*id) == Some(rig_root)
        })
        .collect();
    if locked.is_empty() {
        return None;
    }

    let dim = properties.len();
    let mut constraints = DMatrix::<f32>::zeros(locked.len() * POSE_DIM, dim);
    for (li, lock) in locked.iter().enumerate() {
        let lock_chain = scene.chain_to_rig_root(*lock);
        let rotation_only = scene.node(*lock).children.is_empty();
        for (pi, property) in properties.iter().enumerate() {
            if !lock_chain.contains(&property.owner) {
                continue;
            }
            let column = PoseProperty {
                end_effector: *lock,
                ..*property
            }
            .jacobian(scene, &lock_chain);
            for (row, component) in column.iter().enumerate() {
                if rotation_only && row < 3 {
                    continue;
                }
                constraints[(li * POSE_DIM + row, pi)] = *component;
            }
        }
    }
    Some(constraints)
}

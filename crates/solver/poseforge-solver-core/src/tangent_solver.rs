//! Back-solve keyframe tangents so a node's curves meet a dragged pose at
//! the manipulated frame without breaking curve continuity.
//!
//! Unknowns are 8 tangent scalars per affected property per affected node:
//! `[prev.in.x, prev.in.y, prev.out.x, prev.out.y,
//!   next.in.x, next.in.y, next.out.x, next.out.y]`.
//! The continuity matrix pairs each out-tangent scalar with the in-tangent
//! scalar two positions earlier in its block, so symmetric handles move
//! together and the curve stays smooth across the edited zone.

use hashbrown::HashMap;
use log::debug;
use nalgebra::{DMatrix, DVector, Vector3};
use poseforge_animation_core::{
    apply_tangent_delta, segment_value, AnimationKey, AnimationSet, Vec2,
};
use poseforge_api_core::{
    euler_deg_to_quat, pose_diff, pose_from, quat_to_euler_deg, AnimProperty, NodeId, Pose,
    SceneGraph, POSE_DIM,
};

use crate::error::SolveError;
use crate::qp::{ActiveSetQp, QpProblem, QpSolver};
use crate::weights::SolverWeights;

const SCALARS_PER_BLOCK: usize = 8;
/// Tangent unknowns are effectively unconstrained; the box only exists
/// because the program is a bounded QP.
const TANGENT_LIMIT: f32 = 1.0e4;

/// Local pose of one chain node expressed as its solvable channel values;
/// perturbations swap a single channel and recompose.
#[derive(Clone, Copy, Debug)]
struct LocalChannels {
    position: Vector3<f32>,
    euler_deg: Vector3<f32>,
}

impl LocalChannels {
    fn gather(
        scene: &SceneGraph,
        set: Option<&AnimationSet>,
        node: NodeId,
        frame: i32,
    ) -> Self {
        let fallback = scene.node(node).local;
        let mut channels = Self {
            position: fallback.position,
            euler_deg: quat_to_euler_deg(&fallback.rotation),
        };
        if let Some(set) = set {
            let position = [AnimProperty::PosX, AnimProperty::PosY, AnimProperty::PosZ];
            for (k, property) in position.into_iter().enumerate() {
                if let Some(value) = set.curve(property).and_then(|c| c.evaluate(frame)) {
                    channels.position[k] = value;
                }
            }
            let rotation = [AnimProperty::RotX, AnimProperty::RotY, AnimProperty::RotZ];
            for (k, property) in rotation.into_iter().enumerate() {
                if let Some(value) = set.curve(property).and_then(|c| c.evaluate(frame)) {
                    channels.euler_deg[k] = value;
                }
            }
        }
        channels
    }

    fn channel_index(property: AnimProperty) -> usize {
        property.index() % 3
    }

    fn set_channel(&mut self, property: AnimProperty, value: f32) {
        let k = Self::channel_index(property);
        if property.is_position() {
            self.position[k] = value;
        } else if property.is_rotation() {
            self.euler_deg[k] = value;
        }
    }

    fn with_channel(mut self, property: AnimProperty, value: f32) -> Self {
        self.set_channel(property, value);
        self
    }

    fn channel_value(&self, property: AnimProperty) -> f32 {
        let k = Self::channel_index(property);
        if property.is_position() {
            self.position[k]
        } else {
            self.euler_deg[k]
        }
    }

    fn pose(&self) -> Pose {
        pose_from(self.position, euler_deg_to_quat(self.euler_deg))
    }
}

/// One 8-scalar unknown block: a (node, property) pair and its edited key
/// indices.
struct Block {
    node: NodeId,
    property: AnimProperty,
    left: usize,
    right: usize,
    left_key: AnimationKey,
    right_key: AnimationKey,
}

fn perturb_keys(
    a: &AnimationKey,
    b: &AnimationKey,
    scalar: usize,
    delta: f32,
) -> (AnimationKey, AnimationKey) {
    let mut a = *a;
    let mut b = *b;
    match scalar {
        0 => a.in_tangent.x += delta,
        1 => a.in_tangent.y += delta,
        2 => a.out_tangent.x += delta,
        3 => a.out_tangent.y += delta,
        4 => b.in_tangent.x += delta,
        5 => b.in_tangent.y += delta,
        6 => b.out_tangent.x += delta,
        7 => b.out_tangent.y += delta,
        _ => unreachable!("tangent blocks have {SCALARS_PER_BLOCK} scalars"),
    }
    (a, b)
}

pub struct TangentSolver<S: QpSolver = ActiveSetQp> {
    pub weights: SolverWeights,
    /// Finite-difference step through the curve evaluator.
    pub dtheta: f32,
    qp: S,
}

impl Default for TangentSolver {
    fn default() -> Self {
        Self {
            weights: SolverWeights::default(),
            dtheta: 1.0,
            qp: ActiveSetQp::default(),
        }
    }
}

impl<S: QpSolver> TangentSolver<S> {
    pub fn with_solver(qp: S, weights: SolverWeights, dtheta: f32) -> Self {
        Self {
            weights,
            dtheta,
            qp,
        }
    }

    /// Solve the tangents of every `affected` node so that `manipulated`'s
    /// root-relative pose at `frame` (composed along `chain`) approaches
    /// `target`. For a free node, `chain` and `affected` are both just the
    /// node, and `target` is its desired local pose.
    ///
    /// Nothing is mutated unless the whole solve succeeds.
    #[allow(clippy::too_many_arguments)]
    pub fn solve(
        &self,
        scene: &SceneGraph,
        animations: &mut HashMap<NodeId, AnimationSet>,
        manipulated: NodeId,
        chain: &[NodeId],
        affected: &[NodeId],
        target: &Pose,
        frame: i32,
        zone: (i32, i32),
    ) -> Result<(), SolveError> {
        let (start, end) = zone;
        if start > end || frame < start || frame > end {
            return Err(SolveError::FrameOutsideZone { frame, start, end });
        }
        if !chain.contains(&manipulated) || affected.iter().any(|node| !chain.contains(node)) {
            return Err(SolveError::ChannelMismatch);
        }

        let blocks = gather_blocks(animations, affected, frame, start, end);
        if blocks.is_empty() {
            return Err(SolveError::NoBracketingKeys { frame });
        }

        // Current local pose channels per chain node. Blocked channels use
        // the zone segment as the curve model so the Jacobian, the residual,
        // and the write-back all agree.
        let mut locals: Vec<LocalChannels> = chain
            .iter()
            .map(|node| LocalChannels::gather(scene, animations.get(node), *node, frame))
            .collect();
        for block in &blocks {
            if let Some(index) = chain.iter().position(|n| *n == block.node) {
                locals[index].set_channel(
                    block.property,
                    segment_value(&block.left_key, &block.right_key, frame),
                );
            }
        }
        let current_pose = compose(&locals, None);

        let dim = blocks.len() * SCALARS_PER_BLOCK;
        let mut jacobian = DMatrix::<f32>::zeros(POSE_DIM, dim);
        for (bi, block) in blocks.iter().enumerate() {
            let Some(ci) = chain.iter().position(|n| *n == block.node) else {
                return Err(SolveError::ChannelMismatch);
            };
            let base = locals[ci].channel_value(block.property);
            for scalar in 0..SCALARS_PER_BLOCK {
                let (a, b) = perturb_keys(&block.left_key, &block.right_key, scalar, self.dtheta);
                let value = segment_value(&a, &b, frame);
                if (value - base).abs() == 0.0 {
                    continue;
                }
                let substituted = locals[ci].with_channel(block.property, value);
                let pose = compose(&locals, Some((ci, substituted)));
                let column = pose_diff(&current_pose, &pose);
                for (row, component) in column.iter().enumerate() {
                    jacobian[(row, bi * SCALARS_PER_BLOCK + scalar)] = component / self.dtheta;
                }
            }
        }

        let residual = DVector::from_row_slice(&pose_diff(&current_pose, target));
        let continuity = continuity_matrix(blocks.len());

        let mut q = jacobian.transpose() * &jacobian * self.weights.motion;
        q += continuity.transpose() * &continuity * self.weights.bending;
        for i in 0..dim {
            q[(i, i)] += self.weights.regularization;
        }
        let b = jacobian.transpose() * residual * -self.weights.motion;

        let problem = QpProblem {
            q,
            b,
            lower: DVector::from_element(dim, -TANGENT_LIMIT),
            upper: DVector::from_element(dim, TANGENT_LIMIT),
            equality: None,
        };
        let solution = self.qp.solve(&problem)?;

        debug!(
            "tangent solve: {} blocks, frame {frame}, zone [{start}, {end}]",
            blocks.len()
        );

        // All-or-nothing write-back: deltas land in the two edited keys per
        // block and the cache refreshes at exactly those indices.
        for (bi, block) in blocks.iter().enumerate() {
            let base = bi * SCALARS_PER_BLOCK;
            let Some(curve) = animations
                .get_mut(&block.node)
                .and_then(|set| set.curve_mut(block.property))
            else {
                continue;
            };
            apply_tangent_delta(
                curve,
                block.left,
                Vec2::new(solution[base], solution[base + 1]),
                Vec2::new(solution[base + 2], solution[base + 3]),
            );
            apply_tangent_delta(
                curve,
                block.right,
                Vec2::new(solution[base + 4], solution[base + 5]),
                Vec2::new(solution[base + 6], solution[base + 7]),
            );
        }
        Ok(())
    }
}

fn gather_blocks(
    animations: &HashMap<NodeId, AnimationSet>,
    affected: &[NodeId],
    frame: i32,
    start: i32,
    end: i32,
) -> Vec<Block> {
    let mut blocks = Vec::new();
    for node in affected {
        let Some(set) = animations.get(node) else {
            continue;
        };
        for property in AnimProperty::POSE {
            let Some(curve) = set.curve(property) else {
                continue;
            };
            let Some((left, right)) = curve.zone_pair(start, end) else {
                continue;
            };
            let keys = curve.keys();
            debug_assert!(keys[left].frame <= frame && frame <= keys[right].frame);
            blocks.push(Block {
                node: *node,
                property,
                left,
                right,
                left_key: keys[left],
                right_key: keys[right],
            });
        }
    }
    blocks
}

/// Compose the chain pose from per-node channel values, optionally
/// substituting one node's channels.
fn compose(locals: &[LocalChannels], substitute: Option<(usize, LocalChannels)>) -> Pose {
    locals
        .iter()
        .enumerate()
        .fold(Pose::identity(), |acc, (index, channels)| {
            let channels = match substitute {
                Some((si, substituted)) if si == index => substituted,
                _ => *channels,
            };
            acc * channels.pose()
        })
}

/// Rows pair each out-tangent scalar (+1) with its in-tangent partner two
/// positions earlier (-1), per key, per block.
fn continuity_matrix(blocks: usize) -> DMatrix<f32> {
    let mut t = DMatrix::<f32>::zeros(blocks * 4, blocks * SCALARS_PER_BLOCK);
    for block in 0..blocks {
        let base = block * SCALARS_PER_BLOCK;
        for (row, in_scalar) in [0usize, 1, 4, 5].into_iter().enumerate() {
            let out_scalar = in_scalar + 2;
            t[(block * 4 + row, base + out_scalar)] = 1.0;
            t[(block * 4 + row, base + in_scalar)] = -1.0;
        }
    }
    t
}

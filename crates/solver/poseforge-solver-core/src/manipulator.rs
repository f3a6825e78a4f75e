//! Curve-manipulation session: grab a node, drag a pointer, and either
//! commit the resulting curve edits through the command collaborator or
//! restore the pre-grab state. One session at a time; a session owns the
//! working copies of the affected nodes' animation sets for its duration.

use log::debug;
use poseforge_animation_core::{
    AnimationSet, CommandSink, ReplaceAnimationEdit, Scheduler, SchedulerEvent,
};
use poseforge_api_core::{NodeId, Pose, SceneGraph, Transform};

use crate::error::SolveError;
use crate::pose_solver::PoseSolver;
use crate::tangent_solver::TangentSolver;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrabKind {
    /// Single object animated in place; tangents of its own curves absorb
    /// the drag.
    FreeNode,
    /// Joint of a rig chain; the pose solver distributes the drag across
    /// ancestors.
    RigJoint,
}

struct Session {
    node: NodeId,
    kind: GrabKind,
    /// Ancestor chain from below the rig root down to the node; just the
    /// node itself for free grabs.
    chain: Vec<NodeId>,
    /// An explicit `[start, end]` selection was active at grab time; rig
    /// drags then edit tangents across the zone instead of pose-solving.
    explicit_zone: bool,
    /// Nodes whose animation sets may be edited.
    affected: Vec<NodeId>,
    /// Pre-grab animation state, restored on cancel.
    snapshots: Vec<(NodeId, Option<AnimationSet>)>,
    /// Pre-grab local transforms of the touched chain, restored on cancel.
    local_snapshots: Vec<(NodeId, Transform)>,
    pointer_start: Pose,
    node_start_world: Pose,
    zone: (i32, i32),
    frame: i32,
    steps: u32,
    dirty: bool,
}

pub struct CurveManipulator {
    session: Option<Session>,
    pub tangent: TangentSolver,
    pub pose: PoseSolver,
}

impl Default for CurveManipulator {
    fn default() -> Self {
        Self {
            session: None,
            tangent: TangentSolver::default(),
            pose: PoseSolver::default(),
        }
    }
}

impl CurveManipulator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    #[inline]
    pub fn grabbed_node(&self) -> Option<NodeId> {
        self.session.as_ref().map(|s| s.node)
    }

    /// Number of drag steps performed in the open session.
    #[inline]
    pub fn drag_steps(&self) -> u32 {
        self.session.as_ref().map_or(0, |s| s.steps)
    }

    /// Open a session on `node`. `zone` selects an explicit `[start, end]`
    /// span; without it the session edits the keyframe pair bracketing the
    /// current frame. Rig joints additionally snapshot up to two ancestor
    /// animation sets.
    pub fn grab(
        &mut self,
        scene: &SceneGraph,
        scheduler: &Scheduler,
        node: NodeId,
        pointer: &Pose,
        zone: Option<(i32, i32)>,
    ) -> Result<(), SolveError> {
        if self.session.is_some() {
            return Err(SolveError::SessionActive);
        }

        let kind = if scene.node(node).joint.is_some() && scene.rig_root_of(node).is_some() {
            GrabKind::RigJoint
        } else {
            GrabKind::FreeNode
        };

        let frame = scheduler.current_frame();
        let explicit_zone = zone.is_some();
        let zone = zone.unwrap_or((frame, frame));
        if zone.0 > zone.1 || frame < zone.0 || frame > zone.1 {
            return Err(SolveError::FrameOutsideZone {
                frame,
                start: zone.0,
                end: zone.1,
            });
        }

        let mut affected = vec![node];
        let chain = match kind {
            GrabKind::RigJoint => {
                let chain = scene.chain_to_rig_root(node);
                // Up to two nearest ancestors join the edit.
                for ancestor in chain.iter().rev().skip(1).take(2) {
                    affected.push(*ancestor);
                }
                chain
            }
            GrabKind::FreeNode => vec![node],
        };

        let snapshots = affected
            .iter()
            .map(|n| (*n, scheduler.animation(*n).cloned()))
            .collect();
        let local_snapshots = chain
            .iter()
            .map(|n| (*n, scene.node(*n).local))
            .collect();

        debug!("grab {:?} ({kind:?}), frame {frame}, zone {zone:?}", node);
        self.session = Some(Session {
            node,
            kind,
            chain,
            explicit_zone,
            affected,
            snapshots,
            local_snapshots,
            pointer_start: *pointer,
            node_start_world: scene.world_pose(node),
            zone,
            frame,
            steps: 0,
            dirty: false,
        });
        Ok(())
    }

    /// One interaction step: read the pointer, derive the target pose, run
    /// the matching solver, and refresh the scene. Hot path; invoked once
    /// per tick while the session is open. A failed step edits nothing and
    /// keeps the session alive.
    pub fn drag(
        &mut self,
        scene: &mut SceneGraph,
        scheduler: &mut Scheduler,
        pointer: &Pose,
    ) -> Result<(), SolveError> {
        let Some(session) = self.session.as_mut() else {
            return Err(SolveError::NoSession);
        };
        session.steps += 1;

        let delta = pointer * session.pointer_start.inverse();
        let target_world = delta * session.node_start_world;

        let result = match session.kind {
            GrabKind::FreeNode => {
                let parent_world = scene
                    .node(session.node)
                    .parent
                    .map(|parent| scene.world_pose(parent))
                    .unwrap_or_else(Pose::identity);
                let target_local = parent_world.inverse() * target_world;
                let chain = [session.node];
                self.tangent.solve(
                    scene,
                    scheduler.animations_mut(),
                    session.node,
                    &chain,
                    &chain,
                    &target_local,
                    session.frame,
                    session.zone,
                )
            }
            GrabKind::RigJoint => {
                let target_root_relative =
                    scene.rig_root_pose(session.node).inverse() * target_world;
                if session.explicit_zone {
                    // Zone edit: reshape the chain's curves across the
                    // selection instead of re-posing the joints.
                    self.tangent.solve(
                        scene,
                        scheduler.animations_mut(),
                        session.node,
                        &session.chain,
                        &session.affected,
                        &target_root_relative,
                        session.frame,
                        session.zone,
                    )
                } else {
                    self.pose.solve(
                        scene,
                        scheduler.animations_mut(),
                        session.node,
                        &target_root_relative,
                        session.frame,
                        session.zone,
                        &self.tangent,
                    )
                }
            }
        };

        match result {
            Ok(()) => {
                session.dirty = true;
                let affected = session.affected.clone();
                scheduler.evaluate_all(scene);
                for node in affected {
                    scheduler.notify(SchedulerEvent::CurveChanged { node });
                }
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Close the session. When any drag step solved successfully the edits
    /// stay live and one grouped undoable edit per changed node goes to the
    /// command collaborator; otherwise the pre-grab state is restored.
    pub fn release(
        &mut self,
        scene: &mut SceneGraph,
        scheduler: &mut Scheduler,
        commands: &mut dyn CommandSink,
    ) -> Result<(), SolveError> {
        let session = self.session.take().ok_or(SolveError::NoSession)?;
        if session.dirty {
            let mut edits = Vec::new();
            for (node, before) in &session.snapshots {
                let after = scheduler.animation(*node).cloned();
                if *before != after {
                    edits.push(ReplaceAnimationEdit {
                        node: *node,
                        before: before.clone(),
                        after,
                    });
                }
            }
            debug!("release: committing {} edits", edits.len());
            if !edits.is_empty() {
                commands.submit("manipulate animation", edits);
            }
        } else {
            debug!("release: no valid solve, restoring snapshots");
            restore(scene, scheduler, &session);
        }
        Ok(())
    }

    /// Abandon the session and restore the pre-grab state. After cancel the
    /// affected animation sets compare equal to what they were at grab
    /// time.
    pub fn cancel(
        &mut self,
        scene: &mut SceneGraph,
        scheduler: &mut Scheduler,
    ) -> Result<(), SolveError> {
        let session = self.session.take().ok_or(SolveError::NoSession)?;
        debug!("cancel: restoring {} snapshots", session.snapshots.len());
        restore(scene, scheduler, &session);
        Ok(())
    }
}

fn restore(scene: &mut SceneGraph, scheduler: &mut Scheduler, session: &Session) {
    for (node, before) in &session.snapshots {
        scheduler.replace_animation(*node, before.clone());
    }
    for (node, local) in &session.local_snapshots {
        scene.node_mut(*node).local = *local;
    }
    scheduler.evaluate_all(scene);
}

//! Interface to the external command/undo collaborator. The core never
//! implements undo; it hands over before/after snapshots, one edit per
//! node, grouped per gesture.

use poseforge_api_core::NodeId;

use crate::set::AnimationSet;

/// Replace one node's animation data; `None` on either side means "no
/// animation".
#[derive(Clone, Debug, PartialEq)]
pub struct ReplaceAnimationEdit {
    pub node: NodeId,
    pub before: Option<AnimationSet>,
    pub after: Option<AnimationSet>,
}

pub trait CommandSink {
    /// Accept one grouped, undoable set of edits.
    fn submit(&mut self, label: &str, edits: Vec<ReplaceAnimationEdit>);
}

/// Sink that discards every edit; hosts without an undo stack can pass it.
#[derive(Debug, Default)]
pub struct NullCommandSink;

impl CommandSink for NullCommandSink {
    fn submit(&mut self, _label: &str, _edits: Vec<ReplaceAnimationEdit>) {}
}

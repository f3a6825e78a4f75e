//! Animation core for poseforge: keyframe curves with evaluation caches,
//! per-node animation sets, and the playback/recording scheduler.

pub mod command;
pub mod curve;
pub mod error;
pub mod events;
pub mod key;
pub mod scheduler;
pub mod set;

pub use command::{CommandSink, NullCommandSink, ReplaceAnimationEdit};
pub use curve::{apply_tangent_delta, segment_value, Curve};
pub use error::AnimError;
pub use events::{CollectingObserver, EventDispatcher, SchedulerEvent, SchedulerObserver};
pub use key::{AnimationKey, Interpolation, Vec2};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerState, TimeHook};
pub use set::{AnimationSet, ExtraSample};

/// Animation core result type.
pub type Result<T> = core::result::Result<T, AnimError>;

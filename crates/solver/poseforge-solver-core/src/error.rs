//! Error types for the solver core. Every failure is locally recoverable:
//! a failed solve leaves the curves and the scene untouched.

use poseforge_animation_core::AnimError;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum SolveError {
    /// The manipulated frame does not lie inside the selected zone, or the
    /// zone frames are inverted.
    #[error("frame {frame} is outside the solve zone [{start}, {end}]")]
    FrameOutsideZone { frame: i32, start: i32, end: i32 },

    /// No curve offers a keyframe pair around the manipulated frame.
    #[error("no keyframe pair brackets frame {frame}")]
    NoBracketingKeys { frame: i32 },

    /// A degree of freedom references a node outside the manipulated chain.
    #[error("degree of freedom owner is not part of the manipulated chain")]
    ChannelMismatch,

    /// The chain exposes nothing the solver may move.
    #[error("chain has no solvable degrees of freedom")]
    NoDegreesOfFreedom,

    /// The quadratic program is malformed (dimensions, bounds, diagonal).
    #[error("ill-formed quadratic program: {reason}")]
    BadProgram { reason: String },

    /// The solve produced a NaN or infinity; the result is rejected
    /// wholesale.
    #[error("solve produced a non-finite component")]
    NonFiniteSolution,

    /// A manipulation session is already open.
    #[error("a manipulation session is already active")]
    SessionActive,

    /// No manipulation session is open.
    #[error("no manipulation session is active")]
    NoSession,

    #[error(transparent)]
    Anim(#[from] AnimError),
}

//! Solver core for poseforge: the Jacobian model over pose degrees of
//! freedom, the bounded quadratic programs that back-solve keyframe
//! tangents and joint poses from a dragged 3D target, and the manipulation
//! session that drives them.

pub mod error;
pub mod manipulator;
pub mod pose_property;
pub mod pose_solver;
pub mod qp;
pub mod tangent_solver;
pub mod weights;

pub use error::SolveError;
pub use manipulator::{CurveManipulator, GrabKind};
pub use pose_property::{apply_channel_delta, PoseProperty, DEFAULT_DTHETA};
pub use pose_solver::PoseSolver;
pub use qp::{ActiveSetQp, QpProblem, QpSolver};
pub use tangent_solver::TangentSolver;
pub use weights::SolverWeights;

/// Solver core result type.
pub type Result<T> = core::result::Result<T, SolveError>;

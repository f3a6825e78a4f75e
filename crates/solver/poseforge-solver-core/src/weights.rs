use serde::{Deserialize, Serialize};

/// Objective weights shared by the tangent and pose solvers.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SolverWeights {
    /// Weight on reaching the drag target.
    pub motion: f32,
    /// Weight on the damping term. The damping matrix is currently zero;
    /// the weight is kept so tuning data stays forward-compatible.
    pub damping: f32,
    /// Weight on tangent continuity; the smoothness-vs-responsiveness knob.
    pub bending: f32,
    /// Small diagonal term keeping the program positive-definite in
    /// degenerate configurations.
    pub regularization: f32,
}

impl Default for SolverWeights {
    fn default() -> Self {
        Self {
            motion: 1.0,
            damping: 0.0,
            bending: 10.0,
            regularization: 1e-6,
        }
    }
}

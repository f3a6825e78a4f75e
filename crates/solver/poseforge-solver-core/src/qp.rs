//! Bounded convex quadratic programs. The solvers assemble a
//! [`QpProblem`] and hand it to any [`QpSolver`]; the numerical method is a
//! collaborator behind the trait, not something the callers depend on.

use nalgebra::{Cholesky, DMatrix, DVector};

use crate::error::SolveError;

/// Minimize `½ xᵀQx + bᵀx` subject to `lower ≤ x ≤ upper` and, when
/// present, `Cx = 0`.
#[derive(Clone, Debug)]
pub struct QpProblem {
    pub q: DMatrix<f32>,
    pub b: DVector<f32>,
    pub lower: DVector<f32>,
    pub upper: DVector<f32>,
    /// Homogeneous equality constraints, one row per constrained component.
    pub equality: Option<DMatrix<f32>>,
}

impl QpProblem {
    #[inline]
    pub fn dim(&self) -> usize {
        self.b.len()
    }

    fn validate(&self) -> Result<(), SolveError> {
        let n = self.dim();
        if self.q.nrows() != n || self.q.ncols() != n {
            return Err(SolveError::BadProgram {
                reason: format!("Q is {}x{}, expected {n}x{n}", self.q.nrows(), self.q.ncols()),
            });
        }
        if self.lower.len() != n || self.upper.len() != n {
            return Err(SolveError::BadProgram {
                reason: "bound dimension mismatch".into(),
            });
        }
        for i in 0..n {
            if self.lower[i] > self.upper[i] {
                return Err(SolveError::BadProgram {
                    reason: format!("empty bound interval at component {i}"),
                });
            }
        }
        if let Some(c) = &self.equality {
            if c.ncols() != n {
                return Err(SolveError::BadProgram {
                    reason: "equality constraint dimension mismatch".into(),
                });
            }
        }
        Ok(())
    }
}

pub trait QpSolver {
    fn solve(&self, problem: &QpProblem) -> Result<DVector<f32>, SolveError>;
}

/// Primal active-set method: solve the free subsystem directly (Cholesky),
/// clamp newly violated bounds, release clamps whose multiplier has the
/// wrong sign, repeat. Exact on the small, regularized programs the
/// manipulation solvers produce, including the stiffly coupled continuity
/// terms an iterative sweep would creep through. Equality constraints are
/// folded in as a stiff quadratic penalty, which keeps the working matrix
/// positive definite.
#[derive(Clone, Copy, Debug)]
pub struct ActiveSetQp {
    pub max_iterations: usize,
    pub equality_weight: f32,
}

impl Default for ActiveSetQp {
    fn default() -> Self {
        Self {
            max_iterations: 32,
            equality_weight: 1e4,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Clamp {
    Free,
    Lower,
    Upper,
}

const BOUND_TOL: f32 = 1e-6;

impl QpSolver for ActiveSetQp {
    fn solve(&self, problem: &QpProblem) -> Result<DVector<f32>, SolveError> {
        problem.validate()?;
        let n = problem.dim();

        let mut q = problem.q.clone();
        if let Some(c) = &problem.equality {
            q += c.transpose() * c * self.equality_weight;
        }

        let mut clamps = vec![Clamp::Free; n];
        let mut x = DVector::<f32>::zeros(n);

        for _ in 0..self.max_iterations {
            for i in 0..n {
                x[i] = match clamps[i] {
                    Clamp::Lower => problem.lower[i],
                    Clamp::Upper => problem.upper[i],
                    Clamp::Free => 0.0,
                };
            }

            let free: Vec<usize> = (0..n).filter(|i| clamps[*i] == Clamp::Free).collect();
            if !free.is_empty() {
                let m = free.len();
                let mut q_ff = DMatrix::<f32>::zeros(m, m);
                let mut rhs = DVector::<f32>::zeros(m);
                for (row, i) in free.iter().enumerate() {
                    rhs[row] = -problem.b[*i];
                    for (col, j) in free.iter().enumerate() {
                        q_ff[(row, col)] = q[(*i, *j)];
                    }
                    for j in 0..n {
                        if clamps[j] != Clamp::Free {
                            rhs[row] -= q[(*i, j)] * x[j];
                        }
                    }
                }
                let factorization = Cholesky::new(q_ff).ok_or_else(|| SolveError::BadProgram {
                    reason: "quadratic term is not positive definite".into(),
                })?;
                let x_free = factorization.solve(&rhs);
                for (row, i) in free.iter().enumerate() {
                    x[*i] = x_free[row];
                }
            }

            // Clamp coordinates that left their box.
            let mut changed = false;
            for i in 0..n {
                if clamps[i] == Clamp::Free {
                    if x[i] < problem.lower[i] - BOUND_TOL {
                        clamps[i] = Clamp::Lower;
                        changed = true;
                    } else if x[i] > problem.upper[i] + BOUND_TOL {
                        clamps[i] = Clamp::Upper;
                        changed = true;
                    }
                }
            }
            if changed {
                continue;
            }

            // Release clamps pulling against their bound.
            let gradient = &q * &x + &problem.b;
            for i in 0..n {
                match clamps[i] {
                    Clamp::Lower if gradient[i] < -BOUND_TOL => {
                        clamps[i] = Clamp::Free;
                        changed = true;
                    }
                    Clamp::Upper if gradient[i] > BOUND_TOL => {
                        clamps[i] = Clamp::Free;
                        changed = true;
                    }
                    _ => {}
                }
            }
            if !changed {
                break;
            }
        }

        for i in 0..n {
            x[i] = x[i].clamp(problem.lower[i], problem.upper[i]);
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(SolveError::NonFiniteSolution);
        }
        Ok(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn wide_bounds(n: usize) -> (DVector<f32>, DVector<f32>) {
        (
            DVector::from_element(n, -1.0e6),
            DVector::from_element(n, 1.0e6),
        )
    }

    #[test]
    fn recovers_unconstrained_minimum() {
        // ½ xᵀ(2I)x + (-2, -4)ᵀx has its minimum at (1, 2).
        let (lower, upper) = wide_bounds(2);
        let problem = QpProblem {
            q: DMatrix::from_diagonal_element(2, 2, 2.0),
            b: DVector::from_vec(vec![-2.0, -4.0]),
            lower,
            upper,
            equality: None,
        };
        let x = ActiveSetQp::default().solve(&problem).unwrap();
        assert_relative_eq!(x[0], 1.0, epsilon = 1e-4);
        assert_relative_eq!(x[1], 2.0, epsilon = 1e-4);
    }

    #[test]
    fn bounds_clamp_the_solution() {
        let problem = QpProblem {
            q: DMatrix::from_diagonal_element(2, 2, 2.0),
            b: DVector::from_vec(vec![-2.0, -4.0]),
            lower: DVector::from_element(2, 0.0),
            upper: DVector::from_element(2, 1.5),
            equality: None,
        };
        let x = ActiveSetQp::default().solve(&problem).unwrap();
        assert_relative_eq!(x[0], 1.0, epsilon = 1e-4);
        assert_relative_eq!(x[1], 1.5, epsilon = 1e-4);
    }

    #[test]
    fn coupled_system_solves_exactly() {
        let problem = QpProblem {
            q: DMatrix::from_row_slice(2, 2, &[2.0, -1.0, -1.0, 2.0]),
            b: DVector::from_vec(vec![-1.0, -1.0]),
            lower: DVector::from_element(2, -10.0),
            upper: DVector::from_element(2, 10.0),
            equality: None,
        };
        let x = ActiveSetQp::default().solve(&problem).unwrap();
        assert_relative_eq!(x[0], 1.0, epsilon = 1e-4);
        assert_relative_eq!(x[1], 1.0, epsilon = 1e-4);
    }

    #[test]
    fn equality_penalty_ties_components() {
        let (lower, upper) = wide_bounds(2);
        let problem = QpProblem {
            q: DMatrix::from_diagonal_element(2, 2, 2.0),
            b: DVector::from_vec(vec![-2.0, -4.0]),
            lower,
            upper,
            equality: Some(DMatrix::from_row_slice(1, 2, &[1.0, -1.0])),
        };
        let x = ActiveSetQp::default().solve(&problem).unwrap();
        assert_relative_eq!(x[0], x[1], epsilon = 1e-3);
        assert_relative_eq!(x[0], 1.5, epsilon = 1e-2);
    }

    #[test]
    fn zero_gradient_yields_zero_solution() {
        let (lower, upper) = wide_bounds(3);
        let problem = QpProblem {
            q: DMatrix::from_diagonal_element(3, 3, 1.0),
            b: DVector::zeros(3),
            lower,
            upper,
            equality: None,
        };
        let x = ActiveSetQp::default().solve(&problem).unwrap();
        assert!(x.iter().all(|v| v.abs() < 1e-6));
    }

    #[test]
    fn rejects_inverted_bounds() {
        let problem = QpProblem {
            q: DMatrix::from_diagonal_element(1, 1, 1.0),
            b: DVector::zeros(1),
            lower: DVector::from_element(1, 1.0),
            upper: DVector::from_element(1, -1.0),
            equality: None,
        };
        assert!(matches!(
            ActiveSetQp::default().solve(&problem),
            Err(SolveError::BadProgram { .. })
        ));
    }
}

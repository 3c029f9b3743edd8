extern crate nalgebra as na;

use log::{debug, info};
use na::{DMatrix, DVector};

use crate::sfm::bundle_adjustment::problem::BaProblem;
use crate::Float;

/**
 * Capability boundary around the nonlinear least-squares optimizer: given
 * the flattened parameter blocks and per-observation residuals, refine the
 * parameters in place and report whether the result is usable. Any capable
 * solver satisfies this contract; on failure the problem's parameters are
 * left at their pre-optimization values.
 */
pub trait BundleSolver {
    fn solve(&self, problem: &mut BaProblem) -> bool;
}

/**
 * Levenberg-Marquardt with central-difference Jacobians over the full
 * parameter buffer. Dense normal equations; adequate for the problem sizes
 * the incremental engine produces between growing rounds.
 */
pub struct LevenbergMarquardt {
    pub max_iterations: usize,
    pub cost_tolerance: Float,
    pub initial_lambda: Float
}

impl Default for LevenbergMarquardt {
    fn default() -> LevenbergMarquardt {
        LevenbergMarquardt{max_iterations: 30, cost_tolerance: 1e-10, initial_lambda: 1e-3}
    }
}

impl LevenbergMarquardt {
    fn numeric_jacobian(&self, problem: &mut BaProblem) -> DMatrix<Float> {
        let n_parameters = problem.parameters.len();
        let n_residuals = 2 * problem.observations.len();
        let mut jacobian = DMatrix::<Float>::zeros(n_residuals, n_parameters);

        for j in 0..n_parameters {
            let original = problem.parameters[j];
            let step = 1e-6 * original.abs().max(1.0);

            problem.parameters[j] = original + step;
            let r_plus = problem.residual_vector();
            problem.parameters[j] = original - step;
            let r_minus = problem.residual_vector();
            problem.parameters[j] = original;

            let column = (r_plus - r_minus) / (2.0 * step);
            jacobian.column_mut(j).copy_from(&column);
        }
        jacobian
    }
}

impl BundleSolver for LevenbergMarquardt {
    #[allow(non_snake_case)]
    fn solve(&self, problem: &mut BaProblem) -> bool {
        if problem.observations.is_empty() || problem.parameters.is_empty() {
            return false;
        }

        let initial_parameters = problem.parameters.clone();
        let initial_cost = problem.total_squared_error();
        let mut cost = initial_cost;
        let mut lambda = self.initial_lambda;

        for iteration in 0..self.max_iterations {
            let J = self.numeric_jacobian(problem);
            let r = problem.residual_vector();
            let JtJ = J.transpose() * &J;
            let neg_Jtr = -(J.transpose() * &r);

            let mut accepted = false;
            while lambda < 1e12 {
                let mut damped = JtJ.clone();
                for d in 0..damped.nrows() {
                    damped[(d, d)] += lambda * JtJ[(d, d)].max(1e-12);
                }

                let delta: Option<DVector<Float>> = damped.clone().cholesky()
                    .map(|ch| ch.solve(&neg_Jtr))
                    .or_else(|| damped.lu().solve(&neg_Jtr));

                match delta {
                    Some(delta) => {
                        let candidate = &problem.parameters + &delta;
                        let saved = std::mem::replace(&mut problem.parameters, candidate);
                        let candidate_cost = problem.total_squared_error();
                        if candidate_cost.is_finite() && candidate_cost < cost {
                            let improvement = (cost - candidate_cost) / cost.max(1e-32);
                            cost = candidate_cost;
                            lambda = (lambda / 10.0).max(1e-12);
                            accepted = true;
                            if improvement < self.cost_tolerance {
                                debug!("lm: converged after {} iterations, cost {:.6e}", iteration + 1, cost);
                                return true;
                            }
                            break;
                        } else {
                            problem.parameters = saved;
                            lambda *= 10.0;
                        }
                    }
                    None => {
                        lambda *= 10.0;
                    }
                }
            }

            if !accepted {
                break;
            }
        }

        if !cost.is_finite() || cost > initial_cost {
            problem.parameters = initial_parameters;
            info!("lm: rejected refinement, keeping pre-optimization state");
            return false;
        }
        cost < initial_cost
    }
}

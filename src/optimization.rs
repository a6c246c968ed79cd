//! Flowsheet optimization.
//!
//! An [`OptimizationProblem`] binds bounded decision variables and
//! constraints to a caller-owned scenario context (a flowsheet plus whatever
//! collaborators the objective needs). Evaluation applies the candidate
//! variable values to the scenario, runs the caller's objective (which
//! re-solves the flowsheet and returns the quantity to minimize), and adds
//! a quadratic penalty for violated constraints. A scenario that fails to
//! solve scores +infinity, so the search simply moves away from infeasible
//! regions.
//!
//! The minimizer is a derivative-free Nelder-Mead simplex with optional
//! bound clamping: the sequential-modular solve is not differentiable in
//! any useful sense, and the simplex method needs nothing but objective
//! values.
//!
//! # Example
//!
//! ```
//! use seqmod::optimization::NelderMead;
//!
//! // Minimize (x - 3)^2 from x0 = 0.
//! let optimizer = NelderMead::new(1e-10, 200);
//! let outcome = optimizer.minimize(|x| (x[0] - 3.0) * (x[0] - 3.0), &[0.0], None);
//! assert!(outcome.converged);
//! assert!((outcome.x[0] - 3.0).abs() < 1e-4);
//! ```

use tracing::{info, warn};

use crate::solver::SolveError;

/// Constraint sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    /// Feasible when the constraint function is >= 0.
    Inequality,
    /// Feasible when the constraint function is == 0.
    Equality,
}

/// A constraint on the decision variables and scenario state.
pub struct Constraint<Ctx> {
    name: String,
    kind: ConstraintKind,
    function: Box<dyn Fn(&[f64], &Ctx) -> f64>,
}

impl<Ctx> Constraint<Ctx> {
    /// Inequality constraint, feasible when `function(x, ctx) >= 0`.
    pub fn inequality(
        name: impl Into<String>,
        function: impl Fn(&[f64], &Ctx) -> f64 + 'static,
    ) -> Self {
        Constraint { name: name.into(), kind: ConstraintKind::Inequality, function: Box::new(function) }
    }

    /// Equality constraint, feasible when `function(x, ctx) == 0`.
    pub fn equality(
        name: impl Into<String>,
        function: impl Fn(&[f64], &Ctx) -> f64 + 'static,
    ) -> Self {
        Constraint { name: name.into(), kind: ConstraintKind::Equality, function: Box::new(function) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ConstraintKind {
        self.kind
    }

    pub fn evaluate(&self, x: &[f64], ctx: &Ctx) -> f64 {
        (self.function)(x, ctx)
    }
}

struct DecisionVariable<Ctx> {
    name: String,
    bounds: (f64, f64),
    apply: Box<dyn Fn(&mut Ctx, f64)>,
}

/// An optimization problem over a scenario context.
pub struct OptimizationProblem<Ctx> {
    name: String,
    variables: Vec<DecisionVariable<Ctx>>,
    constraints: Vec<Constraint<Ctx>>,
    objective: Box<dyn FnMut(&mut Ctx) -> Result<f64, SolveError>>,
    /// Weight of the quadratic constraint penalty.
    pub penalty_weight: f64,
}

impl<Ctx> OptimizationProblem<Ctx> {
    /// Creates a problem around an objective closure. The closure re-solves
    /// the scenario for the currently applied variable values and returns
    /// the value to minimize (negate to maximize).
    pub fn new(
        name: impl Into<String>,
        objective: impl FnMut(&mut Ctx) -> Result<f64, SolveError> + 'static,
    ) -> Self {
        OptimizationProblem {
            name: name.into(),
            variables: Vec::new(),
            constraints: Vec::new(),
            objective: Box::new(objective),
            penalty_weight: 1e6,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a bounded decision variable. `apply` writes a candidate value
    /// into the scenario (e.g. a reactor volume) before each objective
    /// evaluation; variables are applied in the order they were added.
    pub fn add_variable(
        &mut self,
        name: impl Into<String>,
        bounds: (f64, f64),
        apply: impl Fn(&mut Ctx, f64) + 'static,
    ) {
        self.variables.push(DecisionVariable {
            name: name.into(),
            bounds,
            apply: Box::new(apply),
        });
    }

    pub fn add_constraint(&mut self, constraint: Constraint<Ctx>) {
        self.constraints.push(constraint);
    }

    pub fn n_variables(&self) -> usize {
        self.variables.len()
    }

    /// Variable bounds in declaration order.
    pub fn bounds(&self) -> Vec<(f64, f64)> {
        self.variables.iter().map(|v| v.bounds).collect()
    }

    /// Applies `x` to the scenario, evaluates the objective, and adds the
    /// quadratic penalty of any violated constraint. A failed solve scores
    /// +infinity.
    pub fn evaluate(&mut self, x: &[f64], ctx: &mut Ctx) -> f64 {
        for (variable, &value) in self.variables.iter().zip(x) {
            (variable.apply)(ctx, value);
        }

        let objective = match (self.objective)(ctx) {
            Ok(value) => value,
            Err(e) => {
                warn!("objective evaluation failed in '{}': {}", self.name, e);
                return f64::INFINITY;
            }
        };

        let mut penalty = 0.0;
        for constraint in &self.constraints {
            let g = constraint.evaluate(x, ctx);
            let violation = match constraint.kind {
                ConstraintKind::Inequality => (-g).max(0.0),
                ConstraintKind::Equality => g.abs(),
            };
            penalty += violation * violation;
        }
        objective + self.penalty_weight * penalty
    }
}

/// Result of a minimization run.
#[derive(Debug, Clone)]
pub struct OptimizationOutcome {
    /// Best point found.
    pub x: Vec<f64>,
    /// Objective value at `x` (penalty included).
    pub objective: f64,
    /// Iterations performed.
    pub iterations: usize,
    /// Whether the simplex spread fell below tolerance.
    pub converged: bool,
}

/// Derivative-free Nelder-Mead simplex minimizer.
///
/// Standard reflection/expansion/contraction/shrink coefficients
/// (1, 2, 0.5, 0.5). When bounds are supplied every candidate vertex is
/// clamped into the box before evaluation.
#[derive(Debug, Clone)]
pub struct NelderMead {
    /// Convergence tolerance on the simplex objective spread.
    pub tolerance: f64,
    /// Maximum iterations.
    pub max_iterations: usize,
    /// Relative size of the initial simplex (fraction of the bound range,
    /// or of |x0| without bounds).
    pub initial_step: f64,
}

impl NelderMead {
    pub fn new(tolerance: f64, max_iterations: usize) -> Self {
        NelderMead { tolerance, max_iterations, initial_step: 0.05 }
    }

    pub fn with_initial_step(mut self, step: f64) -> Self {
        self.initial_step = step;
        self
    }

    /// Minimizes `f` starting from `x0`, optionally within a bound box.
    pub fn minimize<F>(
        &self,
        mut f: F,
        x0: &[f64],
        bounds: Option<&[(f64, f64)]>,
    ) -> OptimizationOutcome
    where
        F: FnMut(&[f64]) -> f64,
    {
        let n = x0.len();
        let clamp = |x: &mut Vec<f64>| {
            if let Some(bounds) = bounds {
                for (value, &(low, high)) in x.iter_mut().zip(bounds) {
                    *value = value.clamp(low, high);
                }
            }
        };

        // Initial simplex: x0 plus one perturbed vertex per dimension.
        let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
        let mut base = x0.to_vec();
        clamp(&mut base);
        simplex.push(base.clone());
        for i in 0..n {
            let step = match bounds {
                Some(bounds) => self.initial_step * (bounds[i].1 - bounds[i].0),
                None => {
                    if base[i] != 0.0 {
                        self.initial_step * base[i].abs()
                    } else {
                        0.00025
                    }
                }
            };
            let mut vertex = base.clone();
            vertex[i] += step;
            clamp(&mut vertex);
            // A vertex clamped back onto the base point would degenerate the
            // simplex; step inward instead.
            if vertex[i] == base[i] {
                vertex[i] -= step;
                clamp(&mut vertex);
            }
            simplex.push(vertex);
        }
        let mut values: Vec<f64> = simplex.iter().map(|v| f(v)).collect();

        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.max_iterations {
            iterations += 1;

            // Order the simplex: best first.
            let mut order: Vec<usize> = (0..=n).collect();
            order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
            simplex = order.iter().map(|&i| simplex[i].clone()).collect();
            values = order.iter().map(|&i| values[i]).collect();

            if (values[n] - values[0]).abs() < self.tolerance {
                converged = true;
                break;
            }

            // Centroid of every vertex but the worst.
            let mut centroid = vec![0.0; n];
            for vertex in simplex.iter().take(n) {
                for (c, &v) in centroid.iter_mut().zip(vertex) {
                    *c += v / n as f64;
                }
            }

            // Reflection.
            let mut reflected: Vec<f64> =
                centroid.iter().zip(&simplex[n]).map(|(&c, &w)| c + (c - w)).collect();
            clamp(&mut reflected);
            let f_reflected = f(&reflected);

            if f_reflected < values[0] {
                // Expansion.
                let mut expanded: Vec<f64> =
                    centroid.iter().zip(&simplex[n]).map(|(&c, &w)| c + 2.0 * (c - w)).collect();
                clamp(&mut expanded);
                let f_expanded = f(&expanded);
                if f_expanded < f_reflected {
                    simplex[n] = expanded;
                    values[n] = f_expanded;
                } else {
                    simplex[n] = reflected;
                    values[n] = f_reflected;
                }
            } else if f_reflected < values[n - 1] {
                simplex[n] = reflected;
                values[n] = f_reflected;
            } else {
                // Contraction toward the centroid.
                let mut contracted: Vec<f64> =
                    centroid.iter().zip(&simplex[n]).map(|(&c, &w)| c + 0.5 * (w - c)).collect();
                clamp(&mut contracted);
                let f_contracted = f(&contracted);
                if f_contracted < values[n] {
                    simplex[n] = contracted;
                    values[n] = f_contracted;
                } else {
                    // Shrink everything toward the best vertex.
                    let best = simplex[0].clone();
                    for vertex in simplex.iter_mut().skip(1) {
                        for (v, &b) in vertex.iter_mut().zip(&best) {
                            *v = b + 0.5 * (*v - b);
                        }
                        clamp(vertex);
                    }
                    for (value, vertex) in values.iter_mut().zip(&simplex).skip(1) {
                        *value = f(vertex);
                    }
                }
            }
        }

        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        OptimizationOutcome {
            x: simplex[order[0]].clone(),
            objective: values[order[0]],
            iterations,
            converged,
        }
    }

    /// Solves an [`OptimizationProblem`], starting from the midpoint of each
    /// variable's bounds. The best point is re-applied to the scenario
    /// before returning, so `ctx` is left at the optimum.
    pub fn solve<Ctx>(
        &self,
        problem: &mut OptimizationProblem<Ctx>,
        ctx: &mut Ctx,
    ) -> OptimizationOutcome {
        let bounds = problem.bounds();
        let x0: Vec<f64> = bounds.iter().map(|&(low, high)| 0.5 * (low + high)).collect();
        info!("starting optimization '{}' from {:?}", problem.name(), x0);

        let outcome = self.minimize(|x| problem.evaluate(x, ctx), &x0, Some(&bounds));

        // Leave the scenario at the best point found.
        problem.evaluate(&outcome.x, ctx);
        info!(
            "optimization '{}' finished after {} iterations (converged: {}), objective {:.6}",
            problem.name(),
            outcome.iterations,
            outcome.converged,
            outcome.objective
        );
        outcome
    }
}

impl Default for NelderMead {
    fn default() -> Self {
        Self::new(1e-8, 200)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimize_quadratic() {
        let optimizer = NelderMead::new(1e-12, 300);
        let outcome = optimizer.minimize(|x| (x[0] - 3.0) * (x[0] - 3.0), &[0.0], None);

        assert!(outcome.converged);
        assert!((outcome.x[0] - 3.0).abs() < 1e-4);
    }

    #[test]
    fn test_minimize_two_dimensional() {
        // Rosenbrock-lite: (x-1)^2 + 10*(y-2)^2.
        let optimizer = NelderMead::new(1e-12, 500);
        let outcome = optimizer.minimize(
            |x| (x[0] - 1.0).powi(2) + 10.0 * (x[1] - 2.0).powi(2),
            &[0.0, 0.0],
            None,
        );

        assert!(outcome.converged);
        assert!((outcome.x[0] - 1.0).abs() < 1e-3);
        assert!((outcome.x[1] - 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_bounds_are_respected() {
        let optimizer = NelderMead::new(1e-12, 300);
        // Unconstrained minimum at 3, box at [0, 2].
        let outcome =
            optimizer.minimize(|x| (x[0] - 3.0) * (x[0] - 3.0), &[1.0], Some(&[(0.0, 2.0)]));

        assert!(outcome.x[0] <= 2.0 + 1e-12);
        assert!((outcome.x[0] - 2.0).abs() < 1e-3);
    }

    /// Mock reactor whose conversion peaks at T = 382.5 K.
    struct MockReactor {
        temperature: f64,
        conversion: f64,
    }

    impl MockReactor {
        fn solve(&mut self) {
            let t = self.temperature;
            self.conversion =
                0.5 + (t - 300.0) / 100.0 - ((t - 370.0) / 50.0) * ((t - 370.0) / 50.0);
        }
    }

    #[test]
    fn test_problem_maximizes_conversion() {
        let mut problem = OptimizationProblem::new("MaximizeConversion", |ctx: &mut MockReactor| {
            ctx.solve();
            Ok(-ctx.conversion)
        });
        problem.add_variable("reactor_temp", (300.0, 400.0), |ctx, t| ctx.temperature = t);

        let optimizer = NelderMead::new(1e-12, 500);
        let mut ctx = MockReactor { temperature: 300.0, conversion: 0.0 };
        let outcome = optimizer.solve(&mut problem, &mut ctx);

        assert!(outcome.converged);
        assert!((outcome.x[0] - 382.5).abs() < 0.5);
        assert!((ctx.temperature - outcome.x[0]).abs() < 1e-9);
    }

    #[test]
    fn test_inequality_constraint_binds() {
        let mut problem = OptimizationProblem::new("Constrained", |ctx: &mut MockReactor| {
            ctx.solve();
            Ok(-ctx.conversion)
        });
        problem.add_variable("reactor_temp", (300.0, 400.0), |ctx, t| ctx.temperature = t);
        // T <= 380: feasible when 380 - T >= 0.
        problem.add_constraint(Constraint::inequality("TempLimit", |x, _ctx| 380.0 - x[0]));

        let optimizer = NelderMead::new(1e-12, 500);
        let mut ctx = MockReactor { temperature: 300.0, conversion: 0.0 };
        let outcome = optimizer.solve(&mut problem, &mut ctx);

        // The unconstrained peak (382.5) is cut off at the limit.
        assert!(outcome.x[0] <= 380.5);
        assert!((outcome.x[0] - 380.0).abs() < 1.0);
    }

    #[test]
    fn test_failed_solve_scores_infinity() {
        let mut problem = OptimizationProblem::new("Failing", |_ctx: &mut MockReactor| {
            Err(crate::solver::SolveError::CycleDetected { flowsheet: "fs".to_string() })
        });
        problem.add_variable("v", (0.0, 1.0), |_ctx, _v| {});

        let mut ctx = MockReactor { temperature: 0.0, conversion: 0.0 };
        assert_eq!(problem.evaluate(&[0.5], &mut ctx), f64::INFINITY);
    }
}

//! Convex quadratic programming behind a small solver trait.
//!
//! Problems have the form
//!
//! ```text
//! minimize    ½ x'Px + q'x
//! subject to  e_k'x = f_k        (equality rows)
//!             l_j <= x_j <= u_j  (optional box bounds)
//! ```
//!
//! [`AdmmSolver`] runs an operator-splitting (ADMM) iteration and then
//! polishes the result with an exact equality-constrained solve on the
//! detected active set.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SolverSettings;
use crate::error::PortfolioError;
use crate::linalg::{mat_inverse, mat_vec_multiply, norm_inf, quad_form, solve_linear, sqrt_decimal, vec_dot};
use crate::PortfolioResult;

/// Step size multiplier for equality rows.
const EQUALITY_RHO_SCALE: Decimal = dec!(1000);
const RHO_MIN: Decimal = dec!(0.000001);
const RHO_MAX: Decimal = dec!(1000000);
/// Rho is only refactored when it moves by more than this factor.
const RHO_UPDATE_FACTOR: Decimal = dec!(5);
/// Guard against zero denominators in residual scaling.
const TINY: Decimal = dec!(0.000000000001);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A single linear equality `coefficients · x = rhs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearEquality {
    pub coefficients: Vec<Decimal>,
    pub rhs: Decimal,
}

impl LinearEquality {
    pub fn new(coefficients: Vec<Decimal>, rhs: Decimal) -> Self {
        Self { coefficients, rhs }
    }
}

/// Quadratic objective with linear equalities and box bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuadraticProgram {
    /// Positive semidefinite n x n matrix.
    pub p: Vec<Vec<Decimal>>,
    pub q: Vec<Decimal>,
    pub equalities: Vec<LinearEquality>,
    /// Per-variable lower bound, `None` for unbounded.
    pub lower: Vec<Option<Decimal>>,
    /// Per-variable upper bound, `None` for unbounded.
    pub upper: Vec<Option<Decimal>>,
}

impl QuadraticProgram {
    pub fn n(&self) -> usize {
        self.q.len()
    }

    /// ½ x'Px + q'x
    pub fn objective(&self, x: &[Decimal]) -> Decimal {
        quad_form(x, &self.p) / dec!(2) + vec_dot(&self.q, x)
    }

    fn validate(&self) -> PortfolioResult<()> {
        let n = self.n();
        if n == 0 {
            return Err(PortfolioError::InsufficientData(
                "quadratic program has no variables".into(),
            ));
        }
        check_len("qp.p", n, self.p.len())?;
        for row in &self.p {
            check_len("qp.p row", n, row.len())?;
        }
        check_len("qp.lower", n, self.lower.len())?;
        check_len("qp.upper", n, self.upper.len())?;
        for eq in &self.equalities {
            check_len("qp.equality", n, eq.coefficients.len())?;
        }
        for (j, (lo, hi)) in self.lower.iter().zip(self.upper.iter()).enumerate() {
            if let (Some(lo), Some(hi)) = (lo, hi) {
                if lo > hi {
                    return Err(PortfolioError::InvalidInput {
                        field: format!("qp.bounds[{}]", j),
                        reason: format!("lower {} exceeds upper {}", lo, hi),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Result of a quadratic program solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QpSolution {
    pub x: Vec<Decimal>,
    pub objective: Decimal,
    pub iterations: u64,
    /// Whether the active-set polish replaced the ADMM iterate.
    pub polished: bool,
}

/// Capability to solve a [`QuadraticProgram`].
///
/// Implementations hold no state between calls.
pub trait QuadraticSolver {
    fn solve(&self, problem: &QuadraticProgram) -> PortfolioResult<QpSolution>;
}

/// Operator-splitting solver with active-set polishing.
#[derive(Debug, Clone, Default)]
pub struct AdmmSolver {
    settings: SolverSettings,
}

impl AdmmSolver {
    pub fn new(settings: SolverSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }
}

// ---------------------------------------------------------------------------
// Constraint matrix
// ---------------------------------------------------------------------------

/// Stacked constraint matrix: equality rows first, then one identity row
/// per bounded variable.
struct Constraints<'a> {
    problem: &'a QuadraticProgram,
    bounded: Vec<usize>,
}

impl<'a> Constraints<'a> {
    fn new(problem: &'a QuadraticProgram) -> Self {
        let bounded = (0..problem.n())
            .filter(|&j| problem.lower[j].is_some() || problem.upper[j].is_some())
            .collect();
        Self { problem, bounded }
    }

    fn n_eq(&self) -> usize {
        self.problem.equalities.len()
    }

    fn m(&self) -> usize {
        self.n_eq() + self.bounded.len()
    }

    fn apply(&self, x: &[Decimal]) -> Vec<Decimal> {
        let mut out: Vec<Decimal> = self
            .problem
            .equalities
            .iter()
            .map(|eq| vec_dot(&eq.coefficients, x))
            .collect();
        out.extend(self.bounded.iter().map(|&j| x[j]));
        out
    }

    fn apply_t(&self, v: &[Decimal]) -> Vec<Decimal> {
        let mut out = vec![Decimal::ZERO; self.problem.n()];
        for (eq, vi) in self.problem.equalities.iter().zip(v.iter()) {
            if vi.is_zero() {
                continue;
            }
            for (o, c) in out.iter_mut().zip(eq.coefficients.iter()) {
                *o += *c * *vi;
            }
        }
        for (k, &j) in self.bounded.iter().enumerate() {
            out[j] += v[self.n_eq() + k];
        }
        out
    }

    fn lower(&self, row: usize) -> Option<Decimal> {
        if row < self.n_eq() {
            Some(self.problem.equalities[row].rhs)
        } else {
            self.problem.lower[self.bounded[row - self.n_eq()]]
        }
    }

    fn upper(&self, row: usize) -> Option<Decimal> {
        if row < self.n_eq() {
            Some(self.problem.equalities[row].rhs)
        } else {
            self.problem.upper[self.bounded[row - self.n_eq()]]
        }
    }

    fn rho_vector(&self, rho: Decimal) -> Vec<Decimal> {
        let mut v = vec![rho * EQUALITY_RHO_SCALE; self.n_eq()];
        v.extend(std::iter::repeat(rho).take(self.bounded.len()));
        v
    }

    /// Inverse of `P + σI + A' diag(ρ) A`.
    #[allow(clippy::needless_range_loop)]
    fn factor(&self, sigma: Decimal, rho: &[Decimal]) -> PortfolioResult<Vec<Vec<Decimal>>> {
        let n = self.problem.n();
        let mut k = self.problem.p.clone();
        for i in 0..n {
            k[i][i] += sigma;
        }
        for (r, eq) in self.problem.equalities.iter().enumerate() {
            for i in 0..n {
                let ci = eq.coefficients[i] * rho[r];
                if ci.is_zero() {
                    continue;
                }
                for j in 0..n {
                    k[i][j] += ci * eq.coefficients[j];
                }
            }
        }
        for (idx, &j) in self.bounded.iter().enumerate() {
            k[j][j] += rho[self.n_eq() + idx];
        }
        mat_inverse(&k)
    }
}

// ---------------------------------------------------------------------------
// Solver
// ---------------------------------------------------------------------------

impl QuadraticSolver for AdmmSolver {
    fn solve(&self, problem: &QuadraticProgram) -> PortfolioResult<QpSolution> {
        problem.validate()?;
        let s = &self.settings;
        let n = problem.n();
        let cons = Constraints::new(problem);
        let m = cons.m();

        let mut rho = s.rho;
        let mut rho_vec = cons.rho_vector(rho);
        let mut k_inv = cons.factor(s.sigma, &rho_vec)?;

        let mut x = vec![Decimal::ZERO; n];
        let mut z: Vec<Decimal> = (0..m)
            .map(|r| clamp(Decimal::ZERO, cons.lower(r), cons.upper(r)))
            .collect();
        let mut y = vec![Decimal::ZERO; m];
        let one_minus_alpha = Decimal::ONE - s.alpha;

        let mut residual = Decimal::ZERO;
        let mut converged = false;
        let mut iterations = 0u64;

        for iter in 1..=s.max_iter {
            iterations = iter;

            let w: Vec<Decimal> = (0..m).map(|r| rho_vec[r] * z[r] - y[r]).collect();
            let at_w = cons.apply_t(&w);
            let rhs: Vec<Decimal> = (0..n)
                .map(|j| s.sigma * x[j] - problem.q[j] + at_w[j])
                .collect();
            let x_tilde = mat_vec_multiply(&k_inv, &rhs);
            let z_tilde = cons.apply(&x_tilde);

            for j in 0..n {
                x[j] = s.alpha * x_tilde[j] + one_minus_alpha * x[j];
            }
            for r in 0..m {
                let relaxed = s.alpha * z_tilde[r] + one_minus_alpha * z[r];
                let z_new = clamp(relaxed + y[r] / rho_vec[r], cons.lower(r), cons.upper(r));
                y[r] += rho_vec[r] * (relaxed - z_new);
                z[r] = z_new;
            }

            // Residuals
            let ax = cons.apply(&x);
            let px = mat_vec_multiply(&problem.p, &x);
            let aty = cons.apply_t(&y);
            let prim: Vec<Decimal> = ax.iter().zip(z.iter()).map(|(a, b)| *a - *b).collect();
            let dual: Vec<Decimal> = (0..n).map(|j| px[j] + problem.q[j] + aty[j]).collect();
            let r_prim = norm_inf(&prim);
            let r_dual = norm_inf(&dual);
            residual = r_prim.max(r_dual);

            let prim_scale = norm_inf(&ax).max(norm_inf(&z));
            let dual_scale = norm_inf(&px).max(norm_inf(&aty)).max(norm_inf(&problem.q));
            let eps_prim = s.eps_abs + s.eps_rel * prim_scale;
            let eps_dual = s.eps_abs + s.eps_rel * dual_scale;

            if r_prim <= eps_prim && r_dual <= eps_dual {
                converged = true;
                break;
            }

            if m > 0 && s.adaptive_rho_interval > 0 && iter % s.adaptive_rho_interval == 0 {
                let prim_rel = r_prim / prim_scale.max(TINY);
                let dual_rel = r_dual / dual_scale.max(TINY);
                if dual_rel > TINY {
                    let candidate = (rho * sqrt_decimal(prim_rel / dual_rel)).clamp(RHO_MIN, RHO_MAX);
                    if candidate > rho * RHO_UPDATE_FACTOR || candidate * RHO_UPDATE_FACTOR < rho {
                        rho = candidate;
                        rho_vec = cons.rho_vector(rho);
                        k_inv = cons.factor(s.sigma, &rho_vec)?;
                        debug!(iteration = iter, %rho, "qp: updated step size");
                    }
                }
            }
        }

        if !converged {
            return Err(PortfolioError::SolverDidNotConverge {
                solver: "admm quadratic program".into(),
                iterations,
                residual,
            });
        }

        let admm_x: Vec<Decimal> = (0..n)
            .map(|j| clamp(x[j], problem.lower[j], problem.upper[j]))
            .collect();
        let admm_obj = problem.objective(&admm_x);

        let polished = if s.polish {
            polish(problem, &cons, &z, &y, s.eps_abs)
                .filter(|px| problem.objective(px) <= admm_obj + s.eps_abs * (Decimal::ONE + admm_obj.abs()))
        } else {
            None
        };

        debug!(
            iterations,
            %residual,
            polished = polished.is_some(),
            "qp: converged"
        );

        let (x, polished) = match polished {
            Some(px) => (px, true),
            None => (admm_x, false),
        };
        Ok(QpSolution {
            objective: problem.objective(&x),
            x,
            iterations,
            polished,
        })
    }
}

/// Exact solve with the ADMM-detected active bounds fixed.
#[allow(clippy::needless_range_loop)]
fn polish(
    problem: &QuadraticProgram,
    cons: &Constraints<'_>,
    z: &[Decimal],
    y: &[Decimal],
    tol: Decimal,
) -> Option<Vec<Decimal>> {
    let n = problem.n();
    let n_eq = cons.n_eq();
    let mut fixed: Vec<Option<Decimal>> = vec![None; n];

    for (k, &j) in cons.bounded.iter().enumerate() {
        let r = n_eq + k;
        if let Some(lo) = problem.lower[j] {
            if z[r] - lo < -y[r] {
                fixed[j] = Some(lo);
                continue;
            }
        }
        if let Some(hi) = problem.upper[j] {
            if hi - z[r] < y[r] {
                fixed[j] = Some(hi);
            }
        }
    }

    let free: Vec<usize> = (0..n).filter(|&j| fixed[j].is_none()).collect();
    let mut x: Vec<Decimal> = fixed.iter().map(|f| f.unwrap_or(Decimal::ZERO)).collect();

    if !free.is_empty() {
        let nf = free.len();
        let size = nf + n_eq;
        let mut kkt = vec![vec![Decimal::ZERO; size]; size];
        let mut rhs = vec![Decimal::ZERO; size];

        for (a, &i) in free.iter().enumerate() {
            for (b, &j) in free.iter().enumerate() {
                kkt[a][b] = problem.p[i][j];
            }
            let fixed_part: Decimal = (0..n)
                .filter_map(|j| fixed[j].map(|v| problem.p[i][j] * v))
                .sum();
            rhs[a] = -problem.q[i] - fixed_part;
        }
        for (r, eq) in problem.equalities.iter().enumerate() {
            for (a, &j) in free.iter().enumerate() {
                kkt[nf + r][a] = eq.coefficients[j];
                kkt[a][nf + r] = eq.coefficients[j];
            }
            let fixed_part: Decimal = (0..n)
                .filter_map(|j| fixed[j].map(|v| eq.coefficients[j] * v))
                .sum();
            rhs[nf + r] = eq.rhs - fixed_part;
        }

        let sol = solve_linear(&kkt, &rhs).ok()?;
        for (a, &j) in free.iter().enumerate() {
            x[j] = sol[a];
        }
    }

    for j in 0..n {
        if let Some(lo) = problem.lower[j] {
            if x[j] < lo - tol {
                return None;
            }
        }
        if let Some(hi) = problem.upper[j] {
            if x[j] > hi + tol {
                return None;
            }
        }
        x[j] = clamp(x[j], problem.lower[j], problem.upper[j]);
    }
    for eq in &problem.equalities {
        if (vec_dot(&eq.coefficients, &x) - eq.rhs).abs() > tol {
            return None;
        }
    }
    Some(x)
}

fn clamp(v: Decimal, lo: Option<Decimal>, hi: Option<Decimal>) -> Decimal {
    let v = match lo {
        Some(lo) if v < lo => lo,
        _ => v,
    };
    match hi {
        Some(hi) if v > hi => hi,
        _ => v,
    }
}

fn check_len(context: &str, expected: usize, actual: usize) -> PortfolioResult<()> {
    if expected != actual {
        return Err(PortfolioError::DimensionMismatch {
            context: context.into(),
            expected,
            actual,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

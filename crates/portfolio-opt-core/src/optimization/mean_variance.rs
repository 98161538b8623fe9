use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::{SolverSettings, WeightBounds, DEFAULT_COVARIANCE_RIDGE, DEFAULT_RISK_FREE_RATE};
use crate::error::PortfolioError;
use crate::linalg::{
    is_positive_definite, mat_inverse, mat_vec_multiply, max_of, norm_inf, quad_form,
    sqrt_decimal, vec_dot,
};
use crate::optimization::qp::{AdmmSolver, LinearEquality, QuadraticProgram, QuadraticSolver};
use crate::types::{with_metadata, ComputationOutput, Rate, Weight};
use crate::PortfolioResult;

/// Asymmetry accepted in a supplied covariance matrix.
const SYMMETRY_TOLERANCE: Decimal = dec!(0.0000001);
/// Slack when comparing a target return against the achievable range.
const RETURN_TOLERANCE: Decimal = dec!(0.000000001);
/// Ridge escalations tried before a covariance matrix is rejected.
const MAX_RIDGE_ATTEMPTS: u32 = 12;
const ARMIJO_SLOPE: Decimal = dec!(0.0001);
const MIN_STEP: Decimal = dec!(0.000000000001);
const MAX_STEP: Decimal = dec!(1000);
const PROJECTION_ITERATIONS: usize = 200;
const PROJECTION_TOLERANCE: Decimal = dec!(0.000000000000000000001);
const RISK_BISECTION_ITERATIONS: usize = 60;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What the optimizer is asked to find.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Objective {
    /// Tangency portfolio (maximum Sharpe ratio).
    #[default]
    MaxSharpe,
    /// Global minimum-variance portfolio.
    MinVolatility,
    /// Minimum variance at a given expected return.
    EfficientReturn { target_return: Rate },
    /// Highest expected return with volatility at most the target.
    EfficientRisk { target_volatility: Decimal },
}

/// Input to mean-variance portfolio optimization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeanVarianceInput {
    /// Asset identifiers.
    pub asset_names: Vec<String>,
    /// Annualized expected returns per asset.
    pub expected_returns: Vec<Rate>,
    /// N x N annualized covariance matrix.
    pub covariance_matrix: Vec<Vec<Decimal>>,
    /// Annual risk-free rate.
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: Rate,
    #[serde(default)]
    pub bounds: WeightBounds,
    #[serde(default)]
    pub objective: Objective,
    /// Number of efficient frontier points to report, if any.
    #[serde(default)]
    pub frontier_points: Option<u32>,
    #[serde(default = "default_covariance_ridge")]
    pub covariance_ridge: Decimal,
    #[serde(default)]
    pub solver: SolverSettings,
}

fn default_risk_free_rate() -> Rate {
    DEFAULT_RISK_FREE_RATE
}

fn default_covariance_ridge() -> Decimal {
    DEFAULT_COVARIANCE_RIDGE
}

/// Expected return, variance, volatility and Sharpe ratio of a weight vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioPerformance {
    pub expected_return: Rate,
    pub variance: Decimal,
    pub volatility: Decimal,
    /// (return - rf) / volatility; zero when volatility is zero.
    pub sharpe_ratio: Decimal,
}

/// A single asset weight with risk/return contribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightContribution {
    pub asset: String,
    pub weight: Weight,
    /// Marginal risk contribution times weight.
    pub contribution_to_risk: Decimal,
    /// Weight times expected return.
    pub contribution_to_return: Decimal,
}

/// A single point on the efficient frontier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierPoint {
    pub expected_return: Rate,
    pub volatility: Decimal,
    pub sharpe_ratio: Decimal,
    pub weights: Vec<Weight>,
}

/// Output of mean-variance optimization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeanVarianceOutput {
    pub objective: Objective,
    /// Raw (uncleaned) optimal weights.
    pub weights: Vec<WeightContribution>,
    pub performance: PortfolioPerformance,
    /// Weighted average vol / portfolio vol.
    pub diversification_ratio: Decimal,
    /// Herfindahl-Hirschman index of weights.
    pub hhi_concentration: Decimal,
    /// Diagonal shift applied to a singular covariance matrix.
    pub covariance_shift: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub efficient_frontier: Option<Vec<FrontierPoint>>,
}

// ---------------------------------------------------------------------------
// Optimizer
// ---------------------------------------------------------------------------

/// Validated mean-variance problem data plus the solver used for every
/// convex subproblem.
#[derive(Debug, Clone)]
pub struct MeanVarianceOptimizer<S: QuadraticSolver = AdmmSolver> {
    mu: Vec<Rate>,
    sigma: Vec<Vec<Decimal>>,
    lower: Vec<Weight>,
    upper: Vec<Weight>,
    long_only_box: bool,
    covariance_shift: Decimal,
    solver: S,
    settings: SolverSettings,
    warnings: Vec<String>,
}

impl MeanVarianceOptimizer<AdmmSolver> {
    /// Validate inputs and regularize the covariance matrix if it is not
    /// positive definite.
    pub fn new(
        mu: &[Rate],
        sigma: &[Vec<Decimal>],
        bounds: &WeightBounds,
        covariance_ridge: Decimal,
        settings: &SolverSettings,
    ) -> PortfolioResult<Self> {
        Self::with_solver(
            mu,
            sigma,
            bounds,
            covariance_ridge,
            settings,
            AdmmSolver::new(settings.clone()),
        )
    }
}

impl<S: QuadraticSolver> MeanVarianceOptimizer<S> {
    pub fn with_solver(
        mu: &[Rate],
        sigma: &[Vec<Decimal>],
        bounds: &WeightBounds,
        covariance_ridge: Decimal,
        settings: &SolverSettings,
        solver: S,
    ) -> PortfolioResult<Self> {
        let n = mu.len();
        if n == 0 {
            return Err(PortfolioError::InsufficientData(
                "At least one asset required".into(),
            ));
        }
        validate_covariance_matrix(sigma, n)?;
        settings.validate()?;
        if covariance_ridge < Decimal::ZERO {
            return Err(PortfolioError::InvalidInput {
                field: "covariance_ridge".into(),
                reason: "must be non-negative".into(),
            });
        }
        let (lower, upper) = bounds.resolve(n)?;

        let mut warnings = Vec::new();
        let (sigma, covariance_shift) = regularize(sigma, covariance_ridge)?;
        if !covariance_shift.is_zero() {
            let msg = format!(
                "Covariance matrix is singular or not positive definite; added {} to the diagonal",
                covariance_shift.normalize()
            );
            warn!(shift = %covariance_shift, "covariance matrix regularized");
            warnings.push(msg);
        }

        Ok(Self {
            mu: mu.to_vec(),
            sigma,
            lower,
            upper,
            long_only_box: bounds.is_long_only_box(n),
            covariance_shift,
            solver,
            settings: settings.clone(),
            warnings,
        })
    }

    pub fn n(&self) -> usize {
        self.mu.len()
    }

    /// Covariance matrix actually used, after any regularization.
    pub fn covariance(&self) -> &[Vec<Decimal>] {
        &self.sigma
    }

    pub fn covariance_shift(&self) -> Decimal {
        self.covariance_shift
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Lowest and highest expected return attainable by a fully invested
    /// portfolio inside the bounds.
    pub fn return_range(&self) -> (Rate, Rate) {
        (
            self.extreme_return(false),
            self.extreme_return(true),
        )
    }

    fn extreme_return(&self, highest: bool) -> Rate {
        let n = self.n();
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| {
            if highest {
                self.mu[b].cmp(&self.mu[a])
            } else {
                self.mu[a].cmp(&self.mu[b])
            }
        });
        let mut w = self.lower.clone();
        let mut remaining = Decimal::ONE - w.iter().sum::<Decimal>();
        for i in order {
            if remaining <= Decimal::ZERO {
                break;
            }
            let add = (self.upper[i] - self.lower[i]).min(remaining);
            w[i] += add;
            remaining -= add;
        }
        vec_dot(&w, &self.mu)
    }

    /// Tangency portfolio: weights maximizing `(w·mu - rf) / sqrt(w'Σw)`.
    pub fn max_sharpe(&self, risk_free_rate: Rate) -> PortfolioResult<Vec<Weight>> {
        let n = self.n();
        if n == 1 {
            return Ok(vec![Decimal::ONE]);
        }

        let excess: Vec<Decimal> = self.mu.iter().map(|m| *m - risk_free_rate).collect();
        if excess.iter().all(|e| *e <= Decimal::ZERO) {
            return Err(PortfolioError::NoFeasibleTangencyPortfolio {
                risk_free_rate,
                best_expected_return: max_of(&self.mu).unwrap_or(Decimal::ZERO),
            });
        }

        if self.long_only_box {
            match self.max_sharpe_convex(&excess) {
                Err(PortfolioError::SolverDidNotConverge {
                    iterations,
                    residual,
                    ..
                }) => {
                    warn!(
                        iterations,
                        %residual,
                        "max_sharpe: convex reduction did not converge, using projected gradient"
                    );
                    self.max_sharpe_gradient(&excess)
                }
                other => other,
            }
        } else {
            self.max_sharpe_gradient(&excess)
        }
    }

    /// minimize y'Σy s.t. e·y = 1, y >= 0; then w = y / sum(y).
    ///
    /// `e` is the excess return divided by its largest positive entry. The
    /// ratio is scale free, and this keeps y near unit size when the best
    /// asset sits just above the risk-free rate.
    fn max_sharpe_convex(&self, excess: &[Decimal]) -> PortfolioResult<Vec<Weight>> {
        let n = self.n();
        let top = max_of(excess).unwrap_or(Decimal::ONE);
        let scaled: Vec<Decimal> = excess.iter().map(|e| *e / top).collect();
        let problem = QuadraticProgram {
            p: self.scaled_covariance(dec!(2)),
            q: vec![Decimal::ZERO; n],
            equalities: vec![LinearEquality::new(scaled, Decimal::ONE)],
            lower: vec![Some(Decimal::ZERO); n],
            upper: vec![None; n],
        };
        let sol = self.solver.solve(&problem)?;
        let y: Vec<Decimal> = sol.x.iter().map(|v| (*v).max(Decimal::ZERO)).collect();
        let k: Decimal = y.iter().sum();
        if k <= Decimal::ZERO {
            return Err(PortfolioError::SolverDidNotConverge {
                solver: "max sharpe reduction".into(),
                iterations: sol.iterations,
                residual: k,
            });
        }
        debug!(iterations = sol.iterations, polished = sol.polished, "max_sharpe: convex reduction solved");
        Ok(y.iter().map(|v| *v / k).collect())
    }

    /// Projected gradient ascent on the Sharpe ratio with Armijo
    /// backtracking, for bounds the convex reduction cannot express.
    fn max_sharpe_gradient(&self, excess: &[Decimal]) -> PortfolioResult<Vec<Weight>> {
        let n = self.n();
        let mut w = self.warm_start(excess);
        let mut value = self.sharpe_of(&w, excess);
        let mut step = Decimal::ONE;
        let mut last_move = Decimal::ZERO;

        for iter in 1..=self.settings.max_iter {
            let grad = self.sharpe_gradient(&w, excess);

            let mut t = step;
            let mut accepted = None;
            while t >= MIN_STEP {
                let trial: Vec<Decimal> = (0..n).map(|i| w[i] + t * grad[i]).collect();
                let cand = project_onto_bounds(&trial, &self.lower, &self.upper);
                let moved: Vec<Decimal> = (0..n).map(|i| cand[i] - w[i]).collect();
                let cand_value = self.sharpe_of(&cand, excess);
                if cand_value >= value + ARMIJO_SLOPE * vec_dot(&grad, &moved) {
                    accepted = Some((cand, cand_value, norm_inf(&moved)));
                    break;
                }
                t /= dec!(2);
            }

            let Some((cand, cand_value, moved)) = accepted else {
                debug!(iterations = iter, sharpe = %value, "max_sharpe: no ascent step left");
                return Ok(w);
            };
            w = cand;
            value = cand_value;
            last_move = moved;
            if moved <= self.settings.eps_abs {
                debug!(iterations = iter, sharpe = %value, "max_sharpe: projected gradient converged");
                return Ok(w);
            }
            step = (t * dec!(2)).min(MAX_STEP);
        }

        Err(PortfolioError::SolverDidNotConverge {
            solver: "projected gradient max sharpe".into(),
            iterations: self.settings.max_iter,
            residual: last_move,
        })
    }

    /// Normalized `Σ⁻¹ excess`, projected onto the feasible set.
    fn warm_start(&self, excess: &[Decimal]) -> Vec<Weight> {
        let n = self.n();
        let raw = mat_inverse(&self.sigma)
            .map(|inv| mat_vec_multiply(&inv, excess))
            .unwrap_or_else(|_| vec![Decimal::ONE; n]);
        let total: Decimal = raw.iter().sum();
        let start: Vec<Decimal> = if total > Decimal::ZERO {
            raw.iter().map(|v| *v / total).collect()
        } else {
            equal_weights(n)
        };
        project_onto_bounds(&start, &self.lower, &self.upper)
    }

    fn sharpe_of(&self, w: &[Decimal], excess: &[Decimal]) -> Decimal {
        let vol = sqrt_decimal(quad_form(w, &self.sigma));
        if vol.is_zero() {
            Decimal::ZERO
        } else {
            vec_dot(w, excess) / vol
        }
    }

    /// ∇S = excess / σ - (w·excess) Σw / σ³
    fn sharpe_gradient(&self, w: &[Decimal], excess: &[Decimal]) -> Vec<Decimal> {
        let sigma_w = mat_vec_multiply(&self.sigma, w);
        let vol = sqrt_decimal(vec_dot(w, &sigma_w));
        if vol.is_zero() {
            return excess.to_vec();
        }
        let ex_ret = vec_dot(w, excess);
        let vol_cubed = vol * vol * vol;
        excess
            .iter()
            .zip(sigma_w.iter())
            .map(|(e, sw)| *e / vol - ex_ret * *sw / vol_cubed)
            .collect()
    }

    /// Global minimum-variance portfolio.
    pub fn min_volatility(&self) -> PortfolioResult<Vec<Weight>> {
        let n = self.n();
        if n == 1 {
            return Ok(vec![Decimal::ONE]);
        }
        self.solve_bounded(vec![LinearEquality::new(vec![Decimal::ONE; n], Decimal::ONE)])
    }

    /// Minimum-variance portfolio with expected return exactly `target_return`.
    pub fn efficient_return(&self, target_return: Rate) -> PortfolioResult<Vec<Weight>> {
        let n = self.n();
        let (lo, hi) = self.return_range();
        if target_return < lo - RETURN_TOLERANCE || target_return > hi + RETURN_TOLERANCE {
            return Err(PortfolioError::InvalidInput {
                field: "target_return".into(),
                reason: format!(
                    "{} is outside the achievable range [{}, {}]",
                    target_return,
                    lo.normalize(),
                    hi.normalize()
                ),
            });
        }
        if n == 1 {
            return Ok(vec![Decimal::ONE]);
        }
        let target = target_return.clamp(lo, hi);
        self.solve_bounded(vec![
            LinearEquality::new(vec![Decimal::ONE; n], Decimal::ONE),
            LinearEquality::new(self.mu.clone(), target),
        ])
    }

    /// Highest-return frontier portfolio whose volatility does not exceed
    /// `target_volatility`.
    pub fn efficient_risk(&self, target_volatility: Decimal) -> PortfolioResult<Vec<Weight>> {
        let w_min = self.min_volatility()?;
        let min_vol = self.volatility(&w_min);
        if target_volatility < min_vol - RETURN_TOLERANCE {
            return Err(PortfolioError::InvalidInput {
                field: "target_volatility".into(),
                reason: format!(
                    "{} is below the minimum attainable volatility {}",
                    target_volatility,
                    min_vol.round_dp(8)
                ),
            });
        }

        let (_, r_max) = self.return_range();
        let mut lo = vec_dot(&w_min, &self.mu);
        if r_max <= lo {
            return Ok(w_min);
        }
        let w_top = self.efficient_return(r_max)?;
        if self.volatility(&w_top) <= target_volatility {
            return Ok(w_top);
        }

        let mut hi = r_max;
        let mut best = w_min;
        for _ in 0..RISK_BISECTION_ITERATIONS {
            if hi - lo <= RETURN_TOLERANCE {
                break;
            }
            let mid = (lo + hi) / dec!(2);
            let w = self.efficient_return(mid)?;
            if self.volatility(&w) <= target_volatility {
                lo = mid;
                best = w;
            } else {
                hi = mid;
            }
        }
        Ok(best)
    }

    /// Frontier portfolios at evenly spaced target returns from the
    /// minimum-volatility return to the highest achievable return.
    pub fn efficient_frontier(
        &self,
        points: u32,
        risk_free_rate: Rate,
    ) -> PortfolioResult<Vec<FrontierPoint>> {
        if points == 0 {
            return Err(PortfolioError::InvalidInput {
                field: "frontier_points".into(),
                reason: "must be at least 1".into(),
            });
        }
        let w_min = self.min_volatility()?;
        let r_lo = vec_dot(&w_min, &self.mu);
        let (_, r_hi) = self.return_range();

        if points == 1 || r_hi - r_lo <= RETURN_TOLERANCE {
            return Ok(vec![self.frontier_point(w_min, risk_free_rate)]);
        }

        let step = (r_hi - r_lo) / Decimal::from(points - 1);
        let mut frontier = Vec::with_capacity(points as usize);
        frontier.push(self.frontier_point(w_min, risk_free_rate));
        for i in 1..points {
            let target = if i == points - 1 {
                r_hi
            } else {
                r_lo + step * Decimal::from(i)
            };
            let w = self.efficient_return(target)?;
            frontier.push(self.frontier_point(w, risk_free_rate));
        }
        debug!(points = frontier.len(), "efficient frontier traced");
        Ok(frontier)
    }

    fn frontier_point(&self, weights: Vec<Weight>, risk_free_rate: Rate) -> FrontierPoint {
        let perf = performance_unchecked(&weights, &self.mu, &self.sigma, risk_free_rate);
        FrontierPoint {
            expected_return: perf.expected_return,
            volatility: perf.volatility,
            sharpe_ratio: perf.sharpe_ratio,
            weights,
        }
    }

    /// minimize w'Σw subject to the given equalities and the weight bounds.
    fn solve_bounded(&self, equalities: Vec<LinearEquality>) -> PortfolioResult<Vec<Weight>> {
        let problem = QuadraticProgram {
            p: self.scaled_covariance(dec!(2)),
            q: vec![Decimal::ZERO; self.n()],
            equalities,
            lower: self.lower.iter().map(|l| Some(*l)).collect(),
            upper: self.upper.iter().map(|u| Some(*u)).collect(),
        };
        let sol = self.solver.solve(&problem)?;
        Ok(sol.x)
    }

    fn scaled_covariance(&self, factor: Decimal) -> Vec<Vec<Decimal>> {
        self.sigma
            .iter()
            .map(|row| row.iter().map(|v| *v * factor).collect())
            .collect()
    }

    fn volatility(&self, w: &[Decimal]) -> Decimal {
        sqrt_decimal(quad_form(w, &self.sigma))
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Expected return, variance, volatility and Sharpe ratio of `weights`.
pub fn portfolio_performance(
    weights: &[Weight],
    expected_returns: &[Rate],
    covariance_matrix: &[Vec<Decimal>],
    risk_free_rate: Rate,
) -> PortfolioResult<PortfolioPerformance> {
    let n = expected_returns.len();
    if weights.len() != n {
        return Err(PortfolioError::DimensionMismatch {
            context: "weights vs expected_returns".into(),
            expected: n,
            actual: weights.len(),
        });
    }
    validate_covariance_matrix(covariance_matrix, n)?;
    Ok(performance_unchecked(
        weights,
        expected_returns,
        covariance_matrix,
        risk_free_rate,
    ))
}

fn performance_unchecked(
    weights: &[Weight],
    mu: &[Rate],
    sigma: &[Vec<Decimal>],
    rf: Rate,
) -> PortfolioPerformance {
    let expected_return = vec_dot(weights, mu);
    let variance = quad_form(weights, sigma);
    let volatility = sqrt_decimal(variance);
    let sharpe_ratio = if volatility.is_zero() {
        Decimal::ZERO
    } else {
        (expected_return - rf) / volatility
    };
    PortfolioPerformance {
        expected_return,
        variance,
        volatility,
        sharpe_ratio,
    }
}

/// Optimize a portfolio in the Markowitz mean-variance framework.
///
/// Solves the requested objective, reports per-asset risk and return
/// contributions and, when `frontier_points` is set, the efficient frontier.
pub fn optimize_portfolio(
    input: &MeanVarianceInput,
) -> PortfolioResult<ComputationOutput<MeanVarianceOutput>> {
    let start = Instant::now();

    let n = input.expected_returns.len();
    if input.asset_names.len() != n {
        return Err(PortfolioError::DimensionMismatch {
            context: "asset_names vs expected_returns".into(),
            expected: n,
            actual: input.asset_names.len(),
        });
    }

    let optimizer = MeanVarianceOptimizer::new(
        &input.expected_returns,
        &input.covariance_matrix,
        &input.bounds,
        input.covariance_ridge,
        &input.solver,
    )?;
    let mut warnings: Vec<String> = optimizer.warnings().to_vec();
    let rf = input.risk_free_rate;
    let mu = &input.expected_returns;
    let sigma = optimizer.covariance();

    let weights = match &input.objective {
        Objective::MaxSharpe => optimizer.max_sharpe(rf)?,
        Objective::MinVolatility => optimizer.min_volatility()?,
        Objective::EfficientReturn { target_return } => optimizer.efficient_return(*target_return)?,
        Objective::EfficientRisk { target_volatility } => {
            optimizer.efficient_risk(*target_volatility)?
        }
    };
    let performance = performance_unchecked(&weights, mu, sigma, rf);

    // --- Risk contributions ---
    let port_risk = performance.volatility;
    let sigma_w = mat_vec_multiply(sigma, &weights);
    let contributions: Vec<WeightContribution> = (0..n)
        .map(|i| {
            let mcr = if port_risk.is_zero() {
                Decimal::ZERO
            } else {
                sigma_w[i] / port_risk
            };
            WeightContribution {
                asset: input.asset_names[i].clone(),
                weight: weights[i],
                contribution_to_risk: weights[i] * mcr,
                contribution_to_return: weights[i] * mu[i],
            }
        })
        .collect();

    // --- Diversification ratio ---
    let weighted_avg_vol: Decimal = (0..n)
        .map(|i| weights[i] * sqrt_decimal(sigma[i][i]))
        .sum();
    let diversification_ratio = if port_risk.is_zero() {
        Decimal::ONE
    } else {
        weighted_avg_vol / port_risk
    };

    let hhi_concentration: Decimal = weights.iter().map(|w| *w * *w).sum();

    let efficient_frontier = match input.frontier_points {
        Some(points) => Some(optimizer.efficient_frontier(points, rf)?),
        None => None,
    };

    // --- Warnings ---
    for c in &contributions {
        if c.weight > dec!(0.40) {
            warnings.push(format!(
                "Concentrated position: {} has weight {:.4}",
                c.asset, c.weight
            ));
        }
    }
    if n > 1 && hhi_concentration > dec!(0.5) {
        warnings.push(format!("High concentration: HHI = {:.4}", hhi_concentration));
    }

    let output = MeanVarianceOutput {
        objective: input.objective.clone(),
        weights: contributions,
        performance,
        diversification_ratio,
        hhi_concentration,
        covariance_shift: optimizer.covariance_shift(),
        efficient_frontier,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Markowitz Mean-Variance Optimization",
        &serde_json::json!({
            "n_assets": n,
            "risk_free_rate": rf.to_string(),
            "objective": input.objective,
            "bounds": input.bounds,
            "frontier_points": input.frontier_points.unwrap_or(0),
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Add `ridge · trace/n` to the diagonal, escalating tenfold until the
/// matrix factors. Returns the matrix and the total shift (zero when the
/// input was already positive definite).
fn regularize(
    sigma: &[Vec<Decimal>],
    ridge: Decimal,
) -> PortfolioResult<(Vec<Vec<Decimal>>, Decimal)> {
    if is_positive_definite(sigma) {
        return Ok((sigma.to_vec(), Decimal::ZERO));
    }
    let n = sigma.len();
    if ridge.is_zero() {
        return Ok((sigma.to_vec(), Decimal::ZERO));
    }
    let trace: Decimal = (0..n).map(|i| sigma[i][i]).sum();
    let mut shift = if trace > Decimal::ZERO {
        ridge * trace / Decimal::from(n as u64)
    } else {
        ridge
    };

    for _ in 0..MAX_RIDGE_ATTEMPTS {
        let mut shifted = sigma.to_vec();
        for (i, row) in shifted.iter_mut().enumerate() {
            row[i] += shift;
        }
        if is_positive_definite(&shifted) {
            return Ok((shifted, shift));
        }
        shift *= dec!(10);
    }

    Err(PortfolioError::InvalidInput {
        field: "covariance_matrix".into(),
        reason: "matrix is not positive semidefinite".into(),
    })
}

/// Euclidean projection onto `{sum(w) = 1, lower <= w <= upper}` by
/// bisection on a uniform shift.
fn project_onto_bounds(v: &[Decimal], lower: &[Decimal], upper: &[Decimal]) -> Vec<Decimal> {
    let n = v.len();
    let clamp_at = |tau: Decimal| -> Vec<Decimal> {
        (0..n)
            .map(|i| (v[i] - tau).max(lower[i]).min(upper[i]))
            .collect()
    };

    let mut lo = (0..n)
        .map(|i| v[i] - upper[i])
        .fold(Decimal::MAX, Decimal::min);
    let mut hi = (0..n)
        .map(|i| v[i] - lower[i])
        .fold(Decimal::MIN, Decimal::max);

    for _ in 0..PROJECTION_ITERATIONS {
        if hi - lo <= PROJECTION_TOLERANCE {
            break;
        }
        let tau = (lo + hi) / dec!(2);
        let total: Decimal = clamp_at(tau).iter().sum();
        if total > Decimal::ONE {
            lo = tau;
        } else {
            hi = tau;
        }
    }

    let mut w = clamp_at((lo + hi) / dec!(2));
    let residual = Decimal::ONE - w.iter().sum::<Decimal>();
    if !residual.is_zero() {
        if let Some(i) = (0..n).find(|&i| {
            w[i] > lower[i] && w[i] < upper[i] && {
                let moved = w[i] + residual;
                moved >= lower[i] && moved <= upper[i]
            }
        }) {
            w[i] += residual;
        }
    }
    w
}

/// Equal weights for n assets.
fn equal_weights(n: usize) -> Vec<Decimal> {
    let w = Decimal::ONE / Decimal::from(n as u64);
    vec![w; n]
}

#[allow(clippy::needless_range_loop)]
fn validate_covariance_matrix(cov: &[Vec<Decimal>], n: usize) -> PortfolioResult<()> {
    if cov.len() != n {
        return Err(PortfolioError::DimensionMismatch {
            context: "covariance_matrix rows".into(),
            expected: n,
            actual: cov.len(),
        });
    }
    for row in cov {
        if row.len() != n {
            return Err(PortfolioError::DimensionMismatch {
                context: "covariance_matrix columns".into(),
                expected: n,
                actual: row.len(),
            });
        }
    }
    for i in 0..n {
        if cov[i][i] < Decimal::ZERO {
            return Err(PortfolioError::InvalidInput {
                field: "covariance_matrix".into(),
                reason: format!("negative variance {} on diagonal {}", cov[i][i], i),
            });
        }
        for j in (i + 1)..n {
            if (cov[i][j] - cov[j][i]).abs() > SYMMETRY_TOLERANCE {
                return Err(PortfolioError::InvalidInput {
                    field: "covariance_matrix".into(),
                    reason: format!(
                        "Not symmetric: [{},{}]={} != [{},{}]={}",
                        i, j, cov[i][j], j, i, cov[j][i]
                    ),
                });
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Tunable settings shared by every stage of the pipeline.
//!
//! All structs deserialize with `#[serde(default)]` so a configuration file
//! only needs to name the values it overrides.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::PortfolioError;
use crate::types::{Rate, ReturnFrequency, Weight};
use crate::PortfolioResult;

/// Annual risk-free rate used when none is supplied.
pub const DEFAULT_RISK_FREE_RATE: Rate = dec!(0.02);

/// Weights whose absolute value falls below this are cleaned to zero.
pub const DEFAULT_WEIGHT_CUTOFF: Weight = dec!(0.0001);

/// Decimal places kept by the weight cleaner.
pub const DEFAULT_ROUNDING_DP: u32 = 4;

/// Accepted deviation of a weight vector's sum from 1.
///
/// Cleaned weights are never renormalized, so consumers compare sums
/// against this constant instead of exact equality.
pub const WEIGHT_SUM_TOLERANCE: Decimal = dec!(0.0001);

/// Fraction of the average variance added to the diagonal of a singular
/// covariance matrix.
pub const DEFAULT_COVARIANCE_RIDGE: Decimal = dec!(0.000001);

/// Number of efficient-frontier points computed when none is requested.
pub const DEFAULT_FRONTIER_POINTS: u32 = 20;

// ---------------------------------------------------------------------------
// Weight bounds
// ---------------------------------------------------------------------------

/// Bounds for a single asset's weight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssetBounds {
    pub lower: Weight,
    pub upper: Weight,
}

/// Weight bounds applied by the optimizer.
///
/// `per_asset`, when present, replaces the uniform `lower`/`upper` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightBounds {
    pub lower: Weight,
    pub upper: Weight,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_asset: Option<Vec<AssetBounds>>,
}

impl Default for WeightBounds {
    fn default() -> Self {
        Self::long_only()
    }
}

impl WeightBounds {
    /// Every weight in [0, 1].
    pub fn long_only() -> Self {
        Self {
            lower: Decimal::ZERO,
            upper: Decimal::ONE,
            per_asset: None,
        }
    }

    pub fn uniform(lower: Weight, upper: Weight) -> Self {
        Self {
            lower,
            upper,
            per_asset: None,
        }
    }

    /// Expand to per-asset lower and upper vectors, checking that a fully
    /// invested portfolio exists inside them.
    pub fn resolve(&self, n: usize) -> PortfolioResult<(Vec<Weight>, Vec<Weight>)> {
        let (lower, upper): (Vec<Weight>, Vec<Weight>) = match &self.per_asset {
            Some(per_asset) => {
                if per_asset.len() != n {
                    return Err(PortfolioError::DimensionMismatch {
                        context: "bounds.per_asset".into(),
                        expected: n,
                        actual: per_asset.len(),
                    });
                }
                per_asset.iter().map(|b| (b.lower, b.upper)).unzip()
            }
            None => (vec![self.lower; n], vec![self.upper; n]),
        };

        for (i, (lo, hi)) in lower.iter().zip(upper.iter()).enumerate() {
            if lo > hi {
                return Err(PortfolioError::InvalidInput {
                    field: format!("bounds[{}]", i),
                    reason: format!("lower bound {} exceeds upper bound {}", lo, hi),
                });
            }
        }

        let lower_sum: Decimal = lower.iter().sum();
        let upper_sum: Decimal = upper.iter().sum();
        if lower_sum > Decimal::ONE || upper_sum < Decimal::ONE {
            return Err(PortfolioError::InvalidInput {
                field: "bounds".into(),
                reason: format!(
                    "no fully invested portfolio fits: lower bounds sum to {}, upper bounds to {}",
                    lower_sum, upper_sum
                ),
            });
        }

        Ok((lower, upper))
    }

    /// True when the bounds are the plain long-only box: lower 0 and an
    /// upper bound that never binds for a fully invested portfolio.
    pub fn is_long_only_box(&self, n: usize) -> bool {
        match &self.per_asset {
            Some(per_asset) => {
                per_asset.len() == n
                    && per_asset
                        .iter()
                        .all(|b| b.lower.is_zero() && b.upper >= Decimal::ONE)
            }
            None => self.lower.is_zero() && self.upper >= Decimal::ONE,
        }
    }
}

// ---------------------------------------------------------------------------
// Stage settings
// ---------------------------------------------------------------------------

/// Numerical settings for the quadratic-program and gradient solvers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    pub max_iter: u64,
    pub eps_abs: Decimal,
    pub eps_rel: Decimal,
    /// Initial ADMM step size.
    pub rho: Decimal,
    /// Proximal regularization keeping the linear system positive definite.
    pub sigma: Decimal,
    /// Over-relaxation factor, in (0, 2).
    pub alpha: Decimal,
    /// Re-evaluate rho every this many iterations (0 disables).
    pub adaptive_rho_interval: u64,
    /// Refine the ADMM point by an exact solve on the detected active set.
    pub polish: bool,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iter: 20_000,
            eps_abs: dec!(0.0000001),
            eps_rel: dec!(0.0000001),
            rho: dec!(0.1),
            sigma: dec!(0.000001),
            alpha: dec!(1.6),
            adaptive_rho_interval: 25,
            polish: true,
        }
    }
}

/// Weight cleaner settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningSettings {
    pub cutoff: Weight,
    /// Decimal places to round to; `None` leaves weights unrounded.
    pub rounding: Option<u32>,
}

impl Default for CleaningSettings {
    fn default() -> Self {
        Self {
            cutoff: DEFAULT_WEIGHT_CUTOFF,
            rounding: Some(DEFAULT_ROUNDING_DP),
        }
    }
}

/// How continuous weights are turned into share counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationMethod {
    /// Floor allocation, exact branch-and-bound over the residual cash,
    /// then greedy top-up.
    #[default]
    IntegerProgram,
    /// Floor allocation followed by greedy top-up only.
    Greedy,
}

impl std::str::FromStr for AllocationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "integer_program" | "integer-program" | "ilp" | "lp" => {
                Ok(AllocationMethod::IntegerProgram)
            }
            "greedy" => Ok(AllocationMethod::Greedy),
            _ => Err(format!("Unknown allocation method '{}'. Use: lp, greedy", s)),
        }
    }
}

/// Discrete allocation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationSettings {
    pub method: AllocationMethod,
    /// Branch-and-bound node budget.
    pub max_nodes: u64,
}

impl Default for AllocationSettings {
    fn default() -> Self {
        Self {
            method: AllocationMethod::IntegerProgram,
            max_nodes: 1_000_000,
        }
    }
}

/// Complete settings for the estimate → optimize → clean → allocate flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortfolioSettings {
    pub frequency: ReturnFrequency,
    /// Explicit periods-per-year; overrides `frequency` when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annualization_factor: Option<Decimal>,
    pub risk_free_rate: Rate,
    pub bounds: WeightBounds,
    pub covariance_ridge: Decimal,
    pub solver: SolverSettings,
    pub cleaning: CleaningSettings,
    pub allocation: AllocationSettings,
}

impl Default for PortfolioSettings {
    fn default() -> Self {
        Self {
            frequency: ReturnFrequency::Daily,
            annualization_factor: None,
            risk_free_rate: DEFAULT_RISK_FREE_RATE,
            bounds: WeightBounds::long_only(),
            covariance_ridge: DEFAULT_COVARIANCE_RIDGE,
            solver: SolverSettings::default(),
            cleaning: CleaningSettings::default(),
            allocation: AllocationSettings::default(),
        }
    }
}

impl PortfolioSettings {
    pub fn periods_per_year(&self) -> Decimal {
        self.annualization_factor
            .unwrap_or_else(|| self.frequency.periods_per_year())
    }

    pub fn validate(&self) -> PortfolioResult<()> {
        if self.periods_per_year() <= Decimal::ZERO {
            return Err(PortfolioError::InvalidInput {
                field: "annualization_factor".into(),
                reason: "must be positive".into(),
            });
        }
        if self.covariance_ridge < Decimal::ZERO {
            return Err(PortfolioError::InvalidInput {
                field: "covariance_ridge".into(),
                reason: "must be non-negative".into(),
            });
        }
        if self.cleaning.cutoff < Decimal::ZERO {
            return Err(PortfolioError::InvalidInput {
                field: "cleaning.cutoff".into(),
                reason: "must be non-negative".into(),
            });
        }
        self.solver.validate()
    }
}

impl SolverSettings {
    pub fn validate(&self) -> PortfolioResult<()> {
        if self.max_iter == 0 {
            return Err(PortfolioError::InvalidInput {
                field: "solver.max_iter".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.rho <= Decimal::ZERO || self.sigma <= Decimal::ZERO {
            return Err(PortfolioError::InvalidInput {
                field: "solver".into(),
                reason: "rho and sigma must be positive".into(),
            });
        }
        if self.alpha <= Decimal::ZERO || self.alpha >= dec!(2) {
            return Err(PortfolioError::InvalidInput {
                field: "solver.alpha".into(),
                reason: "relaxation must lie in (0, 2)".into(),
            });
        }
        if self.eps_abs < Decimal::ZERO || self.eps_rel < Decimal::ZERO {
            return Err(PortfolioError::InvalidInput {
                field: "solver".into(),
                reason: "tolerances must be non-negative".into(),
            });
        }
        Ok(())
    }
}

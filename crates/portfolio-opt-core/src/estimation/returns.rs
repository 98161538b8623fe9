use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Instant;
use tracing::debug;

use crate::error::PortfolioError;
use crate::linalg::sqrt_decimal;
use crate::types::{with_metadata, ComputationOutput, PriceHistory, PriceSnapshot, Rate, ReturnFrequency};
use crate::PortfolioResult;

/// Return observations below this count trigger a short-history warning.
const SHORT_HISTORY_OBSERVATIONS: usize = 60;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Simple period returns derived from a price history.
///
/// One row per history row after the first; a cell is `None` when the asset
/// had no observed price yet. Rows where every asset is undefined are dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnSeries {
    pub assets: Vec<String>,
    pub dates: Vec<NaiveDate>,
    pub returns: Vec<Vec<Option<Decimal>>>,
}

impl ReturnSeries {
    /// Defined returns of one asset in date order.
    pub fn column(&self, asset_idx: usize) -> Vec<Decimal> {
        self.returns.iter().filter_map(|row| row[asset_idx]).collect()
    }

    /// Rows where both assets have a defined return.
    fn paired(&self, i: usize, j: usize) -> (Vec<Decimal>, Vec<Decimal>) {
        self.returns
            .iter()
            .filter_map(|row| match (row[i], row[j]) {
                (Some(x), Some(y)) => Some((x, y)),
                _ => None,
            })
            .unzip()
    }
}

/// Annualized expected returns and covariance of a set of assets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReturnEstimate {
    pub assets: Vec<String>,
    pub expected_returns: Vec<Rate>,
    pub covariance_matrix: Vec<Vec<Decimal>>,
}

/// Input for the estimation entry point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimationInput {
    pub history: PriceHistory,
    /// Observation frequency; defaults to daily (252 periods per year).
    #[serde(default)]
    pub frequency: ReturnFrequency,
    /// Explicit periods per year, overriding `frequency`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annualization_factor: Option<Decimal>,
}

/// Per-asset statistics reported by the estimator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetStatistics {
    pub asset: String,
    pub expected_return: Rate,
    pub volatility: Rate,
    pub observations: usize,
    pub latest_price: Decimal,
}

/// Output of the estimation entry point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimationOutput {
    pub assets: Vec<AssetStatistics>,
    pub expected_returns: Vec<Rate>,
    pub covariance_matrix: Vec<Vec<Decimal>>,
    pub annualization_factor: Decimal,
    pub return_observations: usize,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Estimate annualized expected returns, covariance and per-asset
/// volatility from a price history.
pub fn estimate_risk_return(
    input: &EstimationInput,
) -> PortfolioResult<ComputationOutput<EstimationOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let factor = input
        .annualization_factor
        .unwrap_or_else(|| input.frequency.periods_per_year());

    let history = &input.history;
    let returns = returns_from_prices(history)?;
    let estimate = estimate_from_returns(&returns, factor)?;
    let latest = latest_prices(history)?;

    let n_obs = returns.returns.len();
    if n_obs < SHORT_HISTORY_OBSERVATIONS {
        warnings.push(format!(
            "Short history: only {} return observations; estimates are noisy",
            n_obs
        ));
    }
    let filled = count_filled_cells(history);
    if filled > 0 {
        warnings.push(format!(
            "{} missing price cells were forward-filled from the previous observation",
            filled
        ));
    }

    let assets: Vec<AssetStatistics> = estimate
        .assets
        .iter()
        .enumerate()
        .map(|(i, name)| AssetStatistics {
            asset: name.clone(),
            expected_return: estimate.expected_returns[i],
            volatility: sqrt_decimal(estimate.covariance_matrix[i][i]),
            observations: returns.column(i).len(),
            latest_price: latest.get(name).copied().unwrap_or_default(),
        })
        .collect();

    let output = EstimationOutput {
        assets,
        expected_returns: estimate.expected_returns,
        covariance_matrix: estimate.covariance_matrix,
        annualization_factor: factor,
        return_observations: n_obs,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Mean historical simple return and sample covariance, annualized",
        &serde_json::json!({
            "n_assets": history.n_assets(),
            "price_rows": history.n_rows(),
            "annualization_factor": factor.to_string(),
            "returns": "simple",
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// Expected returns and covariance in one pass over the return series.
///
/// A two-row history passes validation but yields a single return, and the
/// n-1 covariance needs two. Expect `InsufficientData` unless every asset
/// pair shares at least two returns, i.e. three overlapping price rows.
pub fn estimate(history: &PriceHistory, factor: Decimal) -> PortfolioResult<RiskReturnEstimate> {
    let returns = returns_from_prices(history)?;
    estimate_from_returns(&returns, factor)
}

/// Simple period returns `p[t]/p[t-1] - 1`, forward-filling gaps.
pub fn returns_from_prices(history: &PriceHistory) -> PortfolioResult<ReturnSeries> {
    validate_history(history)?;

    let n = history.n_assets();
    let mut last: Vec<Option<Decimal>> = history.rows[0].prices.clone();
    let mut dates = Vec::with_capacity(history.n_rows() - 1);
    let mut rows = Vec::with_capacity(history.n_rows() - 1);

    for row in &history.rows[1..] {
        let mut out: Vec<Option<Decimal>> = vec![None; n];
        for i in 0..n {
            let current = row.prices[i].or(last[i]);
            if let (Some(prev), Some(cur)) = (last[i], current) {
                out[i] = Some(cur / prev - Decimal::ONE);
            }
            last[i] = current;
        }
        if out.iter().any(|r| r.is_some()) {
            dates.push(row.date);
            rows.push(out);
        }
    }

    Ok(ReturnSeries {
        assets: history.assets.clone(),
        dates,
        returns: rows,
    })
}

/// Arithmetic mean of simple returns, multiplied by `factor`.
pub fn mean_historical_return(history: &PriceHistory, factor: Decimal) -> PortfolioResult<Vec<Rate>> {
    validate_factor(factor)?;
    let returns = returns_from_prices(history)?;
    expected_returns_from(&returns, factor)
}

/// Sample covariance (n-1 divisor, pairwise-complete rows) of simple
/// returns, multiplied by `factor`.
///
/// Fails with `InsufficientData` when an asset or pair has fewer than two
/// returns, so a history needs three price rows even though two are
/// accepted for expected returns.
pub fn sample_covariance(
    history: &PriceHistory,
    factor: Decimal,
) -> PortfolioResult<Vec<Vec<Decimal>>> {
    validate_factor(factor)?;
    let returns = returns_from_prices(history)?;
    covariance_from(&returns, factor)
}

/// Last observed price of every asset.
pub fn latest_prices(history: &PriceHistory) -> PortfolioResult<PriceSnapshot> {
    let mut snapshot = PriceSnapshot::new();
    for (i, asset) in history.assets.iter().enumerate() {
        let last = history
            .rows
            .iter()
            .rev()
            .find_map(|row| row.prices.get(i).copied().flatten())
            .ok_or_else(|| {
                PortfolioError::InsufficientData(format!("{} has no observed price", asset))
            })?;
        snapshot.insert(asset.clone(), last);
    }
    Ok(snapshot)
}

// ---------------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------------

fn estimate_from_returns(returns: &ReturnSeries, factor: Decimal) -> PortfolioResult<RiskReturnEstimate> {
    validate_factor(factor)?;
    let expected_returns = expected_returns_from(returns, factor)?;
    let covariance_matrix = covariance_from(returns, factor)?;
    debug!(
        assets = returns.assets.len(),
        observations = returns.returns.len(),
        %factor,
        "estimated expected returns and covariance"
    );
    Ok(RiskReturnEstimate {
        assets: returns.assets.clone(),
        expected_returns,
        covariance_matrix,
    })
}

fn expected_returns_from(returns: &ReturnSeries, factor: Decimal) -> PortfolioResult<Vec<Rate>> {
    (0..returns.assets.len())
        .map(|i| {
            let col = returns.column(i);
            if col.is_empty() {
                return Err(PortfolioError::InsufficientData(format!(
                    "{} has no return observations",
                    returns.assets[i]
                )));
            }
            Ok(mean(&col) * factor)
        })
        .collect()
}

#[allow(clippy::needless_range_loop)]
fn covariance_from(returns: &ReturnSeries, factor: Decimal) -> PortfolioResult<Vec<Vec<Decimal>>> {
    let n = returns.assets.len();
    let mut cov = vec![vec![Decimal::ZERO; n]; n];

    for i in 0..n {
        for j in i..n {
            let (x, y) = returns.paired(i, j);
            if x.len() < 2 {
                let context = if i == j {
                    format!("{} has {} return observation(s)", returns.assets[i], x.len())
                } else {
                    format!(
                        "{} and {} share {} overlapping return observation(s)",
                        returns.assets[i],
                        returns.assets[j],
                        x.len()
                    )
                };
                return Err(PortfolioError::InsufficientData(format!(
                    "{}; a sample covariance needs at least 2",
                    context
                )));
            }
            let value = sample_cov(&x, &y) * factor;
            cov[i][j] = value;
            cov[j][i] = value;
        }
    }

    Ok(cov)
}

fn mean(values: &[Decimal]) -> Decimal {
    let sum: Decimal = values.iter().sum();
    sum / Decimal::from(values.len() as i64)
}

fn sample_cov(x: &[Decimal], y: &[Decimal]) -> Decimal {
    let mx = mean(x);
    let my = mean(y);
    let sum: Decimal = x
        .iter()
        .zip(y.iter())
        .map(|(a, b)| (*a - mx) * (*b - my))
        .sum();
    sum / Decimal::from((x.len() - 1) as i64)
}

fn count_filled_cells(history: &PriceHistory) -> usize {
    (0..history.n_assets())
        .map(|i| {
            let col: Vec<Option<Decimal>> = history.column(i).collect();
            match col.iter().position(|p| p.is_some()) {
                Some(first) => col[first..].iter().filter(|p| p.is_none()).count(),
                None => 0,
            }
        })
        .sum()
}

fn validate_factor(factor: Decimal) -> PortfolioResult<()> {
    if factor <= Decimal::ZERO {
        return Err(PortfolioError::InvalidInput {
            field: "annualization_factor".into(),
            reason: format!("must be positive, got {}", factor),
        });
    }
    Ok(())
}

fn validate_history(history: &PriceHistory) -> PortfolioResult<()> {
    let n = history.n_assets();
    if n == 0 {
        return Err(PortfolioError::InsufficientData(
            "At least one asset required".into(),
        ));
    }
    if history.n_rows() < 2 {
        return Err(PortfolioError::InsufficientData(format!(
            "At least 2 price rows required, got {}",
            history.n_rows()
        )));
    }

    let mut seen = HashSet::new();
    for asset in &history.assets {
        if !seen.insert(asset.as_str()) {
            return Err(PortfolioError::InvalidInput {
                field: "assets".into(),
                reason: format!("duplicate asset '{}'", asset),
            });
        }
    }

    for (r, row) in history.rows.iter().enumerate() {
        if row.prices.len() != n {
            return Err(PortfolioError::DimensionMismatch {
                context: format!("price row {} ({})", r, row.date),
                expected: n,
                actual: row.prices.len(),
            });
        }
        if r > 0 && row.date <= history.rows[r - 1].date {
            return Err(PortfolioError::InvalidInput {
                field: "rows".into(),
                reason: format!(
                    "dates must be strictly increasing: {} follows {}",
                    row.date,
                    history.rows[r - 1].date
                ),
            });
        }
        for (i, price) in row.prices.iter().enumerate() {
            if let Some(p) = price {
                if *p <= Decimal::ZERO {
                    return Err(PortfolioError::InvalidPrice {
                        asset: history.assets[i].clone(),
                        at: row.date.to_string(),
                        price: *p,
                    });
                }
            }
        }
    }

    for (i, asset) in history.assets.iter().enumerate() {
        let observed = history.column(i).filter(|p| p.is_some()).count();
        if observed < 2 {
            return Err(PortfolioError::InsufficientData(format!(
                "{} has {} price observation(s); at least 2 required",
                asset, observed
            )));
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PriceRow;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn history(cols: &[&str], rows: Vec<Vec<Option<Decimal>>>) -> PriceHistory {
        PriceHistory::new(
            cols.iter().map(|c| c.to_string()).collect(),
            rows.into_iter()
                .enumerate()
                .map(|(i, prices)| PriceRow {
                    date: day(i as u32 + 1),
                    prices,
                })
                .collect(),
        )
    }

    fn two_asset_history() -> PriceHistory {
        history(
            &["A", "B"],
            vec![
                vec![Some(dec!(100)), Some(dec!(50))],
                vec![Some(dec!(110)), Some(dec!(50))],
                vec![Some(dec!(99)), Some(dec!(55))],
                vec![Some(dec!(108.9)), Some(dec!(49.5))],
            ],
        )
    }

    #[test]
    fn test_simple_returns_drop_first_row() {
        let r = returns_from_prices(&two_asset_history()).unwrap();
        assert_eq!(r.returns.len(), 3);
        assert_eq!(r.dates[0], day(2));
        assert_eq!(r.returns[0], vec![Some(dec!(0.1)), Some(dec!(0))]);
        assert_eq!(r.returns[1], vec![Some(dec!(-0.1)), Some(dec!(0.1))]);
        assert_eq!(r.returns[2], vec![Some(dec!(0.1)), Some(dec!(-0.1))]);
    }

    #[test]
    fn test_mean_return_annualized() {
        let mu = mean_historical_return(&two_asset_history(), dec!(252)).unwrap();
        // A: (0.1 - 0.1 + 0.1)/3 * 252 = 8.4
        assert!((mu[0] - dec!(8.4)).abs() < dec!(0.0000000001));
        // B: (0 + 0.1 - 0.1)/3 * 252 = 0
        assert_eq!(mu[1], Decimal::ZERO);
    }

    #[test]
    fn test_sample_covariance_values() {
        let cov = sample_covariance(&two_asset_history(), Decimal::ONE).unwrap();
        // A returns 0.1, -0.1, 0.1: mean 1/30, deviations 1/15, -2/15, 1/15
        // var = (1/225 + 4/225 + 1/225) / 2 = 1/75
        assert!((cov[0][0] - dec!(1) / dec!(75)).abs() < dec!(0.0000000001));
        // B returns 0, 0.1, -0.1 have mean 0
        let expected_ab = ((dec!(0.1) - dec!(1) / dec!(30)) * dec!(0)
            + (dec!(-0.1) - dec!(1) / dec!(30)) * dec!(0.1)
            + (dec!(0.1) - dec!(1) / dec!(30)) * dec!(-0.1))
            / dec!(2);
        assert!((cov[0][1] - expected_ab).abs() < dec!(0.0000000001));
        assert_eq!(cov[0][1], cov[1][0]);
    }

    #[test]
    fn test_covariance_scales_with_factor() {
        let daily = sample_covariance(&two_asset_history(), Decimal::ONE).unwrap();
        let annual = sample_covariance(&two_asset_history(), dec!(252)).unwrap();
        assert_eq!(annual[1][1], daily[1][1] * dec!(252));
    }

    #[test]
    fn test_forward_fill_missing_cell() {
        let h = history(
            &["A", "B"],
            vec![
                vec![Some(dec!(10)), Some(dec!(20))],
                vec![None, Some(dec!(22))],
                vec![Some(dec!(12)), Some(dec!(22))],
            ],
        );
        let r = returns_from_prices(&h).unwrap();
        assert_eq!(r.returns[0][0], Some(Decimal::ZERO));
        assert_eq!(r.returns[1][0], Some(dec!(0.2)));
    }

    #[test]
    fn test_leading_gap_stays_undefined() {
        let h = history(
            &["A", "B"],
            vec![
                vec![Some(dec!(10)), None],
                vec![Some(dec!(11)), Some(dec!(20))],
                vec![Some(dec!(12.1)), Some(dec!(21))],
                vec![Some(dec!(11)), Some(dec!(20))],
            ],
        );
        let r = returns_from_prices(&h).unwrap();
        assert_eq!(r.returns[0][1], None);
        assert_eq!(r.column(1).len(), 2);
        assert_eq!(r.column(0).len(), 3);
    }

    #[test]
    fn test_reject_single_row() {
        let h = history(&["A"], vec![vec![Some(dec!(10))]]);
        assert!(matches!(
            returns_from_prices(&h),
            Err(PortfolioError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_reject_asset_with_one_price() {
        let h = history(
            &["A", "B"],
            vec![
                vec![Some(dec!(10)), None],
                vec![Some(dec!(11)), Some(dec!(5))],
            ],
        );
        assert!(matches!(
            mean_historical_return(&h, dec!(252)),
            Err(PortfolioError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_reject_non_positive_price() {
        let h = history(
            &["A", "B"],
            vec![
                vec![Some(dec!(10)), Some(dec!(5))],
                vec![Some(dec!(11)), Some(dec!(0))],
            ],
        );
        match returns_from_prices(&h) {
            Err(PortfolioError::InvalidPrice { asset, at, price }) => {
                assert_eq!(asset, "B");
                assert_eq!(at, "2024-01-02");
                assert_eq!(price, Decimal::ZERO);
            }
            other => panic!("expected InvalidPrice, got {:?}", other),
        }
    }

    #[test]
    fn test_reject_unordered_dates() {
        let mut h = two_asset_history();
        h.rows.swap(1, 2);
        assert!(matches!(
            returns_from_prices(&h),
            Err(PortfolioError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_reject_ragged_row() {
        let mut h = two_asset_history();
        h.rows[2].prices.pop();
        assert!(matches!(
            returns_from_prices(&h),
            Err(PortfolioError::DimensionMismatch { expected: 2, actual: 1, .. })
        ));
    }

    #[test]
    fn test_two_rows_insufficient_for_covariance() {
        let h = history(
            &["A"],
            vec![vec![Some(dec!(10))], vec![Some(dec!(11))]],
        );
        assert!(mean_historical_return(&h, dec!(252)).is_ok());
        assert!(matches!(
            sample_covariance(&h, dec!(252)),
            Err(PortfolioError::InsufficientData(_))
        ));
        assert!(matches!(
            estimate(&h, dec!(252)),
            Err(PortfolioError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_latest_prices_skip_trailing_gap() {
        let h = history(
            &["A", "B"],
            vec![
                vec![Some(dec!(10)), Some(dec!(20))],
                vec![Some(dec!(11)), None],
            ],
        );
        let snap = latest_prices(&h).unwrap();
        assert_eq!(snap["A"], dec!(11));
        assert_eq!(snap["B"], dec!(20));
    }

    #[test]
    fn test_estimation_entry_point() {
        let input = EstimationInput {
            history: two_asset_history(),
            frequency: ReturnFrequency::Daily,
            annualization_factor: None,
        };
        let out = estimate_risk_return(&input).unwrap();
        assert_eq!(out.result.return_observations, 3);
        assert_eq!(out.result.assets[0].observations, 3);
        assert_eq!(out.result.assets[0].latest_price, dec!(108.9));
        assert!(out.warnings.iter().any(|w| w.contains("Short history")));
    }
}

//! End-to-end flow: price history → estimates → max-Sharpe weights →
//! cleaned weights → whole shares.
//!
//! Every stage receives its inputs as values and returns new values; the
//! pipeline only threads them through and gathers the warnings each stage
//! reports.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use crate::allocation::discrete::{allocate_shares, AllocationResult, DiscreteAllocationInput};
use crate::config::PortfolioSettings;
use crate::estimation::returns::{estimate_risk_return, latest_prices, EstimationInput};
use crate::optimization::cleaning::{clean_weights_output, CleaningInput};
use crate::optimization::mean_variance::{
    portfolio_performance, MeanVarianceOptimizer, PortfolioPerformance,
};
use crate::types::{
    label_weights, with_metadata, AssetWeight, ComputationOutput, Money, PriceHistory,
    PriceSnapshot, Rate, Weight,
};
use crate::PortfolioResult;

/// Input to [`run_pipeline`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineInput {
    pub history: PriceHistory,
    pub budget: Money,
    #[serde(default)]
    pub settings: PortfolioSettings,
    /// Current prices; derived from the last row of `history` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_prices: Option<PriceSnapshot>,
}

/// Every intermediate value of a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub assets: Vec<String>,
    pub expected_returns: Vec<Rate>,
    pub covariance_matrix: Vec<Vec<Decimal>>,
    pub raw_weights: Vec<AssetWeight>,
    pub cleaned_weights: Vec<AssetWeight>,
    /// Performance of the cleaned weights.
    pub performance: PortfolioPerformance,
    pub latest_prices: PriceSnapshot,
    pub allocation: AllocationResult,
}

/// Run estimate → optimize → clean → allocate with one set of settings.
pub fn run_pipeline(input: &PipelineInput) -> PortfolioResult<ComputationOutput<PipelineOutput>> {
    let start = Instant::now();
    let settings = &input.settings;
    settings.validate()?;
    let mut warnings: Vec<String> = Vec::new();

    // --- Estimate ---
    let estimation = estimate_risk_return(&EstimationInput {
        history: input.history.clone(),
        frequency: settings.frequency,
        annualization_factor: settings.annualization_factor,
    })?;
    warnings.extend(estimation.warnings);
    let assets = input.history.assets.clone();
    let mu = estimation.result.expected_returns;
    let sigma = estimation.result.covariance_matrix;

    // --- Optimize ---
    let optimizer = MeanVarianceOptimizer::new(
        &mu,
        &sigma,
        &settings.bounds,
        settings.covariance_ridge,
        &settings.solver,
    )?;
    warnings.extend(optimizer.warnings().iter().cloned());
    let raw: Vec<Weight> = optimizer.max_sharpe(settings.risk_free_rate)?;
    let raw_weights = label_weights(&assets, &raw);

    // --- Clean ---
    let cleaning = clean_weights_output(&CleaningInput {
        weights: raw_weights.clone(),
        settings: settings.cleaning.clone(),
    })?;
    warnings.extend(cleaning.warnings);
    let cleaned_weights = cleaning.result.weights;
    let cleaned: Vec<Weight> = cleaned_weights.iter().map(|w| w.weight).collect();
    let performance = portfolio_performance(&cleaned, &mu, &sigma, settings.risk_free_rate)?;

    // --- Allocate ---
    let prices = match &input.latest_prices {
        Some(p) => p.clone(),
        None => latest_prices(&input.history)?,
    };
    let allocation = allocate_shares(&DiscreteAllocationInput {
        weights: cleaned_weights.clone(),
        prices: prices.clone(),
        budget: input.budget,
        settings: settings.allocation.clone(),
    })?;
    warnings.extend(allocation.warnings);

    debug!(
        assets = assets.len(),
        leftover = %allocation.result.leftover,
        "pipeline finished"
    );

    let output = PipelineOutput {
        assets,
        expected_returns: mu,
        covariance_matrix: sigma,
        raw_weights,
        cleaned_weights,
        performance,
        latest_prices: prices,
        allocation: allocation.result,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Historical estimation, max-Sharpe optimization, weight cleaning, discrete allocation",
        &serde_json::json!({
            "budget": input.budget.to_string(),
            "risk_free_rate": settings.risk_free_rate.to_string(),
            "periods_per_year": settings.periods_per_year().to_string(),
            "allocation_method": settings.allocation.method,
            "cutoff": settings.cleaning.cutoff.to_string(),
            "rounding": settings.cleaning.rounding,
        }),
        warnings,
        elapsed,
        output,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PortfolioError;
    use crate::types::PriceRow;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn history() -> PriceHistory {
        let prices = [
            [dec!(100), dec!(50)],
            [dec!(102), dec!(50.5)],
            [dec!(101), dec!(50.2)],
            [dec!(105), dec!(50.9)],
            [dec!(107), dec!(50.6)],
            [dec!(106), dec!(51.3)],
            [dec!(110), dec!(51.0)],
        ];
        let d0 = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let rows = prices
            .iter()
            .enumerate()
            .map(|(i, p)| PriceRow {
                date: d0 + chrono::Duration::days(i as i64),
                prices: p.iter().map(|v| Some(*v)).collect(),
            })
            .collect();
        PriceHistory::new(vec!["AAA".into(), "BBB".into()], rows)
    }

    #[test]
    fn test_pipeline_end_to_end() {
        let out = run_pipeline(&PipelineInput {
            history: history(),
            budget: dec!(10000),
            settings: PortfolioSettings::default(),
            latest_prices: None,
        })
        .unwrap();
        let res = &out.result;

        let raw_sum: Decimal = res.raw_weights.iter().map(|w| w.weight).sum();
        assert!((raw_sum - Decimal::ONE).abs() < dec!(0.0001));
        for w in &res.cleaned_weights {
            assert!(w.weight >= Decimal::ZERO && w.weight <= Decimal::ONE);
        }

        let alloc = &res.allocation;
        assert_eq!(alloc.spent + alloc.leftover, dec!(10000));
        assert_eq!(res.latest_prices["AAA"], dec!(110));
        let cheapest = alloc
            .positions
            .iter()
            .map(|p| p.price)
            .min()
            .unwrap();
        assert!(alloc.leftover < cheapest);
        // seven rows is a short history
        assert!(out.warnings.iter().any(|w| w.contains("Short history")));
    }

    #[test]
    fn test_pipeline_uses_supplied_prices() {
        let mut prices = PriceSnapshot::new();
        prices.insert("AAA".into(), dec!(200));
        prices.insert("BBB".into(), dec!(40));
        let out = run_pipeline(&PipelineInput {
            history: history(),
            budget: dec!(5000),
            settings: PortfolioSettings::default(),
            latest_prices: Some(prices),
        })
        .unwrap();
        assert_eq!(out.result.latest_prices["AAA"], dec!(200));
        for p in &out.result.allocation.positions {
            assert_eq!(p.value, p.price * Decimal::from(p.shares));
        }
    }

    #[test]
    fn test_pipeline_high_risk_free_rate() {
        let settings = PortfolioSettings {
            risk_free_rate: dec!(1000),
            ..Default::default()
        };
        let err = run_pipeline(&PipelineInput {
            history: history(),
            budget: dec!(10000),
            settings,
            latest_prices: None,
        })
        .unwrap_err();
        assert!(matches!(err, PortfolioError::NoFeasibleTangencyPortfolio { .. }));
    }
}

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::{CleaningSettings, WEIGHT_SUM_TOLERANCE};
use crate::types::{with_metadata, AssetWeight, ComputationOutput, Weight};
use crate::PortfolioResult;

/// Input to the weight cleaner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleaningInput {
    pub weights: Vec<AssetWeight>,
    #[serde(default)]
    pub settings: CleaningSettings,
}

/// Cleaned weights and how far their sum drifted from 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleaningOutput {
    pub weights: Vec<AssetWeight>,
    pub weight_sum: Decimal,
    /// 1 - weight_sum
    pub residual: Decimal,
    /// Assets whose weight was set to zero.
    pub zeroed: Vec<String>,
}

/// Zero out negligible weights and round the rest.
///
/// A weight with `|w| < cutoff` becomes exactly zero; others are rounded to
/// `rounding` decimal places with banker's rounding. A weight that rounds to
/// below the cutoff is zeroed too, so cleaning twice changes nothing. The
/// result is not renormalized.
pub fn clean_weights(weights: &[Weight], settings: &CleaningSettings) -> Vec<Weight> {
    weights
        .iter()
        .map(|w| clean_one(*w, settings))
        .collect()
}

fn clean_one(w: Weight, settings: &CleaningSettings) -> Weight {
    if w.abs() < settings.cutoff {
        return Decimal::ZERO;
    }
    let rounded = match settings.rounding {
        Some(dp) => w.round_dp(dp),
        None => w,
    };
    if rounded.is_zero() || rounded.abs() < settings.cutoff {
        Decimal::ZERO
    } else {
        rounded
    }
}

/// Clean a labelled weight vector, reporting the sum drift as a warning when
/// it exceeds [`WEIGHT_SUM_TOLERANCE`].
pub fn clean_weights_output(
    input: &CleaningInput,
) -> PortfolioResult<ComputationOutput<CleaningOutput>> {
    let start = Instant::now();
    let mut warnings = Vec::new();

    let raw: Vec<Weight> = input.weights.iter().map(|w| w.weight).collect();
    let cleaned = clean_weights(&raw, &input.settings);

    let zeroed: Vec<String> = input
        .weights
        .iter()
        .zip(cleaned.iter())
        .filter(|(orig, c)| !orig.weight.is_zero() && c.is_zero())
        .map(|(orig, _)| orig.asset.clone())
        .collect();
    debug!(zeroed = zeroed.len(), "weights cleaned");

    let weight_sum: Decimal = cleaned.iter().sum();
    let residual = Decimal::ONE - weight_sum;
    if residual.abs() > WEIGHT_SUM_TOLERANCE {
        warn!(%weight_sum, "cleaned weights drift from full investment");
        warnings.push(format!(
            "Cleaned weights sum to {} (residual {}), outside tolerance {}",
            weight_sum, residual, WEIGHT_SUM_TOLERANCE
        ));
    }

    let weights = input
        .weights
        .iter()
        .zip(cleaned)
        .map(|(orig, w)| AssetWeight::new(orig.asset.clone(), w))
        .collect();

    let output = CleaningOutput {
        weights,
        weight_sum,
        residual,
        zeroed,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Weight cleaning (cutoff and banker's rounding, no renormalization)",
        &serde_json::json!({
            "cutoff": input.settings.cutoff.to_string(),
            "rounding": input.settings.rounding,
            "sum_tolerance": WEIGHT_SUM_TOLERANCE.to_string(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

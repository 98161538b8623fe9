use clap::Args;
use serde_json::Value;
use tracing::info;

use portfolio_opt_core::config::{AllocationMethod, PortfolioSettings, WeightBounds};
use portfolio_opt_core::pipeline::{self, PipelineInput};
use portfolio_opt_core::{AssetWeight, ReturnFrequency};
use rust_decimal::Decimal;

use crate::input;

#[derive(Args)]
pub struct RunArgs {
    /// Wide price table (`date,A,B,...`, .csv) or PriceHistory (.json)
    #[arg(long)]
    pub history: String,
    /// Current prices as a JSON map or `asset,price` CSV; defaults to the
    /// last observed price of each asset
    #[arg(long)]
    pub prices: Option<String>,
    /// Cash budget
    #[arg(long)]
    pub budget: Decimal,
    /// lp (branch-and-bound, default) or greedy
    #[arg(long)]
    pub method: Option<AllocationMethod>,
    /// Annual risk-free rate
    #[arg(long)]
    pub risk_free_rate: Option<Decimal>,
    /// Observation frequency: daily, weekly, monthly, quarterly, annual
    #[arg(long)]
    pub frequency: Option<ReturnFrequency>,
    /// Per-asset weight cap (lower bound stays 0)
    #[arg(long)]
    pub max_weight: Option<Decimal>,
    /// Weights below this are set to zero
    #[arg(long)]
    pub cutoff: Option<Decimal>,
    /// Write the cleaned weights to this file as `asset,weight` CSV
    #[arg(long)]
    pub save_weights: Option<String>,
}

fn apply_overrides(args: &RunArgs, settings: &mut PortfolioSettings) {
    if let Some(method) = args.method {
        settings.allocation.method = method;
    }
    if let Some(rf) = args.risk_free_rate {
        settings.risk_free_rate = rf;
    }
    if let Some(freq) = args.frequency {
        settings.frequency = freq;
        settings.annualization_factor = None;
    }
    if let Some(cap) = args.max_weight {
        settings.bounds = WeightBounds::uniform(Decimal::ZERO, cap);
    }
    if let Some(cutoff) = args.cutoff {
        settings.cleaning.cutoff = cutoff;
    }
}

pub fn run_pipeline(
    args: RunArgs,
    mut settings: PortfolioSettings,
) -> Result<Value, Box<dyn std::error::Error>> {
    apply_overrides(&args, &mut settings);
    let history = input::prices::read_price_history(&args.history)?;
    let latest_prices = match args.prices {
        Some(ref path) => Some(input::prices::read_price_snapshot(path)?),
        None => None,
    };

    let result = pipeline::run_pipeline(&PipelineInput {
        history,
        budget: args.budget,
        settings,
        latest_prices,
    })?;

    if let Some(ref path) = args.save_weights {
        save_weights(path, &result.result.cleaned_weights)?;
        info!(path = path.as_str(), "saved cleaned weights");
    }
    Ok(serde_json::to_value(result)?)
}

/// Two-column `asset,weight` CSV.
fn save_weights(path: &str, weights: &[AssetWeight]) -> Result<(), Box<dyn std::error::Error>> {
    let mut wtr = csv::Writer::from_path(path)
        .map_err(|e| format!("Failed to write '{}': {}", path, e))?;
    wtr.write_record(["asset", "weight"])?;
    for w in weights {
        wtr.write_record([w.asset.as_str(), &w.weight.to_string()])?;
    }
    wtr.flush()?;
    Ok(())
}

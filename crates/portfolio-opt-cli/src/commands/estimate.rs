use clap::Args;
use serde_json::Value;

use portfolio_opt_core::config::PortfolioSettings;
use portfolio_opt_core::estimation::returns::{self, EstimationInput};
use portfolio_opt_core::ReturnFrequency;
use rust_decimal::Decimal;

use crate::input;

#[derive(Args)]
pub struct EstimateArgs {
    /// Estimation request as JSON (history, frequency)
    #[arg(long, conflicts_with = "prices")]
    pub input: Option<String>,
    /// Wide price table (`date,A,B,...`, .csv) or PriceHistory (.json)
    #[arg(long)]
    pub prices: Option<String>,
    /// Observation frequency: daily, weekly, monthly, quarterly, annual
    #[arg(long)]
    pub frequency: Option<ReturnFrequency>,
    /// Periods per year, overriding the frequency
    #[arg(long)]
    pub periods_per_year: Option<Decimal>,
}

pub fn run_estimate(
    args: EstimateArgs,
    settings: &PortfolioSettings,
) -> Result<Value, Box<dyn std::error::Error>> {
    let mut request: EstimationInput = if let Some(ref path) = args.prices {
        EstimationInput {
            history: input::prices::read_price_history(path)?,
            frequency: settings.frequency,
            annualization_factor: settings.annualization_factor,
        }
    } else {
        super::load_input(args.input.as_deref(), "estimation")?
    };
    if let Some(f) = args.frequency {
        request.frequency = f;
        request.annualization_factor = None;
    }
    if let Some(p) = args.periods_per_year {
        request.annualization_factor = Some(p);
    }
    let result = returns::estimate_risk_return(&request)?;
    Ok(serde_json::to_value(result)?)
}

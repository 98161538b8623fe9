use clap::Args;
use serde_json::Value;

use portfolio_opt_core::config::DEFAULT_FRONTIER_POINTS;
use portfolio_opt_core::optimization::mean_variance::{self, MeanVarianceInput};
use rust_decimal::Decimal;

#[derive(Args)]
pub struct OptimizeArgs {
    /// Optimization request as JSON (asset_names, expected_returns,
    /// covariance_matrix, objective, bounds)
    #[arg(long)]
    pub input: Option<String>,
    /// Override the request's risk-free rate
    #[arg(long)]
    pub risk_free_rate: Option<Decimal>,
    /// Also trace this many frontier points
    #[arg(long)]
    pub frontier_points: Option<u32>,
}

#[derive(Args)]
pub struct FrontierArgs {
    /// Optimization request as JSON
    #[arg(long)]
    pub input: Option<String>,
    /// Number of frontier points
    #[arg(long, default_value_t = DEFAULT_FRONTIER_POINTS)]
    pub points: u32,
    /// Override the request's risk-free rate
    #[arg(long)]
    pub risk_free_rate: Option<Decimal>,
}

pub fn run_optimize(args: OptimizeArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut request: MeanVarianceInput =
        super::load_input(args.input.as_deref(), "portfolio optimization")?;
    if let Some(rf) = args.risk_free_rate {
        request.risk_free_rate = rf;
    }
    if args.frontier_points.is_some() {
        request.frontier_points = args.frontier_points;
    }
    let result = mean_variance::optimize_portfolio(&request)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_frontier(args: FrontierArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut request: MeanVarianceInput =
        super::load_input(args.input.as_deref(), "efficient frontier")?;
    if let Some(rf) = args.risk_free_rate {
        request.risk_free_rate = rf;
    }
    request.frontier_points = Some(args.points);
    let result = mean_variance::optimize_portfolio(&request)?;
    Ok(serde_json::to_value(result)?)
}

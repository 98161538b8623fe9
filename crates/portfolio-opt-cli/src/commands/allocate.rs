use clap::Args;
use serde_json::Value;

use portfolio_opt_core::allocation::discrete::{self, DiscreteAllocationInput};
use portfolio_opt_core::config::AllocationMethod;
use rust_decimal::Decimal;

use crate::input;

#[derive(Args)]
pub struct AllocateArgs {
    /// Allocation request as JSON (weights, prices, budget, settings)
    #[arg(long)]
    pub input: Option<String>,
    /// Replace the request's prices with a JSON map or `asset,price` CSV
    #[arg(long)]
    pub prices: Option<String>,
    /// Cash budget
    #[arg(long)]
    pub budget: Option<Decimal>,
    /// lp (branch-and-bound, default) or greedy
    #[arg(long)]
    pub method: Option<AllocationMethod>,
}

pub fn run_allocate(args: AllocateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut request: DiscreteAllocationInput =
        super::load_input(args.input.as_deref(), "discrete allocation")?;
    if let Some(ref path) = args.prices {
        request.prices = input::prices::read_price_snapshot(path)?;
    }
    if let Some(budget) = args.budget {
        request.budget = budget;
    }
    if let Some(method) = args.method {
        request.settings.method = method;
    }
    let result = discrete::allocate_shares(&request)?;
    Ok(serde_json::to_value(result)?)
}

use clap::Args;
use serde_json::Value;

use portfolio_opt_core::optimization::cleaning::{self, CleaningInput};
use rust_decimal::Decimal;

#[derive(Args)]
pub struct CleanArgs {
    /// Cleaning request as JSON (weights, settings)
    #[arg(long)]
    pub input: Option<String>,
    /// Weights below this are set to zero
    #[arg(long)]
    pub cutoff: Option<Decimal>,
    /// Decimal places to round to
    #[arg(long, conflicts_with = "no_rounding")]
    pub rounding: Option<u32>,
    /// Leave weights unrounded
    #[arg(long)]
    pub no_rounding: bool,
}

pub fn run_clean(args: CleanArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut request: CleaningInput = super::load_input(args.input.as_deref(), "weight cleaning")?;
    if let Some(cutoff) = args.cutoff {
        request.settings.cutoff = cutoff;
    }
    if args.rounding.is_some() {
        request.settings.rounding = args.rounding;
    }
    if args.no_rounding {
        request.settings.rounding = None;
    }
    let result = cleaning::clean_weights_output(&request)?;
    Ok(serde_json::to_value(result)?)
}

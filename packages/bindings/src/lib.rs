use napi::Result as NapiResult;
use napi_derive::napi;

use portfolio_opt_core::allocation::discrete::{self, DiscreteAllocationInput};
use portfolio_opt_core::estimation::returns::{self, EstimationInput};
use portfolio_opt_core::optimization::cleaning::{self, CleaningInput};
use portfolio_opt_core::optimization::mean_variance::{self, MeanVarianceInput};
use portfolio_opt_core::pipeline::{self, PipelineInput};

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

// ---------------------------------------------------------------------------
// Estimation
// ---------------------------------------------------------------------------

#[napi]
pub fn estimate_risk_return(input_json: String) -> NapiResult<String> {
    let input: EstimationInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = returns::estimate_risk_return(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Optimization
// ---------------------------------------------------------------------------

/// Max Sharpe, min volatility or a frontier target, per the request's
/// `objective`.
#[napi]
pub fn optimize_portfolio(input_json: String) -> NapiResult<String> {
    let input: MeanVarianceInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = mean_variance::optimize_portfolio(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn clean_weights(input_json: String) -> NapiResult<String> {
    let input: CleaningInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = cleaning::clean_weights_output(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Allocation
// ---------------------------------------------------------------------------

#[napi]
pub fn allocate_shares(input_json: String) -> NapiResult<String> {
    let input: DiscreteAllocationInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = discrete::allocate_shares(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

#[napi]
pub fn run_pipeline(input_json: String) -> NapiResult<String> {
    let input: PipelineInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = pipeline::run_pipeline(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortfolioError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid price for {asset} at {at}: {price} (prices must be strictly positive)")]
    InvalidPrice {
        asset: String,
        at: String,
        price: Decimal,
    },

    #[error("Dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    #[error("No feasible tangency portfolio: no asset has expected return above the risk-free rate {risk_free_rate} (best is {best_expected_return})")]
    NoFeasibleTangencyPortfolio {
        risk_free_rate: Decimal,
        best_expected_return: Decimal,
    },

    #[error("Solver did not converge: {solver} stopped after {iterations} iterations (residual: {residual})")]
    SolverDidNotConverge {
        solver: String,
        iterations: u64,
        residual: Decimal,
    },

    #[error("Budget too small: {budget} cannot buy one share of the cheapest asset {asset} at {cheapest_price}")]
    BudgetTooSmall {
        budget: Decimal,
        asset: String,
        cheapest_price: Decimal,
    },

    #[error("Empty allocation: the weight vector has no positive entries")]
    EmptyAllocation,

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for PortfolioError {
    fn from(e: serde_json::Error) -> Self {
        PortfolioError::SerializationError(e.to_string())
    }
}

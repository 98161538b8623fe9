pub mod config;
pub mod error;
pub(crate) mod linalg;
pub mod types;

#[cfg(feature = "estimation")]
pub mod estimation;

#[cfg(feature = "optimization")]
pub mod optimization;

#[cfg(feature = "allocation")]
pub mod allocation;

#[cfg(feature = "pipeline")]
pub mod pipeline;

pub use error::PortfolioError;
pub use types::*;

/// Standard result type for all portfolio operations
pub type PortfolioResult<T> = Result<T, PortfolioError>;

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// All monetary values. Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Rates expressed as decimals (0.05 = 5%). Never as percentages.
pub type Rate = Decimal;

/// Portfolio weights as fractions of total value (0.25 = 25%).
pub type Weight = Decimal;

/// One current price per asset, keyed by asset identifier.
pub type PriceSnapshot = BTreeMap<String, Money>;

/// Frequency of price observations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnFrequency {
    #[default]
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Annual,
}

impl ReturnFrequency {
    /// Number of periods in a year for annualisation
    pub fn periods_per_year(&self) -> Decimal {
        match self {
            ReturnFrequency::Daily => dec!(252),
            ReturnFrequency::Weekly => dec!(52),
            ReturnFrequency::Monthly => dec!(12),
            ReturnFrequency::Quarterly => dec!(4),
            ReturnFrequency::Annual => dec!(1),
        }
    }
}

impl std::str::FromStr for ReturnFrequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" => Ok(ReturnFrequency::Daily),
            "weekly" => Ok(ReturnFrequency::Weekly),
            "monthly" => Ok(ReturnFrequency::Monthly),
            "quarterly" => Ok(ReturnFrequency::Quarterly),
            "annual" | "annually" => Ok(ReturnFrequency::Annual),
            _ => Err(format!(
                "Unknown frequency '{}'. Use: daily, weekly, monthly, quarterly, annual",
                s
            )),
        }
    }
}

/// A single dated row of adjusted closing prices, one cell per asset.
/// `None` marks a missing observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRow {
    pub date: NaiveDate,
    pub prices: Vec<Option<Money>>,
}

/// Adjusted closing prices indexed by trading date, one column per asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceHistory {
    pub assets: Vec<String>,
    pub rows: Vec<PriceRow>,
}

impl PriceHistory {
    pub fn new(assets: Vec<String>, rows: Vec<PriceRow>) -> Self {
        Self { assets, rows }
    }

    pub fn n_assets(&self) -> usize {
        self.assets.len()
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// Prices of a single asset in date order.
    pub fn column(&self, asset_idx: usize) -> impl Iterator<Item = Option<Money>> + '_ {
        self.rows
            .iter()
            .map(move |row| row.prices.get(asset_idx).copied().flatten())
    }
}

/// Target (or optimized) weight of one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetWeight {
    pub asset: String,
    pub weight: Weight,
}

impl AssetWeight {
    pub fn new(asset: impl Into<String>, weight: Weight) -> Self {
        Self {
            asset: asset.into(),
            weight,
        }
    }
}

/// Pair asset names with a raw weight vector.
pub fn label_weights(assets: &[String], weights: &[Weight]) -> Vec<AssetWeight> {
    assets
        .iter()
        .zip(weights.iter())
        .map(|(a, w)| AssetWeight::new(a.clone(), *w))
        .collect()
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "rust_decimal_128bit".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequency_parsing() {
        assert_eq!("Daily".parse::<ReturnFrequency>(), Ok(ReturnFrequency::Daily));
        assert_eq!("annually".parse::<ReturnFrequency>(), Ok(ReturnFrequency::Annual));
        assert!("hourly".parse::<ReturnFrequency>().is_err());
        assert_eq!(ReturnFrequency::Monthly.periods_per_year(), dec!(12));
    }

    #[test]
    fn test_column_reads_missing_cells() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let history = PriceHistory::new(
            vec!["A".into(), "B".into()],
            vec![PriceRow {
                date: d,
                prices: vec![Some(dec!(10)), None],
            }],
        );
        assert_eq!(history.column(0).collect::<Vec<_>>(), vec![Some(dec!(10))]);
        assert_eq!(history.column(1).collect::<Vec<_>>(), vec![None]);
    }
}

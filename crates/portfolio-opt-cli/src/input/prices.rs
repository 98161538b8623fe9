use chrono::NaiveDate;
use portfolio_opt_core::{PriceHistory, PriceRow, PriceSnapshot};
use rust_decimal::Decimal;
use std::fs::File;
use std::io::Read;
use std::str::FromStr;

use super::file;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Load a price history from a wide CSV (`date,A,B,...`) or a JSON
/// `PriceHistory`.
pub fn read_price_history(path: &str) -> Result<PriceHistory, Box<dyn std::error::Error>> {
    match file::extension(path).as_deref() {
        Some("json") => file::read_json(path),
        _ => {
            let canonical = file::resolve_path(path)?;
            let f = File::open(&canonical)
                .map_err(|e| format!("Failed to read '{}': {}", canonical.display(), e))?;
            parse_price_csv(f).map_err(|e| format!("'{}': {}", canonical.display(), e).into())
        }
    }
}

/// Load a latest-price snapshot from a JSON map or a two-column
/// `asset,price` CSV.
pub fn read_price_snapshot(path: &str) -> Result<PriceSnapshot, Box<dyn std::error::Error>> {
    match file::extension(path).as_deref() {
        Some("csv") => {
            let canonical = file::resolve_path(path)?;
            let f = File::open(&canonical)
                .map_err(|e| format!("Failed to read '{}': {}", canonical.display(), e))?;
            parse_snapshot_csv(f).map_err(|e| format!("'{}': {}", canonical.display(), e).into())
        }
        _ => file::read_json(path),
    }
}

/// Parse a wide price table. The first column holds ISO dates, every other
/// column one asset; an empty cell is a missing observation.
pub fn parse_price_csv<R: Read>(reader: R) -> Result<PriceHistory, String> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers().map_err(|e| e.to_string())?.clone();
    if headers.len() < 2 {
        return Err("expected a date column followed by at least one asset column".into());
    }
    let assets: Vec<String> = headers.iter().skip(1).map(|h| h.to_string()).collect();
    if let Some(blank) = assets.iter().position(|a| a.is_empty()) {
        return Err(format!("asset column {} has an empty header", blank + 2));
    }

    let mut rows = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| e.to_string())?;
        // header is line 1
        let line_no = line + 2;
        if record.len() != headers.len() {
            return Err(format!(
                "line {}: expected {} fields, found {}",
                line_no,
                headers.len(),
                record.len()
            ));
        }
        let date = NaiveDate::parse_from_str(&record[0], DATE_FORMAT)
            .map_err(|e| format!("line {}: bad date '{}': {}", line_no, &record[0], e))?;
        let prices = record
            .iter()
            .skip(1)
            .zip(assets.iter())
            .map(|(cell, asset)| parse_cell(cell, asset, line_no))
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(PriceRow { date, prices });
    }

    Ok(PriceHistory::new(assets, rows))
}

fn parse_cell(cell: &str, asset: &str, line_no: usize) -> Result<Option<Decimal>, String> {
    if cell.is_empty() {
        return Ok(None);
    }
    Decimal::from_str(cell)
        .or_else(|_| Decimal::from_scientific(cell))
        .map(Some)
        .map_err(|_| format!("line {}: bad price '{}' for {}", line_no, cell, asset))
}

/// Parse `asset,price` rows into a snapshot.
pub fn parse_snapshot_csv<R: Read>(reader: R) -> Result<PriceSnapshot, String> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let mut snapshot = PriceSnapshot::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| e.to_string())?;
        let line_no = line + 2;
        if record.len() != 2 {
            return Err(format!("line {}: expected asset,price", line_no));
        }
        let asset = record[0].to_string();
        let price = parse_cell(&record[1], &asset, line_no)?
            .ok_or_else(|| format!("line {}: missing price for {}", line_no, asset))?;
        if snapshot.insert(asset.clone(), price).is_some() {
            return Err(format!("line {}: duplicate asset {}", line_no, asset));
        }
    }
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_wide_csv_with_gaps() {
        let data = "date,AAA,BBB\n2024-01-02,100,50.5\n2024-01-03,,51\n2024-01-04,102.25,52\n";
        let history = parse_price_csv(data.as_bytes()).unwrap();
        assert_eq!(history.assets, vec!["AAA".to_string(), "BBB".to_string()]);
        assert_eq!(history.n_rows(), 3);
        assert_eq!(history.rows[1].prices, vec![None, Some(dec!(51))]);
        assert_eq!(history.rows[2].prices[0], Some(dec!(102.25)));
    }

    #[test]
    fn test_parse_rejects_bad_date_and_price() {
        let bad_date = "date,AAA\n02/01/2024,100\n";
        assert!(parse_price_csv(bad_date.as_bytes()).unwrap_err().contains("bad date"));

        let bad_price = "date,AAA\n2024-01-02,abc\n";
        assert!(parse_price_csv(bad_price.as_bytes()).unwrap_err().contains("bad price"));
    }

    #[test]
    fn test_parse_requires_asset_column() {
        assert!(parse_price_csv("date\n2024-01-02\n".as_bytes()).is_err());
    }

    #[test]
    fn test_parse_snapshot_csv() {
        let data = "asset,price\nAAA,101.5\nBBB,20\n";
        let snap = parse_snapshot_csv(data.as_bytes()).unwrap();
        assert_eq!(snap["AAA"], dec!(101.5));
        assert_eq!(snap.len(), 2);

        let dup = "asset,price\nAAA,1\nAAA,2\n";
        assert!(parse_snapshot_csv(dup.as_bytes()).unwrap_err().contains("duplicate"));
    }
}

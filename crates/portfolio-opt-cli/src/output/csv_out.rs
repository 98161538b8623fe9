use serde_json::{Map, Value};
use std::io;

/// Result fields holding the main list of records, in lookup order.
const PRIMARY_LISTS: [&str; 5] = [
    "positions",
    "cleaned_weights",
    "weights",
    "efficient_frontier",
    "assets",
];

/// Write output as CSV to stdout: the result's main list of records when it
/// has one, otherwise `field,value` pairs.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    let result = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    match result {
        Value::Object(map) => match primary_records(map) {
            Some(records) => write_records(&mut wtr, records),
            None => {
                let _ = wtr.write_record(["field", "value"]);
                for (key, val) in map {
                    let _ = wtr.write_record([key.as_str(), &format_csv_value(val)]);
                }
            }
        },
        Value::Array(arr) => write_records(&mut wtr, arr),
        _ => {
            let _ = wtr.write_record([&format_csv_value(result)]);
        }
    }

    let _ = wtr.flush();
}

fn primary_records(map: &Map<String, Value>) -> Option<&Vec<Value>> {
    if let Some(Value::Object(alloc)) = map.get("allocation") {
        if let Some(Value::Array(rows)) = alloc.get("positions") {
            return Some(rows);
        }
    }
    PRIMARY_LISTS.iter().find_map(|key| match map.get(*key) {
        Some(Value::Array(rows)) if rows.iter().all(Value::is_object) => Some(rows),
        _ => None,
    })
}

fn write_records(wtr: &mut csv::Writer<io::StdoutLock<'_>>, arr: &[Value]) {
    if arr.is_empty() {
        return;
    }

    if let Some(Value::Object(first)) = arr.first() {
        let headers: Vec<&str> = first.keys().map(|k| k.as_str()).collect();
        let _ = wtr.write_record(&headers);

        for item in arr {
            if let Value::Object(map) = item {
                let row: Vec<String> = headers
                    .iter()
                    .map(|h| map.get(*h).map(format_csv_value).unwrap_or_default())
                    .collect();
                let _ = wtr.write_record(&row);
            }
        }
    } else {
        for item in arr {
            let _ = wtr.write_record([&format_csv_value(item)]);
        }
    }
}

fn format_csv_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

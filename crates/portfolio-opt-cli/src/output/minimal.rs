use serde_json::Value;

/// Print just the key answer: share counts for an allocation, weights for an
/// optimization or cleaning run, otherwise the first well-known scalar.
pub fn print_minimal(value: &Value) {
    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    let Value::Object(map) = result_obj else {
        println!("{}", format_minimal(result_obj));
        return;
    };

    let positions = map
        .get("positions")
        .or_else(|| map.get("allocation").and_then(|a| a.get("positions")));
    if let Some(Value::Array(rows)) = positions {
        print_pairs(rows, "asset", "shares");
        return;
    }

    for key in ["weights", "cleaned_weights"] {
        if let Some(Value::Array(rows)) = map.get(key) {
            print_pairs(rows, "asset", "weight");
            return;
        }
    }

    // Estimation output: one row per asset
    if let Some(Value::Array(rows)) = map.get("assets") {
        if rows.iter().all(|r| r.is_object()) {
            print_pairs(rows, "asset", "expected_return");
            return;
        }
    }

    let priority_keys = ["sharpe_ratio", "leftover", "weight_sum"];
    for key in &priority_keys {
        if let Some(val) = map.get(*key) {
            if !val.is_null() {
                println!("{}", format_minimal(val));
                return;
            }
        }
    }

    if let Some((key, val)) = map.iter().next() {
        println!("{}: {}", key, format_minimal(val));
    }
}

fn print_pairs(rows: &[Value], label: &str, field: &str) {
    for row in rows {
        let name = row.get(label).map(format_minimal).unwrap_or_default();
        let val = row.get(field).map(format_minimal).unwrap_or_default();
        println!("{} {}", name, val);
    }
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

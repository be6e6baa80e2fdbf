//! Behavioral sandbox verdicts pulled from a lookup response.
//!
//! Purely informational: the classification policy never reads these.

use serde_json::Value;

use crate::scanner::model::SandboxVerdict;
use crate::transport::UsageCounters;

/// Extract sandbox verdicts and count the analysis when any are present.
#[must_use]
pub fn extract(raw: &Value, usage: &UsageCounters) -> Vec<SandboxVerdict> {
    let verdicts = parse_sandbox_verdicts(raw);
    if !verdicts.is_empty() {
        usage.record_sandbox();
    }
    verdicts
}

/// Read `data.attributes.sandbox_verdicts`. Missing or malformed data yields
/// an empty list; individual fields fall back to `"Unknown"` / empty.
#[must_use]
pub fn parse_sandbox_verdicts(raw: &Value) -> Vec<SandboxVerdict> {
    let Some(map) = raw
        .pointer("/data/attributes/sandbox_verdicts")
        .and_then(Value::as_object)
    else {
        return Vec::new();
    };

    map.iter()
        .filter_map(|(sandbox, verdict)| {
            let verdict = verdict.as_object()?;
            Some(SandboxVerdict {
                sandbox: sandbox.clone(),
                sandbox_name: str_field(verdict.get("sandbox_name"))
                    .unwrap_or_else(|| sandbox.clone()),
                category: str_field(verdict.get("category"))
                    .unwrap_or_else(|| "Unknown".to_string()),
                confidence: verdict.get("confidence").and_then(confidence_value),
                malware_names: string_list(verdict.get("malware_names")),
                malware_classification: string_list(verdict.get("malware_classification")),
            })
        })
        .collect()
}

fn str_field(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn confidence_value(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
            .and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().trim_end_matches('%').parse().ok(),
        _ => None,
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

//! Lookup-service JSON: file reports, upload URLs, submission handles.

use serde_json::Value;

use crate::core::errors::{ArsError, Result};
use crate::scanner::model::{AnalysisStats, EngineCategory, EngineVerdict};
use crate::transport::{LookupOutcome, SubmitOutcome};

/// A parsed `GET /files/{fingerprint}` response.
#[derive(Debug, Clone, PartialEq)]
pub struct FileReport {
    /// Aggregate engine counts.
    pub stats: AnalysisStats,
    /// Malicious verdicts first, then suspicious, each ordered by engine name.
    pub verdicts: Vec<EngineVerdict>,
    /// Full response body, kept for enrichment (sandbox verdicts).
    pub raw: Value,
}

/// Parse a file report body.
///
/// # Errors
/// [`ArsError::Serialization`] when the body is not JSON or lacks
/// `data.attributes.last_analysis_stats`.
pub fn parse_file_report(body: &[u8]) -> Result<FileReport> {
    let raw: Value = serde_json::from_slice(body)?;
    let stats_value = raw
        .pointer("/data/attributes/last_analysis_stats")
        .cloned()
        .ok_or_else(|| ArsError::Serialization {
            context: "file report",
            details: "missing data.attributes.last_analysis_stats".to_string(),
        })?;
    let stats: AnalysisStats =
        serde_json::from_value(stats_value).map_err(|e| ArsError::Serialization {
            context: "file report",
            details: format!("last_analysis_stats: {e}"),
        })?;

    let mut verdicts: Vec<EngineVerdict> = raw
        .pointer("/data/attributes/last_analysis_results")
        .and_then(Value::as_object)
        .map(|results| {
            results
                .iter()
                .filter_map(|(engine, result)| {
                    let category = result
                        .get("category")
                        .and_then(Value::as_str)
                        .and_then(EngineCategory::parse)
                        .filter(|c| c.is_flagging())?;
                    Some(EngineVerdict {
                        engine: result
                            .get("engine_name")
                            .and_then(Value::as_str)
                            .unwrap_or(engine)
                            .to_string(),
                        category,
                        label: result
                            .get("result")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        method: result
                            .get("method")
                            .and_then(Value::as_str)
                            .filter(|m| !m.is_empty())
                            .map(str::to_string),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    verdicts.sort_by(|a, b| {
        bucket_rank(a.category)
            .cmp(&bucket_rank(b.category))
            .then_with(|| a.engine.cmp(&b.engine))
    });

    Ok(FileReport {
        stats,
        verdicts,
        raw,
    })
}

const fn bucket_rank(category: EngineCategory) -> u8 {
    match category {
        EngineCategory::Malicious => 0,
        EngineCategory::Suspicious => 1,
        EngineCategory::Harmless => 2,
        EngineCategory::Undetected => 3,
    }
}

/// Map an HTTP status and body to a lookup outcome.
#[must_use]
pub fn lookup_outcome(status: u16, body: &[u8]) -> LookupOutcome {
    match status {
        200 => match parse_file_report(body) {
            Ok(report) => LookupOutcome::Found(Box::new(report)),
            Err(e) => LookupOutcome::Error {
                detail: e.to_string(),
            },
        },
        404 => LookupOutcome::NotFound,
        429 => LookupOutcome::RateLimited,
        other => LookupOutcome::Error {
            detail: format!("HTTP {other}: {}", body_excerpt(body)),
        },
    }
}

/// Map a submission response to an outcome. 200 and 201 are accepted.
#[must_use]
pub fn submit_outcome(status: u16, body: &[u8]) -> SubmitOutcome {
    if matches!(status, 200 | 201) {
        SubmitOutcome::Accepted {
            handle: parse_analysis_id(body),
        }
    } else {
        SubmitOutcome::Failed {
            detail: format!("HTTP {status}: {}", body_excerpt(body)),
        }
    }
}

/// `data.id` of a submission response.
#[must_use]
pub fn parse_analysis_id(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    value
        .pointer("/data/id")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Upload URL from `GET /files/upload_url`: `data` as a string, or `data.upload_url`.
#[must_use]
pub fn parse_upload_url(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    let data = value.get("data")?;
    data.as_str()
        .or_else(|| data.get("upload_url").and_then(Value::as_str))
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
}

fn body_excerpt(body: &[u8]) -> String {
    const MAX: usize = 200;
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.chars().count() <= MAX {
        text.to_string()
    } else {
        let cut: String = text.chars().take(MAX).collect();
        format!("{cut}...")
    }
}

use crate::util::parse_bool_str;
use serde_json::Value;
use std::fs::OpenOptions;
use std::io::Write;

const DEBUG_PAYLOAD_ENV: &str = "ASK_DEBUG_PAYLOAD";
const API_LOG_PATH_ENV: &str = "ASK_API_LOG_PATH";

pub fn debug_payload_enabled() -> bool {
    std::env::var(DEBUG_PAYLOAD_ENV)
        .ok()
        .and_then(|value| parse_bool_str(&value))
        .unwrap_or(false)
}

pub fn emit_debug_payload(request_url: &str, payload: &Value) {
    let formatted_payload = serde_json::to_string_pretty(payload)
        .unwrap_or_else(|_| "<payload serialization error>".to_string());
    let message =
        format!("ASK_API DEBUG payload_request url={request_url}\npayload:\n{formatted_payload}\n");
    if !append_to_log_file(&message) {
        tracing::debug!(url = request_url, payload = %formatted_payload, "upstream request payload");
    }
}

pub fn emit_sse_parse_error(json_data: &str, parse_error: &serde_json::Error) {
    let message = format!("ASK_API ERROR sse_parse_failed error={parse_error}\ndata:\n{json_data}\n");
    if !append_to_log_file(&message) {
        tracing::warn!(error = %parse_error, data = json_data, "skipping unparseable stream frame");
    }
}

/// Returns false when no log file is configured or the write failed, so the
/// caller falls back to the tracing subscriber.
fn append_to_log_file(message: &str) -> bool {
    match resolve_log_path() {
        Some(path) => append_log_file(&path, message).is_ok(),
        None => false,
    }
}

fn resolve_log_path() -> Option<String> {
    std::env::var(API_LOG_PATH_ENV)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn append_log_file(path: &str, message: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(message.as_bytes())
}

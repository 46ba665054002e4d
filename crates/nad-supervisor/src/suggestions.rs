use crate::process::{run_captured, CommandSpec};
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum SuggestionError {
    #[error("failed to start suggestor: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("suggestor exited with {code:?}")]
    Failed { code: Option<i32>, stderr: String },
    #[error("suggestor output is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Runs a suggestor to completion and parses its stdout as one JSON document.
pub async fn fetch_suggestions(spec: &CommandSpec) -> Result<Value, SuggestionError> {
    let captured = run_captured(spec).await?;
    if !captured.success() {
        let stderr = String::from_utf8_lossy(&captured.stderr).trim().to_string();
        error!(event = "suggestor_failed", code = ?captured.code, stderr = %stderr);
        return Err(SuggestionError::Failed {
            code: captured.code,
            stderr,
        });
    }
    let output = String::from_utf8_lossy(&captured.stdout);
    match serde_json::from_str::<Value>(output.trim()) {
        Ok(value) => {
            info!(event = "suggestions_ready");
            Ok(value)
        }
        Err(err) => {
            error!(event = "suggestor_parse_failed", output = %output.trim());
            Err(err.into())
        }
    }
}

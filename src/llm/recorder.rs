//! Persistence of raw oracle payloads for debugging.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};

use super::openai::GenerationRequest;
use crate::error::LlmError;

/// Writes one JSON file per oracle call into a directory.
///
/// File names carry a per-recorder sequence number, so calls within the same
/// second never overwrite each other.
#[derive(Debug, Clone)]
pub struct ResponseRecorder {
    output_dir: PathBuf,
    sequence: Arc<AtomicU64>,
}

impl ResponseRecorder {
    /// Creates a recorder writing into `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Directory the recorder writes into.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Persists the request and raw response as `<timestamp>_<seq>_<step>.json`.
    pub async fn record(&self, request: &GenerationRequest, raw: &Value) -> Result<PathBuf, LlmError> {
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let now = Utc::now();
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let file_name = format!(
            "{}_{:05}_{}.json",
            now.format("%Y%m%d_%H%M%S"),
            seq,
            sanitize(&request.step)
        );
        let path = self.output_dir.join(file_name);

        let payload = json!({
            "timestamp": now.to_rfc3339(),
            "model": request.model,
            "messages": request.messages,
            "metadata": request.metadata,
            "response": raw,
        });
        let body = serde_json::to_string_pretty(&payload)
            .map_err(|e| LlmError::ParseError(e.to_string()))?;
        tokio::fs::write(&path, body).await?;

        tracing::debug!(path = %path.display(), "Recorded raw response");
        Ok(path)
    }
}

/// Keeps step labels safe for use in file names.
fn sanitize(step: &str) -> String {
    step.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

use thiserror::Error;

/// Unified error type for the entire wallet-dashboard-core library.
/// Every fallible public function returns `Result<T, CoreError>`.
///
/// The aggregation services never produce one of these: malformed input is
/// coerced to a safe default instead. Errors come from configuration, the
/// upstream source and cache I/O.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Configuration ───────────────────────────────────────────────
    #[error("Configuration error: {0}")]
    Config(String),

    // ── Cache / File ────────────────────────────────────────────────
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("File I/O error: {0}")]
    FileIO(String),

    // ── API / Network ───────────────────────────────────────────────
    #[error("API error ({provider}): {message}")]
    Api {
        provider: String,
        message: String,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request for {key} timed out after {millis}ms")]
    Timeout { key: String, millis: u64 },

    // ── Query validation ────────────────────────────────────────────
    #[error("Query validation failed: {0}")]
    ValidationError(String),
}

// ── Conversion helpers (From impls) ─────────────────────────────────

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::FileIO(e.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Deserialization(e.to_string())
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return CoreError::Network("request timed out".into());
        }
        // reqwest errors often carry the full URL; the query string holds addresses
        // and sometimes credentials, so strip it.
        CoreError::Network(redact_query(&e.to_string()))
    }
}

/// Strip everything after the first `?` in a message.
pub(crate) fn redact_query(msg: &str) -> String {
    match msg.find('?') {
        Some(idx) => format!("{}?<query redacted>", &msg[..idx]),
        None => msg.to_string(),
    }
}

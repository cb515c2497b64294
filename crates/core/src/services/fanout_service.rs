use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::time::Duration;

use crate::errors::CoreError;
use crate::models::fetch::{Disposition, FanOutResult, FetchFailure, RequestKey};

/// Issues one upstream fetch per key concurrently and combines the outcomes.
///
/// Every fetch is allowed to settle (success, failure or timeout) before the
/// result is built; nothing fails fast. A key that times out is recorded as
/// a failure like any other.
#[derive(Debug, Clone)]
pub struct FanOutCombiner {
    timeout: Duration,
}

impl FanOutCombiner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetch every key in `keys` (duplicates collapsed) and combine.
    ///
    /// Never returns an error: per-key failures land in
    /// [`FanOutResult::errors`] and the disposition tells the caller whether
    /// the combined map is complete.
    pub async fn combine<T, F, Fut>(&self, keys: Vec<RequestKey>, fetch: F) -> FanOutResult<T>
    where
        F: Fn(RequestKey) -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let keys: BTreeSet<RequestKey> = keys.into_iter().collect();
        let requested = keys.len();
        let timeout = self.timeout;

        let tasks = keys.into_iter().map(|key| {
            let request = fetch(key.clone());
            async move {
                let outcome = match tokio::time::timeout(timeout, request).await {
                    Ok(result) => result,
                    Err(_) => Err(CoreError::Timeout {
                        key: key.to_string(),
                        millis: timeout.as_millis() as u64,
                    }),
                };
                (key, outcome)
            }
        });

        let settled = join_all(tasks).await;

        let mut combined = BTreeMap::new();
        let mut errors = Vec::new();
        for (key, outcome) in settled {
            match outcome {
                Ok(value) => {
                    combined.insert(key, value);
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Upstream fetch failed");
                    errors.push(FetchFailure {
                        key,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let result = FanOutResult::new(combined, errors);
        let disposition = result.disposition();
        match disposition {
            Disposition::TotalSuccess => tracing::info!(requested, "Fan-out complete"),
            Disposition::PartialSuccess | Disposition::TotalFailure => tracing::info!(
                requested,
                succeeded = result.combined.len(),
                failed = result.errors.len(),
                %disposition,
                "Fan-out finished with failures"
            ),
        }
        result
    }
}

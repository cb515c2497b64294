// ═══════════════════════════════════════════════════════════════════
// Fan-Out Tests — FanOutCombiner dispositions, timeouts, dedupe
// ═══════════════════════════════════════════════════════════════════

use chrono::NaiveDate;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use wallet_dashboard_core::errors::CoreError;
use wallet_dashboard_core::models::fetch::{Disposition, FanOutResult, RequestKey};
use wallet_dashboard_core::services::fanout_service::FanOutCombiner;

fn combiner() -> FanOutCombiner {
    FanOutCombiner::new(Duration::from_secs(5))
}

fn keys(addresses: &[&str]) -> Vec<RequestKey> {
    addresses.iter().map(|a| RequestKey::address(*a)).collect()
}

/// Succeeds with the address length unless the address is in `failing`.
async fn fetch_unless(
    key: RequestKey,
    failing: &'static [&'static str],
) -> Result<usize, CoreError> {
    if failing.contains(&key.address.as_str()) {
        Err(CoreError::Api {
            provider: "mock".into(),
            message: format!("{} unavailable", key.address),
        })
    } else {
        Ok(key.address.len())
    }
}

// ── Dispositions ────────────────────────────────────────────────────

mod dispositions {
    use super::*;

    #[tokio::test]
    async fn all_succeed_is_total_success() {
        let result = combiner().combine(keys(&["x", "yy", "zzz"]), |k| fetch_unless(k, &[])).await;
        assert_eq!(result.disposition(), Disposition::TotalSuccess);
        assert_eq!(result.combined.len(), 3);
        assert!(result.errors.is_empty());
        assert_eq!(result.combined[&RequestKey::address("zzz")], 3);
    }

    #[tokio::test]
    async fn one_failure_is_partial_success() {
        let result = combiner().combine(keys(&["X", "Y", "Z"]), |k| fetch_unless(k, &["Y"])).await;

        assert_eq!(result.disposition(), Disposition::PartialSuccess);
        let succeeded: Vec<&str> = result.combined.keys().map(|k| k.address.as_str()).collect();
        assert_eq!(succeeded, vec!["X", "Z"]);
        assert_eq!(result.failed_keys(), vec![&RequestKey::address("Y")]);
        assert!(result.errors[0].reason.contains("Y unavailable"));
    }

    #[tokio::test]
    async fn all_fail_is_total_failure() {
        let result = combiner().combine(keys(&["X", "Y"]), |k| fetch_unless(k, &["X", "Y"])).await;
        assert_eq!(result.disposition(), Disposition::TotalFailure);
        assert!(result.combined.is_empty());
        assert_eq!(result.errors.len(), 2);
    }

    #[tokio::test]
    async fn no_keys_is_empty_total_success() {
        let result: FanOutResult<usize> =
            combiner().combine(Vec::new(), |k| fetch_unless(k, &[])).await;
        assert!(result.is_total_success());
        assert!(result.combined.is_empty());
    }

    #[tokio::test]
    async fn exactly_successful_and_failed_keys_are_reported() {
        let all = ["a", "b", "c", "d", "e"];
        let result = combiner().combine(keys(&all), |k| fetch_unless(k, &["b", "d"])).await;
        assert_eq!(result.combined.len() + result.errors.len(), all.len());
        for failure in &result.errors {
            assert!(!result.combined.contains_key(&failure.key));
        }
    }
}

// ── Concurrency and timeouts ────────────────────────────────────────

mod concurrency {
    use super::*;

    #[tokio::test]
    async fn stalled_key_times_out_without_blocking_others() {
        let combiner = FanOutCombiner::new(Duration::from_millis(100));
        let result = combiner
            .combine(keys(&["fast", "stuck"]), |key| async move {
                if key.address == "stuck" {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                }
                Ok::<_, CoreError>(key.address)
            })
            .await;

        assert_eq!(result.disposition(), Disposition::PartialSuccess);
        assert!(result.combined.contains_key(&RequestKey::address("fast")));
        assert!(result.errors[0].reason.contains("timed out after 100ms"));
    }

    #[tokio::test]
    async fn fetches_run_concurrently() {
        let combiner = FanOutCombiner::new(Duration::from_secs(5));
        let started = std::time::Instant::now();
        let result = combiner
            .combine(keys(&["a", "b", "c", "d"]), |key| async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, CoreError>(key.address)
            })
            .await;

        assert!(result.is_total_success());
        assert!(started.elapsed() < Duration::from_millis(700));
    }

    #[tokio::test]
    async fn duplicate_keys_are_fetched_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let result = combiner()
            .combine(keys(&["a", "a", "b", "a"]), move |key| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok::<_, CoreError>(key.address) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(result.combined.len(), 2);
    }

    #[tokio::test]
    async fn dated_keys_are_distinct() {
        let jan = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let feb = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let result = combiner()
            .combine(
                vec![RequestKey::dated("0xa", jan), RequestKey::dated("0xa", feb)],
                |key| async move { Ok::<_, CoreError>(key.to_string()) },
            )
            .await;

        assert_eq!(result.for_date(feb).collect::<Vec<_>>(), vec!["0xa@2024-02-01"]);
    }
}

// ── Serialization of results ────────────────────────────────────────

mod result_serde {
    use super::*;

    #[tokio::test]
    async fn partial_result_survives_json() {
        let result = combiner().combine(keys(&["X", "Y"]), |k| fetch_unless(k, &["Y"])).await;
        let json = serde_json::to_string(&result).unwrap();
        let back: FanOutResult<usize> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
        assert_eq!(back.disposition(), Disposition::PartialSuccess);
    }
}

//! Integration Tests for publish-bench
//!
//! These drive the full runner (reset, fan-out, join, verify) against the
//! in-process broker.

use publish_bench::broker::{PublishMode, QueueSpec};
use publish_bench::stats::TimingStats;
use publish_bench::{BenchError, BenchmarkRunner, Broker, BrokerError, ConfigError, MemoryBroker};
use std::sync::Arc;

mod common;
use common::*;

fn runner(broker: &MemoryBroker, config: publish_bench::BenchConfig) -> BenchmarkRunner {
    BenchmarkRunner::new(config, Arc::new(broker.clone()))
        .with_sample_interval(TEST_SAMPLE_INTERVAL)
}

// ============================================================================
// Full runs
// ============================================================================

mod runs {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_single_publish_single_worker() {
        init_test_logging();
        let broker = MemoryBroker::new();

        let summary = runner(&broker, memory_config("it-single", 1, 1))
            .run()
            .await
            .unwrap();

        let v = summary.verification;
        assert_eq!((v.depth, v.expected, v.checked, v.correct), (1, 1, 1, 1));
        assert!(v.to_string().ends_with("Valid messages\t: 1 / 1"));
        assert!(matches!(summary.timing, TimingStats::Single { .. }));
        assert_eq!(summary.worker_elapsed_ms.len(), 1);
        assert!(!broker.queue_exists("it-single"));
        assert_eq!(broker.open_sessions(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_four_workers_ten_iterations() {
        let broker = MemoryBroker::new();

        let summary = runner(&broker, memory_config("it-four", 10, 4))
            .run()
            .await
            .unwrap();

        let v = summary.verification;
        assert_eq!(v.expected, 40);
        assert_eq!(v.depth, 40);
        assert_eq!(v.checked, 40);
        assert_eq!(v.correct, 40);
        assert!(!v.to_string().contains("(first 100 of"));

        let TimingStats::Spread {
            avg_ms,
            min_ms,
            max_ms,
        } = summary.timing
        else {
            panic!("expected avg/min/max for several workers");
        };
        assert!(min_ms <= avg_ms && avg_ms <= max_ms);
        assert_eq!(summary.worker_elapsed_ms.len(), 4);
        assert!(!broker.queue_exists("it-four"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_deep_queue_is_sampled_to_limit() {
        let broker = MemoryBroker::new();
        let config = publish_bench::BenchConfig {
            non_copying: true,
            ..memory_config("it-deep", 125, 2)
        };

        let summary = runner(&broker, config).run().await.unwrap();

        let v = summary.verification;
        assert_eq!((v.depth, v.expected), (250, 250));
        assert_eq!((v.checked, v.correct), (100, 100));
        assert!(v.to_string().ends_with("(first 100 of 250)"));
        assert_eq!(summary.publish_mode, "non-copying");
        assert!(!broker.queue_exists("it-deep"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_leftover_queue_is_reset_before_run() {
        let broker = MemoryBroker::new();
        let session = broker.open().await.unwrap();
        let durable = QueueSpec {
            durable: true,
            ..QueueSpec::TRANSIENT
        };
        session.declare_queue("it-stale", durable).await.unwrap();
        for _ in 0..7 {
            session
                .publish("it-stale", &bytes::Bytes::from_static(b"stale"), PublishMode::Copy)
                .await
                .unwrap();
        }
        session.close().await.unwrap();

        let summary = runner(&broker, memory_config("it-stale", 3, 2))
            .run()
            .await
            .unwrap();

        let v = summary.verification;
        assert_eq!((v.depth, v.expected, v.correct), (6, 6, 6));
    }

    // Samples are only recorded where the process memory probe works
    #[cfg(target_os = "linux")]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_sampler_keeps_pace_with_more_workers_than_threads() {
        let broker = MemoryBroker::new();
        let interval = std::time::Duration::from_millis(5);
        let config = memory_config("it-busy", 50, 4);

        let summary = BenchmarkRunner::new(config, Arc::new(broker.clone()))
            .with_sample_interval(interval)
            .run()
            .await
            .unwrap();

        // The sampler runs at least as long as the slowest worker
        let wall_ms = *summary.worker_elapsed_ms.iter().max().unwrap();
        let floor = 1 + wall_ms / (interval.as_millis() as u64 * 4);
        assert!(
            summary.memory_samples as u64 >= floor,
            "{} samples over {} ms of publishing",
            summary.memory_samples,
            wall_ms
        );
        assert!(summary.peak_memory_bytes.is_some());
        assert_eq!(summary.verification.depth, 200);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_summary_serializes_to_json() {
        let broker = MemoryBroker::new();

        let summary = runner(&broker, memory_config("it-json", 2, 2))
            .run()
            .await
            .unwrap();
        let line = summary.to_json().unwrap();
        assert!(line.starts_with('{') && !line.contains('\n'));
        let json: serde_json::Value = serde_json::from_str(&line).unwrap();

        assert_eq!(json["broker"], "memory");
        assert_eq!(json["workers"], 2);
        assert_eq!(json["timing"]["kind"], "spread");
        assert_eq!(json["verification"]["expected"], 4);
        assert_eq!(json["verification"]["correct"], 4);
        assert!(json["memory_samples"].is_u64());
    }
}

// ============================================================================
// Failure handling
// ============================================================================

mod failures {
    use super::*;

    #[tokio::test]
    async fn test_non_copying_rejected_before_any_broker_call() {
        let broker = Arc::new(CopyingOnlyBroker::new(MemoryBroker::new()));
        let config = publish_bench::BenchConfig {
            non_copying: true,
            ..memory_config("it-nc", 1, 1)
        };
        let runner = BenchmarkRunner::new(config, broker.clone());

        let err = runner.run().await.unwrap_err();

        assert!(matches!(
            err,
            BenchError::Config(ConfigError::NonCopyingUnsupported {
                broker: "copying-only"
            })
        ));
        assert!(err.to_string().contains("Non-copying publish is not supported"));
        assert_eq!(broker.opens(), 0);
    }

    #[tokio::test]
    async fn test_copying_run_works_without_capability() {
        let memory = MemoryBroker::new();
        let broker = Arc::new(CopyingOnlyBroker::new(memory.clone()));
        let runner = BenchmarkRunner::new(memory_config("it-copy", 2, 1), broker.clone())
            .with_sample_interval(TEST_SAMPLE_INTERVAL);

        let summary = runner.run().await.unwrap();

        assert_eq!(summary.verification.correct, 2);
        // reset + one worker + verifier
        assert_eq!(broker.opens(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_publish_failure_fails_run_and_closes_sessions() {
        let broker = MemoryBroker::with_publish_limit(5);

        let err = runner(&broker, memory_config("it-fail", 4, 3))
            .run()
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            BenchError::Worker {
                source: BrokerError::PublishFailed(_),
                ..
            }
        ));
        assert_eq!(broker.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let broker = MemoryBroker::new();
        let config = publish_bench::BenchConfig {
            queue: String::new(),
            ..memory_config("unused", 1, 1)
        };

        let err = runner(&broker, config).run().await.unwrap_err();

        assert!(matches!(
            err,
            BenchError::Config(ConfigError::InvalidQueueName(_))
        ));
        assert_eq!(broker.open_sessions(), 0);
    }
}

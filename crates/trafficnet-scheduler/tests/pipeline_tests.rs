// End-to-end stage runs over temporary sled stores

use std::sync::Arc;

use trafficnet_core::{LedgerStore, NetworkConfig, OrderType, Stage};
use trafficnet_scheduler::{Pipeline, PipelineError, StageStatus};

fn config() -> NetworkConfig {
    NetworkConfig {
        node_count: 5,
        time_steps: 6,
        optimization_period: 10,
        ..NetworkConfig::default()
    }
}

fn pipeline(config: NetworkConfig) -> Pipeline {
    Pipeline::new(config, Arc::new(LedgerStore::temporary().unwrap())).unwrap()
}

#[test]
fn test_run_all_produces_valid_ledgers() {
    let pipeline = pipeline(config());
    let reports = pipeline.run_all().unwrap();
    assert_eq!(reports.len(), 8);
    assert!(reports.iter().all(|r| r.status == StageStatus::Completed));
    assert!(reports.iter().all(|r| r.rejected == 0));

    let telemetry = &reports[0];
    let timeouts = telemetry.details["validator_timeouts"].as_u64().unwrap() as usize;
    assert_eq!(telemetry.block_count + timeouts, 30);

    for pair in reports.windows(2) {
        assert_eq!(pair[1].block_count, pair[0].block_count, "{} vs {}", pair[1].stage, pair[0].stage);
    }
    for stage in Stage::ALL {
        let report = pipeline.verify(stage).unwrap();
        assert!(report.valid, "{}", report);
        assert_eq!(report.blocks, telemetry.block_count + 1);
    }
}

#[test]
fn test_derived_blocks_point_at_upstream() {
    let pipeline = pipeline(config());
    pipeline.run(Stage::Telemetry).unwrap();
    pipeline.run(Stage::Congestion).unwrap();

    let store = pipeline.store();
    let telemetry = store.load(Stage::Telemetry).unwrap();
    let congestion = store.load(Stage::Congestion).unwrap();
    for (source, derived) in telemetry.iter().zip(&congestion).skip(1) {
        assert_eq!(derived.source_hash.as_deref(), Some(source.hash.as_str()));
        assert_eq!(derived.stage, Stage::Congestion);
        assert_eq!(derived.congestion.is_congested, derived.congestion.level.is_congested());
    }
}

#[test]
fn test_missing_upstream_is_zero_work() {
    let pipeline = pipeline(config());
    let report = pipeline.run(Stage::Healed).unwrap();
    assert_eq!(report.status, StageStatus::NoInput);
    assert_eq!(report.block_count, 0);
    assert!(pipeline.store().load(Stage::Healed).unwrap().is_empty());
}

#[test]
fn test_stage_names() {
    let pipeline = pipeline(config());
    pipeline.run_named("telemetry").unwrap();
    assert_eq!(pipeline.run_named("Congestion").unwrap().stage, Stage::Congestion);
    assert!(matches!(pipeline.run_named("bogus"), Err(PipelineError::UnknownStage(_))));
}

#[test]
fn test_tampered_upstream_block_is_dropped() {
    let pipeline = pipeline(config());
    let telemetry = pipeline.run(Stage::Telemetry).unwrap();

    let store = pipeline.store();
    let mut blocks = store.load(Stage::Telemetry).unwrap();
    blocks[2].traffic.volume += 1000.0;
    store.replace(Stage::Telemetry, &blocks).unwrap();

    assert!(!pipeline.verify(Stage::Telemetry).unwrap().valid);
    let congestion = pipeline.run(Stage::Congestion).unwrap();
    assert_eq!(congestion.rejected, 1);
    assert_eq!(congestion.block_count, telemetry.block_count - 1);
    assert!(pipeline.verify(Stage::Congestion).unwrap().valid);
}

#[test]
fn test_forged_upstream_signature_is_counted() {
    let pipeline = pipeline(config());
    let telemetry = pipeline.run(Stage::Telemetry).unwrap();

    let store = pipeline.store();
    let mut blocks = store.load(Stage::Telemetry).unwrap();
    blocks[2].signature = blocks[3].signature.clone();
    store.replace(Stage::Telemetry, &blocks).unwrap();

    let congestion = pipeline.run(Stage::Congestion).unwrap();
    assert_eq!(congestion.rejected, 1);
    assert_eq!(congestion.block_count, telemetry.block_count - 1);
}

#[test]
fn test_block_limit_caps_processing() {
    let pipeline = pipeline(NetworkConfig { block_limit: Some(7), ..config() });
    let reports = pipeline.run_all().unwrap();
    assert!(reports[0].block_count <= 7);
    assert!(reports.iter().all(|r| r.block_count == reports[0].block_count));
}

#[test]
fn test_realtime_processes_priority_first() {
    let pipeline = pipeline(NetworkConfig { time_steps: 20, ..config() });
    for stage in &Stage::ALL[..5] {
        pipeline.run(*stage).unwrap();
    }

    let ordered = pipeline.store().load(Stage::Ordered).unwrap();
    for block in ordered.iter().skip(1) {
        if block.order_type == Some(OrderType::Priority) {
            assert!(block.congestion.is_congested);
        }
    }

    let realtime = pipeline.store().load(Stage::RealTime).unwrap();
    let orders: Vec<bool> = realtime
        .iter()
        .skip(1)
        .map(|b| b.order_type == Some(OrderType::Priority))
        .collect();
    let first_standard = orders.iter().position(|p| !p).unwrap_or(orders.len());
    assert!(orders[first_standard..].iter().all(|p| !p));
}

#[test]
fn test_ledgers_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = NetworkConfig { data_dir: dir.path().join("ledger"), ..config() };
    {
        let pipeline = Pipeline::open(config.clone()).unwrap();
        pipeline.run(Stage::Telemetry).unwrap();
    }
    let reopened = Pipeline::open(config).unwrap();
    assert!(reopened.verify(Stage::Telemetry).unwrap().valid);
    let report = reopened.run(Stage::Congestion).unwrap();
    assert_eq!(report.status, StageStatus::Completed);
}

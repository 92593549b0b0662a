//! Runner integration tests over in-memory input.

use onset_pipeline::PipelineConfig;
use onset_runner::{load_config, run_batch, run_stream, RunnerError};
use serde_json::{json, Value};
use std::future::pending;
use std::io::Cursor;

/// Quiet rows, a candidate at 30s and a surge that confirms at 33s.
fn input() -> String {
    (0..60)
        .map(|i| {
            let (ret, z_vol, ticks) = match i {
                30 => (0.003, 3.0, 5.0),
                31..=40 => (0.001, 1.5, 5.0),
                _ => (0.0, 0.0, 1.0),
            };
            json!({
                "ts": i * 1_000,
                "entity_id": "ABC",
                "ret_1s": ret,
                "accel_1s": 0.0,
                "z_vol_1s": z_vol,
                "ticks_per_sec": ticks,
                "spread": 0.02,
                "microprice_slope": 0.0,
                "price": 100.0,
            })
            .to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn records(out: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(out)
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[test]
fn test_batch_writes_alert_record() {
    let mut out = Vec::new();
    let report = run_batch(
        PipelineConfig::default(),
        Cursor::new(input()),
        &mut out,
        false,
    )
    .unwrap();
    assert_eq!(report.counts.confirmed, 1);

    let records = records(&out);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["event_type"], "onset_confirmed");
    assert_eq!(records[0]["ts"], 33_000);
    assert_eq!(records[0]["confirmed_from"], 30_000);
    assert_eq!(
        records[0]["evidence"]["axes"],
        json!(["price", "volume", "friction"])
    );
}

#[test]
fn test_batch_diagnostics_include_candidates() {
    let mut out = Vec::new();
    run_batch(
        PipelineConfig::default(),
        Cursor::new(input()),
        &mut out,
        true,
    )
    .unwrap();

    let kinds: Vec<_> = records(&out)
        .iter()
        .map(|r| r["event_type"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(kinds, vec!["onset_candidate", "onset_confirmed"]);
}

#[test]
fn test_batch_rejects_bad_json() {
    let err = run_batch(
        PipelineConfig::default(),
        Cursor::new("{\"ts\": 0,\n"),
        Vec::new(),
        false,
    )
    .unwrap_err();
    assert!(matches!(err, RunnerError::Input(_)));
}

#[tokio::test]
async fn test_stream_emits_alert() {
    let input = input();
    let mut out = Vec::new();
    let stats = run_stream(
        PipelineConfig::default(),
        input.as_bytes(),
        &mut out,
        pending::<()>(),
    )
    .await
    .unwrap();

    assert_eq!(stats.ticks, 60);
    assert_eq!(stats.confirmed, 1);
    let records = records(&out);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["ts"], 33_000);
}

#[tokio::test]
async fn test_stream_stops_on_shutdown() {
    let input = input();
    let mut out = Vec::new();
    let stats = run_stream(
        PipelineConfig::default(),
        input.as_bytes(),
        &mut out,
        std::future::ready(()),
    )
    .await
    .unwrap();
    assert_eq!(stats.ticks, 0);
    assert!(out.is_empty());
}

#[test]
fn test_stream_missing_column_is_fatal() {
    let line = r#"{"ts":0,"entity_id":"ABC","ret_1s":0.0,"accel_1s":0.0,"z_vol_1s":0.0,"ticks_per_sec":1.0,"microprice_slope":0.0}"#;
    let result = tokio_test::block_on(run_stream(
        PipelineConfig::default(),
        line.as_bytes(),
        Vec::new(),
        pending::<()>(),
    ));
    assert!(matches!(result, Err(RunnerError::Pipeline(_))));
}

#[test]
fn test_load_config_layers_env_over_file() {
    let path = std::env::temp_dir().join(format!("onset-runner-{}.toml", std::process::id()));
    std::fs::write(
        &path,
        "[refractory]\nduration_s = 60\n\n[confirm]\npersistent_n = 4\n",
    )
    .unwrap();

    std::env::set_var("ONSET__CONFIRM__PERSISTENT_N", "5");
    let loaded = load_config(Some(&path));
    std::env::remove_var("ONSET__CONFIRM__PERSISTENT_N");
    std::fs::remove_file(&path).unwrap();

    let config = loaded.unwrap();
    assert_eq!(config.refractory.duration_s, 60.0);
    assert_eq!(config.confirm.persistent_n, 5);
    assert_eq!(config.detector, PipelineConfig::default().detector);

    let missing = load_config(Some(std::path::Path::new("/nonexistent/onset.toml")));
    assert!(matches!(missing, Err(RunnerError::Config(_))));
}

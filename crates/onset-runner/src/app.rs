//! Batch and streaming drivers.
//!
//! Both read JSON-lines feature rows and write one JSON event record per
//! line to `out`. Logs go to stderr through `tracing`.

use crate::error::RunnerResult;
use onset_core::{FeatureBatch, OnsetEvent, RowDecoder};
use onset_pipeline::{OnsetPipeline, PipelineConfig, PipelineReport, StreamStats, StreamingPipeline};
use serde::Serialize;
use std::future::Future;
use std::io::{BufRead, Write};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{info, warn};

fn write_record<W: Write, T: Serialize>(out: &mut W, record: &T) -> RunnerResult<()> {
    serde_json::to_writer(&mut *out, record)?;
    out.write_all(b"\n")?;
    Ok(())
}

/// Run the whole input as one batch.
///
/// Writes confirmed and rejected records in timestamp order; with
/// `diagnostics` every candidate record is written as well.
pub fn run_batch<R: BufRead, W: Write>(
    config: PipelineConfig,
    input: R,
    mut out: W,
    diagnostics: bool,
) -> RunnerResult<PipelineReport> {
    let batch = FeatureBatch::from_json_lines(input)?;
    info!(rows = batch.len(), "Input decoded");

    let mut pipeline = OnsetPipeline::new(config)?.with_diagnostics(diagnostics);
    let report = pipeline.run_batch(&batch)?;

    let mut events = report.events();
    if let Some(diag) = &report.diagnostics {
        events.extend(diag.candidates.iter().cloned().map(OnsetEvent::from));
        events.sort_by_key(|e| e.header().ts);
    }
    for event in &events {
        write_record(&mut out, event)?;
    }
    out.flush()?;

    info!(
        candidates = report.counts.candidates,
        rejected = report.counts.rejected,
        confirmed = report.counts.confirmed,
        "Batch written"
    );
    Ok(report)
}

/// Feed rows one by one until EOF or `shutdown` resolves.
///
/// Each alert is written as soon as it fires; refractory rejections follow
/// the tick that produced them.
pub async fn run_stream<R, W, S>(
    config: PipelineConfig,
    input: R,
    mut out: W,
    shutdown: S,
) -> RunnerResult<StreamStats>
where
    R: AsyncBufRead + Unpin,
    W: Write,
    S: Future<Output = ()>,
{
    let mut pipeline = StreamingPipeline::new(config)?;
    let mut decoder = RowDecoder::new();
    let mut schema_checked = false;
    let mut lines = input.lines();
    tokio::pin!(shutdown);

    loop {
        let line = tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };

        let Some(row) = decoder.decode_line(&line)? else {
            continue;
        };
        if !schema_checked {
            if let Some(schema) = decoder.schema() {
                pipeline.check_schema(schema)?;
            }
            schema_checked = true;
        }

        if let Some(alert) = pipeline.on_tick(row)? {
            write_record(&mut out, &OnsetEvent::from(alert))?;
        }
        for rejected in pipeline.take_rejected() {
            write_record(&mut out, &OnsetEvent::from(rejected))?;
        }
        out.flush()?;
    }

    let stats = pipeline.stats();
    if stats.pending > 0 {
        warn!(pending = stats.pending, "Stream ended with unconfirmed candidates");
    }
    info!(
        ticks = stats.ticks,
        candidates = stats.candidates,
        rejected = stats.rejected,
        confirmed = stats.confirmed,
        expired = stats.expired,
        "Stream finished"
    );
    Ok(stats)
}

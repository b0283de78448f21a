//! Dispatcher routing tests.
//!
//! Uses a real registry with shell-script processors and observes the scan
//! requests their workers send back.

#[cfg(test)]
mod tests {
  use std::{sync::Arc, time::Duration};

  use pretty_assertions::assert_eq;
  use tokio::sync::mpsc;
  use tokio_util::sync::CancellationToken;

  use crate::{
    actor::{
      __tests__::helpers::{OLD, PipelineTestContext, processor_id, read_lines, wait_for},
      dispatcher::{DispatchSummary, Dispatcher},
      handle::{DispatchHandle, IngestHandle},
      message::{ClaimedPair, ScanRequest},
      registry::ProcessorRegistry,
    },
    domain::{ProcessorId, Provenance},
    work_area,
  };

  struct Fixture {
    ctx: PipelineTestContext,
    registry: Arc<ProcessorRegistry>,
    dispatcher: Dispatcher,
    ingest_rx: mpsc::Receiver<ScanRequest>,
  }

  async fn fixture(ctx: PipelineTestContext) -> Fixture {
    let registry = Arc::new(ProcessorRegistry::new(ctx.definitions_dir.clone()));
    registry.rebuild().await.expect("registry should build");

    let (ingest, ingest_rx) = IngestHandle::channel();
    let (_dispatch, dispatch_rx) = DispatchHandle::channel();
    let dispatcher = Dispatcher::new(
      ctx.work_dir.clone(),
      Arc::clone(&registry),
      ingest,
      dispatch_rx,
      CancellationToken::new(),
    );

    Fixture {
      ctx,
      registry,
      dispatcher,
      ingest_rx,
    }
  }

  /// Claim a pair the way the ingester does.
  async fn claimed_pair(ctx: &PipelineTestContext, metadata: &str, provenance: Provenance) -> ClaimedPair {
    let metadata_path = ctx.drop_pair(&ctx.ingest_dir, "artifact", metadata, OLD);
    let data_path = work_area::data_path_for(&metadata_path);
    let claimed = work_area::claim_pair(&ctx.work_dir, &metadata_path, &data_path)
      .await
      .expect("claim pair");
    ClaimedPair {
      metadata: claimed.metadata,
      data: claimed.data,
      provenance,
    }
  }

  /// Test: a processor already in the provenance list is never submitted again.
  #[tokio::test]
  async fn test_skips_processors_in_provenance() {
    let ctx = PipelineTestContext::new();
    let (a_dir, a_log) = ctx.add_recording_processor("a", "type = image", 1);
    let (b_dir, b_log) = ctx.add_recording_processor("b", "type = image", 1);
    let (a, b) = (processor_id(&a_dir), processor_id(&b_dir));
    let f = fixture(ctx).await;

    let pair = claimed_pair(&f.ctx, "type = image", Provenance::from(vec![a.clone()])).await;
    let summary = f.dispatcher.dispatch(pair).await;
    assert_eq!(
      summary,
      DispatchSummary {
        submitted: 1,
        skipped: 1,
        failed: 0
      }
    );

    let pair = claimed_pair(&f.ctx, "type = image", Provenance::from(vec![a, b])).await;
    let summary = f.dispatcher.dispatch(pair).await;
    assert_eq!(summary.submitted, 0);
    assert_eq!(summary.skipped, 2);

    f.registry.shutdown().await;
    assert_eq!(read_lines(&a_log).len(), 0);
    assert_eq!(read_lines(&b_log).len(), 1);
  }

  /// Test: fan-out targets each get their own provenance and their own input copy.
  #[tokio::test]
  async fn test_fan_out_independence() {
    let ctx = PipelineTestContext::new();
    let (a_dir, a_log) = ctx.add_recording_processor("a", "type = image", 1);
    let (b_dir, b_log) = ctx.add_recording_processor("b", "type = image", 1);
    let (a, b) = (processor_id(&a_dir), processor_id(&b_dir));
    let mut f = fixture(ctx).await;

    let pair = claimed_pair(&f.ctx, "type = image", Provenance::new()).await;
    let claim_metadata = pair.metadata.clone();
    let summary = f.dispatcher.dispatch(pair).await;
    assert_eq!(summary.submitted, 2);

    let mut provenances: Vec<Vec<ProcessorId>> = Vec::new();
    for _ in 0..2 {
      let scan = tokio::time::timeout(Duration::from_secs(10), f.ingest_rx.recv())
        .await
        .expect("scan request within timeout")
        .expect("ingest channel open");
      assert!(scan.remove_after_ingest);
      assert_eq!(scan.min_age, Duration::ZERO);
      provenances.push(scan.provenance.iter().cloned().collect());
    }
    provenances.sort();

    let mut expected = vec![vec![a], vec![b]];
    expected.sort();
    assert_eq!(provenances, expected);

    let a_run = read_lines(&a_log);
    let b_run = read_lines(&b_log);
    assert_eq!(a_run.len(), 1);
    assert_eq!(b_run.len(), 1);
    assert_ne!(a_run[0], b_run[0], "targets must not share input/output directories");

    // The claimed originals stay in place for other targets
    assert!(claim_metadata.exists());
    f.registry.shutdown().await;
  }

  /// Test: a pair that matches nothing creates no work directories.
  #[tokio::test]
  async fn test_no_match() {
    let ctx = PipelineTestContext::new();
    ctx.add_recording_processor("a", "type = image", 1);
    let f = fixture(ctx).await;

    let pair = claimed_pair(&f.ctx, "type = text", Provenance::new()).await;
    let summary = f.dispatcher.dispatch(pair).await;

    assert_eq!(summary, DispatchSummary::default());
    assert!(f.ctx.work_entries("input-").is_empty());
    assert!(f.ctx.work_entries("output-").is_empty());
    assert_eq!(f.ctx.work_entries("claim-").len(), 1);
    f.registry.shutdown().await;
  }

  /// Test: malformed metadata drops the pair.
  #[tokio::test]
  async fn test_malformed_metadata() {
    let ctx = PipelineTestContext::new();
    ctx.add_recording_processor("a", "", 1);
    let f = fixture(ctx).await;

    let pair = claimed_pair(&f.ctx, "this line has no separator", Provenance::new()).await;
    let summary = f.dispatcher.dispatch(pair).await;

    assert_eq!(summary, DispatchSummary::default());
    assert!(f.ctx.work_entries("input-").is_empty());
    f.registry.shutdown().await;
  }

  /// Test: a copy failure abandons only that target and removes its directories.
  #[tokio::test]
  async fn test_copy_failure_cleans_up() {
    let ctx = PipelineTestContext::new();
    let (_, log) = ctx.add_recording_processor("a", "type = image", 1);
    let f = fixture(ctx).await;

    let pair = claimed_pair(&f.ctx, "type = image", Provenance::new()).await;
    std::fs::remove_file(&pair.data).unwrap();
    let summary = f.dispatcher.dispatch(pair).await;

    assert_eq!(
      summary,
      DispatchSummary {
        submitted: 0,
        skipped: 0,
        failed: 1
      }
    );
    assert!(f.ctx.work_entries("input-").is_empty());
    assert!(f.ctx.work_entries("output-").is_empty());

    f.registry.shutdown().await;
    assert!(read_lines(&log).is_empty());
  }

  /// Test: processors receive absolute input/output paths holding a copy of the pair.
  #[tokio::test]
  async fn test_processor_receives_absolute_dirs() {
    let ctx = PipelineTestContext::new();
    let listing = ctx.scratch_dir.join("listing");
    ctx.add_processor(
      "lister",
      "type = image",
      &format!("echo \"$1\" > \"{0}\"\necho \"$2\" >> \"{0}\"\nls \"$1\" >> \"{0}\"", listing.display()),
      1,
    );
    let f = fixture(ctx).await;

    let pair = claimed_pair(&f.ctx, "type = image", Provenance::new()).await;
    f.dispatcher.dispatch(pair).await;

    assert!(wait_for(Duration::from_secs(10), || async { read_lines(&listing).len() >= 4 }).await);
    let lines = read_lines(&listing);
    assert!(lines[0].starts_with('/') && lines[0].contains("input-"));
    assert!(lines[1].starts_with('/') && lines[1].contains("output-"));
    let mut files = lines[2..].to_vec();
    files.sort();
    assert_eq!(files, vec!["artifact".to_string(), "artifact.properties".to_string()]);
    f.registry.shutdown().await;
  }
}

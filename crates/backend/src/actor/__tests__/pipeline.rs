//! End-to-end pipeline tests through the daemon.
//!
//! Tests the full ingest → match → dispatch → execute → re-ingest loop.

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use crate::{
    Daemon, StartupError,
    actor::{
      __tests__::helpers::{OLD, PipelineTestContext, read_lines, wait_for},
      registry::RegistryError,
    },
  };

  /// A processor that records its arguments and writes an output pair that matches its own hook.
  fn add_image_processor(ctx: &PipelineTestContext, name: &str, out_type: &str) -> std::path::PathBuf {
    let log = ctx.scratch_dir.join(format!("{}.runs", name));
    let body = format!(
      "echo \"$1 $2\" >> \"{log}\"\n\
       printf 'type = {out_type}\\n' > \"$2/result.properties\"\n\
       cat \"$1\"/photo > \"$2/result\"",
      log = log.display(),
      out_type = out_type,
    );
    ctx.add_processor(name, "type = image", &body, 2);
    log
  }

  /// Test: one pair runs the processor once; its matching output is not resubmitted to it.
  #[tokio::test]
  async fn test_end_to_end_single_stage() {
    let ctx = PipelineTestContext::new();
    let log = add_image_processor(&ctx, "thumbnail", "image");
    ctx.drop_pair(&ctx.ingest_dir, "photo", "type = image", OLD);

    let daemon = Daemon::start(ctx.config()).await.expect("daemon should start");

    // Original pair and the re-ingested output pair each get a claim directory
    let settled = wait_for(Duration::from_secs(20), || async {
      ctx.work_entries("claim-").len() == 2
        && ctx.work_entries("output-").is_empty()
        && ctx.work_entries("input-").is_empty()
    })
    .await;
    assert!(settled, "pipeline should settle");

    // Give a second stage the chance to (wrongly) run
    tokio::time::sleep(Duration::from_millis(500)).await;
    daemon.shutdown().await;

    let runs = read_lines(&log);
    assert_eq!(runs.len(), 1, "processor should run exactly once: {:?}", runs);

    let args: Vec<&str> = runs[0].split(' ').collect();
    assert_eq!(args.len(), 2);
    assert!(args.iter().all(|a| a.starts_with('/')), "arguments must be absolute: {:?}", args);
    assert!(args[0].contains("input-") && args[1].contains("output-"));

    assert!(!ctx.ingest_dir.join("photo.properties").exists());
  }

  /// Test: output that matches another processor flows into a second stage.
  #[tokio::test]
  async fn test_end_to_end_two_stages() {
    let ctx = PipelineTestContext::new();
    let first = add_image_processor(&ctx, "first", "image");
    let (_, second) = ctx.add_recording_processor("second", "type = image", 1);
    ctx.drop_pair(&ctx.ingest_dir, "photo", "type = image", OLD);

    let daemon = Daemon::start(ctx.config()).await.expect("daemon should start");

    // Stage one: first and second both match the dropped pair.
    // Stage two: first's output matches second again, but not first.
    let done = wait_for(Duration::from_secs(20), || async {
      read_lines(&first).len() == 1 && read_lines(&second).len() == 2
    })
    .await;
    assert!(done, "second processor should run on the original and on first's output");

    tokio::time::sleep(Duration::from_millis(500)).await;
    daemon.shutdown().await;

    assert_eq!(read_lines(&first).len(), 1);
    assert_eq!(read_lines(&second).len(), 2);
  }

  /// Test: young pairs wait for the age gate.
  #[tokio::test]
  async fn test_young_pair_is_not_claimed() {
    let ctx = PipelineTestContext::new();
    let log = add_image_processor(&ctx, "thumbnail", "image");
    let metadata = ctx.drop_pair(&ctx.ingest_dir, "photo", "type = image", Duration::from_secs(5));

    let daemon = Daemon::start(ctx.config()).await.expect("daemon should start");
    tokio::time::sleep(Duration::from_millis(1500)).await;
    daemon.shutdown().await;

    assert!(metadata.exists());
    assert!(ctx.work_entries("claim-").is_empty());
    assert!(read_lines(&log).is_empty());
  }

  /// Test: startup fails when no processor definition is usable.
  #[tokio::test]
  async fn test_startup_without_processors() {
    let ctx = PipelineTestContext::new();

    let err = Daemon::start(ctx.config()).await.err().expect("startup should fail");
    assert!(matches!(err, StartupError::Registry(RegistryError::NoProcessors(_))));
  }

  /// Test: startup fails when a configured directory is missing.
  #[tokio::test]
  async fn test_startup_with_missing_work_dir() {
    let ctx = PipelineTestContext::new();
    add_image_processor(&ctx, "thumbnail", "image");
    let mut config = ctx.config();
    config.work_dir = ctx.work_dir.join("missing");

    let err = Daemon::start(config).await.err().expect("startup should fail");
    assert!(matches!(err, StartupError::Config(_)));
  }

  /// Test: cancelling the daemon token stops `run`.
  #[tokio::test]
  async fn test_cancel_stops_run() {
    let ctx = PipelineTestContext::new();
    add_image_processor(&ctx, "thumbnail", "image");

    let daemon = Daemon::start(ctx.config()).await.expect("daemon should start");
    let cancel = daemon.cancel_token();
    let run = tokio::spawn(daemon.run());

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(10), run)
      .await
      .expect("daemon stops within timeout")
      .unwrap();
  }
}

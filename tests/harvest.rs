use std::sync::Arc;

use pdfharvest::error::{Error, Result};
use pdfharvest::extract::DocumentProcessor;
use pdfharvest::harvest::Harvester;
use pdfharvest::store::Ledger;
use pdfharvest::text::{LanguageClassifier, PlainTextDecoder, TokenCounter, TokenWindow};
use wiremock::MockServer;

mod common;
use common::{
    doc, fast_fetcher, harvester, mount_archive, read_ledger, text_config, truncating_store, words,
    zip_bytes,
};

/// Whitespace counting that panics on documents starting with `POISON`.
struct PoisonedCounter;

impl TokenCounter for PoisonedCounter {
    fn scheme(&self) -> String {
        "poisoned".to_string()
    }

    fn count(&self, text: &str) -> Result<usize> {
        if text.starts_with("POISON") {
            panic!("counter blew up");
        }
        Ok(text.split_whitespace().count())
    }
}

#[tokio::test]
async fn keeps_only_documents_inside_token_window() -> Result<()> {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_archive(
        &server,
        0,
        zip_bytes(&[
            ("a.txt", words(20)),
            ("b.txt", words(30)),
            ("c.txt", words(10)),
            ("short.txt", words(3)),
            ("long.txt", words(100)),
            ("notes.md", words(20)),
        ]),
    )
    .await;

    let config = text_config(&server.uri(), dir.path());
    let output = config.paths.output.clone();
    let staging = config.paths.staging_dir.clone();

    let report = harvester(config).run().await?;

    assert_eq!(report.accepted, 3);
    assert_eq!(report.newly_accepted, 3);
    assert_eq!(report.documents_seen, 5);
    assert_eq!(report.documents_out_of_range, 2);
    assert_eq!(report.archives_scanned, 1);
    assert_eq!(report.shortfall, 7);
    assert!(!report.reached_target());

    let ledger = read_ledger(&output);
    let names: Vec<&str> = ledger.iter().map(|d| d.filename.as_str()).collect();
    assert_eq!(names, vec!["a.txt", "b.txt", "c.txt"]);
    assert!(ledger.iter().all(|d| (10..=50).contains(&d.token_count)));
    assert!(!staging.exists(), "staging directory should be removed when empty");
    Ok(())
}

#[tokio::test]
async fn duplicate_identifier_across_archives_is_recorded_once() -> Result<()> {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_archive(
        &server,
        0,
        zip_bytes(&[("shared.txt", words(12)), ("first.txt", words(15))]),
    )
    .await;
    mount_archive(
        &server,
        1,
        zip_bytes(&[("shared.txt", words(40)), ("second.txt", words(15))]),
    )
    .await;

    let mut config = text_config(&server.uri(), dir.path());
    config.source.total_archives = 2;
    let output = config.paths.output.clone();

    let report = harvester(config).run().await?;

    assert_eq!(report.accepted, 3);
    assert_eq!(report.documents_duplicate + report.documents_known, 1);

    let ledger = read_ledger(&output);
    assert_eq!(ledger.iter().filter(|d| d.filename == "shared.txt").count(), 1);
    assert_eq!(ledger.len(), 3);
    Ok(())
}

#[tokio::test]
async fn shortfall_when_archives_run_out() -> Result<()> {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    // Archives 1 and 2 are not mounted: the store answers 404.
    mount_archive(
        &server,
        0,
        zip_bytes(&[("a.txt", words(20)), ("b.txt", words(20))]),
    )
    .await;

    let mut config = text_config(&server.uri(), dir.path());
    config.source.total_archives = 3;
    config.limits.target_count = 5;
    let output = config.paths.output.clone();

    let report = harvester(config).run().await?;

    assert_eq!(report.accepted, 2);
    assert_eq!(report.shortfall, 3);
    assert_eq!(report.archives_failed, 2);
    assert_eq!(read_ledger(&output).len(), 2);
    Ok(())
}

#[tokio::test]
async fn corrupt_archive_is_skipped() -> Result<()> {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_archive(&server, 0, b"this is not a zip archive".to_vec()).await;
    mount_archive(&server, 1, zip_bytes(&[("ok.txt", words(25))])).await;

    let mut config = text_config(&server.uri(), dir.path());
    config.source.total_archives = 2;
    let output = config.paths.output.clone();
    let staging = config.paths.staging_dir.clone();

    let report = harvester(config).run().await?;

    assert_eq!(report.accepted, 1);
    assert_eq!(report.archives_failed, 1);
    assert_eq!(read_ledger(&output)[0].filename, "ok.txt");
    assert!(!staging.exists(), "corrupt archive must not be left in staging");
    Ok(())
}

#[tokio::test]
async fn stops_at_target() -> Result<()> {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    for index in 0..4u32 {
        let entries: Vec<(String, String)> = (0..4)
            .map(|i| (format!("a{index}/d{i}.txt"), words(20)))
            .collect();
        let refs: Vec<(&str, String)> = entries
            .iter()
            .map(|(name, body)| (name.as_str(), body.clone()))
            .collect();
        mount_archive(&server, index, zip_bytes(&refs)).await;
    }

    let mut config = text_config(&server.uri(), dir.path());
    config.source.total_archives = 4;
    config.limits.target_count = 6;
    config.concurrency.downloads = 1;
    config.concurrency.processors = 1;
    let output = config.paths.output.clone();

    let report = harvester(config).run().await?;

    assert_eq!(report.accepted, 6);
    assert!(report.reached_target());
    assert!(!report.cancelled);
    assert_eq!(read_ledger(&output).len(), 6);
    Ok(())
}

#[tokio::test]
async fn resumes_from_existing_ledger() -> Result<()> {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_archive(
        &server,
        0,
        zip_bytes(&[("old.txt", words(30)), ("new.txt", words(30))]),
    )
    .await;

    let config = text_config(&server.uri(), dir.path());
    let output = config.paths.output.clone();
    Ledger::from_documents(vec![doc("old.txt", "kept from an earlier run")], 10).flush(&output)?;

    let report = harvester(config).run().await?;

    assert_eq!(report.accepted, 2);
    assert_eq!(report.newly_accepted, 1);
    assert_eq!(report.documents_known, 1);

    let ledger = read_ledger(&output);
    assert_eq!(ledger[1].filename, "old.txt");
    assert_eq!(ledger[1].text, "kept from an earlier run");
    Ok(())
}

#[tokio::test]
async fn saturated_ledger_skips_the_pipeline() -> Result<()> {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    let mut config = text_config(&server.uri(), dir.path());
    config.limits.target_count = 1;
    let output = config.paths.output.clone();
    Ledger::from_documents(vec![doc("done.txt", "already collected")], 1).flush(&output)?;

    let report = harvester(config).run().await?;

    assert_eq!(report.accepted, 1);
    assert_eq!(report.archives_scanned, 0);
    assert!(server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .all(|r| r.method.as_str() == "HEAD"));
    Ok(())
}

#[tokio::test]
async fn unreachable_store_is_a_setup_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = text_config("http://127.0.0.1:1/", dir.path());

    let err = harvester(config).run().await.unwrap_err();
    assert!(matches!(err, Error::Unreachable { .. }), "got {err}");
}

#[tokio::test]
async fn unparsable_ledger_is_a_setup_error() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    let config = text_config(&server.uri(), dir.path());
    std::fs::create_dir_all(config.paths.output.parent().unwrap()).unwrap();
    std::fs::write(&config.paths.output, "{ not a ledger").unwrap();

    let err = harvester(config).run().await.unwrap_err();
    assert!(matches!(err, Error::LedgerFormat { .. }), "got {err}");
}

#[tokio::test]
async fn cancelled_run_still_flushes() -> Result<()> {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    let mut config = text_config(&server.uri(), dir.path());
    config.source.total_archives = 50;
    let output = config.paths.output.clone();

    let harvester = harvester(config);
    harvester.cancel_token().cancel();
    let report = harvester.run().await?;

    assert!(report.cancelled);
    assert_eq!(report.accepted, 0);
    assert!(read_ledger(&output).is_empty());
    Ok(())
}

#[tokio::test]
async fn panicking_document_is_skipped_and_the_harvest_continues() -> Result<()> {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_archive(
        &server,
        0,
        zip_bytes(&[
            ("a.txt", words(20)),
            ("poison.txt", format!("POISON {}", words(20))),
            ("b.txt", words(20)),
        ]),
    )
    .await;
    mount_archive(&server, 1, zip_bytes(&[("c.txt", words(20))])).await;

    let mut config = text_config(&server.uri(), dir.path());
    config.source.total_archives = 2;
    let output = config.paths.output.clone();

    let processor = DocumentProcessor::new(
        Arc::new(PlainTextDecoder),
        Arc::new(PoisonedCounter),
        TokenWindow::new(config.limits.min_tokens, config.limits.max_tokens),
        LanguageClassifier::default(),
    );
    let report = Harvester::with_parts(config, fast_fetcher(3), processor).run().await?;

    assert_eq!(report.accepted, 3);
    assert_eq!(report.documents_unprocessable, 1);
    assert_eq!(report.archives_failed, 0);

    let names: Vec<String> = read_ledger(&output).into_iter().map(|d| d.filename).collect();
    assert_eq!(names, vec!["a.txt", "b.txt", "c.txt"]);
    Ok(())
}

#[tokio::test]
async fn report_counts_discarded_partial_downloads() -> Result<()> {
    let dir = tempfile::tempdir().unwrap();
    let body = zip_bytes(&[("a.txt", words(20)), ("b.txt", words(25))]);
    let base = truncating_store(body, 2).await;

    let mut config = text_config(&base, dir.path());
    config.source.probe = false;
    let output = config.paths.output.clone();

    let report = harvester(config).run().await?;

    assert_eq!(report.partials_discarded, 2);
    assert_eq!(report.archives_failed, 0);
    assert_eq!(report.accepted, 2);
    assert_eq!(read_ledger(&output).len(), 2);
    Ok(())
}

#[tokio::test]
async fn failed_writes_hand_back_the_ledger() -> Result<()> {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_archive(
        &server,
        0,
        zip_bytes(&[("a.txt", words(20)), ("b.txt", words(20))]),
    )
    .await;

    // A regular file where the output directory should be.
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "").unwrap();

    let mut config = text_config(&server.uri(), dir.path());
    config.paths.output = blocker.join("ledger.json");
    config.ledger.checkpoint_every = 1;

    // Checkpoints fail along the way without stopping the run.
    let err = harvester(config).run_with(Ledger::new(10)).await.unwrap_err();
    match err {
        Error::Flush { ledger, .. } => {
            assert_eq!(ledger.len(), 2);
            assert!(ledger.contains("a.txt") && ledger.contains("b.txt"));
        }
        other => panic!("unexpected error: {other}"),
    }
    Ok(())
}

//! End-to-end runs against a wiremock lending service.
//!
//! These drive the real orchestrator and HTTP client through the full
//! borrow → fetch → assemble → release sequence. Mock expectations double as
//! lifecycle assertions: dropping the server verifies exactly one token
//! creation and the expected number of loan returns.

mod common;

use std::path::Path;
use std::time::Duration;

use common::{mount_borrow_refusal, mount_release, mount_session, mount_site, tiny_jpeg};
use tokio_util::sync::CancellationToken;
use wiremock::{MockServer, ResponseTemplate};

use lendfetch::{
    Artifact, AssemblyError, AssemblyMode, Config, Credentials, Error, LoanError, Orchestrator,
    OutputMode, RetryConfig, TitleId,
};

fn config(
    server: &MockServer,
    dir: &Path,
    mode: OutputMode,
    assembly: AssemblyMode,
) -> Config {
    let mut config = Config::default();
    config.service.base_url = server.uri();
    config.output.output_dir = dir.join("out");
    config.output.mode = mode;
    config.output.assembly = assembly;
    config.fetch.workers = 4;
    config.retry = RetryConfig {
        max_attempts: 1,
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        backoff_multiplier: 2.0,
        jitter: false,
    };
    config
}

fn credentials() -> Credentials {
    Credentials::new("reader@example.com", "secret").unwrap()
}

fn title() -> TitleId {
    TitleId::parse(common::TITLE).unwrap()
}

#[tokio::test]
async fn three_page_title_becomes_a_composite_document() {
    let server = MockServer::start().await;
    let payloads = vec![tiny_jpeg(10), tiny_jpeg(120), tiny_jpeg(240)];
    mount_site(&server, &payloads, &[]).await;

    let dir = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::new(config(
        &server,
        dir.path(),
        OutputMode::Document,
        AssemblyMode::Strict,
    ))
    .unwrap();

    let outcome = orchestrator
        .run(&credentials(), &title(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.report.complete());
    assert_eq!(outcome.report.len(), 3);
    assert!(outcome.missing_pages.is_empty());
    let Artifact::Document { path } = &outcome.artifact else {
        panic!("expected composite document");
    };
    assert_eq!(path.file_name().unwrap(), "Wire_Book.pdf");
    let bytes = std::fs::read(path).unwrap();
    assert!(bytes.starts_with(b"%PDF-"));
    // Server drop verifies exactly one create_token and one return_loan.
}

#[tokio::test]
async fn missing_page_fails_strict_mode_but_still_returns_the_loan() {
    let server = MockServer::start().await;
    let payloads: Vec<Vec<u8>> = (0..5).map(|i| format!("page-{i}").into_bytes()).collect();
    mount_site(&server, &payloads, &[(2, 404)]).await;

    let dir = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::new(config(
        &server,
        dir.path(),
        OutputMode::Pages,
        AssemblyMode::Strict,
    ))
    .unwrap();

    let run_error = orchestrator
        .run(&credentials(), &title(), &CancellationToken::new())
        .await
        .unwrap_err();

    match &run_error.error {
        Error::Assembly(AssemblyError::Incomplete { missing }) => {
            assert_eq!(missing, &vec![2]);
        }
        other => panic!("expected incomplete assembly, got {other:?}"),
    }
    let report = run_error.report.expect("report attached for diagnostics");
    assert_eq!(report.len(), 5);
    assert_eq!(report.fetched_count(), 4);
    assert_eq!(report.missing_indices(), vec![2]);
    // Server drop verifies the loan was still returned exactly once.
}

#[tokio::test]
async fn partial_mode_assembles_around_the_gap() {
    let server = MockServer::start().await;
    let payloads: Vec<Vec<u8>> = (0..4).map(|i| format!("page-{i}").into_bytes()).collect();
    mount_site(&server, &payloads, &[(1, 404)]).await;

    let dir = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::new(config(
        &server,
        dir.path(),
        OutputMode::Pages,
        AssemblyMode::Partial,
    ))
    .unwrap();

    let outcome = orchestrator
        .run(&credentials(), &title(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.missing_pages, vec![1]);
    let Artifact::Pages { files, .. } = &outcome.artifact else {
        panic!("expected page collection");
    };
    let names: Vec<String> = files
        .iter()
        .map(|f| f.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["0.jpg", "2.jpg", "3.jpg"]);
    for (name, index) in names.iter().zip([0usize, 2, 3]) {
        let path = outcome.artifact.path().join(name);
        assert_eq!(std::fs::read(path).unwrap(), format!("page-{index}").into_bytes());
    }
}

#[tokio::test]
async fn refused_borrow_attempts_no_release() {
    let server = MockServer::start().await;
    mount_session(&server).await;
    mount_borrow_refusal(
        &server,
        ResponseTemplate::new(400)
            .set_body_json(serde_json::json!({ "error": "all copies are in use" })),
    )
    .await;
    // Zero expected returns: any release attempt fails verification on drop.
    mount_release(&server, 0).await;

    let dir = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::new(config(
        &server,
        dir.path(),
        OutputMode::Pages,
        AssemblyMode::Strict,
    ))
    .unwrap();

    let run_error = orchestrator
        .run(&credentials(), &title(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        run_error.error,
        Error::Loan(LoanError::Unavailable { .. })
    ));
    assert!(run_error.report.is_none());
}

use super::*;
use crate::config::RetryConfig;
use crate::error::{Error, ExtractionError, FetchError};
use crate::extract::{ExtractionOutcome, find_document_ids};
use crate::types::{CompositeRange, DocumentId};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Classifies plain-text bodies: "garbled" fails, several ids make a range.
struct TextBodyExtractor;

impl RangeExtractor for TextBodyExtractor {
    fn extract(&self, bytes: &[u8]) -> ExtractionOutcome {
        let Ok(text) = std::str::from_utf8(bytes) else {
            return ExtractionOutcome::Failed(ExtractionError::Unreadable("not utf-8".into()));
        };
        if text == "garbled" {
            return ExtractionOutcome::Failed(ExtractionError::Unreadable(text.into()));
        }
        let ids: Vec<DocumentId> = find_document_ids(text).collect();
        match (ids.iter().min(), ids.iter().max()) {
            (Some(&min), Some(&max)) if min != max => {
                ExtractionOutcome::Range(CompositeRange::new(min, max).unwrap())
            }
            _ => ExtractionOutcome::Single,
        }
    }
}

fn id(n: u32) -> DocumentId {
    DocumentId::new(n).unwrap()
}

fn request(n: u32) -> DocumentRequest {
    DocumentRequest::new(id(n))
}

fn test_config(server: &MockServer, output: &TempDir, concurrency: usize) -> Config {
    let mut config = Config::default();
    config.fetch.base_url = server.uri();
    config.fetch.output_dir = output.path().to_path_buf();
    config.fetch.concurrency = concurrency;
    config.fetch.request_timeout = Duration::from_secs(5);
    config.retry = RetryConfig {
        max_attempts: 2,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        backoff_multiplier: 2.0,
        jitter: false,
    };
    config
}

fn coordinator(config: Config) -> FetchCoordinator {
    FetchCoordinator::new(config, &Credentials::default(), Arc::new(TextBodyExtractor)).unwrap()
}

fn doc_path(file: &str) -> String {
    format!(r"^/DataSet%20\d+/{}$", file.replace('.', r"\."))
}

fn stored_names(dir: &TempDir) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_single_unit_is_stored_under_own_name() {
    let server = MockServer::start().await;
    let output = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path_regex(doc_path("EFTA00000003.pdf")))
        .respond_with(ResponseTemplate::new(200).set_body_string("EFTA00000003"))
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = coordinator(test_config(&server, &output, 2));
    let summary = coordinator.run(vec![request(3)]).await.unwrap();

    assert_eq!(summary.single, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(stored_names(&output), vec!["EFTA00000003.pdf"]);
    assert!(coordinator.completed().contains(id(3)));
    assert!(summary.urls[0].as_str().ends_with("/DataSet%201/EFTA00000003.pdf"));
}

#[tokio::test]
async fn test_composite_covers_range_and_skips_members() {
    let server = MockServer::start().await;
    let output = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path_regex(doc_path("EFTA00000005.pdf")))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("EFTA00000005 ... EFTA00000007"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"EFTA0000000[67]\.pdf$"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    // one worker makes the ascending processing order observable
    let coordinator = coordinator(test_config(&server, &output, 1));
    let summary = coordinator
        .run(vec![request(7), request(5), request(6)])
        .await
        .unwrap();

    assert_eq!(summary.composite, 1);
    assert_eq!(summary.skipped, 2);
    assert_eq!(stored_names(&output), vec!["EFTA00000005_EFTA00000007.pdf"]);
    for n in 5..=7 {
        assert!(coordinator.completed().contains(id(n)));
    }
}

#[tokio::test]
async fn test_same_identifier_fetched_once() {
    let server = MockServer::start().await;
    let output = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path_regex(doc_path("EFTA00000010.pdf")))
        .respond_with(ResponseTemplate::new(200).set_body_string("EFTA00000010"))
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = coordinator(test_config(&server, &output, 2));
    let first = coordinator.fetch_one(&request(10)).await;
    let second = coordinator.fetch_one(&request(10)).await;

    assert!(matches!(first, FetchOutcome::Stored { covered: None, .. }));
    assert!(matches!(second, FetchOutcome::Skipped));
}

#[tokio::test]
async fn test_duplicate_requests_collapse() {
    let server = MockServer::start().await;
    let output = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("EFTA00000002"))
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = coordinator(test_config(&server, &output, 4));
    let summary = coordinator
        .run(vec![request(2), request(2), request(2)])
        .await
        .unwrap();

    assert_eq!(summary.single, 1);
    assert_eq!(summary.skipped, 0);
}

#[tokio::test]
async fn test_extraction_failure_stores_nothing() {
    let server = MockServer::start().await;
    let output = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("garbled"))
        .mount(&server)
        .await;

    let coordinator = coordinator(test_config(&server, &output, 2));
    let outcome = coordinator.fetch_one(&request(4)).await;

    assert!(matches!(outcome, FetchOutcome::Failed(Error::Extraction(_))));
    assert!(stored_names(&output).is_empty());
    assert!(!coordinator.completed().contains(id(4)));
}

#[tokio::test]
async fn test_missing_document_not_retried() {
    let server = MockServer::start().await;
    let output = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = coordinator(test_config(&server, &output, 2));
    let outcome = coordinator.fetch_one(&request(8)).await;

    match outcome {
        FetchOutcome::Failed(Error::Fetch(FetchError::Status { status, .. })) => {
            assert_eq!(status, 404)
        }
        other => panic!("expected 404 failure, got {other:?}"),
    }
    assert!(!coordinator.completed().contains(id(8)));
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let server = MockServer::start().await;
    let output = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("EFTA00000009"))
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = coordinator(test_config(&server, &output, 1));
    let outcome = coordinator.fetch_one(&request(9)).await;

    assert!(matches!(outcome, FetchOutcome::Stored { .. }));
    assert!(coordinator.completed().contains(id(9)));
}

#[tokio::test]
async fn test_failures_do_not_stop_the_batch() {
    let server = MockServer::start().await;
    let output = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path_regex(doc_path("EFTA00000001.pdf")))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(doc_path("EFTA00000002.pdf")))
        .respond_with(ResponseTemplate::new(200).set_body_string("garbled"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(doc_path("EFTA00000003.pdf")))
        .respond_with(ResponseTemplate::new(200).set_body_string("EFTA00000003"))
        .mount(&server)
        .await;

    let coordinator = coordinator(test_config(&server, &output, 3));
    // identifier 0 lies below every dataset and never reaches the network
    let summary = coordinator
        .run(vec![request(0), request(1), request(2), request(3)])
        .await
        .unwrap();

    assert_eq!(summary.failed, 3);
    assert_eq!(summary.single, 1);
    assert_eq!(stored_names(&output), vec!["EFTA00000003.pdf"]);
}

#[tokio::test]
async fn test_rerun_skips_artifacts_on_disk() {
    let server = MockServer::start().await;
    let output = tempfile::tempdir().unwrap();
    std::fs::write(output.path().join("EFTA00000005_EFTA00000007.pdf"), b"x").unwrap();
    std::fs::write(output.path().join("EFTA00000012.pdf"), b"x").unwrap();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let coordinator = coordinator(test_config(&server, &output, 2));
    let summary = coordinator
        .run(vec![request(6), request(12)])
        .await
        .unwrap();

    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.stored(), 0);
}

#[tokio::test]
async fn test_explicit_extension_is_never_range_extracted() {
    let server = MockServer::start().await;
    let output = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path_regex(doc_path("EFTA00000020.mp4")))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("EFTA00000020 EFTA00000030"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = coordinator(test_config(&server, &output, 1));
    let outcome = coordinator
        .fetch_one(&DocumentRequest::with_extension(id(20), "mp4"))
        .await;

    assert!(matches!(outcome, FetchOutcome::Stored { covered: None, .. }));
    assert_eq!(stored_names(&output), vec!["EFTA00000020.mp4"]);
    assert!(!coordinator.completed().contains(id(21)));
}

#[tokio::test]
async fn test_credentials_sent_with_requests() {
    let server = MockServer::start().await;
    let output = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(header("cookie", "session=s3cr3t"))
        .respond_with(ResponseTemplate::new(200).set_body_string("EFTA00000001"))
        .expect(1)
        .mount(&server)
        .await;

    let credentials = Credentials::from_json(r#"{"session": "s3cr3t"}"#).unwrap();
    let coordinator = FetchCoordinator::new(
        test_config(&server, &output, 1),
        &credentials,
        Arc::new(TextBodyExtractor),
    )
    .unwrap();

    let outcome = coordinator.fetch_one(&request(1)).await;
    assert!(matches!(outcome, FetchOutcome::Stored { .. }));
}

#[tokio::test]
async fn test_events_report_locations() {
    let server = MockServer::start().await;
    let output = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("EFTA00003159"))
        .mount(&server)
        .await;

    let coordinator = coordinator(test_config(&server, &output, 1));
    let mut events = coordinator.subscribe();

    coordinator.fetch_one(&request(3159)).await;
    coordinator.fetch_one(&request(3159)).await;

    match events.recv().await.unwrap() {
        Event::Fetched { id: got, url, covered } => {
            assert_eq!(got, id(3159));
            assert!(url.as_str().ends_with("/DataSet%202/EFTA00003159.pdf"));
            assert_eq!(covered, None);
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(events.recv().await.unwrap(), Event::Skipped { id: id(3159) });
}

#[tokio::test]
async fn test_concurrent_workers_share_completed_set() {
    let server = MockServer::start().await;
    let output = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("single"))
        .mount(&server)
        .await;

    let coordinator = coordinator(test_config(&server, &output, 8));
    let requests: Vec<_> = (1..=40).map(request).collect();
    let summary = coordinator.run(requests).await.unwrap();

    assert_eq!(summary.single, 40);
    assert_eq!(coordinator.completed().len(), 40);
    assert_eq!(stored_names(&output).len(), 40);
}

#[tokio::test]
async fn test_default_extension_spelled_out_is_same_request() {
    let server = MockServer::start().await;
    let output = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path_regex(doc_path("EFTA00000005.pdf")))
        .respond_with(ResponseTemplate::new(200).set_body_string("EFTA00000005"))
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = coordinator(test_config(&server, &output, 2));
    let requests = crate::input::parse_requests("EFTA00000005 EFTA00000005.pdf EFTA00000005.PDF")
        .unwrap();
    let summary = coordinator.run(requests).await.unwrap();

    assert_eq!(summary.single, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(stored_names(&output), vec!["EFTA00000005.pdf"]);
}

#[tokio::test]
async fn test_concurrent_members_of_one_composite_all_store() {
    let server = MockServer::start().await;
    let output = tempfile::tempdir().unwrap();

    // the delay keeps every member in flight before any of them is recorded
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("EFTA00000005 ... EFTA00000007")
                .set_delay(Duration::from_millis(100)),
        )
        .mount(&server)
        .await;

    let coordinator = coordinator(test_config(&server, &output, 3));
    let summary = coordinator
        .run(vec![request(5), request(6), request(7)])
        .await
        .unwrap();

    assert_eq!(summary.failed, 0);
    assert_eq!(summary.composite + summary.skipped, 3);
    assert_eq!(stored_names(&output), vec!["EFTA00000005_EFTA00000007.pdf"]);
    for n in 5..=7 {
        assert!(coordinator.completed().contains(id(n)));
    }
}

#[tokio::test]
async fn test_path_like_extension_is_refused_before_fetching() {
    let server = MockServer::start().await;
    let output = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("EFTA00000001"))
        .expect(0)
        .mount(&server)
        .await;

    let coordinator = coordinator(test_config(&server, &output, 1));
    let outcome = coordinator
        .fetch_one(&DocumentRequest::with_extension(id(1), "pdf/../../x"))
        .await;

    assert!(matches!(
        outcome,
        FetchOutcome::Failed(Error::InvalidId(crate::types::ParseIdError::BadExtension(_)))
    ));
    assert!(stored_names(&output).is_empty());
    assert!(!coordinator.completed().contains(id(1)));
}

#[test]
fn test_invalid_config_rejected() {
    let mut config = Config::default();
    config.fetch.concurrency = 0;
    let result = FetchCoordinator::with_source(
        config,
        Arc::new(HttpDocumentSource::new(&Credentials::default(), Duration::from_secs(1)).unwrap()),
        Arc::new(TextBodyExtractor),
    );
    assert!(matches!(result, Err(Error::Config { .. })));
}

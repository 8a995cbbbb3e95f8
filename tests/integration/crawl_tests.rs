//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and run full
//! crawls through the reqwest transport end-to-end.

use harvest_crawl::config::parse_config;
use harvest_crawl::crawler::{
    run_job, EngineOptions, Fetcher, HttpTransport, JobReport, ListDetailRequest,
    PaginationRequest, RateLimiter, RetryPolicy,
};
use harvest_crawl::extract::CompiledSelector;
use harvest_crawl::output::{write_failures, write_records, OutputFormat};
use harvest_crawl::state::FailureReason;
use harvest_crawl::{CrawlEngine, CrawlStatus, FieldSchema, FieldValue};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates an engine that talks HTTP without pacing
fn create_test_engine(retry: RetryPolicy) -> CrawlEngine<HttpTransport> {
    let transport =
        HttpTransport::with_user_agent("TestHarvester/1.0").expect("Failed to build client");
    let fetcher = Fetcher::new(transport)
        .with_rate_limiter(RateLimiter::unlimited())
        .with_retry_policy(retry);
    CrawlEngine::new(fetcher, EngineOptions::default())
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(format!("<html><body>{}</body></html>", body))
        .insert_header("content-type", "text/html")
}

fn selector(source: &str) -> CompiledSelector {
    CompiledSelector::parse(source).expect("Invalid selector")
}

#[tokio::test]
async fn test_pagination_over_http() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/page/1/"))
        .respond_with(html(
            r#"<div class="quote"><span class="text">First</span></div>
               <div class="quote"><span class="text">Second</span></div>
               <li class="next"><a href="/page/2/">Next</a></li>"#,
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/page/2/"))
        .respond_with(html(r#"<div class="quote"><span class="text">Third</span></div>"#))
        .expect(1)
        .mount(&mock_server)
        .await;

    let start = Url::parse(&format!("{}/page/1/", mock_server.uri())).expect("Bad URL");
    let schema = FieldSchema::nested(
        ".quote",
        FieldSchema::flat([("text", ".text")]).expect("Invalid schema"),
    )
    .expect("Invalid scope");
    let request = PaginationRequest::new(start, schema, selector("li.next a"), 10);

    let engine = create_test_engine(RetryPolicy::no_retry());
    let report = engine
        .crawl_pagination(request, &CancellationToken::new())
        .await;

    assert_eq!(report.status, CrawlStatus::Completed);
    assert_eq!(report.pages_visited, 2);
    let texts: Vec<_> = report
        .records
        .iter()
        .filter_map(|record| record.text("text"))
        .collect();
    assert_eq!(texts, vec!["First", "Second", "Third"]);
    assert!(report.failures.is_empty());
}

#[tokio::test]
async fn test_list_detail_with_missing_detail() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/products"))
        .respond_with(html(
            r#"<ul>
                 <li class="item"><a href="/item/1">One</a></li>
                 <li class="item"><a href="/item/2">Two</a></li>
                 <li class="item"><a href="/item/3">Three</a></li>
               </ul>"#,
        ))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/item/1"))
        .respond_with(html(r#"<h1>Widget</h1><span class="price">$5</span>"#))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/item/2"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/item/3"))
        .respond_with(html(r#"<h1>Gadget</h1><span class="price">$9</span>"#))
        .mount(&mock_server)
        .await;

    let list_url = Url::parse(&format!("{}/products", mock_server.uri())).expect("Bad URL");
    let request = ListDetailRequest::new(
        list_url,
        selector("li.item"),
        selector("a"),
        FieldSchema::flat([("name", "h1"), ("price", ".price")]).expect("Invalid schema"),
        10,
    );

    let engine = create_test_engine(RetryPolicy::no_retry());
    let report = engine
        .crawl_list_detail(request, &CancellationToken::new())
        .await;

    assert_eq!(report.status, CrawlStatus::Completed);
    assert_eq!(report.items_found, 3);
    assert_eq!(report.details_fetched, 2);

    let names: Vec<_> = report
        .records
        .iter()
        .filter_map(|record| record.text("name"))
        .collect();
    assert_eq!(names, vec!["Widget", "Gadget"]);

    assert_eq!(report.failures.len(), 1);
    let failure = &report.failures[0];
    assert!(failure.url.path().ends_with("/item/2"));
    match &failure.reason {
        FailureReason::Fetch(error) => assert_eq!(error.kind().as_str(), "http_status"),
        other => panic!("Expected fetch failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_retry_on_configured_status() {
    let mock_server = MockServer::start().await;

    // First request fails, later ones succeed
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(html("<h1>Recovered</h1>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let start = Url::parse(&format!("{}/flaky", mock_server.uri())).expect("Bad URL");
    let request = PaginationRequest::new(
        start,
        FieldSchema::flat([("title", "h1")]).expect("Invalid schema"),
        selector("a.next"),
        1,
    );

    let retry = RetryPolicy::new(3, Duration::from_millis(10), 2.0).with_retry_statuses([503]);
    let engine = create_test_engine(retry);
    let report = engine
        .crawl_pagination(request, &CancellationToken::new())
        .await;

    assert_eq!(report.status, CrawlStatus::Completed);
    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].text("title"), Some("Recovered"));
}

#[tokio::test]
async fn test_unlisted_status_is_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&mock_server)
        .await;

    let start = Url::parse(&format!("{}/down", mock_server.uri())).expect("Bad URL");
    let request = PaginationRequest::new(
        start,
        FieldSchema::flat([("title", "h1")]).expect("Invalid schema"),
        selector("a.next"),
        5,
    );

    let engine = create_test_engine(RetryPolicy::new(3, Duration::from_millis(10), 2.0));
    let report = engine
        .crawl_pagination(request, &CancellationToken::new())
        .await;

    assert_eq!(report.status, CrawlStatus::FatalSeedFailure);
    assert!(report.records.is_empty());
    assert_eq!(report.failures.len(), 1);
}

#[tokio::test]
async fn test_run_job_from_toml() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/books"))
        .and(header("x-harvest", "yes"))
        .respond_with(html(
            r#"<article class="book"><h3>Dune</h3><span class="tag">scifi</span><span class="tag">classic</span></article>
               <article class="book"><h3>Emma</h3><span class="tag">romance</span></article>
               <a class="next" href="/books?page=2">next</a>"#,
        ))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/books"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&mock_server)
        .await;

    let job = format!(
        r#"
[fetch]
requests-per-second = 0.0
max-attempts = 1

[fetch.headers]
x-harvest = "yes"

[engine]
annotate-source = true

[crawl]
mode = "pagination"
start-url = "{}/books"
next-selector = "a.next"
max-pages = 1

[crawl.schema]
scope = "article.book"

[[crawl.schema.fields]]
name = "title"
selector = "h3"

[[crawl.schema.fields]]
name = "tags"
selector = ".tag"
mode = "all"
"#,
        mock_server.uri()
    );
    let config = parse_config(&job).expect("Failed to parse job");

    let report = run_job(&config, &CancellationToken::new())
        .await
        .expect("Failed to run job");

    let report = match report {
        JobReport::Pagination(report) => report,
        other => panic!("Expected pagination report, got {}", other.mode_name()),
    };
    assert_eq!(report.status, CrawlStatus::Completed);
    assert_eq!(report.pages_visited, 1);
    assert_eq!(report.records.len(), 2);

    let first = &report.records[0];
    assert_eq!(first.text("page"), Some("1"));
    assert_eq!(first.text("title"), Some("Dune"));
    assert_eq!(
        first.get("tags"),
        Some(&FieldValue::List(vec![
            "scifi".to_string(),
            "classic".to_string()
        ]))
    );
    assert_eq!(
        report.records[1].get("tags"),
        Some(&FieldValue::List(vec!["romance".to_string()]))
    );

    // Results written the way the CLI writes them
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let records_path = dir.path().join("books.csv");
    let failures_path = dir.path().join("failures.json");
    write_records(&report.records, &records_path, OutputFormat::Csv)
        .expect("Failed to write records");
    write_failures(&report.failures, &failures_path).expect("Failed to write failures");

    let csv = std::fs::read_to_string(&records_path).expect("Failed to read records");
    assert!(csv.starts_with("url,page,title,tags\r\n"));
    assert!(csv.contains("Dune"));
    let failures = std::fs::read_to_string(&failures_path).expect("Failed to read failures");
    assert_eq!(failures.trim(), "[]");
}

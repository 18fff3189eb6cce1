//! Integration tests for the crawler
//!
//! These tests use wiremock to serve listing pages, restaurant pages with
//! embedded state, and the review API, then run the full crawl end-to-end.

use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::Path;
use table_reviews::config::{
    BrowserConfig, Config, CrawlerConfig, ExtractionConfig, OutputConfig, SiteConfig, StartUrl,
};
use table_reviews::crawler::run_crawl;
use table_reviews::state::RequestState;
use table_reviews::storage::{RunStatus, SqliteStorage, Storage};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const API_PATH: &str = "/dapi/fe/gql";

/// Creates a test configuration pointing at the mock server
fn create_test_config(server: &MockServer, db_path: &Path, start: &[&str], wanted: u64) -> Config {
    Config {
        crawler: CrawlerConfig {
            max_concurrency: 1,
            max_request_retries: 0,
            navigation_timeout_ms: 5_000,
            initial_state_timeout_ms: 1_000,
            scroll_settle_ms: 0,
        },
        extraction: ExtractionConfig {
            results_wanted: wanted,
            max_reviews_per_restaurant: 100,
            page_size: 10,
            page_delay_ms: 0,
            page_delay_jitter_ms: 0,
        },
        site: SiteConfig {
            domains: vec!["127.0.0.1".to_string()],
        },
        browser: BrowserConfig::default(),
        proxy: None,
        output: OutputConfig {
            database_path: db_path.display().to_string(),
        },
        start_urls: start
            .iter()
            .map(|p| StartUrl::Plain(format!("{}{}", server.uri(), p)))
            .collect(),
    }
}

fn review_entries(prefix: &str, n: usize) -> Vec<Value> {
    (0..n)
        .map(|i| {
            json!({
                "reviewId": format!("{}-{}", prefix, i),
                "rating": { "overall": 5, "food": 4, "service": 5 },
                "text": format!("Review {} of {}", i, prefix),
                "user": { "nickname": "diner" },
                "dinedDateTime": "2024-06-01T19:00:00Z"
            })
        })
        .collect()
}

/// A restaurant page with `embedded` reviews out of `total`
fn detail_html(restaurant_id: u64, embedded: usize, total: u64) -> String {
    let state = json!({
        "restaurantProfile": {
            "restaurant": { "restaurantId": restaurant_id, "name": format!("Restaurant {}", restaurant_id) },
            "reviewsData": {
                "reviewSearchResults": {
                    "totalCount": total,
                    "reviews": review_entries(&format!("{}-e", restaurant_id), embedded)
                }
            }
        }
    });

    format!(
        r#"<html><head>
<script>window.__INITIAL_STATE__ = {};</script>
<script>window.__csrfToken = "token-{}";</script>
</head><body><h1>Restaurant {}</h1></body></html>"#,
        state, restaurant_id, restaurant_id
    )
}

fn listing_html(hrefs: &[&str]) -> String {
    let anchors: String = hrefs
        .iter()
        .map(|href| format!(r#"<a href="{}">restaurant</a>"#, href))
        .collect();
    format!(
        r#"<html><body><div class="results">{}</div><a href="/about">About</a></body></html>"#,
        anchors
    )
}

/// Review API responder: a full page of fresh reviews for any restaurant and page
fn api_page(request: &Request) -> ResponseTemplate {
    let body: Value = serde_json::from_slice(&request.body).unwrap();
    let vars = &body["variables"];
    let restaurant = vars["restaurantId"].as_u64().unwrap();
    let page = vars["page"].as_u64().unwrap();
    let size = vars["pageSize"].as_u64().unwrap() as usize;

    ResponseTemplate::new(200).set_body_json(json!({
        "data": { "restaurant": { "reviewSearchResults": {
            "reviews": review_entries(&format!("{}-p{}", restaurant, page), size)
        } } }
    }))
}

async fn mount_html(server: &MockServer, page_path: &str, html: String, expected: u64) {
    Mock::given(method("GET"))
        .and(path(page_path))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .expect(expected)
        .mount(server)
        .await;
}

async fn api_calls(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == API_PATH)
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

fn url_of(server: &MockServer, page_path: &str) -> String {
    format!("{}{}", server.uri(), page_path)
}

#[tokio::test]
async fn test_quota_reached_mid_pagination() {
    let server = MockServer::start().await;
    mount_html(&server, "/r/bistro", detail_html(101, 3, 10), 1).await;
    Mock::given(method("POST"))
        .and(path(API_PATH))
        .and(wiremock::matchers::header("x-csrf-token", "token-101"))
        .respond_with(api_page)
        .expect(1)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("reviews.db");
    let config = create_test_config(&server, &db_path, &["/r/bistro"], 5);

    let summary = run_crawl(config, "test-hash").await.unwrap();

    assert_eq!(summary.records_emitted, 5);
    assert_eq!(summary.status, RunStatus::QuotaReached);
    assert_eq!(summary.requests_in(RequestState::Processed), 1);

    let calls = api_calls(&server).await;
    assert_eq!(calls[0]["variables"]["page"], json!(2));
    assert_eq!(calls[0]["variables"]["restaurantId"], json!(101));

    let storage = SqliteStorage::new(&db_path).unwrap();
    assert_eq!(storage.count_reviews().unwrap(), 5);
    assert_eq!(storage.count_reviews_for_restaurant("101").unwrap(), 5);

    let reviews = storage.load_reviews().unwrap();
    let ids: Vec<&str> = reviews.iter().map(|r| r.review_id.as_str()).collect();
    assert_eq!(ids, vec!["101-e-0", "101-e-1", "101-e-2", "101-p2-0", "101-p2-1"]);

    let run = storage.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::QuotaReached);
    assert_eq!(run.records_emitted, 5);
    assert_eq!(run.config_hash, "test-hash");
}

#[tokio::test]
async fn test_listing_discovers_each_restaurant_once() {
    let server = MockServer::start().await;
    mount_html(
        &server,
        "/metro/london",
        listing_html(&[
            "/r/first?ref=card",
            "/r/first?ref=image#top",
            "/r/second",
            "https://elsewhere.example.com/r/third",
        ]),
        1,
    )
    .await;
    mount_html(&server, "/r/first", detail_html(1, 2, 2), 1).await;
    mount_html(&server, "/r/second", detail_html(2, 3, 3), 1).await;
    Mock::given(method("POST"))
        .and(path(API_PATH))
        .respond_with(api_page)
        .expect(0)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("reviews.db");
    let config = create_test_config(&server, &db_path, &["/metro/london"], 100);

    let summary = run_crawl(config, "hash").await.unwrap();

    assert_eq!(summary.status, RunStatus::Exhausted);
    assert_eq!(summary.records_emitted, 5);
    assert_eq!(summary.requests_in(RequestState::Processed), 3);

    let storage = SqliteStorage::new(&db_path).unwrap();
    assert_eq!(storage.count_total_requests().unwrap(), 3);
    assert_eq!(storage.count_restaurants().unwrap(), 2);
    assert_eq!(
        storage.get_request_state(&url_of(&server, "/r/first")).unwrap(),
        Some(RequestState::Processed)
    );
}

#[tokio::test]
async fn test_listing_without_links() {
    let server = MockServer::start().await;
    mount_html(&server, "/metro/empty", listing_html(&[]), 1).await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("reviews.db");
    let config = create_test_config(&server, &db_path, &["/metro/empty"], 10);

    let summary = run_crawl(config, "hash").await.unwrap();

    assert_eq!(summary.records_emitted, 0);
    assert_eq!(summary.status, RunStatus::Exhausted);

    let storage = SqliteStorage::new(&db_path).unwrap();
    assert_eq!(storage.count_total_requests().unwrap(), 1);
    assert_eq!(storage.count_reviews().unwrap(), 0);
}

#[tokio::test]
async fn test_api_rejection_keeps_embedded_reviews() {
    let server = MockServer::start().await;
    mount_html(&server, "/r/guarded", detail_html(7, 3, 30), 1).await;
    Mock::given(method("POST"))
        .and(path(API_PATH))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("reviews.db");
    let config = create_test_config(&server, &db_path, &["/r/guarded"], 50);

    let summary = run_crawl(config, "hash").await.unwrap();

    assert_eq!(summary.records_emitted, 3);
    assert_eq!(summary.requests_in(RequestState::Processed), 1);

    let storage = SqliteStorage::new(&db_path).unwrap();
    assert_eq!(storage.count_reviews().unwrap(), 3);
}

#[tokio::test]
async fn test_zero_total_skips_api() {
    let server = MockServer::start().await;
    mount_html(&server, "/r/new-place", detail_html(9, 0, 0), 1).await;
    Mock::given(method("POST"))
        .and(path(API_PATH))
        .respond_with(api_page)
        .expect(0)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("reviews.db");
    let config = create_test_config(&server, &db_path, &["/r/new-place"], 10);

    let summary = run_crawl(config, "hash").await.unwrap();
    assert_eq!(summary.records_emitted, 0);
    assert_eq!(summary.requests_in(RequestState::Processed), 1);
}

#[tokio::test]
async fn test_page_without_state_is_aborted() {
    let server = MockServer::start().await;
    mount_html(
        &server,
        "/r/closed",
        "<html><body>Restaurant not found</body></html>".to_string(),
        1,
    )
    .await;
    Mock::given(method("POST"))
        .and(path(API_PATH))
        .respond_with(api_page)
        .expect(0)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("reviews.db");
    let config = create_test_config(&server, &db_path, &["/r/closed"], 10);

    let summary = run_crawl(config, "hash").await.unwrap();
    assert_eq!(summary.requests_in(RequestState::Aborted), 1);

    let storage = SqliteStorage::new(&db_path).unwrap();
    assert_eq!(
        storage.get_request_state(&url_of(&server, "/r/closed")).unwrap(),
        Some(RequestState::Aborted)
    );
}

#[tokio::test]
async fn test_navigation_failure_is_retried_then_failed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/r/gone"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("reviews.db");
    let mut config = create_test_config(&server, &db_path, &["/r/gone"], 10);
    config.crawler.max_request_retries = 1;

    let summary = run_crawl(config, "hash").await.unwrap();
    assert_eq!(summary.requests_in(RequestState::Failed), 1);
    assert_eq!(summary.status, RunStatus::Exhausted);
}

#[tokio::test]
async fn test_concurrent_workers_never_exceed_target() {
    let server = MockServer::start().await;
    mount_html(
        &server,
        "/metro/busy",
        listing_html(&["/r/a", "/r/b", "/r/c", "/r/d"]),
        1,
    )
    .await;
    for (i, slug) in ["/r/a", "/r/b", "/r/c", "/r/d"].iter().enumerate() {
        Mock::given(method("GET"))
            .and(path(*slug))
            .respond_with(ResponseTemplate::new(200).set_body_string(detail_html(
                200 + i as u64,
                10,
                50,
            )))
            .mount(&server)
            .await;
    }
    Mock::given(method("POST"))
        .and(path(API_PATH))
        .respond_with(api_page)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("reviews.db");
    let mut config = create_test_config(&server, &db_path, &["/metro/busy"], 12);
    config.crawler.max_concurrency = 3;

    let summary = run_crawl(config, "hash").await.unwrap();

    assert_eq!(summary.records_emitted, 12);
    assert_eq!(summary.status, RunStatus::QuotaReached);

    let storage = SqliteStorage::new(&db_path).unwrap();
    let reviews = storage.load_reviews().unwrap();
    assert_eq!(reviews.len(), 12);

    let unique: HashSet<(String, String)> = reviews
        .iter()
        .map(|r| (r.restaurant_id.clone(), r.review_id.clone()))
        .collect();
    assert_eq!(unique.len(), reviews.len());
}

#[tokio::test]
async fn test_per_restaurant_cap_spreads_quota() {
    let server = MockServer::start().await;
    mount_html(&server, "/metro/pair", listing_html(&["/r/x", "/r/y"]), 1).await;
    mount_html(&server, "/r/x", detail_html(31, 10, 100), 1).await;
    mount_html(&server, "/r/y", detail_html(32, 10, 100), 1).await;
    Mock::given(method("POST"))
        .and(path(API_PATH))
        .respond_with(api_page)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("reviews.db");
    let mut config = create_test_config(&server, &db_path, &["/metro/pair"], 30);
    config.extraction.max_reviews_per_restaurant = 15;

    let summary = run_crawl(config, "hash").await.unwrap();
    assert_eq!(summary.records_emitted, 30);

    let storage = SqliteStorage::new(&db_path).unwrap();
    assert_eq!(storage.count_reviews_for_restaurant("31").unwrap(), 15);
    assert_eq!(storage.count_reviews_for_restaurant("32").unwrap(), 15);
}

#[tokio::test]
async fn test_restaurant_reached_by_two_urls_extracted_once() {
    let server = MockServer::start().await;
    mount_html(&server, "/r/ivy", detail_html(101, 3, 3), 1).await;
    mount_html(&server, "/restref/ivy", detail_html(101, 3, 3), 1).await;
    Mock::given(method("POST"))
        .and(path(API_PATH))
        .respond_with(api_page)
        .expect(0)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("reviews.db");
    let config = create_test_config(&server, &db_path, &["/r/ivy", "/restref/ivy"], 5);

    let summary = run_crawl(config, "hash").await.unwrap();

    assert_eq!(summary.records_emitted, 3);
    assert_eq!(summary.status, RunStatus::Exhausted);
    assert_eq!(summary.requests_in(RequestState::Processed), 1);
    assert_eq!(summary.requests_in(RequestState::Skipped), 1);

    let storage = SqliteStorage::new(&db_path).unwrap();
    assert_eq!(storage.count_reviews().unwrap(), 3);
    assert_eq!(storage.get_latest_run().unwrap().unwrap().records_emitted, 3);
}

#[tokio::test]
async fn test_redirected_detail_page_uses_final_origin() {
    let old_site = MockServer::start().await;
    let new_site = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/r/old"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("location", url_of(&new_site, "/r/new").as_str()),
        )
        .expect(1)
        .mount(&old_site)
        .await;
    Mock::given(method("POST"))
        .respond_with(api_page)
        .expect(0)
        .mount(&old_site)
        .await;

    mount_html(&new_site, "/r/new", detail_html(55, 2, 12), 1).await;
    Mock::given(method("POST"))
        .and(path(API_PATH))
        .respond_with(api_page)
        .expect(1)
        .mount(&new_site)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("reviews.db");
    let config = create_test_config(&old_site, &db_path, &["/r/old"], 50);

    let summary = run_crawl(config, "hash").await.unwrap();

    assert_eq!(summary.records_emitted, 12);
    assert_eq!(summary.requests_in(RequestState::Processed), 1);

    let storage = SqliteStorage::new(&db_path).unwrap();
    let reviews = storage.load_reviews().unwrap();
    assert_eq!(reviews.len(), 12);
    assert!(reviews
        .iter()
        .all(|r| r.restaurant_url == url_of(&old_site, "/r/old")));
}

#[tokio::test]
async fn test_redirected_listing_resolves_links_against_final_url() {
    let old_site = MockServer::start().await;
    let new_site = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/metro/old"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("location", url_of(&new_site, "/metro/new").as_str()),
        )
        .mount(&old_site)
        .await;
    mount_html(&old_site, "/r/found", detail_html(66, 2, 2), 0).await;

    mount_html(&new_site, "/metro/new", listing_html(&["/r/found"]), 1).await;
    mount_html(&new_site, "/r/found", detail_html(66, 2, 2), 1).await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("reviews.db");
    let config = create_test_config(&old_site, &db_path, &["/metro/old"], 50);

    let summary = run_crawl(config, "hash").await.unwrap();

    assert_eq!(summary.records_emitted, 2);
    assert_eq!(summary.requests_in(RequestState::Processed), 2);
}

#[tokio::test]
async fn test_api_reuses_session_cookie_from_detail_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/r/bistro"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "otsession=abc; Path=/")
                .set_body_string(detail_html(7, 2, 12)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(API_PATH))
        .and(wiremock::matchers::header("cookie", "otsession=abc"))
        .respond_with(api_page)
        .expect(1)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("reviews.db");
    let config = create_test_config(&server, &db_path, &["/r/bistro"], 5);

    let summary = run_crawl(config, "hash").await.unwrap();

    assert_eq!(summary.records_emitted, 5);
    assert_eq!(summary.status, RunStatus::QuotaReached);
}

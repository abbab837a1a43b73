// HTTP round trips between the Y Combinator collector and a mock RapidAPI
// listing served in-process.

mod common;

use std::collections::HashMap;

use axum::Router;
use axum::extract::Query;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, response::IntoResponse};
use chrono::{TimeZone, Utc};
use serde_json::{Value, json};

use jobaggregator::collectors::paging::PagedCollector;
use jobaggregator::collectors::ycombinator::{YCombinatorClient, YCombinatorNormalizer};
use jobaggregator::collectors::{FetchOptions, JobCollector};
use jobaggregator::error::AppError;
use jobaggregator::models::job::{Currency, JobType, WorkMode};

use common::{RequestLog, SeenRequest, fixture, settings, spawn_mock, unbounded};

const PATH: &str = "/active-jb-7d";

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

/// A listing whose response body depends only on the requested offset.
fn listing<F>(log: RequestLog, page: F) -> Router
where
    F: Fn(usize) -> Value + Clone + Send + Sync + 'static,
{
    Router::new().route(
        PATH,
        get(
            move |Query(query): Query<HashMap<String, String>>, headers: HeaderMap| {
                let log = log.clone();
                let page = page.clone();
                async move {
                    let offset = query
                        .get("offset")
                        .and_then(|o| o.parse().ok())
                        .unwrap_or(0);
                    log.push(SeenRequest {
                        query,
                        api_key: header(&headers, "x-rapidapi-key"),
                        api_host: header(&headers, "x-rapidapi-host"),
                        user_agent: header(&headers, "user-agent"),
                    });
                    Json(page(offset))
                }
            },
        ),
    )
}

fn record(i: usize, posted: &str) -> Value {
    json!({
        "id": format!("yc-{i}"),
        "title": format!("Engineer {i}"),
        "organization": "Acme",
        "date_posted": posted,
    })
}

fn records(range: std::ops::Range<usize>) -> Value {
    Value::Array(range.map(|i| record(i, "2025-09-20T00:00:00Z")).collect())
}

async fn collector_for(app: Router) -> PagedCollector<YCombinatorClient, YCombinatorNormalizer> {
    let base = spawn_mock(app).await;
    let client = YCombinatorClient::new(settings(&base, Some("test-key"))).expect("client");
    PagedCollector::new(client, YCombinatorNormalizer)
}

#[tokio::test]
async fn pages_by_offset_with_credentials_and_filters() {
    let log = RequestLog::default();
    let collector = collector_for(listing(log.clone(), |offset| match offset {
        0 => records(0..50),
        50 => records(50..70),
        _ => json!([]),
    }))
    .await;

    let mut options = unbounded();
    options.location = Some("United States".to_string());
    options
        .extra_params
        .insert("description_type".to_string(), "text".to_string());

    let jobs = collector.fetch_jobs(&options).await.expect("fetch");

    assert_eq!(jobs.len(), 70);
    assert_eq!(jobs[0].external_job_id.as_deref(), Some("yc-0"));
    assert_eq!(jobs[69].external_job_id.as_deref(), Some("yc-69"));
    assert_eq!(log.param("offset"), vec!["0", "50"]);
    assert_eq!(log.param("location_filter"), vec!["United States"; 2]);
    assert_eq!(log.param("description_type"), vec!["text"; 2]);
    for request in log.all() {
        assert_eq!(request.api_key.as_deref(), Some("test-key"));
        assert_eq!(
            request.api_host.as_deref(),
            Some("free-y-combinator-jobs-api.p.rapidapi.com")
        );
    }
}

#[tokio::test]
async fn extra_params_cannot_pin_the_offset() {
    let log = RequestLog::default();
    let collector = collector_for(listing(log.clone(), |offset| match offset {
        0 => records(0..50),
        50 => records(50..60),
        _ => json!([]),
    }))
    .await;

    let mut options = unbounded();
    options
        .extra_params
        .insert("offset".to_string(), "0".to_string());

    let jobs = collector.fetch_jobs(&options).await.expect("fetch");

    assert_eq!(jobs.len(), 60);
    assert_eq!(log.param("offset"), vec!["0", "50"]);
}

#[tokio::test]
async fn max_jobs_truncates_and_max_pages_stops_requests() {
    let log = RequestLog::default();
    let app = listing(log.clone(), |offset| match offset {
        0 => records(0..50),
        50 => records(50..100),
        _ => records(100..150),
    });
    let collector = collector_for(app).await;

    let options = FetchOptions {
        max_jobs: 60,
        ..unbounded()
    };
    let jobs = collector.fetch_jobs(&options).await.expect("fetch");
    assert_eq!(jobs.len(), 60);
    assert_eq!(log.param("offset"), vec!["0", "50"]);

    let options = FetchOptions {
        max_pages: 1,
        ..unbounded()
    };
    let jobs = collector.fetch_jobs(&options).await.expect("fetch");
    assert_eq!(jobs.len(), 50);
    assert_eq!(log.param("offset"), vec!["0", "50", "0"]);
}

#[tokio::test]
async fn fixture_page_is_normalized_and_bad_records_skipped() {
    let page = fixture("ycombinator_page.json");
    let log = RequestLog::default();
    let collector = collector_for(listing(log.clone(), move |_| page.clone())).await;

    let jobs = collector.fetch_jobs(&unbounded()).await.expect("fetch");

    // The record without a title is dropped; the short page ends the listing.
    assert_eq!(jobs.len(), 2);
    assert_eq!(log.all().len(), 1);

    let splash = &jobs[0];
    assert_eq!(splash.external_job_id.as_deref(), Some("1871443718"));
    assert_eq!(splash.company_name, "Splash Inc.");
    assert_eq!(splash.city.as_deref(), Some("El Segundo"));
    assert_eq!(splash.country_iso, "US");
    assert_eq!(splash.salary_min, Some(120_000));
    assert_eq!(splash.salary_max, Some(200_000));
    assert_eq!(splash.salary_currency, Some(Currency::Usd));
    assert_eq!(splash.work_mode, WorkMode::Remote);
    assert_eq!(splash.job_type, JobType::FullTime);

    let designer = &jobs[1];
    assert_eq!(designer.title, "Founding Designer");
    assert_eq!(designer.country_iso, "GB");
    assert_eq!(designer.job_type, JobType::Contract);
    assert_eq!(designer.work_mode, WorkMode::Onsite);
    assert_eq!(designer.salary_currency, None);
    assert_eq!(
        designer.posted_at,
        Some(Utc.with_ymd_and_hms(2025, 9, 15, 8, 15, 0).unwrap())
    );
}

#[tokio::test]
async fn posting_older_than_cutoff_ends_paging() {
    let log = RequestLog::default();
    let collector = collector_for(listing(log.clone(), |_| {
        Value::Array(
            (0..50)
                .map(|i| {
                    let posted = if i < 10 {
                        "2025-09-20T00:00:00Z"
                    } else {
                        "2024-06-01T00:00:00Z"
                    };
                    record(i, posted)
                })
                .collect(),
        )
    }))
    .await;

    let jobs = collector.fetch_jobs(&unbounded()).await.expect("fetch");

    assert_eq!(jobs.len(), 10);
    assert_eq!(log.param("offset"), vec!["0"]);
}

#[tokio::test]
async fn server_error_fails_the_source() {
    let app = Router::new().route(
        PATH,
        get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "upstream down").into_response() }),
    );
    let collector = collector_for(app).await;

    let result = collector.fetch_jobs(&unbounded()).await;

    match result {
        Err(AppError::Upstream {
            source_name,
            status,
        }) => {
            assert_eq!(source_name, "ycombinator");
            assert_eq!(status.as_u16(), 500);
        }
        other => panic!("expected upstream error, got {other:?}"),
    }
}

#[tokio::test]
async fn non_array_body_is_a_decode_error() {
    let app = listing(RequestLog::default(), |_| json!({ "message": "quota exceeded" }));
    let collector = collector_for(app).await;

    let result = collector.fetch_jobs(&unbounded()).await;

    assert!(
        matches!(result, Err(AppError::Decode { ref message, .. }) if message.contains("object")),
        "got {result:?}"
    );
}

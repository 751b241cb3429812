use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use warp::Filter;
use warp::http::StatusCode;

use edge_api_harness::breaker::BreakerConfig;
use edge_api_harness::client::ApiClient;
use edge_api_harness::config::HarnessConfig;
use edge_api_harness::coverage::{BatchSummary, compare_inventories};
use edge_api_harness::models::{ApiCall, EndpointDescriptor, Inventory, Method, Outcome, Provenance};
use edge_api_harness::report::{ReportFormat, render, render_summary};
use edge_api_harness::retry::RetryPolicy;
use edge_api_harness::scheduler::{Dispatcher, Scheduler, SchedulerConfig};

fn spawn_server(purge_hits: Arc<AtomicUsize>) -> SocketAddr {
    let domain = warp::path!("domains" / u64)
        .and(warp::get())
        .map(|id: u64| warp::reply::json(&json!({"data": {"id": id}})));

    let purge = warp::path!("purge" / "url").and(warp::post()).map(move || {
        let hit = purge_hits.fetch_add(1, Ordering::SeqCst);
        let status = if hit < 2 {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::CREATED
        };
        warp::reply::with_status(warp::reply::json(&json!({"data": {"hit": hit}})), status)
    });

    let (addr, server) = warp::serve(domain.or(purge)).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);
    addr
}

fn scheduler(addr: SocketAddr) -> Scheduler {
    let config = HarnessConfig {
        base_url: format!("http://{addr}"),
        token: Some("test-token".into()),
        timeout_ms: 5_000,
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 10,
            max_delay_ms: 50,
            jitter_ratio: 0.0,
            ..RetryPolicy::default()
        },
        breaker: BreakerConfig {
            failure_threshold: 3,
            cooldown_ms: 30_000,
        },
        scheduler: SchedulerConfig {
            max_concurrent: 2,
            rate_limit_cooldown_ms: 10,
        },
        ..HarnessConfig::default()
    };

    let client = ApiClient::new(&config).unwrap();
    let dispatcher = Dispatcher::new(Arc::new(client), config.retry.clone(), config.breaker.clone());
    Scheduler::new(Arc::new(dispatcher), &config.scheduler)
}

#[tokio::test]
async fn batch_results_feed_coverage_and_reports() {
    let hits = Arc::new(AtomicUsize::new(0));
    let addr = spawn_server(hits.clone());

    let plan: Vec<ApiCall> = serde_json::from_value(json!([
        {"method": "GET", "path": "/domains/42", "category": "domains"},
        {"method": "POST", "path": "/purge/url", "category": "purge", "body": {"urls": ["a"]}},
        {"method": "GET", "path": "/missing", "category": "misc"}
    ]))
    .unwrap();

    let records = scheduler(addr).run_batch(plan, 2).await.unwrap();

    assert_eq!(records.len(), 3);
    assert_eq!(records[0].final_status(), Some(200));
    assert_eq!(records[1].outcome, Outcome::Success);
    assert_eq!(records[1].attempts.len(), 3);
    assert_eq!(records[1].final_status(), Some(201));
    assert_eq!(records[2].final_status(), Some(404));
    assert_eq!(hits.load(Ordering::SeqCst), 3);

    let expected = Inventory::new(
        Provenance::Observed,
        vec![
            EndpointDescriptor::new(Method::Get, "/domains/{id}", "domains"),
            EndpointDescriptor::new(Method::Post, "/purge/url", "purge"),
            EndpointDescriptor::new(Method::Get, "/certificates", "certificates"),
        ],
    );
    let observed = Inventory::observed_from_records(&records);
    let coverage = compare_inventories(&expected, &observed);

    assert_eq!(coverage.covered.len(), 2);
    assert_eq!(coverage.missing[0].path, "/certificates");
    assert_eq!(coverage.extra[0].path, "/missing");
    assert_eq!(coverage.overall_percentage, 66.7);
    assert_eq!(coverage.categories["misc"].percentage, 100.0);

    let markdown = render(&coverage, ReportFormat::Markdown).unwrap();
    assert!(markdown.contains("| Overall coverage | 66.7% |"));
    assert!(markdown.contains("Data source: **observed**"));

    let summary = BatchSummary::from_records(&records);
    assert_eq!(summary.total_attempts, 5);
    assert_eq!(summary.pass_rate, Some(66.7));
    let summary_json = render_summary(&summary, ReportFormat::Json).unwrap();
    assert!(serde_json::from_str::<serde_json::Value>(&summary_json).is_ok());
}

#[tokio::test]
async fn records_round_trip_through_json() {
    let addr = spawn_server(Arc::new(AtomicUsize::new(2)));
    let plan = vec![ApiCall::new(EndpointDescriptor::new(Method::Get, "/domains/7", "domains"))];
    let records = scheduler(addr).run_batch(plan, 1).await.unwrap();

    let text = serde_json::to_string(&records).unwrap();
    let back: Vec<edge_api_harness::models::CallRecord> = serde_json::from_str(&text).unwrap();
    assert_eq!(back[0].final_status(), Some(200));
    assert_eq!(back[0].response.as_ref().map(|r| r.body["data"]["id"].clone()), Some(json!(7)));
}

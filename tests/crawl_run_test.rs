use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use placecrawl::credentials::KeyRotator;
use placecrawl::parse::Record;
use placecrawl::process::Crawler;
use placecrawl::region::RegionIndex;
use placecrawl::request::{RawResponse, Transport};
use placecrawl::store::CheckpointStore;
use placecrawl::Result;
use reqwest::StatusCode;
use serde_json::json;
use tempfile::TempDir;

/// Answers every request through a closure and counts the calls.
struct FnTransport<F> {
    respond: F,
    calls: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl<F> FnTransport<F>
where
    F: Fn(&str, u32) -> (u16, String) + Send + Sync,
{
    fn new(respond: F) -> Self {
        Self {
            respond,
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl<F> Transport for FnTransport<F>
where
    F: Fn(&str, u32) -> (u16, String) + Send + Sync,
{
    async fn get(&self, query: &str, page: u32, _api_key: &str) -> Result<RawResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.to_string());
        let (status, body) = (self.respond)(query, page);
        Ok(RawResponse {
            status: StatusCode::from_u16(status).unwrap(),
            body,
        })
    }
}

fn page(total: u64, ids: &[String], address: &str) -> String {
    let documents: Vec<_> = ids
        .iter()
        .map(|id| json!({ "id": id, "place_name": id, "address_name": address }))
        .collect();
    json!({ "meta": { "total_count": total }, "documents": documents }).to_string()
}

fn single_hit(query: &str) -> (u16, String) {
    (200, page(1, &[format!("id-{query}")], "서울 강남구 신사동"))
}

fn regions() -> Arc<RegionIndex> {
    let mut index = RegionIndex::default();
    index.insert("서울특별시", "강남구", None, "압구정동");
    index.insert("서울특별시", "서초구", None, "서초동");
    Arc::new(index)
}

fn crawler(transport: Arc<dyn Transport>, keys: usize, dir: &TempDir) -> Crawler {
    let keys = KeyRotator::new((0..keys).map(|i| format!("key-{i}")).collect()).unwrap();
    Crawler::new(
        transport,
        Arc::new(keys),
        regions(),
        Arc::new(CheckpointStore::new(dir.path())),
    )
}

fn read_checkpoint(dir: &TempDir, keyword: &str) -> Vec<Record> {
    let mut reader = csv::Reader::from_path(dir.path().join(format!("{keyword}.csv"))).unwrap();
    reader.deserialize::<Record>().map(|r| r.unwrap()).collect()
}

fn keywords(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn already_checkpointed_keywords_are_not_dispatched() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("스타벅스.csv"), "id\n").unwrap();
    std::fs::write(dir.path().join("이디야.csv"), "id\n").unwrap();

    let transport = Arc::new(FnTransport::new(|q: &str, _| single_hit(q)));
    let report = crawler(transport.clone(), 1, &dir)
        .run(
            &keywords(&["스타벅스", "커피빈", "이디야!", "투썸 플레이스", "빽다방"]),
            4,
        )
        .await
        .unwrap();

    assert_eq!(report.total_targets, 5);
    assert_eq!(report.skipped, 2);
    assert_eq!(report.dispatched, 3);
    assert_eq!(report.saved, 3);
    assert_eq!(report.requests, 3);

    let searched: HashSet<String> = transport.queries.lock().unwrap().iter().cloned().collect();
    let expected: HashSet<String> = ["커피빈", "투썸플레이스", "빽다방"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert_eq!(searched, expected);
    assert_eq!(read_checkpoint(&dir, "투썸플레이스")[0].id, "id-투썸플레이스");
}

#[tokio::test]
async fn exhaustion_cancels_work_that_has_not_started() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(FnTransport::new(|q: &str, _| {
        if q == "kw3" {
            (429, String::new())
        } else {
            single_hit(q)
        }
    }));
    let names: Vec<String> = (1..=10).map(|i| format!("kw{i}")).collect();

    let report = crawler(transport.clone(), 1, &dir)
        .run(&names, 1)
        .await
        .unwrap();

    assert!(report.exhausted);
    assert_eq!(report.saved, 2);
    assert_eq!(report.aborted, 1);
    assert_eq!(report.dispatched, 3);
    assert_eq!(report.not_started, 7);
    assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    assert!(dir.path().join("kw2.csv").exists());
    assert!(!dir.path().join("kw3.csv").exists());
}

#[tokio::test]
async fn other_keyword_failures_do_not_stop_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(FnTransport::new(|q: &str, _| {
        if q == "broken" {
            (500, "oops".to_string())
        } else {
            single_hit(q)
        }
    }));

    let report = crawler(transport, 1, &dir)
        .run(&keywords(&["a", "broken", "b"]), 2)
        .await
        .unwrap();

    assert!(!report.exhausted);
    assert_eq!(report.saved, 2);
    assert_eq!(report.failed, 1);
    assert!(!dir.path().join("broken.csv").exists());
}

#[tokio::test]
async fn overlapping_district_results_are_saved_once() {
    let dir = tempfile::tempdir().unwrap();
    let shared: Vec<String> = (0..10).map(|i| format!("shared-{i}")).collect();
    let transport = Arc::new(FnTransport::new(move |q: &str, _| {
        if q == "커피빈" {
            let ids: Vec<String> = (0..15).map(|i| format!("bare-{i}")).collect();
            (200, page(500, &ids, "서울 강남구 신사동"))
        } else {
            // Both districts report the same places, short enough to end after page 1.
            (200, page(10, &shared, "서울 강남구 신사동"))
        }
    }));

    let report = crawler(transport, 1, &dir)
        .run(&keywords(&["커피빈"]), 1)
        .await
        .unwrap();
    assert_eq!(report.saved, 1);

    let records = read_checkpoint(&dir, "커피빈");
    let unique: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(records.len(), 10);
    assert_eq!(unique.len(), 10);
    assert_eq!(records[0].keyword, "커피빈 서울특별시 강남구");
}

#[tokio::test]
async fn second_pass_skips_everything_and_leaves_checkpoints_alone() {
    let dir = tempfile::tempdir().unwrap();
    let names = keywords(&["커피빈", "이디야"]);

    let transport = Arc::new(FnTransport::new(|q: &str, _| single_hit(q)));
    crawler(transport, 1, &dir).run(&names, 2).await.unwrap();
    let before = read_checkpoint(&dir, "커피빈");

    let transport = Arc::new(FnTransport::new(|q: &str, _| single_hit(q)));
    let report = crawler(transport.clone(), 1, &dir)
        .run(&names, 2)
        .await
        .unwrap();

    assert_eq!(report.skipped, 2);
    assert_eq!(report.dispatched, 0);
    assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    assert_eq!(read_checkpoint(&dir, "커피빈"), before);
}

/// `kw1` hits the quota at once; every other bare search is slow and reports too many
/// results, so its worker needs district searches after the keys are gone.
struct SlowSiblings {
    calls: AtomicUsize,
}

#[async_trait]
impl Transport for SlowSiblings {
    async fn get(&self, query: &str, _page: u32, _api_key: &str) -> Result<RawResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if query == "kw1" {
            return Ok(RawResponse {
                status: StatusCode::TOO_MANY_REQUESTS,
                body: String::new(),
            });
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        let ids: Vec<String> = (0..15).map(|i| format!("{query}-{i}")).collect();
        Ok(RawResponse {
            status: StatusCode::OK,
            body: page(500, &ids, "서울 강남구 신사동"),
        })
    }
}

#[tokio::test]
async fn exhaustion_aborts_every_in_flight_worker() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(SlowSiblings {
        calls: AtomicUsize::new(0),
    });
    let names: Vec<String> = (1..=10).map(|i| format!("kw{i}")).collect();

    let report = crawler(transport.clone(), 1, &dir)
        .run(&names, 4)
        .await
        .unwrap();

    assert!(report.exhausted);
    assert_eq!(report.dispatched, 4);
    assert_eq!(report.aborted, 4);
    assert_eq!(report.saved, 0);
    assert_eq!(report.failed, 0);
    assert_eq!(report.not_started, 6);
    assert_eq!(
        report.saved + report.failed + report.aborted + report.not_started,
        report.total_targets
    );
    // One bare search per dispatched keyword, nothing after the keys ran out.
    assert_eq!(transport.calls.load(Ordering::SeqCst), 4);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn blank_and_repeated_targets_are_counted() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("이디야.csv"), "id\n").unwrap();

    let transport = Arc::new(FnTransport::new(|q: &str, _| single_hit(q)));
    let report = crawler(transport.clone(), 1, &dir)
        .run(
            &keywords(&["커피빈", "!!!", "커피 빈", "", "이디야", "빽다방", "커피빈"]),
            2,
        )
        .await
        .unwrap();

    assert_eq!(report.total_targets, 7);
    assert_eq!(report.ignored, 4);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.dispatched, 2);
    assert_eq!(
        report.skipped + report.ignored + report.dispatched + report.not_started,
        report.total_targets
    );
    assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn worker_counts_outside_the_permit_range_still_run() {
    for max_workers in [0, usize::MAX] {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(FnTransport::new(|q: &str, _| single_hit(q)));
        let report = crawler(transport, 1, &dir)
            .run(&keywords(&["커피빈", "이디야"]), max_workers)
            .await
            .unwrap();
        assert_eq!(report.saved, 2);
    }
}

//! Integration tests for the crawl controller
//!
//! These tests drive the controller with in-memory collaborators and real
//! file-backed stores in a temporary directory, then check what a second run
//! sees on disk.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use sumi_harvest::config::{CrawlerConfig, RecordConfig};
use sumi_harvest::crawler::{Controller, ExtractError, ItemExtractor, PageLister, SessionProvider};
use sumi_harvest::state::{Checkpoint, CrawlState, HaltReason};
use sumi_harvest::storage::{
    CheckpointStore, CsvRecordSink, JsonCheckpointStore, JsonLinkIndex, LinkIndex, Record,
    RecordSink, StorageError, StorageResult, Stores,
};
use sumi_harvest::HarvestError;
use tempfile::TempDir;

// ===== Mock collaborators =====

#[derive(Default)]
struct Calls {
    acquired: AtomicUsize,
    released: AtomicUsize,
    listed: Mutex<Vec<u32>>,
    extracted: Mutex<Vec<String>>,
}

impl Calls {
    fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    fn extracted(&self) -> Vec<String> {
        self.extracted.lock().unwrap().clone()
    }

    fn listed(&self) -> Vec<u32> {
        self.listed.lock().unwrap().clone()
    }
}

struct MockSession;

struct MockProvider {
    calls: Arc<Calls>,
    fail_acquire: bool,
}

#[async_trait]
impl SessionProvider for MockProvider {
    type Session = MockSession;

    async fn acquire(&self) -> Result<MockSession, HarvestError> {
        self.calls.acquired.fetch_add(1, Ordering::SeqCst);
        if self.fail_acquire {
            return Err(HarvestError::Session("browser did not start".to_string()));
        }
        Ok(MockSession)
    }

    async fn release(&self, _session: &MockSession) -> Result<(), HarvestError> {
        self.calls.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct MockLister {
    calls: Arc<Calls>,
    pages: HashMap<u32, Vec<String>>,
    failing: HashSet<u32>,
    hanging: HashSet<u32>,
}

#[async_trait]
impl PageLister<MockSession> for MockLister {
    async fn list_items(&self, _session: &MockSession, page: u32) -> Result<Vec<String>, HarvestError> {
        self.calls.listed.lock().unwrap().push(page);
        if self.hanging.contains(&page) {
            std::future::pending::<()>().await;
        }
        if self.failing.contains(&page) {
            return Err(HarvestError::HttpStatus {
                url: format!("https://listing.test/?pn={}", page),
                status: 500,
            });
        }
        Ok(self.pages.get(&page).cloned().unwrap_or_default())
    }
}

#[derive(Clone, Copy)]
enum Behavior {
    Blocked,
    BlankIdentity,
    ForeignKey,
    Fault,
    Hang,
}

struct MockExtractor {
    calls: Arc<Calls>,
    behaviors: HashMap<String, Behavior>,
}

#[async_trait]
impl ItemExtractor<MockSession> for MockExtractor {
    async fn extract(&self, _session: &MockSession, id: &str) -> Result<Option<Record>, ExtractError> {
        self.calls.extracted.lock().unwrap().push(id.to_string());
        match self.behaviors.get(id).copied() {
            None => Ok(Some(record(id))),
            Some(Behavior::Blocked) => Ok(None),
            Some(Behavior::BlankIdentity) => Ok(Some(
                Record::new().with("address", "   ").with("property_url", id),
            )),
            Some(Behavior::ForeignKey) => Ok(Some(
                record(id).with("property_url", "https://elsewhere.test/canonical"),
            )),
            Some(Behavior::Fault) => Err(ExtractError::Fetch {
                url: id.to_string(),
                message: "connection reset".to_string(),
            }),
            Some(Behavior::Hang) => {
                std::future::pending::<()>().await;
                Ok(None)
            }
        }
    }
}

/// Checkpoint store that remembers every save
#[derive(Clone, Default)]
struct RecordingCheckpoints {
    saved: Arc<Mutex<Vec<(u32, usize)>>>,
}

impl CheckpointStore for RecordingCheckpoints {
    fn load(&self) -> Checkpoint {
        Checkpoint::default()
    }

    fn save(&mut self, checkpoint: &Checkpoint) -> StorageResult<()> {
        self.saved.lock().unwrap().push(checkpoint.position());
        Ok(())
    }
}

/// Sink that refuses one key and keeps the rest in memory
struct FlakySink {
    refused: String,
    keys: HashSet<String>,
}

impl RecordSink for FlakySink {
    fn append(&mut self, record: &Record) -> StorageResult<()> {
        let key = record.get("property_url").unwrap_or_default().to_string();
        if key == self.refused {
            return Err(StorageError::Corrupt("disk full".to_string()));
        }
        self.keys.insert(key);
        Ok(())
    }

    fn load_existing_keys(&self) -> StorageResult<HashSet<String>> {
        Ok(self.keys.clone())
    }

    fn count_records(&self) -> StorageResult<u64> {
        Ok(self.keys.len() as u64)
    }
}

// ===== Fixtures =====

fn record(id: &str) -> Record {
    Record::new()
        .with("address", format!("Address of {}", id))
        .with("property_url", id)
}

fn ids(page: u32, count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("https://listing.test/p{}/item{}", page, i))
        .collect()
}

fn crawler_config(total_pages: u32, item_delay: u64) -> CrawlerConfig {
    CrawlerConfig {
        total_pages,
        item_delay,
        listing_settle_delay: 0,
        detail_settle_delay: 0,
        request_timeout: 5,
    }
}

struct Harness {
    dir: TempDir,
    calls: Arc<Calls>,
    total_pages: u32,
    pages: HashMap<u32, Vec<String>>,
    failing_pages: HashSet<u32>,
    hanging_pages: HashSet<u32>,
    behaviors: HashMap<String, Behavior>,
    fail_acquire: bool,
    item_delay: u64,
}

impl Harness {
    fn new(total_pages: u32, items_per_page: usize) -> Self {
        let pages = (1..=total_pages)
            .map(|page| (page, ids(page, items_per_page)))
            .collect();
        Self {
            dir: TempDir::new().unwrap(),
            calls: Arc::new(Calls::default()),
            total_pages,
            pages,
            failing_pages: HashSet::new(),
            hanging_pages: HashSet::new(),
            behaviors: HashMap::new(),
            fail_acquire: false,
            item_delay: 0,
        }
    }

    fn records_path(&self) -> std::path::PathBuf {
        self.dir.path().join("records.csv")
    }

    fn checkpoint_path(&self) -> std::path::PathBuf {
        self.dir.path().join("checkpoint.json")
    }

    fn links_path(&self) -> std::path::PathBuf {
        self.dir.path().join("links.json")
    }

    fn file_stores(&self) -> Stores {
        Stores {
            sink: Box::new(CsvRecordSink::new(self.records_path(), "property_url")),
            links: Box::new(JsonLinkIndex::new(self.links_path())),
            checkpoints: Box::new(JsonCheckpointStore::new(self.checkpoint_path())),
        }
    }

    /// Starts a new run with fresh call counters
    fn controller_with(
        &mut self,
        stores: Stores,
    ) -> Controller<MockProvider, MockLister, MockExtractor> {
        self.calls = Arc::new(Calls::default());
        Controller::new(
            crawler_config(self.total_pages, self.item_delay),
            RecordConfig::default(),
            MockProvider {
                calls: self.calls.clone(),
                fail_acquire: self.fail_acquire,
            },
            MockLister {
                calls: self.calls.clone(),
                pages: self.pages.clone(),
                failing: self.failing_pages.clone(),
                hanging: self.hanging_pages.clone(),
            },
            MockExtractor {
                calls: self.calls.clone(),
                behaviors: self.behaviors.clone(),
            },
            stores,
        )
    }

    fn controller(&mut self) -> Controller<MockProvider, MockLister, MockExtractor> {
        let stores = self.file_stores();
        self.controller_with(stores)
    }

    fn saved_keys(&self) -> HashSet<String> {
        CsvRecordSink::new(self.records_path(), "property_url")
            .load_existing_keys()
            .unwrap()
    }

    fn row_count(&self) -> u64 {
        CsvRecordSink::new(self.records_path(), "property_url")
            .count_records()
            .unwrap()
    }

    fn checkpoint(&self) -> (u32, usize) {
        JsonCheckpointStore::new(self.checkpoint_path())
            .load()
            .position()
    }
}

fn never() -> std::future::Pending<()> {
    std::future::pending()
}

// ===== Tests =====

#[tokio::test]
async fn test_full_run_finishes() {
    let mut harness = Harness::new(2, 3);

    let outcome = harness.controller().run_until(never()).await.unwrap();

    assert_eq!(outcome.state, CrawlState::Finished);
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(outcome.stats.saved, 6);
    assert_eq!(outcome.stats.pages_visited, 2);
    assert_eq!(harness.row_count(), 6);
    assert_eq!(harness.checkpoint(), (3, 0));
    assert_eq!(harness.calls.acquired.load(Ordering::SeqCst), 1);
    assert_eq!(harness.calls.released(), 1);

    let snapshot = JsonLinkIndex::new(harness.links_path()).load();
    assert_eq!(snapshot["page_1"], ids(1, 3));
    assert_eq!(snapshot["page_2"], ids(2, 3));
}

#[tokio::test]
async fn test_rerun_after_finish_does_nothing() {
    let mut harness = Harness::new(2, 3);
    harness.controller().run_until(never()).await.unwrap();

    let outcome = harness.controller().run_until(never()).await.unwrap();

    assert_eq!(outcome.state, CrawlState::Finished);
    assert!(harness.calls.extracted().is_empty());
    assert!(harness.calls.listed().is_empty());
    assert_eq!(harness.row_count(), 6);
    assert_eq!(harness.calls.released(), 1);
}

#[tokio::test]
async fn test_fresh_run_skips_saved_items() {
    let mut harness = Harness::new(2, 3);
    harness.controller().run_until(never()).await.unwrap();

    let outcome = harness
        .controller()
        .fresh(true)
        .run_until(never())
        .await
        .unwrap();

    assert_eq!(outcome.state, CrawlState::Finished);
    assert_eq!(outcome.stats.skipped_duplicate, 6);
    assert!(harness.calls.extracted().is_empty());
    assert_eq!(harness.calls.listed(), vec![1, 2]);
    assert_eq!(harness.row_count(), 6);
}

#[tokio::test]
async fn test_block_halts_at_failing_item() {
    let mut harness = Harness::new(1, 5);
    let page = ids(1, 5);
    harness.behaviors.insert(page[2].clone(), Behavior::Blocked);

    let outcome = harness.controller().run_until(never()).await.unwrap();

    assert_eq!(
        outcome.state,
        CrawlState::Halted(HaltReason::Blocked {
            url: page[2].clone()
        })
    );
    assert_eq!(outcome.exit_code(), 2);
    assert_eq!(harness.checkpoint(), (1, 2));
    assert_eq!(harness.calls.extracted(), page[..3].to_vec());
    assert_eq!(harness.row_count(), 2);
    assert_eq!(harness.calls.released(), 1);
}

#[tokio::test]
async fn test_resume_after_block_retries_blocked_item() {
    let mut harness = Harness::new(1, 5);
    let page = ids(1, 5);
    harness.behaviors.insert(page[2].clone(), Behavior::Blocked);
    harness.controller().run_until(never()).await.unwrap();

    harness.behaviors.clear();
    let outcome = harness.controller().run_until(never()).await.unwrap();

    assert_eq!(outcome.state, CrawlState::Finished);
    assert_eq!(outcome.stats.skipped_resumed, 2);
    assert_eq!(harness.calls.extracted(), page[2..].to_vec());
    assert_eq!(
        harness.saved_keys(),
        page.iter().cloned().collect::<HashSet<_>>()
    );
    assert_eq!(harness.row_count(), 5);
}

#[tokio::test]
async fn test_resumed_sink_matches_uninterrupted_run() {
    let mut straight = Harness::new(2, 3);
    straight.controller().run_until(never()).await.unwrap();

    let mut resumed = Harness::new(2, 3);
    resumed
        .behaviors
        .insert(ids(2, 3)[1].clone(), Behavior::Blocked);
    let first = resumed.controller().run_until(never()).await.unwrap();
    assert!(matches!(
        first.state,
        CrawlState::Halted(HaltReason::Blocked { .. })
    ));

    resumed.behaviors.clear();
    let second = resumed.controller().run_until(never()).await.unwrap();
    assert_eq!(second.state, CrawlState::Finished);

    assert_eq!(
        fs::read(straight.records_path()).unwrap(),
        fs::read(resumed.records_path()).unwrap()
    );
}

#[tokio::test]
async fn test_record_is_stored_under_its_identifier() {
    let mut harness = Harness::new(1, 2);
    let page = ids(1, 2);
    harness
        .behaviors
        .insert(page[0].clone(), Behavior::ForeignKey);
    harness.controller().run_until(never()).await.unwrap();

    assert_eq!(
        harness.saved_keys(),
        page.iter().cloned().collect::<HashSet<_>>()
    );

    // A fresh run finds both items already saved
    let outcome = harness
        .controller()
        .fresh(true)
        .run_until(never())
        .await
        .unwrap();
    assert_eq!(outcome.stats.skipped_duplicate, 2);
    assert!(harness.calls.extracted().is_empty());
}

#[tokio::test]
async fn test_item_delay_follows_saves_only() {
    let mut harness = Harness::new(1, 3);
    harness.item_delay = 400;
    for id in ids(1, 3) {
        harness.behaviors.insert(id, Behavior::Fault);
    }

    let started = Instant::now();
    let outcome = harness.controller().run_until(never()).await.unwrap();

    assert_eq!(outcome.stats.failed, 3);
    assert!(started.elapsed() < Duration::from_millis(400));
}

#[tokio::test]
async fn test_item_delay_after_save() {
    let mut harness = Harness::new(1, 1);
    harness.item_delay = 200;

    let started = Instant::now();
    let outcome = harness.controller().run_until(never()).await.unwrap();

    assert_eq!(outcome.stats.saved, 1);
    assert!(started.elapsed() >= Duration::from_millis(200));
}

#[tokio::test]
async fn test_blank_identity_is_block() {
    let mut harness = Harness::new(1, 3);
    let page = ids(1, 3);
    harness
        .behaviors
        .insert(page[0].clone(), Behavior::BlankIdentity);

    let outcome = harness.controller().run_until(never()).await.unwrap();

    assert!(matches!(
        outcome.state,
        CrawlState::Halted(HaltReason::Blocked { .. })
    ));
    assert_eq!(harness.checkpoint(), (1, 0));
    assert_eq!(harness.row_count(), 0);
}

#[tokio::test]
async fn test_transient_fault_skips_item() {
    let mut harness = Harness::new(1, 3);
    let page = ids(1, 3);
    harness.behaviors.insert(page[1].clone(), Behavior::Fault);

    let outcome = harness.controller().run_until(never()).await.unwrap();

    assert_eq!(outcome.state, CrawlState::Finished);
    assert_eq!(outcome.stats.failed, 1);
    assert_eq!(outcome.stats.saved, 2);
    assert_eq!(harness.calls.extracted(), page);
    assert!(!harness.saved_keys().contains(&page[1]));
    assert_eq!(harness.checkpoint(), (2, 0));
}

#[tokio::test]
async fn test_fresh_run_retries_faulted_item() {
    let mut harness = Harness::new(1, 3);
    let page = ids(1, 3);
    harness.behaviors.insert(page[1].clone(), Behavior::Fault);
    harness.controller().run_until(never()).await.unwrap();

    harness.behaviors.clear();
    harness
        .controller()
        .fresh(true)
        .run_until(never())
        .await
        .unwrap();

    assert_eq!(harness.calls.extracted(), vec![page[1].clone()]);
    assert_eq!(harness.row_count(), 3);
}

#[tokio::test]
async fn test_existing_records_are_not_extracted() {
    let mut harness = Harness::new(1, 4);
    let page = ids(1, 4);
    {
        let mut sink = CsvRecordSink::new(harness.records_path(), "property_url");
        sink.append(&record(&page[1])).unwrap();
        sink.append(&record(&page[3])).unwrap();
    }

    let outcome = harness.controller().run_until(never()).await.unwrap();

    assert_eq!(outcome.stats.skipped_duplicate, 2);
    assert_eq!(
        harness.calls.extracted(),
        vec![page[0].clone(), page[2].clone()]
    );
    assert_eq!(harness.row_count(), 4);
}

#[tokio::test]
async fn test_checkpoint_advance_law() {
    let mut harness = Harness::new(1, 4);
    let page = ids(1, 4);
    {
        let mut sink = CsvRecordSink::new(harness.records_path(), "property_url");
        sink.append(&record(&page[1])).unwrap();
    }
    harness.behaviors.insert(page[2].clone(), Behavior::Fault);
    harness.behaviors.insert(page[3].clone(), Behavior::Blocked);

    let checkpoints = RecordingCheckpoints::default();
    let stores = Stores {
        sink: Box::new(CsvRecordSink::new(harness.records_path(), "property_url")),
        links: Box::new(JsonLinkIndex::new(harness.links_path())),
        checkpoints: Box::new(checkpoints.clone()),
    };

    harness
        .controller_with(stores)
        .run_until(never())
        .await
        .unwrap();

    // saved, duplicate, fault, blocked
    assert_eq!(
        *checkpoints.saved.lock().unwrap(),
        vec![(1, 1), (1, 2), (1, 3), (1, 3)]
    );
}

#[tokio::test]
async fn test_page_boundaries_save_next_page() {
    let mut harness = Harness::new(3, 1);
    harness.pages.insert(2, Vec::new());

    let checkpoints = RecordingCheckpoints::default();
    let stores = Stores {
        sink: Box::new(CsvRecordSink::new(harness.records_path(), "property_url")),
        links: Box::new(JsonLinkIndex::new(harness.links_path())),
        checkpoints: Box::new(checkpoints.clone()),
    };

    let outcome = harness
        .controller_with(stores)
        .run_until(never())
        .await
        .unwrap();

    assert_eq!(outcome.state, CrawlState::Finished);
    assert_eq!(
        *checkpoints.saved.lock().unwrap(),
        vec![(1, 1), (2, 0), (3, 0), (3, 1), (4, 0)]
    );
}

#[tokio::test]
async fn test_append_failure_is_transient() {
    let mut harness = Harness::new(1, 3);
    let page = ids(1, 3);
    let stores = Stores {
        sink: Box::new(FlakySink {
            refused: page[0].clone(),
            keys: HashSet::new(),
        }),
        links: Box::new(JsonLinkIndex::new(harness.links_path())),
        checkpoints: Box::new(JsonCheckpointStore::new(harness.checkpoint_path())),
    };

    let outcome = harness
        .controller_with(stores)
        .run_until(never())
        .await
        .unwrap();

    assert_eq!(outcome.state, CrawlState::Finished);
    assert_eq!(outcome.stats.failed, 1);
    assert_eq!(outcome.stats.saved, 2);
    assert_eq!(harness.checkpoint(), (2, 0));
    assert_eq!(harness.calls.extracted(), page);
}

#[tokio::test]
async fn test_listing_failure_halts_with_error() {
    let mut harness = Harness::new(3, 2);
    harness.failing_pages.insert(2);

    let outcome = harness.controller().run_until(never()).await.unwrap();

    assert!(matches!(
        outcome.state,
        CrawlState::Halted(HaltReason::Error(_))
    ));
    assert_eq!(outcome.exit_code(), 1);
    assert_eq!(harness.checkpoint(), (2, 0));
    assert_eq!(harness.row_count(), 2);
    assert_eq!(harness.calls.released(), 1);
}

#[tokio::test]
async fn test_acquire_failure_stops_before_work() {
    let mut harness = Harness::new(1, 2);
    harness.fail_acquire = true;

    let result = harness.controller().run_until(never()).await;

    assert!(matches!(result, Err(HarvestError::Session(_))));
    assert!(harness.calls.listed().is_empty());
    assert_eq!(harness.calls.released(), 0);
    assert!(!Path::new(&harness.checkpoint_path()).exists());
}

#[tokio::test]
async fn test_interrupt_during_item_saves_next_item() {
    let mut harness = Harness::new(1, 4);
    let page = ids(1, 4);
    harness.behaviors.insert(page[1].clone(), Behavior::Hang);

    let outcome = harness
        .controller()
        .run_until(tokio::time::sleep(Duration::from_millis(100)))
        .await
        .unwrap();

    assert_eq!(outcome.state, CrawlState::Halted(HaltReason::Interrupted));
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(harness.checkpoint(), (1, 2));
    assert_eq!(harness.row_count(), 1);
    assert_eq!(harness.calls.released(), 1);
}

#[tokio::test]
async fn test_interrupt_during_listing_keeps_page_start() {
    let mut harness = Harness::new(2, 2);
    harness.hanging_pages.insert(2);

    let outcome = harness
        .controller()
        .run_until(tokio::time::sleep(Duration::from_millis(100)))
        .await
        .unwrap();

    assert_eq!(outcome.state, CrawlState::Halted(HaltReason::Interrupted));
    assert_eq!(harness.checkpoint(), (2, 0));
    assert_eq!(harness.calls.released(), 1);
}

#[tokio::test]
async fn test_corrupt_checkpoint_starts_over() {
    let mut harness = Harness::new(2, 2);
    fs::write(harness.checkpoint_path(), "{\"page\": 2, \"offs").unwrap();

    let outcome = harness.controller().run_until(never()).await.unwrap();

    assert_eq!(outcome.state, CrawlState::Finished);
    assert_eq!(harness.calls.listed(), vec![1, 2]);
    assert_eq!(harness.row_count(), 4);
}

#[tokio::test]
async fn test_checkpoint_carries_config_hash() {
    let mut harness = Harness::new(1, 1);

    harness
        .controller()
        .with_config_hash("abc123")
        .run_until(never())
        .await
        .unwrap();

    let checkpoint = JsonCheckpointStore::new(harness.checkpoint_path()).load();
    assert_eq!(checkpoint.config_hash.as_deref(), Some("abc123"));
    assert!(checkpoint.updated_at.is_some());
}

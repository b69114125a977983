//! Crawl controller - the resumable harvest loop
//!
//! This module contains the state machine that walks listing pages in order,
//! processes every detail item on each page, and keeps the checkpoint current
//! after every attempt. It coordinates:
//! - Resuming from the persisted checkpoint
//! - Skipping items whose records already exist
//! - Halting on the block signal
//! - Handling operator interrupts
//! - Releasing the session exactly once

use crate::config::{CrawlerConfig, RecordConfig};
use crate::crawler::fault::{Fault, FaultPolicy};
use crate::crawler::traits::{ItemExtractor, PageLister, SessionProvider};
use crate::output::RunStatistics;
use crate::state::{Checkpoint, CrawlState, DedupIndex, HaltReason};
use crate::storage::{page_key, Record, StorageResult, Stores};
use crate::HarvestError;
use std::future::Future;

/// How a run ended
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Terminal state (`Finished` or `Halted`)
    pub state: CrawlState,

    /// Counters collected during the run
    pub stats: RunStatistics,

    /// The last checkpoint the controller wrote or loaded
    pub checkpoint: Checkpoint,
}

impl RunOutcome {
    /// Process exit status for this outcome
    ///
    /// | Outcome | Status |
    /// |---------|--------|
    /// | Finished, Interrupted | 0 |
    /// | Error | 1 |
    /// | Blocked | 2 |
    pub fn exit_code(&self) -> u8 {
        match &self.state {
            CrawlState::Halted(HaltReason::Blocked { .. }) => 2,
            CrawlState::Halted(HaltReason::Error(_)) => 1,
            _ => 0,
        }
    }
}

/// Where the controller is on the current listing page
#[derive(Debug, Clone, Copy)]
struct Cursor {
    page: u32,
    start_offset: usize,
    reached: Option<usize>,
}

impl Cursor {
    fn new(page: u32, start_offset: usize) -> Self {
        Self {
            page,
            start_offset,
            reached: None,
        }
    }

    /// Best-known resume point after an abnormal stop
    fn resume_point(&self) -> (u32, usize) {
        match self.reached {
            Some(index) => (self.page, index + 1),
            None => (self.page, self.start_offset),
        }
    }
}

enum ItemOutcome {
    Continue,
    Halt(CrawlState),
}

/// Main crawl controller structure
pub struct Controller<P, L, E> {
    crawler: CrawlerConfig,
    record: RecordConfig,
    provider: P,
    lister: L,
    extractor: E,
    stores: Stores,
    config_hash: Option<String>,
    fresh: bool,
    state: CrawlState,
    checkpoint: Checkpoint,
    cursor: Cursor,
    dedup: DedupIndex,
    stats: RunStatistics,
}

impl<P, L, E> Controller<P, L, E>
where
    P: SessionProvider,
    L: PageLister<P::Session>,
    E: ItemExtractor<P::Session>,
{
    /// Creates a new controller instance
    ///
    /// # Arguments
    ///
    /// * `crawler` - Page count and pacing
    /// * `record` - Identity and key field names
    /// * `provider` - Source of the session every fetch goes through
    /// * `lister` - Turns listing pages into detail identifiers
    /// * `extractor` - Turns detail identifiers into records
    /// * `stores` - Record sink, link snapshot and checkpoint
    pub fn new(
        crawler: CrawlerConfig,
        record: RecordConfig,
        provider: P,
        lister: L,
        extractor: E,
        stores: Stores,
    ) -> Self {
        Self {
            crawler,
            record,
            provider,
            lister,
            extractor,
            stores,
            config_hash: None,
            fresh: false,
            state: CrawlState::AdvancingPage { page: 1 },
            checkpoint: Checkpoint::default(),
            cursor: Cursor::new(1, 0),
            dedup: DedupIndex::new(),
            stats: RunStatistics::default(),
        }
    }

    /// Stamps every saved checkpoint with the configuration hash
    pub fn with_config_hash(mut self, config_hash: impl Into<String>) -> Self {
        self.config_hash = Some(config_hash.into());
        self
    }

    /// Ignores the persisted checkpoint and starts from page 1
    pub fn fresh(mut self, fresh: bool) -> Self {
        self.fresh = fresh;
        self
    }

    /// Current state of the controller
    pub fn state(&self) -> &CrawlState {
        &self.state
    }

    /// Runs until finished, halted, or interrupted with Ctrl-C
    pub async fn run(&mut self) -> Result<RunOutcome, HarvestError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("Could not listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Runs until finished, halted, or until `shutdown` completes
    ///
    /// # Returns
    ///
    /// * `Ok(RunOutcome)` - The run reached a terminal state
    /// * `Err(HarvestError)` - The session could not be acquired; nothing ran
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<RunOutcome, HarvestError>
    where
        F: Future<Output = ()>,
    {
        self.prepare();

        let session = self.provider.acquire().await?;
        tracing::info!(
            "Starting harvest at page {}, item {} ({} pages configured)",
            self.checkpoint.page,
            self.checkpoint.offset,
            self.crawler.total_pages
        );

        let finished = tokio::select! {
            state = self.drive(&session) => Some(state),
            _ = shutdown => None,
        };

        let state = match finished {
            Some(state) => state,
            None => {
                tracing::warn!("Interrupted, saving progress");
                let (page, offset) = self.cursor.resume_point();
                self.save_checkpoint(page, offset);
                CrawlState::Halted(HaltReason::Interrupted)
            }
        };

        if let Err(e) = self.provider.release(&session).await {
            tracing::warn!("{} while releasing session: {}", Fault::Session, e);
        }

        self.transition(state.clone());
        self.stats.log_summary();

        Ok(RunOutcome {
            state,
            stats: self.stats.clone(),
            checkpoint: self.checkpoint.clone(),
        })
    }

    /// Loads the checkpoint and rebuilds the dedup index
    fn prepare(&mut self) {
        self.stats = RunStatistics::default();
        self.checkpoint = if self.fresh {
            tracing::info!("Starting fresh, ignoring the saved checkpoint");
            Checkpoint::default()
        } else {
            self.stores.checkpoints.load()
        };

        if let (Some(saved), Some(current)) = (&self.checkpoint.config_hash, &self.config_hash) {
            if saved != current {
                tracing::warn!(
                    "Checkpoint was written with a different configuration (hash {}), resuming anyway",
                    saved
                );
            }
        }

        self.dedup = DedupIndex::rebuild(self.stores.sink.as_ref());
        self.cursor = Cursor::new(self.checkpoint.page, self.checkpoint.offset);
        self.state = CrawlState::AdvancingPage {
            page: self.checkpoint.page,
        };
    }

    /// Walks pages from the checkpoint to the last configured page
    async fn drive(&mut self, session: &P::Session) -> CrawlState {
        let (resume_page, resume_offset) = self.checkpoint.position();
        let mut page = resume_page;

        while page <= self.crawler.total_pages {
            let start_offset = if page == resume_page { resume_offset } else { 0 };
            self.cursor = Cursor::new(page, start_offset);
            self.transition(CrawlState::AdvancingPage { page });

            let ids = match self.lister.list_items(session, page).await {
                Ok(ids) => ids,
                Err(e) => return self.fail(format!("listing page {} failed: {}", page, e)),
            };

            self.stats.pages_visited += 1;
            self.stats.items_seen += ids.len() as u64;
            tracing::info!("Page {}: {} items", page, ids.len());

            if let Err(e) = self.stores.links.merge(&page_key(page), &ids) {
                tracing::warn!("{} saving links for page {}: {}", Fault::Persistence, page, e);
            }

            for (index, id) in ids.iter().enumerate() {
                if index < start_offset {
                    self.stats.skipped_resumed += 1;
                    continue;
                }

                self.cursor.reached = Some(index);
                self.transition(CrawlState::ProcessingItem { page, index });

                if let ItemOutcome::Halt(state) = self.process_item(session, page, index, id).await
                {
                    return state;
                }
            }

            page += 1;
            self.save_checkpoint(page, 0);
        }

        CrawlState::Finished
    }

    /// Handles one detail item and saves the checkpoint for it
    async fn process_item(
        &mut self,
        session: &P::Session,
        page: u32,
        index: usize,
        id: &str,
    ) -> ItemOutcome {
        if self.dedup.contains(id) {
            tracing::debug!("Already saved, skipping {}", id);
            self.stats.skipped_duplicate += 1;
            self.save_checkpoint(page, index + 1);
            return ItemOutcome::Continue;
        }

        let extracted = self.extractor.extract(session, id).await;
        let fault = match extracted {
            Ok(Some(record)) if record.has_value(&self.record.identity_field) => {
                match self.store_record(record, id) {
                    Ok(()) => {
                        self.save_checkpoint(page, index + 1);
                        self.pause().await;
                        return ItemOutcome::Continue;
                    }
                    Err(e) => {
                        tracing::warn!(
                            "{}, could not append {}: {}",
                            Fault::TransientItem,
                            id,
                            e
                        );
                        Fault::TransientItem
                    }
                }
            }
            Ok(_) => {
                tracing::warn!(
                    "{}: no '{}' on {}",
                    Fault::Blocked,
                    self.record.identity_field,
                    id
                );
                Fault::Blocked
            }
            Err(e) => {
                tracing::warn!("{} on {}: {}", Fault::TransientItem, id, e);
                Fault::TransientItem
            }
        };

        self.recover(fault, page, index, id)
    }

    /// Applies the recovery policy of a fault raised by one item
    fn recover(&mut self, fault: Fault, page: u32, index: usize, id: &str) -> ItemOutcome {
        match fault.policy() {
            FaultPolicy::HaltRun => {
                tracing::warn!("Stopping at page {}, item {}", page, index);
                self.save_checkpoint(page, index);
                let reason = match fault {
                    Fault::Blocked => HaltReason::Blocked { url: id.to_string() },
                    other => HaltReason::Error(format!("{} on {}", other, id)),
                };
                ItemOutcome::Halt(CrawlState::Halted(reason))
            }
            FaultPolicy::SkipItem => {
                tracing::debug!("Skipping {}", id);
                self.stats.failed += 1;
                self.save_checkpoint(page, index + 1);
                ItemOutcome::Continue
            }
            FaultPolicy::UseDefault | FaultPolicy::Report => {
                self.save_checkpoint(page, index + 1);
                ItemOutcome::Continue
            }
        }
    }

    /// Appends a record under its identifier and marks the identifier as done
    fn store_record(&mut self, mut record: Record, id: &str) -> StorageResult<()> {
        record.insert(self.record.key_field.as_str(), id);
        self.stores.sink.append(&record)?;

        self.dedup.add(id);
        self.stats.saved += 1;
        tracing::info!(
            "Saved {} ({} records this run)",
            record.get(&self.record.identity_field).unwrap_or(id),
            self.stats.saved
        );
        Ok(())
    }

    /// Saves the best-known position and halts with an error
    fn fail(&mut self, message: String) -> CrawlState {
        tracing::error!("{}", message);
        let (page, offset) = self.cursor.resume_point();
        self.save_checkpoint(page, offset);
        CrawlState::Halted(HaltReason::Error(message))
    }

    /// Writes the checkpoint; a failed write is logged and the run goes on
    fn save_checkpoint(&mut self, page: u32, offset: usize) {
        let checkpoint = Checkpoint::new(page, offset).stamped(self.config_hash.as_deref());
        if let Err(e) = self.stores.checkpoints.save(&checkpoint) {
            tracing::warn!(
                "{} saving checkpoint (page {}, item {}): {}",
                Fault::Persistence,
                page,
                offset,
                e
            );
        }
        self.checkpoint = checkpoint;
    }

    async fn pause(&self) {
        let delay = self.crawler.item_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn transition(&mut self, next: CrawlState) {
        if next.is_terminal() {
            tracing::info!("Harvest {}", next);
        } else {
            tracing::debug!("Controller {}", next);
        }
        self.state = next;
    }
}

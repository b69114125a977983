//! Crawler module for the resumable harvest
//!
//! This module contains the core harvesting logic, including:
//! - The controller state machine and its fault policies
//! - Collaborator traits for sessions, listing pages and detail pages
//! - HTTP implementations of those collaborators
//! - HTML parsing for links and record fields

mod controller;
mod extractor;
mod fault;
mod fetcher;
mod lister;
mod parser;
mod session;
mod traits;

pub use controller::{Controller, RunOutcome};
pub use extractor::HttpItemExtractor;
pub use fault::{Fault, FaultPolicy};
pub use fetcher::{build_http_client, fetch_url, FetchResult};
pub use lister::HttpPageLister;
pub use parser::{
    compile_fields, compile_groups, compile_selector, extract_fields, extract_links,
    FieldExtractor, GroupExtractor,
};
pub use session::{HttpSession, HttpSessionProvider};
pub use traits::{ExtractError, ItemExtractor, PageLister, SessionProvider};

use crate::config::Config;
use crate::storage::Stores;
use crate::HarvestError;

/// Runs a complete harvest over HTTP
///
/// This is the main entry point for starting a harvest. It will:
/// 1. Open the record sink, link snapshot and checkpoint
/// 2. Build the HTTP collaborators from the configuration
/// 3. Run the controller until it finishes, halts, or is interrupted
///
/// # Arguments
///
/// * `config` - The harvester configuration
/// * `config_hash` - Hash stamped into every checkpoint
/// * `fresh` - Ignore the saved checkpoint
///
/// # Returns
///
/// * `Ok(RunOutcome)` - The run reached a terminal state
/// * `Err(HarvestError)` - Start-up failed (stores or session)
pub async fn run_harvest(
    config: Config,
    config_hash: Option<String>,
    fresh: bool,
) -> Result<RunOutcome, HarvestError> {
    let stores = Stores::open(&config.output, &config.record)?;

    let provider =
        HttpSessionProvider::new(config.user_agent.clone(), config.crawler.request_timeout());
    let lister = HttpPageLister::new(
        config.listing.clone(),
        config.crawler.listing_settle_delay(),
    )?;
    let extractor = HttpItemExtractor::new(
        &config.fields,
        &config.groups,
        config.record.key_field.as_str(),
        config.crawler.detail_settle_delay(),
    )?;

    let mut controller = Controller::new(
        config.crawler,
        config.record,
        provider,
        lister,
        extractor,
        stores,
    )
    .fresh(fresh);

    if let Some(hash) = config_hash {
        controller = controller.with_config_hash(hash);
    }

    controller.run().await
}

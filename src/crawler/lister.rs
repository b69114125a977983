//! Listing page collaborator

use crate::config::ListingConfig;
use crate::crawler::fetcher::{fetch_url, FetchResult};
use crate::crawler::parser::{compile_selector, extract_links};
use crate::crawler::session::HttpSession;
use crate::crawler::traits::PageLister;
use crate::{ConfigError, HarvestError};
use async_trait::async_trait;
use scraper::Selector;
use std::time::Duration;
use url::Url;

/// Lists detail links by fetching the templated listing URL
#[derive(Debug, Clone)]
pub struct HttpPageLister {
    listing: ListingConfig,
    base_url: Url,
    selector: Selector,
    settle: Duration,
}

impl HttpPageLister {
    /// Creates a lister, parsing the base URL and link selector up front
    pub fn new(listing: ListingConfig, settle: Duration) -> Result<Self, ConfigError> {
        let base_url = Url::parse(&listing.base_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", listing.base_url, e)))?;
        let selector = compile_selector(&listing.link_selector)?;

        Ok(Self {
            listing,
            base_url,
            selector,
            settle,
        })
    }
}

#[async_trait]
impl PageLister<HttpSession> for HttpPageLister {
    async fn list_items(
        &self,
        session: &HttpSession,
        page: u32,
    ) -> Result<Vec<String>, HarvestError> {
        let url = self.listing.page_url(page);
        tracing::debug!("Fetching listing page {}: {}", page, url);

        match fetch_url(session.client(), &url, self.settle).await {
            FetchResult::Success { body, .. } => {
                Ok(extract_links(&body, &self.base_url, &self.selector))
            }
            FetchResult::HttpError { status_code } => Err(HarvestError::HttpStatus {
                url,
                status: status_code,
            }),
            FetchResult::NetworkError { error } => Err(HarvestError::Fetch {
                url,
                message: error,
            }),
        }
    }
}

//! HTTP session
//!
//! A session is one shared `reqwest::Client` (connection pool, cookies, user
//! agent) held for the whole run.

use crate::config::UserAgentConfig;
use crate::crawler::fetcher::build_http_client;
use crate::crawler::traits::SessionProvider;
use crate::HarvestError;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// The session handed to the HTTP lister and extractor
#[derive(Debug)]
pub struct HttpSession {
    client: Client,
    released: AtomicBool,
}

impl HttpSession {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            released: AtomicBool::new(false),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Returns true once the session has been released
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

/// Builds HTTP sessions from the user agent configuration
#[derive(Debug, Clone)]
pub struct HttpSessionProvider {
    user_agent: UserAgentConfig,
    timeout: Duration,
}

impl HttpSessionProvider {
    pub fn new(user_agent: UserAgentConfig, timeout: Duration) -> Self {
        Self {
            user_agent,
            timeout,
        }
    }
}

#[async_trait]
impl SessionProvider for HttpSessionProvider {
    type Session = HttpSession;

    async fn acquire(&self) -> Result<HttpSession, HarvestError> {
        let client = build_http_client(&self.user_agent, self.timeout)
            .map_err(|e| HarvestError::Session(format!("could not build HTTP client: {}", e)))?;
        tracing::debug!("HTTP session ready ({})", self.user_agent.header_value());
        Ok(HttpSession::new(client))
    }

    async fn release(&self, session: &HttpSession) -> Result<(), HarvestError> {
        if session.released.swap(true, Ordering::SeqCst) {
            tracing::debug!("HTTP session already released");
        } else {
            tracing::debug!("HTTP session released");
        }
        Ok(())
    }
}

//! Detail page collaborator

use crate::config::{FieldRule, GroupRule};
use crate::crawler::fetcher::{fetch_url, FetchResult};
use crate::crawler::parser::{
    compile_fields, compile_groups, extract_fields, FieldExtractor, GroupExtractor,
};
use crate::crawler::session::HttpSession;
use crate::crawler::traits::{ExtractError, ItemExtractor};
use crate::storage::Record;
use crate::ConfigError;
use async_trait::async_trait;
use std::time::Duration;

/// Extracts a record by fetching the detail page and applying the field and group rules
#[derive(Debug, Clone)]
pub struct HttpItemExtractor {
    fields: Vec<FieldExtractor>,
    groups: Vec<GroupExtractor>,
    key_field: String,
    settle: Duration,
}

impl HttpItemExtractor {
    pub fn new(
        rules: &[FieldRule],
        groups: &[GroupRule],
        key_field: impl Into<String>,
        settle: Duration,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            fields: compile_fields(rules)?,
            groups: compile_groups(groups)?,
            key_field: key_field.into(),
            settle,
        })
    }
}

#[async_trait]
impl ItemExtractor<HttpSession> for HttpItemExtractor {
    async fn extract(
        &self,
        session: &HttpSession,
        id: &str,
    ) -> Result<Option<Record>, ExtractError> {
        let result = fetch_url(session.client(), id, self.settle).await;
        if result.is_refusal() {
            tracing::warn!("Source refused {}: {:?}", id, result);
            return Ok(None);
        }

        match result {
            FetchResult::Success { body, .. } => {
                let mut record = extract_fields(&body, &self.fields, &self.groups);
                record.insert(self.key_field.as_str(), id);
                Ok(Some(record))
            }
            FetchResult::HttpError { status_code } => Err(ExtractError::Status {
                url: id.to_string(),
                status: status_code,
            }),
            FetchResult::NetworkError { error } => Err(ExtractError::Fetch {
                url: id.to_string(),
                message: error,
            }),
        }
    }
}

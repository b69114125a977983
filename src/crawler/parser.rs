//! HTML parser for listing links and record fields
//!
//! This module handles parsing HTML content to extract:
//! - Detail links from a listing page (via the configured link selector)
//! - Record fields from a detail page (via the configured field and group rules)

use crate::config::{FieldRule, GroupRule};
use crate::storage::Record;
use crate::ConfigError;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

/// A field rule with its selector parsed once up front
#[derive(Debug, Clone)]
pub struct FieldExtractor {
    name: String,
    selector: Selector,
    attribute: Option<String>,
    join: Option<String>,
}

impl FieldExtractor {
    /// Compiles a field rule
    pub fn compile(rule: &FieldRule) -> Result<Self, ConfigError> {
        Ok(Self {
            name: rule.name.clone(),
            selector: compile_selector(&rule.selector)?,
            attribute: rule.attribute.clone(),
            join: rule.join.clone(),
        })
    }

    fn value_of(&self, element: ElementRef<'_>) -> Option<String> {
        let raw = match &self.attribute {
            Some(attribute) => element.value().attr(attribute)?.to_string(),
            None => element.text().collect::<String>(),
        };
        Some(raw.trim().to_string())
    }

    /// Evaluates the rule against a parsed document
    fn evaluate(&self, document: &Html) -> String {
        self.combine(document.select(&self.selector))
    }

    /// Evaluates the rule inside one element
    fn evaluate_within(&self, scope: ElementRef<'_>) -> String {
        self.combine(scope.select(&self.selector))
    }

    /// Without `join` the first match wins; with it every distinct non-empty
    /// match is collected in document order. A miss yields an empty string.
    fn combine<'a>(&self, elements: impl Iterator<Item = ElementRef<'a>>) -> String {
        let mut matches = elements.filter_map(|element| self.value_of(element));

        match &self.join {
            Some(separator) => {
                let mut seen = HashSet::new();
                matches
                    .filter(|value| !value.is_empty() && seen.insert(value.clone()))
                    .collect::<Vec<_>>()
                    .join(separator)
            }
            None => matches.next().unwrap_or_default(),
        }
    }
}

/// A group rule with its container and sub-field selectors parsed up front
#[derive(Debug, Clone)]
pub struct GroupExtractor {
    container: Selector,
    fields: Vec<FieldExtractor>,
}

impl GroupExtractor {
    /// Compiles a group rule
    pub fn compile(rule: &GroupRule) -> Result<Self, ConfigError> {
        Ok(Self {
            container: compile_selector(&rule.selector)?,
            fields: compile_fields(&rule.fields)?,
        })
    }

    /// Appends `<name><n>` fields for every container with at least one value
    fn extend(&self, document: &Html, record: &mut Record) {
        let rows = document.select(&self.container).filter_map(|container| {
            let values: Vec<String> = self
                .fields
                .iter()
                .map(|field| field.evaluate_within(container))
                .collect();
            values.iter().any(|v| !v.is_empty()).then_some(values)
        });

        for (index, values) in rows.enumerate() {
            for (field, value) in self.fields.iter().zip(values) {
                record.insert(format!("{}{}", field.name, index + 1), value);
            }
        }
    }
}

/// Parses a CSS selector, reporting failures as configuration errors
pub fn compile_selector(selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector)
        .map_err(|e| ConfigError::InvalidSelector(format!("'{}': {:?}", selector, e)))
}

/// Compiles every field rule
pub fn compile_fields(rules: &[FieldRule]) -> Result<Vec<FieldExtractor>, ConfigError> {
    rules.iter().map(FieldExtractor::compile).collect()
}

/// Compiles every group rule
pub fn compile_groups(rules: &[GroupRule]) -> Result<Vec<GroupExtractor>, ConfigError> {
    rules.iter().map(GroupExtractor::compile).collect()
}

/// Extracts detail links from a listing page
///
/// Every element matching `selector` contributes its `href`. Relative links
/// are resolved against `base_url`; the result keeps first-seen order with
/// duplicates removed.
///
/// # Link Extraction Rules
///
/// **Exclude:**
/// - `javascript:`, `mailto:`, `tel:` links
/// - Data URIs
/// - Fragment-only links
/// - Anything that does not resolve to `http` or `https`
///
/// # Example
///
/// ```no_run
/// use scraper::Selector;
/// use sumi_harvest::crawler::extract_links;
/// use url::Url;
///
/// let html = r#"<html><body><a class="card" href="/home/1">One</a></body></html>"#;
/// let base_url = Url::parse("https://example.com/").unwrap();
/// let selector = Selector::parse("a.card").unwrap();
/// let links = extract_links(html, &base_url, &selector);
/// assert_eq!(links, vec!["https://example.com/home/1".to_string()]);
/// ```
pub fn extract_links(html: &str, base_url: &Url, selector: &Selector) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for element in document.select(selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if let Some(absolute_url) = resolve_link(href, base_url) {
            if seen.insert(absolute_url.clone()) {
                links.push(absolute_url);
            }
        }
    }

    links
}

/// Extracts one record from a detail page
///
/// Plain fields come first in rule order, followed by the numbered fields of
/// each group.
pub fn extract_fields(
    html: &str,
    fields: &[FieldExtractor],
    groups: &[GroupExtractor],
) -> Record {
    let document = Html::parse_document(html);
    let mut record: Record = fields
        .iter()
        .map(|field| (field.name.clone(), field.evaluate(&document)))
        .collect();

    for group in groups {
        group.extend(&document, &mut record);
    }

    record
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let absolute_url = base_url.join(href).ok()?;
    match absolute_url.scheme() {
        "http" | "https" => Some(absolute_url.to_string()),
        _ => None,
    }
}

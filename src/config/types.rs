use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Sumi-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub listing: ListingConfig,
    #[serde(default)]
    pub record: RecordConfig,
    pub output: OutputConfig,
    #[serde(default, rename = "field")]
    pub fields: Vec<FieldRule>,
    #[serde(default, rename = "group")]
    pub groups: Vec<GroupRule>,
}

/// Crawler pacing and bounds
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Last listing page to visit (inclusive, pages start at 1)
    #[serde(rename = "total-pages")]
    pub total_pages: u32,

    /// Pause after every saved item (milliseconds)
    #[serde(rename = "item-delay", default)]
    pub item_delay: u64,

    /// Wait after a listing page has loaded before reading links (milliseconds)
    #[serde(rename = "listing-settle-delay", default)]
    pub listing_settle_delay: u64,

    /// Wait after a detail page has loaded before reading fields (milliseconds)
    #[serde(rename = "detail-settle-delay", default)]
    pub detail_settle_delay: u64,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout", default = "default_request_timeout")]
    pub request_timeout: u64,
}

impl CrawlerConfig {
    pub fn item_delay(&self) -> Duration {
        Duration::from_millis(self.item_delay)
    }

    pub fn listing_settle_delay(&self) -> Duration {
        Duration::from_millis(self.listing_settle_delay)
    }

    pub fn detail_settle_delay(&self) -> Duration {
        Duration::from_millis(self.detail_settle_delay)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

fn default_request_timeout() -> u64 {
    30
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the User-Agent header value
    ///
    /// Format: `CrawlerName/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Where the listing pages live and how detail links are found on them
#[derive(Debug, Clone, Deserialize)]
pub struct ListingConfig {
    /// Listing URL with a `{page}` placeholder for the page number
    #[serde(rename = "url-template")]
    pub url_template: String,

    /// Origin used to resolve relative detail links
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// CSS selector matching the anchor of every detail link
    #[serde(rename = "link-selector")]
    pub link_selector: String,
}

impl ListingConfig {
    /// Returns the listing URL for a page number
    pub fn page_url(&self, page: u32) -> String {
        self.url_template.replace("{page}", &page.to_string())
    }
}

/// Names of the fields that carry record identity
#[derive(Debug, Clone, Deserialize)]
pub struct RecordConfig {
    /// Field that must be non-empty; a record without it is treated as a block signal
    #[serde(rename = "identity-field", default = "default_identity_field")]
    pub identity_field: String,

    /// Field holding the detail-page identifier, used as the dedup key
    #[serde(rename = "key-field", default = "default_key_field")]
    pub key_field: String,
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            identity_field: default_identity_field(),
            key_field: default_key_field(),
        }
    }
}

fn default_identity_field() -> String {
    "address".to_string()
}

fn default_key_field() -> String {
    "property_url".to_string()
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the record sink (CSV file or SQLite database)
    #[serde(rename = "records-path")]
    pub records_path: String,

    /// Path to the link snapshot JSON file
    #[serde(rename = "links-path")]
    pub links_path: String,

    /// Path to the checkpoint JSON file
    #[serde(rename = "checkpoint-path")]
    pub checkpoint_path: String,

    /// Record sink backend
    #[serde(default)]
    pub format: SinkFormat,
}

/// Record sink backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkFormat {
    #[default]
    Csv,
    Sqlite,
}

/// One extracted field of a detail page
#[derive(Debug, Clone, Deserialize)]
pub struct FieldRule {
    /// Column name in the output
    pub name: String,

    /// CSS selector evaluated against the detail page
    pub selector: String,

    /// Attribute to read instead of the element text
    #[serde(default)]
    pub attribute: Option<String>,

    /// When set, every distinct match is collected and joined with this separator
    #[serde(default)]
    pub join: Option<String>,
}

/// A block that repeats on a detail page, such as one row per listing agent
///
/// Each matching container that yields at least one non-empty value becomes
/// the next number `n`, counting from 1, and fills `<name><n>` for every
/// sub-field rule.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupRule {
    /// CSS selector matching each repeated container
    pub selector: String,

    /// Sub-field rules, evaluated inside one container
    #[serde(rename = "field")]
    pub fields: Vec<FieldRule>,
}

use crate::config::types::{
    Config, CrawlerConfig, FieldRule, GroupRule, ListingConfig, OutputConfig, RecordConfig,
    UserAgentConfig,
};
use crate::crawler::compile_selector;
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_listing_config(&config.listing)?;
    validate_record_config(&config.record)?;
    validate_output_config(&config.output)?;
    validate_fields(&config.fields, &config.record)?;
    validate_groups(&config.groups, &config.fields)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.total_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "total_pages must be >= 1, got {}",
            config.total_pages
        )));
    }

    if config.request_timeout < 1 {
        return Err(ConfigError::Validation(format!(
            "request_timeout must be >= 1s, got {}s",
            config.request_timeout
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates the listing source
fn validate_listing_config(config: &ListingConfig) -> Result<(), ConfigError> {
    if !config.url_template.contains("{page}") {
        return Err(ConfigError::Validation(format!(
            "url_template must contain a {{page}} placeholder, got '{}'",
            config.url_template
        )));
    }

    validate_http_url("url_template", &config.page_url(1))?;
    validate_http_url("base_url", &config.base_url)?;
    validate_selector(&config.link_selector)?;

    Ok(())
}

fn validate_record_config(config: &RecordConfig) -> Result<(), ConfigError> {
    if config.identity_field.is_empty() || config.key_field.is_empty() {
        return Err(ConfigError::Validation(
            "identity_field and key_field cannot be empty".to_string(),
        ));
    }

    if config.identity_field == config.key_field {
        return Err(ConfigError::Validation(format!(
            "identity_field and key_field must differ, both are '{}'",
            config.key_field
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    let paths = [
        ("records_path", &config.records_path),
        ("links_path", &config.links_path),
        ("checkpoint_path", &config.checkpoint_path),
    ];

    for (name, path) in &paths {
        if path.is_empty() {
            return Err(ConfigError::Validation(format!("{} cannot be empty", name)));
        }
    }

    let unique: HashSet<&String> = paths.iter().map(|(_, path)| *path).collect();
    if unique.len() != paths.len() {
        return Err(ConfigError::Validation(
            "records_path, links_path and checkpoint_path must be distinct".to_string(),
        ));
    }

    Ok(())
}

/// Validates the extraction rules
fn validate_fields(fields: &[FieldRule], record: &RecordConfig) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for field in fields {
        validate_rule(field)?;

        // The key column is always the detail-page identifier
        if field.name == record.key_field {
            return Err(ConfigError::Validation(format!(
                "field '{}' is reserved for the detail-page URL",
                field.name
            )));
        }

        if !seen.insert(field.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "field '{}' is defined more than once",
                field.name
            )));
        }
    }

    // Without it every detail page would look like a block
    if !seen.contains(record.identity_field.as_str()) {
        return Err(ConfigError::Validation(format!(
            "no [[field]] rule produces the identity field '{}'",
            record.identity_field
        )));
    }

    Ok(())
}

/// Validates the repeated-group rules against each other and the plain fields
fn validate_groups(groups: &[GroupRule], fields: &[FieldRule]) -> Result<(), ConfigError> {
    let mut prefixes = HashSet::new();

    for group in groups {
        validate_selector(&group.selector)?;

        if group.fields.is_empty() {
            return Err(ConfigError::Validation(format!(
                "group '{}' has no fields",
                group.selector
            )));
        }

        for field in &group.fields {
            validate_rule(field)?;

            if !prefixes.insert(field.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "group field '{}' is defined more than once",
                    field.name
                )));
            }
        }
    }

    // Numbered names must not shadow a plain field
    for field in fields {
        let stem = field.name.trim_end_matches(|c: char| c.is_ascii_digit());
        if stem.len() < field.name.len() && prefixes.contains(stem) {
            return Err(ConfigError::Validation(format!(
                "field '{}' collides with the numbered fields of group field '{}'",
                field.name, stem
            )));
        }
    }

    Ok(())
}

fn validate_rule(field: &FieldRule) -> Result<(), ConfigError> {
    if field.name.is_empty() {
        return Err(ConfigError::Validation(
            "field name cannot be empty".to_string(),
        ));
    }

    validate_selector(&field.selector)
}

fn validate_http_url(name: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", name, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "{} '{}' must use http or https",
            name, value
        )));
    }

    Ok(())
}

fn validate_selector(selector: &str) -> Result<(), ConfigError> {
    compile_selector(selector).map(|_| ())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}

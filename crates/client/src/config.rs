use std::time::Duration;

use url::Url;

/// How many items the service returns per category page.
pub const DEFAULT_PAGE_SIZE: u32 = 50;
/// How many times an asset's processing status is polled before giving up.
pub const DEFAULT_POLL_ATTEMPTS: u32 = 5;
/// Base delay between poll attempts; the n-th wait is `base * n`.
pub const DEFAULT_POLL_BACKOFF: Duration = Duration::from_millis(500);

/// An ordered extension-to-category override.
///
/// Entries are scanned in declaration order when resolving an upload
/// category; the first entry whose extension set contains the candidate
/// extension wins, provided the named category exists on the server.
#[derive(Debug, Clone)]
pub struct CategoryMapping {
    /// Matches a server category by name or by id.
    pub name_or_id: String,
    /// Lowercase file extensions this mapping claims.
    pub extensions: Vec<String>,
}

impl CategoryMapping {
    pub fn new(name_or_id: impl Into<String>, extensions: Vec<String>) -> Self {
        Self {
            name_or_id: name_or_id.into(),
            extensions: extensions
                .into_iter()
                .map(|e| e.to_ascii_lowercase())
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Origin of the asset-management service.
    pub service_url: Url,
    /// Endpoint that mints signed tokens for this client.
    pub token_url: Url,
    /// Workspace the client wants to operate in. Must be authorized by the
    /// token's claims; an unauthorized value is a configuration error, never
    /// silently substituted.
    pub default_workspace: Option<String>,
    /// Ordered extension-to-category overrides. Declaration order is
    /// precedence order.
    pub category_mappings: Vec<CategoryMapping>,
    /// Category listing page size.
    pub page_size: u32,
    /// Maximum processing-status poll attempts.
    pub poll_attempts: u32,
    /// Base delay between poll attempts.
    pub poll_backoff: Duration,
}

impl ServiceConfig {
    pub fn new(service_url: &str, token_url: &str) -> Result<Self, ConfigError> {
        let service_url =
            Url::parse(service_url).map_err(|_| ConfigError::InvalidServiceUrl(service_url.into()))?;
        let token_url =
            Url::parse(token_url).map_err(|_| ConfigError::InvalidTokenUrl(token_url.into()))?;

        if service_url.cannot_be_a_base() {
            return Err(ConfigError::InvalidServiceUrl(service_url.to_string()));
        }

        Ok(Self {
            service_url,
            token_url,
            default_workspace: None,
            category_mappings: Vec::new(),
            page_size: DEFAULT_PAGE_SIZE,
            poll_attempts: DEFAULT_POLL_ATTEMPTS,
            poll_backoff: DEFAULT_POLL_BACKOFF,
        })
    }

    pub fn with_workspace(mut self, workspace: impl Into<String>) -> Self {
        self.default_workspace = Some(workspace.into());
        self
    }

    pub fn with_category_mappings(mut self, mappings: Vec<CategoryMapping>) -> Self {
        self.category_mappings = mappings;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_poll_policy(mut self, attempts: u32, backoff: Duration) -> Self {
        self.poll_attempts = attempts.max(1);
        self.poll_backoff = backoff;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid service URL: {0}")]
    InvalidServiceUrl(String),
    #[error("invalid token URL: {0}")]
    InvalidTokenUrl(String),
    #[error("workspace {0} is not authorized for this token")]
    UnauthorizedWorkspace(String),
}

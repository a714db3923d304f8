use std::collections::HashMap;
use std::sync::Arc;

use reqwest::multipart::{Form, Part};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::assets::{AssetRecord, CategoryPermissions};
use crate::categories::{self, AssetSource, Category, CategoryError, CategoryPage};
use crate::config::{ConfigError, ServiceConfig};
use crate::token::{Token, TokenAuthority, TokenError};
use crate::transport::{progress_body, ProgressSink, Transport, TransportError};
use crate::upload::UploadFile;

/// Query parameter carrying the resolved workspace on category and asset
/// endpoints.
const WORKSPACE_PARAM: &str = "workspaceId";

/// Facade over the asset-management service.
///
/// Owns the token authority and transport; exposes one method per endpoint
/// the service contract defines. Cheap to clone behind an `Arc`.
pub struct AssetClient {
    config: ServiceConfig,
    authority: Arc<TokenAuthority>,
    transport: Transport,
    workspace: Option<String>,
}

impl AssetClient {
    /// Build a client and resolve its workspace up front.
    ///
    /// A configured workspace the token does not authorize fails here, once,
    /// as a configuration error; it is never silently substituted.
    pub async fn connect(config: ServiceConfig) -> Result<Self, ClientError> {
        let authority = Arc::new(TokenAuthority::new(config.token_url.clone())?);
        let transport = Transport::new(authority.clone())?;

        let token = authority.token().await?;
        let workspace = match config.default_workspace.as_deref() {
            Some(preferred) => match token.resolve_workspace(Some(preferred)) {
                Some(ws) => Some(ws),
                None => {
                    return Err(ClientError::Config(ConfigError::UnauthorizedWorkspace(
                        preferred.to_string(),
                    )))
                }
            },
            None => token.resolve_workspace(None),
        };
        tracing::info!(workspace = ?workspace, "asset client connected");

        Ok(Self {
            config,
            authority,
            transport,
            workspace,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn workspace(&self) -> Option<&str> {
        self.workspace.as_deref()
    }

    pub async fn token(&self) -> Result<Arc<Token>, TokenError> {
        self.authority.token().await
    }

    fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        let mut url = self.config.service_url.join(path)?;
        if let Some(workspace) = &self.workspace {
            url.query_pairs_mut().append_pair(WORKSPACE_PARAM, workspace);
        }
        Ok(url)
    }

    /// Fetch one page of the category listing.
    pub async fn category_page(
        &self,
        offset: u32,
        cancel: &CancellationToken,
    ) -> Result<CategoryPage, TransportError> {
        let mut url = self.endpoint("categories")?;
        url.query_pairs_mut()
            .append_pair("limit", &self.config.page_size.to_string())
            .append_pair("offset", &offset.to_string());

        self.transport.send_json(self.transport.get(url), cancel).await
    }

    /// Fetch the complete category listing, page by page.
    ///
    /// Pages are requested sequentially; each depends on a stable
    /// offset/limit contract and the typical total is small. Any page
    /// failure yields `None` rather than a partial list: callers must treat
    /// `None` as "cannot determine categories", not as "empty".
    pub async fn list_categories(&self, cancel: &CancellationToken) -> Option<Vec<Category>> {
        let mut items = Vec::new();
        let mut offset = 0u32;

        loop {
            let page = match self.category_page(offset, cancel).await {
                Ok(page) => page,
                Err(err) => {
                    tracing::warn!(offset, error = %err, "category page fetch failed");
                    return None;
                }
            };

            let total = page.total_count;
            items.extend(page.items);
            offset += self.config.page_size;
            if offset >= total {
                break;
            }
        }

        Some(items)
    }

    /// Resolve the upload category for a file or URL.
    pub async fn resolve_category(
        &self,
        source: AssetSource<'_>,
        cancel: &CancellationToken,
    ) -> Result<String, CategoryError> {
        let candidate_exts = match source {
            AssetSource::FileName(name) => categories::extension_of(name)
                .map(|e| vec![e])
                .unwrap_or_default(),
            AssetSource::Url(url) => {
                let content_type = self.head_content_type(url, cancel).await?;
                categories::extensions_for_mime(&content_type)
            }
        };

        if candidate_exts.is_empty() {
            return Err(CategoryError::Undeterminable);
        }

        let listed = self.list_categories(cancel).await;
        if cancel.is_cancelled() {
            return Err(CategoryError::Aborted);
        }
        let listed = listed.ok_or(CategoryError::Undeterminable)?;

        categories::match_category(&listed, &self.config.category_mappings, &candidate_exts)
    }

    /// HEAD an URL and read back its content type.
    async fn head_content_type(
        &self,
        url: &Url,
        cancel: &CancellationToken,
    ) -> Result<String, CategoryError> {
        let response = self.transport.send(self.transport.head(url.clone()), cancel).await?;
        response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string())
            .ok_or(CategoryError::Undeterminable)
    }

    /// Fetch an asset record, including its processing status.
    pub async fn fetch_asset(
        &self,
        asset_id: &str,
        cancel: &CancellationToken,
    ) -> Result<AssetRecord, TransportError> {
        let url = self.endpoint(&format!("assets/{}", asset_id))?;
        self.transport.send_json(self.transport.get(url), cancel).await
    }

    /// Fetch per-category grants.
    pub async fn fetch_permissions(
        &self,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, CategoryPermissions>, TransportError> {
        let url = self.endpoint("permissions")?;
        self.transport.send_json(self.transport.get(url), cancel).await
    }

    /// Whether the current token may create assets in a category.
    pub async fn can_create_in(
        &self,
        category_id: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, TransportError> {
        let permissions = self.fetch_permissions(cancel).await?;
        Ok(permissions
            .get(category_id)
            .map(|p| p.asset_create)
            .unwrap_or(false))
    }

    /// Multipart `POST /assets` carrying the category id and the file.
    pub(crate) async fn post_asset(
        &self,
        category_id: &str,
        file: UploadFile,
        progress: Option<ProgressSink>,
        cancel: &CancellationToken,
    ) -> Result<AssetRecordWithId, TransportError> {
        let url = self.endpoint("assets")?;

        let total = file.data.len() as u64;
        let body = match progress {
            Some(sink) => progress_body(file.data, sink),
            None => reqwest::Body::from(file.data),
        };

        let mut part = Part::stream_with_length(body, total).file_name(file.name);
        if let Some(content_type) = &file.content_type {
            part = part.mime_str(content_type)?;
        }

        let form = Form::new()
            .text("categoryId", category_id.to_string())
            .part("file", part);

        self.transport
            .send_json(self.transport.post(url).multipart(form), cancel)
            .await
    }
}

impl std::fmt::Debug for AssetClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetClient")
            .field("service_url", &self.config.service_url.as_str())
            .field("workspace", &self.workspace)
            .finish()
    }
}

/// `POST /assets` response: the new asset id plus its URL map and whatever
/// metadata the service already extracted at upload time.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct AssetRecordWithId {
    pub id: String,
    #[serde(rename = "imageUrls", default)]
    pub image_urls: Option<crate::assets::ImageUrls>,
    #[serde(default)]
    pub metadata: Option<crate::assets::AssetMetadata>,
    #[serde(default)]
    pub placeholder: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use url::Url;

use client::assets::{ProcessingStatus, ResponsiveImage};
use client::categories::{AssetSource, CategoryError};
use client::client::AssetClient;
use client::transport::TransportError;

use crate::surface::EditOptions;

/// What the coordinator knows about the node an edit was requested for.
#[derive(Debug, Clone, Default)]
pub struct EditTarget {
    /// Stored asset id, when the node was produced by the service before.
    pub asset_id: Option<String>,
    /// The node's current image source URL.
    pub src: Option<String>,
}

/// The raw asset the external editor reports on save, before server-side
/// processing completes.
#[derive(Debug, Clone)]
pub struct SavedAsset {
    pub id: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// A fully processed asset, ready to be applied to the document.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedAsset {
    pub id: String,
    pub image: Option<ResponsiveImage>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// One processing-status observation.
#[derive(Debug, Clone, PartialEq)]
pub enum AssetPoll {
    /// Queued or missing status: retryable, not a failure.
    Pending,
    Ready(ProcessedAsset),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("request aborted")]
    Aborted,
    #[error("the server reported the asset's processing as failed")]
    ProcessingFailed,
    /// Unexpected internal failure (a panic in the poll loop); logged,
    /// never surfaced to the user as a second warning.
    #[error("internal error while waiting for the asset")]
    Internal,
    #[error("{0}")]
    Fatal(String),
}

/// What the edit session needs from the asset service.
#[async_trait]
pub trait AssetBackend: Send + Sync + 'static {
    /// Resolve the options the external editor is opened with. Fetches a
    /// token, and resolves an upload category unless the target already
    /// carries a stored asset id.
    async fn prepare(
        &self,
        target: &EditTarget,
        cancel: &CancellationToken,
    ) -> Result<EditOptions, BackendError>;

    /// One status poll for an asset under processing.
    async fn poll_asset(
        &self,
        asset_id: &str,
        cancel: &CancellationToken,
    ) -> Result<AssetPoll, BackendError>;
}

#[async_trait]
impl AssetBackend for AssetClient {
    async fn prepare(
        &self,
        target: &EditTarget,
        cancel: &CancellationToken,
    ) -> Result<EditOptions, BackendError> {
        let token = self
            .token()
            .await
            .map_err(|err| BackendError::Fatal(err.to_string()))?;

        // A node already managed by the service skips category resolution.
        if let Some(asset_id) = &target.asset_id {
            return Ok(EditOptions {
                token: token.raw().to_string(),
                asset_id: Some(asset_id.clone()),
                category_id: None,
                image_url: target.src.clone(),
            });
        }

        let src = target.src.as_ref().ok_or_else(|| {
            BackendError::Fatal("edit target carries neither an asset id nor a source URL".into())
        })?;
        let url = Url::parse(src)
            .map_err(|err| BackendError::Fatal(format!("invalid image URL {}: {}", src, err)))?;

        let category_id = self
            .resolve_category(AssetSource::Url(&url), cancel)
            .await
            .map_err(|err| match err {
                CategoryError::Aborted => BackendError::Aborted,
                other => BackendError::Fatal(other.to_string()),
            })?;

        Ok(EditOptions {
            token: token.raw().to_string(),
            asset_id: None,
            category_id: Some(category_id),
            image_url: Some(src.clone()),
        })
    }

    async fn poll_asset(
        &self,
        asset_id: &str,
        cancel: &CancellationToken,
    ) -> Result<AssetPoll, BackendError> {
        let record = self
            .fetch_asset(asset_id, cancel)
            .await
            .map_err(|err| match err {
                TransportError::Aborted => BackendError::Aborted,
                other => BackendError::Fatal(other.to_string()),
            })?;

        match record.processing_status() {
            None | Some(ProcessingStatus::Queued) => Ok(AssetPoll::Pending),
            Some(ProcessingStatus::Error) => Err(BackendError::ProcessingFailed),
            Some(ProcessingStatus::Success) => {
                let metadata = record.metadata.as_ref();
                Ok(AssetPoll::Ready(ProcessedAsset {
                    id: asset_id.to_string(),
                    image: record.image_urls.as_ref().and_then(ResponsiveImage::from_urls),
                    width: metadata.and_then(|m| m.width),
                    height: metadata.and_then(|m| m.height),
                }))
            }
        }
    }
}

use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::assets::{AssetDescriptor, AssetKind, ResponsiveImage};
use crate::categories::{AssetSource, CategoryError};
use crate::client::{AssetClient, AssetRecordWithId};
use crate::transport::{ProgressSink, TransportError};

/// A file handed to an upload session.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub data: Bytes,
    pub content_type: Option<String>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let name = name.into();
        let content_type = mime_guess::from_path(&name).first().map(|m| m.to_string());
        Self {
            name,
            data: data.into(),
            content_type,
        }
    }
}

/// Drives a single file upload: category resolution, multipart POST, and
/// mapping the response into a responsive-image descriptor.
///
/// One session per user-initiated upload; it settles exactly once (success,
/// failure, or abort) and is not reusable.
pub struct UploadSession {
    client: Arc<AssetClient>,
    cancel: CancellationToken,
}

impl UploadSession {
    pub fn new(client: Arc<AssetClient>) -> Self {
        Self {
            client,
            cancel: CancellationToken::new(),
        }
    }

    /// Cancel the session's shared signal. Outstanding network calls observe
    /// it cooperatively and settle as aborted.
    pub fn abort(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub async fn upload(
        &self,
        file: UploadFile,
        progress: Option<ProgressSink>,
    ) -> Result<AssetDescriptor, UploadError> {
        let category = self
            .client
            .resolve_category(AssetSource::FileName(&file.name), &self.cancel)
            .await
            .map_err(|err| match err {
                CategoryError::Aborted => UploadError::Aborted,
                other => {
                    // The raw transport error is a diagnostic, not a user
                    // message; the POST is never attempted.
                    tracing::warn!(file = %file.name, error = %other, "category resolution failed");
                    UploadError::CannotDetermineCategory
                }
            })?;

        let response = self
            .client
            .post_asset(&category, file, progress, &self.cancel)
            .await?;

        Ok(descriptor_from(response))
    }
}

/// Map the server's per-width URL map into a responsive-image descriptor.
fn descriptor_from(response: AssetRecordWithId) -> AssetDescriptor {
    let image = response
        .image_urls
        .as_ref()
        .and_then(ResponsiveImage::from_urls);
    let kind = if image.is_some() {
        AssetKind::Image
    } else {
        AssetKind::Link
    };

    AssetDescriptor {
        id: response.id,
        kind,
        image,
        width: response.metadata.as_ref().and_then(|m| m.width),
        height: response.metadata.as_ref().and_then(|m| m.height),
        placeholder: response.placeholder,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("cannot determine a category to upload into")]
    CannotDetermineCategory,
    #[error("upload aborted")]
    Aborted,
    #[error(transparent)]
    Transport(TransportError),
}

impl From<TransportError> for UploadError {
    fn from(err: TransportError) -> Self {
        match err {
            // An already-aborted session is not a new error.
            TransportError::Aborted => UploadError::Aborted,
            other => UploadError::Transport(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::ImageUrls;
    use std::collections::BTreeMap;

    #[test]
    fn test_descriptor_mapping() {
        let mut sized = BTreeMap::new();
        sized.insert(200u32, "https://cdn.test/x-200.webp".to_string());
        let response = AssetRecordWithId {
            id: "asset-1".to_string(),
            image_urls: Some(ImageUrls {
                default_url: Some("https://cdn.test/x.png".to_string()),
                sized,
            }),
            metadata: None,
            placeholder: None,
        };

        let descriptor = descriptor_from(response);
        assert_eq!(descriptor.kind, AssetKind::Image);
        assert!(descriptor.width.is_none());
        let image = descriptor.image.unwrap();
        assert_eq!(image.fallback_url, "https://cdn.test/x.png");
        assert_eq!(image.srcset.as_deref(), Some("https://cdn.test/x-200.webp 200w"));
    }

    #[test]
    fn test_descriptor_without_urls_is_link() {
        let response = AssetRecordWithId {
            id: "asset-2".to_string(),
            image_urls: None,
            metadata: None,
            placeholder: None,
        };
        let descriptor = descriptor_from(response);
        assert_eq!(descriptor.kind, AssetKind::Link);
        assert!(descriptor.image.is_none());
    }

    #[test]
    fn test_upload_file_guesses_content_type() {
        let file = UploadFile::new("photo.jpg", vec![1u8, 2, 3]);
        assert_eq!(file.content_type.as_deref(), Some("image/jpeg"));
    }
}

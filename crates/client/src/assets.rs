use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};

/// Server-side processing state of an asset's derived metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Queued,
    Success,
    Error,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetMetadata {
    #[serde(rename = "metadataProcessingStatus", default)]
    pub processing_status: Option<ProcessingStatus>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

/// `GET /assets/{id}` response.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetRecord {
    #[serde(default)]
    pub metadata: Option<AssetMetadata>,
    #[serde(rename = "imageUrls", default)]
    pub image_urls: Option<ImageUrls>,
}

impl AssetRecord {
    /// A missing status reads the same as `queued`: the asset exists but the
    /// server has not finished processing it yet.
    pub fn processing_status(&self) -> Option<ProcessingStatus> {
        self.metadata.as_ref().and_then(|m| m.processing_status)
    }
}

/// The server's per-width URL map: numeric keys are rendition widths, the
/// `default` key is the fallback URL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageUrls {
    pub default_url: Option<String>,
    pub sized: BTreeMap<u32, String>,
}

impl<'de> Deserialize<'de> for ImageUrls {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: BTreeMap<String, String> = BTreeMap::deserialize(deserializer)?;
        let mut urls = ImageUrls::default();
        for (key, url) in raw {
            if key == "default" {
                urls.default_url = Some(url);
            } else if let Ok(width) = key.parse::<u32>() {
                urls.sized.insert(width, url);
            }
            // Unknown non-numeric keys are ignored rather than rejected.
        }
        Ok(urls)
    }
}

/// One `<picture>`-style responsive source derived from an URL map.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponsiveImage {
    /// The `default` URL, used as the plain `src` fallback.
    pub fallback_url: String,
    /// All `<url> <width>w` entries joined, ascending by width.
    pub srcset: Option<String>,
    /// `(max-width: <max>px) 100vw, <max>px` for the largest width.
    pub sizes: Option<String>,
    pub max_width: Option<u32>,
}

impl ResponsiveImage {
    pub fn from_urls(urls: &ImageUrls) -> Option<Self> {
        let fallback_url = urls.default_url.clone()?;

        if urls.sized.is_empty() {
            return Some(Self {
                fallback_url,
                srcset: None,
                sizes: None,
                max_width: None,
            });
        }

        let srcset = urls
            .sized
            .iter()
            .map(|(width, url)| format!("{} {}w", url, width))
            .collect::<Vec<_>>()
            .join(", ");
        // BTreeMap iteration is ascending, so the last key is the max.
        let max_width = urls.sized.keys().next_back().copied();
        let sizes = max_width.map(|max| format!("(max-width: {max}px) 100vw, {max}px"));

        Some(Self {
            fallback_url,
            srcset: Some(srcset),
            sizes,
            max_width,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Image,
    Link,
}

/// What an upload or a completed edit hands to the document layer.
///
/// Immutable once created; the document layer consumes it to annotate
/// content nodes with server-side asset identifiers.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetDescriptor {
    pub id: String,
    pub kind: AssetKind,
    pub image: Option<ResponsiveImage>,
    /// Intrinsic dimensions, when the service already extracted them.
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Inline low-resolution preview (a data URL), when the service ships one.
    pub placeholder: Option<String>,
}

/// Per-category grants from `GET /permissions`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryPermissions {
    #[serde(rename = "asset:create", default)]
    pub asset_create: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(json: serde_json::Value) -> ImageUrls {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_image_urls_split_numeric_and_default() {
        let urls = urls(serde_json::json!({
            "120": "https://cdn.test/a-120.webp",
            "600": "https://cdn.test/a-600.webp",
            "default": "https://cdn.test/a.png",
        }));
        assert_eq!(urls.default_url.as_deref(), Some("https://cdn.test/a.png"));
        assert_eq!(urls.sized.len(), 2);
    }

    #[test]
    fn test_responsive_mapping() {
        let urls = urls(serde_json::json!({
            "400": "https://cdn.test/a-400.webp",
            "120": "https://cdn.test/a-120.webp",
            "default": "https://cdn.test/a.png",
        }));
        let image = ResponsiveImage::from_urls(&urls).unwrap();

        assert_eq!(image.fallback_url, "https://cdn.test/a.png");
        assert_eq!(
            image.srcset.as_deref(),
            Some("https://cdn.test/a-120.webp 120w, https://cdn.test/a-400.webp 400w")
        );
        assert_eq!(
            image.sizes.as_deref(),
            Some("(max-width: 400px) 100vw, 400px")
        );
        assert_eq!(image.max_width, Some(400));
    }

    #[test]
    fn test_responsive_mapping_without_default_is_none() {
        let urls = urls(serde_json::json!({ "120": "https://cdn.test/a-120.webp" }));
        assert!(ResponsiveImage::from_urls(&urls).is_none());
    }

    #[test]
    fn test_missing_status_reads_as_unprocessed() {
        let record: AssetRecord = serde_json::from_value(serde_json::json!({
            "metadata": {}
        }))
        .unwrap();
        assert_eq!(record.processing_status(), None);

        let record: AssetRecord = serde_json::from_value(serde_json::json!({
            "metadata": { "metadataProcessingStatus": "success", "width": 800, "height": 600 }
        }))
        .unwrap();
        assert_eq!(record.processing_status(), Some(ProcessingStatus::Success));
    }
}

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::CategoryMapping;
use crate::transport::TransportError;

/// A server-side bucket constraining which file extensions may be uploaded
/// into it. Fetched on demand, never mutated; identity by `id`, also
/// matchable by `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(rename = "allowedExtensions", default)]
    pub extensions: Vec<String>,
}

impl Category {
    pub fn accepts_extension(&self, ext: &str) -> bool {
        self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }
}

/// One page of the category listing.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryPage {
    pub items: Vec<Category>,
    pub offset: u32,
    pub limit: u32,
    #[serde(rename = "totalCount")]
    pub total_count: u32,
}

/// What a category is being resolved for: a named file, or a bare URL whose
/// kind has to be sniffed from a HEAD content-type lookup.
#[derive(Debug, Clone, Copy)]
pub enum AssetSource<'a> {
    FileName(&'a str),
    Url(&'a Url),
}

#[derive(Debug, thiserror::Error)]
pub enum CategoryError {
    #[error("cannot determine a category for the asset")]
    Undeterminable,
    #[error("configured category {0} does not exist on the server")]
    MissingConfigured(String),
    #[error("request aborted")]
    Aborted,
    #[error(transparent)]
    Transport(TransportError),
}

impl From<TransportError> for CategoryError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Aborted => CategoryError::Aborted,
            other => CategoryError::Transport(other),
        }
    }
}

/// Lowercase extension of a filename, if it has one.
pub fn extension_of(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Candidate extensions for a MIME type, via the shared MIME table.
pub fn extensions_for_mime(content_type: &str) -> Vec<String> {
    // Strip parameters like `; charset=utf-8` before the table lookup.
    let essence = content_type.split(';').next().unwrap_or("").trim();
    mime_guess::get_mime_extensions_str(essence)
        .map(|exts| exts.iter().map(|e| e.to_ascii_lowercase()).collect())
        .unwrap_or_default()
}

/// Match candidate extensions against the fetched categories.
///
/// Configured mappings take precedence, scanned in declaration order; a
/// mapping that claims the extension but names a category absent from the
/// server is a hard failure, never a silent fall-through. Without a mapping
/// hit, server categories are scanned in listing order.
pub fn match_category(
    categories: &[Category],
    mappings: &[CategoryMapping],
    candidate_exts: &[String],
) -> Result<String, CategoryError> {
    if candidate_exts.is_empty() {
        return Err(CategoryError::Undeterminable);
    }

    for mapping in mappings {
        let claimed = candidate_exts
            .iter()
            .any(|ext| mapping.extensions.iter().any(|m| m.eq_ignore_ascii_case(ext)));
        if !claimed {
            continue;
        }

        return categories
            .iter()
            .find(|c| c.id == mapping.name_or_id || c.name == mapping.name_or_id)
            .map(|c| c.id.clone())
            .ok_or_else(|| CategoryError::MissingConfigured(mapping.name_or_id.clone()));
    }

    for category in categories {
        if candidate_exts.iter().any(|ext| category.accepts_extension(ext)) {
            return Ok(category.id.clone());
        }
    }

    Err(CategoryError::Undeterminable)
}

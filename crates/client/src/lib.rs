/**
 * Asset records, processing status, and the mapping
 *  from server-side image URL maps to responsive
 *  image descriptors.
 */
pub mod assets;
/**
 * Category listing (paginated) and the precedence
 *  rules for matching a file or URL to an upload
 *  category.
 */
pub mod categories;
/**
 * The service client facade. Owns the token authority
 *  and transport and exposes one method per endpoint.
 */
pub mod client;
/**
 * Service configuration and validation.
 */
pub mod config;
/**
 * Authenticated, cancellable HTTP transport.
 */
pub mod transport;
/**
 * Signed-token handling: refresh, claims, and
 *  workspace resolution.
 */
pub mod token;
/**
 * Single-file upload sessions: category resolution,
 *  multipart POST, progress relay.
 */
pub mod upload;

pub mod prelude {
    pub use crate::assets::{AssetDescriptor, AssetKind, ProcessingStatus, ResponsiveImage};
    pub use crate::categories::{AssetSource, Category, CategoryError};
    pub use crate::client::{AssetClient, ClientError};
    pub use crate::config::{CategoryMapping, ConfigError, ServiceConfig};
    pub use crate::token::{Token, TokenAuthority, TokenError};
    pub use crate::transport::{ProgressSink, Transport, TransportError, UploadProgress};
    pub use crate::upload::{UploadError, UploadFile, UploadSession};
}

/// Everything the external editing surface needs to open an asset.
///
/// Either the stored asset id (for assets already managed by the service)
/// or a resolved upload category plus the image URL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditOptions {
    /// Raw signed token the surface authenticates with.
    pub token: String,
    /// Stored asset id, when the node already carries one.
    pub asset_id: Option<String>,
    /// Upload category resolved for the image, when no asset id exists.
    pub category_id: Option<String>,
    /// Source URL of the image being edited.
    pub image_url: Option<String>,
}

/// The external editing surface (dialog) as the coordinator sees it.
///
/// `mount`/`unmount` must be idempotent from the host's perspective: the
/// coordinator guarantees at most one surface is mounted at a time. The
/// host calls back into the coordinator (`saved`/`close`) when the user
/// finishes.
pub trait EditorSurface: Send + Sync + 'static {
    fn mount(&self, options: EditOptions);
    fn unmount(&self);
    /// Post-close UI refresh, run after a short settle delay.
    fn refresh(&self);
}

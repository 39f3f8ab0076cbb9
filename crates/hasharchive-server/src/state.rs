use hasharchive_core::ArchiveService;
use hasharchive_db::ArchiveDb;

/// Shared application state, available to all route handlers via `State<Arc<AppState>>`.
pub struct AppState {
    pub archive: ArchiveService<ArchiveDb>,
    /// Bearer token for queue endpoints (None = queue endpoints disabled).
    pub admin_token: Option<String>,
}

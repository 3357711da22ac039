use crate::config::AppConfig;
use crate::db::DbPool;

/// Shared across every request handler. The pool is the only live
/// resource; config is a static snapshot taken at startup.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: AppConfig,
}

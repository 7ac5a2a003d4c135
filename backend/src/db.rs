use diesel::pg::PgConnection;
use diesel::prelude::*;
use tracing::error;

/// Opens a connection for the current request. The URL comes from the
/// injected [`crate::config::AppConfig`], never from ambient environment
/// lookups.
pub fn connect(database_url: &str) -> Result<PgConnection, ConnectionError> {
    PgConnection::establish(database_url).map_err(|e| {
        error!("failed to establish database connection: {}", e);
        e
    })
}

//! URI-based sled driver.

use std::sync::Arc;

use dashmap::DashMap;
use sbase_core::{Connection, ConnectionOptions, DriverError, ErrorCallback, StorageDriver};
use sled::Db;
use tracing::{debug, warn};

use crate::connection::SledConnection;

/// In-memory database scheme. Each distinct URI is its own temporary database.
pub const MEMORY_SCHEME: &str = "mem://";

/// On-disk database scheme. The rest of the URI is the database path.
pub const SLED_SCHEME: &str = "sled://";

/// Option: sled page cache size in bytes.
pub const CACHE_CAPACITY: &str = "cacheCapacity";

/// Option: compress stored pages.
pub const COMPRESSION: &str = "compression";

/// Option: background flush interval in milliseconds.
pub const FLUSH_EVERY_MS: &str = "flushEveryMs";

/// Opens sled databases by URI.
///
/// Connections to the same URI share one database handle.
#[derive(Default)]
pub struct SledDriver {
    databases: DashMap<String, Db>,
}

impl SledDriver {
    /// Create a driver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open databases.
    pub fn open_databases(&self) -> usize {
        self.databases.len()
    }

    fn open(&self, uri: &str, options: &ConnectionOptions) -> Result<Db, DriverError> {
        if let Some(db) = self.databases.get(uri) {
            return Ok(db.clone());
        }

        let mut config = sled::Config::new();
        if uri.starts_with(MEMORY_SCHEME) {
            config = config.temporary(true);
        } else if let Some(path) = uri.strip_prefix(SLED_SCHEME) {
            config = config.path(path);
        } else {
            return Err(DriverError::Connection {
                uri: uri.to_string(),
                message: format!("unsupported scheme, expected `{MEMORY_SCHEME}` or `{SLED_SCHEME}`"),
            });
        }

        if let Some(capacity) = options.get(CACHE_CAPACITY).and_then(|v| v.as_u64()) {
            config = config.cache_capacity(capacity);
        }
        if let Some(compression) = options.get(COMPRESSION).and_then(|v| v.as_bool()) {
            config = config.use_compression(compression);
        }
        if let Some(ms) = options.get(FLUSH_EVERY_MS).and_then(|v| v.as_u64()) {
            config = config.flush_every_ms(Some(ms));
        }

        let db = config.open().map_err(|e| DriverError::Connection {
            uri: uri.to_string(),
            message: e.to_string(),
        })?;
        debug!(uri = %uri, "opened sled database");

        Ok(self
            .databases
            .entry(uri.to_string())
            .or_insert(db)
            .clone())
    }
}

impl StorageDriver for SledDriver {
    fn connect(
        &self,
        uri: &str,
        options: &ConnectionOptions,
        on_error: ErrorCallback,
    ) -> Arc<dyn Connection> {
        match self.open(uri, options) {
            Ok(db) => Arc::new(SledConnection::open(uri, db, options.clone())),
            Err(err) => {
                warn!(uri = %uri, error = %err, "connection failed");
                on_error(&err);
                Arc::new(SledConnection::disconnected(uri))
            }
        }
    }
}

impl std::fmt::Debug for SledDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledDriver")
            .field("databases", &self.databases.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use sbase_core::Fields;

    #[test]
    fn test_memory_uris_share_database() {
        let driver = SledDriver::new();
        let noop: ErrorCallback = Arc::new(|_| {});
        let a = driver.connect("mem://main", &Fields::new(), noop.clone());
        let b = driver.connect("mem://main", &Fields::new(), noop.clone());
        let c = driver.connect("mem://other", &Fields::new(), noop);

        assert!(a.is_connected() && b.is_connected() && c.is_connected());
        assert_eq!(driver.open_databases(), 2);
    }

    #[test]
    fn test_on_disk_database() {
        let dir = tempfile::tempdir().unwrap();
        let uri = format!("{SLED_SCHEME}{}", dir.path().display());
        let driver = SledDriver::new();
        let conn = driver.connect(&uri, &Fields::new(), Arc::new(|_| {}));
        assert!(conn.is_connected());
        assert_eq!(conn.uri(), uri);
    }

    #[test]
    fn test_failed_connect_reports_error() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let driver = SledDriver::new();
        let conn = driver.connect(
            "postgres://nope",
            &Fields::new(),
            Arc::new(move |err| sink.lock().push(err.to_string())),
        );

        assert!(!conn.is_connected());
        assert_eq!(seen.lock().len(), 1);
        assert!(seen.lock()[0].contains("postgres://nope"));
    }
}

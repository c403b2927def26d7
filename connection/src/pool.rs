//! Named connection pool: one live [`Connection`] per configured source or
//! target, reopened on demand after a disconnect or an out-of-sync server
//! response.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use common::config::ConnectionSpec;
use common::row::Row;
use common::value::Value;
use common::{CdcError, CdcResult};

use crate::conn::{Connection, MasterStatus};

struct Entry {
    spec: ConnectionSpec,
    conn: Connection,
}

/// All named connections share a single mutex (§4.4) rather than one lock
/// per entry: CDC throughput is bound by the upstream binlog stream and by
/// batch round-trips, not by intra-process contention on this map, so
/// per-connection locking buys nothing but complexity.
pub struct ConnectionPool {
    connections: Mutex<HashMap<String, Entry>>,
    reconnections: AtomicU64,
}

impl ConnectionPool {
    pub fn new() -> Self {
        ConnectionPool { connections: Mutex::new(HashMap::new()), reconnections: AtomicU64::new(0) }
    }

    pub fn open(&self, name: &str, spec: &ConnectionSpec) -> CdcResult<()> {
        let conn = Connection::open(spec)?;
        self.connections.lock().unwrap().insert(name.to_string(), Entry { spec: spec.clone(), conn });
        Ok(())
    }

    /// Number of times a pooled connection has been transparently replaced
    /// after an `OutOfSync` (MySQL error 2014) response or a failed health
    /// check.
    pub fn database_reconnections(&self) -> u64 {
        self.reconnections.load(Ordering::Relaxed)
    }

    /// Runs `f` against the named connection. On `CdcError::OutOfSync`
    /// (caused by reading a streaming/multi-result response out of order)
    /// the connection is dropped, reopened, and `f` is retried exactly
    /// once against the fresh connection.
    pub fn with_connection<T>(&self, name: &str, f: impl Fn(&mut Connection) -> CdcResult<T>) -> CdcResult<T> {
        let mut guard = self.connections.lock().unwrap();
        let entry = guard
            .get_mut(name)
            .ok_or_else(|| CdcError::Connect(format!("no pooled connection named '{name}'")))?;

        match f(&mut entry.conn) {
            Ok(value) => Ok(value),
            Err(CdcError::OutOfSync) => {
                let spec = entry.spec.clone();
                entry.conn = Connection::open(&spec)?;
                self.reconnections.fetch_add(1, Ordering::Relaxed);
                f(&mut entry.conn)
            }
            Err(other) => Err(other),
        }
    }

    pub fn healthy(&self, name: &str) -> bool {
        self.with_connection(name, |conn| conn.ping()).is_ok()
    }

    /// Reopens the named connection if it fails a health check. A no-op
    /// when the connection is already healthy.
    pub fn reconnect_if_needed(&self, name: &str) -> CdcResult<()> {
        if self.healthy(name) {
            return Ok(());
        }
        let spec = {
            let guard = self.connections.lock().unwrap();
            guard.get(name).map(|e| e.spec.clone())
        };
        let spec = spec.ok_or_else(|| CdcError::Connect(format!("no pooled connection named '{name}'")))?;
        let fresh = Connection::open(&spec)?;
        self.connections.lock().unwrap().insert(name.to_string(), Entry { spec, conn: fresh });
        self.reconnections.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn execute(&self, name: &str, sql: &str, values: &[Value]) -> CdcResult<u64> {
        self.with_connection(name, |conn| conn.execute(sql, values))
    }

    /// Runs each statement against the same connection in order, stopping
    /// at the first failure. No transaction is opened — batches are a
    /// client-side grouping for fewer round-trips, not an atomicity
    /// boundary (§4.8 accepts partial batch application on retry).
    pub fn batch_execute(&self, name: &str, statements: &[(String, Vec<Value>)]) -> CdcResult<u64> {
        self.with_connection(name, |conn| {
            let mut total = 0u64;
            for (sql, values) in statements {
                total += conn.execute(sql, values)?;
            }
            Ok(total)
        })
    }

    pub fn query(&self, name: &str, sql: &str) -> CdcResult<Vec<Row>> {
        self.with_connection(name, |conn| conn.query(sql))
    }

    pub fn master_status(&self, name: &str) -> CdcResult<MasterStatus> {
        self.with_connection(name, |conn| conn.master_status())
    }

    pub fn is_table_empty(&self, name: &str, qualified_name: &str) -> bool {
        self.with_connection(name, |conn| Ok(conn.is_table_empty(qualified_name))).unwrap_or(false)
    }

    pub fn paginate(&self, name: &str, query: &str, page_size: usize, offset: usize) -> CdcResult<(Vec<Row>, bool)> {
        self.with_connection(name, |conn| conn.paginate(query, page_size, offset))
    }

    pub fn count_estimate(&self, name: &str, query: &str) -> i64 {
        self.with_connection(name, |conn| Ok(conn.count_estimate(query))).unwrap_or(-1)
    }
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_connection_is_a_connect_error() {
        let pool = ConnectionPool::new();
        let result = pool.with_connection("missing", |conn| conn.ping());
        assert!(matches!(result, Err(CdcError::Connect(_))));
    }

    #[test]
    fn starts_with_zero_reconnections() {
        let pool = ConnectionPool::new();
        assert_eq!(pool.database_reconnections(), 0);
    }
}

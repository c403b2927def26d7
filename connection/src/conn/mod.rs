pub mod handshake;
pub mod resultset;
pub mod binlog_stream;

use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use common::config::ConnectionSpec;
use common::row::Row;
use common::{CdcError, CdcResult};

use crate::commands::{self, COM_PING, COM_QUIT};
use crate::literal;
use crate::packet::PacketChannel;
use resultset::{OkPacket, QueryResponse};

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const IO_TIMEOUT: Duration = Duration::from_secs(30);
const WAIT_TIMEOUT_SECONDS: u64 = 28_800;

/// A single, unshared MySQL client connection speaking `mysql_native_password`
/// authentication over plain TCP. Serialization across threads is the
/// caller's (pool's) responsibility — this type is `!Sync` by convention
/// even though nothing here enforces it at the type level.
pub struct Connection {
    channel: PacketChannel<TcpStream>,
    pub server_version: String,
}

impl Connection {
    /// Opens and authenticates a connection per §4.4: `connect_timeout=10s`,
    /// `read/write_timeout=30s`, autocommit ON, session `wait_timeout=28800`.
    pub fn open(spec: &ConnectionSpec) -> CdcResult<Self> {
        let addr = format!("{}:{}", spec.host, spec.port);
        let socket_addr = addr
            .to_socket_addrs()
            .map_err(|e| CdcError::Connect(format!("invalid address {addr}: {e}")))?
            .next()
            .ok_or_else(|| CdcError::Connect(format!("could not resolve {addr}")))?;
        let stream = TcpStream::connect_timeout(&socket_addr, CONNECT_TIMEOUT)
            .map_err(|e| CdcError::Connect(format!("connect to {addr} failed: {e}")))?;
        stream.set_read_timeout(Some(IO_TIMEOUT))?;
        stream.set_write_timeout(Some(IO_TIMEOUT))?;
        stream.set_nodelay(true).ok();

        let mut channel = PacketChannel::new(stream);
        let handshake_payload = channel.read_packet()?;
        let handshake = handshake::HandshakePacket::parse(&handshake_payload)?;

        let response = handshake::build_response(&handshake, &spec.user, &spec.password, &spec.database, 0x21)?;
        channel.write_packet(&response)?;

        let reply = channel.read_packet()?;
        match reply.first().copied() {
            Some(crate::packet::OK_PACKET_MARKER) => {}
            Some(crate::packet::ERR_PACKET_MARKER) => {
                let err = resultset::ErrPacket::parse(&reply)?;
                return Err(CdcError::Connect(format!("authentication failed: {}", err.message)));
            }
            _ => return Err(CdcError::Connect("unexpected authentication reply".into())),
        }

        let mut conn = Connection { channel, server_version: handshake.server_version };
        conn.execute_raw(&format!("SET autocommit=1, wait_timeout={WAIT_TIMEOUT_SECONDS}"))?;
        Ok(conn)
    }

    fn send_command(&mut self, payload: &[u8]) -> CdcResult<()> {
        self.channel.reset_sequence();
        self.channel.write_packet(payload)
    }

    fn next_packet(&mut self) -> CdcResult<Vec<u8>> {
        self.channel.read_packet()
    }

    /// Runs `sql` with `values` inlined as escaped literals (§4.4
    /// `execute`) and returns the affected row count.
    pub fn execute(&mut self, sql: &str, values: &[common::value::Value]) -> CdcResult<u64> {
        let rendered = literal::render(sql, values);
        match self.run_query(&rendered)? {
            QueryResponse::Ok(ok) => Ok(ok.affected_rows),
            QueryResponse::Rows(rows) => Ok(rows.len() as u64),
        }
    }

    fn execute_raw(&mut self, sql: &str) -> CdcResult<OkPacket> {
        match self.run_query(sql)? {
            QueryResponse::Ok(ok) => Ok(ok),
            QueryResponse::Rows(_) => Ok(OkPacket::default()),
        }
    }

    pub fn query(&mut self, sql: &str) -> CdcResult<Vec<Row>> {
        match self.run_query(sql)? {
            QueryResponse::Rows(rows) => Ok(rows),
            QueryResponse::Ok(_) => Ok(Vec::new()),
        }
    }

    fn run_query(&mut self, sql: &str) -> CdcResult<QueryResponse> {
        self.send_command(&commands::query_command::build(sql))?;
        resultset::read_query_response(|| self.next_packet())
    }

    pub fn ping(&mut self) -> CdcResult<()> {
        self.send_command(&[COM_PING])?;
        let reply = self.next_packet()?;
        match reply.first().copied() {
            Some(crate::packet::OK_PACKET_MARKER) => Ok(()),
            _ => Err(CdcError::Transport("ping failed".into())),
        }
    }

    pub fn close(mut self) {
        let _ = self.send_command(&[COM_QUIT]);
    }

    /// `SHOW MASTER STATUS` → `(file, position, do_db, ignore_db, gtid_set)`.
    pub fn master_status(&mut self) -> CdcResult<MasterStatus> {
        let rows = self.query("SHOW MASTER STATUS")?;
        let row = rows.into_iter().next().ok_or_else(|| {
            CdcError::Connect("SHOW MASTER STATUS returned no rows (is binary logging enabled?)".into())
        })?;
        Ok(MasterStatus {
            file: row.get("File").as_str().unwrap_or_default().to_string(),
            position: row.get("Position").as_str().and_then(|s| s.parse().ok()).unwrap_or(0),
            do_db: non_empty(row.get("Binlog_Do_DB")),
            ignore_db: non_empty(row.get("Binlog_Ignore_DB")),
            gtid_set: non_empty(row.get("Executed_Gtid_Set")),
        })
    }

    pub fn is_table_empty(&mut self, qualified_name: &str) -> bool {
        match self.query(&format!("SELECT COUNT(*) AS c FROM {qualified_name}")) {
            Ok(rows) => rows
                .first()
                .and_then(|r| r.get("c").as_str().and_then(|s| s.parse::<i64>().ok()))
                .map(|c| c == 0)
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    /// `query LIMIT page_size OFFSET offset`, eagerly drained. `has_more`
    /// is `rows.len() == page_size`.
    pub fn paginate(&mut self, query: &str, page_size: usize, offset: usize) -> CdcResult<(Vec<Row>, bool)> {
        let paged = format!("{query} LIMIT {page_size} OFFSET {offset}");
        let rows = self.query(&paged)?;
        let has_more = rows.len() == page_size;
        Ok((rows, has_more))
    }

    /// Rewrites `SELECT ... FROM ...` to `SELECT COUNT(*) FROM ...`,
    /// stripping a trailing `ORDER BY`. Returns -1 on failure.
    pub fn count_estimate(&mut self, query: &str) -> i64 {
        let Some(rewritten) = rewrite_as_count(query) else { return -1 };
        match self.query(&rewritten) {
            Ok(rows) => rows
                .first()
                .and_then(|r| r.get("c").as_str().and_then(|s| s.parse::<i64>().ok()))
                .unwrap_or(-1),
            Err(_) => -1,
        }
    }
}

fn non_empty(value: common::value::Value) -> Option<String> {
    match value.as_str() {
        Some(s) if !s.is_empty() => Some(s.to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone, Default)]
pub struct MasterStatus {
    pub file: String,
    pub position: u32,
    pub do_db: Option<String>,
    pub ignore_db: Option<String>,
    pub gtid_set: Option<String>,
}

fn rewrite_as_count(query: &str) -> Option<String> {
    let upper = query.to_uppercase();
    let from_idx = upper.find(" FROM ")?;
    let mut tail = query[from_idx + 1..].to_string();
    if let Some(order_by_idx) = tail.to_uppercase().find(" ORDER BY ") {
        tail.truncate(order_by_idx);
    }
    Some(format!("SELECT COUNT(*) AS c FROM {}", &tail["FROM ".len()..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_select_star_to_count() {
        let rewritten = rewrite_as_count("SELECT * FROM users ORDER BY id").unwrap();
        assert_eq!(rewritten, "SELECT COUNT(*) AS c FROM users");
    }

    #[test]
    fn rewrite_without_order_by() {
        let rewritten = rewrite_as_count("SELECT id, name FROM users").unwrap();
        assert_eq!(rewritten, "SELECT COUNT(*) AS c FROM users");
    }

    #[test]
    fn rewrite_fails_without_from_clause() {
        assert!(rewrite_as_count("SHOW TABLES").is_none());
    }
}

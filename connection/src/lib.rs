//! MySQL client wire protocol: handshake/auth, the text query protocol,
//! and binlog replication event decoding. No async runtime — callers
//! drive a blocking socket per connection and share connections through
//! [`pool::ConnectionPool`].

pub mod auth;
pub mod binlog;
pub mod commands;
pub mod conn;
pub mod declar;
pub mod literal;
pub mod packet;
pub mod pool;
pub mod schema;

pub use conn::{Connection, MasterStatus};
pub use pool::ConnectionPool;

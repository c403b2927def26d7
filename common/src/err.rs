use std::io;

/// Error taxonomy for the replication engine core.
///
/// Dispositions are documented on the variant, not enforced here: callers
/// decide whether an error is fatal at startup, absorbed per-row, or causes
/// a worker to exit and be restarted by the supervisor.
#[derive(thiserror::Error, Debug)]
pub enum CdcError {
    /// Missing or invalid configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Cannot open a network connection. Retried by the pool; surfaced
    /// after max attempts.
    #[error("connect error: {0}")]
    Connect(String),

    /// Mid-stream binlog or MySQL error. The owning worker exits; the
    /// supervisor restarts it.
    #[error("transport error: {0}")]
    Transport(String),

    /// Exception inside a user transform. The row keeps its original
    /// value and is not dropped.
    #[error("transform error: {0}")]
    Transform(String),

    /// Malformed filter tree. Fatal at startup.
    #[error("malformed filter: {0}")]
    MalformedFilter(String),

    /// Failed batch insert after all retries. The batch is dropped.
    #[error("batch error: {0}")]
    Batch(String),

    /// Inbound or bus queue full.
    #[error("queue overflow: {0}")]
    QueueOverflow(String),

    /// MySQL error 2014, Command Out of Sync. The connection is evicted.
    #[error("command out of sync")]
    OutOfSync,

    /// SQL builder received an empty row.
    #[error("row is empty")]
    EmptyRow,

    /// SQL builder's row does not contain the primary key column.
    #[error("primary key column missing from row")]
    MissingPk,

    /// Update builder received a row containing only the primary key.
    #[error("nothing to update besides the primary key")]
    NothingToUpdate,

    /// A mapping could not be resolved for an incoming event; the event
    /// is dropped silently by the caller.
    #[error("no mapping for {0}")]
    UnresolvedMapping(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("{0}")]
    Other(String),
}

pub type CdcResult<T> = Result<T, CdcError>;

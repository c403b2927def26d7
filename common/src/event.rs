use std::time::{SystemTime, UNIX_EPOCH};

use crate::row::Row;

/// Monotonically non-decreasing position within a single source's binlog
/// stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct LogPosition {
    pub log_pos: u64,
}

impl LogPosition {
    pub fn new(log_pos: u64) -> Self {
        LogPosition { log_pos }
    }
}

/// A row-level change record produced by MySQL row-based replication,
/// already demultiplexed to one event per affected row.
#[derive(Debug, Clone)]
pub enum BinlogEvent {
    Insert {
        schema: String,
        table: String,
        source: String,
        log_file: String,
        position: LogPosition,
        values: Row,
    },
    Update {
        schema: String,
        table: String,
        source: String,
        log_file: String,
        position: LogPosition,
        before: Row,
        after: Row,
    },
    Delete {
        schema: String,
        table: String,
        source: String,
        log_file: String,
        position: LogPosition,
        values: Row,
    },
}

impl BinlogEvent {
    pub fn source(&self) -> &str {
        match self {
            BinlogEvent::Insert { source, .. }
            | BinlogEvent::Update { source, .. }
            | BinlogEvent::Delete { source, .. } => source,
        }
    }

    pub fn schema(&self) -> &str {
        match self {
            BinlogEvent::Insert { schema, .. }
            | BinlogEvent::Update { schema, .. }
            | BinlogEvent::Delete { schema, .. } => schema,
        }
    }

    pub fn table(&self) -> &str {
        match self {
            BinlogEvent::Insert { table, .. }
            | BinlogEvent::Update { table, .. }
            | BinlogEvent::Delete { table, .. } => table,
        }
    }
}

/// Produced by the init worker; treated identically to an Insert event
/// after transform, but routed into the target's separate init-batch
/// accumulator.
#[derive(Debug, Clone)]
pub struct InitRowEvent {
    pub mapping_id: String,
    pub source: String,
    pub target: String,
    pub target_table: String,
    pub primary_key: String,
    pub row: Row,
}

/// Tag identifying which bus subscribers should be invoked for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    BinlogEvent,
    InitRowEvent,
    Shutdown,
    Error,
    Heartbeat,
}

#[derive(Debug, Clone)]
pub enum MessagePayload {
    Binlog(BinlogEvent),
    Init(InitRowEvent),
    Error(String),
    Heartbeat,
    Shutdown,
}

impl MessagePayload {
    pub fn kind(&self) -> MessageKind {
        match self {
            MessagePayload::Binlog(_) => MessageKind::BinlogEvent,
            MessagePayload::Init(_) => MessageKind::InitRowEvent,
            MessagePayload::Error(_) => MessageKind::Error,
            MessagePayload::Heartbeat => MessageKind::Heartbeat,
            MessagePayload::Shutdown => MessageKind::Shutdown,
        }
    }
}

/// Addressed envelope carried on the bus. `target_name` restricts delivery
/// to a single target worker; `InitRowEvent` always carries one.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: u64,
    pub source_name: Option<String>,
    pub target_name: Option<String>,
    pub timestamp: u64,
    pub data: MessagePayload,
}

impl Message {
    pub fn new(data: MessagePayload, source_name: Option<String>, target_name: Option<String>) -> Self {
        Message {
            id: 0,
            source_name,
            target_name,
            timestamp: now_millis(),
            data,
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.data.kind()
    }
}

pub fn now_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

/// Why an init worker stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionReason {
    Ok,
    QueueOverflow,
    Error,
    TargetNotEmpty,
}

/// Per-worker counters and state, exposed by value (a snapshot copy),
/// never by reference.
#[derive(Debug, Clone, Default)]
pub struct WorkerStats {
    pub events_processed: u64,
    pub errors: u64,
    pub last_activity_ms: u64,
    pub running: bool,

    // Init-worker-only fields.
    pub pages_processed: u64,
    pub current_offset: u64,
    pub rows_estimated: i64,
    pub completed: bool,
    pub completion_reason: Option<CompletionReason>,
}

impl WorkerStats {
    pub fn touch(&mut self) {
        self.last_activity_ms = now_millis();
    }
}

//! Binlog replication stream: after `COM_BINLOG_DUMP`, the connection's
//! packet channel carries one binlog event per packet (each prefixed with
//! an OK byte) until the caller disconnects or, in non-blocking mode, the
//! server runs out of events and sends EOF.

use std::sync::Arc;

use common::event::{BinlogEvent, LogPosition};
use common::{CdcError, CdcResult};

use crate::binlog::rows_event;
use crate::binlog::table_map::{TableMapEvent, TableMapRegistry};
use crate::binlog::{EventHeader, EventType};
use crate::commands::dump_binlog_command;
use crate::conn::Connection;
use crate::schema::SchemaCache;

pub struct BinlogStream<'a> {
    conn: &'a mut Connection,
    source_name: String,
    current_log_file: String,
    table_map: TableMapRegistry,
    schema: Arc<SchemaCache>,
    only_tables: Vec<(String, String)>,
}

impl<'a> BinlogStream<'a> {
    pub fn start(
        conn: &'a mut Connection,
        source_name: impl Into<String>,
        server_id: u32,
        log_file: &str,
        log_pos: u32,
        blocking: bool,
        schema: Arc<SchemaCache>,
        only_tables: Vec<(String, String)>,
    ) -> CdcResult<Self> {
        let payload = dump_binlog_command::build(log_file, log_pos, server_id, blocking);
        conn.send_command(&payload)?;
        Ok(BinlogStream {
            conn,
            source_name: source_name.into(),
            current_log_file: log_file.to_string(),
            table_map: TableMapRegistry::new(),
            schema,
            only_tables,
        })
    }

    fn in_scope(&self, schema: &str, table: &str) -> bool {
        self.only_tables.is_empty()
            || self.only_tables.iter().any(|(s, t)| s == schema && t == table)
    }

    /// Reads and decodes the next packet, expanding multi-row events into
    /// one `BinlogEvent` per row. Returns `Ok(vec![])` for events that
    /// carry no row data (rotate, format description, xid, heartbeat).
    pub fn next_events(&mut self) -> CdcResult<Vec<BinlogEvent>> {
        let packet = self.conn.next_packet()?;
        let Some(&marker) = packet.first() else {
            return Err(CdcError::Transport("empty binlog packet".into()));
        };
        if marker == crate::packet::ERR_PACKET_MARKER {
            let err = crate::conn::resultset::ErrPacket::parse(&packet)?;
            return Err(CdcError::Transport(format!("binlog stream error {}: {}", err.code, err.message)));
        }
        if marker == crate::packet::EOF_PACKET_MARKER && packet.len() < 9 {
            return Err(CdcError::Transport("binlog stream exhausted (non-blocking)".into()));
        }

        let body = &packet[1..];
        let header = EventHeader::parse(body)?;
        let event_body = &body[crate::binlog::EVENT_HEADER_LEN..];
        let position = LogPosition::new(header.log_pos as u64);

        match header.event_type {
            EventType::TableMapEvent => {
                let table = TableMapEvent::parse(event_body)?;
                self.table_map.insert(table.table_id, table);
                Ok(Vec::new())
            }
            EventType::WriteRowsEventV2 => self.decode_rows(event_body, &position, RowKind::Insert),
            EventType::UpdateRowsEventV2 => self.decode_update_rows(event_body, &position),
            EventType::DeleteRowsEventV2 => self.decode_rows(event_body, &position, RowKind::Delete),
            _ => Ok(Vec::new()),
        }
    }

    fn table_for(&self, payload: &[u8]) -> CdcResult<&TableMapEvent> {
        let table_id = u64::from_le_bytes({
            let mut buf = [0u8; 8];
            buf[..6].copy_from_slice(&payload[..6]);
            buf
        });
        self.table_map
            .get(&table_id)
            .ok_or_else(|| CdcError::Transport(format!("row event references unknown table_id {table_id}")))
    }

    fn decode_rows(&mut self, payload: &[u8], position: &LogPosition, kind: RowKind) -> CdcResult<Vec<BinlogEvent>> {
        let table = self.table_for(payload)?;
        if !self.in_scope(&table.schema, &table.table) {
            return Ok(Vec::new());
        }
        let rows = match kind {
            RowKind::Insert => rows_event::decode_write_rows(payload, table)?,
            RowKind::Delete => rows_event::decode_delete_rows(payload, table)?,
        };
        let (schema, table_name) = (table.schema.clone(), table.table.clone());
        Ok(rows
            .into_iter()
            .map(|row| {
                let named = self.schema.rename(&schema, &table_name, row);
                let common = (schema.clone(), table_name.clone(), self.source_name.clone(), self.current_log_file.clone(), *position);
                match kind {
                    RowKind::Insert => BinlogEvent::Insert {
                        schema: common.0,
                        table: common.1,
                        source: common.2,
                        log_file: common.3,
                        position: common.4,
                        values: named,
                    },
                    RowKind::Delete => BinlogEvent::Delete {
                        schema: common.0,
                        table: common.1,
                        source: common.2,
                        log_file: common.3,
                        position: common.4,
                        values: named,
                    },
                }
            })
            .collect())
    }

    fn decode_update_rows(&mut self, payload: &[u8], position: &LogPosition) -> CdcResult<Vec<BinlogEvent>> {
        let table = self.table_for(payload)?;
        if !self.in_scope(&table.schema, &table.table) {
            return Ok(Vec::new());
        }
        let pairs = rows_event::decode_update_rows(payload, table)?;
        let (schema, table_name) = (table.schema.clone(), table.table.clone());
        Ok(pairs
            .into_iter()
            .map(|(before, after)| BinlogEvent::Update {
                schema: schema.clone(),
                table: table_name.clone(),
                source: self.source_name.clone(),
                log_file: self.current_log_file.clone(),
                position: *position,
                before: self.schema.rename(&schema, &table_name, before),
                after: self.schema.rename(&schema, &table_name, after),
            })
            .collect())
    }
}

enum RowKind {
    Insert,
    Delete,
}

//! Source worker (§4.7): tails one configured source's binlog, resolves
//! column names via the shared schema cache, and fans each row event out
//! onto the bus once per target that maps its `(schema, table)`.

use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::config::{ConnectionSpec, EngineConfig};
use common::event::{BinlogEvent, Message, MessagePayload};
use common::{CdcError, CdcResult};

use bus::Bus;
use connection::conn::binlog_stream::BinlogStream;
use connection::schema::SchemaCache;
use connection::Connection;

use crate::control::{should_stop, StatsHandle, WorkerHandle};

pub struct SourceWorker;

impl SourceWorker {
    pub fn spawn(
        source_name: String,
        spec: ConnectionSpec,
        config: Arc<EngineConfig>,
        bus: Arc<Bus>,
        schema_cache: Arc<SchemaCache>,
    ) -> WorkerHandle {
        let stop = Arc::new(AtomicBool::new(false));
        let stats = StatsHandle::new();
        let stop_clone = Arc::clone(&stop);
        let stats_clone = stats.clone();
        let thread_name = source_name.clone();

        let join = thread::Builder::new()
            .name(format!("source-{source_name}"))
            .spawn(move || {
                stats_clone.set_running(true);
                if let Err(err) = run(&thread_name, &spec, &config, &bus, &schema_cache, &stop_clone, &stats_clone) {
                    tracing::error!(source = %thread_name, error = %err, "source worker exited with error");
                    stats_clone.record_error();
                    let _ = bus.publish(Message::new(
                        MessagePayload::Error(format!("source '{thread_name}' failed: {err}")),
                        Some(thread_name.clone()),
                        None,
                    ));
                }
                stats_clone.set_running(false);
            })
            .expect("failed to spawn source worker thread");

        WorkerHandle::new(format!("source-{source_name}"), stop, stats, join)
    }
}

fn run(
    source_name: &str,
    spec: &ConnectionSpec,
    config: &EngineConfig,
    bus: &Bus,
    schema_cache: &Arc<SchemaCache>,
    stop: &Arc<AtomicBool>,
    stats: &StatsHandle,
) -> CdcResult<()> {
    let mut conn = Connection::open(spec)?;

    let tables = config.schema_tables_for_source(source_name);
    for (schema, table) in &tables {
        let qualified = format!("{schema}.{table}");
        let columns = conn
            .query(&format!("SHOW COLUMNS FROM {qualified}"))?
            .into_iter()
            .map(|row| row.get("Field").as_str().unwrap_or_default().to_string())
            .collect::<Vec<_>>();
        schema_cache.put(schema, table, columns);
    }

    let replication = &config.replication;
    let (log_file, log_pos) = match &replication.log_file {
        Some(file) if replication.resume_stream => (file.clone(), replication.log_pos),
        _ => {
            let status = conn.master_status()?;
            (status.file, status.position)
        }
    };

    let mut stream = BinlogStream::start(
        &mut conn,
        source_name,
        replication.server_id,
        &log_file,
        log_pos,
        replication.blocking,
        Arc::clone(schema_cache),
        tables,
    )?;

    while !should_stop(stop) {
        match stream.next_events() {
            Ok(events) => {
                for event in events {
                    if !event_kind_allowed(&event, replication.only_events.as_deref()) {
                        continue;
                    }
                    stats.record_event();
                    for target in targets_for(config, source_name, event.schema(), event.table()) {
                        let message = Message::new(
                            MessagePayload::Binlog(event.clone()),
                            Some(source_name.to_string()),
                            Some(target.clone()),
                        );
                        if !bus.publish(message) {
                            tracing::warn!(source = %source_name, target = %target, "bus full, dropping binlog event");
                        }
                    }
                }
            }
            Err(CdcError::Transport(msg)) if msg.contains("exhausted") => {
                thread::sleep(Duration::from_millis(200));
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

fn event_kind_allowed(event: &BinlogEvent, only: Option<&[String]>) -> bool {
    let Some(list) = only else { return true };
    let kind = match event {
        BinlogEvent::Insert { .. } => "insert",
        BinlogEvent::Update { .. } => "update",
        BinlogEvent::Delete { .. } => "delete",
    };
    list.iter().any(|s| s.eq_ignore_ascii_case(kind))
}

/// Distinct target names any mapping routes `(schema, table)` from
/// `source_name` to. A single mapping per source table is typical, but
/// nothing prevents two mappings fanning the same source table out to two
/// targets.
fn targets_for(config: &EngineConfig, source_name: &str, schema: &str, table: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for table_map in config.mapping.values() {
        if table_map.source != source_name {
            continue;
        }
        let qualified = table_map.qualified_source();
        let map_schema = qualified.schema.clone().unwrap_or_default();
        if map_schema == schema && qualified.table == table && seen.insert(table_map.target.clone()) {
            out.push(table_map.target.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::event::LogPosition;

    fn insert_event(schema: &str, table: &str) -> BinlogEvent {
        BinlogEvent::Insert {
            schema: schema.to_string(),
            table: table.to_string(),
            source: "src".to_string(),
            log_file: "binlog.000001".to_string(),
            position: LogPosition::new(4),
            values: common::row::Row::new(),
        }
    }

    #[test]
    fn only_events_filters_by_kind() {
        let event = insert_event("db", "users");
        assert!(event_kind_allowed(&event, None));
        assert!(event_kind_allowed(&event, Some(&["insert".to_string()])));
        assert!(!event_kind_allowed(&event, Some(&["update".to_string()])));
    }
}

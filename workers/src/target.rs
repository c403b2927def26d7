//! Target worker (§4.6): subscribes to bus envelopes addressed to one
//! target, resolves the owning table mapping, applies filter and
//! transform, and accumulates rows into per-table batches flushed on
//! size or a timer. Deletes are never batched, so that a delete is
//! never observed out of order against a following re-insert.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use common::config::{ConnectionSpec, EngineConfig, TableMap};
use common::event::{BinlogEvent, InitRowEvent, Message, MessageKind, MessagePayload};
use common::row::Row;
use common::value::Value;
use common::{backoff, CdcResult};

use bus::Bus;
use connection::ConnectionPool;
use filter::FilterNode;
use transform::TransformRegistry;

use crate::control::{should_stop, StatsHandle, WorkerHandle};

struct MappingEntry {
    table_map: TableMap,
    filter: Option<FilterNode>,
}

/// Validates and pre-parses every mapping addressed to `target_name`.
/// A malformed filter is fatal at startup (§7), so this runs before the
/// worker thread is spawned and its error propagates out of `spawn`.
fn build_mappings(config: &EngineConfig, target_name: &str) -> CdcResult<HashMap<String, MappingEntry>> {
    let mut out = HashMap::new();
    for (id, table_map) in &config.mapping {
        if table_map.target != target_name {
            continue;
        }
        let filter = match &table_map.filter {
            Some(raw) => Some(FilterNode::parse(raw)?),
            None => None,
        };
        out.insert(id.clone(), MappingEntry { table_map: table_map.clone(), filter });
    }
    Ok(out)
}

/// Three-tier mapping lookup (§4.6.2): explicit `source+schema+table`,
/// then the mapping's bare `source_table` as a short name, then the
/// legacy `schema.table` literal.
fn resolve_mapping<'a>(
    mappings: &'a HashMap<String, MappingEntry>,
    source: &str,
    schema: &str,
    table: &str,
) -> Option<&'a MappingEntry> {
    let candidates: Vec<&MappingEntry> = mappings.values().filter(|m| m.table_map.source == source).collect();

    if let Some(found) = candidates.iter().find(|m| {
        let q = m.table_map.qualified_source();
        q.schema.as_deref() == Some(schema) && q.table == table
    }) {
        return Some(found);
    }
    if let Some(found) = candidates.iter().find(|m| m.table_map.source_table == table) {
        return Some(found);
    }
    let legacy = format!("{schema}.{table}");
    candidates.into_iter().find(|m| m.table_map.source_table == legacy)
}

struct Batch {
    rows: Vec<Row>,
    fingerprint: Vec<String>,
    last_flush: Instant,
}

impl Batch {
    fn new() -> Self {
        Batch { rows: Vec::new(), fingerprint: Vec::new(), last_flush: Instant::now() }
    }
}

struct BatchAccumulator {
    batches: HashMap<(String, String), Batch>,
}

impl BatchAccumulator {
    fn new() -> Self {
        BatchAccumulator { batches: HashMap::new() }
    }

    /// Appends `row` to its table's batch, flushing the existing batch
    /// first if the row's column fingerprint differs (§9).
    fn push(&mut self, key: (String, String), row: Row, mut flush_one: impl FnMut(&str, &str, Vec<Row>)) {
        let fingerprint = row.fingerprint();
        let needs_flush = self
            .batches
            .get(&key)
            .map(|b| !b.rows.is_empty() && b.fingerprint != fingerprint)
            .unwrap_or(false);
        if needs_flush {
            if let Some(batch) = self.batches.get_mut(&key) {
                let rows = std::mem::take(&mut batch.rows);
                flush_one(&key.0, &key.1, rows);
                batch.fingerprint.clear();
                batch.last_flush = Instant::now();
            }
        }
        let batch = self.batches.entry(key).or_insert_with(Batch::new);
        if batch.rows.is_empty() {
            batch.fingerprint = fingerprint;
        }
        batch.rows.push(row);
    }

    fn take(&mut self, key: &(String, String)) -> Vec<Row> {
        match self.batches.get_mut(key) {
            Some(batch) => {
                batch.last_flush = Instant::now();
                batch.fingerprint.clear();
                std::mem::take(&mut batch.rows)
            }
            None => Vec::new(),
        }
    }

    fn due_keys(&self, batch_size: usize, flush_interval: Duration) -> Vec<(String, String)> {
        self.batches
            .iter()
            .filter(|(_, b)| !b.rows.is_empty() && (b.rows.len() >= batch_size || b.last_flush.elapsed() >= flush_interval))
            .map(|(k, _)| k.clone())
            .collect()
    }
}

pub struct TargetWorker;

impl TargetWorker {
    pub fn spawn(
        target_name: String,
        spec: ConnectionSpec,
        config: Arc<EngineConfig>,
        bus: Arc<Bus>,
        pool: Arc<ConnectionPool>,
        registry: Arc<TransformRegistry>,
    ) -> CdcResult<WorkerHandle> {
        let mappings = Arc::new(build_mappings(&config, &target_name)?);
        pool.open(&target_name, &spec)?;

        let queue_capacity = config.tuning.target_queue_capacity.max(1);
        let (sender, receiver) = crossbeam_channel::bounded::<Message>(queue_capacity);

        let own_name = target_name.clone();
        let bus_for_binlog = Arc::clone(&bus);
        bus_for_binlog.subscribe(
            MessageKind::BinlogEvent,
            Box::new({
                let sender = sender.clone();
                let own_name = own_name.clone();
                move |msg: &Message| {
                    if msg.target_name.as_deref() == Some(own_name.as_str()) {
                        if sender.try_send(msg.clone()).is_err() {
                            tracing::warn!(target = %own_name, "target inbound queue full, dropping binlog event");
                        }
                    }
                }
            }),
        );
        bus_for_binlog.subscribe(
            MessageKind::InitRowEvent,
            Box::new({
                let sender = sender.clone();
                let own_name = own_name.clone();
                move |msg: &Message| {
                    if msg.target_name.as_deref() == Some(own_name.as_str()) {
                        if sender.try_send(msg.clone()).is_err() {
                            tracing::warn!(target = %own_name, "target inbound queue full, dropping init row");
                        }
                    }
                }
            }),
        );

        let stop = Arc::new(AtomicBool::new(false));
        let stats = StatsHandle::new();
        let stats_clone = stats.clone();
        let stop_clone = Arc::clone(&stop);
        let thread_name = target_name.clone();
        let batch_size = config.tuning.batch_size;
        let flush_interval = config.tuning.flush_interval;

        let join = thread::Builder::new()
            .name(format!("target-{target_name}"))
            .spawn(move || {
                stats_clone.set_running(true);
                run(
                    &thread_name,
                    receiver,
                    &pool,
                    &mappings,
                    &registry,
                    &stop_clone,
                    &stats_clone,
                    batch_size,
                    flush_interval,
                );
                stats_clone.set_running(false);
            })
            .expect("failed to spawn target worker thread");

        Ok(WorkerHandle::new(format!("target-{target_name}"), stop, stats, join))
    }
}

#[allow(clippy::too_many_arguments)]
fn run(
    target_name: &str,
    receiver: crossbeam_channel::Receiver<Message>,
    pool: &ConnectionPool,
    mappings: &HashMap<String, MappingEntry>,
    registry: &TransformRegistry,
    stop: &Arc<AtomicBool>,
    stats: &StatsHandle,
    batch_size: usize,
    flush_interval: Duration,
) {
    let accumulator = Mutex::new(BatchAccumulator::new());
    let init_accumulator = Mutex::new(BatchAccumulator::new());

    let flush_key = |acc: &Mutex<BatchAccumulator>, key: &(String, String), pk: &str| {
        let rows = acc.lock().unwrap().take(key);
        if rows.is_empty() {
            return;
        }
        flush_batch(pool, target_name, &key.1, &rows, pk, stats);
    };

    while !should_stop(stop) {
        if pool.reconnect_if_needed(target_name).is_err() {
            tracing::warn!(target = %target_name, "target connection unhealthy, skipping until reconnect");
            thread::sleep(Duration::from_millis(100));
            continue;
        }

        for key in accumulator.lock().unwrap().due_keys(batch_size, flush_interval) {
            if let Some(entry) = mappings.values().find(|m| m.table_map.target_table == key.1) {
                flush_key(&accumulator, &key, &entry.table_map.primary_key);
            }
        }
        for key in init_accumulator.lock().unwrap().due_keys(batch_size, flush_interval) {
            if let Some(entry) = mappings.values().find(|m| m.table_map.target_table == key.1) {
                flush_key(&init_accumulator, &key, &entry.table_map.primary_key);
            }
        }

        let message = match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(m) => m,
            Err(_) => continue,
        };

        match message.data {
            MessagePayload::Binlog(event) => {
                handle_binlog_event(target_name, event, mappings, registry, pool, &accumulator, stats);
            }
            MessagePayload::Init(init_row) => {
                handle_init_row(target_name, init_row, mappings, registry, pool, &init_accumulator, stats);
            }
            MessagePayload::Shutdown => break,
            MessagePayload::Error(_) | MessagePayload::Heartbeat => {}
        }
    }

    // Final flush on shutdown (§4.9): one last chance to drain batches.
    let keys: Vec<(String, String)> = accumulator.lock().unwrap().batches.keys().cloned().collect();
    for key in keys {
        if let Some(entry) = mappings.values().find(|m| m.table_map.target_table == key.1) {
            flush_key(&accumulator, &key, &entry.table_map.primary_key);
        }
    }
    let keys: Vec<(String, String)> = init_accumulator.lock().unwrap().batches.keys().cloned().collect();
    for key in keys {
        if let Some(entry) = mappings.values().find(|m| m.table_map.target_table == key.1) {
            flush_key(&init_accumulator, &key, &entry.table_map.primary_key);
        }
    }
}

fn flush_batch(pool: &ConnectionPool, target_name: &str, target_table: &str, rows: &[Row], pk: &str, stats: &StatsHandle) {
    let result = backoff::BATCH_RETRY.retry(|_attempt| -> CdcResult<u64> {
        let (sql, values_list) = sql::batch_upsert(target_table, rows, pk)?;
        let statements: Vec<(String, Vec<Value>)> = values_list.into_iter().map(|v| (sql.clone(), v)).collect();
        pool.batch_execute(target_name, &statements)
    });
    match result {
        Ok(_) => stats.mutate(|s| s.events_processed += rows.len() as u64),
        Err(err) => {
            tracing::error!(target = %target_name, table = %target_table, error = %err, "batch flush failed after retries, dropping batch");
            stats.record_error();
        }
    }
}

fn evaluate_filter(filter: &Option<FilterNode>, row: &Row) -> bool {
    match filter {
        None => true,
        Some(node) => node.evaluate(row).unwrap_or(false),
    }
}

#[allow(clippy::too_many_arguments)]
fn handle_binlog_event(
    target_name: &str,
    event: BinlogEvent,
    mappings: &HashMap<String, MappingEntry>,
    registry: &TransformRegistry,
    pool: &ConnectionPool,
    accumulator: &Mutex<BatchAccumulator>,
    stats: &StatsHandle,
) {
    let Some(entry) = resolve_mapping(mappings, event.source(), event.schema(), event.table()) else {
        return;
    };
    let table_map = &entry.table_map;
    let source_table = table_map.qualified_source();

    match event {
        BinlogEvent::Insert { values, .. } => {
            if !evaluate_filter(&entry.filter, &values) {
                return;
            }
            let row = transform::apply_row(&table_map.columns, &source_table, &values, registry);
            batch_row(pool, target_name, accumulator, table_map, row, stats);
        }
        BinlogEvent::Delete { values, .. } => {
            if !evaluate_filter(&entry.filter, &values) {
                return;
            }
            let row = transform::apply_row(&table_map.columns, &source_table, &values, registry);
            immediate_delete(pool, target_name, table_map, &row, accumulator, stats);
        }
        BinlogEvent::Update { before, after, .. } => {
            let before_ok = evaluate_filter(&entry.filter, &before);
            let after_ok = evaluate_filter(&entry.filter, &after);
            match (before_ok, after_ok) {
                (false, false) => {}
                (_, true) => {
                    let row = transform::apply_row(&table_map.columns, &source_table, &after, registry);
                    batch_row(pool, target_name, accumulator, table_map, row, stats);
                }
                (true, false) => {
                    let row = transform::apply_row(&table_map.columns, &source_table, &before, registry);
                    immediate_delete(pool, target_name, table_map, &row, accumulator, stats);
                }
            }
        }
    }
}

fn batch_row(
    pool: &ConnectionPool,
    target_name: &str,
    accumulator: &Mutex<BatchAccumulator>,
    table_map: &TableMap,
    row: Row,
    stats: &StatsHandle,
) {
    let key = (table_map.source.clone(), table_map.target_table.clone());
    accumulator.lock().unwrap().push(key, row, |_, target_table, rows| {
        flush_batch(pool, target_name, target_table, &rows, &table_map.primary_key, stats);
    });
}

fn immediate_delete(
    pool: &ConnectionPool,
    target_name: &str,
    table_map: &TableMap,
    row: &Row,
    accumulator: &Mutex<BatchAccumulator>,
    stats: &StatsHandle,
) {
    // Flush any pending batch for this table first so the delete is
    // observed in order relative to prior inserts/upserts (§5).
    let key = (table_map.source.clone(), table_map.target_table.clone());
    let pending = accumulator.lock().unwrap().take(&key);
    if !pending.is_empty() {
        flush_batch(pool, target_name, &table_map.target_table, &pending, &table_map.primary_key, stats);
    }

    match sql::delete(&table_map.target_table, row, &table_map.primary_key) {
        Ok(stmt) => match pool.execute(target_name, &stmt.sql, &stmt.values) {
            Ok(_) => stats.record_event(),
            Err(err) => {
                tracing::error!(target = %target_name, table = %table_map.target_table, error = %err, "delete failed");
                stats.record_error();
            }
        },
        Err(err) => {
            tracing::error!(target = %target_name, table = %table_map.target_table, error = %err, "could not build delete statement");
            stats.record_error();
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn handle_init_row(
    target_name: &str,
    init_row: InitRowEvent,
    mappings: &HashMap<String, MappingEntry>,
    registry: &TransformRegistry,
    pool: &ConnectionPool,
    accumulator: &Mutex<BatchAccumulator>,
    stats: &StatsHandle,
) {
    let Some(entry) = mappings.get(&init_row.mapping_id) else {
        tracing::warn!(target = %target_name, mapping_id = %init_row.mapping_id, "no mapping for init row, dropping");
        return;
    };
    let table_map = &entry.table_map;
    if !evaluate_filter(&entry.filter, &init_row.row) {
        return;
    }
    let source_table = table_map.qualified_source();
    let row = transform::apply_row(&table_map.columns, &source_table, &init_row.row, registry);
    batch_row(pool, target_name, accumulator, table_map, row, stats);
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::config::{ColumnMap, IndexColumnMap};

    fn sample_table_map(source: &str, target: &str, source_table: &str) -> TableMap {
        let mut columns = IndexColumnMap::new();
        columns.insert("id".to_string(), ColumnMap::passthrough("id"));
        TableMap {
            source: source.to_string(),
            source_table: source_table.to_string(),
            target: target.to_string(),
            target_table: "users".to_string(),
            primary_key: "id".to_string(),
            columns,
            filter: None,
            init_query: None,
        }
    }

    #[test]
    fn resolves_explicit_schema_and_table() {
        let mut mappings = HashMap::new();
        mappings.insert(
            "m1".to_string(),
            MappingEntry { table_map: sample_table_map("src", "tgt", "db.users"), filter: None },
        );
        let found = resolve_mapping(&mappings, "src", "db", "users").unwrap();
        assert_eq!(found.table_map.target_table, "users");
    }

    #[test]
    fn resolves_short_source_table_name() {
        let mut mappings = HashMap::new();
        mappings.insert(
            "m1".to_string(),
            MappingEntry { table_map: sample_table_map("src", "tgt", "users"), filter: None },
        );
        let found = resolve_mapping(&mappings, "src", "anything", "users").unwrap();
        assert_eq!(found.table_map.source_table, "users");
    }

    #[test]
    fn unresolvable_mapping_is_none() {
        let mappings = HashMap::new();
        assert!(resolve_mapping(&mappings, "src", "db", "users").is_none());
    }

    #[test]
    fn batch_flushes_on_fingerprint_change() {
        let mut acc = BatchAccumulator::new();
        let key = ("src".to_string(), "users".to_string());
        let mut flushed = Vec::new();

        let mut row_a = Row::new();
        row_a.insert("id", Value::Int(1));
        row_a.insert("name", Value::Text("Ada".into()));
        acc.push(key.clone(), row_a, |_, _, rows| flushed.push(rows));

        let mut row_b = Row::new();
        row_b.insert("id", Value::Int(2));
        acc.push(key.clone(), row_b, |_, _, rows| flushed.push(rows));

        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].len(), 1);
        assert_eq!(acc.take(&key).len(), 1);
    }
}

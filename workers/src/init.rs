//! Init worker (§4.8): pages through one table's `init_query` and publishes
//! each row onto the bus as an `InitRowEvent`, addressed to the same target
//! the table's mapping routes ordinary binlog rows to. Runs on its own
//! pooled connection — the source's binlog connection is committed to the
//! replication stream the moment `COM_BINLOG_DUMP` is sent and can't also
//! serve plain queries.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;

use common::config::{ConnectionSpec, EngineConfig, TableMap};
use common::event::{CompletionReason, InitRowEvent, Message, MessagePayload};
use common::{backoff, CdcError};

use bus::Bus;
use connection::ConnectionPool;

use crate::control::{should_stop, StatsHandle, WorkerHandle};

pub struct InitWorker;

impl InitWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        mapping_id: String,
        table_map: TableMap,
        source_spec: ConnectionSpec,
        config: Arc<EngineConfig>,
        bus: Arc<Bus>,
        pool: Arc<ConnectionPool>,
        resume_offset: u64,
    ) -> WorkerHandle {
        let stop = Arc::new(AtomicBool::new(false));
        let stats = StatsHandle::new();
        let stop_clone = Arc::clone(&stop);
        let stats_clone = stats.clone();
        let name = format!("init-{mapping_id}");
        let thread_name = name.clone();

        let join = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                stats_clone.set_running(true);
                run(&mapping_id, &table_map, &source_spec, &config, &bus, &pool, resume_offset, &stop_clone, &stats_clone);
                stats_clone.set_running(false);
            })
            .expect("failed to spawn init worker thread");

        WorkerHandle::new(name, stop, stats, join)
    }
}

#[allow(clippy::too_many_arguments)]
fn run(
    mapping_id: &str,
    table_map: &TableMap,
    source_spec: &ConnectionSpec,
    config: &EngineConfig,
    bus: &Bus,
    pool: &ConnectionPool,
    resume_offset: u64,
    stop: &Arc<AtomicBool>,
    stats: &StatsHandle,
) {
    let Some(init_query) = &table_map.init_query else {
        stats.mutate(|s| {
            s.completed = true;
            s.completion_reason = Some(CompletionReason::Ok);
        });
        return;
    };

    if init_query.init_if_target_empty && !pool.is_table_empty(&table_map.target, &table_map.target_table) {
        stats.mutate(|s| {
            s.completed = true;
            s.completion_reason = Some(CompletionReason::TargetNotEmpty);
        });
        return;
    }

    let connection_key = format!("init-{mapping_id}");
    if let Err(err) = pool.open(&connection_key, source_spec) {
        tracing::error!(mapping = %mapping_id, error = %err, "init worker could not open source connection");
        stats.mutate(|s| s.completion_reason = Some(CompletionReason::Error));
        stats.record_error();
        return;
    }

    let estimate = pool.count_estimate(&connection_key, &init_query.query);
    stats.mutate(|s| s.rows_estimated = estimate);

    let page_size = config.tuning.init_page_size.max(1);
    let mut offset = resume_offset as usize;

    loop {
        if should_stop(stop) {
            stats.mutate(|s| s.current_offset = offset as u64);
            return;
        }
        if bus.queue_usage() > 0.9 {
            tracing::warn!(mapping = %mapping_id, "bus queue over 90% full, pausing init worker");
            stats.mutate(|s| {
                s.current_offset = offset as u64;
                s.completion_reason = Some(CompletionReason::QueueOverflow);
            });
            return;
        }

        let page = match pool.paginate(&connection_key, &init_query.query, page_size, offset) {
            Ok(page) => page,
            Err(err) => {
                tracing::error!(mapping = %mapping_id, error = %err, "init worker page query failed");
                stats.mutate(|s| {
                    s.current_offset = offset as u64;
                    s.completion_reason = Some(CompletionReason::Error);
                });
                stats.record_error();
                return;
            }
        };
        let (rows, has_more) = page;
        if rows.is_empty() {
            break;
        }

        for row in rows {
            let init_row = InitRowEvent {
                mapping_id: mapping_id.to_string(),
                source: table_map.source.clone(),
                target: table_map.target.clone(),
                target_table: table_map.target_table.clone(),
                primary_key: table_map.primary_key.clone(),
                row,
            };
            let message = Message::new(
                MessagePayload::Init(init_row),
                Some(table_map.source.clone()),
                Some(table_map.target.clone()),
            );

            let published = backoff::INIT_PUBLISH_RETRY.retry(|_attempt| {
                if bus.publish(message.clone()) {
                    Ok(())
                } else {
                    Err(CdcError::QueueOverflow)
                }
            });

            match published {
                Ok(()) => {
                    stats.record_event();
                    offset += 1;
                }
                Err(_) => {
                    tracing::warn!(mapping = %mapping_id, "init publish retries exhausted, pausing for back-pressure");
                    stats.mutate(|s| {
                        s.current_offset = offset as u64;
                        s.completion_reason = Some(CompletionReason::QueueOverflow);
                    });
                    return;
                }
            }
        }

        stats.mutate(|s| s.pages_processed += 1);
        if !has_more {
            break;
        }
    }

    stats.mutate(|s| {
        s.completed = true;
        s.completion_reason = Some(CompletionReason::Ok);
        s.current_offset = offset as u64;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::config::IndexColumnMap;

    fn table_map_without_init_query() -> TableMap {
        TableMap {
            source: "src".to_string(),
            source_table: "users".to_string(),
            target: "tgt".to_string(),
            target_table: "users".to_string(),
            primary_key: "id".to_string(),
            columns: IndexColumnMap::new(),
            filter: None,
            init_query: None,
        }
    }

    #[test]
    fn missing_init_query_completes_immediately() {
        let table_map = table_map_without_init_query();
        let stats = StatsHandle::new();
        let stop = Arc::new(AtomicBool::new(false));
        let config = EngineConfig::default();
        let bus = Bus::new(10);
        let pool = ConnectionPool::new();
        let source_spec = ConnectionSpec {
            host: "localhost".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: String::new(),
            database: String::new(),
            charset: "utf8mb4".to_string(),
        };

        run("m1", &table_map, &source_spec, &config, &bus, &pool, 0, &stop, &stats);

        let snapshot = stats.snapshot();
        assert!(snapshot.completed);
        assert_eq!(snapshot.completion_reason, Some(CompletionReason::Ok));
    }
}

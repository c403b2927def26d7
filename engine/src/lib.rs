//! Supervisor (§4.9): brings up the bus, every target worker, every init
//! worker, and every source worker in that order, then runs a monitoring
//! loop that restarts dead sources, nudges stalled init workers back to
//! life, and watches target health. Shutdown runs the same sequence in
//! reverse so a target's final batch flush always happens before its
//! connection is closed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use common::config::EngineConfig;
use common::event::CompletionReason;
use common::log::{init_tracing, LogOptions};
use common::CdcResult;

use bus::Bus;
use connection::schema::SchemaCache;
use connection::ConnectionPool;
use transform::TransformRegistry;
use workers::{InitWorker, SourceWorker, TargetWorker, WorkerHandle};

struct SupervisorInner {
    config: Arc<EngineConfig>,
    pool: Arc<ConnectionPool>,
    bus: Arc<Bus>,
    registry: Arc<TransformRegistry>,
    schema_cache: Arc<SchemaCache>,
    sources: Mutex<HashMap<String, WorkerHandle>>,
    targets: Mutex<HashMap<String, WorkerHandle>>,
    inits: Mutex<HashMap<String, WorkerHandle>>,
    bus_worker: Mutex<Option<JoinHandle<()>>>,
    monitor_stop: Arc<AtomicBool>,
    monitor_join: Mutex<Option<JoinHandle<()>>>,
    sources_started: AtomicBool,
}

/// Owns every running worker and the shared infrastructure (pool, bus,
/// transform registry, schema cache) they're built from.
pub struct Supervisor {
    inner: Arc<SupervisorInner>,
}

impl Supervisor {
    pub fn new(config: EngineConfig) -> Self {
        let bus_capacity = config.tuning.bus_capacity.max(1);
        Supervisor {
            inner: Arc::new(SupervisorInner {
                config: Arc::new(config),
                pool: Arc::new(ConnectionPool::new()),
                bus: Bus::new(bus_capacity),
                registry: Arc::new(TransformRegistry::with_builtins()),
                schema_cache: Arc::new(SchemaCache::new()),
                sources: Mutex::new(HashMap::new()),
                targets: Mutex::new(HashMap::new()),
                inits: Mutex::new(HashMap::new()),
                bus_worker: Mutex::new(None),
                monitor_stop: Arc::new(AtomicBool::new(false)),
                monitor_join: Mutex::new(None),
                sources_started: AtomicBool::new(false),
            }),
        }
    }

    /// Runs the startup sequence. Returns once every worker has been
    /// spawned (not once they've finished any work).
    pub fn start(&self) -> CdcResult<()> {
        let inner = &self.inner;
        let bus_capacity_note = inner.config.tuning.bus_capacity;
        tracing::info!(bus_capacity = bus_capacity_note, "starting cdc engine");

        *inner.bus_worker.lock().unwrap() = Some(inner.bus.spawn_worker(Duration::from_millis(100)));

        for (target_name, target_spec) in &inner.config.targets {
            let handle = TargetWorker::spawn(
                target_name.clone(),
                target_spec.connection.clone(),
                Arc::clone(&inner.config),
                Arc::clone(&inner.bus),
                Arc::clone(&inner.pool),
                Arc::clone(&inner.registry),
            )?;
            inner.targets.lock().unwrap().insert(target_name.clone(), handle);
        }

        for (mapping_id, table_map) in &inner.config.mapping {
            if table_map.init_query.is_none() {
                continue;
            }
            let Some(source_spec) = inner.config.sources.get(&table_map.source) else {
                tracing::warn!(mapping = %mapping_id, source = %table_map.source, "mapping references unknown source, skipping init");
                continue;
            };
            let handle = InitWorker::spawn(
                mapping_id.clone(),
                table_map.clone(),
                source_spec.connection.clone(),
                Arc::clone(&inner.config),
                Arc::clone(&inner.bus),
                Arc::clone(&inner.pool),
                0,
            );
            inner.inits.lock().unwrap().insert(mapping_id.clone(), handle);
        }

        if !inner.config.replication.pause_replication_during_init {
            self.start_sources();
        }

        let monitor_inner = Arc::clone(&self.inner);
        let monitor_stop = Arc::clone(&inner.monitor_stop);
        *inner.monitor_join.lock().unwrap() = Some(
            thread::Builder::new()
                .name("supervisor-monitor".into())
                .spawn(move || monitor_loop(&monitor_inner, &monitor_stop))
                .expect("failed to spawn monitor thread"),
        );

        Ok(())
    }

    fn start_sources(&self) {
        let inner = &self.inner;
        if inner.sources_started.swap(true, Ordering::SeqCst) {
            return;
        }
        for (source_name, source_spec) in &inner.config.sources {
            let handle = SourceWorker::spawn(
                source_name.clone(),
                source_spec.connection.clone(),
                Arc::clone(&inner.config),
                Arc::clone(&inner.bus),
                Arc::clone(&inner.schema_cache),
            );
            inner.sources.lock().unwrap().insert(source_name.clone(), handle);
        }
    }

    /// Runs the shutdown sequence: sources, then init workers, then
    /// targets (letting their final flush run), then the bus and
    /// monitoring threads.
    pub fn shutdown(&self) {
        let inner = &self.inner;
        tracing::info!("shutting down cdc engine");
        inner.monitor_stop.store(true, Ordering::SeqCst);

        for handle in inner.sources.lock().unwrap().values() {
            handle.request_stop();
        }
        for handle in inner.inits.lock().unwrap().values() {
            handle.request_stop();
        }
        for handle in inner.targets.lock().unwrap().values() {
            handle.request_stop();
        }

        for handle in inner.sources.lock().unwrap().values_mut() {
            handle.join();
        }
        for handle in inner.inits.lock().unwrap().values_mut() {
            handle.join();
        }
        for handle in inner.targets.lock().unwrap().values_mut() {
            handle.join();
        }

        inner.bus.request_shutdown();
        if let Some(join) = inner.bus_worker.lock().unwrap().take() {
            let _ = join.join();
        }
        if let Some(join) = inner.monitor_join.lock().unwrap().take() {
            let _ = join.join();
        }
    }

    /// Blocks the caller until `shutdown` is called from another thread.
    pub fn wait_for_shutdown(&self) {
        if let Some(join) = self.inner.monitor_join.lock().unwrap().take() {
            let _ = join.join();
        }
    }
}

fn monitor_loop(inner: &Arc<SupervisorInner>, stop: &Arc<AtomicBool>) {
    let monitor_tick = inner.config.tuning.monitor_tick;
    let init_resume_tick = inner.config.tuning.init_resume_tick;
    let mut last_health = Instant::now();
    let mut last_resume = Instant::now();

    while !stop.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_secs(1));

        if last_resume.elapsed() >= init_resume_tick {
            resume_stalled_init_workers(inner);
            gate_source_start(inner);
            last_resume = Instant::now();
        }
        if last_health.elapsed() >= monitor_tick {
            check_source_health(inner);
            check_target_health(inner);
            last_health = Instant::now();
        }
    }
}

/// Restarts sources that have died and logs a warning for sources with a
/// high error rate (but leaves those running — an elevated error rate
/// alone isn't evidence the connection itself is unhealthy).
fn check_source_health(inner: &Arc<SupervisorInner>) {
    let names: Vec<String> = inner.sources.lock().unwrap().keys().cloned().collect();
    for name in names {
        let running = inner.sources.lock().unwrap().get(&name).map(|h| h.stats().running).unwrap_or(false);
        if !running {
            thread::sleep(inner.config.tuning.source_restart_backoff);
            let Some(spec) = inner.config.sources.get(&name) else { continue };
            tracing::warn!(source = %name, "source worker not running, restarting");
            let handle = SourceWorker::spawn(
                name.clone(),
                spec.connection.clone(),
                Arc::clone(&inner.config),
                Arc::clone(&inner.bus),
                Arc::clone(&inner.schema_cache),
            );
            inner.sources.lock().unwrap().insert(name, handle);
            continue;
        }
        if let Some(stats) = inner.sources.lock().unwrap().get(&name).map(|h| h.stats()) {
            if stats.events_processed > 0 {
                let error_rate = stats.errors as f64 / stats.events_processed as f64;
                if error_rate > 0.1 {
                    tracing::warn!(source = %name, error_rate, "source error rate above 10%");
                }
            }
        }
    }
}

/// Pings every target connection. An unhealthy target isn't restarted
/// here — the target worker's own loop retries `reconnect_if_needed` —
/// this only logs so operators see it; sources keep running and the bus
/// queue absorbs the back-pressure.
fn check_target_health(inner: &Arc<SupervisorInner>) {
    let names: Vec<String> = inner.targets.lock().unwrap().keys().cloned().collect();
    for name in names {
        if !inner.pool.healthy(&name) {
            tracing::warn!(target = %name, "target connection unhealthy");
        }
    }
}

/// Restarts init workers that stopped on `QueueOverflow` or `Error` with
/// a resumable offset, provided the bus has room again.
fn resume_stalled_init_workers(inner: &Arc<SupervisorInner>) {
    if inner.bus.queue_usage() >= 0.8 {
        return;
    }
    let mapping_ids: Vec<String> = inner.inits.lock().unwrap().keys().cloned().collect();
    for mapping_id in mapping_ids {
        let stats = match inner.inits.lock().unwrap().get(&mapping_id).map(|h| h.stats()) {
            Some(s) => s,
            None => continue,
        };
        if stats.completed || stats.running {
            continue;
        }
        let resumable = matches!(stats.completion_reason, Some(CompletionReason::QueueOverflow) | Some(CompletionReason::Error))
            && stats.current_offset > 0;
        if !resumable {
            continue;
        }
        let Some(table_map) = inner.config.mapping.get(&mapping_id) else { continue };
        let Some(source_spec) = inner.config.sources.get(&table_map.source) else { continue };
        tracing::info!(mapping = %mapping_id, offset = stats.current_offset, "resuming init worker");
        let handle = InitWorker::spawn(
            mapping_id.clone(),
            table_map.clone(),
            source_spec.connection.clone(),
            Arc::clone(&inner.config),
            Arc::clone(&inner.bus),
            Arc::clone(&inner.pool),
            stats.current_offset,
        );
        inner.inits.lock().unwrap().insert(mapping_id, handle);
    }
}

/// While `pause_replication_during_init` is set, starts the source
/// workers once every init worker has reported `completed`, or has given
/// up for good with `CompletionReason::Error` — a permanently-failing
/// snapshot should degrade to streaming, not wedge the pipeline forever.
fn gate_source_start(inner: &Arc<SupervisorInner>) {
    if !inner.config.replication.pause_replication_during_init || inner.sources_started.load(Ordering::SeqCst) {
        return;
    }
    let all_done = inner.inits.lock().unwrap().values().all(|h| {
        let stats = h.stats();
        stats.completed || stats.completion_reason == Some(CompletionReason::Error)
    });
    if !all_done {
        return;
    }
    tracing::info!("all init workers settled, starting source workers");
    if inner.sources_started.swap(true, Ordering::SeqCst) {
        return;
    }
    for (source_name, source_spec) in &inner.config.sources {
        let handle = SourceWorker::spawn(
            source_name.clone(),
            source_spec.connection.clone(),
            Arc::clone(&inner.config),
            Arc::clone(&inner.bus),
            Arc::clone(&inner.schema_cache),
        );
        inner.sources.lock().unwrap().insert(source_name.clone(), handle);
    }
}

pub fn default_log_options() -> LogOptions {
    LogOptions::default()
}

pub fn init_logging(opts: LogOptions) {
    init_tracing(opts);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_and_shuts_down_with_no_configured_workers() {
        let supervisor = Supervisor::new(EngineConfig::default());
        supervisor.start().unwrap();
        supervisor.shutdown();
    }
}

//! Shared scaffolding for the three worker kinds: a stop flag, a snapshot
//! of `WorkerStats`, and the joinable thread handle the supervisor polls.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use common::event::WorkerStats;

#[derive(Clone)]
pub struct StatsHandle(Arc<Mutex<WorkerStats>>);

impl StatsHandle {
    pub fn new() -> Self {
        StatsHandle(Arc::new(Mutex::new(WorkerStats::default())))
    }

    pub fn snapshot(&self) -> WorkerStats {
        self.0.lock().unwrap().clone()
    }

    pub fn touch(&self) {
        let mut stats = self.0.lock().unwrap();
        stats.touch();
    }

    pub fn record_event(&self) {
        let mut stats = self.0.lock().unwrap();
        stats.events_processed += 1;
        stats.touch();
    }

    pub fn record_error(&self) {
        let mut stats = self.0.lock().unwrap();
        stats.errors += 1;
        stats.touch();
    }

    pub fn set_running(&self, running: bool) {
        self.0.lock().unwrap().running = running;
    }

    pub fn mutate(&self, f: impl FnOnce(&mut WorkerStats)) {
        f(&mut self.0.lock().unwrap());
    }
}

impl Default for StatsHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// A running worker's thread plus the controls the supervisor uses to stop
/// it and read its health.
pub struct WorkerHandle {
    pub name: String,
    stop: Arc<AtomicBool>,
    stats: StatsHandle,
    join: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn new(name: impl Into<String>, stop: Arc<AtomicBool>, stats: StatsHandle, join: JoinHandle<()>) -> Self {
        WorkerHandle { name: name.into(), stop, stats, join: Some(join) }
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats.snapshot()
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map(|j| j.is_finished()).unwrap_or(true)
    }

    pub fn join(&mut self) {
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

pub(crate) fn should_stop(flag: &Arc<AtomicBool>) -> bool {
    flag.load(Ordering::SeqCst)
}

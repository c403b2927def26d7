//! Bounded, typed pub/sub message bus (§4.5).
//!
//! A single bounded FIFO queue feeds many kind-keyed subscribers. Publish
//! never blocks: a full queue increments `dropped` and returns `false`. The
//! bus owns one dedicated worker thread that drains the queue and invokes
//! subscribers; a panicking subscriber is caught and logged without
//! affecting its siblings.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use common::event::{Message, MessageKind};

pub type Subscriber = Box<dyn Fn(&Message) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusStats {
    pub published: u64,
    pub dropped: u64,
    pub queue_len: usize,
    pub capacity: usize,
}

struct SubscriberEntry {
    id: u64,
    callback: Subscriber,
}

pub struct Bus {
    sender: crossbeam_channel::Sender<Message>,
    receiver: crossbeam_channel::Receiver<Message>,
    capacity: usize,
    subscribers: Mutex<HashMap<MessageKind, Vec<SubscriberEntry>>>,
    next_subscriber_id: AtomicU64,
    published: AtomicU64,
    dropped: AtomicU64,
    shutdown_requested: AtomicBool,
}

impl Bus {
    pub fn new(capacity: usize) -> Arc<Self> {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        Arc::new(Bus {
            sender,
            receiver,
            capacity,
            subscribers: Mutex::new(HashMap::new()),
            next_subscriber_id: AtomicU64::new(1),
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            shutdown_requested: AtomicBool::new(false),
        })
    }

    /// Registers `callback` for messages of `kind`; returns a subscription
    /// id usable with `unsubscribe`.
    pub fn subscribe(&self, kind: MessageKind, callback: Subscriber) -> u64 {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers.lock().unwrap().entry(kind).or_default().push(SubscriberEntry { id, callback });
        id
    }

    pub fn unsubscribe(&self, kind: MessageKind, id: u64) {
        if let Some(list) = self.subscribers.lock().unwrap().get_mut(&kind) {
            list.retain(|entry| entry.id != id);
        }
    }

    /// Non-blocking publish. Returns `false` (and counts a drop) when the
    /// queue is full or shutdown has already been requested.
    pub fn publish(&self, message: Message) -> bool {
        if self.shutdown_requested.load(Ordering::SeqCst) {
            self.dropped.fetch_add(1, Ordering::SeqCst);
            return false;
        }
        match self.sender.try_send(message) {
            Ok(()) => {
                self.published.fetch_add(1, Ordering::SeqCst);
                true
            }
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::SeqCst);
                false
            }
        }
    }

    /// Drains the queue for up to `timeout`, dispatching each message to
    /// its kind's subscribers. Returns the number of messages processed.
    pub fn process(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut processed = 0;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() && processed > 0 {
                break;
            }
            match self.receiver.recv_timeout(remaining.max(Duration::from_millis(1))) {
                Ok(message) => {
                    self.dispatch(&message);
                    processed += 1;
                }
                Err(_) => break,
            }
            if Instant::now() >= deadline {
                break;
            }
        }
        processed
    }

    fn dispatch(&self, message: &Message) {
        let kind = message.kind();
        let subscribers = self.subscribers.lock().unwrap();
        let Some(list) = subscribers.get(&kind) else { return };
        for entry in list {
            let callback = &entry.callback;
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(message))) {
                tracing::error!(?panic, subscriber = entry.id, "bus subscriber panicked");
            }
        }
    }

    /// Publishes a `Shutdown` envelope (bypassing the shutdown-rejection
    /// check) and then rejects all subsequent publishes.
    pub fn request_shutdown(&self) {
        let _ = self
            .sender
            .try_send(Message::new(common::event::MessagePayload::Shutdown, Some("bus".to_string()), None));
        self.shutdown_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> BusStats {
        BusStats {
            published: self.published.load(Ordering::SeqCst),
            dropped: self.dropped.load(Ordering::SeqCst),
            queue_len: self.receiver.len(),
            capacity: self.capacity,
        }
    }

    pub fn queue_usage(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.receiver.len() as f64 / self.capacity as f64
    }

    /// Spawns the bus's own worker thread, which calls `process()` in a
    /// loop until `shutdown_requested` and the queue is empty.
    pub fn spawn_worker(self: &Arc<Self>, poll_timeout: Duration) -> JoinHandle<()> {
        let bus = Arc::clone(self);
        thread::Builder::new()
            .name("bus-worker".into())
            .spawn(move || loop {
                bus.process(poll_timeout);
                if bus.is_shutdown_requested() && bus.receiver.is_empty() {
                    break;
                }
            })
            .expect("failed to spawn bus worker thread")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::event::MessagePayload;
    use std::sync::atomic::AtomicUsize;

    fn heartbeat(target: Option<String>) -> Message {
        Message::new(MessagePayload::Heartbeat, Some("src".to_string()), target)
    }

    #[test]
    fn publish_at_capacity_is_rejected() {
        let bus = Bus::new(1);
        assert!(bus.publish(heartbeat(None)));
        assert!(!bus.publish(heartbeat(None)));
        assert_eq!(bus.stats().dropped, 1);
    }

    #[test]
    fn subscribers_receive_dispatched_messages() {
        let bus = Bus::new(10);
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        bus.subscribe(
            MessageKind::Heartbeat,
            Box::new(move |_msg| {
                count_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );
        bus.publish(heartbeat(None));
        bus.process(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = Bus::new(10);
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        let id = bus.subscribe(
            MessageKind::Heartbeat,
            Box::new(move |_msg| {
                count_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );
        bus.unsubscribe(MessageKind::Heartbeat, id);
        bus.publish(heartbeat(None));
        bus.process(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn a_panicking_subscriber_does_not_block_siblings() {
        let bus = Bus::new(10);
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        bus.subscribe(MessageKind::Heartbeat, Box::new(|_msg| panic!("boom")));
        bus.subscribe(
            MessageKind::Heartbeat,
            Box::new(move |_msg| {
                count_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );
        bus.publish(heartbeat(None));
        bus.process(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn request_shutdown_rejects_further_publishes() {
        let bus = Bus::new(10);
        bus.request_shutdown();
        assert!(!bus.publish(heartbeat(None)));
    }

    #[test]
    fn queue_usage_reflects_fill_ratio() {
        let bus = Bus::new(4);
        bus.publish(heartbeat(None));
        bus.publish(heartbeat(None));
        assert_eq!(bus.queue_usage(), 0.5);
    }
}

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

use crate::models::Topic;

pub type SnapshotProvider = Box<dyn Fn() -> Value + Send + Sync>;
pub type CommandHandler = Box<dyn Fn(&Value) + Send + Sync>;

const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Publish/subscribe surface toward the operator UI and other bus clients.
pub trait Transport: Send + Sync {
    fn publish(&self, topic: Topic, payload: Value);
    fn register_snapshot(&self, topic: Topic, provider: SnapshotProvider);
    fn register_handler(&self, topic: Topic, handler: CommandHandler);
}

#[derive(Debug, Clone, PartialEq)]
pub struct BusMessage {
    pub topic: Topic,
    pub payload: Value,
}

/// In-process transport. Published messages fan out over a broadcast channel.
pub struct LocalBus {
    sender: broadcast::Sender<BusMessage>,
    snapshots: Mutex<HashMap<Topic, SnapshotProvider>>,
    handlers: Mutex<HashMap<Topic, Vec<CommandHandler>>>,
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl LocalBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            snapshots: Mutex::new(HashMap::new()),
            handlers: Mutex::new(HashMap::new()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        self.sender.subscribe()
    }

    /// Answers a snapshot request, or `None` when nothing is registered.
    pub fn snapshot(&self, topic: Topic) -> Option<Value> {
        let snapshots = self.snapshots.lock().unwrap_or_else(|e| e.into_inner());
        snapshots.get(&topic).map(|provider| provider())
    }

    /// Routes an inbound command to every handler registered for `topic`.
    /// Returns the number of handlers invoked.
    pub fn dispatch(&self, topic: Topic, payload: &Value) -> usize {
        let handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
        match handlers.get(&topic) {
            Some(list) => {
                for handler in list {
                    handler(payload);
                }
                list.len()
            }
            None => {
                log::warn!("[BUS] no handler for topic {}", topic);
                0
            }
        }
    }

    /// Parses `<Topic> <json>` and dispatches it.
    pub fn dispatch_line(&self, line: &str) -> Result<usize, String> {
        let line = line.trim();
        let (topic_raw, payload_raw) = match line.split_once(char::is_whitespace) {
            Some((topic, rest)) => (topic, rest.trim()),
            None => (line, ""),
        };
        let topic: Topic = topic_raw.parse()?;
        let payload = if payload_raw.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(payload_raw)
                .map_err(|e| format!("invalid payload '{}': {}", payload_raw, e))?
        };
        Ok(self.dispatch(topic, &payload))
    }
}

impl Transport for LocalBus {
    fn publish(&self, topic: Topic, payload: Value) {
        log::debug!("[BUS] {} {}", topic, payload);
        // no receivers is fine; the UI may not be attached
        let _ = self.sender.send(BusMessage { topic, payload });
    }

    fn register_snapshot(&self, topic: Topic, provider: SnapshotProvider) {
        let mut snapshots = self.snapshots.lock().unwrap_or_else(|e| e.into_inner());
        if snapshots.insert(topic, provider).is_some() {
            log::warn!("[BUS] snapshot provider for {} replaced", topic);
        }
    }

    fn register_handler(&self, topic: Topic, handler: CommandHandler) {
        self.handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(topic)
            .or_default()
            .push(handler);
    }
}

/// Drains everything currently buffered on a bus receiver.
pub fn drain_messages(rx: &mut broadcast::Receiver<BusMessage>) -> Vec<BusMessage> {
    let mut out = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(msg) => out.push(msg),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                log::warn!("[BUS] receiver lagged, {} messages skipped", skipped);
            }
            Err(_) => break,
        }
    }
    out
}

use crate::{OrderEvent, OrderPipelineError, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::VecDeque;

/// What the caller of [`KeyQueueRegistry::push`] has to do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pushed {
    /// The key had no queue; the caller owns scheduling its drain.
    NewQueue,
    /// Appended behind a queue whose drain is already scheduled or running.
    Appended,
}

/// A key that still held a queue when the workers were stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbandonedQueue {
    pub order_id: i64,
    /// Events queued behind the in-flight one.
    pub pending: usize,
    /// Event whose apply was cut short, if one was running.
    pub in_flight: Option<String>,
}

impl AbandonedQueue {
    /// Events that never reached the order store
    pub fn unapplied(&self) -> usize {
        self.pending + usize::from(self.in_flight.is_some())
    }
}

struct KeyQueue {
    pending: VecDeque<OrderEvent>,
    in_flight: Option<String>,
}

/// Per-order FIFO queues.
///
/// A key has an entry exactly while a drain for it is scheduled or running.
/// Both `push` and `pop_or_remove` run under the key's shard lock, so an
/// event can never land in a queue that was just released.
pub struct KeyQueueRegistry {
    queues: DashMap<i64, KeyQueue>,
    capacity: Option<usize>,
}

impl KeyQueueRegistry {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            queues: DashMap::new(),
            capacity,
        }
    }

    pub fn push(&self, key: i64, event: OrderEvent) -> Result<Pushed> {
        match self.queues.entry(key) {
            Entry::Occupied(mut entry) => {
                if let Some(capacity) = self.capacity {
                    if entry.get().pending.len() >= capacity {
                        return Err(OrderPipelineError::QueueOverflow { order_id: key, capacity });
                    }
                }
                entry.get_mut().pending.push_back(event);
                Ok(Pushed::Appended)
            }
            Entry::Vacant(entry) => {
                entry.insert(KeyQueue {
                    pending: VecDeque::from([event]),
                    in_flight: None,
                });
                Ok(Pushed::NewQueue)
            }
        }
    }

    /// Pop the head event and mark it in flight, or drop the key's entry if
    /// its queue is empty.
    ///
    /// `None` means the entry is gone and the drain must stop.
    pub fn pop_or_remove(&self, key: i64) -> Option<OrderEvent> {
        match self.queues.entry(key) {
            Entry::Occupied(mut entry) => {
                let queue = entry.get_mut();
                match queue.pending.pop_front() {
                    Some(event) => {
                        queue.in_flight = Some(event.event_id.clone());
                        Some(event)
                    }
                    None => {
                        entry.remove();
                        None
                    }
                }
            }
            Entry::Vacant(_) => None,
        }
    }

    /// The in-flight event for `key` is finished, whatever its outcome
    pub fn settle(&self, key: i64) {
        if let Some(mut queue) = self.queues.get_mut(&key) {
            queue.in_flight = None;
        }
    }

    pub fn active_keys(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    pub fn contains(&self, key: i64) -> bool {
        self.queues.contains_key(&key)
    }

    /// Events waiting behind whatever is being applied right now
    pub fn pending_events(&self, key: i64) -> usize {
        self.queues.get(&key).map_or(0, |queue| queue.pending.len())
    }

    pub fn in_flight(&self, key: i64) -> Option<String> {
        self.queues.get(&key).and_then(|queue| queue.in_flight.clone())
    }

    pub fn snapshot(&self) -> Vec<AbandonedQueue> {
        self.queues
            .iter()
            .map(|entry| AbandonedQueue {
                order_id: *entry.key(),
                pending: entry.value().pending.len(),
                in_flight: entry.value().in_flight.clone(),
            })
            .collect()
    }
}

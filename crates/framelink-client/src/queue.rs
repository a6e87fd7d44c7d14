use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use tokio::sync::Notify;

/// Bounded single-consumer queue that evicts its oldest entry when full.
///
/// Producers never wait. Used for heartbeat frames on the low-priority send
/// path and for unsolicited frames on their way to observers, where the
/// freshest data matters more than completeness.
#[derive(Debug)]
pub(crate) struct LossyQueue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    notify: Notify,
}

impl<T> LossyQueue<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
        }
    }

    /// Append an item. Returns the evicted entry when the queue was full.
    pub(crate) fn push(&self, item: T) -> Option<T> {
        let evicted = {
            let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
            let evicted = if items.len() >= self.capacity {
                items.pop_front()
            } else {
                None
            };
            items.push_back(item);
            evicted
        };
        self.notify.notify_one();
        evicted
    }

    pub(crate) fn try_pop(&self) -> Option<T> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    /// Wait for the next item. Cancel-safe: dropping the future loses nothing.
    pub(crate) async fn pop(&self) -> T {
        loop {
            if let Some(item) = self.try_pop() {
                return item;
            }
            self.notify.notified().await;
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

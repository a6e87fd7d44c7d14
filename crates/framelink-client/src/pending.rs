use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use framelink_frame::Frame;
use tokio::sync::oneshot;

use crate::error::{ClientError, Result};

pub(crate) type ResponseReceiver = oneshot::Receiver<Result<Frame>>;

/// In-flight commands keyed by message id.
///
/// Each entry is resolved at most once: whoever removes it from the table
/// (the read loop on a response, the caller on timeout or cancellation, or
/// `fail_all` on stop) owns its completion. The lock is never held across an
/// await point.
#[derive(Debug, Default)]
pub(crate) struct PendingTable {
    entries: Mutex<HashMap<u16, oneshot::Sender<Result<Frame>>>>,
}

impl PendingTable {
    fn lock(&self) -> MutexGuard<'_, HashMap<u16, oneshot::Sender<Result<Frame>>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new in-flight command.
    pub(crate) fn register(&self, msg_id: u16) -> Result<ResponseReceiver> {
        let mut entries = self.lock();
        if entries.contains_key(&msg_id) {
            return Err(ClientError::MessageIdCollision(msg_id));
        }
        let (tx, rx) = oneshot::channel();
        entries.insert(msg_id, tx);
        Ok(rx)
    }

    /// Complete the entry for `msg_id` with a response. Returns false for unknown ids.
    pub(crate) fn resolve(&self, msg_id: u16, frame: Frame) -> bool {
        let Some(tx) = self.lock().remove(&msg_id) else {
            return false;
        };
        // The caller may have given up in the meantime.
        let _ = tx.send(Ok(frame));
        true
    }

    /// Drop the entry for `msg_id` without completing it.
    pub(crate) fn remove(&self, msg_id: u16) -> bool {
        self.lock().remove(&msg_id).is_some()
    }

    /// Fail every entry with an error built by `make_err`. Returns how many were failed.
    pub(crate) fn fail_all(&self, make_err: impl Fn() -> ClientError) -> usize {
        let drained: Vec<_> = self.lock().drain().collect();
        let count = drained.len();
        for (_, tx) in drained {
            let _ = tx.send(Err(make_err()));
        }
        count
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }
}

/// Removes a pending entry when the waiting call is abandoned.
pub(crate) struct PendingGuard<'a> {
    table: &'a PendingTable,
    msg_id: u16,
    armed: bool,
}

impl<'a> PendingGuard<'a> {
    pub(crate) fn new(table: &'a PendingTable, msg_id: u16) -> Self {
        Self {
            table,
            msg_id,
            armed: true,
        }
    }

    /// The entry was already removed by whoever completed it.
    pub(crate) fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.table.remove(self.msg_id);
        }
    }
}

//! Asynchronous notification (LISTEN / NOTIFY)
//!
//! LISTEN/UNLISTEN actions and NOTIFY events are collected per transaction
//! and take effect at commit; abort discards them. Committed events go to a
//! shared queue. A listening backend reads the queue from its own position
//! when notify processing runs outside a transaction, and hands every event
//! for a listened channel to the delivery hook.

use super::error::{ereport, sqlstate, Result};
use super::globals::OutputDest;
use super::process::Backend;
use crate::fmgr::Oid;
use std::collections::VecDeque;
use tracing::{debug, info};

/// Longest channel name, in bytes.
pub const MAX_CHANNEL_LEN: usize = 63;

/// Payloads must be shorter than this, in bytes.
pub const NOTIFY_PAYLOAD_MAX_LENGTH: usize = 8000;

pub const DEFAULT_QUEUE_CAPACITY: usize = 65_536;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedNotification {
    pub database_id: Oid,
    pub channel: String,
    pub payload: String,
    pub sender_pid: u32,
}

/// Shared queue of committed notifications.
#[derive(Debug)]
pub struct NotifyQueue {
    entries: VecDeque<QueuedNotification>,
    /// Position of `entries[0]`
    tail: u64,
    capacity: usize,
}

impl NotifyQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            tail: 0,
            capacity,
        }
    }

    /// Position the next entry will get.
    pub fn head(&self) -> u64 {
        self.tail + self.entries.len() as u64
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn has_room_for(&self, count: usize) -> bool {
        self.entries.len() + count <= self.capacity
    }

    fn push(&mut self, notification: QueuedNotification) {
        self.entries.push_back(notification);
    }

    /// Entries from `pos` to the head.
    fn read_from(&self, pos: u64) -> Vec<QueuedNotification> {
        let skip = pos.saturating_sub(self.tail) as usize;
        self.entries.iter().skip(skip).cloned().collect()
    }

    /// Drop entries every listener has read.
    fn advance_tail(&mut self, oldest_pos: u64) {
        while self.tail < oldest_pos && self.entries.pop_front().is_some() {
            self.tail += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ListenAction {
    Listen(String),
    Unlisten(String),
    UnlistenAll,
}

/// Backend-local listen state.
#[derive(Debug, Default)]
pub struct ListenState {
    /// Channels this backend listens on, in LISTEN order
    pub channels: Vec<String>,
    /// Read position in the shared queue; `None` when not registered
    pub queue_pos: Option<u64>,
    pub notify_interrupt_pending: bool,
    pending_actions: Vec<ListenAction>,
    pending_notifies: Vec<(String, String)>,
}

impl ListenState {
    pub fn is_listening(&self, channel: &str) -> bool {
        self.channels.iter().any(|c| c == channel)
    }
}

impl Backend {
    pub fn async_listen(&mut self, channel: &str) -> Result<()> {
        self.require_transaction("LISTEN")?;
        debug!(channel, "LISTEN");
        self.listen.pending_actions.push(ListenAction::Listen(channel.to_string()));
        Ok(())
    }

    pub fn async_unlisten(&mut self, channel: &str) -> Result<()> {
        self.require_transaction("UNLISTEN")?;
        debug!(channel, "UNLISTEN");
        // Nothing to undo if we never listened and nothing is pending
        if self.listen.channels.is_empty() && self.listen.pending_actions.is_empty() {
            return Ok(());
        }
        self.listen.pending_actions.push(ListenAction::Unlisten(channel.to_string()));
        Ok(())
    }

    pub fn async_unlisten_all(&mut self) -> Result<()> {
        self.require_transaction("UNLISTEN")?;
        debug!("UNLISTEN *");
        if self.listen.channels.is_empty() && self.listen.pending_actions.is_empty() {
            return Ok(());
        }
        self.listen.pending_actions.push(ListenAction::UnlistenAll);
        Ok(())
    }

    /// Queue a notification for delivery at commit.
    pub fn async_notify(&mut self, channel: &str, payload: Option<&str>) -> Result<()> {
        self.require_transaction("NOTIFY")?;
        if channel.is_empty() {
            return Err(ereport!(sqlstate::INVALID_PARAMETER_VALUE, "channel name cannot be empty"));
        }
        if channel.len() > MAX_CHANNEL_LEN {
            return Err(ereport!(sqlstate::INVALID_PARAMETER_VALUE, "channel name too long"));
        }
        let payload = payload.unwrap_or("");
        if payload.len() >= NOTIFY_PAYLOAD_MAX_LENGTH {
            return Err(ereport!(sqlstate::INVALID_PARAMETER_VALUE, "payload string too long"));
        }
        let duplicate = self
            .listen
            .pending_notifies
            .iter()
            .any(|(c, p)| c == channel && p == payload);
        if !duplicate {
            self.listen
                .pending_notifies
                .push((channel.to_string(), payload.to_string()));
        }
        Ok(())
    }

    /// Register as a listener and make sure the queue can take our events.
    /// Runs before the commit is made durable so a full queue aborts it.
    pub(crate) fn pre_commit_notify(&mut self) -> Result<()> {
        let wants_listen = self
            .listen
            .pending_actions
            .iter()
            .any(|a| matches!(a, ListenAction::Listen(_)));
        let pending = self.listen.pending_notifies.len();
        if !wants_listen && pending == 0 {
            return Ok(());
        }
        let already_registered = self.listen.queue_pos.is_some();
        let queue = &self.shared()?.notify_queue;
        if pending > 0 && !queue.has_room_for(pending) {
            return Err(ereport!(
                sqlstate::OBJECT_NOT_IN_PREREQUISITE_STATE,
                "too many notifications in the NOTIFY queue"
            ));
        }
        if wants_listen && !already_registered {
            let head = queue.head();
            self.listen.queue_pos = Some(head);
        }
        Ok(())
    }

    pub(crate) fn at_commit_notify(&mut self) {
        for action in std::mem::take(&mut self.listen.pending_actions) {
            match action {
                ListenAction::Listen(channel) => {
                    if !self.listen.is_listening(&channel) {
                        self.listen.channels.push(channel);
                    }
                }
                ListenAction::Unlisten(channel) => self.listen.channels.retain(|c| *c != channel),
                ListenAction::UnlistenAll => self.listen.channels.clear(),
            }
        }
        if self.listen.channels.is_empty() {
            self.listen.queue_pos = None;
        }

        let notifies = std::mem::take(&mut self.listen.pending_notifies);
        if self.listen.queue_pos.is_none() {
            // No listener in this process: nothing may hold queue space
            if let Some(shared) = self.shared.as_mut() {
                let head = shared.notify_queue.head();
                shared.notify_queue.advance_tail(head);
            }
            if !notifies.is_empty() {
                debug!(count = notifies.len(), "no listeners; notifications discarded");
            }
            return;
        }
        if notifies.is_empty() {
            return;
        }
        let database_id = self.globals.my_database_id.unwrap_or_default();
        let sender_pid = self.globals.my_proc_pid;
        if let Some(shared) = self.shared.as_mut() {
            for (channel, payload) in notifies {
                shared.notify_queue.push(QueuedNotification {
                    database_id,
                    channel,
                    payload,
                    sender_pid,
                });
            }
            // We are the only backend; signal ourselves
            self.listen.notify_interrupt_pending = true;
        }
    }

    pub(crate) fn at_abort_notify(&mut self) {
        self.listen.pending_actions.clear();
        self.listen.pending_notifies.clear();
    }

    /// Deliver queued notifications for listened channels. Does nothing
    /// inside a transaction; the interrupt stays pending until it ends.
    pub fn process_notify_interrupt(&mut self) -> Result<()> {
        if self.is_transaction_state() || !self.listen.notify_interrupt_pending {
            return Ok(());
        }
        self.listen.notify_interrupt_pending = false;

        let Some(pos) = self.listen.queue_pos else {
            return Ok(());
        };
        let database_id = self.globals.my_database_id.unwrap_or_default();
        let shared = self.shared_mut()?;
        let events = shared.notify_queue.read_from(pos);
        let head = shared.notify_queue.head();
        shared.notify_queue.advance_tail(head);
        self.listen.queue_pos = Some(head);

        for event in events {
            if event.database_id != database_id || !self.listen.is_listening(&event.channel) {
                continue;
            }
            match self.globals.notify_hook {
                Some(hook) => hook(&event.channel, &event.payload, event.sender_pid),
                None if self.globals.where_to_send_output == OutputDest::Debug => {
                    info!(
                        channel = %event.channel,
                        payload = %event.payload,
                        pid = event.sender_pid,
                        "asynchronous notification received"
                    );
                }
                None => {}
            }
        }
        Ok(())
    }

    pub fn reset_async_state(&mut self) {
        self.listen = ListenState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(channel: &str) -> QueuedNotification {
        QueuedNotification {
            database_id: 1,
            channel: channel.to_string(),
            payload: String::new(),
            sender_pid: 7,
        }
    }

    #[test]
    fn test_queue_positions() {
        let mut queue = NotifyQueue::new(4);
        assert_eq!(queue.head(), 0);
        queue.push(event("a"));
        queue.push(event("b"));
        assert_eq!(queue.head(), 2);
        assert_eq!(queue.read_from(1), vec![event("b")]);

        queue.advance_tail(2);
        assert!(queue.is_empty());
        assert_eq!(queue.head(), 2);
        queue.push(event("c"));
        assert_eq!(queue.read_from(2), vec![event("c")]);
    }

    #[test]
    fn test_queue_capacity() {
        let mut queue = NotifyQueue::new(2);
        assert!(queue.has_room_for(2));
        queue.push(event("a"));
        assert!(!queue.has_room_for(2));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_advance_tail_past_head_stops() {
        let mut queue = NotifyQueue::new(4);
        queue.push(event("a"));
        queue.advance_tail(10);
        assert!(queue.is_empty());
        assert_eq!(queue.head(), 1);
        assert!(queue.has_room_for(4));
    }
}

//! Notification capture
//!
//! The engine hands every notification for a listened channel to
//! `capture_notification`, which appends it here. Callers drain the queue
//! with `poll_notification`, oldest first.

use crate::error::{EmbedError, Result};
use crate::session::{self, with_backend};
use crate::txn;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// An event received on a listened channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub channel: String,
    /// Empty when the sender gave no payload
    pub payload: String,
    pub sender_pid: u32,
}

static QUEUE: Lazy<Mutex<VecDeque<Notification>>> = Lazy::new(|| Mutex::new(VecDeque::new()));

/// Delivery hook installed into the engine at initialize.
pub(crate) fn capture_notification(channel: &str, payload: &str, sender_pid: u32) {
    debug!(channel, sender_pid, "captured notification");
    QUEUE.lock().push_back(Notification {
        channel: channel.to_string(),
        payload: payload.to_string(),
        sender_pid,
    });
}

pub(crate) fn drain_queue() {
    let dropped = {
        let mut queue = QUEUE.lock();
        let n = queue.len();
        queue.clear();
        n
    };
    if dropped > 0 {
        debug!(dropped, "discarded undelivered notifications");
    }
}

fn require_channel(channel: &str) -> Result<()> {
    if channel.is_empty() {
        return Err(EmbedError::InvalidArgument("Channel name required".to_string()));
    }
    Ok(())
}

/// Start listening on `channel`. Takes effect when the transaction commits.
pub fn listen(channel: &str) -> Result<()> {
    session::record(
        require_channel(channel)
            .and_then(|_| txn::autocommit(|backend| backend.async_listen(channel), EmbedError::Listen)),
    )
}

/// Stop listening on `channel`, or on every channel for `None`.
pub fn unlisten(channel: Option<&str>) -> Result<()> {
    let outcome = match channel {
        Some(channel) => require_channel(channel)
            .and_then(|_| txn::autocommit(|backend| backend.async_unlisten(channel), EmbedError::Unlisten)),
        None => txn::autocommit(|backend| backend.async_unlisten_all(), EmbedError::Unlisten),
    };
    session::record(outcome)
}

/// Send a notification. Listeners see it once the transaction commits.
pub fn notify(channel: &str, payload: Option<&str>) -> Result<()> {
    session::record(
        require_channel(channel)
            .and_then(|_| txn::autocommit(|backend| backend.async_notify(channel, payload), EmbedError::Notify)),
    )
}

/// Oldest received notification, if any. Never blocks.
///
/// Pending engine deliveries are processed first; that does nothing while a
/// transaction is open. A processing failure is recorded as the last error
/// and the queue is still read.
pub fn poll_notification() -> Option<Notification> {
    if session::is_initialized() {
        if let Err(message) = with_backend(|backend| backend.process_notify_interrupt()) {
            warn!(error = %message, "notification processing failed");
            let _ = session::record::<()>(Err(EmbedError::Poll(message)));
        }
    }
    QUEUE.lock().pop_front()
}

/// Number of captured notifications not yet polled.
pub fn pending_notifications() -> usize {
    QUEUE.lock().len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_is_fifo() {
        let _serial = crate::testutil::serial();
        drain_queue();
        capture_notification("a", "1", 10);
        capture_notification("b", "", 11);
        assert_eq!(pending_notifications(), 2);

        let first = poll_notification().unwrap();
        assert_eq!((first.channel.as_str(), first.payload.as_str()), ("a", "1"));
        let second = poll_notification().unwrap();
        assert_eq!(second.channel, "b");
        assert_eq!(second.payload, "");
        assert_eq!(second.sender_pid, 11);
        assert!(poll_notification().is_none());
    }

    #[test]
    fn test_channel_required() {
        let _serial = crate::testutil::serial();
        assert!(matches!(listen(""), Err(EmbedError::InvalidArgument(_))));
        assert!(matches!(notify("", None), Err(EmbedError::InvalidArgument(_))));
        assert!(matches!(unlisten(Some("")), Err(EmbedError::InvalidArgument(_))));
    }

    #[test]
    fn test_unheard_notifications_take_no_queue_space() {
        use crate::backend::async_notify::DEFAULT_QUEUE_CAPACITY;

        let _serial = crate::testutil::serial();
        let cluster = crate::testutil::cluster();
        crate::testutil::start(&cluster);

        let batch = 1000;
        for round in 0..DEFAULT_QUEUE_CAPACITY / batch + 2 {
            txn::begin().unwrap();
            for i in 0..batch {
                notify("nobody", Some(&format!("{round}-{i}"))).unwrap();
            }
            txn::commit().unwrap();
        }
        notify("nobody", Some("one more")).unwrap();
        assert!(poll_notification().is_none());

        listen("jobs").unwrap();
        notify("jobs", Some("still delivered")).unwrap();
        let got = poll_notification().unwrap();
        assert_eq!(got.payload, "still delivered");
        session::shutdown();
    }

    #[test]
    fn test_delivery_waits_for_commit() {
        let _serial = crate::testutil::serial();
        let cluster = crate::testutil::cluster();
        crate::testutil::start(&cluster);
        listen("ch").unwrap();

        txn::begin().unwrap();
        notify("ch", Some("a")).unwrap();
        notify("ch", Some("b")).unwrap();
        assert!(poll_notification().is_none());
        txn::commit().unwrap();

        let payloads: Vec<String> = std::iter::from_fn(poll_notification).map(|n| n.payload).collect();
        assert_eq!(payloads, ["a", "b"]);
        assert!(poll_notification().is_none());
        session::shutdown();
    }
}

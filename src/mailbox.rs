//! Single-slot inbound cell shared between the network task and the control tick.
//!
//! The producer overwrites, the consumer takes. At most one unconsumed value
//! exists at any time; a value that is overwritten before a tick sees it is
//! dropped and counted. The mutex is only held for the swap, so neither side
//! can block the other for longer than a move.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

struct Slot<T> {
    value: Mutex<Option<T>>,
    overwritten: AtomicU64,
    received: AtomicU64,
}

pub struct Mailbox<T> {
    slot: Arc<Slot<T>>,
}

impl<T> Clone for Mailbox<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Slot {
                value: Mutex::new(None),
                overwritten: AtomicU64::new(0),
                received: AtomicU64::new(0),
            }),
        }
    }

    /// Store `value`, replacing any value not yet taken.
    pub fn put(&self, value: T) {
        let mut slot = self
            .slot
            .value
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.replace(value).is_some() {
            self.slot.overwritten.fetch_add(1, Ordering::Relaxed);
        }
        self.slot.received.fetch_add(1, Ordering::Relaxed);
    }

    /// Take the freshest value, clearing the "has new data" state.
    pub fn take(&self) -> Option<T> {
        self.slot
            .value
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    pub fn has_new_data(&self) -> bool {
        self.slot
            .value
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or_else(|poisoned| poisoned.into_inner().is_some())
    }

    /// Values replaced before anyone consumed them.
    pub fn overwritten(&self) -> u64 {
        self.slot.overwritten.load(Ordering::Relaxed)
    }

    pub fn received(&self) -> u64 {
        self.slot.received.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_mailbox() {
        let mailbox: Mailbox<u32> = Mailbox::new();
        assert!(!mailbox.has_new_data());
        assert_eq!(mailbox.take(), None);
    }

    #[test]
    fn test_second_put_wins() {
        let mailbox = Mailbox::new();
        mailbox.put(1);
        mailbox.put(2);
        assert!(mailbox.has_new_data());
        assert_eq!(mailbox.take(), Some(2));
        assert_eq!(mailbox.overwritten(), 1);
        assert_eq!(mailbox.received(), 2);
    }

    #[test]
    fn test_consumed_exactly_once() {
        let mailbox = Mailbox::new();
        mailbox.put("pose");
        assert_eq!(mailbox.take(), Some("pose"));
        assert!(!mailbox.has_new_data());
        assert_eq!(mailbox.take(), None);
    }

    #[test]
    fn test_clones_share_the_slot() {
        let producer = Mailbox::new();
        let consumer = producer.clone();
        let handle = std::thread::spawn(move || {
            for i in 0..1000u32 {
                producer.put(i);
            }
        });
        handle.join().unwrap();
        assert_eq!(consumer.take(), Some(999));
        assert_eq!(consumer.received(), 1000);
        assert_eq!(consumer.overwritten(), 999);
    }
}

//! Thread-safe FIFO of outbound work items.
//!
//! Pushes come from the event thread; only the polling engine ever peeks or
//! pops, both from the same thread, so a failed send can leave the peeked
//! item in place without any extra coordination.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::packet::Packet;

#[derive(Debug, Clone)]
pub struct WorkItem {
    pub stack_address: usize,
    pub packet: Packet,
}

#[derive(Default)]
pub struct OutboundQueue {
    items: Mutex<VecDeque<WorkItem>>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        OutboundQueue { items: Mutex::new(VecDeque::new()) }
    }

    pub fn push(&self, item: WorkItem) {
        self.items.lock().unwrap().push_back(item);
    }

    /// Clones the front item without removing it. The critical section is
    /// just the lock/clone/unlock; the clone is cheap (a handful of bytes).
    pub fn peek(&self) -> Option<WorkItem> {
        self.items.lock().unwrap().front().cloned()
    }

    /// Removes the front item. Only valid to call after a `peek` that
    /// returned `Some` on the same (polling-engine) thread.
    pub fn pop(&self) {
        self.items.lock().unwrap().pop_front();
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(addr: usize) -> WorkItem {
        WorkItem { stack_address: addr, packet: Packet::stack_enumerate_request() }
    }

    #[test]
    fn fifo_order_preserved() {
        let q = OutboundQueue::new();
        q.push(item(0));
        q.push(item(1));
        q.push(item(2));
        assert_eq!(q.peek().unwrap().stack_address, 0);
        q.pop();
        assert_eq!(q.peek().unwrap().stack_address, 1);
        q.pop();
        assert_eq!(q.peek().unwrap().stack_address, 2);
        q.pop();
        assert!(q.peek().is_none());
    }

    #[test]
    fn peek_without_pop_is_idempotent() {
        let q = OutboundQueue::new();
        q.push(item(5));
        assert_eq!(q.peek().unwrap().stack_address, 5);
        assert_eq!(q.peek().unwrap().stack_address, 5);
        assert_eq!(q.len(), 1);
    }
}

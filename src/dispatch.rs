//! Dispatcher glue: routes outbound requests by UID and hands inbound
//! packets back to the embedding daemon.
//!
//! The slave table is mutable and lives on the polling thread for the
//! engine's lifetime; the event thread must never touch it directly. Once
//! discovery completes, [`RoutingTable`] captures the only two facts the
//! event thread needs — `slave_num` and the UID → slot map — as an
//! immutable, `Arc`-shareable snapshot, so routing decisions never require
//! locking the live table.

use std::collections::HashMap;
use std::io;

use crate::error::EnqueueError;
use crate::frame::MAX_PAYLOAD_LEN;
use crate::handoff::Handoff;
use crate::hal::ChipSelect;
use crate::packet::{Packet, BROADCAST_UID};
use crate::queue::{OutboundQueue, WorkItem};
use crate::slave::SlaveTable;
use crate::log_error;

/// Implemented by the embedding daemon: the other side of the SPI stack
/// boundary. `register_uid` is called once per UID found during discovery;
/// `deliver_response` is called once per packet the polling engine receives.
pub trait StackDispatch {
    fn register_uid(&mut self, uid: u32, stack_address: usize);
    fn deliver_response(&mut self, packet: Packet);
}

/// Frozen after discovery: present-slave count plus the UID → slot map.
/// Safe to share across threads without synchronization since nothing
/// mutates it after construction.
pub struct RoutingTable {
    slave_num: usize,
    uid_to_slot: HashMap<u32, usize>,
}

impl RoutingTable {
    /// Builds the snapshot from a table that has just finished discovery.
    pub fn from_slave_table<CS: ChipSelect>(table: &SlaveTable<CS>) -> Self {
        let slave_num = table.slave_num();
        let mut uid_to_slot = HashMap::new();
        for stack_address in 0..slave_num {
            for &uid in table.get(stack_address).uids() {
                uid_to_slot.insert(uid, stack_address);
            }
        }
        RoutingTable { slave_num, uid_to_slot }
    }

    pub fn slave_num(&self) -> usize {
        self.slave_num
    }

    pub fn slave_for_uid(&self, uid: u32) -> Option<usize> {
        self.uid_to_slot.get(&uid).copied()
    }
}

/// Validates and enqueues `packet` for delivery over the SPI stack. UID 0
/// fans the packet out to every present slave; any other UID resolves
/// through `routing` to a single slot. Oversize packets are rejected here,
/// before they ever reach the queue, so they are never retried.
pub fn dispatch_to_spi(
    routing: &RoutingTable,
    queue: &OutboundQueue,
    packet: Packet,
) -> Result<(), EnqueueError> {
    if packet.as_bytes().len() > MAX_PAYLOAD_LEN {
        let err = EnqueueError::Oversize { declared: packet.length(), max: MAX_PAYLOAD_LEN };
        log_error!("{err}");
        return Err(err);
    }

    if packet.uid() == BROADCAST_UID {
        for stack_address in 0..routing.slave_num() {
            queue.push(WorkItem { stack_address, packet: packet.clone() });
        }
        return Ok(());
    }

    match routing.slave_for_uid(packet.uid()) {
        Some(stack_address) => {
            queue.push(WorkItem { stack_address, packet });
            Ok(())
        }
        None => {
            let err = EnqueueError::UnknownUid(packet.uid());
            log_error!("{err}");
            Err(err)
        }
    }
}

/// Blocks until the polling engine stages a received packet, then hands it
/// to `dispatcher` and releases the engine to continue. Meant to be called
/// from the event thread when `handoff.notify_fd()` becomes readable.
pub fn dispatch_from_spi(
    handoff: &Handoff,
    dispatcher: &mut dyn StackDispatch,
) -> io::Result<()> {
    let packet = handoff.drain()?;
    dispatcher.deliver_response(packet);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::mock::MockChipSelect;
    use crate::slave::{SlaveStatus, MAX_SLAVES};

    fn discovered_table(slots: &[&[u32]]) -> SlaveTable<MockChipSelect> {
        let mut t = SlaveTable::new((0..MAX_SLAVES).map(|_| MockChipSelect::default()).collect());
        for (i, uids) in slots.iter().enumerate() {
            t.get_mut(i).status = SlaveStatus::Available;
            t.get_mut(i).set_uids(uids);
        }
        t
    }

    fn packet_for(uid: u32) -> Packet {
        let mut req = Packet::stack_enumerate_request();
        let mut bytes = req.as_bytes().to_vec();
        bytes[0..4].copy_from_slice(&uid.to_le_bytes());
        req = Packet::from_bytes(bytes);
        req
    }

    #[test]
    fn routing_table_maps_uids_to_their_slot() {
        let table = discovered_table(&[&[1, 2], &[3]]);
        let routing = RoutingTable::from_slave_table(&table);
        assert_eq!(routing.slave_num(), 2);
        assert_eq!(routing.slave_for_uid(1), Some(0));
        assert_eq!(routing.slave_for_uid(3), Some(1));
        assert_eq!(routing.slave_for_uid(0xDEAD), None);
    }

    #[test]
    fn unknown_uid_is_rejected_without_touching_the_queue() {
        let table = discovered_table(&[&[1]]);
        let routing = RoutingTable::from_slave_table(&table);
        let queue = OutboundQueue::new();
        let err = dispatch_to_spi(&routing, &queue, packet_for(99)).unwrap_err();
        assert_eq!(err, EnqueueError::UnknownUid(99));
        assert!(queue.is_empty());
    }

    #[test]
    fn broadcast_uid_fans_out_to_every_present_slave() {
        let table = discovered_table(&[&[1], &[2], &[3]]);
        let routing = RoutingTable::from_slave_table(&table);
        let queue = OutboundQueue::new();
        dispatch_to_spi(&routing, &queue, packet_for(BROADCAST_UID)).unwrap();
        assert_eq!(queue.len(), 3);
        queue.pop();
        assert_eq!(queue.peek().unwrap().stack_address, 1);
    }

    #[test]
    fn oversize_packet_is_rejected_before_enqueue() {
        let table = discovered_table(&[&[1]]);
        let routing = RoutingTable::from_slave_table(&table);
        let queue = OutboundQueue::new();
        let bytes = vec![0u8; MAX_PAYLOAD_LEN + 1];
        let mut oversize = Packet::from_bytes(bytes);
        let mut raw = oversize.as_bytes().to_vec();
        raw[0..4].copy_from_slice(&1u32.to_le_bytes());
        oversize = Packet::from_bytes(raw);
        let err = dispatch_to_spi(&routing, &queue, oversize).unwrap_err();
        assert!(matches!(err, EnqueueError::Oversize { .. }));
        assert!(queue.is_empty());
    }
}

//! Per-slot slave state and the UID → slave index.

use crate::hal::ChipSelect;
use crate::packet::MAX_UIDS_PER_SLAVE;

pub const MAX_SLAVES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlaveStatus {
    Absent,
    Available,
    AvailableBusy,
}

pub struct Slave<CS> {
    pub stack_address: u8,
    pub select_pin: CS,
    pub status: SlaveStatus,
    uids: [u32; MAX_UIDS_PER_SLAVE],
    uid_count: usize,
}

impl<CS: ChipSelect> Slave<CS> {
    pub fn new(stack_address: u8, select_pin: CS) -> Self {
        Slave {
            stack_address,
            select_pin,
            status: SlaveStatus::Absent,
            uids: [0; MAX_UIDS_PER_SLAVE],
            uid_count: 0,
        }
    }

    pub fn uids(&self) -> &[u32] {
        &self.uids[..self.uid_count]
    }

    pub fn uid_count(&self) -> usize {
        self.uid_count
    }

    /// Replaces this slot's UID set. Non-zero UIDs only; the caller (the
    /// discovery state machine) is responsible for stopping at the first
    /// zero entry.
    pub fn set_uids(&mut self, uids: &[u32]) {
        let n = uids.len().min(MAX_UIDS_PER_SLAVE);
        self.uids[..n].copy_from_slice(&uids[..n]);
        for slot in &mut self.uids[n..] {
            *slot = 0;
        }
        self.uid_count = n;
    }

    pub fn is_present(&self) -> bool {
        self.status != SlaveStatus::Absent
    }
}

/// Fixed 8-slot table, pre-populated with absent slaves at construction.
pub struct SlaveTable<CS> {
    slaves: Vec<Slave<CS>>,
}

impl<CS: ChipSelect> SlaveTable<CS> {
    /// `select_pins` must yield exactly [`MAX_SLAVES`] pins, slot-index order.
    pub fn new(select_pins: Vec<CS>) -> Self {
        assert_eq!(select_pins.len(), MAX_SLAVES, "one select pin per slot");
        let slaves = select_pins
            .into_iter()
            .enumerate()
            .map(|(i, pin)| Slave::new(i as u8, pin))
            .collect();
        SlaveTable { slaves }
    }

    pub fn get(&self, stack_address: usize) -> &Slave<CS> {
        &self.slaves[stack_address]
    }

    pub fn get_mut(&mut self, stack_address: usize) -> &mut Slave<CS> {
        &mut self.slaves[stack_address]
    }

    pub fn all_mut(&mut self) -> &mut [Slave<CS>] {
        &mut self.slaves
    }

    /// Count of present slaves; present slots always form a contiguous
    /// `[0, slave_num)` prefix after discovery.
    pub fn slave_num(&self) -> usize {
        self.slaves.iter().take_while(|s| s.is_present()).count()
    }

    /// First match wins, scanning present slaves in index order.
    pub fn slave_for_uid(&self, uid: u32) -> Option<usize> {
        for (i, slave) in self.slaves.iter().enumerate() {
            if !slave.is_present() {
                break;
            }
            if slave.uids().contains(&uid) {
                return Some(i);
            }
        }
        None
    }
}

//! Bounded-retry slave enumeration, run once before the polling loop starts.

use std::time::Duration;

use crate::hal::{ChipSelect, SpiTransport};
use crate::packet::Packet;
use crate::slave::{SlaveStatus, SlaveTable};
use crate::transceiver::{self, Read};
use crate::{log_debug, log_info};

pub const DEFAULT_RETRIES: u8 = 10;
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(50);

pub struct DiscoveryConfig {
    pub retries: u8,
    pub backoff: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        DiscoveryConfig { retries: DEFAULT_RETRIES, backoff: DEFAULT_BACKOFF }
    }
}

/// Runs the discovery state machine over every slot in `table`, registering
/// each found UID with `register_uid`. `sleep` is injected so tests can skip
/// real backoff delays; production callers pass `std::thread::sleep`.
pub fn discover<CS: ChipSelect>(
    spi: &mut dyn SpiTransport,
    table: &mut SlaveTable<CS>,
    config: &DiscoveryConfig,
    mut register_uid: impl FnMut(u32, usize),
    sleep: impl Fn(Duration),
) {
    log_debug!("starting to discover SPI stack slaves");
    let mut uid_total = 0usize;
    let mut stack_address = 0usize;

    while stack_address < crate::slave::MAX_SLAVES {
        table.get_mut(stack_address).status = SlaveStatus::Available;

        if !send_phase(spi, table, stack_address, config, &sleep) {
            table.get_mut(stack_address).status = SlaveStatus::Absent;
            break;
        }

        let response = match receive_phase(spi, table, stack_address, config, &sleep) {
            Some(packet) => packet,
            None => {
                table.get_mut(stack_address).status = SlaveStatus::Absent;
                break;
            }
        };

        let uids = response.stack_enumerate_response_uids();
        for &uid in &uids {
            register_uid(uid, stack_address);
            uid_total += 1;
        }
        table.get_mut(stack_address).set_uids(&uids);

        stack_address += 1;
    }

    log_info!(
        "SPI stack slave discovery done. Found {stack_address} slave(s) with {uid_total} uid(s) in total"
    );
}

fn send_phase<CS: ChipSelect>(
    spi: &mut dyn SpiTransport,
    table: &mut SlaveTable<CS>,
    stack_address: usize,
    config: &DiscoveryConfig,
    sleep: &impl Fn(Duration),
) -> bool {
    let request = Packet::stack_enumerate_request();
    for _ in 0..config.retries {
        let outcome = transceiver::transceive(spi, table.get_mut(stack_address), Some(&request));
        if outcome.data_sent {
            return true;
        }
        sleep(config.backoff);
    }
    false
}

fn receive_phase<CS: ChipSelect>(
    spi: &mut dyn SpiTransport,
    table: &mut SlaveTable<CS>,
    stack_address: usize,
    config: &DiscoveryConfig,
    sleep: &impl Fn(Duration),
) -> Option<Packet> {
    for _ in 0..config.retries {
        let outcome = transceiver::transceive(spi, table.get_mut(stack_address), None);
        if outcome.data_received {
            return outcome.received;
        }
        debug_assert_ne!(outcome.read, Read::Ok, "data_received must track Read::Ok");
        sleep(config.backoff);
    }
    None
}

//! A single full-duplex exchange with one selected slave.

use crate::frame::{self, ParseResult, FRAME_SIZE, MAX_PAYLOAD_LEN};
use crate::hal::{ChipSelect, SpiTransport};
use crate::packet::Packet;
use crate::slave::{Slave, SlaveStatus};
use crate::{log_debug, log_error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sent {
    Ok,
    None,
    Busy,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Read {
    Ok,
    None,
    Error,
}

#[derive(Debug)]
pub struct Outcome {
    pub sent: Sent,
    pub read: Read,
    pub data_sent: bool,
    pub data_received: bool,
    pub received: Option<Packet>,
    /// Set when the work item must be dropped from the outbound queue
    /// rather than retried next tick — currently only an oversize request.
    /// Transient failures (busy, transport error) are retried instead.
    pub drop_from_queue: bool,
}

impl Outcome {
    fn none_none() -> Self {
        Outcome {
            sent: Sent::None,
            read: Read::None,
            data_sent: false,
            data_received: false,
            received: None,
            drop_from_queue: false,
        }
    }
}

/// Exchanges one 84-byte frame with `slave`. `request` is `None` for a
/// poll-only cycle. Preconditions: `slave.status != Absent`.
pub fn transceive<CS: ChipSelect>(
    spi: &mut dyn SpiTransport,
    slave: &mut Slave<CS>,
    request: Option<&Packet>,
) -> Outcome {
    debug_assert!(slave.status != SlaveStatus::Absent, "must not select an absent slave");

    let (tx, mut outcome) = match (request, slave.status) {
        (None, _) | (Some(_), SlaveStatus::AvailableBusy) => {
            (frame::build(None, 0), Outcome::none_none())
        }
        (Some(packet), SlaveStatus::Available) => {
            let payload = packet.as_bytes();
            if payload.len() > MAX_PAYLOAD_LEN {
                log_error!(
                    "send length is greater than allowed: {} > {}",
                    payload.len(),
                    MAX_PAYLOAD_LEN
                );
                return Outcome {
                    sent: Sent::Error,
                    read: Read::None,
                    data_sent: false,
                    data_received: false,
                    received: None,
                    drop_from_queue: true,
                };
            }
            let outcome = Outcome {
                sent: Sent::Ok,
                read: Read::None,
                data_sent: true,
                data_received: false,
                received: None,
                drop_from_queue: false,
            };
            (frame::build(Some(payload), 0), outcome)
        }
        (Some(_), SlaveStatus::Absent) => unreachable!("precondition violated"),
    };

    let mut rx = [0u8; FRAME_SIZE];
    slave.select_pin.select();
    let transferred = spi.transfer(&tx, &mut rx);
    slave.select_pin.deselect();

    let transferred = match transferred {
        Ok(n) => n,
        Err(e) => {
            log_error!("SPI transfer failed: {e}");
            0
        }
    };

    if transferred != FRAME_SIZE {
        log_error!("ioctl has unexpected return: {transferred} != {FRAME_SIZE}");
        // Transport failure overrides any tentative send result.
        outcome.sent = Sent::Error;
        outcome.read = Read::Error;
        outcome.data_sent = false;
        outcome.data_received = false;
        return outcome;
    }

    match frame::parse(&rx) {
        ParseResult::Empty => {
            outcome.read = Read::None;
        }
        ParseResult::BadPreamble => {
            log_error!("received packet without proper preamble");
            outcome.read = Read::Error;
        }
        ParseResult::BadLength => {
            log_error!("received packet with malformed length");
            outcome.read = Read::Error;
        }
        ParseResult::BadChecksum => {
            log_error!("received packet with wrong checksum");
            outcome.read = Read::Error;
        }
        ParseResult::Ok { payload: None, busy } => {
            slave.status = if busy { SlaveStatus::AvailableBusy } else { SlaveStatus::Available };
            log_debug!("received empty packet over SPI (w/ header)");
            outcome.read = Read::None;
        }
        ParseResult::Ok { payload: Some(bytes), busy } => {
            slave.status = if busy { SlaveStatus::AvailableBusy } else { SlaveStatus::Available };
            outcome.read = Read::Ok;
            outcome.data_received = true;
            outcome.received = Some(Packet::from_bytes(bytes));
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::mock::{MockChipSelect, MockSpiTransport};

    fn slave() -> Slave<MockChipSelect> {
        let mut s = Slave::new(0, MockChipSelect::default());
        s.status = SlaveStatus::Available;
        s
    }

    #[test]
    fn poll_only_when_no_request() {
        let mut spi = MockSpiTransport::new();
        let mut s = slave();
        let outcome = transceive(&mut spi, &mut s, None);
        assert_eq!(outcome.sent, Sent::None);
        assert!(!outcome.data_sent);
        assert_eq!(spi.sent[0][1], 4); // poll-only frame length
    }

    #[test]
    fn busy_slave_forces_poll_only_even_with_request() {
        let mut spi = MockSpiTransport::new();
        let mut s = slave();
        s.status = SlaveStatus::AvailableBusy;
        let req = Packet::stack_enumerate_request();
        let outcome = transceive(&mut spi, &mut s, Some(&req));
        assert_eq!(outcome.sent, Sent::None);
        assert!(!outcome.data_sent, "work item must not be considered dispatched");
        assert_eq!(spi.sent[0][1], 4);
    }

    #[test]
    fn transport_failure_clears_tentative_send_ok() {
        let mut spi = MockSpiTransport::new();
        spi.fail_next = true;
        let mut s = slave();
        let req = Packet::stack_enumerate_request();
        let outcome = transceive(&mut spi, &mut s, Some(&req));
        assert_eq!(outcome.sent, Sent::Error);
        assert_eq!(outcome.read, Read::Error);
        assert!(!outcome.data_sent);
    }

    #[test]
    fn oversize_request_is_rejected_without_a_transfer() {
        let mut spi = MockSpiTransport::new();
        let mut s = slave();
        let bytes = vec![0u8; MAX_PAYLOAD_LEN + 1];
        let req = Packet::from_bytes(bytes);
        let outcome = transceive(&mut spi, &mut s, Some(&req));
        assert_eq!(outcome.sent, Sent::Error);
        assert!(outcome.drop_from_queue, "oversize items must never be retried");
        assert!(spi.sent.is_empty());
    }

    #[test]
    fn busy_bit_in_response_marks_slave_busy() {
        let mut spi = MockSpiTransport::new();
        spi.push_response(frame::build(None, 1));
        let mut s = slave();
        let outcome = transceive(&mut spi, &mut s, None);
        assert_eq!(outcome.read, Read::None);
        assert_eq!(s.status, SlaveStatus::AvailableBusy);
    }

    #[test]
    fn received_payload_surfaces_as_data_received() {
        let mut spi = MockSpiTransport::new();
        let payload = vec![1, 2, 3, 4, 5, 6, 7, 8];
        spi.push_response(frame::build(Some(&payload), 0));
        let mut s = slave();
        let outcome = transceive(&mut spi, &mut s, None);
        assert!(outcome.data_received);
        assert_eq!(outcome.received.unwrap().as_bytes(), &payload[..]);
    }

    #[test]
    fn chip_select_is_asserted_and_released_exactly_once() {
        let mut spi = MockSpiTransport::new();
        let mut s = slave();
        let _ = transceive(&mut spi, &mut s, None);
        assert_eq!(s.select_pin.select_count, 1);
        assert!(!s.select_pin.selected);
    }
}

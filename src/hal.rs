//! Linux-side access to the SPI bus and chip-select GPIO lines.
//!
//! [`SpiTransport`] and [`ChipSelect`] are the seam C2 is built against, so
//! the polling engine and discovery state machine can run unmodified against
//! a [`mock`] implementation in tests.

use std::io;

use rppal::gpio::{Gpio, OutputPin};
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};

use crate::error::BridgeError;
use crate::frame::FRAME_SIZE;

/// A single full-duplex 84-byte exchange.
pub trait SpiTransport {
    fn transfer(&mut self, tx: &[u8; FRAME_SIZE], rx: &mut [u8; FRAME_SIZE]) -> io::Result<usize>;
}

/// A single chip-select line, driven manually around each transfer.
pub trait ChipSelect {
    fn select(&mut self);
    fn deselect(&mut self);
}

/// The stack firmware expects `CPOL=1, CPHA=0`, MSB-first, 8 bits/word, at
/// up to 8 MHz. rppal's `Mode2` is CPOL 1 / CPHA 0.
const SPI_CLOCK_HZ: u32 = 8_000_000;

/// `/dev/spidevN.N` opened with the stack's fixed transfer mode.
///
/// Chip-select is intentionally left to [`GpioChipSelect`]: the stack has up
/// to 8 slots, more than the SPI controller's native select count, so the
/// controller's own CS line is unused and every slot is addressed by an
/// independent GPIO pin instead.
pub struct LinuxSpiDevice {
    spi: Spi,
}

impl LinuxSpiDevice {
    pub fn open(bus: Bus) -> Result<Self, BridgeError> {
        let spi = Spi::new(bus, SlaveSelect::Ss0, SPI_CLOCK_HZ, Mode::Mode2)
            .map_err(BridgeError::Spi)?;
        Ok(LinuxSpiDevice { spi })
    }
}

impl SpiTransport for LinuxSpiDevice {
    fn transfer(&mut self, tx: &[u8; FRAME_SIZE], rx: &mut [u8; FRAME_SIZE]) -> io::Result<usize> {
        self.spi
            .transfer(rx, tx)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}

/// One GPIO output pin used as a slot's chip-select line.
pub struct GpioChipSelect {
    pin: OutputPin,
}

impl GpioChipSelect {
    pub fn new(gpio: &Gpio, offset: u8) -> Result<Self, BridgeError> {
        let mut pin = gpio.get(offset).map_err(BridgeError::Gpio)?.into_output();
        pin.set_high(); // deselected at rest
        Ok(GpioChipSelect { pin })
    }
}

impl ChipSelect for GpioChipSelect {
    fn select(&mut self) {
        self.pin.set_low();
    }

    fn deselect(&mut self) {
        self.pin.set_high();
    }
}

#[cfg(test)]
pub mod mock {
    //! Scripted SPI/GPIO stand-ins used by the component and scenario tests.

    use super::*;
    use std::collections::VecDeque;

    /// A chip-select that just records select/deselect calls.
    #[derive(Default)]
    pub struct MockChipSelect {
        pub selected: bool,
        pub select_count: usize,
    }

    impl ChipSelect for MockChipSelect {
        fn select(&mut self) {
            self.selected = true;
            self.select_count += 1;
        }

        fn deselect(&mut self) {
            self.selected = false;
        }
    }

    /// An SPI transport whose RX frames are scripted in advance, one per
    /// `transfer` call. Falls back to all-zero (idle) frames once exhausted.
    pub struct MockSpiTransport {
        responses: VecDeque<[u8; FRAME_SIZE]>,
        pub sent: Vec<[u8; FRAME_SIZE]>,
        pub fail_next: bool,
    }

    impl MockSpiTransport {
        pub fn new() -> Self {
            MockSpiTransport {
                responses: VecDeque::new(),
                sent: Vec::new(),
                fail_next: false,
            }
        }

        pub fn push_response(&mut self, frame: [u8; FRAME_SIZE]) {
            self.responses.push_back(frame);
        }
    }

    impl SpiTransport for MockSpiTransport {
        fn transfer(
            &mut self,
            tx: &[u8; FRAME_SIZE],
            rx: &mut [u8; FRAME_SIZE],
        ) -> io::Result<usize> {
            self.sent.push(*tx);
            if self.fail_next {
                self.fail_next = false;
                return Ok(FRAME_SIZE - 1); // short transfer
            }
            match self.responses.pop_front() {
                Some(frame) => *rx = frame,
                None => *rx = [0u8; FRAME_SIZE],
            }
            Ok(FRAME_SIZE)
        }
    }
}

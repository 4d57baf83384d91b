//! Error taxonomy. Startup/transport failures are `Result`-propagated;
//! steady-state protocol outcomes (bad checksum, busy slave, unknown UID)
//! are not errors and are represented as data instead (see `frame`,
//! `transceiver`, `queue`).

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum BridgeError {
    Io(io::Error),
    Gpio(rppal::gpio::Error),
    Spi(rppal::spi::Error),
    /// A subsystem the engine depends on (queue, hand-off, device handle)
    /// could not be brought up; `&'static str` names the phase that failed.
    StartupFailed(&'static str),
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::Io(e) => write!(f, "I/O error: {e}"),
            BridgeError::Gpio(e) => write!(f, "GPIO error: {e}"),
            BridgeError::Spi(e) => write!(f, "SPI error: {e}"),
            BridgeError::StartupFailed(phase) => write!(f, "startup failed during: {phase}"),
        }
    }
}

impl std::error::Error for BridgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BridgeError::Io(e) => Some(e),
            BridgeError::Gpio(e) => Some(e),
            BridgeError::Spi(e) => Some(e),
            BridgeError::StartupFailed(_) => None,
        }
    }
}

impl From<io::Error> for BridgeError {
    fn from(e: io::Error) -> Self {
        BridgeError::Io(e)
    }
}

/// Why a packet could not be placed on the outbound queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    /// No slave in the slave table carries this UID.
    UnknownUid(u32),
    /// The packet's declared length exceeds the SPI payload budget.
    Oversize { declared: u8, max: usize },
}

impl fmt::Display for EnqueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnqueueError::UnknownUid(uid) => {
                write!(f, "could not find UID {uid:#010x} in list of known SPI UIDs, discarding message")
            }
            EnqueueError::Oversize { declared, max } => {
                write!(f, "send length is greater than allowed: {declared} > {max}")
            }
        }
    }
}

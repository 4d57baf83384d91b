//! SPI stack subsystem bridge for the RED Brick controller board.
//!
//! Owns the periodic SPI polling loop, the routing/dispatch glue, and the
//! ambient stack (hardware access, configuration, error taxonomy, logging)
//! around it. The event loop and the network-facing dispatch layer beyond
//! [`dispatch::StackDispatch`] are out of scope; they belong to the
//! embedding daemon.

pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod frame;
pub mod hal;
pub mod handoff;
pub mod log;
pub mod packet;
pub mod queue;
pub mod slave;
pub mod transceiver;

use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use rppal::gpio::Gpio;
use rppal::spi::Bus;

use config::Config;
use dispatch::{RoutingTable, StackDispatch};
use error::{BridgeError, EnqueueError};
use handoff::Handoff;
use hal::{GpioChipSelect, LinuxSpiDevice};
use crate::log_info;
use packet::Packet;
use queue::OutboundQueue;
use slave::SlaveTable;

/// Live SPI stack bridge: the event thread's handle onto the polling
/// engine. There is no process-global instance; the embedding daemon owns
/// one (or more, for multiple boards) and drops it to tear the bridge down.
pub struct Bridge {
    routing: RoutingTable,
    queue: Option<Arc<OutboundQueue>>,
    handoff: Option<Arc<Handoff>>,
    running: Arc<AtomicBool>,
    engine_thread: Option<JoinHandle<()>>,
    dispatcher: Box<dyn StackDispatch + Send>,
}

impl Bridge {
    /// Opens the SPI device and chip-select GPIO lines, runs discovery
    /// synchronously on the calling thread, and — only if at least one slave
    /// answered — spawns the dedicated polling thread. `dispatcher` receives
    /// `register_uid` calls during discovery (still on this thread) and
    /// later `deliver_response` calls via [`Bridge::dispatch_from_spi`].
    pub fn init(cfg: Config, mut dispatcher: Box<dyn StackDispatch + Send>) -> Result<Bridge, BridgeError> {
        let bus = match cfg.spi_bus {
            0 => Bus::Spi0,
            1 => Bus::Spi1,
            2 => Bus::Spi2,
            n => {
                log_info!("unsupported SPI bus {n}, falling back to bus 0");
                Bus::Spi0
            }
        };
        let mut spi = LinuxSpiDevice::open(bus)?;
        let gpio = Gpio::new().map_err(BridgeError::Gpio)?;
        let pins = cfg
            .chip_select_offsets
            .iter()
            .map(|&offset| GpioChipSelect::new(&gpio, offset))
            .collect::<Result<Vec<_>, _>>()?;
        let mut table = SlaveTable::new(pins);

        let discovery_cfg =
            discovery::DiscoveryConfig { retries: cfg.discovery_retries, backoff: cfg.discovery_backoff };
        discovery::discover(
            &mut spi,
            &mut table,
            &discovery_cfg,
            |uid, stack_address| dispatcher.register_uid(uid, stack_address),
            std::thread::sleep,
        );

        let routing = RoutingTable::from_slave_table(&table);
        let running = Arc::new(AtomicBool::new(true));

        if routing.slave_num() == 0 {
            log_info!("no SPI slaves found, polling thread will not be started");
            return Ok(Bridge {
                routing,
                queue: None,
                handoff: None,
                running,
                engine_thread: None,
                dispatcher,
            });
        }

        let queue = Arc::new(OutboundQueue::new());
        let handoff = Arc::new(Handoff::new()?);

        let thread_queue = queue.clone();
        let thread_handoff = handoff.clone();
        let thread_running = running.clone();
        let tick_period = cfg.tick_period;
        let engine_thread = std::thread::Builder::new()
            .name("red-stack-poll".into())
            .spawn(move || {
                engine::run(
                    &mut spi,
                    &mut table,
                    &thread_queue,
                    &thread_handoff,
                    &thread_running,
                    tick_period,
                );
            })
            .map_err(|_| BridgeError::StartupFailed("spawning polling thread"))?;

        Ok(Bridge {
            routing,
            queue: Some(queue),
            handoff: Some(handoff),
            running,
            engine_thread: Some(engine_thread),
            dispatcher,
        })
    }

    /// The fd the embedding event loop should register for read-readiness,
    /// if this bridge actually has a polling thread running.
    pub fn notify_fd(&self) -> Option<RawFd> {
        self.handoff.as_ref().map(|h| h.notify_fd())
    }

    /// Validates and enqueues an outbound request. See [`dispatch::dispatch_to_spi`].
    pub fn dispatch_to_spi(&self, packet: Packet) -> Result<(), EnqueueError> {
        match &self.queue {
            Some(queue) => dispatch::dispatch_to_spi(&self.routing, queue, packet),
            None => Err(EnqueueError::UnknownUid(packet.uid())),
        }
    }

    /// Drains one staged inbound packet and hands it to the dispatcher.
    /// Call when `notify_fd()` becomes readable.
    pub fn dispatch_from_spi(&mut self) -> std::io::Result<()> {
        match &self.handoff {
            Some(handoff) => dispatch::dispatch_from_spi(handoff, self.dispatcher.as_mut()),
            None => Ok(()),
        }
    }

    /// Stops the polling thread (if any) and waits for it to exit, releasing
    /// the SPI device and GPIO lines it owns.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.engine_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

//! `red-stackd`: stands up the SPI stack bridge and relays inbound packets
//! to log output until interrupted.
//!
//! The network-facing dispatch layer (routing responses on to TCP/IP
//! clients, the rest of the brickd stack) is out of scope for this crate;
//! [`LoggingDispatch`] below is a stand-in so the binary is runnable and
//! observable on its own.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use red_stack_bridge::config::Config;
use red_stack_bridge::dispatch::StackDispatch;
use red_stack_bridge::log;
use red_stack_bridge::packet::Packet;
use red_stack_bridge::{log_error, log_info};
use red_stack_bridge::Bridge;

struct LoggingDispatch;

impl StackDispatch for LoggingDispatch {
    fn register_uid(&mut self, uid: u32, stack_address: usize) {
        log_info!("registered uid {uid:#010x} at stack address {stack_address}");
    }

    fn deliver_response(&mut self, packet: Packet) {
        log_info!("received packet: uid={:#010x} function={}", packet.uid(), packet.function());
    }
}

fn main() {
    let cfg = Config::from_cmd_line_args();
    log::set_level(cfg.log_level);

    let mut bridge = match Bridge::init(cfg, Box::new(LoggingDispatch)) {
        Ok(bridge) => bridge,
        Err(e) => {
            log_error!("failed to start SPI stack bridge: {e}");
            std::process::exit(1);
        }
    };

    let shutdown_requested = Arc::new(AtomicBool::new(false));
    for sig in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        if let Err(e) = signal_hook::flag::register(sig, shutdown_requested.clone()) {
            log_error!("failed to register signal handler: {e}");
        }
    }

    log_info!("SPI stack bridge running");
    run_event_loop(&mut bridge, &shutdown_requested);
    log_info!("shutting down");
}

/// Minimal poll(2)-based loop: wakes on the bridge's notification fd (if a
/// polling thread is running at all) or once per second to recheck the
/// shutdown flag.
fn run_event_loop(bridge: &mut Bridge, shutdown_requested: &AtomicBool) {
    let notify_fd = match bridge.notify_fd() {
        Some(fd) => fd,
        None => {
            while !shutdown_requested.load(Ordering::Relaxed) {
                std::thread::sleep(std::time::Duration::from_millis(200));
            }
            return;
        }
    };

    while !shutdown_requested.load(Ordering::Relaxed) {
        let mut fds = [libc::pollfd { fd: notify_fd, events: libc::POLLIN, revents: 0 }];
        // SAFETY: `fds` has exactly one well-formed entry for the lifetime of the call.
        let rc = unsafe { libc::poll(fds.as_mut_ptr(), 1, 1000) };
        if rc < 0 {
            continue;
        }
        if fds[0].revents & libc::POLLIN != 0 {
            if let Err(e) = bridge.dispatch_from_spi() {
                log_error!("failed to drain received packet: {e}");
            }
        }
    }
}

//! Single-slot inbound buffer plus the notification/backpressure pairing
//! that couples the polling engine to the event loop.
//!
//! The notification side is a Unix self-pipe: one byte is written per staged
//! packet, and the read end's file descriptor is handed to the embedding
//! event loop to register with its own readiness mechanism (epoll, kqueue,
//! ...). Backpressure comes from a single-permit semaphore, implemented as a
//! bounded channel of capacity 1: the engine blocks on `acquire` until the
//! event loop calls `release`, so it can never overwrite a staged packet the
//! event loop hasn't consumed yet.

use std::io;
use std::os::unix::io::RawFd;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Mutex;

use crate::error::BridgeError;
use crate::packet::Packet;

struct Pipe {
    read_fd: RawFd,
    write_fd: RawFd,
}

impl Pipe {
    fn create() -> Result<Self, BridgeError> {
        let mut fds = [0i32; 2];
        // SAFETY: `fds` is a valid 2-element buffer for `pipe`.
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        if rc != 0 {
            return Err(BridgeError::Io(io::Error::last_os_error()));
        }
        Ok(Pipe { read_fd: fds[0], write_fd: fds[1] })
    }

    fn notify(&self) -> io::Result<()> {
        let byte: u8 = 0;
        // SAFETY: `write_fd` is a valid, open fd owned by this pipe.
        let n = unsafe { libc::write(self.write_fd, &byte as *const u8 as *const _, 1) };
        if n != 1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn drain_one(&self) -> io::Result<()> {
        let mut byte: u8 = 0;
        // SAFETY: `read_fd` is a valid, open fd owned by this pipe.
        let n = unsafe { libc::read(self.read_fd, &mut byte as *mut u8 as *mut _, 1) };
        if n != 1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Drop for Pipe {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.read_fd);
            libc::close(self.write_fd);
        }
    }
}

pub struct Handoff {
    buffer: Mutex<Option<Packet>>,
    pipe: Pipe,
    permit_tx: SyncSender<()>,
    permit_rx: Mutex<Receiver<()>>,
}

impl Handoff {
    pub fn new() -> Result<Self, BridgeError> {
        let pipe = Pipe::create()?;
        let (permit_tx, permit_rx) = sync_channel(1);
        Ok(Handoff {
            buffer: Mutex::new(None),
            pipe,
            permit_tx,
            permit_rx: Mutex::new(permit_rx),
        })
    }

    /// The fd the embedding event loop should register for read-readiness.
    pub fn notify_fd(&self) -> RawFd {
        self.pipe.read_fd
    }

    /// Engine side: stage `packet`, notify the event loop, and block until
    /// it is drained. Called from the polling thread only.
    pub fn stage_and_wait(&self, packet: Packet) -> io::Result<()> {
        *self.buffer.lock().unwrap() = Some(packet);
        self.pipe.notify()?;
        // Block until `drain` releases the permit.
        self.permit_rx.lock().unwrap().recv().ok();
        Ok(())
    }

    /// Event-loop side: called when `notify_fd()` becomes readable. Consumes
    /// the notification byte, takes the staged packet, and releases the
    /// engine to proceed.
    pub fn drain(&self) -> io::Result<Packet> {
        self.pipe.drain_one()?;
        let packet = self.buffer.lock().unwrap().take().expect("notified without a staged packet");
        let _ = self.permit_tx.try_send(());
        Ok(packet)
    }
}

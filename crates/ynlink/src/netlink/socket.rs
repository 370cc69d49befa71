//! Low-level async netlink socket operations.

use std::future::Future;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicU32, Ordering};

use bytes::BytesMut;
use netlink_sys::{Socket, SocketAddr};
use tokio::io::Interest;
use tokio::io::unix::AsyncFd;

use super::error::Result;

/// The datagram seam between the exchange engine and the operating system.
///
/// The production implementation is [`NetlinkSocket`]; tests substitute an
/// in-memory stub. A transport owns its request correlation state: the
/// per-socket sequence counter and the kernel-assigned port id.
pub trait Transport {
    /// Next request sequence number (never 0; 0 marks unsolicited notifications).
    fn next_seq(&self) -> u32;

    /// Local port id assigned at bind time.
    fn pid(&self) -> u32;

    /// Send one datagram.
    fn send(&self, msg: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Receive one datagram (may carry several concatenated frames).
    fn recv(&self) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// Per-socket sequence number counter.
///
/// Wraps from `0xFFFF_FFFF` back to 1, skipping 0: sequence number 0 is
/// reserved for unsolicited kernel notifications and must never correlate
/// with a request.
#[derive(Debug, Default)]
pub struct SeqCounter(AtomicU32);

impl SeqCounter {
    /// Create a counter whose first value is 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance and return the next sequence number.
    pub fn next(&self) -> u32 {
        loop {
            let current = self.0.load(Ordering::Relaxed);
            let mut next = current.wrapping_add(1);
            if next == 0 {
                next = 1;
            }
            if self
                .0
                .compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return next;
            }
        }
    }

    #[cfg(test)]
    fn set(&self, value: u32) {
        self.0.store(value, Ordering::Relaxed);
    }
}

/// Async netlink socket.
pub struct NetlinkSocket {
    /// The underlying async file descriptor.
    fd: AsyncFd<Socket>,
    /// Sequence number counter.
    seq: SeqCounter,
    /// Local port ID (assigned by kernel).
    pid: u32,
    /// Netlink protocol number this socket uses.
    protonum: isize,
}

impl NetlinkSocket {
    /// Create a netlink socket for the given protocol number and bind it.
    ///
    /// Binding with pid 0 lets the kernel pick a unique port id, which is
    /// read back for request correlation.
    pub fn open(protonum: isize) -> Result<Self> {
        let mut socket = Socket::new(protonum)?;
        socket.set_non_blocking(true)?;

        // Bind to get a port ID
        let mut addr = SocketAddr::new(0, 0);
        socket.bind(&addr)?;
        socket.get_address(&mut addr)?;
        let pid = addr.port_number();

        // Enable extended ACK for better error messages
        socket.set_ext_ack(true).ok(); // Ignore if not supported

        let fd = AsyncFd::new(socket)?;

        Ok(Self {
            fd,
            seq: SeqCounter::new(),
            pid,
            protonum,
        })
    }

    /// Get the next sequence number.
    pub fn next_seq(&self) -> u32 {
        self.seq.next()
    }

    /// Get the local port ID.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Get the protocol number.
    pub fn protonum(&self) -> isize {
        self.protonum
    }

    /// Send a message.
    pub async fn send(&self, msg: &[u8]) -> Result<()> {
        loop {
            let mut guard = self.fd.ready(Interest::WRITABLE).await?;

            match guard.try_io(|inner| inner.get_ref().send(msg, 0)) {
                Ok(result) => {
                    result?;
                    return Ok(());
                }
                Err(_would_block) => continue,
            }
        }
    }

    /// Receive a message, allocating a buffer.
    pub async fn recv_msg(&self) -> Result<Vec<u8>> {
        // Allocate buffer with capacity - don't resize, let recv fill it
        let mut buf = BytesMut::with_capacity(32768);

        loop {
            let mut guard = self.fd.ready(Interest::READABLE).await?;

            match guard.try_io(|inner| inner.get_ref().recv(&mut buf, 0)) {
                Ok(result) => {
                    let _n = result?;
                    // buf has been advanced by recv, so buf[..] contains the data
                    return Ok(buf.to_vec());
                }
                Err(_would_block) => continue,
            }
        }
    }
}

impl Transport for NetlinkSocket {
    fn next_seq(&self) -> u32 {
        NetlinkSocket::next_seq(self)
    }

    fn pid(&self) -> u32 {
        NetlinkSocket::pid(self)
    }

    async fn send(&self, msg: &[u8]) -> Result<()> {
        NetlinkSocket::send(self, msg).await
    }

    async fn recv(&self) -> Result<Vec<u8>> {
        self.recv_msg().await
    }
}

impl AsRawFd for NetlinkSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.get_ref().as_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_starts_at_one() {
        let seq = SeqCounter::new();
        assert_eq!(seq.next(), 1);
        assert_eq!(seq.next(), 2);
    }

    #[test]
    fn test_seq_wraps_and_skips_zero() {
        let seq = SeqCounter::new();
        seq.set(u32::MAX - 1);
        assert_eq!(seq.next(), u32::MAX);
        // 0 is reserved for notifications; the counter wraps straight to 1.
        assert_eq!(seq.next(), 1);
        assert_eq!(seq.next(), 2);
    }
}

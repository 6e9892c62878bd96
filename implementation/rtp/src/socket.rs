//! Packet-oriented UDP socket with receive deadlines.
//!
//! This is the single suspension point of the whole transport: every engine
//! loop blocks in [`PacketSocket::recv_timeout`] and treats its three
//! outcomes (packet, corrupt datagram, deadline expiry) as the only events
//! that exist. Datagrams are decoded right at the socket edge so corruption
//! never reaches the state machines as anything but "drop this".

use crate::packet::{Packet, MAX_DATAGRAM};
use log::{debug, trace};
use std::{
    io::{self, ErrorKind},
    net::{SocketAddr, UdpSocket},
    time::Duration,
};

/// The outcome of one bounded receive.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Inbound {
    /// A well-formed packet and the address it came from.
    Packet(Packet, SocketAddr),

    /// A datagram arrived but failed verification. Callers treat this
    /// exactly like loss: no acknowledgment, no state change.
    Corrupt,

    /// The deadline elapsed without anything arriving.
    Timeout,
}

/// A UDP socket speaking whole RTP packets.
///
/// The socket stays unconnected; instead the peer address is pinned
/// explicitly once known, and datagrams from any other source are discarded
/// before decoding. The receive deadline is cached so that repeated waits
/// with the same duration skip the timeout syscall.
#[derive(Debug)]
pub struct PacketSocket {
    sock: UdpSocket,
    peer: Option<SocketAddr>,
    timeout: Option<Duration>,
}

impl PacketSocket {
    /// Binds a fresh socket to the given local address.
    pub fn bind(addr: SocketAddr) -> io::Result<PacketSocket> {
        Ok(PacketSocket {
            sock: UdpSocket::bind(addr)?,
            peer: None,
            timeout: None,
        })
    }

    /// Returns the bound local address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.sock.local_addr()
    }

    /// Pins the peer. From now on only datagrams from `addr` are received,
    /// and sends go to `addr`.
    pub fn set_peer(&mut self, addr: SocketAddr) {
        self.peer = Some(addr);
    }

    /// Encodes and sends one packet to the pinned peer.
    pub fn send(&self, packet: &Packet) -> io::Result<()> {
        let peer = self.peer.ok_or_else(|| {
            io::Error::new(ErrorKind::NotConnected, "no peer address pinned")
        })?;

        trace!(
            "SEND to {}: seq={} len={} flags={}",
            peer,
            packet.seq,
            packet.payload.len(),
            packet.flags,
        );

        match self.sock.send_to(&packet.encode(), peer) {
            Ok(_) => Ok(()),
            // ICMP unreachable noise from a peer that has not bound yet;
            // the retransmission machinery already covers actual loss.
            Err(ref e) if e.kind() == ErrorKind::ConnectionRefused => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Waits up to `timeout` for one datagram.
    ///
    /// Interrupted system calls are retried and datagrams from foreign
    /// sources are skipped, both without shortening the overall wait beyond
    /// re-arming the same deadline.
    pub fn recv_timeout(&mut self, timeout: Duration) -> io::Result<Inbound> {
        self.arm_deadline(timeout)?;

        let mut buf = [0; MAX_DATAGRAM];
        loop {
            let (len, src) = match self.sock.recv_from(&mut buf) {
                Ok(v) => v,
                Err(ref e)
                    if e.kind() == ErrorKind::WouldBlock
                        || e.kind() == ErrorKind::TimedOut =>
                {
                    return Ok(Inbound::Timeout);
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(ref e) if e.kind() == ErrorKind::ConnectionRefused => continue,
                Err(e) => return Err(e),
            };

            if let Some(peer) = self.peer {
                if src != peer {
                    trace!("ignoring datagram from {} (peer is {})", src, peer);
                    continue;
                }
            }

            return Ok(match Packet::decode(&buf[..len]) {
                Ok(packet) => {
                    trace!(
                        "RECV from {}: seq={} len={} flags={}",
                        src,
                        packet.seq,
                        packet.payload.len(),
                        packet.flags,
                    );
                    Inbound::Packet(packet, src)
                }
                Err(e) => {
                    debug!("dropping corrupt datagram from {}: {}", src, e);
                    Inbound::Corrupt
                }
            });
        }
    }

    /// Applies the receive deadline, skipping the syscall if it is already
    /// armed.
    fn arm_deadline(&mut self, timeout: Duration) -> io::Result<()> {
        if self.timeout != Some(timeout) {
            self.sock.set_read_timeout(Some(timeout))?;
            self.timeout = Some(timeout);
        }

        Ok(())
    }
}

//! The send-side windowed delivery engine.

use crate::{
    handshake::{self, Phase},
    packet::{Flags, Packet, MAX_PAYLOAD},
    seq::SeqNum,
    socket::{Inbound, PacketSocket},
    window::Window,
    Config, Error, Mode,
};
use bytes::Bytes;
use lazy_static::lazy_static;
use log::{debug, trace};
use std::{
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr},
};

lazy_static! {
    /// The local address senders bind to.
    static ref BIND_ANY: SocketAddr =
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), 0);
}

/// The sending endpoint of a connection.
///
/// [`connect`](Sender::connect) performs the three-way open against an
/// accepting [`Receiver`](crate::Receiver). Data handed to
/// [`send`](Sender::send) is delivered reliably and in order;
/// [`close`](Sender::close) runs the FIN exchange and consumes the
/// endpoint.
#[derive(Debug)]
pub struct Sender {
    sock: PacketSocket,
    cfg: Config,
    seq: SeqNum,
    phase: Phase,
}

impl Sender {
    /// Opens a connection to the receiver at `peer`.
    pub fn connect(peer: SocketAddr, cfg: Config) -> Result<Sender, Error> {
        cfg.validate()?;

        let mut sock = PacketSocket::bind(*BIND_ANY)?;
        sock.set_peer(peer);

        let seq = handshake::open_active(&mut sock, &cfg)?;
        Ok(Sender {
            sock,
            cfg,
            seq,
            phase: Phase::Transferring,
        })
    }

    /// Returns the bound local address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.sock.local_addr()
    }

    /// Delivers `data` reliably and in order, blocking until every chunk is
    /// acknowledged.
    ///
    /// May be called repeatedly: the connection is a byte pipe without
    /// transfer framing, so the receiver observes the concatenation of all
    /// sends, delimited only by [`close`](Sender::close).
    pub fn send(&mut self, data: Bytes) -> Result<(), Error> {
        if self.phase != Phase::Transferring {
            return Err(Error::BadPhase {
                op: "send",
                phase: self.phase,
            });
        }

        let nchunks = chunk_count(data.len());
        if nchunks == 0 {
            return Ok(());
        }
        // The cursor must not rotate back into the receiver's
        // duplicate-detection range within one transfer.
        if nchunks as u64 >= (1u64 << 31) - 2 * self.cfg.window_size as u64 {
            return Err(Error::TooLarge);
        }

        debug!("transferring {} bytes in {} chunks", data.len(), nchunks);

        let mut window = Window::new(self.cfg.window_size, self.seq);
        let mut base = 0; // chunk index of window.base()
        let mut sent = 0; // chunks transmitted at least once

        while base < nchunks {
            // Keep the window full: transmit every chunk it covers that has
            // not been sent yet. This runs on entry and again after every
            // base advance, uncovering fresh slots as soon as they exist.
            while sent < nchunks && sent - base < self.cfg.window_size {
                trace!("sending chunk {}/{}", sent + 1, nchunks);
                self.sock.send(&Packet::data(self.seq, chunk(&data, sent)))?;
                self.seq = self.seq.next();
                sent += 1;
            }

            match self.sock.recv_timeout(self.cfg.retransmit_interval)? {
                Inbound::Packet(p, _) if p.flags == Flags::ACK => {
                    let acked = match self.cfg.mode {
                        // Cumulative ACKs carry the next expected number.
                        Mode::GoBackN => p.seq.add(-1),
                        Mode::SelectiveRepeat => p.seq,
                    };
                    if !acked.in_range(window.base(), self.seq) {
                        trace!("ignoring stale ack {}", p.seq);
                        continue;
                    }

                    let moved = if self.cfg.mode.is_selective() {
                        window.mark(acked);
                        window.slide()
                    } else {
                        window.advance_to(acked.next())
                    };
                    base += moved;
                }
                Inbound::Timeout => self.retransmit(&data, &window, base, sent)?,
                _ => {}
            }
        }

        debug!("transfer complete, cursor at {}", self.seq);
        Ok(())
    }

    /// Tears the connection down with the FIN exchange.
    pub fn close(mut self) -> Result<(), Error> {
        self.phase = Phase::Closing;
        handshake::close_active(&mut self.sock, &self.cfg, self.seq)?;
        self.phase = Phase::Closed;
        Ok(())
    }

    /// Re-sends outstanding chunks after a silent retransmit interval.
    ///
    /// Go-back-n re-sends everything in `[base, sent)`; selective-repeat
    /// skips the slots already marked acknowledged.
    fn retransmit(
        &self,
        data: &Bytes,
        window: &Window,
        base: usize,
        sent: usize,
    ) -> Result<(), Error> {
        for i in base..sent {
            let seq = window.base().add((i - base) as i32);
            if self.cfg.mode.is_selective() && window.is_marked(seq) {
                continue;
            }

            trace!("re-sending chunk {}", i + 1);
            self.sock.send(&Packet::data(seq, chunk(data, i)))?;
        }

        Ok(())
    }
}

/// The number of payload-sized chunks `len` bytes split into.
fn chunk_count(len: usize) -> usize {
    (len + MAX_PAYLOAD - 1) / MAX_PAYLOAD
}

/// The `i`-th payload-sized slice of the transfer.
fn chunk(data: &Bytes, i: usize) -> Bytes {
    let from = i * MAX_PAYLOAD;
    let to = (from + MAX_PAYLOAD).min(data.len());
    data.slice(from, to)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_count_boundaries() {
        assert_eq!(chunk_count(0), 0);
        assert_eq!(chunk_count(1), 1);
        assert_eq!(chunk_count(MAX_PAYLOAD), 1);
        assert_eq!(chunk_count(MAX_PAYLOAD + 1), 2);
        assert_eq!(chunk_count(3 * MAX_PAYLOAD), 3);
    }

    #[test]
    fn chunks_cover_exact_multiples_without_trailer() {
        let data = Bytes::from(vec![7; 2 * MAX_PAYLOAD]);

        assert_eq!(chunk_count(data.len()), 2);
        assert_eq!(chunk(&data, 0).len(), MAX_PAYLOAD);
        assert_eq!(chunk(&data, 1).len(), MAX_PAYLOAD);
    }

    #[test]
    fn final_chunk_keeps_its_true_length() {
        let data = Bytes::from(vec![1; MAX_PAYLOAD + 13]);

        assert_eq!(chunk_count(data.len()), 2);
        assert_eq!(chunk(&data, 0).len(), MAX_PAYLOAD);
        assert_eq!(chunk(&data, 1).len(), 13);
    }
}

//! The receive-side windowed delivery engine.

use crate::{
    handshake::{self, Phase},
    packet::{Flags, Packet},
    seq::SeqNum,
    socket::{Inbound, PacketSocket},
    window::Window,
    Config, Error,
};
use bytes::Bytes;
use log::{debug, trace, warn};
use std::{collections::VecDeque, io, net::SocketAddr};

/// The receiving endpoint of a connection.
///
/// A receiver is bound first and accepts a single sender afterwards.
/// [`recv`](Receiver::recv) assembles the transferred bytes until the peer
/// signals the end of the stream, and [`close`](Receiver::close) completes
/// the teardown exchange.
#[derive(Debug)]
pub struct Receiver {
    sock: PacketSocket,
    cfg: Config,
    seq: SeqNum,
    phase: Phase,
}

impl Receiver {
    /// Binds a receiving endpoint on `addr` without accepting yet.
    pub fn bind(addr: SocketAddr, cfg: Config) -> Result<Receiver, Error> {
        cfg.validate()?;

        Ok(Receiver {
            sock: PacketSocket::bind(addr)?,
            cfg,
            seq: SeqNum::ZERO,
            phase: Phase::Idle,
        })
    }

    /// Returns the bound local address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.sock.local_addr()
    }

    /// Waits for a sender to open a connection.
    ///
    /// The first well-formed SYN pins its source address as the peer; all
    /// later traffic from other addresses is discarded.
    pub fn accept(&mut self) -> Result<(), Error> {
        if self.phase != Phase::Idle {
            return Err(Error::BadPhase {
                op: "accept",
                phase: self.phase,
            });
        }

        self.phase = Phase::Handshaking;
        self.seq = handshake::open_passive(&mut self.sock, &self.cfg)?;
        self.phase = Phase::Transferring;
        Ok(())
    }

    /// Receives until the sender signals the end of the stream, returning
    /// the assembled bytes.
    ///
    /// If the connection goes silent for the contact timeout instead, the
    /// loop ends early and whatever has been assembled so far is returned.
    pub fn recv(&mut self) -> Result<Vec<u8>, Error> {
        if self.phase != Phase::Transferring {
            return Err(Error::BadPhase {
                op: "recv",
                phase: self.phase,
            });
        }

        let mut window = Window::new(self.cfg.window_size, self.seq);
        let mut stash = VecDeque::from(vec![None; self.cfg.window_size]);
        let mut out = Vec::new();

        loop {
            let packet = match self.sock.recv_timeout(self.cfg.contact_timeout)? {
                Inbound::Packet(p, _) => p,
                Inbound::Corrupt => continue,
                Inbound::Timeout => {
                    warn!("transfer went silent before the stream ended");
                    break;
                }
            };

            if packet.flags.contains(Flags::FIN) {
                trace!("end of stream at {}", packet.seq);
                break;
            }
            if packet.flags != Flags::DATA {
                continue;
            }

            if self.cfg.mode.is_selective() {
                self.take_selective(&mut window, &mut stash, &mut out, packet)?;
            } else {
                // Cumulative discipline: the next expected chunk appends,
                // everything else only refreshes the ACK.
                if packet.seq == self.seq {
                    out.extend_from_slice(&packet.payload);
                    self.seq = self.seq.next();
                }
                self.sock.send(&Packet::control(self.seq, Flags::ACK))?;
            }
        }

        if self.cfg.mode.is_selective() {
            self.seq = window.base();
        }
        self.phase = Phase::Closing;

        debug!("assembled {} bytes", out.len());
        Ok(out)
    }

    /// Completes the teardown exchange.
    pub fn close(mut self) -> Result<(), Error> {
        if self.phase != Phase::Closing {
            return Err(Error::BadPhase {
                op: "close",
                phase: self.phase,
            });
        }

        handshake::close_passive(&mut self.sock, &self.cfg)?;
        self.phase = Phase::Closed;
        Ok(())
    }

    /// Handles one data packet under the selective-repeat discipline.
    ///
    /// Chunks within the window are stashed in their slot and marked; the
    /// payload of every slot the base slides past is appended to the output
    /// in stream order, taking up exactly its own length. Chunks within one
    /// window below the base were already delivered, so only their ACK is
    /// refreshed. Anything else is dropped without a response.
    ///
    /// The stash rotates in lockstep with the window: its front is always
    /// the slot of `window.base()`.
    fn take_selective(
        &mut self,
        window: &mut Window,
        stash: &mut VecDeque<Option<Bytes>>,
        out: &mut Vec<u8>,
        packet: Packet,
    ) -> Result<(), Error> {
        let below = window.base().add(-(window.capacity() as i32));

        if window.contains(packet.seq) {
            let slot = window.base().distance(packet.seq) as usize;
            let ack = packet.seq;

            stash[slot] = Some(packet.payload);
            window.mark(ack);
            for _ in 0..window.slide() {
                // Every slot the base slides past was marked, and marking
                // stashes the payload first.
                if let Some(Some(chunk)) = stash.pop_front() {
                    out.extend_from_slice(&chunk);
                }
                stash.push_back(None);
            }

            self.sock.send(&Packet::control(ack, Flags::ACK))?;
        } else if packet.seq.in_range(below, window.base()) {
            trace!("re-acking delivered chunk {}", packet.seq);
            self.sock.send(&Packet::control(packet.seq, Flags::ACK))?;
        } else {
            trace!("dropping data {} outside the receive window", packet.seq);
        }

        Ok(())
    }
}

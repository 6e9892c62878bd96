//! Connection establishment and teardown.
//!
//! Both the three-way open and the FIN/ACK+FIN close are bounded-retry
//! exchanges driven purely by receive timeouts: a request is transmitted,
//! one full retransmit interval is spent waiting for the matching reply, and
//! every unanswered interval consumes one unit of the retry budget and
//! triggers a resend. Exhausting the budget is fatal.
//!
//! The passive side additionally has two single long waits for the peer's
//! first contact (the initial SYN, and later the initial FIN), whose expiry
//! is fatal as well.

use crate::{
    packet::{Flags, Packet},
    seq::SeqNum,
    socket::{Inbound, PacketSocket},
    Config, Error,
};
use log::{debug, trace};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    net::SocketAddr,
    time::Instant,
};

/// The active opener's fixed initial sequence number.
///
/// Pinned to the top of the sequence space so that the first data packet is
/// numbered zero: every connection crosses the wraparound boundary right
/// away instead of once per 2^31 packets.
pub(crate) const INITIAL_SEQ: SeqNum = SeqNum::MAX;

/// The lifecycle phase of a connection endpoint.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Phase {
    /// Bound, but no packet has been exchanged yet.
    Idle,

    /// The open exchange is in progress.
    Handshaking,

    /// Data may flow.
    Transferring,

    /// A FIN has been observed or sent; only the close exchange remains.
    Closing,

    /// The connection is finished.
    Closed,
}

impl Display for Phase {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        match *self {
            Phase::Idle => "idle".fmt(fmt),
            Phase::Handshaking => "handshaking".fmt(fmt),
            Phase::Transferring => "transferring".fmt(fmt),
            Phase::Closing => "closing".fmt(fmt),
            Phase::Closed => "closed".fmt(fmt),
        }
    }
}

/// Performs the active (sender-side) three-way open.
///
/// Returns the sequence cursor for the first data packet.
pub(crate) fn open_active(sock: &mut PacketSocket, cfg: &Config) -> Result<SeqNum, Error> {
    let iss = INITIAL_SEQ;
    let seq = iss.next();
    debug!("opening connection, iss={}", iss);

    let syn = Packet::control(iss, Flags::SYN);
    let syn_ack = Flags::SYN | Flags::ACK;
    solicit(sock, cfg, &syn, "SYN+ACK", |p| {
        p.flags == syn_ack && p.seq == seq
    })?;

    // The final ACK is best-effort and never re-verified.
    let ack = Packet::control(seq, Flags::ACK);
    sock.send(&ack)?;

    // If the grant shows up again within the linger window, the final ACK
    // was lost; repair it exactly once.
    if let Inbound::Packet(p, _) = sock.recv_timeout(cfg.linger_timeout)? {
        if p.flags == syn_ack && p.seq == seq {
            trace!("duplicate SYN+ACK, repairing the final ACK");
            sock.send(&ack)?;
        }
    }

    debug!("connection open");
    Ok(seq)
}

/// Performs the passive (receiver-side) part of the three-way open.
///
/// Waits one long window for the first SYN and pins its source as the
/// connection peer, then solicits the matching ACK. Returns the sequence
/// number expected on the first data packet.
pub(crate) fn open_passive(sock: &mut PacketSocket, cfg: &Config) -> Result<SeqNum, Error> {
    debug!("waiting for a connection");

    let (syn, src) = await_first(sock, cfg, "SYN", |p| p.flags == Flags::SYN)?;
    sock.set_peer(src);
    debug!("SYN from {}, iss={}", src, syn.seq);

    let seq = syn.seq.next();
    let grant = Packet::control(seq, Flags::ACK | Flags::SYN);
    solicit(sock, cfg, &grant, "handshake ACK", |p| {
        p.flags == Flags::ACK && p.seq == seq
    })?;

    debug!("connection open");
    Ok(seq)
}

/// Performs the active close: FIN until the matching ACK+FIN arrives.
pub(crate) fn close_active(
    sock: &mut PacketSocket,
    cfg: &Config,
    seq: SeqNum,
) -> Result<(), Error> {
    debug!("closing connection, fin seq={}", seq);

    let fin = Packet::control(seq, Flags::FIN);
    let ack_fin = Flags::ACK | Flags::FIN;
    solicit(sock, cfg, &fin, "ACK+FIN", |p| {
        p.flags == ack_fin && p.seq == seq
    })?;

    debug!("connection closed");
    Ok(())
}

/// Performs the passive close: waits one long window for the FIN, replies
/// ACK+FIN, and re-acknowledges at most one duplicate FIN.
///
/// Nothing confirms that the closer saw the reply; the dropped-reply case is
/// the protocol's documented weak close guarantee, not repaired here.
pub(crate) fn close_passive(sock: &mut PacketSocket, cfg: &Config) -> Result<(), Error> {
    let (fin, _) = await_first(sock, cfg, "FIN", |p| p.flags == Flags::FIN)?;

    let reply = Packet::control(fin.seq, Flags::ACK | Flags::FIN);
    sock.send(&reply)?;

    // The closer re-sends its FIN if the reply was lost; answer a single
    // duplicate within the linger window.
    if let Inbound::Packet(p, _) = sock.recv_timeout(cfg.linger_timeout)? {
        if p.flags == Flags::FIN && p.seq == fin.seq {
            trace!("duplicate FIN, repairing the ACK+FIN");
            sock.send(&reply)?;
        }
    }

    debug!("connection closed");
    Ok(())
}

/// Sends `request` and waits for a reply matching `accept`, re-sending
/// after every unanswered retransmit interval.
///
/// Corrupt datagrams and valid-but-unexpected packets do not consume the
/// budget; only a fully elapsed interval does. The exchange fails after
/// `max_retries + 1` total transmissions, each of which got a complete
/// receive window.
fn solicit(
    sock: &mut PacketSocket,
    cfg: &Config,
    request: &Packet,
    exchange: &'static str,
    accept: impl Fn(&Packet) -> bool,
) -> Result<Packet, Error> {
    sock.send(request)?;

    let mut tries = 1;
    loop {
        let deadline = Instant::now() + cfg.retransmit_interval;
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }

            match sock.recv_timeout(deadline - now)? {
                Inbound::Packet(reply, _) if accept(&reply) => {
                    debug!("{} arrived after {} transmissions", exchange, tries);
                    return Ok(reply);
                }
                Inbound::Timeout => break,
                _ => {}
            }
        }

        if tries > cfg.max_retries {
            return Err(Error::Exhausted { exchange, tries });
        }
        tries += 1;

        trace!("no {} yet, re-sending (try {})", exchange, tries);
        sock.send(request)?;
    }
}

/// Waits a single long window for the peer's first contact.
///
/// Unlike [`solicit`], nothing is transmitted here and there are no
/// retries: the window's expiry means the peer never showed up, which is
/// fatal. Unrelated datagrams spend the window but do not extend it.
fn await_first(
    sock: &mut PacketSocket,
    cfg: &Config,
    expected: &'static str,
    want: impl Fn(&Packet) -> bool,
) -> Result<(Packet, SocketAddr), Error> {
    let deadline = Instant::now() + cfg.contact_timeout;
    loop {
        let now = Instant::now();
        if now >= deadline {
            return Err(Error::NoContact { expected });
        }

        match sock.recv_timeout(deadline - now)? {
            Inbound::Packet(p, src) if want(&p) => return Ok((p, src)),
            Inbound::Timeout => return Err(Error::NoContact { expected }),
            _ => {}
        }
    }
}

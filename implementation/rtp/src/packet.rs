//! The wire format of RTP packets.
//!
//! Every datagram carries exactly one packet: an 11-byte header followed by
//! up to [`MAX_PAYLOAD`] bytes of payload. All multi-byte header fields are
//! in network byte order:
//!
//! ```text
//! seq_num   : 4 bytes  (31 bits significant, top bit 0)
//! length    : 2 bytes  (0 for control-only packets)
//! checksum  : 4 bytes  (CRC-32, computed with this field zeroed)
//! flags     : 1 byte   (bit0=SYN, bit1=ACK, bit2=FIN; 0 = data packet)
//! payload   : `length` bytes
//! ```
//!
//! The checksum covers the entire encoded packet with the checksum field
//! itself treated as zero. Verification is all-or-nothing: a datagram either
//! decodes into a well-formed [`Packet`] or is [`CorruptPacket`], which
//! callers treat exactly like a datagram that never arrived.

use crate::seq::SeqNum;
use byteorder::{ByteOrder, NetworkEndian};
use bytes::Bytes;
use flate2::Crc;
use std::{
    error::Error as StdError,
    fmt::{Display, Formatter, Result as FmtResult},
    ops::BitOr,
};

/// The fixed size of the packet header in bytes.
pub const HEADER_LEN: usize = 11;

/// The maximum number of payload bytes in a single packet.
///
/// This is also the chunk granularity of the delivery engines: one window
/// slot covers exactly one maximally-sized payload.
pub const MAX_PAYLOAD: usize = 1461;

/// The largest possible datagram, header included.
pub const MAX_DATAGRAM: usize = HEADER_LEN + MAX_PAYLOAD;

/// The flag bitmask of a packet.
///
/// Control packets combine `SYN`, `ACK` and `FIN`; a cleared mask marks an
/// ordinary data packet. Unknown bits are preserved as received; the
/// engines match flag sets exactly and simply never react to combinations
/// they do not send themselves.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Flags(u8);

impl Flags {
    /// The empty mask of an ordinary data packet.
    pub const DATA: Flags = Flags(0);

    /// Connection-open request.
    pub const SYN: Flags = Flags(0b001);

    /// Acknowledgment.
    pub const ACK: Flags = Flags(0b010);

    /// Connection-close request.
    pub const FIN: Flags = Flags(0b100);

    /// Returns the raw flag byte.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Checks whether every bit of `other` is set in `self`.
    pub fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl Display for Flags {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        if self.0 == 0 {
            return "DATA".fmt(fmt);
        }

        let mut names = Vec::with_capacity(3);
        if self.contains(Flags::SYN) {
            names.push("SYN");
        }
        if self.contains(Flags::ACK) {
            names.push("ACK");
        }
        if self.contains(Flags::FIN) {
            names.push("FIN");
        }

        let unknown = self.0 & !0b111;
        if names.is_empty() {
            write!(fmt, "0x{:02x}", self.0)
        } else if unknown != 0 {
            write!(fmt, "{}|0x{:02x}", names.join("|"), unknown)
        } else {
            names.join("|").fmt(fmt)
        }
    }
}

/// A single RTP packet.
///
/// The wire header's derived fields exist only on the wire: `length` is
/// taken from the payload and the checksum is computed during
/// [`encode`](Packet::encode) and verified during [`decode`](Packet::decode).
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Packet {
    pub seq: SeqNum,
    pub flags: Flags,
    pub payload: Bytes,
}

/// The reason a datagram failed to decode into a packet.
///
/// The distinction exists for diagnostics only; every variant receives the
/// same treatment as total packet loss.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CorruptPacket {
    /// The datagram is shorter than the fixed header.
    Truncated,

    /// The CRC-32 over the checksum-zeroed datagram disagrees with the
    /// checksum field.
    Checksum { actual: u32, declared: u32 },

    /// The length field exceeds the payload maximum or disagrees with the
    /// number of payload bytes actually received.
    Length { declared: usize, actual: usize },

    /// The reserved top bit of the sequence-number field is set.
    ReservedSeqBit,
}

impl Packet {
    /// Creates a data packet.
    ///
    /// # Panics
    ///
    /// Panics if the payload exceeds [`MAX_PAYLOAD`].
    pub fn data(seq: SeqNum, payload: Bytes) -> Packet {
        assert!(payload.len() <= MAX_PAYLOAD);

        Packet {
            seq,
            flags: Flags::DATA,
            payload,
        }
    }

    /// Creates a payload-less control packet with the given flags.
    pub fn control(seq: SeqNum, flags: Flags) -> Packet {
        Packet {
            seq,
            flags,
            payload: Bytes::new(),
        }
    }

    /// Encodes the packet into a fresh byte vector suitable for one
    /// datagram.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0; HEADER_LEN + self.payload.len()];

        NetworkEndian::write_u32(&mut buf[0..4], self.seq.raw());
        NetworkEndian::write_u16(&mut buf[4..6], self.payload.len() as u16);
        buf[10] = self.flags.bits();
        buf[HEADER_LEN..].copy_from_slice(&self.payload);

        // The checksum field is still zero here, which is exactly the
        // state the CRC is defined over.
        let sum = {
            let mut crc = Crc::new();
            crc.update(&buf);
            crc.sum()
        };
        NetworkEndian::write_u32(&mut buf[6..10], sum);

        buf
    }

    /// Decodes one datagram, verifying the checksum and the header's
    /// consistency with the actual datagram size.
    pub fn decode(buf: &[u8]) -> Result<Packet, CorruptPacket> {
        if buf.len() < HEADER_LEN {
            return Err(CorruptPacket::Truncated);
        }

        let declared = NetworkEndian::read_u32(&buf[6..10]);
        let actual = {
            let mut crc = Crc::new();
            crc.update(&buf[..6]);
            crc.update(&[0; 4]);
            crc.update(&buf[10..]);
            crc.sum()
        };
        if actual != declared {
            return Err(CorruptPacket::Checksum { actual, declared });
        }

        let length = NetworkEndian::read_u16(&buf[4..6]) as usize;
        if length > MAX_PAYLOAD || HEADER_LEN + length != buf.len() {
            return Err(CorruptPacket::Length {
                declared: length,
                actual: buf.len() - HEADER_LEN,
            });
        }

        let raw_seq = NetworkEndian::read_u32(&buf[0..4]);
        if raw_seq >> 31 != 0 {
            return Err(CorruptPacket::ReservedSeqBit);
        }

        Ok(Packet {
            seq: SeqNum::new(raw_seq),
            flags: Flags(buf[10]),
            payload: Bytes::from(buf[HEADER_LEN..].to_vec()),
        })
    }
}

impl Display for CorruptPacket {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        match *self {
            CorruptPacket::Truncated => "datagram shorter than the packet header".fmt(fmt),
            CorruptPacket::Checksum { actual, declared } => write!(
                fmt,
                "crc32 sum mismatch: got {:X}, wanted {:X}",
                actual, declared,
            ),
            CorruptPacket::Length { declared, actual } => write!(
                fmt,
                "length field declares {} payload bytes, datagram carries {}",
                declared, actual,
            ),
            CorruptPacket::ReservedSeqBit => {
                "reserved sequence-number bit is set".fmt(fmt)
            }
        }
    }
}

impl StdError for CorruptPacket {}

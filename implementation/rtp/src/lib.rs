//! A reliable, ordered byte-stream transport ("RTP") over unreliable
//! datagrams.
//!
//! RTP connects exactly two endpoints over UDP and delivers a byte sequence
//! intact and in order despite arbitrary loss, duplication and reordering of
//! datagrams. Reliability comes from a fixed-size sliding window with
//! timeout-driven retransmission in one of two disciplines, selected at
//! connection setup:
//!
//! - **Go-Back-N** ([`Mode::GoBackN`]): the receiver accepts only the next
//!   expected packet and acknowledges cumulatively; on timeout the sender
//!   retransmits its whole outstanding window.
//! - **Selective-Repeat** ([`Mode::SelectiveRepeat`]): the receiver buffers
//!   out-of-order packets inside its window and acknowledges each packet
//!   individually; the sender retransmits only unacknowledged slots.
//!
//! A connection is one-shot and unidirectional: a [`Receiver`] binds and
//! accepts, a [`Sender`] connects with a three-way handshake, data flows
//! from sender to receiver, and [`Sender::close`] tears the connection down
//! with a FIN exchange. Both endpoints must be configured with the same
//! mode; window sizes may differ (a small receive window only slows the
//! sender down).
//!
//! The transport is synchronous: every call blocks the calling thread,
//! receive timeouts drive all retransmission, and there is no shared state
//! between the two endpoint processes beyond the packets on the wire.

mod handshake;
mod packet;
mod receiver;
mod sender;
mod seq;
mod socket;
mod window;

pub use crate::handshake::Phase;
pub use crate::packet::{
    CorruptPacket, Flags, Packet, HEADER_LEN, MAX_DATAGRAM, MAX_PAYLOAD,
};
pub use crate::receiver::Receiver;
pub use crate::sender::Sender;
pub use crate::seq::SeqNum;
pub use crate::window::Window;

use std::{
    error::Error as StdError,
    fmt::{Display, Formatter, Result as FmtResult},
    io,
    str::FromStr,
    time::Duration,
};

/// The retransmission discipline of a connection.
///
/// Both endpoints of a connection must use the same discipline; the ACK
/// sequence-number semantics differ between the two and are not negotiated.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Mode {
    /// Cumulative acknowledgments; any gap triggers resending the entire
    /// unacknowledged window.
    GoBackN,

    /// Individual acknowledgments; only unacknowledged packets are
    /// retransmitted.
    SelectiveRepeat,
}

/// The error when a string names no retransmission discipline.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ParseModeError;

/// Runtime parameters of one connection endpoint.
///
/// The `Default` values are the standard operating parameters; tests shrink
/// the timeouts to keep failure cases fast.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// The retransmission discipline. Must match the peer's.
    pub mode: Mode,

    /// Window capacity in packets, between 1 and 2^30.
    pub window_size: usize,

    /// The short interval after which unacknowledged packets are resent.
    pub retransmit_interval: Duration,

    /// The long wait for the peer's first contact (initial SYN or FIN).
    /// Expiry is fatal.
    pub contact_timeout: Duration,

    /// The medium wait observed once after a best-effort final transmission
    /// to repair one lost duplicate.
    pub linger_timeout: Duration,

    /// Handshake retry budget: one initial transmission plus at most this
    /// many resends before the exchange fails.
    pub max_retries: u32,
}

/// The error type of connection operations.
#[derive(Debug)]
pub enum Error {
    /// A local socket or I/O operation failed. Fatal, never retried.
    Io(io::Error),

    /// A handshake exchange ran out of its retry budget without the
    /// expected reply.
    Exhausted {
        exchange: &'static str,
        tries: u32,
    },

    /// The peer's first contact never arrived within the contact timeout.
    NoContact { expected: &'static str },

    /// The operation is not legal in the connection's current phase.
    BadPhase {
        op: &'static str,
        phase: Phase,
    },

    /// The configuration was rejected.
    Config(&'static str),

    /// The transfer needs more chunks than the sequence space can
    /// unambiguously address.
    TooLarge,
}

impl Mode {
    /// Checks whether this is the selective-repeat discipline.
    pub fn is_selective(self) -> bool {
        self == Mode::SelectiveRepeat
    }
}

impl Display for Mode {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        match *self {
            Mode::GoBackN => "gbn".fmt(fmt),
            Mode::SelectiveRepeat => "sr".fmt(fmt),
        }
    }
}

impl FromStr for Mode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gbn" => Ok(Mode::GoBackN),
            "sr" => Ok(Mode::SelectiveRepeat),
            _ => Err(ParseModeError),
        }
    }
}

impl Display for ParseModeError {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        "expected one of 'gbn', 'sr'".fmt(fmt)
    }
}

impl StdError for ParseModeError {}

impl Default for Config {
    fn default() -> Self {
        Config {
            mode: Mode::GoBackN,
            window_size: 16,
            retransmit_interval: Duration::from_millis(100),
            contact_timeout: Duration::from_secs(30),
            linger_timeout: Duration::from_secs(2),
            max_retries: 50,
        }
    }
}

impl Config {
    /// Checks the parameters for values the protocol cannot operate with.
    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.window_size == 0 {
            return Err(Error::Config("window size must be at least 1"));
        }
        if self.window_size > crate::window::MAX_CAPACITY {
            return Err(Error::Config("window size exceeds 2^30"));
        }

        // Zero would make `set_read_timeout` fail at the first receive.
        let zero = Duration::new(0, 0);
        if self.retransmit_interval == zero
            || self.contact_timeout == zero
            || self.linger_timeout == zero
        {
            return Err(Error::Config("timeouts must be non-zero"));
        }

        Ok(())
    }
}

impl Display for Error {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        match self {
            Error::Io(e) => write!(fmt, "io error: {}", e),
            Error::Exhausted { exchange, tries } => write!(
                fmt,
                "retry budget exhausted waiting for {} ({} transmissions)",
                exchange, tries,
            ),
            Error::NoContact { expected } => write!(
                fmt,
                "no {} from the peer within the contact timeout",
                expected,
            ),
            Error::BadPhase { op, phase } => {
                write!(fmt, "cannot {} while the connection is {}", op, phase)
            }
            Error::Config(msg) => write!(fmt, "invalid configuration: {}", msg),
            Error::TooLarge => "transfer exceeds the sequence space".fmt(fmt),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn config_rejects_degenerate_values() {
        let no_window = Config {
            window_size: 0,
            ..Config::default()
        };
        let huge_window = Config {
            window_size: (1 << 30) + 1,
            ..Config::default()
        };
        let no_interval = Config {
            retransmit_interval: Duration::new(0, 0),
            ..Config::default()
        };

        for cfg in &[no_window, huge_window, no_interval] {
            match cfg.validate() {
                Err(Error::Config(_)) => {}
                other => panic!("expected config error, got {:?}", other),
            }
        }
    }

    #[test]
    fn mode_parses_its_own_display() {
        for &mode in &[Mode::GoBackN, Mode::SelectiveRepeat] {
            assert_eq!(mode.to_string().parse::<Mode>(), Ok(mode));
        }
        assert!("tcp".parse::<Mode>().is_err());
    }
}

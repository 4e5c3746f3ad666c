use std::net::SocketAddr;

use newt_msg::{Id, MessageParseError, MessageToBytesError, Token};

use crate::platform::{PlatformTypes, SocketError};

/// The context that an error occurred in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum When {
  /// We were polling for a message when the error occurred
  Polling,
  /// We were sending a message
  SendingMessage(Option<SocketAddr>, Id, Token),
  /// No particular context
  None,
}

impl When {
  /// Construct a specific error from the context the error occurred in
  pub fn what<P: PlatformTypes>(self, what: What<P>) -> Error<P> {
    Error { when: self, what }
  }
}

/// The broad category an [`Error`] falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
  /// Bytes could not be turned into a message (or vice versa)
  Format,
  /// A peer (or the caller) broke the rules of an exchange
  Protocol,
  /// Blocks of a blockwise transfer arrived out of order
  Sequence,
  /// The network, clock, or the peer's silence got in the way
  Transport,
}

/// Ways an exchange can be broken off for not following
/// the rules of CoAP
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Protocol {
  /// Reliable transmission was asked for on a message that isn't CON
  NotConfirmable,
  /// Only GET requests can be observed
  NotGet,
  /// A request was responded to more than once
  AlreadyResponded,
  /// The exchange (e.g. an observation) has already ended
  Terminated,
  /// A uri could not be parsed, or uses a scheme we do not speak
  BadUri(String),
  /// The host of a uri could not be resolved to a socket address
  HostUnresolved(String),
}

/// An error encounterable from within Core
#[derive(Debug)]
pub struct Error<P: PlatformTypes> {
  /// What happened?
  pub what: What<P>,
  /// What were we doing when it happened?
  pub when: When,
}

impl<P: PlatformTypes> Error<P> {
  /// Is this error `FromBytes`?
  pub fn message_parse_error(&self) -> Option<&MessageParseError> {
    match self.what {
      | What::FromBytes(ref e) => Some(e),
      | _ => None,
    }
  }

  /// Which category does this error fall into?
  pub fn kind(&self) -> ErrorKind {
    self.what.kind()
  }
}

impl<P: PlatformTypes> From<What<P>> for Error<P> {
  fn from(what: What<P>) -> Self {
    When::None.what(what)
  }
}

impl<P: PlatformTypes> From<Protocol> for Error<P> {
  fn from(p: Protocol) -> Self {
    When::None.what(What::Protocol(p))
  }
}

/// A contextless error with some additional debug data attached.
#[derive(Debug)]
pub enum What<P: PlatformTypes> {
  /// Some socket operation (e.g. sending a datagram) failed
  SockError(SocketError<P>),
  /// Serializing a message from bytes failed
  FromBytes(MessageParseError),
  /// Serializing a message to bytes failed
  ToBytes(MessageToBytesError),
  /// The clock failed to provide timing.
  ClockError,
  /// A CONfirmable message was sent many times without an ACKnowledgement.
  MessageNeverAcked,
  /// The peer rejected a message with a Reset
  Reset,
  /// See [`Protocol`]
  Protocol(Protocol),
  /// A block arrived that doesn't pick up where the last one left off
  BlockSequence {
    /// Offset (in bytes) we were expecting the next block to start at
    expected: usize,
    /// Offset the block actually started at
    actual: usize,
  },
  /// Something timed out
  Timeout,
}

impl<P: PlatformTypes> What<P> {
  /// Which category does this error fall into?
  pub fn kind(&self) -> ErrorKind {
    match self {
      | What::FromBytes(_) | What::ToBytes(_) => ErrorKind::Format,
      | What::Protocol(_) => ErrorKind::Protocol,
      | What::BlockSequence { .. } => ErrorKind::Sequence,
      | What::SockError(_)
      | What::ClockError
      | What::MessageNeverAcked
      | What::Reset
      | What::Timeout => ErrorKind::Transport,
    }
  }
}

impl core::fmt::Display for Protocol {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    match self {
      | Protocol::NotConfirmable => write!(f, "message is not confirmable"),
      | Protocol::NotGet => write!(f, "only GET requests may be observed"),
      | Protocol::AlreadyResponded => write!(f, "request was already responded to"),
      | Protocol::Terminated => write!(f, "exchange already terminated"),
      | Protocol::BadUri(uri) => write!(f, "invalid uri {:?}", uri),
      | Protocol::HostUnresolved(host) => write!(f, "could not resolve host {:?}", host),
    }
  }
}

impl<P: PlatformTypes> core::fmt::Display for What<P> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    match self {
      | What::SockError(e) => write!(f, "socket error: {:?}", e),
      | What::FromBytes(e) => write!(f, "{}", e),
      | What::ToBytes(e) => write!(f, "{}", e),
      | What::ClockError => write!(f, "clock failed to provide the current time"),
      | What::MessageNeverAcked => write!(f, "CON message was never acknowledged"),
      | What::Reset => write!(f, "message was reset by the peer"),
      | What::Protocol(p) => write!(f, "{}", p),
      | What::BlockSequence { expected, actual } => {
        write!(f, "expected block at offset {}, got {}", expected, actual)
      },
      | What::Timeout => write!(f, "timed out"),
    }
  }
}

impl<P: PlatformTypes> core::fmt::Display for Error<P> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    match self.when {
      | When::Polling => write!(f, "{} (while polling)", self.what),
      | When::SendingMessage(addr, id, token) => write!(f,
                                                        "{} (while sending id={} token={} to {:?})",
                                                        self.what, id, token, addr),
      | When::None => write!(f, "{}", self.what),
    }
  }
}

impl<P: PlatformTypes> std::error::Error for Error<P> {}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test;

  #[test]
  fn kinds() {
    let e: Error<test::Mock> = When::None.what(What::MessageNeverAcked);
    assert_eq!(e.kind(), ErrorKind::Transport);

    let e: Error<test::Mock> = When::None.what(What::Reset);
    assert_eq!(e.kind(), ErrorKind::Transport);

    let e: Error<test::Mock> = Protocol::AlreadyResponded.into();
    assert_eq!(e.kind(), ErrorKind::Protocol);

    let e: Error<test::Mock> = What::BlockSequence { expected: 1024,
                                                     actual: 0 }.into();
    assert_eq!(e.kind(), ErrorKind::Sequence);
    assert_eq!(e.to_string(), "expected block at offset 1024, got 0");

    let e: Error<test::Mock> = What::FromBytes(MessageParseError::InvalidEmptyMessage).into();
    assert_eq!(e.kind(), ErrorKind::Format);
    assert!(e.message_parse_error().is_some());
  }
}

use std::net::SocketAddr;

use newt_msg::{Id, Message, MessageOptions, Token};

use crate::req::Method;

/// Key that a [`Listener`](crate::core::Listener) is registered under,
/// describing which inbound messages it is interested in.
///
/// When a message arrives, the candidate ids for the message are
/// tried from most to least specific and the first registered
/// listener wins:
///
/// 1. [`CorrelationId::Transmission`] (same peer & message id)
/// 2. [`CorrelationId::Transaction`] (same peer & token, token not empty)
/// 3. [`CorrelationId::Block2`] (requests for a block past the first, same peer, method & path)
/// 4. [`CorrelationId::Transfer`] (requests only, same peer, method & path)
/// 5. [`CorrelationId::Method`] (requests only)
/// 6. [`CorrelationId::Request`] (requests only)
/// 7. [`CorrelationId::Any`]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CorrelationId {
  /// A single message exchange (a CON and its ACK / RST)
  Transmission(SocketAddr, Id),
  /// A request and its response(s)
  Transaction(SocketAddr, Token),
  /// Requests for the remaining blocks of a response sent blockwise
  Block2(SocketAddr, Method, String),
  /// A sequence of requests for the same resource (Block1 transfers, observe)
  Transfer(SocketAddr, Method, String),
  /// All requests with some method
  Method(Method),
  /// All requests
  Request,
  /// All messages
  Any,
}

/// Priority stages of [`CorrelationId`]s, in order of dispatch.
///
/// Listeners that are not interested in a message after all
/// may pass it on with [`Core::dispatch_after`](crate::core::Core::dispatch_after).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
  /// See [`CorrelationId::Transmission`]
  Transmission,
  /// See [`CorrelationId::Transaction`]
  Transaction,
  /// See [`CorrelationId::Block2`]
  Block2,
  /// See [`CorrelationId::Transfer`]
  Transfer,
  /// See [`CorrelationId::Method`]
  Method,
  /// See [`CorrelationId::Request`]
  Request,
  /// See [`CorrelationId::Any`]
  Any,
}

impl CorrelationId {
  /// Which [`Stage`] is this id tried at?
  pub fn stage(&self) -> Stage {
    match self {
      | CorrelationId::Transmission(..) => Stage::Transmission,
      | CorrelationId::Transaction(..) => Stage::Transaction,
      | CorrelationId::Block2(..) => Stage::Block2,
      | CorrelationId::Transfer(..) => Stage::Transfer,
      | CorrelationId::Method(_) => Stage::Method,
      | CorrelationId::Request => Stage::Request,
      | CorrelationId::Any => Stage::Any,
    }
  }

  /// Id of the transfer a request belongs to
  pub fn transfer(addr: SocketAddr, msg: &Message) -> Self {
    CorrelationId::Transfer(addr, Method(msg.code), msg.path_string())
  }

  /// Id of the blockwise response a request for one of its blocks belongs to
  pub fn block2(addr: SocketAddr, msg: &Message) -> Self {
    CorrelationId::Block2(addr, Method(msg.code), msg.path_string())
  }

  /// The ids a message could be routed by, most specific first
  pub fn candidates(addr: SocketAddr, msg: &Message) -> Vec<CorrelationId> {
    let mut ids = vec![CorrelationId::Transmission(addr, msg.id)];

    if !msg.token.0.is_empty() {
      ids.push(CorrelationId::Transaction(addr, msg.token));
    }

    if msg.is_request() {
      if msg.block2().map(|b| b.num() > 0).unwrap_or(false) {
        ids.push(Self::block2(addr, msg));
      }
      ids.push(Self::transfer(addr, msg));
      ids.push(CorrelationId::Method(Method(msg.code)));
      ids.push(CorrelationId::Request);
    }

    ids.push(CorrelationId::Any);
    ids
  }
}

#[cfg(test)]
mod tests {
  use newt_msg::{Code, Type};

  use super::*;
  use crate::test;

  #[test]
  fn candidates_for_request() {
    let mut msg = Message::new(Type::Con, Code::new(0, 1), Id(3), test::token(1));
    msg.set_path("a/b");
    let ids = CorrelationId::candidates(test::x.x.x.x(1), &msg);

    assert_eq!(ids,
               vec![CorrelationId::Transmission(test::x.x.x.x(1), Id(3)),
                    CorrelationId::Transaction(test::x.x.x.x(1), test::token(1)),
                    CorrelationId::Transfer(test::x.x.x.x(1), Method::GET, "a/b".into()),
                    CorrelationId::Method(Method::GET),
                    CorrelationId::Request,
                    CorrelationId::Any]);
    assert!(ids.windows(2).all(|w| w[0].stage() < w[1].stage()));
  }

  #[test]
  fn candidates_for_later_block2_request() {
    let mut msg = Message::new(Type::Con, Code::new(0, 1), Id(3), test::token(1));
    msg.set_path("a");
    msg.set_block2(newt_msg::Block::new(64, 0, false));
    let first = CorrelationId::candidates(test::x.x.x.x(1), &msg);
    assert!(!first.contains(&CorrelationId::block2(test::x.x.x.x(1), &msg)));

    msg.set_block2(newt_msg::Block::new(64, 2, false));
    let later = CorrelationId::candidates(test::x.x.x.x(1), &msg);
    assert_eq!(later[2],
               CorrelationId::Block2(test::x.x.x.x(1), Method::GET, "a".into()));
    assert!(later.windows(2).all(|w| w[0].stage() < w[1].stage()));
  }

  #[test]
  fn candidates_for_empty_ack() {
    let msg = Message::new(Type::Ack, Code::EMPTY, Id(3), Default::default());
    assert_eq!(CorrelationId::candidates(test::x.x.x.x(1), &msg),
               vec![CorrelationId::Transmission(test::x.x.x.x(1), Id(3)),
                    CorrelationId::Any]);
  }
}

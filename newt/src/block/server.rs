use std::sync::Arc;

use newt_msg::{Block, Code, Id, Message, MessageOptions, Payload, Token, Type};
use toad_stem::Stem;

use super::BlockBuffer;
use crate::core::{CorrelationId, Core, Error, Listener, Protocol, Stage, TimerId, What, When};
use crate::logging;
use crate::net::Addrd;
use crate::platform::PlatformTypes;
use crate::resp::code;
use crate::transaction::TransactionServer;

/// Slice the block of `resp` that `req` asked for.
///
/// - When `req` has a Block2 option, the requested block is sliced (a block
///   size larger than `server_max` restarts at block 0 of size `server_max`)
/// - Otherwise the payload is sliced into blocks of `server_max` if it is larger
/// - Otherwise (or if `server_max` is 0 and Block2 wasn't asked for) the response is left alone
///
/// The request's Block1 option is echoed on the first block.
///
/// ```
/// use newt::block::blockwise_response;
/// use newt_msg::{Code, Id, Message, MessageOptions, Payload, Token, Type};
///
/// let req = Message::new(Type::Con, Code::new(0, 1), Id(1), Token::default());
/// let mut resp = Message::new(Type::Ack, Code::new(2, 5), Id(1), Token::default());
/// resp.payload = Payload(vec![0; 100]);
///
/// let first = blockwise_response(&req, resp, 64);
/// assert_eq!(first.payload.0.len(), 64);
/// assert_eq!(first.block2().map(|b| (b.num(), b.more())), Some((0, true)));
/// ```
pub fn blockwise_response(req: &Message, mut resp: Message, server_max: u16) -> Message {
  let max = Some(server_max).filter(|m| *m > 0).map(Block::floor_size);
  let len = resp.payload.0.len();

  let slice = match (req.block2(), max) {
    | _ if len == 0 => None,
    | (Some(b), Some(max)) if b.size() > max => Some((0, max)),
    | (Some(b), _) => Some((b.num(), b.size())),
    | (None, Some(max)) if len > max as usize => Some((0, max)),
    | (None, _) => None,
  };

  let num = match slice {
    | Some((num, size)) => {
      let start = (num as usize * size as usize).min(len);
      let end = (start + size as usize).min(len);
      resp.payload = Payload(resp.payload.0[start..end].to_vec());
      resp.set_block2(Block::new(size, num, end < len));
      num
    },
    | None => 0,
  };

  match req.block1() {
    | Some(b1) if num == 0 => resp.set_block1(b1),
    | _ => (),
  }

  resp
}

fn response(code: Code) -> Message {
  Message::new(Type::Ack, code, Id(0), Token::default())
}

enum Step {
  Ignore,
  Continue(Block),
  Incomplete { expected: usize, actual: usize },
  TooLarge,
  Complete(Vec<u8>),
}

type OnRequest<P> =
  Box<dyn FnOnce(&Core<P>, BlockwiseServer<P>, Addrd<Message>) + Send + Sync>;

struct State<P: PlatformTypes> {
  on_request: Option<OnRequest<P>>,
  buffer: BlockBuffer,
  size: u16,
  last: Option<u32>,
  receiving: bool,
  expiry: Option<TimerId>,
  listener: Option<Arc<dyn Listener<P>>>,
  transaction: Option<TransactionServer>,
}

struct Inner<P: PlatformTypes> {
  transfer: CorrelationId,
  max: u16,
  state: Stem<State<P>>,
}

/// A request received blockwise, and its response sent blockwise
///
/// A request with a Block1 option is reassembled first (RFC7959 section 2.5):
/// each block is answered with 2.31 Continue until the last one arrives.
/// Blocks are expected on the transfer's [`CorrelationId::Transfer`] id, so
/// they may carry any token. Offered blocks larger than
/// [`server_max_size`](crate::config::Block::server_max_size) make the client
/// restart with smaller blocks, and blocks beyond the last one are answered with
/// 4.08 Request Entity Incomplete.
///
/// Once the whole request is here it is handed off, and the response passed to
/// [`BlockwiseServer::respond`] is sliced with [`blockwise_response`]. While
/// blocks remain, requests for them are answered until the last one is sent or
/// [`exchange_lifetime`](crate::config::Msg::exchange_lifetime) passes.
pub struct BlockwiseServer<P: PlatformTypes> {
  inner: Arc<Inner<P>>,
}

impl<P: PlatformTypes> Clone for BlockwiseServer<P> {
  fn clone(&self) -> Self {
    Self { inner: self.inner.clone() }
  }
}

impl<P: PlatformTypes> core::fmt::Debug for BlockwiseServer<P> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("BlockwiseServer")
     .field("transfer", &self.inner.transfer)
     .field("received", &self.inner.state.map_ref(|s| s.buffer.size()))
     .finish()
  }
}

impl<P: PlatformTypes> BlockwiseServer<P> {
  /// Start handling a request
  ///
  /// `on_request` is invoked once the entire request has been received.
  pub fn start<F>(core: &Core<P>, req: Addrd<Message>, on_request: F) -> Result<Self, Error<P>>
    where F: FnOnce(&Core<P>, BlockwiseServer<P>, Addrd<Message>) + Send + Sync + 'static
  {
    let state = State { on_request: Some(Box::new(on_request)),
                        buffer: BlockBuffer::default(),
                        size: 0,
                        last: None,
                        receiving: false,
                        expiry: None,
                        listener: None,
                        transaction: None };
    let bw = Self { inner: Arc::new(Inner { transfer: CorrelationId::transfer(req.addr(),
                                                                              req.data()),
                                            max: core.config().block.server_max_size,
                                            state: Stem::new(state) }) };

    match req.data().block1() {
      | None => {
        let ts = TransactionServer::new(core, req.clone())?;
        bw.complete(core, ts, req);
      },
      | Some(b) if b.num() > 0 => {
        log::warn!("{} is not part of a transfer in progress",
                   logging::msg_summary(req.data()));
        let actual = b.offset();
        TransactionServer::new(core, req)?.respond(core,
                                                   response(code::REQUEST_ENTITY_INCOMPLETE))?;
        return Err(When::None.what(What::BlockSequence { expected: 0, actual }));
      },
      | Some(_) => {
        let this = bw.clone();
        let listener: Arc<dyn Listener<P>> =
          Arc::new(move |core: &Core<P>, msg: Addrd<Message>| this.on_block(core, msg));
        bw.inner.state.map_mut(|s| {
                        s.receiving = true;
                        s.listener = Some(listener.clone());
                      });
        core.add_listener(bw.inner.transfer.clone(), listener);

        bw.on_block(core, req);
      },
    }

    Ok(bw)
  }

  /// Respond to the request, sending the response blockwise if it is too large.
  pub fn respond(&self, core: &Core<P>, resp: Message) -> Result<(), Error<P>> {
    let ts = self.take_transaction()
                 .ok_or_else(|| Error::from(Protocol::AlreadyResponded))?;
    let first = blockwise_response(ts.req().data(), resp.clone(), self.inner.max);

    if first.block2().map(|b| b.more()).unwrap_or(false) {
      let id = CorrelationId::block2(ts.req().addr(), ts.req().data());
      Block2Transfer::start(core, id, resp, self.inner.max)?;
    }

    ts.respond(core, first)
  }

  /// Take the transaction of the (last block of the) request,
  /// to respond to it some other way.
  ///
  /// Afterwards [`BlockwiseServer::respond`] will fail.
  pub fn take_transaction(&self) -> Option<TransactionServer> {
    self.inner.state.map_mut(|s| s.transaction.take())
  }

  fn complete(&self, core: &Core<P>, ts: TransactionServer, req: Addrd<Message>) {
    let on_request = self.inner.state.map_mut(|s| {
                                       s.transaction = Some(ts.clone());
                                       s.on_request.take()
                                     });

    if let Some(f) = on_request {
      f(core, self.clone(), req)
    }
  }

  fn on_block(&self, core: &Core<P>, req: Addrd<Message>) {
    let block = match req.data().block1() {
      | Some(b) => b,
      | None => {
        self.stop_receiving(core);
        return core.dispatch_after(req, Stage::Transfer);
      },
    };

    let ts = match TransactionServer::new(core, req.clone()) {
      | Ok(ts) => ts,
      | Err(e) => return log::error!("{}", e),
    };

    let max = self.inner.max;
    let max_size = core.config().resources.max_size;
    let payload = &req.data().payload.0;

    let step = self.inner.state.map_mut(|s| {
      if !s.receiving {
        return Step::Ignore;
      }

      if block.offset() + payload.len() > max_size {
        return Step::TooLarge;
      }

      if max > 0 && block.size() > max {
        let max = Block::floor_size(max);
        s.buffer.clear();
        s.size = max;
        s.last = None;
        if block.num() == 0 {
          s.buffer.set(0, payload[..payload.len().min(max as usize)].to_vec());
        }
        return Step::Continue(Block::new(max, 0, true));
      }

      if s.size != block.size() {
        s.buffer.clear();
        s.size = block.size();
        s.last = None;
      }

      match s.last {
        | Some(last) if block.num() > last => {
          return Step::Incomplete { expected: last as usize * s.size as usize,
                                    actual: block.offset() }
        },
        | _ => (),
      }

      s.buffer.set(block.num() as usize, payload.clone());
      if !block.more() {
        s.last = Some(block.num());
        s.buffer.truncate(block.num() as usize + 1);
      }

      match s.last {
        | Some(_) if s.buffer.is_full() => Step::Complete(s.buffer.assemble()),
        | _ => Step::Continue(Block::new(block.size(), block.num(), true)),
      }
    });

    let sent = match step {
      | Step::Ignore => Ok(()),
      | Step::Continue(echo) => {
        self.rearm(core);
        let mut resp = response(code::CONTINUE);
        resp.set_block1(echo);
        ts.respond(core, resp)
      },
      | Step::Incomplete { expected, actual } => {
        log::warn!("{}",
                   When::None.what::<P>(What::BlockSequence { expected, actual }));
        self.stop_receiving(core);
        ts.respond(core, response(code::REQUEST_ENTITY_INCOMPLETE))
      },
      | Step::TooLarge => {
        log::warn!("{} would grow past {} bytes",
                   logging::msg_summary(req.data()),
                   max_size);
        self.stop_receiving(core);
        ts.respond(core, response(code::REQUEST_ENTITY_TOO_LARGE))
      },
      | Step::Complete(body) => {
        self.stop_receiving(core);
        let mut req = req;
        req.data_mut().payload = Payload(body);
        self.complete(core, ts, req);
        Ok(())
      },
    };

    if let Err(e) = sent {
      log::error!("{}", e);
    }
  }

  fn rearm(&self, core: &Core<P>) {
    if let Some(old) = self.inner.state.map_mut(|s| s.expiry.take()) {
      core.cancel(old);
    }

    let expired = self.clone();
    match core.schedule(core.config().msg.exchange_lifetime,
                        move |core: &Core<P>| {
                          log::debug!("abandoning incomplete transfer {:?}",
                                      expired.inner.transfer);
                          expired.stop_receiving(core)
                        }) {
      | Ok(timer) => self.inner.state.map_mut(|s| s.expiry = Some(timer)),
      | Err(e) => log::error!("{}", e),
    }
  }

  fn stop_receiving(&self, core: &Core<P>) {
    let stopped = self.inner.state.map_mut(|s| {
                                    if s.receiving {
                                      s.receiving = false;
                                      s.buffer.clear();
                                      Some((s.expiry.take(), s.listener.take()))
                                    } else {
                                      None
                                    }
                                  });

    if let Some((expiry, listener)) = stopped {
      if let Some(expiry) = expiry {
        core.cancel(expiry);
      }
      if let Some(listener) = listener {
        core.remove_own_listener(&self.inner.transfer, &listener);
      }
    }
  }
}

struct Block2Inner<P: PlatformTypes> {
  id: CorrelationId,
  resp: Message,
  max: u16,
  state: Stem<Block2State<P>>,
}

struct Block2State<P: PlatformTypes> {
  expiry: Option<TimerId>,
  listener: Option<Arc<dyn Listener<P>>>,
  done: bool,
}

/// The remaining blocks of a response, waiting to be asked for
///
/// Requests for them are routed by [`CorrelationId::Block2`], so they
/// never reach an observation of the same resource.
struct Block2Transfer<P: PlatformTypes> {
  inner: Arc<Block2Inner<P>>,
}

impl<P: PlatformTypes> Clone for Block2Transfer<P> {
  fn clone(&self) -> Self {
    Self { inner: self.inner.clone() }
  }
}

impl<P: PlatformTypes> Block2Transfer<P> {
  fn start(core: &Core<P>, id: CorrelationId, resp: Message, max: u16) -> Result<(), Error<P>> {
    let state = Block2State { expiry: None,
                              listener: None,
                              done: false };
    let transfer = Self { inner: Arc::new(Block2Inner { id: id.clone(),
                                                        resp,
                                                        max,
                                                        state: Stem::new(state) }) };

    let this = transfer.clone();
    let listener: Arc<dyn Listener<P>> =
      Arc::new(move |core: &Core<P>, msg: Addrd<Message>| this.on_message(core, msg));
    transfer.inner
            .state
            .map_mut(|s| s.listener = Some(listener.clone()));
    core.add_listener(id, listener);

    let expired = transfer.clone();
    let expiry = core.schedule(core.config().msg.exchange_lifetime,
                               move |core: &Core<P>| expired.end(core))?;
    transfer.inner.state.map_mut(|s| s.expiry = Some(expiry));

    Ok(())
  }

  fn on_message(&self, core: &Core<P>, req: Addrd<Message>) {
    if req.data().block2().is_none() {
      return core.dispatch_after(req, Stage::Block2);
    }

    let block = blockwise_response(req.data(), self.inner.resp.clone(), self.inner.max);
    if !block.block2().map(|b| b.more()).unwrap_or(false) {
      self.end(core);
    }

    let sent = TransactionServer::new(core, req).and_then(|ts| ts.respond(core, block));
    if let Err(e) = sent {
      log::error!("{}", e);
    }
  }

  fn end(&self, core: &Core<P>) {
    let ended = self.inner.state.map_mut(|s| {
                                  if s.done {
                                    None
                                  } else {
                                    s.done = true;
                                    Some((s.expiry.take(), s.listener.take()))
                                  }
                                });

    if let Some((expiry, listener)) = ended {
      if let Some(expiry) = expiry {
        core.cancel(expiry);
      }
      if let Some(listener) = listener {
        core.remove_own_listener(&self.inner.id, &listener);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use super::*;
  use crate::config::{Block as BlockConfig, Config};
  use crate::req::Method;
  use crate::test;

  fn block1_req(id: u16, num: u32, more: bool, size: u16, payload: &[u8]) -> Addrd<Message> {
    let mut msg = Message::new(Type::Con, Code::new(0, 3), Id(id), test::token(id as u8));
    msg.set_path("upload");
    msg.set_block1(Block::new(size, num, more));
    msg.payload = Payload(payload.to_vec());
    Addrd(msg, test::x.x.x.x(1))
  }

  type Requests = Arc<Mutex<Vec<Vec<u8>>>>;

  fn start(core: &Core<test::Mock>, req: Addrd<Message>, requests: &Requests) {
    let requests = requests.clone();
    BlockwiseServer::start(core, req, move |core: &Core<test::Mock>,
                                            bw: BlockwiseServer<test::Mock>,
                                            req: Addrd<Message>| {
                                        requests.lock().unwrap().push(req.data().payload.0.clone());
                                        bw.respond(core, response(code::CHANGED)).unwrap();
                                      }).unwrap();
  }

  #[test]
  fn slices_requested_block() {
    let mut req = Message::new(Type::Con, Code::new(0, 1), Id(1), Token::default());
    let mut resp = response(code::CONTENT);
    resp.payload = Payload((0..=255).collect());

    req.set_block2(Block::new(64, 3, false));
    let last = blockwise_response(&req, resp.clone(), 1024);
    assert_eq!(last.payload.0, (192..=255).collect::<Vec<u8>>());
    assert_eq!(last.block2(), Some(Block::new(64, 3, false)));

    // client asked for larger blocks than we allow
    req.set_block2(Block::new(256, 0, false));
    let first = blockwise_response(&req, resp.clone(), 128);
    assert_eq!(first.payload.0.len(), 128);
    assert_eq!(first.block2(), Some(Block::new(128, 0, true)));

    // no Block2 & small enough
    let req = Message::new(Type::Con, Code::new(0, 1), Id(1), Token::default());
    let whole = blockwise_response(&req, resp.clone(), 1024);
    assert_eq!(whole, resp);
  }

  #[test]
  fn echoes_block1_on_first_block() {
    let req = block1_req(1, 4, false, 16, b"end");
    let mut resp = response(code::CHANGED);
    resp.payload = Payload(vec![1; 40]);

    let first = blockwise_response(req.data(), resp, 16);
    assert_eq!(first.block1(), Some(Block::new(16, 4, false)));
    assert_eq!(first.block2(), Some(Block::new(16, 0, true)));
  }

  #[test]
  fn reassembles_block1_request() {
    let (core, sock) = test::core();
    let requests: Requests = Default::default();

    start(&core, block1_req(1, 0, true, 16, &[0; 16]), &requests);
    core.dispatch(block1_req(2, 1, true, 16, &[1; 16]));
    assert!(requests.lock().unwrap().is_empty());
    core.dispatch(block1_req(3, 2, false, 16, &[2; 8]));

    let sent = test::sent(&sock);
    let codes = sent.iter()
                    .map(|m| (m.data().id, m.data().code, m.data().block1()))
                    .collect::<Vec<_>>();
    assert_eq!(codes,
               vec![(Id(1), code::CONTINUE, Some(Block::new(16, 0, true))),
                    (Id(2), code::CONTINUE, Some(Block::new(16, 1, true))),
                    (Id(3), code::CHANGED, Some(Block::new(16, 2, false)))]);
    assert_eq!(*requests.lock().unwrap(),
               vec![[[0u8; 16], [1; 16]].concat().into_iter().chain([2; 8]).collect::<Vec<_>>()]);
    assert!(!core.has_listener(&CorrelationId::transfer(test::x.x.x.x(1),
                                                        block1_req(1, 0, true, 16, &[]).data())));
  }

  #[test]
  fn block_without_transfer_is_incomplete() {
    let (core, sock) = test::core();

    let err = BlockwiseServer::start(&core,
                                     block1_req(1, 3, true, 16, &[0; 16]),
                                     |_: &Core<test::Mock>, _, _| panic!()).unwrap_err();
    assert_eq!(err.kind(), crate::core::ErrorKind::Sequence);

    let sent = test::sent(&sock);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].data().code, code::REQUEST_ENTITY_INCOMPLETE);
  }

  #[test]
  fn block_past_the_last_is_incomplete() {
    let (core, sock) = test::core();
    let requests: Requests = Default::default();

    start(&core, block1_req(1, 0, true, 16, &[0; 16]), &requests);
    core.dispatch(block1_req(2, 2, false, 16, &[2; 4]));
    core.dispatch(block1_req(3, 3, false, 16, &[3; 4]));

    let codes = test::sent(&sock).iter()
                                 .map(|m| m.data().code)
                                 .collect::<Vec<_>>();
    assert_eq!(codes,
               vec![code::CONTINUE, code::CONTINUE, code::REQUEST_ENTITY_INCOMPLETE]);
    assert!(requests.lock().unwrap().is_empty());
  }

  #[test]
  fn oversized_blocks_are_shrunk() {
    let config = Config { block: BlockConfig { server_max_size: 16,
                                               ..Default::default() },
                          ..Default::default() };
    let (core, sock) = test::core_config(test::x.x.x.x(5683), config);
    let requests: Requests = Default::default();

    start(&core, block1_req(1, 0, true, 32, &[7; 32]), &requests);

    let sent = test::sent(&sock);
    assert_eq!(sent[0].data().code, code::CONTINUE);
    assert_eq!(sent[0].data().block1(), Some(Block::new(16, 0, true)));

    core.dispatch(block1_req(2, 1, false, 16, &[8; 10]));
    assert_eq!(*requests.lock().unwrap(),
               vec![[7u8; 16].into_iter().chain([8; 10]).collect::<Vec<_>>()]);
  }

  #[test]
  fn abandoned_transfer_expires() {
    let (core, _) = test::core();
    let requests: Requests = Default::default();
    let id = CorrelationId::transfer(test::x.x.x.x(1), block1_req(1, 0, true, 16, &[]).data());

    start(&core, block1_req(1, 0, true, 16, &[0; 16]), &requests);
    assert!(core.has_listener(&id));

    test::advance_to(&core, 100_000);
    assert!(!core.has_listener(&id));
  }

  #[test]
  fn oversized_block_past_the_first_restarts_the_transfer() {
    let config = Config { block: BlockConfig { server_max_size: 16,
                                               ..Default::default() },
                          ..Default::default() };
    let (core, sock) = test::core_config(test::x.x.x.x(5683), config);
    let requests: Requests = Default::default();

    start(&core, block1_req(1, 0, true, 32, &[7; 32]), &requests);
    core.dispatch(block1_req(2, 2, true, 32, &[9; 32]));

    let echoed = test::sent(&sock).iter()
                                  .map(|m| m.data().block1())
                                  .collect::<Vec<_>>();
    assert_eq!(echoed,
               vec![Some(Block::new(16, 0, true)), Some(Block::new(16, 0, true))]);

    core.dispatch(block1_req(3, 0, true, 16, &[5; 16]));
    core.dispatch(block1_req(4, 1, false, 16, &[6; 4]));
    assert_eq!(*requests.lock().unwrap(),
               vec![[5u8; 16].into_iter().chain([6; 4]).collect::<Vec<_>>()]);
  }

  #[test]
  fn early_blocks_past_the_last_are_dropped() {
    let (core, sock) = test::core();
    let requests: Requests = Default::default();

    start(&core, block1_req(1, 0, true, 16, &[0; 16]), &requests);
    core.dispatch(block1_req(2, 3, true, 16, &[3; 16]));
    core.dispatch(block1_req(3, 1, false, 16, &[1; 4]));

    assert_eq!(test::sent(&sock).last().map(|m| m.data().code),
               Some(code::CHANGED));
    assert_eq!(*requests.lock().unwrap(),
               vec![[0u8; 16].into_iter().chain([1; 4]).collect::<Vec<_>>()]);
  }

  fn block2_req(id: u16, num: u32) -> Addrd<Message> {
    let mut msg = Message::new(Type::Con, Code::new(0, 1), Id(id), test::token(id as u8));
    msg.set_path("big");
    msg.set_block2(Block::new(16, num, false));
    Addrd(msg, test::x.x.x.x(1))
  }

  fn big() -> Message {
    let mut resp = response(code::CONTENT);
    resp.payload = Payload(vec![9; 40]);
    resp
  }

  #[test]
  fn block2_transfer_ends_after_last_block() {
    let (core, sock) = test::core();
    let id = CorrelationId::block2(test::x.x.x.x(1), block2_req(1, 1).data());
    assert_eq!(id, CorrelationId::Block2(test::x.x.x.x(1), Method::GET, "big".into()));

    Block2Transfer::start(&core, id.clone(), big(), 16).unwrap();
    core.dispatch(block2_req(10, 1));
    core.dispatch(block2_req(11, 2));

    let sent = test::sent(&sock);
    assert_eq!(sent.iter().map(|m| m.data().payload.0.len()).collect::<Vec<_>>(),
               vec![16, 8]);
    assert!(!core.has_listener(&id));
  }

  #[test]
  fn expired_block2_transfer_leaves_its_successor_alone() {
    let (core, sock) = test::core();
    let id = CorrelationId::block2(test::x.x.x.x(1), block2_req(1, 1).data());

    Block2Transfer::start(&core, id.clone(), big(), 16).unwrap();
    test::advance_to(&core, 50_000);
    Block2Transfer::start(&core, id.clone(), big(), 16).unwrap();

    test::advance_to(&core, 100_000);
    assert!(core.has_listener(&id));

    core.dispatch(block2_req(10, 1));
    assert_eq!(test::sent(&sock).len(), 1);

    test::advance_to(&core, 150_000);
    assert!(!core.has_listener(&id));
  }

  #[test]
  fn plain_requests_skip_the_block2_transfer() {
    let (core, sock) = test::core();
    let id = CorrelationId::block2(test::x.x.x.x(1), block2_req(1, 1).data());
    Block2Transfer::start(&core, id.clone(), big(), 16).unwrap();

    let mut plain = block2_req(10, 0);
    plain.data_mut().remove(newt_msg::no_repeat::BLOCK2);
    core.dispatch(plain);

    // nobody else is listening, so it is reset
    let sent = test::sent(&sock);
    assert_eq!(sent[0].data().ty, Type::Reset);
    assert!(core.has_listener(&id));
  }
}

use std::sync::Arc;

use newt_msg::{no_repeat, Block, Message, MessageOptions, Payload};
use toad_stem::Stem;

use crate::core::{Callback, Core, Error, What, When};
use crate::logging;
use crate::net::Addrd;
use crate::platform::PlatformTypes;
use crate::transaction::{Response, TransactionClient};

enum Step {
  Ignore,
  Deliver,
  Assembled(Vec<u8>),
  Request { num: u32, size: u16 },
  OutOfSequence { expected: usize, actual: usize },
}

/// Bookkeeping shared by the blockwise clients
struct Progress<P: PlatformTypes> {
  on_done: Option<Callback<P, Response<P>>>,
  current: Option<TransactionClient<P>>,
  done: bool,
}

type Ended<P> = (Option<Callback<P, Response<P>>>, Option<TransactionClient<P>>);

impl<P: PlatformTypes> Progress<P> {
  fn new(on_done: Callback<P, Response<P>>) -> Self {
    Self { on_done: Some(on_done),
           current: None,
           done: false }
  }

  /// Yields the callback & in-flight exchange the first time only
  fn end(&mut self) -> Option<Ended<P>> {
    if self.done {
      None
    } else {
      self.done = true;
      Some((self.on_done.take(), self.current.take()))
    }
  }

  fn track(&mut self, tc: &TransactionClient<P>) {
    if !self.done && !tc.is_done() {
      self.current = Some(tc.clone());
    }
  }
}

fn finish<P: PlatformTypes>(core: &Core<P>, ended: Option<Ended<P>>, result: Option<Response<P>>) {
  if let Some((on_done, current)) = ended {
    if let Some(tc) = current {
      tc.terminate(core);
    }

    match (on_done, result) {
      | (Some(on_done), Some(result)) => on_done(core, result),
      | _ => (),
    }
  }
}

struct Block1State<P: PlatformTypes> {
  progress: Progress<P>,
  body: Vec<u8>,
  acked: usize,
  size: u16,
}

struct Block1Inner<P: PlatformTypes> {
  req: Addrd<Message>,
  state: Stem<Block1State<P>>,
}

/// A request whose payload is sent in Block1 blocks (RFC7959 section 2.5)
///
/// When the payload fits in
/// [`client_max_size`](crate::config::Block::client_max_size) (or blockwise
/// transfers are disabled with a max of 0) the request is sent as-is.
///
/// Each block is sent once the previous one was acknowledged with a
/// response carrying its Block1 option; a server asking for smaller blocks
/// is obeyed, starting over when it asks mid-transfer. A response acknowledging a block other than the one sent
/// fails the transfer with [`What::BlockSequence`].
///
/// The response to the last block (or any error response) is delivered.
pub struct Block1Client<P: PlatformTypes> {
  inner: Arc<Block1Inner<P>>,
}

impl<P: PlatformTypes> Clone for Block1Client<P> {
  fn clone(&self) -> Self {
    Self { inner: self.inner.clone() }
  }
}

impl<P: PlatformTypes> core::fmt::Debug for Block1Client<P> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("Block1Client")
     .field("req", &self.inner.req)
     .field("acked", &self.inner.state.map_ref(|s| s.acked))
     .finish()
  }
}

impl<P: PlatformTypes> Block1Client<P> {
  /// Send a request, slicing its payload if necessary.
  ///
  /// Every block gets a new message id, and all of them share the request's token.
  pub fn send<F>(core: &Core<P>, mut req: Addrd<Message>, on_done: F) -> Result<Self, Error<P>>
    where F: FnOnce(&Core<P>, Response<P>) + Send + Sync + 'static
  {
    let body = std::mem::take(&mut req.data_mut().payload.0);
    let max = core.config().block.client_max_size;
    let first = if max > 0 && body.len() > max as usize {
      Some((0, Block::floor_size(max)))
    } else {
      None
    };

    let state = Block1State { progress: Progress::new(Box::new(on_done)),
                              body,
                              acked: 0,
                              size: 0 };
    let b1 = Self { inner: Arc::new(Block1Inner { req,
                                                  state: Stem::new(state) }) };

    b1.send_block(core, first)?;
    Ok(b1)
  }

  /// Has the transfer ended?
  pub fn is_done(&self) -> bool {
    self.inner.state.map_ref(|s| s.progress.done)
  }

  /// Stop the transfer without delivering a result
  pub fn terminate(&self, core: &Core<P>) {
    finish(core, self.inner.state.map_mut(|s| s.progress.end()), None)
  }

  fn send_block(&self, core: &Core<P>, block: Option<(u32, u16)>) -> Result<(), Error<P>> {
    let mut msg = self.inner.req.clone();
    msg.data_mut().id = core.next_id();

    self.inner.state.map_mut(|s| match block {
                      | Some((num, size)) => {
                        s.size = size;
                        let start = (num as usize * size as usize).min(s.body.len());
                        let end = (start + size as usize).min(s.body.len());
                        msg.data_mut().payload = Payload(s.body[start..end].to_vec());
                        msg.data_mut()
                           .set_block1(Block::new(size, num, end < s.body.len()));
                      },
                      | None => msg.data_mut().payload = Payload(s.body.clone()),
                    });

    let this = self.clone();
    let tc = TransactionClient::send(core, msg, move |core: &Core<P>, r: Response<P>| {
               this.on_response(core, r)
             })?;
    self.inner.state.map_mut(|s| s.progress.track(&tc));
    Ok(())
  }

  fn on_response(&self, core: &Core<P>, r: Response<P>) {
    let resp = match r {
      | Ok(resp) => resp,
      | Err(e) => return self.finish(core, Err(e)),
    };

    let block = match resp.data().block1() {
      | Some(b) if resp.data().code.is_success() => b,
      | _ => return self.finish(core, Ok(resp)),
    };

    let step = self.inner.state.map_mut(|s| {
                                 if s.progress.done {
                                   Step::Ignore
                                 } else if block.num() == 0 && s.acked > 0 && block.size() < s.size {
                                   s.acked = 0;
                                   Step::Request { num: 0,
                                                   size: block.size() }
                                 } else if block.offset() != s.acked {
                                   Step::OutOfSequence { expected: s.acked,
                                                         actual: block.offset() }
                                 } else {
                                   s.acked += block.size() as usize;
                                   if s.acked >= s.body.len() {
                                     Step::Deliver
                                   } else {
                                     Step::Request { num: (s.acked / block.size() as usize)
                                                          as u32,
                                                     size: block.size() }
                                   }
                                 }
                               });

    match step {
      | Step::Ignore | Step::Assembled(_) => (),
      | Step::Deliver => self.finish(core, Ok(resp)),
      | Step::Request { num, size } => {
        log::trace!("sending block1 {} ({} bytes) to {}", num, size, resp.addr());
        if let Err(e) = self.send_block(core, Some((num, size))) {
          self.finish(core, Err(e))
        }
      },
      | Step::OutOfSequence { expected, actual } => {
        log::warn!("{} acked the wrong block, aborting",
                   logging::msg_summary(resp.data()));
        self.finish(core,
                    Err(When::None.what(What::BlockSequence { expected, actual })))
      },
    }
  }

  fn finish(&self, core: &Core<P>, result: Response<P>) {
    finish(core,
           self.inner.state.map_mut(|s| s.progress.end()),
           Some(result))
  }
}

struct Block2State<P: PlatformTypes> {
  progress: Progress<P>,
  body: Vec<u8>,
  restarts: u8,
  size: Option<u16>,
}

struct Block2Inner<P: PlatformTypes> {
  template: Addrd<Message>,
  state: Stem<Block2State<P>>,
}

/// A request whose response is received in Block2 blocks (RFC7959 section 2.4)
///
/// The first request asks for blocks of
/// [`client_max_size`](crate::config::Block::client_max_size) (unless it is 0),
/// and every following block is requested with a new message id & token.
///
/// A block arriving out of order restarts the transfer from the first block,
/// at most [`max_block2_restarts`](crate::config::Block::max_block2_restarts) times
/// before failing with [`What::BlockSequence`].
///
/// Once the last block arrives, the reassembled response is delivered
/// without its Block2 option.
pub struct Block2Client<P: PlatformTypes> {
  inner: Arc<Block2Inner<P>>,
}

impl<P: PlatformTypes> Clone for Block2Client<P> {
  fn clone(&self) -> Self {
    Self { inner: self.inner.clone() }
  }
}

impl<P: PlatformTypes> core::fmt::Debug for Block2Client<P> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("Block2Client")
     .field("template", &self.inner.template)
     .field("received", &self.inner.state.map_ref(|s| s.body.len()))
     .finish()
  }
}

impl<P: PlatformTypes> Block2Client<P> {
  fn new(core: &Core<P>, req: &Addrd<Message>, on_done: Callback<P, Response<P>>) -> Self {
    let mut template = req.clone();
    template.data_mut().payload = Payload::default();
    template.data_mut().remove(no_repeat::BLOCK1);
    template.data_mut().remove(no_repeat::BLOCK2);

    let max = core.config().block.client_max_size;
    let state = Block2State { progress: Progress::new(on_done),
                              body: vec![],
                              restarts: 0,
                              size: Some(max).filter(|m| *m > 0).map(Block::floor_size) };

    Self { inner: Arc::new(Block2Inner { template,
                                         state: Stem::new(state) }) }
  }

  /// Send a request and reassemble its response
  pub fn send<F>(core: &Core<P>, req: Addrd<Message>, on_done: F) -> Result<Self, Error<P>>
    where F: FnOnce(&Core<P>, Response<P>) + Send + Sync + 'static
  {
    let b2 = Self::new(core, &req, Box::new(on_done));

    let mut first = req;
    if let Some(size) = b2.inner.state.map_ref(|s| s.size) {
      first.data_mut().set_block2(Block::new(size, 0, false));
    }

    b2.send_msg(core, first)?;
    Ok(b2)
  }

  /// Continue reassembling a response whose first block
  /// was received in response to `req`
  pub fn continue_from<F>(core: &Core<P>,
                          req: &Addrd<Message>,
                          resp: Addrd<Message>,
                          on_done: F)
                          -> Self
    where F: FnOnce(&Core<P>, Response<P>) + Send + Sync + 'static
  {
    let b2 = Self::new(core, req, Box::new(on_done));
    b2.on_response(core, Ok(resp));
    b2
  }

  /// Has the transfer ended?
  pub fn is_done(&self) -> bool {
    self.inner.state.map_ref(|s| s.progress.done)
  }

  /// Stop the transfer without delivering a result
  pub fn terminate(&self, core: &Core<P>) {
    finish(core, self.inner.state.map_mut(|s| s.progress.end()), None)
  }

  fn send_msg(&self, core: &Core<P>, mut msg: Addrd<Message>) -> Result<(), Error<P>> {
    msg.data_mut().id = core.next_id();

    let this = self.clone();
    let tc = TransactionClient::send(core, msg, move |core: &Core<P>, r: Response<P>| {
               this.on_response(core, r)
             })?;
    self.inner.state.map_mut(|s| s.progress.track(&tc));
    Ok(())
  }

  fn on_response(&self, core: &Core<P>, r: Response<P>) {
    let resp = match r {
      | Ok(resp) => resp,
      | Err(e) => return self.finish(core, Err(e)),
    };

    let block = match resp.data().block2() {
      | Some(b) if resp.data().code.is_success() => b,
      | _ => return self.finish(core, Ok(resp)),
    };

    let cap = core.config().block.max_block2_restarts;
    let step = self.inner.state.map_mut(|s| {
                                 if s.progress.done {
                                   Step::Ignore
                                 } else if block.offset() != s.body.len() {
                                   if s.restarts >= cap {
                                     Step::OutOfSequence { expected: s.body.len(),
                                                           actual: block.offset() }
                                   } else {
                                     s.restarts += 1;
                                     s.body.clear();
                                     Step::Request { num: 0,
                                                     size: s.size.unwrap_or(block.size()) }
                                   }
                                 } else {
                                   s.body.extend_from_slice(&resp.data().payload.0);
                                   if block.more() {
                                     Step::Request { num: (s.body.len()
                                                           / block.size() as usize)
                                                          as u32,
                                                     size: block.size() }
                                   } else {
                                     Step::Assembled(std::mem::take(&mut s.body))
                                   }
                                 }
                               });

    match step {
      | Step::Ignore => (),
      | Step::Deliver => self.finish(core, Ok(resp)),
      | Step::Assembled(body) => {
        let mut resp = resp;
        resp.data_mut().payload = Payload(body);
        resp.data_mut().remove(no_repeat::BLOCK2);
        self.finish(core, Ok(resp))
      },
      | Step::Request { num, size } => {
        if num == 0 {
          log::debug!("{} was out of order, restarting",
                      logging::msg_summary(resp.data()));
        }

        let mut msg = self.inner.template.clone();
        msg.data_mut().token = core.next_token();
        msg.data_mut().set_block2(Block::new(size, num, false));
        if let Err(e) = self.send_msg(core, msg) {
          self.finish(core, Err(e))
        }
      },
      | Step::OutOfSequence { expected, actual } => {
        log::warn!("giving up on block2 transfer from {} after {} restarts",
                   resp.addr(),
                   cap);
        self.finish(core,
                    Err(When::None.what(What::BlockSequence { expected, actual })))
      },
    }
  }

  fn finish(&self, core: &Core<P>, result: Response<P>) {
    finish(core,
           self.inner.state.map_mut(|s| s.progress.end()),
           Some(result))
  }
}

#[derive(Debug)]
enum Leg<P: PlatformTypes> {
  Block1(Block1Client<P>),
  Block2(Block2Client<P>),
}

impl<P: PlatformTypes> Clone for Leg<P> {
  fn clone(&self) -> Self {
    match self {
      | Leg::Block1(b1) => Leg::Block1(b1.clone()),
      | Leg::Block2(b2) => Leg::Block2(b2.clone()),
    }
  }
}

/// A request that may need both Block1 and Block2 transfers
///
/// The request payload is sent with a [`Block1Client`], and the
/// response to its last block is reassembled by a [`Block2Client`].
pub struct BlockwiseClient<P: PlatformTypes> {
  leg: Arc<Stem<Option<Leg<P>>>>,
}

impl<P: PlatformTypes> Clone for BlockwiseClient<P> {
  fn clone(&self) -> Self {
    Self { leg: self.leg.clone() }
  }
}

impl<P: PlatformTypes> core::fmt::Debug for BlockwiseClient<P> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("BlockwiseClient")
     .field("leg", &self.leg)
     .finish()
  }
}

impl<P: PlatformTypes> BlockwiseClient<P> {
  /// Send a request, delivering its (reassembled) response
  pub fn send<F>(core: &Core<P>, req: Addrd<Message>, on_done: F) -> Result<Self, Error<P>>
    where F: FnOnce(&Core<P>, Response<P>) + Send + Sync + 'static
  {
    let bw = Self { leg: Arc::new(Stem::new(None)) };

    let max = core.config().block.client_max_size as usize;
    if max == 0 || req.data().payload.0.len() <= max {
      let b2 = Block2Client::send(core, req, on_done)?;
      bw.leg.map_mut(|l| *l = Some(Leg::Block2(b2.clone())));
      return Ok(bw);
    }

    let template = req.clone();
    let this = bw.clone();
    let b1 = Block1Client::send(core, req, move |core: &Core<P>, r: Response<P>| match r {
               | Ok(resp) => {
                 let b2 = Block2Client::continue_from(core, &template, resp, on_done);
                 this.leg.map_mut(|l| *l = Some(Leg::Block2(b2.clone())));
               },
               | Err(e) => on_done(core, Err(e)),
             })?;
    bw.leg.map_mut(|l| {
            if l.is_none() {
              *l = Some(Leg::Block1(b1.clone()));
            }
          });

    Ok(bw)
  }

  /// Has the transfer ended?
  pub fn is_done(&self) -> bool {
    self.leg.map_ref(|l| match l {
              | Some(Leg::Block1(b1)) => b1.is_done(),
              | Some(Leg::Block2(b2)) => b2.is_done(),
              | None => false,
            })
  }

  /// Stop the transfer without delivering a result
  pub fn terminate(&self, core: &Core<P>) {
    match self.leg.map_ref(|l| l.clone()) {
      | Some(Leg::Block1(b1)) => b1.terminate(core),
      | Some(Leg::Block2(b2)) => b2.terminate(core),
      | None => (),
    }
  }
}

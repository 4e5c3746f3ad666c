use std::collections::HashMap;
use std::sync::Arc;

use embedded_time::duration::Milliseconds;
use embedded_time::Instant;
use newt_msg::{Code, Id, Message, Token, TryFromBytes, TryIntoBytes, Type};
use rand::{Rng, SeedableRng};
use tinyvec::ArrayVec;
use toad_stem::Stem;

mod correlation;
mod error;
mod timer;

#[doc(inline)]
pub use correlation::*;
#[doc(inline)]
pub use error::*;
#[doc(inline)]
pub use timer::TimerId;

use crate::config::Config;
use crate::logging;
use crate::net::{Addrd, Socket};
use crate::platform::PlatformTypes;
use crate::retry::RetryTimer;
use crate::time::{self, Millis};

/// Something interested in inbound messages
///
/// Listeners are registered with [`Core::add_listener`] under a
/// [`CorrelationId`] and invoked for every inbound message routed to that id.
///
/// Any `Fn(&Core<P>, Addrd<Message>)` closure is a listener.
pub trait Listener<P: PlatformTypes>: Send + Sync {
  /// A message was routed to this listener
  fn on_message(&self, core: &Core<P>, msg: Addrd<Message>);
}

impl<P, F> Listener<P> for F
  where P: PlatformTypes,
        F: Fn(&Core<P>, Addrd<Message>) + Send + Sync
{
  fn on_message(&self, core: &Core<P>, msg: Addrd<Message>) {
    self(core, msg)
  }
}

/// Work to be done once, when some exchange completes
pub type Callback<P, T> = Box<dyn FnOnce(&Core<P>, T) + Send + Sync>;

/// A CoAP runtime that owns the socket & clock, routes inbound messages
/// to listeners and fires scheduled timers.
///
/// Core does no work of its own; it is driven by calling
/// [`Core::poll`] (receive & dispatch one datagram) and [`Core::tick`]
/// (fire due timers.) See [`crate::std::Runtime`] for a thread that does this.
///
/// Listeners and timers are never invoked while Core holds a lock,
/// so they are free to call back into Core.
pub struct Core<P: PlatformTypes> {
  config: Config,
  clock: P::Clock,
  sock: P::Socket,
  listeners: Stem<HashMap<CorrelationId, Arc<dyn Listener<P>>>>,
  timers: Stem<timer::Timers<P>>,
  id: Stem<Id>,
  token_count: Stem<u64>,
  rand: Stem<rand_chacha::ChaCha8Rng>,
  recv_buf: Stem<Vec<u8>>,
}

impl<P: PlatformTypes> core::fmt::Debug for Core<P> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("Core")
     .field("config", &self.config)
     .field("clock", &self.clock)
     .field("sock", &self.sock)
     .field("listeners", &self.listeners.map_ref(|ls| ls.len()))
     .field("timers", &self.timers.map_ref(|ts| ts.len()))
     .finish()
  }
}

impl<P: PlatformTypes> Core<P> {
  /// Creates a new Core with the default runtime behavior
  pub fn new(clock: P::Clock, sock: P::Socket) -> Self {
    Self::new_config(Config::default(), clock, sock)
  }

  /// Create a new core with custom runtime behavior
  pub fn new_config(config: Config, clock: P::Clock, sock: P::Socket) -> Self {
    let seed = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH)
                                           .map(|d| d.as_nanos() as u64)
                                           .unwrap_or_default()
               ^ config.msg.token_seed as u64;
    let mut rand = rand_chacha::ChaCha8Rng::seed_from_u64(seed);
    let id = Id(rand.gen());

    Self { config,
           clock,
           sock,
           listeners: Stem::new(HashMap::new()),
           timers: Stem::new(Default::default()),
           id: Stem::new(id),
           token_count: Stem::new(0),
           rand: Stem::new(rand),
           recv_buf: Stem::new(vec![0u8; 65535]) }
  }

  /// Get the runtime config
  pub fn config(&self) -> Config {
    self.config
  }

  /// Get the clock used for timers & retries
  pub fn clock(&self) -> &P::Clock {
    &self.clock
  }

  /// Get the socket messages are sent & received with
  pub fn socket(&self) -> &P::Socket {
    &self.sock
  }

  /// Get the current time
  pub fn now(&self) -> Result<Instant<P::Clock>, Error<P>> {
    embedded_time::Clock::try_now(&self.clock).map_err(|_| When::None.what(What::ClockError))
  }

  /// Milliseconds since the clock's epoch
  pub fn now_millis(&self) -> Result<u64, Error<P>> {
    self.now()
        .and_then(|now| {
          time::millis_since_epoch(now).ok_or_else(|| When::None.what(What::ClockError))
        })
  }

  /// Generate a new message [`Id`]
  ///
  /// Ids start at a random number and count up, wrapping around
  /// after `u16::MAX`.
  pub fn next_id(&self) -> Id {
    self.id.map_mut(|id| {
             *id = id.next();
             *id
           })
  }

  /// Generate a new message [`Token`]
  ///
  /// Tokens are opaque hashes of the configured
  /// [`token_seed`](crate::config::Msg::token_seed), a counter and some
  /// randomness, truncated to [`token_len`](crate::config::Msg::token_len).
  pub fn next_token(&self) -> Token {
    let count = self.token_count.map_mut(|n| {
                                  *n = n.wrapping_add(1);
                                  *n
                                });
    let noise: u64 = self.rand.map_mut(|r| r.gen());

    let mut bytes = ArrayVec::<[u8; 18]>::new();
    bytes.extend_from_slice(&self.config.msg.token_seed.to_be_bytes());
    bytes.extend_from_slice(&count.to_be_bytes());
    bytes.extend_from_slice(&noise.to_be_bytes());

    Token::opaque(&bytes).truncated(self.config.msg.token_len as usize)
  }

  /// Create a [`RetryTimer`] for a CON message sent right now,
  /// using the configured retry strategy.
  pub fn con_retry_timer(&self) -> Result<RetryTimer<P::Clock>, Error<P>> {
    let now = self.now()?;
    let con = self.config.msg.con;
    Ok(self.rand.map_mut(|r| {
                  RetryTimer::new(now, con.unacked_retry_strategy, con.max_attempts, r)
                }))
  }

  /// Register a listener for messages routed to `id`
  ///
  /// An existing listener for `id` is replaced.
  pub fn add_listener(&self, id: CorrelationId, listener: Arc<dyn Listener<P>>) {
    let replaced = self.listeners
                       .map_mut(|ls| ls.insert(id.clone(), listener.clone()));
    if replaced.is_some() {
      log::warn!("replaced listener for {:?}", id);
    }
  }

  /// Stop routing messages for `id`
  ///
  /// Returns whether a listener was registered.
  pub fn remove_listener(&self, id: &CorrelationId) -> bool {
    let removed = self.listeners.map_mut(|ls| ls.remove(id));
    if removed.is_none() {
      log::warn!("no listener registered for {:?}", id);
    }
    removed.is_some()
  }

  /// Stop routing messages for `id` to `listener`
  ///
  /// Does nothing (and returns `false`) when a different listener
  /// has since been registered for `id`.
  pub fn remove_own_listener(&self, id: &CorrelationId, listener: &Arc<dyn Listener<P>>) -> bool {
    let ours = |l: &Arc<dyn Listener<P>>| {
      Arc::as_ptr(l) as *const () == Arc::as_ptr(listener) as *const ()
    };

    self.listeners.map_mut(|ls| {
                    let owned = ls.get(id).map(|l| ours(l)).unwrap_or(false);
                    if owned {
                      ls.remove(id);
                    }
                    owned
                  })
  }

  /// Is there a listener registered for `id`?
  pub fn has_listener(&self, id: &CorrelationId) -> bool {
    self.listeners.map_ref(|ls| ls.contains_key(id))
  }

  /// Route an inbound message to the most specific listener interested in it.
  ///
  /// Unclaimed CON messages are rejected with a Reset,
  /// anything else unclaimed is dropped.
  pub fn dispatch(&self, msg: Addrd<Message>) {
    self.route(msg, None)
  }

  /// Route an inbound message to the most specific listener
  /// registered at a stage after `stage`.
  ///
  /// Listeners use this to pass on messages they don't want.
  pub fn dispatch_after(&self, msg: Addrd<Message>, stage: Stage) {
    self.route(msg, Some(stage))
  }

  fn route(&self, msg: Addrd<Message>, after: Option<Stage>) {
    let ids = CorrelationId::candidates(msg.addr(), msg.data());
    let found = self.listeners.map_ref(|ls| {
                                ids.iter()
                                   .filter(|id| after.map(|s| id.stage() > s).unwrap_or(true))
                                   .find_map(|id| ls.get(id).map(|l| (id.clone(), l.clone())))
                              });

    match found {
      | Some((id, listener)) => {
        log::trace!("{:?} <- {}", id, logging::msg_summary(msg.data()));
        listener.on_message(self, msg)
      },
      | None if msg.data().ty == Type::Con => {
        log::debug!("rejecting unclaimed {} from {}",
                    logging::msg_summary(msg.data()),
                    msg.addr());
        let rst = msg.as_ref().map(Message::rst);
        self.send(rst.as_ref()).unwrap_or_else(|e| log::error!("{}", e));
      },
      | None => log::debug!("dropping unclaimed {} from {}",
                            logging::msg_summary(msg.data()),
                            msg.addr()),
    }
  }

  /// Serialize and send a message
  pub fn send(&self, msg: Addrd<&Message>) -> Result<(), Error<P>> {
    let addr = msg.addr();
    let when = When::SendingMessage(Some(addr), msg.data().id, msg.data().token);
    let bytes = msg.unwrap()
                   .try_into_bytes()
                   .map_err(|e| when.what(What::ToBytes(e)))?;

    log::trace!("-> {} {}", addr, logging::msg_summary(msg.data()));
    nb::block!(self.sock.send(Addrd(bytes.as_slice(), addr))).map_err(|e| {
                                                                when.what(What::SockError(e))
                                                              })
  }

  /// Handle a datagram received from the network
  ///
  /// Malformed datagrams are dropped. If enough of the header
  /// survived to tell that it was a CON, the sender gets a Reset.
  pub fn recv(&self, dgram: Addrd<&[u8]>) -> Result<(), Error<P>> {
    let addr = dgram.addr();
    match Message::try_from_bytes(*dgram.data()) {
      | Ok(msg) => {
        self.dispatch(Addrd(msg, addr));
        Ok(())
      },
      | Err(e) => {
        log::warn!("dropping malformed datagram from {}: {}", addr, e);
        match *dgram.data() {
          | [b1, _, id0, id1, ..] if (b1 >> 4) & 0b11 == u8::from(Type::Con) => {
            let rst = Message::new(Type::Reset,
                                   Code::EMPTY,
                                   Id::from_be_bytes([*id0, *id1]),
                                   Token::default());
            self.send(Addrd(&rst, addr))
          },
          | _ => Ok(()),
        }
      },
    }
  }

  /// Receive & handle a single datagram, if there is one.
  pub fn poll(&self) -> nb::Result<(), Error<P>> {
    let dgram = self.recv_buf.map_mut(|buf| {
                                self.sock
                                    .recv(buf)
                                    .map(|Addrd(n, addr)| Addrd(buf[..n.min(buf.len())].to_vec(), addr))
                              });

    match dgram {
      | Ok(dgram) => self.recv(dgram.as_ref().map(|bytes| bytes.as_slice()))
                         .map_err(nb::Error::Other),
      | Err(nb::Error::WouldBlock) => Err(nb::Error::WouldBlock),
      | Err(nb::Error::Other(e)) => Err(nb::Error::Other(When::Polling.what(What::SockError(e)))),
    }
  }

  /// Invoke `f` after `after` has elapsed.
  ///
  /// Timers only fire from within [`Core::tick`].
  pub fn schedule<F>(&self, after: Millis, f: F) -> Result<TimerId, Error<P>>
    where F: FnOnce(&Core<P>) + Send + Sync + 'static
  {
    let deadline = self.now_millis()?.saturating_add(after.0);
    let mut f = Some(Box::new(f) as timer::TimerFn<P>);
    Ok(self.timers.map_mut(|ts| {
                    // `f` is only ever taken once
                    let f = f.take().unwrap_or_else(|| Box::new(|_: &Core<P>| ()));
                    ts.insert(deadline, f)
                  }))
  }

  /// Cancel a timer that has not fired yet.
  ///
  /// Returns whether the timer was still pending.
  pub fn cancel(&self, timer: TimerId) -> bool {
    self.timers.map_mut(|ts| ts.cancel(timer))
  }

  /// Fire all timers that are due
  pub fn tick(&self) -> Result<(), Error<P>> {
    let now = self.now_millis()?;
    loop {
      let due = self.timers.map_mut(|ts| ts.take_due(now));
      if due.is_empty() {
        break Ok(());
      }

      due.into_iter().for_each(|f| f(self));
    }
  }

  /// Milliseconds until the next timer is due (`None` if there are none)
  pub fn next_timer_in(&self) -> Result<Option<Millis>, Error<P>> {
    let now = self.now_millis()?;
    Ok(self.timers
           .map_ref(|ts| ts.next_deadline())
           .map(|at| Milliseconds(at.saturating_sub(now))))
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use newt_msg::MessageOptions;

  use super::*;
  use crate::test;

  fn recorder(log: &Arc<Mutex<Vec<&'static str>>>,
              name: &'static str)
              -> Arc<dyn Listener<test::Mock>> {
    let log = log.clone();
    Arc::new(move |_: &Core<test::Mock>, _: Addrd<Message>| log.lock().unwrap().push(name))
  }

  #[test]
  fn dispatch_prefers_most_specific() {
    let (core, _) = test::core();
    let seen = Arc::new(Mutex::new(vec![]));
    let addr = test::x.x.x.x(1);

    core.add_listener(CorrelationId::Any, recorder(&seen, "any"));
    core.add_listener(CorrelationId::Request, recorder(&seen, "request"));
    core.add_listener(CorrelationId::Transaction(addr, test::token(9)),
                      recorder(&seen, "transaction"));

    let mut req = Message::new(Type::Non, Code::new(0, 1), Id(1), test::token(9));
    req.set_path("a");
    core.dispatch(Addrd(req.clone(), addr));

    req.token = test::token(8);
    core.dispatch(Addrd(req.clone(), addr));

    let ack = Message::new(Type::Ack, Code::EMPTY, Id(1), Token::default());
    core.dispatch(Addrd(ack, addr));

    assert_eq!(*seen.lock().unwrap(), vec!["transaction", "request", "any"]);
  }

  #[test]
  fn dispatch_after_skips_earlier_stages() {
    let (core, _) = test::core();
    let seen = Arc::new(Mutex::new(vec![]));
    let addr = test::x.x.x.x(1);

    core.add_listener(CorrelationId::Request, recorder(&seen, "request"));
    core.add_listener(CorrelationId::Transmission(addr, Id(1)),
                      recorder(&seen, "transmission"));

    let req = Message::new(Type::Non, Code::new(0, 1), Id(1), test::token(1));
    core.dispatch_after(Addrd(req, addr), Stage::Transmission);

    assert_eq!(*seen.lock().unwrap(), vec!["request"]);
  }

  #[test]
  fn unclaimed_con_is_reset() {
    let (core, sock) = test::core();
    let addr = test::x.x.x.x(1);

    let con = Message::new(Type::Con, Code::new(2, 5), Id(77), test::token(1));
    core.dispatch(Addrd(con, addr));

    let non = Message::new(Type::Non, Code::new(2, 5), Id(78), test::token(1));
    core.dispatch(Addrd(non, addr));

    let sent = test::sent(&sock);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].addr(), addr);
    assert_eq!(sent[0].data().ty, Type::Reset);
    assert_eq!(sent[0].data().id, Id(77));
  }

  #[test]
  fn malformed_con_is_reset() {
    let (core, sock) = test::core();
    let addr = test::x.x.x.x(1);

    // CON with a token length of 9
    core.recv(Addrd(&[0b0100_1001u8, 0b0000_0001, 0x12, 0x34], addr))
        .unwrap();
    // NON, also invalid
    core.recv(Addrd(&[0b0101_1001u8, 0b0000_0001, 0x12, 0x35], addr))
        .unwrap();
    // too short to tell
    core.recv(Addrd(&[0b0100_0000u8], addr)).unwrap();

    let sent = test::sent(&sock);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].data().ty, Type::Reset);
    assert_eq!(sent[0].data().id, Id(0x1234));
  }

  #[test]
  fn removing_a_replaced_listener_keeps_the_replacement() {
    let (core, _) = test::core();
    let seen = Arc::new(Mutex::new(vec![]));
    let first = recorder(&seen, "first");
    let second = recorder(&seen, "second");

    core.add_listener(CorrelationId::Request, first.clone());
    core.add_listener(CorrelationId::Request, second.clone());

    assert!(!core.remove_own_listener(&CorrelationId::Request, &first));
    assert!(core.has_listener(&CorrelationId::Request));
    assert!(core.remove_own_listener(&CorrelationId::Request, &second));
    assert!(!core.has_listener(&CorrelationId::Request));
  }

  #[test]
  fn poll_dispatches_received_datagrams() {
    let (core, sock) = test::core();
    let seen = Arc::new(Mutex::new(vec![]));
    core.add_listener(CorrelationId::Any, recorder(&seen, "any"));

    assert!(matches!(core.poll(), Err(nb::Error::WouldBlock)));

    let msg = Message::new(Type::Non, Code::new(2, 5), Id(1), test::token(1));
    test::inject(&sock, Addrd(msg, test::x.x.x.x(1)));
    core.poll().unwrap();

    assert_eq!(*seen.lock().unwrap(), vec!["any"]);
  }

  #[test]
  fn timers_fire_in_deadline_order_and_can_be_canceled() {
    let (core, _) = test::core();
    let fired = Arc::new(Mutex::new(vec![]));

    let push = |n: u32| {
      let fired = fired.clone();
      move |_: &Core<test::Mock>| fired.lock().unwrap().push(n)
    };

    core.schedule(Milliseconds(200), push(2)).unwrap();
    core.schedule(Milliseconds(100), push(1)).unwrap();
    let canceled = core.schedule(Milliseconds(150), push(99)).unwrap();
    assert!(core.cancel(canceled));
    assert!(!core.cancel(canceled));

    test::advance_to(&core, 99);
    assert!(fired.lock().unwrap().is_empty());
    assert_eq!(core.next_timer_in().unwrap(), Some(Milliseconds(1u64)));

    test::advance_to(&core, 200);
    assert_eq!(*fired.lock().unwrap(), vec![1, 2]);
    assert_eq!(core.next_timer_in().unwrap(), None);
  }

  #[test]
  fn ids_and_tokens() {
    let (core, _) = test::core();
    let a = core.next_id();
    assert_eq!(core.next_id(), a.next());

    let t1 = core.next_token();
    let t2 = core.next_token();
    assert_eq!(t1.0.len(), 4);
    assert_ne!(t1, t2);
  }
}

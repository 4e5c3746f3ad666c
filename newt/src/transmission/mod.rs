use std::sync::Arc;

use newt_msg::{Message, Type};
use toad_stem::Stem;

use crate::core::{Callback, CorrelationId, Core, Error, Protocol, Stage, TimerId};
use crate::logging;
use crate::net::Addrd;
use crate::platform::PlatformTypes;
use crate::retry::{RetryTimer, YouShould};

/// How a [`ReliableTransmission`] ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
  /// The peer ACKed the message.
  ///
  /// The ACK may carry a piggybacked response.
  Acked(Addrd<Message>),
  /// The peer rejected the message with a Reset
  Rejected(Addrd<Message>),
  /// The message was retransmitted as many times as allowed
  /// and never acknowledged
  TimedOut,
}

struct State<P: PlatformTypes> {
  on_done: Option<Callback<P, Outcome>>,
  retry: RetryTimer<P::Clock>,
  timer: Option<TimerId>,
  done: bool,
}

struct Inner<P: PlatformTypes> {
  msg: Addrd<Message>,
  id: CorrelationId,
  state: Stem<State<P>>,
}

/// A CON message being sent until it is acknowledged
///
/// The message is retransmitted with exponential backoff
/// (see [`Con`](crate::config::Con)) until it is ACKed, rejected, or
/// the configured number of retransmissions is exhausted.
/// Exactly one [`Outcome`] is reported, unless the transmission
/// is [`terminate`](ReliableTransmission::terminate)d first.
pub struct ReliableTransmission<P: PlatformTypes> {
  inner: Arc<Inner<P>>,
}

impl<P: PlatformTypes> Clone for ReliableTransmission<P> {
  fn clone(&self) -> Self {
    Self { inner: self.inner.clone() }
  }
}

impl<P: PlatformTypes> core::fmt::Debug for ReliableTransmission<P> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("ReliableTransmission")
     .field("msg", &self.inner.msg)
     .field("done", &self.is_done())
     .finish()
  }
}

impl<P: PlatformTypes> ReliableTransmission<P> {
  /// Send a CON message, retransmitting it until acknowledged.
  ///
  /// `on_done` is invoked exactly once with the [`Outcome`].
  pub fn send<F>(core: &Core<P>, msg: Addrd<Message>, on_done: F) -> Result<Self, Error<P>>
    where F: FnOnce(&Core<P>, Outcome) + Send + Sync + 'static
  {
    if msg.data().ty != Type::Con {
      return Err(Protocol::NotConfirmable.into());
    }

    let id = CorrelationId::Transmission(msg.addr(), msg.data().id);
    let state = State { on_done: Some(Box::new(on_done)),
                        retry: core.con_retry_timer()?,
                        timer: None,
                        done: false };
    let rt = Self { inner: Arc::new(Inner { msg,
                                            id: id.clone(),
                                            state: Stem::new(state) }) };

    let listener = rt.clone();
    core.add_listener(id.clone(),
                      Arc::new(move |core: &Core<P>, msg: Addrd<Message>| {
                        listener.on_message(core, msg)
                      }));

    if let Err(e) = core.send(rt.inner.msg.as_ref()) {
      core.remove_listener(&id);
      return Err(e);
    }

    let delay = rt.inner.state.map_ref(|s| s.retry.delay());
    rt.arm(core, delay)?;
    Ok(rt)
  }

  /// The message being transmitted
  pub fn msg(&self) -> &Addrd<Message> {
    &self.inner.msg
  }

  /// Has an outcome been reached (or has this been terminated)?
  pub fn is_done(&self) -> bool {
    self.inner.state.map_ref(|s| s.done)
  }

  /// Stop retransmitting without reporting an outcome.
  ///
  /// Does nothing if the transmission already ended.
  pub fn terminate(&self, core: &Core<P>) {
    // dropped without being invoked
    let _ = self.end(core);
  }

  fn arm(&self, core: &Core<P>, after: crate::time::Millis) -> Result<(), Error<P>> {
    let rt = self.clone();
    let timer = core.schedule(after, move |core: &Core<P>| rt.on_timer(core))?;
    self.inner.state.map_mut(|s| s.timer = Some(timer));
    Ok(())
  }

  fn on_timer(&self, core: &Core<P>) {
    let now = match core.now() {
      | Ok(now) => now,
      | Err(e) => {
        log::error!("{}", e);
        return;
      },
    };

    let next = self.inner.state.map_mut(|s| {
                                 if s.done {
                                   None
                                 } else {
                                   Some((s.retry.what_should_i_do(now), s.retry.remaining(now)))
                                 }
                               });

    match next {
      | None => (),
      | Some((Ok(YouShould::Retry), wait)) => {
        log::debug!("retransmitting {}",
                    logging::msg_summary(self.inner.msg.data()));
        let resent = core.send(self.inner.msg.as_ref())
                         .and_then(|_| self.arm(core, wait));
        if let Err(e) = resent {
          log::error!("{}", e);
        }
      },
      | Some((Ok(YouShould::Cry), _)) => {
        log::warn!("giving up on {}",
                   logging::msg_summary(self.inner.msg.data()));
        self.finish(core, Outcome::TimedOut)
      },
      | Some((Err(nb::Error::WouldBlock), wait)) => {
        if let Err(e) = self.arm(core, wait) {
          log::error!("{}", e);
        }
      },
      | Some((Err(nb::Error::Other(never)), _)) => match never {},
    }
  }

  fn on_message(&self, core: &Core<P>, msg: Addrd<Message>) {
    match msg.data().ty {
      | Type::Ack => self.finish(core, Outcome::Acked(msg)),
      | Type::Reset => self.finish(core, Outcome::Rejected(msg)),
      | Type::Con | Type::Non => core.dispatch_after(msg, Stage::Transmission),
    }
  }

  fn end(&self, core: &Core<P>) -> Option<Callback<P, Outcome>> {
    let ended = self.inner.state.map_mut(|s| {
                                  if s.done {
                                    None
                                  } else {
                                    s.done = true;
                                    Some((s.on_done.take(), s.timer.take()))
                                  }
                                });

    let (on_done, timer) = ended?;
    if let Some(timer) = timer {
      core.cancel(timer);
    }
    core.remove_listener(&self.inner.id);
    on_done
  }

  fn finish(&self, core: &Core<P>, outcome: Outcome) {
    if let Some(on_done) = self.end(core) {
      on_done(core, outcome)
    }
  }
}

/// Acknowledgement of a received CON message, kept around
/// so that retransmissions of the CON can be answered again.
///
/// The ACK (which may carry a piggybacked response) is sent once when
/// reception starts, and again every time the same CON is received,
/// until the exchange lifetime passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReliableReception {
  id: CorrelationId,
  expiry: TimerId,
}

impl ReliableReception {
  /// ACK `con` with `ack` (or an empty ACK) and answer its duplicates.
  pub fn start<P: PlatformTypes>(core: &Core<P>,
                                 con: &Addrd<Message>,
                                 ack: Option<Message>)
                                 -> Result<Self, Error<P>> {
    let addr = con.addr();
    let ack = ack.unwrap_or_else(|| con.data().ack());
    core.send(Addrd(&ack, addr))?;

    let id = CorrelationId::Transmission(addr, con.data().id);
    core.add_listener(id.clone(),
                      Arc::new(move |core: &Core<P>, msg: Addrd<Message>| {
                        if msg.data().ty == Type::Con {
                          log::debug!("answering duplicate {}",
                                      logging::msg_summary(msg.data()));
                          core.send(Addrd(&ack, msg.addr()))
                              .unwrap_or_else(|e| log::error!("{}", e));
                        } else {
                          core.dispatch_after(msg, Stage::Transmission)
                        }
                      }));

    let expired = id.clone();
    let expiry = core.schedule(core.config().msg.exchange_lifetime,
                               move |core: &Core<P>| {
                                 core.remove_listener(&expired);
                               })?;

    Ok(Self { id, expiry })
  }

  /// Forget the exchange before its lifetime passes
  pub fn stop<P: PlatformTypes>(&self, core: &Core<P>) {
    if core.cancel(self.expiry) {
      core.remove_listener(&self.id);
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use embedded_time::duration::Milliseconds;
  use newt_msg::{Code, Id, Token};

  use super::*;
  use crate::config::{Con, Config, Msg};
  use crate::core::{What, ErrorKind};
  use crate::retry::{Attempts, Strategy};
  use crate::test;

  fn config() -> Config {
    Config { msg: Msg { con: Con { unacked_retry_strategy:
                                     Strategy::Exponential { init_min: Milliseconds(2000),
                                                             init_max: Milliseconds(2000) },
                                   max_attempts: Attempts(4) },
                        ..Default::default() },
             ..Default::default() }
  }

  fn con(id: u16) -> Addrd<Message> {
    Addrd(Message::new(Type::Con, Code::new(0, 1), Id(id), test::token(1)),
          test::x.x.x.x(1))
  }

  fn outcomes() -> (Arc<Mutex<Vec<Outcome>>>,
                    impl FnOnce(&Core<test::Mock>, Outcome) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(vec![]));
    let seen2 = seen.clone();
    (seen, move |_: &Core<test::Mock>, o: Outcome| seen2.lock().unwrap().push(o))
  }

  #[test]
  fn non_confirmable_is_rejected() {
    let (core, _) = test::core();
    let mut msg = con(1);
    msg.0.ty = Type::Non;

    let err = ReliableTransmission::send(&core, msg, |_, _| ()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert!(matches!(err.what, What::Protocol(Protocol::NotConfirmable)));
  }

  #[test]
  fn never_acked_is_sent_five_times_then_times_out() {
    let (core, sock) = test::core_config(test::x.x.x.x(5683), config());
    let (seen, on_done) = outcomes();

    ReliableTransmission::send(&core, con(1), on_done).unwrap();
    assert_eq!(test::sent(&sock).len(), 1);

    for t in [2_000u64, 6_000, 14_000, 30_000] {
      test::advance_to(&core, t - 1);
      assert!(test::sent(&sock).is_empty());
      test::advance_to(&core, t);
      assert_eq!(test::sent(&sock), vec![con(1)]);
    }

    test::advance_to(&core, 61_999);
    assert!(seen.lock().unwrap().is_empty());
    test::advance_to(&core, 62_000);
    assert!(test::sent(&sock).is_empty());
    assert_eq!(*seen.lock().unwrap(), vec![Outcome::TimedOut]);
    assert!(!core.has_listener(&CorrelationId::Transmission(test::x.x.x.x(1), Id(1))));
  }

  #[test]
  fn ack_after_second_retransmission_stops_retries() {
    let (core, sock) = test::core_config(test::x.x.x.x(5683), config());
    let (seen, on_done) = outcomes();

    ReliableTransmission::send(&core, con(1), on_done).unwrap();
    test::advance_to(&core, 2_000);
    test::advance_to(&core, 6_000);
    assert_eq!(test::sent(&sock).len(), 3);

    let ack = Addrd(con(1).0.ack(), test::x.x.x.x(1));
    core.dispatch(ack.clone());

    test::advance_to(&core, 100_000);
    assert!(test::sent(&sock).is_empty());
    assert_eq!(*seen.lock().unwrap(), vec![Outcome::Acked(ack)]);
  }

  #[test]
  fn reset_rejects() {
    let (core, _) = test::core_config(test::x.x.x.x(5683), config());
    let (seen, on_done) = outcomes();

    ReliableTransmission::send(&core, con(1), on_done).unwrap();
    let rst = Addrd(con(1).0.rst(), test::x.x.x.x(1));
    core.dispatch(rst.clone());
    core.dispatch(rst.clone());

    assert_eq!(*seen.lock().unwrap(), vec![Outcome::Rejected(rst)]);
  }

  #[test]
  fn terminate_is_idempotent_and_silent() {
    let (core, sock) = test::core_config(test::x.x.x.x(5683), config());
    let (seen, on_done) = outcomes();

    let rt = ReliableTransmission::send(&core, con(1), on_done).unwrap();
    rt.terminate(&core);
    rt.terminate(&core);
    assert!(rt.is_done());

    test::advance_to(&core, 100_000);
    assert_eq!(test::sent(&sock).len(), 1);
    assert!(seen.lock().unwrap().is_empty());
  }

  #[test]
  fn reception_answers_duplicates_until_exchange_lifetime() {
    let (core, sock) = test::core();
    let req = con(9);

    ReliableReception::start(&core, &req, None).unwrap();
    let ack = Addrd(Message::new(Type::Ack, Code::EMPTY, Id(9), Token::default()),
                    test::x.x.x.x(1));
    assert_eq!(test::sent(&sock), vec![ack.clone()]);

    core.dispatch(req.clone());
    assert_eq!(test::sent(&sock), vec![ack]);

    test::advance_to(&core, 100_000);
    core.dispatch(req);
    // nobody left to claim it
    assert_eq!(test::sent(&sock)[0].data().ty, Type::Reset);
  }

  #[test]
  fn reception_can_piggyback_and_stop() {
    let (core, sock) = test::core();
    let req = con(9);
    let mut resp = Message::new(Type::Ack, Code::new(2, 5), Id(9), test::token(1));
    resp.payload = newt_msg::Payload(b"hi".to_vec());

    let rr = ReliableReception::start(&core, &req, Some(resp.clone())).unwrap();
    assert_eq!(test::sent(&sock)[0].data(), &resp);

    rr.stop(&core);
    rr.stop(&core);
    assert!(!core.has_listener(&CorrelationId::Transmission(test::x.x.x.x(1), Id(9))));
  }
}

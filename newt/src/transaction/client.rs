use std::sync::Arc;

use newt_msg::{Message, Token, Type};
use toad_stem::Stem;

use crate::core::{Callback, CorrelationId, Core, Error, Stage, TimerId, What, When};
use crate::logging;
use crate::net::Addrd;
use crate::platform::PlatformTypes;
use crate::transmission::{Outcome, ReliableReception, ReliableTransmission};

/// What a [`TransactionClient`] reports when it ends
pub type Response<P> = Result<Addrd<Message>, Error<P>>;

struct State<P: PlatformTypes> {
  on_done: Option<Callback<P, Response<P>>>,
  rt: Option<ReliableTransmission<P>>,
  expiry: Option<TimerId>,
  done: bool,
}

struct Inner<P: PlatformTypes> {
  id: CorrelationId,
  token: Token,
  state: Stem<State<P>>,
}

/// A request waiting for its response
///
/// CON requests are sent with a [`ReliableTransmission`], NON requests
/// are sent once. The response may arrive piggybacked on the ACK or
/// separately, as long as it carries the request's token.
///
/// Exactly one result is delivered:
/// - `Ok(response)`
/// - `Err(`[`What::Reset`]`)` when the request was rejected
/// - `Err(`[`What::MessageNeverAcked`]`)` when a CON request was never acknowledged
/// - `Err(`[`What::Timeout`]`)` when no response arrived within the exchange lifetime
pub struct TransactionClient<P: PlatformTypes> {
  inner: Arc<Inner<P>>,
}

impl<P: PlatformTypes> Clone for TransactionClient<P> {
  fn clone(&self) -> Self {
    Self { inner: self.inner.clone() }
  }
}

impl<P: PlatformTypes> core::fmt::Debug for TransactionClient<P> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("TransactionClient")
     .field("id", &self.inner.id)
     .field("done", &self.inner.state.map_ref(|s| s.done))
     .finish()
  }
}

impl<P: PlatformTypes> TransactionClient<P> {
  /// Send a request and wait for the response
  pub fn send<F>(core: &Core<P>, req: Addrd<Message>, on_done: F) -> Result<Self, Error<P>>
    where F: FnOnce(&Core<P>, Response<P>) + Send + Sync + 'static
  {
    let id = CorrelationId::Transaction(req.addr(), req.data().token);
    let tc = Self { inner: Arc::new(Inner { id: id.clone(),
                                            token: req.data().token,
                                            state: Stem::new(State { on_done:
                                                                       Some(Box::new(on_done)),
                                                                     rt: None,
                                                                     expiry: None,
                                                                     done: false }) }) };

    let listener = tc.clone();
    core.add_listener(id.clone(),
                      Arc::new(move |core: &Core<P>, msg: Addrd<Message>| {
                        listener.on_message(core, msg)
                      }));

    let sent = match req.data().ty {
      | Type::Con => {
        let outcome = tc.clone();
        ReliableTransmission::send(core, req, move |core: &Core<P>, o: Outcome| {
          outcome.on_outcome(core, o)
        }).map(|rt| {
            tc.inner.state.map_mut(|s| {
                             // an outcome delivered while sending has already finished `rt`
                             if !rt.is_done() {
                               s.rt = Some(rt.clone());
                             }
                           })
          })
      },
      | _ => core.send(req.as_ref()),
    };

    if let Err(e) = sent {
      core.remove_listener(&id);
      return Err(e);
    }

    let expired = tc.clone();
    let expiry = core.schedule(core.config().msg.exchange_lifetime,
                               move |core: &Core<P>| {
                                 expired.finish(core, Err(When::None.what(What::Timeout)))
                               })?;
    tc.inner.state.map_mut(|s| s.expiry = Some(expiry));

    Ok(tc)
  }

  /// The token responses are matched by
  pub fn token(&self) -> Token {
    self.inner.token
  }

  /// Has this transaction ended?
  pub fn is_done(&self) -> bool {
    self.inner.state.map_ref(|s| s.done)
  }

  /// Stop waiting for a response, without delivering a result.
  ///
  /// Does nothing if the transaction already ended.
  pub fn terminate(&self, core: &Core<P>) {
    // dropped without being invoked
    let _ = self.end(core);
  }

  fn on_outcome(&self, core: &Core<P>, outcome: Outcome) {
    match outcome {
      | Outcome::Acked(ack) if ack.data().is_empty() => {
        log::debug!("request {} acked, waiting for separate response",
                    self.inner.token)
      },
      | Outcome::Acked(resp) => self.on_response(core, resp),
      | Outcome::Rejected(_) => self.finish(core, Err(When::None.what(What::Reset))),
      | Outcome::TimedOut => self.finish(core, Err(When::None.what(What::MessageNeverAcked))),
    }
  }

  fn on_message(&self, core: &Core<P>, msg: Addrd<Message>) {
    if msg.data().is_response() {
      self.on_response(core, msg)
    } else {
      core.dispatch_after(msg, Stage::Transaction)
    }
  }

  fn on_response(&self, core: &Core<P>, resp: Addrd<Message>) {
    log::trace!("response {}", logging::msg_summary(resp.data()));

    if resp.data().ty == Type::Con {
      ReliableReception::start(core, &resp, None).map(|_| ())
                                                  .unwrap_or_else(|e| log::error!("{}", e));
    }

    self.finish(core, Ok(resp))
  }

  fn end(&self, core: &Core<P>) -> Option<Callback<P, Response<P>>> {
    let ended = self.inner.state.map_mut(|s| {
                                  if s.done {
                                    None
                                  } else {
                                    s.done = true;
                                    Some((s.on_done.take(), s.rt.take(), s.expiry.take()))
                                  }
                                });

    let (on_done, rt, expiry) = ended?;
    if let Some(rt) = rt {
      rt.terminate(core);
    }
    if let Some(expiry) = expiry {
      core.cancel(expiry);
    }
    core.remove_listener(&self.inner.id);
    on_done
  }

  fn finish(&self, core: &Core<P>, result: Response<P>) {
    if let Some(on_done) = self.end(core) {
      on_done(core, result)
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use embedded_time::duration::Milliseconds;
  use newt_msg::{Code, Id};

  use super::*;
  use crate::config::{Con, Config, Msg};
  use crate::retry::{Attempts, Strategy};
  use crate::test;

  type Results = Arc<Mutex<Vec<Result<Addrd<Message>, String>>>>;

  fn results() -> (Results, impl FnOnce(&Core<test::Mock>, Response<test::Mock>) + Send + Sync) {
    let seen: Results = Default::default();
    let seen2 = seen.clone();
    (seen, move |_: &Core<test::Mock>, r: Response<test::Mock>| {
      seen2.lock().unwrap().push(r.map_err(|e| e.to_string()))
    })
  }

  fn req(ty: Type) -> Addrd<Message> {
    Addrd(Message::new(ty, Code::new(0, 1), Id(1), test::token(7)),
          test::x.x.x.x(1))
  }

  fn resp(ty: Type, id: u16) -> Addrd<Message> {
    Addrd(Message::new(ty, Code::new(2, 5), Id(id), test::token(7)),
          test::x.x.x.x(1))
  }

  #[test]
  fn piggybacked_response() {
    let (core, sock) = test::core();
    let (seen, on_done) = results();

    TransactionClient::send(&core, req(Type::Con), on_done).unwrap();
    core.dispatch(resp(Type::Ack, 1));
    test::advance_to(&core, 200_000);

    assert_eq!(test::sent(&sock).len(), 1);
    assert_eq!(*seen.lock().unwrap(), vec![Ok(resp(Type::Ack, 1))]);
  }

  #[test]
  fn separate_con_response_is_acked() {
    let (core, sock) = test::core();
    let (seen, on_done) = results();

    TransactionClient::send(&core, req(Type::Con), on_done).unwrap();
    core.dispatch(req(Type::Con).map(|m| m.ack()));
    assert!(seen.lock().unwrap().is_empty());

    core.dispatch(resp(Type::Con, 500));
    // retransmitted response is deduplicated
    core.dispatch(resp(Type::Con, 500));

    let sent = test::sent(&sock);
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[1].data().ty, Type::Ack);
    assert_eq!(sent[1].data().id, Id(500));
    assert_eq!(sent[2], sent[1]);
    assert_eq!(*seen.lock().unwrap(), vec![Ok(resp(Type::Con, 500))]);
  }

  #[test]
  fn non_request_non_response() {
    let (core, sock) = test::core();
    let (seen, on_done) = results();

    TransactionClient::send(&core, req(Type::Non), on_done).unwrap();
    core.dispatch(resp(Type::Non, 3));

    assert_eq!(test::sent(&sock), vec![req(Type::Non)]);
    assert_eq!(*seen.lock().unwrap(), vec![Ok(resp(Type::Non, 3))]);
  }

  #[test]
  fn reset_fails() {
    let (core, _) = test::core();
    let (seen, on_done) = results();

    TransactionClient::send(&core, req(Type::Con), on_done).unwrap();
    core.dispatch(req(Type::Con).map(|m| m.rst()));

    assert_eq!(*seen.lock().unwrap(),
               vec![Err("message was reset by the peer".to_string())]);
  }

  #[test]
  fn never_acked_fails_once() {
    let config = Config { msg: Msg { con: Con { unacked_retry_strategy:
                                                  Strategy::Delay { min: Milliseconds(10),
                                                                    max: Milliseconds(10) },
                                                max_attempts: Attempts(1) },
                                     ..Default::default() },
                          ..Default::default() };
    let (core, _) = test::core_config(test::x.x.x.x(5683), config);
    let (seen, on_done) = results();

    TransactionClient::send(&core, req(Type::Con), on_done).unwrap();
    test::advance_to(&core, 10);
    test::advance_to(&core, 20);
    test::advance_to(&core, 200_000);

    assert_eq!(*seen.lock().unwrap(),
               vec![Err("CON message was never acknowledged".to_string())]);
  }

  #[test]
  fn terminate_delivers_nothing() {
    let (core, _) = test::core();
    let (seen, on_done) = results();

    let tc = TransactionClient::send(&core, req(Type::Con), on_done).unwrap();
    tc.terminate(&core);
    tc.terminate(&core);

    assert!(tc.is_done());
    assert!(!core.has_listener(&CorrelationId::Transaction(test::x.x.x.x(1), test::token(7))));
    assert!(seen.lock().unwrap().is_empty());
  }
}

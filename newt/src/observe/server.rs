use std::sync::Arc;

use newt_msg::observe::{next_seq, Action};
use newt_msg::{no_repeat, Id, Message, MessageOptions, Token, Type};
use toad_stem::Stem;

use crate::core::{Callback, CorrelationId, Core, Error, Listener, Protocol, Stage};
use crate::net::Addrd;
use crate::platform::PlatformTypes;
use crate::req::Method;
use crate::resp::code;
use crate::transaction::TransactionServer;
use crate::transmission::{Outcome, ReliableTransmission};

struct State<P: PlatformTypes> {
  registration: Option<TransactionServer>,
  in_flight: Option<ReliableTransmission<P>>,
  on_terminated: Option<Callback<P, ()>>,
  listener: Option<Arc<dyn Listener<P>>>,
  last: Option<Message>,
  seq: u32,
  done: bool,
}

struct Inner<P: PlatformTypes> {
  req: Addrd<Message>,
  transfer: CorrelationId,
  state: Stem<State<P>>,
}

/// A client observing one of our resources
///
/// The first notification answers the registration request. Following
/// notifications carry the registration's token with a new message id,
/// and are sent reliably if they are CON. A CON notification still being
/// retransmitted is abandoned when a newer one is sent.
///
/// Successful notifications carry an Observe sequence number counting
/// up from 1 and wrapping at 24 bits.
///
/// The subject ends (invoking `on_terminated`) when:
/// - a notification with an error code is sent
/// - a CON notification is rejected or never acknowledged
/// - the client deregisters (GET `Observe: 1` for the same resource)
pub struct Subject<P: PlatformTypes> {
  inner: Arc<Inner<P>>,
}

impl<P: PlatformTypes> Clone for Subject<P> {
  fn clone(&self) -> Self {
    Self { inner: self.inner.clone() }
  }
}

impl<P: PlatformTypes> core::fmt::Debug for Subject<P> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("Subject")
     .field("req", &self.inner.req)
     .field("seq", &self.seq())
     .field("done", &self.is_terminated())
     .finish()
  }
}

impl<P: PlatformTypes> Subject<P> {
  /// Start sending notifications to the client who sent `registration`
  pub fn new<F>(core: &Core<P>, registration: TransactionServer, on_terminated: F) -> Self
    where F: FnOnce(&Core<P>, ()) + Send + Sync + 'static
  {
    let req = registration.req().clone();
    let transfer = CorrelationId::Transfer(req.addr(), Method::GET, req.data().path_string());
    let state = State { registration: Some(registration),
                        in_flight: None,
                        on_terminated: Some(Box::new(on_terminated)),
                        listener: None,
                        last: None,
                        seq: 0,
                        done: false };

    let subject = Self { inner: Arc::new(Inner { req,
                                                 transfer: transfer.clone(),
                                                 state: Stem::new(state) }) };

    let this = subject.clone();
    let listener: Arc<dyn Listener<P>> =
      Arc::new(move |core: &Core<P>, msg: Addrd<Message>| this.on_request(core, msg));
    subject.inner
           .state
           .map_mut(|s| s.listener = Some(listener.clone()));
    core.add_listener(transfer, listener);

    subject
  }

  /// The registration request
  pub fn req(&self) -> &Addrd<Message> {
    &self.inner.req
  }

  /// Sequence number of the latest notification
  pub fn seq(&self) -> u32 {
    self.inner.state.map_ref(|s| s.seq)
  }

  /// Has the client stopped observing?
  pub fn is_terminated(&self) -> bool {
    self.inner.state.map_ref(|s| s.done)
  }

  /// Send a notification
  ///
  /// Sending a notification with an error code ends the subject, and
  /// notifying an ended subject yields [`Protocol::Terminated`].
  pub fn notify(&self, core: &Core<P>, mut resp: Message) -> Result<(), Error<P>> {
    let success = resp.code.is_success();
    let next = self.inner.state.map_mut(|s| {
                                 if s.done {
                                   return None;
                                 }

                                 let mut last = resp.clone();
                                 last.remove(no_repeat::OBSERVE);
                                 s.last = Some(last);

                                 if success {
                                   s.seq = next_seq(s.seq);
                                 }
                                 Some((s.seq, s.registration.take(), s.in_flight.take()))
                               });

    let (seq, registration, in_flight) = next.ok_or_else(|| Error::from(Protocol::Terminated))?;

    if success {
      resp.set_observe(seq);
    } else {
      resp.remove(no_repeat::OBSERVE);
    }

    if let Some(rt) = in_flight {
      rt.terminate(core);
    }

    let sent = match registration {
      | Some(ts) => ts.respond(core, resp),
      | None => self.send(core, resp),
    };

    if !success {
      self.terminate(core);
    }

    sent
  }

  fn send(&self, core: &Core<P>, mut resp: Message) -> Result<(), Error<P>> {
    resp.id = core.next_id();
    resp.token = self.inner.req.data().token;
    let to = self.inner.req.addr();

    match resp.ty {
      | Type::Con => {
        let this = self.clone();
        let rt = ReliableTransmission::send(core, Addrd(resp, to), move |core: &Core<P>, o| {
                   match o {
                     | Outcome::Acked(_) => (),
                     | Outcome::Rejected(_) | Outcome::TimedOut => {
                       log::debug!("observer {} went away", to);
                       this.terminate(core)
                     },
                   }
                 })?;
        self.inner.state.map_mut(|s| {
                          if !rt.is_done() {
                            s.in_flight = Some(rt.clone());
                          }
                        });
        Ok(())
      },
      | _ => {
        resp.ty = Type::Non;
        core.send(Addrd(&resp, to))
      },
    }
  }

  fn on_request(&self, core: &Core<P>, req: Addrd<Message>) {
    let deregister = Method(req.data().code) == Method::GET
                     && req.data().observe_action() == Some(Action::Deregister);
    if !deregister {
      return core.dispatch_after(req, Stage::Transfer);
    }

    let last = self.inner.state.map_ref(|s| s.last.clone());
    let mut resp = last.unwrap_or_else(|| {
                         Message::new(Type::Ack, code::CONTENT, Id(0), Token::default())
                       });
    resp.ty = Type::Ack;
    if resp.code.is_success() {
      resp.code = code::CONTENT;
    }

    self.terminate(core);
    let sent = TransactionServer::new(core, req).and_then(|ts| ts.respond(core, resp));
    if let Err(e) = sent {
      log::error!("{}", e);
    }
  }

  /// Stop sending notifications
  ///
  /// Does nothing if the subject already ended.
  pub fn terminate(&self, core: &Core<P>) {
    let ended = self.inner.state.map_mut(|s| {
                                  if s.done {
                                    None
                                  } else {
                                    s.done = true;
                                    Some((s.on_terminated.take(),
                                          s.in_flight.take(),
                                          s.listener.take()))
                                  }
                                });

    if let Some((on_terminated, in_flight, listener)) = ended {
      if let Some(rt) = in_flight {
        rt.terminate(core);
      }
      if let Some(listener) = listener {
        core.remove_own_listener(&self.inner.transfer, &listener);
      }
      if let Some(f) = on_terminated {
        f(core, ());
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use newt_msg::observe::SEQ_MASK;
  use newt_msg::{Code, Payload};

  use super::*;
  use crate::test;

  fn register() -> Addrd<Message> {
    let mut msg = Message::new(Type::Con, Code::new(0, 1), Id(1), test::token(4));
    msg.set_path("temp");
    msg.set_observe_action(Action::Register);
    Addrd(msg, test::x.x.x.x(1))
  }

  fn subject(core: &Core<test::Mock>) -> (Subject<test::Mock>, Arc<Mutex<u32>>) {
    let ended = Arc::new(Mutex::new(0));
    let ended2 = ended.clone();
    let ts = TransactionServer::new(core, register()).unwrap();
    (Subject::new(core, ts, move |_: &Core<test::Mock>, ()| *ended2.lock().unwrap() += 1), ended)
  }

  fn content(ty: Type, payload: &str) -> Message {
    let mut msg = Message::new(ty, code::CONTENT, Id(0), Token::default());
    msg.payload = Payload(payload.bytes().collect());
    msg
  }

  #[test]
  fn sequence_counts_up_and_wraps() {
    let (core, sock) = test::core();
    let (subject, _) = subject(&core);

    subject.notify(&core, content(Type::Ack, "1")).unwrap();
    subject.notify(&core, content(Type::Non, "2")).unwrap();
    subject.inner.state.map_mut(|s| s.seq = SEQ_MASK);
    subject.notify(&core, content(Type::Non, "3")).unwrap();

    let sent = test::sent(&sock);
    let seqs = sent.iter().map(|m| m.data().observe()).collect::<Vec<_>>();
    assert_eq!(seqs, vec![Some(1), Some(2), Some(0)]);

    // the first answers the registration, the rest are new messages
    assert_eq!((sent[0].data().ty, sent[0].data().id), (Type::Ack, Id(1)));
    assert_eq!(sent[1].data().ty, Type::Non);
    assert_ne!(sent[1].data().id, sent[2].data().id);
    assert!(sent.iter().all(|m| m.data().token == test::token(4)));
  }

  #[test]
  fn error_terminates() {
    let (core, sock) = test::core();
    let (subject, ended) = subject(&core);

    subject.notify(&core, content(Type::Ack, "1")).unwrap();
    let mut gone = content(Type::Non, "");
    gone.code = code::NOT_FOUND;
    subject.notify(&core, gone).unwrap();

    let err = subject.notify(&core, content(Type::Non, "3")).unwrap_err();
    assert!(matches!(err.what, crate::core::What::Protocol(Protocol::Terminated)));

    let sent = test::sent(&sock);
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].data().observe(), None);
    assert_eq!(*ended.lock().unwrap(), 1);
  }

  #[test]
  fn deregistration_gets_last_state() {
    let (core, sock) = test::core();
    let (subject, ended) = subject(&core);
    subject.notify(&core, content(Type::Ack, "21C")).unwrap();
    test::sent(&sock);

    let mut dereg = register();
    dereg.data_mut().id = Id(2);
    dereg.data_mut().set_observe_action(Action::Deregister);
    core.dispatch(dereg);

    let sent = test::sent(&sock);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].data().id, Id(2));
    assert_eq!(sent[0].data().code, code::CONTENT);
    assert_eq!(sent[0].data().observe(), None);
    assert_eq!(sent[0].data().payload.as_str(), Some("21C"));
    assert!(subject.is_terminated());
    assert_eq!(*ended.lock().unwrap(), 1);
  }

  #[test]
  fn other_requests_pass_through() {
    let (core, sock) = test::core();
    let (_subject, ended) = subject(&core);

    let mut get = register();
    get.data_mut().id = Id(3);
    get.data_mut().remove(no_repeat::OBSERVE);
    core.dispatch(get);

    // unclaimed, so reset
    let sent = test::sent(&sock);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].data().ty, Type::Reset);
    assert_eq!(*ended.lock().unwrap(), 0);
  }

  #[test]
  fn rejected_notification_terminates() {
    let (core, sock) = test::core();
    let (subject, ended) = subject(&core);

    subject.notify(&core, content(Type::Ack, "1")).unwrap();
    subject.notify(&core, content(Type::Con, "2")).unwrap();

    let sent = test::sent(&sock);
    core.dispatch(sent[1].as_ref().map(Message::rst));

    assert!(subject.is_terminated());
    assert_eq!(*ended.lock().unwrap(), 1);
  }
}

use std::sync::Arc;

use newt_msg::observe::Action;
use newt_msg::{Message, MessageOptions, Token, Type};
use toad_stem::Stem;

use crate::core::{Callback, CorrelationId, Core, Error, Protocol, Stage};
use crate::logging;
use crate::net::Addrd;
use crate::platform::PlatformTypes;
use crate::req::Method;
use crate::transaction::{Response, TransactionClient};
use crate::transmission::ReliableReception;

/// Invoked for every notification of an [`Observation`]
pub type OnNotification<P> = Arc<dyn Fn(&Core<P>, Addrd<Message>) + Send + Sync>;

struct State<P: PlatformTypes> {
  on_notification: Option<OnNotification<P>>,
  on_terminated: Option<Callback<P, Option<Error<P>>>>,
  registration: Option<TransactionClient<P>>,
  listening: bool,
  done: bool,
}

struct Inner<P: PlatformTypes> {
  req: Addrd<Message>,
  state: Stem<State<P>>,
}

/// An observed remote resource
///
/// Every notification received is passed to `on_notification`,
/// including the response to the registration, in the order they arrive.
/// Reordering is left to the caller; see [`newt_msg::observe::is_fresh`].
///
/// The observation ends (invoking `on_terminated`) when:
/// - the server sends a notification with an error code or without an Observe option
///   (this notification is still delivered first)
/// - the registration fails (`on_terminated` gets the error)
/// - it is [`cancel`](Observation::cancel)led
pub struct Observation<P: PlatformTypes> {
  inner: Arc<Inner<P>>,
}

impl<P: PlatformTypes> Clone for Observation<P> {
  fn clone(&self) -> Self {
    Self { inner: self.inner.clone() }
  }
}

impl<P: PlatformTypes> core::fmt::Debug for Observation<P> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("Observation")
     .field("req", &self.inner.req)
     .field("done", &self.is_done())
     .finish()
  }
}

impl<P: PlatformTypes> Observation<P> {
  /// Register as an observer of the resource `req` is for.
  ///
  /// `req` must be a GET. It is sent with `Observe: 0`, a new id and
  /// (if it doesn't have one) a new token.
  pub fn register<N, T>(core: &Core<P>,
                        req: Addrd<Message>,
                        on_notification: N,
                        on_terminated: T)
                        -> Result<Self, Error<P>>
    where N: Fn(&Core<P>, Addrd<Message>) + Send + Sync + 'static,
          T: FnOnce(&Core<P>, Option<Error<P>>) + Send + Sync + 'static
  {
    if Method(req.data().code) != Method::GET {
      return Err(Protocol::NotGet.into());
    }

    let mut req = req;
    req.data_mut().set_observe_action(Action::Register);
    req.data_mut().id = core.next_id();
    if req.data().token.0.is_empty() {
      req.data_mut().token = core.next_token();
    }

    let state = State { on_notification: Some(Arc::new(on_notification)),
                        on_terminated: Some(Box::new(on_terminated)),
                        registration: None,
                        listening: false,
                        done: false };
    let obs = Self { inner: Arc::new(Inner { req: req.clone(),
                                             state: Stem::new(state) }) };

    let this = obs.clone();
    let tc = TransactionClient::send(core, req, move |core: &Core<P>, r: Response<P>| {
               this.on_registered(core, r)
             })?;
    obs.inner.state.map_mut(|s| {
                     if !s.done && !tc.is_done() {
                       s.registration = Some(tc.clone());
                     }
                   });

    Ok(obs)
  }

  /// The token notifications are matched by
  pub fn token(&self) -> Token {
    self.inner.req.data().token
  }

  /// The registration request
  pub fn req(&self) -> &Addrd<Message> {
    &self.inner.req
  }

  /// Has the observation ended?
  pub fn is_done(&self) -> bool {
    self.inner.state.map_ref(|s| s.done)
  }

  /// Stop observing, telling the server with a GET `Observe: 1`
  /// that reuses the registration token.
  ///
  /// The observation ends immediately whether or not the server
  /// responds, and cancelling twice does nothing.
  pub fn cancel(&self, core: &Core<P>) -> Result<(), Error<P>> {
    if !self.terminate(core, None) {
      return Ok(());
    }

    let mut req = self.inner.req.clone();
    req.data_mut().id = core.next_id();
    req.data_mut().set_observe_action(Action::Deregister);

    let token = req.data().token;
    TransactionClient::send(core, req, move |_: &Core<P>, r: Response<P>| {
      if let Err(e) = r {
        log::debug!("deregistering {} failed: {}", token, e)
      }
    })
    .map(|_| ())
  }

  fn id(&self) -> CorrelationId {
    CorrelationId::Transaction(self.inner.req.addr(), self.token())
  }

  fn on_registered(&self, core: &Core<P>, r: Response<P>) {
    let resp = match r {
      | Ok(resp) => resp,
      | Err(e) => {
        self.terminate(core, Some(e));
        return;
      },
    };

    let stays = resp.data().code.is_success() && resp.data().observe().is_some();
    if stays {
      let listening = self.inner.state.map_mut(|s| {
                                         s.registration = None;
                                         s.listening = !s.done;
                                         s.listening
                                       });

      if listening {
        let listener = self.clone();
        core.add_listener(self.id(),
                          Arc::new(move |core: &Core<P>, msg: Addrd<Message>| {
                            listener.on_message(core, msg)
                          }));
      }
    }

    self.notify(core, resp, stays);
  }

  fn on_message(&self, core: &Core<P>, msg: Addrd<Message>) {
    if !msg.data().is_response() {
      return core.dispatch_after(msg, Stage::Transaction);
    }

    if msg.data().ty == Type::Con {
      ReliableReception::start(core, &msg, None).map(|_| ())
                                                 .unwrap_or_else(|e| log::error!("{}", e));
    }

    let stays = msg.data().code.is_success() && msg.data().observe().is_some();
    self.notify(core, msg, stays);
  }

  fn notify(&self, core: &Core<P>, msg: Addrd<Message>, stays: bool) {
    let on_notification = self.inner
                              .state
                              .map_ref(|s| if s.done { None } else { s.on_notification.clone() });

    match on_notification {
      | Some(f) => f(core, msg),
      | None => log::debug!("observation over, dropping {}",
                            logging::msg_summary(msg.data())),
    }

    if !stays {
      self.terminate(core, None);
    }
  }

  /// Returns whether this was still active
  fn terminate(&self, core: &Core<P>, error: Option<Error<P>>) -> bool {
    let ended = self.inner.state.map_mut(|s| {
                                  if s.done {
                                    None
                                  } else {
                                    s.done = true;
                                    s.on_notification = None;
                                    Some((s.on_terminated.take(),
                                          s.registration.take(),
                                          s.listening))
                                  }
                                });

    let (on_terminated, registration, listening) = match ended {
      | Some(ended) => ended,
      | None => return false,
    };

    if let Some(tc) = registration {
      tc.terminate(core);
    }
    if listening {
      core.remove_listener(&self.id());
    }
    if let Some(f) = on_terminated {
      f(core, error);
    }

    true
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use newt_msg::{Code, Id};

  use super::*;
  use crate::test;

  type Seen = Arc<Mutex<Vec<Option<u32>>>>;
  type Ended = Arc<Mutex<Vec<Option<String>>>>;

  fn observe(core: &Core<test::Mock>) -> (Observation<test::Mock>, Seen, Ended) {
    let seen: Seen = Default::default();
    let ended: Ended = Default::default();
    let (seen2, ended2) = (seen.clone(), ended.clone());

    let mut req = Message::new(Type::Con, Code::new(0, 1), Id(0), Token::default());
    req.set_path("temp");

    let obs = Observation::register(core,
                                    Addrd(req, test::x.x.x.x(1)),
                                    move |_: &Core<test::Mock>, msg: Addrd<Message>| {
                                      seen2.lock().unwrap().push(msg.data().observe())
                                    },
                                    move |_: &Core<test::Mock>, e: Option<Error<test::Mock>>| {
                                      ended2.lock().unwrap().push(e.map(|e| e.to_string()))
                                    }).unwrap();

    (obs, seen, ended)
  }

  fn notification(obs: &Observation<test::Mock>, ty: Type, id: u16, code: Code, seq: Option<u32>) -> Addrd<Message> {
    let mut msg = Message::new(ty, code, Id(id), obs.token());
    if let Some(seq) = seq {
      msg.set_observe(seq);
    }
    Addrd(msg, test::x.x.x.x(1))
  }

  #[test]
  fn register_and_receive_notifications() {
    let (core, sock) = test::core();
    let (obs, seen, ended) = observe(&core);

    let sent = test::sent(&sock);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].data().observe_action(), Some(Action::Register));

    let mut ack = notification(&obs, Type::Ack, 0, Code::new(2, 5), Some(5));
    ack.data_mut().id = sent[0].data().id;
    core.dispatch(ack);

    core.dispatch(notification(&obs, Type::Con, 900, Code::new(2, 5), Some(6)));
    core.dispatch(notification(&obs, Type::Non, 901, Code::new(2, 5), Some(7)));

    let acks = test::sent(&sock);
    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0].data().ty, Type::Ack);
    assert_eq!(acks[0].data().id, Id(900));

    assert_eq!(*seen.lock().unwrap(), vec![Some(5), Some(6), Some(7)]);
    assert!(ended.lock().unwrap().is_empty());
    assert!(!obs.is_done());
  }

  #[test]
  fn older_notifications_are_still_delivered() {
    let (core, sock) = test::core();
    let (obs, seen, _) = observe(&core);

    let sent = test::sent(&sock);
    let mut ack = notification(&obs, Type::Ack, 0, Code::new(2, 5), Some(5));
    ack.data_mut().id = sent[0].data().id;
    core.dispatch(ack);
    core.dispatch(notification(&obs, Type::Non, 901, Code::new(2, 5), Some(4)));

    assert_eq!(*seen.lock().unwrap(), vec![Some(5), Some(4)]);
    assert!(!newt_msg::observe::is_fresh((5, 0), (4, 0)));
  }

  #[test]
  fn error_notification_terminates() {
    let (core, sock) = test::core();
    let (obs, seen, ended) = observe(&core);

    let sent = test::sent(&sock);
    let mut ack = notification(&obs, Type::Ack, 0, Code::new(2, 5), Some(1));
    ack.data_mut().id = sent[0].data().id;
    core.dispatch(ack);
    core.dispatch(notification(&obs, Type::Non, 2, Code::new(4, 4), None));
    core.dispatch(notification(&obs, Type::Non, 3, Code::new(2, 5), Some(3)));

    assert_eq!(*seen.lock().unwrap(), vec![Some(1), None]);
    assert_eq!(*ended.lock().unwrap(), vec![None]);
    assert!(obs.is_done());
  }

  #[test]
  fn cancel_deregisters_once() {
    let (core, sock) = test::core();
    let (obs, _, ended) = observe(&core);
    let register = test::sent(&sock).remove(0);

    obs.cancel(&core).unwrap();
    obs.cancel(&core).unwrap();

    let sent = test::sent(&sock);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].data().observe_action(), Some(Action::Deregister));
    assert_eq!(sent[0].data().token, register.data().token);
    assert_eq!(sent[0].data().path(), vec!["temp"]);
    assert_eq!(*ended.lock().unwrap(), vec![None]);
  }

  #[test]
  fn must_be_get() {
    let (core, _) = test::core();
    let req = Message::new(Type::Con, Code::new(0, 2), Id(0), Token::default());
    let err = Observation::register(&core,
                                    Addrd(req, test::x.x.x.x(1)),
                                    |_: &Core<test::Mock>, _: Addrd<Message>| (),
                                    |_: &Core<test::Mock>, _: Option<Error<test::Mock>>| ())
              .unwrap_err();

    assert!(matches!(err.what, crate::core::What::Protocol(Protocol::NotGet)));
  }

  #[test]
  fn reset_registration_terminates_with_error() {
    let (core, sock) = test::core();
    let (_, seen, ended) = observe(&core);

    let sent = test::sent(&sock);
    core.dispatch(sent[0].as_ref().map(Message::rst));

    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(*ended.lock().unwrap(),
               vec![Some("message was reset by the peer".to_string())]);
  }
}

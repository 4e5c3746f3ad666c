use std::sync::Arc;

use newt_msg::{Message, Type};
use toad_stem::Stem;

use crate::core::{CorrelationId, Core, Error, Protocol, Stage, TimerId, What, When};
use crate::logging;
use crate::net::Addrd;
use crate::platform::PlatformTypes;
use crate::transmission::{Outcome, ReliableReception, ReliableTransmission};

#[derive(Debug, Default)]
struct State {
  window: Option<TimerId>,
  acked: bool,
  responded: bool,
}

struct Inner {
  req: Addrd<Message>,
  state: Stem<State>,
}

/// A received request waiting to be responded to
///
/// A CON request may be answered within the
/// [`piggyback_window`](crate::config::Msg::piggyback_window)
/// by a response piggybacked on the ACK. Once the window passes an empty
/// ACK is sent, and the response will be sent separately
/// (CON responses with a [`ReliableTransmission`].)
///
/// Retransmissions of the request are swallowed while the window is open,
/// and answered with the ACK after.
#[derive(Clone)]
pub struct TransactionServer {
  inner: Arc<Inner>,
}

impl core::fmt::Debug for TransactionServer {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("TransactionServer")
     .field("req", &self.inner.req)
     .field("state", &self.inner.state)
     .finish()
  }
}

impl TransactionServer {
  /// Start handling a request
  pub fn new<P: PlatformTypes>(core: &Core<P>, req: Addrd<Message>) -> Result<Self, Error<P>> {
    let ts = Self { inner: Arc::new(Inner { req,
                                            state: Stem::new(State::default()) }) };

    if ts.inner.req.data().ty != Type::Con {
      return Ok(ts);
    }

    let window = core.config().msg.piggyback_window;
    if window.0 == 0 {
      ReliableReception::start(core, &ts.inner.req, None)?;
      ts.inner.state.map_mut(|s| s.acked = true);
      return Ok(ts);
    }

    core.add_listener(ts.dedupe_id(),
                      Arc::new(|core: &Core<P>, msg: Addrd<Message>| {
                        if msg.data().ty == Type::Con {
                          log::debug!("ignoring duplicate {}", logging::msg_summary(msg.data()));
                        } else {
                          core.dispatch_after(msg, Stage::Transmission)
                        }
                      }));

    let expired = ts.clone();
    let timer = core.schedule(window, move |core: &Core<P>| expired.window_passed(core))?;
    ts.inner.state.map_mut(|s| s.window = Some(timer));

    Ok(ts)
  }

  /// The request being responded to
  pub fn req(&self) -> &Addrd<Message> {
    &self.inner.req
  }

  /// Has the request been responded to?
  pub fn responded(&self) -> bool {
    self.inner.state.map_ref(|s| s.responded)
  }

  /// Respond to the request.
  ///
  /// The response's token is replaced with the request's.
  /// Inside the piggyback window the response becomes the ACK
  /// (type ACK, the request's id). After it, the response gets a new id
  /// and is sent CON (reliably) or NON (ACK is sent as NON.)
  ///
  /// Responding twice yields [`Protocol::AlreadyResponded`].
  pub fn respond<P: PlatformTypes>(&self, core: &Core<P>, resp: Message) -> Result<(), Error<P>> {
    self.respond_with(core, resp, |_: &Core<P>, _: Result<(), Error<P>>| ())
  }

  /// [`TransactionServer::respond`], then find out whether the
  /// response was received.
  ///
  /// `on_done` is invoked with `Ok(())` immediately for responses that aren't
  /// sent reliably, and once a separate CON response is ACKed otherwise.
  pub fn respond_with<P, F>(&self,
                            core: &Core<P>,
                            mut resp: Message,
                            on_done: F)
                            -> Result<(), Error<P>>
    where P: PlatformTypes,
          F: FnOnce(&Core<P>, Result<(), Error<P>>) + Send + Sync + 'static
  {
    let started = self.inner.state.map_mut(|s| {
                                    if s.responded {
                                      None
                                    } else {
                                      s.responded = true;
                                      Some((!s.acked, s.window.take()))
                                    }
                                  });

    let (in_window, window) = match started {
      | Some(started) => started,
      | None => {
        log::warn!("request {} was already responded to",
                   logging::msg_summary(self.inner.req.data()));
        return Err(Protocol::AlreadyResponded.into());
      },
    };

    let req = &self.inner.req;
    resp.token = req.data().token;

    if req.data().ty == Type::Con && in_window {
      if let Some(window) = window {
        core.cancel(window);
      }
      core.remove_listener(&self.dedupe_id());

      if resp.ty == Type::Reset {
        core.send(Addrd(&req.data().rst(), req.addr()))?;
      } else {
        resp.id = req.data().id;
        resp.ty = Type::Ack;
        ReliableReception::start(core, req, Some(resp))?;
      }

      on_done(core, Ok(()));
      return Ok(());
    }

    resp.id = core.next_id();
    match resp.ty {
      | Type::Con => {
        ReliableTransmission::send(core, Addrd(resp, req.addr()), move |core: &Core<P>, o| {
          let result = match o {
            | Outcome::Acked(_) => Ok(()),
            | Outcome::Rejected(_) => Err(When::None.what(What::Reset)),
            | Outcome::TimedOut => Err(When::None.what(What::MessageNeverAcked)),
          };
          on_done(core, result)
        })?;
      },
      | Type::Non | Type::Ack | Type::Reset => {
        if resp.ty == Type::Ack {
          resp.ty = Type::Non;
        }
        core.send(Addrd(&resp, req.addr()))?;
        on_done(core, Ok(()));
      },
    }

    Ok(())
  }

  fn dedupe_id(&self) -> CorrelationId {
    CorrelationId::Transmission(self.inner.req.addr(), self.inner.req.data().id)
  }

  fn window_passed<P: PlatformTypes>(&self, core: &Core<P>) {
    let ack_now = self.inner.state.map_mut(|s| {
                                    s.window = None;
                                    if s.responded || s.acked {
                                      false
                                    } else {
                                      s.acked = true;
                                      true
                                    }
                                  });

    if ack_now {
      core.remove_listener(&self.dedupe_id());
      ReliableReception::start(core, &self.inner.req, None).map(|_| ())
                                                           .unwrap_or_else(|e| {
                                                             log::error!("{}", e)
                                                           });
    }
  }
}

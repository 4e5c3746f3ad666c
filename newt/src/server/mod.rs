use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};

use newt_msg::{Message, MessageOptions, Type};
use toad_stem::Stem;

use crate::block::BlockwiseServer;
use crate::core::{CorrelationId, Core, Error, Protocol, Stage};
use crate::net::Addrd;
use crate::observe::Subject;
use crate::platform::PlatformTypes;
use crate::req::{Method, Req};
use crate::resp::{code, Resp};

/// A simple in-memory resource store
pub mod resource;

#[doc(inline)]
pub use resource::Resources;

/// Application logic of a [`Server`]
///
/// Every request handed to a handler must eventually be answered with
/// [`Server::respond`]. Requests with bodies sliced using Block1 are
/// reassembled before reaching the handler, and large responses are
/// sliced using Block2 automatically.
///
/// Every method defaults to responding `4.05 Method Not Allowed`.
pub trait Handler<P: PlatformTypes>: Send + Sync + 'static {
  /// Handle a GET request
  fn handle_get(&self, server: &Server<P>, req: Addrd<Req>) {
    not_allowed(server, &req)
  }

  /// Handle a PUT request
  fn handle_put(&self, server: &Server<P>, req: Addrd<Req>) {
    not_allowed(server, &req)
  }

  /// Handle a POST request
  fn handle_post(&self, server: &Server<P>, req: Addrd<Req>) {
    not_allowed(server, &req)
  }

  /// Handle a DELETE request
  fn handle_delete(&self, server: &Server<P>, req: Addrd<Req>) {
    not_allowed(server, &req)
  }

  /// Handle a GET request registering an observer (`Observe: 0`)
  ///
  /// Answering with a success code starts the observation, after which
  /// [`Server::notify`] reaches the client. Defaults to [`Handler::handle_get`].
  fn handle_observe(&self, server: &Server<P>, req: Addrd<Req>) {
    self.handle_get(server, req)
  }

  /// A client stopped observing a resource
  fn observe_terminated(&self, server: &Server<P>, req: &Addrd<Req>) {
    let _ = (server, req);
  }
}

fn not_allowed<P: PlatformTypes>(server: &Server<P>, req: &Addrd<Req>) {
  if let Err(e) = server.respond(req, Resp::new(code::METHOD_NOT_ALLOWED)) {
    log::warn!("{}", e);
  }
}

struct Inner<P: PlatformTypes> {
  core: Arc<Core<P>>,
  handler: Box<dyn Handler<P>>,
  pending: Stem<HashMap<CorrelationId, BlockwiseServer<P>>>,
  subjects: Stem<HashMap<String, Vec<Subject<P>>>>,
}

impl<P: PlatformTypes> Drop for Inner<P> {
  fn drop(&mut self) {
    self.core.remove_listener(&CorrelationId::Request);
  }
}

/// A CoAP server
///
/// Claims every request that nothing more specific (an ongoing exchange,
/// a method listener) claimed first, and hands it to a [`Handler`].
///
/// ```
/// use std::sync::Arc;
///
/// use newt::net::Addrd;
/// use newt::req::Req;
/// use newt::resp::{code, Resp};
/// use newt::server::{Handler, Server};
///
/// struct Hello;
///
/// impl<P: newt::platform::PlatformTypes> Handler<P> for Hello {
///   fn handle_get(&self, server: &Server<P>, req: Addrd<Req>) {
///     let mut resp = Resp::new(code::CONTENT);
///     resp.set_payload("hello!".bytes());
///     server.respond(&req, resp).ok();
///   }
/// }
///
/// # fn main() -> std::io::Result<()> {
/// let (core, runtime) = newt::std::start("127.0.0.1:0", Default::default())?;
/// let server = Server::new(core, Hello);
/// # drop(server);
/// # runtime.stop();
/// # Ok(())
/// # }
/// ```
pub struct Server<P: PlatformTypes> {
  inner: Arc<Inner<P>>,
}

impl<P: PlatformTypes> Clone for Server<P> {
  fn clone(&self) -> Self {
    Self { inner: self.inner.clone() }
  }
}

impl<P: PlatformTypes> core::fmt::Debug for Server<P> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("Server")
     .field("core", &self.inner.core)
     .field("pending", &self.inner.pending.map_ref(|p| p.len()))
     .field("observed", &self.inner.subjects.map_ref(|s| s.keys().cloned().collect::<Vec<_>>()))
     .finish()
  }
}

fn key(addr: SocketAddr, msg: &Message) -> CorrelationId {
  CorrelationId::Transmission(addr, msg.id)
}

impl<P: PlatformTypes> Server<P> {
  /// Start serving requests received by `core` with `handler`
  ///
  /// The server stops when the last clone of it is dropped.
  pub fn new<H: Handler<P>>(core: Arc<Core<P>>, handler: H) -> Self {
    let server = Self { inner: Arc::new(Inner { core,
                                                handler: Box::new(handler),
                                                pending: Stem::new(HashMap::new()),
                                                subjects: Stem::new(HashMap::new()) }) };

    let weak = Arc::downgrade(&server.inner);
    server.inner
          .core
          .add_listener(CorrelationId::Request,
                        Arc::new(move |core: &Core<P>, msg: Addrd<Message>| {
                          match weak.upgrade() {
                            | Some(inner) => Server { inner }.on_request(core, msg),
                            | None => core.dispatch_after(msg, Stage::Request),
                          }
                        }));

    server
  }

  /// The core this server receives requests with
  pub fn core(&self) -> &Arc<Core<P>> {
    &self.inner.core
  }

  fn upgrade(weak: &Weak<Inner<P>>) -> Option<Self> {
    weak.upgrade().map(|inner| Self { inner })
  }

  fn on_request(&self, core: &Core<P>, msg: Addrd<Message>) {
    let weak = Arc::downgrade(&self.inner);
    let started = BlockwiseServer::start(core,
                                         msg,
                                         move |_: &Core<P>,
                                               bw: BlockwiseServer<P>,
                                               req: Addrd<Message>| {
                                           match Self::upgrade(&weak) {
                                             | Some(server) => server.handle(bw, req),
                                             | None => log::warn!("server stopped before handling {}",
                                                                  crate::logging::msg_summary(req.data())),
                                           }
                                         });

    if let Err(e) = started {
      log::warn!("{}", e);
    }
  }

  fn handle(&self, bw: BlockwiseServer<P>, req: Addrd<Message>) {
    self.inner
        .pending
        .map_mut(|p| p.insert(key(req.addr(), req.data()), bw.clone()));

    let req = req.map(Req::from);
    let method = req.data().method();
    let handler = &self.inner.handler;

    log::debug!("{} {} from {}", method, req.data().path(), req.addr());

    if method == Method::GET && req.data().is_observe_register() {
      handler.handle_observe(self, req)
    } else if method == Method::GET {
      handler.handle_get(self, req)
    } else if method == Method::PUT {
      handler.handle_put(self, req)
    } else if method == Method::POST {
      handler.handle_post(self, req)
    } else if method == Method::DELETE {
      handler.handle_delete(self, req)
    } else {
      not_allowed(self, &req)
    }
  }

  /// Respond to a request
  ///
  /// Type, id & token of `resp` are decided here. A success response to an
  /// observe registration starts an observation of the request's path.
  ///
  /// Each request may be responded to once; after that this
  /// yields [`Protocol::AlreadyResponded`].
  pub fn respond(&self, req: &Addrd<Req>, resp: Resp) -> Result<(), Error<P>> {
    let core = &self.inner.core;
    let bw = self.inner
                 .pending
                 .map_mut(|p| p.remove(&key(req.addr(), req.data().msg())))
                 .ok_or_else(|| Error::from(Protocol::AlreadyResponded))?;

    let resp = Message::from(resp);
    if req.data().is_observe_register() && resp.code.is_success() {
      let ts = bw.take_transaction()
                 .ok_or_else(|| Error::from(Protocol::AlreadyResponded))?;
      let subject = self.observe(ts);
      return subject.notify(core, resp);
    }

    bw.respond(core, resp)
  }

  /// Respond to a request with an empty response
  pub fn respond_code(&self, req: &Addrd<Req>, code: newt_msg::Code) -> Result<(), Error<P>> {
    self.respond(req, Resp::new(code))
  }

  fn observe(&self, registration: crate::transaction::TransactionServer) -> Subject<P> {
    let core = &self.inner.core;
    let req = registration.req().clone();
    let path = req.data().path_string();

    // a client observes a resource once; re-registering replaces the old observation
    let stale = self.inner.subjects.map_mut(|subjects| {
                                     let all = subjects.remove(&path).unwrap_or_default();
                                     let (stale, keep): (Vec<_>, Vec<_>) =
                                       all.into_iter()
                                          .partition(|s| s.req().addr() == req.addr());
                                     if !keep.is_empty() {
                                       subjects.insert(path.clone(), keep);
                                     }
                                     stale
                                   });
    stale.iter().for_each(|s| s.terminate(core));

    let weak = Arc::downgrade(&self.inner);
    let ended = req.clone();
    let subject = Subject::new(core, registration, move |_: &Core<P>, ()| {
      if let Some(server) = Self::upgrade(&weak) {
        server.forget(ended);
      }
    });

    log::debug!("{} is observing {:?}", req.addr(), path);
    self.inner
        .subjects
        .map_mut(|s| s.entry(path.clone()).or_default().push(subject.clone()));

    subject
  }

  fn forget(&self, req: Addrd<Message>) {
    let path = req.data().path_string();
    let same = |s: &Subject<P>| {
      s.req().addr() == req.addr() && s.req().data().token == req.data().token
    };

    self.inner.subjects.map_mut(|subjects| {
                         if let Some(subs) = subjects.get_mut(&path) {
                           subs.retain(|s| !same(s));
                           if subs.is_empty() {
                             subjects.remove(&path);
                           }
                         }
                       });

    log::debug!("{} stopped observing {:?}", req.addr(), path);
    self.inner
        .handler
        .observe_terminated(self, &req.map(Req::from));
  }

  /// Send a notification to every client observing `path`
  ///
  /// Notifications are sent CON if `confirmable`, NON otherwise.
  /// Notifying with an error code ends the observations.
  ///
  /// Returns the number of observers notified.
  pub fn notify(&self, path: &str, resp: &Resp, confirmable: bool) -> usize {
    let path = path.trim_matches('/');
    let subjects = self.inner
                       .subjects
                       .map_ref(|s| s.get(path).cloned().unwrap_or_default());

    subjects.into_iter()
            .filter(|subject| {
              let mut msg = Message::from(resp.clone());
              msg.ty = if confirmable { Type::Con } else { Type::Non };
              match subject.notify(&self.inner.core, msg) {
                | Ok(()) => true,
                | Err(e) => {
                  log::warn!("failed to notify {}: {}", subject.req().addr(), e);
                  false
                },
              }
            })
            .count()
  }

  /// Number of clients observing `path`
  pub fn observers(&self, path: &str) -> usize {
    self.inner
        .subjects
        .map_ref(|s| s.get(path.trim_matches('/')).map(Vec::len).unwrap_or(0))
  }
}

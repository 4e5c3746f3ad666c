use std::collections::HashMap;
use std::sync::Arc;

use newt_msg::{ContentFormat, Message, MessageOptions};
use toad_stem::Stem;

use crate::block::BlockwiseClient;
use crate::core::{Core, Error};
use crate::net::Addrd;
use crate::observe::Observation;
use crate::platform::PlatformTypes;
use crate::req::{Method, Req};
use crate::resp::Resp;

mod uri;

#[doc(inline)]
pub use uri::{Uri, DEFAULT_PORT};

/// Outcome of a request: the (reassembled) response, or why there isn't one
pub type ClientResponse<P> = Result<Addrd<Resp>, Error<P>>;

type Observations<P> = Arc<Stem<HashMap<String, Observation<P>>>>;

/// A CoAP client
///
/// Requests are sent blockwise when needed: bodies larger than
/// [`Block::client_max_size`](crate::config::Block::client_max_size) are sliced
/// with Block1, and responses are reassembled from Block2 slices before being
/// handed to `on_done`.
///
/// Nothing here blocks; see [`crate::blocking::Client`] for that.
pub struct Client<P: PlatformTypes> {
  core: Arc<Core<P>>,
  observations: Observations<P>,
}

impl<P: PlatformTypes> Clone for Client<P> {
  fn clone(&self) -> Self {
    Self { core: self.core.clone(),
           observations: self.observations.clone() }
  }
}

impl<P: PlatformTypes> core::fmt::Debug for Client<P> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("Client")
     .field("core", &self.core)
     .field("observing", &self.observations.map_ref(|os| os.keys().cloned().collect::<Vec<_>>()))
     .finish()
  }
}

impl<P: PlatformTypes> Client<P> {
  /// Create a client sending requests with `core`
  pub fn new(core: Arc<Core<P>>) -> Self {
    Self { core,
           observations: Default::default() }
  }

  /// The core this client sends requests with
  pub fn core(&self) -> &Arc<Core<P>> {
    &self.core
  }

  /// Largest block this client sends or asks for
  pub fn max_block_size(&self) -> u16 {
    self.core.config().block.client_max_size
  }

  /// Build a request for `uri`
  ///
  /// The request is CON and its id & token are left
  /// blank to be filled in when it is sent.
  pub fn build(method: Method,
               uri: &Uri,
               content_format: Option<ContentFormat>,
               payload: Option<Vec<u8>>)
               -> Req {
    let mut req = Req::new(method, "");
    uri.apply(req.msg_mut());

    if let Some(cf) = content_format {
      req.msg_mut().set_content_format(cf);
    }
    if let Some(payload) = payload {
      req.set_payload(payload);
    }

    req
  }

  /// Send a request to `uri`
  ///
  /// Fails immediately when the uri is invalid or its host can't be resolved.
  ///
  /// The returned transfer may be used to abandon the request.
  pub fn request<F>(&self,
                    method: Method,
                    uri: &str,
                    content_format: Option<ContentFormat>,
                    payload: Option<Vec<u8>>,
                    on_done: F)
                    -> Result<BlockwiseClient<P>, Error<P>>
    where F: FnOnce(&Core<P>, ClientResponse<P>) + Send + Sync + 'static
  {
    let uri = Uri::parse(uri)?;
    let addr = uri.resolve()?;
    let req = Self::build(method, &uri, content_format, payload);
    self.send(Addrd(req, addr), on_done)
  }

  /// Send a request
  ///
  /// A new token is generated if the request doesn't have one.
  pub fn send<F>(&self, req: Addrd<Req>, on_done: F) -> Result<BlockwiseClient<P>, Error<P>>
    where F: FnOnce(&Core<P>, ClientResponse<P>) + Send + Sync + 'static
  {
    let mut req = req.map(Message::from);
    if req.data().token.0.is_empty() {
      req.data_mut().token = self.core.next_token();
    }

    log::trace!("sending {} to {}",
                crate::logging::msg_summary(req.data()),
                req.addr());

    BlockwiseClient::send(&self.core, req, move |core: &Core<P>, resp| {
      on_done(core, resp.map(|resp| resp.map(Resp::from)))
    })
  }

  /// Observe the resource at `uri`
  ///
  /// Observing a uri that is already being observed cancels
  /// the older observation first.
  ///
  /// `on_notification` is invoked with the registration response and every
  /// fresh notification after it. `on_terminated` is invoked once when the
  /// observation ends, with the error that ended it (if any).
  pub fn observe<N, T>(&self,
                       uri: &str,
                       accept: Option<ContentFormat>,
                       on_notification: N,
                       on_terminated: T)
                       -> Result<Observation<P>, Error<P>>
    where N: Fn(&Core<P>, Addrd<Resp>) + Send + Sync + 'static,
          T: FnOnce(&Core<P>, Option<Error<P>>) + Send + Sync + 'static
  {
    let parsed = Uri::parse(uri)?;
    let addr = parsed.resolve()?;
    let key = parsed.to_string();

    self.observe_cancel(&key)?;

    let mut req = Self::build(Method::GET, &parsed, None, None);
    if let Some(cf) = accept {
      req.msg_mut().set_accept(cf);
    }
    let token = self.core.next_token();
    req.msg_mut().token = token;

    let observations = self.observations.clone();
    let forget = key.clone();
    let obs = Observation::register(&self.core,
                                    Addrd(Message::from(req), addr),
                                    move |core: &Core<P>, msg: Addrd<Message>| {
                                      on_notification(core, msg.map(Resp::from))
                                    },
                                    move |core: &Core<P>, err: Option<Error<P>>| {
                                      observations.map_mut(|os| {
                                                    if os.get(&forget).map(|o| o.token())
                                                       == Some(token)
                                                    {
                                                      os.remove(&forget);
                                                    }
                                                  });
                                      on_terminated(core, err)
                                    })?;

    if !obs.is_done() {
      self.observations
          .map_mut(|os| os.insert(key.clone(), obs.clone()));
    }

    Ok(obs)
  }

  /// Stop observing `uri`
  ///
  /// Does nothing if `uri` isn't being observed.
  pub fn observe_cancel(&self, uri: &str) -> Result<(), Error<P>> {
    let key = Uri::parse(uri)?.to_string();
    match self.observations.map_mut(|os| os.remove(&key)) {
      | Some(obs) => obs.cancel(&self.core),
      | None => Ok(()),
    }
  }

  /// Uris currently being observed
  pub fn observing(&self) -> Vec<String> {
    self.observations
        .map_ref(|os| os.keys().cloned().collect())
  }

  /// Cancel every observation
  pub fn halt(&self) {
    let all = self.observations
                  .map_mut(|os| os.drain().map(|(_, o)| o).collect::<Vec<_>>());

    for obs in all {
      if let Err(e) = obs.cancel(&self.core) {
        log::warn!("failed to cancel observation: {}", e);
      }
    }
  }
}

use std::collections::HashMap;
use std::sync::Arc;

use newt_msg::{Code, ContentFormat, MessageOptions};
use toad_stem::Stem;

use super::{Handler, Server};
use crate::config;
use crate::net::Addrd;
use crate::platform::PlatformTypes;
use crate::req::Req;
use crate::resp::{code, Resp};

/// One in every this many notifications is sent CON
/// when notifications are not reliable
const CON_NOTIFICATION_RATE: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Resource {
  format: Option<ContentFormat>,
  value: Vec<u8>,
}

#[derive(Debug, Default)]
struct State {
  resources: HashMap<String, Resource>,
  write: bool,
  notifications: u64,
}

/// A [`Handler`] storing resources in memory, by path
///
/// - GET responds with the resource (or `4.04`), and may be observed
/// - PUT stores the request body and notifies observers (`2.04`)
/// - DELETE removes the resource and notifies observers (`4.04`)
///
/// PUT & DELETE are only allowed in write mode, and are answered
/// with `4.05` otherwise.
///
/// ```no_run
/// use newt::server::{Resources, Server};
///
/// let (core, _runtime) = newt::std::start("0.0.0.0:5683", Default::default()).unwrap();
/// let resources = Resources::new(core.config().resources);
/// let server = Server::new(core, resources.clone());
///
/// resources.set_resource(&server, "hello", None, b"world".to_vec());
/// ```
#[derive(Debug, Clone)]
pub struct Resources {
  config: config::Resources,
  state: Arc<Stem<State>>,
}

impl Default for Resources {
  fn default() -> Self {
    Self::new(Default::default())
  }
}

impl Resources {
  /// Create an empty store
  pub fn new(config: config::Resources) -> Self {
    Self { config,
           state: Default::default() }
  }

  /// Allow (or disallow) clients to PUT & DELETE resources
  pub fn set_write_mode(&self, write: bool) {
    self.state.map_mut(|s| s.write = write);
  }

  /// Are clients allowed to PUT & DELETE resources?
  pub fn write_mode(&self) -> bool {
    self.state.map_ref(|s| s.write)
  }

  /// Get a resource's content format and value
  pub fn get(&self, name: &str) -> Option<(Option<ContentFormat>, Vec<u8>)> {
    self.state
        .map_ref(|s| s.resources.get(name).map(|r| (r.format, r.value.clone())))
  }

  /// Names of all stored resources
  pub fn names(&self) -> Vec<String> {
    self.state.map_ref(|s| s.resources.keys().cloned().collect())
  }

  /// Create or change a resource, notifying its observers with `2.04`
  ///
  /// Adding a resource when the store is full evicts another one.
  pub fn set_resource<P: PlatformTypes>(&self,
                                        server: &Server<P>,
                                        name: &str,
                                        format: Option<ContentFormat>,
                                        value: Vec<u8>) {
    let name = name.trim_matches('/');
    let max = self.config.max_count;
    let resource = Resource { format, value };

    let evicted = self.state.map_mut(|s| {
                              let fresh = s.resources
                                           .insert(name.to_string(), resource.clone())
                                           .is_none();
                              if fresh && s.resources.len() > max {
                                s.resources.keys().find(|k| k.as_str() != name).cloned()
                              } else {
                                None
                              }
                            });

    if let Some(evicted) = evicted {
      log::debug!("too many resources, removing {:?}", evicted);
      self.remove_resource(server, &evicted);
    }

    let mut resp = Resp::new(code::CHANGED);
    if let Some(cf) = resource.format {
      resp.msg_mut().set_content_format(cf);
    }
    resp.set_payload(resource.value);

    let n = self.notify(server, name, &resp);
    log::debug!("set {:?}, notified {} observers", name, n);
  }

  /// Remove a resource, notifying its observers with `4.04`
  ///
  /// Returns whether the resource existed.
  pub fn remove_resource<P: PlatformTypes>(&self, server: &Server<P>, name: &str) -> bool {
    let name = name.trim_matches('/');
    let removed = self.state.map_mut(|s| s.resources.remove(name)).is_some();

    if removed {
      self.notify(server, name, &Resp::new(code::NOT_FOUND));
    }

    removed
  }

  fn notify<P: PlatformTypes>(&self, server: &Server<P>, name: &str, resp: &Resp) -> usize {
    let n = self.state.map_mut(|s| {
                        s.notifications = s.notifications.wrapping_add(1);
                        s.notifications
                      });
    let confirmable = self.config.reliable_notifications || n % CON_NOTIFICATION_RATE == 1;
    server.notify(name, resp, confirmable)
  }

  fn respond<P: PlatformTypes>(server: &Server<P>, req: &Addrd<Req>, resp: Resp) {
    if let Err(e) = server.respond(req, resp) {
      log::warn!("{}", e);
    }
  }

  fn respond_code<P: PlatformTypes>(server: &Server<P>, req: &Addrd<Req>, code: Code) {
    Self::respond(server, req, Resp::new(code))
  }
}

impl<P: PlatformTypes> Handler<P> for Resources {
  fn handle_get(&self, server: &Server<P>, req: Addrd<Req>) {
    match self.get(&req.data().path()) {
      | Some((format, value)) => {
        let mut resp = Resp::new(code::CONTENT);
        if let Some(cf) = format {
          resp.msg_mut().set_content_format(cf);
        }
        resp.set_payload(value);
        Self::respond(server, &req, resp)
      },
      | None => Self::respond_code(server, &req, code::NOT_FOUND),
    }
  }

  fn handle_put(&self, server: &Server<P>, req: Addrd<Req>) {
    if !self.write_mode() {
      log::debug!("not in write mode, refusing PUT");
      return Self::respond_code(server, &req, code::METHOD_NOT_ALLOWED);
    }

    if req.data().payload().len() > self.config.max_size {
      return Self::respond_code(server, &req, code::REQUEST_ENTITY_TOO_LARGE);
    }

    Self::respond_code(server, &req, code::CHANGED);
    self.set_resource(server,
                      &req.data().path(),
                      req.data().msg().content_format(),
                      req.data().payload().to_vec());
  }

  fn handle_delete(&self, server: &Server<P>, req: Addrd<Req>) {
    if !self.write_mode() {
      log::debug!("not in write mode, refusing DELETE");
      return Self::respond_code(server, &req, code::METHOD_NOT_ALLOWED);
    }

    if self.remove_resource(server, &req.data().path()) {
      Self::respond_code(server, &req, code::DELETED)
    } else {
      Self::respond_code(server, &req, code::NOT_FOUND)
    }
  }
}

#[cfg(test)]
mod tests {
  use newt_msg::observe::Action;
  use newt_msg::{Id, Message, Payload, Type};

  use super::*;
  use crate::req::Method;
  use crate::test;

  fn setup(config: config::Resources) -> (Server<test::Mock>, Resources, test::SockMock) {
    let (core, sock) = test::core();
    let resources = Resources::new(config);
    let server = Server::new(Arc::new(core), resources.clone());
    (server, resources, sock)
  }

  fn send(server: &Server<test::Mock>, sock: &test::SockMock, msg: Message) -> Message {
    server.core().dispatch(Addrd(msg, test::x.x.x.x(1)));
    test::sent(sock).remove(0).unwrap()
  }

  fn req(method: Method, id: u16, path: &str, payload: &[u8]) -> Message {
    let mut msg = Message::new(Type::Con, method.code(), Id(id), test::token(id as u8));
    msg.set_path(path);
    msg.payload = Payload(payload.to_vec());
    msg
  }

  #[test]
  fn get_put_delete() {
    let (server, resources, sock) = setup(Default::default());
    resources.set_write_mode(true);

    assert_eq!(send(&server, &sock, req(Method::GET, 1, "a", b"")).code, code::NOT_FOUND);
    assert_eq!(send(&server, &sock, req(Method::PUT, 2, "a", b"1")).code, code::CHANGED);

    let got = send(&server, &sock, req(Method::GET, 3, "a", b""));
    assert_eq!((got.code, got.payload.as_str()), (code::CONTENT, Some("1")));

    assert_eq!(send(&server, &sock, req(Method::DELETE, 4, "a", b"")).code, code::DELETED);
    assert_eq!(send(&server, &sock, req(Method::DELETE, 5, "a", b"")).code, code::NOT_FOUND);
    assert!(resources.names().is_empty());
  }

  #[test]
  fn read_only_by_default() {
    let (server, resources, sock) = setup(Default::default());
    resources.set_resource(&server, "a", None, b"1".to_vec());

    assert_eq!(send(&server, &sock, req(Method::PUT, 1, "a", b"2")).code,
               code::METHOD_NOT_ALLOWED);
    assert_eq!(send(&server, &sock, req(Method::DELETE, 2, "a", b"")).code,
               code::METHOD_NOT_ALLOWED);
    assert_eq!(send(&server, &sock, req(Method::POST, 3, "a", b"")).code,
               code::METHOD_NOT_ALLOWED);
    assert_eq!(resources.get("a"), Some((None, b"1".to_vec())));
  }

  #[test]
  fn too_large() {
    let (server, resources, sock) = setup(config::Resources { max_size: 4,
                                                              ..Default::default() });
    resources.set_write_mode(true);

    assert_eq!(send(&server, &sock, req(Method::PUT, 1, "a", b"12345")).code,
               code::REQUEST_ENTITY_TOO_LARGE);
    assert_eq!(resources.get("a"), None);
  }

  #[test]
  fn evicts_when_full() {
    let (server, resources, _) = setup(config::Resources { max_count: 2,
                                                           ..Default::default() });
    resources.set_resource(&server, "a", None, vec![]);
    resources.set_resource(&server, "b", None, vec![]);
    resources.set_resource(&server, "c", None, vec![]);

    let names = resources.names();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"c".to_string()));
  }

  fn observe(server: &Server<test::Mock>, sock: &test::SockMock, id: u16) {
    let mut msg = req(Method::GET, id, "temp", b"");
    msg.set_observe_action(Action::Register);
    let resp = send(server, sock, msg);
    assert_eq!(resp.observe(), Some(1));
  }

  #[test]
  fn observers_are_notified_of_changes() {
    let (server, resources, sock) = setup(Default::default());
    resources.set_resource(&server, "temp", Some(ContentFormat::Text), b"20".to_vec());
    observe(&server, &sock, 1);

    resources.set_resource(&server, "temp", Some(ContentFormat::Text), b"21".to_vec());
    let sent = test::sent(&sock);
    assert_eq!(sent.len(), 1);
    let n = sent[0].data();
    assert_eq!((n.ty, n.code), (Type::Con, code::CHANGED));
    assert_eq!(n.payload.as_str(), Some("21"));
    assert_eq!(n.content_format(), Some(ContentFormat::Text));

    resources.remove_resource(&server, "temp");
    let sent = test::sent(&sock);
    assert_eq!(sent[0].data().code, code::NOT_FOUND);
    assert_eq!(sent[0].data().observe(), None);
    assert_eq!(server.observers("temp"), 0);
  }

  #[test]
  fn unreliable_notifications_are_mostly_non() {
    let (server, resources, sock) = setup(config::Resources { reliable_notifications: false,
                                                              ..Default::default() });
    resources.set_resource(&server, "temp", None, b"0".to_vec());
    observe(&server, &sock, 1);

    let mut types = vec![];
    for n in 0..20u8 {
      resources.set_resource(&server, "temp", None, vec![n]);
      let sent = test::sent(&sock);
      // ACK the CON ones so they don't linger
      if let Some(con) = sent.iter().find(|m| m.data().ty == Type::Con) {
        server.core().dispatch(con.as_ref().map(Message::ack));
      }
      types.extend(sent.iter().map(|m| m.data().ty));
    }

    assert_eq!(types.len(), 20);
    assert_eq!(types.iter().filter(|t| **t == Type::Con).count(), 2);
  }
}

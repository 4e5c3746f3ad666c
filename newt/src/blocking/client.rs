use std::io;
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use newt_msg::ContentFormat;

use crate::client::ClientResponse;
use crate::config::Config;
use crate::core::{Core, Error, What, When};
use crate::net::Addrd;
use crate::platform::{PlatformTypes, Std};
use crate::req::{Method, Req};
use crate::resp::Resp;
use crate::std::Runtime;
use crate::time::Timeout;

/// Where a callback leaves its result for a waiting thread
type Slot<T> = Arc<(Mutex<Option<T>>, Condvar)>;

fn fill<T>(slot: &Slot<T>, t: T) {
  let (lock, cvar) = &**slot;
  *lock.lock().unwrap_or_else(PoisonError::into_inner) = Some(t);
  cvar.notify_all();
}

/// Wait until `slot` is filled, or `timeout` has elapsed
fn wait<T>(slot: &Slot<T>, timeout: Timeout) -> Option<T> {
  let (lock, cvar) = &**slot;
  let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

  let mut guard = match timeout.to_duration() {
    | Some(dur) => {
      cvar.wait_timeout_while(guard, dur, |t| t.is_none())
          .unwrap_or_else(PoisonError::into_inner)
          .0
    },
    | None => cvar.wait_while(guard, |t| t.is_none())
                  .unwrap_or_else(PoisonError::into_inner),
  };

  guard.take()
}

/// A blocking CoAP request client
///
/// Wraps a [`crate::client::Client`], parking the calling thread until the
/// outcome of a request is known. Something else must be driving the
/// [`Core`] (e.g. a [`Runtime`]) for responses to ever arrive.
///
/// ```no_run
/// use newt::blocking::Client;
/// use newt::time::Timeout;
///
/// let client = Client::try_new(0).unwrap();
/// let resp = client.get("coap://127.0.0.1/hello", Timeout::Millis(5_000)).unwrap();
///
/// println!("Hello, {}!", resp.data().payload_str().unwrap());
/// ```
#[derive(Debug)]
pub struct Client<P: PlatformTypes> {
  client: crate::client::Client<P>,
  runtime: Option<Runtime>,
}

/// Helper methods on Client Results
pub trait ClientResultExt<T, P: PlatformTypes> {
  /// If we timed out waiting for a response, consider that Ok(None).
  ///
  /// Usually used to handle sending non-confirmable requests that
  /// the server may have received but not responded to.
  fn timeout_ok(self) -> Result<Option<T>, Error<P>>;
}

impl<T, P: PlatformTypes> ClientResultExt<T, P> for Result<T, Error<P>> {
  fn timeout_ok(self) -> Result<Option<T>, Error<P>> {
    match self {
      | Ok(t) => Ok(Some(t)),
      | Err(Error { what: What::MessageNeverAcked,
                    .. })
      | Err(Error { what: What::Timeout,
                    .. }) => Ok(None),
      | Err(e) => Err(e),
    }
  }
}

impl Client<Std> {
  /// Create a new Client bound to `0.0.0.0:port` (0 for any free port)
  pub fn try_new(port: u16) -> io::Result<Self> {
    Self::try_new_config(port, Config::default())
  }

  /// Create a new std client with a specific runtime config
  pub fn try_new_config(port: u16, config: Config) -> io::Result<Self> {
    let (core, runtime) = crate::std::start(("0.0.0.0", port), config)?;
    Ok(Self { client: crate::client::Client::new(core),
              runtime: Some(runtime) })
  }
}

impl<P: PlatformTypes> Client<P> {
  /// Block on requests sent by `client`
  pub fn new(client: crate::client::Client<P>) -> Self {
    Self { client,
           runtime: None }
  }

  /// The non-blocking client requests are sent with
  pub fn client(&self) -> &crate::client::Client<P> {
    &self.client
  }

  /// Stop the runtime driving this client, if it owns one
  pub fn shutdown(mut self) {
    self.runtime.take();
  }

  /// Send a request and wait for its response
  ///
  /// If `timeout` elapses first the exchange is abandoned
  /// and [`What::Timeout`] is yielded.
  pub fn send(&self, req: Addrd<Req>, timeout: Timeout) -> Result<Addrd<Resp>, Error<P>> {
    let slot: Slot<ClientResponse<P>> = Default::default();
    let filler = slot.clone();

    let transfer = self.client
                       .send(req, move |_: &Core<P>, resp| fill(&filler, resp))?;

    self.finish(&slot, timeout, || transfer.terminate(self.client.core()))
  }

  /// Send a request to `uri` and wait for its response
  pub fn request(&self,
                 method: Method,
                 uri: &str,
                 content_format: Option<ContentFormat>,
                 payload: Option<Vec<u8>>,
                 timeout: Timeout)
                 -> Result<Addrd<Resp>, Error<P>> {
    let slot: Slot<ClientResponse<P>> = Default::default();
    let filler = slot.clone();

    let transfer = self.client.request(method,
                                       uri,
                                       content_format,
                                       payload,
                                       move |_: &Core<P>, resp| fill(&filler, resp))?;

    self.finish(&slot, timeout, || transfer.terminate(self.client.core()))
  }

  fn finish(&self,
            slot: &Slot<ClientResponse<P>>,
            timeout: Timeout,
            abandon: impl FnOnce())
            -> Result<Addrd<Resp>, Error<P>> {
    match wait(slot, timeout) {
      | Some(resp) => resp,
      | None => {
        log::debug!("gave up waiting for a response after {:?}", timeout);
        abandon();
        Err(When::None.what(What::Timeout))
      },
    }
  }

  /// Send a GET request
  pub fn get(&self, uri: &str, timeout: Timeout) -> Result<Addrd<Resp>, Error<P>> {
    self.request(Method::GET, uri, None, None, timeout)
  }

  /// Send a PUT request
  pub fn put(&self,
             uri: &str,
             content_format: Option<ContentFormat>,
             payload: Vec<u8>,
             timeout: Timeout)
             -> Result<Addrd<Resp>, Error<P>> {
    self.request(Method::PUT, uri, content_format, Some(payload), timeout)
  }

  /// Send a POST request
  pub fn post(&self,
              uri: &str,
              content_format: Option<ContentFormat>,
              payload: Vec<u8>,
              timeout: Timeout)
              -> Result<Addrd<Resp>, Error<P>> {
    self.request(Method::POST, uri, content_format, Some(payload), timeout)
  }

  /// Send a DELETE request
  pub fn delete(&self, uri: &str, timeout: Timeout) -> Result<Addrd<Resp>, Error<P>> {
    self.request(Method::DELETE, uri, None, None, timeout)
  }
}

#[cfg(test)]
mod tests {
  use std::thread;
  use std::time::Duration;

  use newt_msg::{Message, Payload, Type};

  use super::*;
  use crate::core::ErrorKind;
  use crate::resp::code;
  use crate::test;

  fn client() -> (Client<test::Mock>, test::SockMock) {
    let (core, sock) = test::core();
    (Client::new(crate::client::Client::new(Arc::new(core))), sock)
  }

  #[test]
  fn waits_for_response_from_another_thread() {
    let (client, sock) = client();
    let core = client.client().core().clone();

    let server = thread::spawn(move || loop {
      let sent = test::sent(&sock);
      if let Some(req) = sent.into_iter().next() {
        let mut resp = Message::new(Type::Ack, code::CONTENT, req.data().id, req.data().token);
        resp.payload = Payload(b"world".to_vec());
        core.dispatch(Addrd(resp, req.addr()));
        break;
      }
      thread::sleep(Duration::from_millis(1));
    });

    let resp = client.get("coap://1.1.1.1/hello", Timeout::Millis(5_000))
                     .unwrap();
    server.join().unwrap();

    assert_eq!(resp.data().code(), code::CONTENT);
    assert_eq!(resp.data().payload_str(), Some("world"));
  }

  #[test]
  fn times_out_and_abandons_the_exchange() {
    let (client, sock) = client();

    let err = client.delete("coap://1.1.1.1/a", Timeout::Millis(20))
                    .unwrap_err();
    assert!(matches!(err.what, What::Timeout));
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(test::sent(&sock).len(), 1);

    // no retransmissions once abandoned
    test::advance_to(client.client().core(), 60_000);
    assert!(test::sent(&sock).is_empty());
  }

  #[test]
  fn errors_surface_immediately() {
    let (client, _) = client();
    let err = client.get("coaps://1.1.1.1/a", Timeout::Never).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol);
  }

  #[test]
  fn timeout_ok() {
    let never_acked: Result<(), Error<test::Mock>> = Err(When::None.what(What::MessageNeverAcked));
    let timed_out: Result<(), Error<test::Mock>> = Err(When::None.what(What::Timeout));
    let reset: Result<(), Error<test::Mock>> = Err(When::None.what(What::Reset));

    assert_eq!(never_acked.timeout_ok().unwrap(), None);
    assert_eq!(timed_out.timeout_ok().unwrap(), None);
    assert!(reset.timeout_ok().is_err());
    assert_eq!(Ok::<u8, Error<test::Mock>>(1).timeout_ok().unwrap(), Some(1));
  }
}

use newt_msg::{Id, Message, MessageOptions, Payload, Token, Type};

/// Request methods
pub mod method;

#[doc(inline)]
pub use method::Method;

/// A CoAP request
///
/// ```
/// use newt::req::{Method, Req};
/// use newt_msg::MessageOptions;
///
/// let mut req = Req::post("sensors/temp");
/// req.set_payload("21.5".bytes());
///
/// assert_eq!(req.method(), Method::POST);
/// assert_eq!(req.msg().path(), vec!["sensors", "temp"]);
/// assert_eq!(req.payload_str(), Some("21.5"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Req(Message);

impl Req {
  /// Create a new CON request for `path`.
  ///
  /// The id & token are left blank, and filled in
  /// when the request is sent.
  pub fn new(method: Method, path: impl AsRef<str>) -> Self {
    let mut msg = Message::new(Type::Con, method.code(), Id(0), Token::default());
    msg.set_path(path.as_ref());
    Self(msg)
  }

  /// Creates a new GET request
  pub fn get(path: impl AsRef<str>) -> Self {
    Self::new(Method::GET, path)
  }

  /// Creates a new POST request
  pub fn post(path: impl AsRef<str>) -> Self {
    Self::new(Method::POST, path)
  }

  /// Creates a new PUT request
  pub fn put(path: impl AsRef<str>) -> Self {
    Self::new(Method::PUT, path)
  }

  /// Creates a new DELETE request
  pub fn delete(path: impl AsRef<str>) -> Self {
    Self::new(Method::DELETE, path)
  }

  /// Send this request as NON instead of CON
  pub fn non(mut self) -> Self {
    self.0.ty = Type::Non;
    self
  }

  /// Get the request method
  pub fn method(&self) -> Method {
    Method(self.0.code)
  }

  /// Get the request path, without a leading slash
  pub fn path(&self) -> String {
    self.0.path_string()
  }

  /// Obtain a reference to the inner message
  pub fn msg(&self) -> &Message {
    &self.0
  }

  /// Obtain a mutable reference to the inner message
  pub fn msg_mut(&mut self) -> &mut Message {
    &mut self.0
  }

  /// Add a payload to this request
  pub fn set_payload<Bytes: IntoIterator<Item = u8>>(&mut self, payload: Bytes) {
    self.0.payload = Payload(payload.into_iter().collect());
  }

  /// Get the payload's raw bytes
  pub fn payload(&self) -> &[u8] {
    &self.0.payload.0
  }

  /// Get the payload and attempt to interpret it as a utf8 string
  pub fn payload_str(&self) -> Option<&str> {
    self.0.payload.as_str()
  }

  /// Is this a request for an observe registration?
  pub fn is_observe_register(&self) -> bool {
    self.method() == Method::GET
    && self.0.observe_action() == Some(newt_msg::observe::Action::Register)
  }
}

impl From<Message> for Req {
  fn from(msg: Message) -> Self {
    Self(msg)
  }
}

impl From<Req> for Message {
  fn from(req: Req) -> Self {
    req.0
  }
}

impl AsRef<Message> for Req {
  fn as_ref(&self) -> &Message {
    &self.0
  }
}

use newt_msg::{Code, Id, Message, Payload, Token, Type};

use crate::req::Req;

/// Response codes
pub mod code;

/// A CoAP response
///
/// ```
/// use newt::req::Req;
/// use newt::resp::{code, Resp};
/// use newt_msg::{ContentFormat, MessageOptions};
///
/// let req = Req::get("hello");
///
/// let mut resp = Resp::for_request(&req).unwrap();
/// resp.set_code(code::CONTENT);
/// resp.msg_mut().set_content_format(ContentFormat::Json);
/// resp.set_payload(r#"{"hello": "world"}"#.bytes());
///
/// assert_eq!(resp.msg().token, req.msg().token);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resp(Message);

impl Resp {
  /// Create a new response with some code and no payload
  ///
  /// Type, id and token are decided when the response is sent.
  pub fn new(code: Code) -> Self {
    Self(Message::new(Type::Non, code, Id(0), Token::default()))
  }

  /// Create a new response for a given request.
  ///
  /// If the request is CONfirmable, this will return Some(ACK).
  ///
  /// If the request is NONconfirmable, this will return Some(NON).
  ///
  /// If the request is EMPTY or RESET, this will return None.
  ///
  /// ```
  /// use newt::req::Req;
  /// use newt::resp::{code, Resp};
  /// use newt_msg::Type;
  ///
  /// let con = Req::get("hello");
  /// let resp = Resp::for_request(&con).unwrap();
  /// assert_eq!(resp.msg().ty, Type::Ack);
  /// assert_eq!(resp.code(), code::CONTENT);
  ///
  /// let non = Req::get("hello").non();
  /// assert_eq!(Resp::for_request(&non).unwrap().msg().ty, Type::Non);
  /// ```
  pub fn for_request(req: &Req) -> Option<Self> {
    let req = req.msg();
    let ty = match req.ty {
      | _ if req.is_empty() => None,
      | Type::Con => Some(Type::Ack),
      | Type::Non => Some(Type::Non),
      | Type::Ack | Type::Reset => None,
    }?;

    Some(Self(Message::new(ty, code::CONTENT, req.id, req.token)))
  }

  /// Get the response code
  pub fn code(&self) -> Code {
    self.0.code
  }

  /// Change the response code
  pub fn set_code(&mut self, code: Code) {
    self.0.code = code;
  }

  /// Obtain a reference to the inner message
  pub fn msg(&self) -> &Message {
    &self.0
  }

  /// Obtain a mutable reference to the inner message
  pub fn msg_mut(&mut self) -> &mut Message {
    &mut self.0
  }

  /// Add a payload to this response
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
}

impl From<Message> for Resp {
  fn from(msg: Message) -> Self {
    Self(msg)
  }
}

impl From<Resp> for Message {
  fn from(resp: Resp) -> Self {
    resp.0
  }
}

impl AsRef<Message> for Resp {
  fn as_ref(&self) -> &Message {
    &self.0
  }
}

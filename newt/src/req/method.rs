use newt_msg::Code;

use crate::code;

/// Request method
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Method(pub Code);

impl core::fmt::Display for Method {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    match *self {
      | Method::GET => write!(f, "GET"),
      | Method::POST => write!(f, "POST"),
      | Method::PUT => write!(f, "PUT"),
      | Method::DELETE => write!(f, "DELETE"),
      | Method(c) => write!(f, "{}", c),
    }
  }
}

impl Method {
  code!(rfc7252("5.8.1") GET    = Method(0*01));
  code!(rfc7252("5.8.2") POST   = Method(0*02));
  code!(rfc7252("5.8.3") PUT    = Method(0*03));
  code!(rfc7252("5.8.4") DELETE = Method(0*04));

  /// Get the message code for this method
  pub fn code(&self) -> Code {
    self.0
  }
}

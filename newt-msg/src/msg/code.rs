use toad_macros::rfc_7252_doc;

#[doc = rfc_7252_doc!("12.1")]
/// <details><summary><b>RFC7252 Section 12.1.1 Method Codes</b></summary>
#[doc = concat!("\n#", rfc_7252_doc!("12.1.1"))]
/// </details>
/// <details><summary><b>RFC7252 Section 12.1.2 Response Codes</b></summary>
#[doc = concat!("\n#", rfc_7252_doc!("12.1.2"))]
/// </details>
///
/// # Examples
/// ```
/// use newt_msg::Code;
/// assert_eq!(Code { class: 2, detail: 5 }.to_string(), "2.05".to_string())
/// ```
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub struct Code {
  /// The "class" of message codes identify it as a request or response, and provides the class of response status:
  ///
  /// |class|meaning|
  /// |---|---|
  /// |`0`|Message is a request (or Empty, when detail is also `0`)|
  /// |`2`|Message is a success response|
  /// |`4`|Message is a client error response|
  /// |`5`|Message is a server error response|
  pub class: u8,

  /// 2-digit integer (range `[0, 32)`) that provides granular information about the response status.
  pub detail: u8,
}

/// Broad category a [`Code`] falls into
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum CodeKind {
  /// 0.00
  Empty,
  /// 0.01 through 0.31
  Request,
  /// 2.xx, 4.xx and 5.xx
  Response,
  /// 1.xx, 3.xx, 6.xx and 7.xx
  Reserved,
}

impl Code {
  /// The Empty code, 0.00
  pub const EMPTY: Code = Code::new(0, 0);

  /// Create a new Code
  ///
  /// ```
  /// use newt_msg::Code;
  ///
  /// let content = Code::new(2, 05);
  /// ```
  pub const fn new(class: u8, detail: u8) -> Self {
    Self { class, detail }
  }

  /// Classify this code
  ///
  /// ```
  /// use newt_msg::{Code, CodeKind};
  ///
  /// assert_eq!(Code::new(0, 0).kind(), CodeKind::Empty);
  /// assert_eq!(Code::new(0, 1).kind(), CodeKind::Request);
  /// assert_eq!(Code::new(4, 4).kind(), CodeKind::Response);
  /// assert_eq!(Code::new(1, 0).kind(), CodeKind::Reserved);
  /// ```
  pub fn kind(&self) -> CodeKind {
    match (self.class, self.detail) {
      | (0, 0) => CodeKind::Empty,
      | (0, _) => CodeKind::Request,
      | (2 | 4 | 5, _) => CodeKind::Response,
      | _ => CodeKind::Reserved,
    }
  }

  /// Is this a 2.xx response code?
  pub fn is_success(&self) -> bool {
    self.class == 2
  }

  /// Get the human string representation of a message code
  ///
  /// # Returns
  /// A `char` array
  ///
  /// This is to avoid unnecessary heap allocation,
  /// you can create a `String` with `FromIterator::<String>::from_iter`,
  /// or use the [`Display`](core::fmt::Display) implementation.
  /// ```
  /// use newt_msg::Code;
  ///
  /// let code = Code { class: 2, detail: 5 };
  /// let chars = code.to_human();
  /// let string = String::from_iter(chars);
  /// assert_eq!(string, "2.05".to_string());
  /// ```
  pub fn to_human(&self) -> [char; 4] {
    let to_char = |d: u8| char::from_digit(d.into(), 10).unwrap_or('?');
    [to_char(self.class),
     '.',
     to_char(self.detail / 10),
     to_char(self.detail % 10)]
  }
}

impl core::fmt::Display for Code {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    write!(f, "{}", String::from_iter(self.to_human()))
  }
}

impl From<u8> for Code {
  fn from(b: u8) -> Self {
    let class = b >> 5;
    let detail = b & 0b0011111;

    Code { class, detail }
  }
}

impl From<Code> for u8 {
  fn from(code: Code) -> u8 {
    let class = code.class << 5;
    let detail = code.detail & 0b0011111;

    class | detail
  }
}

use toad_macros::rfc_7252_doc;

/// Message Code
pub mod code;

/// Message parsing errors
pub mod parse_error;

/// Message ID
pub mod id;

/// Message Options
pub mod opt;

/// Message Type
pub mod ty;

/// Message Token
pub mod token;

/// Message Version
pub mod ver;

pub use code::*;
pub use id::*;
pub use opt::*;
pub use parse_error::*;
pub use token::*;
pub use ty::*;
pub use ver::*;

use crate::cursor::Cursor;
use crate::from_bytes::TryConsumeBytes;
use crate::TryFromBytes;

#[doc = rfc_7252_doc!("5.5")]
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Payload(pub Vec<u8>);

impl Payload {
  /// Is this payload empty?
  ///
  /// An empty payload is not written to the wire,
  /// and neither is the payload marker.
  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Try to interpret the payload as a UTF-8 string
  pub fn as_str(&self) -> Option<&str> {
    core::str::from_utf8(&self.0).ok()
  }
}

/// Struct representing the first byte of a message.
///
/// ```text
/// CoAP version
/// |
/// |  Message type (request, response, empty)
/// |  |
/// |  |  Length of token, in bytes. (4-bit integer)
/// |  |  |
/// vv vv vvvv
/// 01 00 0000
/// ```
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub(crate) struct Byte1 {
  pub(crate) ver: Version,
  pub(crate) ty: Type,
  pub(crate) tkl: u8,
}

impl TryFrom<u8> for Byte1 {
  type Error = MessageParseError;

  fn try_from(b: u8) -> Result<Self, Self::Error> {
    let ver = b >> 6; // bits 0 & 1
    let ty = b >> 4 & 0b11; // bits 2 & 3
    let tkl = b & 0b1111u8; // last 4 bits

    Ok(Byte1 { ver: Version(ver),
               ty: Type::try_from(ty)?,
               tkl })
  }
}

/// # `Message` struct
/// Low-level representation of a message that has been parsed from the raw binary format.
///
/// Messages support both serializing to bytes and from bytes, by using the provided [`TryFromBytes`] and [`TryIntoBytes`](crate::TryIntoBytes) traits.
///
/// <details>
/// <summary><b>RFC7252 - CoAP Messaging Model</b></summary>
#[doc = concat!("\n#", rfc_7252_doc!("2.1"))]
/// </details>
/// <details>
/// <summary><b>RFC7252 - CoAP Message Binary Format</b></summary>
#[doc = concat!("\n#", rfc_7252_doc!("3"))]
/// </details>
///
/// ```
/// use std::collections::BTreeMap;
///
/// use newt_msg::TryFromBytes;
/// use newt_msg::*;
/// # //                       version  token len  code (2.05 Content)
/// # //                       |        |          /
/// # //                       |  type  |         /  message ID
/// # //                       |  |     |        |   |
/// # //                       vv vv vvvv vvvvvvvv vvvvvvvvvvvvvvvv
/// # let header: [u8; 4] = 0b_01_00_0001_01000101_0000000000000001u32.to_be_bytes();
/// # let token: [u8; 1] = [254u8];
/// # let content_format: &[u8] = b"application/json";
/// # let options: [&[u8]; 2] = [&[0b_1100_1101u8, 0b00000011u8], content_format];
/// # let payload: [&[u8]; 2] = [&[0b_11111111u8], b"hello, world!"];
/// let packet: Vec<u8> = /* bytes! */
/// # [header.as_ref(), token.as_ref(), options.concat().as_ref(), payload.concat().as_ref()].concat();
///
/// let msg = Message::try_from_bytes(&packet).unwrap();
///
/// let expected = Message {
///   id: Id(1),
///   ty: Type::Con,
///   ver: Version(1),
///   token: Token(tinyvec::array_vec!([u8; 8] => 254)),
///   opts: BTreeMap::from([(OptNumber(12), vec![OptValue(content_format.to_vec())])]),
///   code: Code {class: 2, detail: 5},
///   payload: Payload(b"hello, world!".to_vec()),
/// };
///
/// assert_eq!(msg, expected);
/// ```
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Message {
  /// see [`Id`] for details
  pub id: Id,
  /// see [`Type`] for details
  pub ty: Type,
  /// see [`Version`] for details
  pub ver: Version,
  /// see [`Token`] for details
  pub token: Token,
  /// see [`Code`] for details
  pub code: Code,
  /// see [`opt::OptionMap`] for details
  pub opts: OptionMap,
  /// see [`Payload`]
  pub payload: Payload,
}

impl Message {
  /// Create a message with no options and an empty payload
  pub fn new(ty: Type, code: Code, id: Id, token: Token) -> Self {
    Self { id,
           ty,
           ver: Version::default(),
           token,
           code,
           opts: OptionMap::default(),
           payload: Payload::default() }
  }

  /// Create a new message that ACKs this one.
  ///
  /// The ACK carries this message's [`Id`] and no token,
  /// options or payload.
  ///
  /// ```
  /// use newt_msg::{Code, Id, Message, Token, Type};
  ///
  /// let req = Message::new(Type::Con, Code::new(0, 1), Id(12), Token::default());
  /// let ack = req.ack();
  ///
  /// assert_eq!(ack.ty, Type::Ack);
  /// assert_eq!(ack.id, Id(12));
  /// assert_eq!(ack.code, Code::EMPTY);
  /// ```
  pub fn ack(&self) -> Self {
    Self::new(Type::Ack, Code::EMPTY, self.id, Token::default())
  }

  /// Create a new message that rejects this one (a Reset carrying the same [`Id`])
  pub fn rst(&self) -> Self {
    Self::new(Type::Reset, Code::EMPTY, self.id, Token::default())
  }

  /// Is this message Empty? (code 0.00)
  pub fn is_empty(&self) -> bool {
    self.code == Code::EMPTY
  }

  /// Is this message a request?
  pub fn is_request(&self) -> bool {
    self.code.kind() == CodeKind::Request
  }

  /// Is this message a response?
  pub fn is_response(&self) -> bool {
    self.code.kind() == CodeKind::Response
  }

  /// The exact number of bytes this message will occupy
  /// once serialized
  pub fn size(&self) -> usize {
    let header_size = 4;
    let token_size = self.token.0.len();
    let opts_size: usize = self.opts
                               .iter()
                               .flat_map(|(n, vs)| vs.iter().map(move |v| (*n, v)))
                               .scan(0u16, |prev, (n, v)| {
                                 let delta = n.0 - *prev;
                                 *prev = n.0;
                                 Some(opt::opt_size(delta, v.0.len()))
                               })
                               .sum();
    let payload_size = match self.payload.0.len() {
      | 0 => 0,
      | n => 1 + n,
    };

    header_size + token_size + opts_size + payload_size
  }
}

impl<Bytes: AsRef<[u8]>> TryFromBytes<Bytes> for Message {
  type Error = MessageParseError;

  fn try_from_bytes(bytes: Bytes) -> Result<Self, Self::Error> {
    let mut bytes = Cursor::new(bytes);

    let Byte1 { tkl, ty, ver } = bytes.next()
                                      .ok_or_else(MessageParseError::eof)?
                                      .try_into()?;

    if ver != Version::default() {
      return Err(Self::Error::InvalidVersion(ver.0));
    }

    if tkl > 8 {
      return Err(Self::Error::InvalidTokenLength(tkl));
    }

    let code: Code = bytes.next().ok_or_else(MessageParseError::eof)?.into();
    let id: Id = Id::try_consume_bytes(&mut bytes)?;

    if code == Code::EMPTY && (tkl > 0 || bytes.remaining() > 0) {
      return Err(Self::Error::InvalidEmptyMessage);
    }

    let token = bytes.take_exact(tkl as usize)
                     .ok_or_else(MessageParseError::eof)?;
    let token = Token::try_from(token)?;

    let opts = OptionMap::try_consume_bytes(&mut bytes)?;

    if bytes.next() == Some(0b11111111) && bytes.remaining() == 0 {
      return Err(Self::Error::PayloadMarkerWithoutPayload);
    }

    let payload = Payload(bytes.take_until_end().to_vec());

    Ok(Message { id,
                 ty,
                 ver,
                 code,
                 token,
                 opts,
                 payload })
  }
}

use tinyvec::ArrayVec;

use crate::msg::Byte1;
use crate::*;

/// The largest value that fits in an option's delta or length
/// (13 + 256 + 65535)
pub(crate) const MAX_OPT_LEN_OR_DELTA: usize = 65804;

/// Trait allowing fallible conversion into bytes
pub trait TryIntoBytes {
  /// Error type yielded if conversion fails
  type Error;

  /// Try to convert into a collection of bytes
  ///
  /// ```
  /// use newt_msg::{Code, Id, Message, Token, TryIntoBytes, Type};
  ///
  /// let msg = Message::new(Type::Con, Code::new(0, 1), Id(0), Token::default());
  /// let bytes: Vec<u8> = msg.try_into_bytes().unwrap();
  ///
  /// assert_eq!(bytes, vec![0b0100_0000, 0b0000_0001, 0, 0]);
  /// ```
  fn try_into_bytes(self) -> Result<Vec<u8>, Self::Error>;
}

/// Errors encounterable serializing to bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MessageToBytesError {
  /// Confirmable messages must carry a request or response;
  /// an empty (0.00) CON is never valid.
  EmptyConfirmable,
  /// An option value was longer than the option format can express
  #[allow(missing_docs)]
  OptionValueTooLong { number: OptNumber, len: usize },
}

impl core::fmt::Display for MessageToBytesError {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    match self {
      | Self::EmptyConfirmable => write!(f, "confirmable message must not be empty"),
      | Self::OptionValueTooLong { number, len } => {
        write!(f, "option {} value of {} bytes is too long", number.0, len)
      },
    }
  }
}

impl std::error::Error for MessageToBytesError {}

impl TryIntoBytes for Message {
  type Error = MessageToBytesError;

  fn try_into_bytes(self) -> Result<Vec<u8>, Self::Error> {
    (&self).try_into_bytes()
  }
}

impl<'a> TryIntoBytes for &'a Message {
  type Error = MessageToBytesError;

  fn try_into_bytes(self) -> Result<Vec<u8>, Self::Error> {
    if self.ty == Type::Con && self.code == Code::EMPTY {
      return Err(MessageToBytesError::EmptyConfirmable);
    }

    let mut bytes = Vec::with_capacity(self.size());

    let byte1: u8 = Byte1 { tkl: self.token.0.len() as u8,
                            ver: self.ver,
                            ty: self.ty }.into();
    let code: u8 = self.code.into();
    let id: [u8; 2] = self.id.into();

    bytes.push(byte1);
    bytes.push(code);

    bytes.extend(id);
    bytes.extend(self.token.0.iter().copied());

    let mut prev = 0u16;
    for (number, values) in self.opts.iter() {
      for value in values {
        if value.0.len() > MAX_OPT_LEN_OR_DELTA {
          return Err(MessageToBytesError::OptionValueTooLong { number: *number,
                                                               len: value.0.len() });
        }

        extend_opt_bytes(number.0 - prev, value, &mut bytes);
        prev = number.0;
      }
    }

    if !self.payload.is_empty() {
      bytes.push(0b11111111);
      bytes.extend(self.payload.0.iter().copied());
    }

    Ok(bytes)
  }
}

/// Write an option's header, extended delta & length,
/// followed by its value.
fn extend_opt_bytes(delta: u16, value: &OptValue, bytes: &mut Vec<u8>) {
  let (del, del_bytes) = opt_len_or_delta(delta as u32);
  let (len, len_bytes) = opt_len_or_delta(value.0.len() as u32);
  let del = del << 4;

  let header = del | len;

  bytes.push(header);

  if let Some(bs) = del_bytes {
    bytes.extend(bs);
  }

  if let Some(bs) = len_bytes {
    bytes.extend(bs);
  }

  bytes.extend(value.0.iter().copied());
}

/// Split an option delta or length into the nibble stored in the option header
/// and the extended bytes following it.
///
/// The extended delta bytes come before the extended length bytes,
/// so delta must always be written (and read) first.
pub(crate) fn opt_len_or_delta(val: u32) -> (u8, Option<ArrayVec<[u8; 2]>>) {
  match val {
    | n if n >= 269 => {
      let mut bytes = ArrayVec::new();
      bytes.extend(((n - 269) as u16).to_be_bytes());
      (14, Some(bytes))
    },
    | n if n >= 13 => {
      let mut bytes = ArrayVec::new();
      bytes.push((n - 13) as u8);
      (13, Some(bytes))
    },
    | n => (n as u8, None),
  }
}

impl From<Id> for [u8; 2] {
  fn from(id: Id) -> [u8; 2] {
    id.0.to_be_bytes()
  }
}

impl From<Byte1> for u8 {
  fn from(b: Byte1) -> u8 {
    let ver = b.ver.0 << 6;
    let ty = u8::from(b.ty) << 4;
    let tkl = b.tkl;

    ver | ty | tkl
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{assert_eqb, assert_eqb_iter};

  #[test]
  fn msg() {
    let (msg, expected) = test_msg();
    let actual: Vec<u8> = msg.try_into_bytes().unwrap();
    assert_eqb_iter!(actual, expected);
  }

  #[test]
  fn byte_1() {
    let byte = Byte1 { ver: Version(1),
                       ty: Type::Ack,
                       tkl: 3 };
    let actual: u8 = byte.into();
    let expected = 0b_01_10_0011u8;
    assert_eqb!(actual, expected)
  }

  #[test]
  fn id() {
    let id = Id(16);
    let actual = u16::from_be_bytes(id.into());
    assert_eqb!(actual, 16)
  }

  #[test]
  fn opt() {
    use core::iter::repeat;
    let cases: [(u16, Vec<u8>, Vec<u8>); 4] =
      [(24,
        repeat(1).take(100).collect(),
        [[0b1101_1101u8, 24 - 13, 100 - 13].as_ref(),
         repeat(1).take(100).collect::<Vec<u8>>().as_ref()].concat()),
       (1, vec![1], vec![0b0001_0001, 1]),
       (24, vec![1], vec![0b1101_0001, 11, 1]),
       (24,
        repeat(1).take(300).collect(),
        [[0b1101_1110, 24 - 13].as_ref(),
         (300u16 - 269).to_be_bytes().as_ref(),
         repeat(1).take(300).collect::<Vec<u8>>().as_ref()].concat())];

    cases.into_iter().for_each(|(delta, value, expected)| {
                       let mut actual = Vec::<u8>::new();
                       extend_opt_bytes(delta, &OptValue(value), &mut actual);
                       assert_eqb_iter!(actual, expected)
                     });
  }

  #[test]
  fn no_payload_marker() {
    let msg = Message::new(Type::Non, Code::new(2, 5), Id(0), Token::default());

    assert_ne!(msg.try_into_bytes().unwrap().last(), Some(&0b11111111));
  }

  #[test]
  fn empty_con_is_rejected() {
    let msg = Message::new(Type::Con, Code::EMPTY, Id(0), Token::default());
    assert_eq!(msg.try_into_bytes(),
               Err(MessageToBytesError::EmptyConfirmable));
  }

  #[test]
  fn option_value_too_long() {
    let mut msg = Message::new(Type::Non, Code::new(0, 1), Id(0), Token::default());
    msg.opts
       .insert(OptNumber(11), vec![OptValue(vec![0; MAX_OPT_LEN_OR_DELTA + 1])]);

    assert_eq!(msg.try_into_bytes(),
               Err(MessageToBytesError::OptionValueTooLong { number: OptNumber(11),
                                                              len: MAX_OPT_LEN_OR_DELTA + 1 }));
  }
}

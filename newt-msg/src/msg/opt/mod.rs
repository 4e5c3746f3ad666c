use std::collections::BTreeMap;

use toad_macros::rfc_7252_doc;

use crate::cursor::Cursor;
use crate::from_bytes::TryConsumeBytes;

/// Option parsing errors
pub mod parse_error;
pub use parse_error::*;

/// Typed accessors for the options defined by RFC7252, RFC7641 & RFC7959
pub mod ext;
pub use ext::*;

/// Well-known option numbers and the types of their values
pub mod known;
pub use known::*;

/// Options set on a message, keyed by their [`OptNumber`].
///
/// Iterating the map yields options in ascending order of number,
/// which is the order they are written to the wire in.
/// Repeated options keep the order they were added in.
pub type OptionMap = BTreeMap<OptNumber, Vec<OptValue>>;

pub(crate) fn parse_opt_len_or_delta<A: AsRef<[u8]>>(head: u8,
                                                     bytes: &mut Cursor<A>,
                                                     reserved_err: OptParseError)
                                                     -> Result<u32, OptParseError> {
  match head {
    | 13 => {
      let n = bytes.next().ok_or_else(OptParseError::eof)?;
      Ok((n as u32) + 13)
    },
    | 14 => match bytes.take_exact(2) {
      | Some(&[a, b]) => Ok(u16::from_be_bytes([a, b]) as u32 + 269),
      | _ => Err(OptParseError::eof()),
    },
    | 15 => Err(reserved_err),
    | _ => Ok(head as u32),
  }
}

/// Number of bytes an option with the given delta and value length
/// will occupy on the wire (header, extended delta & length, value)
pub(crate) fn opt_size(delta: u16, len: usize) -> usize {
  let ext_size = |n: usize| match n {
    | n if n >= 269 => 2,
    | n if n >= 13 => 1,
    | _ => 0,
  };

  1 + ext_size(delta as usize) + ext_size(len) + len
}

#[doc = rfc_7252_doc!("5.4")]
/// <details><summary><b>RFC7252 Section 3.1 Option binary format</b></summary>
#[doc = concat!("\n#", rfc_7252_doc!("3.1"))]
/// </details>
///
/// A single option as it appears on the wire; the number is
/// only known relative to the option before it.
#[derive(Clone, PartialEq, Debug, Default)]
pub(crate) struct Opt {
  pub(crate) delta: u32,
  pub(crate) value: OptValue,
}

impl<Bytes: AsRef<[u8]>> TryConsumeBytes<Bytes> for Opt {
  type Error = OptParseError;

  fn try_consume_bytes(bytes: &mut Cursor<Bytes>) -> Result<Self, Self::Error> {
    let byte1 = bytes.next().ok_or_else(OptParseError::eof)?;

    // NOTE: Delta **MUST** be consumed before Value. see comment on `opt_len_or_delta` for more info
    let delta = parse_opt_len_or_delta(byte1 >> 4,
                                       bytes,
                                       OptParseError::OptionDeltaReservedValue(15))?;

    let len = parse_opt_len_or_delta(byte1 & 0b00001111,
                                     bytes,
                                     OptParseError::ValueLengthReservedValue(15))?
              as usize;

    let value = bytes.take_exact(len).ok_or_else(OptParseError::eof)?;

    Ok(Opt { delta,
             value: OptValue(value.to_vec()) })
  }
}

impl<Bytes: AsRef<[u8]>> TryConsumeBytes<Bytes> for OptionMap {
  type Error = OptParseError;

  /// Consume options until the end of the buffer or the payload marker.
  ///
  /// The payload marker is left in the cursor.
  fn try_consume_bytes(bytes: &mut Cursor<Bytes>) -> Result<Self, Self::Error> {
    let mut opts = OptionMap::new();
    let mut number = 0u32;

    loop {
      match bytes.peek() {
        | None | Some(0b11111111) => break Ok(opts),
        | Some(_) => {
          let opt = Opt::try_consume_bytes(bytes)?;
          number += opt.delta;

          let n = u16::try_from(number).map_err(|_| OptParseError::OptionNumberOverflow(number))?;
          opts.entry(OptNumber(n)).or_default().push(opt.value);
        },
      }
    }
  }
}

#[doc = rfc_7252_doc!("5.4.6")]
/// <details><summary><b>RFC7252 Section 12.2 Core CoAP Option Numbers</b></summary>
#[doc = concat!("\n#", rfc_7252_doc!("12.2"))]
/// </details>
///
/// # `OptNumber` struct
/// Numbers for the well-known options live in [`known::no_repeat`] and [`known::repeat`].
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub struct OptNumber(pub u16);

#[doc = rfc_7252_doc!("5.4.1")]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum OptionMustBeProcessed {
  /// This option must be processed,
  /// and a response that ignores it
  /// will be rejected.
  ///
  /// Corresponds to the option being "critical"
  /// in strict CoAP terms
  Yes,
  /// This option does not _need_ to
  /// be processed,
  /// and a response that ignores it
  /// will be processed anyway.
  ///
  /// Corresponds to the option being "elective"
  /// in strict CoAP terms
  No,
}

#[doc = rfc_7252_doc!("5.4.2")]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum WhenOptionUnsupportedByProxy {
  /// This option /must be/ processed & understood by proxies
  /// and may not be forwarded blindly to their destination.
  ///
  /// Corresponds to the option being "UnSafe" to forward
  /// in strict CoAP terms
  Error,
  /// This option may not be processed & understood by proxies
  /// and may be forwarded blindly to their destination.
  ///
  /// Corresponds to the option being "SafeToForward"
  /// in strict CoAP terms
  Forward,
}

#[doc = rfc_7252_doc!("5.4.2")]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum WhenOptionChanges {
  /// If this option is safe to forward,
  /// but unknown to a proxy, it should be included in the proxy's
  /// cache key for this message.
  ///
  /// Corresponds to the option being not "NoCacheKey"
  /// in strict CoAP terms
  ResponseChanges,
  /// If this option is safe to forward,
  /// but unknown to a proxy, it should not be included in the proxy's
  /// cache key for this message, and different values for this option
  /// should yield the cached response.
  ///
  /// Corresponds to the option being "NoCacheKey"
  /// in strict CoAP terms
  ResponseDoesNotChange,
}

impl OptNumber {
  /// Whether or not this option may be ignored by a server
  pub fn must_be_processed(&self) -> OptionMustBeProcessed {
    match self.0 & 0b1 {
      | 1 => OptionMustBeProcessed::Yes,
      | _ => OptionMustBeProcessed::No,
    }
  }

  /// Whether or not this option may be forwarded blindly by
  /// a proxy that does not support processing it
  pub fn when_unsupported_by_proxy(&self) -> WhenOptionUnsupportedByProxy {
    match (self.0 & 0b10) >> 1 {
      | 1 => WhenOptionUnsupportedByProxy::Error,
      | _ => WhenOptionUnsupportedByProxy::Forward,
    }
  }

  /// Whether or not different values for this option should
  /// yield proxies' cached response
  ///
  /// _(when the proxy does not support processing it and
  /// the option is safe to forward)_
  pub fn when_option_changes(&self) -> WhenOptionChanges {
    match (self.0 & 0b11110) >> 1 {
      | 0b1110 => WhenOptionChanges::ResponseDoesNotChange,
      | _ => WhenOptionChanges::ResponseChanges,
    }
  }
}

#[doc = rfc_7252_doc!("3.2")]
#[derive(Default, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct OptValue(pub Vec<u8>);

impl OptValue {
  /// Encode an unsigned integer option value.
  ///
  /// Uses the shortest big-endian representation;
  /// zero is the empty value.
  ///
  /// ```
  /// use newt_msg::OptValue;
  ///
  /// assert_eq!(OptValue::uint(0).0, Vec::<u8>::new());
  /// assert_eq!(OptValue::uint(12).0, vec![12]);
  /// assert_eq!(OptValue::uint(0x1234).0, vec![0x12, 0x34]);
  /// ```
  pub fn uint(n: u32) -> Self {
    let bytes = n.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    Self(bytes[skip..].to_vec())
  }

  /// Interpret this value as an unsigned integer.
  ///
  /// Yields `None` if the value is longer than 4 bytes.
  pub fn as_u32(&self) -> Option<u32> {
    if self.0.len() > 4 {
      return None;
    }

    Some(self.0.iter().fold(0u32, |n, b| (n << 8) | *b as u32))
  }

  /// Interpret this value as a UTF-8 string
  pub fn as_str(&self) -> Option<&str> {
    core::str::from_utf8(&self.0).ok()
  }
}

impl From<&str> for OptValue {
  fn from(s: &str) -> Self {
    Self(s.as_bytes().to_vec())
  }
}

impl From<Vec<u8>> for OptValue {
  fn from(v: Vec<u8>) -> Self {
    Self(v)
  }
}

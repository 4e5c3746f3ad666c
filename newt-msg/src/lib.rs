//! Low-level representation of CoAP messages.
//!
//! The most notable item in `newt_msg` is [`Message`];
//! a CoAP message very close to the actual byte layout.
//!
//! ## Options
//! Options (in http terms: headers) are stored in a sorted map from
//! [`OptNumber`] to the values set for that number, in the order they
//! were added. This mirrors the wire layout, where options must be
//! serialized in ascending order of their number and repeated options
//! keep their relative order.
//!
//! Typed access to the options defined by RFC7252, RFC7641 & RFC7959
//! (e.g. `Block2`, `Observe`, `Uri-Path`) lives in the [`MessageOptions`] trait.
//!
//! ```
//! use newt_msg::{Code, Id, Message, MessageOptions, Token, TryFromBytes, TryIntoBytes, Type};
//!
//! let mut msg = Message::new(Type::Con, Code::new(0, 1), Id(1), Token::default());
//! msg.set_path("sensors/temp");
//!
//! let bytes = msg.clone().try_into_bytes().unwrap();
//! let parsed = Message::try_from_bytes(&bytes).unwrap();
//!
//! assert_eq!(parsed, msg);
//! assert_eq!(parsed.path(), vec!["sensors", "temp"]);
//! ```

// x-release-please-start-version
#![doc(html_root_url = "https://docs.rs/newt-msg/0.1.0")]
// x-release-please-end
#![cfg_attr(not(test), forbid(missing_debug_implementations, unreachable_pub))]
#![cfg_attr(not(test), deny(unsafe_code, missing_copy_implementations))]
#![cfg_attr(any(docsrs, feature = "docs"), feature(doc_cfg))]
#![deny(missing_docs)]

pub(crate) mod cursor;

#[doc(hidden)]
pub mod from_bytes;

/// Message structs
pub mod msg;

#[doc(hidden)]
pub mod to_bytes;

#[doc(inline)]
pub use from_bytes::TryFromBytes;
#[doc(inline)]
pub use msg::*;
#[doc(inline)]
pub use to_bytes::{MessageToBytesError, TryIntoBytes};

#[cfg(test)]
pub(crate) fn test_msg() -> (Message, Vec<u8>) {
  use std::collections::BTreeMap;

  let header: [u8; 4] = 0b0100_0001_0100_0101_0000_0000_0000_0001_u32.to_be_bytes();
  let token: [u8; 1] = [254u8];
  let content_format: &[u8] = b"application/json";
  let options: [&[u8]; 2] = [&[0b_1100_1101u8, 0b00000011u8], content_format];
  let payload: [&[u8]; 2] = [&[0b1111_1111_u8], b"hello, world!"];
  let bytes = [header.as_ref(),
               token.as_ref(),
               options.concat().as_ref(),
               payload.concat().as_ref()].concat();

  let msg = Message { id: Id(1),
                      ty: Type::Con,
                      ver: Version(1),
                      token: Token(tinyvec::array_vec!([u8; 8] => 254)),
                      opts: BTreeMap::from([(OptNumber(12),
                                             vec![OptValue(content_format.to_vec())])]),
                      code: Code { class: 2,
                                   detail: 5 },
                      payload: Payload(b"hello, world!".to_vec()) };
  (msg, bytes)
}

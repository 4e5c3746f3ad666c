use toad_macros::rfc_7252_doc;

use super::MessageParseError;

#[doc = rfc_7252_doc!("5.3.1")]
#[derive(Copy, Clone, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Token(pub tinyvec::ArrayVec<[u8; 8]>);

impl Token {
  /// Take an arbitrary-length sequence of bytes and turn it into an opaque message token
  ///
  /// Currently uses the BLAKE2 hashing algorithm, but this may change in the future.
  ///
  /// ```
  /// use newt_msg::Token;
  ///
  /// let my_token = Token::opaque(&[0, 1, 2]);
  /// assert_eq!(my_token.0.len(), 8);
  /// assert_eq!(my_token, Token::opaque(&[0, 1, 2]));
  /// ```
  pub fn opaque(data: &[u8]) -> Token {
    use blake2::digest::consts::U8;
    use blake2::{Blake2b, Digest};

    let mut digest = Blake2b::<U8>::new();
    digest.update(data);
    Token(Into::<[u8; 8]>::into(digest.finalize()).into())
  }

  /// Shorten this token to at most `len` bytes
  pub fn truncated(mut self, len: usize) -> Token {
    self.0.truncate(len.min(8));
    self
  }

  /// Get the bytes of the token
  pub fn as_bytes(&self) -> &[u8] {
    &self.0
  }
}

impl core::fmt::Display for Token {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    for b in self.0.iter() {
      write!(f, "{:02x}", b)?;
    }
    Ok(())
  }
}

impl TryFrom<&[u8]> for Token {
  type Error = MessageParseError;

  fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
    if bytes.len() > 8 {
      return Err(MessageParseError::InvalidTokenLength(bytes.len() as u8));
    }

    let mut token = tinyvec::ArrayVec::<[u8; 8]>::new();
    token.extend_from_slice(bytes);
    Ok(Token(token))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn truncate() {
    let t = Token::opaque(b"abc").truncated(4);
    assert_eq!(t.0.len(), 4);
    assert_eq!(t.as_bytes(), &Token::opaque(b"abc").0[0..4]);
  }

  #[test]
  fn from_slice() {
    assert_eq!(Token::try_from([1u8, 2].as_ref()).unwrap().as_bytes(), &[1, 2]);
    assert_eq!(Token::try_from([0u8; 9].as_ref()),
               Err(MessageParseError::InvalidTokenLength(9)));
  }

  #[test]
  fn display_is_hex() {
    let t = Token(tinyvec::array_vec!([u8; 8] => 0x0a, 0xff));
    assert_eq!(t.to_string(), "0aff");
  }
}
